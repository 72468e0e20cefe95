extern crate env_logger;
extern crate futures;
extern crate tokio_core;
extern crate tokio_io;
extern crate tk_h1;

mod support;

use std::time::Duration;

use futures::{Future, Stream};
use tokio_core::reactor::Core;

use tk_h1::{Config, HttpError, UsageError, Version};
use tk_h1::client::HttpClient;

use support::Duplex;


fn read_body(core: &mut Core, response: &tk_h1::client::HttpResponse)
    -> Vec<u8>
{
    core.run(response.body().concat2()).unwrap()
}

#[test]
fn simple_get() {
    let _ = env_logger::init();
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, wire) = Duplex::new(
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request("GET", "/a", &[], b"").unwrap();
    let response = core.run(client.get_response()).unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.version(), Version::Http11);
    assert_eq!(response.get_header("content-length"), Some("5"));
    assert_eq!(read_body(&mut core, &response), b"hello".to_vec());
    assert!(response.into_message().should_keep_alive);

    assert_eq!(String::from_utf8(wire.borrow().clone()).unwrap(),
        "GET /a HTTP/1.1\r\nHost: h\r\nUser-Agent: tk-h1/0.1.0\r\n\r\n");
}

#[test]
fn chunked_upload_wire_format() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, wire) = Duplex::new(
        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request_chunked("POST", "/u", &[],
        vec![&b"ab"[..], &b"cde"[..]]).unwrap();
    core.run(client.get_response()).unwrap();

    let written = String::from_utf8(wire.borrow().clone()).unwrap();
    assert!(written.contains("Transfer-Encoding: chunked\r\n"));
    assert!(written.contains("TE: trailers\r\n"));
    assert!(written.ends_with("\r\n\r\n2\r\nab\r\n3\r\ncde\r\n0\r\n\r\n"));
}

#[test]
fn request_trailers() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, wire) = Duplex::new(
        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    let mut request = client.start_request("POST", "/u", &[]).unwrap();
    request.write(b"payload").unwrap();
    request.end_request(Some(&[("X-Check", "ab")])).unwrap();
    core.run(client.get_response()).unwrap();

    let written = String::from_utf8(wire.borrow().clone()).unwrap();
    assert!(written.ends_with("7\r\npayload\r\n0\r\nX-Check: ab\r\n\r\n"));
}

#[test]
fn response_trailers_after_body() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, _wire) = Duplex::new(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
          5\r\nhello\r\n0\r\nX-Trace: 1\r\n\r\n");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request("GET", "/t", &[], b"").unwrap();
    let response = core.run(client.get_response()).unwrap();
    assert_eq!(read_body(&mut core, &response), b"hello".to_vec());
    assert_eq!(response.get_trailer("x-trace"),
               Some("1".to_string()));
}

#[test]
fn pipelined_responses_in_order() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, _wire) = Duplex::new(
        b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nA\
          HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nB\
          HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nC");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request("GET", "/1", &[], b"").unwrap();
    client.request("GET", "/2", &[], b"").unwrap();
    client.request("GET", "/3", &[], b"").unwrap();

    for expected in &[b"A", b"B", b"C"] {
        let response = core.run(client.get_response()).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(read_body(&mut core, &response), expected.to_vec());
    }
}

#[test]
fn head_response_returns_promptly() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    // the server declares a length but, this being HEAD, sends no body
    let (conn, _wire) = Duplex::hanging(
        b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request("HEAD", "/", &[], b"").unwrap();
    let response = core.run(
        client.get_response_within(Some(Duration::from_secs(5)))).unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.get_header("content-length"), Some("10"));
    assert_eq!(read_body(&mut core, &response), Vec::<u8>::new());
}

#[test]
fn oversized_header_error_is_sticky() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    let mut input = b"HTTP/1.1 200 OK\r\nX-Big: ".to_vec();
    input.extend(vec![b'a'; 300]);
    input.extend(b"\r\n\r\n");
    let (conn, _wire) = Duplex::new(&input);
    let cfg = Config::new().server_name("h").max_header_size(128).done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request("GET", "/", &[], b"").unwrap();
    let err = core.run(client.get_response()).unwrap_err();
    assert_eq!(format!("{}", err), "parse error: HTTP header too large");
    // the error is sticky
    let err = core.run(client.get_response()).unwrap_err();
    assert_eq!(format!("{}", err), "parse error: HTTP header too large");
    // and new requests are refused as well
    match client.request("GET", "/again", &[], b"") {
        Err(HttpError::Parse(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn get_response_timeout_is_not_fatal() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, _wire) = Duplex::hanging(b"");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request("GET", "/slow", &[], b"").unwrap();
    let err = core.run(
        client.get_response_within(Some(Duration::from_millis(20))))
        .unwrap_err();
    match err {
        HttpError::Timeout => {}
        other => panic!("unexpected error: {:?}", other),
    }
    // the connection is still usable for another wait
    let err = core.run(
        client.get_response_within(Some(Duration::from_millis(20))))
        .unwrap_err();
    assert!(matches!(err, HttpError::Timeout));
}

#[test]
fn hop_by_hop_headers_are_refused() {
    let core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, _wire) = Duplex::hanging(b"");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    match client.request("GET", "/", &[("Connection", "close")], b"") {
        Err(HttpError::Usage(UsageError::HopByHop(ref name)))
            if name == "Connection" => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn http10_asks_for_keep_alive() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, wire) = Duplex::new(
        b"HTTP/1.0 200 OK\r\nContent-Length: 2\r\n\
          Connection: keep-alive\r\n\r\nok");
    let cfg = Config::new().server_name("h")
        .version(Version::Http10).done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request("GET", "/", &[], b"").unwrap();
    let response = core.run(client.get_response()).unwrap();
    assert_eq!(read_body(&mut core, &response), b"ok".to_vec());
    assert!(response.into_message().should_keep_alive);
    let written = String::from_utf8(wire.borrow().clone()).unwrap();
    assert!(written.starts_with("GET / HTTP/1.0\r\n"));
    assert!(written.contains("Connection: keep-alive\r\n"));
    // 1.0 requests don't get a Host header
    assert!(!written.contains("Host:"));
}

#[test]
fn streaming_body_needs_length_on_http10() {
    let core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, _wire) = Duplex::hanging(b"");
    let cfg = Config::new().server_name("h")
        .version(Version::Http10).done();
    let client = HttpClient::new(conn, &handle, &cfg);

    match client.request_chunked("POST", "/", &[], vec![&b"x"[..]]) {
        Err(HttpError::Usage(UsageError::LengthRequired)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn content_length_overrun_is_refused() {
    let core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, _wire) = Duplex::hanging(b"");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    let mut request = client.start_request("PUT", "/f",
        &[("Content-Length", "3")]).unwrap();
    request.write(b"ab").unwrap();
    match request.write(b"cd") {
        Err(HttpError::Usage(UsageError::TooManyBodyBytes)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn previous_body_must_be_read_before_the_next_response() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    // only half of the first response body ever arrives
    let (conn, _wire) = Duplex::hanging(
        b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request("GET", "/1", &[], b"").unwrap();
    client.request("GET", "/2", &[], b"").unwrap();
    let response = core.run(client.get_response()).unwrap();
    assert_eq!(response.status(), 200);
    let err = core.run(client.get_response()).unwrap_err();
    assert!(matches!(err, HttpError::Usage(UsageError::BodyUnread)));
}

#[test]
fn closed_connection_reports_closed() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, _wire) = Duplex::new(
        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request("GET", "/", &[], b"").unwrap();
    core.run(client.get_response()).unwrap();
    // the peer closed after the first response
    let err = core.run(client.get_response()).unwrap_err();
    assert!(matches!(err, HttpError::Closed));
}

#[test]
fn arbitrary_read_chunking_makes_no_difference() {
    let mut core = Core::new().unwrap();
    let handle = core.handle();
    let (conn, _wire) = Duplex::chunked(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
          5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n", 3);
    let cfg = Config::new().server_name("h").done();
    let client = HttpClient::new(conn, &handle, &cfg);

    client.request("GET", "/", &[], b"").unwrap();
    let response = core.run(client.get_response()).unwrap();
    assert_eq!(read_body(&mut core, &response), b"hello world".to_vec());
}
