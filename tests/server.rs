extern crate env_logger;
extern crate futures;
extern crate tokio_core;
extern crate tokio_io;
extern crate tk_h1;

mod support;

use futures::{Future, Stream};
use futures::future::ok;
use tokio_core::reactor::Core;

use tk_h1::{Config, HttpError, Message};
use tk_h1::server::{Proto, Responder, ConnInfo};

use support::Duplex;


type HandlerFuture = Box<Future<Item=(), Error=HttpError>>;

fn run_server<H>(input: &[u8], cfg: &Config, handler: H) -> String
    where H: FnMut(Message, Responder) -> HandlerFuture
{
    let mut core = Core::new().unwrap();
    let (conn, wire) = Duplex::new(input);
    let cfg = (*cfg).clone().done();
    let proto = Proto::new(conn, handler, &cfg, ConnInfo::default());
    core.run(proto).unwrap();
    let bytes = wire.borrow().clone();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn simple_get() {
    let _ = env_logger::init();
    let written = run_server(
        b"GET /a HTTP/1.1\r\nHost: h\r\n\r\n",
        &Config::new(),
        |req: Message, resp: Responder| -> HandlerFuture {
            assert_eq!(req.method.as_ref().unwrap(), "GET");
            assert_eq!(req.url.as_ref().unwrap(), "/a");
            assert_eq!(req.parsed_url.as_ref().unwrap().0, "/a");
            assert!(req.should_keep_alive);
            let mut writer = resp.start_response("200 OK",
                &[("Content-Length", "5"),
                  ("Content-Type", "text/plain")]).unwrap();
            writer.write(b"hello").unwrap();
            writer.end().unwrap();
            Box::new(ok(()))
        });
    assert!(written.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(written.contains("Content-Length: 5\r\n"));
    assert!(written.contains("Server: tk-h1/0.1.0\r\n"));
    assert!(written.contains("\r\nDate: "));
    // keep-alive is the 1.1 default, no Connection header needed
    assert!(!written.contains("Connection:"));
    assert!(written.ends_with("\r\n\r\nhello"));
}

#[test]
fn pipelined_requests_answered_in_order() {
    let written = run_server(
        b"GET /1 HTTP/1.1\r\n\r\nGET /2 HTTP/1.1\r\n\r\n",
        Config::new().max_pipeline_size(1),
        |req: Message, resp: Responder| -> HandlerFuture {
            let body = format!("path={}", req.url.as_ref().unwrap());
            let length = body.len().to_string();
            let mut writer = resp.start_response("200 OK",
                &[("Content-Length", &length[..])]).unwrap();
            writer.write(body.as_bytes()).unwrap();
            writer.end().unwrap();
            Box::new(ok(()))
        });
    let first = written.find("path=/1").unwrap();
    let second = written.find("path=/2").unwrap();
    assert!(first < second);
}

#[test]
fn chunked_response_with_trailers() {
    let written = run_server(
        b"GET /t HTTP/1.1\r\n\r\n",
        &Config::new(),
        |_req: Message, resp: Responder| -> HandlerFuture {
            // no Content-Length on 1.1: the body goes out chunked
            let mut writer = resp.start_response("200 OK", &[]).unwrap();
            writer.write(b"hello").unwrap();
            writer.set_trailers(vec![
                ("X-Trace".to_string(), "1".to_string())]);
            writer.end().unwrap();
            Box::new(ok(()))
        });
    assert!(written.contains("Transfer-Encoding: chunked\r\n"));
    assert!(written.ends_with("5\r\nhello\r\n0\r\nX-Trace: 1\r\n\r\n"));
}

#[test]
fn http10_body_is_close_delimited() {
    let written = run_server(
        b"GET / HTTP/1.0\r\n\r\n",
        &Config::new(),
        |_req: Message, resp: Responder| -> HandlerFuture {
            let mut writer = resp.start_response("200 OK", &[]).unwrap();
            writer.write(b"hi").unwrap();
            writer.end().unwrap();
            Box::new(ok(()))
        });
    assert!(written.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(!written.contains("Transfer-Encoding"));
    assert!(!written.contains("Content-Length"));
    assert!(written.ends_with("\r\n\r\nhi"));
}

#[test]
fn connection_close_is_honored() {
    let written = run_server(
        b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n",
        &Config::new(),
        |req: Message, resp: Responder| -> HandlerFuture {
            assert!(!req.should_keep_alive);
            let mut writer = resp.start_response("200 OK",
                &[("Content-Length", "0")]).unwrap();
            writer.end().unwrap();
            Box::new(ok(()))
        });
    assert!(written.contains("Connection: close\r\n"));
}

#[test]
fn http10_keep_alive_is_announced() {
    let written = run_server(
        b"GET /a HTTP/1.0\r\nConnection: keep-alive\r\n\r\n\
          GET /b HTTP/1.0\r\nConnection: keep-alive\r\n\r\n",
        &Config::new(),
        |_req: Message, resp: Responder| -> HandlerFuture {
            let mut writer = resp.start_response("200 OK",
                &[("Content-Length", "2")]).unwrap();
            writer.write(b"ok").unwrap();
            writer.end().unwrap();
            Box::new(ok(()))
        });
    assert!(written.contains("Connection: keep-alive\r\n"));
    // both pipelined 1.0 requests got served
    assert_eq!(written.matches("HTTP/1.0 200 OK").count(), 2);
}

#[test]
fn head_response_body_is_suppressed() {
    let written = run_server(
        b"HEAD /x HTTP/1.1\r\n\r\n",
        &Config::new(),
        |_req: Message, resp: Responder| -> HandlerFuture {
            let mut writer = resp.start_response("200 OK",
                &[("Content-Length", "5")]).unwrap();
            writer.write(b"hello").unwrap();
            writer.end().unwrap();
            Box::new(ok(()))
        });
    assert!(written.contains("Content-Length: 5\r\n"));
    assert!(!written.contains("hello"));
    assert!(written.ends_with("\r\n\r\n"));
}

#[test]
fn streaming_upload_is_readable_from_the_handler() {
    let written = run_server(
        b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
          3\r\nabc\r\n3\r\ndef\r\n0\r\n\r\n",
        &Config::new(),
        |req: Message, resp: Responder| -> HandlerFuture {
            Box::new(req.body.clone().concat2().and_then(move |data| {
                let length = data.len().to_string();
                let mut writer = resp.start_response("200 OK",
                    &[("Content-Length", &length[..])])?;
                writer.write(&data)?;
                writer.end()
            }))
        });
    assert!(written.ends_with("\r\n\r\nabcdef"));
}

#[test]
fn handler_must_start_a_response() {
    let written = run_server(
        b"GET / HTTP/1.1\r\n\r\n",
        &Config::new(),
        |_req: Message, _resp: Responder| -> HandlerFuture {
            Box::new(ok(()))
        });
    assert!(written.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(written.contains("Connection: close\r\n"));
}

#[test]
fn handler_error_yields_an_error_page() {
    let written = run_server(
        b"GET / HTTP/1.1\r\n\r\n",
        &Config::new(),
        |_req: Message, resp: Responder| -> HandlerFuture {
            // hop-by-hop headers may not come from the application
            let err = resp.start_response("200 OK",
                &[("Connection", "close")]).unwrap_err();
            Box::new(futures::future::err(err))
        });
    assert!(written.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
}

#[test]
fn malformed_request_gets_a_400() {
    let written = run_server(
        b"NOT A REQUEST\r\n\r\n",
        &Config::new(),
        |_req: Message, _resp: Responder| -> HandlerFuture {
            unreachable!("the request never parses");
        });
    assert!(written.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}
