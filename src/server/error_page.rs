//! Minimal HTML error page, used when a handler fails before anything
//! of the response has been written.
use tk_bufstream::Buf;

use serializer::MessageState;
use version::Version;


const PART1: &'static str = "\
    <!DOCTYPE html>\
    <html>\
        <head>\
            <title>";
const PART2: &'static str = "</title>\
        </head>\
        <body>\
            <h1>";
const PART3: &'static str = concat!("</h1>\
            <hr>\
            <p>Yours faithfully,<br>\
                tk-h1/", env!("CARGO_PKG_VERSION"), "\
            </p>\
        </body>\
    </html>");

/// Write a complete error response into the output buffer.
///
/// The page always closes the connection, so the body length does not
/// have to be exact, but we keep it correct anyway.
pub fn write_error_page(buf: &mut Buf, version: Version, is_head: bool,
    code: u16, reason: &str)
{
    let status = format!("{} {}", code, reason);
    let content_length = PART1.len() + PART2.len() + PART3.len()
        + 2 * status.len();
    let mut state = MessageState::response_start(version, is_head);
    state.response_status(buf, &status)
        .expect("status of an error page is valid");
    state.add_length(buf, content_length as u64).unwrap();
    state.add_header(buf, "Content-Type", b"text/html").unwrap();
    state.add_header(buf, "Connection", b"close").unwrap();
    state.done_headers(buf).unwrap();
    state.write_body(buf, PART1.as_bytes()).unwrap();
    state.write_body(buf, status.as_bytes()).unwrap();
    state.write_body(buf, PART2.as_bytes()).unwrap();
    state.write_body(buf, status.as_bytes()).unwrap();
    state.write_body(buf, PART3.as_bytes()).unwrap();
    state.done(buf, None).unwrap();
}

#[cfg(test)]
mod test {
    use tk_bufstream::Buf;

    use version::Version;
    use super::write_error_page;

    #[test]
    fn page_shape() {
        let mut buf = Buf::new();
        write_error_page(&mut buf, Version::Http11, false,
            500, "Internal Server Error");
        let text = String::from_utf8_lossy(&buf[..]).to_string();
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("<h1>500 Internal Server Error</h1>"));
    }

    #[test]
    fn head_variant_has_no_body() {
        let mut buf = Buf::new();
        write_error_page(&mut buf, Version::Http11, true, 500, "oops");
        let text = String::from_utf8_lossy(&buf[..]).to_string();
        assert!(text.ends_with("\r\n\r\n"));
    }
}
