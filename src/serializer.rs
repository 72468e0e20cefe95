//! Message framing writer shared between the client and server
//! implementation.
//!
//! Note: while we pass the buffer to each method, we expect that the
//! same buffer is passed each time.

use std::io::Write;
#[allow(unused_imports)]
use std::ascii::AsciiExt;

use tk_bufstream::Buf;

use chunked;
use version::Version;


quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum HeaderError {
        DuplicateContentLength {
            description("Content-Length is added twice")
        }
        DuplicateTransferEncoding {
            description("Transfer-Encoding is added twice")
        }
        InvalidHeaderName {
            description("header name contains invalid characters")
        }
        InvalidHeaderValue {
            description("header value contains invalid characters")
        }
        TransferEncodingAfterContentLength {
            description("Transfer-Encoding added when Content-Length is \
                already specified")
        }
        ContentLengthAfterTransferEncoding {
            description("Content-Length added after Transfer-Encoding")
        }
        CantDetermineBodySize {
            description("neither Content-Length nor Transfer-Encoding \
                is present in the headers")
        }
        BodyLengthHeader {
            description("Content-Length and Transfer-Encoding must be set \
                using the specialized methods")
        }
        RequireBodyless {
            description("this message must not contain body length fields")
        }
        BadStatus {
            description("status must start with a numeric code, \
                and 100 is not allowed as a final status")
        }
        BodyDenied {
            description("message must not contain a body")
        }
        TooManyBodyBytes {
            description("more body bytes written than declared \
                Content-Length")
        }
        UnfinishedBody {
            description("fewer body bytes written than declared \
                Content-Length")
        }
        TrailersWithoutChunked {
            description("trailers require the chunked transfer coding")
        }
    }
}

/// Body class of the message while headers are still open.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Body {
    /// Message contains a body.
    Normal,
    /// Message body is swallowed: responses to HEAD requests.
    Head,
    /// Message must not have a body: all 1xx (Informational),
    /// 204 (No Content), and 304 (Not Modified) responses
    Denied,
    /// The message is a request and always contains a body (maybe empty).
    Request,
}

/// State machine writing one request or response to an output buffer
#[derive(Debug)]
pub enum MessageState {
    /// Nothing has been sent.
    RequestStart,
    /// Nothing has been sent.
    ResponseStart { version: Version, body: Body },
    /// Start line is already in the buffer.
    Headers { body: Body },
    /// The message contains a fixed size body.
    FixedHeaders { is_head: bool, content_length: u64 },
    /// The message contains a chunked body.
    ChunkedHeaders { is_head: bool },
    /// The message body runs until the connection closes (HTTP/1.0
    /// responses without a length).
    EofHeaders { is_head: bool },
    /// The message contains no body.
    Bodyless,
    /// The message contains a body with the given number of bytes left.
    FixedBody { is_head: bool, left: u64 },
    /// The message contains a chunked body.
    ChunkedBody { is_head: bool },
    /// The message body is delimited by closing the connection.
    EofBody { is_head: bool },
    /// A message in final state.
    Done,
}

fn invalid_header(value: &[u8]) -> bool {
    value.iter().any(|&x| x == b'\r' || x == b'\n')
}

fn status_denies_body(status: &str) -> Result<bool, HeaderError> {
    let code: u16 = status.split(' ').next().unwrap_or("")
        .parse().map_err(|_| HeaderError::BadStatus)?;
    // 100 (Continue) is not allowed as a final response status.
    if code == 100 {
        return Err(HeaderError::BadStatus);
    }
    Ok((code >= 100 && code < 200) || code == 204 || code == 304)
}

impl MessageState {
    /// Start state for a client request.
    pub fn request_start() -> MessageState {
        MessageState::RequestStart
    }

    /// Start state for a server response.
    ///
    /// `is_head` swallows the body bytes of responses to HEAD requests
    /// while keeping the headers exactly as they would be for GET.
    pub fn response_start(version: Version, is_head: bool) -> MessageState {
        MessageState::ResponseStart {
            version: version,
            body: if is_head { Body::Head } else { Body::Normal },
        }
    }

    /// Write the request line.
    ///
    /// # Panics
    ///
    /// When the request line is already written. It's expected that your
    /// caller state machine will never call the method twice.
    pub fn request_line(&mut self, buf: &mut Buf,
        method: &str, path: &str, version: Version)
    {
        use self::MessageState::*;
        match *self {
            RequestStart => {
                write!(buf, "{} {} {}\r\n", method, path, version).unwrap();
                // All requests may contain a body although it is uncommon
                // for GET and HEAD requests to contain one.
                *self = Headers { body: Body::Request };
            }
            ref state => {
                panic!("called request_line() on a message in state {:?}",
                       state)
            }
        }
    }

    /// Write the status line of a response.
    ///
    /// The status is a pre-composed `"<code> <reason>"` string; only the
    /// leading code is interpreted, to deny bodies on 1xx, 204 and 304.
    ///
    /// # Panics
    ///
    /// When the status line is already written.
    pub fn response_status(&mut self, buf: &mut Buf, status: &str)
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        match *self {
            ResponseStart { version, mut body } => {
                if status_denies_body(status)? {
                    body = Body::Denied;
                }
                write!(buf, "{} {}\r\n", version, status).unwrap();
                *self = Headers { body: body };
                Ok(())
            }
            ref state => {
                panic!("called response_status() on a message in state {:?}",
                       state)
            }
        }
    }

    /// Add a header to the message.
    ///
    /// `Content-Length` must be set using the `add_length` method and
    /// `Transfer-Encoding: chunked` with the `add_chunked` method. These
    /// two headers are important for the security of HTTP.
    ///
    /// # Panics
    ///
    /// Panics when `add_header` is called in the wrong state.
    pub fn add_header(&mut self, buf: &mut Buf, name: &str, value: &[u8])
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        if name.eq_ignore_ascii_case("Content-Length")
            || name.eq_ignore_ascii_case("Transfer-Encoding")
        {
            return Err(HeaderError::BodyLengthHeader);
        }
        match *self {
            Headers { .. } | FixedHeaders { .. } | ChunkedHeaders { .. } |
            EofHeaders { .. } => {
                if invalid_header(name.as_bytes()) {
                    return Err(HeaderError::InvalidHeaderName);
                }
                if invalid_header(value) {
                    return Err(HeaderError::InvalidHeaderValue);
                }
                buf.write_all(name.as_bytes()).unwrap();
                buf.write_all(b": ").unwrap();
                buf.write_all(value).unwrap();
                buf.write_all(b"\r\n").unwrap();
                Ok(())
            }
            ref state => {
                panic!("called add_header() on a message in state {:?}",
                       state)
            }
        }
    }

    /// Add a `Content-Length` header and put the message into fixed-size
    /// body mode. The length is validated while the body is written.
    ///
    /// # Panics
    ///
    /// Panics when `add_length` is called in the wrong state.
    pub fn add_length(&mut self, buf: &mut Buf, n: u64)
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        match *self {
            FixedHeaders { .. } => Err(HeaderError::DuplicateContentLength),
            ChunkedHeaders { .. } => {
                Err(HeaderError::ContentLengthAfterTransferEncoding)
            }
            Headers { body: Body::Denied } => Err(HeaderError::RequireBodyless),
            Headers { body } => {
                write!(buf, "Content-Length: {}\r\n", n).unwrap();
                *self = FixedHeaders {
                    is_head: body == Body::Head,
                    content_length: n,
                };
                Ok(())
            }
            ref state => {
                panic!("called add_length() on a message in state {:?}",
                       state)
            }
        }
    }

    /// Add a `Transfer-Encoding: chunked` header and put the message
    /// into chunked body mode.
    ///
    /// # Panics
    ///
    /// Panics when `add_chunked` is called in the wrong state.
    pub fn add_chunked(&mut self, buf: &mut Buf)
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        match *self {
            FixedHeaders { .. } => {
                Err(HeaderError::TransferEncodingAfterContentLength)
            }
            ChunkedHeaders { .. } => {
                Err(HeaderError::DuplicateTransferEncoding)
            }
            Headers { body: Body::Denied } => Err(HeaderError::RequireBodyless),
            Headers { body } => {
                buf.write_all(b"Transfer-Encoding: chunked\r\n").unwrap();
                *self = ChunkedHeaders { is_head: body == Body::Head };
                Ok(())
            }
            ref state => {
                panic!("called add_chunked() on a message in state {:?}",
                       state)
            }
        }
    }

    /// Put a response into close-delimited body mode: the body runs
    /// until the connection is closed.
    ///
    /// This is how HTTP/1.0 responses without a known length are
    /// written. No header is emitted.
    ///
    /// # Panics
    ///
    /// Panics when called on anything but a response with open headers
    /// and no body mode decided yet.
    pub fn eof_body(&mut self) {
        use self::MessageState::*;
        match *self {
            Headers { body: Body::Normal } => {
                *self = EofHeaders { is_head: false };
            }
            Headers { body: Body::Head } => {
                *self = EofHeaders { is_head: true };
            }
            ref state => {
                panic!("called eof_body() on a message in state {:?}", state)
            }
        }
    }

    /// Closes the HTTP header and returns `true` if an entity body is
    /// expected.
    ///
    /// Specifically `false` is returned when status is 1xx, 204, 304 or
    /// in the response to a HEAD request, but not if the body has
    /// zero length.
    ///
    /// # Panics
    ///
    /// Panics when the message is in the wrong state.
    pub fn done_headers(&mut self, buf: &mut Buf)
        -> Result<bool, HeaderError>
    {
        use self::MessageState::*;
        let expect_body = match *self {
            Headers { body: Body::Denied } => {
                *self = Bodyless;
                false
            }
            Headers { body: Body::Request } => {
                // A request without Content-Length or Transfer-Encoding
                // has a zero-length body.
                *self = FixedBody { is_head: false, left: 0 };
                true
            }
            Headers { .. } => {
                return Err(HeaderError::CantDetermineBodySize);
            }
            FixedHeaders { is_head, content_length } => {
                *self = FixedBody { is_head: is_head, left: content_length };
                !is_head
            }
            ChunkedHeaders { is_head } => {
                *self = ChunkedBody { is_head: is_head };
                !is_head
            }
            EofHeaders { is_head } => {
                *self = EofBody { is_head: is_head };
                !is_head
            }
            ref state => {
                panic!("called done_headers() on a message in state {:?}",
                       state)
            }
        };
        buf.write_all(b"\r\n").unwrap();
        Ok(expect_body)
    }

    /// Write a chunk of the message body.
    ///
    /// Works for fixed-size, chunked and close-delimited bodies. For the
    /// chunked body each fragment is framed individually; empty
    /// fragments are ignored. Responses to HEAD requests swallow the
    /// bytes while keeping the length accounting.
    ///
    /// # Panics
    ///
    /// Panics when the message is in a state where no body can be
    /// written yet (or any more).
    pub fn write_body(&mut self, buf: &mut Buf, data: &[u8])
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        match *self {
            Bodyless => Err(HeaderError::BodyDenied),
            FixedBody { is_head, ref mut left } => {
                if data.len() as u64 > *left {
                    return Err(HeaderError::TooManyBodyBytes);
                }
                if !is_head {
                    buf.write_all(data).unwrap();
                }
                *left -= data.len() as u64;
                Ok(())
            }
            ChunkedBody { is_head } => {
                if !is_head {
                    chunked::write_chunk(buf, data);
                }
                Ok(())
            }
            EofBody { is_head } => {
                if !is_head {
                    buf.write_all(data).unwrap();
                }
                Ok(())
            }
            ref state => {
                panic!("called write_body() on a message in state {:?}",
                       state)
            }
        }
    }

    /// Write the finalization data of the message into the buffer.
    ///
    /// Chunked bodies get their terminating zero chunk here, together
    /// with the optional trailer block. The method may be called
    /// multiple times.
    ///
    /// # Panics
    ///
    /// Panics when the message is in the wrong state.
    pub fn done(&mut self, buf: &mut Buf,
        trailers: Option<&[(String, String)]>)
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        match *self {
            ChunkedBody { is_head: false } => {
                chunked::write_body_end(buf, trailers.unwrap_or(&[]));
                *self = Done;
                Ok(())
            }
            // Responses to HEAD requests drop body and trailers alike.
            FixedBody { is_head: true, .. } |
            ChunkedBody { is_head: true } => {
                *self = Done;
                Ok(())
            }
            Bodyless | FixedBody { left: 0, .. } | EofBody { .. } => {
                if trailers.map_or(false, |t| !t.is_empty()) {
                    return Err(HeaderError::TrailersWithoutChunked);
                }
                *self = Done;
                Ok(())
            }
            FixedBody { .. } => Err(HeaderError::UnfinishedBody),
            Done => Ok(()), // multiple invocations are okay
            ref state => {
                panic!("called done() on a message in state {:?}", state)
            }
        }
    }

    /// Returns true if at least the start line has been written
    ///
    /// This is mostly useful to find out whether we can build an error
    /// page or it's already too late.
    pub fn is_started(&self) -> bool {
        !matches!(*self,
            MessageState::RequestStart |
            MessageState::ResponseStart { .. })
    }

    /// Returns true if the headers are already closed
    pub fn is_after_headers(&self) -> bool {
        use self::MessageState::*;
        matches!(*self, Bodyless | Done |
            FixedBody { .. } | ChunkedBody { .. } | EofBody { .. })
    }

    /// Returns true if `done()` has been called
    pub fn is_complete(&self) -> bool {
        matches!(*self, MessageState::Done)
    }

    /// Returns true if the body uses the chunked transfer coding
    pub fn is_chunked(&self) -> bool {
        use self::MessageState::*;
        matches!(*self, ChunkedHeaders { .. } | ChunkedBody { .. })
    }
}
