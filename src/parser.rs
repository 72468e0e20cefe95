//! The incremental, push-fed HTTP/1.x message parser.
//!
//! The parser is fed arbitrary byte chunks and reports the structure of
//! the stream through the `MessageSink` trait. Only the message head
//! (and trailer block) is ever buffered, bounded by `max_header_size`;
//! body bytes are handed to the sink straight out of the input slice.
use std::cmp;
use std::io::Write;
use std::str::from_utf8;
#[allow(unused_imports)]
use std::ascii::AsciiExt;

use httparse;
use tk_bufstream::Buf;

use error::ParseError;
use headers::has_token;
use version::Version;


/// Number of headers to allocate on a stack
const MIN_HEADERS: usize = 16;
/// A hard limit on the number of headers
const MAX_HEADERS: usize = 1024;
/// A chunk size line (hex size plus extensions) longer than this is
/// nonsense.
const MAX_CHUNK_LINE: usize = 1024;


/// Which side of the conversation the parser reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Request,
    Response,
}

/// Framing of the message body, per the RFC 2616 rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Fixed(u64),
    Chunked,
    Eof,
}

/// Return value of `MessageSink::headers_complete`.
///
/// `SkipBody` tells the parser that no body follows even though the
/// headers announce one; the client sink returns it for responses to
/// HEAD requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnHeaders {
    Proceed,
    SkipBody,
}

/// Everything the parser knows about a message when its header block
/// ends.
#[derive(Debug)]
pub struct Head<'a> {
    pub version: Version,
    pub method: Option<&'a str>,
    pub code: Option<u16>,
    pub reason: Option<&'a str>,
    pub body: BodyKind,
    pub keep_alive: bool,
    pub upgrade: bool,
}

/// Receiver of parse events, in message order
///
/// For each message: `message_begin`, `url` (requests), a
/// `header_field`/`header_value` pair per header, `headers_complete`,
/// `body` fragments, more field/value pairs for trailers, and finally
/// `message_complete`. Sink methods never suspend; they only buffer and
/// enqueue.
pub trait MessageSink {
    fn message_begin(&mut self);
    fn url(&mut self, chunk: &[u8]);
    fn header_field(&mut self, chunk: &[u8]);
    fn header_value(&mut self, chunk: &[u8]);
    fn headers_complete(&mut self, head: &Head) -> OnHeaders;
    fn body(&mut self, chunk: &[u8]);
    fn message_complete(&mut self);
}

#[derive(Debug, Clone)]
enum State {
    Head,
    FixedBody { left: u64 },
    EofBody,
    ChunkSize,
    ChunkData { left: u64 },
    ChunkCrlf { got_cr: bool },
    Trailers,
    /// An upgraded connection speaks another protocol from here on;
    /// the parser refuses to consume the bytes.
    Upgrade,
    Closed,
}

struct HeadScan {
    body: BodyKind,
    keep_alive: bool,
    upgrade: bool,
}

enum HeadResult {
    Partial,
    Done { n: usize, state: State, completed: bool, upgrade: bool },
}

pub struct Parser {
    kind: Kind,
    state: State,
    buf: Buf,
    header_bytes: usize,
    max_header_size: usize,
    upgrade: bool,
}

impl Parser {
    pub fn new(kind: Kind, max_header_size: usize) -> Parser {
        Parser {
            kind: kind,
            state: State::Head,
            buf: Buf::new(),
            header_bytes: 0,
            max_header_size: max_header_size,
            upgrade: false,
        }
    }

    /// True once an upgrade message went through: the bytes that
    /// follow belong to another protocol and are left unconsumed.
    pub fn is_upgraded(&self) -> bool {
        matches!(self.state, State::Upgrade)
    }

    /// True between messages: the next byte starts a new message head.
    pub fn is_between_messages(&self) -> bool {
        match self.state {
            State::Head => self.buf.len() == 0,
            State::Closed => true,
            _ => false,
        }
    }

    /// Consume bytes from `data`, reporting events to `sink`.
    ///
    /// Returns the number of bytes consumed. The call returns early at
    /// every `message_complete` so the connection can apply
    /// backpressure between pipelined messages, and consumes nothing
    /// after a protocol upgrade.
    pub fn feed<S: MessageSink>(&mut self, data: &[u8], sink: &mut S)
        -> Result<usize, ParseError>
    {
        let mut consumed = 0;
        loop {
            let rest_len = data.len() - consumed;
            match self.state {
                State::Head => {
                    if rest_len == 0 {
                        return Ok(consumed);
                    }
                    self.buf.write_all(&data[consumed..]).unwrap();
                    let result = parse_head(self.kind, &self.buf[..], sink,
                        &mut self.header_bytes, self.max_header_size)?;
                    match result {
                        HeadResult::Partial => {
                            if self.buf.len() > self.max_header_size {
                                return Err(ParseError::HeaderTooLarge);
                            }
                            return Ok(consumed + rest_len);
                        }
                        HeadResult::Done { n, state, completed, upgrade } => {
                            let leftover = self.buf.len() - n;
                            consumed += rest_len - leftover;
                            let buffered = self.buf.len();
                            self.buf.consume(buffered);
                            self.upgrade = upgrade;
                            self.state = state;
                            if completed {
                                self.header_bytes = 0;
                                return Ok(consumed);
                            }
                        }
                    }
                }
                State::FixedBody { left } => {
                    if rest_len == 0 {
                        return Ok(consumed);
                    }
                    let take = if left < rest_len as u64 { left as usize }
                               else { rest_len };
                    sink.body(&data[consumed..consumed + take]);
                    consumed += take;
                    if take as u64 == left {
                        sink.message_complete();
                        self.end_message();
                        return Ok(consumed);
                    }
                    self.state = State::FixedBody { left: left - take as u64 };
                    return Ok(consumed);
                }
                State::EofBody => {
                    if rest_len == 0 {
                        return Ok(consumed);
                    }
                    sink.body(&data[consumed..]);
                    return Ok(data.len());
                }
                State::ChunkSize => {
                    if rest_len == 0 {
                        return Ok(consumed);
                    }
                    // buffer at most a size line worth of bytes; chunk
                    // data following it in the same read stays in
                    // `data` and is accounted through `consumed`
                    let old = self.buf.len();
                    let take = cmp::min(MAX_CHUNK_LINE - old, rest_len);
                    self.buf.write_all(
                        &data[consumed..consumed + take]).unwrap();
                    match httparse::parse_chunk_size(&self.buf[..]) {
                        Ok(httparse::Status::Complete((n, size))) => {
                            consumed += n - old;
                            let buffered = self.buf.len();
                            self.buf.consume(buffered);
                            if size == 0 {
                                self.state = State::Trailers;
                            } else {
                                self.state = State::ChunkData { left: size };
                            }
                        }
                        Ok(httparse::Status::Partial) => {
                            if self.buf.len() >= MAX_CHUNK_LINE {
                                return Err(ParseError::BadChunkSize);
                            }
                            return Ok(consumed + take);
                        }
                        Err(_) => return Err(ParseError::BadChunkSize),
                    }
                }
                State::ChunkData { left } => {
                    if rest_len == 0 {
                        return Ok(consumed);
                    }
                    let take = if left < rest_len as u64 { left as usize }
                               else { rest_len };
                    sink.body(&data[consumed..consumed + take]);
                    consumed += take;
                    if take as u64 == left {
                        self.state = State::ChunkCrlf { got_cr: false };
                    } else {
                        self.state = State::ChunkData {
                            left: left - take as u64,
                        };
                    }
                }
                State::ChunkCrlf { got_cr } => {
                    if rest_len == 0 {
                        return Ok(consumed);
                    }
                    let byte = data[consumed];
                    if !got_cr {
                        if byte != b'\r' {
                            return Err(ParseError::BadChunkTerminator);
                        }
                        consumed += 1;
                        self.state = State::ChunkCrlf { got_cr: true };
                    } else {
                        if byte != b'\n' {
                            return Err(ParseError::BadChunkTerminator);
                        }
                        consumed += 1;
                        self.state = State::ChunkSize;
                    }
                }
                State::Trailers => {
                    if rest_len == 0 {
                        return Ok(consumed);
                    }
                    // the trailer block shares the header size budget;
                    // never buffer past it (a pipelined message that
                    // follows in the same read stays in `data`)
                    let old = self.buf.len();
                    let space = self.max_header_size
                        .saturating_sub(self.header_bytes)
                        .saturating_sub(old);
                    let take = cmp::min(space, rest_len);
                    self.buf.write_all(
                        &data[consumed..consumed + take]).unwrap();
                    if self.buf.len() >= 2
                        && &self.buf[..2] == &b"\r\n"[..]
                    {
                        // no trailers
                        consumed += 2 - old;
                        let buffered = self.buf.len();
                        self.buf.consume(buffered);
                        sink.message_complete();
                        self.end_message();
                        return Ok(consumed);
                    }
                    let end = match find_block_end(&self.buf[..]) {
                        Some(end) => end,
                        None => {
                            if take < rest_len {
                                return Err(ParseError::HeaderTooLarge);
                            }
                            return Ok(consumed + take);
                        }
                    };
                    parse_trailers(&self.buf[..end], sink,
                        &mut self.header_bytes, self.max_header_size)?;
                    consumed += end - old;
                    let buffered = self.buf.len();
                    self.buf.consume(buffered);
                    sink.message_complete();
                    self.end_message();
                    return Ok(consumed);
                }
                State::Upgrade | State::Closed => {
                    return Ok(consumed);
                }
            }
        }
    }

    /// Signal the end of the byte stream.
    ///
    /// A close between messages, or at the end of a close-delimited
    /// response body, is a clean end; anywhere else the message was
    /// truncated.
    pub fn feed_eof<S: MessageSink>(&mut self, sink: &mut S)
        -> Result<(), ParseError>
    {
        match self.state {
            State::Head => {
                if self.buf.len() == 0 {
                    self.state = State::Closed;
                    Ok(())
                } else {
                    Err(ParseError::Truncated)
                }
            }
            State::EofBody => {
                sink.message_complete();
                self.header_bytes = 0;
                self.state = State::Closed;
                Ok(())
            }
            State::Upgrade | State::Closed => Ok(()),
            _ => Err(ParseError::Truncated),
        }
    }

    fn end_message(&mut self) {
        self.header_bytes = 0;
        self.state = if self.upgrade { State::Upgrade } else { State::Head };
    }
}

fn parse_version(version: Option<u8>) -> Version {
    // For HTTP/1.x httparse only reports the minor version.
    if version == Some(1) { Version::Http11 } else { Version::Http10 }
}

fn find_block_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

/// Implements the message body length and connection-disposition rules:
/// http://httpwg.github.io/specs/rfc7230.html#message.body.length
///
/// 1. Responses to HEAD (decided by the sink), 1xx, 204, 304: no body
/// 2. If the last transfer coding is chunked: chunked
/// 3. If Content-Length: fixed
/// 4. Responses otherwise read until the connection closes
/// 5. Requests otherwise have no body
fn scan_headers(kind: Kind, code: Option<u16>, version: Version,
    headers: &[httparse::Header])
    -> Result<HeadScan, ParseError>
{
    let mut content_length = None::<u64>;
    let mut chunked = false;
    let mut close = false;
    let mut keep_alive_token = false;
    let mut upgrade_token = false;
    let mut upgrade_header = false;
    for header in headers {
        if header.name.eq_ignore_ascii_case("Transfer-Encoding") {
            if let Some(enc) = header.value.split(|&x| x == b',').last() {
                if has_token(enc, "chunked") {
                    chunked = true;
                }
            }
        } else if header.name.eq_ignore_ascii_case("Content-Length") {
            if content_length.is_some() {
                return Err(ParseError::DuplicateContentLength);
            }
            let text = from_utf8(header.value)
                .map_err(|_| ParseError::BadContentLength)?;
            let value = text.trim().parse()
                .map_err(|_| ParseError::BadContentLength)?;
            content_length = Some(value);
        } else if header.name.eq_ignore_ascii_case("Connection") {
            if has_token(header.value, "close") {
                close = true;
            }
            if has_token(header.value, "keep-alive") {
                keep_alive_token = true;
            }
            if has_token(header.value, "upgrade") {
                upgrade_token = true;
            }
        } else if header.name.eq_ignore_ascii_case("Upgrade") {
            upgrade_header = true;
        }
    }
    let body = match kind {
        Kind::Request => {
            if chunked {
                BodyKind::Chunked
            } else {
                BodyKind::Fixed(content_length.unwrap_or(0))
            }
        }
        Kind::Response => {
            let code = code.unwrap_or(0);
            if (code >= 100 && code < 200) || code == 204 || code == 304 {
                BodyKind::Fixed(0)
            } else if chunked {
                BodyKind::Chunked
            } else if let Some(value) = content_length {
                BodyKind::Fixed(value)
            } else {
                BodyKind::Eof
            }
        }
    };
    let mut keep_alive = match version {
        Version::Http11 => !close,
        Version::Http10 => keep_alive_token && !close,
    };
    if body == BodyKind::Eof {
        // A close-delimited body can't be followed by another message.
        keep_alive = false;
    }
    if chunked && content_length.is_some() {
        // The transfer coding wins, but the mismatch makes the length
        // accounting of the connection untrustworthy.
        keep_alive = false;
    }
    Ok(HeadScan {
        body: body,
        keep_alive: keep_alive,
        upgrade: upgrade_token && upgrade_header,
    })
}

fn account(header_bytes: &mut usize, max_header_size: usize, extra: usize,
    headers: &[httparse::Header])
    -> Result<(), ParseError>
{
    let mut size = extra;
    for header in headers {
        size += header.name.len() + header.value.len();
    }
    *header_bytes += size;
    if *header_bytes > max_header_size {
        return Err(ParseError::HeaderTooLarge);
    }
    Ok(())
}

fn emit_headers<S: MessageSink>(sink: &mut S, headers: &[httparse::Header]) {
    for header in headers {
        sink.header_field(header.name.as_bytes());
        sink.header_value(header.value);
    }
}

fn finish_head<S: MessageSink>(n: usize, scan: HeadScan, decision: OnHeaders,
    sink: &mut S)
    -> HeadResult
{
    let body = match decision {
        OnHeaders::SkipBody => BodyKind::Fixed(0),
        OnHeaders::Proceed => scan.body,
    };
    match body {
        BodyKind::Fixed(0) => {
            sink.message_complete();
            let state = if scan.upgrade { State::Upgrade } else { State::Head };
            HeadResult::Done {
                n: n, state: state, completed: true, upgrade: scan.upgrade,
            }
        }
        BodyKind::Fixed(left) => HeadResult::Done {
            n: n, state: State::FixedBody { left: left },
            completed: false, upgrade: scan.upgrade,
        },
        BodyKind::Chunked => HeadResult::Done {
            n: n, state: State::ChunkSize,
            completed: false, upgrade: scan.upgrade,
        },
        BodyKind::Eof => HeadResult::Done {
            n: n, state: State::EofBody,
            completed: false, upgrade: scan.upgrade,
        },
    }
}

fn parse_head<S: MessageSink>(kind: Kind, buf: &[u8], sink: &mut S,
    header_bytes: &mut usize, max_header_size: usize)
    -> Result<HeadResult, ParseError>
{
    let mut vec;
    let mut headers = [httparse::EMPTY_HEADER; MIN_HEADERS];
    match kind {
        Kind::Request => {
            let mut raw = httparse::Request::new(&mut headers);
            let mut result = raw.parse(buf);
            if matches!(result, Err(httparse::Error::TooManyHeaders)) {
                vec = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
                raw = httparse::Request::new(&mut vec);
                result = raw.parse(buf);
            }
            let n = match result.map_err(ParseError::Header)? {
                httparse::Status::Complete(n) => n,
                httparse::Status::Partial => return Ok(HeadResult::Partial),
            };
            let version = parse_version(raw.version);
            let method = raw.method.unwrap();
            let path = raw.path.unwrap();
            let scan = scan_headers(kind, None, version, raw.headers)?;
            account(header_bytes, max_header_size, path.len(), raw.headers)?;
            sink.message_begin();
            sink.url(path.as_bytes());
            emit_headers(sink, raw.headers);
            let head = Head {
                version: version,
                method: Some(method),
                code: None,
                reason: None,
                body: scan.body,
                keep_alive: scan.keep_alive,
                upgrade: scan.upgrade,
            };
            let decision = sink.headers_complete(&head);
            Ok(finish_head(n, scan, decision, sink))
        }
        Kind::Response => {
            let mut raw = httparse::Response::new(&mut headers);
            let mut result = raw.parse(buf);
            if matches!(result, Err(httparse::Error::TooManyHeaders)) {
                vec = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
                raw = httparse::Response::new(&mut vec);
                result = raw.parse(buf);
            }
            let n = match result.map_err(ParseError::Header)? {
                httparse::Status::Complete(n) => n,
                httparse::Status::Partial => return Ok(HeadResult::Partial),
            };
            let version = parse_version(raw.version);
            let code = raw.code.unwrap();
            let scan = scan_headers(kind, Some(code), version, raw.headers)?;
            account(header_bytes, max_header_size, 0, raw.headers)?;
            sink.message_begin();
            emit_headers(sink, raw.headers);
            let head = Head {
                version: version,
                method: None,
                code: Some(code),
                reason: raw.reason,
                body: scan.body,
                keep_alive: scan.keep_alive,
                upgrade: scan.upgrade,
            };
            let decision = sink.headers_complete(&head);
            Ok(finish_head(n, scan, decision, sink))
        }
    }
}

fn parse_trailers<S: MessageSink>(block: &[u8], sink: &mut S,
    header_bytes: &mut usize, max_header_size: usize)
    -> Result<(), ParseError>
{
    let mut vec;
    let mut headers = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut result = httparse::parse_headers(block, &mut headers);
    if matches!(result, Err(httparse::Error::TooManyHeaders)) {
        vec = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
        result = httparse::parse_headers(block, &mut vec);
    }
    match result.map_err(ParseError::Header)? {
        httparse::Status::Complete((_, trailers)) => {
            account(header_bytes, max_header_size, 0, trailers)?;
            emit_headers(sink, trailers);
            Ok(())
        }
        // the caller hands us a block ending in CRLFCRLF
        httparse::Status::Partial => unreachable!(),
    }
}
