//! The HTTP/1.x server protocol implementation
//!
//! `Proto` drives one connection: it parses requests, invokes the
//! handler once per message in arrival order and writes the responses
//! strictly sequentially, which is what keeps pipelining correct.
mod error_page;
mod proto;

pub use self::proto::Proto;

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
#[allow(unused_imports)]
use std::ascii::AsciiExt;

use futures::Future;
use futures::task::Task;
use tk_bufstream::Buf;

use config::Config;
use error::{HttpError, UsageError};
use headers::{is_hop_by_hop, DateCache};
use message::Message;
use serializer::{MessageState, HeaderError};
use version::Version;


/// Addresses of the underlying transport, handed to the handler
/// through `Responder::conn_info`.
#[derive(Debug, Clone, Default)]
pub struct ConnInfo {
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
}

impl ConnInfo {
    pub fn new(local_addr: Option<SocketAddr>, peer_addr: Option<SocketAddr>)
        -> ConnInfo
    {
        ConnInfo { local_addr: local_addr, peer_addr: peer_addr }
    }
}

/// The application callback of the server
///
/// Invoked once per parsed request, as soon as the request headers are
/// complete; the body may still be streaming in while the handler runs.
/// Closures of the right shape implement it.
pub trait Handler {
    type Future: Future<Item=(), Error=HttpError>;
    fn call(&mut self, request: Message, response: Responder)
        -> Self::Future;
}

impl<F, R> Handler for F
    where F: FnMut(Message, Responder) -> R,
          R: Future<Item=(), Error=HttpError>
{
    type Future = R;
    fn call(&mut self, request: Message, response: Responder) -> R {
        self(request, response)
    }
}

// State shared between the connection future and response writers.
pub(crate) struct Shared {
    pub out: Buf,
    pub conn_task: Option<Task>,
}

impl Shared {
    pub fn notify(&self) {
        if let Some(ref task) = self.conn_task {
            task.notify();
        }
    }
}

// What the connection future needs to know about the response the
// handler is producing.
pub(crate) struct ResponseCtl {
    pub started: bool,
    pub ended: bool,
    pub close: bool,
}

impl ResponseCtl {
    pub fn new() -> ResponseCtl {
        ResponseCtl { started: false, ended: false, close: false }
    }
}

/// Entry point for writing one response
///
/// Handed to the handler along with the request message; call
/// `start_response` to turn it into a `ResponseWriter`.
pub struct Responder {
    shared: Arc<Mutex<Shared>>,
    ctl: Arc<Mutex<ResponseCtl>>,
    version: Version,
    request_keep_alive: bool,
    is_head: bool,
    config: Arc<Config>,
    date: Arc<Mutex<DateCache>>,
    info: ConnInfo,
}

impl Responder {
    pub(crate) fn new(shared: Arc<Mutex<Shared>>,
        ctl: Arc<Mutex<ResponseCtl>>, version: Version,
        request_keep_alive: bool, is_head: bool, config: Arc<Config>,
        date: Arc<Mutex<DateCache>>, info: ConnInfo)
        -> Responder
    {
        Responder {
            shared: shared,
            ctl: ctl,
            version: version,
            request_keep_alive: request_keep_alive,
            is_head: is_head,
            config: config,
            date: date,
            info: info,
        }
    }

    /// Addresses of the connection this request arrived on.
    pub fn conn_info(&self) -> &ConnInfo {
        &self.info
    }

    /// Write the status line and headers, choosing the body framing.
    ///
    /// The status is a pre-composed `"<code> <reason>"` line. Framing:
    /// an application `Content-Length` makes the body fixed-size,
    /// otherwise HTTP/1.1 uses chunked and HTTP/1.0 falls back to
    /// closing the connection after the body. Hop-by-hop headers are
    /// refused; `Server` and `Date` are synthesized when absent, and a
    /// `Connection` header is emitted whenever the resulting keep-alive
    /// disposition differs from the version default.
    pub fn start_response(self, status: &str, headers: &[(&str, &str)])
        -> Result<ResponseWriter, HttpError>
    {
        let code: u16 = status.split(' ').next().unwrap_or("")
            .parse().map_err(|_| HeaderError::BadStatus)?;
        let bodyless = (code >= 100 && code < 200)
            || code == 204 || code == 304;
        let mut content_length = None::<u64>;
        let mut has_server = false;
        let mut has_date = false;
        for &(name, value) in headers {
            if is_hop_by_hop(name) {
                return Err(UsageError::HopByHop(name.to_string()).into());
            }
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(value.trim().parse()
                    .map_err(|_| UsageError::InvalidContentLength)?);
            } else if name.eq_ignore_ascii_case("Server") {
                has_server = true;
            } else if name.eq_ignore_ascii_case("Date") {
                has_date = true;
            }
        }
        let chunked = !bodyless && content_length.is_none()
            && self.version == Version::Http11;
        // The client may also have asked to close the connection.
        let keep_alive = self.request_keep_alive
            && (bodyless || chunked || content_length.is_some());
        let date = self.date.lock().unwrap().now();
        let mut state = MessageState::response_start(self.version,
            self.is_head);
        let mut shared = self.shared.lock().unwrap();
        {
            let buf = &mut shared.out;
            state.response_status(buf, status)?;
            for &(name, value) in headers {
                if name.eq_ignore_ascii_case("Content-Length") {
                    continue;
                }
                state.add_header(buf, name, value.as_bytes())?;
            }
            if !has_server {
                state.add_header(buf, "Server",
                    self.config.identifier.as_bytes())?;
            }
            if !has_date {
                state.add_header(buf, "Date", date.as_bytes())?;
            }
            // The default on HTTP/1.1 is keep-alive, on 1.0 close.
            if self.version == Version::Http11 && !keep_alive {
                state.add_header(buf, "Connection", b"close")?;
            } else if self.version == Version::Http10 && keep_alive {
                state.add_header(buf, "Connection", b"keep-alive")?;
            }
            if bodyless {
                // self-delimiting, nothing to add
            } else if chunked {
                state.add_chunked(buf)?;
            } else if let Some(length) = content_length {
                state.add_length(buf, length)?;
            } else {
                state.eof_body();
            }
            state.done_headers(buf)?;
        }
        {
            let mut ctl = self.ctl.lock().unwrap();
            ctl.started = true;
            ctl.close = !keep_alive;
        }
        shared.notify();
        Ok(ResponseWriter {
            shared: self.shared.clone(),
            ctl: self.ctl.clone(),
            state: state,
            trailers: None,
        })
    }
}

/// Writer of one response body
pub struct ResponseWriter {
    shared: Arc<Mutex<Shared>>,
    ctl: Arc<Mutex<ResponseCtl>>,
    state: MessageState,
    trailers: Option<Vec<(String, String)>>,
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("trailers", &self.trailers)
            .finish()
    }
}

impl ResponseWriter {
    /// Write a fragment of the response body.
    pub fn write(&mut self, data: &[u8]) -> Result<(), HttpError> {
        if data.len() == 0 {
            return Ok(());
        }
        let mut shared = self.shared.lock().unwrap();
        self.state.write_body(&mut shared.out, data)
            .map_err(|err| match err {
                HeaderError::TooManyBodyBytes => {
                    UsageError::TooManyBodyBytes.into()
                }
                err => HttpError::from(err),
            })?;
        shared.notify();
        Ok(())
    }

    /// Side channel for trailers, written by `end` after the chunked
    /// body terminator.
    pub fn set_trailers(&mut self, trailers: Vec<(String, String)>) {
        self.trailers = Some(trailers);
    }

    /// Finish the response.
    pub fn end(mut self) -> Result<(), HttpError> {
        let trailers = self.trailers.take();
        if trailers.as_ref().map_or(false, |t| !t.is_empty())
            && !self.state.is_chunked()
        {
            return Err(UsageError::TrailersRequireChunked.into());
        }
        {
            let mut shared = self.shared.lock().unwrap();
            self.state.done(&mut shared.out,
                trailers.as_ref().map(|t| &t[..]))?;
        }
        self.ctl.lock().unwrap().ended = true;
        self.shared.lock().unwrap().notify();
        Ok(())
    }
}
