//! The HTTP/1.x client protocol implementation
//!
//! A connection is created from any `AsyncRead + AsyncWrite` transport;
//! the protocol future is spawned on the reactor and the `HttpClient`
//! handle talks to it. Requests may be pipelined freely; responses come
//! back in request order through `get_response`.
mod proto;

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
#[allow(unused_imports)]
use std::ascii::AsciiExt;

use futures::{Async, Future, Poll};
use futures::task::Task;
use tk_bufstream::Buf;
use tokio_core::net::TcpStream;
use tokio_core::reactor::{Handle, Timeout};
use tokio_io::{AsyncRead, AsyncWrite};

use body::Body;
use config::Config;
use error::{HttpError, UsageError};
use headers::is_hop_by_hop;
use message::{Message, Trailers};
use queue::Queue;
use flow::FlowControl;
use serializer::{MessageState, HeaderError};
use version::Version;

use self::proto::Proto;


// State shared between the client handle and the connection future.
pub(crate) struct Shared {
    pub out: Buf,
    pub conn_task: Option<Task>,
    pub connected: bool,
    pub closing: bool,
    pub error: Option<HttpError>,
    pub prev_body: Option<Body>,
}

impl Shared {
    pub fn notify(&self) {
        if let Some(ref task) = self.conn_task {
            task.notify();
        }
    }
}

enum BodyHint {
    Buffered(u64),
    Streaming,
    Manual,
}

enum Framing {
    Fixed(u64),
    Chunked,
    Empty,
}

/// Handle to one client connection
///
/// The handle is cheap to clone; all clones drive the same connection.
#[derive(Clone)]
pub struct HttpClient {
    shared: Arc<Mutex<Shared>>,
    queue: Queue,
    log: Arc<Mutex<VecDeque<String>>>,
    config: Arc<Config>,
    handle: Handle,
}

impl HttpClient {
    /// Wrap an established connection.
    ///
    /// The protocol future is spawned on `handle` and lives until the
    /// connection is closed by either side or fails.
    pub fn new<S>(conn: S, handle: &Handle, config: &Arc<Config>)
        -> HttpClient
        where S: AsyncRead + AsyncWrite + 'static
    {
        let flow = FlowControl::new();
        let queue = Queue::new(config.max_pipeline_size, &flow);
        let log = Arc::new(Mutex::new(VecDeque::new()));
        let shared = Arc::new(Mutex::new(Shared {
            out: Buf::new(),
            conn_task: None,
            connected: true,
            closing: false,
            error: None,
            prev_body: None,
        }));
        handle.spawn(Proto::new(conn, &shared, &queue, &log, &flow, config));
        HttpClient {
            shared: shared,
            queue: queue,
            log: log,
            config: config.clone(),
            handle: handle.clone(),
        }
    }

    /// A convenience method to establish a TCP connection and create a
    /// client on top of it.
    ///
    /// When the config carries no `server_name` the `Host` header is
    /// derived from the address, leaving out the default port.
    pub fn connect_tcp(addr: SocketAddr, config: &Arc<Config>,
        handle: &Handle)
        -> Box<Future<Item=HttpClient, Error=HttpError>>
    {
        let mut config = config.clone();
        if config.server_name.is_none() {
            let mut updated = (*config).clone();
            updated.server_name = Some(if addr.port() == 80 {
                format!("{}", addr.ip())
            } else {
                format!("{}", addr)
            });
            config = Arc::new(updated);
        }
        let handle = handle.clone();
        Box::new(
            TcpStream::connect(&addr, &handle)
            .map_err(HttpError::from)
            .map(move |conn| HttpClient::new(conn, &handle, &config)))
            as Box<Future<Item=_, Error=_>>
    }

    /// Make a request with an in-memory body.
    ///
    /// A `Content-Length` header is synthesized for non-empty bodies
    /// unless one is already supplied. Requests may be pipelined: every
    /// `request` must be paired with exactly one `get_response`, in
    /// order.
    pub fn request(&self, method: &str, url: &str,
        headers: &[(&str, &str)], body: &[u8])
        -> Result<(), HttpError>
    {
        let mut request = self.begin(method, url, headers,
            BodyHint::Buffered(body.len() as u64))?;
        request.write(body)?;
        request.end_request(None)
    }

    /// Make a request streaming the body with the chunked transfer
    /// coding. Requires HTTP/1.1 unless a `Content-Length` header is
    /// supplied.
    pub fn request_chunked<I>(&self, method: &str, url: &str,
        headers: &[(&str, &str)], body: I)
        -> Result<(), HttpError>
        where I: IntoIterator, I::Item: AsRef<[u8]>
    {
        let mut request = self.begin(method, url, headers,
            BodyHint::Streaming)?;
        for chunk in body {
            request.write(chunk.as_ref())?;
        }
        request.end_request(None)
    }

    /// Start a request and write the body yourself.
    ///
    /// This is the interface for sending trailers: finish with
    /// `HttpRequest::end_request`.
    pub fn start_request(&self, method: &str, url: &str,
        headers: &[(&str, &str)])
        -> Result<HttpRequest, HttpError>
    {
        self.begin(method, url, headers, BodyHint::Manual)
    }

    /// Wait for the next pipelined response, with the configured
    /// default timeout.
    pub fn get_response(&self) -> GetResponse {
        self.get_response_within(self.config.timeout)
    }

    /// Wait for the next pipelined response.
    ///
    /// An elapsed timeout fails the call with `HttpError::Timeout` but
    /// leaves the connection and the response queue untouched.
    pub fn get_response_within(&self, timeout: Option<Duration>)
        -> GetResponse
    {
        GetResponse {
            shared: self.shared.clone(),
            queue: self.queue.clone(),
            log: self.log.clone(),
            timeout: timeout.map(|timeout| {
                Timeout::new(timeout, &self.handle)
                    .expect("can always create a timeout")
            }),
        }
    }

    /// Close the connection once buffered requests are flushed.
    pub fn close(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.closing = true;
        shared.notify();
    }

    fn begin(&self, method: &str, url: &str, headers: &[(&str, &str)],
        hint: BodyHint)
        -> Result<HttpRequest, HttpError>
    {
        {
            let shared = self.shared.lock().unwrap();
            if let Some(ref err) = shared.error {
                return Err(err.clone());
            }
            if !shared.connected || shared.closing {
                return Err(HttpError::NotConnected);
            }
        }
        let version = self.config.version;
        let mut content_length = None::<u64>;
        let mut has_host = false;
        let mut has_agent = false;
        for &(name, value) in headers {
            if is_hop_by_hop(name) {
                return Err(UsageError::HopByHop(name.to_string()).into());
            }
            if name.bytes().any(|b| b == b'\r' || b == b'\n') {
                return Err(HeaderError::InvalidHeaderName.into());
            }
            if value.bytes().any(|b| b == b'\r' || b == b'\n') {
                return Err(HeaderError::InvalidHeaderValue.into());
            }
            if name.eq_ignore_ascii_case("Host") {
                has_host = true;
            } else if name.eq_ignore_ascii_case("User-Agent") {
                has_agent = true;
            } else if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(value.trim().parse()
                    .map_err(|_| UsageError::InvalidContentLength)?);
            }
        }
        let framing = match hint {
            BodyHint::Buffered(len) => {
                match content_length {
                    Some(n) => Framing::Fixed(n),
                    None if len > 0 => Framing::Fixed(len),
                    None => Framing::Empty,
                }
            }
            BodyHint::Streaming | BodyHint::Manual => {
                match content_length {
                    Some(n) => Framing::Fixed(n),
                    None if version == Version::Http11 => Framing::Chunked,
                    None => return Err(UsageError::LengthRequired.into()),
                }
            }
        };
        // The method goes into the outstanding log before the request
        // is written: the parser needs it to suppress the body of
        // responses to HEAD.
        self.log.lock().unwrap().push_back(method.to_string());
        let mut state = MessageState::request_start();
        let mut shared = self.shared.lock().unwrap();
        {
            let buf = &mut shared.out;
            state.request_line(buf, method, url, version);
            for &(name, value) in headers {
                if name.eq_ignore_ascii_case("Content-Length") {
                    continue;
                }
                state.add_header(buf, name, value.as_bytes())?;
            }
            // The Host header is mandatory in 1.1, add it if missing.
            if !has_host && version == Version::Http11 {
                if let Some(ref name) = self.config.server_name {
                    state.add_header(buf, "Host", name.as_bytes())?;
                }
            }
            if !has_agent {
                state.add_header(buf, "User-Agent",
                    self.config.identifier.as_bytes())?;
            }
            if version == Version::Http10 {
                // 1.0 closes by default, ask for keep-alive explicitly
                state.add_header(buf, "Connection", b"keep-alive")?;
            }
            match framing {
                Framing::Fixed(n) => {
                    state.add_length(buf, n)?;
                }
                Framing::Chunked => {
                    state.add_header(buf, "TE", b"trailers")?;
                    state.add_chunked(buf)?;
                }
                Framing::Empty => {}
            }
            state.done_headers(buf)?;
        }
        shared.notify();
        Ok(HttpRequest {
            shared: self.shared.clone(),
            state: state,
        })
    }
}

/// An in-progress request whose body is written by the caller
///
/// Returned by `HttpClient::start_request`.
pub struct HttpRequest {
    shared: Arc<Mutex<Shared>>,
    state: MessageState,
}

impl HttpRequest {
    /// Write a fragment of the request body.
    pub fn write(&mut self, data: &[u8]) -> Result<(), HttpError> {
        if data.len() == 0 {
            return Ok(());
        }
        let mut shared = self.shared.lock().unwrap();
        if let Some(ref err) = shared.error {
            return Err(err.clone());
        }
        if !shared.connected {
            return Err(HttpError::NotConnected);
        }
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

    /// End the request body.
    ///
    /// Trailers require the chunked transfer coding.
    pub fn end_request(mut self, trailers: Option<&[(&str, &str)]>)
        -> Result<(), HttpError>
    {
        if trailers.map_or(false, |t| !t.is_empty())
            && !self.state.is_chunked()
        {
            return Err(UsageError::TrailersRequireChunked.into());
        }
        let owned = trailers.map(|trailers| {
            trailers.iter()
                .map(|&(n, v)| (n.to_string(), v.to_string()))
                .collect::<Vec<_>>()
        });
        let mut shared = self.shared.lock().unwrap();
        self.state.done(&mut shared.out, owned.as_ref().map(|t| &t[..]))?;
        shared.notify();
        Ok(())
    }
}

/// A received response
pub struct HttpResponse {
    message: Message,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("version", &self.version())
            .field("status", &self.status())
            .field("headers", &self.headers())
            .finish()
    }
}

impl HttpResponse {
    /// The HTTP version of the response.
    pub fn version(&self) -> Version {
        self.message.version
    }
    /// The status code.
    pub fn status(&self) -> u16 {
        self.message.status_code.unwrap_or(0)
    }
    /// The response headers, in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.message.headers
    }
    /// The response trailers.
    ///
    /// Only complete after the whole body has been received; most
    /// servers do not generate trailers.
    pub fn trailers(&self) -> Trailers {
        self.message.trailers.clone()
    }
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.message.get_header(name)
    }
    pub fn get_trailer(&self, name: &str) -> Option<String> {
        self.message.get_trailer(name)
    }
    /// A handle on the streaming response body.
    pub fn body(&self) -> Body {
        self.message.body.clone()
    }
    pub fn into_message(self) -> Message {
        self.message
    }
}

/// Future returned by `HttpClient::get_response`
pub struct GetResponse {
    shared: Arc<Mutex<Shared>>,
    queue: Queue,
    log: Arc<Mutex<VecDeque<String>>>,
    timeout: Option<Timeout>,
}

impl Future for GetResponse {
    type Item = HttpResponse;
    type Error = HttpError;
    fn poll(&mut self) -> Poll<HttpResponse, HttpError> {
        {
            let shared = self.shared.lock().unwrap();
            // a fatal connection error is sticky
            if let Some(ref err) = shared.error {
                return Err(err.clone());
            }
            if let Some(ref prev) = shared.prev_body {
                if !prev.is_at_eof() {
                    return Err(UsageError::BodyUnread.into());
                }
            }
        }
        match self.queue.poll_pop() {
            Async::Ready(Ok(message)) => {
                let mut shared = self.shared.lock().unwrap();
                shared.prev_body = Some(message.body.clone());
                Ok(Async::Ready(HttpResponse { message: message }))
            }
            Async::Ready(Err(err)) => Err(err),
            Async::NotReady => {
                if self.log.lock().unwrap().is_empty()
                    && self.queue.is_empty()
                {
                    return Err(UsageError::NoRequestPending.into());
                }
                if let Some(ref mut timeout) = self.timeout {
                    if timeout.poll()?.is_ready() {
                        return Err(HttpError::Timeout);
                    }
                }
                Ok(Async::NotReady)
            }
        }
    }
}
