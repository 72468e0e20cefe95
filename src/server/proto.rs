//! The server connection future.
use std::io::Write;
use std::sync::{Arc, Mutex};
#[allow(unused_imports)]
use std::ascii::AsciiExt;

use futures::{Async, Future, Poll};
use futures::task;
use tk_bufstream::{Buf, IoBuf, ReadBuf, WriteBuf};
use tokio_io::{AsyncRead, AsyncWrite};

use config::Config;
use error::HttpError;
use flow::FlowControl;
use headers::DateCache;
use message::MessageBuilder;
use parser::{Parser, Kind, MessageSink, Head, OnHeaders};
use queue::Queue;
use version::Version;

use super::error_page::write_error_page;
use super::{Handler, Responder, ResponseCtl, Shared, ConnInfo};


// Parser sink of the server: assembles requests and queues them at
// headers-complete, so a handler can start reading an upload while it
// still arrives.
struct ServerSink {
    builder: MessageBuilder,
    queue: Queue,
}

impl MessageSink for ServerSink {
    fn message_begin(&mut self) {
        self.builder.message_begin();
    }
    fn url(&mut self, chunk: &[u8]) {
        self.builder.url(chunk);
    }
    fn header_field(&mut self, chunk: &[u8]) {
        self.builder.header_field(chunk);
    }
    fn header_value(&mut self, chunk: &[u8]) {
        self.builder.header_value(chunk);
    }
    fn headers_complete(&mut self, head: &Head) -> OnHeaders {
        let message = self.builder.headers_complete(head);
        debug!("request: {} {}",
            message.method.as_ref().map(|m| &m[..]).unwrap_or("-"),
            message.url.as_ref().map(|u| &u[..]).unwrap_or("-"));
        self.queue.push(Ok(message));
        OnHeaders::Proceed
    }
    fn body(&mut self, chunk: &[u8]) {
        self.builder.body(chunk);
    }
    fn message_complete(&mut self) {
        self.builder.message_complete();
    }
}

struct Active<F> {
    future: F,
    ctl: Arc<Mutex<ResponseCtl>>,
    version: Version,
    is_head: bool,
}

/// A low-level HTTP/1.x server protocol handler
///
/// Run the future to serve the connection; it resolves when the
/// connection is fully shut down.
pub struct Proto<S, H: Handler> {
    io_out: WriteBuf<S>,
    io_in: ReadBuf<S>,
    parser: Parser,
    sink: ServerSink,
    queue: Queue,
    flow: FlowControl,
    shared: Arc<Mutex<Shared>>,
    handler: H,
    active: Option<Active<H::Future>>,
    config: Arc<Config>,
    date: Arc<Mutex<DateCache>>,
    info: ConnInfo,
    read_done: bool,
    closing: bool,
}

impl<S: AsyncRead + AsyncWrite, H: Handler> Proto<S, H> {
    /// Create a new protocol instance from an established connection
    /// and a config.
    pub fn new(conn: S, handler: H, config: &Arc<Config>, info: ConnInfo)
        -> Proto<S, H>
    {
        let (io_out, io_in) = IoBuf::new(conn).split();
        let flow = FlowControl::new();
        let queue = Queue::new(config.max_pipeline_size, &flow);
        Proto {
            io_out: io_out,
            io_in: io_in,
            parser: Parser::new(Kind::Request, config.max_header_size),
            sink: ServerSink {
                builder: MessageBuilder::new(Kind::Request,
                    config.max_buffer_size, &flow),
                queue: queue.clone(),
            },
            queue: queue,
            flow: flow,
            shared: Arc::new(Mutex::new(Shared {
                out: Buf::new(),
                conn_task: None,
            })),
            handler: handler,
            active: None,
            config: config.clone(),
            date: Arc::new(Mutex::new(DateCache::new())),
            info: info,
            read_done: false,
            closing: false,
        }
    }

    // A protocol error. Answer with an error page when no response is
    // in flight yet, then close.
    fn protocol_error(&mut self, err: HttpError) {
        debug!("server connection error: {}", err);
        self.sink.builder.fail(err);
        if self.active.is_none() && self.queue.is_empty() {
            let mut shared = self.shared.lock().unwrap();
            write_error_page(&mut shared.out, Version::Http11, false,
                400, "Bad Request");
        }
        self.closing = true;
    }

    fn poll_handler(&mut self) -> bool {
        let mut progress = false;
        let mut finished = None;
        if let Some(ref mut active) = self.active {
            match active.future.poll() {
                Ok(Async::Ready(())) => finished = Some(Ok(())),
                Ok(Async::NotReady) => {}
                Err(err) => finished = Some(Err(err)),
            }
        }
        if let Some(result) = finished {
            let active = self.active.take().unwrap();
            progress = true;
            let (started, ended, close) = {
                let ctl = active.ctl.lock().unwrap();
                (ctl.started, ctl.ended, ctl.close)
            };
            match result {
                Ok(()) => {
                    if !started {
                        debug!("handler error: {}", HttpError::Handler);
                        let mut shared = self.shared.lock().unwrap();
                        write_error_page(&mut shared.out, active.version,
                            active.is_head, 500, "Internal Server Error");
                        self.closing = true;
                    } else if !ended {
                        debug!("handler dropped the response writer");
                        self.closing = true;
                    } else if close {
                        self.closing = true;
                    }
                }
                Err(err) => {
                    debug!("handler error: {}", err);
                    if !started {
                        let mut shared = self.shared.lock().unwrap();
                        write_error_page(&mut shared.out, active.version,
                            active.is_head, 500, "Internal Server Error");
                    }
                    self.closing = true;
                }
            }
        }
        progress
    }

    fn dispatch(&mut self) -> bool {
        if self.active.is_some() || self.closing {
            return false;
        }
        match self.queue.poll_pop() {
            Async::Ready(Ok(message)) => {
                let ctl = Arc::new(Mutex::new(ResponseCtl::new()));
                let version = message.version;
                let is_head = message.method.as_ref()
                    .map_or(false, |m| m.eq_ignore_ascii_case("HEAD"));
                let responder = Responder::new(
                    self.shared.clone(), ctl.clone(), version,
                    message.should_keep_alive, is_head,
                    self.config.clone(), self.date.clone(),
                    self.info.clone());
                let future = self.handler.call(message, responder);
                self.active = Some(Active {
                    future: future,
                    ctl: ctl,
                    version: version,
                    is_head: is_head,
                });
                true
            }
            Async::Ready(Err(_)) => {
                // error sentinels are only pushed by the fatal paths,
                // which already arranged the shutdown
                self.closing = true;
                false
            }
            Async::NotReady => false,
        }
    }

    fn poll_reads(&mut self) -> Result<bool, ()> {
        let mut progress = false;
        if self.read_done || self.closing {
            return Ok(progress);
        }
        loop {
            while self.io_in.in_buf.len() > 0 && !self.flow.is_paused() {
                let res = self.parser.feed(
                    &self.io_in.in_buf[..], &mut self.sink);
                match res {
                    Ok(0) => break,
                    Ok(n) => {
                        self.io_in.in_buf.consume(n);
                        progress = true;
                    }
                    Err(err) => {
                        self.protocol_error(err.into());
                        return Ok(true);
                    }
                }
            }
            if self.flow.is_paused() || self.closing {
                break;
            }
            if self.parser.is_upgraded() {
                self.read_done = true;
                break;
            }
            match self.io_in.read() {
                Ok(0) => {
                    if self.io_in.done() {
                        self.read_done = true;
                        progress = true;
                        if let Err(err) = self.parser.feed_eof(&mut self.sink)
                        {
                            self.protocol_error(err.into());
                        }
                    }
                    break;
                }
                Ok(_) => {
                    progress = true;
                }
                Err(err) => {
                    debug!("server connection error: {}", err);
                    self.sink.builder.fail(err.into());
                    self.closing = true;
                    return Ok(true);
                }
            }
        }
        Ok(progress)
    }
}

impl<S: AsyncRead + AsyncWrite, H: Handler> Future for Proto<S, H> {
    type Item = ();
    type Error = ();
    fn poll(&mut self) -> Poll<(), ()> {
        self.flow.register();
        self.shared.lock().unwrap().conn_task = Some(task::current());
        loop {
            let mut progress = false;
            // writes: move response bytes over and flush
            {
                let mut shared = self.shared.lock().unwrap();
                if shared.out.len() > 0 {
                    self.io_out.out_buf.write_all(&shared.out[..]).unwrap();
                    let staged = shared.out.len();
                    shared.out.consume(staged);
                    progress = true;
                }
            }
            if let Err(err) = self.io_out.flush() {
                debug!("server connection error: {}", err);
                return Ok(Async::Ready(()));
            }
            progress |= self.poll_handler();
            progress |= self.dispatch();
            progress |= self.poll_reads()?;
            let drained = self.io_out.out_buf.len() == 0
                && self.shared.lock().unwrap().out.len() == 0;
            let served = self.active.is_none()
                && (self.closing || self.queue.is_empty());
            if (self.closing || self.read_done) && served && drained {
                // dropping the stream closes the connection
                return Ok(Async::Ready(()));
            }
            if !progress {
                return Ok(Async::NotReady);
            }
        }
    }
}
