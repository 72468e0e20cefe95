//! The client connection future: feeds the parser, drains the output
//! buffer and delivers parsed responses to the pipeline queue.
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
#[allow(unused_imports)]
use std::ascii::AsciiExt;

use futures::{Async, Future, Poll};
use futures::task;
use tk_bufstream::{IoBuf, ReadBuf, WriteBuf};
use tokio_io::{AsyncRead, AsyncWrite};

use config::Config;
use error::HttpError;
use flow::FlowControl;
use message::MessageBuilder;
use parser::{Parser, Kind, MessageSink, Head, OnHeaders};
use queue::Queue;

use super::Shared;


// Parser sink of the client: assembles responses, consults the
// outstanding-request log for HEAD suppression and queues the result.
struct ClientSink {
    builder: MessageBuilder,
    queue: Queue,
    log: Arc<Mutex<VecDeque<String>>>,
}

impl MessageSink for ClientSink {
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
        let is_head = self.log.lock().unwrap().pop_front()
            .map_or(false, |method| method.eq_ignore_ascii_case("HEAD"));
        debug!("response: {} (keep-alive: {})",
            head.code.unwrap_or(0), head.keep_alive);
        let message = self.builder.headers_complete(head);
        self.queue.push(Ok(message));
        if is_head { OnHeaders::SkipBody } else { OnHeaders::Proceed }
    }
    fn body(&mut self, chunk: &[u8]) {
        self.builder.body(chunk);
    }
    fn message_complete(&mut self) {
        self.builder.message_complete();
    }
}

pub(crate) struct Proto<S> {
    io_out: WriteBuf<S>,
    io_in: ReadBuf<S>,
    parser: Parser,
    sink: ClientSink,
    shared: Arc<Mutex<Shared>>,
    queue: Queue,
    flow: FlowControl,
    read_done: bool,
}

impl<S: AsyncRead + AsyncWrite> Proto<S> {
    pub fn new(conn: S, shared: &Arc<Mutex<Shared>>, queue: &Queue,
        log: &Arc<Mutex<VecDeque<String>>>, flow: &FlowControl,
        config: &Arc<Config>)
        -> Proto<S>
    {
        let (io_out, io_in) = IoBuf::new(conn).split();
        Proto {
            io_out: io_out,
            io_in: io_in,
            parser: Parser::new(Kind::Response, config.max_header_size),
            sink: ClientSink {
                builder: MessageBuilder::new(Kind::Response,
                    config.max_buffer_size, flow),
                queue: queue.clone(),
                log: log.clone(),
            },
            shared: shared.clone(),
            queue: queue.clone(),
            flow: flow.clone(),
            read_done: false,
        }
    }

    // A fatal error: store it, poison the in-flight body, wake all
    // waiters and drop the connection.
    fn fatal(&mut self, err: HttpError) -> Poll<(), ()> {
        debug!("client connection error: {}", err);
        self.sink.builder.fail(err.clone());
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.error.is_none() {
                shared.error = Some(err.clone());
            }
            shared.connected = false;
        }
        self.queue.push(Err(err));
        Ok(Async::Ready(()))
    }

    fn finish(&mut self) -> Poll<(), ()> {
        self.shared.lock().unwrap().connected = false;
        Ok(Async::Ready(()))
    }
}

impl<S: AsyncRead + AsyncWrite> Future for Proto<S> {
    type Item = ();
    type Error = ();
    fn poll(&mut self) -> Poll<(), ()> {
        self.flow.register();
        let closing = {
            let mut shared = self.shared.lock().unwrap();
            shared.conn_task = Some(task::current());
            shared.closing
        };
        loop {
            let mut progress = false;
            // writes: move staged request bytes over and flush
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
                return self.fatal(err.into());
            }
            if closing && self.io_out.out_buf.len() == 0 {
                // dropping the stream closes the connection
                return self.finish();
            }
            // reads
            if !self.read_done {
                loop {
                    while self.io_in.in_buf.len() > 0
                        && !self.flow.is_paused()
                    {
                        let res = self.parser.feed(
                            &self.io_in.in_buf[..], &mut self.sink);
                        match res {
                            Ok(0) => break,
                            Ok(n) => {
                                self.io_in.in_buf.consume(n);
                                progress = true;
                            }
                            Err(err) => return self.fatal(err.into()),
                        }
                    }
                    if self.flow.is_paused() {
                        break;
                    }
                    if self.parser.is_upgraded() {
                        // the bytes that follow belong to another
                        // protocol, stop reading them
                        self.read_done = true;
                        break;
                    }
                    match self.io_in.read() {
                        Ok(0) => {
                            if self.io_in.done() {
                                self.read_done = true;
                                match self.parser.feed_eof(&mut self.sink) {
                                    Ok(()) => {
                                        self.shared.lock().unwrap()
                                            .connected = false;
                                        // wake pending response waiters
                                        self.queue.push(
                                            Err(HttpError::Closed));
                                    }
                                    Err(err) => {
                                        return self.fatal(err.into());
                                    }
                                }
                            }
                            break;
                        }
                        Ok(_) => {
                            progress = true;
                        }
                        Err(err) => return self.fatal(err.into()),
                    }
                }
            }
            if self.read_done && self.io_out.out_buf.len() == 0
                && self.shared.lock().unwrap().out.len() == 0
            {
                return self.finish();
            }
            if !progress {
                return Ok(Async::NotReady);
            }
        }
    }
}
