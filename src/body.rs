//! The message body stream.
//!
//! The parser owns the feed side and writes into a bounded buffer; the
//! message owner holds the read side. Crossing the buffer watermark
//! pauses the transport reader, draining below it resumes reading.
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::usize;

use futures::{Async, Future, Poll, Stream};
use futures::task::{self, Task};
use netbuf::Buf;

use error::HttpError;
use flow::FlowControl;


struct Inner {
    data: Buf,
    limit: usize,
    eof: bool,
    error: Option<HttpError>,
    flow: FlowControl,
    holding: bool,
    abandoned: bool,
    readers: usize,
    task: Option<Task>,
}

/// Read side of a message body
///
/// Yields the buffered bytes as a `futures::Stream`; `read` and
/// `read_line` give bounded and line-oriented reads. All handles share
/// one buffer; when the last one is dropped the buffer is discarded and
/// the transport is resumed.
pub struct Body {
    inner: Arc<Mutex<Inner>>,
}

/// Feed side of a message body, retained by the connection.
pub(crate) struct BodyFeed {
    inner: Arc<Mutex<Inner>>,
}

pub(crate) fn pair(limit: usize, flow: &FlowControl) -> (BodyFeed, Body) {
    let inner = Arc::new(Mutex::new(Inner {
        data: Buf::new(),
        limit: limit,
        eof: false,
        error: None,
        flow: flow.clone(),
        holding: false,
        abandoned: false,
        readers: 1,
        task: None,
    }));
    (BodyFeed { inner: inner.clone() }, Body { inner: inner })
}

fn wake_reader(inner: &mut Inner) {
    if let Some(ref task) = inner.task {
        task.notify();
    }
}

impl BodyFeed {
    /// Append bytes to the buffer, pausing the transport when the
    /// watermark is crossed.
    pub fn feed(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        if inner.abandoned {
            return;
        }
        inner.data.write_all(data).unwrap();
        if inner.data.len() >= inner.limit && !inner.holding {
            inner.holding = true;
            inner.flow.pause();
        }
        wake_reader(&mut inner);
    }
    /// Mark the end of the body. Reads return the remaining bytes and
    /// then end-of-stream.
    pub fn feed_eof(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.eof = true;
        wake_reader(&mut inner);
    }
    /// Poison the body. Every subsequent read fails with the error.
    pub fn feed_error(&self, err: HttpError) {
        let mut inner = self.inner.lock().unwrap();
        if inner.error.is_none() {
            inner.error = Some(err);
        }
        wake_reader(&mut inner);
    }
    /// Whether `feed_eof` has been called.
    pub fn is_eof(&self) -> bool {
        self.inner.lock().unwrap().eof
    }
}

fn release(inner: &mut MutexGuard<Inner>, took: bool) {
    if took && inner.holding && inner.data.len() < inner.limit {
        inner.holding = false;
        inner.flow.resume();
    }
}

impl Body {
    /// Whether the feed side has delivered the whole body.
    ///
    /// This is about arrival, not consumption: buffered bytes may still
    /// be waiting to be read.
    pub fn is_at_eof(&self) -> bool {
        self.inner.lock().unwrap().eof
    }

    /// Poll for the next slice of body data, at most `max` bytes.
    ///
    /// `Ready(None)` is the end of the body.
    pub fn poll_data(&mut self, max: usize)
        -> Poll<Option<Vec<u8>>, HttpError>
    {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ref err) = inner.error {
            return Err(err.clone());
        }
        if inner.data.len() > 0 {
            let take = if max < inner.data.len() { max }
                       else { inner.data.len() };
            let out = inner.data[..take].to_vec();
            inner.data.consume(take);
            release(&mut inner, true);
            return Ok(Async::Ready(Some(out)));
        }
        if inner.eof {
            return Ok(Async::Ready(None));
        }
        inner.task = Some(task::current());
        Ok(Async::NotReady)
    }

    fn poll_line(&mut self) -> Poll<Option<Vec<u8>>, HttpError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ref err) = inner.error {
            return Err(err.clone());
        }
        let newline = inner.data[..].iter().position(|&b| b == b'\n');
        match newline {
            Some(pos) => {
                let out = inner.data[..pos + 1].to_vec();
                inner.data.consume(pos + 1);
                release(&mut inner, true);
                Ok(Async::Ready(Some(out)))
            }
            None if inner.eof => {
                if inner.data.len() > 0 {
                    let len = inner.data.len();
                    let out = inner.data[..].to_vec();
                    inner.data.consume(len);
                    release(&mut inner, true);
                    Ok(Async::Ready(Some(out)))
                } else {
                    Ok(Async::Ready(None))
                }
            }
            None => {
                inner.task = Some(task::current());
                Ok(Async::NotReady)
            }
        }
    }

    /// A future yielding at most `max` bytes, or `None` at the end of
    /// the body. Resolves to the body handle and the data.
    pub fn read(self, max: usize) -> Read {
        Read { body: Some(self), max: max }
    }

    /// A future yielding one line including the newline, the unfinished
    /// last line at EOF, or `None` at the end of the body.
    ///
    /// A line longer than the buffer watermark can never complete; body
    /// streams are paused above the watermark.
    pub fn read_line(self) -> ReadLine {
        ReadLine { body: Some(self) }
    }
}

impl Clone for Body {
    fn clone(&self) -> Body {
        self.inner.lock().unwrap().readers += 1;
        Body { inner: self.inner.clone() }
    }
}

impl Drop for Body {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.readers -= 1;
        if inner.readers == 0 {
            // Nobody will read this body any more. Unclog the
            // connection so that the next pipelined message can arrive.
            inner.abandoned = true;
            let len = inner.data.len();
            inner.data.consume(len);
            if inner.holding {
                inner.holding = false;
                inner.flow.resume();
            }
        }
    }
}

/// Iterating over the body yields the buffered bytes chunk by chunk.
impl Stream for Body {
    type Item = Vec<u8>;
    type Error = HttpError;
    fn poll(&mut self) -> Poll<Option<Vec<u8>>, HttpError> {
        self.poll_data(usize::MAX)
    }
}

/// Future returned by `Body::read`
pub struct Read {
    body: Option<Body>,
    max: usize,
}

impl Future for Read {
    type Item = (Body, Option<Vec<u8>>);
    type Error = HttpError;
    fn poll(&mut self) -> Poll<Self::Item, HttpError> {
        let chunk = {
            let body = self.body.as_mut().expect("future is polled twice");
            try_ready!(body.poll_data(self.max))
        };
        Ok(Async::Ready((self.body.take().unwrap(), chunk)))
    }
}

/// Future returned by `Body::read_line`
pub struct ReadLine {
    body: Option<Body>,
}

impl Future for ReadLine {
    type Item = (Body, Option<Vec<u8>>);
    type Error = HttpError;
    fn poll(&mut self) -> Poll<Self::Item, HttpError> {
        let line = {
            let body = self.body.as_mut().expect("future is polled twice");
            try_ready!(body.poll_line())
        };
        Ok(Async::Ready((self.body.take().unwrap(), line)))
    }
}
