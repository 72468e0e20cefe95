//! Parsed messages and the assembly glue between parser and queue.
use std::mem;
use std::sync::{Arc, Mutex};

use body::{Body, BodyFeed, pair};
use error::HttpError;
use flow::FlowControl;
use headers::get_field;
use parser::{Head, Kind};
use version::Version;


/// One parsed HTTP request or response
///
/// Requests carry `method`, `url` and `parsed_url`; responses carry
/// `status_code`. Headers keep their wire order and duplicates; lookup
/// is ASCII case-insensitive.
pub struct Message {
    pub version: Version,
    pub method: Option<String>,
    pub url: Option<String>,
    /// `(path, query)` of the request target
    pub parsed_url: Option<(String, String)>,
    pub status_code: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub trailers: Trailers,
    pub is_upgrade: bool,
    pub should_keep_alive: bool,
    pub body: Body,
}

impl Message {
    /// First matching header value, case-insensitive.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        get_field(&self.headers, name)
    }
    /// First matching trailer value, case-insensitive.
    ///
    /// Trailers only exist once the whole body has been received.
    pub fn get_trailer(&self, name: &str) -> Option<String> {
        self.trailers.get(name)
    }
}

/// Trailer fields of a message
///
/// The parser appends to this cell when the trailer block arrives, which
/// is after the message itself has been handed to its consumer, so the
/// storage is shared.
#[derive(Clone)]
pub struct Trailers {
    inner: Arc<Mutex<Vec<(String, String)>>>,
}

impl Trailers {
    fn new() -> Trailers {
        Trailers { inner: Arc::new(Mutex::new(Vec::new())) }
    }
    fn push(&self, name: String, value: String) {
        self.inner.lock().unwrap().push((name, value));
    }
    pub fn get(&self, name: &str) -> Option<String> {
        let fields = self.inner.lock().unwrap();
        get_field(&fields, name).map(|v| v.to_string())
    }
    pub fn to_vec(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().clone()
    }
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

/// Split a request target into path and query.
pub fn split_url(url: &str) -> (String, String) {
    let url = url.split('#').next().unwrap_or("");
    match url.find('?') {
        Some(pos) => (url[..pos].to_string(), url[pos + 1..].to_string()),
        None => (url.to_string(), String::new()),
    }
}

// HTTP headers are ISO-8859-1, whose 256 code points are the first 256
// code points of Unicode.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Assembles `Message` values from parser events.
///
/// Header fragments accumulate until the pair is complete; once a
/// message has a body attached, further fields are routed to its
/// trailers. Used as the core of both connection sinks.
pub struct MessageBuilder {
    kind: Kind,
    max_buffer_size: usize,
    flow: FlowControl,
    url: Vec<u8>,
    field: Vec<u8>,
    value: Vec<u8>,
    has_value: bool,
    headers: Vec<(String, String)>,
    current: Option<Current>,
}

struct Current {
    feed: BodyFeed,
    trailers: Trailers,
}

impl MessageBuilder {
    pub fn new(kind: Kind, max_buffer_size: usize, flow: &FlowControl)
        -> MessageBuilder
    {
        MessageBuilder {
            kind: kind,
            max_buffer_size: max_buffer_size,
            flow: flow.clone(),
            url: Vec::new(),
            field: Vec::new(),
            value: Vec::new(),
            has_value: false,
            headers: Vec::new(),
            current: None,
        }
    }

    pub fn message_begin(&mut self) {
        self.url.clear();
        self.field.clear();
        self.value.clear();
        self.has_value = false;
        self.headers.clear();
        self.current = None;
    }

    pub fn url(&mut self, chunk: &[u8]) {
        self.url.extend_from_slice(chunk);
    }

    pub fn header_field(&mut self, chunk: &[u8]) {
        if self.has_value {
            // a new field finalizes the previous header
            self.flush_header();
        }
        self.field.extend_from_slice(chunk);
    }

    pub fn header_value(&mut self, chunk: &[u8]) {
        self.value.extend_from_slice(chunk);
        self.has_value = true;
    }

    fn flush_header(&mut self) {
        if self.field.is_empty() && !self.has_value {
            return;
        }
        let name = latin1(&self.field);
        let value = latin1(&self.value);
        self.field.clear();
        self.value.clear();
        self.has_value = false;
        match self.current {
            // the message already streams its body: this is a trailer
            Some(ref current) => current.trailers.push(name, value),
            None => self.headers.push((name, value)),
        }
    }

    /// Seal the header block and hand out the assembled message.
    ///
    /// The builder keeps the feed side of the body and the trailer cell
    /// for the events that follow.
    pub fn headers_complete(&mut self, head: &Head) -> Message {
        self.flush_header();
        let (feed, body) = pair(self.max_buffer_size, &self.flow);
        let trailers = Trailers::new();
        let url = match self.kind {
            Kind::Request => Some(latin1(&self.url)),
            Kind::Response => None,
        };
        let message = Message {
            version: head.version,
            method: head.method.map(|m| m.to_string()),
            parsed_url: url.as_ref().map(|u| split_url(u)),
            url: url,
            status_code: head.code,
            headers: mem::replace(&mut self.headers, Vec::new()),
            trailers: trailers.clone(),
            is_upgrade: head.upgrade,
            should_keep_alive: head.keep_alive,
            body: body,
        };
        self.current = Some(Current { feed: feed, trailers: trailers });
        message
    }

    pub fn body(&mut self, chunk: &[u8]) {
        if let Some(ref current) = self.current {
            current.feed.feed(chunk);
        }
    }

    pub fn message_complete(&mut self) {
        self.flush_header();
        if let Some(ref current) = self.current {
            current.feed.feed_eof();
        }
    }

    /// Poison the in-flight body after a fatal connection error.
    pub fn fail(&mut self, err: HttpError) {
        if let Some(ref current) = self.current {
            current.feed.feed_error(err);
        }
    }
}
