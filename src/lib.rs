//! An asynchronous HTTP/1.0 and HTTP/1.1 protocol engine for the
//! tokio-rs stack.
//!
//! The crate provides the wire-level core of a HTTP client and server:
//! an incremental push parser, a symmetrical framing writer and a
//! per-connection protocol state machine with keep-alive, pipelining,
//! chunked transfer coding and trailers. Transport acquisition (TCP
//! listeners, TLS) and request routing are left to the caller.
//!
//! Connections are kept alive by default, so make sure to close them
//! when they are no longer needed. Headers passed in by application
//! code must not be "hop-by-hop" headers; those belong to the engine
//! itself.
#![recursion_limit="100"]

#[macro_use] extern crate futures;
extern crate httparse;
extern crate tokio_core;
extern crate tokio_io;
extern crate tk_bufstream;
extern crate netbuf;
extern crate httpdate;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;

pub mod client;
pub mod server;
pub mod headers;
pub mod parser;
pub mod serializer;
mod body;
mod chunked;
mod config;
mod error;
mod flow;
mod message;
mod queue;
mod version;

pub use body::{Body, Read, ReadLine};
pub use config::Config;
pub use error::{HttpError, ParseError, UsageError};
pub use message::{Message, Trailers};
pub use serializer::{MessageState, HeaderError};
pub use version::Version;
