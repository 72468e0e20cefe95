//! An in-memory duplex stream for driving a connection in tests.
#![allow(dead_code)]
use std::cell::RefCell;
use std::cmp;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::usize;

use futures::{Async, Poll};
use tokio_io::{AsyncRead, AsyncWrite};


/// Scripted transport: yields `input` to the reader and records
/// everything written into a shared buffer.
pub struct Duplex {
    input: Vec<u8>,
    pos: usize,
    chunk: usize,
    eof: bool,
    out: Rc<RefCell<Vec<u8>>>,
}

impl Duplex {
    /// Input followed by a clean EOF.
    pub fn new(input: &[u8]) -> (Duplex, Rc<RefCell<Vec<u8>>>) {
        Duplex::build(input, usize::MAX, true)
    }
    /// Input followed by an endless would-block (the peer never closes
    /// and never sends more).
    pub fn hanging(input: &[u8]) -> (Duplex, Rc<RefCell<Vec<u8>>>) {
        Duplex::build(input, usize::MAX, false)
    }
    /// Input delivered at most `chunk` bytes per read, then EOF.
    pub fn chunked(input: &[u8], chunk: usize)
        -> (Duplex, Rc<RefCell<Vec<u8>>>)
    {
        Duplex::build(input, chunk, true)
    }
    fn build(input: &[u8], chunk: usize, eof: bool)
        -> (Duplex, Rc<RefCell<Vec<u8>>>)
    {
        let out = Rc::new(RefCell::new(Vec::new()));
        let duplex = Duplex {
            input: input.to_vec(),
            pos: 0,
            chunk: chunk,
            eof: eof,
            out: out.clone(),
        };
        (duplex, out)
    }
}

impl Read for Duplex {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.input.len() {
            let left = self.input.len() - self.pos;
            let n = cmp::min(buf.len(), cmp::min(self.chunk, left));
            buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        } else if self.eof {
            Ok(0)
        } else {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no more input"))
        }
    }
}

impl Write for Duplex {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncRead for Duplex {}

impl AsyncWrite for Duplex {
    fn shutdown(&mut self) -> Poll<(), io::Error> {
        Ok(Async::Ready(()))
    }
}
