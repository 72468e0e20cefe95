//! Writer side of the HTTP/1.1 "chunked" transfer coding.
use std::io::Write;

use tk_bufstream::Buf;


/// Frame one chunk of body data.
///
/// Empty input writes nothing: a zero-length chunk is the body
/// terminator and is emitted by `write_body_end` only.
pub fn write_chunk(buf: &mut Buf, data: &[u8]) {
    if data.len() == 0 {
        return;
    }
    write!(buf, "{:X}\r\n", data.len()).unwrap();
    buf.write_all(data).unwrap();
    buf.write_all(b"\r\n").unwrap();
}

/// Write the ending that terminates a chunked body.
pub fn write_body_end<N, V>(buf: &mut Buf, trailers: &[(N, V)])
    where N: AsRef<str>, V: AsRef<str>
{
    buf.write_all(b"0\r\n").unwrap();
    for &(ref name, ref value) in trailers {
        write!(buf, "{}: {}\r\n", name.as_ref(), value.as_ref()).unwrap();
    }
    buf.write_all(b"\r\n").unwrap();
}
