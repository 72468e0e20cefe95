use std::io;
use std::sync::Arc;

use httparse;

use serializer::HeaderError;


quick_error! {
    #[derive(Debug, Clone)]
    /// Error produced when the peer sends bytes that don't form a valid
    /// HTTP/1.x message
    pub enum ParseError {
        /// Syntax error reported by the head parser
        Header(err: httparse::Error) {
            description("bad headers")
            display("bad headers: {:?}", err)
            from()
        }
        /// Accumulated header bytes exceeded `max_header_size`
        HeaderTooLarge {
            description("HTTP header too large")
            display("HTTP header too large")
        }
        /// A chunk size line could not be parsed
        BadChunkSize {
            description("invalid chunk size")
        }
        /// Chunk data was not followed by CRLF
        BadChunkTerminator {
            description("chunk data not terminated by CRLF")
        }
        /// `Content-Length` value is not a valid number
        BadContentLength {
            description("bad content length")
        }
        /// Two conflicting `Content-Length` headers
        DuplicateContentLength {
            description("duplicate content length")
        }
        /// Connection was closed in the middle of a message
        Truncated {
            description("connection closed in the middle of a message")
        }
    }
}

quick_error! {
    #[derive(Debug, Clone)]
    /// Error raised synchronously when the caller misuses the engine
    ///
    /// Usage errors never corrupt the connection state; the operation
    /// is simply refused.
    pub enum UsageError {
        /// Application code supplied a header reserved for the protocol
        HopByHop(name: String) {
            description("hop-by-hop header supplied by application")
            display("header {} is hop-by-hop", name)
        }
        /// More body bytes were written than the declared Content-Length
        TooManyBodyBytes {
            description("wrote more body bytes than declared Content-Length")
        }
        /// `get_response` called before the previous body reached EOF
        BodyUnread {
            description("body of previous response not completely read")
        }
        /// `get_response` called with no request outstanding
        NoRequestPending {
            description("there are no outstanding requests")
        }
        /// Trailers were supplied for a non-chunked message
        TrailersRequireChunked {
            description("trailers require chunked encoding")
        }
        /// A body of unknown size was given on a HTTP/1.0 request
        LengthRequired {
            description("HTTP/1.0 requests need a Content-Length \
                when the body size is not known up front")
        }
        /// An application-supplied `Content-Length` is not a number
        InvalidContentLength {
            description("invalid Content-Length header")
        }
        /// Message framing was violated while writing
        Serializer(err: HeaderError) {
            description("message framing violated")
            display("message framing violated: {}", err)
            from()
        }
    }
}

quick_error! {
    #[derive(Debug, Clone)]
    /// Any error surfaced by the HTTP engine
    ///
    /// The enum is `Clone` so that a fatal connection error can be kept
    /// in the last-error slot and re-raised by every subsequent call.
    pub enum HttpError {
        /// The incoming byte stream violated the protocol
        Parse(err: ParseError) {
            description("parse error")
            display("parse error: {}", err)
            from()
        }
        /// The caller misused the engine
        Usage(err: UsageError) {
            description("usage error")
            display("{}", err)
            from()
            from(err: HeaderError) -> (UsageError::Serializer(err))
        }
        /// I/O (basically networking) error on the transport
        Io(err: Arc<io::Error>) {
            description("IO error")
            display("IO error: {}", err)
            from(err: io::Error) -> (Arc::new(err))
        }
        /// Operation on a connection that has no transport
        NotConnected {
            description("not connected")
        }
        /// A queue wait elapsed
        Timeout {
            description("operation timed out")
        }
        /// The server handler finished without starting a response
        Handler {
            description("handler did not call start_response()")
        }
        /// Connection closed normally
        ///
        /// Delivered to queue waiters when the peer goes away between
        /// messages; connection pools should catch this one.
        Closed {
            description("connection closed normally")
        }
    }
}
