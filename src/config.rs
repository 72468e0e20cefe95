use std::sync::Arc;
use std::time::Duration;

use version::Version;


/// Fine-grained configuration of a HTTP connection
///
/// The same configuration type is shared by the client and the server
/// side of the engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) max_header_size: usize,
    pub(crate) max_buffer_size: usize,
    pub(crate) max_pipeline_size: usize,
    pub(crate) version: Version,
    pub(crate) server_name: Option<String>,
    pub(crate) identifier: String,
    pub(crate) timeout: Option<Duration>,
}

impl Config {
    /// Create a config with defaults
    pub fn new() -> Config {
        Config {
            max_header_size: 65536,
            max_buffer_size: 65536,
            max_pipeline_size: 10,
            version: Version::Http11,
            server_name: None,
            identifier: concat!("tk-h1/", env!("CARGO_PKG_VERSION"))
                .to_string(),
            timeout: None,
        }
    }
    /// Maximum number of bytes the parser accumulates for a message head
    ///
    /// The limit also covers trailer fields of a chunked body. Exceeding
    /// it is a fatal parse error.
    pub fn max_header_size(&mut self, value: usize) -> &mut Self {
        self.max_header_size = value;
        self
    }
    /// Maximum number of body bytes buffered before the transport reader
    /// is paused
    pub fn max_buffer_size(&mut self, value: usize) -> &mut Self {
        self.max_buffer_size = value;
        self
    }
    /// Number of parsed messages that may sit in the pipeline queue
    /// before the transport reader is paused
    pub fn max_pipeline_size(&mut self, value: usize) -> &mut Self {
        self.max_pipeline_size = value;
        self
    }
    /// HTTP version used for outgoing client requests
    ///
    /// The server always answers in the version of the request.
    pub fn version(&mut self, value: Version) -> &mut Self {
        self.version = value;
        self
    }
    /// Host name used for the `Host` header of HTTP/1.1 requests
    pub fn server_name<S: Into<String>>(&mut self, value: S) -> &mut Self {
        self.server_name = Some(value.into());
        self
    }
    /// String identifying this software in `User-Agent` and `Server`
    pub fn identifier<S: Into<String>>(&mut self, value: S) -> &mut Self {
        self.identifier = value.into();
        self
    }
    /// Default timeout for `get_response`
    ///
    /// `None` (the default) waits forever.
    pub fn timeout(&mut self, value: Option<Duration>) -> &mut Self {
        self.timeout = value;
        self
    }
    /// Create a Arc'd config clone to pass to the constructor
    ///
    /// This is just a convenience method.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }
}
