use std::fmt;
use std::str::FromStr;

/// Enum representing the HTTP version of a message.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum Version {
    /// Version 1.0 of the HTTP protocol
    Http10,
    /// Version 1.1 of the HTTP protocol
    Http11,
}

impl Version {
    /// The version as a `(major, minor)` tuple.
    pub fn tuple(&self) -> (u8, u8) {
        match *self {
            Version::Http10 => (1, 0),
            Version::Http11 => (1, 1),
        }
    }
    /// The short form used in configuration, `"1.0"` or `"1.1"`.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Version::Http10 => "1.0",
            Version::Http11 => "1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Version::Http10 => f.write_str("HTTP/1.0"),
            Version::Http11 => f.write_str("HTTP/1.1"),
        }
    }
}

impl FromStr for Version {
    type Err = ();
    fn from_str(s: &str) -> Result<Version, ()> {
        match s {
            "1.0" => Ok(Version::Http10),
            "1.1" => Ok(Version::Http11),
            _ => Err(()),
        }
    }
}
