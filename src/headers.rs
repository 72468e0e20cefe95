//! Small codecs for header values shared by the client and the server.
use std::collections::HashMap;
use std::time::{SystemTime, Duration, UNIX_EPOCH};
#[allow(unused_imports)]
use std::ascii::AsciiExt;

use httpdate::fmt_http_date;


/// The "Hop by Hop" headers as defined in RFC 2616.
///
/// These belong to the protocol implementation itself and are refused
/// when application code tries to supply them.
const HOP_BY_HOP: &'static [&'static str] = &[
    "connection", "keep-alive", "proxy-authenticate", "proxy-authorization",
    "te", "trailers", "transfer-encoding", "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Return the first matching field value from a header list.
pub fn get_field<'a>(headers: &'a [(String, String)], name: &str)
    -> Option<&'a str>
{
    headers.iter()
        .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, ref v)| &v[..])
}

// Header values like `Connection` and `Transfer-Encoding` are
// comma-separated lists of case-insensitive tokens with optional
// surrounding whitespace.
pub fn has_token(value: &[u8], token: &str) -> bool {
    value.split(|&b| b == b',').any(|part| {
        let part = trim_lws(part);
        part.len() == token.len() &&
            part.iter().zip(token.as_bytes())
                .all(|(&a, &b)| a.to_ascii_lowercase() == b)
    })
}

fn trim_lws(mut val: &[u8]) -> &[u8] {
    while let Some((&b, rest)) = val.split_first() {
        if b == b' ' || b == b'\t' || b == b'\r' || b == b'\n' {
            val = rest;
        } else {
            break;
        }
    }
    while let Some((&b, rest)) = val.split_last() {
        if b == b' ' || b == b'\t' || b == b'\r' || b == b'\n' {
            val = rest;
        } else {
            break;
        }
    }
    val
}

// RFC 2616 section 2.2 "token" characters.
fn is_token_char(c: char) -> bool {
    match c {
        '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' |
        '^' | '_' | '`' | '|' | '~' => true,
        '0'...'9' | 'a'...'z' | 'A'...'Z' => true,
        _ => false,
    }
}

fn scan_token(s: &str, from: usize) -> Option<usize> {
    let mut end = from;
    for (i, c) in s[from..].char_indices() {
        if !is_token_char(c) {
            break;
        }
        end = from + i + c.len_utf8();
    }
    if end > from { Some(end) } else { None }
}

// RFC 2616 "quoted-string", without LWS or escaped control characters
// (the original engine does not accept those either). Returns the end
// index just past the closing quote and the raw content between the
// quotes, escapes unprocessed.
fn scan_quoted(s: &str, from: usize) -> Option<(usize, &str)> {
    debug_assert!(s[from..].starts_with('"'));
    let body = from + 1;
    let mut iter = s[body..].char_indices();
    while let Some((i, c)) = iter.next() {
        match c {
            '"' => return Some((body + i + 1, &s[body..body + i])),
            '\\' => match iter.next() {
                Some((_, '"')) => {}
                _ => return None,
            },
            ' ' | '!' => {}
            '\u{23}'...'\u{ff}' => {}
            _ => return None,
        }
    }
    None
}

/// Parse a HTTP header with options.
///
/// The header must be of the form `value [; parameters]`. This format is
/// used by headers like `Content-Type` and `Transfer-Encoding`.
///
/// This function never fails. When a parse error occurs, it returns
/// what has been parsed so far.
pub fn parse_option_header(header: &str, sep: char)
    -> (&str, HashMap<String, String>)
{
    let mut options = HashMap::new();
    let p1 = match header.find(sep) {
        Some(p) => p,
        None => return (header, options),
    };
    let mut p2 = p1 + sep.len_utf8();
    loop {
        while p2 < header.len() &&
            header[p2..].starts_with(|c: char| c.is_whitespace())
        {
            p2 += header[p2..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        }
        if p2 >= header.len() {
            break;
        }
        let name_end = match scan_token(header, p2) {
            Some(e) => e,
            None => break,
        };
        let name = &header[p2..name_end];
        p2 = name_end;
        if p2 + 1 >= header.len() || !header[p2..].starts_with('=') {
            break;
        }
        p2 += 1;
        let (value_end, value) = if header[p2..].starts_with('"') {
            match scan_quoted(header, p2) {
                Some((e, v)) => (e, v),
                None => break,
            }
        } else {
            match scan_token(header, p2) {
                Some(e) => (e, &header[p2..e]),
                None => break,
            }
        };
        p2 = value_end;
        options.insert(name.to_string(), value.to_string());
    }
    (&header[..p1], options)
}

/// Create a RFC 1123 style `Date` header value for *timestamp*.
///
/// If *timestamp* is `None`, the current time is used.
pub fn rfc1123_date(timestamp: Option<u64>) -> String {
    let stamp = timestamp.unwrap_or_else(unix_now);
    fmt_http_date(UNIX_EPOCH + Duration::from_secs(stamp))
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs()).unwrap_or(0)
}

/// Single-slot memoization of the rendered date on the integer second.
///
/// Every response carries a `Date` header and rendering one is much more
/// expensive than a comparison, so the connection keeps one of these.
#[derive(Debug)]
pub struct DateCache {
    slot: Option<(u64, String)>,
}

impl DateCache {
    pub fn new() -> DateCache {
        DateCache { slot: None }
    }
    pub fn now(&mut self) -> String {
        let stamp = unix_now();
        if let Some((last, ref value)) = self.slot {
            if last == stamp {
                return value.clone();
            }
        }
        let value = rfc1123_date(Some(stamp));
        self.slot = Some((stamp, value.clone()));
        value
    }
}

#[cfg(test)]
mod test {
    use super::{parse_option_header, get_field, has_token, is_hop_by_hop};
    use super::{rfc1123_date, DateCache};

    fn hdrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter()
            .map(|&(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn plain_value() {
        let (value, params) = parse_option_header("text/html", ';');
        assert_eq!(value, "text/html");
        assert!(params.is_empty());
    }

    #[test]
    fn single_param() {
        let (value, params) =
            parse_option_header("text/html; charset=UTF-8", ';');
        assert_eq!(value, "text/html");
        assert_eq!(params.get("charset").map(|s| &s[..]), Some("UTF-8"));
    }

    #[test]
    fn quoted_param() {
        let (value, params) =
            parse_option_header("form-data; name=\"a b\"; x=1", ';');
        assert_eq!(value, "form-data");
        assert_eq!(params.get("name").map(|s| &s[..]), Some("a b"));
        assert_eq!(params.get("x").map(|s| &s[..]), Some("1"));
    }

    #[test]
    fn malformed_stops_without_error() {
        let (value, params) = parse_option_header("gzip; q", ';');
        assert_eq!(value, "gzip");
        assert!(params.is_empty());
        let (value, params) = parse_option_header("gzip; q=\"unterminated", ';');
        assert_eq!(value, "gzip");
        assert!(params.is_empty());
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let headers = hdrs(&[("Content-Type", "text/plain"),
                             ("X-Dup", "1"), ("x-dup", "2")]);
        assert_eq!(get_field(&headers, "content-type"), Some("text/plain"));
        assert_eq!(get_field(&headers, "X-DUP"), Some("1"));
        assert_eq!(get_field(&headers, "missing"), None);
    }

    #[test]
    fn token_scan() {
        assert!(has_token(b"close", "close"));
        assert!(has_token(b"  Keep-Alive , Upgrade", "upgrade"));
        assert!(has_token(b"gzip, chunked", "chunked"));
        assert!(!has_token(b"chunked2", "chunked"));
        assert!(!has_token(b"xclose", "close"));
    }

    #[test]
    fn hop_by_hop_set() {
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("connection"));
        assert!(is_hop_by_hop("TE"));
        assert!(!is_hop_by_hop("Content-Length"));
    }

    #[test]
    fn date_format() {
        assert_eq!(rfc1123_date(Some(784111777)),
                   "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn date_cache_is_stable_within_a_second() {
        let mut cache = DateCache::new();
        let a = cache.now();
        let b = cache.now();
        assert_eq!(a, b);
    }
}
