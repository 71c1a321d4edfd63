//! Request target normalization.
//!
//! Produces the normalized copy of a parsed [`Uri`] according to the
//! [`PathConfig`] options. The path goes through, in order: percent decoding,
//! UTF-8 best-fit conversion, backslash conversion, lowercasing, separator
//! compression and dot-segment removal. Policies that ask for a status code only
//! record it; the path is still normalized.

use crate::config::{NulHandling, PathConfig, UnwantedHandling, UrlEncodingHandling};
use crate::protocol::Uri;

/// Result of normalizing a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub uri: Uri,
    /// Status a server following the configured policies would answer with.
    pub expected_status: Option<u16>,
    /// Anomalies worth a log record.
    pub warnings: Vec<&'static str>,
}

#[derive(Debug, Default)]
struct Findings {
    expected_status: Option<u16>,
    warnings: Vec<&'static str>,
}

impl Findings {
    fn warn(&mut self, warning: &'static str) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Keeps the first status asked for.
    fn expect(&mut self, status: u16) {
        self.expected_status.get_or_insert(status);
    }

    fn unwanted(&mut self, handling: UnwantedHandling) {
        match handling {
            UnwantedHandling::Ignore => {}
            UnwantedHandling::Status400 => self.expect(400),
            UnwantedHandling::Status404 => self.expect(404),
        }
    }
}

pub fn normalize_uri(parsed: &Uri, config: &PathConfig) -> Normalized {
    let mut findings = Findings::default();
    let mut uri = parsed.clone();

    if let Some(scheme) = &mut uri.scheme {
        scheme.make_ascii_lowercase();
    }
    if let Some(hostname) = &mut uri.hostname {
        hostname.make_ascii_lowercase();
        while hostname.last() == Some(&b'.') {
            hostname.pop();
        }
    }
    if uri.port.is_some() && uri.port_number.is_none() {
        findings.warn("invalid port number");
    }

    if let Some(path) = &parsed.path {
        uri.path = Some(normalize_path(path, config, &mut findings));
    }

    Normalized { uri, expected_status: findings.expected_status, warnings: findings.warnings }
}

fn normalize_path(raw: &[u8], config: &PathConfig, findings: &mut Findings) -> Vec<u8> {
    let mut path = decode_path(raw, config, findings);

    if config.convert_utf8 || config.invalid_utf8_handling != UnwantedHandling::Ignore {
        path = convert_utf8(&path, config, findings);
    }

    if config.backslash_separators {
        for b in path.iter_mut().filter(|b| **b == b'\\') {
            *b = b'/';
        }
    }

    if config.case_insensitive {
        path.make_ascii_lowercase();
    }

    if config.compress_separators {
        path.dedup_by(|b, prev| *b == b'/' && *prev == b'/');
    }

    remove_dot_segments(&path)
}

fn decode_path(raw: &[u8], config: &PathConfig, findings: &mut Findings) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let b = raw[i];
        match b {
            b'%' => {
                let pair = raw.get(i + 1..i + 3);
                let decoded = pair.and_then(|pair| Some(hex_value(pair[0])? << 4 | hex_value(pair[1])?));

                let Some(value) = decoded else {
                    findings.warn("invalid percent encoding");
                    match config.invalid_encoding_handling {
                        UrlEncodingHandling::PreservePercent => out.push(b'%'),
                        UrlEncodingHandling::RemovePercent => {}
                        UrlEncodingHandling::DecodeInvalid => match pair {
                            Some(pair) => {
                                out.push(lenient_hex(pair[0]).wrapping_mul(16).wrapping_add(lenient_hex(pair[1])));
                                i += 3;
                                continue;
                            }
                            None => out.push(b'%'),
                        },
                        UrlEncodingHandling::Status400 => {
                            findings.expect(400);
                            out.push(b'%');
                        }
                    }
                    i += 1;
                    continue;
                };

                if value == 0 {
                    findings.warn("encoded NUL byte in path");
                    match config.nul_encoded_handling {
                        NulHandling::Terminate => break,
                        NulHandling::Status400 => findings.expect(400),
                        NulHandling::Status404 => findings.expect(404),
                        NulHandling::Ignore => {}
                    }
                }

                let separator = value == b'/' || (value == b'\\' && config.backslash_separators);
                if separator && !config.decode_separators {
                    findings.warn("encoded path separator");
                    out.extend_from_slice(&raw[i..i + 3]);
                } else {
                    if value < 0x20 && value != 0 {
                        findings.unwanted(config.control_char_handling);
                    }
                    out.push(value);
                }
                i += 3;
            }
            0 => {
                findings.warn("raw NUL byte in path");
                match config.nul_raw_handling {
                    NulHandling::Terminate => break,
                    NulHandling::Status400 => findings.expect(400),
                    NulHandling::Status404 => findings.expect(404),
                    NulHandling::Ignore => {}
                }
                out.push(b);
                i += 1;
            }
            b if b < 0x20 || b == 0x7f => {
                findings.warn("control character in path");
                findings.unwanted(config.control_char_handling);
                out.push(b);
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// What a careless decoder makes of a character that is not a hex digit.
fn lenient_hex(b: u8) -> u8 {
    if b >= b'A' { ((b & 0xdf).wrapping_sub(b'A')).wrapping_add(10) } else { b.wrapping_sub(b'0') }
}

fn convert_utf8(path: &[u8], config: &PathConfig, findings: &mut Findings) -> Vec<u8> {
    let mut out = Vec::with_capacity(path.len());

    for chunk in path.utf8_chunks() {
        for ch in chunk.valid().chars() {
            if ch.is_ascii() || !config.convert_utf8 {
                let mut buf = [0; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            } else {
                out.push(best_fit(ch));
            }
        }

        if !chunk.invalid().is_empty() {
            findings.warn("invalid UTF-8 in path");
            findings.unwanted(config.invalid_utf8_handling);
            out.extend_from_slice(chunk.invalid());
        }
    }

    out
}

/// Maps a non-ASCII character to the single byte a Windows server would see.
fn best_fit(ch: char) -> u8 {
    match ch as u32 {
        // fullwidth forms of the printable ASCII range
        cp @ 0xff01..=0xff5e => (cp - 0xfee0) as u8,
        0x2215 | 0x2044 => b'/',
        0x2216 | 0xfe68 => b'\\',
        0x2024 => b'.',
        _ => b'?',
    }
}

/// RFC 3986 section 5.2.4, on whole segments.
fn remove_dot_segments(path: &[u8]) -> Vec<u8> {
    if path.is_empty() || path == b"*" {
        return path.to_vec();
    }

    let absolute = path.starts_with(b"/");
    let body = if absolute { &path[1..] } else { path };

    let mut segments: Vec<&[u8]> = Vec::new();
    let mut trailing_slash = false;
    for segment in body.split(|b| *b == b'/') {
        match segment {
            b"." => trailing_slash = true,
            b".." => {
                segments.pop();
                trailing_slash = true;
            }
            segment => {
                segments.push(segment);
                trailing_slash = false;
            }
        }
    }

    let mut out = Vec::with_capacity(path.len());
    if absolute {
        out.push(b'/');
    }
    out.extend_from_slice(&segments.join(&b'/'));
    if trailing_slash && !segments.is_empty() {
        out.push(b'/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Personality};

    fn path_with(config: &PathConfig, raw: &str) -> (String, Option<u16>) {
        let normalized = normalize_uri(&Uri::parse(raw.as_bytes()), config);
        let path = normalized.uri.path.unwrap_or_default();
        (String::from_utf8_lossy(&path).into_owned(), normalized.expected_status)
    }

    fn path(raw: &str) -> String {
        path_with(&PathConfig::default(), raw).0
    }

    #[test]
    fn dot_segments() {
        assert_eq!(path("/a/./b/../c"), "/a/c");
        assert_eq!(path("/a/b/.."), "/a/");
        assert_eq!(path("/../../x"), "/x");
        assert_eq!(path("/a/."), "/a/");
        assert_eq!(path("/.."), "/");
        assert_eq!(path("*"), "*");
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(path("/a%20b/%41"), "/a b/A");
        assert_eq!(path("/a/%2e%2e/b"), "/b");
        // separators stay encoded unless asked otherwise
        assert_eq!(path("/a%2fb"), "/a%2fb");

        let decode = PathConfig { decode_separators: true, ..PathConfig::default() };
        assert_eq!(path_with(&decode, "/a%2fb").0, "/a/b");
    }

    #[test]
    fn invalid_encoding_policies() {
        let mut config = PathConfig::default();
        assert_eq!(path_with(&config, "/a%zz").0, "/a%zz");

        config.invalid_encoding_handling = UrlEncodingHandling::RemovePercent;
        assert_eq!(path_with(&config, "/a%zz").0, "/azz");

        config.invalid_encoding_handling = UrlEncodingHandling::DecodeInvalid;
        assert_eq!(path_with(&config, "/a%1g").0, "/a ");

        config.invalid_encoding_handling = UrlEncodingHandling::Status400;
        assert_eq!(path_with(&config, "/a%zz"), ("/a%zz".to_string(), Some(400)));
        assert_eq!(path_with(&config, "/a%"), ("/a%".to_string(), Some(400)));
    }

    #[test]
    fn nul_policies() {
        let mut config = PathConfig { nul_encoded_handling: NulHandling::Terminate, ..PathConfig::default() };
        assert_eq!(path_with(&config, "/a%00b"), ("/a".to_string(), None));

        config.nul_encoded_handling = NulHandling::Status404;
        assert_eq!(path_with(&config, "/a%00b").1, Some(404));
    }

    #[test]
    fn iis_personality() {
        let config = Config::builder().personality(Personality::Iis60).build();
        let (path, status) = path_with(config.path(), "/A\\B//C/%EF%BC%8Fd");
        assert_eq!(path, "/a/b/c/d");
        assert_eq!(status, None);
    }

    #[test]
    fn apache_personality() {
        let config = Config::builder().personality(Personality::Apache22).build();
        assert_eq!(path_with(config.path(), "/a//b/./c").0, "/a/b/c");
        assert_eq!(path_with(config.path(), "/a%zz").1, Some(400));
    }

    #[test]
    fn invalid_utf8() {
        let config = PathConfig { invalid_utf8_handling: UnwantedHandling::Status400, ..PathConfig::default() };
        assert_eq!(path_with(&config, "/a%ff").1, Some(400));
        assert_eq!(path_with(&config, "/caf%C3%A9").1, None);
    }

    #[test]
    fn raw_invalid_utf8() {
        let config = PathConfig { invalid_utf8_handling: UnwantedHandling::Status404, ..PathConfig::default() };
        let normalized = normalize_uri(&Uri::parse(b"/a\xffb"), &config);
        assert_eq!(normalized.expected_status, Some(404));
        assert_eq!(normalized.uri.path.as_deref(), Some(&b"/a\xffb"[..]));

        let ignored = normalize_uri(&Uri::parse(b"/a\xffb"), &PathConfig::default());
        assert_eq!(ignored.expected_status, None);
    }

    #[test]
    fn authority_is_lowercased() {
        let normalized = normalize_uri(&Uri::parse(b"HTTP://Example.COM.:8080/x?Q=1"), &PathConfig::default());
        assert_eq!(normalized.uri.scheme.as_deref(), Some(&b"http"[..]));
        assert_eq!(normalized.uri.hostname.as_deref(), Some(&b"example.com"[..]));
        assert_eq!(normalized.uri.port_number, Some(8080));
        assert_eq!(normalized.uri.query.as_deref(), Some(&b"Q=1"[..]));
        assert!(normalized.warnings.is_empty());
    }
}
