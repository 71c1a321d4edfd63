//! Start line decoding: request lines and status lines.
//!
//! Lines are taken off the buffer up to and including the LF. The returned line
//! carries no terminator; a CR before the LF is dropped too.

use bytes::{Bytes, BytesMut};
use memchr::memchr;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, Protocol};

/// Splits one line off the front of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineDecoder {
    max_line_bytes: usize,
}

impl LineDecoder {
    pub fn new(max_line_bytes: usize) -> Self {
        Self { max_line_bytes }
    }
}

impl Decoder for LineDecoder {
    type Item = Bytes;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match memchr(b'\n', src) {
            Some(lf) => {
                ensure!(lf < self.max_line_bytes, ParseError::too_long_line(lf + 1, self.max_line_bytes));
                let line = src.split_to(lf + 1).freeze();
                let end = if lf > 0 && line[lf - 1] == b'\r' { lf - 1 } else { lf };
                trace!(len = end, "read line");
                Ok(Some(line.slice(..end)))
            }
            None => {
                ensure!(src.len() < self.max_line_bytes, ParseError::too_long_line(src.len(), self.max_line_bytes));
                Ok(None)
            }
        }
    }
}

/// A request line split into its parts. All parts share the line's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub line: Bytes,
    pub method: Bytes,
    pub uri: Bytes,
    /// `None` for an HTTP/0.9 request, which carries no protocol.
    pub protocol: Option<Bytes>,
}

impl RequestLine {
    pub fn parse(line: Bytes) -> Result<Self, ParseError> {
        let (method, rest) = next_token(&line, 0);
        ensure!(!method.is_empty(), ParseError::invalid_request_line("missing method"));
        let (uri, rest) = next_token(&line, rest);
        ensure!(!uri.is_empty(), ParseError::invalid_request_line("missing request target"));

        let protocol_start = skip_whitespace(&line, rest);
        let protocol_end = trimmed_end(&line).max(protocol_start);
        let protocol = (protocol_start < protocol_end).then(|| line.slice(protocol_start..protocol_end));

        Ok(Self { method: line.slice(method), uri: line.slice(uri), protocol, line })
    }

    pub fn protocol_version(&self) -> Protocol {
        match &self.protocol {
            Some(protocol) => Protocol::parse(protocol),
            None => Protocol::Http09,
        }
    }
}

/// A status line split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub line: Bytes,
    pub protocol: Bytes,
    pub status: Bytes,
    pub status_number: u16,
    pub message: Bytes,
}

impl StatusLine {
    pub fn parse(line: Bytes) -> Result<Self, ParseError> {
        let (protocol, rest) = next_token(&line, 0);
        ensure!(
            line[protocol.clone()].len() >= 5 && line[protocol.start..protocol.start + 5].eq_ignore_ascii_case(b"HTTP/"),
            ParseError::invalid_status_line("missing protocol")
        );

        let (status, rest) = next_token(&line, rest);
        let status_number = parse_status(&line[status.clone()])
            .ok_or_else(|| ParseError::invalid_status_line(format!("bad status code {:?}", String::from_utf8_lossy(&line[status.clone()]))))?;

        let message_start = skip_whitespace(&line, rest);
        Ok(Self {
            protocol: line.slice(protocol),
            status: line.slice(status),
            status_number,
            message: line.slice(message_start..trimmed_end(&line).max(message_start)),
            line,
        })
    }

    pub fn protocol_version(&self) -> Protocol {
        Protocol::parse(&self.protocol)
    }

    /// Interim responses, except 101 which ends HTTP on the connection.
    pub fn is_interim(&self) -> bool {
        (100..200).contains(&self.status_number) && self.status_number != 101
    }
}

fn trimmed_end(line: &[u8]) -> usize {
    line.len() - line.iter().rev().take_while(|b| b.is_ascii_whitespace()).count()
}

fn skip_whitespace(line: &[u8], from: usize) -> usize {
    from + line[from..].iter().take_while(|b| b.is_ascii_whitespace()).count()
}

/// Returns the range of the next whitespace-delimited token and the offset right after it.
fn next_token(line: &[u8], from: usize) -> (std::ops::Range<usize>, usize) {
    let start = skip_whitespace(line, from);
    let end = start + line[start..].iter().take_while(|b| !b.is_ascii_whitespace()).count();
    (start..end, end)
}

fn parse_status(status: &[u8]) -> Option<u16> {
    if status.len() != 3 || !status.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let number = status.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));
    (100..=999).contains(&number).then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_without_cr() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.0\nHost: a\r\n"[..]);
        let mut decoder = LineDecoder::new(64);
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), &b"GET / HTTP/1.0"[..]);
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), &b"Host: a"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn partial_line_waits() {
        let mut buf = BytesMut::from(&b"GET /ind"[..]);
        assert!(LineDecoder::new(64).decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn overlong_line() {
        let mut buf = BytesMut::from(&b"GET /aaaaaaaaaaaaaaaa"[..]);
        let result = LineDecoder::new(16).decode(&mut buf);
        assert!(matches!(result, Err(ParseError::TooLongLine { .. })));
    }

    #[test]
    fn request_line_parts() {
        let line = RequestLine::parse(Bytes::from_static(b"GET /a?x=1 HTTP/1.1")).unwrap();
        assert_eq!(line.method, &b"GET"[..]);
        assert_eq!(line.uri, &b"/a?x=1"[..]);
        assert_eq!(line.protocol.as_deref(), Some(&b"HTTP/1.1"[..]));
        assert_eq!(line.protocol_version(), Protocol::Http11);
    }

    #[test]
    fn request_line_without_protocol() {
        let line = RequestLine::parse(Bytes::from_static(b"GET /legacy")).unwrap();
        assert_eq!(line.protocol, None);
        assert_eq!(line.protocol_version(), Protocol::Http09);
    }

    #[test]
    fn request_line_without_target() {
        assert!(RequestLine::parse(Bytes::from_static(b"GET")).is_err());
        assert!(RequestLine::parse(Bytes::from_static(b"   ")).is_err());
    }

    #[test]
    fn unknown_protocol_is_kept() {
        let line = RequestLine::parse(Bytes::from_static(b"GET / SPDY/3  ")).unwrap();
        assert_eq!(line.protocol.as_deref(), Some(&b"SPDY/3"[..]));
        assert_eq!(line.protocol_version(), Protocol::Unknown);
    }

    #[test]
    fn status_line_parts() {
        let line = StatusLine::parse(Bytes::from_static(b"HTTP/1.1 404 Not Found ")).unwrap();
        assert_eq!(line.protocol_version(), Protocol::Http11);
        assert_eq!(line.status, &b"404"[..]);
        assert_eq!(line.status_number, 404);
        assert_eq!(line.message, &b"Not Found"[..]);
        assert!(!line.is_interim());

        let line = StatusLine::parse(Bytes::from_static(b"HTTP/1.1 100")).unwrap();
        assert!(line.is_interim());
        assert!(line.message.is_empty());
    }

    #[test]
    fn bad_status_lines() {
        assert!(StatusLine::parse(Bytes::from_static(b"<html>")).is_err());
        assert!(StatusLine::parse(Bytes::from_static(b"HTTP/1.1 2000 OK")).is_err());
        assert!(StatusLine::parse(Bytes::from_static(b"HTTP/1.1 OK")).is_err());
    }
}
