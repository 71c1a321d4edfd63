//! HTTP request decoder.
//!
//! Decodes the request direction of a connection one piece at a time, as a
//! [`Decoder`] over the direction's buffer. It only knows the grammar: what the
//! pieces mean for a transaction is up to the caller.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_htp::codec::{RequestDecoder, RequestMessage};
//! use micro_htp::config::Config;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = RequestDecoder::new(&Config::default());
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\nHost: a\r\n\r\n");
//!
//! assert!(matches!(decoder.decode(&mut buffer), Ok(Some(RequestMessage::Start))));
//! assert!(matches!(decoder.decode(&mut buffer), Ok(Some(RequestMessage::Line(_)))));
//! assert!(matches!(decoder.decode(&mut buffer), Ok(Some(RequestMessage::Headers(..)))));
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{is_chunked, parse_content_length, HeaderBlock, HeaderDecoder, LineDecoder, RequestLine};
use crate::config::Config;
use crate::protocol::{HeaderTable, ParseError, PayloadItem, PayloadSize};

/// One piece of a request.
#[derive(Debug, Clone)]
pub enum RequestMessage {
    /// The first byte of a new request arrived.
    Start,
    /// The request line. A line without protocol is a complete HTTP/0.9 request.
    Line(RequestLine),
    /// The header block and the body framing it announces.
    Headers(HeaderBlock, PayloadSize),
    /// A piece of the body, its trailer, or its end.
    Payload(PayloadItem),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Line,
    Headers,
    Payload(PayloadDecoder),
}

/// A decoder for the request direction.
#[derive(Debug, Clone)]
pub struct RequestDecoder {
    state: State,
    line_decoder: LineDecoder,
    header_decoder: HeaderDecoder,
    max_trailer_bytes: usize,
}

impl RequestDecoder {
    pub fn new(config: &Config) -> Self {
        Self {
            state: State::Idle,
            line_decoder: LineDecoder::new(config.max_line_bytes()),
            header_decoder: HeaderDecoder::new(config.max_header_bytes(), config.max_header_num()),
            max_trailer_bytes: config.max_header_bytes(),
        }
    }

    /// Returns true between requests.
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    pub fn header_decoder(&self) -> &HeaderDecoder {
        &self.header_decoder
    }
}

impl Decoder for RequestDecoder {
    type Item = RequestMessage;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.state {
            State::Idle => {
                // empty lines between requests are tolerated
                let blank = src.iter().take_while(|b| matches!(b, b'\r' | b'\n')).count();
                src.advance(blank);
                if src.is_empty() {
                    return Ok(None);
                }
                self.state = State::Line;
                Ok(Some(RequestMessage::Start))
            }
            State::Line => {
                let Some(line) = self.line_decoder.decode(src)? else {
                    return Ok(None);
                };
                let line = RequestLine::parse(line)?;
                self.state = if line.protocol.is_some() { State::Headers } else { State::Idle };
                Ok(Some(RequestMessage::Line(line)))
            }
            State::Headers => {
                let Some(block) = self.header_decoder.decode(src)? else {
                    return Ok(None);
                };
                let payload = request_payload(&block.headers)?;
                trace!(?payload, "request body framing");
                self.state = State::Payload(PayloadDecoder::new(payload, self.max_trailer_bytes));
                Ok(Some(RequestMessage::Headers(block, payload)))
            }
            State::Payload(payload_decoder) => {
                let item = payload_decoder.decode(src)?;
                if matches!(item, Some(PayloadItem::Eof)) {
                    self.state = State::Idle;
                }
                Ok(item.map(RequestMessage::Payload))
            }
        }
    }
}

/// Determines the request body framing from its headers, according to RFC 7230 section 3.3.
///
/// A request carries a body only when it says so with Transfer-Encoding or Content-Length.
/// Sending both is rejected.
fn request_payload(headers: &HeaderTable) -> Result<PayloadSize, ParseError> {
    // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding
    let te_header = headers.get(http::header::TRANSFER_ENCODING.as_str());
    let cl_header = headers.get(http::header::CONTENT_LENGTH.as_str());

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::Empty),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::Empty)
            }
        }

        (None, Some(cl_value)) => match parse_content_length(cl_value)? {
            0 => Ok(PayloadSize::Empty),
            length => Ok(PayloadSize::Length(length)),
        },

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use indoc::indoc;

    fn decode_all(decoder: &mut RequestDecoder, buf: &mut BytesMut) -> Vec<RequestMessage> {
        let mut messages = Vec::new();
        while let Some(message) = decoder.decode(buf).unwrap() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut decoder = RequestDecoder::new(&Config::default());
        let mut buf = BytesMut::from(str);
        let messages = decode_all(&mut decoder, &mut buf);

        assert_eq!(messages.len(), 4);
        let RequestMessage::Line(line) = &messages[1] else { panic!("expected line") };
        assert_eq!(line.method, &b"GET"[..]);
        assert_eq!(line.uri, &b"/index.html"[..]);

        let RequestMessage::Headers(block, payload) = &messages[2] else { panic!("expected headers") };
        assert_eq!(block.headers.len(), 3);
        assert_eq!(*payload, PayloadSize::Empty);
        assert!(matches!(messages[3], RequestMessage::Payload(PayloadItem::Eof)));
        assert!(decoder.is_idle());
    }

    #[test]
    fn body_with_content_length() {
        let mut decoder = RequestDecoder::new(&Config::default());
        let mut buf = BytesMut::from("POST /f HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello\r\nGET");
        let messages = decode_all(&mut decoder, &mut buf);

        let RequestMessage::Headers(_, payload) = &messages[2] else { panic!("expected headers") };
        assert_eq!(*payload, PayloadSize::Length(5));
        assert!(matches!(&messages[3], RequestMessage::Payload(PayloadItem::Chunk(bytes)) if bytes == &Bytes::from_static(b"hello")));
        assert!(matches!(messages[4], RequestMessage::Payload(PayloadItem::Eof)));
        // the next request begins, its line is incomplete
        assert!(matches!(messages[5], RequestMessage::Start));
        assert_eq!(&buf[..], b"GET");
    }

    #[test]
    fn http09_request_has_no_headers() {
        let mut decoder = RequestDecoder::new(&Config::default());
        let mut buf = BytesMut::from("GET /old\r\n");
        let messages = decode_all(&mut decoder, &mut buf);
        assert_eq!(messages.len(), 2);
        assert!(decoder.is_idle());
    }

    #[test]
    fn conflicting_framing() {
        let mut decoder = RequestDecoder::new(&Config::default());
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n");
        decoder.decode(&mut buf).unwrap();
        decoder.decode(&mut buf).unwrap();
        assert!(matches!(decoder.decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn chunked_body() {
        let mut decoder = RequestDecoder::new(&Config::default());
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\nX-Sum: 1\r\n\r\n");
        let messages = decode_all(&mut decoder, &mut buf);
        assert!(matches!(&messages[3], RequestMessage::Payload(PayloadItem::Chunk(bytes)) if &bytes[..] == b"abc"));
        assert!(matches!(&messages[4], RequestMessage::Payload(PayloadItem::Trailer(_))));
        assert!(matches!(messages[5], RequestMessage::Payload(PayloadItem::Eof)));
        assert!(buf.is_empty());
    }

    #[test]
    fn leading_blank_lines() {
        let mut decoder = RequestDecoder::new(&Config::default());
        let mut buf = BytesMut::from("\r\n\r\n");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
        assert!(decoder.is_idle());
    }
}
