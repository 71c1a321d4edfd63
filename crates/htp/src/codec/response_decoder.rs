//! HTTP response decoder.
//!
//! How a response body is framed depends on the request it answers, so the
//! decoder stays idle until [`ResponseDecoder::start`] tells it what that request
//! was.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{is_chunked, parse_content_length, HeaderBlock, HeaderDecoder, LineDecoder, StatusLine};
use crate::config::Config;
use crate::protocol::{HeaderTable, ParseError, PayloadItem, PayloadSize};

/// What the response framing needs to know about the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestInfo {
    pub is_head: bool,
    pub is_connect: bool,
    /// HTTP/0.9 responses have no status line and no headers.
    pub is_http09: bool,
}

/// One piece of a response.
#[derive(Debug, Clone)]
pub enum ResponseMessage {
    Line(StatusLine),
    /// Headers of a 1xx response other than 101. The final status line follows.
    Interim(HeaderBlock),
    Headers(HeaderBlock, PayloadSize),
    Payload(PayloadItem),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Line,
    Headers { status: u16, interim: bool },
    Payload(PayloadDecoder),
}

#[derive(Debug, Clone)]
pub struct ResponseDecoder {
    state: State,
    request: RequestInfo,
    line_decoder: LineDecoder,
    header_decoder: HeaderDecoder,
    max_trailer_bytes: usize,
}

impl ResponseDecoder {
    pub fn new(config: &Config) -> Self {
        Self {
            state: State::Idle,
            request: RequestInfo::default(),
            line_decoder: LineDecoder::new(config.max_line_bytes()),
            header_decoder: HeaderDecoder::new(config.max_header_bytes(), config.max_header_num()),
            max_trailer_bytes: config.max_header_bytes(),
        }
    }

    /// Begins a response to the given request.
    pub fn start(&mut self, request: RequestInfo) {
        self.request = request;
        self.state = if request.is_http09 {
            State::Payload(PayloadDecoder::new(PayloadSize::UntilClose, self.max_trailer_bytes))
        } else {
            State::Line
        };
    }

    /// Returns true between responses.
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Signals the connection close. Returns false if the response was cut short.
    pub fn close(&mut self) -> bool {
        match &mut self.state {
            State::Idle => true,
            State::Payload(decoder) => decoder.close(),
            State::Line | State::Headers { .. } => false,
        }
    }

    pub fn header_decoder(&self) -> &HeaderDecoder {
        &self.header_decoder
    }
}

impl Decoder for ResponseDecoder {
    type Item = ResponseMessage;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.state {
            State::Idle => Ok(None),
            State::Line => {
                let blank = src.iter().take_while(|b| matches!(b, b'\r' | b'\n')).count();
                src.advance(blank);

                let Some(line) = self.line_decoder.decode(src)? else {
                    return Ok(None);
                };
                let line = StatusLine::parse(line)?;
                self.state = State::Headers { status: line.status_number, interim: line.is_interim() };
                Ok(Some(ResponseMessage::Line(line)))
            }
            State::Headers { status, interim } => {
                let (status, interim) = (*status, *interim);
                let Some(block) = self.header_decoder.decode(src)? else {
                    return Ok(None);
                };

                if interim {
                    self.state = State::Line;
                    return Ok(Some(ResponseMessage::Interim(block)));
                }

                let payload = response_payload(status, self.request, &block.headers)?;
                trace!(status, ?payload, "response body framing");
                self.state = State::Payload(PayloadDecoder::new(payload, self.max_trailer_bytes));
                Ok(Some(ResponseMessage::Headers(block, payload)))
            }
            State::Payload(payload_decoder) => {
                let item = payload_decoder.decode(src)?;
                if matches!(item, Some(PayloadItem::Eof)) {
                    self.state = State::Idle;
                }
                Ok(item.map(ResponseMessage::Payload))
            }
        }
    }
}

/// Determines the response body framing, according to RFC 9112 section 6.3.
///
/// Unlike requests, a response without any framing header runs until the
/// connection closes, and Transfer-Encoding overrides Content-Length.
fn response_payload(status: u16, request: RequestInfo, headers: &HeaderTable) -> Result<PayloadSize, ParseError> {
    // the connection leaves HTTP after these
    if status == 101 || (request.is_connect && (200..300).contains(&status)) {
        return Ok(PayloadSize::Empty);
    }

    if request.is_head || status == 204 || status == 304 {
        return Ok(PayloadSize::Empty);
    }

    let te_header = headers.get(http::header::TRANSFER_ENCODING.as_str());
    if te_header.is_some() {
        return Ok(if is_chunked(te_header) { PayloadSize::Chunked } else { PayloadSize::UntilClose });
    }

    match headers.get(http::header::CONTENT_LENGTH.as_str()) {
        Some(cl_value) => match parse_content_length(cl_value)? {
            0 => Ok(PayloadSize::Empty),
            length => Ok(PayloadSize::Length(length)),
        },
        None => Ok(PayloadSize::UntilClose),
    }
}
