//! Decoder for HTTP chunked transfer encoding.
//!
//! The body is a series of chunks, each preceded by its size in hex, ended by a
//! zero sized chunk and an optional trailer section ([RFC 7230 Section 4.1]).
//! Line endings may be CRLF or a bare LF; extensions after the size are skipped.
//!
//! [RFC 7230 Section 4.1]: https://tools.ietf.org/html/rfc7230#section-4.1

use std::cmp;

use bytes::{Buf, BytesMut};
use memchr::memchr;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

/// Removes chunked framing, yielding chunk data as soon as it arrives.
///
/// A size line or trailer line is only consumed once complete, so a partial line
/// stays in the source buffer until the rest of it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    trailer: BytesMut,
    /// Bound for one size line and for the whole trailer section.
    max_line_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    /// Bytes left in the current chunk.
    Data(u64),
    /// The line ending after chunk data.
    DataEnd,
    Trailer,
    Done,
}

impl ChunkedDecoder {
    pub fn new(max_line_bytes: usize) -> Self {
        Self { state: State::Size, trailer: BytesMut::new(), max_line_bytes }
    }

    fn size_line(&self, src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
        match memchr(b'\n', src) {
            Some(end) => Ok(Some(src.split_to(end + 1))),
            None if src.len() > self.max_line_bytes => Err(ParseError::too_long_line(src.len(), self.max_line_bytes)),
            None => Ok(None),
        }
    }

    /// Moves complete trailer lines out of `src`. Returns true at the blank line.
    fn trailer_lines(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        while let Some(end) = memchr(b'\n', src) {
            let line = src.split_to(end + 1);
            let blank = matches!(&line[..], b"\n" | b"\r\n");
            self.trailer.extend_from_slice(&line);
            self.check_trailer(0)?;
            if blank {
                return Ok(true);
            }
        }
        self.check_trailer(src.len())?;
        Ok(false)
    }

    fn check_trailer(&self, pending: usize) -> Result<(), ParseError> {
        let size = self.trailer.len() + pending;
        if size > self.max_line_bytes {
            return Err(ParseError::too_large_header(size, self.max_line_bytes));
        }
        Ok(())
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Yields chunk data, then the raw trailer section if one was sent, then
    /// [`PayloadItem::Eof`]. `Ok(None)` means more bytes are needed.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = self.size_line(src)? else {
                        return Ok(None);
                    };
                    let size = chunk_size(&line)?;
                    trace!(size, "chunk size");
                    self.state = if size == 0 { State::Trailer } else { State::Data(size) };
                }

                State::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = cmp::min(remaining, src.len() as u64);
                    // len <= src.len(), so it fits in usize
                    let data = src.split_to(len as usize).freeze();
                    self.state = if len == remaining { State::DataEnd } else { State::Data(remaining - len) };
                    return Ok(Some(PayloadItem::Chunk(data)));
                }

                State::DataEnd => match src.first() {
                    None => return Ok(None),
                    Some(b'\n') => {
                        src.advance(1);
                        self.state = State::Size;
                    }
                    Some(b'\r') => match src.get(1) {
                        None => return Ok(None),
                        Some(b'\n') => {
                            src.advance(2);
                            self.state = State::Size;
                        }
                        Some(_) => return Err(ParseError::invalid_body("chunk data not followed by a line ending")),
                    },
                    Some(_) => return Err(ParseError::invalid_body("chunk data not followed by a line ending")),
                },

                State::Trailer => {
                    if !self.trailer_lines(src)? {
                        return Ok(None);
                    }
                    self.state = State::Done;
                    // a lone blank line means no trailer fields
                    if !matches!(&self.trailer[..], b"\n" | b"\r\n") {
                        let trailer = self.trailer.split().freeze();
                        trace!(len = trailer.len(), "read chunked trailer");
                        return Ok(Some(PayloadItem::Trailer(trailer)));
                    }
                    self.trailer.clear();
                }

                State::Done => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }
            }
        }
    }
}

/// Parses the hex size at the start of a size line, ignoring whitespace and extensions.
fn chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let start = line.iter().position(|b| !matches!(b, b' ' | b'\t')).unwrap_or(line.len());
    let line = &line[start..];

    let digits = line.iter().take_while(|b| b.is_ascii_hexdigit()).count();
    if digits == 0 {
        return Err(ParseError::invalid_body("invalid chunk size"));
    }

    let rest = &line[digits..];
    let rest = &rest[rest.iter().position(|b| !matches!(b, b' ' | b'\t')).unwrap_or(rest.len())..];
    if !rest.is_empty() && rest[0] != b';' {
        return Err(ParseError::invalid_body("invalid chunk size"));
    }

    line[..digits].iter().try_fold(0u64, |size, digit| {
        let value = u64::from(hex_value(*digit));
        size.checked_mul(16)
            .and_then(|size| size.checked_add(value))
            .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))
    })
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}
