//! Decoder implementation for HTTP message payloads.
//!
//! This module provides a unified decoder for the ways an HTTP/1.x body can be delimited:
//! - Content-Length based payloads
//! - Chunked transfer encoding
//! - Everything up to the connection close (responses only)
//! - Messages with no body
//!
//! The framing is chosen from the message headers, see [`PayloadSize`].

use std::cmp;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A unified decoder for handling HTTP message payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

/// Enum representing different payload decoding strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// Bytes still expected for a body with a known length
    Length(u64),

    /// Decode payload using chunked transfer encoding
    Chunked(ChunkedDecoder),

    /// Take whatever arrives until the connection closes
    UntilClose { closed: bool },

    /// Handle messages with no body
    NoBody,
}

impl PayloadDecoder {
    /// Creates a decoder for the given framing. `max_trailer_bytes` bounds chunked trailers.
    pub fn new(size: PayloadSize, max_trailer_bytes: usize) -> Self {
        let kind = match size {
            PayloadSize::Length(length) => Kind::Length(length),
            PayloadSize::Chunked => Kind::Chunked(ChunkedDecoder::new(max_trailer_bytes)),
            PayloadSize::UntilClose => Kind::UntilClose { closed: false },
            PayloadSize::Empty => Kind::NoBody,
        };
        Self { kind }
    }

    /// Marks the end of the stream. An until-close body then reports EOF once its
    /// buffered bytes are drained. Returns false if the body was cut short.
    pub fn close(&mut self) -> bool {
        match &mut self.kind {
            Kind::UntilClose { closed } => {
                *closed = true;
                true
            }
            Kind::Length(remaining) => *remaining == 0,
            Kind::Chunked(_) => false,
            Kind::NoBody => true,
        }
    }
}

/// Implementation of the Decoder trait for HTTP payloads.
///
/// Delegates to the appropriate decoder based on the payload type.
impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(0) => Ok(Some(PayloadItem::Eof)),
            Kind::Length(remaining) => {
                if src.is_empty() {
                    return Ok(None);
                }

                // Read the minimum of remaining length and available bytes
                let len = cmp::min(*remaining, src.len() as u64);
                let bytes = src.split_to(len as usize).freeze();

                *remaining -= bytes.len() as u64;
                Ok(Some(PayloadItem::Chunk(bytes)))
            }
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::UntilClose { closed } => {
                if !src.is_empty() {
                    Ok(Some(PayloadItem::Chunk(src.split().freeze())))
                } else if *closed {
                    Ok(Some(PayloadItem::Eof))
                } else {
                    Ok(None)
                }
            }
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn fixed_length() {
        let mut buffer: BytesMut = BytesMut::from(&b"101234567890abcdef\r\n\r\n"[..]);
        let mut decoder = PayloadDecoder::new(PayloadSize::Length(10), 1024);

        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"1012345678"))));
        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");

        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Eof));
        assert!(decoder.close());
    }

    #[test]
    fn fixed_length_across_calls() {
        let mut decoder = PayloadDecoder::new(PayloadSize::Length(5), 1024);
        let mut buffer = BytesMut::from(&b"abc"[..]);
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"abc"))));
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);
        assert!(!decoder.clone().close());

        buffer.extend_from_slice(b"deGET");
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"de"))));
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Eof));
        assert_eq!(&buffer[..], b"GET");
    }

    #[test]
    fn until_close() {
        let mut decoder = PayloadDecoder::new(PayloadSize::UntilClose, 1024);
        let mut buffer = BytesMut::from(&b"hello"[..]);
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"hello"))));
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);

        assert!(decoder.close());
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Eof));
    }

    #[test]
    fn no_body() {
        let mut decoder = PayloadDecoder::new(PayloadSize::Empty, 1024);
        assert_eq!(decoder.decode(&mut BytesMut::from(&b"next"[..])).unwrap(), Some(PayloadItem::Eof));
    }

    #[test]
    fn chunked_cut_short() {
        let mut decoder = PayloadDecoder::new(PayloadSize::Chunked, 1024);
        let mut buffer = BytesMut::from(&b"5\r\nab"[..]);
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"ab"))));
        assert!(!decoder.close());
    }
}
