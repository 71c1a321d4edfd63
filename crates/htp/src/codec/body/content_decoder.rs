//! Decoding of compressed message bodies.
//!
//! Decompressed output is collected in a [`Writer`] and taken out after every
//! write, so body hooks see decoded bytes as soon as the compressed input yields them.

use std::io;
use std::io::Write;

use bytes::{Bytes, BytesMut};
use flate2::write::{DeflateDecoder, GzDecoder, ZlibDecoder};
use tracing::{debug, trace};

use crate::protocol::{Compression, ParseError};

/// Sink for decompressed bytes.
#[derive(Debug)]
struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Inner {
    Gzip(GzDecoder<Writer>),
    /// `deflate` as it should be: a zlib stream. Input is kept until the first
    /// output, in case the sender used a raw deflate stream instead.
    Zlib { decoder: ZlibDecoder<Writer>, replay: Option<Vec<u8>> },
    /// Raw deflate, as some servers send for `deflate`.
    Deflate(DeflateDecoder<Writer>),
}

/// Streaming decoder for one compressed body.
pub struct ContentDecoder {
    compression: Compression,
    inner: Inner,
}

impl std::fmt::Debug for ContentDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentDecoder").field("compression", &self.compression).finish()
    }
}

impl ContentDecoder {
    /// Returns `None` when there is nothing to decode.
    pub fn new(compression: Compression) -> Option<Self> {
        let inner = match compression {
            Compression::None => return None,
            Compression::Gzip => Inner::Gzip(GzDecoder::new(Writer::new())),
            Compression::Deflate => Inner::Zlib { decoder: ZlibDecoder::new(Writer::new()), replay: Some(Vec::new()) },
        };
        Some(Self { compression, inner })
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Feeds compressed bytes and returns whatever they decompressed to, possibly nothing.
    pub fn decode(&mut self, data: &[u8]) -> Result<Bytes, ParseError> {
        let result = match &mut self.inner {
            Inner::Gzip(decoder) => decoder.write_all(data).map(|_| decoder.get_mut().take()),
            Inner::Deflate(decoder) => decoder.write_all(data).map(|_| decoder.get_mut().take()),
            Inner::Zlib { decoder, replay } => match decoder.write_all(data) {
                Ok(()) => {
                    let out = decoder.get_mut().take();
                    if let Some(pending) = replay {
                        if out.is_empty() {
                            pending.extend_from_slice(data);
                        } else {
                            *replay = None;
                        }
                    }
                    Ok(out)
                }
                Err(err) => match replay.take() {
                    Some(mut pending) => {
                        debug!(%err, "not a zlib stream, retrying as raw deflate");
                        pending.extend_from_slice(data);
                        let mut raw = DeflateDecoder::new(Writer::new());
                        let result = raw.write_all(&pending).map(|_| raw.get_mut().take());
                        self.inner = Inner::Deflate(raw);
                        result
                    }
                    None => Err(err),
                },
            },
        };

        let out = result.map_err(|e| self.error(e))?;
        trace!(input = data.len(), output = out.len(), "decoded body bytes");
        Ok(out)
    }

    /// Flushes the decoder at the end of the body.
    pub fn finish(&mut self) -> Result<Bytes, ParseError> {
        let result = match &mut self.inner {
            Inner::Gzip(decoder) => decoder.try_finish().map(|_| decoder.get_mut().take()),
            Inner::Zlib { decoder, .. } => decoder.try_finish().map(|_| decoder.get_mut().take()),
            Inner::Deflate(decoder) => decoder.try_finish().map(|_| decoder.get_mut().take()),
        };
        result.map_err(|e| self.error(e))
    }

    fn error(&self, e: io::Error) -> ParseError {
        let name = match self.compression {
            Compression::Gzip => "gzip",
            _ => "deflate",
        };
        ParseError::invalid_body(format!("{name} decoding failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};

    const TEXT: &[u8] = b"The quick brown fox jumps over the lazy dog. The quick brown fox jumps over the lazy dog.";

    fn decode_in_pieces(decoder: &mut ContentDecoder, data: &[u8], piece: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in data.chunks(piece) {
            out.extend_from_slice(&decoder.decode(chunk).unwrap());
        }
        out.extend_from_slice(&decoder.finish().unwrap());
        out
    }

    #[test]
    fn none_has_no_decoder() {
        assert!(ContentDecoder::new(Compression::None).is_none());
    }

    #[test]
    fn gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(TEXT).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = ContentDecoder::new(Compression::Gzip).unwrap();
        assert_eq!(decode_in_pieces(&mut decoder, &compressed, 7), TEXT);
    }

    #[test]
    fn zlib_deflate() {
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(TEXT).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = ContentDecoder::new(Compression::Deflate).unwrap();
        assert_eq!(decode_in_pieces(&mut decoder, &compressed, 5), TEXT);
    }

    #[test]
    fn raw_deflate() {
        let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(TEXT).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = ContentDecoder::new(Compression::Deflate).unwrap();
        assert_eq!(decode_in_pieces(&mut decoder, &compressed, compressed.len()), TEXT);
    }

    #[test]
    fn garbage() {
        let mut decoder = ContentDecoder::new(Compression::Gzip).unwrap();
        let result = decoder.decode(b"this is not gzip at all").and_then(|_| decoder.finish());
        assert!(matches!(result, Err(ParseError::InvalidBody { .. })));
    }
}
