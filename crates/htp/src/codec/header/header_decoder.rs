//! Header block decoder.
//!
//! Parses the fields that follow a start line, or the trailer of a chunked
//! body, into a [`HeaderTable`]. Parsing is delegated to `httparse`; the decoder
//! records where each name and value sits in the block so the table can share
//! the block's buffer instead of copying every field.
//!
//! # Limits
//!
//! - Maximum number of fields: [`Config::max_header_num`](crate::config::Config::max_header_num)
//! - Maximum block size: [`Config::max_header_bytes`](crate::config::Config::max_header_bytes)

use bytes::{Bytes, BytesMut};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{HeaderTable, ParseError};

/// A complete header block: the raw bytes, terminating empty line included, and the parsed fields.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    pub raw: Bytes,
    pub headers: HeaderTable,
}

/// Decoder for header blocks implementing the [`Decoder`] trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderDecoder {
    max_header_bytes: usize,
    max_header_num: usize,
}

impl HeaderDecoder {
    pub fn new(max_header_bytes: usize, max_header_num: usize) -> Self {
        Self { max_header_bytes, max_header_num }
    }

    /// Parses a block that is known to be complete, such as a collected trailer.
    pub fn parse_block(&self, raw: Bytes) -> Result<HeaderTable, ParseError> {
        let mut src = BytesMut::from(&raw[..]);
        let mut decoder = *self;
        match decoder.decode(&mut src)? {
            Some(block) => Ok(block.headers),
            None => Err(ParseError::invalid_header("incomplete header block")),
        }
    }
}

impl Decoder for HeaderDecoder {
    type Item = HeaderBlock;
    type Error = ParseError;

    /// Attempts to decode a header block from the provided bytes buffer.
    ///
    /// - `Ok(Some(block))` if the block, up to its empty line, was parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if the block is malformed or exceeds the limits
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = vec![httparse::EMPTY_HEADER; self.max_header_num];
        let max_header_num = self.max_header_num;

        let parsed_result = httparse::parse_headers(&src[..], &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(max_header_num),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete((offset, parsed)) => {
                trace!(header_size = offset, fields = parsed.len(), "parsed header block");
                ensure!(offset <= self.max_header_bytes, ParseError::too_large_header(offset, self.max_header_bytes));

                let mut indices = vec![HeaderIndex::EMPTY; parsed.len()];
                HeaderIndex::record(src, parsed, &mut indices);

                let raw = src.split_to(offset).freeze();
                let mut table = HeaderTable::with_capacity(indices.len());
                for index in &indices {
                    table.append(raw.slice(index.name.0..index.name.1), raw.slice(index.value.0..index.value.1));
                }

                Ok(Some(HeaderBlock { raw, headers: table }))
            }
            Status::Partial => {
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                Ok(None)
            }
        }
    }
}

/// Stores the byte range positions of a header's name and value within the original buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    const EMPTY: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let name_end = name_start + header.name.len();
            indices.name = (name_start, name_end);
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            let value_end = value_start + header.value.len();
            indices.value = (value_start, value_end);
        }
    }
}

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// According to RFC 7230, chunked must be the last encoding if present.
pub fn is_chunked(header_value: Option<&[u8]>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value {
        if let Some(bytes) = value.rsplit(|b| *b == b',').next() {
            return bytes.trim_ascii().eq_ignore_ascii_case(CHUNKED);
        }
    }
    false
}

/// Parses a Content-Length value. Repeated identical values separated by commas are accepted.
pub fn parse_content_length(value: &[u8]) -> Result<u64, ParseError> {
    let mut length = None;
    for part in value.split(|b| *b == b',') {
        let part = part.trim_ascii();
        ensure!(
            !part.is_empty() && part.iter().all(u8::is_ascii_digit),
            ParseError::invalid_content_length(format!("value {} is not u64", String::from_utf8_lossy(value)))
        );
        let parsed = std::str::from_utf8(part)
            .ok()
            .and_then(|digits| digits.parse::<u64>().ok())
            .ok_or_else(|| ParseError::invalid_content_length("value overflows u64"))?;
        match length {
            Some(previous) if previous != parsed => {
                return Err(ParseError::invalid_content_length("conflicting values"));
            }
            _ => length = Some(parsed),
        }
    }
    length.ok_or_else(|| ParseError::invalid_content_length("empty value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decoder() -> HeaderDecoder {
        HeaderDecoder::new(8 * 1024, 64)
    }

    #[test]
    fn check_is_chunked() {
        assert!(!is_chunked(None));
        assert!(is_chunked(Some(&b"gzip, chunked"[..])));
        assert!(is_chunked(Some(&b"Chunked"[..])));
        assert!(!is_chunked(Some(&b"chunked, gzip"[..])));
        assert!(!is_chunked(Some(&b"gzip"[..])));
    }

    #[test]
    fn content_length_values() {
        assert_eq!(parse_content_length(b" 10 ").unwrap(), 10);
        assert_eq!(parse_content_length(b"10, 10").unwrap(), 10);
        assert!(parse_content_length(b"10, 11").is_err());
        assert!(parse_content_length(b"-1").is_err());
        assert!(parse_content_length(b"").is_err());
        assert!(parse_content_length(b"99999999999999999999999").is_err());
    }

    #[test]
    fn test_bytes_mut_lens() {
        let str = indoc! {r##"
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        123"##};

        let mut bytes = BytesMut::from(str);
        let block = decoder().decode(&mut bytes).unwrap().unwrap();

        assert_eq!(block.raw.len(), str.len() - 3);
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut buf = BytesMut::from(str);
        let block = decoder().decode(&mut buf).unwrap().unwrap();
        let headers = block.headers;

        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("accept"), Some(&b"*/*"[..]));
        assert_eq!(headers.get("Host"), Some(&b"127.0.0.1:8080"[..]));
        assert_eq!(headers.get("user-agent"), Some(&b"curl/7.79.1"[..]));
        assert!(buf.is_empty());
    }

    #[test]
    fn duplicates_keep_order() {
        let str = indoc! {r##"
        Set-Cookie: a=1
        Content-Type: text/html
        set-cookie: b=2

        "##};

        let block = decoder().decode(&mut BytesMut::from(str)).unwrap().unwrap();
        assert_eq!(block.headers.get("Set-Cookie"), Some(&b"a=1"[..]));
        assert_eq!(block.headers.get_all("set-cookie").collect::<Vec<_>>(), vec![&b"a=1"[..], &b"b=2"[..]]);
        assert_eq!(block.headers.iter().nth(2).unwrap().name(), b"set-cookie");
    }

    #[test]
    fn partial_block_waits() {
        let mut buf = BytesMut::from("Host: a\r\nAcc");
        assert!(decoder().decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 12);
    }

    #[test]
    fn empty_block() {
        let mut buf = BytesMut::from("\r\nbody");
        let block = decoder().decode(&mut buf).unwrap().unwrap();
        assert!(block.headers.is_empty());
        assert_eq!(&buf[..], b"body");
    }

    #[test]
    fn limits() {
        let mut buf = BytesMut::from("A: 1\r\nB: 2\r\nC: 3\r\n\r\n");
        let result = HeaderDecoder::new(1024, 2).decode(&mut buf);
        assert!(matches!(result, Err(ParseError::TooManyHeaders { max_num: 2 })));

        let mut buf = BytesMut::from("A: 0123456789\r\n");
        let result = HeaderDecoder::new(8, 64).decode(&mut buf);
        assert!(matches!(result, Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn invalid_name() {
        let mut buf = BytesMut::from("Bad Name: 1\r\n\r\n");
        assert!(matches!(decoder().decode(&mut buf), Err(ParseError::InvalidHeader { .. })));
    }

    #[test]
    fn trailer_block() {
        let headers = decoder().parse_block(Bytes::from_static(b"Expires: never\r\n\r\n")).unwrap();
        assert_eq!(headers.get("expires"), Some(&b"never"[..]));
    }
}
