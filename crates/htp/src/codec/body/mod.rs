//! HTTP body handling: framing and content decoding.
//!
//! # Components
//!
//! - [`PayloadDecoder`]: removes the transfer framing
//!   - Content-Length bodies
//!   - Chunked bodies, trailers included (RFC 7230)
//!   - Bodies delimited by the connection close
//! - [`ContentDecoder`]: undoes `Content-Encoding: gzip` and `deflate`
//!
//! Both work on whatever bytes are at hand and keep their state between calls,
//! so a body may arrive split at any offset.

mod chunked_decoder;
mod content_decoder;
mod payload_decoder;

pub use content_decoder::ContentDecoder;
pub use payload_decoder::PayloadDecoder;
