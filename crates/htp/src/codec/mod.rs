//! HTTP codec module for decoding both directions of a connection.
//!
//! Everything here works on bytes that arrive in arbitrary pieces: each decoder
//! takes what is buffered, returns the next complete piece or `None`, and keeps
//! its state for the next call.
//!
//! # Architecture
//!
//! - Request side:
//!   - [`RequestDecoder`]: request line, header block, body
//! - Response side:
//!   - [`ResponseDecoder`]: status line, header block, body, framed after the request
//! - Shared parts:
//!   - Start lines and header blocks via the [`header`] module
//!   - Transfer framing and content decoding via the [`body`] module
//!   - File uploads via the [`multipart`] module
//!   - Request target normalization via the [`normalize`] module
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_htp::codec::{RequestInfo, ResponseDecoder, ResponseMessage};
//! use micro_htp::config::Config;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = ResponseDecoder::new(&Config::default());
//! decoder.start(RequestInfo::default());
//!
//! let mut buffer = BytesMut::from("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
//! let Ok(Some(ResponseMessage::Line(line))) = decoder.decode(&mut buffer) else { unreachable!() };
//! assert_eq!(line.status_number, 404);
//! ```

pub mod body;
pub mod header;
pub mod multipart;
pub mod normalize;
mod request_decoder;
mod response_decoder;

pub use request_decoder::{RequestDecoder, RequestMessage};
pub use response_decoder::{RequestInfo, ResponseDecoder, ResponseMessage};
