//! A hook driven, incremental HTTP/1.x parser
//!
//! This crate parses both directions of an HTTP/1.x connection from bytes that
//! arrive in arbitrary pieces, and reports what it finds to handlers registered
//! by the host. It is meant for traffic inspection: it never answers, it only
//! observes, and it keeps going where a server would give up.
//!
//! # Features
//!
//! - HTTP/0.9, 1.0 and 1.1 requests and responses
//! - Content-Length, chunked (with trailers) and until-close bodies
//! - Pipelining, `CONNECT` and protocol switching
//! - gzip and deflate content decoding
//! - Request target decomposition and normalization with server personalities
//! - Extraction of files uploaded as `multipart/form-data`
//! - Handlers that can stop parsing and resume it later
//!
//! # Example
//!
//! ```
//! use micro_htp::connection::ConnectionParser;
//! use micro_htp::handler::HookPoint;
//! use micro_htp::protocol::{Direction, HookResult, StreamState};
//!
//! #[derive(Default)]
//! struct Seen {
//!     body: Vec<u8>,
//!     complete: usize,
//! }
//!
//! let mut parser: ConnectionParser<Seen> = ConnectionParser::new();
//! parser.set_user_context(Seen::default());
//!
//! parser.register(HookPoint::RequestBodyData, |cx, artifact| {
//!     if let (Some(seen), Some(data)) = (cx.user_mut(), artifact.bytes()) {
//!         seen.body.extend_from_slice(data);
//!     }
//!     Ok(HookResult::Ok)
//! });
//! parser.register(HookPoint::RequestComplete, |cx, _| {
//!     if let Some(seen) = cx.user_mut() {
//!         seen.complete += 1;
//!     }
//!     Ok(HookResult::Ok)
//! });
//!
//! let request = b"POST /upload HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world";
//! for piece in request.chunks(5) {
//!     assert_eq!(parser.feed(Direction::Request, piece), StreamState::Data);
//! }
//!
//! let seen = parser.user_context().unwrap();
//! assert_eq!(seen.body, b"hello world");
//! assert_eq!(seen.complete, 1);
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`connection`]: the [`ConnectionParser`](connection::ConnectionParser) the host feeds
//! - [`handler`]: hook points, the handler registry and what handlers receive
//! - [`codec`]: the decoders for lines, headers, bodies, multipart and targets
//! - [`protocol`]: transactions, headers, status codes and errors
//! - [`config`]: parser options and server personalities
//!
//! # Core Components
//!
//! ## Feeding
//!
//! [`ConnectionParser::feed`](connection::ConnectionParser::feed) takes the next
//! bytes of one direction and returns a [`StreamState`](protocol::StreamState).
//! All hooks the bytes trigger run before it returns, on the calling thread.
//!
//! ## Hooks
//!
//! Each [`HookPoint`](handler::HookPoint) holds at most one handler. A handler
//! gets a [`HookContext`](handler::HookContext) with the transaction and the user
//! context, and an [`Artifact`](handler::Artifact) with the data of the event.
//! Its [`HookResult`](protocol::HookResult) decides whether parsing goes on.
//!
//! ## Error Handling
//!
//! - [`protocol::HtpError`]: why a direction failed
//! - [`protocol::ParseError`]: malformed input
//! - [`handler::HookFault`]: a handler that returned an error or panicked
//! - [`config::ConfigError`]: an invalid option value
//!
//! Diagnostics are also emitted as `tracing` events.
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - One parser must not be fed from two threads at once; it is not `Sync`

pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
