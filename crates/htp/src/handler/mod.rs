//! Hook handlers: the callbacks a host registers to observe parsing.
//!
//! A [`Hooks`] registry holds at most one handler per [`HookPoint`]. Handlers are
//! closures taking a [`HookContext`] and an [`Artifact`], and return a
//! [`HandlerResult`]:
//!
//! - `Ok(HookResult::Ok)` or `Ok(HookResult::Declined)`: parsing continues
//! - `Ok(HookResult::Stop)`: the direction pauses until it is resumed
//! - `Ok(HookResult::Error)`: the direction fails for good
//! - `Err(_)` or a panic: same as `Error`, with the cause kept in a [`HookFault`]
//!
//! # Example
//!
//! ```
//! use micro_htp::connection::ConnectionParser;
//! use micro_htp::handler::HookPoint;
//! use micro_htp::protocol::{Direction, HookResult};
//!
//! let mut parser: ConnectionParser<Vec<String>> = ConnectionParser::new();
//! parser.set_user_context(Vec::new());
//! parser.register(HookPoint::RequestLine, |cx, _| {
//!     let method = cx.tx().and_then(|tx| tx.method());
//!     if let (Some(seen), Some(method)) = (cx.user_mut(), method) {
//!         seen.push(method.to_string());
//!     }
//!     Ok(HookResult::Ok)
//! });
//!
//! parser.feed(Direction::Request, b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");
//! assert_eq!(parser.user_context().unwrap(), &["GET".to_string()]);
//! ```

mod artifact;
mod context;
mod hook;

pub use artifact::Artifact;
pub use artifact::DataChunk;
pub use artifact::FileChunk;
pub use context::HookContext;
pub use hook::BoxError;
pub use hook::Handler;
pub use hook::HandlerResult;
pub use hook::HookFault;
pub use hook::HookPoint;
pub use hook::Hooks;
