//! Start lines and header blocks.
//!
//! # Components
//!
//! - [`LineDecoder`]: splits request and status lines off the buffer
//!   - [`RequestLine`] and [`StatusLine`] break a line into its parts
//!   - Enforces the line size limit
//!
//! - [`HeaderDecoder`]: parses header blocks and chunked trailers
//!   - Field parsing via `httparse`
//!   - Enforces the field count and block size limits

mod header_decoder;
mod line;

pub use header_decoder::is_chunked;
pub use header_decoder::parse_content_length;
pub use header_decoder::HeaderBlock;
pub use header_decoder::HeaderDecoder;
pub use line::LineDecoder;
pub use line::RequestLine;
pub use line::StatusLine;
