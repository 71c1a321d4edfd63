//! Core HTTP protocol abstractions shared by the parser and its host.
//!
//! # Architecture
//!
//! - **Status codes** ([`status`]): closed enumerations with stable numeric codes
//!   - [`StreamState`]: per-direction parser status returned by every feed
//!   - [`HookResult`]: control signal returned by handlers
//!   - [`Protocol`], [`Compression`], [`LogLevel`], [`Direction`]
//!
//! - **Transactions** ([`transaction`]): one request/response exchange
//!   - [`Transaction`]: fields filled in as the parser advances
//!   - [`HeaderTable`]: insertion ordered, duplicate preserving headers
//!   - [`Uri`]: optional URI components
//!
//! - **Payload** ([`message`]): body items produced by the payload decoders
//!
//! - **Diagnostics**: [`LogRecord`] and the error types
//!   - [`HtpError`]: why a direction stopped for good
//!   - [`ParseError`]: malformed input

mod status;
pub use status::Compression;
pub use status::Direction;
pub use status::HookResult;
pub use status::LogLevel;
pub use status::Protocol;
pub use status::StreamState;

mod message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod header;
pub use header::Header;
pub use header::HeaderTable;

mod uri;
pub use uri::Uri;

mod log;
pub use log::LogRecord;

mod transaction;
pub use transaction::Progress;
pub use transaction::Transaction;
pub use transaction::TxId;
pub use transaction::UploadedFile;

mod error;
pub use error::CodeError;
pub use error::HtpError;
pub use error::ParseError;
