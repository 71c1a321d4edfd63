//! Connection parsing
//!
//! This module drives the codec over the two byte streams of a connection and
//! turns what it decodes into transactions and hook invocations.
//!
//! # Components
//!
//! - [`ConnectionParser`]: the entry point that:
//!   - Buffers each direction and reports how much input was consumed
//!   - Creates a transaction per request and pairs responses with them
//!   - Fires the registered hooks in parse order
//!   - Maps handler results onto the stream state of the direction
//! - [`Transactions`]: the transactions of the connection, oldest first
//!
//! # Features
//!
//! - Input split at any byte offset gives the same result
//! - Pipelined requests, with responses paired in order
//! - `CONNECT` and `101 Switching Protocols` tunnels
//! - Stopping from a handler and resuming later
//! - Cleanup of partial state when a direction fails

mod env;
mod parser;
mod request;
mod response;
mod stream;
mod transactions;

pub use parser::ConnectionParser;
pub use transactions::Transactions;
