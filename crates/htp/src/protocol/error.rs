use std::io;

use thiserror::Error;

use crate::handler::{HookFault, HookPoint};
use crate::protocol::{Direction, TxId};

/// Reason a direction of a [`ConnectionParser`](crate::connection::ConnectionParser) stopped for good.
#[derive(Debug, Error)]
pub enum HtpError {
    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("hook {point} returned error")]
    HookRejected { point: HookPoint },

    #[error(transparent)]
    HookFault(#[from] HookFault),

    #[error("{tx} is no longer tracked")]
    MissingTransaction { tx: TxId },

    #[error("no {direction} transaction in progress")]
    NoTransaction { direction: Direction },
}

impl HtpError {
    pub fn hook_rejected(point: HookPoint) -> Self {
        Self::HookRejected { point }
    }

    /// Returns true if the failure came from a handler rather than from the input bytes.
    pub fn is_hook_failure(&self) -> bool {
        matches!(self, HtpError::HookRejected { .. } | HtpError::HookFault(_))
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("line size too large, current: {current_size} exceed the limit {max_size}")]
    TooLongLine { current_size: usize, max_size: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid request line: {reason}")]
    InvalidRequestLine { reason: String },

    #[error("invalid status line: {reason}")]
    InvalidStatusLine { reason: String },

    #[error("invalid uri: {reason}")]
    InvalidUri { reason: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid multipart body: {reason}")]
    InvalidMultipart { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn too_long_line(current_size: usize, max_size: usize) -> Self {
        Self::TooLongLine { current_size, max_size }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_request_line<S: ToString>(str: S) -> Self {
        Self::InvalidRequestLine { reason: str.to_string() }
    }

    pub fn invalid_status_line<S: ToString>(str: S) -> Self {
        Self::InvalidStatusLine { reason: str.to_string() }
    }

    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_multipart<S: ToString>(str: S) -> Self {
        Self::InvalidMultipart { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// An integer that does not name any value of a coded enumeration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} code: {code}")]
pub struct CodeError {
    kind: &'static str,
    code: i32,
}

impl CodeError {
    pub(crate) fn new(kind: &'static str, code: i32) -> Self {
        Self { kind, code }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}
