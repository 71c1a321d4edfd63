//! One request/response exchange on a connection.
//!
//! Fields are filled in incrementally while the parser advances, so a handler
//! sees exactly what has been parsed up to the hook that is firing.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use http::{Method, StatusCode};

use crate::protocol::{Compression, HeaderTable, PayloadSize, Protocol, Uri};

/// Identifier of a transaction, unique within its connection and assigned in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub(crate) usize);

impl TxId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// How far one side of a transaction got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Progress {
    #[default]
    NotStarted,
    Line,
    Headers,
    Body,
    Trailer,
    Complete,
}

/// Metadata of a file extracted from a multipart request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedFile {
    /// Filename as submitted by the client. Untrusted.
    pub filename: Option<String>,
    /// Where the content was stored, when extraction to disk is enabled.
    pub tmpname: Option<PathBuf>,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub(crate) id: TxId,

    pub(crate) request_progress: Progress,
    pub(crate) request_line: Option<Bytes>,
    pub(crate) request_method: Option<Bytes>,
    pub(crate) request_uri: Option<Bytes>,
    pub(crate) request_protocol: Protocol,
    pub(crate) parsed_uri: Option<Uri>,
    pub(crate) normalized_uri: Option<Uri>,
    pub(crate) request_headers: HeaderTable,
    pub(crate) request_trailers: HeaderTable,
    pub(crate) request_payload: Option<PayloadSize>,
    pub(crate) request_content_encoding: Compression,
    pub(crate) request_message_len: u64,
    pub(crate) request_entity_len: u64,
    pub(crate) expected_status: Option<u16>,
    pub(crate) files: Vec<UploadedFile>,

    pub(crate) response_progress: Progress,
    pub(crate) response_line: Option<Bytes>,
    pub(crate) response_protocol: Protocol,
    pub(crate) response_status: Option<Bytes>,
    pub(crate) response_status_number: Option<u16>,
    pub(crate) response_message: Option<Bytes>,
    pub(crate) response_headers: HeaderTable,
    pub(crate) response_trailers: HeaderTable,
    pub(crate) response_payload: Option<PayloadSize>,
    pub(crate) response_content_encoding: Compression,
    pub(crate) response_message_len: u64,
    pub(crate) response_entity_len: u64,
}

impl Transaction {
    pub(crate) fn new(id: TxId) -> Self {
        Self {
            id,
            request_progress: Progress::NotStarted,
            request_line: None,
            request_method: None,
            request_uri: None,
            request_protocol: Protocol::Unknown,
            parsed_uri: None,
            normalized_uri: None,
            request_headers: HeaderTable::new(),
            request_trailers: HeaderTable::new(),
            request_payload: None,
            request_content_encoding: Compression::None,
            request_message_len: 0,
            request_entity_len: 0,
            expected_status: None,
            files: Vec::new(),
            response_progress: Progress::NotStarted,
            response_line: None,
            response_protocol: Protocol::Unknown,
            response_status: None,
            response_status_number: None,
            response_message: None,
            response_headers: HeaderTable::new(),
            response_trailers: HeaderTable::new(),
            response_payload: None,
            response_content_encoding: Compression::None,
            response_message_len: 0,
            response_entity_len: 0,
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn request_progress(&self) -> Progress {
        self.request_progress
    }

    pub fn response_progress(&self) -> Progress {
        self.response_progress
    }

    /// Returns true once both sides reached completion.
    pub fn is_complete(&self) -> bool {
        self.request_progress == Progress::Complete && self.response_progress == Progress::Complete
    }

    pub fn request_line(&self) -> Option<&[u8]> {
        self.request_line.as_deref()
    }

    /// Raw request method as received.
    pub fn request_method(&self) -> Option<&[u8]> {
        self.request_method.as_deref()
    }

    /// The request method interpreted as an [`http::Method`].
    pub fn method(&self) -> Option<Method> {
        self.request_method.as_deref().and_then(|method| Method::from_bytes(method).ok())
    }

    /// Raw request target as received.
    pub fn request_uri(&self) -> Option<&[u8]> {
        self.request_uri.as_deref()
    }

    pub fn request_protocol(&self) -> Protocol {
        self.request_protocol
    }

    /// The request target split into its components, before normalization.
    pub fn parsed_uri(&self) -> Option<&Uri> {
        self.parsed_uri.as_ref()
    }

    /// Mutable access to the parsed target, used to adjust it before normalization.
    pub fn parsed_uri_mut(&mut self) -> Option<&mut Uri> {
        self.parsed_uri.as_mut()
    }

    /// The parsed target after path normalization, if normalization is enabled.
    pub fn normalized_uri(&self) -> Option<&Uri> {
        self.normalized_uri.as_ref()
    }

    pub fn request_headers(&self) -> &HeaderTable {
        &self.request_headers
    }

    pub fn request_trailers(&self) -> &HeaderTable {
        &self.request_trailers
    }

    pub fn request_payload(&self) -> Option<PayloadSize> {
        self.request_payload
    }

    pub fn request_content_encoding(&self) -> Compression {
        self.request_content_encoding
    }

    /// Request body bytes as seen on the wire, framing included.
    pub fn request_message_len(&self) -> u64 {
        self.request_message_len
    }

    /// Request body bytes after dechunking and decompression.
    pub fn request_entity_len(&self) -> u64 {
        self.request_entity_len
    }

    /// Status a server is expected to answer with, when path handling policies demand one.
    pub fn expected_status(&self) -> Option<u16> {
        self.expected_status
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn response_line(&self) -> Option<&[u8]> {
        self.response_line.as_deref()
    }

    pub fn response_protocol(&self) -> Protocol {
        self.response_protocol
    }

    /// Raw status code text as received.
    pub fn response_status(&self) -> Option<&[u8]> {
        self.response_status.as_deref()
    }

    pub fn response_status_number(&self) -> Option<u16> {
        self.response_status_number
    }

    /// The response status interpreted as an [`http::StatusCode`].
    pub fn status(&self) -> Option<StatusCode> {
        self.response_status_number.and_then(|number| StatusCode::from_u16(number).ok())
    }

    /// Reason phrase of the status line.
    pub fn response_message(&self) -> Option<&[u8]> {
        self.response_message.as_deref()
    }

    pub fn response_headers(&self) -> &HeaderTable {
        &self.response_headers
    }

    pub fn response_trailers(&self) -> &HeaderTable {
        &self.response_trailers
    }

    pub fn response_payload(&self) -> Option<PayloadSize> {
        self.response_payload
    }

    pub fn response_content_encoding(&self) -> Compression {
        self.response_content_encoding
    }

    /// Response body bytes as seen on the wire, framing included.
    pub fn response_message_len(&self) -> u64 {
        self.response_message_len
    }

    /// Response body bytes after dechunking and decompression.
    pub fn response_entity_len(&self) -> u64 {
        self.response_entity_len
    }

    pub(crate) fn is_connect(&self) -> bool {
        self.request_method.as_deref().is_some_and(|method| method.eq_ignore_ascii_case(b"CONNECT"))
    }

    pub(crate) fn is_head(&self) -> bool {
        self.request_method.as_deref().is_some_and(|method| method.eq_ignore_ascii_case(b"HEAD"))
    }
}
