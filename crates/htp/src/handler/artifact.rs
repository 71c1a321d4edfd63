use std::path::Path;

use crate::protocol::LogRecord;

/// The payload delivered to a handler along with its [`HookContext`](crate::handler::HookContext).
///
/// Everything borrowed here is only valid for the duration of the call. Copy what
/// must outlive it.
#[derive(Debug, Clone, Copy)]
pub enum Artifact<'a> {
    /// Transaction hooks carry nothing besides the transaction in the context.
    Transaction,
    /// Header, body and trailer data hooks.
    Data(DataChunk<'a>),
    /// The request file data hook.
    File(FileChunk<'a>),
    Log(&'a LogRecord),
}

impl<'a> Artifact<'a> {
    pub fn as_data(&self) -> Option<&DataChunk<'a>> {
        match self {
            Artifact::Data(chunk) => Some(chunk),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileChunk<'a>> {
        match self {
            Artifact::File(chunk) => Some(chunk),
            _ => None,
        }
    }

    pub fn as_log(&self) -> Option<&'a LogRecord> {
        match self {
            Artifact::Log(record) => Some(record),
            _ => None,
        }
    }

    /// The raw bytes of a data or file chunk.
    pub fn bytes(&self) -> Option<&'a [u8]> {
        match self {
            Artifact::Data(chunk) => Some(chunk.data()),
            Artifact::File(chunk) => Some(chunk.data()),
            Artifact::Transaction | Artifact::Log(_) => None,
        }
    }
}

/// A span of bytes with its length carried explicitly. Chunks may contain NUL bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataChunk<'a> {
    data: &'a [u8],
    len: usize,
}

impl<'a> DataChunk<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, len: data.len() }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A piece of an uploaded file.
///
/// The last chunk of every file is empty and marks its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileChunk<'a> {
    chunk: DataChunk<'a>,
    filename: Option<&'a str>,
    tmpname: Option<&'a Path>,
}

impl<'a> FileChunk<'a> {
    pub(crate) fn new(data: &'a [u8], filename: Option<&'a str>, tmpname: Option<&'a Path>) -> Self {
        Self { chunk: DataChunk::new(data), filename, tmpname }
    }

    pub fn data(&self) -> &'a [u8] {
        self.chunk.data()
    }

    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    /// Filename submitted by the client, if any.
    pub fn filename(&self) -> Option<&'a str> {
        self.filename
    }

    /// Path of the file being written, when extraction is enabled.
    pub fn tmpname(&self) -> Option<&'a Path> {
        self.tmpname
    }
}
