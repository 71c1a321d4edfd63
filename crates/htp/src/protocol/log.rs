use std::fmt;
use std::panic::Location;

use crate::protocol::LogLevel;
use crate::protocol::transaction::TxId;

/// A diagnostic emitted while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    /// Source file of the code that emitted the record.
    pub file: &'static str,
    pub line: u32,
    /// Transaction being parsed when the record was emitted, if any.
    pub tx: Option<TxId>,
}

impl LogRecord {
    #[track_caller]
    pub fn new(level: LogLevel, message: impl Into<String>, tx: Option<TxId>) -> Self {
        let location = Location::caller();
        Self { level, message: message.into(), file: location.file(), line: location.line(), tx }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({}:{})", self.level, self.message, self.file, self.line)
    }
}
