//! Shared state of both directions and the dispatch of parse events to hooks.

use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

use crate::codec::multipart::MultipartEvent;
use crate::codec::normalize::normalize_uri;
use crate::config::Config;
use crate::connection::Transactions;
use crate::handler::{Artifact, DataChunk, FileChunk, HookContext, HookPoint, Hooks};
use crate::protocol::{HookResult, HtpError, LogLevel, LogRecord, ParseError, Transaction, TxId, UploadedFile};

/// Something the decoder found that handlers get to see.
///
/// Decoding and dispatch are decoupled: a decoding step queues its events, and
/// the queue is drained before the next step, so a handler stopping the parser
/// leaves the buffer exactly at the first undecoded byte.
#[derive(Debug)]
pub(crate) enum Event {
    Tx(HookPoint, TxId),
    Data(HookPoint, TxId, Bytes),
    File(TxId, MultipartEvent),
    /// Normalizes the parsed target, after `request_uri_normalize` handlers had their say.
    NormalizeUri(TxId),
}

/// Why a direction stopped advancing before it ran out of input.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// A handler asked to stop.
    Stop,
    Fail(HtpError),
}

impl From<ParseError> for Interrupt {
    fn from(e: ParseError) -> Self {
        Interrupt::Fail(e.into())
    }
}

impl From<HtpError> for Interrupt {
    fn from(e: HtpError) -> Self {
        Interrupt::Fail(e)
    }
}

/// Why a direction stopped advancing without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pause {
    NeedMore,
    Tunnel,
    /// The bytes belong to something the parser is not ready for yet.
    DataOther,
}

/// Progress of a `CONNECT` exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ConnectState {
    #[default]
    None,
    /// The request went out, the response decides what comes next.
    Waiting(TxId),
    /// The connection no longer carries HTTP.
    Tunnel,
}

/// State both directions work on.
#[derive(Debug, Default)]
pub(crate) struct Connection {
    pub(crate) txs: Transactions,
    pub(crate) last_error: Option<LogRecord>,
    pub(crate) connect: ConnectState,
    /// Transaction most recently started by each direction.
    pub(crate) request_cursor: Option<TxId>,
    pub(crate) response_cursor: Option<TxId>,
}

impl Connection {
    pub(crate) fn tx_mut(&mut self, id: TxId) -> Result<&mut Transaction, HtpError> {
        self.txs.get_mut(id).ok_or(HtpError::MissingTransaction { tx: id })
    }
}

/// Everything a direction needs from the parser while it advances, borrowed field by field.
pub(crate) struct Env<'a, U> {
    pub(crate) config: &'a Config,
    pub(crate) conn: &'a mut Connection,
    pub(crate) hooks: &'a mut Hooks<U>,
    pub(crate) user: &'a mut Option<U>,
}

impl<U> Env<'_, U> {
    /// Emits a diagnostic: kept as the last error, traced, and handed to the `log` hook.
    ///
    /// Records more verbose than the configured level are dropped. The `log` hook
    /// cannot influence parsing; a failing log handler is only traced.
    #[track_caller]
    pub(crate) fn log(&mut self, level: LogLevel, message: impl Into<String>, tx: Option<TxId>) {
        if level > self.config.log_level() {
            return;
        }

        let record = LogRecord::new(level, message, tx);
        match level {
            LogLevel::Error => error!(tx = ?record.tx, file = record.file, line = record.line, "{}", record.message),
            LogLevel::Warning => warn!(tx = ?record.tx, file = record.file, line = record.line, "{}", record.message),
            LogLevel::Notice | LogLevel::Info => {
                info!(tx = ?record.tx, file = record.file, line = record.line, "{}", record.message);
            }
            LogLevel::Debug => debug!(tx = ?record.tx, file = record.file, line = record.line, "{}", record.message),
            LogLevel::Debug2 => trace!(tx = ?record.tx, file = record.file, line = record.line, "{}", record.message),
        }

        let tx = tx.and_then(|id| self.conn.txs.get_mut(id));
        let mut cx = HookContext::new(HookPoint::Log, self.config, tx, self.user.as_mut());
        if let Err(fault) = self.hooks.invoke(HookPoint::Log, &mut cx, &Artifact::Log(&record)) {
            error!(%fault, "log hook failed");
        }

        self.conn.last_error = Some(record);
    }

    /// Delivers one queued event.
    pub(crate) fn dispatch(&mut self, event: Event) -> Result<(), Interrupt> {
        match event {
            Event::Tx(point, id) => {
                let result = self.run_hook(point, id, &Artifact::Transaction);
                if point == HookPoint::TransactionComplete {
                    self.conn.txs.mark_done(id);
                }
                result
            }
            Event::Data(point, id, data) => self.run_hook(point, id, &Artifact::Data(DataChunk::new(&data))),
            Event::File(id, MultipartEvent::FileData { data, filename, tmpname }) => {
                let chunk = FileChunk::new(&data, filename.as_deref(), tmpname.as_deref());
                self.run_hook(HookPoint::RequestFileData, id, &Artifact::File(chunk))
            }
            Event::File(id, MultipartEvent::FileEnd { filename, tmpname, len }) => {
                if let Some(tx) = self.conn.txs.get_mut(id) {
                    tx.files.push(UploadedFile { filename: filename.clone(), tmpname: tmpname.clone(), len });
                }
                // a zero-length chunk marks the end of the file
                let chunk = FileChunk::new(&[], filename.as_deref(), tmpname.as_deref());
                self.run_hook(HookPoint::RequestFileData, id, &Artifact::File(chunk))
            }
            Event::NormalizeUri(id) => {
                self.normalize(id);
                Ok(())
            }
        }
    }

    fn run_hook(&mut self, point: HookPoint, id: TxId, artifact: &Artifact<'_>) -> Result<(), Interrupt> {
        let Some(tx) = self.conn.txs.get_mut(id) else {
            trace!(hook = %point, %id, "transaction already retired, event dropped");
            return Ok(());
        };

        let mut cx = HookContext::new(point, self.config, Some(tx), self.user.as_mut());
        match self.hooks.invoke(point, &mut cx, artifact) {
            Ok(HookResult::Ok | HookResult::Declined) => Ok(()),
            Ok(HookResult::Stop) => {
                debug!(hook = %point, %id, "hook asked to stop");
                Err(Interrupt::Stop)
            }
            Ok(HookResult::Error) => Err(Interrupt::Fail(HtpError::hook_rejected(point))),
            Err(fault) => Err(Interrupt::Fail(fault.into())),
        }
    }

    fn normalize(&mut self, id: TxId) {
        let Some(tx) = self.conn.txs.get_mut(id) else {
            return;
        };
        let Some(parsed) = tx.parsed_uri.as_ref() else {
            return;
        };

        let normalized = normalize_uri(parsed, self.config.path());
        tx.normalized_uri = Some(normalized.uri);
        tx.expected_status = normalized.expected_status;

        for warning in normalized.warnings {
            self.log(LogLevel::Warning, warning, Some(id));
        }
    }
}
