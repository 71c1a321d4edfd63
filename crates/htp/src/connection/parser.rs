use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::connection::env::{ConnectState, Connection, Env};
use crate::connection::request::RequestSide;
use crate::connection::response::ResponseSide;
use crate::connection::stream::{self, Side, Stream};
use crate::connection::Transactions;
use crate::handler::{Artifact, HandlerResult, HookContext, HookPoint, Hooks};
use crate::protocol::{
    Direction, HeaderTable, HtpError, LogLevel, LogRecord, Protocol, StreamState, Transaction, TxId, Uri,
};

/// Parser for both directions of one HTTP connection.
///
/// The host feeds whatever bytes it received, in any split, and the parser fires
/// the registered hooks synchronously before `feed` returns. Requests and
/// responses are parsed independently; a response is paired with the oldest
/// request still waiting for one.
///
/// `U` is the type of the per-connection user context handed to every handler.
///
/// # Example
///
/// ```
/// use micro_htp::connection::ConnectionParser;
/// use micro_htp::handler::HookPoint;
/// use micro_htp::protocol::{Direction, HookResult, StreamState};
///
/// let mut parser: ConnectionParser = ConnectionParser::new();
/// parser.register(HookPoint::ResponseLine, |cx, _| {
///     assert_eq!(cx.tx().and_then(|tx| tx.response_status_number()), Some(200));
///     Ok(HookResult::Ok)
/// });
///
/// assert_eq!(parser.feed(Direction::Request, b"GET / HTTP/1.1\r\n\r\n"), StreamState::Data);
/// assert_eq!(parser.feed(Direction::Response, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"), StreamState::Data);
/// ```
#[derive(Debug)]
pub struct ConnectionParser<U = ()> {
    config: Arc<Config>,
    hooks: Hooks<U>,
    user: Option<U>,
    conn: Connection,
    request: RequestSide,
    response: ResponseSide,
}

impl<U> Default for ConnectionParser<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> ConnectionParser<U> {
    /// Creates a parser with the default configuration, which destroys transactions once complete.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a parser using `config`, which may be shared with other parsers.
    pub fn with_config(config: impl Into<Arc<Config>>) -> Self {
        let config = config.into();
        debug!(personality = ?config.personality(), "new connection parser");
        Self {
            request: RequestSide::new(&config),
            response: ResponseSide::new(&config),
            config,
            hooks: Hooks::new(),
            user: None,
            conn: Connection::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hooks(&self) -> &Hooks<U> {
        &self.hooks
    }

    /// Installs `handler` for `point`, replacing and dropping any previous one.
    ///
    /// Registering [`HookPoint::RequestFileData`] this way enables multipart parsing
    /// without writing files to disk, see [`register_file_data`](Self::register_file_data).
    pub fn register<F>(&mut self, point: HookPoint, handler: F)
    where
        F: FnMut(&mut HookContext<'_, U>, &Artifact<'_>) -> HandlerResult + 'static,
    {
        self.hooks.set(point, Box::new(handler));
    }

    /// Installs the file upload handler. With `extract` set, every uploaded file is
    /// also written to the configured temporary directory.
    pub fn register_file_data<F>(&mut self, handler: F, extract: bool)
    where
        F: FnMut(&mut HookContext<'_, U>, &Artifact<'_>) -> HandlerResult + 'static,
    {
        self.hooks.set(HookPoint::RequestFileData, Box::new(handler));
        self.hooks.set_extract_files(extract);
    }

    /// Removes the handler of `point`. Returns true if there was one.
    pub fn unregister(&mut self, point: HookPoint) -> bool {
        self.hooks.remove(point)
    }

    /// Attaches the value handed to every handler, returning the one it replaces.
    pub fn set_user_context(&mut self, user: U) -> Option<U> {
        self.user.replace(user)
    }

    pub fn clear_user_context(&mut self) -> Option<U> {
        self.user.take()
    }

    pub fn user_context(&self) -> Option<&U> {
        self.user.as_ref()
    }

    pub fn user_context_mut(&mut self) -> Option<&mut U> {
        self.user.as_mut()
    }

    /// Parses the next bytes of one direction.
    ///
    /// - [`StreamState::Data`]: everything was taken, more is welcome
    /// - [`StreamState::Stop`]: a handler stopped parsing, see [`resume`](Self::resume)
    /// - [`StreamState::Error`]: parsing failed for good, see [`failure`](Self::failure)
    /// - [`StreamState::DataOther`]: the remaining bytes are not for this direction yet
    /// - [`StreamState::Tunnel`]: the connection no longer carries HTTP
    /// - [`StreamState::Closed`]: the connection was closed
    ///
    /// [`bytes_consumed`](Self::bytes_consumed) tells how much of `data` was taken.
    pub fn feed(&mut self, direction: Direction, data: &[u8]) -> StreamState {
        let Self { config, hooks, user, conn, request, response } = self;
        let mut env = Env { config: &**config, conn, hooks, user };

        let state = match direction {
            Direction::Request => stream::feed(request, &mut env, data),
            Direction::Response => stream::feed(response, &mut env, data),
        };
        self.retire();
        state
    }

    pub fn request_data(&mut self, data: &[u8]) -> StreamState {
        self.feed(Direction::Request, data)
    }

    pub fn response_data(&mut self, data: &[u8]) -> StreamState {
        self.feed(Direction::Response, data)
    }

    /// Continues a direction stopped by a handler, starting with the events and
    /// bytes that were pending when it stopped. Other states are returned unchanged.
    pub fn resume(&mut self, direction: Direction) -> StreamState {
        let Self { config, hooks, user, conn, request, response } = self;
        let mut env = Env { config: &**config, conn, hooks, user };

        let state = match direction {
            Direction::Request => stream::resume(request, &mut env),
            Direction::Response => stream::resume(response, &mut env),
        };
        self.retire();
        state
    }

    /// Signals the end of the connection.
    ///
    /// A direction stopped by a handler is resumed first, so the events it still
    /// holds are delivered. A response delimited by the connection close then
    /// completes and its remaining hooks fire. Messages cut short are logged.
    /// Afterwards both directions are closed; a direction that failed stays in
    /// [`StreamState::Error`].
    pub fn close(&mut self) -> StreamState {
        let Self { config, hooks, user, conn, request, response } = self;
        let mut env = Env { config: &**config, conn, hooks, user };

        if is_open(response.stream_ref()) {
            let complete = response.close();
            finish(response, &mut env);
            if !complete {
                let tx = response.current_tx();
                env.log(LogLevel::Warning, "response incomplete at connection close", tx);
            }
        }

        if is_open(request.stream_ref()) {
            finish(request, &mut env);
            if !request.is_idle() {
                let tx = request.current_tx();
                env.log(LogLevel::Warning, "request incomplete at connection close", tx);
                request.reset();
            }
        }

        for stream in [request.stream(), response.stream()] {
            if stream.state != StreamState::Error {
                stream.state = StreamState::Closed;
            }
            stream.consumed = 0;
        }
        debug!(transactions = env.conn.txs.created(), "connection closed");

        self.retire();
        StreamState::Closed
    }

    fn retire(&mut self) {
        if self.config.tx_auto_destroy() {
            self.conn.txs.retire_done();
        }
    }

    /// Bytes of the last input of `direction` that were parsed.
    pub fn bytes_consumed(&self, direction: Direction) -> usize {
        self.stream(direction).consumed
    }

    /// The state of `direction`. `Open` means the last feed ended inside a message.
    pub fn stream_state(&self, direction: Direction) -> StreamState {
        let stream = self.stream(direction);
        match stream.state {
            StreamState::Data | StreamState::DataOther if self.conn.connect == ConnectState::Tunnel => {
                StreamState::Tunnel
            }
            StreamState::Data if !self.is_idle(direction) => StreamState::Open,
            state => state,
        }
    }

    fn stream(&self, direction: Direction) -> &Stream {
        match direction {
            Direction::Request => self.request.stream_ref(),
            Direction::Response => self.response.stream_ref(),
        }
    }

    fn is_idle(&self, direction: Direction) -> bool {
        match direction {
            Direction::Request => self.request.is_idle(),
            Direction::Response => self.response.is_idle(),
        }
    }

    /// Why `direction` failed, once it is in [`StreamState::Error`].
    pub fn failure(&self, direction: Direction) -> Option<&HtpError> {
        self.stream(direction).failure.as_ref()
    }

    /// The most recent log record at or above the configured level.
    pub fn last_error(&self) -> Option<&LogRecord> {
        self.conn.last_error.as_ref()
    }

    pub fn clear_error(&mut self) -> Option<LogRecord> {
        self.conn.last_error.take()
    }

    pub fn transactions(&self) -> &Transactions {
        &self.conn.txs
    }

    pub fn tx(&self, id: TxId) -> Option<&Transaction> {
        self.conn.txs.get(id)
    }

    /// The transaction most recently started by the request direction.
    pub fn request_tx(&self) -> Option<&Transaction> {
        self.conn.request_cursor.and_then(|id| self.conn.txs.get(id))
    }

    /// The transaction most recently started by the response direction.
    pub fn response_tx(&self) -> Option<&Transaction> {
        self.conn.response_cursor.and_then(|id| self.conn.txs.get(id))
    }

    pub fn request_method(&self) -> Option<&[u8]> {
        self.request_tx()?.request_method()
    }

    pub fn request_protocol(&self) -> Option<Protocol> {
        self.request_tx().map(Transaction::request_protocol)
    }

    /// Components of the current request target, normalized when normalization is enabled.
    pub fn current_request_uri(&self) -> Option<&Uri> {
        let tx = self.request_tx()?;
        tx.normalized_uri().or(tx.parsed_uri())
    }

    pub fn request_header(&self, name: &str) -> Option<&[u8]> {
        self.request_tx()?.request_headers().get(name)
    }

    pub fn request_headers(&self) -> Option<&HeaderTable> {
        self.request_tx().map(Transaction::request_headers)
    }

    pub fn request_message_len(&self) -> Option<u64> {
        self.request_tx().map(Transaction::request_message_len)
    }

    pub fn request_entity_len(&self) -> Option<u64> {
        self.request_tx().map(Transaction::request_entity_len)
    }

    pub fn response_status(&self) -> Option<u16> {
        self.response_tx()?.response_status_number()
    }

    pub fn response_protocol(&self) -> Option<Protocol> {
        self.response_tx().map(Transaction::response_protocol)
    }

    pub fn response_header(&self, name: &str) -> Option<&[u8]> {
        self.response_tx()?.response_headers().get(name)
    }

    pub fn response_headers(&self) -> Option<&HeaderTable> {
        self.response_tx().map(Transaction::response_headers)
    }

    pub fn response_message_len(&self) -> Option<u64> {
        self.response_tx().map(Transaction::response_message_len)
    }

    pub fn response_entity_len(&self) -> Option<u64> {
        self.response_tx().map(Transaction::response_entity_len)
    }
}

fn is_open(stream: &Stream) -> bool {
    !matches!(stream.state, StreamState::Error | StreamState::Closed)
}

/// Delivers what `side` still holds before the connection closes.
fn finish<S: Side, U>(side: &mut S, env: &mut Env<'_, U>) {
    let stream = side.stream();
    if stream.state == StreamState::Stop {
        debug!(direction = %stream.direction, pending = stream.pending.len(), "resuming stopped direction at close");
        stream.state = StreamState::Data;
    }

    let result = stream::drive(side, env);
    stream::settle(side, env, result, 0);

    // a handler may stop again, nothing would deliver the rest
    let dropped = side.stream().pending.len();
    if dropped > 0 {
        side.stream().pending.clear();
        let tx = side.current_tx();
        env.log(LogLevel::Warning, format!("{dropped} events dropped at connection close"), tx);
    }
}

impl<U> Drop for ConnectionParser<U> {
    fn drop(&mut self) {
        let pending = self.request.stream_ref().pending.len() + self.response.stream_ref().pending.len();
        if pending > 0 {
            warn!(pending, "connection parser dropped with undelivered events");
        }
    }
}
