use bytes::Bytes;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::body::ContentDecoder;
use crate::codec::header::{HeaderBlock, StatusLine};
use crate::codec::{RequestInfo, ResponseDecoder, ResponseMessage};
use crate::config::Config;
use crate::connection::env::{ConnectState, Env, Event, Interrupt, Pause};
use crate::connection::stream::{Side, Stream};
use crate::handler::HookPoint;
use crate::protocol::{
    Compression, Direction, HtpError, LogLevel, PayloadItem, PayloadSize, Progress, Protocol, TxId,
};

/// The response direction.
#[derive(Debug)]
pub(crate) struct ResponseSide {
    stream: Stream,
    decoder: ResponseDecoder,
    tx: Option<TxId>,
    content: Option<ContentDecoder>,
    wire: u64,
    /// Set when the response being read ends HTTP on the connection.
    switching: bool,
}

impl ResponseSide {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            stream: Stream::new(Direction::Response),
            decoder: ResponseDecoder::new(config),
            tx: None,
            content: None,
            wire: 0,
            switching: false,
        }
    }

    pub(crate) fn stream_ref(&self) -> &Stream {
        &self.stream
    }

    /// Tells the decoder the connection closed. Returns false if a response was cut short.
    pub(crate) fn close(&mut self) -> bool {
        self.decoder.close()
    }

    fn tx_id(&self) -> Result<TxId, HtpError> {
        self.tx.ok_or(HtpError::NoTransaction { direction: Direction::Response })
    }

    /// Pairs the incoming response with the oldest request still waiting for one.
    fn bind<U>(&mut self, env: &mut Env<'_, U>) -> Option<TxId> {
        let id = env.conn.txs.awaiting_response()?;
        let tx = env.conn.txs.get_mut(id)?;

        let request = RequestInfo {
            is_head: tx.is_head(),
            is_connect: tx.is_connect(),
            is_http09: tx.request_protocol == Protocol::Http09,
        };
        tx.response_progress = Progress::Line;
        if request.is_http09 {
            tx.response_protocol = Protocol::Http09;
            tx.response_payload = Some(PayloadSize::UntilClose);
            tx.response_progress = Progress::Body;
        }

        trace!(%id, ?request, "response started");
        self.decoder.start(request);
        self.tx = Some(id);
        env.conn.response_cursor = Some(id);
        self.stream.pending.push_back(Event::Tx(HookPoint::ResponseStart, id));
        Some(id)
    }

    fn on_line<U>(&mut self, env: &mut Env<'_, U>, line: StatusLine) -> Result<(), Interrupt> {
        let id = self.tx_id()?;
        if line.is_interim() {
            env.log(LogLevel::Info, format!("interim response {} skipped", line.status_number), Some(id));
            return Ok(());
        }

        let protocol = line.protocol_version();
        debug!(%id, status = line.status_number, ?protocol, "status line");

        let tx = env.conn.tx_mut(id)?;
        tx.response_line = Some(line.line);
        tx.response_protocol = protocol;
        tx.response_status = Some(line.status);
        tx.response_status_number = Some(line.status_number);
        tx.response_message = Some(line.message);
        tx.response_progress = Progress::Headers;

        self.stream.pending.push_back(Event::Tx(HookPoint::ResponseLine, id));
        if protocol == Protocol::Unknown {
            env.log(LogLevel::Warning, "status line carries an unknown protocol", Some(id));
        }
        Ok(())
    }

    fn on_interim(&mut self, block: &HeaderBlock) -> Result<(), Interrupt> {
        let id = self.tx_id()?;
        trace!(%id, fields = block.headers.len(), "interim response headers dropped");
        Ok(())
    }

    fn on_headers<U>(&mut self, env: &mut Env<'_, U>, block: HeaderBlock, payload: PayloadSize) -> Result<(), Interrupt> {
        let id = self.tx_id()?;
        let HeaderBlock { raw, headers } = block;

        let compression = headers
            .get(http::header::CONTENT_ENCODING.as_str())
            .map_or(Compression::None, Compression::from_content_encoding);

        let tx = env.conn.tx_mut(id)?;
        tx.response_headers = headers;
        tx.response_payload = Some(payload);
        tx.response_content_encoding = compression;
        tx.response_progress = Progress::Body;

        let status = tx.response_status_number.unwrap_or_default();
        let is_connect = tx.is_connect();
        let success = (200..300).contains(&status);

        if status == 101 || (is_connect && success) {
            debug!(%id, status, "connection leaves HTTP after this response");
            self.switching = true;
        } else if is_connect && env.conn.connect == ConnectState::Waiting(id) {
            // the proxy refused, requests go on
            env.conn.connect = ConnectState::None;
        }

        if env.config.response_decompression() {
            self.content = ContentDecoder::new(compression);
        }

        self.stream.pending.push_back(Event::Data(HookPoint::ResponseHeaderData, id, raw));
        self.stream.pending.push_back(Event::Tx(HookPoint::ResponseHeaders, id));
        Ok(())
    }

    fn on_payload<U>(&mut self, env: &mut Env<'_, U>, item: PayloadItem) -> Result<(), Interrupt> {
        let id = self.tx_id()?;
        let wire = std::mem::take(&mut self.wire);
        env.conn.tx_mut(id)?.response_message_len += wire;

        match item {
            PayloadItem::Chunk(bytes) => {
                let decoded = match &mut self.content {
                    Some(content) => content.decode(&bytes)?,
                    None => bytes,
                };
                self.decoded_data(env, id, decoded)
            }
            PayloadItem::Trailer(raw) => {
                let trailers = self.decoder.header_decoder().parse_block(raw.clone())?;
                let tx = env.conn.tx_mut(id)?;
                tx.response_trailers = trailers;
                tx.response_progress = Progress::Trailer;
                self.stream.pending.push_back(Event::Data(HookPoint::ResponseTrailerData, id, raw));
                self.stream.pending.push_back(Event::Tx(HookPoint::ResponseTrailer, id));
                Ok(())
            }
            PayloadItem::Eof => {
                if let Some(mut content) = self.content.take() {
                    let rest = content.finish()?;
                    self.decoded_data(env, id, rest)?;
                }
                self.complete(env, id)
            }
        }
    }

    fn decoded_data<U>(&mut self, env: &mut Env<'_, U>, id: TxId, data: Bytes) -> Result<(), Interrupt> {
        if data.is_empty() {
            return Ok(());
        }
        env.conn.tx_mut(id)?.response_entity_len += data.len() as u64;
        self.stream.pending.push_back(Event::Data(HookPoint::ResponseBodyData, id, data));
        Ok(())
    }

    fn complete<U>(&mut self, env: &mut Env<'_, U>, id: TxId) -> Result<(), Interrupt> {
        let tx = env.conn.tx_mut(id)?;
        tx.response_progress = Progress::Complete;
        let tx_complete = tx.is_complete();

        debug!(%id, "response complete");
        self.stream.pending.push_back(Event::Tx(HookPoint::ResponseComplete, id));
        if tx_complete {
            self.stream.pending.push_back(Event::Tx(HookPoint::TransactionComplete, id));
        }

        if self.switching {
            env.conn.connect = ConnectState::Tunnel;
        }
        self.tx = None;
        self.content = None;
        Ok(())
    }
}

impl Side for ResponseSide {
    fn stream(&mut self) -> &mut Stream {
        &mut self.stream
    }

    fn step<U>(&mut self, env: &mut Env<'_, U>) -> Result<Option<Pause>, Interrupt> {
        if self.decoder.is_idle() {
            if env.conn.connect == ConnectState::Tunnel {
                return Ok(Some(Pause::Tunnel));
            }
            if self.stream.buf.is_empty() {
                return Ok(Some(Pause::NeedMore));
            }
            if self.bind(env).is_none() {
                trace!(buffered = self.stream.buf.len(), "response data without a request");
                return Ok(Some(Pause::DataOther));
            }
            self.wire = 0;
            return Ok(None);
        }

        let before = self.stream.buf.len();
        let message = self.decoder.decode(&mut self.stream.buf)?;
        self.wire += (before - self.stream.buf.len()) as u64;

        let Some(message) = message else {
            return Ok(Some(Pause::NeedMore));
        };
        match message {
            ResponseMessage::Line(line) => {
                self.wire = 0;
                self.on_line(env, line)?;
            }
            ResponseMessage::Interim(block) => {
                self.wire = 0;
                self.on_interim(&block)?;
            }
            ResponseMessage::Headers(block, payload) => {
                self.wire = 0;
                self.on_headers(env, block, payload)?;
            }
            ResponseMessage::Payload(item) => self.on_payload(env, item)?,
        }
        Ok(None)
    }

    fn is_idle(&self) -> bool {
        self.decoder.is_idle() && self.stream.buf.is_empty()
    }

    fn current_tx(&self) -> Option<TxId> {
        self.tx
    }

    fn reset(&mut self) {
        self.tx = None;
        self.content = None;
        self.wire = 0;
        self.switching = false;
    }
}
