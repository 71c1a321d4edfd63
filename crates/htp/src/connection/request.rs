use bytes::Bytes;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::body::ContentDecoder;
use crate::codec::header::{HeaderBlock, RequestLine};
use crate::codec::multipart::{parse_boundary, MultipartParser};
use crate::codec::{RequestDecoder, RequestMessage};
use crate::config::Config;
use crate::connection::env::{ConnectState, Env, Event, Interrupt, Pause};
use crate::connection::stream::{Side, Stream};
use crate::handler::HookPoint;
use crate::protocol::{
    Compression, Direction, HtpError, LogLevel, PayloadItem, PayloadSize, Progress, Protocol, TxId, Uri,
};

/// The request direction.
#[derive(Debug)]
pub(crate) struct RequestSide {
    stream: Stream,
    decoder: RequestDecoder,
    tx: Option<TxId>,
    content: Option<ContentDecoder>,
    multipart: Option<MultipartParser>,
    /// Body bytes taken from the wire and not yet accounted to the transaction.
    wire: u64,
}

impl RequestSide {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            stream: Stream::new(Direction::Request),
            decoder: RequestDecoder::new(config),
            tx: None,
            content: None,
            multipart: None,
            wire: 0,
        }
    }

    pub(crate) fn stream_ref(&self) -> &Stream {
        &self.stream
    }

    fn tx_id(&self) -> Result<TxId, HtpError> {
        self.tx.ok_or(HtpError::NoTransaction { direction: Direction::Request })
    }

    fn on_start<U>(&mut self, env: &mut Env<'_, U>) {
        let id = env.conn.txs.create();
        if let Some(tx) = env.conn.txs.get_mut(id) {
            tx.request_progress = Progress::Line;
        }
        self.tx = Some(id);
        env.conn.request_cursor = Some(id);
        trace!(%id, "request started");
        self.stream.pending.push_back(Event::Tx(HookPoint::RequestStart, id));
    }

    fn on_line<U>(&mut self, env: &mut Env<'_, U>, line: RequestLine) -> Result<(), Interrupt> {
        let id = self.tx_id()?;
        let protocol = line.protocol_version();
        let unknown_protocol = line.protocol.is_some() && protocol == Protocol::Unknown;

        let tx = env.conn.tx_mut(id)?;
        let is_connect = line.method.eq_ignore_ascii_case(b"CONNECT");
        let parsed = if is_connect { Uri::parse_authority(&line.uri) } else { Uri::parse(&line.uri) };
        debug!(%id, method = %String::from_utf8_lossy(&line.method), uri = %String::from_utf8_lossy(&line.uri), ?protocol, "request line");

        tx.request_line = Some(line.line);
        tx.request_method = Some(line.method);
        tx.request_uri = Some(line.uri);
        tx.request_protocol = protocol;
        tx.parsed_uri = Some(parsed);
        tx.request_progress = Progress::Headers;

        let pending = &mut self.stream.pending;
        pending.push_back(Event::Tx(HookPoint::RequestLine, id));
        pending.push_back(Event::Tx(HookPoint::RequestUriNormalize, id));
        if env.config.generate_request_uri_normalized() {
            pending.push_back(Event::NormalizeUri(id));
        }

        if unknown_protocol {
            env.log(LogLevel::Warning, "request line carries an unknown protocol", Some(id));
        }
        if protocol == Protocol::Http09 {
            self.complete(env, id)?;
        }
        Ok(())
    }

    fn on_headers<U>(&mut self, env: &mut Env<'_, U>, block: HeaderBlock, payload: PayloadSize) -> Result<(), Interrupt> {
        let id = self.tx_id()?;
        let HeaderBlock { raw, headers } = block;

        let compression = headers
            .get(http::header::CONTENT_ENCODING.as_str())
            .map_or(Compression::None, Compression::from_content_encoding);

        let boundary = if env.hooks.is_registered(HookPoint::RequestFileData) && !payload.is_empty() {
            headers.get(http::header::CONTENT_TYPE.as_str()).and_then(parse_boundary)
        } else {
            None
        };

        let tx = env.conn.tx_mut(id)?;
        tx.request_headers = headers;
        tx.request_payload = Some(payload);
        tx.request_content_encoding = compression;
        tx.request_progress = Progress::Body;

        if env.config.request_decompression() {
            self.content = ContentDecoder::new(compression);
        }
        if let Some(boundary) = boundary {
            let extract_dir = env.hooks.extract_files().then(|| env.config.tmp_dir().to_path_buf());
            debug!(%id, boundary, extract = extract_dir.is_some(), "multipart request body");
            self.multipart = Some(MultipartParser::new(&boundary, extract_dir));
        }

        self.stream.pending.push_back(Event::Data(HookPoint::RequestHeaderData, id, raw));
        self.stream.pending.push_back(Event::Tx(HookPoint::RequestHeaders, id));
        Ok(())
    }

    fn on_payload<U>(&mut self, env: &mut Env<'_, U>, item: PayloadItem) -> Result<(), Interrupt> {
        let id = self.tx_id()?;
        let wire = std::mem::take(&mut self.wire);
        env.conn.tx_mut(id)?.request_message_len += wire;

        match item {
            PayloadItem::Chunk(bytes) => self.body_data(env, id, bytes),
            PayloadItem::Trailer(raw) => {
                let trailers = self.decoder.header_decoder().parse_block(raw.clone())?;
                let tx = env.conn.tx_mut(id)?;
                tx.request_trailers = trailers;
                tx.request_progress = Progress::Trailer;
                self.stream.pending.push_back(Event::Data(HookPoint::RequestTrailerData, id, raw));
                self.stream.pending.push_back(Event::Tx(HookPoint::RequestTrailer, id));
                Ok(())
            }
            PayloadItem::Eof => {
                if let Some(mut content) = self.content.take() {
                    let rest = content.finish()?;
                    self.decoded_data(env, id, rest)?;
                }
                if let Some(mut multipart) = self.multipart.take() {
                    let mut events = Vec::new();
                    multipart.finish(&mut events)?;
                    self.stream.pending.extend(events.into_iter().map(|event| Event::File(id, event)));
                }
                self.complete(env, id)
            }
        }
    }

    fn body_data<U>(&mut self, env: &mut Env<'_, U>, id: TxId, bytes: Bytes) -> Result<(), Interrupt> {
        let decoded = match &mut self.content {
            Some(content) => content.decode(&bytes)?,
            None => bytes,
        };
        self.decoded_data(env, id, decoded)
    }

    fn decoded_data<U>(&mut self, env: &mut Env<'_, U>, id: TxId, data: Bytes) -> Result<(), Interrupt> {
        if data.is_empty() {
            return Ok(());
        }
        env.conn.tx_mut(id)?.request_entity_len += data.len() as u64;

        let mut events = Vec::new();
        if let Some(multipart) = &mut self.multipart {
            multipart.feed(&data, &mut events)?;
        }

        self.stream.pending.push_back(Event::Data(HookPoint::RequestBodyData, id, data));
        self.stream.pending.extend(events.into_iter().map(|event| Event::File(id, event)));
        Ok(())
    }

    fn complete<U>(&mut self, env: &mut Env<'_, U>, id: TxId) -> Result<(), Interrupt> {
        let tx = env.conn.tx_mut(id)?;
        tx.request_progress = Progress::Complete;
        let tx_complete = tx.is_complete();

        if tx.is_connect() {
            match (tx.response_progress, tx.response_status_number) {
                (Progress::NotStarted | Progress::Line | Progress::Headers, _) => {
                    env.conn.connect = ConnectState::Waiting(id);
                }
                (_, Some(status)) if (200..300).contains(&status) => env.conn.connect = ConnectState::Tunnel,
                _ => {}
            }
        }

        debug!(%id, "request complete");
        self.stream.pending.push_back(Event::Tx(HookPoint::RequestComplete, id));
        if tx_complete {
            self.stream.pending.push_back(Event::Tx(HookPoint::TransactionComplete, id));
        }
        self.tx = None;
        self.content = None;
        self.multipart = None;
        Ok(())
    }
}

impl Side for RequestSide {
    fn stream(&mut self) -> &mut Stream {
        &mut self.stream
    }

    fn step<U>(&mut self, env: &mut Env<'_, U>) -> Result<Option<Pause>, Interrupt> {
        if self.decoder.is_idle() {
            match env.conn.connect {
                ConnectState::None => {}
                ConnectState::Waiting(_) if self.stream.buf.is_empty() => return Ok(Some(Pause::NeedMore)),
                ConnectState::Waiting(_) => return Ok(Some(Pause::DataOther)),
                ConnectState::Tunnel => return Ok(Some(Pause::Tunnel)),
            }
        }

        let before = self.stream.buf.len();
        let message = self.decoder.decode(&mut self.stream.buf)?;
        self.wire += (before - self.stream.buf.len()) as u64;

        let Some(message) = message else {
            return Ok(Some(Pause::NeedMore));
        };
        match message {
            RequestMessage::Start => {
                self.wire = 0;
                self.on_start(env);
            }
            RequestMessage::Line(line) => {
                self.wire = 0;
                self.on_line(env, line)?;
            }
            RequestMessage::Headers(block, payload) => {
                self.wire = 0;
                self.on_headers(env, block, payload)?;
            }
            RequestMessage::Payload(item) => self.on_payload(env, item)?,
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
        // dropping the parser removes a partially extracted file
        self.multipart = None;
        self.wire = 0;
    }
}
