//! Incremental `multipart/form-data` parser for request bodies.
//!
//! Only file parts, the ones carrying a `filename` in their `Content-Disposition`,
//! produce events. Form fields are skipped. When extraction is enabled every file is
//! also written to a fresh file in the configured directory; a file left incomplete
//! when the parser is dropped is removed again.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;
use tracing::{debug, trace, warn};

use crate::ensure;
use crate::protocol::ParseError;

/// RFC 2046 recommends multipart boundary length <= 70 characters.
const MAX_BOUNDARY_LEN: usize = 70;

/// Part headers are expected to be small.
const MAX_PART_HEADER_BYTES: usize = 8 * 1024;

static EXTRACT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Extracts the boundary from a `multipart/form-data` content type.
///
/// Returns `None` for any other content type, or when the boundary is missing or unusable.
pub fn parse_boundary(content_type: &[u8]) -> Option<String> {
    let content_type = std::str::from_utf8(content_type).ok()?.trim();
    let mut params = content_type.split(';');
    let main = params.next()?.trim();
    if !main.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }

    params.find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let boundary = value.trim().trim_matches('"');
        (!boundary.is_empty() && boundary.len() <= MAX_BOUNDARY_LEN).then(|| boundary.to_string())
    })
}

/// Something that happened to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartEvent {
    /// A piece of file content.
    FileData { data: Bytes, filename: Option<String>, tmpname: Option<PathBuf> },
    /// The file is complete.
    FileEnd { filename: Option<String>, tmpname: Option<PathBuf>, len: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    AfterBoundary,
    PartHeaders,
    PartData,
    Epilogue,
}

/// A file being extracted to disk.
#[derive(Debug)]
struct ExtractedFile {
    path: PathBuf,
    file: File,
    done: bool,
}

impl ExtractedFile {
    fn create(dir: &Path) -> io::Result<Self> {
        let ts_nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();

        for _ in 0..32 {
            let counter = EXTRACT_COUNTER.fetch_add(1, Ordering::Relaxed);
            let candidate = dir.join(format!("micro-htp-file-{}-{ts_nanos}-{counter}", std::process::id()));

            match OpenOptions::new().create_new(true).write(true).open(&candidate) {
                Ok(file) => return Ok(Self { path: candidate, file, done: false }),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err),
            }
        }

        Err(io::Error::new(io::ErrorKind::AlreadyExists, "failed to allocate unique extraction file"))
    }
}

impl Drop for ExtractedFile {
    fn drop(&mut self) {
        if !self.done {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[derive(Debug)]
struct Part {
    filename: Option<String>,
    extracted: Option<ExtractedFile>,
    len: u64,
}

impl Part {
    fn tmpname(&self) -> Option<PathBuf> {
        self.extracted.as_ref().map(|extracted| extracted.path.clone())
    }
}

/// Streaming multipart parser. Feed it body bytes in any split; it reports file events.
#[derive(Debug)]
pub struct MultipartParser {
    /// `\r\n--boundary`. The body is treated as if it began with CRLF, so the
    /// first delimiter looks like all the others.
    delimiter: Vec<u8>,
    state: State,
    buf: BytesMut,
    part: Option<Part>,
    extract_dir: Option<PathBuf>,
}

impl MultipartParser {
    /// `extract_dir` enables extraction of files into that directory.
    pub fn new(boundary: &str, extract_dir: Option<PathBuf>) -> Self {
        let mut buf = BytesMut::with_capacity(1024);
        buf.extend_from_slice(b"\r\n");
        Self {
            delimiter: format!("\r\n--{boundary}").into_bytes(),
            state: State::Preamble,
            buf,
            part: None,
            extract_dir,
        }
    }

    /// Returns true once the closing delimiter was seen.
    pub fn is_done(&self) -> bool {
        self.state == State::Epilogue
    }

    /// Parses the next piece of the body, appending resulting events to `events`.
    pub fn feed(&mut self, data: &[u8], events: &mut Vec<MultipartEvent>) -> Result<(), ParseError> {
        if self.state == State::Epilogue {
            return Ok(());
        }
        self.buf.extend_from_slice(data);

        loop {
            match self.state {
                State::Preamble => match memmem::find(&self.buf, &self.delimiter) {
                    Some(pos) => {
                        self.buf.advance(pos + self.delimiter.len());
                        self.state = State::AfterBoundary;
                    }
                    None => {
                        let keep = self.delimiter.len() - 1;
                        if self.buf.len() > keep {
                            self.buf.advance(self.buf.len() - keep);
                        }
                        return Ok(());
                    }
                },
                State::AfterBoundary => {
                    if self.buf.len() < 2 {
                        return Ok(());
                    }
                    match [self.buf[0], self.buf[1]] {
                        [b'-', b'-'] => {
                            trace!("closing multipart delimiter");
                            self.buf.clear();
                            self.state = State::Epilogue;
                            return Ok(());
                        }
                        [b'\r', b'\n'] => {
                            self.buf.advance(2);
                            self.state = State::PartHeaders;
                        }
                        [b' ' | b'\t', _] => self.buf.advance(1),
                        _ => return Err(ParseError::invalid_multipart("expected CRLF after boundary")),
                    }
                }
                State::PartHeaders => {
                    let header_end = if self.buf.starts_with(b"\r\n") {
                        Some((0, 2))
                    } else {
                        memmem::find(&self.buf, b"\r\n\r\n").map(|pos| (pos + 2, pos + 4))
                    };
                    let Some((block_len, consumed)) = header_end else {
                        ensure!(
                            self.buf.len() <= MAX_PART_HEADER_BYTES,
                            ParseError::too_large_header(self.buf.len(), MAX_PART_HEADER_BYTES)
                        );
                        return Ok(());
                    };

                    let block = self.buf.split_to(consumed);
                    self.open_part(&block[..block_len])?;
                    self.state = State::PartData;
                }
                State::PartData => match memmem::find(&self.buf, &self.delimiter) {
                    Some(pos) => {
                        let data = self.buf.split_to(pos).freeze();
                        self.buf.advance(self.delimiter.len());
                        self.part_data(data, events)?;
                        self.close_part(events)?;
                        self.state = State::AfterBoundary;
                    }
                    None => {
                        let safe = self.buf.len().saturating_sub(self.delimiter.len() - 1);
                        if safe > 0 {
                            let data = self.buf.split_to(safe).freeze();
                            self.part_data(data, events)?;
                        }
                        return Ok(());
                    }
                },
                State::Epilogue => return Ok(()),
            }
        }
    }

    /// Ends the body. A file still open is reported complete with what was received.
    pub fn finish(&mut self, events: &mut Vec<MultipartEvent>) -> Result<(), ParseError> {
        if self.state == State::PartData {
            warn!("multipart body ended without closing delimiter");
            let rest = self.buf.split().freeze();
            self.part_data(rest, events)?;
            self.close_part(events)?;
        }
        self.state = State::Epilogue;
        Ok(())
    }

    fn open_part(&mut self, headers: &[u8]) -> Result<(), ParseError> {
        let filename = headers
            .split(|b| *b == b'\n')
            .filter_map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                let colon = line.iter().position(|b| *b == b':')?;
                line[..colon].trim_ascii().eq_ignore_ascii_case(b"content-disposition").then(|| &line[colon + 1..])
            })
            .find_map(disposition_filename);

        let is_file = filename.is_some();
        debug!(filename = filename.as_deref().unwrap_or(""), is_file, "multipart part");

        if !is_file {
            self.part = Some(Part { filename: None, extracted: None, len: 0 });
            return Ok(());
        }

        let extracted = match &self.extract_dir {
            Some(dir) => Some(ExtractedFile::create(dir).map_err(ParseError::io)?),
            None => None,
        };
        self.part = Some(Part { filename, extracted, len: 0 });
        Ok(())
    }

    fn part_data(&mut self, data: Bytes, events: &mut Vec<MultipartEvent>) -> Result<(), ParseError> {
        let Some(part) = self.part.as_mut() else {
            return Ok(());
        };
        if data.is_empty() || part.filename.is_none() {
            return Ok(());
        }

        if let Some(extracted) = part.extracted.as_mut() {
            extracted.file.write_all(&data).map_err(ParseError::io)?;
        }
        part.len += data.len() as u64;
        events.push(MultipartEvent::FileData { data, filename: part.filename.clone(), tmpname: part.tmpname() });
        Ok(())
    }

    fn close_part(&mut self, events: &mut Vec<MultipartEvent>) -> Result<(), ParseError> {
        let Some(mut part) = self.part.take() else {
            return Ok(());
        };
        if part.filename.is_none() {
            return Ok(());
        }

        let tmpname = part.tmpname();
        if let Some(extracted) = part.extracted.as_mut() {
            extracted.file.flush().map_err(ParseError::io)?;
            extracted.done = true;
        }
        trace!(len = part.len, "multipart file complete");
        events.push(MultipartEvent::FileEnd { filename: part.filename.take(), tmpname, len: part.len });
        Ok(())
    }
}

/// Pulls `filename` out of a Content-Disposition value.
fn disposition_filename(value: &[u8]) -> Option<String> {
    let value = String::from_utf8_lossy(value);
    value.split(';').skip(1).find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.trim().eq_ignore_ascii_case("filename").then(|| value.trim().trim_matches('"').to_string())
    })
}
