//! HTTP/1.x stream parser using httparse for header parsing.
//!
//! The parser is fed the ordered bytes of one flow direction and yields one
//! message at a time. It supports:
//! - HTTP/1.0 and HTTP/1.1 requests and responses
//! - Chunked transfer encoding (optional)
//! - Content-Length based bodies, kept up to a cap and skipped beyond it
//! - gzip content-encoding
//! - Keep-alive connections with multiple messages per stream
//!
//! Body bytes past the cap are dropped as they arrive, so a direction never
//! holds more than one header block, the kept body, and one input run.

use std::io::Read;

use bytes::{Buf, Bytes, BytesMut};
use flate2::read::GzDecoder;
use httparse::{Request, Response, Status, EMPTY_HEADER};
use tracing::debug;

use crate::config::StreamConfig;
use crate::stream::message::{Body, Headers};

/// Maximum number of headers to parse per message.
const MAX_HEADERS: usize = 100;

/// Longest accepted chunk-size line.
const MAX_CHUNK_LINE: usize = 1024;

/// Which side of the conversation the parser reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

/// Start line of a parsed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageHead {
    Request {
        method: String,
        target: String,
        version: String,
    },
    Response {
        version: String,
        code: u16,
        reason: String,
    },
}

/// A complete (or, at end of stream, truncated) message.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    /// Stream offset of the first byte of the start line.
    pub start_offset: u64,
    pub head: MessageHead,
    pub headers: Headers,
    pub body: Option<Body>,
}

/// Result of asking the parser for the next message.
#[derive(Debug)]
pub enum StreamParseResult {
    /// One message was framed.
    Complete(ParsedMessage),

    /// Need more data before parsing can proceed.
    NeedMore,

    /// Parse error - stream is malformed and the parser is now dead.
    Error { message: String },
}

/// Body bytes collected for the message in progress.
#[derive(Debug)]
struct BodyAccumulator {
    data: BytesMut,
    wire_length: u64,
    limit: usize,
}

impl BodyAccumulator {
    fn new(limit: usize) -> Self {
        Self {
            data: BytesMut::new(),
            wire_length: 0,
            limit,
        }
    }

    fn extend(&mut self, bytes: &[u8]) {
        self.wire_length += bytes.len() as u64;
        let room = self.limit.saturating_sub(self.data.len());
        let keep = room.min(bytes.len());
        self.data.extend_from_slice(&bytes[..keep]);
    }
}

#[derive(Debug)]
struct PendingMessage {
    start_offset: u64,
    head: MessageHead,
    headers: Headers,
    body: BodyAccumulator,
}

#[derive(Debug, Clone, Copy)]
enum ChunkState {
    Size,
    Data { remaining: u64 },
    DataEnd,
    Trailers,
}

#[derive(Debug)]
enum ParseState {
    Head,
    Body {
        pending: PendingMessage,
        remaining: u64,
    },
    Chunked {
        pending: PendingMessage,
        chunk: ChunkState,
    },
    Failed,
}

/// Incremental HTTP/1.x parser for one flow direction.
#[derive(Debug)]
pub struct HttpStreamParser {
    kind: MessageKind,
    max_head_size: usize,
    max_body_size: usize,
    decode_chunked: bool,
    buf: BytesMut,
    /// Stream offset of `buf[0]`.
    offset: u64,
    state: ParseState,
    messages_parsed: usize,
}

impl HttpStreamParser {
    pub fn new(kind: MessageKind, config: &StreamConfig) -> Self {
        Self {
            kind,
            max_head_size: config.max_head_size,
            max_body_size: config.max_body_size,
            decode_chunked: config.decode_chunked,
            buf: BytesMut::new(),
            offset: 0,
            state: ParseState::Head,
            messages_parsed: 0,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Number of messages framed so far.
    pub fn messages_parsed(&self) -> usize {
        self.messages_parsed
    }

    /// Stream offset of the next unconsumed byte.
    pub fn consumed(&self) -> u64 {
        self.offset
    }

    /// Stream offset where the message in progress began, if its head has
    /// been parsed.
    pub fn pending_start(&self) -> Option<u64> {
        match &self.state {
            ParseState::Body { pending, .. } | ParseState::Chunked { pending, .. } => {
                Some(pending.start_offset)
            }
            ParseState::Head | ParseState::Failed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, ParseState::Failed)
    }

    /// Append ordered stream bytes.
    pub fn push(&mut self, data: &[u8]) {
        if !self.is_failed() {
            self.buf.extend_from_slice(data);
        }
    }

    /// Frame the next message from the buffered bytes.
    ///
    /// Call repeatedly after each [`push`](Self::push) until it returns
    /// `NeedMore`.
    pub fn next_message(&mut self) -> StreamParseResult {
        loop {
            let state = std::mem::replace(&mut self.state, ParseState::Failed);
            match state {
                ParseState::Failed => return StreamParseResult::NeedMore,

                ParseState::Head => match self.parse_head() {
                    Ok(Some(pending)) => self.state = self.body_state(pending),
                    Ok(None) => {
                        self.state = ParseState::Head;
                        return StreamParseResult::NeedMore;
                    }
                    Err(message) => return self.fail(message),
                },

                ParseState::Body {
                    mut pending,
                    remaining,
                } => {
                    let remaining = self.take_body(&mut pending, remaining);
                    if remaining == 0 {
                        self.state = ParseState::Head;
                        return self.complete(pending, false);
                    }
                    self.state = ParseState::Body { pending, remaining };
                    return StreamParseResult::NeedMore;
                }

                ParseState::Chunked { mut pending, chunk } => {
                    match self.advance_chunked(&mut pending, chunk) {
                        Ok(Some(chunk)) => {
                            self.state = ParseState::Chunked { pending, chunk };
                            return StreamParseResult::NeedMore;
                        }
                        Ok(None) => {
                            self.state = ParseState::Head;
                            return self.complete(pending, false);
                        }
                        Err(message) => return self.fail(message),
                    }
                }
            }
        }
    }

    /// Signal end of stream.
    ///
    /// A message cut off mid-body is returned with `truncated` set; a
    /// partial header block is discarded.
    pub fn finish(&mut self) -> Option<ParsedMessage> {
        let state = std::mem::replace(&mut self.state, ParseState::Failed);
        match state {
            ParseState::Body { pending, .. } | ParseState::Chunked { pending, .. } => {
                match self.complete(pending, true) {
                    StreamParseResult::Complete(message) => Some(message),
                    _ => None,
                }
            }
            ParseState::Head => {
                if !self.buf.is_empty() {
                    debug!(
                        bytes = self.buf.len(),
                        offset = self.offset,
                        "stream ended inside a header block"
                    );
                }
                None
            }
            ParseState::Failed => None,
        }
    }

    fn fail(&mut self, message: String) -> StreamParseResult {
        self.state = ParseState::Failed;
        self.buf.clear();
        StreamParseResult::Error { message }
    }

    fn consume(&mut self, n: usize) {
        self.buf.advance(n);
        self.offset += n as u64;
    }

    /// Parse the start line and headers if the block is complete.
    fn parse_head(&mut self) -> Result<Option<PendingMessage>, String> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut headers = [EMPTY_HEADER; MAX_HEADERS];
        let parsed = match self.kind {
            MessageKind::Request => {
                let mut req = Request::new(&mut headers);
                match req.parse(&self.buf) {
                    Ok(Status::Complete(header_len)) => Some((
                        header_len,
                        MessageHead::Request {
                            method: req.method.unwrap_or_default().to_string(),
                            target: req.path.unwrap_or_default().to_string(),
                            version: format!("HTTP/1.{}", req.version.unwrap_or(1)),
                        },
                        collect_headers(req.headers),
                    )),
                    Ok(Status::Partial) => None,
                    Err(e) => return Err(format!("invalid request head: {}", e)),
                }
            }
            MessageKind::Response => {
                let mut resp = Response::new(&mut headers);
                match resp.parse(&self.buf) {
                    Ok(Status::Complete(header_len)) => Some((
                        header_len,
                        MessageHead::Response {
                            version: format!("HTTP/1.{}", resp.version.unwrap_or(1)),
                            code: resp.code.unwrap_or_default(),
                            reason: resp.reason.unwrap_or_default().to_string(),
                        },
                        collect_headers(resp.headers),
                    )),
                    Ok(Status::Partial) => None,
                    Err(e) => return Err(format!("invalid response head: {}", e)),
                }
            }
        };

        match parsed {
            Some((header_len, head, headers)) => {
                // httparse skips blank lines before the start line
                let leading = self.buf[..header_len]
                    .iter()
                    .take_while(|b| **b == b'\r' || **b == b'\n')
                    .count();
                let start_offset = self.offset + leading as u64;
                self.consume(header_len);
                Ok(Some(PendingMessage {
                    start_offset,
                    head,
                    headers,
                    body: BodyAccumulator::new(self.max_body_size),
                }))
            }
            None if self.buf.len() > self.max_head_size => Err(format!(
                "header block exceeds {} bytes",
                self.max_head_size
            )),
            None => Ok(None),
        }
    }

    /// Decide how the body of a freshly parsed head is framed.
    fn body_state(&self, pending: PendingMessage) -> ParseState {
        if let MessageHead::Response { code, .. } = &pending.head {
            if (100..200).contains(code) || *code == 204 || *code == 304 {
                return ParseState::Body {
                    pending,
                    remaining: 0,
                };
            }
        }

        if self.decode_chunked && is_chunked(&pending.headers) {
            return ParseState::Chunked {
                pending,
                chunk: ChunkState::Size,
            };
        }

        let remaining = content_length(&pending.headers).unwrap_or(0);
        ParseState::Body { pending, remaining }
    }

    /// Move up to `remaining` buffered bytes into the body.
    fn take_body(&mut self, pending: &mut PendingMessage, remaining: u64) -> u64 {
        let n = remaining.min(self.buf.len() as u64) as usize;
        if n > 0 {
            pending.body.extend(&self.buf[..n]);
            self.consume(n);
        }
        remaining - n as u64
    }

    /// Run the chunk decoder. `Ok(None)` means the body is complete;
    /// `Ok(Some(state))` means more bytes are needed.
    fn advance_chunked(
        &mut self,
        pending: &mut PendingMessage,
        mut chunk: ChunkState,
    ) -> Result<Option<ChunkState>, String> {
        loop {
            chunk = match chunk {
                ChunkState::Size => {
                    let Some(line_end) = find_crlf(&self.buf) else {
                        if self.buf.len() > MAX_CHUNK_LINE {
                            return Err("chunk size line too long".to_string());
                        }
                        return Ok(Some(chunk));
                    };
                    let size = parse_chunk_size(&self.buf[..line_end])?;
                    self.consume(line_end + 2);
                    if size == 0 {
                        ChunkState::Trailers
                    } else {
                        ChunkState::Data { remaining: size }
                    }
                }
                ChunkState::Data { remaining } => {
                    let remaining = self.take_body(pending, remaining);
                    if remaining > 0 {
                        return Ok(Some(ChunkState::Data { remaining }));
                    }
                    ChunkState::DataEnd
                }
                ChunkState::DataEnd => {
                    if self.buf.len() < 2 {
                        return Ok(Some(chunk));
                    }
                    if &self.buf[..2] != b"\r\n" {
                        return Err("missing CRLF after chunk data".to_string());
                    }
                    self.consume(2);
                    ChunkState::Size
                }
                ChunkState::Trailers => {
                    let Some(line_end) = find_crlf(&self.buf) else {
                        if self.buf.len() > self.max_head_size {
                            return Err("trailer section too long".to_string());
                        }
                        return Ok(Some(chunk));
                    };
                    self.consume(line_end + 2);
                    if line_end == 0 {
                        return Ok(None);
                    }
                    ChunkState::Trailers
                }
            };
        }
    }

    fn complete(&mut self, pending: PendingMessage, cut_short: bool) -> StreamParseResult {
        self.messages_parsed += 1;
        let body = finish_body(&pending.headers, pending.body, cut_short, self.max_body_size);
        StreamParseResult::Complete(ParsedMessage {
            start_offset: pending.start_offset,
            head: pending.head,
            headers: pending.headers,
            body,
        })
    }
}

fn collect_headers(raw: &[httparse::Header]) -> Headers {
    let mut headers = Headers::new();
    for header in raw.iter().filter(|h| !h.name.is_empty()) {
        headers.push(header.name, String::from_utf8_lossy(header.value).into_owned());
    }
    headers
}

/// Check if the final transfer coding is chunked.
fn is_chunked(headers: &Headers) -> bool {
    headers
        .get_all("transfer-encoding")
        .flat_map(|v| v.split(','))
        .last()
        .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

fn content_length(headers: &Headers) -> Option<u64> {
    headers
        .get("content-length")
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, String> {
    let line = std::str::from_utf8(line).map_err(|_| "chunk size is not ASCII".to_string())?;
    // Handle chunk extensions (anything after semicolon)
    let size_part = line.split(';').next().unwrap_or(line).trim();
    u64::from_str_radix(size_part, 16).map_err(|_| format!("invalid chunk size {:?}", size_part))
}

fn is_gzip(headers: &Headers) -> bool {
    headers
        .get("content-encoding")
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip")
        })
        .unwrap_or(false)
}

/// Turn the accumulated bytes into the exposed body.
fn finish_body(
    headers: &Headers,
    acc: BodyAccumulator,
    cut_short: bool,
    limit: usize,
) -> Option<Body> {
    if acc.wire_length == 0 && !cut_short {
        return None;
    }

    let truncated = cut_short || acc.wire_length > acc.data.len() as u64;
    let raw = acc.data.freeze();
    let mut body = Body {
        data: raw.clone(),
        wire_length: acc.wire_length,
        decompressed: false,
        decompress_failed: false,
        truncated,
    };

    if is_gzip(headers) && !raw.is_empty() {
        match gunzip(&raw, limit) {
            Ok((data, capped)) => {
                body.data = data;
                body.decompressed = true;
                body.truncated |= capped;
            }
            Err(e) => {
                debug!(error = %e, "gzip body could not be decoded");
                body.decompress_failed = true;
            }
        }
    }

    Some(body)
}

/// Decode a gzip body, keeping at most `limit` bytes of output.
fn gunzip(data: &[u8], limit: usize) -> std::io::Result<(Bytes, bool)> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)?;
    let capped = out.len() > limit;
    out.truncate(limit);
    Ok((Bytes::from(out), capped))
}
