//! Per-direction classification and parsing task.
//!
//! Each flow direction gets one task fed by an unbounded queue of ordered
//! chunks. The task suspends on `recv()`; queue closure means the direction
//! has ended and whatever is buffered is the last chance to finish a message.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::config::StreamConfig;
use crate::dns::DnsCache;
use crate::event::Event;

use super::classifier::classify;
use super::message::{derive_url, Endpoint, HttpMessage, HttpRequest, HttpResponse};
use super::parsers::{HttpStreamParser, MessageHead, MessageKind, ParsedMessage, StreamParseResult};
use super::{Direction, StreamChunk, StreamContext, StreamRole};

/// How a direction task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionSummary {
    pub connection_id: u64,
    pub direction: Direction,
    pub role: StreamRole,
    pub bytes_received: u64,
    pub messages: usize,
    pub framing_error: bool,
    pub cancelled: bool,
}

/// Everything a direction task needs.
pub(crate) struct DirectionTask {
    ctx: StreamContext,
    config: StreamConfig,
    dns: Arc<DnsCache>,
    events: mpsc::UnboundedSender<Event>,
    shutdown: watch::Receiver<bool>,

    role: StreamRole,
    /// Bytes seen before classification was possible.
    preamble: BytesMut,
    parser: Option<HttpStreamParser>,
    /// (stream offset, capture timestamp) of each received chunk.
    timestamps: VecDeque<(u64, i64)>,
    summary: DirectionSummary,
}

/// Why the receive loop stopped.
enum Stop {
    /// Nothing more will be parsed; finish normally.
    Done,
    /// The event consumer is gone.
    Disconnected,
}

impl DirectionTask {
    pub(crate) fn new(
        ctx: StreamContext,
        config: StreamConfig,
        dns: Arc<DnsCache>,
        events: mpsc::UnboundedSender<Event>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let summary = DirectionSummary {
            connection_id: ctx.connection_id,
            direction: ctx.direction,
            role: StreamRole::Unclassified,
            bytes_received: 0,
            messages: 0,
            framing_error: false,
            cancelled: false,
        };
        Self {
            ctx,
            config,
            dns,
            events,
            shutdown,
            role: StreamRole::Unclassified,
            preamble: BytesMut::new(),
            parser: None,
            timestamps: VecDeque::new(),
            summary,
        }
    }

    /// Consume the queue until it closes, the direction turns out to be
    /// unparseable, or shutdown is signalled.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<StreamChunk>) -> DirectionSummary {
        loop {
            if *self.shutdown.borrow() {
                return self.cancelled();
            }

            let chunk = tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return self.cancelled();
                    }
                    continue;
                }
                chunk = rx.recv() => chunk,
            };

            let Some(chunk) = chunk else {
                self.finish().await;
                return self.done();
            };

            match self.on_chunk(chunk).await {
                Ok(()) => {}
                Err(Stop::Done) => return self.done(),
                Err(Stop::Disconnected) => {
                    trace!(connection_id = self.ctx.connection_id, "event receiver closed");
                    return self.done();
                }
            }
        }
    }

    async fn on_chunk(&mut self, chunk: StreamChunk) -> Result<(), Stop> {
        self.timestamps
            .push_back((self.summary.bytes_received, chunk.timestamp_us));
        self.summary.bytes_received += chunk.data.len() as u64;

        if self.parser.is_none() {
            self.preamble.extend_from_slice(&chunk.data);
            self.role = classify(&self.preamble, self.ctx.src_port, self.ctx.dst_port);
            self.summary.role = self.role;

            let kind = match self.role {
                StreamRole::Unclassified => return Ok(()),
                StreamRole::Opaque => {
                    debug!(
                        connection_id = self.ctx.connection_id,
                        direction = self.ctx.direction.as_str(),
                        src_port = self.ctx.src_port,
                        dst_port = self.ctx.dst_port,
                        "opaque stream, skipping"
                    );
                    return Err(Stop::Done);
                }
                StreamRole::HttpRequest => MessageKind::Request,
                StreamRole::HttpResponse => MessageKind::Response,
            };

            let mut parser = HttpStreamParser::new(kind, &self.config);
            parser.push(&self.preamble);
            self.preamble = BytesMut::new();
            self.parser = Some(parser);
        } else if let Some(parser) = self.parser.as_mut() {
            parser.push(&chunk.data);
        }

        self.drain().await
    }

    /// Emit every message the buffered bytes complete.
    async fn drain(&mut self) -> Result<(), Stop> {
        loop {
            let result = match self.parser.as_mut() {
                Some(parser) => parser.next_message(),
                None => return Ok(()),
            };
            match result {
                StreamParseResult::Complete(message) => self.emit(message).await?,
                StreamParseResult::NeedMore => {
                    self.release_timestamps();
                    return Ok(());
                }
                StreamParseResult::Error { message } => {
                    debug!(
                        connection_id = self.ctx.connection_id,
                        direction = self.ctx.direction.as_str(),
                        error = %message,
                        "HTTP framing error, abandoning direction"
                    );
                    self.summary.framing_error = true;
                    return Err(Stop::Done);
                }
            }
        }
    }

    /// End of stream: flush a message cut off mid-body.
    async fn finish(&mut self) {
        let Some(message) = self.parser.as_mut().and_then(|p| p.finish()) else {
            return;
        };
        // Nothing follows, so a closed receiver makes no difference here
        let _ = self.emit(message).await;
    }

    async fn emit(&mut self, parsed: ParsedMessage) -> Result<(), Stop> {
        let timestamp_us = self.timestamp_at(parsed.start_offset);
        let message = self.build(parsed, timestamp_us).await;
        self.summary.messages += 1;
        self.events
            .send(Event::from(message))
            .map_err(|_| Stop::Disconnected)
    }

    /// Capture time of the chunk holding stream offset `offset`.
    fn timestamp_at(&mut self, offset: u64) -> i64 {
        // Messages arrive in offset order, so older chunks can be dropped
        self.discard_timestamps_before(offset);
        self.timestamps.front().map(|(_, ts)| *ts).unwrap_or_default()
    }

    /// Keep only the chunks the parser may still need a timestamp from:
    /// the start of the message in progress, or the unconsumed bytes.
    fn release_timestamps(&mut self) {
        let Some(parser) = self.parser.as_ref() else {
            return;
        };
        let needed = parser.pending_start().unwrap_or_else(|| parser.consumed());
        self.discard_timestamps_before(needed);
    }

    fn discard_timestamps_before(&mut self, offset: u64) {
        while self.timestamps.len() >= 2 && self.timestamps[1].0 <= offset {
            self.timestamps.pop_front();
        }
    }

    async fn build(&self, parsed: ParsedMessage, timestamp_us: i64) -> HttpMessage {
        let (src_name, dst_name) = tokio::join!(
            self.dns.resolve(self.ctx.src_ip),
            self.dns.resolve(self.ctx.dst_ip)
        );
        let src = Endpoint {
            ip: self.ctx.src_ip,
            port: self.ctx.src_port,
            hostname: src_name,
        };
        let dst = Endpoint {
            ip: self.ctx.dst_ip,
            port: self.ctx.dst_port,
            hostname: dst_name,
        };

        match parsed.head {
            MessageHead::Request {
                method,
                target,
                version,
            } => {
                let host = parsed
                    .headers
                    .get("host")
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(String::from);
                let url = derive_url(
                    &target,
                    host.as_deref(),
                    dst.hostname.as_deref(),
                    dst.ip,
                    dst.port,
                );
                HttpMessage::Request(HttpRequest {
                    timestamp_us,
                    connection_id: self.ctx.connection_id,
                    src,
                    dst,
                    method,
                    target,
                    url,
                    version,
                    host,
                    headers: parsed.headers,
                    body: parsed.body,
                })
            }
            MessageHead::Response {
                version,
                code,
                reason,
            } => {
                let status_line = format!("{} {} {}", version, code, reason)
                    .trim_end()
                    .to_string();
                HttpMessage::Response(HttpResponse {
                    timestamp_us,
                    connection_id: self.ctx.connection_id,
                    src,
                    dst,
                    status_line,
                    status_code: code,
                    reason,
                    version,
                    headers: parsed.headers,
                    body: parsed.body,
                })
            }
        }
    }

    fn done(self) -> DirectionSummary {
        self.summary
    }

    fn cancelled(mut self) -> DirectionSummary {
        debug!(
            connection_id = self.ctx.connection_id,
            direction = self.ctx.direction.as_str(),
            "direction task cancelled"
        );
        self.summary.cancelled = true;
        self.summary
    }
}
