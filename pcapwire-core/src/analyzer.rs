//! Capture-to-events pipeline.
//!
//! The [`Analyzer`] decodes captured frames, feeds DNS answers into the
//! shared [`DnsCache`] and hands TCP segments to the [`StreamManager`].
//! File reading happens on the blocking pool and reaches the coordinator
//! through a bounded channel, so a slow consumer throttles the reader.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::AnalyzerConfig;
use crate::dns::DnsCache;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::io::{PcapReader, RawPacket};
use crate::protocol::{
    decode_packet, parse_message, CaptureRecord, DecodeError, DnsMessage, Transport, DNS_PORT,
};
use crate::stream::{ManagerStats, StreamManager};

/// Packets buffered between the file reader and the coordinator.
const READER_CHANNEL_CAPACITY: usize = 1024;

/// Counters for a finished run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisSummary {
    pub packets: u64,
    /// Frames that could not be decoded to an IP packet.
    pub undecodable: u64,
    /// Non-initial IP fragments, skipped.
    pub fragments: u64,
    pub tcp_segments: u64,
    /// TCP segments excluded by the port filter.
    pub filtered_segments: u64,
    pub udp_datagrams: u64,
    pub dns_messages: u64,
    pub dns_errors: u64,
    /// A/AAAA answers recorded in the DNS cache.
    pub dns_answers: u64,
    pub first_timestamp_us: Option<i64>,
    pub last_timestamp_us: Option<i64>,
    pub streams: ManagerStats,
    /// Forward entries in the DNS cache at the end of the run.
    pub dns_cache_entries: usize,
    /// Reverse lookups issued during the run.
    pub reverse_lookups: u64,
}

/// Drives one analysis run. Must be used inside a tokio runtime.
pub struct Analyzer {
    config: AnalyzerConfig,
    dns: Arc<DnsCache>,
    manager: StreamManager,
    events: mpsc::UnboundedSender<Event>,
    summary: AnalysisSummary,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig, events: mpsc::UnboundedSender<Event>) -> Self {
        let dns = Arc::new(DnsCache::new(config.dns.clone()));
        Self::with_dns(config, dns, events)
    }

    /// Analyzer sharing an existing cache (and therefore its resolver).
    pub fn with_dns(
        config: AnalyzerConfig,
        dns: Arc<DnsCache>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let manager = StreamManager::new(config.stream.clone(), Arc::clone(&dns), events.clone());
        Self {
            config,
            dns,
            manager,
            events,
            summary: AnalysisSummary::default(),
        }
    }

    pub fn dns(&self) -> &Arc<DnsCache> {
        &self.dns
    }

    pub fn summary(&self) -> &AnalysisSummary {
        &self.summary
    }

    /// Analyze a capture file to completion.
    ///
    /// Capture-source failures (open, format, read) abort the run.
    pub async fn run(mut self, path: impl AsRef<Path>) -> Result<AnalysisSummary> {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "starting analysis");

        let (tx, mut rx) = mpsc::channel::<Result<RawPacket>>(READER_CHANNEL_CAPACITY);
        let read_task = tokio::task::spawn_blocking(move || read_packets(path, tx));

        while let Some(item) = rx.recv().await {
            let packet = item?;
            self.process_packet(&packet);
        }

        read_task.await.map_err(|e| Error::ReaderAborted {
            reason: e.to_string(),
        })?;

        Ok(self.finish().await)
    }

    /// Decode and process one captured frame.
    pub fn process_packet(&mut self, packet: &RawPacket) {
        self.summary.packets += 1;
        match decode_packet(packet) {
            Ok(record) => self.process_record(record),
            Err(DecodeError::Fragment) => {
                self.summary.fragments += 1;
                trace!(frame = packet.frame_number, "skipping non-initial fragment");
            }
            Err(e) => {
                self.summary.undecodable += 1;
                trace!(frame = packet.frame_number, error = %e, "undecodable packet");
            }
        }
    }

    /// Process one decoded packet.
    pub fn process_record(&mut self, record: CaptureRecord) {
        let ts = record.timestamp_us;
        self.summary.first_timestamp_us.get_or_insert(ts);
        self.summary.last_timestamp_us = Some(ts);

        match record.transport {
            Transport::Tcp(segment) => {
                self.summary.tcp_segments += 1;
                if !self.config.should_track(segment.src_port, segment.dst_port) {
                    self.summary.filtered_segments += 1;
                    return;
                }
                self.manager.process_segment(
                    record.src_ip,
                    record.dst_ip,
                    segment.src_port,
                    segment.dst_port,
                    segment.seq,
                    segment.flags,
                    segment.payload,
                    record.frame_number,
                    ts,
                );
            }
            Transport::Udp(ref datagram) => {
                self.summary.udp_datagrams += 1;
                if datagram.src_port != DNS_PORT && datagram.dst_port != DNS_PORT {
                    return;
                }
                match parse_message(&datagram.payload) {
                    Ok(message) => self.on_dns(&record, ts, message),
                    Err(e) => {
                        self.summary.dns_errors += 1;
                        trace!(frame = record.frame_number, error = %e, "malformed DNS payload");
                    }
                }
            }
            Transport::Other(_) => {}
        }
    }

    fn on_dns(&mut self, record: &CaptureRecord, ts: i64, message: DnsMessage) {
        self.summary.dns_messages += 1;

        if message.is_response {
            for answer in &message.answers {
                if let Some(ip) = answer.address() {
                    self.dns.record_answer(ip, &answer.name);
                    self.summary.dns_answers += 1;
                }
            }
        }

        if !self.config.report_dns {
            return;
        }
        let Some(question) = message.question else {
            return;
        };
        let event = if message.is_response {
            Event::DnsResponse {
                timestamp_us: ts,
                src_ip: record.src_ip,
                dst_ip: record.dst_ip,
                name: question.name,
                answers: message.answers,
            }
        } else {
            Event::DnsQuery {
                timestamp_us: ts,
                src_ip: record.src_ip,
                dst_ip: record.dst_ip,
                name: question.name,
                qtype: question.qtype,
            }
        };
        let _ = self.events.send(event);
    }

    /// End of input: drain every flow and wait for the parsing tasks.
    pub async fn finish(self) -> AnalysisSummary {
        let Analyzer {
            dns,
            manager,
            mut summary,
            ..
        } = self;

        summary.streams = manager.finish().await;
        summary.dns_cache_entries = dns.forward_len();
        summary.reverse_lookups = dns.lookup_count();

        debug!(
            packets = summary.packets,
            messages = summary.streams.messages,
            "analysis finished"
        );
        summary
    }
}

/// Blocking reader loop feeding the coordinator.
fn read_packets(path: PathBuf, tx: mpsc::Sender<Result<RawPacket>>) {
    let mut reader = match PcapReader::open(&path) {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.blocking_send(Err(e));
            return;
        }
    };

    loop {
        match reader.next_packet() {
            Ok(Some(packet)) => {
                if tx.blocking_send(Ok(packet)).is_err() {
                    // Receiver dropped, stop reading
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        }
    }

    debug!(frames = reader.frame_count(), "capture fully read");
}
