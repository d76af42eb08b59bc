use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::config::StreamConfig;
use crate::dns::DnsCache;
use crate::event::Event;

use super::task::{DirectionSummary, DirectionTask};
use super::{
    ConnectionKey, Direction, Flow, FlowTracker, StreamChunk, StreamKey, StreamRole, StreamStats,
    TcpFlags, TcpReassembler,
};

/// Capture time between idle-flow sweeps (microseconds).
const CLEANUP_INTERVAL_US: i64 = 1_000_000;

/// Counters for a whole run.
#[derive(Debug, Clone, Default)]
pub struct ManagerStats {
    pub segments: u64,
    /// Segments for unknown flows that could not open one.
    pub ignored_segments: u64,
    pub flows_created: u64,
    pub flows_closed: u64,
    pub flows_expired: u64,
    pub overflowed_directions: u64,
    /// Reassembly counters of every finalized direction.
    pub reassembly: StreamStats,
    pub http_request_streams: u64,
    pub http_response_streams: u64,
    pub opaque_streams: u64,
    pub messages: u64,
    pub framing_errors: u64,
    pub cancelled_tasks: u64,
}

impl ManagerStats {
    fn record_direction(&mut self, summary: &DirectionSummary) {
        match summary.role {
            StreamRole::HttpRequest => self.http_request_streams += 1,
            StreamRole::HttpResponse => self.http_response_streams += 1,
            StreamRole::Opaque => self.opaque_streams += 1,
            StreamRole::Unclassified => {}
        }
        self.messages += summary.messages as u64;
        if summary.framing_error {
            self.framing_errors += 1;
        }
        if summary.cancelled {
            self.cancelled_tasks += 1;
        }
    }
}

/// Central orchestrator for TCP stream processing.
///
/// Reassembly runs synchronously on the caller; each flow direction is
/// classified and parsed by its own task. Must be used inside a tokio
/// runtime.
pub struct StreamManager {
    flows: FlowTracker,
    reassembler: TcpReassembler,
    config: StreamConfig,
    dns: Arc<DnsCache>,
    events: mpsc::UnboundedSender<Event>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    /// Hand-off queues of live directions.
    senders: HashMap<StreamKey, mpsc::UnboundedSender<StreamChunk>>,
    tasks: JoinSet<DirectionSummary>,
    stats: ManagerStats,
    last_cleanup: Option<i64>,
}

impl StreamManager {
    pub fn new(
        config: StreamConfig,
        dns: Arc<DnsCache>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            flows: FlowTracker::new(),
            reassembler: TcpReassembler::new(config.max_pending_bytes),
            config,
            dns,
            events,
            shutdown_tx,
            shutdown_rx,
            senders: HashMap::new(),
            tasks: JoinSet::new(),
            stats: ManagerStats::default(),
            last_cleanup: None,
        }
    }

    /// Process a TCP segment.
    #[allow(clippy::too_many_arguments)]
    pub fn process_segment(
        &mut self,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        src_port: u16,
        dst_port: u16,
        seq: u32,
        flags: TcpFlags,
        payload: Bytes,
        frame_number: u64,
        timestamp: i64,
    ) {
        self.stats.segments += 1;
        self.maybe_cleanup(timestamp);

        // 1. Get or create flow
        let Some((flow, direction, created)) = self.flows.get_or_create(
            src_ip,
            src_port,
            dst_ip,
            dst_port,
            flags,
            payload.len(),
            frame_number,
            timestamp,
        ) else {
            self.stats.ignored_segments += 1;
            trace!(frame_number, "segment for unknown flow ignored");
            return;
        };
        let connection_id = flow.id;
        let key = flow.key.clone();

        // 2. Spawn direction tasks for a new flow
        if created {
            let flow = flow.clone();
            self.open_flow(&flow);
        }

        // 3. Reassemble
        let delivery = self
            .reassembler
            .submit(connection_id, direction, seq, flags, payload, timestamp);

        // 4. Hand ordered bytes to the direction task
        let stream_key = StreamKey {
            connection_id,
            direction,
        };
        if !delivery.chunks.is_empty() {
            if let Some(tx) = self.senders.get(&stream_key) {
                let closed = delivery.chunks.into_iter().any(|chunk| tx.send(chunk).is_err());
                if closed {
                    // Task finished early (opaque or framing error)
                    self.senders.remove(&stream_key);
                }
            }
        }

        // 5. Close the queue of a finished direction
        if delivery.terminal {
            if delivery.overflowed && self.senders.contains_key(&stream_key) {
                self.stats.overflowed_directions += 1;
            }
            self.senders.remove(&stream_key);
        }

        // 6. Finalize when both directions are done
        if self.reassembler.is_terminal(connection_id, Direction::ToServer)
            && self.reassembler.is_terminal(connection_id, Direction::ToClient)
        {
            self.finalize(&key, connection_id);
            self.flows.mark_closed(key, timestamp);
            self.stats.flows_closed += 1;
        }
    }

    fn open_flow(&mut self, flow: &Flow) {
        self.stats.flows_created += 1;
        debug!(
            connection_id = flow.id,
            client = %flow.client_ip(),
            client_port = flow.client_port(),
            server = %flow.server_ip(),
            server_port = flow.server_port(),
            "new flow"
        );

        for direction in [Direction::ToServer, Direction::ToClient] {
            let (tx, rx) = mpsc::unbounded_channel();
            let task = DirectionTask::new(
                flow.context(direction),
                self.config.clone(),
                Arc::clone(&self.dns),
                self.events.clone(),
                self.shutdown_rx.clone(),
            );
            self.tasks.spawn(task.run(rx));
            self.senders.insert(
                StreamKey {
                    connection_id: flow.id,
                    direction,
                },
                tx,
            );
        }
    }

    /// Close both queues and drop the flow's reassembly state.
    fn finalize(&mut self, key: &ConnectionKey, connection_id: u64) {
        for direction in [Direction::ToServer, Direction::ToClient] {
            self.senders.remove(&StreamKey {
                connection_id,
                direction,
            });
        }
        for (_, stats) in self.reassembler.remove(connection_id) {
            self.stats.reassembly.merge(&stats);
        }
        if self.flows.remove(key).is_some() {
            trace!(connection_id, "flow finalized");
        }
    }

    fn maybe_cleanup(&mut self, now: i64) {
        match self.last_cleanup {
            Some(last) if now - last < CLEANUP_INTERVAL_US => {}
            Some(_) => {
                self.last_cleanup = Some(now);
                self.cleanup_timeout(now);
            }
            None => self.last_cleanup = Some(now),
        }
    }

    /// Finalize flows idle for longer than the configured timeout.
    pub fn cleanup_timeout(&mut self, current_time: i64) -> Vec<Flow> {
        let removed = self
            .flows
            .cleanup_timeout(current_time, self.config.idle_timeout_us);

        for flow in &removed {
            debug!(connection_id = flow.id, "flow idle, finalizing");
            self.finalize(&flow.key, flow.id);
            self.stats.flows_expired += 1;
        }

        removed
    }

    /// Get all tracked flows.
    pub fn flows(&self) -> impl Iterator<Item = &Flow> {
        self.flows.flows()
    }

    /// Number of directions whose task is still being fed.
    pub fn live_directions(&self) -> usize {
        self.senders.len()
    }

    pub fn stats(&self) -> &ManagerStats {
        &self.stats
    }

    /// End of input: terminate every direction and wait for the tasks.
    ///
    /// Tasks get `drain_grace` to finish; any still running afterwards are
    /// signalled through the shutdown channel and aborted.
    pub async fn finish(mut self) -> ManagerStats {
        for flow in self.flows.drain() {
            self.finalize(&flow.key, flow.id);
        }
        self.senders.clear();

        let grace = self.config.drain_grace;
        let mut summaries = Vec::new();
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = self.tasks.join_next().await {
                match result {
                    Ok(summary) => summaries.push(summary),
                    Err(e) => warn!(error = %e, "direction task failed"),
                }
            }
        })
        .await;

        if drained.is_err() {
            let remaining = self.tasks.len();
            warn!(remaining, "drain grace period elapsed, cancelling direction tasks");
            let _ = self.shutdown_tx.send(true);
            self.tasks.abort_all();
            while let Some(result) = self.tasks.join_next().await {
                match result {
                    Ok(summary) => summaries.push(summary),
                    Err(e) if e.is_cancelled() => self.stats.cancelled_tasks += 1,
                    Err(e) => warn!(error = %e, "direction task failed"),
                }
            }
        }

        for summary in &summaries {
            self.stats.record_direction(summary);
        }
        self.stats
    }
}
