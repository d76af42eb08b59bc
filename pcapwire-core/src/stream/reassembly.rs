use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use smallvec::SmallVec;
use tracing::{trace, warn};

use super::{Direction, StreamChunk, TcpFlags};

/// A TCP segment waiting to be reassembled.
#[derive(Debug, Clone)]
pub struct Segment {
    pub seq: u32,
    pub data: Bytes,
    pub timestamp: i64,
}

/// Result of submitting one segment to a direction.
#[derive(Debug, Default)]
pub struct Delivery {
    /// Newly contiguous byte runs, in stream order.
    pub chunks: SmallVec<[StreamChunk; 2]>,
    /// The direction is finished; nothing further will be delivered.
    pub terminal: bool,
    /// The direction was abandoned because its pending set outgrew the bound.
    pub overflowed: bool,
}

impl Delivery {
    /// Total bytes delivered by this submission.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.data.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Buffer for one direction of a TCP stream.
///
/// Holds only the out-of-order segments; in-order bytes are handed out
/// immediately in the [`Delivery`].
#[derive(Debug)]
pub struct StreamBuffer {
    /// Next expected sequence number (end of the delivered prefix).
    expected_seq: u32,
    /// Sequence number of the first stream byte.
    base_seq: u32,
    /// Whether the base has been fixed (from a SYN or the first segment).
    initialized: bool,
    /// Whether the base came from a SYN.
    base_from_syn: bool,
    /// Out-of-order segments keyed by offset from `base_seq`.
    pending: BTreeMap<u32, Segment>,
    pending_bytes: usize,
    max_pending_bytes: usize,
    terminal: bool,
    overflowed: bool,
    /// Statistics.
    pub segment_count: u32,
    pub retransmit_count: u32,
    pub out_of_order_count: u32,
    pub bytes_delivered: u64,
    pub bytes_discarded: u64,
}

impl StreamBuffer {
    pub fn new(max_pending_bytes: usize) -> Self {
        Self {
            expected_seq: 0,
            base_seq: 0,
            initialized: false,
            base_from_syn: false,
            pending: BTreeMap::new(),
            pending_bytes: 0,
            max_pending_bytes,
            terminal: false,
            overflowed: false,
            segment_count: 0,
            retransmit_count: 0,
            out_of_order_count: 0,
            bytes_delivered: 0,
            bytes_discarded: 0,
        }
    }

    /// Set the initial sequence number (from SYN).
    ///
    /// Ignored once the base is fixed.
    pub fn set_initial_seq(&mut self, isn: u32) {
        if self.initialized {
            return;
        }
        self.base_seq = isn.wrapping_add(1); // SYN consumes one seq
        self.expected_seq = self.base_seq;
        self.initialized = true;
        self.base_from_syn = true;
    }

    /// Fold one segment into the direction.
    ///
    /// The segment's payload is processed before FIN/RST terminate the
    /// direction. Segments for a terminal direction are ignored.
    pub fn submit(&mut self, seq: u32, flags: TcpFlags, payload: Bytes, timestamp: i64) -> Delivery {
        let mut delivery = Delivery::default();
        if self.terminal {
            delivery.terminal = true;
            return delivery;
        }
        self.segment_count += 1;

        let data_seq = if flags.syn {
            self.set_initial_seq(seq);
            seq.wrapping_add(1)
        } else {
            seq
        };

        if !payload.is_empty() {
            if !self.initialized {
                self.base_seq = data_seq;
                self.expected_seq = data_seq;
                self.initialized = true;
            }
            self.add_segment(
                Segment {
                    seq: data_seq,
                    data: payload,
                    timestamp,
                },
                &mut delivery,
            );
        }

        if !self.terminal && (flags.fin || flags.rst) {
            self.terminate();
        }

        delivery.terminal = self.terminal;
        delivery.overflowed = self.overflowed;
        delivery
    }

    /// Mark the direction finished and drop anything still pending.
    pub fn terminate(&mut self) {
        if !self.pending.is_empty() {
            trace!(
                pending_bytes = self.pending_bytes,
                segments = self.pending.len(),
                "discarding undeliverable segments"
            );
        }
        self.bytes_discarded += self.pending_bytes as u64;
        self.pending.clear();
        self.pending_bytes = 0;
        self.terminal = true;
    }

    fn add_segment(&mut self, segment: Segment, delivery: &mut Delivery) {
        let seg_end = seq_add(segment.seq, segment.data.len());

        // Fully covered by the delivered prefix (pure retransmit)
        if seq_le(seg_end, self.expected_seq) {
            self.retransmit_count += 1;
            self.bytes_discarded += segment.data.len() as u64;
            return;
        }

        // Partial overlap - trim the beginning
        let segment = if seq_lt(segment.seq, self.expected_seq) {
            self.retransmit_count += 1;
            let overlap = self.expected_seq.wrapping_sub(segment.seq) as usize;
            self.bytes_discarded += overlap as u64;
            Segment {
                seq: self.expected_seq,
                data: segment.data.slice(overlap..),
                timestamp: segment.timestamp,
            }
        } else {
            segment
        };

        if segment.seq == self.expected_seq {
            self.deliver(segment, delivery);
            self.flush_pending(delivery);
            return;
        }

        // Out of order - buffer it
        self.out_of_order_count += 1;
        let len = segment.data.len();
        let offset = segment.seq.wrapping_sub(self.base_seq);
        let replaced = match self.pending.get(&offset) {
            Some(existing) if existing.data.len() >= len => {
                self.bytes_discarded += len as u64;
                return;
            }
            Some(existing) => existing.data.len(),
            None => 0,
        };

        if self.pending_bytes - replaced + len > self.max_pending_bytes {
            warn!(
                pending_bytes = self.pending_bytes,
                limit = self.max_pending_bytes,
                "out-of-order data exceeds limit, abandoning direction"
            );
            self.bytes_discarded += len as u64;
            self.overflowed = true;
            self.terminate();
            return;
        }

        self.pending_bytes = self.pending_bytes - replaced + len;
        self.bytes_discarded += replaced as u64;
        self.pending.insert(offset, segment);
    }

    fn deliver(&mut self, segment: Segment, delivery: &mut Delivery) {
        self.expected_seq = seq_add(segment.seq, segment.data.len());
        self.bytes_delivered += segment.data.len() as u64;
        delivery.chunks.push(StreamChunk {
            data: segment.data,
            timestamp_us: segment.timestamp,
        });
    }

    /// Deliver pending segments that are now in order.
    fn flush_pending(&mut self, delivery: &mut Delivery) {
        while let Some(entry) = self.pending.first_entry() {
            let seq = entry.get().seq;
            if seq_lt(self.expected_seq, seq) {
                // Gap - can't continue
                break;
            }
            let segment = entry.remove();
            self.pending_bytes -= segment.data.len();

            let seg_end = seq_add(segment.seq, segment.data.len());
            if seq_le(seg_end, self.expected_seq) {
                self.bytes_discarded += segment.data.len() as u64;
                continue;
            }
            let overlap = self.expected_seq.wrapping_sub(segment.seq) as usize;
            self.bytes_discarded += overlap as u64;
            let trimmed = Segment {
                seq: self.expected_seq,
                data: segment.data.slice(overlap..),
                timestamp: segment.timestamp,
            };
            self.deliver(trimmed, delivery);
        }
    }

    /// Whether the direction has finished (FIN, RST, overflow or close).
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Whether the direction was abandoned for exceeding the pending bound.
    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    /// Whether the base sequence number came from a SYN.
    pub fn base_from_syn(&self) -> bool {
        self.base_from_syn
    }

    /// Bytes currently held out of order.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            segment_count: self.segment_count,
            retransmit_count: self.retransmit_count,
            out_of_order_count: self.out_of_order_count,
            bytes_delivered: self.bytes_delivered,
            bytes_discarded: self.bytes_discarded,
            pending_bytes: self.pending_bytes,
        }
    }
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new(crate::config::StreamConfig::default().max_pending_bytes)
    }
}

/// Key for stream buffer lookup.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct StreamKey {
    pub connection_id: u64,
    pub direction: Direction,
}

/// TCP stream reassembler.
pub struct TcpReassembler {
    streams: HashMap<StreamKey, StreamBuffer>,
    max_pending_bytes: usize,
}

impl TcpReassembler {
    pub fn new(max_pending_bytes: usize) -> Self {
        Self {
            streams: HashMap::new(),
            max_pending_bytes,
        }
    }

    /// Get or create a stream buffer.
    pub fn get_or_create(&mut self, connection_id: u64, direction: Direction) -> &mut StreamBuffer {
        let key = StreamKey {
            connection_id,
            direction,
        };
        let max_pending_bytes = self.max_pending_bytes;
        self.streams
            .entry(key)
            .or_insert_with(|| StreamBuffer::new(max_pending_bytes))
    }

    /// Submit a segment to the appropriate stream.
    pub fn submit(
        &mut self,
        connection_id: u64,
        direction: Direction,
        seq: u32,
        flags: TcpFlags,
        payload: Bytes,
        timestamp: i64,
    ) -> Delivery {
        self.get_or_create(connection_id, direction)
            .submit(seq, flags, payload, timestamp)
    }

    /// Terminate a direction without a FIN (capture end or idle expiry).
    pub fn terminate(&mut self, connection_id: u64, direction: Direction) {
        self.get_or_create(connection_id, direction).terminate();
    }

    /// Check if a stream is terminal.
    pub fn is_terminal(&self, connection_id: u64, direction: Direction) -> bool {
        let key = StreamKey {
            connection_id,
            direction,
        };
        self.streams
            .get(&key)
            .map(|b| b.is_terminal())
            .unwrap_or(false)
    }

    /// Remove both directions of a connection, returning their final stats.
    pub fn remove(&mut self, connection_id: u64) -> Vec<(Direction, StreamStats)> {
        let mut removed = Vec::new();
        for direction in [Direction::ToServer, Direction::ToClient] {
            let key = StreamKey {
                connection_id,
                direction,
            };
            if let Some(buffer) = self.streams.remove(&key) {
                removed.push((direction, buffer.stats()));
            }
        }
        removed
    }

    /// Get stream statistics.
    pub fn stats(&self, connection_id: u64, direction: Direction) -> Option<StreamStats> {
        let key = StreamKey {
            connection_id,
            direction,
        };
        self.streams.get(&key).map(|b| b.stats())
    }

    /// Bytes held out of order across every stream.
    pub fn total_pending(&self) -> usize {
        self.streams.values().map(|b| b.pending_bytes()).sum()
    }
}

impl Default for TcpReassembler {
    fn default() -> Self {
        Self::new(crate::config::StreamConfig::default().max_pending_bytes)
    }
}

/// Stream statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub segment_count: u32,
    pub retransmit_count: u32,
    pub out_of_order_count: u32,
    pub bytes_delivered: u64,
    pub bytes_discarded: u64,
    pub pending_bytes: usize,
}

impl StreamStats {
    /// Accumulate another direction's counters.
    pub fn merge(&mut self, other: &StreamStats) {
        self.segment_count += other.segment_count;
        self.retransmit_count += other.retransmit_count;
        self.out_of_order_count += other.out_of_order_count;
        self.bytes_delivered += other.bytes_delivered;
        self.bytes_discarded += other.bytes_discarded;
        self.pending_bytes += other.pending_bytes;
    }
}

// Sequence number comparison helpers
fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

fn seq_le(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

fn seq_add(a: u32, n: usize) -> u32 {
    a.wrapping_add(n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: TcpFlags = TcpFlags {
        syn: false,
        ack: true,
        fin: false,
        rst: false,
    };
    const SYN: TcpFlags = TcpFlags {
        syn: true,
        ack: false,
        fin: false,
        rst: false,
    };
    const FIN: TcpFlags = TcpFlags {
        syn: false,
        ack: true,
        fin: true,
        rst: false,
    };
    const RST: TcpFlags = TcpFlags {
        syn: false,
        ack: false,
        fin: false,
        rst: true,
    };

    fn collect(delivery: &Delivery) -> Vec<u8> {
        delivery
            .chunks
            .iter()
            .flat_map(|c| c.data.iter().copied())
            .collect()
    }

    fn submit(r: &mut TcpReassembler, seq: u32, flags: TcpFlags, data: &'static [u8]) -> Vec<u8> {
        collect(&r.submit(1, Direction::ToServer, seq, flags, Bytes::from_static(data), 0))
    }

    // Test 1: In-order segment reassembly
    #[test]
    fn test_in_order_reassembly() {
        let mut reassembler = TcpReassembler::default();

        assert_eq!(submit(&mut reassembler, 1000, NONE, b"Hello"), b"Hello");
        assert_eq!(submit(&mut reassembler, 1005, NONE, b" World"), b" World");
    }

    // Test 2: Out-of-order segment reordering
    #[test]
    fn test_out_of_order_reordering() {
        let mut reassembler = TcpReassembler::default();

        submit(&mut reassembler, 999, SYN, b"");
        assert!(submit(&mut reassembler, 1005, NONE, b" World").is_empty());
        assert_eq!(submit(&mut reassembler, 1000, NONE, b"Hello"), b"Hello World");

        let stats = reassembler.stats(1, Direction::ToServer).unwrap();
        assert_eq!(stats.out_of_order_count, 1);
        assert_eq!(stats.pending_bytes, 0);
        assert_eq!(stats.bytes_delivered, 11);
    }

    // Test 3: Retransmission detection
    #[test]
    fn test_retransmission_detection() {
        let mut reassembler = TcpReassembler::default();

        submit(&mut reassembler, 1000, NONE, b"Hello");
        assert!(submit(&mut reassembler, 1000, NONE, b"Hello").is_empty());

        let stats = reassembler.stats(1, Direction::ToServer).unwrap();
        assert_eq!(stats.retransmit_count, 1);
        assert_eq!(stats.bytes_discarded, 5);
    }

    // Test 4: Sequence number wraparound
    #[test]
    fn test_sequence_wraparound() {
        let mut reassembler = TcpReassembler::default();

        let near_max = u32::MAX - 2;
        submit(&mut reassembler, near_max.wrapping_sub(1), SYN, b"");
        // Second half arrives first, across the wrap
        assert!(submit(&mut reassembler, near_max.wrapping_add(3), NONE, b"DEF").is_empty());
        assert_eq!(submit(&mut reassembler, near_max, NONE, b"ABC"), b"ABCDEF");
    }

    // Test 5: Gap holds back later data
    #[test]
    fn test_gap_detection() {
        let mut reassembler = TcpReassembler::default();

        assert_eq!(submit(&mut reassembler, 1000, NONE, b"Hello"), b"Hello");
        assert!(submit(&mut reassembler, 1010, NONE, b"World").is_empty());

        let stats = reassembler.stats(1, Direction::ToServer).unwrap();
        assert_eq!(stats.out_of_order_count, 1);
        assert_eq!(stats.pending_bytes, 5);
    }

    // Test 6: Overlapping segments (partial retransmit)
    #[test]
    fn test_overlapping_segments() {
        let mut reassembler = TcpReassembler::default();

        submit(&mut reassembler, 1000, NONE, b"Hello");
        assert_eq!(submit(&mut reassembler, 1003, NONE, b"loWorld"), b"World");
    }

    // Test 7: Overlapping pending segments are trimmed on flush
    #[test]
    fn test_overlapping_pending() {
        let mut reassembler = TcpReassembler::default();

        submit(&mut reassembler, 99, SYN, b"");
        assert!(submit(&mut reassembler, 105, NONE, b"56789").is_empty());
        assert!(submit(&mut reassembler, 103, NONE, b"3456").is_empty());
        assert_eq!(submit(&mut reassembler, 100, NONE, b"012"), b"0123456789");
    }

    // Test 8: Every permutation yields the stream exactly once
    #[test]
    fn test_permutations_deliver_once() {
        let pieces: [(u32, &'static [u8]); 4] =
            [(1, b"GET "), (5, b"/ HT"), (9, b"TP/1"), (13, b".1\r\n")];
        let orders = [
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            [1, 3, 0, 2],
            [2, 0, 3, 1],
            [0, 0, 2, 1],
        ];

        for order in orders {
            let mut reassembler = TcpReassembler::default();
            let mut out = Vec::new();
            out.extend(submit(&mut reassembler, 0, SYN, b""));
            for idx in order {
                let (seq, data) = pieces[idx];
                out.extend(submit(&mut reassembler, seq, NONE, data));
            }
            // Late duplicates of everything
            for (seq, data) in pieces {
                out.extend(submit(&mut reassembler, seq, NONE, data));
            }
            assert_eq!(out, b"GET / HTTP/1.1\r\n", "order {:?}", order);
        }
    }

    // Test 9: FIN processes payload, then drops the gap
    #[test]
    fn test_fin_before_gap_closes() {
        let mut reassembler = TcpReassembler::default();

        submit(&mut reassembler, 0, SYN, b"");
        submit(&mut reassembler, 1, NONE, b"abc");
        submit(&mut reassembler, 10, NONE, b"xyz");
        let delivery = reassembler.submit(
            1,
            Direction::ToServer,
            4,
            FIN,
            Bytes::from_static(b"de"),
            0,
        );
        assert_eq!(collect(&delivery), b"de");
        assert!(delivery.terminal);
        assert!(reassembler.is_terminal(1, Direction::ToServer));

        // Gap filler arrives too late
        assert!(submit(&mut reassembler, 6, NONE, b"fghi").is_empty());
        let stats = reassembler.stats(1, Direction::ToServer).unwrap();
        assert_eq!(stats.bytes_delivered, 5);
        assert_eq!(stats.pending_bytes, 0);
    }

    // Test 10: RST terminates
    #[test]
    fn test_rst_terminates() {
        let mut reassembler = TcpReassembler::default();

        submit(&mut reassembler, 1000, NONE, b"Hello");
        submit(&mut reassembler, 1005, RST, b"");
        assert!(reassembler.is_terminal(1, Direction::ToServer));
        assert!(!reassembler.is_terminal(1, Direction::ToClient));
    }

    // Test 11: Pending overflow abandons the direction
    #[test]
    fn test_pending_overflow() {
        let mut reassembler = TcpReassembler::new(8);

        submit(&mut reassembler, 0, SYN, b"");
        assert!(submit(&mut reassembler, 10, NONE, b"12345").is_empty());
        let delivery = reassembler.submit(
            1,
            Direction::ToServer,
            20,
            NONE,
            Bytes::from_static(b"67890"),
            0,
        );
        assert!(delivery.overflowed);
        assert!(delivery.terminal);
        assert_eq!(reassembler.total_pending(), 0);
        assert!(submit(&mut reassembler, 1, NONE, b"abc").is_empty());
    }

    // Test 12: Multiple streams per connection
    #[test]
    fn test_multiple_streams() {
        let mut reassembler = TcpReassembler::default();

        let req = reassembler.submit(
            1,
            Direction::ToServer,
            1000,
            NONE,
            Bytes::from_static(b"Request"),
            1,
        );
        let resp = reassembler.submit(
            1,
            Direction::ToClient,
            2000,
            NONE,
            Bytes::from_static(b"Response"),
            2,
        );

        assert_eq!(collect(&req), b"Request");
        assert_eq!(collect(&resp), b"Response");
        assert_eq!(resp.chunks[0].timestamp_us, 2);

        let removed = reassembler.remove(1);
        assert_eq!(removed.len(), 2);
        assert!(reassembler.stats(1, Direction::ToServer).is_none());
    }

    // Test 13: SYN with payload starts data after the ISN
    #[test]
    fn test_syn_with_payload() {
        let mut buffer = StreamBuffer::new(1024);
        let delivery = buffer.submit(500, SYN, Bytes::from_static(b"early"), 7);
        assert_eq!(collect(&delivery), b"early");
        assert!(buffer.base_from_syn());

        let delivery = buffer.submit(506, NONE, Bytes::from_static(b"!"), 8);
        assert_eq!(collect(&delivery), b"!");
    }
}
