use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::IpAddr;

use super::{Direction, StreamContext};

/// Normalized connection key (lower IP/port first for consistent lookup).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ConnectionKey {
    ip_a: IpAddr,
    port_a: u16,
    ip_b: IpAddr,
    port_b: u16,
}

impl ConnectionKey {
    /// Create a normalized connection key.
    /// Ensures (ip_a, port_a) <= (ip_b, port_b) lexicographically.
    pub fn new(src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16) -> Self {
        if (src_ip, src_port) <= (dst_ip, dst_port) {
            Self {
                ip_a: src_ip,
                port_a: src_port,
                ip_b: dst_ip,
                port_b: dst_port,
            }
        } else {
            Self {
                ip_a: dst_ip,
                port_a: dst_port,
                ip_b: src_ip,
                port_b: src_port,
            }
        }
    }

    fn is_a(&self, ip: IpAddr, port: u16) -> bool {
        ip == self.ip_a && port == self.port_a
    }
}

/// TCP control flags relevant to reassembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

/// A tracked TCP flow.
#[derive(Debug, Clone)]
pub struct Flow {
    pub id: u64,
    pub key: ConnectionKey,

    /// Which endpoint initiated the flow.
    /// True if ip_a/port_a is the initiator.
    pub client_is_a: bool,

    /// Timing (capture microseconds).
    pub start_time: i64,
    pub last_activity: i64,

    /// Packet counts.
    pub packets_to_server: u32,
    pub packets_to_client: u32,

    /// Byte counts (payload only).
    pub bytes_to_server: u64,
    pub bytes_to_client: u64,

    /// Frame references.
    pub first_frame: u64,
    pub last_frame: u64,
}

impl Flow {
    /// Get client IP.
    pub fn client_ip(&self) -> IpAddr {
        if self.client_is_a {
            self.key.ip_a
        } else {
            self.key.ip_b
        }
    }

    /// Get server IP.
    pub fn server_ip(&self) -> IpAddr {
        if self.client_is_a {
            self.key.ip_b
        } else {
            self.key.ip_a
        }
    }

    /// Get client port.
    pub fn client_port(&self) -> u16 {
        if self.client_is_a {
            self.key.port_a
        } else {
            self.key.port_b
        }
    }

    /// Get server port.
    pub fn server_port(&self) -> u16 {
        if self.client_is_a {
            self.key.port_b
        } else {
            self.key.port_a
        }
    }

    /// Determine direction based on source IP/port.
    pub fn direction(&self, src_ip: IpAddr, src_port: u16) -> Direction {
        if self.key.is_a(src_ip, src_port) == self.client_is_a {
            Direction::ToServer
        } else {
            Direction::ToClient
        }
    }

    /// Build the parsing context for one direction of this flow.
    pub fn context(&self, direction: Direction) -> StreamContext {
        let (src_ip, dst_ip, src_port, dst_port) = match direction {
            Direction::ToServer => (
                self.client_ip(),
                self.server_ip(),
                self.client_port(),
                self.server_port(),
            ),
            Direction::ToClient => (
                self.server_ip(),
                self.client_ip(),
                self.server_port(),
                self.client_port(),
            ),
        };

        StreamContext {
            connection_id: self.id,
            direction,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
        }
    }

    fn record(&mut self, direction: Direction, payload_len: usize) {
        match direction {
            Direction::ToServer => {
                self.packets_to_server += 1;
                self.bytes_to_server += payload_len as u64;
            }
            Direction::ToClient => {
                self.packets_to_client += 1;
                self.bytes_to_client += payload_len as u64;
            }
        }
    }
}

/// Tracks live TCP flows by normalized key.
pub struct FlowTracker {
    flows: HashMap<ConnectionKey, Flow>,
    /// Keys of flows closed by FIN/RST, with the capture time of the close.
    /// Only a SYN may reopen one of these until it is swept.
    closed: HashMap<ConnectionKey, i64>,
    next_id: u64,
}

impl FlowTracker {
    pub fn new() -> Self {
        Self {
            flows: HashMap::new(),
            closed: HashMap::new(),
            next_id: 1,
        }
    }

    /// Look up the flow for a segment, creating it when the segment may open
    /// one (a SYN, or any segment carrying payload).
    ///
    /// Returns the flow, the segment's direction, and whether the flow was
    /// created by this call. Pure ACKs, FINs and RSTs for unknown flows
    /// return `None`.
    #[allow(clippy::too_many_arguments)]
    pub fn get_or_create(
        &mut self,
        src_ip: IpAddr,
        src_port: u16,
        dst_ip: IpAddr,
        dst_port: u16,
        flags: TcpFlags,
        payload_len: usize,
        frame_number: u64,
        timestamp: i64,
    ) -> Option<(&mut Flow, Direction, bool)> {
        let key = ConnectionKey::new(src_ip, src_port, dst_ip, dst_port);

        let (flow, created) = match self.flows.entry(key) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                if !flags.syn && payload_len == 0 {
                    return None;
                }
                if self.closed.contains_key(entry.key()) {
                    if !flags.syn {
                        // Late retransmission for a finished flow
                        return None;
                    }
                    self.closed.remove(entry.key());
                }
                let sender_is_a = entry.key().is_a(src_ip, src_port);
                // A SYN-ACK comes from the responder; anything else is taken
                // to come from the initiator.
                let client_is_a = if flags.syn && flags.ack {
                    !sender_is_a
                } else {
                    sender_is_a
                };
                let flow = Flow {
                    id: self.next_id,
                    key: entry.key().clone(),
                    client_is_a,
                    start_time: timestamp,
                    last_activity: timestamp,
                    packets_to_server: 0,
                    packets_to_client: 0,
                    bytes_to_server: 0,
                    bytes_to_client: 0,
                    first_frame: frame_number,
                    last_frame: frame_number,
                };
                self.next_id += 1;
                (entry.insert(flow), true)
            }
        };

        flow.last_activity = timestamp;
        flow.last_frame = frame_number;
        let direction = flow.direction(src_ip, src_port);
        flow.record(direction, payload_len);

        Some((flow, direction, created))
    }

    /// Get a flow by key.
    pub fn get(&self, key: &ConnectionKey) -> Option<&Flow> {
        self.flows.get(key)
    }

    /// Remove a finalized flow.
    pub fn remove(&mut self, key: &ConnectionKey) -> Option<Flow> {
        self.flows.remove(key)
    }

    /// Remember a flow closed by FIN/RST so stray segments cannot reopen it.
    pub fn mark_closed(&mut self, key: ConnectionKey, timestamp: i64) {
        self.closed.insert(key, timestamp);
    }

    /// Number of recently closed keys still remembered.
    pub fn closed_len(&self) -> usize {
        self.closed.len()
    }

    /// Get all flows.
    pub fn flows(&self) -> impl Iterator<Item = &Flow> {
        self.flows.values()
    }

    /// Number of live flows.
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Remove timed-out flows.
    pub fn cleanup_timeout(&mut self, current_time: i64, timeout_us: i64) -> Vec<Flow> {
        self.closed
            .retain(|_, closed_at| current_time - *closed_at <= timeout_us);

        let mut removed = Vec::new();
        self.flows.retain(|_, flow| {
            if current_time - flow.last_activity > timeout_us {
                removed.push(flow.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Remove and return every flow.
    pub fn drain(&mut self) -> Vec<Flow> {
        self.flows.drain().map(|(_, flow)| flow).collect()
    }
}

impl Default for FlowTracker {
    fn default() -> Self {
        Self::new()
    }
}
