use std::net::IpAddr;

/// Direction of data flow in a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Initiator to responder.
    ToServer,
    /// Responder to initiator.
    ToClient,
}

impl Direction {
    /// Return a string representation of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToServer => "to_server",
            Direction::ToClient => "to_client",
        }
    }

    /// The opposite direction of the same connection.
    pub fn reverse(&self) -> Direction {
        match self {
            Direction::ToServer => Direction::ToClient,
            Direction::ToClient => Direction::ToServer,
        }
    }
}

/// What a flow direction carries, decided once from its first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    Unclassified,
    HttpRequest,
    HttpResponse,
    /// TLS or otherwise undecodable; never consumed again.
    Opaque,
}

impl StreamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamRole::Unclassified => "unclassified",
            StreamRole::HttpRequest => "http_request",
            StreamRole::HttpResponse => "http_response",
            StreamRole::Opaque => "opaque",
        }
    }
}

/// Identity of one flow direction, handed to its parsing task.
///
/// `src_*` is always the sender of the bytes in this direction.
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub connection_id: u64,
    pub direction: Direction,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

/// One run of ordered bytes handed from the reassembler to a parsing task.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub data: bytes::Bytes,
    /// Capture timestamp (microseconds) of the segment that carried the
    /// first byte of `data`.
    pub timestamp_us: i64,
}
