//! Link, network and transport decoding of captured frames.

use std::net::IpAddr;

use bytes::Bytes;
use etherparse::{
    Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, TcpHeaderSlice, UdpHeaderSlice,
};
use thiserror::Error;

use crate::io::RawPacket;
use crate::stream::TcpFlags;

/// Link-layer header types (LINKTYPE_* values).
pub mod link_type {
    pub const NULL: u16 = 0;
    pub const ETHERNET: u16 = 1;
    pub const RAW_LEGACY: u16 = 12;
    pub const LOOP: u16 = 108;
    pub const RAW: u16 = 101;
    pub const LINUX_SLL: u16 = 113;
    pub const IPV4: u16 = 228;
    pub const IPV6: u16 = 229;
}

/// EtherType values.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const IPV6: u16 = 0x86DD;
    pub const VLAN: u16 = 0x8100;
    pub const QINQ: u16 = 0x88A8;
}

/// IP protocol numbers.
pub mod ip_protocol {
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

mod ipv6_ext {
    pub const HOP_BY_HOP: u8 = 0;
    pub const ROUTING: u8 = 43;
    pub const FRAGMENT: u8 = 44;
    pub const DEST_OPTS: u8 = 60;
}

const LINUX_SLL_HEADER_LEN: usize = 16;
const NULL_HEADER_LEN: usize = 4;
const VLAN_TAG_LEN: usize = 4;
const MAX_VLAN_TAGS: usize = 4;
const MAX_IPV6_EXTENSIONS: usize = 8;

/// BSD loopback address family values that mean IPv6 (they differ by OS).
const AF_INET: u32 = 2;
const AF_INET6: [u32; 3] = [24, 28, 30];

/// Reasons a frame carries nothing we can use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported link type {0}")]
    UnsupportedLinkType(u16),

    #[error("unsupported ethertype 0x{0:04x}")]
    UnsupportedEtherType(u16),

    #[error("truncated {layer} header")]
    Truncated { layer: &'static str },

    #[error("{layer} parse error: {reason}")]
    Malformed {
        layer: &'static str,
        reason: String,
    },

    #[error("non-initial IP fragment")]
    Fragment,
}

/// A TCP segment lifted out of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub flags: TcpFlags,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp(TcpSegment),
    Udp(UdpDatagram),
    /// Any other IP protocol number.
    Other(u8),
}

/// One decoded IP packet with its capture metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub frame_number: u64,
    pub timestamp_us: i64,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub transport: Transport,
}

/// Decode a raw frame down to its transport payload.
pub fn decode_packet(packet: &RawPacket) -> Result<CaptureRecord, DecodeError> {
    let data = &packet.data;
    let (ethertype, offset) = match packet.link_type {
        link_type::ETHERNET => parse_ethernet(data)?,
        link_type::LINUX_SLL => parse_linux_sll(data)?,
        link_type::NULL | link_type::LOOP => parse_null(data)?,
        link_type::RAW | link_type::RAW_LEGACY => (ip_version_ethertype(data)?, 0),
        link_type::IPV4 => (ethertype::IPV4, 0),
        link_type::IPV6 => (ethertype::IPV6, 0),
        other => return Err(DecodeError::UnsupportedLinkType(other)),
    };

    let (src_ip, dst_ip, protocol, start, end) = match ethertype {
        ethertype::IPV4 => parse_ipv4(data, offset)?,
        ethertype::IPV6 => parse_ipv6(data, offset)?,
        other => return Err(DecodeError::UnsupportedEtherType(other)),
    };

    let transport = match protocol {
        ip_protocol::TCP => Transport::Tcp(parse_tcp(data, start, end)?),
        ip_protocol::UDP => Transport::Udp(parse_udp(data, start, end)?),
        other => Transport::Other(other),
    };

    Ok(CaptureRecord {
        frame_number: packet.frame_number,
        timestamp_us: packet.timestamp_us,
        src_ip,
        dst_ip,
        transport,
    })
}

/// Ethernet II, skipping any stacked 802.1Q/802.1ad tags.
fn parse_ethernet(data: &[u8]) -> Result<(u16, usize), DecodeError> {
    let eth = Ethernet2HeaderSlice::from_slice(data).map_err(|e| DecodeError::Malformed {
        layer: "ethernet",
        reason: e.to_string(),
    })?;
    let mut ethertype = eth.ether_type().0;
    let mut offset = eth.slice().len();

    let mut tags = 0;
    while matches!(ethertype, ethertype::VLAN | ethertype::QINQ) {
        tags += 1;
        if tags > MAX_VLAN_TAGS || data.len() < offset + VLAN_TAG_LEN {
            return Err(DecodeError::Truncated { layer: "vlan" });
        }
        ethertype = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
        offset += VLAN_TAG_LEN;
    }

    Ok((ethertype, offset))
}

/// Linux cooked capture v1: protocol type in the last two header bytes.
fn parse_linux_sll(data: &[u8]) -> Result<(u16, usize), DecodeError> {
    if data.len() < LINUX_SLL_HEADER_LEN {
        return Err(DecodeError::Truncated { layer: "linux_sll" });
    }
    let protocol = u16::from_be_bytes([data[14], data[15]]);
    Ok((protocol, LINUX_SLL_HEADER_LEN))
}

/// BSD loopback: a 4-byte address family in host byte order of the capturer.
fn parse_null(data: &[u8]) -> Result<(u16, usize), DecodeError> {
    if data.len() < NULL_HEADER_LEN {
        return Err(DecodeError::Truncated { layer: "null" });
    }
    let raw = [data[0], data[1], data[2], data[3]];
    let family = match u32::from_le_bytes(raw) {
        f if f <= 0xFFFF => f,
        _ => u32::from_be_bytes(raw),
    };
    let ethertype = if family == AF_INET {
        ethertype::IPV4
    } else if AF_INET6.contains(&family) {
        ethertype::IPV6
    } else {
        return Err(DecodeError::UnsupportedEtherType(family as u16));
    };
    Ok((ethertype, NULL_HEADER_LEN))
}

fn ip_version_ethertype(data: &[u8]) -> Result<u16, DecodeError> {
    match data.first().map(|b| b >> 4) {
        Some(4) => Ok(ethertype::IPV4),
        Some(6) => Ok(ethertype::IPV6),
        Some(v) => Err(DecodeError::Malformed {
            layer: "ip",
            reason: format!("unknown IP version {v}"),
        }),
        None => Err(DecodeError::Truncated { layer: "ip" }),
    }
}

/// Returns addresses, protocol, and the transport byte range within `data`.
/// The range honors the IP length so link-layer padding is excluded.
fn parse_ipv4(
    data: &[u8],
    offset: usize,
) -> Result<(IpAddr, IpAddr, u8, usize, usize), DecodeError> {
    let ipv4 = Ipv4HeaderSlice::from_slice(&data[offset..]).map_err(|e| DecodeError::Malformed {
        layer: "ipv4",
        reason: e.to_string(),
    })?;

    if ipv4.fragments_offset().value() != 0 {
        return Err(DecodeError::Fragment);
    }

    let header_len = ipv4.slice().len();
    let total_len = (ipv4.total_len() as usize).max(header_len);
    let end = (offset + total_len).min(data.len());

    Ok((
        IpAddr::V4(ipv4.source_addr()),
        IpAddr::V4(ipv4.destination_addr()),
        ipv4.protocol().0,
        offset + header_len,
        end,
    ))
}

fn parse_ipv6(
    data: &[u8],
    offset: usize,
) -> Result<(IpAddr, IpAddr, u8, usize, usize), DecodeError> {
    let ipv6 = Ipv6HeaderSlice::from_slice(&data[offset..]).map_err(|e| DecodeError::Malformed {
        layer: "ipv6",
        reason: e.to_string(),
    })?;

    let header_len = ipv6.slice().len();
    let end = (offset + header_len + ipv6.payload_length() as usize).min(data.len());
    let (protocol, start) =
        skip_ipv6_extensions(data, ipv6.next_header().0, offset + header_len, end)?;

    Ok((
        IpAddr::V6(ipv6.source_addr()),
        IpAddr::V6(ipv6.destination_addr()),
        protocol,
        start,
        end,
    ))
}

/// Walk the common extension headers to the upper-layer protocol.
fn skip_ipv6_extensions(
    data: &[u8],
    mut next_header: u8,
    mut pos: usize,
    end: usize,
) -> Result<(u8, usize), DecodeError> {
    for _ in 0..MAX_IPV6_EXTENSIONS {
        let len = match next_header {
            ipv6_ext::HOP_BY_HOP | ipv6_ext::ROUTING | ipv6_ext::DEST_OPTS => {
                if pos + 2 > end {
                    return Err(DecodeError::Truncated { layer: "ipv6 extension" });
                }
                (data[pos + 1] as usize + 1) * 8
            }
            ipv6_ext::FRAGMENT => {
                if pos + 8 > end {
                    return Err(DecodeError::Truncated { layer: "ipv6 fragment" });
                }
                let frag_offset = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) >> 3;
                if frag_offset != 0 {
                    return Err(DecodeError::Fragment);
                }
                8
            }
            _ => return Ok((next_header, pos)),
        };
        if pos + len > end {
            return Err(DecodeError::Truncated { layer: "ipv6 extension" });
        }
        next_header = data[pos];
        pos += len;
    }
    Err(DecodeError::Malformed {
        layer: "ipv6",
        reason: "too many extension headers".to_string(),
    })
}

fn parse_tcp(data: &[u8], start: usize, end: usize) -> Result<TcpSegment, DecodeError> {
    let segment = data.get(start..end).ok_or(DecodeError::Truncated { layer: "tcp" })?;
    let tcp = TcpHeaderSlice::from_slice(segment).map_err(|e| DecodeError::Malformed {
        layer: "tcp",
        reason: e.to_string(),
    })?;
    let header_len = tcp.slice().len();

    Ok(TcpSegment {
        src_port: tcp.source_port(),
        dst_port: tcp.destination_port(),
        seq: tcp.sequence_number(),
        flags: TcpFlags {
            syn: tcp.syn(),
            ack: tcp.ack(),
            fin: tcp.fin(),
            rst: tcp.rst(),
        },
        payload: Bytes::copy_from_slice(&segment[header_len..]),
    })
}

fn parse_udp(data: &[u8], start: usize, end: usize) -> Result<UdpDatagram, DecodeError> {
    let datagram = data.get(start..end).ok_or(DecodeError::Truncated { layer: "udp" })?;
    let udp = UdpHeaderSlice::from_slice(datagram).map_err(|e| DecodeError::Malformed {
        layer: "udp",
        reason: e.to_string(),
    })?;
    let header_len = udp.slice().len();
    let payload_end = (udp.length() as usize).clamp(header_len, datagram.len());

    Ok(UdpDatagram {
        src_port: udp.source_port(),
        dst_port: udp.destination_port(),
        payload: Bytes::copy_from_slice(&datagram[header_len..payload_end]),
    })
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn raw(link_type: u16, data: Vec<u8>) -> RawPacket {
        RawPacket {
            frame_number: 7,
            timestamp_us: 1_000_000,
            link_type,
            data: Bytes::from(data),
        }
    }

    const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
    const SERVER: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

    // Test 1: Ethernet/IPv4/TCP with payload
    #[test]
    fn test_decode_ethernet_tcp() {
        let frame = tcp_frame(CLIENT, SERVER, 50000, 80, 1000, PSH_ACK, b"GET / HTTP/1.1\r\n");
        let record = decode_packet(&raw(link_type::ETHERNET, frame)).unwrap();

        assert_eq!(record.frame_number, 7);
        assert_eq!(record.timestamp_us, 1_000_000);
        assert_eq!(record.src_ip, IpAddr::V4(CLIENT));
        assert_eq!(record.dst_ip, IpAddr::V4(SERVER));
        match record.transport {
            Transport::Tcp(seg) => {
                assert_eq!(seg.src_port, 50000);
                assert_eq!(seg.dst_port, 80);
                assert_eq!(seg.seq, 1000);
                assert!(seg.flags.ack);
                assert!(!seg.flags.syn);
                assert_eq!(&seg.payload[..], b"GET / HTTP/1.1\r\n");
            }
            other => panic!("expected TCP, got {other:?}"),
        }
    }

    // Test 2: Ethernet padding is not payload
    #[test]
    fn test_ethernet_padding_excluded() {
        let mut frame = tcp_frame(CLIENT, SERVER, 50000, 80, 1, SYN, b"");
        frame.extend_from_slice(&[0u8; 6]);
        let record = decode_packet(&raw(link_type::ETHERNET, frame)).unwrap();

        match record.transport {
            Transport::Tcp(seg) => {
                assert!(seg.flags.syn);
                assert!(seg.payload.is_empty());
            }
            other => panic!("expected TCP, got {other:?}"),
        }
    }

    // Test 3: 802.1Q tag is skipped
    #[test]
    fn test_vlan_tagged() {
        let inner = tcp_frame(CLIENT, SERVER, 1234, 80, 5, ACK, b"x");
        let mut frame = ethernet_header(ethertype::VLAN);
        frame.extend_from_slice(&[0x00, 0x64, 0x08, 0x00]);
        frame.extend_from_slice(&inner[14..]);

        let record = decode_packet(&raw(link_type::ETHERNET, frame)).unwrap();
        assert!(matches!(record.transport, Transport::Tcp(ref s) if &s.payload[..] == b"x"));
    }

    // Test 4: UDP datagram
    #[test]
    fn test_decode_udp() {
        let frame = udp_frame(CLIENT, Ipv4Addr::new(8, 8, 8, 8), 40000, 53, b"dnsdata");
        let record = decode_packet(&raw(link_type::ETHERNET, frame)).unwrap();
        match record.transport {
            Transport::Udp(dgram) => {
                assert_eq!(dgram.dst_port, 53);
                assert_eq!(&dgram.payload[..], b"dnsdata");
            }
            other => panic!("expected UDP, got {other:?}"),
        }
    }

    // Test 5: Linux cooked capture
    #[test]
    fn test_linux_sll() {
        let inner = tcp_frame(CLIENT, SERVER, 1234, 80, 5, ACK, b"abc");
        let mut frame = vec![0x00, 0x00, 0x00, 0x01, 0x00, 0x06];
        frame.extend_from_slice(&[0u8; 8]);
        frame.extend_from_slice(&0x0800u16.to_be_bytes());
        frame.extend_from_slice(&inner[14..]);

        let record = decode_packet(&raw(link_type::LINUX_SLL, frame)).unwrap();
        assert_eq!(record.src_ip, IpAddr::V4(CLIENT));
    }

    // Test 6: Raw IP and BSD loopback
    #[test]
    fn test_raw_and_null() {
        let inner = tcp_frame(CLIENT, SERVER, 1234, 80, 5, ACK, b"abc");

        let record = decode_packet(&raw(link_type::RAW, inner[14..].to_vec())).unwrap();
        assert_eq!(record.dst_ip, IpAddr::V4(SERVER));

        let mut null = 2u32.to_le_bytes().to_vec();
        null.extend_from_slice(&inner[14..]);
        let record = decode_packet(&raw(link_type::NULL, null)).unwrap();
        assert_eq!(record.dst_ip, IpAddr::V4(SERVER));
    }

    // Test 7: IPv6/TCP
    #[test]
    fn test_decode_ipv6() {
        let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let dst: Ipv6Addr = "2001:db8::2".parse().unwrap();
        let payload = b"hi";
        let tcp = tcp_header(4000, 8080, 9, PSH_ACK);

        let mut frame = ethernet_header(ethertype::IPV6);
        frame.extend_from_slice(&[0x60, 0, 0, 0]);
        frame.extend_from_slice(&((tcp.len() + payload.len()) as u16).to_be_bytes());
        frame.push(6);
        frame.push(64);
        frame.extend_from_slice(&src.octets());
        frame.extend_from_slice(&dst.octets());
        frame.extend(tcp);
        frame.extend_from_slice(payload);

        let record = decode_packet(&raw(link_type::ETHERNET, frame)).unwrap();
        assert_eq!(record.src_ip, IpAddr::V6(src));
        assert!(matches!(record.transport, Transport::Tcp(ref s) if s.dst_port == 8080));
    }

    // Test 8: Non-initial fragment skipped
    #[test]
    fn test_fragment_skipped() {
        let mut frame = tcp_frame(CLIENT, SERVER, 1234, 80, 5, ACK, b"abc");
        // fragment offset 8 (64 bytes)
        frame[14 + 6] = 0x00;
        frame[14 + 7] = 0x08;
        assert_eq!(
            decode_packet(&raw(link_type::ETHERNET, frame)),
            Err(DecodeError::Fragment)
        );
    }

    // Test 9: Unsupported and truncated input
    #[test]
    fn test_errors() {
        assert_eq!(
            decode_packet(&raw(105, vec![0u8; 40])),
            Err(DecodeError::UnsupportedLinkType(105))
        );

        let arp = ethernet_header(0x0806);
        assert_eq!(
            decode_packet(&raw(link_type::ETHERNET, arp)),
            Err(DecodeError::UnsupportedEtherType(0x0806))
        );

        let frame = tcp_frame(CLIENT, SERVER, 1234, 80, 5, ACK, b"");
        assert!(decode_packet(&raw(link_type::ETHERNET, frame[..30].to_vec())).is_err());
    }
}
