//! Synthetic capture builders shared by the integration tests.

#![allow(dead_code)]

use std::net::Ipv4Addr;

pub const SYN: u8 = 0x02;
pub const SYN_ACK: u8 = 0x12;
pub const ACK: u8 = 0x10;
pub const PSH_ACK: u8 = 0x18;
pub const FIN_ACK: u8 = 0x11;

/// Build a complete Ethernet/IPv4/TCP frame.
pub fn tcp_frame(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    seq: u32,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut packet = ethernet_ipv4(src, dst, 6, 20 + payload.len());

    // TCP header (20 bytes)
    packet.extend_from_slice(&src_port.to_be_bytes());
    packet.extend_from_slice(&dst_port.to_be_bytes());
    packet.extend_from_slice(&seq.to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Ack
    packet.push(0x50); // Data offset: 5 (20 bytes)
    packet.push(flags);
    packet.extend_from_slice(&[0xff, 0xff]); // Window: 65535
    packet.extend_from_slice(&[0x00, 0x00]); // Checksum
    packet.extend_from_slice(&[0x00, 0x00]); // Urgent pointer

    packet.extend_from_slice(payload);
    packet
}

/// Build a complete Ethernet/IPv4/UDP frame.
pub fn udp_frame(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut packet = ethernet_ipv4(src, dst, 17, 8 + payload.len());

    packet.extend_from_slice(&src_port.to_be_bytes());
    packet.extend_from_slice(&dst_port.to_be_bytes());
    packet.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00]); // Checksum

    packet.extend_from_slice(payload);
    packet
}

fn ethernet_ipv4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, ip_payload_len: usize) -> Vec<u8> {
    let mut packet = Vec::new();

    // Ethernet header (14 bytes)
    packet.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]); // dst MAC
    packet.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]); // src MAC
    packet.extend_from_slice(&[0x08, 0x00]); // ethertype: IPv4

    // IPv4 header (20 bytes)
    packet.push(0x45); // Version 4, IHL 5
    packet.push(0x00);
    packet.extend_from_slice(&((20 + ip_payload_len) as u16).to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x01]); // Identification
    packet.extend_from_slice(&[0x40, 0x00]); // Don't fragment
    packet.push(0x40); // TTL: 64
    packet.push(protocol);
    packet.extend_from_slice(&[0x00, 0x00]); // Checksum
    packet.extend_from_slice(&src.octets());
    packet.extend_from_slice(&dst.octets());

    packet
}

/// DNS response for `name` with one A answer.
pub fn dns_a_response(name: &str, addr: Ipv4Addr) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(&[0x12, 0x34]); // Transaction ID
    msg.extend_from_slice(&[0x81, 0x80]); // Flags: response, RD, RA
    msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    for label in name.split('.') {
        msg.push(label.len() as u8);
        msg.extend_from_slice(label.as_bytes());
    }
    msg.push(0);
    msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // Type A, class IN

    msg.extend_from_slice(&[0xc0, 0x0c]); // Pointer to question name
    msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    msg.extend_from_slice(&300u32.to_be_bytes()); // TTL
    msg.extend_from_slice(&[0x00, 0x04]);
    msg.extend_from_slice(&addr.octets());
    msg
}

/// Legacy little-endian microsecond pcap writer.
pub struct PcapBuilder {
    data: Vec<u8>,
}

impl PcapBuilder {
    pub fn new(link_type: u32) -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]); // Magic (little endian)
        data.extend_from_slice(&[0x02, 0x00]); // Version major (2)
        data.extend_from_slice(&[0x04, 0x00]); // Version minor (4)
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Thiszone
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Sigfigs
        data.extend_from_slice(&65535u32.to_le_bytes()); // Snaplen
        data.extend_from_slice(&link_type.to_le_bytes());
        Self { data }
    }

    pub fn packet(mut self, timestamp_us: i64, frame: &[u8]) -> Self {
        let ts_sec = (timestamp_us / 1_000_000) as u32;
        let ts_usec = (timestamp_us % 1_000_000) as u32;
        self.data.extend_from_slice(&ts_sec.to_le_bytes());
        self.data.extend_from_slice(&ts_usec.to_le_bytes());
        self.data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        self.data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        self.data.extend_from_slice(frame);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}
