//! Packet decoding.
//!
//! [`decode_packet`] lifts a captured frame to a [`CaptureRecord`] carrying
//! addresses and a TCP segment or UDP datagram. [`parse_message`] decodes DNS
//! payloads found on UDP port 53.

mod decode;
mod dns;

pub use decode::{
    decode_packet, ethertype, ip_protocol, link_type, CaptureRecord, DecodeError, TcpSegment,
    Transport, UdpDatagram,
};
pub use dns::{
    parse_message, record_type, AnswerData, DnsAnswer, DnsError, DnsMessage, DnsQuestion,
    RecordType, DNS_PORT,
};

#[cfg(test)]
pub(crate) use decode::test_utils;
