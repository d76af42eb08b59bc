//! DNS wire format decoding.
//!
//! Only what correlation needs is decoded: the header flags, the first
//! question, and A/AAAA/CNAME answers. Names may use compression pointers.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

/// DNS well-known port.
pub const DNS_PORT: u16 = 53;

const HEADER_LEN: usize = 12;
const MAX_LABELS: usize = 128;
const MAX_POINTER_JUMPS: usize = 32;

/// DNS record types.
pub mod record_type {
    pub const A: u16 = 1;
    pub const CNAME: u16 = 5;
    pub const AAAA: u16 = 28;
}

/// Record type of a question or answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Other(u16),
}

impl RecordType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            record_type::A => RecordType::A,
            record_type::AAAA => RecordType::Aaaa,
            record_type::CNAME => RecordType::Cname,
            other => RecordType::Other(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => record_type::A,
            RecordType::Aaaa => record_type::AAAA,
            RecordType::Cname => record_type::CNAME,
            RecordType::Other(v) => v,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => f.write_str("A"),
            RecordType::Aaaa => f.write_str("AAAA"),
            RecordType::Cname => f.write_str("CNAME"),
            RecordType::Other(v) => write!(f, "TYPE{v}"),
        }
    }
}

/// Payload of a decoded answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerData {
    Address(IpAddr),
    Name(String),
}

impl fmt::Display for AnswerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerData::Address(ip) => write!(f, "{ip}"),
            AnswerData::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: RecordType,
}

/// One A, AAAA or CNAME answer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    pub rtype: RecordType,
    pub name: String,
    pub data: AnswerData,
}

impl DnsAnswer {
    /// Address carried by an A/AAAA answer.
    pub fn address(&self) -> Option<IpAddr> {
        match self.data {
            AnswerData::Address(ip) => Some(ip),
            AnswerData::Name(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    pub transaction_id: u16,
    pub is_response: bool,
    pub rcode: u8,
    pub question: Option<DnsQuestion>,
    pub answers: Vec<DnsAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("DNS header too short")]
    TooShort,

    #[error("unexpected end of data at offset {0}")]
    Truncated(usize),

    #[error("invalid label length {0}")]
    BadLabel(usize),

    #[error("compression pointer loop")]
    PointerLoop,

    #[error("too many labels in domain name")]
    TooManyLabels,
}

/// Decode a DNS message.
///
/// A truncated answer section keeps the answers decoded before the cut.
pub fn parse_message(data: &[u8]) -> Result<DnsMessage, DnsError> {
    if data.len() < HEADER_LEN {
        return Err(DnsError::TooShort);
    }

    let transaction_id = u16::from_be_bytes([data[0], data[1]]);
    let flags = u16::from_be_bytes([data[2], data[3]]);
    let is_response = (flags & 0x8000) != 0;
    let rcode = (flags & 0x000F) as u8;
    let qdcount = u16::from_be_bytes([data[4], data[5]]) as usize;
    let ancount = u16::from_be_bytes([data[6], data[7]]) as usize;

    let mut pos = HEADER_LEN;
    let mut question = None;
    for i in 0..qdcount {
        let (q, next) = parse_question(data, pos)?;
        if i == 0 {
            question = Some(q);
        }
        pos = next;
    }

    let mut answers = Vec::new();
    for _ in 0..ancount {
        match parse_answer(data, pos) {
            Ok((answer, next)) => {
                if let Some(answer) = answer {
                    answers.push(answer);
                }
                pos = next;
            }
            Err(_) => break,
        }
    }

    Ok(DnsMessage {
        transaction_id,
        is_response,
        rcode,
        question,
        answers,
    })
}

fn parse_question(data: &[u8], pos: usize) -> Result<(DnsQuestion, usize), DnsError> {
    let (name, pos) = parse_domain_name(data, pos)?;
    let qtype = read_u16(data, pos)?;
    // QCLASS
    read_u16(data, pos + 2)?;
    Ok((
        DnsQuestion {
            name,
            qtype: RecordType::from_u16(qtype),
        },
        pos + 4,
    ))
}

fn parse_answer(data: &[u8], pos: usize) -> Result<(Option<DnsAnswer>, usize), DnsError> {
    let (name, pos) = parse_domain_name(data, pos)?;
    let rtype = read_u16(data, pos)?;
    // CLASS (2) and TTL (4)
    let rdlength = read_u16(data, pos + 8)? as usize;
    let rdata_start = pos + 10;
    let rdata_end = rdata_start + rdlength;
    if rdata_end > data.len() {
        return Err(DnsError::Truncated(data.len()));
    }
    let rdata = &data[rdata_start..rdata_end];

    let answer = match (RecordType::from_u16(rtype), rdlength) {
        (RecordType::A, 4) => Some(AnswerData::Address(IpAddr::V4(Ipv4Addr::new(
            rdata[0], rdata[1], rdata[2], rdata[3],
        )))),
        (RecordType::Aaaa, 16) => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            Some(AnswerData::Address(IpAddr::V6(Ipv6Addr::from(octets))))
        }
        (RecordType::Cname, _) => {
            let (target, _) = parse_domain_name(data, rdata_start)?;
            Some(AnswerData::Name(target))
        }
        _ => None,
    };

    Ok((
        answer.map(|data| DnsAnswer {
            rtype: RecordType::from_u16(rtype),
            name,
            data,
        }),
        rdata_end,
    ))
}

/// Parse a (possibly compressed) domain name starting at `start`.
///
/// Returns the dotted name and the offset just past the name's encoding at
/// `start`; pointer targets do not advance the returned offset.
fn parse_domain_name(data: &[u8], start: usize) -> Result<(String, usize), DnsError> {
    let mut name_parts: Vec<String> = Vec::with_capacity(4);
    let mut pos = start;
    let mut end = None;
    let mut jumps = 0;

    loop {
        let Some(&len_byte) = data.get(pos) else {
            return Err(DnsError::Truncated(pos));
        };
        let len = len_byte as usize;

        if len == 0 {
            pos += 1;
            break;
        }

        if (len & 0xC0) == 0xC0 {
            let Some(&low) = data.get(pos + 1) else {
                return Err(DnsError::Truncated(pos + 1));
            };
            if end.is_none() {
                end = Some(pos + 2);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(DnsError::PointerLoop);
            }
            pos = ((len & 0x3F) << 8) | low as usize;
            continue;
        }

        if len > 63 {
            return Err(DnsError::BadLabel(len));
        }

        let label = data
            .get(pos + 1..pos + 1 + len)
            .ok_or(DnsError::Truncated(pos + 1))?;
        name_parts.push(String::from_utf8_lossy(label).into_owned());
        pos += 1 + len;

        if name_parts.len() > MAX_LABELS {
            return Err(DnsError::TooManyLabels);
        }
    }

    let name = if name_parts.is_empty() {
        ".".to_string()
    } else {
        name_parts.join(".")
    };

    Ok((name, end.unwrap_or(pos)))
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16, DnsError> {
    data.get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(DnsError::Truncated(pos))
}
