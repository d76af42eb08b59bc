//! Observations emitted by an analysis run.

use std::net::IpAddr;

use crate::protocol::{DnsAnswer, RecordType};
use crate::stream::{HttpMessage, HttpRequest, HttpResponse};

/// One reportable observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    DnsQuery {
        timestamp_us: i64,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        name: String,
        qtype: RecordType,
    },
    DnsResponse {
        timestamp_us: i64,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        name: String,
        answers: Vec<DnsAnswer>,
    },
    HttpRequest(HttpRequest),
    HttpResponse(HttpResponse),
}

impl Event {
    pub fn timestamp_us(&self) -> i64 {
        match self {
            Event::DnsQuery { timestamp_us, .. } | Event::DnsResponse { timestamp_us, .. } => {
                *timestamp_us
            }
            Event::HttpRequest(r) => r.timestamp_us,
            Event::HttpResponse(r) => r.timestamp_us,
        }
    }

    /// Short label used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::DnsQuery { .. } => "dns_query",
            Event::DnsResponse { .. } => "dns_response",
            Event::HttpRequest(_) => "http_request",
            Event::HttpResponse(_) => "http_response",
        }
    }
}

impl From<HttpMessage> for Event {
    fn from(message: HttpMessage) -> Self {
        match message {
            HttpMessage::Request(r) => Event::HttpRequest(r),
            HttpMessage::Response(r) => Event::HttpResponse(r),
        }
    }
}
