//! Reconstructed HTTP messages.

use std::fmt;
use std::net::IpAddr;

use bytes::Bytes;
use url::Url;

use super::classifier::TLS_PORTS;

/// Header list preserving wire order; lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in wire order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Message body as exposed to consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    /// Kept bytes, decompressed when `decompressed` is set.
    pub data: Bytes,
    /// Body length on the wire (after de-chunking, before decompression).
    pub wire_length: u64,
    /// `data` is the gzip-decoded body.
    pub decompressed: bool,
    /// Content-Encoding named gzip but decoding failed; `data` is raw.
    pub decompress_failed: bool,
    /// `data` does not hold the whole body: the size cap was hit or the
    /// stream ended mid-body.
    pub truncated: bool,
}

/// One side of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
    pub hostname: Option<String>,
}

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            ip,
            port,
            hostname: None,
        }
    }

    /// Hostname if known, else the address.
    pub fn display_name(&self) -> String {
        self.hostname.clone().unwrap_or_else(|| self.ip.to_string())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port)?,
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port)?,
        }
        if let Some(name) = &self.hostname {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Capture time of the segment carrying the first byte of the message.
    pub timestamp_us: i64,
    pub connection_id: u64,
    pub src: Endpoint,
    pub dst: Endpoint,
    pub method: String,
    /// Request target exactly as sent.
    pub target: String,
    /// Reconstructed absolute URL.
    pub url: String,
    pub version: String,
    pub host: Option<String>,
    pub headers: Headers,
    pub body: Option<Body>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub timestamp_us: i64,
    pub connection_id: u64,
    pub src: Endpoint,
    pub dst: Endpoint,
    /// `HTTP/1.1 200 OK`
    pub status_line: String,
    pub status_code: u16,
    pub reason: String,
    pub version: String,
    pub headers: Headers,
    pub body: Option<Body>,
}

/// A request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMessage {
    Request(HttpRequest),
    Response(HttpResponse),
}

impl HttpMessage {
    pub fn timestamp_us(&self) -> i64 {
        match self {
            HttpMessage::Request(r) => r.timestamp_us,
            HttpMessage::Response(r) => r.timestamp_us,
        }
    }

    pub fn connection_id(&self) -> u64 {
        match self {
            HttpMessage::Request(r) => r.connection_id,
            HttpMessage::Response(r) => r.connection_id,
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            HttpMessage::Request(r) => &r.headers,
            HttpMessage::Response(r) => &r.headers,
        }
    }

    pub fn body(&self) -> Option<&Body> {
        match self {
            HttpMessage::Request(r) => r.body.as_ref(),
            HttpMessage::Response(r) => r.body.as_ref(),
        }
    }
}

/// Build the absolute URL for a request.
///
/// `host_header` wins over `dst_hostname`, which wins over the raw address.
/// The port is appended unless it is the scheme default or the authority
/// already names one.
pub fn derive_url(
    target: &str,
    host_header: Option<&str>,
    dst_hostname: Option<&str>,
    dst_ip: IpAddr,
    dst_port: u16,
) -> String {
    let scheme = if TLS_PORTS.contains(&dst_port) {
        "https"
    } else {
        "http"
    };

    let mut authority = match (non_empty(host_header), non_empty(dst_hostname)) {
        (Some(host), _) => host.to_string(),
        (None, Some(name)) => name.to_string(),
        (None, None) => match dst_ip {
            IpAddr::V4(ip) => ip.to_string(),
            IpAddr::V6(ip) => format!("[{}]", ip),
        },
    };

    let default_port = matches!((scheme, dst_port), ("http", 80) | ("https", 443));
    if !default_port && !has_port(&authority) {
        authority.push(':');
        authority.push_str(&dst_port.to_string());
    }

    format!("{}://{}{}", scheme, authority, path_and_query(target))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn has_port(authority: &str) -> bool {
    match authority.rfind(']') {
        Some(end) => authority[end..].contains(':'),
        None => authority.contains(':'),
    }
}

/// Origin-form targets pass through; absolute-form targets contribute their
/// path and query; authority and asterisk forms have no path.
fn path_and_query(target: &str) -> String {
    if target.starts_with('/') {
        return target.to_string();
    }
    match Url::parse(target) {
        Ok(url) if url.has_host() => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        _ => String::new(),
    }
}
