//! Output formatting for analysis events.
//!
//! Text output prints one block per event, headed by `=== HTTP Request ===`
//! and friends. JSON output prints one object per line.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, SecondsFormat};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use serde_json::{json, Value};

use pcapwire_core::protocol::AnswerData;
use pcapwire_core::{AnalysisSummary, Body, Endpoint, Event, Headers, HttpRequest, HttpResponse};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report blocks (default)
    Text,
    /// JSON Lines (one JSON object per event)
    Json,
}

/// Formats events for output.
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Run header. Text output only.
    pub fn write_banner<W: Write>(
        &self,
        path: &Path,
        report_dns: bool,
        writer: &mut W,
    ) -> std::io::Result<()> {
        if self.format != OutputFormat::Text {
            return Ok(());
        }
        if !report_dns {
            writeln!(writer, "Note: DNS packet analysis disabled. HTTP traffic will still be analyzed.")?;
            writeln!(writer, "      Use -d or --dns to enable DNS packet parsing.")?;
        }
        writeln!(writer, "Starting pcap analysis of file: {}", path.display())?;
        if report_dns {
            writeln!(writer, "Tracking DNS queries and HTTP streams...")?;
        } else {
            writeln!(writer, "Tracking HTTP streams only...")?;
        }
        writeln!(writer, "{}", "=".repeat(51))
    }

    /// Run footer. Text output only.
    pub fn write_footer<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(writer, "\nAnalysis complete."),
            OutputFormat::Json => Ok(()),
        }
    }

    pub fn write_event<W: Write>(&self, event: &Event, writer: &mut W) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Text => write_text(event, writer),
            OutputFormat::Json => writeln!(writer, "{}", event_json(event)),
        }
    }
}

fn write_text<W: Write>(event: &Event, w: &mut W) -> std::io::Result<()> {
    match event {
        Event::DnsQuery {
            timestamp_us,
            name,
            qtype,
            ..
        } => {
            writeln!(w, "\n=== DNS Query ===")?;
            writeln!(w, "Time: {}", format_timestamp(*timestamp_us))?;
            writeln!(w, "Query: {name} (Type: {qtype})")
        }
        Event::DnsResponse {
            timestamp_us,
            name,
            answers,
            ..
        } => {
            writeln!(w, "\n=== DNS Response ===")?;
            writeln!(w, "Time: {}", format_timestamp(*timestamp_us))?;
            writeln!(w, "Query: {name}")?;
            for answer in answers {
                writeln!(w, "  {} Record: {} -> {}", answer.rtype, answer.name, answer.data)?;
            }
            Ok(())
        }
        Event::HttpRequest(req) => write_request(req, w),
        Event::HttpResponse(resp) => write_response(resp, w),
    }
}

fn write_request<W: Write>(req: &HttpRequest, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "\n=== HTTP Request ===")?;
    writeln!(w, "Time: {}", format_timestamp(req.timestamp_us))?;
    writeln!(w, "Source: {}", req.src)?;
    writeln!(w, "Destination: {}", req.dst)?;
    writeln!(w, "Method: {}", req.method)?;
    writeln!(w, "URL: {}", req.url)?;
    writeln!(w, "Proto: {}", req.version)?;
    writeln!(w, "Host: {}", req.host.as_deref().unwrap_or(""))?;
    write_headers(&req.headers, w)?;
    if let Some(body) = &req.body {
        write_body("Request", body, w)?;
    }
    Ok(())
}

fn write_response<W: Write>(resp: &HttpResponse, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "\n=== HTTP Response ===")?;
    writeln!(w, "Time: {}", format_timestamp(resp.timestamp_us))?;
    writeln!(w, "Source: {}", resp.src)?;
    writeln!(w, "Destination: {}", resp.dst)?;
    writeln!(w, "Status: {}", format!("{} {}", resp.status_code, resp.reason).trim_end())?;
    writeln!(w, "Proto: {}", resp.version)?;
    write_headers(&resp.headers, w)?;
    if let Some(body) = &resp.body {
        write_body("Response", body, w)?;
    }
    Ok(())
}

fn write_headers<W: Write>(headers: &Headers, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "\nHeaders:")?;
    for (name, value) in headers.iter() {
        writeln!(w, "  {name}: {value}")?;
    }
    Ok(())
}

fn write_body<W: Write>(label: &str, body: &Body, w: &mut W) -> std::io::Result<()> {
    let mut notes = Vec::new();
    if body.decompressed {
        notes.push("decompressed from gzip".to_string());
    }
    if body.decompress_failed {
        notes.push("gzip decompression failed".to_string());
    }
    if body.truncated {
        notes.push(format!("truncated, {} bytes on the wire", body.wire_length));
    }

    let mut heading = format!("{} bytes", body.data.len());
    for note in notes {
        heading.push_str(", ");
        heading.push_str(&note);
    }
    writeln!(w, "\n{label} Body ({heading}):")?;
    writeln!(w, "{}", String::from_utf8_lossy(&body.data))
}

/// RFC 3339 in UTC; the raw microseconds if out of range.
pub fn format_timestamp(timestamp_us: i64) -> String {
    match DateTime::from_timestamp_micros(timestamp_us) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Micros, true),
        None => timestamp_us.to_string(),
    }
}

fn endpoint_json(endpoint: &Endpoint) -> Value {
    json!({
        "ip": endpoint.ip.to_string(),
        "port": endpoint.port,
        "hostname": endpoint.hostname,
    })
}

fn headers_json(headers: &Headers) -> Value {
    Value::Array(
        headers
            .iter()
            .map(|(name, value)| json!([name, value]))
            .collect(),
    )
}

fn body_json(body: &Option<Body>) -> Value {
    match body {
        Some(body) => json!({
            "length": body.data.len(),
            "wire_length": body.wire_length,
            "decompressed": body.decompressed,
            "decompress_failed": body.decompress_failed,
            "truncated": body.truncated,
            "text": String::from_utf8_lossy(&body.data),
        }),
        None => Value::Null,
    }
}

pub fn event_json(event: &Event) -> Value {
    match event {
        Event::DnsQuery {
            timestamp_us,
            src_ip,
            dst_ip,
            name,
            qtype,
        } => json!({
            "type": event.kind(),
            "time": format_timestamp(*timestamp_us),
            "src_ip": src_ip.to_string(),
            "dst_ip": dst_ip.to_string(),
            "name": name,
            "qtype": qtype.to_string(),
        }),
        Event::DnsResponse {
            timestamp_us,
            src_ip,
            dst_ip,
            name,
            answers,
        } => json!({
            "type": event.kind(),
            "time": format_timestamp(*timestamp_us),
            "src_ip": src_ip.to_string(),
            "dst_ip": dst_ip.to_string(),
            "name": name,
            "answers": answers
                .iter()
                .map(|a| {
                    let data = match &a.data {
                        AnswerData::Address(ip) => ip.to_string(),
                        AnswerData::Name(target) => target.clone(),
                    };
                    json!({ "type": a.rtype.to_string(), "name": a.name, "data": data })
                })
                .collect::<Vec<_>>(),
        }),
        Event::HttpRequest(req) => json!({
            "type": event.kind(),
            "time": format_timestamp(req.timestamp_us),
            "connection_id": req.connection_id,
            "src": endpoint_json(&req.src),
            "dst": endpoint_json(&req.dst),
            "method": req.method,
            "url": req.url,
            "version": req.version,
            "host": req.host,
            "headers": headers_json(&req.headers),
            "body": body_json(&req.body),
        }),
        Event::HttpResponse(resp) => json!({
            "type": event.kind(),
            "time": format_timestamp(resp.timestamp_us),
            "connection_id": resp.connection_id,
            "src": endpoint_json(&resp.src),
            "dst": endpoint_json(&resp.dst),
            "status_line": resp.status_line,
            "status_code": resp.status_code,
            "version": resp.version,
            "headers": headers_json(&resp.headers),
            "body": body_json(&resp.body),
        }),
    }
}

/// Run statistics, printed to stderr at the end.
pub fn summary_table(summary: &AnalysisSummary) -> Table {
    let streams = &summary.streams;
    let rows: [(&str, String); 14] = [
        ("Packets", summary.packets.to_string()),
        ("Undecodable packets", summary.undecodable.to_string()),
        ("TCP segments", summary.tcp_segments.to_string()),
        ("Filtered segments", summary.filtered_segments.to_string()),
        ("DNS messages", summary.dns_messages.to_string()),
        ("DNS answers cached", summary.dns_answers.to_string()),
        ("Reverse lookups", summary.reverse_lookups.to_string()),
        ("Flows", streams.flows_created.to_string()),
        ("Flows expired", streams.flows_expired.to_string()),
        ("HTTP request streams", streams.http_request_streams.to_string()),
        ("HTTP response streams", streams.http_response_streams.to_string()),
        ("Opaque streams", streams.opaque_streams.to_string()),
        ("HTTP messages", streams.messages.to_string()),
        ("Framing errors", streams.framing_errors.to_string()),
    ];

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![Cell::new("Metric"), Cell::new("Value")]);
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pcapwire_core::protocol::{DnsAnswer, RecordType};
    use std::net::{IpAddr, Ipv4Addr};

    fn ip(d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, d))
    }

    fn request() -> HttpRequest {
        let mut headers = Headers::new();
        headers.push("Host", "example.com");
        headers.push("Accept", "*/*");
        HttpRequest {
            timestamp_us: 1_700_000_000_000_000,
            connection_id: 1,
            src: Endpoint::new(ip(5), 50000),
            dst: Endpoint {
                ip: ip(80),
                port: 80,
                hostname: Some("example.com".to_string()),
            },
            method: "POST".to_string(),
            target: "/submit".to_string(),
            url: "http://example.com/submit".to_string(),
            version: "HTTP/1.1".to_string(),
            host: Some("example.com".to_string()),
            headers,
            body: Some(Body {
                data: Bytes::from_static(b"a=1"),
                wire_length: 3,
                decompressed: false,
                decompress_failed: false,
                truncated: false,
            }),
        }
    }

    fn render(format: OutputFormat, event: &Event) -> String {
        let mut out = Vec::new();
        OutputFormatter::new(format)
            .write_event(event, &mut out)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text_request() {
        let text = render(OutputFormat::Text, &Event::HttpRequest(request()));

        assert!(text.contains("=== HTTP Request ==="));
        assert!(text.contains("Time: 2023-11-14T22:13:20.000000Z"));
        assert!(text.contains("Source: 10.0.0.5:50000\n"));
        assert!(text.contains("Destination: 10.0.0.80:80 (example.com)"));
        assert!(text.contains("Method: POST"));
        assert!(text.contains("URL: http://example.com/submit"));
        assert!(text.contains("  Host: example.com\n  Accept: */*"));
        assert!(text.contains("Request Body (3 bytes):\na=1"));
    }

    #[test]
    fn test_text_dns_response() {
        let event = Event::DnsResponse {
            timestamp_us: 0,
            src_ip: ip(1),
            dst_ip: ip(5),
            name: "www.example.com".to_string(),
            answers: vec![
                DnsAnswer {
                    rtype: RecordType::Cname,
                    name: "www.example.com".to_string(),
                    data: AnswerData::Name("cdn.example.com".to_string()),
                },
                DnsAnswer {
                    rtype: RecordType::A,
                    name: "cdn.example.com".to_string(),
                    data: AnswerData::Address(ip(80)),
                },
            ],
        };
        let text = render(OutputFormat::Text, &event);

        assert!(text.contains("=== DNS Response ==="));
        assert!(text.contains("  CNAME Record: www.example.com -> cdn.example.com"));
        assert!(text.contains("  A Record: cdn.example.com -> 10.0.0.80"));
    }

    #[test]
    fn test_json_request() {
        let line = render(OutputFormat::Json, &Event::HttpRequest(request()));
        assert_eq!(line.lines().count(), 1);

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "http_request");
        assert_eq!(value["url"], "http://example.com/submit");
        assert_eq!(value["dst"]["hostname"], "example.com");
        assert_eq!(value["src"]["hostname"], Value::Null);
        assert_eq!(value["headers"][1][0], "Accept");
        assert_eq!(value["body"]["text"], "a=1");
    }

    #[test]
    fn test_banner_text_only() {
        let mut out = Vec::new();
        OutputFormatter::new(OutputFormat::Json)
            .write_banner(Path::new("x.pcap"), false, &mut out)
            .unwrap();
        assert!(out.is_empty());

        OutputFormatter::new(OutputFormat::Text)
            .write_banner(Path::new("x.pcap"), true, &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Starting pcap analysis of file: x.pcap"));
        assert!(text.contains("Tracking DNS queries and HTTP streams..."));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00.000000Z");
        assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn test_summary_table() {
        let summary = AnalysisSummary {
            packets: 42,
            ..Default::default()
        };
        let rendered = summary_table(&summary).to_string();
        assert!(rendered.contains("Packets"));
        assert!(rendered.contains("42"));
    }
}
