//! Fuzz target for the incremental HTTP/1.x parser.
//!
//! The first byte selects request or response framing and the split size
//! used to feed the rest, so the parser sees the same bytes arrive in
//! arbitrary pieces:
//! - Start line and header parsing
//! - Content-Length and chunked bodies
//! - gzip decoding of capped bodies

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcapwire_core::config::StreamConfig;
use pcapwire_core::stream::parsers::{HttpStreamParser, MessageKind, StreamParseResult};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };

    let kind = if selector & 1 == 0 {
        MessageKind::Request
    } else {
        MessageKind::Response
    };
    let split = (selector >> 1) as usize + 1;

    let config = StreamConfig {
        max_body_size: 4096,
        max_head_size: 8192,
        ..StreamConfig::default()
    };
    let mut parser = HttpStreamParser::new(kind, &config);

    for piece in payload.chunks(split) {
        parser.push(piece);
        loop {
            match parser.next_message() {
                StreamParseResult::Complete(message) => {
                    if let Some(body) = message.body {
                        assert!(body.data.len() <= config.max_body_size);
                    }
                }
                StreamParseResult::NeedMore | StreamParseResult::Error { .. } => break,
            }
        }
        if parser.is_failed() {
            return;
        }
    }

    let _ = parser.finish();
    assert!(parser.consumed() <= payload.len() as u64);
});
