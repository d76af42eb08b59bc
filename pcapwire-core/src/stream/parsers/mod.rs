//! Stream protocol parsers.

mod http;

pub use http::{HttpStreamParser, MessageHead, MessageKind, ParsedMessage, StreamParseResult};
