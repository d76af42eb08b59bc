//! Hostname correlation for observed endpoints.
//!
//! - [`DnsCache`] - Shared IP to hostname map fed by DNS answers
//! - [`ReverseResolver`] - Backend for PTR fallback lookups
//! - [`SystemResolver`] - OS resolver backend

mod cache;
mod resolver;

pub use cache::{CacheEntry, DnsCache, Provenance};
pub use resolver::{ReverseResolver, SystemResolver};
