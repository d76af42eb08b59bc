//! Fuzz target for DNS wire decoding.
//!
//! Exercises header parsing, name compression pointers (including loops
//! and out-of-range targets) and A/AAAA/CNAME answer extraction.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcapwire_core::protocol::{parse_message, AnswerData, RecordType};

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = parse_message(data) {
        for answer in &message.answers {
            match (&answer.rtype, &answer.data) {
                (RecordType::A, AnswerData::Address(ip)) => assert!(ip.is_ipv4()),
                (RecordType::Aaaa, AnswerData::Address(ip)) => assert!(ip.is_ipv6()),
                (RecordType::Cname, AnswerData::Name(_)) => {}
                other => panic!("unexpected answer shape: {other:?}"),
            }
        }
    }
});
