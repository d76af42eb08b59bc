//! Fuzz target for link/IP/transport decoding.
//!
//! The first byte picks the link type; the rest is the captured frame.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use pcapwire_core::io::RawPacket;
use pcapwire_core::protocol::{decode_packet, link_type};

const LINK_TYPES: [u16; 6] = [
    link_type::ETHERNET,
    link_type::LINUX_SLL,
    link_type::NULL,
    link_type::RAW,
    link_type::IPV4,
    link_type::IPV6,
];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, frame)) = data.split_first() else {
        return;
    };

    let packet = RawPacket {
        frame_number: 1,
        timestamp_us: 0,
        link_type: LINK_TYPES[selector as usize % LINK_TYPES.len()],
        data: Bytes::copy_from_slice(frame),
    };
    let _ = decode_packet(&packet);
});
