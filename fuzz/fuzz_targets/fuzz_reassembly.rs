//! Fuzz target for single-direction TCP reassembly.
//!
//! Input is a sequence of 4-byte segment descriptors (offset, flags, length)
//! over a fixed reference stream. Whatever the order, duplication or overlap,
//! delivered bytes must be a prefix of the reference stream.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use pcapwire_core::stream::{StreamBuffer, TcpFlags};

const ISN: u32 = 0xFFFF_FF00;

fuzz_target!(|data: &[u8]| {
    let reference: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    let mut buffer = StreamBuffer::new(512);
    let mut delivered = Vec::new();

    let syn = TcpFlags {
        syn: true,
        ..TcpFlags::default()
    };
    buffer.submit(ISN, syn, Bytes::new(), 0);

    for (i, desc) in data.chunks_exact(4).enumerate() {
        let offset = u16::from_be_bytes([desc[0], desc[1]]) as usize % reference.len();
        let len = (desc[3] as usize).min(reference.len() - offset);
        let flags = TcpFlags {
            ack: true,
            fin: desc[2] & 0x01 != 0,
            rst: desc[2] & 0x02 != 0,
            ..TcpFlags::default()
        };
        let seq = ISN.wrapping_add(1).wrapping_add(offset as u32);
        let payload = Bytes::copy_from_slice(&reference[offset..offset + len]);

        let delivery = buffer.submit(seq, flags, payload, i as i64);
        for chunk in delivery.chunks {
            delivered.extend_from_slice(&chunk.data);
        }
        if delivery.terminal {
            break;
        }
    }

    assert!(delivered.len() <= reference.len());
    assert_eq!(&delivered[..], &reference[..delivered.len()]);
});
