#![no_main]
use arbitrary::Arbitrary;
use autosort_core::id::PeerId;
use autosort_core::message::{DOMAIN_KIND_BASE, TransportMessage};
use autosort_core::test_utils::*;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    sender: u8,
    messages: Vec<(u8, bool, Vec<u8>)>,
}

fuzz_target!(|input: Input| {
    // Arbitrary batches must never panic the router; foreign messages must
    // come back untouched.
    let (mut ctx, _outbox) = build_sorting_floor(6);
    let mut batch: Vec<TransportMessage> = input
        .messages
        .into_iter()
        .map(|(offset, domain, bytes)| {
            let kind = if domain {
                DOMAIN_KIND_BASE + u16::from(offset % 8)
            } else {
                u16::from(offset)
            };
            TransportMessage::opaque(kind, bytes)
        })
        .collect();
    let foreign: Vec<TransportMessage> = batch
        .iter()
        .filter(|m| m.kind < DOMAIN_KIND_BASE)
        .cloned()
        .collect();
    ctx.receive(&mut batch, PeerId(u64::from(input.sender)));
    assert_eq!(batch, foreign);
});
