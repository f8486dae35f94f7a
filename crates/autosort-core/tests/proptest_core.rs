//! Property-based tests for the AutoSort core.
//!
//! Uses proptest to generate random batches, container floors and settings,
//! then verify the routing and distribution invariants hold.

use autosort_core::engine::DistributionEngine;
use autosort_core::id::*;
use autosort_core::item::UNLIMITED_SUPPLY;
use autosort_core::message::{DOMAIN_KIND_BASE, DomainMessage, MessageType, TransportMessage, encode};
use autosort_core::node::{AdditionalData, FilterRule, NodeSnapshot, SortMode, SorterSettings};
use autosort_core::serialize::{decode_snapshot, encode_snapshot};
use autosort_core::test_utils::*;
use proptest::prelude::*;
use std::collections::HashSet;

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
enum BatchEntry {
    Foreign(u16, Vec<u8>),
    Upgrade(u32),
    Garbage(u16, Vec<u8>),
}

fn arb_batch(max_len: usize) -> impl Strategy<Value = Vec<BatchEntry>> {
    proptest::collection::vec(
        prop_oneof![
            (0..DOMAIN_KIND_BASE, proptest::collection::vec(any::<u8>(), 0..8))
                .prop_map(|(k, b)| BatchEntry::Foreign(k, b)),
            (0..6u32).prop_map(BatchEntry::Upgrade),
            (0..6u16, proptest::collection::vec(any::<u8>(), 0..8))
                .prop_map(|(k, b)| BatchEntry::Garbage(DOMAIN_KIND_BASE + k, b)),
        ],
        0..=max_len,
    )
}

fn arb_mode() -> impl Strategy<Value = SortMode> {
    prop_oneof![Just(SortMode::Auto), Just(SortMode::Filtered)]
}

fn arb_rule() -> impl Strategy<Value = FilterRule> {
    (0..4u32, 0..60u32, any::<bool>()).prop_map(|(item, max, unlimited)| {
        if unlimited {
            FilterRule::unlimited(ItemTypeId(item))
        } else {
            FilterRule::capped(ItemTypeId(item), max)
        }
    })
}

fn arb_settings() -> impl Strategy<Value = SorterSettings> {
    (arb_mode(), any::<i32>(), proptest::collection::vec(arb_rule(), 0..5)).prop_map(
        |(mode, priority, rules)| {
            let mut settings = SorterSettings {
                mode,
                priority,
                ..SorterSettings::default()
            };
            for rule in rules {
                settings.set_filter(rule);
            }
            settings
        },
    )
}

/// One container: optional settings and up to three stacks.
fn arb_container() -> impl Strategy<Value = (Option<SorterSettings>, Vec<(ItemTypeId, u32)>)> {
    (
        proptest::option::of(arb_settings()),
        proptest::collection::vec((0..4u32, 1..50u32), 0..3),
    )
        .prop_map(|(settings, stacks)| {
            let contents = stacks.into_iter().map(|(i, q)| (ItemTypeId(i), q)).collect();
            (settings, contents)
        })
}

fn build_floor(
    containers: &[(Option<SorterSettings>, Vec<(ItemTypeId, u32)>)],
) -> autosort_core::context::SorterContext {
    let (mut ctx, _outbox) = host_context();
    for (i, (settings, contents)) in containers.iter().enumerate() {
        let node = add_container(&mut ctx, i as u32, contents);
        if let Some(settings) = settings {
            upgrade_node(&mut ctx, node, settings.mode, settings.priority);
            for rule in settings.filters.values() {
                ctx.set_filter(node, *rule).unwrap();
            }
        }
    }
    ctx
}

fn total_of(ctx: &autosort_core::context::SorterContext, item: ItemTypeId) -> u64 {
    ctx.registry()
        .iter()
        .map(|n| u64::from(quantity_of(ctx, n.id(), item)))
        .sum()
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Foreign messages survive routing unmodified and in order.
    #[test]
    fn foreign_messages_preserved(entries in arb_batch(24)) {
        let (mut ctx, _outbox) = host_context();
        for id in 0..3 {
            add_container(&mut ctx, id, &[]);
        }

        let mut expected = Vec::new();
        let mut batch: Vec<TransportMessage> = Vec::new();
        for entry in &entries {
            match entry {
                BatchEntry::Foreign(kind, bytes) => {
                    let msg = foreign(*kind, bytes);
                    expected.push(msg.clone());
                    batch.push(msg);
                }
                BatchEntry::Upgrade(node) => {
                    batch.push(encode(&DomainMessage::upgrade(NodeId(*node), true)).unwrap());
                }
                BatchEntry::Garbage(kind, bytes) => {
                    batch.push(TransportMessage::opaque(*kind, bytes.clone()));
                }
            }
        }

        let outcome = ctx.receive(&mut batch, PeerId(2));
        prop_assert_eq!(&batch, &expected);
        prop_assert_eq!(outcome.needs_default_handling, !expected.is_empty());
        prop_assert_eq!(outcome.dispatched + outcome.dropped, entries.len() - expected.len());
    }

    /// Items never appear or vanish during distribution.
    #[test]
    fn distribution_conserves_items(containers in proptest::collection::vec(arb_container(), 1..8)) {
        let mut ctx = build_floor(&containers);
        let before: Vec<u64> = (0..4).map(|i| total_of(&ctx, ItemTypeId(i))).collect();
        let mut engine = DistributionEngine::new();
        for _ in 0..3 {
            engine.run_cycle(&mut ctx);
        }
        let after: Vec<u64> = (0..4).map(|i| total_of(&ctx, ItemTypeId(i))).collect();
        prop_assert_eq!(before, after);
    }

    /// Unlimited supply stacks keep their count through any number of cycles.
    #[test]
    fn unlimited_supply_never_drained(
        containers in proptest::collection::vec(arb_container(), 1..6),
        cycles in 1..5usize,
    ) {
        let mut ctx = build_floor(&containers);
        let source = add_container(&mut ctx, 100, &[(ItemTypeId(0), UNLIMITED_SUPPLY)]);
        let mut engine = DistributionEngine::new();
        for _ in 0..cycles {
            engine.run_cycle(&mut ctx);
        }
        prop_assert_eq!(quantity_of(&ctx, source, ItemTypeId(0)), UNLIMITED_SUPPLY);
    }

    /// Upgraded nodes sharing a priority never exchange items.
    #[test]
    fn equal_priority_isolation(
        containers in proptest::collection::vec(arb_container(), 2..8),
        priority in -5..5i32,
    ) {
        let containers: Vec<_> = containers
            .into_iter()
            .map(|(settings, contents)| {
                let mut settings = settings.unwrap_or_default();
                settings.priority = priority;
                (Some(settings), contents)
            })
            .collect();
        let mut ctx = build_floor(&containers);
        let before: Vec<Vec<u32>> = ctx
            .registry()
            .iter()
            .map(|n| (0..4).map(|i| quantity_of(&ctx, n.id(), ItemTypeId(i))).collect())
            .collect();

        DistributionEngine::new().run_cycle(&mut ctx);

        let after: Vec<Vec<u32>> = ctx
            .registry()
            .iter()
            .map(|n| (0..4).map(|i| quantity_of(&ctx, n.id(), ItemTypeId(i))).collect())
            .collect();
        prop_assert_eq!(before, after);
    }

    /// A filtered destination never ends a cycle above a cap it was below.
    #[test]
    fn filtered_cap_respected(
        held in 0..30u32,
        cap in 0..40u32,
        supply in 0..100u32,
    ) {
        let (mut ctx, _outbox) = host_context();
        let dest = add_container(&mut ctx, 0, &[(plank(), held)]);
        add_container(&mut ctx, 1, &[(plank(), supply)]);
        upgrade_node(&mut ctx, dest, SortMode::Filtered, 1);
        ctx.set_filter(dest, FilterRule::capped(plank(), cap)).unwrap();

        DistributionEngine::new().run_cycle(&mut ctx);
        let now = quantity_of(&ctx, dest, plank());
        prop_assert_eq!(now, held.max(cap.min(held + supply)));
    }

    /// Snapshot encoding round-trips settings and additional data.
    #[test]
    fn snapshot_round_trip(settings in proptest::option::of(arb_settings()), ignore in any::<bool>()) {
        let snapshot = NodeSnapshot { settings, additional: AdditionalData { ignore } };
        let bytes = encode_snapshot(&snapshot).unwrap();
        prop_assert_eq!(decode_snapshot(&bytes).unwrap(), snapshot);
    }

    /// Settings survive the data-update message codec.
    #[test]
    fn data_update_round_trip(settings in arb_settings(), node in any::<u32>()) {
        let msg = DomainMessage::data_update(NodeId(node), settings);
        let wire = encode(&msg).unwrap();
        prop_assert_eq!(wire.kind, MessageType::StorageDataUpdate.kind());
        prop_assert_eq!(autosort_core::message::decode(&wire).unwrap(), msg);
    }

    /// Registered ids stay unique under any register/unregister sequence.
    #[test]
    fn registry_ids_unique(ops in proptest::collection::vec((any::<bool>(), 0..8u32), 1..40)) {
        let (mut ctx, _outbox) = host_context();
        for (register, id) in ops {
            if register {
                let inventory = ctx.add_inventory(inventory_with(&[]));
                let _ = ctx.register_container(NodeId(id), inventory);
            } else {
                ctx.unregister_container(NodeId(id));
            }
            let ids = ctx.registry().ids();
            let unique: HashSet<_> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
            prop_assert_eq!(ids.len(), ctx.registry().len());
        }
    }
}
