//! Multi-participant scenarios over the in-memory [`LocalNetwork`].

use autosort_core::config::{SorterConfig, UpgradeCost};
use autosort_core::context::{Role, SorterContext};
use autosort_core::engine::DistributionEngine;
use autosort_core::event::SorterEvent;
use autosort_core::id::*;
use autosort_core::node::{FilterRule, SortMode};
use autosort_core::serialize::MemoryStore;
use autosort_core::test_utils::*;
use autosort_core::transport::Outbox;
use std::time::{Duration, Instant};

fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

fn slots_match(net: &LocalNetwork, node: NodeId) -> bool {
    let host = net.host();
    let expected = host.inventories()[host.registry().get(node).unwrap().inventory()].slots();
    net.peers().into_iter().all(|p| {
        let ctx = net.ctx(p);
        ctx.inventories()[ctx.registry().get(node).unwrap().inventory()].slots() == expected
    })
}

#[test]
fn upgrade_on_peer_reaches_everyone() {
    init_logger();
    let mut net = LocalNetwork::new();
    let alice = net.add_peer();
    let bob = net.add_peer();
    let node = net.add_container(7, &[]);
    net.pump();

    let wallet = net.ctx_mut(alice).add_inventory(inventory_with(&[]));
    net.ctx_mut(alice).upgrade(node, wallet).unwrap();
    net.ctx_mut(alice).set_priority(node, 4).unwrap();
    net.ctx_mut(alice).set_filter(node, FilterRule::capped(rope(), 12)).unwrap();
    net.pump();

    for peer in [LocalNetwork::HOST, alice, bob] {
        let view = net.ctx(peer).node_view(node).unwrap();
        assert!(view.upgraded, "{peer} did not see the upgrade");
        assert_eq!(view.priority, Some(4));
        assert_eq!(view.filters, vec![FilterRule::capped(rope(), 12)]);
    }
}

#[test]
fn late_joiner_receives_state_from_host() {
    init_logger();
    let mut net = LocalNetwork::new();
    let node = net.add_container(3, &[]);
    upgrade_node(net.host_mut(), node, SortMode::Auto, 9);
    net.host_mut().set_ignore(node, true).unwrap();
    net.pump();

    // The peer joins after the host configured the node.
    let carol = net.add_peer();
    let inventory = net.ctx_mut(carol).add_inventory(inventory_with(&[]));
    net.ctx_mut(carol).register_container(node, inventory).unwrap();
    net.pump();

    let view = net.ctx(carol).node_view(node).unwrap();
    assert_eq!(view.mode, Some(SortMode::Auto));
    assert_eq!(view.priority, Some(9));
    assert!(view.ignored);
}

#[test]
fn plain_containers_get_no_state_reply() {
    let mut net = LocalNetwork::new();
    let peer = net.add_peer();
    net.add_container(1, &[]);
    // One request from the peer, no reply from the host.
    assert_eq!(net.pump(), 1);
    assert!(!net.ctx(peer).node_view(NodeId(1)).unwrap().upgraded);
}

#[test]
fn distribution_replicates_inventories() {
    init_logger();
    let mut net = LocalNetwork::new();
    let peer = net.add_peer();
    let dest = net.add_container(1, &[(plank(), 1)]);
    let src = net.add_container(2, &[(plank(), 30), (rope(), 5)]);
    net.pump();
    upgrade_node(net.host_mut(), dest, SortMode::Auto, 2);

    let mut engine = DistributionEngine::new();
    engine.run_cycle(net.host_mut());
    net.pump();

    assert_eq!(quantity_of(net.host(), dest, plank()), 31);
    assert_eq!(quantity_of(net.host(), src, plank()), 0);
    assert!(slots_match(&net, dest));
    assert!(slots_match(&net, src));
    assert_eq!(quantity_of(net.ctx(peer), src, rope()), 5);
}

#[test]
fn peer_inventory_edit_reaches_host_and_defers_source() {
    let mut net = LocalNetwork::new();
    let peer = net.add_peer();
    let dest = net.add_container(1, &[(plank(), 1)]);
    let chest = net.add_container(2, &[]);
    upgrade_node(net.host_mut(), dest, SortMode::Auto, 1);
    net.pump();

    // A player on the peer drops planks into the chest.
    let added = net
        .ctx_mut(peer)
        .edit_inventory(chest, |inv| inv.add(plank(), 6))
        .unwrap();
    assert_eq!(added, 6);
    net.pump();
    assert_eq!(quantity_of(net.host(), chest, plank()), 6);
    assert!(net.host().node_view(chest).unwrap().dirty);

    let mut engine = DistributionEngine::new();
    engine.run_cycle(net.host_mut());
    assert_eq!(quantity_of(net.host(), chest, plank()), 6);
    engine.run_cycle(net.host_mut());
    assert_eq!(quantity_of(net.host(), chest, plank()), 0);
    assert_eq!(quantity_of(net.host(), dest, plank()), 7);
}

#[test]
fn priority_chain_fills_top_first() {
    let (mut ctx, _outbox) = host_context();
    let high = add_sized_container(&mut ctx, 1, 1, 10, &[(plank(), 1)]);
    let mid = add_container(&mut ctx, 2, &[(plank(), 20)]);
    let low = add_container(&mut ctx, 3, &[(plank(), 1)]);
    let chest = add_container(&mut ctx, 4, &[(plank(), 40)]);
    upgrade_node(&mut ctx, high, SortMode::Auto, 10);
    upgrade_node(&mut ctx, mid, SortMode::Auto, 5);
    upgrade_node(&mut ctx, low, SortMode::Auto, 0);

    DistributionEngine::new().run_cycle(&mut ctx);
    // High tops up its single stack from mid, mid then drains low and the
    // chest, and low has nothing left to ask for. Nothing flows back down.
    assert_eq!(quantity_of(&ctx, high, plank()), 10);
    assert_eq!(quantity_of(&ctx, mid, plank()), 52);
    assert_eq!(quantity_of(&ctx, low, plank()), 0);
    assert_eq!(quantity_of(&ctx, chest, plank()), 0);
}

#[test]
fn host_polls_on_schedule() {
    let mut net = LocalNetwork::with_config(SorterConfig {
        check_interval: Duration::from_secs(2),
        checkpoints_per_poll: 8,
        ..SorterConfig::default()
    });
    net.add_peer();
    let dest = net.add_container(1, &[(plank(), 1)]);
    net.add_container(2, &[(plank(), 4)]);
    upgrade_node(net.host_mut(), dest, SortMode::Auto, 1);

    let mut engine = DistributionEngine::new();
    let t0 = Instant::now();
    let report = engine.poll(net.host_mut(), t0).expect("cycle fits in one poll");
    assert_eq!(report.items_moved, 4);
    assert!(engine.poll(net.host_mut(), t0 + Duration::from_secs(1)).is_none());
    net.pump();
    assert!(slots_match(&net, dest));
}

#[test]
fn save_reload_round_trip() {
    init_logger();
    let store = MemoryStore::new();
    let outbox = Outbox::new();
    let mut ctx = SorterContext::new(
        PeerId(1),
        Role::Host,
        SorterConfig::default(),
        Box::new(outbox.clone()),
    )
    .with_store(Box::new(store.clone()));

    ctx.world_loaded("island");
    let node = add_container(&mut ctx, 11, &[]);
    upgrade_node(&mut ctx, node, SortMode::Filtered, -2);
    ctx.set_filter(node, FilterRule::capped(stone(), 25)).unwrap();
    ctx.set_filter(node, FilterRule::unlimited(nail())).unwrap();
    ctx.save_world();
    ctx.world_unloaded();

    // A fresh session over the same store.
    let mut ctx = SorterContext::new(
        PeerId(1),
        Role::Host,
        SorterConfig::default(),
        Box::new(Outbox::new()),
    )
    .with_store(Box::new(store.clone()));
    ctx.world_loaded("island");
    add_container(&mut ctx, 11, &[]);
    add_container(&mut ctx, 12, &[]);

    let view = ctx.node_view(node).unwrap();
    assert_eq!(view.priority, Some(-2));
    assert_eq!(
        view.filters,
        vec![FilterRule::unlimited(nail()), FilterRule::capped(stone(), 25)]
    );
    assert!(!ctx.node_view(NodeId(12)).unwrap().upgraded);

    // Another save name sees nothing.
    ctx.world_unloaded();
    ctx.world_loaded("other");
    add_container(&mut ctx, 11, &[]);
    assert!(!ctx.node_view(node).unwrap().upgraded);
}

#[test]
fn rejected_upgrade_surfaces_event() {
    let mut net = LocalNetwork::with_config(SorterConfig::with_costs(vec![UpgradeCost {
        item: plank(),
        amount: 8,
    }]));
    let peer = net.add_peer();
    let node = net.add_container(1, &[]);
    net.pump();

    let wallet = net.ctx_mut(peer).add_inventory(inventory_with(&[(plank(), 3)]));
    assert!(net.ctx_mut(peer).upgrade(node, wallet).is_err());
    net.pump();

    assert!(matches!(
        net.ctx_mut(peer).drain_events().as_slice(),
        [SorterEvent::UpgradeRejected { .. }]
    ));
    assert!(!net.host().node_view(node).unwrap().upgraded);
}
