//! Two participants sharing a sorting network.
//!
//! Builds a host and one peer over an in-memory network, upgrades a chest
//! on the peer, runs a distribution cycle on the host and shows that both
//! sides agree on the result.
//!
//! Run with: `cargo run -p autosort-core --example two_peer_sync`

use autosort_core::engine::DistributionEngine;
use autosort_core::node::{FilterRule, SortMode};
use autosort_core::test_utils::*;

fn main() {
    let mut net = LocalNetwork::new();
    let peer = net.add_peer();

    let sorter = net.add_container(1, &[(plank(), 2)]);
    let chest = net.add_container(2, &[(plank(), 30), (rope(), 12)]);
    net.pump();

    // The peer upgrades the sorter and asks for up to 20 planks.
    let wallet = net.ctx_mut(peer).add_inventory(inventory_with(&[]));
    let ctx = net.ctx_mut(peer);
    ctx.upgrade(sorter, wallet).expect("upgrade is free by default");
    ctx.set_mode(sorter, SortMode::Filtered).expect("upgraded");
    ctx.set_priority(sorter, 3).expect("upgraded");
    ctx.set_filter(sorter, FilterRule::capped(plank(), 20)).expect("upgraded");
    net.pump();

    let report = DistributionEngine::new().run_cycle(net.host_mut());
    net.pump();

    println!(
        "cycle: {} transfers, {} items, {} checkpoints",
        report.transfers, report.items_moved, report.checkpoints
    );
    for participant in net.peers() {
        let ctx = net.ctx(participant);
        println!(
            "{participant}: sorter holds {} planks, chest holds {} planks and {} rope",
            quantity_of(ctx, sorter, plank()),
            quantity_of(ctx, chest, plank()),
            quantity_of(ctx, chest, rope()),
        );
    }
}
