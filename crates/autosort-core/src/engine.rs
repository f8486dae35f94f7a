//! The distribution engine: periodic redistribution of items between
//! registered containers.
//!
//! A cycle visits every destination (upgraded, non-ignored node) in
//! priority order and, for each, every other node registered when the cycle
//! started as a candidate source. Each checkpoint evaluates one candidate
//! item for the current (destination, source) pair and commits its transfer
//! immediately. Between checkpoints control returns to the host, which may
//! route inbound messages or edit inventories before calling
//! [`DistributionEngine::step`] again. Node state and item counts are
//! therefore re-read at every checkpoint.
//!
//! Cancelling a cycle (see [`CancelToken`]) stops it at the next checkpoint.
//! Transfers already committed stay committed.

use crate::context::SorterContext;
use crate::event::SorterEvent;
use crate::id::{ItemTypeId, NodeId};
use crate::item::UNLIMITED_SUPPLY;
use crate::node::Allowance;
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag polled at every checkpoint of a running cycle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Summary of one finished or cancelled cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Committed transfers (one per item type per pair).
    pub transfers: usize,
    pub items_moved: u64,
    pub checkpoints: usize,
    pub duration: Duration,
    pub cancelled: bool,
}

/// Result of advancing the engine by one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStep {
    /// No cycle is running.
    Idle,
    /// One checkpoint ran; more work remains.
    Yielded,
    /// The cycle ended, either exhausted or cancelled.
    Finished(CycleReport),
}

// ---------------------------------------------------------------------------
// Cycle state
// ---------------------------------------------------------------------------

/// The (destination, source) pair under evaluation.
#[derive(Debug)]
struct Pair {
    dest: NodeId,
    source: NodeId,
    candidates: Vec<ItemTypeId>,
    next: usize,
    changed: bool,
}

enum ItemOutcome {
    Moved,
    Nothing,
    /// The destination is gone, no longer a target, or full.
    DestinationDone,
    /// The source or its inventory is gone.
    SourceGone,
}

#[derive(Debug)]
struct Cycle {
    destinations: Vec<NodeId>,
    sources: Vec<NodeId>,
    dest_index: usize,
    source_index: usize,
    pair: Option<Pair>,
    report: CycleReport,
    started: Instant,
    token: CancelToken,
}

impl Cycle {
    fn new(ctx: &SorterContext, started: Instant) -> Self {
        Self {
            destinations: ctx.registry.distribution_order(),
            sources: ctx.registry.ids(),
            dest_index: 0,
            source_index: 0,
            pair: None,
            report: CycleReport::default(),
            started,
            token: CancelToken::new(),
        }
    }

    /// Run one item evaluation. Returns false once every pair is done.
    fn advance(&mut self, ctx: &mut SorterContext) -> bool {
        loop {
            let Some(pair) = self.pair.as_mut() else {
                if self.open_next_pair(ctx) {
                    continue;
                }
                return false;
            };
            let Some(&item) = pair.candidates.get(pair.next) else {
                self.close_pair(ctx, false);
                continue;
            };
            pair.next += 1;

            match transfer_item(ctx, pair.dest, pair.source, item, &mut self.report) {
                ItemOutcome::Moved => pair.changed = true,
                ItemOutcome::Nothing => {}
                ItemOutcome::DestinationDone => self.close_pair(ctx, true),
                ItemOutcome::SourceGone => self.close_pair(ctx, false),
            }
            return true;
        }
    }

    /// Find the next usable pair. Destinations that are gone, full or want
    /// nothing are skipped whole.
    fn open_next_pair(&mut self, ctx: &SorterContext) -> bool {
        while let Some(&dest) = self.destinations.get(self.dest_index) {
            let candidates = destination_candidates(ctx, dest);
            if candidates.is_empty() || self.source_index >= self.sources.len() {
                self.next_destination();
                continue;
            }

            let source = self.sources[self.source_index];
            self.source_index += 1;
            if !source_usable(ctx, dest, source) {
                continue;
            }
            self.pair = Some(Pair {
                dest,
                source,
                candidates,
                next: 0,
                changed: false,
            });
            return true;
        }
        false
    }

    /// End the current pair, broadcasting both inventories if anything
    /// moved.
    fn close_pair(&mut self, ctx: &mut SorterContext, dest_done: bool) {
        if let Some(pair) = self.pair.take()
            && pair.changed
        {
            for id in [pair.source, pair.dest] {
                if ctx.registry.contains(id) {
                    ctx.broadcast_inventory(id);
                }
            }
        }
        if dest_done {
            self.next_destination();
        }
    }

    fn next_destination(&mut self) {
        self.dest_index += 1;
        self.source_index = 0;
    }
}

/// Item types `dest` asks for, or nothing if it cannot receive right now.
fn destination_candidates(ctx: &SorterContext, dest: NodeId) -> Vec<ItemTypeId> {
    let Some(node) = ctx.registry.get(dest).filter(|n| n.is_distribution_target()) else {
        return Vec::new();
    };
    let Some(inventory) = ctx.inventories.get(node.inventory()).filter(|i| i.has_space()) else {
        return Vec::new();
    };
    node.settings()
        .map(|s| s.candidates(inventory))
        .unwrap_or_default()
}

fn source_usable(ctx: &SorterContext, dest: NodeId, source: NodeId) -> bool {
    if source == dest {
        return false;
    }
    let (Some(d), Some(s)) = (ctx.registry.get(dest), ctx.registry.get(source)) else {
        return false;
    };
    !s.is_ignored()
        && !s.dirty
        && s.inventory() != d.inventory()
        && ctx.inventories.contains_key(s.inventory())
}

/// Evaluate and commit the transfer of one item type from `source` to
/// `dest`.
fn transfer_item(
    ctx: &mut SorterContext,
    dest: NodeId,
    source: NodeId,
    item: ItemTypeId,
    report: &mut CycleReport,
) -> ItemOutcome {
    let Some(d) = ctx.registry.get(dest).filter(|n| n.is_distribution_target()) else {
        return ItemOutcome::DestinationDone;
    };
    let Some(settings) = d.settings() else {
        return ItemOutcome::DestinationDone;
    };
    let Some(s) = ctx.registry.get(source) else {
        return ItemOutcome::SourceGone;
    };
    let (dest_inv, source_inv) = (d.inventory(), s.inventory());

    let Some(d_inventory) = ctx.inventories.get(dest_inv).filter(|i| i.has_space()) else {
        return ItemOutcome::DestinationDone;
    };
    let Some(s_inventory) = ctx.inventories.get(source_inv) else {
        return ItemOutcome::SourceGone;
    };

    let held = s_inventory.quantity(item);
    let mut amount = if held == UNLIMITED_SUPPLY { 0 } else { held };
    if let Some(cap) = settings.destination_cap(item) {
        amount = amount.min(cap.saturating_sub(d_inventory.quantity(item)));
    }
    match s.source_allowance(settings.priority, item, held) {
        Allowance::Denied => amount = 0,
        Allowance::Allowed(Some(surplus)) => amount = amount.min(surplus),
        Allowance::Allowed(None) => {}
    }
    if amount == 0 {
        return ItemOutcome::Nothing;
    }

    let added = ctx.inventories.get_mut(dest_inv).map_or(0, |i| i.add(item, amount));
    if added == 0 {
        return ItemOutcome::Nothing;
    }
    let removed = ctx
        .inventories
        .get_mut(source_inv)
        .map_or(0, |i| i.remove(item, added));
    debug_assert_eq!(removed, added);

    debug!("moved {added} of item {item:?} from node {source} to node {dest}");
    report.transfers += 1;
    report.items_moved += u64::from(added);
    ctx.events.push(SorterEvent::ItemsTransferred {
        from: source,
        to: dest,
        item_type: item,
        quantity: added,
    });
    ItemOutcome::Moved
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives distribution cycles for one [`SorterContext`].
#[derive(Debug, Default)]
pub struct DistributionEngine {
    cycle: Option<Cycle>,
    next_due: Option<Instant>,
    last_duration: Option<Duration>,
}

impl DistributionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.cycle.is_some()
    }

    /// Wall-clock length of the most recent cycle.
    pub fn last_cycle_duration(&self) -> Option<Duration> {
        self.last_duration
    }

    /// When [`poll`](Self::poll) will start the next cycle. `None` until a
    /// cycle has run.
    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Begin a cycle at `now` and return its cancellation handle. If a cycle
    /// is already running, its handle is returned instead.
    pub fn start(&mut self, ctx: &mut SorterContext, now: Instant) -> CancelToken {
        if let Some(cycle) = &self.cycle {
            return cycle.token.clone();
        }
        let cycle = Cycle::new(ctx, now);
        let token = cycle.token.clone();
        debug!(
            "cycle started with {} destinations and {} sources",
            cycle.destinations.len(),
            cycle.sources.len()
        );
        ctx.active_cycle = Some(token.clone());
        self.cycle = Some(cycle);
        token
    }

    /// Request cancellation of the running cycle. It ends at its next
    /// checkpoint.
    pub fn stop(&self) {
        if let Some(cycle) = &self.cycle {
            cycle.token.cancel();
        }
    }

    /// Run one checkpoint.
    pub fn step(&mut self, ctx: &mut SorterContext, now: Instant) -> CycleStep {
        let Some(cycle) = self.cycle.as_mut() else {
            return CycleStep::Idle;
        };
        if cycle.token.is_cancelled() {
            return self.finish(ctx, now, true);
        }
        cycle.report.checkpoints += 1;
        if cycle.advance(ctx) {
            CycleStep::Yielded
        } else {
            self.finish(ctx, now, false)
        }
    }

    /// Host tick entry point. Starts a cycle when one is due and runs up to
    /// the configured number of checkpoints. Only the authoritative
    /// participant distributes. Returns the report of a cycle that ended
    /// during this poll.
    pub fn poll(&mut self, ctx: &mut SorterContext, now: Instant) -> Option<CycleReport> {
        if !ctx.is_authoritative() {
            return None;
        }
        if self.cycle.is_none() {
            if self.next_due.is_some_and(|due| now < due) {
                return None;
            }
            self.start(ctx, now);
        }
        for _ in 0..ctx.config().effective_checkpoints() {
            match self.step(ctx, now) {
                CycleStep::Yielded => {}
                CycleStep::Finished(report) => return Some(report),
                CycleStep::Idle => return None,
            }
        }
        None
    }

    /// Run a whole cycle without yielding, timed with the system clock.
    pub fn run_cycle(&mut self, ctx: &mut SorterContext) -> CycleReport {
        self.start(ctx, Instant::now());
        loop {
            if let CycleStep::Finished(report) = self.step(ctx, Instant::now()) {
                return report;
            }
        }
    }

    fn finish(&mut self, ctx: &mut SorterContext, now: Instant, cancelled: bool) -> CycleStep {
        let Some(mut cycle) = self.cycle.take() else {
            return CycleStep::Idle;
        };
        cycle.close_pair(ctx, false);
        ctx.registry.clear_dirty();
        ctx.active_cycle = None;

        let duration = now.saturating_duration_since(cycle.started);
        self.last_duration = Some(duration);
        self.next_due = Some(now + ctx.config().check_interval.saturating_sub(duration));

        let mut report = cycle.report;
        report.duration = duration;
        report.cancelled = cancelled;
        info!(
            "cycle {} after {} checkpoints: {} transfers, {} items in {:?}",
            if cancelled { "cancelled" } else { "finished" },
            report.checkpoints,
            report.transfers,
            report.items_moved,
            duration
        );
        CycleStep::Finished(report)
    }
}
