//! AutoSort Core -- networked inventory redistribution between storage
//! containers.
//!
//! Containers of a shared world are registered as storage nodes. Upgraded
//! nodes pull items from other containers according to their priority,
//! sort mode and filters, and every participant of a multiplayer session
//! keeps a mirror of that state through a small message protocol that rides
//! on the host game's own transport.
//!
//! # Distribution Cycle
//!
//! Each cycle of [`engine::DistributionEngine`] runs on the authoritative
//! participant:
//!
//! 1. **Order** -- Upgraded, non-ignored nodes are sorted by priority
//!    (descending, ties in registration order).
//! 2. **Pair** -- Each destination is paired with every other registered,
//!    non-ignored, non-dirty node as a source.
//! 3. **Evaluate** -- Per candidate item: source availability, the
//!    destination's cap, then the source's priority gate and own surplus.
//! 4. **Commit** -- Items move immediately; each changed pair broadcasts
//!    both inventories.
//!
//! The cycle yields after every item evaluation, so the host can route
//! network traffic in between, and can be cancelled at any checkpoint.
//!
//! # Key Types
//!
//! - [`context::SorterContext`] -- Per-participant state and the operations
//!   the host game calls (upgrade, settings, lifecycle, persistence).
//! - [`router::MessageRouter`] -- Separates sorter messages from foreign
//!   traffic in inbound batches and dispatches them.
//! - [`node::StorageNode`] -- Upgrade state, settings and transfer rules of
//!   one container.
//! - [`registry::NodeRegistry`] -- Id-keyed registry of live nodes.
//! - [`message`] -- Wire message types and the bitcode codec.
//! - [`serialize`] -- Versioned persisted records and snapshot stores.

pub mod config;
pub mod context;
pub mod engine;
pub mod event;
mod handler;
pub mod id;
pub mod item;
pub mod message;
pub mod node;
pub mod query;
pub mod registry;
pub mod router;
pub mod serialize;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
