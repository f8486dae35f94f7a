//! Splits inbound batches into host-protocol and sorter traffic.
//!
//! The router owns the reserved kind range. For every message in a batch,
//! in arrival order, it either leaves it in place (foreign) or removes,
//! decodes and dispatches it. A failure on one message is logged and never
//! affects the rest of the batch.

use crate::context::SorterContext;
use crate::handler;
use crate::id::{NodeId, PeerId};
use crate::message::{DecodeError, MessageType, TransportMessage, decode};
use log::{debug, warn};

/// Why a domain message was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("no node {0} is registered")]
    UnknownTarget(NodeId),
    #[error("{message:?} from {sender} ignored: only the host may send it")]
    Untrusted {
        message: MessageType,
        sender: PeerId,
    },
    #[error("inventory of node {0} is no longer present")]
    MissingInventory(NodeId),
}

/// Result of routing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Foreign messages remain in the batch and the host protocol should
    /// run its own handling for them.
    pub needs_default_handling: bool,
    /// Domain messages applied successfully.
    pub dispatched: usize,
    /// Domain messages removed but dropped on error.
    pub dropped: usize,
}

/// Classifies and dispatches sorter messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRouter {
    floor: u16,
    ceil: u16,
}

impl MessageRouter {
    pub fn new() -> Self {
        let kinds = MessageType::ALL.map(MessageType::kind);
        let floor = kinds.iter().copied().min().unwrap_or(0);
        let ceil = kinds.iter().copied().max().unwrap_or(0);
        Self { floor, ceil }
    }

    /// True if `kind` lies in the reserved sorter range.
    pub fn is_domain(&self, kind: u16) -> bool {
        (self.floor..=self.ceil).contains(&kind)
    }

    /// Route `batch` in place. On return the batch holds only the foreign
    /// messages, in their original order.
    pub fn route(
        &self,
        ctx: &mut SorterContext,
        batch: &mut Vec<TransportMessage>,
        sender: PeerId,
    ) -> RouteOutcome {
        let mut outcome = RouteOutcome::default();
        let incoming = std::mem::take(batch);
        batch.reserve(incoming.len());

        for message in incoming {
            if !self.is_domain(message.kind) {
                batch.push(message);
                continue;
            }
            match self.dispatch(ctx, &message, sender) {
                Ok(()) => outcome.dispatched += 1,
                Err(e) => {
                    warn!("dropping sorter message kind {} from {sender}: {e}", message.kind);
                    outcome.dropped += 1;
                }
            }
        }

        outcome.needs_default_handling = !batch.is_empty();
        outcome
    }

    fn dispatch(
        &self,
        ctx: &mut SorterContext,
        message: &TransportMessage,
        sender: PeerId,
    ) -> Result<(), RouteError> {
        let decoded = decode(message)?;
        debug!(
            "routing {:?} for node {} from {sender}",
            decoded.message_type, decoded.target
        );
        handler::apply(ctx, decoded, sender)
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DOMAIN_KIND_BASE, DomainMessage, encode};
    use crate::test_utils::*;

    #[test]
    fn range_covers_exactly_the_message_types() {
        let router = MessageRouter::new();
        assert!(!router.is_domain(DOMAIN_KIND_BASE - 1));
        for t in MessageType::ALL {
            assert!(router.is_domain(t.kind()));
        }
        assert!(!router.is_domain(MessageType::StorageInventoryUpdate.kind() + 1));
    }

    #[test]
    fn foreign_messages_left_in_order() {
        let (mut ctx, _outbox) = host_context();
        let node = add_container(&mut ctx, 1, &[]);
        let mut batch = vec![
            foreign(1, b"a"),
            encode(&DomainMessage::upgrade(node, true)).unwrap(),
            foreign(7, b"b"),
        ];
        let outcome = MessageRouter::new().route(&mut ctx, &mut batch, PeerId(2));

        assert_eq!(batch, vec![foreign(1, b"a"), foreign(7, b"b")]);
        assert!(outcome.needs_default_handling);
        assert_eq!(outcome.dispatched, 1);
        assert!(ctx.registry().get(node).unwrap().is_upgraded());
    }

    #[test]
    fn all_domain_batch_suppresses_default_handling() {
        let (mut ctx, _outbox) = host_context();
        let node = add_container(&mut ctx, 1, &[]);
        let mut batch = vec![encode(&DomainMessage::upgrade(node, true)).unwrap()];
        let outcome = MessageRouter::new().route(&mut ctx, &mut batch, PeerId(2));
        assert!(batch.is_empty());
        assert!(!outcome.needs_default_handling);
    }

    #[test]
    fn failures_are_isolated() {
        let (mut ctx, _outbox) = host_context();
        let node = add_container(&mut ctx, 1, &[]);
        let mut batch = vec![
            TransportMessage::opaque(MessageType::Upgrade.kind(), vec![0xFF]),
            encode(&DomainMessage::upgrade(NodeId(99), true)).unwrap(),
            foreign(3, b"keep"),
            encode(&DomainMessage::upgrade(node, true)).unwrap(),
        ];
        let outcome = MessageRouter::new().route(&mut ctx, &mut batch, PeerId(2));

        assert_eq!(outcome.dropped, 2);
        assert_eq!(outcome.dispatched, 1);
        assert_eq!(batch, vec![foreign(3, b"keep")]);
        assert!(ctx.registry().get(node).unwrap().is_upgraded());
    }
}
