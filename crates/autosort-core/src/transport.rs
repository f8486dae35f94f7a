//! Seam to the host's network layer.
//!
//! The sorter never touches sockets. It hands [`TransportMessage`]s to a
//! [`Transport`] implementation supplied by the host, and the host feeds
//! inbound batches to the router. [`Outbox`] is a queueing implementation
//! that hosts can flush to their real network each frame; tests read it
//! directly.

use crate::id::PeerId;
use crate::message::TransportMessage;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Where an outgoing message should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// One specific peer.
    Peer(PeerId),
    /// Every other participant of the session.
    Others,
}

/// Outgoing sender used by the sorter context. Delivery is reliable and
/// ordered per peer as far as the host's transport provides it; the sorter
/// does not retry.
pub trait Transport {
    fn send_to(&mut self, peer: PeerId, message: TransportMessage);
    fn broadcast(&mut self, message: TransportMessage);
}

/// A queued outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub destination: Destination,
    pub message: TransportMessage,
}

/// Shared FIFO of outgoing messages. Clones share the same queue, so the
/// host keeps one handle while the context owns another.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    queue: Rc<RefCell<VecDeque<Outgoing>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<Outgoing> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    fn push(&self, destination: Destination, message: TransportMessage) {
        self.queue.borrow_mut().push_back(Outgoing {
            destination,
            message,
        });
    }
}

impl Transport for Outbox {
    fn send_to(&mut self, peer: PeerId, message: TransportMessage) {
        self.push(Destination::Peer(peer), message);
    }

    fn broadcast(&mut self, message: TransportMessage) {
        self.push(Destination::Others, message);
    }
}
