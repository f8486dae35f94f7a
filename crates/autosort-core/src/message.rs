//! Wire protocol: domain message types, the transport envelope they travel
//! in, and the bitcode codec between the two.
//!
//! The transport carries batches of [`TransportMessage`]s that mostly belong
//! to the host game's own protocol. Sorter traffic is told apart purely by
//! its `kind`, which lives in a reserved range starting at
//! [`DOMAIN_KIND_BASE`]. All sorter messages except the inventory update
//! carry a bitcode-encoded [`DomainMessage`] in an opaque envelope. The
//! inventory update reuses the host's own inventory-sync payload shape so
//! that it stays wire compatible with it.

use crate::id::NodeId;
use crate::item::Slot;
use crate::node::{AdditionalData, NodeSnapshot, SorterSettings};
use serde::{Deserialize, Serialize};

/// First kind id reserved for sorter traffic. Every kind below belongs to
/// the host protocol.
pub const DOMAIN_KIND_BASE: u16 = 0x7A00;

// ---------------------------------------------------------------------------
// Transport envelope
// ---------------------------------------------------------------------------

/// Payload shape of a transport message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Envelope {
    /// Generic carrier holding encoded bytes.
    Opaque(Vec<u8>),
    /// The host protocol's inventory-sync shape.
    InventorySync(InventorySync),
}

/// Full slot contents of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySync {
    pub node: NodeId,
    pub slots: Vec<Slot>,
}

/// One message as carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMessage {
    pub kind: u16,
    pub envelope: Envelope,
}

impl TransportMessage {
    pub fn opaque(kind: u16, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            envelope: Envelope::Opaque(bytes),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain messages
// ---------------------------------------------------------------------------

/// Sorter message types. The discriminant is the offset from
/// [`DOMAIN_KIND_BASE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum MessageType {
    RequestState = 0,
    RespondState = 1,
    Upgrade = 2,
    StorageDataUpdate = 3,
    StorageIgnoreUpdate = 4,
    StorageInventoryUpdate = 5,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::RequestState,
        MessageType::RespondState,
        MessageType::Upgrade,
        MessageType::StorageDataUpdate,
        MessageType::StorageIgnoreUpdate,
        MessageType::StorageInventoryUpdate,
    ];

    /// Transport kind id of this message type.
    pub fn kind(self) -> u16 {
        DOMAIN_KIND_BASE + self as u16
    }

    pub fn from_kind(kind: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.kind() == kind)
    }
}

/// Payload of a domain message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    None,
    Snapshot(NodeSnapshot),
    Upgrade(bool),
    Settings(SorterSettings),
    Additional(AdditionalData),
    Slots(Vec<Slot>),
}

/// A decoded sorter message addressed to one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMessage {
    pub message_type: MessageType,
    pub target: NodeId,
    pub payload: Payload,
}

impl DomainMessage {
    pub fn request_state(target: NodeId) -> Self {
        Self {
            message_type: MessageType::RequestState,
            target,
            payload: Payload::None,
        }
    }

    pub fn respond_state(target: NodeId, snapshot: NodeSnapshot) -> Self {
        Self {
            message_type: MessageType::RespondState,
            target,
            payload: Payload::Snapshot(snapshot),
        }
    }

    pub fn upgrade(target: NodeId, upgraded: bool) -> Self {
        Self {
            message_type: MessageType::Upgrade,
            target,
            payload: Payload::Upgrade(upgraded),
        }
    }

    pub fn data_update(target: NodeId, settings: SorterSettings) -> Self {
        Self {
            message_type: MessageType::StorageDataUpdate,
            target,
            payload: Payload::Settings(settings),
        }
    }

    pub fn ignore_update(target: NodeId, additional: AdditionalData) -> Self {
        Self {
            message_type: MessageType::StorageIgnoreUpdate,
            target,
            payload: Payload::Additional(additional),
        }
    }

    pub fn inventory_update(target: NodeId, slots: Vec<Slot>) -> Self {
        Self {
            message_type: MessageType::StorageInventoryUpdate,
            target,
            payload: Payload::Slots(slots),
        }
    }

    /// True if the payload variant is the one this message type carries.
    fn payload_matches(&self) -> bool {
        matches!(
            (self.message_type, &self.payload),
            (MessageType::RequestState, Payload::None)
                | (MessageType::RespondState, Payload::Snapshot(_))
                | (MessageType::Upgrade, Payload::Upgrade(_))
                | (MessageType::StorageDataUpdate, Payload::Settings(_))
                | (MessageType::StorageIgnoreUpdate, Payload::Additional(_))
                | (MessageType::StorageInventoryUpdate, Payload::Slots(_))
        )
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Errors raised while turning a transport message into a domain message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("kind {0} is not a sorter message")]
    NotDomain(u16),
    #[error("bitcode decoding failed: {0}")]
    Bitcode(String),
    #[error("envelope kind {envelope} does not match message type {message:?}")]
    KindMismatch { envelope: u16, message: MessageType },
    #[error("payload does not fit message type {0:?}")]
    PayloadMismatch(MessageType),
    #[error("inventory sync envelope under non-inventory kind {0}")]
    UnexpectedInventorySync(u16),
}

/// Errors raised while encoding a domain message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("bitcode encoding failed: {0}")]
    Bitcode(String),
}

/// Encode a domain message into its transport form.
///
/// Inventory updates use the inventory-sync envelope, everything else is
/// bitcode inside an opaque envelope.
pub fn encode(message: &DomainMessage) -> Result<TransportMessage, EncodeError> {
    let kind = message.message_type.kind();
    if let Payload::Slots(slots) = &message.payload {
        return Ok(TransportMessage {
            kind,
            envelope: Envelope::InventorySync(InventorySync {
                node: message.target,
                slots: slots.clone(),
            }),
        });
    }
    let bytes = bitcode::serialize(message).map_err(|e| EncodeError::Bitcode(e.to_string()))?;
    Ok(TransportMessage::opaque(kind, bytes))
}

/// Decode a transport message in the sorter range.
pub fn decode(message: &TransportMessage) -> Result<DomainMessage, DecodeError> {
    let message_type =
        MessageType::from_kind(message.kind).ok_or(DecodeError::NotDomain(message.kind))?;

    match &message.envelope {
        Envelope::InventorySync(sync) => {
            if message_type != MessageType::StorageInventoryUpdate {
                return Err(DecodeError::UnexpectedInventorySync(message.kind));
            }
            Ok(DomainMessage::inventory_update(sync.node, sync.slots.clone()))
        }
        Envelope::Opaque(bytes) => {
            let decoded: DomainMessage =
                bitcode::deserialize(bytes).map_err(|e| DecodeError::Bitcode(e.to_string()))?;
            if decoded.message_type != message_type {
                return Err(DecodeError::KindMismatch {
                    envelope: message.kind,
                    message: decoded.message_type,
                });
            }
            if !decoded.payload_matches() {
                return Err(DecodeError::PayloadMismatch(decoded.message_type));
            }
            Ok(decoded)
        }
    }
}
