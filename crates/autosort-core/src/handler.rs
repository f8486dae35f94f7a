//! Effects of inbound sorter messages on local nodes.

use crate::context::SorterContext;
use crate::event::SorterEvent;
use crate::id::PeerId;
use crate::message::{DomainMessage, MessageType, Payload};
use crate::node::UpgradeState;
use crate::router::RouteError;
use log::debug;

/// Apply one decoded message from `sender`.
pub(crate) fn apply(
    ctx: &mut SorterContext,
    message: DomainMessage,
    sender: PeerId,
) -> Result<(), RouteError> {
    let id = message.target;
    if !ctx.registry.contains(id) {
        return Err(RouteError::UnknownTarget(id));
    }

    match message.payload {
        Payload::None => {
            // RequestState. Only the host answers, and only with real data.
            if !ctx.is_authoritative() {
                return Ok(());
            }
            let reply = ctx
                .registry
                .get(id)
                .filter(|node| node.has_shareable_state())
                .map(|node| DomainMessage::respond_state(id, node.snapshot()));
            match reply {
                Some(reply) => ctx.send_to(sender, reply),
                None => debug!("no state to share for node {id}"),
            }
            return Ok(());
        }
        Payload::Snapshot(snapshot) => {
            if ctx.host() != sender {
                return Err(RouteError::Untrusted {
                    message: MessageType::RespondState,
                    sender,
                });
            }
            if let Some(node) = ctx.registry.get_mut(id) {
                node.apply_snapshot(snapshot);
            }
        }
        Payload::Upgrade(upgraded) => {
            if let Some(node) = ctx.registry.get_mut(id) {
                node.apply_upgrade_flag(upgraded);
            }
        }
        Payload::Settings(settings) => {
            if let Some(node) = ctx.registry.get_mut(id) {
                node.state = UpgradeState::Upgraded(settings);
            }
        }
        Payload::Additional(additional) => {
            if let Some(node) = ctx.registry.get_mut(id) {
                node.additional = additional;
            }
        }
        Payload::Slots(slots) => {
            let Some(node) = ctx.registry.get_mut(id) else {
                return Err(RouteError::UnknownTarget(id));
            };
            node.dirty = true;
            let inventory = node.inventory();
            let Some(inv) = ctx.inventories.get_mut(inventory) else {
                return Err(RouteError::MissingInventory(id));
            };
            inv.set_slots(slots);
            return Ok(());
        }
    }

    ctx.events.push(SorterEvent::RemoteStateApplied { node: id, sender });
    Ok(())
}
