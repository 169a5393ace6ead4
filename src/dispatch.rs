//! Message dispatch: decides what an inbound, already-decoded frame means.
//!
//! Kept separate from `link` so the "what does this frame do" decision
//! table can be unit tested against a bare `ObjectRegistry` + `TransactionTable`
//! without any transport or event-bus wiring. `link::UavTalk` turns each
//! `DispatchOutcome` into wire bytes and bus events.

use crate::decoder::DecodedFrame;
use crate::frame::FrameType;
use crate::object::ALL_INSTANCES;
use crate::registry::ObjectRegistry;
use crate::transaction::TransactionTable;

/// What the link core should do as a result of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// An object instance was updated (or newly cloned) from inbound data.
    ObjectUpdated { object_id: u32, instance_id: u16 },
    /// Reply with a TYPE_ACK for this object/instance.
    SendAck { object_id: u32, instance_id: u16 },
    /// Reply with a TYPE_OBJ for this object/instance (servicing an OBJ_REQ).
    SendObject {
        object_id: u32,
        instance_id: u16,
        all_instances: bool,
    },
    /// Reply with a TYPE_NACK: the requested object id isn't registered.
    SendNack { object_id: u32 },
    /// A pending transaction was resolved by an inbound ACK/NACK/OBJ.
    TransactionResolved {
        object_id: u32,
        instance_id: u16,
        success: bool,
    },
    /// The frame was well-formed but semantically invalid (e.g. an
    /// all-instances OBJ, or an OBJ/ACK/NACK for an instance nobody asked
    /// about). Counted as an rx error by the caller.
    Rejected,
}

/// Applies one decoded frame against the registry and transaction table,
/// returning every outcome the caller needs to act on.
pub fn dispatch_frame(
    frame: &DecodedFrame,
    registry: &mut ObjectRegistry,
    transactions: &mut TransactionTable,
) -> Vec<DispatchOutcome> {
    let all_instances = frame.instance_id == ALL_INSTANCES;

    match frame.frame_type {
        FrameType::Obj => {
            if all_instances {
                return vec![DispatchOutcome::Rejected];
            }
            match update_object(registry, frame) {
                Some(instance_id) => {
                    let mut out = vec![DispatchOutcome::ObjectUpdated {
                        object_id: frame.object_id,
                        instance_id,
                    }];
                    if transactions.resolve_ack(frame.object_id, instance_id) {
                        out.push(DispatchOutcome::TransactionResolved {
                            object_id: frame.object_id,
                            instance_id,
                            success: true,
                        });
                    }
                    out
                }
                None => vec![DispatchOutcome::Rejected],
            }
        }

        FrameType::ObjAck => {
            if all_instances {
                return vec![DispatchOutcome::Rejected];
            }
            match update_object(registry, frame) {
                Some(instance_id) => vec![
                    DispatchOutcome::ObjectUpdated {
                        object_id: frame.object_id,
                        instance_id,
                    },
                    DispatchOutcome::SendAck {
                        object_id: frame.object_id,
                        instance_id,
                    },
                ],
                None => vec![DispatchOutcome::Rejected],
            }
        }

        FrameType::ObjReq => {
            if frame.unknown_object {
                return vec![DispatchOutcome::SendNack {
                    object_id: frame.object_id,
                }];
            }
            vec![DispatchOutcome::SendObject {
                object_id: frame.object_id,
                instance_id: frame.instance_id,
                all_instances,
            }]
        }

        FrameType::Nack => {
            if all_instances {
                return vec![];
            }
            if registry.get(frame.object_id, frame.instance_id).is_none() {
                return vec![DispatchOutcome::Rejected];
            }
            if transactions.resolve_nack(frame.object_id, frame.instance_id) {
                vec![DispatchOutcome::TransactionResolved {
                    object_id: frame.object_id,
                    instance_id: frame.instance_id,
                    success: false,
                }]
            } else {
                vec![]
            }
        }

        FrameType::Ack => {
            if all_instances {
                return vec![DispatchOutcome::Rejected];
            }
            if registry.get(frame.object_id, frame.instance_id).is_none() {
                return vec![DispatchOutcome::Rejected];
            }
            if transactions.resolve_ack(frame.object_id, frame.instance_id) {
                vec![DispatchOutcome::TransactionResolved {
                    object_id: frame.object_id,
                    instance_id: frame.instance_id,
                    success: true,
                }]
            } else {
                vec![]
            }
        }
    }
}

/// Unpacks inbound data into the named instance, cloning it from the
/// object id's prototype first if this instance hasn't been seen before.
/// Returns the instance id actually updated, or `None` if the object id
/// has no registered prototype at all.
fn update_object(registry: &mut ObjectRegistry, frame: &DecodedFrame) -> Option<u16> {
    if registry.get(frame.object_id, frame.instance_id).is_some() {
        let obj = registry.get_mut(frame.object_id, frame.instance_id)?;
        obj.deserialize(&frame.data);
        return Some(frame.instance_id);
    }

    let prototype = registry.prototype(frame.object_id)?;
    let cloned = prototype.clone_with_instance(frame.instance_id);
    registry.insert_cloned_instance(cloned);
    let obj = registry.get_mut(frame.object_id, frame.instance_id)?;
    obj.deserialize(&frame.data);
    Some(frame.instance_id)
}
