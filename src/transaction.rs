//! Pending-transaction bookkeeping for `TYPE_OBJ_REQ`/`TYPE_OBJ_ACK` sends.
//!
//! One outstanding transaction per object id: starting a second overwrites
//! the first outright (no queue, no error) — the link only ever cares
//! about the most recent request for a given object, matching the
//! original implementation's `std::map<objId, Transaction*>` overwrite.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Transaction {
    instance_id: u16,
    all_instances: bool,
}

/// Tracks at most one pending transaction per object id.
#[derive(Default)]
pub struct TransactionTable {
    pending: HashMap<u32, Transaction>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Records a new pending transaction, silently replacing any existing
    /// one for the same object id.
    pub fn start(&mut self, object_id: u32, instance_id: u16, all_instances: bool) {
        self.pending.insert(
            object_id,
            Transaction {
                instance_id,
                all_instances,
            },
        );
    }

    pub fn cancel(&mut self, object_id: u32) {
        self.pending.remove(&object_id);
    }

    pub fn is_pending(&self, object_id: u32) -> bool {
        self.pending.contains_key(&object_id)
    }

    /// Resolves a pending transaction if `instance_id` matches (or the
    /// transaction covers all instances), returning `true` if one was
    /// resolved. The caller fires `transaction_completed` with `success`.
    fn resolve(&mut self, object_id: u32, instance_id: u16) -> bool {
        match self.pending.get(&object_id) {
            Some(t) if t.instance_id == instance_id || t.all_instances => {
                self.pending.remove(&object_id);
                true
            }
            _ => false,
        }
    }

    pub fn resolve_ack(&mut self, object_id: u32, instance_id: u16) -> bool {
        self.resolve(object_id, instance_id)
    }

    pub fn resolve_nack(&mut self, object_id: u32, instance_id: u16) -> bool {
        self.resolve(object_id, instance_id)
    }
}
