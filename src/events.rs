//! A lightweight typed publish/subscribe bus.
//!
//! Each edge is an append-only list of subscribers, fired synchronously on
//! the calling context in insertion order. There is no ordering guarantee
//! *between* edges. Subscribers may unsubscribe by the `SubscriptionId`
//! handed back at subscribe time.

pub type SubscriptionId = u64;

struct Edge<F: ?Sized> {
    next_id: SubscriptionId,
    subscribers: Vec<(SubscriptionId, Box<F>)>,
}

impl<F: ?Sized> Edge<F> {
    fn new() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    fn subscribe(&mut self, callback: Box<F>) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push((id, callback));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }
}

type ObjectUpdatedFn = dyn FnMut(u32, u16) + Send;
type TransactionCompletedFn = dyn FnMut(u32, u16, bool) + Send;
type ConnectedFn = dyn FnMut() + Send;
type DisconnectedFn = dyn FnMut() + Send;
type TelemetryUpdatedFn = dyn FnMut(f32, f32) + Send;

/// Owns every typed edge this crate exposes to callers.
pub struct EventBus {
    object_updated: Edge<ObjectUpdatedFn>,
    transaction_completed: Edge<TransactionCompletedFn>,
    connected: Edge<ConnectedFn>,
    disconnected: Edge<DisconnectedFn>,
    telemetry_updated: Edge<TelemetryUpdatedFn>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            object_updated: Edge::new(),
            transaction_completed: Edge::new(),
            connected: Edge::new(),
            disconnected: Edge::new(),
            telemetry_updated: Edge::new(),
        }
    }

    pub fn on_object_updated(
        &mut self,
        callback: impl FnMut(u32, u16) + Send + 'static,
    ) -> SubscriptionId {
        self.object_updated.subscribe(Box::new(callback))
    }

    pub fn unsubscribe_object_updated(&mut self, id: SubscriptionId) -> bool {
        self.object_updated.unsubscribe(id)
    }

    pub fn emit_object_updated(&mut self, object_id: u32, instance_id: u16) {
        for (_, cb) in &mut self.object_updated.subscribers {
            cb(object_id, instance_id);
        }
    }

    pub fn on_transaction_completed(
        &mut self,
        callback: impl FnMut(u32, u16, bool) + Send + 'static,
    ) -> SubscriptionId {
        self.transaction_completed.subscribe(Box::new(callback))
    }

    pub fn unsubscribe_transaction_completed(&mut self, id: SubscriptionId) -> bool {
        self.transaction_completed.unsubscribe(id)
    }

    pub fn emit_transaction_completed(&mut self, object_id: u32, instance_id: u16, success: bool) {
        for (_, cb) in &mut self.transaction_completed.subscribers {
            cb(object_id, instance_id, success);
        }
    }

    pub fn on_connected(&mut self, callback: impl FnMut() + Send + 'static) -> SubscriptionId {
        self.connected.subscribe(Box::new(callback))
    }

    pub fn emit_connected(&mut self) {
        for (_, cb) in &mut self.connected.subscribers {
            cb();
        }
    }

    pub fn on_disconnected(&mut self, callback: impl FnMut() + Send + 'static) -> SubscriptionId {
        self.disconnected.subscribe(Box::new(callback))
    }

    pub fn emit_disconnected(&mut self) {
        for (_, cb) in &mut self.disconnected.subscribers {
            cb();
        }
    }

    pub fn on_telemetry_updated(
        &mut self,
        callback: impl FnMut(f32, f32) + Send + 'static,
    ) -> SubscriptionId {
        self.telemetry_updated.subscribe(Box::new(callback))
    }

    pub fn emit_telemetry_updated(&mut self, tx_rate: f32, rx_rate: f32) {
        for (_, cb) in &mut self.telemetry_updated.subscribers {
            cb(tx_rate, rx_rate);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("object_updated_subscribers", &self.object_updated.subscribers.len())
            .field(
                "transaction_completed_subscribers",
                &self.transaction_completed.subscribers.len(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn fires_subscribers_in_insertion_order() {
        let mut bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        bus.on_connected(move || o1.lock().unwrap().push(1));
        let o2 = Arc::clone(&order);
        bus.on_connected(move || o2.lock().unwrap().push(2));

        bus.emit_connected();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_stops_future_firings() {
        let mut bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));

        let c = Arc::clone(&count);
        let id = bus.on_disconnected(move || *c.lock().unwrap() += 1);

        bus.emit_disconnected();
        assert!(bus.unsubscribe_disconnected(id));
        bus.emit_disconnected();

        assert_eq!(*count.lock().unwrap(), 1);
    }

    impl EventBus {
        fn unsubscribe_disconnected(&mut self, id: SubscriptionId) -> bool {
            self.disconnected.unsubscribe(id)
        }
    }
}
