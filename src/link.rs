//! The synchronous link core: wires the registry, codec, transaction
//! table, and event bus together, and drives the encoder/decoder.
//!
//! `UavTalk` itself never touches a socket. It takes bytes and hands back
//! bytes (via `Transport::write`), which keeps it trivially unit-testable
//! and lets `transport`/`monitor` own everything async.

use tracing::{debug, warn};

use crate::decoder::{Decoder, ObjectShape, Step};
use crate::dispatch::{dispatch_frame, DispatchOutcome};
use crate::error::UavTalkError;
use crate::events::EventBus;
use crate::frame::{self, FrameType, MAX_PACKET_LENGTH};
use crate::object::UavObject;
use crate::registry::ObjectRegistry;
use crate::stats::ComStats;
use crate::transaction::TransactionTable;
use crate::transport::Transport;

impl ObjectShape for ObjectRegistry {
    fn shape(&self, object_id: u32) -> Option<(usize, bool)> {
        self.prototype(object_id)
            .map(|obj| (obj.num_bytes(), obj.is_single_instance()))
    }
}

/// The protocol engine: owns object storage, the receive state machine,
/// outstanding transactions, and the event bus; delegates byte I/O to a
/// `Transport`.
pub struct UavTalk {
    registry: ObjectRegistry,
    transactions: TransactionTable,
    decoder: Decoder,
    stats: ComStats,
    events: EventBus,
    transport: Option<Box<dyn Transport>>,
}

impl UavTalk {
    pub fn new() -> Self {
        Self {
            registry: ObjectRegistry::new(),
            transactions: TransactionTable::new(),
            decoder: Decoder::new(),
            stats: ComStats::new(),
            events: EventBus::new(),
            transport: None,
        }
    }

    pub fn set_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.registry
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn stats(&self) -> ComStats {
        self.stats
    }

    pub fn take_stats(&mut self) -> ComStats {
        self.stats.take()
    }

    /// Cancels any transaction pending for `object_id`.
    pub fn cancel_transaction(&mut self, object_id: u32) {
        self.transactions.cancel(object_id);
    }

    /// True if a request/ack transaction is still outstanding for `object_id`.
    pub fn is_transaction_pending(&self, object_id: u32) -> bool {
        self.transactions.is_pending(object_id)
    }

    /// Sends an object, optionally tracking it as a pending ACK transaction.
    /// Returns `Err` on a transport/serialization failure (also counted as
    /// a tx error in `stats()`).
    pub fn send_object(
        &mut self,
        object_id: u32,
        instance_id: u16,
        acked: bool,
        all_instances: bool,
    ) -> Result<(), UavTalkError> {
        let frame_type = if acked { FrameType::ObjAck } else { FrameType::Obj };
        self.transmit_object(object_id, instance_id, frame_type, all_instances)?;
        if acked {
            self.transactions.start(object_id, instance_id, all_instances);
        }
        Ok(())
    }

    /// Requests an update for `object_id` from the peer, tracking the
    /// request as a pending transaction.
    pub fn send_object_request(
        &mut self,
        object_id: u32,
        instance_id: u16,
        all_instances: bool,
    ) -> Result<(), UavTalkError> {
        self.transmit_object(object_id, instance_id, FrameType::ObjReq, all_instances)?;
        self.transactions.start(object_id, instance_id, all_instances);
        Ok(())
    }

    /// Feeds a whole chunk of inbound bytes through the receive state
    /// machine, dispatching every frame it completes.
    pub fn process_input_stream(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.process_byte(byte);
        }
    }

    fn process_byte(&mut self, byte: u8) {
        self.stats.rx_bytes += 1;
        match self.decoder.process_byte(byte, &self.registry) {
            Step::Pending => {}
            Step::Error => {
                self.stats.rx_errors += 1;
            }
            Step::Frame(frame) => {
                self.stats.rx_objects += 1;
                self.stats.rx_object_bytes += frame.data.len() as u64;

                let outcomes = dispatch_frame(&frame, &mut self.registry, &mut self.transactions);
                for outcome in outcomes {
                    self.apply_outcome(outcome);
                }
            }
        }
    }

    fn apply_outcome(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::ObjectUpdated { object_id, instance_id } => {
                debug!(object_id, instance_id, "object updated");
                self.events.emit_object_updated(object_id, instance_id);
            }
            DispatchOutcome::SendAck { object_id, instance_id } => {
                if let Err(e) = self.transmit_single_object(object_id, instance_id, FrameType::Ack, false) {
                    warn!(object_id, instance_id, error = %e, "failed to send ack");
                }
            }
            DispatchOutcome::SendObject {
                object_id,
                instance_id,
                all_instances,
            } => {
                if let Err(e) = self.transmit_object(object_id, instance_id, FrameType::Obj, all_instances) {
                    warn!(object_id, instance_id, error = %e, "failed to send object");
                }
            }
            DispatchOutcome::SendNack { object_id } => {
                if !self.transmit_nack(object_id) {
                    warn!(object_id, "failed to send nack");
                }
            }
            DispatchOutcome::TransactionResolved {
                object_id,
                instance_id,
                success,
            } => {
                self.events.emit_transaction_completed(object_id, instance_id, success);
            }
            DispatchOutcome::Rejected => {
                self.stats.rx_errors += 1;
                warn!("rejected inbound frame");
            }
        }
    }

    /// Mirrors `transmitObject`: fans out to every registered instance
    /// when `all_instances` is set (and the object isn't single-instance),
    /// otherwise sends just `instance_id`.
    fn transmit_object(
        &mut self,
        object_id: u32,
        instance_id: u16,
        frame_type: FrameType,
        all_instances: bool,
    ) -> Result<(), UavTalkError> {
        let single_instance = self.registry.prototype(object_id).map(|o| o.is_single_instance());
        let Some(single_instance) = single_instance else {
            self.stats.tx_errors += 1;
            return Err(UavTalkError::UnknownObjectId(object_id));
        };
        let all_instances = all_instances && !single_instance;

        match frame_type {
            FrameType::Obj | FrameType::ObjAck => {
                if all_instances {
                    let instance_ids: Vec<u16> =
                        self.registry.instances(object_id).map(|o| o.instance_id()).collect();
                    for iid in instance_ids {
                        self.transmit_single_object(object_id, iid, frame_type, false)?;
                    }
                    Ok(())
                } else {
                    self.transmit_single_object(object_id, instance_id, frame_type, false)
                }
            }
            FrameType::ObjReq => self.transmit_single_object(object_id, instance_id, FrameType::ObjReq, all_instances),
            FrameType::Ack => {
                if all_instances {
                    Err(UavTalkError::SingleInstanceViolation(object_id, instance_id))
                } else {
                    self.transmit_single_object(object_id, instance_id, FrameType::Ack, false)
                }
            }
            // Unreachable via the public API: `send_object`/`send_object_request`
            // only ever pass Obj/ObjAck/ObjReq/Ack; NACKs go out through
            // `transmit_nack` directly.
            FrameType::Nack => Err(UavTalkError::SerializeFailed),
        }
    }

    /// Builds and writes one frame for exactly one object instance.
    /// `all_instances`, when true, writes the `ALL_INSTANCES` sentinel in
    /// place of a real instance id (only meaningful for `ObjReq`).
    fn transmit_single_object(
        &mut self,
        object_id: u32,
        instance_id: u16,
        frame_type: FrameType,
        all_instances: bool,
    ) -> Result<(), UavTalkError> {
        let Some(transport) = self.transport.as_ref() else {
            self.stats.tx_errors += 1;
            return Err(UavTalkError::TransportClosed);
        };
        if !transport.is_open() {
            self.stats.tx_errors += 1;
            return Err(UavTalkError::TransportClosed);
        }

        let Some(obj) = self.registry.get(object_id, instance_id) else {
            self.stats.tx_errors += 1;
            return Err(UavTalkError::UnknownInstance(object_id, instance_id));
        };

        let wire_instance_id = if all_instances {
            crate::object::ALL_INSTANCES
        } else {
            instance_id
        };

        let needs_payload = matches!(frame_type, FrameType::Obj | FrameType::ObjAck);
        let num_bytes = obj.num_bytes();

        let mut payload_buf = [0u8; crate::frame::MAX_PAYLOAD_LENGTH];
        let payload = if needs_payload && num_bytes > 0 {
            if num_bytes >= crate::frame::MAX_PAYLOAD_LENGTH {
                self.stats.tx_errors += 1;
                return Err(UavTalkError::PayloadTooLarge(num_bytes));
            }
            if !obj.serialize(&mut payload_buf[..num_bytes]) {
                self.stats.tx_errors += 1;
                return Err(UavTalkError::SerializeFailed);
            }
            Some(&payload_buf[..num_bytes])
        } else {
            None
        };

        let mut out = [0u8; MAX_PACKET_LENGTH];
        let Some(n) = frame::build_frame(
            &mut out,
            frame_type,
            object_id,
            wire_instance_id,
            obj.is_single_instance(),
            payload,
        ) else {
            self.stats.tx_errors += 1;
            return Err(UavTalkError::SerializeFailed);
        };

        match self.transport.as_ref().unwrap().write(&out[..n]) {
            Ok(()) => {
                self.stats.tx_bytes += n as u64;
                if needs_payload {
                    self.stats.tx_objects += 1;
                    self.stats.tx_object_bytes += num_bytes as u64;
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "transmit failed");
                self.stats.tx_errors += 1;
                Err(UavTalkError::TransportClosed)
            }
        }
    }

    fn transmit_nack(&mut self, object_id: u32) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            self.stats.tx_errors += 1;
            return false;
        };
        if !transport.is_open() {
            self.stats.tx_errors += 1;
            return false;
        }

        let mut out = [0u8; MAX_PACKET_LENGTH];
        let Some(n) = frame::build_nack_frame(&mut out, object_id) else {
            self.stats.tx_errors += 1;
            return false;
        };

        match self.transport.as_ref().unwrap().write(&out[..n]) {
            Ok(()) => {
                self.stats.tx_bytes += n as u64;
                true
            }
            Err(_) => {
                self.stats.tx_errors += 1;
                false
            }
        }
    }

    pub fn register_prototype(&mut self, obj: Box<dyn UavObject>) -> Result<(), crate::error::UavTalkError> {
        self.registry.register_prototype(obj)
    }
}

impl Default for UavTalk {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Metadata, ObjectKind};
    use crate::transport::ChannelTransport;

    #[derive(Clone)]
    struct TestObject {
        object_id: u32,
        instance_id: u16,
        single_instance: bool,
        value: u32,
    }

    impl UavObject for TestObject {
        fn object_id(&self) -> u32 {
            self.object_id
        }
        fn instance_id(&self) -> u16 {
            self.instance_id
        }
        fn is_single_instance(&self) -> bool {
            self.single_instance
        }
        fn num_bytes(&self) -> usize {
            4
        }
        fn kind(&self) -> ObjectKind {
            ObjectKind::Data
        }
        fn metadata(&self) -> Metadata {
            Metadata::default()
        }
        fn serialize(&self, buf: &mut [u8]) -> bool {
            buf[..4].copy_from_slice(&self.value.to_le_bytes());
            true
        }
        fn deserialize(&mut self, buf: &[u8]) {
            self.value = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        }
        fn clone_with_instance(&self, new_instance: u16) -> Box<dyn UavObject> {
            Box::new(TestObject {
                instance_id: new_instance,
                ..self.clone()
            })
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn link_with_channel() -> (UavTalk, tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>) {
        let mut link = UavTalk::new();
        let (transport, rx) = ChannelTransport::new();
        link.set_transport(Box::new(transport));
        (link, rx)
    }

    #[test]
    fn send_object_unacked_transmits_without_tracking_a_transaction() {
        let (mut link, mut rx) = link_with_channel();
        link.register_prototype(Box::new(TestObject {
            object_id: 1,
            instance_id: 0,
            single_instance: true,
            value: 42,
        }))
        .unwrap();

        assert!(link.send_object(1, 0, false, false).is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(!link.transactions.is_pending(1));
    }

    #[test]
    fn send_object_acked_tracks_a_transaction() {
        let (mut link, mut rx) = link_with_channel();
        link.register_prototype(Box::new(TestObject {
            object_id: 1,
            instance_id: 0,
            single_instance: true,
            value: 42,
        }))
        .unwrap();

        assert!(link.send_object(1, 0, true, false).is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(link.transactions.is_pending(1));
    }

    #[test]
    fn ack_frame_resolves_pending_transaction() {
        let (mut link, _rx) = link_with_channel();
        link.register_prototype(Box::new(TestObject {
            object_id: 1,
            instance_id: 0,
            single_instance: true,
            value: 0,
        }))
        .unwrap();
        link.send_object(1, 0, true, false).unwrap();
        assert!(link.transactions.is_pending(1));

        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let n = frame::build_frame(&mut buf, FrameType::Ack, 1, 0, true, None).unwrap();
        link.process_input_stream(&buf[..n]);

        assert!(!link.transactions.is_pending(1));
    }

    #[test]
    fn object_request_for_known_object_replies_with_obj() {
        let (mut link, mut rx) = link_with_channel();
        link.register_prototype(Box::new(TestObject {
            object_id: 1,
            instance_id: 0,
            single_instance: true,
            value: 7,
        }))
        .unwrap();

        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let n = frame::build_frame(&mut buf, FrameType::ObjReq, 1, 0, true, None).unwrap();
        link.process_input_stream(&buf[..n]);

        let reply = rx.try_recv().unwrap();
        assert_eq!(FrameType::from_byte(reply[1]), Some(FrameType::Obj));
    }

    #[test]
    fn object_request_for_unknown_object_replies_with_nack() {
        let (mut link, mut rx) = link_with_channel();

        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let n = frame::build_frame(&mut buf, FrameType::ObjReq, 0xdead_beef, 0, true, None).unwrap();
        link.process_input_stream(&buf[..n]);

        let reply = rx.try_recv().unwrap();
        assert_eq!(FrameType::from_byte(reply[1]), Some(FrameType::Nack));
    }

    #[test]
    fn inbound_obj_for_multi_instance_clones_new_instance() {
        let (mut link, _rx) = link_with_channel();
        link.register_prototype(Box::new(TestObject {
            object_id: 2,
            instance_id: 0,
            single_instance: false,
            value: 0,
        }))
        .unwrap();

        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let n = frame::build_frame(&mut buf, FrameType::Obj, 2, 3, false, Some(&5u32.to_le_bytes())).unwrap();
        link.process_input_stream(&buf[..n]);

        assert!(link.registry().get(2, 3).is_some());
    }

    #[test]
    fn send_object_without_a_transport_fails_closed() {
        let mut link = UavTalk::new();
        link.register_prototype(Box::new(TestObject {
            object_id: 1,
            instance_id: 0,
            single_instance: true,
            value: 0,
        }))
        .unwrap();

        assert_eq!(link.send_object(1, 0, false, false), Err(UavTalkError::TransportClosed));
    }

    #[test]
    fn send_object_for_unregistered_instance_fails_unknown_instance() {
        let (mut link, _rx) = link_with_channel();
        link.register_prototype(Box::new(TestObject {
            object_id: 1,
            instance_id: 0,
            single_instance: false,
            value: 0,
        }))
        .unwrap();

        assert_eq!(
            link.send_object(1, 9, false, false),
            Err(UavTalkError::UnknownInstance(1, 9))
        );
    }

    #[test]
    fn bad_crc_is_counted_as_rx_error() {
        let (mut link, _rx) = link_with_channel();
        link.register_prototype(Box::new(TestObject {
            object_id: 1,
            instance_id: 0,
            single_instance: true,
            value: 0,
        }))
        .unwrap();

        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let n = frame::build_frame(&mut buf, FrameType::Obj, 1, 0, true, Some(&[1, 2, 3, 4])).unwrap();
        buf[n - 1] ^= 0xff;
        link.process_input_stream(&buf[..n]);

        assert_eq!(link.stats().rx_errors, 1);
    }
}
