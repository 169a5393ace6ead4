//! Concrete telemetry objects driving the handshake and demo binary.
//!
//! `GcsTelemetryStats`/`FlightTelemetryStats` mirror each side's view of
//! the link (same shape, different object id), matching the pair of
//! objects the monitor's connection state machine watches in the
//! reference implementation.

use serde::{Deserialize, Serialize};

use crate::object::{Metadata, ObjectKind, UavObject};

pub const GCS_TELEMETRY_STATS_OBJID: u32 = 0xa001_0001;
pub const FLIGHT_TELEMETRY_STATS_OBJID: u32 = 0xa001_0002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionStatus {
    Disconnected = 0,
    HandshakeReq = 1,
    HandshakeAck = 2,
    Connected = 3,
}

impl ConnectionStatus {
    fn from_byte(byte: u8) -> Self {
        match byte {
            1 => ConnectionStatus::HandshakeReq,
            2 => ConnectionStatus::HandshakeAck,
            3 => ConnectionStatus::Connected,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

/// Wire layout: status(1) rx_data_rate(4) tx_data_rate(4) rx_failures(4)
/// tx_failures(4) tx_retries(4) — 21 bytes, little-endian floats/ints.
const TELEMETRY_STATS_BYTES: usize = 21;

#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryStatsFields {
    pub status: Option<ConnectionStatus>,
    pub rx_data_rate: f32,
    pub tx_data_rate: f32,
    pub rx_failures: u32,
    pub tx_failures: u32,
    pub tx_retries: u32,
}

macro_rules! telemetry_stats_object {
    ($name:ident, $objid:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            pub fields: TelemetryStatsFields,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    fields: TelemetryStatsFields {
                        status: Some(ConnectionStatus::Disconnected),
                        ..Default::default()
                    },
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl UavObject for $name {
            fn object_id(&self) -> u32 {
                $objid
            }
            fn instance_id(&self) -> u16 {
                0
            }
            fn is_single_instance(&self) -> bool {
                true
            }
            fn num_bytes(&self) -> usize {
                TELEMETRY_STATS_BYTES
            }
            fn kind(&self) -> ObjectKind {
                ObjectKind::Data
            }
            fn metadata(&self) -> Metadata {
                Metadata::default()
            }
            fn serialize(&self, buf: &mut [u8]) -> bool {
                if buf.len() < TELEMETRY_STATS_BYTES {
                    return false;
                }
                buf[0] = self.fields.status.unwrap_or(ConnectionStatus::Disconnected) as u8;
                buf[1..5].copy_from_slice(&self.fields.rx_data_rate.to_le_bytes());
                buf[5..9].copy_from_slice(&self.fields.tx_data_rate.to_le_bytes());
                buf[9..13].copy_from_slice(&self.fields.rx_failures.to_le_bytes());
                buf[13..17].copy_from_slice(&self.fields.tx_failures.to_le_bytes());
                buf[17..21].copy_from_slice(&self.fields.tx_retries.to_le_bytes());
                true
            }
            fn deserialize(&mut self, buf: &[u8]) {
                if buf.len() < TELEMETRY_STATS_BYTES {
                    return;
                }
                self.fields.status = Some(ConnectionStatus::from_byte(buf[0]));
                self.fields.rx_data_rate = f32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
                self.fields.tx_data_rate = f32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]);
                self.fields.rx_failures = u32::from_le_bytes([buf[9], buf[10], buf[11], buf[12]]);
                self.fields.tx_failures = u32::from_le_bytes([buf[13], buf[14], buf[15], buf[16]]);
                self.fields.tx_retries = u32::from_le_bytes([buf[17], buf[18], buf[19], buf[20]]);
            }
            fn clone_with_instance(&self, _new_instance: u16) -> Box<dyn UavObject> {
                Box::new(self.clone())
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }
    };
}

telemetry_stats_object!(GcsTelemetryStats, GCS_TELEMETRY_STATS_OBJID);
telemetry_stats_object!(FlightTelemetryStats, FLIGHT_TELEMETRY_STATS_OBJID);
