//! Byte-at-a-time receive state machine.
//!
//! The decoder needs to know an object's length and single/multi-instance
//! shape before it can know whether an instance-id field follows and how
//! much payload to expect — both come from the registry. Rather than
//! depending on `ObjectRegistry` directly, the decoder takes anything
//! implementing `ObjectShape`, which keeps this module testable with a
//! trivial fake and keeps `ObjectRegistry` free of decoder concerns.

use arrayvec::ArrayVec;

use crate::crc::update_crc;
use crate::frame::{FrameType, MAX_PAYLOAD_LENGTH, MAX_HEADER_LENGTH, SYNC_VAL, TYPE_MASK, TYPE_VER};
use crate::object::ALL_INSTANCES;

/// What the decoder needs to know about an object id to finish framing it.
pub trait ObjectShape {
    /// `Some((num_bytes, is_single_instance))` if the object id is known.
    fn shape(&self, object_id: u32) -> Option<(usize, bool)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Sync,
    Type,
    Size,
    ObjId,
    InstId,
    Data,
    Cs,
}

/// A fully reassembled and checksum-verified inbound frame.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame_type: FrameType,
    pub object_id: u32,
    pub instance_id: u16,
    pub data: ArrayVec<u8, MAX_PAYLOAD_LENGTH>,
    /// True if the object id wasn't found in the registry (only possible
    /// for `ObjReq`, which needs no shape information to decode).
    pub unknown_object: bool,
}

/// The outcome of feeding one byte to the decoder.
pub enum Step {
    /// No complete frame yet; state machine keeps accumulating.
    Pending,
    /// A frame was fully received and its checksum matched.
    Frame(DecodedFrame),
    /// A frame was discarded (bad version bits, bad size, bad length, or
    /// bad checksum). The caller should count an rx error.
    Error,
}

/// Owns the running receive state across calls to `process_byte`.
pub struct Decoder {
    state: State,
    rx_cs: u8,
    rx_type: u8,
    packet_size: usize,
    rx_packet_length: usize,
    count: usize,
    obj_id_buf: [u8; 4],
    inst_id_buf: [u8; 2],
    object_id: u32,
    instance_id: u16,
    rx_length: usize,
    instance_length: usize,
    unknown_object: bool,
    data: ArrayVec<u8, MAX_PAYLOAD_LENGTH>,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: State::Sync,
            rx_cs: 0,
            rx_type: 0,
            packet_size: 0,
            rx_packet_length: 0,
            count: 0,
            obj_id_buf: [0; 4],
            inst_id_buf: [0; 2],
            object_id: 0,
            instance_id: 0,
            rx_length: 0,
            instance_length: 0,
            unknown_object: false,
            data: ArrayVec::new(),
        }
    }

    fn reset_to_sync(&mut self) {
        self.state = State::Sync;
    }

    pub fn process_byte(&mut self, byte: u8, shapes: &impl ObjectShape) -> Step {
        self.rx_packet_length += 1;

        match self.state {
            State::Sync => {
                if byte != SYNC_VAL {
                    return Step::Pending;
                }
                self.rx_cs = update_crc(0, byte);
                self.rx_packet_length = 1;
                self.state = State::Type;
                Step::Pending
            }

            State::Type => {
                self.rx_cs = update_crc(self.rx_cs, byte);
                if byte & TYPE_MASK != TYPE_VER {
                    self.reset_to_sync();
                    return Step::Pending;
                }
                self.rx_type = byte;
                self.packet_size = 0;
                self.count = 0;
                self.state = State::Size;
                Step::Pending
            }

            State::Size => {
                self.rx_cs = update_crc(self.rx_cs, byte);
                if self.count == 0 {
                    self.packet_size = byte as usize;
                    self.count = 1;
                    return Step::Pending;
                }
                self.packet_size += (byte as usize) << 8;
                if self.packet_size < crate::frame::MIN_HEADER_LENGTH
                    || self.packet_size > MAX_HEADER_LENGTH + MAX_PAYLOAD_LENGTH
                {
                    self.reset_to_sync();
                    return Step::Error;
                }
                self.count = 0;
                self.state = State::ObjId;
                Step::Pending
            }

            State::ObjId => {
                self.rx_cs = update_crc(self.rx_cs, byte);
                self.obj_id_buf[self.count] = byte;
                self.count += 1;
                if self.count < 4 {
                    return Step::Pending;
                }
                self.object_id = u32::from_le_bytes(self.obj_id_buf);

                let frame_type = match FrameType::from_byte(self.rx_type) {
                    Some(ft) => ft,
                    None => {
                        self.reset_to_sync();
                        return Step::Error;
                    }
                };

                let shape = shapes.shape(self.object_id);
                self.unknown_object = shape.is_none();

                if self.unknown_object && frame_type != FrameType::ObjReq {
                    self.reset_to_sync();
                    return Step::Error;
                }

                match frame_type {
                    FrameType::ObjReq | FrameType::Ack | FrameType::Nack => {
                        self.rx_length = 0;
                        self.instance_length = 0;
                    }
                    FrameType::Obj | FrameType::ObjAck => {
                        let (num_bytes, single_instance) = shape.unwrap_or((0, true));
                        self.rx_length = num_bytes;
                        self.instance_length = if single_instance { 0 } else { 2 };
                    }
                }

                if self.rx_length >= MAX_PAYLOAD_LENGTH {
                    self.reset_to_sync();
                    return Step::Error;
                }
                if self.rx_packet_length + self.instance_length + self.rx_length != self.packet_size {
                    self.reset_to_sync();
                    return Step::Error;
                }

                self.count = 0;
                self.data.clear();

                if self.unknown_object {
                    self.instance_id = 0;
                    self.state = State::Cs;
                } else if self.instance_length == 0 {
                    self.instance_id = 0;
                    self.state = if self.rx_length > 0 { State::Data } else { State::Cs };
                } else {
                    self.state = State::InstId;
                }
                Step::Pending
            }

            State::InstId => {
                self.rx_cs = update_crc(self.rx_cs, byte);
                self.inst_id_buf[self.count] = byte;
                self.count += 1;
                if self.count < 2 {
                    return Step::Pending;
                }
                self.instance_id = u16::from_le_bytes(self.inst_id_buf);
                self.count = 0;
                self.state = if self.rx_length > 0 { State::Data } else { State::Cs };
                Step::Pending
            }

            State::Data => {
                self.rx_cs = update_crc(self.rx_cs, byte);
                self.data.push(byte);
                if self.data.len() < self.rx_length {
                    return Step::Pending;
                }
                self.state = State::Cs;
                Step::Pending
            }

            State::Cs => {
                let ok = self.rx_cs == byte && self.rx_packet_length == self.packet_size + 1;
                self.reset_to_sync();
                if !ok {
                    return Step::Error;
                }

                let frame_type = match FrameType::from_byte(self.rx_type) {
                    Some(ft) => ft,
                    None => return Step::Error,
                };

                let instance_id = if self.unknown_object {
                    ALL_INSTANCES
                } else {
                    self.instance_id
                };

                Step::Frame(DecodedFrame {
                    frame_type,
                    object_id: self.object_id,
                    instance_id,
                    data: self.data.clone(),
                    unknown_object: self.unknown_object,
                })
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
