use thiserror::Error;

/// Caller-visible failures. Framing errors and unknown-object errors are
/// *not* represented here — those are absorbed into `ComStats` counters and
/// never surfaced as `Err` (see the crate-level error handling notes).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UavTalkError {
    #[error("object id {0:#010x} already has a registered prototype")]
    DuplicatePrototype(u32),
    #[error("object id {0:#010x} has no registered prototype")]
    UnknownObjectId(u32),
    #[error("instance {1} of object {0:#010x} is already registered")]
    DuplicateInstance(u32, u16),
    #[error("object {0:#010x} is single-instance; instance {1} is invalid")]
    SingleInstanceViolation(u32, u16),
    #[error("object {0:#010x} instance {1} is not registered")]
    UnknownInstance(u32, u16),
    #[error("payload of {0} bytes exceeds MAX_PAYLOAD_LENGTH")]
    PayloadTooLarge(usize),
    #[error("object serialization failed")]
    SerializeFailed,
    #[error("transport is closed")]
    TransportClosed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
    #[error("underlying I/O error: {0}")]
    Io(String),
}
