//! Byte-oriented duplex channel abstraction, plus a TCP implementation.
//!
//! `UavTalk` only ever needs to push already-framed bytes out and accept
//! a stream of inbound bytes; it has no opinion on sockets, serial ports,
//! or anything else underneath. `Transport` is the seam: `is_open` lets
//! the link fail a send fast (and count a tx error) instead of queuing
//! into a dead connection, mirroring the original driver's `is_open()`.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::TransportError;

/// A non-blocking write sink the link core can queue bytes onto.
pub trait Transport: Send + Sync {
    fn write(&self, bytes: &[u8]) -> Result<(), TransportError>;
    fn is_open(&self) -> bool;
}

/// Queues outbound frames onto an unbounded channel; a background task
/// drains the channel onto the real socket. Keeps `UavTalk::process_*`
/// synchronous and lock-friendly even though the wire is async.
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    open: Arc<std::sync::atomic::AtomicBool>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                open: Arc::new(std::sync::atomic::AtomicBool::new(true)),
            },
            receiver,
        )
    }

    pub fn close(&self) {
        self.open.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Transport for ChannelTransport {
    fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.sender
            .send(bytes.to_vec())
            .map_err(|_| TransportError::Closed)
    }

    fn is_open(&self) -> bool {
        self.open.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Drives inbound bytes from a live TCP stream into the link core, and
/// drains queued outbound bytes from a `ChannelTransport` onto the socket.
///
/// `on_bytes` is awaited before the next `read` — this guarantees inbound
/// bytes are handed to the link core one chunk at a time, in order, with
/// none silently dropped under lock contention. Callers that forward into
/// an `Arc<tokio::sync::Mutex<UavTalk>>` should `.lock().await` inside it
/// rather than `try_lock()`.
///
/// Spawns its own write task; `run` returns once either side of the
/// connection closes.
pub async fn run_tcp_duplex<F, Fut>(
    stream: TcpStream,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    mut on_bytes: F,
) where
    F: FnMut(Vec<u8>) -> Fut + Send,
    Fut: std::future::Future<Output = ()> + Send,
{
    let (mut reader, mut writer) = stream.into_split();

    let writer_task = tokio::spawn(async move {
        while let Some(buf) = outbound.recv().await {
            if let Err(e) = writer.write_all(&buf).await {
                error!(error = %e, "tcp write failed, closing writer task");
                break;
            }
        }
    });

    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("peer closed connection");
                break;
            }
            Ok(n) => on_bytes(buf[..n].to_vec()).await,
            Err(e) => {
                warn!(error = %e, "tcp read failed, closing reader task");
                break;
            }
        }
    }

    writer_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_transport_queues_bytes() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.write(&[1, 2, 3]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn closed_transport_rejects_writes() {
        let (transport, _rx) = ChannelTransport::new();
        transport.close();
        assert!(!transport.is_open());
        assert!(transport.write(&[1]).is_err());
    }
}
