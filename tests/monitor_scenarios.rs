//! End-to-end telemetry monitor scenarios: handshake convergence and the
//! connection-timeout watchdog, driven by explicit `tick()` calls instead
//! of real timers so the test runs instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use uavlink::demo_objects::{ConnectionStatus, FlightTelemetryStats, GcsTelemetryStats, FLIGHT_TELEMETRY_STATS_OBJID, GCS_TELEMETRY_STATS_OBJID};
use uavlink::{ConnectionState, LinkConfig, TelemetryMonitor, UavTalk};

async fn linked_monitor() -> (Arc<Mutex<UavTalk>>, TelemetryMonitor) {
    let mut link = UavTalk::new();
    link.register_prototype(Box::new(GcsTelemetryStats::new())).unwrap();
    link.register_prototype(Box::new(FlightTelemetryStats::new())).unwrap();
    let link = Arc::new(Mutex::new(link));
    let monitor = TelemetryMonitor::new(Arc::clone(&link), LinkConfig::default()).await;
    (link, monitor)
}

async fn set_peer_status(link: &Arc<Mutex<UavTalk>>, status: ConnectionStatus) {
    let mut guard = link.lock().await;
    let obj = guard.registry_mut().get_mut(FLIGHT_TELEMETRY_STATS_OBJID, 0).unwrap();
    obj.as_any_mut()
        .downcast_mut::<FlightTelemetryStats>()
        .unwrap()
        .fields
        .status = Some(status);
}

/// S5: starting Disconnected, the first tick requests a handshake; once
/// the peer reports HandshakeAck, the next tick completes the connection.
#[tokio::test]
async fn s5_handshake_converges_to_connected() {
    let (link, mut monitor) = linked_monitor().await;
    assert_eq!(monitor.state(), ConnectionState::Disconnected);

    monitor.tick().await;
    assert_eq!(monitor.state(), ConnectionState::HandshakeRequested);
    {
        let guard = link.lock().await;
        let gcs_status = guard
            .registry()
            .get(GCS_TELEMETRY_STATS_OBJID, 0)
            .and_then(|o| o.as_any().downcast_ref::<GcsTelemetryStats>())
            .and_then(|o| o.fields.status);
        assert_eq!(gcs_status, Some(ConnectionStatus::HandshakeReq));
    }

    set_peer_status(&link, ConnectionStatus::HandshakeAck).await;

    monitor.tick().await;
    assert_eq!(monitor.state(), ConnectionState::Connected);
}

/// S6: a connected link with no inbound frames for the configured timeout
/// drops back to Disconnected on the next tick that notices the deadline
/// passed.
#[tokio::test]
async fn s6_connection_timeout_drops_the_link() {
    let config = LinkConfig {
        connection_timeout: Duration::from_millis(20),
        ..LinkConfig::default()
    };
    let mut link = UavTalk::new();
    link.register_prototype(Box::new(GcsTelemetryStats::new())).unwrap();
    link.register_prototype(Box::new(FlightTelemetryStats::new())).unwrap();
    let link = Arc::new(Mutex::new(link));
    let mut monitor = TelemetryMonitor::new(Arc::clone(&link), config).await;

    monitor.tick().await;
    set_peer_status(&link, ConnectionStatus::Connected).await;
    monitor.tick().await;
    assert_eq!(monitor.state(), ConnectionState::Connected);

    tokio::time::sleep(Duration::from_millis(30)).await;
    monitor.tick().await;

    assert_eq!(monitor.state(), ConnectionState::Disconnected);
}
