//! Telemetry monitor: drives the handshake state machine, periodic stats
//! exchange, connection watchdog, and the bulk object-retrieval queue that
//! runs once a link comes up.
//!
//! `UavTalk` itself is connection-state agnostic — it just encodes/decodes
//! frames. Everything about "are we connected yet" lives here, driven by a
//! `tokio::time` loop against a shared `Arc<tokio::sync::Mutex<UavTalk>>`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::demo_objects::{
    ConnectionStatus, FlightTelemetryStats, GcsTelemetryStats, FLIGHT_TELEMETRY_STATS_OBJID,
    GCS_TELEMETRY_STATS_OBJID,
};
use crate::link::UavTalk;
use crate::object::UpdateMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    HandshakeRequested,
    Connected,
}

/// Outcome of a completed transaction, as seen by the retrieval queue.
/// Recorded by an event-bus subscription and drained by the poll loop —
/// this keeps the subscription closure itself synchronous and non-reentrant.
type ResolvedTransaction = (u32, u16, bool);

/// Drives one link's connection lifecycle: handshake, periodic stats
/// publication, the connection-timeout watchdog, and bulk retrieval of
/// settings/meta objects once connected.
pub struct TelemetryMonitor {
    link: Arc<AsyncMutex<UavTalk>>,
    config: LinkConfig,
    state: ConnectionState,
    /// Deadline by which another inbound frame must arrive or the
    /// connection is declared lost. Re-armed every tick that saw traffic.
    connection_deadline: Option<Instant>,
    current_interval: Duration,
    last_tick: Instant,
    retrieval_queue: VecDeque<u32>,
    pending_retrieval: Option<u32>,
    resolved: Arc<StdMutex<Option<ResolvedTransaction>>>,
    /// Running totals folded into `GcsTelemetryStats` on every publish,
    /// mirroring the original's `gcsStatsObj->data.RxFailures +=
    /// stats.rxErrors` accumulation — these never reset on their own,
    /// only `take_stats()`'s per-tick snapshot does.
    rx_failures: u32,
    tx_failures: u32,
    tx_retries: u32,
}

impl TelemetryMonitor {
    /// Builds a monitor over `link`, registering the event subscriptions it
    /// needs. `link` must already have the GCS/flight telemetry stats
    /// objects registered (see `demo_objects`).
    pub async fn new(link: Arc<AsyncMutex<UavTalk>>, config: LinkConfig) -> Self {
        let resolved = Arc::new(StdMutex::new(None));
        {
            let mut guard = link.lock().await;
            let resolved_handle = Arc::clone(&resolved);
            guard.events_mut().on_transaction_completed(move |object_id, instance_id, success| {
                *resolved_handle.lock().unwrap() = Some((object_id, instance_id, success));
            });
        }

        Self {
            link,
            current_interval: config.stats_connect_period,
            config,
            state: ConnectionState::Disconnected,
            connection_deadline: None,
            last_tick: Instant::now(),
            retrieval_queue: VecDeque::new(),
            pending_retrieval: None,
            resolved,
            rx_failures: 0,
            tx_failures: 0,
            tx_retries: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the monitor loop forever. Alternates between the stats tick
    /// (interval depends on connection state) and a short poll for
    /// retrieval-queue progress while a bulk request is outstanding.
    pub async fn run(mut self) -> ! {
        loop {
            let retrieval_poll = Duration::from_millis(50);
            if self.pending_retrieval.is_some() {
                tokio::select! {
                    _ = tokio::time::sleep(self.current_interval) => {
                        self.tick().await;
                    }
                    _ = tokio::time::sleep(retrieval_poll) => {
                        self.advance_retrieval().await;
                    }
                }
            } else {
                tokio::time::sleep(self.current_interval).await;
                self.tick().await;
            }
        }
    }

    /// One stats-period tick: publish our side's stats, run the connection
    /// state machine, check the watchdog, and kick off retrieval on a fresh
    /// connection. Exposed separately from `run` so tests can step it
    /// without a real timer.
    pub async fn tick(&mut self) {
        let mut link = self.link.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick).as_secs_f32().max(1e-3);
        self.last_tick = now;

        let stats = link.take_stats();
        let rx_rate = stats.rx_bytes as f32 / elapsed;
        let tx_rate = stats.tx_bytes as f32 / elapsed;
        self.rx_failures = self.rx_failures.saturating_add(stats.rx_errors);
        self.tx_failures = self.tx_failures.saturating_add(stats.tx_errors);
        self.tx_retries = self.tx_retries.saturating_add(stats.tx_retries);

        let timed_out = self.connection_deadline.map_or(false, |deadline| now >= deadline);
        if stats.rx_objects > 0 {
            self.connection_deadline = Some(now + self.config.connection_timeout);
        }

        let peer_status = link
            .registry()
            .get(FLIGHT_TELEMETRY_STATS_OBJID, 0)
            .and_then(|obj| obj.as_any().downcast_ref::<FlightTelemetryStats>())
            .and_then(|obj| obj.fields.status);

        let previous_state = self.state;
        self.state = match self.state {
            ConnectionState::Disconnected => ConnectionState::HandshakeRequested,
            ConnectionState::HandshakeRequested => {
                if peer_status == Some(ConnectionStatus::HandshakeAck) || peer_status == Some(ConnectionStatus::Connected) {
                    ConnectionState::Connected
                } else {
                    ConnectionState::HandshakeRequested
                }
            }
            ConnectionState::Connected => {
                if timed_out || peer_status == Some(ConnectionStatus::Disconnected) {
                    ConnectionState::Disconnected
                } else {
                    ConnectionState::Connected
                }
            }
        };

        self.publish_gcs_stats(&mut link, rx_rate, tx_rate);
        if self.state != ConnectionState::Connected {
            // Forces an extra update while still converging, matching
            // telemetrymonitor.cpp's additional gcsStatsObj->updated() call
            // during handshake to accelerate convergence rather than
            // waiting for the next full tick.
            self.publish_gcs_stats(&mut link, rx_rate, tx_rate);
        }
        link.events_mut().emit_telemetry_updated(tx_rate, rx_rate);

        if previous_state != ConnectionState::Connected && self.state == ConnectionState::Connected {
            info!("telemetry link connected");
            self.current_interval = self.config.stats_update_period;
            self.connection_deadline = Some(now + self.config.connection_timeout);
            link.events_mut().emit_connected();
            self.start_retrieving_objects(&mut link);
        } else if previous_state == ConnectionState::Connected && self.state == ConnectionState::Disconnected {
            info!(timed_out, "telemetry link disconnected");
            self.current_interval = self.config.stats_connect_period;
            self.connection_deadline = None;
            self.retrieval_queue.clear();
            self.pending_retrieval = None;
            link.events_mut().emit_disconnected();
        }
    }

    fn publish_gcs_stats(&self, link: &mut UavTalk, rx_rate: f32, tx_rate: f32) {
        let gcs_status = match self.state {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::HandshakeRequested => ConnectionStatus::HandshakeReq,
            ConnectionState::Connected => ConnectionStatus::Connected,
        };

        if let Some(obj) = link.registry_mut().get_mut(GCS_TELEMETRY_STATS_OBJID, 0) {
            if let Some(stats) = obj.as_any_mut().downcast_mut::<GcsTelemetryStats>() {
                stats.fields.status = Some(gcs_status);
                stats.fields.rx_data_rate = rx_rate;
                stats.fields.tx_data_rate = tx_rate;
                stats.fields.rx_failures = self.rx_failures;
                stats.fields.tx_failures = self.tx_failures;
                stats.fields.tx_retries = self.tx_retries;
            }
        }

        if let Err(e) = link.send_object(GCS_TELEMETRY_STATS_OBJID, 0, false, false) {
            warn!(error = %e, "failed to publish gcs telemetry stats");
        }
    }

    /// Queues every registered settings/meta object (instance 0 only,
    /// mirroring the reference implementation) for a one-at-a-time pull.
    fn start_retrieving_objects(&mut self, link: &mut UavTalk) {
        self.retrieval_queue.clear();
        let object_ids: Vec<u32> = link.registry().object_ids().collect();
        for object_id in object_ids {
            let Some(prototype) = link.registry().prototype(object_id) else {
                continue;
            };
            let wants_retrieval = prototype.is_meta()
                || prototype.is_settings()
                || prototype.metadata().flight_telemetry_update_mode == UpdateMode::OnChange;
            if wants_retrieval {
                self.retrieval_queue.push_back(object_id);
            }
        }
        debug!(queued = self.retrieval_queue.len(), "starting bulk object retrieval");
        self.retrieve_next(link);
    }

    fn retrieve_next(&mut self, link: &mut UavTalk) {
        match self.retrieval_queue.pop_front() {
            Some(object_id) => {
                self.pending_retrieval = Some(object_id);
                if let Err(e) = link.send_object_request(object_id, 0, false) {
                    warn!(object_id, error = %e, "failed to request object during bulk retrieval");
                }
            }
            None => {
                self.pending_retrieval = None;
            }
        }
    }

    /// Checks whether the outstanding retrieval request resolved since the
    /// last poll, and if so advances to the next queued object (or stops,
    /// if the link dropped out from under us mid-drain).
    async fn advance_retrieval(&mut self) {
        let resolved = self.resolved.lock().unwrap().take();
        let Some((object_id, _instance_id, _success)) = resolved else {
            return;
        };
        if self.pending_retrieval != Some(object_id) {
            return;
        }

        if self.state != ConnectionState::Connected {
            self.retrieval_queue.clear();
            self.pending_retrieval = None;
            return;
        }

        let mut link = self.link.lock().await;
        self.retrieve_next(&mut link);
    }
}
