//! Resilient acquisition loop.
//!
//! [`Acquisition`] owns the device connector and the single-writer
//! [`SnapshotStore`]. It keeps at most one diagnostic session alive, publishes
//! one snapshot per successful polling cycle and, whenever the device fails,
//! clears the store, waits a fixed backoff and reconnects. It never gives up.
//!
//! The supervisory policy is the transition table in
//! [`AcquisitionState::on`]:
//!
//! | state          | event            | next           |
//! |----------------|------------------|----------------|
//! | `Disconnected` | `SessionOpened`  | `Polling`      |
//! | `Disconnected` | `SessionFailed`  | `Backoff`      |
//! | `Polling`      | `SessionFailed`  | `Backoff`      |
//! | `Backoff`      | `BackoffElapsed` | `Disconnected` |
//!
//! Any other pair leaves the state unchanged.

use crate::config::AcquisitionConfig;
use crate::device::{Connector, DiagnosticSession, CANDIDATE_COMMANDS};
use crate::error::{ObdError, Result};
use crate::snapshot::{Snapshot, SnapshotReader, SnapshotStore};
use prometheus::{Encoder, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the acquisition loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    /// No session; about to open one.
    Disconnected,
    /// Session open, polling cycles running.
    Polling,
    /// Last session failed; waiting before reconnecting.
    Backoff,
}

/// Outcomes of device calls and timers that drive [`AcquisitionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionEvent {
    SessionOpened,
    SessionFailed,
    BackoffElapsed,
}

impl AcquisitionState {
    pub const ALL: [AcquisitionState; 3] = [
        AcquisitionState::Disconnected,
        AcquisitionState::Polling,
        AcquisitionState::Backoff,
    ];

    /// Apply one event. Total: there is no terminal state.
    pub fn on(self, event: AcquisitionEvent) -> Self {
        use AcquisitionEvent::*;
        use AcquisitionState::*;

        match (self, event) {
            (Disconnected, SessionOpened) => Polling,
            (Disconnected | Polling, SessionFailed) => Backoff,
            (Backoff, BackoffElapsed) => Disconnected,
            (state, _) => state,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AcquisitionState::Disconnected => "disconnected",
            AcquisitionState::Polling => "polling",
            AcquisitionState::Backoff => "backoff",
        }
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared view of the acquisition loop: its state and its counters.
///
/// Counters live in their own registry so they never mix with the vehicle
/// readings served on `/metrics`.
#[derive(Clone)]
pub struct AcquisitionHandle {
    registry: Registry,
    session_attempts: IntCounter,
    session_failures: IntCounter,
    poll_cycles: IntCounter,
    state_gauge: IntGaugeVec,
    state: Arc<watch::Sender<AcquisitionState>>,
}

impl AcquisitionHandle {
    /// Create a handle with a fresh registry.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let session_attempts = IntCounter::with_opts(Opts::new(
            "obd_exporter_session_attempts_total",
            "Number of diagnostic sessions the exporter tried to open",
        ))?;
        registry.register(Box::new(session_attempts.clone()))?;

        let session_failures = IntCounter::with_opts(Opts::new(
            "obd_exporter_session_failures_total",
            "Number of diagnostic sessions that ended with a device error",
        ))?;
        registry.register(Box::new(session_failures.clone()))?;

        let poll_cycles = IntCounter::with_opts(Opts::new(
            "obd_exporter_poll_cycles_total",
            "Number of polling cycles that published a snapshot",
        ))?;
        registry.register(Box::new(poll_cycles.clone()))?;

        let state_gauge = IntGaugeVec::new(
            Opts::new(
                "obd_exporter_acquisition_state",
                "Current acquisition state (1 for the active state)",
            ),
            &["state"],
        )?;
        registry.register(Box::new(state_gauge.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        let handle = Self {
            registry,
            session_attempts,
            session_failures,
            poll_cycles,
            state_gauge,
            state: Arc::new(watch::Sender::new(AcquisitionState::Disconnected)),
        };
        handle.record_state(AcquisitionState::Disconnected);
        Ok(handle)
    }

    pub fn state(&self) -> AcquisitionState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AcquisitionState> {
        self.state.subscribe()
    }

    pub fn session_attempts(&self) -> u64 {
        self.session_attempts.get()
    }

    pub fn session_failures(&self) -> u64 {
        self.session_failures.get()
    }

    pub fn poll_cycles(&self) -> u64 {
        self.poll_cycles.get()
    }

    /// Encode the acquisition counters in Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| ObdError::Metrics(e.to_string()))
    }

    fn transition(&self, event: AcquisitionEvent) {
        let next = self.state().on(event);
        self.state.send_replace(next);
        self.record_state(next);
    }

    fn record_state(&self, current: AcquisitionState) {
        for state in AcquisitionState::ALL {
            self.state_gauge
                .with_label_values(&[state.as_str()])
                .set(i64::from(state == current));
        }
    }
}

impl fmt::Debug for AcquisitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionHandle")
            .field("state", &self.state())
            .field("session_attempts", &self.session_attempts())
            .field("session_failures", &self.session_failures())
            .field("poll_cycles", &self.poll_cycles())
            .finish()
    }
}

/// The acquisition loop for one device.
pub struct Acquisition<C> {
    connector: C,
    store: SnapshotStore,
    handle: AcquisitionHandle,
    poll_interval: Duration,
    backoff: Duration,
}

impl<C> Acquisition<C>
where
    C: Connector,
{
    /// Create an acquisition loop publishing into `store`.
    ///
    /// # Arguments
    ///
    /// * `connector` - Opens diagnostic sessions
    /// * `config` - Poll interval and reconnect backoff
    /// * `store` - The snapshot store; this loop becomes its only writer
    /// * `handle` - Where state and counters are reported
    pub fn new(
        connector: C,
        config: &AcquisitionConfig,
        store: SnapshotStore,
        handle: AcquisitionHandle,
    ) -> Self {
        Self {
            connector,
            store,
            handle,
            poll_interval: config.poll_interval(),
            backoff: config.backoff(),
        }
    }

    pub fn reader(&self) -> SnapshotReader {
        self.store.reader()
    }

    pub fn handle(&self) -> &AcquisitionHandle {
        &self.handle
    }

    /// Run one session against `address` until the device fails.
    ///
    /// Opens the device, intersects its supported commands with
    /// [`CANDIDATE_COMMANDS`] once, then polls that batch forever, publishing
    /// a fresh snapshot after every successful cycle. Only returns with the
    /// error that ended the session.
    pub async fn run_session(&self, address: &str) -> ObdError {
        match self.poll_session(address).await {
            Ok(never) => match never {},
            Err(e) => e,
        }
    }

    async fn poll_session(&self, address: &str) -> Result<Infallible> {
        let mut session = self.connector.open(address).await?;
        self.handle.transition(AcquisitionEvent::SessionOpened);

        let supported = session.supported_commands().await?;
        let commands = supported.filter(&CANDIDATE_COMMANDS);
        info!(
            "Device supports {} of {} candidate sensors",
            commands.len(),
            CANDIDATE_COMMANDS.len()
        );

        loop {
            let readings = session.run_batch(&commands).await?;
            let snapshot: Snapshot = readings.into_iter().collect();
            debug!("{:?}", snapshot);

            self.store.publish(snapshot);
            self.handle.poll_cycles.inc();

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Keep a session running for the lifetime of the process.
    ///
    /// After every session error the store is reset to the empty snapshot and
    /// the loop sleeps for the backoff before reconnecting. Never returns.
    pub async fn supervise(&self, address: &str) {
        loop {
            info!("Starting new OBD session");
            self.handle.session_attempts.inc();

            let err = self.run_session(address).await;
            warn!("OBD session closed by error: {}", err);

            self.store.reset();
            self.handle.session_failures.inc();
            self.handle.transition(AcquisitionEvent::SessionFailed);

            info!("Waiting {:?} before new OBD session", self.backoff);
            tokio::time::sleep(self.backoff).await;
            self.handle.transition(AcquisitionEvent::BackoffElapsed);
        }
    }
}

impl<C> Acquisition<C>
where
    C: Connector + 'static,
{
    /// Run [`Acquisition::supervise`] on its own task.
    pub fn spawn(self, address: String) -> JoinHandle<()> {
        tokio::spawn(async move { self.supervise(&address).await })
    }
}
