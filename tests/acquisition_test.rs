//! Acquisition loop tests
//!
//! These tests drive the loop with a scripted device instead of an adapter.

use obd_exporter::{
    acquisition::{Acquisition, AcquisitionHandle, AcquisitionState},
    config::AcquisitionConfig,
    device::{Command, Connector, DiagnosticSession, SupportedCommands},
    error::{DeviceError, ObdError, Result},
    exposition::render,
    snapshot::{Reading, Snapshot, SnapshotStore},
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Script for one session: `None` in `batches` fails that cycle, and the
/// session fails once the script runs out.
#[derive(Clone, Default)]
struct SessionScript {
    supported: Option<Vec<Command>>,
    batches: VecDeque<Option<Vec<Reading>>>,
}

#[derive(Clone, Default)]
struct FakeConnector {
    /// One entry per `open`; `None` (or an empty queue) fails the open.
    sessions: Arc<Mutex<VecDeque<Option<SessionScript>>>>,
    requested: Arc<Mutex<Vec<Vec<Command>>>>,
}

impl FakeConnector {
    fn always_failing() -> Self {
        Self::default()
    }

    fn with_sessions(sessions: Vec<Option<SessionScript>>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(sessions.into())),
            ..Self::default()
        }
    }

    fn requested_batches(&self) -> Vec<Vec<Command>> {
        self.requested.lock().unwrap().clone()
    }
}

struct FakeSession {
    script: SessionScript,
    requested: Arc<Mutex<Vec<Vec<Command>>>>,
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn open(&self, _address: &str) -> Result<FakeSession> {
        let next = self.sessions.lock().unwrap().pop_front().flatten();
        match next {
            Some(script) => Ok(FakeSession {
                script,
                requested: Arc::clone(&self.requested),
            }),
            None => Err(DeviceError::Io(std::io::ErrorKind::NotFound.into()).into()),
        }
    }
}

impl DiagnosticSession for FakeSession {
    async fn supported_commands(&mut self) -> Result<SupportedCommands> {
        match &self.script.supported {
            Some(commands) => Ok(commands.iter().copied().collect()),
            None => Err(DeviceError::NoData("0100".to_string()).into()),
        }
    }

    async fn run_batch(&mut self, commands: &[Command]) -> Result<Vec<Reading>> {
        self.requested.lock().unwrap().push(commands.to_vec());
        match self.script.batches.pop_front().flatten() {
            Some(readings) => Ok(readings),
            None => Err(DeviceError::Disconnected.into()),
        }
    }
}

fn config() -> AcquisitionConfig {
    AcquisitionConfig {
        poll_interval_ms: 10,
        backoff_ms: 2_000,
    }
}

fn acquisition(connector: FakeConnector) -> Acquisition<FakeConnector> {
    Acquisition::new(
        connector,
        &config(),
        SnapshotStore::new(),
        AcquisitionHandle::new().unwrap(),
    )
}

fn idle_readings() -> Vec<Reading> {
    vec![
        Reading::new("EngineRPM", "850"),
        Reading::new("VehicleSpeed", "0"),
    ]
}

#[tokio::test]
async fn test_run_session_returns_open_error() {
    let acquisition = acquisition(FakeConnector::always_failing());

    let err = acquisition.run_session("/dev/ttyUSB0").await;

    assert!(matches!(err, ObdError::Device(DeviceError::Io(_))));
    assert!(acquisition.reader().read().is_empty());
    assert_eq!(acquisition.handle().state(), AcquisitionState::Disconnected);
}

#[tokio::test]
async fn test_run_session_stops_when_supported_query_fails() {
    let connector = FakeConnector::with_sessions(vec![Some(SessionScript {
        supported: None,
        batches: vec![Some(idle_readings())].into(),
    })]);
    let acquisition = acquisition(connector.clone());

    let err = acquisition.run_session("/dev/ttyUSB0").await;

    assert!(matches!(err, ObdError::Device(DeviceError::NoData(_))));
    assert!(connector.requested_batches().is_empty());
    assert!(acquisition.reader().read().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_session_polls_supported_subset_and_publishes() {
    let connector = FakeConnector::with_sessions(vec![Some(SessionScript {
        supported: Some(vec![Command::VehicleSpeed, Command::EngineRpm, Command::Odometer]),
        batches: vec![Some(idle_readings()), Some(idle_readings())].into(),
    })]);
    let acquisition = acquisition(connector.clone());

    let err = acquisition.run_session("/dev/ttyUSB0").await;

    assert!(matches!(err, ObdError::Device(DeviceError::Disconnected)));

    // Candidate order, computed once and reused for every cycle.
    let expected = vec![Command::EngineRpm, Command::VehicleSpeed, Command::Odometer];
    assert_eq!(connector.requested_batches(), vec![expected; 3]);

    let published = acquisition.reader().read();
    let wanted: Snapshot = idle_readings().into_iter().collect();
    assert_eq!(*published, wanted);
    assert_eq!(acquisition.handle().poll_cycles(), 2);
    assert_eq!(acquisition.handle().state(), AcquisitionState::Polling);
}

#[tokio::test(start_paused = true)]
async fn test_supervise_keeps_retrying_failed_opens() {
    let acquisition = acquisition(FakeConnector::always_failing());
    let handle = acquisition.handle().clone();

    let task = acquisition.spawn("/dev/ttyUSB0".to_string());

    // Attempts at t = 0, 2, 4, 6, 8, 10 seconds.
    tokio::time::sleep(Duration::from_millis(10_100)).await;

    assert_eq!(handle.session_attempts(), 6);
    assert_eq!(handle.session_failures(), 6);
    assert_eq!(handle.state(), AcquisitionState::Backoff);
    assert!(!task.is_finished());

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_failure_clears_published_snapshot() {
    let connector = FakeConnector::with_sessions(vec![Some(SessionScript {
        supported: Some(vec![Command::EngineRpm, Command::VehicleSpeed]),
        batches: vec![Some(idle_readings())].into(),
    })]);
    let acquisition = acquisition(connector);
    let reader = acquisition.reader();
    let handle = acquisition.handle().clone();
    let mut published = reader.subscribe();
    let mut state = handle.subscribe();

    let task = acquisition.spawn("/dev/ttyUSB0".to_string());

    published.changed().await.unwrap();
    assert_eq!(reader.read().get("EngineRPM"), Some("850"));

    state
        .wait_for(|state| *state == AcquisitionState::Backoff)
        .await
        .unwrap();
    assert!(reader.read().is_empty());

    // Still inside the backoff window: nothing stale is served.
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(render(&reader.read()), "");
    assert_eq!(handle.session_attempts(), 1);

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_backoff() {
    let session = SessionScript {
        supported: Some(vec![Command::EngineRpm]),
        batches: vec![Some(vec![Reading::new("EngineRPM", "900")])].into(),
    };
    let connector = FakeConnector::with_sessions(vec![Some(session.clone()), None, Some(session)]);
    let acquisition = acquisition(connector);
    let handle = acquisition.handle().clone();

    let task = acquisition.spawn("/dev/ttyUSB0".to_string());

    // First session fails at 10 ms, the open at 2.01 s fails, the third
    // session opens at 4.02 s and fails again 10 ms later.
    tokio::time::sleep(Duration::from_millis(4_100)).await;

    assert_eq!(handle.session_attempts(), 3);
    assert_eq!(handle.poll_cycles(), 2);

    task.abort();
}
