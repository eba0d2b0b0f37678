//! # OBD Exporter
//!
//! A Prometheus exporter for live OBD-II sensor readings.
//!
//! ## Overview
//!
//! A long-running acquisition loop polls an ELM327-compatible adapter for a
//! fixed set of mode 01 sensors and publishes each cycle as an immutable
//! snapshot. HTTP scrapes read the latest snapshot without ever blocking the
//! loop and without ever seeing a half-updated one. When the adapter fails,
//! the snapshot is cleared and the loop reconnects after a fixed backoff.
//!
//! ## Quick Start
//!
//! ```no_run
//! use obd_exporter::{
//!     acquisition::{Acquisition, AcquisitionHandle},
//!     config::Settings,
//!     device::elm327::Elm327Connector,
//!     server::{start_server, AppState},
//!     snapshot::SnapshotStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load(Some("config/default.toml"))?;
//!
//!     let store = SnapshotStore::new();
//!     let handle = AcquisitionHandle::new()?;
//!     let state = AppState::new(store.reader(), handle.clone());
//!
//!     let connector = Elm327Connector::new(
//!         settings.device.command_timeout(),
//!         settings.device.baud_rate,
//!     );
//!     Acquisition::new(connector, &settings.acquisition, store, handle)
//!         .spawn(settings.device.address.clone());
//!
//!     start_server(&settings.exporter.listen_address, state).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`acquisition`] - Session supervision and snapshot publishing
//! - [`config`] - Configuration management
//! - [`device`] - Diagnostic device traits, ELM327 driver, simulator
//! - [`error`] - Error types and handling
//! - [`exposition`] - Text exposition of snapshots
//! - [`server`] - HTTP server for exposing metrics
//! - [`snapshot`] - Immutable snapshots and the lock-free handoff store

pub mod acquisition;
pub mod config;
pub mod device;
pub mod error;
pub mod exposition;
pub mod server;
pub mod snapshot;

pub use error::{DeviceError, ObdError, Result};
