//! Diagnostic device abstraction.
//!
//! The acquisition loop only needs three capabilities from a device: open a
//! session, list the commands the vehicle supports, and run a batch of
//! commands. [`Connector`] and [`DiagnosticSession`] capture exactly that;
//! [`elm327`] talks to real adapters and [`simulated`] fakes a vehicle.

pub mod command;
pub mod elm327;
pub mod simulated;

pub use command::{Command, SupportedCommands, CANDIDATE_COMMANDS};

use crate::error::Result;
use crate::snapshot::Reading;
use std::future::Future;

/// Opens diagnostic sessions against a device address.
pub trait Connector: Send + Sync {
    type Session: DiagnosticSession;

    /// Connect to the device at `address` and bring it into a queryable state.
    fn open(&self, address: &str) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// A live connection to a vehicle.
pub trait DiagnosticSession: Send {
    /// Commands the connected vehicle reports as implemented.
    fn supported_commands(&mut self) -> impl Future<Output = Result<SupportedCommands>> + Send;

    /// Run every command in `commands` and return one reading per command.
    ///
    /// Any single command failing fails the whole batch.
    fn run_batch(
        &mut self,
        commands: &[Command],
    ) -> impl Future<Output = Result<Vec<Reading>>> + Send;
}
