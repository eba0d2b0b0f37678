//! A fake vehicle for running the exporter without an adapter.
//!
//! Values follow a slow idle/cruise cycle so dashboards show movement.

use super::command::{Command, SupportedCommands, Value};
use super::{Connector, DiagnosticSession};
use crate::error::Result;
use crate::snapshot::Reading;
use tokio::time::Instant;
use tracing::info;

/// Sensors the simulated vehicle implements.
pub const SIMULATED_COMMANDS: [Command; 8] = [
    Command::EngineLoad,
    Command::CoolantTemperature,
    Command::EngineRpm,
    Command::VehicleSpeed,
    Command::ThrottlePosition,
    Command::RuntimeSinceStart,
    Command::Fuel,
    Command::ControlModuleVoltage,
];

/// Length of one idle -> cruise -> idle cycle, in seconds.
const CYCLE_SECS: f64 = 60.0;

#[derive(Debug, Clone, Default)]
pub struct SimulatedConnector;

impl SimulatedConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SimulatedConnector {
    type Session = SimulatedSession;

    async fn open(&self, address: &str) -> Result<Self::Session> {
        info!("Starting simulated vehicle for {}", address);
        Ok(SimulatedSession {
            started: Instant::now(),
        })
    }
}

#[derive(Debug)]
pub struct SimulatedSession {
    started: Instant,
}

impl SimulatedSession {
    fn value(&self, command: Command) -> Value {
        let elapsed = self.started.elapsed().as_secs_f64();
        // 0.0 at idle, 1.0 at cruise.
        let throttle = (1.0 - (elapsed * std::f64::consts::TAU / CYCLE_SECS).cos()) / 2.0;

        match command {
            Command::EngineLoad => Value::Float(20.0 + 55.0 * throttle),
            Command::CoolantTemperature => {
                Value::Integer(20 + (elapsed.min(300.0) / 300.0 * 70.0) as i64)
            }
            Command::EngineRpm => Value::Float(800.0 + 2200.0 * throttle),
            Command::VehicleSpeed => Value::Integer((110.0 * throttle) as i64),
            Command::ThrottlePosition => Value::Float(15.0 + 60.0 * throttle),
            Command::RuntimeSinceStart => Value::Integer(elapsed as i64),
            Command::Fuel => Value::Float((80.0 - elapsed / 600.0).max(0.0)),
            Command::ControlModuleVoltage => Value::Float(13.8 + 0.4 * throttle),
            _ => Value::Integer(0),
        }
    }
}

impl DiagnosticSession for SimulatedSession {
    async fn supported_commands(&mut self) -> Result<SupportedCommands> {
        Ok(SIMULATED_COMMANDS.into_iter().collect())
    }

    async fn run_batch(&mut self, commands: &[Command]) -> Result<Vec<Reading>> {
        Ok(commands
            .iter()
            .map(|command| Reading::new(command.key(), self.value(*command).to_string()))
            .collect())
    }
}
