//! Mode 01 (current data) sensor commands and their decoders.
//!
//! Formulas follow SAE J1979. Each command knows the PID it queries, the
//! snapshot key it publishes under and how many data bytes to expect.

use crate::error::DeviceError;
use std::collections::BTreeSet;
use std::fmt;

/// Service 01: show current data.
pub const MODE_CURRENT_DATA: u8 = 0x01;

/// A sensor probe the exporter is willing to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Command {
    EngineLoad,
    CoolantTemperature,
    ShortFuelTrim1,
    ShortFuelTrim2,
    FuelPressure,
    IntakeManifoldPressure,
    EngineRpm,
    VehicleSpeed,
    TimingAdvance,
    IntakeAirTemperature,
    MafAirFlowRate,
    ThrottlePosition,
    ObdStandards,
    RuntimeSinceStart,
    Fuel,
    DistSinceDtcClear,
    AbsoluteBarometricPressure,
    ControlModuleVoltage,
    AmbientTemperature,
    EngineOilTemperature,
    TransmissionActualGear,
    Odometer,
}

/// Fixed, ordered list of commands probed on every device.
pub const CANDIDATE_COMMANDS: [Command; 22] = [
    Command::EngineLoad,
    Command::CoolantTemperature,
    Command::ShortFuelTrim1,
    Command::ShortFuelTrim2,
    Command::FuelPressure,
    Command::IntakeManifoldPressure,
    Command::EngineRpm,
    Command::VehicleSpeed,
    Command::TimingAdvance,
    Command::IntakeAirTemperature,
    Command::MafAirFlowRate,
    Command::ThrottlePosition,
    Command::ObdStandards,
    Command::RuntimeSinceStart,
    Command::Fuel,
    Command::DistSinceDtcClear,
    Command::AbsoluteBarometricPressure,
    Command::ControlModuleVoltage,
    Command::AmbientTemperature,
    Command::EngineOilTemperature,
    Command::TransmissionActualGear,
    Command::Odometer,
];

/// A decoded sensor value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value:.6}"),
        }
    }
}

impl Command {
    /// Parameter ID within mode 01.
    pub fn pid(self) -> u8 {
        match self {
            Command::EngineLoad => 0x04,
            Command::CoolantTemperature => 0x05,
            Command::ShortFuelTrim1 => 0x06,
            Command::ShortFuelTrim2 => 0x08,
            Command::FuelPressure => 0x0A,
            Command::IntakeManifoldPressure => 0x0B,
            Command::EngineRpm => 0x0C,
            Command::VehicleSpeed => 0x0D,
            Command::TimingAdvance => 0x0E,
            Command::IntakeAirTemperature => 0x0F,
            Command::MafAirFlowRate => 0x10,
            Command::ThrottlePosition => 0x11,
            Command::ObdStandards => 0x1C,
            Command::RuntimeSinceStart => 0x1F,
            Command::Fuel => 0x2F,
            Command::DistSinceDtcClear => 0x31,
            Command::AbsoluteBarometricPressure => 0x33,
            Command::ControlModuleVoltage => 0x42,
            Command::AmbientTemperature => 0x46,
            Command::EngineOilTemperature => 0x5C,
            Command::TransmissionActualGear => 0xA4,
            Command::Odometer => 0xA6,
        }
    }

    /// Key the reading is published under.
    pub fn key(self) -> &'static str {
        match self {
            Command::EngineLoad => "EngineLoad",
            Command::CoolantTemperature => "CoolantTemperature",
            Command::ShortFuelTrim1 => "ShortFuelTrim1",
            Command::ShortFuelTrim2 => "ShortFuelTrim2",
            Command::FuelPressure => "FuelPressure",
            Command::IntakeManifoldPressure => "IntakeManifoldPressure",
            Command::EngineRpm => "EngineRPM",
            Command::VehicleSpeed => "VehicleSpeed",
            Command::TimingAdvance => "TimingAdvance",
            Command::IntakeAirTemperature => "IntakeAirTemperature",
            Command::MafAirFlowRate => "MafAirFlowRate",
            Command::ThrottlePosition => "ThrottlePosition",
            Command::ObdStandards => "OBDStandards",
            Command::RuntimeSinceStart => "RuntimeSinceStart",
            Command::Fuel => "Fuel",
            Command::DistSinceDtcClear => "DistSinceDTCClear",
            Command::AbsoluteBarometricPressure => "AbsoluteBarometricPressure",
            Command::ControlModuleVoltage => "ControlModuleVoltage",
            Command::AmbientTemperature => "AmbientTemperature",
            Command::EngineOilTemperature => "EngineOilTemperature",
            Command::TransmissionActualGear => "TransmissionActualGear",
            Command::Odometer => "Odometer",
        }
    }

    /// Number of data bytes following the `41 <pid>` header.
    pub fn data_len(self) -> usize {
        match self {
            Command::EngineRpm
            | Command::MafAirFlowRate
            | Command::RuntimeSinceStart
            | Command::DistSinceDtcClear
            | Command::ControlModuleVoltage => 2,
            Command::TransmissionActualGear | Command::Odometer => 4,
            _ => 1,
        }
    }

    /// Adapter request string, e.g. `010C`.
    pub fn request(self) -> String {
        format!("{MODE_CURRENT_DATA:02X}{:02X}", self.pid())
    }

    /// Decode the data bytes of a response.
    pub fn decode(self, data: &[u8]) -> Result<Value, DeviceError> {
        if data.len() < self.data_len() {
            return Err(DeviceError::Protocol {
                command: self.request(),
                response: format!("{data:02X?}"),
            });
        }

        let a = f64::from(data[0]);
        let word = || f64::from(u16::from_be_bytes([data[0], data[1]]));

        let value = match self {
            Command::EngineLoad | Command::ThrottlePosition | Command::Fuel => {
                Value::Float(a * 100.0 / 255.0)
            }
            Command::CoolantTemperature
            | Command::IntakeAirTemperature
            | Command::AmbientTemperature
            | Command::EngineOilTemperature => Value::Integer(i64::from(data[0]) - 40),
            Command::ShortFuelTrim1 | Command::ShortFuelTrim2 => {
                Value::Float((a - 128.0) * 100.0 / 128.0)
            }
            Command::FuelPressure => Value::Integer(i64::from(data[0]) * 3),
            Command::IntakeManifoldPressure
            | Command::VehicleSpeed
            | Command::ObdStandards
            | Command::AbsoluteBarometricPressure => Value::Integer(i64::from(data[0])),
            Command::EngineRpm => Value::Float(word() / 4.0),
            Command::TimingAdvance => Value::Float(a / 2.0 - 64.0),
            Command::MafAirFlowRate => Value::Float(word() / 100.0),
            Command::RuntimeSinceStart | Command::DistSinceDtcClear => {
                Value::Integer(i64::from(u16::from_be_bytes([data[0], data[1]])))
            }
            Command::ControlModuleVoltage => Value::Float(word() / 1000.0),
            Command::TransmissionActualGear => Value::Integer(i64::from(data[1] >> 4)),
            Command::Odometer => {
                let raw = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                Value::Float(f64::from(raw) / 10.0)
            }
        };

        Ok(value)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Set of mode 01 PIDs a vehicle reports as implemented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedCommands {
    pids: BTreeSet<u8>,
}

impl SupportedCommands {
    pub fn from_pids(pids: impl IntoIterator<Item = u8>) -> Self {
        Self {
            pids: pids.into_iter().collect(),
        }
    }

    pub fn contains(&self, command: Command) -> bool {
        self.pids.contains(&command.pid())
    }

    pub fn contains_pid(&self, pid: u8) -> bool {
        self.pids.contains(&pid)
    }

    /// Keep the candidates the vehicle supports, preserving candidate order
    /// and dropping repeats.
    pub fn filter(&self, candidates: &[Command]) -> Vec<Command> {
        let mut seen = BTreeSet::new();
        candidates
            .iter()
            .copied()
            .filter(|command| self.contains(*command) && seen.insert(*command))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }
}

impl FromIterator<Command> for SupportedCommands {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self::from_pids(iter.into_iter().map(Command::pid))
    }
}
