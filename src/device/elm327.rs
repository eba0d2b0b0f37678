//! ELM327 adapter driver.
//!
//! Speaks the adapter's line protocol over any byte stream: a request is
//! written as ASCII terminated by `\r`, and the adapter answers with one or
//! more lines followed by a `>` prompt. The serial line is opened raw at the
//! configured baud rate with 8 data bits, no parity, one stop bit and no flow
//! control (8N1), which is what ELM327 clones expect.

use super::command::{Command, SupportedCommands, MODE_CURRENT_DATA};
use super::{Connector, DiagnosticSession};
use crate::error::{DeviceError, Result};
use crate::snapshot::Reading;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info};

/// Sent after `ATZ`; each must be acknowledged with `OK`.
const INIT_COMMANDS: [&str; 5] = ["ATE0", "ATL0", "ATS1", "ATH0", "ATSP0"];

/// PID 00, 20, 40, ... report which of the next 32 PIDs are supported.
const SUPPORTED_PIDS_STRIDE: u8 = 0x20;

const PROMPT: u8 = b'>';

/// Opens ELM327 sessions on serial device nodes.
#[derive(Debug, Clone)]
pub struct Elm327Connector {
    command_timeout: Duration,
    baud_rate: u32,
}

impl Elm327Connector {
    pub fn new(command_timeout: Duration, baud_rate: u32) -> Self {
        Self {
            command_timeout,
            baud_rate,
        }
    }
}

impl Connector for Elm327Connector {
    type Session = Elm327Session<SerialStream>;

    async fn open(&self, address: &str) -> Result<Self::Session> {
        info!("Opening ELM327 adapter at {} ({} baud)", address, self.baud_rate);
        let port = tokio_serial::new(address, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(DeviceError::from)?;

        Elm327Session::initialize(port, self.command_timeout).await
    }
}

/// An initialised adapter connection.
#[derive(Debug)]
pub struct Elm327Session<T> {
    port: T,
    command_timeout: Duration,
}

impl<T> Elm327Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Reset the adapter and configure it for terse, header-less replies.
    pub async fn initialize(port: T, command_timeout: Duration) -> Result<Self> {
        let mut session = Self {
            port,
            command_timeout,
        };

        let banner = session.exchange("ATZ").await?;
        debug!("Adapter identified as {:?}", banner.trim());

        for command in INIT_COMMANDS {
            let response = session.exchange(command).await?;
            if !response.contains("OK") {
                return Err(DeviceError::Protocol {
                    command: command.to_string(),
                    response,
                }
                .into());
            }
        }

        Ok(session)
    }

    /// Write one request and collect everything up to the prompt.
    async fn exchange(&mut self, command: &str) -> std::result::Result<String, DeviceError> {
        let timeout = self.command_timeout;
        tokio::time::timeout(timeout, self.exchange_unbounded(command))
            .await
            .map_err(|_| DeviceError::Timeout {
                command: command.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }

    async fn exchange_unbounded(
        &mut self,
        command: &str,
    ) -> std::result::Result<String, DeviceError> {
        self.port.write_all(command.as_bytes()).await?;
        self.port.write_all(b"\r").await?;
        self.port.flush().await?;

        let mut response = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let read = self.port.read(&mut chunk).await?;
            if read == 0 {
                return Err(DeviceError::Disconnected);
            }
            response.extend_from_slice(&chunk[..read]);

            if let Some(end) = response.iter().position(|byte| *byte == PROMPT) {
                response.truncate(end);
                return Ok(String::from_utf8_lossy(&response).into_owned());
            }
        }
    }

    /// Query one mode 01 PID and return its data bytes.
    async fn query_pid(&mut self, pid: u8) -> std::result::Result<Vec<u8>, DeviceError> {
        let request = format!("{MODE_CURRENT_DATA:02X}{pid:02X}");
        let response = self.exchange(&request).await?;
        parse_response(&response, &request, pid)
    }
}

impl<T> DiagnosticSession for Elm327Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn supported_commands(&mut self) -> Result<SupportedCommands> {
        let mut pids = Vec::new();
        let mut base = 0u8;

        loop {
            let data = match self.query_pid(base).await {
                Ok(data) => data,
                // Vehicles may advertise a range they then refuse to describe.
                Err(DeviceError::NoData(_)) if base > 0 => break,
                Err(e) => return Err(e.into()),
            };

            let bitmap = match data.as_slice() {
                [a, b, c, d, ..] => u32::from_be_bytes([*a, *b, *c, *d]),
                _ => {
                    return Err(DeviceError::Protocol {
                        command: format!("{MODE_CURRENT_DATA:02X}{base:02X}"),
                        response: hex::encode_upper(&data),
                    }
                    .into())
                }
            };
            pids.extend(pids_from_bitmap(base, bitmap));

            match base.checked_add(SUPPORTED_PIDS_STRIDE) {
                Some(next) if bitmap & 1 == 1 => base = next,
                _ => break,
            }
        }

        debug!("Vehicle reports {} supported PIDs", pids.len());
        Ok(SupportedCommands::from_pids(pids))
    }

    async fn run_batch(&mut self, commands: &[Command]) -> Result<Vec<Reading>> {
        let mut readings = Vec::with_capacity(commands.len());
        for command in commands {
            let data = self.query_pid(command.pid()).await?;
            let value = command.decode(&data)?;
            readings.push(Reading::new(command.key(), value.to_string()));
        }
        Ok(readings)
    }
}

/// PIDs flagged in a "supported PIDs" bitmap. Bit 31 stands for `base + 1`.
fn pids_from_bitmap(base: u8, bitmap: u32) -> impl Iterator<Item = u8> {
    (0..32u8)
        .filter(move |bit| bitmap & (1u32 << (31 - bit)) != 0)
        .filter_map(move |bit| base.checked_add(bit + 1))
}

/// Extract the data bytes answering `request` from a raw adapter response.
fn parse_response(
    raw: &str,
    request: &str,
    pid: u8,
) -> std::result::Result<Vec<u8>, DeviceError> {
    let header = format!("{:02X}{pid:02X}", MODE_CURRENT_DATA + 0x40);
    let protocol_error = || DeviceError::Protocol {
        command: request.to_string(),
        response: raw.trim().to_string(),
    };

    for line in raw.split(['\r', '\n']) {
        let compact: String = line
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        if compact.is_empty()
            || compact == request
            || compact.starts_with("SEARCHING")
            || compact.starts_with("BUSINIT:...OK")
        {
            continue;
        }
        if compact.contains("NODATA") {
            return Err(DeviceError::NoData(request.to_string()));
        }
        if compact == "?"
            || compact.contains("UNABLETOCONNECT")
            || compact.contains("ERROR")
            || compact.contains("STOPPED")
        {
            return Err(protocol_error());
        }
        if let Some(payload) = compact.strip_prefix(&header) {
            return hex::decode(payload).map_err(|_| protocol_error());
        }
    }

    Err(protocol_error())
}
