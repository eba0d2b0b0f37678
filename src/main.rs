use anyhow::Result;
use clap::Parser;
use obd_exporter::{
    acquisition::{Acquisition, AcquisitionHandle},
    config::{DeviceKind, LogFormat, Settings},
    device::{elm327::Elm327Connector, simulated::SimulatedConnector, Connector},
    server::{start_server, AppState},
    snapshot::SnapshotStore,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// OBD Exporter - Prometheus metrics exporter for OBD-II sensor readings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Serial device to use
    #[arg(long, value_name = "PATH", env = "OBD_SERIAL_DEVICE")]
    serial_device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(device) = args.serial_device {
        settings = settings.with_device_address(device)?;
    }

    init_logging(&settings.exporter.log_level, settings.exporter.log_format)?;

    info!("Starting OBD Exporter");
    info!("Device: {} ({:?})", settings.device.address, settings.device.kind);
    info!("Listen address: {}", settings.exporter.listen_address);

    let store = SnapshotStore::new();
    let handle = AcquisitionHandle::new()?;
    let state = AppState::new(store.reader(), handle.clone());

    match settings.device.kind {
        DeviceKind::Elm327 => spawn_acquisition(
            Elm327Connector::new(
                settings.device.command_timeout(),
                settings.device.baud_rate,
            ),
            &settings,
            store,
            handle,
        ),
        DeviceKind::Simulated => {
            spawn_acquisition(SimulatedConnector::new(), &settings, store, handle)
        }
    }

    if let Err(e) = start_server(&settings.exporter.listen_address, state).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

fn spawn_acquisition<C>(
    connector: C,
    settings: &Settings,
    store: SnapshotStore,
    handle: AcquisitionHandle,
) where
    C: Connector + 'static,
{
    info!("Starting OBD reading");
    Acquisition::new(connector, &settings.acquisition, store, handle)
        .spawn(settings.device.address.clone());
}

/// Initialize structured logging with tracing.
fn init_logging(log_level: &str, log_format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }

    Ok(())
}
