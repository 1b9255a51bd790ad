use std::io::{self, IsTerminal};
use std::time::Duration;

use anyhow::Result;
use time::OffsetDateTime;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat, PrefsArgs, RunOptions, render_result};
use crate::error::InteractionError;
use crate::hw::{
    LinkClient, Transport, TransportEvent, fake_link_client as build_fake_link_client,
    real_link_client as build_real_link_client,
};
use crate::prefs::{DEFAULT_NAME_PREFIX, Preferences};
use crate::session::{EngineEvent, Intent, LinkState, ScanRequest, Session, TimeRequest};
use crate::telemetry;

/// Creates a link client backed by the real BLE transport.
#[must_use]
pub fn real_link_client() -> Box<dyn LinkClient> {
    build_real_link_client()
}

/// Creates a link client backed by fake fixtures.
#[must_use]
pub fn fake_link_client(fake_args: FakeArgs) -> Box<dyn LinkClient> {
    build_fake_link_client(fake_args.into_backend_config())
}

/// Runs one CLI command against a connected spectrometer.
///
/// ```
/// # async fn demo() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = nirlink::Args::try_parse_from([
///     "nirlink",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|NIR-2845|-43",
///     "status",
/// ])?;
/// let log_level = args.log_level();
/// let output = args.output_format().unwrap_or(nirlink::OutputFormat::Json);
/// let (command, options, maybe_fake_args) = args.into_parts()?;
/// let client = match maybe_fake_args {
///     Some(fake_args) => nirlink::fake_link_client(fake_args),
///     None => nirlink::real_link_client(),
/// };
/// let mut out = Vec::new();
/// nirlink::run(command, options, output, log_level, &mut out, client).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the connection cannot be
/// established, the procedure fails, or output writing fails.
pub async fn run<W>(
    command: Command,
    options: RunOptions,
    output: OutputFormat,
    log_level: Option<LogLevel>,
    out: &mut W,
    client: Box<dyn LinkClient>,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "nirlink",
        io::stderr().is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    let prefs = match Preferences::load() {
        Ok(prefs) => prefs,
        Err(error) => {
            warn!(%error, "falling back to default preferences");
            Preferences::default()
        }
    };
    let command = match command {
        Command::Prefs(args) => return update_preferences(args, prefs, output, out),
        connected_command => connected_command,
    };
    let intent = intent_for(command, &prefs);

    let mut target = options.target.clone();
    if target.address.is_none() {
        target.address = prefs.preferred_device.clone();
    }

    let connected = client.connect(&target).await?;
    info!(
        device_id = connected.device.device_id(),
        local_name = connected.device.local_name().unwrap_or("-"),
        "connected"
    );

    let (outward_tx, outward_rx) = unbounded_channel();
    let mut session = Session::new(connected.transport, outward_tx);
    session.begin_connect();
    session.submit(intent);

    drive_session(
        session,
        connected.events,
        outward_rx,
        options.step_timeout,
        output,
        &prefs,
        out,
    )
    .await
}

/// Pumps transport events into the session until the intent reports.
///
/// The per-step timeout only arms while a procedure is busy; expiry forces a
/// timeout failure and a session reset.
async fn drive_session<T, W>(
    mut session: Session<T>,
    mut events: UnboundedReceiver<TransportEvent>,
    mut outward: UnboundedReceiver<EngineEvent>,
    step_timeout: Option<Duration>,
    output: OutputFormat,
    prefs: &Preferences,
    out: &mut W,
) -> Result<()>
where
    T: Transport,
    W: io::Write,
{
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    loop {
        let armed_timeout = match session.state() {
            LinkState::Busy => step_timeout,
            _ => None,
        };
        let pumped = tokio::select! {
            () = cancel.cancelled() => return Err(InteractionError::Interrupted.into()),
            pumped = next_event(&mut events, armed_timeout) => pumped,
        };

        match pumped {
            Pump::Event(event) => session.handle_transport_event(event),
            Pump::TimedOut => {
                warn!("no transport completion within the step timeout");
                session.fail_active_on_timeout();
            }
            Pump::Closed => return Err(InteractionError::EventStreamClosed.into()),
        }
        if drain_outward(&mut outward, output, prefs, out)? {
            return Ok(());
        }
    }
}

enum Pump {
    Event(TransportEvent),
    TimedOut,
    Closed,
}

async fn next_event(
    events: &mut UnboundedReceiver<TransportEvent>,
    limit: Option<Duration>,
) -> Pump {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, events.recv()).await {
            Ok(Some(event)) => Pump::Event(event),
            Ok(None) => Pump::Closed,
            Err(_elapsed) => Pump::TimedOut,
        },
        None => match events.recv().await {
            Some(event) => Pump::Event(event),
            None => Pump::Closed,
        },
    }
}

/// Handles queued engine events; returns `true` once the intent finished.
fn drain_outward<W: io::Write>(
    outward: &mut UnboundedReceiver<EngineEvent>,
    output: OutputFormat,
    prefs: &Preferences,
    out: &mut W,
) -> Result<bool> {
    while let Ok(event) = outward.try_recv() {
        match event {
            EngineEvent::SessionReady => debug!("session ready"),
            EngineEvent::SessionDisconnected => warn!("session disconnected"),
            EngineEvent::ConfigurationRetrieved(configuration) => {
                debug!(
                    index = configuration.index,
                    name = %configuration.name,
                    "configuration retrieved"
                );
            }
            EngineEvent::StoredScanIndexed(entry) => {
                debug!(index = %entry.index, name = %entry.name, "stored scan indexed");
            }
            EngineEvent::ProcedureFinished { intent, outcome } => match outcome {
                Ok(result) => {
                    render_result(&result, output, prefs, out)?;
                    return Ok(true);
                }
                Err(error) => {
                    return Err(anyhow::Error::new(error).context(format!("{intent} failed")));
                }
            },
        }
    }
    Ok(false)
}

/// Effective scan-name prefix; an empty preference falls back to the default.
fn effective_prefix(prefs: &Preferences, override_prefix: Option<String>) -> String {
    let prefix = override_prefix.unwrap_or_else(|| prefs.name_prefix.clone());
    if prefix.is_empty() {
        DEFAULT_NAME_PREFIX.to_string()
    } else {
        prefix
    }
}

fn intent_for(command: Command, prefs: &Preferences) -> Intent {
    match command {
        Command::Info => Intent::GetDeviceInfo,
        Command::Status => Intent::GetStatus,
        Command::Configurations => Intent::GetScanConfigurations,
        Command::Active => Intent::GetActiveConfigurationIndex,
        Command::ActiveData => Intent::GetActiveConfigurationData,
        Command::SetActive(args) => Intent::SetActiveConfiguration { index: args.index },
        Command::Scan(args) => Intent::RunScan(ScanRequest {
            save_to_sd: args.sd || prefs.save_to_sd,
            name_prefix: effective_prefix(prefs, args.prefix),
            fetch_calibration: args.calibrate,
            timestamp: OffsetDateTime::now_utc(),
        }),
        Command::Stored => Intent::GetStoredScans,
        Command::Delete(args) => Intent::DeleteScan { index: args.index },
        Command::Thresholds(args) => Intent::UpdateThresholds {
            temperature_celsius: args.temperature.unwrap_or(0.0),
            humidity_percent: args.humidity.unwrap_or(0.0),
        },
        Command::SetTime => Intent::SetTime(TimeRequest {
            timestamp: OffsetDateTime::now_utc(),
            name_prefix: effective_prefix(prefs, None),
        }),
        Command::Prefs(_) => unreachable!("preferences are handled without a connection"),
    }
}

/// Applies `prefs` flag updates, persists them, and reports the result.
fn update_preferences<W: io::Write>(
    args: PrefsArgs,
    mut prefs: Preferences,
    output: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let changed = args.name_prefix.is_some()
        || args.save_sd.is_some()
        || args.fahrenheit.is_some()
        || args.device.is_some();

    if let Some(name_prefix) = args.name_prefix {
        prefs.name_prefix = name_prefix;
    }
    if let Some(save_sd) = args.save_sd {
        prefs.save_to_sd = save_sd;
    }
    if let Some(fahrenheit) = args.fahrenheit {
        prefs.temperature_fahrenheit = fahrenheit;
    }
    if let Some(device) = args.device {
        prefs.preferred_device = Some(device);
    }
    if changed {
        prefs.store()?;
    }

    match output {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &prefs)?;
            writeln!(out)?;
        }
        OutputFormat::Pretty => {
            writeln!(out, "name prefix:   {}", prefs.name_prefix)?;
            writeln!(out, "save to SD:    {}", prefs.save_to_sd)?;
            writeln!(out, "fahrenheit:    {}", prefs.temperature_fahrenheit)?;
            writeln!(
                out,
                "device:        {}",
                prefs.preferred_device.as_deref().unwrap_or("-")
            )?;
        }
    }
    Ok(())
}
