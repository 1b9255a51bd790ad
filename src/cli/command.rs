use std::time::Duration;

use bon::Builder;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::error::{CliConfigError, FixtureError};
use crate::hw::{ConnectTarget, FakeBackendConfig, PeripheralFixture, ScanFixture};
use crate::model::ScanIndexRef;
use crate::prefs::DEFAULT_DEVICE_PREFIX;

/// Command-line options for the spectrometer tool.
#[derive(Debug, Parser)]
#[command(name = "nirlink", about = "Interact with a BLE NIR spectrometer.")]
pub struct Args {
    /// Telemetry log level override.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output rendering; defaults to pretty on a terminal, JSON otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// BLE local-name prefix used during discovery.
    #[arg(long, global = true, default_value = DEFAULT_DEVICE_PREFIX)]
    device_prefix: String,
    /// Exact device address; skips discovery by prefix.
    #[arg(long, global = true)]
    address: Option<String>,
    /// Abort a stalled protocol step after this long (e.g. `5s`, `500ms`).
    #[arg(long, global = true, value_parser = parse_duration)]
    step_timeout: Option<Duration>,
    /// Uses the fake BLE backend with fixture-driven discovery and payloads.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `adapter|device_id|local_name|rssi;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Artificial fake discovery delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Splits parsed CLI arguments into command, run options, and optional
    /// fake-client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_parts(self) -> anyhow::Result<(Command, RunOptions, Option<FakeArgs>)> {
        let Args {
            log_level: _,
            output: _,
            device_prefix,
            address,
            step_timeout,
            fake,
            fake_scan,
            fake_discovery_delay,
            command,
        } = self;

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
            })
        } else {
            None
        };

        let options = RunOptions {
            target: ConnectTarget {
                name_prefix: device_prefix,
                address,
            },
            step_timeout,
        };
        Ok((command, options, fake_args))
    }
}

/// Session-level options resolved from CLI flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub target: ConnectTarget,
    pub step_timeout: Option<Duration>,
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    #[builder(default)]
    discovery_delay: Duration,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan_fixture,
            discovery_delay,
        } = self;

        FakeBackendConfig::builder()
            .scan_fixture(scan_fixture)
            .peripheral(PeripheralFixture::builder().build())
            .discovery_delay(discovery_delay)
            .build()
    }
}

/// Supported CLI commands, one per engine intent.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read the six device identity strings.
    Info,
    /// Read battery, temperature, humidity, and the status registers.
    Status,
    /// Enumerate every stored scan configuration and the active one.
    Configurations,
    /// Read the active configuration index.
    Active,
    /// Read the active configuration's full record.
    ActiveData,
    /// Activate the configuration at the given index.
    SetActive(SetActiveArgs),
    /// Run a new scan and download its result.
    Scan(ScanArgs),
    /// List the scans stored on removable media.
    Stored,
    /// Delete one stored scan by its index.
    Delete(DeleteArgs),
    /// Update the temperature and humidity alarm thresholds.
    Thresholds(ThresholdArgs),
    /// Write the current wall-clock time to the device.
    SetTime,
    /// Show or update the persisted user preferences; never connects.
    Prefs(PrefsArgs),
}

/// Arguments for `prefs`.
#[derive(Debug, ClapArgs)]
pub struct PrefsArgs {
    /// New scan-name prefix.
    #[arg(long)]
    pub name_prefix: Option<String>,
    /// Whether new scans are kept on removable media by default.
    #[arg(long)]
    pub save_sd: Option<bool>,
    /// Render temperatures in Fahrenheit.
    #[arg(long)]
    pub fahrenheit: Option<bool>,
    /// Device address to reconnect to without discovery.
    #[arg(long)]
    pub device: Option<String>,
}

/// Arguments for `set-active`.
#[derive(Debug, ClapArgs)]
pub struct SetActiveArgs {
    /// Configuration index to activate.
    pub index: u8,
}

/// Arguments for `scan`.
#[derive(Debug, ClapArgs)]
pub struct ScanArgs {
    /// Keep a copy of the scan on the peripheral's removable media.
    #[arg(long)]
    pub sd: bool,
    /// Fetch the reference calibration streams instead of scanning.
    #[arg(long)]
    pub calibrate: bool,
    /// Scan-name prefix override for this run.
    #[arg(long)]
    pub prefix: Option<String>,
}

/// Arguments for `delete`.
#[derive(Debug, ClapArgs)]
pub struct DeleteArgs {
    /// Scan index as eight hexadecimal digits, as listed by `stored`.
    #[arg(value_parser = parse_scan_index)]
    pub index: ScanIndexRef,
}

/// Arguments for `thresholds`.
#[derive(Debug, ClapArgs)]
pub struct ThresholdArgs {
    /// Temperature alarm threshold in °C; omitted means 0.00.
    #[arg(long)]
    pub temperature: Option<f32>,
    /// Humidity alarm threshold in %RH; omitted means 0.00.
    #[arg(long)]
    pub humidity: Option<f32>,
}

/// Telemetry log level selection.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output rendering selection.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

fn parse_scan_index(value: &str) -> Result<ScanIndexRef, String> {
    let cleaned = value.trim();
    if cleaned.len() != 8 || !cleaned.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CliConfigError::InvalidScanIndex.to_string());
    }
    let mut bytes = [0u8; 4];
    for (slot, pair) in bytes.iter_mut().zip(cleaned.as_bytes().chunks_exact(2)) {
        let text = std::str::from_utf8(pair).expect("hex digits are ASCII");
        *slot = u8::from_str_radix(text, 16).expect("both bytes are hex digits");
    }
    Ok(ScanIndexRef::new(bytes))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fake_mode_requires_scan_fixture() {
        let result = Args::try_parse_from(["nirlink", "--fake", "info"]);

        let error = result.expect_err("missing --fake-scan should fail argument parsing");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_scan_requires_fake_mode() {
        let result =
            Args::try_parse_from(["nirlink", "--fake-scan", "hci0|AA:BB|NIR-2845|-43", "info"]);

        let error = result.expect_err("--fake-scan should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_mode_builds_fake_settings() {
        let cli = Args::try_parse_from([
            "nirlink",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB|NIR-2845|-43",
            "status",
        ])
        .expect("valid fake arguments should parse");

        let (command, _options, fake_args) = cli
            .into_parts()
            .expect("valid fake arguments should resolve fake settings");
        assert_matches!(command, Command::Status);
        assert_matches!(fake_args, Some(_));
    }

    #[test]
    fn delete_parses_hex_index() {
        let cli = Args::try_parse_from(["nirlink", "delete", "0102A3FF"])
            .expect("an 8-digit hex index should parse");
        let (command, _options, _fake) = cli.into_parts().expect("arguments should split");
        assert_matches!(
            command,
            Command::Delete(DeleteArgs { index })
            if index == ScanIndexRef::new([0x01, 0x02, 0xA3, 0xFF])
        );
    }

    #[test]
    fn delete_rejects_malformed_index() {
        let result = Args::try_parse_from(["nirlink", "delete", "12345"]);
        let error = result.expect_err("a short index should fail parsing");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }

    #[test]
    fn step_timeout_parses_human_durations() {
        let cli = Args::try_parse_from(["nirlink", "--step-timeout", "5s", "info"])
            .expect("humantime duration should parse");
        let (_command, options, _fake) = cli.into_parts().expect("arguments should split");
        assert_eq!(Some(Duration::from_secs(5)), options.step_timeout);
    }
}
