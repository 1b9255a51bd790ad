use std::io;

use owo_colors::OwoColorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::model::{DeviceInfo, DeviceStatus, ScanConfiguration, ScanResult, StoredScanEntry};
use crate::prefs::Preferences;
use crate::procedures::ProcedureResult;

use super::command::OutputFormat;

/// Renders one terminal procedure result to the output stream.
///
/// # Errors
///
/// Returns an error when serialisation or writing fails.
pub(crate) fn render_result<W: io::Write>(
    result: &ProcedureResult,
    format: OutputFormat,
    prefs: &Preferences,
    out: &mut W,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, result)?;
            writeln!(out)?;
        }
        OutputFormat::Pretty => render_pretty(result, prefs, out)?,
    }
    Ok(())
}

fn render_pretty<W: io::Write>(
    result: &ProcedureResult,
    prefs: &Preferences,
    out: &mut W,
) -> anyhow::Result<()> {
    match result {
        ProcedureResult::DeviceInfo(info) => render_device_info(info, out),
        ProcedureResult::Status(status) => render_status(status, prefs, out),
        ProcedureResult::ScanConfigurations {
            configurations,
            active_index,
        } => render_configurations(configurations, *active_index, out),
        ProcedureResult::ActiveConfigurationConfirmed { index } => {
            writeln!(out, "{} configuration {index} is now active", "✓".green())?;
            Ok(())
        }
        ProcedureResult::ActiveConfigurationIndex { index } => {
            writeln!(out, "active configuration index: {index}")?;
            Ok(())
        }
        ProcedureResult::ActiveConfiguration(configuration) => {
            render_configurations(std::slice::from_ref(configuration), configuration.index as u8, out)
        }
        ProcedureResult::Calibration(calibration) => {
            writeln!(
                out,
                "{} calibration captured: {} coefficient bytes, {} matrix bytes",
                "✓".green(),
                calibration.coefficients.len(),
                calibration.matrix.len()
            )?;
            Ok(())
        }
        ProcedureResult::Scan(scan) => render_scan(scan, out),
        ProcedureResult::StoredScans { entries } => render_stored_scans(entries, out),
        ProcedureResult::ScanDeleted { index } => {
            writeln!(out, "{} deleted stored scan {index}", "✓".green())?;
            Ok(())
        }
        ProcedureResult::ThresholdsUpdated => {
            writeln!(out, "{} alarm thresholds updated", "✓".green())?;
            Ok(())
        }
        ProcedureResult::TimeSet => {
            writeln!(out, "{} device clock updated", "✓".green())?;
            Ok(())
        }
    }
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "field")]
    field: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

fn field_table(rows: Vec<FieldRow>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    table.to_string()
}

fn render_device_info<W: io::Write>(info: &DeviceInfo, out: &mut W) -> anyhow::Result<()> {
    let rows = vec![
        FieldRow {
            field: "manufacturer",
            value: info.manufacturer_name.clone(),
        },
        FieldRow {
            field: "model",
            value: info.model_number.clone(),
        },
        FieldRow {
            field: "serial",
            value: info.serial_number.clone(),
        },
        FieldRow {
            field: "hardware rev",
            value: info.hardware_revision.clone(),
        },
        FieldRow {
            field: "firmware rev",
            value: info.firmware_revision.clone(),
        },
        FieldRow {
            field: "spectrum rev",
            value: info.spectrum_revision.clone(),
        },
    ];
    writeln!(out, "{}", field_table(rows))?;
    Ok(())
}

fn render_status<W: io::Write>(
    status: &DeviceStatus,
    prefs: &Preferences,
    out: &mut W,
) -> anyhow::Result<()> {
    let temperature = prefs.display_temperature(status.temperature_celsius);
    let rows = vec![
        FieldRow {
            field: "battery",
            value: format!("{}%", status.battery_percent),
        },
        FieldRow {
            field: "temperature",
            value: format!("{temperature:.2} {}", prefs.temperature_unit()),
        },
        FieldRow {
            field: "humidity",
            value: format!("{:.2} %RH", status.humidity_percent),
        },
        FieldRow {
            field: "device status",
            value: status.device_status_hex(),
        },
        FieldRow {
            field: "error status",
            value: status.error_status_hex(),
        },
    ];
    writeln!(out, "{}", field_table(rows))?;
    Ok(())
}

#[derive(Tabled)]
struct ConfigurationRow {
    #[tabled(rename = "idx")]
    index: u16,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "range (nm)")]
    range: String,
    #[tabled(rename = "patterns")]
    patterns: u16,
    #[tabled(rename = "repeats")]
    repeats: u16,
    #[tabled(rename = "active")]
    active: String,
}

fn render_configurations<W: io::Write>(
    configurations: &[ScanConfiguration],
    active_index: u8,
    out: &mut W,
) -> anyhow::Result<()> {
    let rows: Vec<ConfigurationRow> = configurations
        .iter()
        .map(|configuration| ConfigurationRow {
            index: configuration.index,
            name: configuration.name.clone(),
            range: format!(
                "{}-{}",
                configuration.wavelength_start_nm, configuration.wavelength_end_nm
            ),
            patterns: configuration.num_patterns,
            repeats: configuration.num_repeats,
            active: if configuration.is_active {
                "●".green().to_string()
            } else {
                String::new()
            },
        })
        .collect();
    writeln!(out, "{}", field_table_from(Table::new(rows)))?;
    writeln!(out, "active index: {active_index}")?;
    Ok(())
}

#[derive(Tabled)]
struct StoredScanRow {
    #[tabled(rename = "index")]
    index: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "date")]
    date: String,
}

fn render_stored_scans<W: io::Write>(
    entries: &[StoredScanEntry],
    out: &mut W,
) -> anyhow::Result<()> {
    if entries.is_empty() {
        writeln!(out, "no scans stored on removable media")?;
        return Ok(());
    }
    let rows: Vec<StoredScanRow> = entries
        .iter()
        .map(|entry| StoredScanRow {
            index: entry.index.to_string(),
            name: entry.name.clone(),
            date: entry.date.clone(),
        })
        .collect();
    writeln!(out, "{}", field_table_from(Table::new(rows)))?;
    Ok(())
}

fn render_scan<W: io::Write>(scan: &ScanResult, out: &mut W) -> anyhow::Result<()> {
    let rows = vec![
        FieldRow {
            field: "name",
            value: scan.name.clone(),
        },
        FieldRow {
            field: "type",
            value: scan.scan_type.clone(),
        },
        FieldRow {
            field: "date",
            value: scan.date.clone(),
        },
        FieldRow {
            field: "format version",
            value: scan.packet_format_version.clone(),
        },
        FieldRow {
            field: "sample bytes",
            value: scan.sample_data.len().to_string(),
        },
        FieldRow {
            field: "reference bytes",
            value: format!(
                "{} + {}",
                scan.reference_coefficients.len(),
                scan.reference_matrix.len()
            ),
        },
    ];
    writeln!(out, "{}", field_table(rows))?;
    Ok(())
}

fn field_table_from(mut table: Table) -> String {
    table.with(Style::sharp());
    table.to_string()
}
