use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::Value;

use nirlink::{Args, OutputFormat, fake_link_client, run};

const FAKE_SCAN: &str = "hci0|AA:BB:CC|NIR-2845|-43";

async fn run_fake_command(extra_args: &[&str]) -> anyhow::Result<Value> {
    let mut argv = vec!["nirlink", "--fake", "--fake-scan", FAKE_SCAN];
    argv.extend_from_slice(extra_args);
    let args = Args::try_parse_from(argv)?;

    let log_level = args.log_level();
    let (command, options, fake_args) = args.into_parts()?;
    let client = fake_link_client(fake_args.expect("fake mode is always on in this harness"));

    let mut out = Vec::new();
    run(
        command,
        options,
        OutputFormat::Json,
        log_level,
        &mut out,
        client,
    )
    .await?;

    Ok(serde_json::from_slice(&out)?)
}

#[tokio::test]
async fn info_command_reports_identity_fields() -> anyhow::Result<()> {
    let report = run_fake_command(&["info"]).await?;

    assert_eq!("device_info", report["result"]);
    assert_eq!("KS Technologies", report["manufacturer_name"]);
    assert_eq!("NIRScanner", report["model_number"]);
    assert_eq!("SN0042", report["serial_number"]);
    Ok(())
}

#[tokio::test]
async fn status_command_decodes_measurements() -> anyhow::Result<()> {
    let report = run_fake_command(&["status"]).await?;

    assert_eq!("status", report["result"]);
    assert_eq!(87, report["battery_percent"]);
    let temperature = report["temperature_celsius"]
        .as_f64()
        .expect("temperature should be numeric");
    assert!((temperature - 23.45).abs() < 0.005);
    Ok(())
}

#[tokio::test]
async fn configurations_command_lists_records_and_active_index() -> anyhow::Result<()> {
    let report = run_fake_command(&["configurations"]).await?;

    assert_eq!("scan_configurations", report["result"]);
    assert_eq!(1, report["active_index"]);
    let configurations = report["configurations"]
        .as_array()
        .expect("configurations should be a list");
    assert_eq!(2, configurations.len());
    assert_eq!("Column 1", configurations[0]["name"]);
    assert_eq!(true, configurations[0]["is_active"]);
    assert_eq!(false, configurations[1]["is_active"]);
    Ok(())
}

#[tokio::test]
async fn stored_command_lists_sd_scans() -> anyhow::Result<()> {
    let report = run_fake_command(&["stored"]).await?;

    assert_eq!("stored_scans", report["result"]);
    let entries = report["entries"]
        .as_array()
        .expect("entries should be a list");
    assert_eq!(2, entries.len());
    assert_eq!("Sample001", entries[0]["name"]);
    assert_eq!("11000001", entries[0]["index"]);
    Ok(())
}

#[tokio::test]
async fn scan_command_downloads_a_result() -> anyhow::Result<()> {
    let report = run_fake_command(&["scan", "--sd"]).await?;

    assert_eq!("scan", report["result"]);
    assert_eq!("Scan0042", report["name"]);
    let sample_hex = report["sample_data"]
        .as_str()
        .expect("sample data should be hex-encoded");
    assert_eq!(180 * 2, sample_hex.len());
    Ok(())
}

#[tokio::test]
async fn calibrate_flag_fetches_reference_data() -> anyhow::Result<()> {
    let report = run_fake_command(&["scan", "--calibrate"]).await?;

    assert_eq!("calibration", report["result"]);
    let coefficients = report["coefficients"]
        .as_str()
        .expect("coefficients should be hex-encoded");
    assert_eq!(24 * 2, coefficients.len());
    Ok(())
}

#[tokio::test]
async fn set_time_command_completes() -> anyhow::Result<()> {
    let report = run_fake_command(&["set-time"]).await?;
    assert_eq!("time_set", report["result"]);
    Ok(())
}

#[tokio::test]
async fn delete_command_reports_the_removed_index() -> anyhow::Result<()> {
    let report = run_fake_command(&["delete", "11000001"]).await?;

    assert_eq!("scan_deleted", report["result"]);
    assert_eq!("11000001", report["index"]);
    Ok(())
}

#[tokio::test]
async fn unknown_fixture_device_fails_connection() {
    let args = Args::try_parse_from([
        "nirlink",
        "--fake",
        "--fake-scan",
        "hci0|AA:BB:CC|Speaker|-60",
        "info",
    ])
    .expect("valid fake arguments should parse");
    let log_level = args.log_level();
    let (command, options, fake_args) = args.into_parts().expect("arguments should split");
    let client = fake_link_client(fake_args.expect("fake mode is on"));

    let mut out = Vec::new();
    let result = run(
        command,
        options,
        OutputFormat::Json,
        log_level,
        &mut out,
        client,
    )
    .await;

    let error = result.expect_err("no fixture device matches the NIR prefix");
    assert!(error.to_string().contains("NIR"));
}
