//! Fixture-driven fake backend and the scripted transport used by tests.
//!
//! [`FakePeripheral`] answers every endpoint operation from a configurable
//! fixture, which makes the whole engine drivable without hardware.
//! [`ScriptedLink`] records issued operations and completes nothing; tests
//! feed transport events by hand to walk a procedure step by step.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::time::sleep;
use tracing::info;

use super::client::{ConnectTarget, ConnectedLink, FoundDevice, LinkClient};
use super::transport::{OperationStatus, Transport, TransportEvent, TransportIssueError};
use crate::error::{FixtureError, InteractionError};
use crate::model::ScanIndexRef;
use crate::protocol::EndpointId;

/// One operation issued through a [`ScriptedLink`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum IssuedOp {
    DiscoverServices,
    Read(EndpointId),
    Write(EndpointId, Vec<u8>),
    Subscribe(EndpointId),
    DisconnectCleanup,
}

/// Shared view of the operations a [`ScriptedLink`] has issued.
#[derive(Debug, Clone, Default)]
pub struct OpLog(Arc<Mutex<Vec<IssuedOp>>>);

impl OpLog {
    /// Removes and returns everything issued since the last call.
    #[must_use]
    pub fn take(&self) -> Vec<IssuedOp> {
        std::mem::take(&mut self.0.lock().expect("operation log lock"))
    }

    /// Number of operations issued since the last `take`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().expect("operation log lock").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, op: IssuedOp) {
        self.0.lock().expect("operation log lock").push(op);
    }
}

/// Transport that records operations and never completes them on its own.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    log: OpLog,
}

impl ScriptedLink {
    /// Creates a scripted link and the log handle observing it.
    #[must_use]
    pub fn new() -> (Self, OpLog) {
        let log = OpLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl Transport for ScriptedLink {
    fn discover_services(&mut self) -> Result<(), TransportIssueError> {
        self.log.push(IssuedOp::DiscoverServices);
        Ok(())
    }

    fn read(&mut self, endpoint: EndpointId) -> Result<(), TransportIssueError> {
        self.log.push(IssuedOp::Read(endpoint));
        Ok(())
    }

    fn write(&mut self, endpoint: EndpointId, payload: &[u8]) -> Result<(), TransportIssueError> {
        self.log.push(IssuedOp::Write(endpoint, payload.to_vec()));
        Ok(())
    }

    fn subscribe(&mut self, endpoint: EndpointId) -> Result<(), TransportIssueError> {
        self.log.push(IssuedOp::Subscribe(endpoint));
        Ok(())
    }

    fn on_disconnect_cleanup(&mut self) {
        self.log.push(IssuedOp::DisconnectCleanup);
    }
}

/// Parsed fake scan fixture records (`adapter|device_id|local_name|rssi;...`).
#[derive(Debug, Clone, derive_more::Into)]
pub struct ScanFixture {
    devices: Vec<FoundDevice>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// One stored scan pre-loaded into the fake peripheral's SD card.
#[derive(Debug, Clone)]
pub struct FakeStoredScan {
    pub index: ScanIndexRef,
    pub name: String,
    pub date: [u8; 6],
}

/// Behaviour of the fake peripheral, with defaults covering every procedure.
#[derive(Debug, Clone, Builder)]
pub struct PeripheralFixture {
    #[builder(default = default_identity())]
    identity: [String; 6],
    #[builder(default = 87)]
    battery_percent: u8,
    #[builder(default = 2345)]
    temperature_centi: i16,
    #[builder(default = 4120)]
    humidity_centi: i16,
    #[builder(default = vec![0x00, 0x00, 0x00, 0x04])]
    device_status: Vec<u8>,
    #[builder(default = vec![0x00, 0x00, 0x00, 0x00])]
    error_status: Vec<u8>,
    /// Packed configuration records dispensed in order of request.
    #[builder(default = default_configurations())]
    configurations: Vec<Vec<u8>>,
    #[builder(default = 1)]
    active_index: u8,
    #[builder(default = default_stored_scans())]
    stored_scans: Vec<FakeStoredScan>,
    #[builder(default = (0xA0..0xB8).collect())]
    calibration_coefficients: Vec<u8>,
    #[builder(default = (0x10..0x40).collect())]
    calibration_matrix: Vec<u8>,
    #[builder(default = ScanIndexRef::new([0x01, 0x02, 0x03, 0x04]))]
    new_scan_index: ScanIndexRef,
    #[builder(default = "Scan0042".to_string())]
    new_scan_name: String,
    #[builder(default = vec![0x00])]
    new_scan_type: Vec<u8>,
    #[builder(default = [26, 2, 15, 21, 4, 5])]
    new_scan_date: [u8; 6],
    #[builder(default = vec![0x02])]
    packet_format_version: Vec<u8>,
    #[builder(default = (0u8..=179).collect())]
    scan_sample_data: Vec<u8>,
}

fn default_identity() -> [String; 6] {
    [
        "KS Technologies".to_string(),
        "NIRScanner".to_string(),
        "SN0042".to_string(),
        "A1".to_string(),
        "2.1.0".to_string(),
        "2.0.14".to_string(),
    ]
}

fn default_configurations() -> Vec<Vec<u8>> {
    vec![
        packed_configuration(0, 1, "Column 1"),
        packed_configuration(0, 2, "Column 2"),
    ]
}

fn default_stored_scans() -> Vec<FakeStoredScan> {
    vec![
        FakeStoredScan {
            index: ScanIndexRef::new([0x11, 0x00, 0x00, 0x01]),
            name: "Sample001".to_string(),
            date: [26, 1, 30, 9, 15, 0],
        },
        FakeStoredScan {
            index: ScanIndexRef::new([0x12, 0x00, 0x00, 0x01]),
            name: "Sample002".to_string(),
            date: [26, 2, 2, 14, 20, 30],
        },
    ]
}

/// Builds a packed configuration record the way the device lays one out.
#[must_use]
pub fn packed_configuration(scan_type: u8, index: u16, name: &str) -> Vec<u8> {
    let mut record = Vec::with_capacity(64);
    record.push(scan_type);
    record.extend_from_slice(&index.to_le_bytes());
    record.extend_from_slice(b"SN0042\x00\x00");
    let mut name_field = [0u8; 40];
    let len = name.len().min(40);
    name_field[..len].copy_from_slice(&name.as_bytes()[..len]);
    record.extend_from_slice(&name_field);
    record.extend_from_slice(&900u32.to_le_bytes());
    record.extend_from_slice(&1700u32.to_le_bytes());
    record.push(6);
    record.extend_from_slice(&228u16.to_le_bytes());
    record.extend_from_slice(&6u16.to_le_bytes());
    record
}

/// Settings for constructing a fake backend.
#[derive(Debug, Builder)]
pub struct FakeBackendConfig {
    pub(crate) scan_fixture: ScanFixture,
    #[builder(default = PeripheralFixture::builder().build())]
    pub(crate) peripheral: PeripheralFixture,
    #[builder(default)]
    pub(crate) discovery_delay: Duration,
}

/// Fake link client used in tests and non-hardware environments.
pub(crate) struct FakeLinkClient {
    config: FakeBackendConfig,
}

impl FakeLinkClient {
    pub(crate) fn new(config: FakeBackendConfig) -> Self {
        info!("using fake BLE backend");
        Self { config }
    }
}

#[async_trait]
impl LinkClient for FakeLinkClient {
    async fn connect(
        self: Box<Self>,
        target: &ConnectTarget,
    ) -> Result<ConnectedLink, InteractionError> {
        let FakeBackendConfig {
            scan_fixture,
            peripheral,
            discovery_delay,
        } = self.config;

        if !discovery_delay.is_zero() {
            sleep(discovery_delay).await;
        }

        let devices: Vec<FoundDevice> = scan_fixture.into();
        let device = devices
            .into_iter()
            .find(|device| match &target.address {
                Some(address) => device.device_id() == address,
                None => device.local_name_starts_with(&target.name_prefix),
            })
            .ok_or_else(|| InteractionError::NoMatchingFixtureDevice {
                prefix: target.name_prefix.clone(),
            })?;

        let (events_tx, events_rx) = unbounded_channel();
        events_tx
            .send(TransportEvent::LinkUp)
            .expect("event receiver is held by the caller");

        Ok(ConnectedLink {
            device,
            transport: Box::new(FakePeripheral::new(peripheral, events_tx)),
            events: events_rx,
        })
    }
}

/// Maximum payload bytes per fake notification packet, marker included.
const FAKE_PACKET_LEN: usize = 20;

/// Transport that answers every operation from its fixture.
pub struct FakePeripheral {
    fixture: PeripheralFixture,
    events: UnboundedSender<TransportEvent>,
    next_configuration: usize,
    active_index: u8,
}

impl FakePeripheral {
    pub(crate) fn new(fixture: PeripheralFixture, events: UnboundedSender<TransportEvent>) -> Self {
        let active_index = fixture.active_index;
        Self {
            fixture,
            events,
            next_configuration: 0,
            active_index,
        }
    }

    fn send(&self, event: TransportEvent) {
        // The receiver lives as long as the driver loop; drops only at teardown.
        let _ = self.events.send(event);
    }

    fn notify(&self, endpoint: EndpointId, payload: Vec<u8>) {
        self.send(TransportEvent::Notification { endpoint, payload });
    }

    /// Emits a header packet then continuation packets for one payload.
    fn notify_chunked(&self, endpoint: EndpointId, payload: &[u8]) {
        let size = u16::try_from(payload.len()).expect("fixture payloads stay under 64 KiB");
        let size_bytes = size.to_le_bytes();
        self.notify(endpoint, vec![0x00, size_bytes[0], size_bytes[1]]);

        for (sequence, chunk) in payload.chunks(FAKE_PACKET_LEN - 1).enumerate() {
            let mut packet = Vec::with_capacity(chunk.len() + 1);
            packet.push((sequence as u8).wrapping_add(1).max(1));
            packet.extend_from_slice(chunk);
            self.notify(endpoint, packet);
        }
    }

    fn read_value(&self, endpoint: EndpointId) -> Vec<u8> {
        let fixture = &self.fixture;
        match endpoint {
            EndpointId::ManufacturerName => fixture.identity[0].clone().into_bytes(),
            EndpointId::ModelNumber => fixture.identity[1].clone().into_bytes(),
            EndpointId::SerialNumber => fixture.identity[2].clone().into_bytes(),
            EndpointId::HardwareRevision => fixture.identity[3].clone().into_bytes(),
            EndpointId::FirmwareRevision => fixture.identity[4].clone().into_bytes(),
            EndpointId::SpectrumRevision => fixture.identity[5].clone().into_bytes(),
            EndpointId::BatteryLevel => vec![fixture.battery_percent],
            EndpointId::Temperature => fixture.temperature_centi.to_le_bytes().to_vec(),
            EndpointId::Humidity => fixture.humidity_centi.to_le_bytes().to_vec(),
            EndpointId::DeviceStatus => fixture.device_status.clone(),
            EndpointId::ErrorStatus => fixture.error_status.clone(),
            EndpointId::StoredConfCount => {
                let count = fixture.configurations.len() as u16;
                count.to_le_bytes().to_vec()
            }
            EndpointId::StoredScanCount => {
                let count = fixture.stored_scans.len() as u16;
                count.to_le_bytes().to_vec()
            }
            EndpointId::ActiveScanConf => vec![self.active_index, 0x00],
            _ => Vec::new(),
        }
    }

    /// List records for the configuration enumeration: a terminator first,
    /// then the driver record carrying the index table, then filler records
    /// up to the declared count.
    fn emit_configuration_list(&self) {
        let count = self.fixture.configurations.len();
        if count == 0 {
            return;
        }

        self.notify(EndpointId::StoredConfListReturn, vec![0xEE]);

        let mut driver = Vec::with_capacity(count + 4);
        driver.push(count as u8);
        let first_index = self
            .fixture
            .configurations
            .first()
            .map(|record| [record[1], record[2]])
            .unwrap_or_default();
        driver.extend_from_slice(&first_index);
        // Trailing table bytes; the engine walks them with its position
        // counter, the fake dispenses records sequentially regardless.
        driver.extend(std::iter::repeat_n(0x00, count + 2));
        self.notify(EndpointId::StoredConfListReturn, driver);

        for _ in 2..count {
            self.notify(EndpointId::StoredConfListReturn, vec![0xEE]);
        }
    }

    fn emit_stored_scan_indices(&self) {
        let mut packet = Vec::new();
        for scan in &self.fixture.stored_scans {
            packet.extend_from_slice(scan.index.as_bytes());
        }
        if !packet.is_empty() {
            self.notify(EndpointId::SdScanIndicesReturn, packet);
        }
    }

    fn stored_scan_for(&self, index: &[u8]) -> Option<&FakeStoredScan> {
        self.fixture
            .stored_scans
            .iter()
            .find(|scan| scan.index.as_bytes().as_slice() == index)
    }

    fn react_to_write(&mut self, endpoint: EndpointId, payload: &[u8]) {
        match endpoint {
            EndpointId::StoredConfListRequest => {
                self.next_configuration = 0;
                self.emit_configuration_list();
            }
            EndpointId::ScanConfDataRequest => {
                let record = self
                    .fixture
                    .configurations
                    .get(self.next_configuration)
                    .or_else(|| self.fixture.configurations.last())
                    .cloned()
                    .unwrap_or_default();
                self.next_configuration += 1;
                self.notify_chunked(EndpointId::ScanConfDataReturn, &record);
            }
            EndpointId::ActiveScanConf => {
                if let Some(&index) = payload.first() {
                    self.active_index = index;
                }
            }
            EndpointId::SdScanIndicesRequest => self.emit_stored_scan_indices(),
            EndpointId::StartScan => {
                let index = self.fixture.new_scan_index;
                let mut payload = vec![0xFF];
                payload.extend_from_slice(index.as_bytes());
                self.notify(EndpointId::StartScan, payload);
            }
            EndpointId::ScanNameRequest => {
                let name = match self.stored_scan_for(payload) {
                    Some(scan) => scan.name.clone().into_bytes(),
                    None => self.fixture.new_scan_name.clone().into_bytes(),
                };
                self.notify(EndpointId::ScanNameReturn, name);
            }
            EndpointId::ScanTypeRequest => {
                self.notify(EndpointId::ScanTypeReturn, self.fixture.new_scan_type.clone());
            }
            EndpointId::ScanDateRequest => {
                let date = match self.stored_scan_for(payload) {
                    Some(scan) => scan.date.to_vec(),
                    None => self.fixture.new_scan_date.to_vec(),
                };
                self.notify(EndpointId::ScanDateReturn, date);
            }
            EndpointId::PacketFormatVersionRequest => {
                self.notify(
                    EndpointId::PacketFormatVersionReturn,
                    self.fixture.packet_format_version.clone(),
                );
            }
            EndpointId::SerializedScanDataRequest => {
                let data = self.fixture.scan_sample_data.clone();
                self.notify_chunked(EndpointId::SerializedScanDataReturn, &data);
            }
            EndpointId::RefCalCoefficientsRequest => {
                let data = self.fixture.calibration_coefficients.clone();
                self.notify_chunked(EndpointId::RefCalCoefficientsReturn, &data);
            }
            EndpointId::RefCalMatrixRequest => {
                let data = self.fixture.calibration_matrix.clone();
                self.notify_chunked(EndpointId::RefCalMatrixReturn, &data);
            }
            EndpointId::DeleteScan => {
                self.fixture
                    .stored_scans
                    .retain(|scan| scan.index.as_bytes().as_slice() != payload);
            }
            _ => {}
        }
    }
}

impl Transport for FakePeripheral {
    fn discover_services(&mut self) -> Result<(), TransportIssueError> {
        self.send(TransportEvent::ServicesDiscovered { ok: true });
        Ok(())
    }

    fn read(&mut self, endpoint: EndpointId) -> Result<(), TransportIssueError> {
        let value = self.read_value(endpoint);
        self.send(TransportEvent::ReadComplete {
            endpoint,
            status: OperationStatus::Success,
            value,
        });
        Ok(())
    }

    fn write(&mut self, endpoint: EndpointId, payload: &[u8]) -> Result<(), TransportIssueError> {
        self.send(TransportEvent::WriteComplete {
            endpoint,
            status: OperationStatus::Success,
        });
        self.react_to_write(endpoint, payload);
        Ok(())
    }

    fn subscribe(&mut self, endpoint: EndpointId) -> Result<(), TransportIssueError> {
        self.send(TransportEvent::SubscribeComplete {
            endpoint,
            status: OperationStatus::Success,
        });
        Ok(())
    }
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<FoundDevice>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

fn parse_scan_record(raw_record: &str) -> Result<FoundDevice, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(FixtureError::InvalidRecordFieldCount);
    }
    if fields.iter().any(|field| field.is_empty()) {
        return Err(FixtureError::EmptyRecordField);
    }

    let local_name = if fields[2] == "-" {
        None
    } else {
        Some(fields[2].to_string())
    };
    let rssi = if fields[3] == "-" {
        None
    } else {
        Some(fields[3].parse::<i16>()?)
    };

    Ok(FoundDevice::new(
        fields[0].to_string(),
        fields[1].to_string(),
        local_name,
        rssi,
    ))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("hci0|AA:BB|NIR-2845|-43", 1)]
    #[case("hci0|AA:BB|NIR-2845|-43;hci1|CC:DD|Speaker|-55", 2)]
    fn parse_scan_fixture_parses_records(#[case] fixture: &str, #[case] expected_count: usize) {
        let devices = parse_scan_fixture(fixture).expect("fixture should parse");
        assert_eq!(expected_count, devices.len());
    }

    #[test]
    fn parse_scan_fixture_rejects_invalid_field_count() {
        let result = parse_scan_fixture("hci0|AA:BB|NIR-2845");
        assert_matches!(result, Err(FixtureError::InvalidRecordFieldCount));
    }

    #[test]
    fn scripted_link_records_operations_in_order() {
        let (mut link, log) = ScriptedLink::new();
        link.read(EndpointId::BatteryLevel)
            .expect("scripted reads always issue");
        link.write(EndpointId::StartScan, &[0x01])
            .expect("scripted writes always issue");

        assert_eq!(
            vec![
                IssuedOp::Read(EndpointId::BatteryLevel),
                IssuedOp::Write(EndpointId::StartScan, vec![0x01]),
            ],
            log.take()
        );
        assert!(log.is_empty());
    }

    #[test]
    fn fake_peripheral_chunks_payloads_with_header() {
        let (events_tx, mut events_rx) = unbounded_channel();
        let fixture = PeripheralFixture::builder().build();
        let peripheral = FakePeripheral::new(fixture, events_tx);

        peripheral.notify_chunked(EndpointId::SerializedScanDataReturn, &[0xAB; 25]);

        let header = events_rx.try_recv().expect("header packet");
        assert_eq!(
            TransportEvent::Notification {
                endpoint: EndpointId::SerializedScanDataReturn,
                payload: vec![0x00, 25, 0x00],
            },
            header
        );
        let first = events_rx.try_recv().expect("first continuation");
        let TransportEvent::Notification { payload, .. } = first else {
            panic!("expected a notification");
        };
        assert_eq!(20, payload.len());
        assert_ne!(0x00, payload[0]);
    }
}
