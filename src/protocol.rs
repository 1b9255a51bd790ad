use std::collections::HashMap;
use std::sync::LazyLock;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Known spectrometer protocol endpoints.
///
/// Every addressable characteristic the peripheral exposes, keyed by its
/// semantic role. The set is fixed at compile time; an unknown role cannot be
/// expressed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum EndpointId {
    #[strum(to_string = "manufacturer_name")]
    ManufacturerName,
    #[strum(to_string = "model_number")]
    ModelNumber,
    #[strum(to_string = "serial_number")]
    SerialNumber,
    #[strum(to_string = "hardware_revision")]
    HardwareRevision,
    #[strum(to_string = "firmware_revision")]
    FirmwareRevision,
    #[strum(to_string = "spectrum_revision")]
    SpectrumRevision,
    #[strum(to_string = "battery_level")]
    BatteryLevel,
    #[strum(to_string = "temperature")]
    Temperature,
    #[strum(to_string = "humidity")]
    Humidity,
    #[strum(to_string = "device_status")]
    DeviceStatus,
    #[strum(to_string = "error_status")]
    ErrorStatus,
    #[strum(to_string = "temperature_threshold")]
    TemperatureThreshold,
    #[strum(to_string = "humidity_threshold")]
    HumidityThreshold,
    #[strum(to_string = "current_time")]
    CurrentTime,
    #[strum(to_string = "ref_cal_coefficients_request")]
    RefCalCoefficientsRequest,
    #[strum(to_string = "ref_cal_coefficients_return")]
    RefCalCoefficientsReturn,
    #[strum(to_string = "ref_cal_matrix_request")]
    RefCalMatrixRequest,
    #[strum(to_string = "ref_cal_matrix_return")]
    RefCalMatrixReturn,
    #[strum(to_string = "stored_conf_count")]
    StoredConfCount,
    #[strum(to_string = "stored_conf_list_request")]
    StoredConfListRequest,
    #[strum(to_string = "stored_conf_list_return")]
    StoredConfListReturn,
    #[strum(to_string = "scan_conf_data_request")]
    ScanConfDataRequest,
    #[strum(to_string = "scan_conf_data_return")]
    ScanConfDataReturn,
    #[strum(to_string = "active_scan_conf")]
    ActiveScanConf,
    #[strum(to_string = "start_scan")]
    StartScan,
    #[strum(to_string = "scan_name_request")]
    ScanNameRequest,
    #[strum(to_string = "scan_name_return")]
    ScanNameReturn,
    #[strum(to_string = "scan_type_request")]
    ScanTypeRequest,
    #[strum(to_string = "scan_type_return")]
    ScanTypeReturn,
    #[strum(to_string = "scan_date_request")]
    ScanDateRequest,
    #[strum(to_string = "scan_date_return")]
    ScanDateReturn,
    #[strum(to_string = "packet_format_version_request")]
    PacketFormatVersionRequest,
    #[strum(to_string = "packet_format_version_return")]
    PacketFormatVersionReturn,
    #[strum(to_string = "serialized_scan_data_request")]
    SerializedScanDataRequest,
    #[strum(to_string = "serialized_scan_data_return")]
    SerializedScanDataReturn,
    #[strum(to_string = "stored_scan_count")]
    StoredScanCount,
    #[strum(to_string = "sd_scan_indices_request")]
    SdScanIndicesRequest,
    #[strum(to_string = "sd_scan_indices_return")]
    SdScanIndicesReturn,
    #[strum(to_string = "scan_name_stub")]
    ScanNameStub,
    #[strum(to_string = "delete_scan")]
    DeleteScan,
}

/// Operations an endpoint supports.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
}

impl Capabilities {
    const READ: Self = Self {
        read: true,
        write: false,
        notify: false,
    };
    const WRITE: Self = Self {
        read: false,
        write: true,
        notify: false,
    };
    const NOTIFY: Self = Self {
        read: false,
        write: false,
        notify: true,
    };
    const READ_WRITE: Self = Self {
        read: true,
        write: true,
        notify: false,
    };
    const WRITE_NOTIFY: Self = Self {
        read: false,
        write: true,
        notify: true,
    };
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    service_uuid: &'static str,
    uuid: &'static str,
    capabilities: Capabilities,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// UUID of the GATT service holding the characteristic.
    pub(crate) fn service_uuid(self) -> &'static str {
        self.service_uuid
    }

    /// Characteristic UUID.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }

    /// Supported operations.
    pub(crate) fn capabilities(self) -> Capabilities {
        self.capabilities
    }
}

const DEVICE_INFO_SERVICE_UUID: &str = "0000180a-0000-1000-8000-00805f9b34fb";
const BATTERY_SERVICE_UUID: &str = "0000180f-0000-1000-8000-00805f9b34fb";
const GENERAL_INFO_SERVICE_UUID: &str = "5be10000-a5f6-44a1-9aeb-3d40d6e614ae";
const TIME_SERVICE_UUID: &str = "5be20000-a5f6-44a1-9aeb-3d40d6e614ae";
const CALIBRATION_SERVICE_UUID: &str = "5be30000-a5f6-44a1-9aeb-3d40d6e614ae";
const SCAN_CONF_SERVICE_UUID: &str = "5be40000-a5f6-44a1-9aeb-3d40d6e614ae";
const SCAN_DATA_SERVICE_UUID: &str = "5be50000-a5f6-44a1-9aeb-3d40d6e614ae";

/// Subscription order for the post-discovery notification cascade.
///
/// Each subscription is issued only after the previous subscribe-ack arrives;
/// the session becomes ready after the last one. The order matches the
/// device firmware's expectations and must not be reshuffled.
pub(crate) const NOTIFICATION_CASCADE: [EndpointId; 12] = [
    EndpointId::RefCalCoefficientsReturn,
    EndpointId::RefCalMatrixReturn,
    EndpointId::StartScan,
    EndpointId::ScanNameReturn,
    EndpointId::ScanTypeReturn,
    EndpointId::ScanDateReturn,
    EndpointId::PacketFormatVersionReturn,
    EndpointId::SerializedScanDataReturn,
    EndpointId::StoredConfListReturn,
    EndpointId::SdScanIndicesReturn,
    EndpointId::DeleteScan,
    EndpointId::ScanConfDataReturn,
];

/// Endpoint metadata keyed by typed endpoint IDs.
pub(crate) static ENDPOINTS_BY_ID: LazyLock<HashMap<EndpointId, EndpointMetadata>> =
    LazyLock::new(|| {
        EndpointId::iter()
            .map(|endpoint| (endpoint, metadata_for(endpoint)))
            .collect()
    });

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    *ENDPOINTS_BY_ID
        .get(&endpoint)
        .unwrap_or(&metadata_for(endpoint))
}

/// Supported operations for one endpoint.
#[must_use]
pub fn capabilities(endpoint: EndpointId) -> Capabilities {
    endpoint_metadata(endpoint).capabilities()
}

/// Returns all known endpoints.
pub(crate) fn known_endpoints() -> impl Iterator<Item = EndpointId> {
    EndpointId::iter()
}

/// Resolves a characteristic UUID back to its endpoint, if known.
pub(crate) fn endpoint_for_uuid(uuid: &str) -> Option<EndpointId> {
    known_endpoints().find(|endpoint| endpoint_metadata(*endpoint).uuid().eq_ignore_ascii_case(uuid))
}

fn metadata_for(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::ManufacturerName => EndpointMetadata {
            name: "manufacturer name",
            service_uuid: DEVICE_INFO_SERVICE_UUID,
            uuid: "00002a29-0000-1000-8000-00805f9b34fb",
            capabilities: Capabilities::READ,
        },
        EndpointId::ModelNumber => EndpointMetadata {
            name: "model number",
            service_uuid: DEVICE_INFO_SERVICE_UUID,
            uuid: "00002a24-0000-1000-8000-00805f9b34fb",
            capabilities: Capabilities::READ,
        },
        EndpointId::SerialNumber => EndpointMetadata {
            name: "serial number",
            service_uuid: DEVICE_INFO_SERVICE_UUID,
            uuid: "00002a25-0000-1000-8000-00805f9b34fb",
            capabilities: Capabilities::READ,
        },
        EndpointId::HardwareRevision => EndpointMetadata {
            name: "hardware revision",
            service_uuid: DEVICE_INFO_SERVICE_UUID,
            uuid: "00002a27-0000-1000-8000-00805f9b34fb",
            capabilities: Capabilities::READ,
        },
        EndpointId::FirmwareRevision => EndpointMetadata {
            name: "firmware revision",
            service_uuid: DEVICE_INFO_SERVICE_UUID,
            uuid: "00002a26-0000-1000-8000-00805f9b34fb",
            capabilities: Capabilities::READ,
        },
        EndpointId::SpectrumRevision => EndpointMetadata {
            name: "spectrum library revision",
            service_uuid: DEVICE_INFO_SERVICE_UUID,
            uuid: "00002a28-0000-1000-8000-00805f9b34fb",
            capabilities: Capabilities::READ,
        },
        EndpointId::BatteryLevel => EndpointMetadata {
            name: "battery level",
            service_uuid: BATTERY_SERVICE_UUID,
            uuid: "00002a19-0000-1000-8000-00805f9b34fb",
            capabilities: Capabilities::READ,
        },
        EndpointId::Temperature => EndpointMetadata {
            name: "temperature measurement",
            service_uuid: GENERAL_INFO_SERVICE_UUID,
            uuid: "5be10001-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::READ,
        },
        EndpointId::Humidity => EndpointMetadata {
            name: "humidity measurement",
            service_uuid: GENERAL_INFO_SERVICE_UUID,
            uuid: "5be10002-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::READ,
        },
        EndpointId::DeviceStatus => EndpointMetadata {
            name: "device status register",
            service_uuid: GENERAL_INFO_SERVICE_UUID,
            uuid: "5be10003-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::READ,
        },
        EndpointId::ErrorStatus => EndpointMetadata {
            name: "error status register",
            service_uuid: GENERAL_INFO_SERVICE_UUID,
            uuid: "5be10004-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::READ,
        },
        EndpointId::TemperatureThreshold => EndpointMetadata {
            name: "temperature alarm threshold",
            service_uuid: GENERAL_INFO_SERVICE_UUID,
            uuid: "5be10005-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::HumidityThreshold => EndpointMetadata {
            name: "humidity alarm threshold",
            service_uuid: GENERAL_INFO_SERVICE_UUID,
            uuid: "5be10006-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::CurrentTime => EndpointMetadata {
            name: "current time",
            service_uuid: TIME_SERVICE_UUID,
            uuid: "5be20001-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::RefCalCoefficientsRequest => EndpointMetadata {
            name: "reference calibration coefficients request",
            service_uuid: CALIBRATION_SERVICE_UUID,
            uuid: "5be30001-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::RefCalCoefficientsReturn => EndpointMetadata {
            name: "reference calibration coefficients stream",
            service_uuid: CALIBRATION_SERVICE_UUID,
            uuid: "5be30002-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::NOTIFY,
        },
        EndpointId::RefCalMatrixRequest => EndpointMetadata {
            name: "reference calibration matrix request",
            service_uuid: CALIBRATION_SERVICE_UUID,
            uuid: "5be30003-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::RefCalMatrixReturn => EndpointMetadata {
            name: "reference calibration matrix stream",
            service_uuid: CALIBRATION_SERVICE_UUID,
            uuid: "5be30004-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::NOTIFY,
        },
        EndpointId::StoredConfCount => EndpointMetadata {
            name: "stored configuration count",
            service_uuid: SCAN_CONF_SERVICE_UUID,
            uuid: "5be40001-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::READ,
        },
        EndpointId::StoredConfListRequest => EndpointMetadata {
            name: "stored configuration list request",
            service_uuid: SCAN_CONF_SERVICE_UUID,
            uuid: "5be40002-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::StoredConfListReturn => EndpointMetadata {
            name: "stored configuration list stream",
            service_uuid: SCAN_CONF_SERVICE_UUID,
            uuid: "5be40003-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::NOTIFY,
        },
        EndpointId::ScanConfDataRequest => EndpointMetadata {
            name: "scan configuration data request",
            service_uuid: SCAN_CONF_SERVICE_UUID,
            uuid: "5be40004-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::ScanConfDataReturn => EndpointMetadata {
            name: "scan configuration data stream",
            service_uuid: SCAN_CONF_SERVICE_UUID,
            uuid: "5be40005-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::NOTIFY,
        },
        EndpointId::ActiveScanConf => EndpointMetadata {
            name: "active scan configuration",
            service_uuid: SCAN_CONF_SERVICE_UUID,
            uuid: "5be40006-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::READ_WRITE,
        },
        EndpointId::StartScan => EndpointMetadata {
            name: "start scan",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be50001-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE_NOTIFY,
        },
        EndpointId::ScanNameRequest => EndpointMetadata {
            name: "scan name request",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be50002-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::ScanNameReturn => EndpointMetadata {
            name: "scan name return",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be50003-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::NOTIFY,
        },
        EndpointId::ScanTypeRequest => EndpointMetadata {
            name: "scan type request",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be50004-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::ScanTypeReturn => EndpointMetadata {
            name: "scan type return",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be50005-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::NOTIFY,
        },
        EndpointId::ScanDateRequest => EndpointMetadata {
            name: "scan date request",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be50006-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::ScanDateReturn => EndpointMetadata {
            name: "scan date return",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be50007-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::NOTIFY,
        },
        EndpointId::PacketFormatVersionRequest => EndpointMetadata {
            name: "packet format version request",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be50008-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::PacketFormatVersionReturn => EndpointMetadata {
            name: "packet format version return",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be50009-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::NOTIFY,
        },
        EndpointId::SerializedScanDataRequest => EndpointMetadata {
            name: "serialized scan data request",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be5000a-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::SerializedScanDataReturn => EndpointMetadata {
            name: "serialized scan data stream",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be5000b-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::NOTIFY,
        },
        EndpointId::StoredScanCount => EndpointMetadata {
            name: "stored scan count",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be5000c-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::READ,
        },
        EndpointId::SdScanIndicesRequest => EndpointMetadata {
            name: "stored scan indices request",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be5000d-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::SdScanIndicesReturn => EndpointMetadata {
            name: "stored scan indices stream",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be5000e-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::NOTIFY,
        },
        EndpointId::ScanNameStub => EndpointMetadata {
            name: "scan name stub",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be5000f-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE,
        },
        EndpointId::DeleteScan => EndpointMetadata {
            name: "delete stored scan",
            service_uuid: SCAN_DATA_SERVICE_UUID,
            uuid: "5be50010-a5f6-44a1-9aeb-3d40d6e614ae",
            capabilities: Capabilities::WRITE_NOTIFY,
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn endpoint_metadata_contains_expected_names() {
        let manufacturer = endpoint_metadata(EndpointId::ManufacturerName);
        assert_eq!("manufacturer name", manufacturer.name());

        let start_scan = endpoint_metadata(EndpointId::StartScan);
        assert_eq!("start scan", start_scan.name());
    }

    #[test]
    fn cascade_endpoints_are_all_notify_capable() {
        for endpoint in NOTIFICATION_CASCADE {
            assert!(
                capabilities(endpoint).notify,
                "{endpoint} must support notifications to appear in the cascade"
            );
        }
    }

    #[test]
    fn cascade_ends_with_scan_conf_data_stream() {
        assert_eq!(
            Some(&EndpointId::ScanConfDataReturn),
            NOTIFICATION_CASCADE.last()
        );
    }

    #[test]
    fn uuids_resolve_back_to_endpoints() {
        for endpoint in known_endpoints() {
            let uuid = endpoint_metadata(endpoint).uuid();
            assert_eq!(Some(endpoint), endpoint_for_uuid(uuid));
            assert_eq!(Some(endpoint), endpoint_for_uuid(&uuid.to_ascii_uppercase()));
        }
    }

    #[test]
    fn uuids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for endpoint in known_endpoints() {
            assert!(
                seen.insert(endpoint_metadata(endpoint).uuid()),
                "duplicate UUID for {endpoint}"
            );
        }
    }
}
