use thiserror::Error;

use crate::protocol::{EndpointId, endpoint_metadata};

/// Transport operation classes, used in failure reports.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum EndpointOperation {
    #[display("read")]
    Read,
    #[display("write")]
    Write,
    #[display("subscribe")]
    Subscribe,
}

/// Failures terminal for the active procedure.
///
/// Every variant aborts the procedure that observed it; partial results are
/// never emitted.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EngineError {
    #[error("the peripheral link dropped while a procedure was in flight")]
    Disconnected,
    #[error("{operation} on `{endpoint}` completed with a failure status")]
    TransportOperationFailed {
        endpoint: EndpointId,
        operation: EndpointOperation,
    },
    #[error("protocol violation on `{endpoint}`: {violation}")]
    ProtocolViolation {
        endpoint: EndpointId,
        violation: ProtocolViolation,
    },
    #[error("malformed payload from `{endpoint}`: {detail}")]
    MalformedPayload { endpoint: EndpointId, detail: String },
    #[error("no transport completion arrived within the step timeout")]
    Timeout,
}

impl EngineError {
    pub(crate) fn operation_failed(endpoint: EndpointId, operation: EndpointOperation) -> Self {
        Self::TransportOperationFailed {
            endpoint,
            operation,
        }
    }

    pub(crate) fn violation(endpoint: EndpointId, violation: ProtocolViolation) -> Self {
        Self::ProtocolViolation {
            endpoint,
            violation,
        }
    }

    pub(crate) fn malformed(endpoint: EndpointId, detail: impl Into<String>) -> Self {
        Self::MalformedPayload {
            endpoint,
            detail: detail.into(),
        }
    }
}

/// Framing contract breaches observed on a chunked or list stream.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ProtocolViolation {
    #[error("accumulated {accumulated} bytes but the header declared {expected}")]
    TransferOverflow { expected: usize, accumulated: usize },
    #[error("received {accumulated} list records but the peripheral declared {expected}")]
    ListOverflow { expected: usize, accumulated: usize },
    #[error("continuation packet arrived before a size header")]
    MissingHeader,
    #[error("header packet is too short to carry a payload size")]
    TruncatedHeader,
    #[error("completion arrived for an endpoint the current step does not expect")]
    UnexpectedEndpoint,
}

/// Errors returned by BLE backend operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("no spectrometer matching `{prefix}*` was found")]
    NoMatchingPeripheral { prefix: String },
    #[error("no spectrometer matching `{prefix}*` was found in the fake fixture")]
    NoMatchingFixtureDevice { prefix: String },
    #[error(
        "required endpoint `{name}` ({uuid}) was not found on the connected device",
        name = endpoint_metadata(*endpoint).name(),
        uuid = endpoint_metadata(*endpoint).uuid()
    )]
    MissingEndpoint { endpoint: EndpointId },
    #[error("GATT service enumeration failed")]
    ServiceDiscoveryFailed,
    #[error("the session driver lost its transport event stream")]
    EventStreamClosed,
    #[error("interrupted before the procedure finished")]
    Interrupted,
    #[error("the engine closed its result channel before finishing")]
    ResultChannelClosed,
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when parsing fake interaction fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("hex payload length must be even")]
    InvalidHexLength,
    #[error("hex payload contains invalid byte `{value}`")]
    InvalidHexByte { value: String },
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
    #[error("scan index must be exactly eight hexadecimal digits")]
    InvalidScanIndex,
}

/// Errors returned while loading or storing user preferences.
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("no usable configuration directory was found for this platform")]
    MissingConfigDir,
    #[error("failed while reading or writing the preferences file")]
    Io(#[from] std::io::Error),
    #[error("the preferences file is not valid JSON")]
    Format(#[from] serde_json::Error),
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
