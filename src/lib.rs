mod app;
mod cli;
mod error;
mod hw;
mod model;
mod prefs;
mod procedures;
mod protocol;
mod session;
mod telemetry;
mod transfer;
mod utils;
mod wire;

pub use app::{fake_link_client, real_link_client, run};
pub use cli::{
    Args, Command, DeleteArgs, FakeArgs, LogLevel, OutputFormat, PrefsArgs, RunOptions, ScanArgs,
    SetActiveArgs, ThresholdArgs,
};
pub use error::{
    EndpointOperation, EngineError, FixtureError, InteractionError, PreferencesError,
    ProtocolViolation,
};
pub use hw::{
    ConnectTarget, ConnectedLink, FakeBackendConfig, FakePeripheral, FakeStoredScan, FoundDevice,
    IssuedOp, LinkClient, OpLog, OperationStatus, PeripheralFixture, ScanFixture, ScriptedLink,
    Transport, TransportEvent, TransportIssueError, packed_configuration,
};
pub use model::{
    CalibrationData, ConfigRecordError, DeviceInfo, DeviceStatus, ScanConfiguration, ScanIndexRef,
    ScanResult, SlewSection, StoredScanEntry,
};
pub use prefs::{DEFAULT_DEVICE_PREFIX, DEFAULT_NAME_PREFIX, Preferences};
pub use procedures::ProcedureResult;
pub use protocol::{Capabilities, EndpointId, capabilities};
pub use session::{
    EngineEvent, Intent, IntentKind, LinkState, ScanRequest, Session, TimeRequest,
};
