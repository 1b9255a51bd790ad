//! One explicit state machine per high-level intent.
//!
//! Every procedure turns its intent into a strictly ordered sequence of
//! endpoint operations, advanced one step per transport callback. All of them
//! share the rule that a disconnect fails the procedure immediately with
//! [`EngineError::Disconnected`], regardless of progress; the session
//! sequencer enforces it before events ever reach a procedure.

mod active_config;
mod cascade;
mod device_info;
mod maintenance;
mod run_scan;
mod scan_configs;
mod status;
mod stored_scans;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

pub(crate) use self::active_config::{
    ActiveConfigurationDataProcedure, ActiveConfigurationIndexProcedure,
    SetActiveConfigurationProcedure,
};
pub(crate) use self::cascade::{CascadeProgress, NotificationCascade};
pub(crate) use self::device_info::DeviceInfoProcedure;
pub(crate) use self::maintenance::{
    DeleteScanProcedure, SetTimeProcedure, UpdateThresholdsProcedure,
};
pub(crate) use self::run_scan::RunScanProcedure;
pub(crate) use self::scan_configs::ScanConfigurationsProcedure;
pub(crate) use self::status::StatusProcedure;
pub(crate) use self::stored_scans::StoredScansProcedure;

use crate::error::{EndpointOperation, EngineError, ProtocolViolation};
use crate::hw::{OperationStatus, Transport, TransportEvent};
use crate::model::{
    CalibrationData, DeviceInfo, DeviceStatus, ScanConfiguration, ScanIndexRef, ScanResult,
    StoredScanEntry,
};
use crate::protocol::EndpointId;
use crate::session::{EngineEvent, Intent, IntentKind};

/// Payload written to request endpoints that take no parameters.
pub(crate) const REQUEST_TRIGGER: [u8; 1] = [0x00];

/// Terminal result of one completed procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProcedureResult {
    DeviceInfo(DeviceInfo),
    Status(DeviceStatus),
    ScanConfigurations {
        configurations: Vec<ScanConfiguration>,
        active_index: u8,
    },
    ActiveConfigurationConfirmed {
        index: u8,
    },
    ActiveConfigurationIndex {
        index: u8,
    },
    ActiveConfiguration(ScanConfiguration),
    Calibration(CalibrationData),
    Scan(ScanResult),
    StoredScans {
        entries: Vec<StoredScanEntry>,
    },
    ScanDeleted {
        index: ScanIndexRef,
    },
    ThresholdsUpdated,
    TimeSet,
}

/// Outcome of feeding one transport event to a procedure.
#[derive(Debug)]
pub(crate) enum Step {
    Pending,
    Complete(ProcedureResult),
}

/// Mutable session context handed to a procedure for one step.
pub(crate) struct ProcedureCx<'a> {
    pub(crate) link: &'a mut dyn Transport,
    pub(crate) outward: &'a UnboundedSender<EngineEvent>,
    pub(crate) calibration: &'a mut Option<CalibrationData>,
}

impl ProcedureCx<'_> {
    pub(crate) fn read(&mut self, endpoint: EndpointId) -> Result<(), EngineError> {
        self.link
            .read(endpoint)
            .map_err(|error| EngineError::operation_failed(error.endpoint, error.operation))
    }

    pub(crate) fn write(
        &mut self,
        endpoint: EndpointId,
        payload: &[u8],
    ) -> Result<(), EngineError> {
        self.link
            .write(endpoint, payload)
            .map_err(|error| EngineError::operation_failed(error.endpoint, error.operation))
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        if self.outward.send(event).is_err() {
            trace!("engine event dropped, result channel is closed");
        }
    }
}

/// The single active procedure owned by the session.
#[derive(Debug)]
pub(crate) enum Procedure {
    DeviceInfo(DeviceInfoProcedure),
    Status(StatusProcedure),
    ScanConfigurations(ScanConfigurationsProcedure),
    SetActiveConfiguration(SetActiveConfigurationProcedure),
    ActiveConfigurationIndex(ActiveConfigurationIndexProcedure),
    ActiveConfigurationData(ActiveConfigurationDataProcedure),
    RunScan(RunScanProcedure),
    StoredScans(StoredScansProcedure),
    DeleteScan(DeleteScanProcedure),
    UpdateThresholds(UpdateThresholdsProcedure),
    SetTime(SetTimeProcedure),
}

impl Procedure {
    pub(crate) fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::GetDeviceInfo => Self::DeviceInfo(DeviceInfoProcedure::new()),
            Intent::GetStatus => Self::Status(StatusProcedure::new()),
            Intent::GetScanConfigurations => {
                Self::ScanConfigurations(ScanConfigurationsProcedure::new())
            }
            Intent::SetActiveConfiguration { index } => {
                Self::SetActiveConfiguration(SetActiveConfigurationProcedure::new(index))
            }
            Intent::GetActiveConfigurationIndex => {
                Self::ActiveConfigurationIndex(ActiveConfigurationIndexProcedure::new())
            }
            Intent::GetActiveConfigurationData => {
                Self::ActiveConfigurationData(ActiveConfigurationDataProcedure::new())
            }
            Intent::RunScan(request) => Self::RunScan(RunScanProcedure::new(request)),
            Intent::GetStoredScans => Self::StoredScans(StoredScansProcedure::new()),
            Intent::DeleteScan { index } => Self::DeleteScan(DeleteScanProcedure::new(index)),
            Intent::UpdateThresholds {
                temperature_celsius,
                humidity_percent,
            } => Self::UpdateThresholds(UpdateThresholdsProcedure::new(
                temperature_celsius,
                humidity_percent,
            )),
            Intent::SetTime(request) => Self::SetTime(SetTimeProcedure::new(request)),
        }
    }

    pub(crate) fn kind(&self) -> IntentKind {
        match self {
            Self::DeviceInfo(_) => IntentKind::DeviceInfo,
            Self::Status(_) => IntentKind::Status,
            Self::ScanConfigurations(_) => IntentKind::ScanConfigurations,
            Self::SetActiveConfiguration(_) => IntentKind::SetActiveConfiguration,
            Self::ActiveConfigurationIndex(_) => IntentKind::ActiveConfigurationIndex,
            Self::ActiveConfigurationData(_) => IntentKind::ActiveConfigurationData,
            Self::RunScan(_) => IntentKind::RunScan,
            Self::StoredScans(_) => IntentKind::StoredScans,
            Self::DeleteScan(_) => IntentKind::DeleteScan,
            Self::UpdateThresholds(_) => IntentKind::UpdateThresholds,
            Self::SetTime(_) => IntentKind::SetTime,
        }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        match self {
            Self::DeviceInfo(procedure) => procedure.start(cx),
            Self::Status(procedure) => procedure.start(cx),
            Self::ScanConfigurations(procedure) => procedure.start(cx),
            Self::SetActiveConfiguration(procedure) => procedure.start(cx),
            Self::ActiveConfigurationIndex(procedure) => procedure.start(cx),
            Self::ActiveConfigurationData(procedure) => procedure.start(cx),
            Self::RunScan(procedure) => procedure.start(cx),
            Self::StoredScans(procedure) => procedure.start(cx),
            Self::DeleteScan(procedure) => procedure.start(cx),
            Self::UpdateThresholds(procedure) => procedure.start(cx),
            Self::SetTime(procedure) => procedure.start(cx),
        }
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        match self {
            Self::DeviceInfo(procedure) => procedure.on_event(event, cx),
            Self::Status(procedure) => procedure.on_event(event, cx),
            Self::ScanConfigurations(procedure) => procedure.on_event(event, cx),
            Self::SetActiveConfiguration(procedure) => procedure.on_event(event, cx),
            Self::ActiveConfigurationIndex(procedure) => procedure.on_event(event, cx),
            Self::ActiveConfigurationData(procedure) => procedure.on_event(event, cx),
            Self::RunScan(procedure) => procedure.on_event(event, cx),
            Self::StoredScans(procedure) => procedure.on_event(event, cx),
            Self::DeleteScan(procedure) => procedure.on_event(event, cx),
            Self::UpdateThresholds(procedure) => procedure.on_event(event, cx),
            Self::SetTime(procedure) => procedure.on_event(event, cx),
        }
    }
}

/// Maps a failed completion status to the terminal procedure error.
pub(crate) fn ensure_success(
    status: OperationStatus,
    endpoint: EndpointId,
    operation: EndpointOperation,
) -> Result<(), EngineError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(EngineError::operation_failed(endpoint, operation))
    }
}

/// The endpoint a completion or notification belongs to, if any.
pub(crate) fn event_endpoint(event: &TransportEvent) -> Option<EndpointId> {
    match event {
        TransportEvent::ReadComplete { endpoint, .. }
        | TransportEvent::WriteComplete { endpoint, .. }
        | TransportEvent::SubscribeComplete { endpoint, .. }
        | TransportEvent::Notification { endpoint, .. } => Some(*endpoint),
        TransportEvent::LinkUp
        | TransportEvent::LinkDown
        | TransportEvent::ServicesDiscovered { .. } => None,
    }
}

/// Completion for an endpoint the current step does not expect.
pub(crate) fn unexpected(event: &TransportEvent) -> EngineError {
    match event_endpoint(event) {
        Some(endpoint) => EngineError::violation(endpoint, ProtocolViolation::UnexpectedEndpoint),
        // Link transitions are intercepted by the session and never reach a
        // procedure; a disconnect is the only sane reading if one does.
        None => EngineError::Disconnected,
    }
}
