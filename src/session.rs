//! Session sequencer: the single-threaded driver of the protocol engine.
//!
//! One session per physical connection. The session owns the transport, the
//! single active procedure, the pending-intent queue, and the one-time
//! notification-subscription cascade. Transport callbacks re-enter through
//! [`Session::handle_transport_event`]; each one advances the engine at most
//! one step. No locking anywhere — the radio stack delivers callbacks
//! strictly sequentially.

use std::collections::VecDeque;

use serde_with::SerializeDisplay;
use strum_macros::Display;
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, trace, warn};

use crate::error::EngineError;
use crate::hw::{Transport, TransportEvent};
use crate::model::{CalibrationData, ScanConfiguration, ScanIndexRef, StoredScanEntry};
use crate::procedures::{
    CascadeProgress, NotificationCascade, Procedure, ProcedureCx, ProcedureResult, Step,
};

/// Parameters for one scan run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    /// Ask the peripheral to keep a copy on removable media.
    pub save_to_sd: bool,
    /// User prefix written (byte-reversed) as the scan-name stub.
    pub name_prefix: String,
    /// Fetch the reference calibration streams instead of scanning; used for
    /// first-time setup against a peripheral.
    pub fetch_calibration: bool,
    /// Wall-clock time written to the device before the stub.
    pub timestamp: OffsetDateTime,
}

/// Parameters for a clock update.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRequest {
    pub timestamp: OffsetDateTime,
    /// Prefix for the stub rewrite the firmware expects after a clock write.
    pub name_prefix: String,
}

/// High-level commands accepted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    GetDeviceInfo,
    GetStatus,
    GetScanConfigurations,
    SetActiveConfiguration { index: u8 },
    GetActiveConfigurationIndex,
    GetActiveConfigurationData,
    RunScan(ScanRequest),
    GetStoredScans,
    DeleteScan { index: ScanIndexRef },
    UpdateThresholds {
        temperature_celsius: f32,
        humidity_percent: f32,
    },
    SetTime(TimeRequest),
}

/// Fieldless intent discriminant used in reports.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, SerializeDisplay)]
pub enum IntentKind {
    #[strum(to_string = "device_info")]
    DeviceInfo,
    #[strum(to_string = "status")]
    Status,
    #[strum(to_string = "scan_configurations")]
    ScanConfigurations,
    #[strum(to_string = "set_active_configuration")]
    SetActiveConfiguration,
    #[strum(to_string = "active_configuration_index")]
    ActiveConfigurationIndex,
    #[strum(to_string = "active_configuration_data")]
    ActiveConfigurationData,
    #[strum(to_string = "run_scan")]
    RunScan,
    #[strum(to_string = "stored_scans")]
    StoredScans,
    #[strum(to_string = "delete_scan")]
    DeleteScan,
    #[strum(to_string = "update_thresholds")]
    UpdateThresholds,
    #[strum(to_string = "set_time")]
    SetTime,
}

impl Intent {
    #[must_use]
    pub fn kind(&self) -> IntentKind {
        match self {
            Self::GetDeviceInfo => IntentKind::DeviceInfo,
            Self::GetStatus => IntentKind::Status,
            Self::GetScanConfigurations => IntentKind::ScanConfigurations,
            Self::SetActiveConfiguration { .. } => IntentKind::SetActiveConfiguration,
            Self::GetActiveConfigurationIndex => IntentKind::ActiveConfigurationIndex,
            Self::GetActiveConfigurationData => IntentKind::ActiveConfigurationData,
            Self::RunScan(_) => IntentKind::RunScan,
            Self::GetStoredScans => IntentKind::StoredScans,
            Self::DeleteScan { .. } => IntentKind::DeleteScan,
            Self::UpdateThresholds { .. } => IntentKind::UpdateThresholds,
            Self::SetTime(_) => IntentKind::SetTime,
        }
    }
}

/// Engine output delivered on the outward result channel.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The notification cascade finished; intents will now be started.
    SessionReady,
    /// The link dropped and the session was reset.
    SessionDisconnected,
    /// One configuration record finished reassembling (progress).
    ConfigurationRetrieved(ScanConfiguration),
    /// One stored-scan entry resolved its name and date (progress).
    StoredScanIndexed(StoredScanEntry),
    /// Terminal report for one intent; exactly one per submitted intent.
    ProcedureFinished {
        intent: IntentKind,
        outcome: Result<ProcedureResult, EngineError>,
    },
}

/// Connection lifecycle of one session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, SerializeDisplay)]
pub enum LinkState {
    #[strum(to_string = "disconnected")]
    Disconnected,
    #[strum(to_string = "connecting")]
    Connecting,
    #[strum(to_string = "discovering")]
    Discovering,
    #[strum(to_string = "subscribing_notifications")]
    SubscribingNotifications,
    #[strum(to_string = "ready")]
    Ready,
    #[strum(to_string = "busy")]
    Busy,
}

/// One live connection and all engine state associated with it.
pub struct Session<T: Transport> {
    link: T,
    state: LinkState,
    cascade: Option<NotificationCascade>,
    active: Option<Procedure>,
    queue: VecDeque<Intent>,
    calibration: Option<CalibrationData>,
    outward: UnboundedSender<EngineEvent>,
}

impl<T: Transport> Session<T> {
    /// Creates a session over a transport, reporting on `outward`.
    pub fn new(link: T, outward: UnboundedSender<EngineEvent>) -> Self {
        Self {
            link,
            state: LinkState::Disconnected,
            cascade: None,
            active: None,
            queue: VecDeque::new(),
            calibration: None,
            outward,
        }
    }

    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    #[must_use]
    pub fn pending_intents(&self) -> usize {
        self.queue.len()
    }

    /// Records that a connection attempt is in flight.
    pub fn begin_connect(&mut self) {
        if self.state == LinkState::Disconnected {
            self.state = LinkState::Connecting;
        }
    }

    /// Submits one intent.
    ///
    /// Started immediately when the session is ready and idle; queued in FIFO
    /// order otherwise. An intent submitted while disconnected fails at once
    /// with [`EngineError::Disconnected`].
    pub fn submit(&mut self, intent: Intent) {
        if self.state == LinkState::Disconnected {
            self.emit(EngineEvent::ProcedureFinished {
                intent: intent.kind(),
                outcome: Err(EngineError::Disconnected),
            });
            return;
        }
        self.queue.push_back(intent);
        self.start_next_if_ready();
    }

    /// Feeds one transport callback into the engine.
    ///
    /// Each callback advances the active procedure at most one step. A
    /// completion with no active procedure is a logged no-op, not an error.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::LinkUp => self.on_link_up(),
            TransportEvent::LinkDown => self.reset_on_disconnect(),
            TransportEvent::ServicesDiscovered { ok } => self.on_services_discovered(ok),
            TransportEvent::SubscribeComplete { endpoint, status }
                if self.state == LinkState::SubscribingNotifications =>
            {
                self.advance_cascade(endpoint, status);
            }
            other => self.dispatch_to_procedure(other),
        }
    }

    /// Forces a timeout failure for the active procedure and resets the
    /// session.
    ///
    /// A hung operation leaves the one-outstanding-operation slot occupied
    /// forever, so the whole session is torn down rather than resumed.
    pub fn fail_active_on_timeout(&mut self) {
        if let Some(procedure) = self.active.take() {
            self.emit(EngineEvent::ProcedureFinished {
                intent: procedure.kind(),
                outcome: Err(EngineError::Timeout),
            });
        }
        self.reset_on_disconnect();
    }

    fn on_link_up(&mut self) {
        if self.state != LinkState::Connecting {
            trace!(state = %self.state, "ignoring link-up outside a connection attempt");
            return;
        }
        self.state = LinkState::Discovering;
        if let Err(issue) = self.link.discover_services() {
            error!(%issue, "failed to start service discovery");
        }
    }

    fn on_services_discovered(&mut self, ok: bool) {
        if self.state != LinkState::Discovering {
            trace!(state = %self.state, "ignoring service-discovery report");
            return;
        }
        if !ok {
            warn!("GATT service enumeration reported failure");
            return;
        }
        let mut cascade = NotificationCascade::new();
        match cascade.start(&mut self.link) {
            Ok(()) => {
                self.state = LinkState::SubscribingNotifications;
                self.cascade = Some(cascade);
            }
            Err(error) => error!(%error, "failed to start the notification cascade"),
        }
    }

    fn advance_cascade(
        &mut self,
        endpoint: crate::protocol::EndpointId,
        status: crate::hw::OperationStatus,
    ) {
        let Some(cascade) = self.cascade.as_mut() else {
            trace!("subscribe acknowledgement with no cascade in flight");
            return;
        };
        match cascade.on_subscribe_ack(endpoint, status, &mut self.link) {
            Ok(CascadeProgress::Pending) => {}
            Ok(CascadeProgress::Ready) => {
                self.cascade = None;
                self.state = LinkState::Ready;
                self.emit(EngineEvent::SessionReady);
                self.start_next_if_ready();
            }
            Err(error) => error!(%error, "notification cascade aborted"),
        }
    }

    fn dispatch_to_procedure(&mut self, event: TransportEvent) {
        let Some(mut procedure) = self.active.take() else {
            trace!(?event, "no active procedure, ignoring completion");
            return;
        };
        let outcome = {
            let mut cx = ProcedureCx {
                link: &mut self.link,
                outward: &self.outward,
                calibration: &mut self.calibration,
            };
            procedure.on_event(&event, &mut cx)
        };
        match outcome {
            Ok(Step::Pending) => self.active = Some(procedure),
            Ok(Step::Complete(result)) => {
                self.emit(EngineEvent::ProcedureFinished {
                    intent: procedure.kind(),
                    outcome: Ok(result),
                });
                self.state = LinkState::Ready;
                self.start_next_if_ready();
            }
            Err(error) => {
                self.emit(EngineEvent::ProcedureFinished {
                    intent: procedure.kind(),
                    outcome: Err(error),
                });
                self.state = LinkState::Ready;
                self.start_next_if_ready();
            }
        }
    }

    fn start_next_if_ready(&mut self) {
        while self.state == LinkState::Ready && self.active.is_none() {
            let Some(intent) = self.queue.pop_front() else {
                return;
            };
            let kind = intent.kind();
            debug!(intent = %kind, "starting procedure");
            let mut procedure = Procedure::for_intent(intent);
            self.state = LinkState::Busy;
            let started = {
                let mut cx = ProcedureCx {
                    link: &mut self.link,
                    outward: &self.outward,
                    calibration: &mut self.calibration,
                };
                procedure.start(&mut cx)
            };
            match started {
                Ok(()) => {
                    self.active = Some(procedure);
                    return;
                }
                Err(error) => {
                    self.state = LinkState::Ready;
                    self.emit(EngineEvent::ProcedureFinished {
                        intent: kind,
                        outcome: Err(error),
                    });
                }
            }
        }
    }

    /// Disconnect wins, from any state: the active procedure fails with
    /// `Disconnected`, the pending queue empties, and every scratch buffer
    /// dies with its owner. Resetting twice has the same effect as once.
    fn reset_on_disconnect(&mut self) {
        let was_connected = self.state != LinkState::Disconnected;
        self.link.on_disconnect_cleanup();
        self.state = LinkState::Disconnected;
        self.cascade = None;
        self.queue.clear();
        self.calibration = None;
        if let Some(procedure) = self.active.take() {
            self.emit(EngineEvent::ProcedureFinished {
                intent: procedure.kind(),
                outcome: Err(EngineError::Disconnected),
            });
        }
        if was_connected {
            self.emit(EngineEvent::SessionDisconnected);
        }
    }

    fn emit(&self, event: EngineEvent) {
        if self.outward.send(event).is_err() {
            trace!("engine event dropped, result channel is closed");
        }
    }
}
