use crate::error::{EndpointOperation, EngineError};
use crate::hw::TransportEvent;
use crate::model::ScanConfiguration;
use crate::protocol::EndpointId;
use crate::session::EngineEvent;
use crate::transfer::{ChunkedTransfer, EnumerationAccumulator, ListProgress, TransferProgress};
use crate::wire;

use super::{ProcedureCx, ProcedureResult, REQUEST_TRIGGER, Step, ensure_success, unexpected};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Phase {
    AwaitCount,
    AwaitList,
    AwaitConfig,
    AwaitActive,
}

/// Enumerates every stored scan configuration, then resolves the active one.
///
/// The configuration index list arrives one record per notification; each
/// resulting index drives a write-plus-chunked-read of the full configuration
/// record. One [`EngineEvent::ConfigurationRetrieved`] is emitted per record,
/// the terminal result carries them all with the active index applied.
#[derive(Debug)]
pub(crate) struct ScanConfigurationsProcedure {
    phase: Phase,
    accumulator: Option<EnumerationAccumulator>,
    transfer: ChunkedTransfer,
    configurations: Vec<ScanConfiguration>,
}

impl ScanConfigurationsProcedure {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::AwaitCount,
            accumulator: None,
            transfer: ChunkedTransfer::default(),
            configurations: Vec::new(),
        }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.read(EndpointId::StoredConfCount)
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        match (self.phase, event) {
            (
                Phase::AwaitCount,
                TransportEvent::ReadComplete {
                    endpoint: EndpointId::StoredConfCount,
                    status,
                    value,
                },
            ) => {
                ensure_success(*status, EndpointId::StoredConfCount, EndpointOperation::Read)?;
                let count = wire::read_u16_le(value).ok_or_else(|| {
                    EngineError::malformed(
                        EndpointId::StoredConfCount,
                        "configuration count payload is shorter than 16 bits",
                    )
                })?;
                if count == 0 {
                    self.phase = Phase::AwaitActive;
                    cx.read(EndpointId::ActiveScanConf)?;
                } else {
                    self.accumulator = Some(EnumerationAccumulator::new(usize::from(count)));
                    self.phase = Phase::AwaitList;
                    cx.write(EndpointId::StoredConfListRequest, &REQUEST_TRIGGER)?;
                }
                Ok(Step::Pending)
            }
            (
                Phase::AwaitList,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::StoredConfListRequest,
                    status,
                },
            ) => {
                ensure_success(
                    *status,
                    EndpointId::StoredConfListRequest,
                    EndpointOperation::Write,
                )?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitList,
                TransportEvent::Notification {
                    endpoint: EndpointId::StoredConfListReturn,
                    payload,
                },
            ) => {
                let accumulator = self
                    .accumulator
                    .as_mut()
                    .expect("accumulator exists while the list phase is active");
                if accumulator.on_record(payload) == ListProgress::Complete {
                    let fetch = accumulator.first_fetch(EndpointId::StoredConfListReturn)?;
                    self.transfer.reset();
                    self.phase = Phase::AwaitConfig;
                    cx.write(EndpointId::ScanConfDataRequest, &fetch)?;
                }
                Ok(Step::Pending)
            }
            (
                Phase::AwaitConfig,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::ScanConfDataRequest,
                    status,
                },
            ) => {
                ensure_success(
                    *status,
                    EndpointId::ScanConfDataRequest,
                    EndpointOperation::Write,
                )?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitConfig,
                TransportEvent::Notification {
                    endpoint: EndpointId::ScanConfDataReturn,
                    payload,
                },
            ) => {
                match self
                    .transfer
                    .on_packet(EndpointId::ScanConfDataReturn, payload)?
                {
                    TransferProgress::Pending => Ok(Step::Pending),
                    TransferProgress::Complete(record) => {
                        let configuration =
                            ScanConfiguration::parse(&record).map_err(|error| {
                                EngineError::malformed(
                                    EndpointId::ScanConfDataReturn,
                                    error.to_string(),
                                )
                            })?;
                        cx.emit(EngineEvent::ConfigurationRetrieved(configuration.clone()));
                        self.configurations.push(configuration);

                        let accumulator = self
                            .accumulator
                            .as_mut()
                            .expect("accumulator exists while configs are being fetched");
                        match accumulator.next_fetch(EndpointId::StoredConfListReturn)? {
                            Some(fetch) => {
                                self.transfer.reset();
                                cx.write(EndpointId::ScanConfDataRequest, &fetch)?;
                            }
                            None => {
                                self.phase = Phase::AwaitActive;
                                cx.read(EndpointId::ActiveScanConf)?;
                            }
                        }
                        Ok(Step::Pending)
                    }
                }
            }
            (
                Phase::AwaitActive,
                TransportEvent::ReadComplete {
                    endpoint: EndpointId::ActiveScanConf,
                    status,
                    value,
                },
            ) => {
                ensure_success(*status, EndpointId::ActiveScanConf, EndpointOperation::Read)?;
                let active_index = *value.first().ok_or_else(|| {
                    EngineError::malformed(
                        EndpointId::ActiveScanConf,
                        "active configuration payload is empty",
                    )
                })?;
                let mut configurations = std::mem::take(&mut self.configurations);
                for configuration in &mut configurations {
                    configuration.is_active = configuration.index == u16::from(active_index);
                }
                Ok(Step::Complete(ProcedureResult::ScanConfigurations {
                    configurations,
                    active_index,
                }))
            }
            (_, other) => Err(unexpected(other)),
        }
    }
}
