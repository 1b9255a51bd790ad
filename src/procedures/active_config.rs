use crate::error::{EndpointOperation, EngineError};
use crate::hw::TransportEvent;
use crate::model::ScanConfiguration;
use crate::protocol::EndpointId;
use crate::transfer::{ChunkedTransfer, TransferProgress};

use super::{ProcedureCx, ProcedureResult, Step, ensure_success, unexpected};

fn active_index_from(value: &[u8]) -> Result<u8, EngineError> {
    value.first().copied().ok_or_else(|| {
        EngineError::malformed(
            EndpointId::ActiveScanConf,
            "active configuration payload is empty",
        )
    })
}

/// Writes the requested active index, then reads it back to confirm.
#[derive(Debug)]
pub(crate) struct SetActiveConfigurationProcedure {
    index: u8,
    wrote: bool,
}

impl SetActiveConfigurationProcedure {
    pub(crate) fn new(index: u8) -> Self {
        Self {
            index,
            wrote: false,
        }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.write(EndpointId::ActiveScanConf, &[self.index])
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        match event {
            TransportEvent::WriteComplete {
                endpoint: EndpointId::ActiveScanConf,
                status,
            } if !self.wrote => {
                ensure_success(*status, EndpointId::ActiveScanConf, EndpointOperation::Write)?;
                self.wrote = true;
                cx.read(EndpointId::ActiveScanConf)?;
                Ok(Step::Pending)
            }
            TransportEvent::ReadComplete {
                endpoint: EndpointId::ActiveScanConf,
                status,
                value,
            } if self.wrote => {
                ensure_success(*status, EndpointId::ActiveScanConf, EndpointOperation::Read)?;
                Ok(Step::Complete(
                    ProcedureResult::ActiveConfigurationConfirmed {
                        index: active_index_from(value)?,
                    },
                ))
            }
            other => Err(unexpected(other)),
        }
    }
}

/// Single read of the active configuration index, no chunked follow-up.
#[derive(Debug)]
pub(crate) struct ActiveConfigurationIndexProcedure;

impl ActiveConfigurationIndexProcedure {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.read(EndpointId::ActiveScanConf)
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        _cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        match event {
            TransportEvent::ReadComplete {
                endpoint: EndpointId::ActiveScanConf,
                status,
                value,
            } => {
                ensure_success(*status, EndpointId::ActiveScanConf, EndpointOperation::Read)?;
                Ok(Step::Complete(ProcedureResult::ActiveConfigurationIndex {
                    index: active_index_from(value)?,
                }))
            }
            other => Err(unexpected(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum DataPhase {
    AwaitIndex,
    AwaitConfig,
}

/// Reads the active index, then fetches its full configuration record.
#[derive(Debug)]
pub(crate) struct ActiveConfigurationDataProcedure {
    phase: DataPhase,
    transfer: ChunkedTransfer,
}

impl ActiveConfigurationDataProcedure {
    pub(crate) fn new() -> Self {
        Self {
            phase: DataPhase::AwaitIndex,
            transfer: ChunkedTransfer::default(),
        }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.read(EndpointId::ActiveScanConf)
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        match (self.phase, event) {
            (
                DataPhase::AwaitIndex,
                TransportEvent::ReadComplete {
                    endpoint: EndpointId::ActiveScanConf,
                    status,
                    value,
                },
            ) => {
                ensure_success(*status, EndpointId::ActiveScanConf, EndpointOperation::Read)?;
                let fetch: [u8; 2] = value
                    .get(..2)
                    .and_then(|pair| pair.try_into().ok())
                    .ok_or_else(|| {
                        EngineError::malformed(
                            EndpointId::ActiveScanConf,
                            "active configuration payload is shorter than two bytes",
                        )
                    })?;
                self.transfer.reset();
                self.phase = DataPhase::AwaitConfig;
                cx.write(EndpointId::ScanConfDataRequest, &fetch)?;
                Ok(Step::Pending)
            }
            (
                DataPhase::AwaitConfig,
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
                DataPhase::AwaitConfig,
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
                        let mut configuration =
                            ScanConfiguration::parse(&record).map_err(|error| {
                                EngineError::malformed(
                                    EndpointId::ScanConfDataReturn,
                                    error.to_string(),
                                )
                            })?;
                        configuration.is_active = true;
                        Ok(Step::Complete(ProcedureResult::ActiveConfiguration(
                            configuration,
                        )))
                    }
                }
            }
            (_, other) => Err(unexpected(other)),
        }
    }
}
