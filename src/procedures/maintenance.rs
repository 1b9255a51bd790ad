use crate::error::{EndpointOperation, EngineError};
use crate::hw::TransportEvent;
use crate::model::ScanIndexRef;
use crate::protocol::EndpointId;
use crate::session::TimeRequest;
use crate::wire;

use super::{ProcedureCx, ProcedureResult, Step, ensure_success, unexpected};

/// Deletes one SD-stored scan, fire-and-forget.
///
/// The peripheral later pushes a status notification on the same endpoint;
/// it carries no completion payload and is only logged by the session.
#[derive(Debug)]
pub(crate) struct DeleteScanProcedure {
    index: ScanIndexRef,
}

impl DeleteScanProcedure {
    pub(crate) fn new(index: ScanIndexRef) -> Self {
        Self { index }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.write(EndpointId::DeleteScan, self.index.as_bytes())
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        _cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        match event {
            TransportEvent::WriteComplete {
                endpoint: EndpointId::DeleteScan,
                status,
            } => {
                ensure_success(*status, EndpointId::DeleteScan, EndpointOperation::Write)?;
                Ok(Step::Complete(ProcedureResult::ScanDeleted {
                    index: self.index,
                }))
            }
            other => Err(unexpected(other)),
        }
    }
}

/// Writes the temperature threshold, then the humidity threshold.
#[derive(Debug)]
pub(crate) struct UpdateThresholdsProcedure {
    temperature: [u8; 2],
    humidity: [u8; 2],
    wrote_temperature: bool,
}

impl UpdateThresholdsProcedure {
    pub(crate) fn new(temperature_celsius: f32, humidity_percent: f32) -> Self {
        Self {
            temperature: wire::encode_centi(temperature_celsius),
            humidity: wire::encode_centi(humidity_percent),
            wrote_temperature: false,
        }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.write(EndpointId::TemperatureThreshold, &self.temperature)
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        match event {
            TransportEvent::WriteComplete {
                endpoint: EndpointId::TemperatureThreshold,
                status,
            } if !self.wrote_temperature => {
                ensure_success(
                    *status,
                    EndpointId::TemperatureThreshold,
                    EndpointOperation::Write,
                )?;
                self.wrote_temperature = true;
                cx.write(EndpointId::HumidityThreshold, &self.humidity)?;
                Ok(Step::Pending)
            }
            TransportEvent::WriteComplete {
                endpoint: EndpointId::HumidityThreshold,
                status,
            } if self.wrote_temperature => {
                ensure_success(
                    *status,
                    EndpointId::HumidityThreshold,
                    EndpointOperation::Write,
                )?;
                Ok(Step::Complete(ProcedureResult::ThresholdsUpdated))
            }
            other => Err(unexpected(other)),
        }
    }
}

/// Writes the device clock; the firmware expects the scan-name stub to be
/// rewritten immediately afterwards, so the engine chains it here.
#[derive(Debug)]
pub(crate) struct SetTimeProcedure {
    request: TimeRequest,
    wrote_clock: bool,
}

impl SetTimeProcedure {
    pub(crate) fn new(request: TimeRequest) -> Self {
        Self {
            request,
            wrote_clock: false,
        }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.write(
            EndpointId::CurrentTime,
            &wire::clock_payload(self.request.timestamp),
        )
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        match event {
            TransportEvent::WriteComplete {
                endpoint: EndpointId::CurrentTime,
                status,
            } if !self.wrote_clock => {
                ensure_success(*status, EndpointId::CurrentTime, EndpointOperation::Write)?;
                self.wrote_clock = true;
                cx.write(
                    EndpointId::ScanNameStub,
                    &wire::reversed_stub(&self.request.name_prefix),
                )?;
                Ok(Step::Pending)
            }
            TransportEvent::WriteComplete {
                endpoint: EndpointId::ScanNameStub,
                status,
            } if self.wrote_clock => {
                ensure_success(*status, EndpointId::ScanNameStub, EndpointOperation::Write)?;
                Ok(Step::Complete(ProcedureResult::TimeSet))
            }
            other => Err(unexpected(other)),
        }
    }
}
