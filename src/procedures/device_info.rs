use crate::error::{EndpointOperation, EngineError};
use crate::hw::TransportEvent;
use crate::model::DeviceInfo;
use crate::protocol::EndpointId;
use crate::wire;

use super::{ProcedureCx, ProcedureResult, Step, ensure_success, unexpected};

/// Ordered identity reads; the aggregate is emitted after the last one.
const READ_ORDER: [EndpointId; 6] = [
    EndpointId::ManufacturerName,
    EndpointId::ModelNumber,
    EndpointId::SerialNumber,
    EndpointId::HardwareRevision,
    EndpointId::FirmwareRevision,
    EndpointId::SpectrumRevision,
];

/// Reads the six identity strings in sequence.
#[derive(Debug)]
pub(crate) struct DeviceInfoProcedure {
    collected: Vec<String>,
}

impl DeviceInfoProcedure {
    pub(crate) fn new() -> Self {
        Self {
            collected: Vec::with_capacity(READ_ORDER.len()),
        }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.read(READ_ORDER[0])
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        let expected = READ_ORDER[self.collected.len()];
        match event {
            TransportEvent::ReadComplete {
                endpoint,
                status,
                value,
            } if *endpoint == expected => {
                ensure_success(*status, expected, EndpointOperation::Read)?;
                self.collected.push(wire::trimmed_utf8(value));

                if self.collected.len() == READ_ORDER.len() {
                    let mut fields = self.collected.drain(..);
                    let mut next = || fields.next().unwrap_or_default();
                    Ok(Step::Complete(ProcedureResult::DeviceInfo(DeviceInfo {
                        manufacturer_name: next(),
                        model_number: next(),
                        serial_number: next(),
                        hardware_revision: next(),
                        firmware_revision: next(),
                        spectrum_revision: next(),
                    })))
                } else {
                    cx.read(READ_ORDER[self.collected.len()])?;
                    Ok(Step::Pending)
                }
            }
            other => Err(unexpected(other)),
        }
    }
}
