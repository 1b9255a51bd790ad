use crate::error::{EndpointOperation, EngineError};
use crate::hw::TransportEvent;
use crate::model::DeviceStatus;
use crate::protocol::EndpointId;
use crate::wire;

use super::{ProcedureCx, ProcedureResult, Step, ensure_success, unexpected};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Phase {
    Battery,
    Temperature,
    Humidity,
    DeviceStatus,
    ErrorStatus,
}

impl Phase {
    fn endpoint(self) -> EndpointId {
        match self {
            Self::Battery => EndpointId::BatteryLevel,
            Self::Temperature => EndpointId::Temperature,
            Self::Humidity => EndpointId::Humidity,
            Self::DeviceStatus => EndpointId::DeviceStatus,
            Self::ErrorStatus => EndpointId::ErrorStatus,
        }
    }
}

/// Reads the live status registers in sequence.
#[derive(Debug)]
pub(crate) struct StatusProcedure {
    phase: Phase,
    battery_percent: u8,
    temperature_celsius: f32,
    humidity_percent: f32,
    device_status: Vec<u8>,
}

impl StatusProcedure {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Battery,
            battery_percent: 0,
            temperature_celsius: 0.0,
            humidity_percent: 0.0,
            device_status: Vec::new(),
        }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.read(self.phase.endpoint())
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        let expected = self.phase.endpoint();
        let TransportEvent::ReadComplete {
            endpoint,
            status,
            value,
        } = event
        else {
            return Err(unexpected(event));
        };
        if *endpoint != expected {
            return Err(unexpected(event));
        }
        ensure_success(*status, expected, EndpointOperation::Read)?;

        match self.phase {
            Phase::Battery => {
                self.battery_percent = *value.first().ok_or_else(|| {
                    EngineError::malformed(expected, "battery level payload is empty")
                })?;
                self.phase = Phase::Temperature;
            }
            Phase::Temperature => {
                self.temperature_celsius = wire::decode_centi(value).ok_or_else(|| {
                    EngineError::malformed(expected, "temperature payload is shorter than 16 bits")
                })?;
                self.phase = Phase::Humidity;
            }
            Phase::Humidity => {
                self.humidity_percent = wire::decode_centi(value).ok_or_else(|| {
                    EngineError::malformed(expected, "humidity payload is shorter than 16 bits")
                })?;
                self.phase = Phase::DeviceStatus;
            }
            Phase::DeviceStatus => {
                self.device_status = value.clone();
                self.phase = Phase::ErrorStatus;
            }
            Phase::ErrorStatus => {
                return Ok(Step::Complete(ProcedureResult::Status(DeviceStatus {
                    battery_percent: self.battery_percent,
                    temperature_celsius: self.temperature_celsius,
                    humidity_percent: self.humidity_percent,
                    device_status: std::mem::take(&mut self.device_status),
                    error_status: value.clone(),
                })));
            }
        }

        cx.read(self.phase.endpoint())?;
        Ok(Step::Pending)
    }
}
