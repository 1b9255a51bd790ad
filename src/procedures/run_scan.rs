use tracing::debug;

use crate::error::{EndpointOperation, EngineError};
use crate::hw::TransportEvent;
use crate::model::{CalibrationData, ScanIndexRef, ScanResult};
use crate::protocol::EndpointId;
use crate::session::ScanRequest;
use crate::transfer::{ChunkedTransfer, TransferProgress};
use crate::utils::{format_hex, format_hex_compact};
use crate::wire;

use super::{ProcedureCx, ProcedureResult, REQUEST_TRIGGER, Step, ensure_success, unexpected};

/// Marker byte announcing that a scan finished and its index follows.
const SCAN_READY_MARKER: u8 = 0xFF;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Phase {
    AwaitClockAck,
    AwaitStubAck,
    AwaitCoefficients,
    AwaitMatrix,
    AwaitScanIndex,
    AwaitName,
    AwaitType,
    AwaitDate,
    AwaitFormatVersion,
    AwaitData,
}

/// Runs a new scan, or performs the first-time calibration fetch.
///
/// Both paths begin by writing the clock and the reversed name-prefix stub.
/// With `fetch_calibration` set the procedure pulls the two reference
/// calibration streams and finishes with [`ProcedureResult::Calibration`];
/// otherwise it starts the scan, waits for the `0xFF` ready marker carrying
/// the new scan's index, and walks the name/type/date/format/data chain to a
/// full [`ProcedureResult::Scan`].
#[derive(Debug)]
pub(crate) struct RunScanProcedure {
    request: ScanRequest,
    phase: Phase,
    transfer: ChunkedTransfer,
    index: Option<ScanIndexRef>,
    name: String,
    scan_type: String,
    date: String,
    format_version: String,
    coefficients: Vec<u8>,
}

impl RunScanProcedure {
    pub(crate) fn new(request: ScanRequest) -> Self {
        Self {
            request,
            phase: Phase::AwaitClockAck,
            transfer: ChunkedTransfer::default(),
            index: None,
            name: String::new(),
            scan_type: String::new(),
            date: String::new(),
            format_version: String::new(),
            coefficients: Vec::new(),
        }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.write(
            EndpointId::CurrentTime,
            &wire::clock_payload(self.request.timestamp),
        )
    }

    fn index_bytes(&self) -> [u8; 4] {
        *self
            .index
            .as_ref()
            .expect("scan index is captured before any per-field request")
            .as_bytes()
    }

    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        cx: &mut ProcedureCx<'_>,
    ) -> Result<Step, EngineError> {
        match (self.phase, event) {
            (
                Phase::AwaitClockAck,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::CurrentTime,
                    status,
                },
            ) => {
                ensure_success(*status, EndpointId::CurrentTime, EndpointOperation::Write)?;
                self.phase = Phase::AwaitStubAck;
                cx.write(
                    EndpointId::ScanNameStub,
                    &wire::reversed_stub(&self.request.name_prefix),
                )?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitStubAck,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::ScanNameStub,
                    status,
                },
            ) => {
                ensure_success(*status, EndpointId::ScanNameStub, EndpointOperation::Write)?;
                if self.request.fetch_calibration {
                    debug!("first-time setup, requesting calibration data");
                    self.transfer.reset();
                    self.phase = Phase::AwaitCoefficients;
                    cx.write(EndpointId::RefCalCoefficientsRequest, &REQUEST_TRIGGER)?;
                } else {
                    let sd_flag = u8::from(self.request.save_to_sd);
                    self.phase = Phase::AwaitScanIndex;
                    cx.write(EndpointId::StartScan, &[sd_flag])?;
                }
                Ok(Step::Pending)
            }
            (
                Phase::AwaitCoefficients,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::RefCalCoefficientsRequest,
                    status,
                },
            ) => {
                ensure_success(
                    *status,
                    EndpointId::RefCalCoefficientsRequest,
                    EndpointOperation::Write,
                )?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitCoefficients,
                TransportEvent::Notification {
                    endpoint: EndpointId::RefCalCoefficientsReturn,
                    payload,
                },
            ) => {
                match self
                    .transfer
                    .on_packet(EndpointId::RefCalCoefficientsReturn, payload)?
                {
                    TransferProgress::Pending => {}
                    TransferProgress::Complete(coefficients) => {
                        self.coefficients = coefficients;
                        self.transfer.reset();
                        self.phase = Phase::AwaitMatrix;
                        cx.write(EndpointId::RefCalMatrixRequest, &REQUEST_TRIGGER)?;
                    }
                }
                Ok(Step::Pending)
            }
            (
                Phase::AwaitMatrix,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::RefCalMatrixRequest,
                    status,
                },
            ) => {
                ensure_success(
                    *status,
                    EndpointId::RefCalMatrixRequest,
                    EndpointOperation::Write,
                )?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitMatrix,
                TransportEvent::Notification {
                    endpoint: EndpointId::RefCalMatrixReturn,
                    payload,
                },
            ) => {
                match self
                    .transfer
                    .on_packet(EndpointId::RefCalMatrixReturn, payload)?
                {
                    TransferProgress::Pending => Ok(Step::Pending),
                    TransferProgress::Complete(matrix) => {
                        let calibration = CalibrationData {
                            coefficients: std::mem::take(&mut self.coefficients),
                            matrix,
                        };
                        *cx.calibration = Some(calibration.clone());
                        Ok(Step::Complete(ProcedureResult::Calibration(calibration)))
                    }
                }
            }
            (
                Phase::AwaitScanIndex,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::StartScan,
                    status,
                },
            ) => {
                ensure_success(*status, EndpointId::StartScan, EndpointOperation::Write)?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitScanIndex,
                TransportEvent::Notification {
                    endpoint: EndpointId::StartScan,
                    payload,
                },
            ) => {
                if payload.first() != Some(&SCAN_READY_MARKER) {
                    return Ok(Step::Pending);
                }
                let bytes: [u8; 4] = payload
                    .get(1..5)
                    .and_then(|slice| slice.try_into().ok())
                    .ok_or_else(|| {
                        EngineError::malformed(
                            EndpointId::StartScan,
                            "scan-ready notification does not carry a 4-byte index",
                        )
                    })?;
                let index = ScanIndexRef::new(bytes);
                debug!(%index, "scan data is ready to be read");
                self.index = Some(index);
                self.phase = Phase::AwaitName;
                cx.write(EndpointId::ScanNameRequest, &bytes)?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitName,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::ScanNameRequest,
                    status,
                },
            ) => {
                ensure_success(*status, EndpointId::ScanNameRequest, EndpointOperation::Write)?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitName,
                TransportEvent::Notification {
                    endpoint: EndpointId::ScanNameReturn,
                    payload,
                },
            ) => {
                self.name = wire::trimmed_utf8(payload);
                self.phase = Phase::AwaitType;
                let index = self.index_bytes();
                cx.write(EndpointId::ScanTypeRequest, &index)?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitType,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::ScanTypeRequest,
                    status,
                },
            ) => {
                ensure_success(*status, EndpointId::ScanTypeRequest, EndpointOperation::Write)?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitType,
                TransportEvent::Notification {
                    endpoint: EndpointId::ScanTypeReturn,
                    payload,
                },
            ) => {
                self.scan_type = format_hex_compact(payload);
                self.phase = Phase::AwaitDate;
                let index = self.index_bytes();
                cx.write(EndpointId::ScanDateRequest, &index)?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitDate,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::ScanDateRequest,
                    status,
                },
            ) => {
                ensure_success(*status, EndpointId::ScanDateRequest, EndpointOperation::Write)?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitDate,
                TransportEvent::Notification {
                    endpoint: EndpointId::ScanDateReturn,
                    payload,
                },
            ) => {
                self.date = wire::decimal_fields(payload);
                self.phase = Phase::AwaitFormatVersion;
                let index = self.index_bytes();
                cx.write(EndpointId::PacketFormatVersionRequest, &index)?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitFormatVersion,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::PacketFormatVersionRequest,
                    status,
                },
            ) => {
                ensure_success(
                    *status,
                    EndpointId::PacketFormatVersionRequest,
                    EndpointOperation::Write,
                )?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitFormatVersion,
                TransportEvent::Notification {
                    endpoint: EndpointId::PacketFormatVersionReturn,
                    payload,
                },
            ) => {
                self.format_version = format_hex(payload);
                self.transfer.reset();
                self.phase = Phase::AwaitData;
                let index = self.index_bytes();
                cx.write(EndpointId::SerializedScanDataRequest, &index)?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitData,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::SerializedScanDataRequest,
                    status,
                },
            ) => {
                ensure_success(
                    *status,
                    EndpointId::SerializedScanDataRequest,
                    EndpointOperation::Write,
                )?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitData,
                TransportEvent::Notification {
                    endpoint: EndpointId::SerializedScanDataReturn,
                    payload,
                },
            ) => {
                match self
                    .transfer
                    .on_packet(EndpointId::SerializedScanDataReturn, payload)?
                {
                    TransferProgress::Pending => Ok(Step::Pending),
                    TransferProgress::Complete(sample_data) => {
                        let calibration = cx.calibration.clone().unwrap_or(CalibrationData {
                            coefficients: Vec::new(),
                            matrix: Vec::new(),
                        });
                        Ok(Step::Complete(ProcedureResult::Scan(ScanResult {
                            name: std::mem::take(&mut self.name),
                            scan_type: std::mem::take(&mut self.scan_type),
                            date: std::mem::take(&mut self.date),
                            packet_format_version: std::mem::take(&mut self.format_version),
                            sample_data,
                            reference_coefficients: calibration.coefficients,
                            reference_matrix: calibration.matrix,
                        })))
                    }
                }
            }
            (_, other) => Err(unexpected(other)),
        }
    }
}
