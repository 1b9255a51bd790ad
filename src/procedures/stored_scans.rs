use std::collections::VecDeque;

use crate::error::{EndpointOperation, EngineError};
use crate::hw::TransportEvent;
use crate::model::{ScanIndexRef, StoredScanEntry};
use crate::protocol::EndpointId;
use crate::session::EngineEvent;
use crate::transfer::{IndexListAccumulator, ListProgress};
use crate::wire;

use super::{ProcedureCx, ProcedureResult, REQUEST_TRIGGER, Step, ensure_success, unexpected};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Phase {
    AwaitCount,
    AwaitIndices,
    AwaitName,
    AwaitDate,
}

/// Enumerates the scans stored on removable media.
///
/// Once the declared number of 4-byte index records has accumulated, each
/// front index drives a name request then a date request; one entry is
/// emitted per index before moving to the next.
#[derive(Debug)]
pub(crate) struct StoredScansProcedure {
    phase: Phase,
    accumulator: Option<IndexListAccumulator>,
    pending: VecDeque<ScanIndexRef>,
    entries: Vec<StoredScanEntry>,
    current_name: String,
}

impl StoredScansProcedure {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::AwaitCount,
            accumulator: None,
            pending: VecDeque::new(),
            entries: Vec::new(),
            current_name: String::new(),
        }
    }

    pub(crate) fn start(&mut self, cx: &mut ProcedureCx<'_>) -> Result<(), EngineError> {
        cx.read(EndpointId::StoredScanCount)
    }

    fn front_index(&self) -> [u8; 4] {
        *self
            .pending
            .front()
            .expect("an index is pending while name/date requests are in flight")
            .as_bytes()
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
                    endpoint: EndpointId::StoredScanCount,
                    status,
                    value,
                },
            ) => {
                ensure_success(*status, EndpointId::StoredScanCount, EndpointOperation::Read)?;
                let count = wire::read_u16_le(value).ok_or_else(|| {
                    EngineError::malformed(
                        EndpointId::StoredScanCount,
                        "stored scan count payload is shorter than 16 bits",
                    )
                })?;
                if count == 0 {
                    return Ok(Step::Complete(ProcedureResult::StoredScans {
                        entries: Vec::new(),
                    }));
                }
                self.accumulator = Some(IndexListAccumulator::new(usize::from(count)));
                self.phase = Phase::AwaitIndices;
                cx.write(EndpointId::SdScanIndicesRequest, &REQUEST_TRIGGER)?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitIndices,
                TransportEvent::WriteComplete {
                    endpoint: EndpointId::SdScanIndicesRequest,
                    status,
                },
            ) => {
                ensure_success(
                    *status,
                    EndpointId::SdScanIndicesRequest,
                    EndpointOperation::Write,
                )?;
                Ok(Step::Pending)
            }
            (
                Phase::AwaitIndices,
                TransportEvent::Notification {
                    endpoint: EndpointId::SdScanIndicesReturn,
                    payload,
                },
            ) => {
                let accumulator = self
                    .accumulator
                    .as_mut()
                    .expect("accumulator exists while indices are streaming");
                if accumulator.on_packet(EndpointId::SdScanIndicesReturn, payload)?
                    == ListProgress::Complete
                {
                    self.pending = self
                        .accumulator
                        .take()
                        .expect("accumulator was just borrowed")
                        .into_items();
                    self.phase = Phase::AwaitName;
                    let front = self.front_index();
                    cx.write(EndpointId::ScanNameRequest, &front)?;
                }
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
                self.current_name = wire::trimmed_utf8(payload);
                self.phase = Phase::AwaitDate;
                let front = self.front_index();
                cx.write(EndpointId::ScanDateRequest, &front)?;
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
                let index = self
                    .pending
                    .pop_front()
                    .expect("an index is pending while the date request is in flight");
                let entry = StoredScanEntry {
                    name: std::mem::take(&mut self.current_name),
                    date: wire::decimal_fields(payload),
                    index,
                };
                cx.emit(EngineEvent::StoredScanIndexed(entry.clone()));
                self.entries.push(entry);

                if self.pending.is_empty() {
                    Ok(Step::Complete(ProcedureResult::StoredScans {
                        entries: std::mem::take(&mut self.entries),
                    }))
                } else {
                    self.phase = Phase::AwaitName;
                    let front = self.front_index();
                    cx.write(EndpointId::ScanNameRequest, &front)?;
                    Ok(Step::Pending)
                }
            }
            (_, other) => Err(unexpected(other)),
        }
    }
}
