//! Reassembly of chunked payload streams and accumulation of list records.
//!
//! Four endpoint streams (scan sample data, reference calibration
//! coefficients, reference calibration matrix, stored configuration records)
//! share one framing contract handled by [`ChunkedTransfer`]; the two index
//! list endpoints share the accumulators below.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::{EngineError, ProtocolViolation};
use crate::model::ScanIndexRef;
use crate::protocol::EndpointId;

/// First byte of every chunked packet; `0x00` marks the size header.
const HEADER_MARKER: u8 = 0x00;

/// Width of one stored-scan index record.
const INDEX_RECORD_LEN: usize = 4;

/// Progress of one chunked transfer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum TransferProgress {
    Pending,
    Complete(Vec<u8>),
}

/// Reconstructs one logical payload from header/continuation packets.
///
/// A header packet (`marker == 0x00`) carries the total payload size in
/// bytes 1-2 (little-endian) and no payload of its own. Every other marker
/// value is a continuation whose bytes from offset 1 are appended in arrival
/// order. There is no explicit last-packet flag: completion is detected by
/// length, checked after every packet.
#[derive(Debug, Default)]
pub(crate) struct ChunkedTransfer {
    expected: Option<usize>,
    accumulated: Vec<u8>,
}

impl ChunkedTransfer {
    /// Feeds one raw packet into the transfer.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation when a continuation precedes the header,
    /// the header is too short to carry a size, or the accumulated length
    /// exceeds the declared size.
    pub(crate) fn on_packet(
        &mut self,
        endpoint: EndpointId,
        packet: &[u8],
    ) -> Result<TransferProgress, EngineError> {
        let Some((&marker, body)) = packet.split_first() else {
            return Err(EngineError::malformed(endpoint, "empty chunk packet"));
        };

        if marker == HEADER_MARKER {
            if body.len() < 2 {
                return Err(EngineError::violation(
                    endpoint,
                    ProtocolViolation::TruncatedHeader,
                ));
            }
            let expected = usize::from(u16::from_le_bytes([body[0], body[1]]));
            trace!(%endpoint, expected, "chunked transfer header");
            self.accumulated.clear();
            self.expected = Some(expected);
        } else {
            let Some(expected) = self.expected else {
                return Err(EngineError::violation(
                    endpoint,
                    ProtocolViolation::MissingHeader,
                ));
            };
            self.accumulated.extend_from_slice(body);
            if self.accumulated.len() > expected {
                return Err(EngineError::violation(
                    endpoint,
                    ProtocolViolation::TransferOverflow {
                        expected,
                        accumulated: self.accumulated.len(),
                    },
                ));
            }
        }

        match self.expected {
            Some(expected) if self.accumulated.len() == expected => {
                self.expected = None;
                Ok(TransferProgress::Complete(std::mem::take(
                    &mut self.accumulated,
                )))
            }
            _ => Ok(TransferProgress::Pending),
        }
    }

    /// Discards any in-flight transfer state.
    pub(crate) fn reset(&mut self) {
        self.expected = None;
        self.accumulated.clear();
    }
}

/// Progress of one list accumulation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum ListProgress {
    Pending,
    Complete,
}

/// Collects fixed-width stored-scan index records.
///
/// Each notification carries a whole number of 4-byte records concatenated;
/// trailing bytes short of a full record are ignored, matching the device's
/// packing.
#[derive(Debug)]
pub(crate) struct IndexListAccumulator {
    expected_count: usize,
    items: VecDeque<ScanIndexRef>,
}

impl IndexListAccumulator {
    pub(crate) fn new(expected_count: usize) -> Self {
        Self {
            expected_count,
            items: VecDeque::new(),
        }
    }

    /// Splits one notification payload into index records.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation when more records arrive than the
    /// peripheral declared.
    pub(crate) fn on_packet(
        &mut self,
        endpoint: EndpointId,
        payload: &[u8],
    ) -> Result<ListProgress, EngineError> {
        for record in payload.chunks_exact(INDEX_RECORD_LEN) {
            let bytes: [u8; 4] = record.try_into().expect("chunk width is fixed");
            self.items.push_back(ScanIndexRef::new(bytes));
        }
        if self.items.len() > self.expected_count {
            return Err(EngineError::violation(
                endpoint,
                ProtocolViolation::ListOverflow {
                    expected: self.expected_count,
                    accumulated: self.items.len(),
                },
            ));
        }

        if self.items.len() == self.expected_count {
            Ok(ListProgress::Complete)
        } else {
            Ok(ListProgress::Pending)
        }
    }

    /// Hands the accumulated records over, front first.
    pub(crate) fn into_items(self) -> VecDeque<ScanIndexRef> {
        self.items
    }
}

/// Collects one-record-per-notification enumeration lists and drives the
/// per-item follow-up fetches.
///
/// When `expected_count == 1` the peripheral still emits a list-terminator
/// record before the single real entry, so the *second* received record is
/// the one that drives the follow-up fetch; the count check below
/// special-cases this exactly as the device requires.
#[derive(Debug)]
pub(crate) struct EnumerationAccumulator {
    expected_count: usize,
    records: Vec<Vec<u8>>,
    position: usize,
}

impl EnumerationAccumulator {
    pub(crate) fn new(expected_count: usize) -> Self {
        Self {
            expected_count,
            records: Vec::new(),
            position: 0,
        }
    }

    /// Appends one notification record.
    pub(crate) fn on_record(&mut self, payload: &[u8]) -> ListProgress {
        self.position += 1;
        self.records.push(payload.to_vec());

        if self.expected_count == 1 && self.records.len() > 1 {
            return ListProgress::Complete;
        }
        if self.position == self.expected_count && self.expected_count != 1 {
            return ListProgress::Complete;
        }
        ListProgress::Pending
    }

    /// First follow-up fetch index, taken from the second record's bytes 1-2.
    ///
    /// # Errors
    ///
    /// Returns a malformed-payload error when the driver record is missing or
    /// too short.
    pub(crate) fn first_fetch(&mut self, endpoint: EndpointId) -> Result<[u8; 2], EngineError> {
        self.position = 1;
        self.fetch_bytes(endpoint, 1)
    }

    /// Advances the running position counter and returns the next fetch
    /// index, or `None` once every declared item has been fetched.
    ///
    /// The index bytes come out of the *driver record* at positions
    /// `counter + 1` and `counter + 2`; the counter is the subscription
    /// position, not a plain offset. Fragile for large counts, but it is the
    /// device's documented layout and is preserved as-is.
    ///
    /// # Errors
    ///
    /// Returns a malformed-payload error when the driver record is too short
    /// for the computed offsets.
    pub(crate) fn next_fetch(
        &mut self,
        endpoint: EndpointId,
    ) -> Result<Option<[u8; 2]>, EngineError> {
        if self.position >= self.expected_count {
            self.position = 0;
            return Ok(None);
        }
        self.position += 1;
        self.fetch_bytes(endpoint, self.position + 1).map(Some)
    }

    fn fetch_bytes(&self, endpoint: EndpointId, offset: usize) -> Result<[u8; 2], EngineError> {
        let driver = self.records.get(1).ok_or_else(|| {
            EngineError::malformed(endpoint, "enumeration finished without a driver record")
        })?;
        let pair = driver.get(offset..offset + 2).ok_or_else(|| {
            EngineError::malformed(
                endpoint,
                format!(
                    "driver record holds {} bytes, fetch offset {offset} is out of range",
                    driver.len()
                ),
            )
        })?;
        Ok([pair[0], pair[1]])
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    const ENDPOINT: EndpointId = EndpointId::SerializedScanDataReturn;

    fn header(size: u16) -> Vec<u8> {
        let size_bytes = size.to_le_bytes();
        vec![0x00, size_bytes[0], size_bytes[1]]
    }

    fn continuation(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![marker];
        packet.extend_from_slice(payload);
        packet
    }

    #[test]
    fn transfer_reassembles_continuations_in_order() {
        let mut transfer = ChunkedTransfer::default();

        assert_eq!(
            TransferProgress::Pending,
            transfer
                .on_packet(ENDPOINT, &header(6))
                .expect("header should be accepted")
        );
        assert_eq!(
            TransferProgress::Pending,
            transfer
                .on_packet(ENDPOINT, &continuation(0x01, &[0xAA, 0xBB, 0xCC]))
                .expect("continuation should be accepted")
        );
        let progress = transfer
            .on_packet(ENDPOINT, &continuation(0x02, &[0xDD, 0xEE, 0xFF]))
            .expect("final continuation should complete the transfer");

        assert_eq!(
            TransferProgress::Complete(vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
            progress
        );
    }

    #[test]
    fn transfer_rejects_overflow() {
        let mut transfer = ChunkedTransfer::default();
        transfer
            .on_packet(ENDPOINT, &header(2))
            .expect("header should be accepted");

        let error = transfer
            .on_packet(ENDPOINT, &continuation(0x01, &[0x01, 0x02, 0x03]))
            .expect_err("exceeding the declared size is a protocol violation");
        assert_matches!(
            error,
            EngineError::ProtocolViolation {
                violation: ProtocolViolation::TransferOverflow {
                    expected: 2,
                    accumulated: 3,
                },
                ..
            }
        );
    }

    #[test]
    fn transfer_rejects_continuation_before_header() {
        let mut transfer = ChunkedTransfer::default();
        let error = transfer
            .on_packet(ENDPOINT, &continuation(0x01, &[0x01]))
            .expect_err("a continuation without a header must be rejected");
        assert_matches!(
            error,
            EngineError::ProtocolViolation {
                violation: ProtocolViolation::MissingHeader,
                ..
            }
        );
    }

    #[rstest]
    #[case(&[0x00])]
    #[case(&[0x00, 0x04])]
    fn transfer_rejects_truncated_header(#[case] packet: &[u8]) {
        let mut transfer = ChunkedTransfer::default();
        let error = transfer
            .on_packet(ENDPOINT, packet)
            .expect_err("header without a full size field must be rejected");
        assert_matches!(
            error,
            EngineError::ProtocolViolation {
                violation: ProtocolViolation::TruncatedHeader,
                ..
            }
        );
    }

    #[test]
    fn transfer_completes_zero_length_payload_at_header() {
        let mut transfer = ChunkedTransfer::default();
        let progress = transfer
            .on_packet(ENDPOINT, &header(0))
            .expect("zero-size header should be accepted");
        assert_eq!(TransferProgress::Complete(Vec::new()), progress);
    }

    #[test]
    fn transfer_reset_discards_partial_state() {
        let mut transfer = ChunkedTransfer::default();
        transfer
            .on_packet(ENDPOINT, &header(4))
            .expect("header should be accepted");
        transfer
            .on_packet(ENDPOINT, &continuation(0x01, &[0x01]))
            .expect("continuation should be accepted");

        transfer.reset();
        transfer.reset();

        let error = transfer
            .on_packet(ENDPOINT, &continuation(0x01, &[0x02]))
            .expect_err("reset must forget the declared size");
        assert_matches!(
            error,
            EngineError::ProtocolViolation {
                violation: ProtocolViolation::MissingHeader,
                ..
            }
        );
    }

    #[test]
    fn index_list_splits_packed_records_preserving_order() {
        let mut accumulator = IndexListAccumulator::new(3);
        let packet: Vec<u8> = (0u8..12).collect();

        let progress = accumulator
            .on_packet(EndpointId::SdScanIndicesReturn, &packet)
            .expect("three packed records should be accepted");
        assert_eq!(ListProgress::Complete, progress);

        let items: Vec<ScanIndexRef> = accumulator.into_items().into();
        assert_eq!(
            vec![
                ScanIndexRef::new([0, 1, 2, 3]),
                ScanIndexRef::new([4, 5, 6, 7]),
                ScanIndexRef::new([8, 9, 10, 11]),
            ],
            items
        );
    }

    #[test]
    fn index_list_accumulates_across_packets() {
        let mut accumulator = IndexListAccumulator::new(2);
        assert_eq!(
            ListProgress::Pending,
            accumulator
                .on_packet(EndpointId::SdScanIndicesReturn, &[1, 2, 3, 4])
                .expect("first record should be accepted")
        );
        assert_eq!(
            ListProgress::Complete,
            accumulator
                .on_packet(EndpointId::SdScanIndicesReturn, &[5, 6, 7, 8])
                .expect("second record should complete the list")
        );
    }

    #[test]
    fn index_list_rejects_excess_records() {
        let mut accumulator = IndexListAccumulator::new(1);
        let error = accumulator
            .on_packet(EndpointId::SdScanIndicesReturn, &[0; 8])
            .expect_err("more records than declared is a protocol violation");
        assert_matches!(
            error,
            EngineError::ProtocolViolation {
                violation: ProtocolViolation::ListOverflow {
                    expected: 1,
                    accumulated: 2,
                },
                ..
            }
        );
    }

    #[test]
    fn enumeration_single_entry_uses_second_record_as_driver() {
        let mut accumulator = EnumerationAccumulator::new(1);

        assert_eq!(
            ListProgress::Pending,
            accumulator.on_record(&[0x00, 0xEE, 0xEE])
        );
        assert_eq!(
            ListProgress::Complete,
            accumulator.on_record(&[0x01, 0x07, 0x00])
        );

        let fetch = accumulator
            .first_fetch(EndpointId::StoredConfListReturn)
            .expect("driver record should provide the fetch index");
        assert_eq!([0x07, 0x00], fetch);
        assert_eq!(
            None,
            accumulator
                .next_fetch(EndpointId::StoredConfListReturn)
                .expect("a single entry has no follow-up fetch")
        );
    }

    #[test]
    fn enumeration_multi_entry_walks_driver_record_with_position_counter() {
        let mut accumulator = EnumerationAccumulator::new(3);

        assert_eq!(ListProgress::Pending, accumulator.on_record(&[0xEE]));
        assert_eq!(
            ListProgress::Pending,
            accumulator.on_record(&[0x03, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00])
        );
        assert_eq!(ListProgress::Complete, accumulator.on_record(&[0xEE]));

        let first = accumulator
            .first_fetch(EndpointId::StoredConfListReturn)
            .expect("first fetch should resolve");
        assert_eq!([0x01, 0x00], first);

        let second = accumulator
            .next_fetch(EndpointId::StoredConfListReturn)
            .expect("second fetch should resolve");
        assert_eq!(Some([0x02, 0x00]), second);

        let third = accumulator
            .next_fetch(EndpointId::StoredConfListReturn)
            .expect("third fetch should resolve");
        assert_eq!(Some([0x00, 0x03]), third);

        assert_eq!(
            None,
            accumulator
                .next_fetch(EndpointId::StoredConfListReturn)
                .expect("the walk ends after the declared count")
        );
    }

    #[test]
    fn enumeration_reports_short_driver_record() {
        let mut accumulator = EnumerationAccumulator::new(1);
        accumulator.on_record(&[0xEE]);
        accumulator.on_record(&[0x01]);

        let error = accumulator
            .first_fetch(EndpointId::StoredConfListReturn)
            .expect_err("a short driver record cannot provide fetch bytes");
        assert_matches!(error, EngineError::MalformedPayload { .. });
    }
}
