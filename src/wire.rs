//! Byte-level encodings shared by the protocol engine.
//!
//! All multi-byte integers on the wire are little-endian. Temperature and
//! humidity values (and their alarm thresholds) travel as signed 16-bit
//! hundredths of a unit.

use time::OffsetDateTime;

/// Reads an unsigned little-endian 16-bit value from the first two bytes.
pub(crate) fn read_u16_le(bytes: &[u8]) -> Option<u16> {
    let pair: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
    Some(u16::from_le_bytes(pair))
}

/// Decodes a signed 16-bit hundredths value into the physical quantity.
pub(crate) fn decode_centi(bytes: &[u8]) -> Option<f32> {
    let pair: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
    Some(f32::from(i16::from_le_bytes(pair)) / 100.0)
}

/// Encodes a physical quantity as signed 16-bit hundredths.
pub(crate) fn encode_centi(value: f32) -> [u8; 2] {
    let hundredths = (value * 100.0).round() as i16;
    hundredths.to_le_bytes()
}

/// Decodes a nul-terminated UTF-8 name, truncating at the first `0x00`.
pub(crate) fn trimmed_utf8(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0x00).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Renders date bytes the way the device reports them: each byte as a
/// two-digit decimal field, concatenated.
pub(crate) fn decimal_fields(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02}")).collect()
}

/// Scan-name stub bytes: the user prefix reversed byte-for-byte.
///
/// The peripheral firmware consumes the stub back-to-front; the reversal must
/// be preserved exactly.
pub(crate) fn reversed_stub(prefix: &str) -> Vec<u8> {
    prefix.as_bytes().iter().rev().copied().collect()
}

/// Clock payload for the current-time endpoint:
/// `[yy, month, day, weekday, hour, minute, second]`.
pub(crate) fn clock_payload(timestamp: OffsetDateTime) -> [u8; 7] {
    let year = u8::try_from(timestamp.year().rem_euclid(100))
        .expect("year modulo 100 should always fit in u8");

    [
        year,
        timestamp.month() as u8,
        timestamp.day(),
        timestamp.weekday().number_from_monday(),
        timestamp.hour(),
        timestamp.minute(),
        timestamp.second(),
    ]
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use time::{Date, Month, PrimitiveDateTime, Time, UtcOffset};

    use super::*;

    #[rstest]
    #[case(23.45, [0x29, 0x09])]
    #[case(0.0, [0x00, 0x00])]
    #[case(-1.5, [0x6A, 0xFF])]
    fn encode_centi_produces_little_endian_hundredths(#[case] value: f32, #[case] expected: [u8; 2]) {
        assert_eq!(expected, encode_centi(value));
    }

    #[rstest]
    #[case(&[0x29, 0x09], 23.45)]
    #[case(&[0x6A, 0xFF], -1.5)]
    fn decode_centi_round_trips(#[case] bytes: &[u8], #[case] expected: f32) {
        let decoded = decode_centi(bytes).expect("two bytes should decode");
        assert!((decoded - expected).abs() < 0.005);
    }

    #[test]
    fn decode_centi_rejects_short_payload() {
        assert_eq!(None, decode_centi(&[0x29]));
    }

    #[test]
    fn trimmed_utf8_stops_at_first_nul() {
        assert_eq!("Sample", trimmed_utf8(b"Sample\x00garbage"));
        assert_eq!("Sample", trimmed_utf8(b"Sample"));
        assert_eq!("", trimmed_utf8(b"\x00Sample"));
    }

    #[test]
    fn decimal_fields_pads_single_digits() {
        assert_eq!("26020509", decimal_fields(&[26, 2, 5, 9]));
    }

    #[test]
    fn reversed_stub_reverses_prefix_bytes() {
        assert_eq!(b"nacS".to_vec(), reversed_stub("Scan"));
        assert_eq!(Vec::<u8>::new(), reversed_stub(""));
    }

    #[test]
    fn clock_payload_maps_timestamp_fields() {
        let date = Date::from_calendar_date(2026, Month::February, 15)
            .expect("calendar date used in tests should be valid");
        let time = Time::from_hms(21, 4, 5).expect("time used in tests should be valid");
        let timestamp = PrimitiveDateTime::new(date, time).assume_offset(UtcOffset::UTC);

        assert_eq!([26, 2, 15, 7, 21, 4, 5], clock_payload(timestamp));
    }
}
