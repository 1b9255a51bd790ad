use serde::Serialize;
use serde_with::hex::Hex;
use serde_with::serde_as;
use thiserror::Error;

use crate::utils::format_hex_compact;
use crate::wire;

/// Identity strings aggregated by the device-info procedure.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub manufacturer_name: String,
    pub model_number: String,
    pub serial_number: String,
    pub hardware_revision: String,
    pub firmware_revision: String,
    pub spectrum_revision: String,
}

/// Live readings aggregated by the status procedure.
///
/// The status registers are opaque device bytes; render them with
/// [`DeviceStatus::device_status_hex`] / [`DeviceStatus::error_status_hex`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub battery_percent: u8,
    pub temperature_celsius: f32,
    pub humidity_percent: f32,
    #[serde_as(as = "Hex")]
    pub device_status: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub error_status: Vec<u8>,
}

impl DeviceStatus {
    #[must_use]
    pub fn device_status_hex(&self) -> String {
        format_hex_compact(&self.device_status)
    }

    #[must_use]
    pub fn error_status_hex(&self) -> String {
        format_hex_compact(&self.error_status)
    }
}

/// Opaque identity of one SD-stored scan.
///
/// The four raw bytes are echoed verbatim in name/date/delete requests and
/// never reinterpreted numerically.
#[serde_as]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub struct ScanIndexRef(#[serde_as(as = "Hex")] [u8; 4]);

impl ScanIndexRef {
    #[must_use]
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<[u8; 4]> for ScanIndexRef {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for ScanIndexRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_hex_compact(&self.0))
    }
}

/// One wavelength section of a slew scan configuration.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SlewSection {
    pub section_type: u8,
    pub width_px: u8,
    pub wavelength_start_nm: u32,
    pub wavelength_end_nm: u32,
    pub num_patterns: u16,
    pub num_repeats: u16,
    pub exposure_time: u16,
}

/// A scan configuration stored on the peripheral.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ScanConfiguration {
    pub scan_type: u8,
    pub index: u16,
    pub serial: String,
    pub name: String,
    pub wavelength_start_nm: u32,
    pub wavelength_end_nm: u32,
    pub width_px: u8,
    pub num_patterns: u16,
    pub num_repeats: u16,
    pub is_active: bool,
    pub sections: Vec<SlewSection>,
}

/// Errors returned while decoding a packed configuration record.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfigRecordError {
    #[error("configuration record is {actual} bytes, expected at least {expected}")]
    Truncated { expected: usize, actual: usize },
    #[error("slew configuration declares {declared} sections but carries bytes for {available}")]
    SectionCountMismatch { declared: usize, available: usize },
}

const SERIAL_LEN: usize = 8;
const NAME_LEN: usize = 40;
const FIXED_RECORD_LEN: usize = 1 + 2 + SERIAL_LEN + NAME_LEN + 4 + 4 + 1 + 2 + 2;
const SECTION_LEN: usize = 1 + 1 + 4 + 4 + 2 + 2;
const SLEW_SCAN_TYPE: u8 = 2;

impl ScanConfiguration {
    /// Decodes the device's packed little-endian configuration record.
    ///
    /// Layout: `scan_type u8 | index u16 | serial [u8; 8] | name [u8; 40] |
    /// wavelength_start_nm u32 | wavelength_end_nm u32 | width_px u8 |
    /// num_patterns u16 | num_repeats u16`, followed for slew configurations
    /// (`scan_type == 2`) by `num_sections u8` and one packed
    /// [`SlewSection`] per section sharing the head repeat count.
    ///
    /// # Errors
    ///
    /// Returns an error when the record is shorter than the declared layout.
    pub fn parse(record: &[u8]) -> Result<Self, ConfigRecordError> {
        if record.len() < FIXED_RECORD_LEN {
            return Err(ConfigRecordError::Truncated {
                expected: FIXED_RECORD_LEN,
                actual: record.len(),
            });
        }

        let mut cursor = Cursor::new(record);
        let scan_type = cursor.u8();
        let index = cursor.u16();
        let serial = wire::trimmed_utf8(cursor.take(SERIAL_LEN));
        let name = wire::trimmed_utf8(cursor.take(NAME_LEN));
        let wavelength_start_nm = cursor.u32();
        let wavelength_end_nm = cursor.u32();
        let width_px = cursor.u8();
        let num_patterns = cursor.u16();
        let num_repeats = cursor.u16();

        let sections = if scan_type == SLEW_SCAN_TYPE {
            parse_sections(&mut cursor, num_repeats)?
        } else {
            Vec::new()
        };

        Ok(Self {
            scan_type,
            index,
            serial,
            name,
            wavelength_start_nm,
            wavelength_end_nm,
            width_px,
            num_patterns,
            num_repeats,
            is_active: false,
            sections,
        })
    }
}

fn parse_sections(
    cursor: &mut Cursor<'_>,
    num_repeats: u16,
) -> Result<Vec<SlewSection>, ConfigRecordError> {
    if cursor.remaining() < 1 {
        return Err(ConfigRecordError::SectionCountMismatch {
            declared: 0,
            available: 0,
        });
    }
    let declared = cursor.u8() as usize;
    let available = cursor.remaining() / SECTION_LEN;
    if available < declared {
        return Err(ConfigRecordError::SectionCountMismatch {
            declared,
            available,
        });
    }

    let mut sections = Vec::with_capacity(declared);
    for _ in 0..declared {
        sections.push(SlewSection {
            section_type: cursor.u8(),
            width_px: cursor.u8(),
            wavelength_start_nm: cursor.u32(),
            wavelength_end_nm: cursor.u32(),
            num_patterns: cursor.u16(),
            num_repeats,
            exposure_time: cursor.u16(),
        });
    }
    Ok(sections)
}

/// Bounds-checked little-endian record reader.
struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        slice
    }

    fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take(2).try_into().expect("slice length is fixed"))
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take(4).try_into().expect("slice length is fixed"))
    }
}

/// Reference calibration payloads captured from the peripheral.
#[serde_as]
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CalibrationData {
    #[serde_as(as = "Hex")]
    pub coefficients: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub matrix: Vec<u8>,
}

/// One completed scan retrieved from the peripheral.
#[serde_as]
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ScanResult {
    pub name: String,
    pub scan_type: String,
    pub date: String,
    pub packet_format_version: String,
    #[serde_as(as = "Hex")]
    pub sample_data: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub reference_coefficients: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub reference_matrix: Vec<u8>,
}

/// One SD-stored scan listed by the stored-scans procedure.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct StoredScanEntry {
    pub name: String,
    pub date: String,
    pub index: ScanIndexRef,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    pub(crate) fn packed_record(scan_type: u8, index: u16, name: &str) -> Vec<u8> {
        let mut record = Vec::new();
        record.push(scan_type);
        record.extend_from_slice(&index.to_le_bytes());
        record.extend_from_slice(b"SN042\x00\x00\x00");
        let mut name_field = [0u8; 40];
        name_field[..name.len()].copy_from_slice(name.as_bytes());
        record.extend_from_slice(&name_field);
        record.extend_from_slice(&900u32.to_le_bytes());
        record.extend_from_slice(&1700u32.to_le_bytes());
        record.push(6);
        record.extend_from_slice(&228u16.to_le_bytes());
        record.extend_from_slice(&1u16.to_le_bytes());
        record
    }

    #[test]
    fn parse_decodes_column_fields() {
        let record = packed_record(0, 2, "Column 1");
        let config = ScanConfiguration::parse(&record).expect("record should parse");

        assert_eq!(0, config.scan_type);
        assert_eq!(2, config.index);
        assert_eq!("SN042", config.serial);
        assert_eq!("Column 1", config.name);
        assert_eq!(900, config.wavelength_start_nm);
        assert_eq!(1700, config.wavelength_end_nm);
        assert_eq!(6, config.width_px);
        assert_eq!(228, config.num_patterns);
        assert_eq!(1, config.num_repeats);
        assert!(!config.is_active);
        assert!(config.sections.is_empty());
    }

    #[test]
    fn parse_decodes_slew_sections() {
        let mut record = packed_record(2, 3, "Slew");
        record[62..64].copy_from_slice(&4u16.to_le_bytes());
        record.push(2);
        for start in [900u32, 1300u32] {
            record.push(1);
            record.push(6);
            record.extend_from_slice(&start.to_le_bytes());
            record.extend_from_slice(&(start + 400).to_le_bytes());
            record.extend_from_slice(&120u16.to_le_bytes());
            record.extend_from_slice(&635u16.to_le_bytes());
        }

        let config = ScanConfiguration::parse(&record).expect("slew record should parse");
        assert_eq!(2, config.sections.len());
        assert_eq!(900, config.sections[0].wavelength_start_nm);
        assert_eq!(1300, config.sections[1].wavelength_start_nm);
        assert_eq!(4, config.sections[0].num_repeats);
        assert_eq!(635, config.sections[1].exposure_time);
    }

    #[test]
    fn parse_rejects_truncated_record() {
        let record = packed_record(0, 1, "Short");
        let result = ScanConfiguration::parse(&record[..20]);
        assert_matches!(result, Err(ConfigRecordError::Truncated { .. }));
    }

    #[test]
    fn parse_rejects_missing_sections() {
        let mut record = packed_record(2, 1, "Slew");
        record.push(3);
        let result = ScanConfiguration::parse(&record);
        assert_matches!(
            result,
            Err(ConfigRecordError::SectionCountMismatch {
                declared: 3,
                available: 0,
            })
        );
    }

    #[test]
    fn scan_index_ref_displays_as_hex() {
        let index = ScanIndexRef::new([0x01, 0x02, 0xA3, 0xFF]);
        assert_eq!("0102A3FF", index.to_string());
    }
}
