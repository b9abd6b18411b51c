// Intel-HEX record layout, checksum and line serialization.
//
// A record is one text line:
//
//   ':' | length (1B) | offset (2B, big-endian) | type (1B) | payload | checksum (1B)
//
// every field written as upper-case hex digit pairs. The checksum is the low
// byte of the two's complement of the sum of all preceding decoded bytes.

use crate::error::HexError;

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

pub const DATA_RECORD: u8 = 0x00;
pub const END_OF_FILE_RECORD: u8 = 0x01;
pub const EXTENDED_SEGMENT_ADDRESS_RECORD: u8 = 0x02;
pub const START_SEGMENT_ADDRESS_RECORD: u8 = 0x03;
pub const EXTENDED_LINEAR_ADDRESS_RECORD: u8 = 0x04;
pub const START_LINEAR_ADDRESS_RECORD: u8 = 0x05;

/// The fixed end-of-file line.
pub const END_OF_FILE_LINE: &str = ":00000001FF";

/// Bytes in a record besides its payload (length, offset, type, checksum).
const FRAMING_LEN: usize = 5;

/// Supported record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Data,
    EndOfFile,
    ExtendedLinearAddress,
}

impl RecordType {
    pub fn code(self) -> u8 {
        match self {
            Self::Data => DATA_RECORD,
            Self::EndOfFile => END_OF_FILE_RECORD,
            Self::ExtendedLinearAddress => EXTENDED_LINEAR_ADDRESS_RECORD,
        }
    }
}

impl TryFrom<u8> for RecordType {
    type Error = HexError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            DATA_RECORD => Ok(Self::Data),
            END_OF_FILE_RECORD => Ok(Self::EndOfFile),
            EXTENDED_LINEAR_ADDRESS_RECORD => Ok(Self::ExtendedLinearAddress),
            other => Err(HexError::UnsupportedRecordType(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded record
// ---------------------------------------------------------------------------

/// One structurally valid record (checksum and length already verified).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: u16,
    pub record_type: RecordType,
    pub payload: Vec<u8>,
}

impl Record {
    /// Decode one text line.
    ///
    /// Surrounding whitespace is ignored. Validation order: start code, hex
    /// digits, checksum, declared length, record type.
    pub fn decode(line: &str) -> Result<Self, HexError> {
        let line = line.trim();
        let Some(digits) = line.strip_prefix(':') else {
            return Err(HexError::MissingStartCode);
        };

        // Character indices reported in errors are relative to the whole line.
        let bytes = parse_bytes(digits.as_bytes(), 1)?;
        if bytes.len() < FRAMING_LEN {
            return Err(HexError::TooShort { len: bytes.len() });
        }

        let (body, encoded) = bytes.split_at(bytes.len() - 1);
        let encoded = encoded[0];
        let actual = checksum(body);
        if encoded != actual {
            return Err(HexError::Checksum { encoded, actual });
        }

        let declared = usize::from(body[0]);
        let offset = u16::from_be_bytes([body[1], body[2]]);
        let type_code = body[3];
        let payload = body[4..].to_vec();
        if payload.len() != declared {
            return Err(HexError::LengthMismatch {
                declared,
                actual: payload.len(),
            });
        }

        let record_type = RecordType::try_from(type_code)?;
        Ok(Self {
            offset,
            record_type,
            payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Digit handling
// ---------------------------------------------------------------------------

fn nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Parse the two hex digits at `index`.
pub fn parse_byte(raw: &[u8], index: usize) -> Result<u8, HexError> {
    if index + 1 >= raw.len() {
        return Err(HexError::FracturedByte { index });
    }
    match (nibble(raw[index]), nibble(raw[index + 1])) {
        (Some(hi), Some(lo)) => Ok(hi << 4 | lo),
        _ => Err(HexError::CorruptByte { index }),
    }
}

/// Parse a run of hex digit pairs. `base` shifts reported indices.
pub fn parse_bytes(raw: &[u8], base: usize) -> Result<Vec<u8>, HexError> {
    if raw.len() % 2 != 0 {
        return Err(HexError::OddDigitCount);
    }
    (0..raw.len())
        .step_by(2)
        .map(|i| {
            parse_byte(raw, i).map_err(|e| match e {
                HexError::CorruptByte { index } => HexError::CorruptByte { index: index + base },
                other => other,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Checksum and serialization
// ---------------------------------------------------------------------------

/// Low byte of the two's complement of the byte sum.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

/// Serialize a record line for `payload` at `offset`.
///
/// `payload` must be at most 255 bytes; callers chunk longer data.
pub fn serialize_record(payload: &[u8], offset: u16, record_type: u8) -> String {
    debug_assert!(payload.len() <= usize::from(u8::MAX));
    let [hi, lo] = offset.to_be_bytes();
    let length = payload.len() as u8;

    let mut framed = Vec::with_capacity(payload.len() + 4);
    framed.extend_from_slice(&[length, hi, lo, record_type]);
    framed.extend_from_slice(payload);
    let sum = checksum(&framed);

    let mut line = String::with_capacity(1 + 2 * (framed.len() + 1));
    line.push(':');
    for byte in framed.iter().chain(std::iter::once(&sum)) {
        line.push_str(&format!("{byte:02X}"));
    }
    line
}

/// Extended-linear-address record selecting the upper 16 address bits.
pub fn extended_linear_address_record(upper: u16) -> String {
    serialize_record(&upper.to_be_bytes(), 0, EXTENDED_LINEAR_ADDRESS_RECORD)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_known_payload() {
        let line = serialize_record(&[0, 1, 2, 3, 4, 5], 0x1234, 0x55);
        assert_eq!(line, ":0612345500010203040550");
    }

    #[test]
    fn extended_address_entry() {
        assert_eq!(extended_linear_address_record(0x1234), ":020000041234B4");
        assert_eq!(extended_linear_address_record(0x0001), ":020000040001F9");
    }

    #[test]
    fn checksum_of_data_record() {
        let bytes = [
            0x10, 0x00, 0x08, 0x00, 0x80, 0x31, 0x20, 0x00, 0x7F, 0x08, 0xF3, 0x00, 0x11, 0x08,
            0x01, 0x39, 0xF2, 0x00, 0x21, 0x00,
        ];
        assert_eq!(checksum(&bytes), 0x37);
    }

    #[test]
    fn end_of_file_line_is_consistent() {
        assert_eq!(serialize_record(&[], 0, END_OF_FILE_RECORD), END_OF_FILE_LINE);
    }

    #[test]
    fn parse_byte_errors() {
        assert_eq!(parse_byte(b"1", 0), Err(HexError::FracturedByte { index: 0 }));
        assert_eq!(parse_byte(b"0123AG", 4), Err(HexError::CorruptByte { index: 4 }));
        assert_eq!(parse_byte(b"ab12", 2), Ok(0x12));
        assert_eq!(parse_byte(b"+1", 0), Err(HexError::CorruptByte { index: 0 }));
    }

    #[test]
    fn parse_bytes_requires_pairs() {
        assert_eq!(parse_bytes(b"123", 0), Err(HexError::OddDigitCount));
        assert_eq!(
            parse_bytes(b"1234567890", 0),
            Ok(vec![0x12, 0x34, 0x56, 0x78, 0x90])
        );
    }

    #[test]
    fn decode_rejects_bad_records() {
        assert_eq!(Record::decode("blah"), Err(HexError::MissingStartCode));
        assert_eq!(
            Record::decode(":11000800803120007F08F30011080139F200210036"),
            Err(HexError::LengthMismatch {
                declared: 17,
                actual: 16
            })
        );
        assert_eq!(
            Record::decode(":10000800803120007F08F30011080139F200210038"),
            Err(HexError::Checksum {
                encoded: 0x38,
                actual: 0x37
            })
        );
        assert_eq!(
            Record::decode(":020000020000FC"),
            Err(HexError::UnsupportedRecordType(0x02))
        );
        assert_eq!(Record::decode(":00FF"), Err(HexError::TooShort { len: 2 }));
        assert_eq!(
            Record::decode(":0Z0000020000FC"),
            Err(HexError::CorruptByte { index: 1 })
        );
    }

    #[test]
    fn decode_accepts_lower_case_and_whitespace() {
        let rec = Record::decode("  :01001000a04f\r\n").unwrap();
        assert_eq!(rec.offset, 0x0010);
        assert_eq!(rec.record_type, RecordType::Data);
        assert_eq!(rec.payload, vec![0xA0]);
    }
}
