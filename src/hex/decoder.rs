// Intel-HEX decoding: text lines to (address, byte) pairs.
//
// Records are processed in order. An extended-linear-address record sets the
// upper 16 address bits for every data record that follows; an end-of-file
// record stops parsing, and anything after it is ignored.

use log::{debug, trace};

use super::record::{Record, RecordType};
use crate::error::{Error, HexError, Result};

/// Parse HEX `lines`, invoking `on_byte(address, byte)` for every data byte.
///
/// Errors from `on_byte` abort parsing and are returned with the 1-based
/// record number attached, the same way decode failures are reported.
pub fn parse<I, S, F>(lines: I, mut on_byte: F) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(u32, u8) -> Result<()>,
{
    let mut base: u32 = 0;
    let mut data_bytes = 0usize;

    for (i, line) in lines.into_iter().enumerate() {
        let record_number = i + 1;
        let record = Record::decode(line.as_ref()).map_err(|source| Error::Format {
            record: record_number,
            source,
        })?;

        match record.record_type {
            RecordType::Data => {
                trace!(
                    "record #{record_number}: {} data bytes at {:#06X} (base {base:#06X})",
                    record.payload.len(),
                    record.offset
                );
                let start = (base << 16).wrapping_add(u32::from(record.offset));
                for (j, &byte) in record.payload.iter().enumerate() {
                    let address = start.wrapping_add(j as u32);
                    on_byte(address, byte)
                        .map_err(|e| e.context(format!("hex record #{record_number}")))?;
                }
                data_bytes += record.payload.len();
            }
            RecordType::EndOfFile => {
                debug!("end of file at record #{record_number}, {data_bytes} data bytes");
                return Ok(());
            }
            RecordType::ExtendedLinearAddress => {
                if record.payload.len() != 2 {
                    return Err(Error::Format {
                        record: record_number,
                        source: HexError::ExtendedAddressLength(record.payload.len()),
                    });
                }
                // Both payload bytes form bits 16-31 of later addresses.
                base = u32::from(u16::from_be_bytes([record.payload[0], record.payload[1]]));
                trace!("record #{record_number}: linear base {base:#06X}");
            }
        }
    }

    debug!("input ended without end-of-file record, {data_bytes} data bytes");
    Ok(())
}

/// Parse `lines` into an ordered list of `(address, byte)` pairs.
pub fn parse_to_vec<I, S>(lines: I) -> Result<Vec<(u32, u8)>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    parse(lines, |address, byte| {
        out.push((address, byte));
        Ok(())
    })?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn data_record_yields_addressed_bytes() {
        let bytes = parse_to_vec([":10000800803120007F08F30011080139F200210037"]).unwrap();
        let expected = [
            0x80, 0x31, 0x20, 0x00, 0x7F, 0x08, 0xF3, 0x00, 0x11, 0x08, 0x01, 0x39, 0xF2, 0x00,
            0x21, 0x00,
        ];
        assert_eq!(bytes.len(), 16);
        for (i, (address, byte)) in bytes.iter().enumerate() {
            assert_eq!(*address, 8 + i as u32);
            assert_eq!(*byte, expected[i]);
        }
    }

    #[test]
    fn extended_linear_address_shifts_following_records() {
        let lines = [
            ":10000000803120007F08F30011080139F20021003F   ",
            ":020000040001F9\n",
            ":01010000AA54  \n",
        ];
        let bytes = parse_to_vec(lines).unwrap();
        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[0], (0, 0x80));
        assert_eq!(bytes[15], (15, 0x00));
        assert_eq!(bytes[16], (0x0001_0100, 0xAA));
    }

    #[test]
    fn extended_linear_address_uses_both_payload_bytes() {
        let bytes = parse_to_vec([":020000041234B4", ":0100000011EE"]).unwrap();
        assert_eq!(bytes, vec![(0x1234_0000, 0x11)]);

        let bytes = parse_to_vec([":02000004FFFFFC", ":02FFFE00AABB9C"]).unwrap();
        assert_eq!(bytes, vec![(0xFFFF_FFFE, 0xAA), (0xFFFF_FFFF, 0xBB)]);
    }

    #[test]
    fn encoded_high_addresses_parse_back() {
        use crate::hex::encoder::{Block, EncodeOptions, encode};

        let contents: Vec<Option<u8>> = vec![Some(0x11), None, Some(0x22)];
        let block = Block {
            start_address: 0x1234_FFFE,
            contents: &contents,
        };
        let lines = encode(&[block], &EncodeOptions::default()).unwrap();
        assert_eq!(
            parse_to_vec(&lines).unwrap(),
            vec![(0x1234_FFFE, 0x11), (0x1235_0000, 0x22)]
        );
    }

    #[test]
    fn end_of_file_stops_parsing() {
        let lines = [":0100000011EE", ":00000001FF", "garbage after eof"];
        let bytes = parse_to_vec(lines).unwrap();
        assert_eq!(bytes, vec![(0, 0x11)]);
    }

    #[test]
    fn errors_carry_record_number() {
        let err = parse_to_vec([":0100000011EE", "blah"]).unwrap_err();
        match err {
            Error::Format { record, source } => {
                assert_eq!(record, 2);
                assert_eq!(source, HexError::MissingStartCode);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn extended_address_requires_two_bytes() {
        let err = parse_to_vec([":0100000401FA"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(
            err.to_string(),
            "hex record #1: extended linear address record must carry 2 bytes, got 1"
        );
    }

    #[test]
    fn segment_records_are_rejected() {
        for line in [":020000021000EC", ":0400000300003800C1", ":04000005000000CD2A"] {
            let err = parse_to_vec([line]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format, "{line}");
        }
    }

    #[test]
    fn callback_errors_are_annotated() {
        let err = parse(
            [":0100000011EE"],
            |_, _| Err(Error::Range("address 0 does not exist".into())),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert_eq!(err.to_string(), "hex record #1: address 0 does not exist");
    }
}
