use firmpatch::diff::{self, Diff, DiffType};
use firmpatch::hex::{self, Block, EncodeOptions};
use firmpatch::memory::{Endian, MemoryMap, MemoryRegion, RegionConfig};
use firmpatch::variable::{Value, VarType, Variable};
use proptest::prelude::*;

fn endian() -> impl Strategy<Value = Endian> {
    prop_oneof![Just(Endian::Little), Just(Endian::Big)]
}

/// Clamp `raw` into the range of an integer `size` bytes wide.
fn fit(raw: i128, size: usize, signed: bool) -> i128 {
    let shift = 128 - 8 * size as u32;
    if signed {
        (raw << shift) >> shift
    } else if size == 16 {
        raw & i128::MAX
    } else {
        raw & ((1i128 << (8 * size)) - 1)
    }
}

fn ram_map(contents: &[Option<u8>]) -> MemoryMap {
    let mut map = MemoryMap::build([("ram", RegionConfig::bytes(0x100, 256))]).unwrap();
    for (i, b) in contents.iter().enumerate() {
        if let Some(b) = b {
            map.write_byte(0x100 + i as u32, *b, None).unwrap();
        }
    }
    map
}

proptest! {
    #[test]
    fn prop_hex_encode_parse_roundtrip(
        start in 0u32..0x3_0000,
        contents in proptest::collection::vec(proptest::option::of(any::<u8>()), 0..600),
        record_length in 1usize..=255
    ) {
        let block = Block { start_address: start, contents: &contents };
        let lines = hex::encode(&[block], &EncodeOptions { max_record_length: record_length }).unwrap();
        prop_assert_eq!(lines.last().map(String::as_str), Some(hex::END_OF_FILE_LINE));

        let parsed = hex::parse_to_vec(&lines).unwrap();
        let expected: Vec<(u32, u8)> = contents
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.map(|b| (start + i as u32, b)))
            .collect();
        prop_assert_eq!(parsed, expected);
    }

    #[test]
    fn prop_integer_variable_roundtrip(
        size in 1usize..=16,
        signed in any::<bool>(),
        raw in any::<i128>(),
        order in endian()
    ) {
        let value = fit(raw, size, signed);
        let var_type = VarType::Integer { bits: 8 * size as u16, signed };
        let v = Variable::new("v", size, var_type, 0, "ram").unwrap();

        let bytes = v.serialize(Some(&Value::Integer(value)), order).unwrap();
        prop_assert_eq!(bytes.len(), size);
        prop_assert!(bytes.iter().all(Option::is_some));
        prop_assert_eq!(v.deserialize(&bytes, order).unwrap(), Some(Value::Integer(value)));
    }

    #[test]
    fn prop_char_array_roundtrip(
        text in "[a-zA-Z0-9 _.-]{0,15}",
        order in endian()
    ) {
        let v = Variable::new("label", 1, VarType::Char, 0, "ram")
            .unwrap()
            .with_array_depth(16)
            .unwrap();
        let bytes = v.serialize(Some(&Value::Text(text.clone())), order).unwrap();
        prop_assert_eq!(v.deserialize(&bytes, order).unwrap(), Some(Value::Text(text)));
    }

    #[test]
    fn prop_region_object_roundtrip(
        cell_size in 1u32..=4,
        index_seed in any::<u32>(),
        padding in any::<u64>(),
        order in endian(),
        bytes in proptest::collection::vec(any::<u8>(), 1..16),
        slot in 0u32..8
    ) {
        let data_index = index_seed % cell_size;
        let config = RegionConfig::cells(0x400, 64 * cell_size, cell_size, data_index, padding)
            .with_endian(order);
        let mut region = MemoryRegion::new("m", &config).unwrap();
        let address = 0x400 + slot * cell_size;

        region.write_object(&bytes, address).unwrap();
        let read = region.read_object(address, bytes.len()).unwrap();
        prop_assert_eq!(read, bytes.iter().copied().map(Some).collect::<Vec<_>>());
        prop_assert_eq!(
            region.contents().defined_count(),
            bytes.len() * cell_size as usize
        );
    }

    #[test]
    fn prop_diff_against_self_is_empty(
        contents in proptest::collection::vec(proptest::option::of(any::<u8>()), 256)
    ) {
        let map = ram_map(&contents);
        prop_assert!(diff::diff(&map, &map, "base").is_empty());
    }

    #[test]
    fn prop_single_change_is_reported_once(
        contents in proptest::collection::vec(any::<u8>(), 256),
        position in 0usize..256,
        delta in 1u8..=255
    ) {
        let defined: Vec<Option<u8>> = contents.iter().copied().map(Some).collect();
        let base = ram_map(&defined);
        let mut other = base.clone();
        let address = 0x100 + position as u32;
        other.write_byte(address, contents[position].wrapping_add(delta), None).unwrap();

        let diffs = diff::diff(&base, &other, "base");
        prop_assert_eq!(diffs.len(), 1);
        let Diff::Cell(cell) = &diffs[0] else {
            return Err(TestCaseError::fail("expected a cell diff"));
        };
        prop_assert_eq!(cell.diff_type, DiffType::Changed);
        prop_assert_eq!(cell.address, address);
    }
}
