// Structural comparison of two loaded images.
//
// Regions present in only one map produce a region-level diff. Regions
// present in both are compared position by position. All region-level diffs
// come first, then cell-level diffs in region order and index order.

use std::fmt;

use log::debug;
use serde::Serialize;

use crate::memory::{Address, MemoryMap, MemoryRegion};

/// How a region or cell differs between the base and the other image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffType {
    /// Present only in the other image.
    #[serde(rename = "+")]
    Added,
    /// Present only in the base image.
    #[serde(rename = "-")]
    Removed,
    /// Present in both with different values.
    #[serde(rename = "~")]
    Changed,
}

impl DiffType {
    pub fn symbol(self) -> char {
        match self {
            Self::Added => '+',
            Self::Removed => '-',
            Self::Changed => '~',
        }
    }

    fn classify<T: PartialEq>(base: Option<T>, other: Option<T>) -> Option<Self> {
        match (base, other) {
            (Some(b), Some(o)) if b == o => None,
            (Some(_), Some(_)) => Some(Self::Changed),
            (Some(_), None) => Some(Self::Removed),
            (None, Some(_)) => Some(Self::Added),
            (None, None) => None,
        }
    }
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// ---------------------------------------------------------------------------
// Diff records
// ---------------------------------------------------------------------------

/// A region present in only one of the images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryDiff {
    pub region_name: String,
    pub region_size: u32,
    pub diff_type: DiffType,
}

impl MemoryDiff {
    /// Build a diff for a region found in `in_base`/`in_other`, or `None`
    /// when it is in both or neither.
    pub fn classify(
        region_name: impl Into<String>,
        region_size: u32,
        in_base: bool,
        in_other: bool,
    ) -> Option<Self> {
        let diff_type = DiffType::classify(in_base.then_some(()), in_other.then_some(()))?;
        Some(Self {
            region_name: region_name.into(),
            region_size,
            diff_type,
        })
    }
}

impl fmt::Display for MemoryDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} bytes)",
            self.diff_type, self.region_name, self.region_size
        )
    }
}

/// A single byte position that differs between the images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryCellDiff {
    pub region_name: String,
    pub region_size: u32,
    pub diff_type: DiffType,
    pub address: Address,
    pub base_value: Option<u8>,
    pub other_value: Option<u8>,
    /// Display name of the base image.
    pub base_name: String,
}

impl MemoryCellDiff {
    /// Build a diff for one position, or `None` when the values match.
    pub fn classify(
        region_name: impl Into<String>,
        region_size: u32,
        address: Address,
        base_value: Option<u8>,
        other_value: Option<u8>,
        base_name: impl Into<String>,
    ) -> Option<Self> {
        let diff_type = DiffType::classify(base_value, other_value)?;
        Some(Self {
            region_name: region_name.into(),
            region_size,
            diff_type,
            address,
            base_value,
            other_value,
            base_name: base_name.into(),
        })
    }
}

impl fmt::Display for MemoryCellDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {:#06X} : ",
            self.diff_type, self.region_name, self.address
        )?;
        match (self.base_value, self.other_value) {
            (Some(b), Some(o)) => write!(f, "'{o:#04X}' ({} is '{b:#04X}')", self.base_name),
            (None, Some(v)) | (Some(v), None) => write!(f, "'{v:#04X}'"),
            (None, None) => Ok(()),
        }
    }
}

/// One entry of a diff listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Diff {
    Region(MemoryDiff),
    Cell(MemoryCellDiff),
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Region(d) => fmt::Display::fmt(d, f),
            Self::Cell(d) => fmt::Display::fmt(d, f),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Compare `other` against `base`. `base_name` labels the base image in
/// changed-cell output.
pub fn diff(base: &MemoryMap, other: &MemoryMap, base_name: &str) -> Vec<Diff> {
    let mut out = Vec::new();

    for region in base {
        if other.find(region.name()).is_none() {
            out.extend(
                MemoryDiff::classify(region.name(), region.size(), true, false).map(Diff::Region),
            );
        }
    }
    for region in other {
        if base.find(region.name()).is_none() {
            out.extend(
                MemoryDiff::classify(region.name(), region.size(), false, true).map(Diff::Region),
            );
        }
    }
    let region_diffs = out.len();

    for b in base {
        if let Some(o) = other.find(b.name()) {
            diff_region(b, o, base_name, &mut out);
        }
    }

    debug!(
        "diff: {region_diffs} region differences, {} cell differences",
        out.len() - region_diffs
    );
    out
}

fn diff_region(base: &MemoryRegion, other: &MemoryRegion, base_name: &str, out: &mut Vec<Diff>) {
    let len = base.contents().capacity().max(other.contents().capacity());
    for i in 0..len {
        let (b, o) = (base.contents().get(i), other.contents().get(i));
        if b == o {
            continue;
        }
        // Positions past the base region's end take the other region's
        // addressing.
        let Some(address) = base.index_to_address(i).or_else(|| other.index_to_address(i)) else {
            continue;
        };
        out.extend(
            MemoryCellDiff::classify(base.name(), base.size(), address, b, o, base_name)
                .map(Diff::Cell),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RegionConfig;

    fn image(regions: &[(&str, u32, u32)]) -> MemoryMap {
        MemoryMap::build(
            regions
                .iter()
                .map(|&(name, start, size)| (name, RegionConfig::bytes(start, size))),
        )
        .unwrap()
    }

    #[test]
    fn region_diff_display() {
        let d = MemoryDiff::classify("flash", 0xFFFF, true, false).unwrap();
        assert_eq!(d.diff_type, DiffType::Removed);
        assert_eq!(d.to_string(), "- flash (65535 bytes)");

        let d = MemoryDiff::classify("flash", 0xFFFF, false, true).unwrap();
        assert_eq!(d.to_string(), "+ flash (65535 bytes)");

        assert!(MemoryDiff::classify("flash", 0xFFFF, true, true).is_none());
        assert!(MemoryDiff::classify("flash", 0xFFFF, false, false).is_none());
    }

    #[test]
    fn cell_diff_classification() {
        assert!(MemoryCellDiff::classify("flash", 0xFFFF, 23, Some(1), Some(1), "base").is_none());

        let d = MemoryCellDiff::classify("flash", 0xFFFF, 23, Some(1), None, "base").unwrap();
        assert_eq!(d.diff_type, DiffType::Removed);
        assert_eq!(d.base_value, Some(1));
        assert_eq!(d.other_value, None);

        let d = MemoryCellDiff::classify("flash", 0xFFFF, 23, None, Some(2), "base").unwrap();
        assert_eq!(d.diff_type, DiffType::Added);

        let d = MemoryCellDiff::classify("flash", 0xFFFF, 23, Some(1), Some(2), "base").unwrap();
        assert_eq!(d.diff_type, DiffType::Changed);
    }

    #[test]
    fn cell_diff_display() {
        let changed = MemoryCellDiff::classify("flash", 0xFFFF, 23, Some(2), Some(3), "base");
        assert_eq!(
            changed.unwrap().to_string(),
            "~ flash @ 0x0017 : '0x03' (base is '0x02')"
        );
        let added = MemoryCellDiff::classify("flash", 0xFF, 1, None, Some(0x12), "base");
        assert_eq!(added.unwrap().to_string(), "+ flash @ 0x0001 : '0x12'");
        let removed = MemoryCellDiff::classify("flash", 0xFF, 1, Some(0x45), None, "base");
        assert_eq!(removed.unwrap().to_string(), "- flash @ 0x0001 : '0x45'");
    }

    #[test]
    fn identical_images_have_no_diff() {
        let mut a = image(&[("flash", 0, 0x100), ("eeprom", 0x1000, 16)]);
        a.write_byte(0x10, 1, None).unwrap();
        a.write_byte(0x1001, 2, None).unwrap();
        assert!(diff(&a, &a.clone(), "base").is_empty());
    }

    #[test]
    fn single_changed_byte() {
        let mut base = image(&[("flash", 0, 0xFFFF)]);
        base.write_byte(0x3F00, 0xE6, None).unwrap();
        let mut other = base.clone();
        other.write_byte(0x3F00, 0xD5, None).unwrap();

        let diffs = diff(&base, &other, "sample");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].to_string(), "~ flash @ 0x3F00 : '0xD5' (sample is '0xE6')");
    }

    #[test]
    fn region_diffs_come_first() {
        let mut base = image(&[("flash", 0, 16), ("eeprom", 0x100, 8)]);
        let mut other = image(&[("flash", 0, 16), ("config", 0x200, 4)]);
        base.write_byte(3, 9, None).unwrap();
        other.write_byte(4, 9, None).unwrap();

        let rendered: Vec<String> = diff(&base, &other, "base")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            rendered,
            [
                "- eeprom (8 bytes)",
                "+ config (4 bytes)",
                "- flash @ 0x0003 : '0x09'",
                "+ flash @ 0x0004 : '0x09'",
            ]
        );
    }

    #[test]
    fn longer_other_region_uses_other_addressing() {
        let base = image(&[("flash", 0x10, 4)]);
        let mut other = image(&[("flash", 0x20, 8)]);
        other.write_byte(0x21, 0xAA, None).unwrap();
        other.write_byte(0x26, 0xBB, None).unwrap();

        let diffs = diff(&base, &other, "base");
        let addresses: Vec<Address> = diffs
            .iter()
            .map(|d| match d {
                Diff::Cell(c) => c.address,
                Diff::Region(_) => panic!("unexpected region diff"),
            })
            .collect();
        assert_eq!(addresses, [0x11, 0x26]);
    }
}
