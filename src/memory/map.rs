// Ordered, non-overlapping collection of memory regions.

use log::debug;

use super::region::{Address, MemoryRegion, RegionConfig};
use crate::error::{Error, Result};
use crate::hex::Block;

/// The complete addressable storage of one CPU.
///
/// Regions are kept sorted by start address and never overlap. The map is
/// the sole owner of its regions; everything else refers to them by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
}

impl MemoryMap {
    /// Build a map from named region configurations.
    pub fn build<I, S>(configs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, RegionConfig)>,
        S: Into<String>,
    {
        let mut regions = configs
            .into_iter()
            .map(|(name, config)| MemoryRegion::new(name, &config))
            .collect::<Result<Vec<_>>>()?;

        if regions.is_empty() {
            return Err(Error::Config("memory map has no regions".into()));
        }
        regions.sort_by_key(|r| r.start_address());

        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                if a.name().eq_ignore_ascii_case(b.name()) {
                    return Err(Error::Config(format!(
                        "region '{}' defined more than once",
                        b.name()
                    )));
                }
                if a.address_exists(b.start_address()) || b.address_exists(a.start_address()) {
                    return Err(Error::Config(format!(
                        "regions overlap: '{}' ({}, {}) and '{}' ({}, {})",
                        a.name(),
                        a.start_address(),
                        a.size(),
                        b.name(),
                        b.start_address(),
                        b.size()
                    )));
                }
            }
        }

        debug!(
            "memory map: {}",
            regions
                .iter()
                .map(|r| format!("{}@{:#X}+{:#X}", r.name(), r.start_address(), r.size()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { regions })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MemoryRegion> {
        self.regions.iter()
    }

    /// The region called `name` (case-insensitive), if any.
    pub fn find(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions
            .iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
    }

    /// The region called `name` (case-insensitive).
    pub fn lookup(&self, name: &str) -> Result<&MemoryRegion> {
        self.find(name).ok_or_else(|| unknown_region(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Result<&mut MemoryRegion> {
        self.regions
            .iter_mut()
            .find(|r| r.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| unknown_region(name))
    }

    /// The region at map position `index`.
    pub fn get(&self, index: usize) -> Result<&MemoryRegion> {
        self.regions.get(index).ok_or_else(|| {
            Error::Config(format!(
                "no region at position {index} (map has {})",
                self.regions.len()
            ))
        })
    }

    /// The first region containing `address`.
    pub fn region_for(&self, address: Address) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.address_exists(address))
    }

    pub fn address_exists(&self, address: Address) -> bool {
        self.region_for(address).is_some()
    }

    /// Write one byte, routed by `region` name or else by address.
    pub fn write_byte(&mut self, address: Address, byte: u8, region: Option<&str>) -> Result<()> {
        let target = match region {
            Some(name) => self.lookup_mut(name)?,
            None => self
                .regions
                .iter_mut()
                .find(|r| r.address_exists(address))
                .ok_or_else(|| unmapped(address))?,
        };
        target.write_byte(address, byte)
    }

    /// Read one byte, routed by `region` name or else by address.
    pub fn read_byte(&self, address: Address, region: Option<&str>) -> Result<Option<u8>> {
        let target = match region {
            Some(name) => self.lookup(name)?,
            None => self.region_for(address).ok_or_else(|| unmapped(address))?,
        };
        target.read_byte(address)
    }

    /// Region names and sizes, in map order.
    pub fn list(&self) -> Vec<(&str, u32)> {
        self.regions.iter().map(|r| (r.name(), r.size())).collect()
    }

    /// One encoder block per region, in map order.
    pub fn blocks(&self) -> Vec<Block<'_>> {
        self.regions
            .iter()
            .map(|r| Block {
                start_address: r.start_address(),
                contents: r.contents(),
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a MemoryMap {
    type Item = &'a MemoryRegion;
    type IntoIter = std::slice::Iter<'a, MemoryRegion>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn unknown_region(name: &str) -> Error {
    Error::Config(format!("unknown memory region '{name}'"))
}

fn unmapped(address: Address) -> Error {
    Error::Range(format!("address {address:#X} does not belong to any region"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::hex::BlockContents;

    fn map() -> MemoryMap {
        MemoryMap::build([
            ("three", RegionConfig::bytes(30, 5)),
            ("one", RegionConfig::bytes(0, 10)),
            ("two", RegionConfig::bytes(10, 20)),
        ])
        .unwrap()
    }

    #[test]
    fn regions_sorted_by_start() {
        let m = map();
        let names: Vec<&str> = m.iter().map(|r| r.name()).collect();
        assert_eq!(names, ["one", "two", "three"]);
        assert_eq!(m.list(), vec![("one", 10), ("two", 20), ("three", 5)]);
        assert_eq!(m.get(1).unwrap().name(), "two");
        assert_eq!(m.get(3).unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn overlap_is_rejected() {
        let err = MemoryMap::build([
            ("a", RegionConfig::bytes(0, 10)),
            ("b", RegionConfig::bytes(5, 10)),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = MemoryMap::build([
            ("one", RegionConfig::bytes(0, 10)),
            ("two", RegionConfig::bytes(10, 20)),
            ("three", RegionConfig::bytes(29, 5)),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: regions overlap: 'two' (10, 20) and 'three' (29, 5)"
        );
    }

    #[test]
    fn contained_region_is_an_overlap() {
        let err = MemoryMap::build([
            ("outer", RegionConfig::bytes(0, 100)),
            ("inner", RegionConfig::bytes(10, 5)),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = MemoryMap::build([
            ("flash", RegionConfig::bytes(0, 10)),
            ("FLASH", RegionConfig::bytes(10, 10)),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(MemoryMap::build(Vec::<(String, RegionConfig)>::new()).is_err());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let m = map();
        assert_eq!(m.lookup("TWO").unwrap().start_address(), 10);
        let err = m.lookup("four").unwrap_err();
        assert_eq!(err.to_string(), "configuration error: unknown memory region 'four'");
    }

    #[test]
    fn bytes_route_by_address() {
        let mut m = map();
        m.write_byte(9, 0xAA, None).unwrap();
        m.write_byte(10, 0xBB, None).unwrap();
        m.write_byte(34, 0xCC, None).unwrap();
        assert_eq!(m.lookup("one").unwrap().contents().get(9), Some(0xAA));
        assert_eq!(m.lookup("two").unwrap().contents().get(0), Some(0xBB));
        assert_eq!(m.read_byte(34, None).unwrap(), Some(0xCC));
        assert_eq!(m.read_byte(33, None).unwrap(), None);

        let err = m.write_byte(35, 1, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert!(!m.address_exists(35));
        assert!(m.address_exists(0));
    }

    #[test]
    fn bytes_route_by_region_name() {
        let mut m = map();
        m.write_byte(12, 7, Some("Two")).unwrap();
        assert_eq!(m.read_byte(12, Some("two")).unwrap(), Some(7));
        assert_eq!(m.write_byte(12, 7, Some("one")).unwrap_err().kind(), ErrorKind::Range);
        assert_eq!(m.write_byte(12, 7, Some("six")).unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn blocks_follow_map_order() {
        let m = map();
        let starts: Vec<u32> = m.blocks().iter().map(|b| b.start_address).collect();
        assert_eq!(starts, [0, 10, 30]);
        assert_eq!(m.blocks()[1].contents.len(), 20);
    }
}
