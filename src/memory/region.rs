// A single named, permissioned, cell-packed memory region.
//
// Addresses are logical units. Some devices store each logical data byte in a
// wider physical cell (for example 14-bit flash words holding `retlw` data),
// so object reads and writes work cell-by-cell: `cell_size` bytes per unit,
// the real data byte at `data_index`, and the remaining positions filled from
// `padding`.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::Deserialize;

use super::buffer::SparseBuffer;
use crate::error::{Error, Result};

/// An absolute address in the 32-bit HEX address space.
pub type Address = u32;

// ---------------------------------------------------------------------------
// Endianness
// ---------------------------------------------------------------------------

/// Byte order of multi-byte cells and object reads/writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl FromStr for Endian {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "little" => Ok(Self::Little),
            "big" => Ok(Self::Big),
            other => Err(Error::Config(format!(
                "endian can only be 'big' or 'little', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => f.write_str("little"),
            Self::Big => f.write_str("big"),
        }
    }
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

bitflags! {
    /// Access rights of a region.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::READ | Self::WRITE
    }
}

impl FromStr for Permissions {
    type Err = Error;

    /// Parse a collection of `r`/`w` flags, case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        s.chars().try_fold(Self::empty(), |acc, c| match c {
            'r' | 'R' => Ok(acc | Self::READ),
            'w' | 'W' => Ok(acc | Self::WRITE),
            _ => Err(Error::Config(format!(
                "permissions can only be a collection of r/w flags, got '{s}'"
            ))),
        })
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Self::READ) {
            f.write_str("r")?;
        }
        if self.contains(Self::WRITE) {
            f.write_str("w")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Layout of one region as supplied by the CPU catalog or a meta file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    pub start_address: Address,
    pub size: u32,
    pub cell_size: u32,
    #[serde(default)]
    pub padding: Option<u64>,
    #[serde(default)]
    pub data_index: Option<u32>,
    #[serde(default)]
    pub endian: Option<Endian>,
    #[serde(default)]
    pub permissions: Option<String>,
}

impl RegionConfig {
    /// A plain byte-per-address region.
    pub fn bytes(start_address: Address, size: u32) -> Self {
        Self {
            start_address,
            size,
            cell_size: 1,
            padding: None,
            data_index: None,
            endian: None,
            permissions: None,
        }
    }

    /// A region storing each data byte in a `cell_size`-byte cell.
    pub fn cells(
        start_address: Address,
        size: u32,
        cell_size: u32,
        data_index: u32,
        padding: u64,
    ) -> Self {
        Self {
            cell_size,
            data_index: Some(data_index),
            padding: Some(padding),
            ..Self::bytes(start_address, size)
        }
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    pub fn with_permissions(mut self, permissions: &str) -> Self {
        self.permissions = Some(permissions.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// MemoryRegion
// ---------------------------------------------------------------------------

/// One contiguous, named span of addressable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    name: String,
    start_address: Address,
    size: u32,
    cell_size: usize,
    data_index: usize,
    padding: u64,
    endian: Endian,
    permissions: Permissions,
    contents: SparseBuffer,
}

impl MemoryRegion {
    /// Validate `config` and build an empty region.
    pub fn new(name: impl Into<String>, config: &RegionConfig) -> Result<Self> {
        let name = name.into();
        let invalid = |what: &str| Error::Config(format!("{what} ('{name}')"));

        if name.trim().is_empty() {
            return Err(Error::Config("region name cannot be empty".into()));
        }
        if config.size < 1 {
            return Err(invalid("size cannot be less than 1"));
        }
        if u64::from(config.start_address) + u64::from(config.size) > 1 << 32 {
            return Err(invalid("region extends past the 32-bit address space"));
        }
        if config.cell_size < 1 {
            return Err(invalid("cell_size cannot be less than 1"));
        }

        let (data_index, padding) = if config.cell_size > 1 {
            let data_index = config
                .data_index
                .ok_or_else(|| invalid("data_index missing"))?;
            if data_index >= config.cell_size {
                return Err(invalid("data_index cannot be >= cell_size"));
            }
            let padding = config.padding.ok_or_else(|| invalid("padding missing"))?;
            (data_index as usize, padding)
        } else {
            (0, 0)
        };

        let permissions = match &config.permissions {
            Some(p) => p.parse().map_err(|e: Error| e.context(format!("region '{name}'")))?,
            None => Permissions::default(),
        };

        Ok(Self {
            contents: SparseBuffer::new(config.size as usize),
            name,
            start_address: config.start_address,
            size: config.size,
            cell_size: config.cell_size as usize,
            data_index,
            padding,
            endian: config.endian.unwrap_or_default(),
            permissions,
        })
    }

    // --- Accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_address(&self) -> Address {
        self.start_address
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// One past the last address, widened so it cannot overflow.
    pub fn end_address(&self) -> u64 {
        u64::from(self.start_address) + u64::from(self.size)
    }

    pub fn cell_size(&self) -> usize {
        self.cell_size
    }

    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn padding(&self) -> u64 {
        self.padding
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn set_permissions(&mut self, permissions: Permissions) {
        self.permissions = permissions;
    }

    pub fn is_readable(&self) -> bool {
        self.permissions.contains(Permissions::READ)
    }

    pub fn is_writeable(&self) -> bool {
        self.permissions.contains(Permissions::WRITE)
    }

    pub fn contents(&self) -> &SparseBuffer {
        &self.contents
    }

    // --- Address conversion ---

    /// Buffer index of `address`, if it lies within the region.
    pub fn address_to_index(&self, address: Address) -> Option<usize> {
        if address < self.start_address || u64::from(address) >= self.end_address() {
            return None;
        }
        Some((address - self.start_address) as usize)
    }

    pub fn address_exists(&self, address: Address) -> bool {
        self.address_to_index(address).is_some()
    }

    /// Address of buffer position `index`, or `None` past the region's end.
    pub fn index_to_address(&self, index: usize) -> Option<Address> {
        if index >= self.size as usize {
            return None;
        }
        Some(self.start_address + index as u32)
    }

    // --- Single-byte access ---

    pub fn read_byte(&self, address: Address) -> Result<Option<u8>> {
        self.check_readable()?;
        let index = self.index_of(address)?;
        Ok(self.contents.get(index))
    }

    pub fn write_byte(&mut self, address: Address, byte: u8) -> Result<()> {
        self.check_writeable()?;
        let index = self.index_of(address)?;
        self.contents.set(index, byte);
        Ok(())
    }

    // --- Cell-aware object access ---

    /// Store logical little-endian `bytes` at `address`, one cell per byte.
    pub fn write_object(&mut self, bytes: &[u8], address: Address) -> Result<()> {
        self.check_writeable()?;
        let index = self.aligned_index_of(address)?;

        let mut logical = bytes.to_vec();
        if self.endian == Endian::Big {
            logical.reverse();
        }

        let physical = if self.cell_size == 1 {
            logical
        } else {
            let filler = self.cell_padding();
            let mut out = Vec::with_capacity(logical.len() * self.cell_size);
            for &b in &logical {
                let mut cell = filler.clone();
                cell.insert(self.data_index, b);
                out.extend_from_slice(&cell);
            }
            out
        };

        if !self.contents.set_slice(index, &physical) {
            return Err(Error::Range(format!(
                "object of {} bytes at address {address:#X} does not fit in '{}'",
                physical.len(),
                self.name
            )));
        }
        Ok(())
    }

    /// Read `count` logical bytes starting at `address`.
    ///
    /// Unset cells come back as `None`. The result is little-endian; a
    /// big-endian region's bytes are reversed before returning.
    pub fn read_object(&self, address: Address, count: usize) -> Result<Vec<Option<u8>>> {
        self.check_readable()?;
        let index = self.aligned_index_of(address)?;

        let fits = count
            .checked_mul(self.cell_size)
            .and_then(|n| n.checked_add(index))
            .is_some_and(|end| end <= self.size as usize);
        if !fits {
            return Err(Error::Range(format!(
                "object of {count} cells at address {address:#X} does not fit in '{}'",
                self.name
            )));
        }

        let mut out: Vec<Option<u8>> = (0..count)
            .map(|i| self.contents.get(index + i * self.cell_size + self.data_index))
            .collect();
        if self.endian == Endian::Big {
            out.reverse();
        }
        Ok(out)
    }

    // --- Internals ---

    /// The `cell_size - 1` filler bytes of one cell: successive low bytes of
    /// `padding`, reversed for big-endian regions.
    fn cell_padding(&self) -> Vec<u8> {
        let mut filler: Vec<u8> = (0..self.cell_size - 1)
            .map(|i| {
                let shift = u32::try_from(8 * i).unwrap_or(u32::MAX);
                self.padding.checked_shr(shift).unwrap_or(0) as u8
            })
            .collect();
        if self.endian == Endian::Big {
            filler.reverse();
        }
        filler
    }

    fn check_readable(&self) -> Result<()> {
        if self.is_readable() {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "'{}' is not readable (permissions: '{}')",
                self.name, self.permissions
            )))
        }
    }

    fn check_writeable(&self) -> Result<()> {
        if self.is_writeable() {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "'{}' is not writeable (permissions: '{}')",
                self.name, self.permissions
            )))
        }
    }

    fn index_of(&self, address: Address) -> Result<usize> {
        self.address_to_index(address).ok_or_else(|| {
            Error::Range(format!(
                "address {address:#X} for '{}' is beyond range",
                self.name
            ))
        })
    }

    fn aligned_index_of(&self, address: Address) -> Result<usize> {
        let index = self.index_of(address)?;
        if index % self.cell_size != 0 {
            return Err(Error::Range(format!(
                "address {address:#X} for '{}' is not cell-aligned",
                self.name
            )));
        }
        Ok(index)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
