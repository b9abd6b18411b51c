// CPU descriptors and the built-in catalog.
//
// A descriptor names a CPU and lays out its memory regions. Descriptors come
// either from the static catalog, looked up by name or alias, or inline from
// a meta file.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::memory::{Endian, MemoryMap, RegionConfig};

/// Everything needed to build a CPU's memory map.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CpuDescriptor {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Instruction width in bits.
    pub instruction_size: u32,
    /// Instruction used to pack data into program memory, if any.
    #[serde(default)]
    pub padding_instruction: Option<u64>,
    #[serde(default)]
    pub memories: BTreeMap<String, RegionConfig>,
}

impl CpuDescriptor {
    /// Check the descriptor and build an empty memory map from it.
    pub fn build_map(&self) -> Result<MemoryMap> {
        if self.instruction_size < 1 {
            return Err(Error::Config(format!(
                "instruction_size for cpu '{}' must be at least 1",
                self.name
            )));
        }
        if self.memories.is_empty() {
            return Err(Error::Config(format!(
                "cpu '{}' has no memories defined",
                self.name
            )));
        }
        MemoryMap::build(
            self.memories
                .iter()
                .map(|(name, config)| (name.clone(), config.clone())),
        )
        .map_err(|e| e.context(format!("cpu '{}'", self.name)))
    }

    /// Whether `name` is this CPU's canonical name or one of its aliases.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for CpuDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.aliases.is_empty() {
            write!(f, " ({})", self.aliases.join(", "))?;
        }
        write!(f, ", {}-bit instructions", self.instruction_size)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// `retlw` on the PIC16 enhanced mid-range core.
const PIC16_RETLW: u64 = 0x34;

/// All CPUs known without a meta file.
pub fn catalog() -> Vec<CpuDescriptor> {
    vec![CpuDescriptor {
        name: "pic16f1516".into(),
        aliases: vec!["p16f1516".into()],
        instruction_size: 14,
        padding_instruction: Some(PIC16_RETLW),
        memories: BTreeMap::from([
            (
                "flash".to_string(),
                RegionConfig::cells(0, 0xFFFF, 2, 0, PIC16_RETLW).with_endian(Endian::Little),
            ),
            ("config_words".to_string(), RegionConfig::bytes(0x1_0000, 32)),
        ]),
    }]
}

/// Split a comma separated list of CPU names, lowercased, empties dropped.
pub fn parse_names(raw: &str) -> Result<Vec<String>> {
    let names: Vec<String> = raw
        .split(',')
        .map(|n| n.trim().to_ascii_lowercase())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return Err(Error::Config("no cpu name provided".into()));
    }
    Ok(names)
}

/// Resolve a comma separated list of names against the catalog.
///
/// The first name is tried as a canonical name; failing that, the first
/// entry with an alias matching any of the names wins.
pub fn resolve(raw: &str) -> Result<CpuDescriptor> {
    let names = parse_names(raw)?;
    let known = catalog();

    let found = known
        .iter()
        .find(|cpu| cpu.name.eq_ignore_ascii_case(&names[0]))
        .or_else(|| {
            known.iter().find(|cpu| {
                cpu.aliases
                    .iter()
                    .any(|a| names.iter().any(|n| a.eq_ignore_ascii_case(n)))
            })
        });

    match found {
        Some(cpu) => {
            debug!("cpu '{raw}' resolved to {}", cpu.name);
            Ok(cpu.clone())
        }
        None => Err(Error::Config(format!(
            "no matching cpu found from '{}'",
            names.join(", ")
        ))),
    }
}
