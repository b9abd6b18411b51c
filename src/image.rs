// Loaded firmware image: a CPU's memory map plus its declared variables.
//
// Provides the high-level API that ties the pieces together:
//   - HEX decoding into the memory map
//   - Typed variable reads and writes through the map
//   - HEX encoding of the whole map
//   - Diffs against another image

use log::{debug, info};

use crate::cpu::CpuDescriptor;
use crate::diff::{self, Diff};
use crate::error::{Error, Result, ResultExt};
use crate::hex::{self, EncodeOptions};
use crate::memory::{Endian, MemoryMap};
use crate::variable::{Value, Variable};

/// A CPU memory map and the variables living in it.
#[derive(Debug, Clone)]
pub struct Image {
    cpu: CpuDescriptor,
    map: MemoryMap,
    variables: Vec<Variable>,
}

impl Image {
    /// Build an empty image for `cpu`, checking that every variable lands in
    /// an existing region.
    pub fn new(cpu: CpuDescriptor, variables: Vec<Variable>) -> Result<Self> {
        let map = cpu.build_map()?;

        for (i, v) in variables.iter().enumerate() {
            let region = map
                .lookup(v.region())
                .with_context(|| format!("variable '{}'", v.name()))?;
            if !region.address_exists(v.address()) {
                return Err(Error::Config(format!(
                    "variable '{}' address {:#X} is outside region '{}'",
                    v.name(),
                    v.address(),
                    region.name()
                )));
            }
            if variables[..i]
                .iter()
                .any(|other| other.name().eq_ignore_ascii_case(v.name()))
            {
                return Err(Error::Config(format!(
                    "variable '{}' declared more than once",
                    v.name()
                )));
            }
        }

        debug!(
            "image for {}: {} regions, {} variables",
            cpu.name,
            map.len(),
            variables.len()
        );
        Ok(Self { cpu, map, variables })
    }

    pub fn cpu(&self) -> &CpuDescriptor {
        &self.cpu
    }

    pub fn map(&self) -> &MemoryMap {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut MemoryMap {
        &mut self.map
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Decode HEX `lines` into the map. Returns the number of data bytes.
    pub fn mount_hex<I, S>(&mut self, lines: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut count = 0usize;
        let map = &mut self.map;
        hex::parse(lines, |address, byte| {
            map.write_byte(address, byte, None)?;
            count += 1;
            Ok(())
        })
        .inspect_err(|_| debug!("mount stopped after {count} bytes"))?;
        info!("mounted {count} bytes into {}", self.cpu.name);
        Ok(count)
    }

    /// The variable called `name` (case-insensitive).
    pub fn variable(&self, name: &str) -> Result<&Variable> {
        find_variable(&self.variables, name)
    }

    /// Current value of variable `name`, or `None` if it is not present.
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        let v = self.variable(name)?;
        read_variable(&self.map, v)
            .with_context(|| format!("error reading variable '{}'", v.name()))
    }

    /// Write `value` to variable `name`. A null value leaves memory as is.
    pub fn set(&mut self, name: &str, value: Option<&Value>) -> Result<()> {
        let v = find_variable(&self.variables, name)?;
        write_variable(&mut self.map, v, value)
            .with_context(|| format!("error writing variable '{}'", v.name()))
    }

    /// Parse `text` for variable `name` and write it.
    pub fn set_text(&mut self, name: &str, text: &str) -> Result<()> {
        let value = self
            .variable(name)?
            .parse_value(text)
            .with_context(|| format!("error writing variable '{name}'"))?;
        self.set(name, value.as_ref())
    }

    /// Write every variable's configured default value.
    pub fn apply_defaults(&mut self) -> Result<()> {
        for v in &self.variables {
            write_variable(&mut self.map, v, v.default_value())
                .with_context(|| format!("error writing variable '{}'", v.name()))?;
        }
        debug!("applied {} default values", self.variables.len());
        Ok(())
    }

    /// Encode every region, in map order, as HEX lines.
    pub fn to_hex(&self, opts: &EncodeOptions) -> Result<Vec<String>> {
        hex::encode(&self.map.blocks(), opts)
    }

    /// Compare `other` against this image, labelled `base_name`.
    pub fn diff(&self, other: &Image, base_name: &str) -> Vec<Diff> {
        diff::diff(&self.map, &other.map, base_name)
    }
}

fn find_variable<'a>(variables: &'a [Variable], name: &str) -> Result<&'a Variable> {
    variables
        .iter()
        .find(|v| v.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::Config(format!("variable not found ('{name}')")))
}

fn read_variable(map: &MemoryMap, v: &Variable) -> Result<Option<Value>> {
    let region = map.lookup(v.region())?;
    let raw = region.read_object(v.address(), v.byte_len())?;
    v.deserialize(&raw, Endian::Little)
}

fn write_variable(map: &mut MemoryMap, v: &Variable, value: Option<&Value>) -> Result<()> {
    let raw = v.serialize(value, Endian::Little)?;
    let Some(bytes) = raw.into_iter().collect::<Option<Vec<u8>>>() else {
        return Ok(());
    };
    map.lookup_mut(v.region())?.write_object(&bytes, v.address())
}
