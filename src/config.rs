// Meta file loading.
//
// A meta file names the CPU and declares the variables of an image:
//
//     meta:
//       cpu: pic16f1516
//       data:
//         voltage: { size: 1, type: u8, address: 0x3F00, value: 230, memory_name: flash }
//
// `cpu` is either a comma separated name/alias list resolved through the
// catalog, or an inline CPU descriptor.

use log::debug;
use serde::Deserialize;
use serde_yaml::Mapping;

use crate::cpu::{self, CpuDescriptor};
use crate::error::{Error, Result, ResultExt};
use crate::memory::Address;
use crate::variable::{Value, VarType, Variable, parse_integer};

#[derive(Debug, Deserialize)]
struct MetaFile {
    meta: Meta,
}

/// Parsed contents of a meta file.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub cpu: CpuSpec,
    /// Variable declarations, in file order.
    #[serde(default)]
    pub data: Option<Mapping>,
}

/// How a meta file identifies its CPU.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CpuSpec {
    Names(String),
    Inline(CpuDescriptor),
}

impl CpuSpec {
    pub fn resolve(&self) -> Result<CpuDescriptor> {
        match self {
            Self::Names(names) => cpu::resolve(names),
            Self::Inline(descriptor) => Ok(descriptor.clone()),
        }
    }
}

/// One variable declaration as written in a meta file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    pub size: usize,
    #[serde(rename = "type")]
    pub var_type: String,
    pub address: Address,
    #[serde(default)]
    pub value: serde_yaml::Value,
    pub memory_name: String,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub array_depth: Option<usize>,
}

impl VariableConfig {
    /// Validate the declaration and build a variable called `name`.
    pub fn build(&self, name: &str) -> Result<Variable> {
        let var_type: VarType = self.var_type.parse()?;
        let mut variable = Variable::new(name, self.size, var_type, self.address, &*self.memory_name)?;
        if self.array {
            let depth = self.array_depth.ok_or_else(|| {
                Error::Config(format!("array_depth missing for '{name}' variable"))
            })?;
            variable = variable.with_array_depth(depth)?;
        }
        if self.value.is_null() {
            return Err(Error::Config(format!("value missing for '{name}' variable")));
        }
        let default = yaml_to_value(&self.value, &variable)?;
        Ok(variable.with_default(Some(default)))
    }
}

impl Meta {
    /// Parse a meta document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: MetaFile = serde_yaml::from_str(text)?;
        Ok(file.meta)
    }

    /// Build every declared variable, rejecting duplicate names.
    pub fn variables(&self) -> Result<Vec<Variable>> {
        let Some(data) = &self.data else {
            return Ok(Vec::new());
        };

        let mut variables: Vec<Variable> = Vec::with_capacity(data.len());
        for (key, raw) in data {
            let name = match key {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                other => {
                    return Err(Error::Config(format!("invalid variable name {other:?}")));
                }
            };
            if variables.iter().any(|v| v.name().eq_ignore_ascii_case(&name)) {
                return Err(Error::Config(format!("variable '{name}' declared more than once")));
            }
            let config: VariableConfig = serde_yaml::from_value(raw.clone())
                .with_context(|| format!("variable '{name}'"))?;
            variables.push(config.build(&name)?);
        }

        debug!("meta declares {} variables", variables.len());
        Ok(variables)
    }
}

/// Convert a YAML scalar or sequence into a value for `variable`.
pub fn yaml_to_value(raw: &serde_yaml::Value, variable: &Variable) -> Result<Value> {
    let invalid = || {
        Error::Type(format!(
            "unsupported value {raw:?} for variable '{}'",
            variable.name()
        ))
    };
    match raw {
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .map(Value::Integer)
            .ok_or_else(invalid),
        serde_yaml::Value::String(s) => match variable.var_type() {
            VarType::Integer { .. } => parse_integer(s).map(Value::Integer).ok_or_else(invalid),
            VarType::Bool | VarType::Char => Ok(Value::Text(s.clone())),
        },
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(|item| yaml_to_value(item, variable))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const META: &str = "
meta:
  cpu: pic16f1516
  data:
    voltage: { size: 1, type: u8, address: 0x3F00, value: 230, memory_name: flash }
    label:
      size: 1
      type: char
      address: 0x3F10
      value: abc
      memory_name: flash
      array: true
      array_depth: 6
    offset: { size: 2, type: i16, address: 0x3F02, value: '-0x10', memory_name: flash }
";

    #[test]
    fn parses_names_and_variables_in_order() {
        let meta = Meta::from_yaml(META).unwrap();
        assert_eq!(meta.cpu, CpuSpec::Names("pic16f1516".into()));
        assert_eq!(meta.cpu.resolve().unwrap().name, "pic16f1516");

        let vars = meta.variables().unwrap();
        let names: Vec<&str> = vars.iter().map(|v| v.name()).collect();
        assert_eq!(names, ["voltage", "label", "offset"]);

        assert_eq!(vars[0].address(), 0x3F00);
        assert_eq!(vars[0].default_value(), Some(&Value::Integer(230)));
        assert!(vars[1].is_array());
        assert_eq!(vars[1].array_depth(), 6);
        assert_eq!(vars[1].default_value(), Some(&Value::Text("abc".into())));
        assert_eq!(vars[2].default_value(), Some(&Value::Integer(-16)));
    }

    #[test]
    fn parses_inline_cpu() {
        let meta = Meta::from_yaml(
            "
meta:
  cpu:
    name: custom
    instruction_size: 16
    memories:
      rom: { start_address: 0, size: 256, cell_size: 1 }
      ram: { start_address: 0x1000, size: 64, cell_size: 1, permissions: rw, endian: big }
",
        )
        .unwrap();
        let cpu = meta.cpu.resolve().unwrap();
        assert_eq!(cpu.name, "custom");
        let map = cpu.build_map().unwrap();
        assert_eq!(map.list(), vec![("rom", 256), ("ram", 64)]);
        assert!(meta.variables().unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_declarations() {
        let cases = [
            "{ size: 1, type: u8, address: 1, memory_name: flash }",
            "{ size: 0, type: u8, address: 1, value: 1, memory_name: flash }",
            "{ size: 2, type: bool, address: 1, value: true, memory_name: flash }",
            "{ size: 1, type: u8, address: 1, value: 1, memory_name: flash, array: true }",
            "{ size: 1, type: u8, address: 1, value: 1 }",
            "{ size: 1, type: u8, address: -1, value: 1, memory_name: flash }",
        ];
        for case in cases {
            let text = format!("meta:\n  cpu: pic16f1516\n  data:\n    v: {case}\n");
            let err = Meta::from_yaml(&text).unwrap().variables().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "{case}");
        }

        let text = "meta:\n  cpu: p\n  data:\n    v: { size: 1, type: f32, address: 1, value: 1, memory_name: flash }\n";
        let err = Meta::from_yaml(text).unwrap().variables().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn rejects_duplicate_variables() {
        let text = "
meta:
  cpu: pic16f1516
  data:
    a: { size: 1, type: u8, address: 1, value: 1, memory_name: flash }
    A: { size: 1, type: u8, address: 2, value: 1, memory_name: flash }
";
        let err = Meta::from_yaml(text).unwrap().variables().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn missing_meta_section() {
        let err = Meta::from_yaml("cpu: pic16f1516\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
