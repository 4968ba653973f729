//! Serializable module source
//!
//! A module source is the declared content of one metaschema module before
//! its references are linked. JSON and YAML sources deserialize directly into
//! these types; XML sources are converted by walking the element tree.

use crate::constraint::Constraint;
use crate::definition::ModuleScope;
use crate::instance::{GroupAs, MaxOccurs};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Syntax of a module source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaFormat {
    Xml,
    Json,
    Yaml,
}

impl SchemaFormat {
    /// Pick a format from the location's extension, falling back to the
    /// first non-whitespace character of the content
    pub fn detect(location: &str, content: &str) -> Self {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("xml") => Self::Xml,
            Some("json") => Self::Json,
            Some("yaml" | "yml") => Self::Yaml,
            _ => match content.trim_start().chars().next() {
                Some('<') => Self::Xml,
                Some('{') => Self::Json,
                _ => Self::Yaml,
            },
        }
    }
}

/// Naming and documentation common to all definition sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommonSource {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default)]
    pub scope: ModuleScope,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

fn default_data_type() -> String {
    "string".to_string()
}

fn default_true() -> bool {
    true
}

fn default_choice_min() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlagSource {
    #[serde(flatten)]
    pub common: CommonSource,
    #[serde(default = "default_data_type")]
    pub as_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldSource {
    #[serde(flatten)]
    pub common: CommonSource,
    #[serde(default = "default_data_type")]
    pub as_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagInstanceSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_value_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_value_key_flag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssemblySource {
    #[serde(flatten)]
    pub common: CommonSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagInstanceSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model: Vec<ModelSource>,
}

/// A flag instance: either `ref` to a global flag or an inline `define`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlagInstanceSource {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub define: Option<FlagSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_name: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldInstanceSource {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub define: Option<FieldSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_name: Option<String>,
    #[serde(default)]
    pub min_occurs: u32,
    #[serde(default)]
    pub max_occurs: MaxOccurs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_as: Option<GroupAs>,
    #[serde(default = "default_true")]
    pub in_xml_wrapped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssemblyInstanceSource {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub define: Option<Box<AssemblySource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_name: Option<String>,
    #[serde(default)]
    pub min_occurs: u32,
    #[serde(default)]
    pub max_occurs: MaxOccurs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_as: Option<GroupAs>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChoiceSource {
    #[serde(default = "default_choice_min")]
    pub min_occurs: u32,
    pub alternatives: Vec<ModelSource>,
}

/// One entry of an assembly model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelSource {
    Field(FieldInstanceSource),
    Assembly(AssemblyInstanceSource),
    Choice(ChoiceSource),
}

/// A top-level definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefinitionSource {
    #[serde(rename = "define-flag")]
    Flag(FlagSource),
    #[serde(rename = "define-field")]
    Field(FieldSource),
    #[serde(rename = "define-assembly")]
    Assembly(AssemblySource),
}

impl DefinitionSource {
    pub fn name(&self) -> &str {
        match self {
            Self::Flag(f) => &f.common.name,
            Self::Field(f) => &f.common.name,
            Self::Assembly(a) => &a.common.name,
        }
    }
}

/// The declared content of one module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetaschemaSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_base_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    /// Import locations, relative to this module's location
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definitions: Vec<DefinitionSource>,
}

impl MetaschemaSource {
    /// Parse module content in the given format
    pub fn parse(location: &str, content: &str, format: SchemaFormat) -> Result<Self> {
        trace!("Parsing {:?} module source: {}", format, location);
        match format {
            SchemaFormat::Xml => Self::from_xml_str(location, content),
            SchemaFormat::Json => Self::from_json_str(location, content),
            SchemaFormat::Yaml => Self::from_yaml_str(location, content),
        }
    }

    pub fn from_xml_str(location: &str, xml: &str) -> Result<Self> {
        let root = metaschema_xml::parse(xml)?;
        crate::xml_source::convert(location, &root)
    }

    pub fn from_json_str(location: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::invalid_format(location, format!("JSON parse error: {}", e)))
    }

    pub fn from_yaml_str(location: &str, yaml: &str) -> Result<Self> {
        // serde_yaml only maps `!tag` nodes onto enum variants; single-key maps
        // such as `define-flag:` deserialize as variants through a JSON value
        let value: serde_json::Value = serde_yaml::from_str(yaml)
            .map_err(|e| Error::invalid_format(location, format!("YAML parse error: {}", e)))?;
        serde_json::from_value(value)
            .map_err(|e| Error::invalid_format(location, format!("YAML parse error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::JsonGroupAs;

    #[test]
    fn test_detect_format() {
        assert_eq!(SchemaFormat::detect("a/b.xml", ""), SchemaFormat::Xml);
        assert_eq!(SchemaFormat::detect("a/b.JSON", ""), SchemaFormat::Json);
        assert_eq!(SchemaFormat::detect("b.yml?x=1", ""), SchemaFormat::Yaml);
        assert_eq!(SchemaFormat::detect("mem:top", "  <METASCHEMA/>"), SchemaFormat::Xml);
        assert_eq!(SchemaFormat::detect("mem:top", "{}"), SchemaFormat::Json);
        assert_eq!(SchemaFormat::detect("mem:top", "short-name: x"), SchemaFormat::Yaml);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
short-name: computer
namespace: http://example.com/ns/computer
imports:
  - common.yaml
definitions:
  - define-flag:
      name: id
  - define-assembly:
      name: computer
      root-name: computer
      flags:
        - ref: id
          required: true
      model:
        - assembly:
            ref: port
            max-occurs: unbounded
            group-as:
              name: ports
              in-json: ARRAY
"#;
        let source = MetaschemaSource::from_yaml_str("test.yaml", yaml).unwrap();
        assert_eq!(source.short_name.as_deref(), Some("computer"));
        assert_eq!(source.imports, vec!["common.yaml"]);
        assert_eq!(source.definitions.len(), 2);
        match &source.definitions[1] {
            DefinitionSource::Assembly(a) => {
                assert_eq!(a.root_name.as_deref(), Some("computer"));
                assert!(a.flags[0].required);
                match &a.model[0] {
                    ModelSource::Assembly(port) => {
                        assert_eq!(port.max_occurs, MaxOccurs::Unbounded);
                        assert_eq!(port.group_as.as_ref().unwrap().in_json, JsonGroupAs::List);
                    }
                    other => panic!("unexpected model entry {:?}", other),
                }
            }
            other => panic!("unexpected definition {:?}", other),
        }
        match &source.definitions[0] {
            DefinitionSource::Flag(f) => assert_eq!(f.as_type, "string"),
            other => panic!("unexpected definition {:?}", other),
        }
    }

    #[test]
    fn test_yaml_nested_variants() {
        let yaml = r#"
definitions:
  - define-assembly:
      name: board
      constraints:
        - type: has-cardinality
          target: slot
          min-occurs: 1
      model:
        - choice:
            alternatives:
              - field:
                  ref: cpu
              - assembly:
                  define:
                    name: socket
                    flags:
                      - define:
                          name: pins
                          as-type: positive-integer
        - field:
            ref: slot
            max-occurs: 4
            group-as:
              name: slots
"#;
        let source = MetaschemaSource::from_yaml_str("board.yaml", yaml).unwrap();
        let DefinitionSource::Assembly(board) = &source.definitions[0] else {
            panic!("expected an assembly");
        };
        assert_eq!(board.common.constraints.len(), 1);
        let ModelSource::Choice(choice) = &board.model[0] else {
            panic!("expected a choice");
        };
        assert_eq!(choice.min_occurs, 1);
        match &choice.alternatives[1] {
            ModelSource::Assembly(socket) => {
                let define = socket.define.as_ref().unwrap();
                assert_eq!(define.common.name, "socket");
                let pins = define.flags[0].define.as_ref().unwrap();
                assert_eq!(pins.as_type, "positive-integer");
            }
            other => panic!("unexpected alternative {:?}", other),
        }
        match &board.model[1] {
            ModelSource::Field(slot) => assert_eq!(slot.max_occurs, MaxOccurs::Bounded(4)),
            other => panic!("unexpected model entry {:?}", other),
        }
    }

    #[test]
    fn test_yaml_unknown_definition_kind() {
        let yaml = "definitions:\n  - define-widget:\n      name: w\n";
        let err = MetaschemaSource::from_yaml_str("w.yaml", yaml).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { ref location, .. } if location == "w.yaml"));
    }

    #[test]
    fn test_from_json_invalid() {
        let err = MetaschemaSource::from_json_str("bad.json", "{").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { .. }));
    }
}
