//! Conversion of the XML module syntax into a [`MetaschemaSource`]

use crate::constraint::{AllowedValue, Constraint, ConstraintKind, KeyField, Level, MetapathExpression};
use crate::definition::ModuleScope;
use crate::instance::{GroupAs, JsonGroupAs, MaxOccurs, XmlGroupAs};
use crate::source::{
    AssemblyInstanceSource, AssemblySource, ChoiceSource, CommonSource, DefinitionSource,
    FieldInstanceSource, FieldSource, FlagInstanceSource, FlagSource, MetaschemaSource,
    ModelSource,
};
use crate::{Error, Result};
use metaschema_xml::{XmlElement, fragment_to_string};
use tracing::debug;

/// Namespace of the XML module syntax
pub(crate) const METASCHEMA_NS: &str = "http://csrc.nist.gov/ns/oscal/metaschema/1.0";

pub(crate) fn convert(location: &str, root: &XmlElement) -> Result<MetaschemaSource> {
    Converter { location }.module(root)
}

struct Converter<'a> {
    location: &'a str,
}

impl Converter<'_> {
    fn error(&self, message: impl Into<String>) -> Error {
        Error::invalid_format(self.location, message)
    }

    fn module(&self, root: &XmlElement) -> Result<MetaschemaSource> {
        if !root.name().matches(Some(METASCHEMA_NS), "METASCHEMA") {
            return Err(self.error(format!(
                "expected METASCHEMA root element, found {}",
                root.name()
            )));
        }

        let mut source = MetaschemaSource::default();
        for child in own_elements(root) {
            match child.local_name() {
                "schema-name" => source.schema_name = Some(markup(child)),
                "schema-version" => source.schema_version = Some(text(child)),
                "short-name" => source.short_name = Some(text(child)),
                "namespace" => source.namespace = Some(text(child)),
                "json-base-uri" => source.json_base_uri = Some(text(child)),
                "remarks" => source.remarks = Some(markup(child)),
                "import" => source
                    .imports
                    .push(self.required_attribute(child, "href")?.to_string()),
                "define-flag" => source
                    .definitions
                    .push(DefinitionSource::Flag(self.flag(child)?)),
                "define-field" => source
                    .definitions
                    .push(DefinitionSource::Field(self.field(child)?)),
                "define-assembly" => source
                    .definitions
                    .push(DefinitionSource::Assembly(self.assembly(child)?)),
                other => debug!("Skipping module element '{}' in {}", other, self.location),
            }
        }
        Ok(source)
    }

    fn common(&self, element: &XmlElement) -> Result<CommonSource> {
        let scope = match element.attribute("scope") {
            None | Some("global") => ModuleScope::Inherited,
            Some("local") => ModuleScope::Local,
            Some(other) => return Err(self.error(format!("invalid scope '{}'", other))),
        };
        Ok(CommonSource {
            name: self.required_attribute(element, "name")?.to_string(),
            use_name: child_text(element, "use-name"),
            formal_name: child_text(element, "formal-name"),
            description: child_markup(element, "description"),
            remarks: child_markup(element, "remarks"),
            scope,
            constraints: self.constraints(element)?,
        })
    }

    fn flag(&self, element: &XmlElement) -> Result<FlagSource> {
        Ok(FlagSource {
            common: self.common(element)?,
            as_type: data_type(element),
            default: element.attribute("default").map(str::to_string),
        })
    }

    fn field(&self, element: &XmlElement) -> Result<FieldSource> {
        Ok(FieldSource {
            common: self.common(element)?,
            as_type: data_type(element),
            default: element.attribute("default").map(str::to_string),
            flags: self.flag_instances(element)?,
            json_key: self.flag_ref(element, "json-key")?,
            json_value_key: child_text(element, "json-value-key"),
            json_value_key_flag: self.flag_ref(element, "json-value-key-flag")?,
        })
    }

    fn assembly(&self, element: &XmlElement) -> Result<AssemblySource> {
        let model = match first_own(element, "model") {
            Some(model) => self.model(model)?,
            None => Vec::new(),
        };
        Ok(AssemblySource {
            common: self.common(element)?,
            root_name: child_text(element, "root-name"),
            flags: self.flag_instances(element)?,
            json_key: self.flag_ref(element, "json-key")?,
            model,
        })
    }

    fn flag_ref(&self, element: &XmlElement, child: &str) -> Result<Option<String>> {
        first_own(element, child)
            .map(|e| self.required_attribute(e, "flag-ref").map(str::to_string))
            .transpose()
    }

    fn flag_instances(&self, element: &XmlElement) -> Result<Vec<FlagInstanceSource>> {
        let mut flags = Vec::new();
        for child in own_elements(element) {
            let required = self.boolean(child, "required")?;
            match child.local_name() {
                "flag" => flags.push(FlagInstanceSource {
                    reference: Some(self.required_attribute(child, "ref")?.to_string()),
                    define: None,
                    use_name: child_text(child, "use-name"),
                    required,
                }),
                "define-flag" => flags.push(FlagInstanceSource {
                    reference: None,
                    define: Some(self.flag(child)?),
                    use_name: None,
                    required,
                }),
                _ => {}
            }
        }
        Ok(flags)
    }

    fn model(&self, element: &XmlElement) -> Result<Vec<ModelSource>> {
        let mut model = Vec::new();
        for child in own_elements(element) {
            match child.local_name() {
                "field" | "define-field" => model.push(ModelSource::Field(self.field_instance(child)?)),
                "assembly" | "define-assembly" => {
                    model.push(ModelSource::Assembly(self.assembly_instance(child)?))
                }
                "choice" => model.push(ModelSource::Choice(ChoiceSource {
                    min_occurs: 1,
                    alternatives: self.model(child)?,
                })),
                other => debug!("Skipping model element '{}' in {}", other, self.location),
            }
        }
        Ok(model)
    }

    fn field_instance(&self, element: &XmlElement) -> Result<FieldInstanceSource> {
        let inline = element.local_name() == "define-field";
        let in_xml_wrapped = match element.attribute("in-xml") {
            None | Some("WRAPPED") | Some("WITH_WRAPPER") => true,
            Some("UNWRAPPED") => false,
            Some(other) => return Err(self.error(format!("invalid in-xml '{}'", other))),
        };
        Ok(FieldInstanceSource {
            reference: self.reference(element, inline)?,
            define: if inline { Some(self.field(element)?) } else { None },
            use_name: if inline { None } else { child_text(element, "use-name") },
            min_occurs: self.min_occurs(element)?,
            max_occurs: self.max_occurs(element)?,
            group_as: self.group_as(element)?,
            in_xml_wrapped,
        })
    }

    fn assembly_instance(&self, element: &XmlElement) -> Result<AssemblyInstanceSource> {
        let inline = element.local_name() == "define-assembly";
        Ok(AssemblyInstanceSource {
            reference: self.reference(element, inline)?,
            define: if inline {
                Some(Box::new(self.assembly(element)?))
            } else {
                None
            },
            use_name: if inline { None } else { child_text(element, "use-name") },
            min_occurs: self.min_occurs(element)?,
            max_occurs: self.max_occurs(element)?,
            group_as: self.group_as(element)?,
        })
    }

    fn reference(&self, element: &XmlElement, inline: bool) -> Result<Option<String>> {
        if inline {
            Ok(None)
        } else {
            Ok(Some(self.required_attribute(element, "ref")?.to_string()))
        }
    }

    fn min_occurs(&self, element: &XmlElement) -> Result<u32> {
        match element.attribute("min-occurs") {
            None => Ok(0),
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| self.error(format!("invalid min-occurs '{}'", v))),
        }
    }

    fn max_occurs(&self, element: &XmlElement) -> Result<MaxOccurs> {
        match element.attribute("max-occurs") {
            None => Ok(MaxOccurs::default()),
            Some(v) => {
                MaxOccurs::parse(v).ok_or_else(|| self.error(format!("invalid max-occurs '{}'", v)))
            }
        }
    }

    fn group_as(&self, element: &XmlElement) -> Result<Option<GroupAs>> {
        let Some(group) = first_own(element, "group-as") else {
            return Ok(None);
        };
        let in_json = match group.attribute("in-json") {
            None => JsonGroupAs::default(),
            Some(v) => JsonGroupAs::parse(v)
                .ok_or_else(|| self.error(format!("invalid group-as in-json '{}'", v)))?,
        };
        let in_xml = match group.attribute("in-xml") {
            None => XmlGroupAs::default(),
            Some(v) => XmlGroupAs::parse(v)
                .ok_or_else(|| self.error(format!("invalid group-as in-xml '{}'", v)))?,
        };
        Ok(Some(GroupAs {
            name: self.required_attribute(group, "name")?.to_string(),
            in_json,
            in_xml,
        }))
    }

    fn constraints(&self, element: &XmlElement) -> Result<Vec<Constraint>> {
        let mut constraints = Vec::new();
        for block in own_elements(element).filter(|e| e.local_name() == "constraint") {
            for rule in own_elements(block) {
                if let Some(kind) = self.constraint_kind(rule)? {
                    constraints.push(self.constraint(rule, kind)?);
                }
            }
        }
        Ok(constraints)
    }

    fn constraint_kind(&self, rule: &XmlElement) -> Result<Option<ConstraintKind>> {
        let kind = match rule.local_name() {
            "allowed-values" => ConstraintKind::AllowedValues {
                values: own_elements(rule)
                    .filter(|e| e.local_name() == "enum")
                    .map(|e| {
                        let description = markup(e);
                        Ok(AllowedValue {
                            value: self.required_attribute(e, "value")?.to_string(),
                            description: (!description.is_empty()).then_some(description),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                allow_other: self.boolean(rule, "allow-other")?,
            },
            "matches" => ConstraintKind::Matches {
                regex: rule.attribute("regex").map(str::to_string),
                datatype: rule.attribute("datatype").map(str::to_string),
            },
            "has-cardinality" => ConstraintKind::HasCardinality {
                min_occurs: match rule.attribute("min-occurs") {
                    Some(_) => Some(self.min_occurs(rule)?),
                    None => None,
                },
                max_occurs: match rule.attribute("max-occurs") {
                    Some(_) => Some(self.max_occurs(rule)?),
                    None => None,
                },
            },
            "index" => ConstraintKind::Index {
                name: self.required_attribute(rule, "name")?.to_string(),
                key_fields: self.key_fields(rule)?,
            },
            "is-unique" => ConstraintKind::IsUnique {
                key_fields: self.key_fields(rule)?,
            },
            "index-has-key" => ConstraintKind::IndexHasKey {
                name: self.required_attribute(rule, "name")?.to_string(),
                key_fields: self.key_fields(rule)?,
            },
            "expect" => ConstraintKind::Expect {
                test: MetapathExpression::new(self.required_attribute(rule, "test")?),
            },
            other => {
                debug!("Skipping constraint element '{}' in {}", other, self.location);
                return Ok(None);
            }
        };
        Ok(Some(kind))
    }

    fn constraint(&self, rule: &XmlElement, kind: ConstraintKind) -> Result<Constraint> {
        let level = match rule.attribute("level") {
            None => Level::default(),
            Some(v) => Level::parse(v).ok_or_else(|| self.error(format!("invalid level '{}'", v)))?,
        };
        Ok(Constraint {
            id: rule.attribute("id").map(str::to_string),
            level,
            target: rule
                .attribute("target")
                .map(MetapathExpression::new)
                .unwrap_or_default(),
            kind,
            message: child_text(rule, "message"),
            remarks: child_markup(rule, "remarks"),
        })
    }

    fn key_fields(&self, rule: &XmlElement) -> Result<Vec<KeyField>> {
        own_elements(rule)
            .filter(|e| e.local_name() == "key-field")
            .map(|e| {
                Ok(KeyField {
                    target: MetapathExpression::new(self.required_attribute(e, "target")?),
                    pattern: e.attribute("pattern").map(str::to_string),
                })
            })
            .collect()
    }

    fn required_attribute<'e>(&self, element: &'e XmlElement, name: &str) -> Result<&'e str> {
        element.attribute(name).ok_or_else(|| {
            self.error(format!(
                "element '{}' is missing required attribute '{}'",
                element.local_name(),
                name
            ))
        })
    }

    fn boolean(&self, element: &XmlElement, name: &str) -> Result<bool> {
        match element.attribute(name) {
            None | Some("no") | Some("false") => Ok(false),
            Some("yes") | Some("true") => Ok(true),
            Some(other) => Err(self.error(format!("invalid {} value '{}'", name, other))),
        }
    }
}

fn own_elements(element: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    element
        .child_elements()
        .filter(|e| e.namespace() == Some(METASCHEMA_NS))
}

fn first_own<'e>(element: &'e XmlElement, local_name: &str) -> Option<&'e XmlElement> {
    element.first_element(Some(METASCHEMA_NS), local_name)
}

fn data_type(element: &XmlElement) -> String {
    element.attribute("as-type").unwrap_or("string").to_string()
}

fn text(element: &XmlElement) -> String {
    element.text().trim().to_string()
}

fn markup(element: &XmlElement) -> String {
    fragment_to_string(element.children(), Some(METASCHEMA_NS))
        .trim()
        .to_string()
}

fn child_text(element: &XmlElement, local_name: &str) -> Option<String> {
    first_own(element, local_name).map(text)
}

fn child_markup(element: &XmlElement, local_name: &str) -> Option<String> {
    first_own(element, local_name).map(markup)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<METASCHEMA xmlns="http://csrc.nist.gov/ns/oscal/metaschema/1.0">
  <schema-name>Computer Model</schema-name>
  <schema-version>1.0</schema-version>
  <short-name>computer</short-name>
  <namespace>http://example.com/ns/computer</namespace>
  <json-base-uri>http://example.com/ns/computer</json-base-uri>
  <import href="common.xml"/>
  <define-assembly name="computer">
    <formal-name>Computer</formal-name>
    <description>A <em>computer</em>.</description>
    <root-name>computer</root-name>
    <define-flag name="id" required="yes"/>
    <model>
      <field ref="vendor" min-occurs="1">
        <use-name>maker</use-name>
      </field>
      <assembly ref="port" max-occurs="unbounded">
        <group-as name="ports" in-json="BY_KEY" in-xml="GROUPED"/>
      </assembly>
      <choice>
        <field ref="ram"/>
        <define-field name="rom" as-type="integer"/>
      </choice>
    </model>
    <constraint>
      <allowed-values target="@id" level="WARNING" allow-other="yes">
        <enum value="pc1">First</enum>
      </allowed-values>
      <index name="port-index" target="ports/port">
        <key-field target="@id"/>
      </index>
      <expect test="count(ports/port) &lt; 10"/>
    </constraint>
  </define-assembly>
  <define-field name="vendor" scope="local">
    <json-value-key-flag flag-ref="kind"/>
    <flag ref="kind" required="yes"/>
  </define-field>
</METASCHEMA>"#;

    #[test]
    fn test_convert_module() {
        let root = metaschema_xml::parse(MODULE).unwrap();
        let source = convert("computer.xml", &root).unwrap();

        assert_eq!(source.schema_name.as_deref(), Some("Computer Model"));
        assert_eq!(source.namespace.as_deref(), Some("http://example.com/ns/computer"));
        assert_eq!(source.imports, vec!["common.xml"]);
        assert_eq!(source.definitions.len(), 2);

        let DefinitionSource::Assembly(computer) = &source.definitions[0] else {
            panic!("expected assembly");
        };
        assert_eq!(computer.common.description.as_deref(), Some("A <em>computer</em>."));
        assert_eq!(computer.root_name.as_deref(), Some("computer"));
        assert!(computer.flags[0].required);
        assert!(computer.flags[0].define.is_some());
        assert_eq!(computer.model.len(), 3);
        assert_eq!(computer.common.constraints.len(), 3);
        assert_eq!(computer.common.constraints[0].level, Level::Warning);

        let ModelSource::Field(vendor) = &computer.model[0] else {
            panic!("expected field");
        };
        assert_eq!(vendor.use_name.as_deref(), Some("maker"));
        assert_eq!(vendor.min_occurs, 1);

        let ModelSource::Assembly(port) = &computer.model[1] else {
            panic!("expected assembly");
        };
        let group = port.group_as.as_ref().unwrap();
        assert_eq!(group.in_json, JsonGroupAs::Keyed);
        assert_eq!(group.in_xml, XmlGroupAs::Grouped);

        let ModelSource::Choice(choice) = &computer.model[2] else {
            panic!("expected choice");
        };
        assert_eq!(choice.alternatives.len(), 2);

        let DefinitionSource::Field(vendor_def) = &source.definitions[1] else {
            panic!("expected field");
        };
        assert_eq!(vendor_def.common.scope, ModuleScope::Local);
        assert_eq!(vendor_def.json_value_key_flag.as_deref(), Some("kind"));
    }

    #[test]
    fn test_convert_rejects_foreign_root() {
        let root = metaschema_xml::parse("<schema/>").unwrap();
        assert!(matches!(
            convert("x.xml", &root),
            Err(Error::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_convert_rejects_bad_max_occurs() {
        let xml = r#"<METASCHEMA xmlns="http://csrc.nist.gov/ns/oscal/metaschema/1.0">
  <define-assembly name="a"><model><field ref="b" max-occurs="many"/></model></define-assembly>
</METASCHEMA>"#;
        let root = metaschema_xml::parse(xml).unwrap();
        let err = convert("x.xml", &root).unwrap_err();
        assert!(err.to_string().contains("max-occurs"));
    }
}
