//! A loaded module and its definition graph

use crate::definition::{
    AssemblyDefinition, Definition, DefinitionInfo, DefinitionKind, FieldDefinition,
    FlagContainer, FlagDefinition, JsonValueKey, ModelContainer, ModuleScope, Named,
};
use crate::instance::{
    AssemblyInstance, ChoiceInstance, FieldInstance, FlagInstance, JsonGroupAs, MaxOccurs,
    ModelInstance, NamedModelInstance, Occurrence, Target,
};
use crate::source::{
    AssemblyInstanceSource, AssemblySource, CommonSource, DefinitionSource, FieldInstanceSource,
    FieldSource, FlagInstanceSource, FlagSource, MetaschemaSource, ModelSource,
};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Descriptive metadata of a module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaschemaHeader {
    pub schema_name: Option<String>,
    pub schema_version: Option<String>,
    pub short_name: Option<String>,
    /// XML namespace of elements declared by this module
    pub namespace: Option<String>,
    pub json_base_uri: Option<String>,
    pub remarks: Option<String>,
}

/// A module with its definitions and resolved imports.
///
/// Name lookups consult this module's own definitions first, then the
/// exported definitions of its imports, with later imports taking
/// precedence over earlier ones.
#[derive(Debug)]
pub struct Metaschema {
    location: String,
    header: MetaschemaHeader,
    imports: Vec<Arc<Metaschema>>,
    flags: BTreeMap<String, Arc<FlagDefinition>>,
    fields: BTreeMap<String, Arc<FieldDefinition>>,
    assemblies: BTreeMap<String, Arc<AssemblyDefinition>>,
}

impl Metaschema {
    /// Build a module from its source and already-loaded imports, then
    /// resolve every instance reference
    pub fn from_source(
        location: impl Into<String>,
        source: MetaschemaSource,
        imports: Vec<Arc<Metaschema>>,
    ) -> Result<Arc<Self>> {
        let location = location.into();
        let mut errors = Vec::new();

        let metaschema = Arc::new_cyclic(|weak| {
            let mut builder = GraphBuilder {
                metaschema: weak.clone(),
                errors: &mut errors,
            };
            let mut flags = BTreeMap::new();
            let mut fields = BTreeMap::new();
            let mut assemblies = BTreeMap::new();

            for definition in source.definitions {
                let name = definition.name().to_string();
                let duplicate = match definition {
                    DefinitionSource::Flag(src) => flags
                        .insert(name.clone(), Arc::new(builder.flag_definition(src, None)))
                        .is_some(),
                    DefinitionSource::Field(src) => fields
                        .insert(name.clone(), Arc::new(builder.field_definition(src, None)))
                        .is_some(),
                    DefinitionSource::Assembly(src) => assemblies
                        .insert(name.clone(), Arc::new(builder.assembly_definition(src, None)))
                        .is_some(),
                };
                if duplicate {
                    builder
                        .errors
                        .push(Error::invalid_definition(name, "declared more than once"));
                }
            }

            Metaschema {
                location: location.clone(),
                header: MetaschemaHeader {
                    schema_name: source.schema_name,
                    schema_version: source.schema_version,
                    short_name: source.short_name,
                    namespace: source.namespace,
                    json_base_uri: source.json_base_uri,
                    remarks: source.remarks,
                },
                imports,
                flags,
                fields,
                assemblies,
            }
        });

        if let Some(error) = errors.into_iter().next() {
            return Err(error);
        }
        metaschema.link()?;

        info!(
            "Built metaschema {} ({} flags, {} fields, {} assemblies, {} imports)",
            metaschema.location,
            metaschema.flags.len(),
            metaschema.fields.len(),
            metaschema.assemblies.len(),
            metaschema.imports.len()
        );
        Ok(metaschema)
    }

    /// Where this module was loaded from
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn header(&self) -> &MetaschemaHeader {
        &self.header
    }

    /// Imported modules in declaration order
    pub fn imports(&self) -> &[Arc<Metaschema>] {
        &self.imports
    }

    pub(crate) fn flag_table(&self) -> &BTreeMap<String, Arc<FlagDefinition>> {
        &self.flags
    }

    pub(crate) fn field_table(&self) -> &BTreeMap<String, Arc<FieldDefinition>> {
        &self.fields
    }

    pub(crate) fn assembly_table(&self) -> &BTreeMap<String, Arc<AssemblyDefinition>> {
        &self.assemblies
    }

    /// Top-level flag definitions declared by this module
    pub fn flag_definitions(&self) -> impl Iterator<Item = &Arc<FlagDefinition>> {
        self.flags.values()
    }

    pub fn field_definitions(&self) -> impl Iterator<Item = &Arc<FieldDefinition>> {
        self.fields.values()
    }

    pub fn assembly_definitions(&self) -> impl Iterator<Item = &Arc<AssemblyDefinition>> {
        self.assemblies.values()
    }

    /// Resolve a definition by declared name, as seen from this module
    pub fn definition<D: Definition>(&self, name: &str) -> Option<Arc<D>> {
        D::table(self)
            .get(name)
            .cloned()
            .or_else(|| self.imported_definition::<D>(name))
    }

    /// Resolve a definition visible to modules importing this one
    pub fn exported_definition<D: Definition>(&self, name: &str) -> Option<Arc<D>> {
        match D::table(self).get(name) {
            Some(definition) if definition.scope() == ModuleScope::Inherited => {
                Some(definition.clone())
            }
            _ => self.imported_definition::<D>(name),
        }
    }

    fn imported_definition<D: Definition>(&self, name: &str) -> Option<Arc<D>> {
        self.imports
            .iter()
            .rev()
            .find_map(|import| import.exported_definition::<D>(name))
    }

    pub fn flag_definition(&self, name: &str) -> Option<Arc<FlagDefinition>> {
        self.definition(name)
    }

    pub fn field_definition(&self, name: &str) -> Option<Arc<FieldDefinition>> {
        self.definition(name)
    }

    pub fn assembly_definition(&self, name: &str) -> Option<Arc<AssemblyDefinition>> {
        self.definition(name)
    }

    /// Like [`Metaschema::definition`], failing with a reference error
    pub fn definition_by_name<D: Definition>(&self, name: &str) -> Result<Arc<D>> {
        self.definition(name)
            .ok_or_else(|| Error::reference(D::KIND, name, &self.location))
    }

    /// Find the root-eligible assembly whose root name matches
    pub fn root_assembly_by_root_name(&self, root_name: &str) -> Option<Arc<AssemblyDefinition>> {
        self.assemblies
            .values()
            .find(|a| a.root_name() == Some(root_name))
            .cloned()
            .or_else(|| {
                self.imports
                    .iter()
                    .rev()
                    .find_map(|import| import.exported_root(root_name))
            })
    }

    fn exported_root(&self, root_name: &str) -> Option<Arc<AssemblyDefinition>> {
        self.assemblies
            .values()
            .find(|a| a.scope() == ModuleScope::Inherited && a.root_name() == Some(root_name))
            .cloned()
            .or_else(|| {
                self.imports
                    .iter()
                    .rev()
                    .find_map(|import| import.exported_root(root_name))
            })
    }

    /// All root-eligible assemblies visible from this module
    pub fn root_assembly_definitions(&self) -> Vec<Arc<AssemblyDefinition>> {
        let mut roots: Vec<Arc<AssemblyDefinition>> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut candidates: Vec<Arc<AssemblyDefinition>> =
            self.assemblies.values().filter(|a| a.is_root()).cloned().collect();
        for import in self.imports.iter().rev() {
            candidates.extend(import.exported_roots());
        }
        for candidate in candidates {
            let fresh = candidate
                .root_name()
                .is_some_and(|root_name| seen.insert(root_name.to_string()));
            if fresh {
                roots.push(candidate);
            }
        }
        roots
    }

    fn exported_roots(&self) -> Vec<Arc<AssemblyDefinition>> {
        let mut roots: Vec<Arc<AssemblyDefinition>> = self
            .assemblies
            .values()
            .filter(|a| a.is_root() && a.scope() == ModuleScope::Inherited)
            .cloned()
            .collect();
        for import in self.imports.iter().rev() {
            roots.extend(import.exported_roots());
        }
        roots
    }

    /// Resolve every reference once so that dangling names fail the load
    fn link(&self) -> Result<()> {
        for flag in self.flags.values() {
            debug!("Linked flag definition {}", flag.name());
        }
        for field in self.fields.values() {
            link_field(field)?;
        }
        for assembly in self.assemblies.values() {
            link_assembly(assembly)?;
        }
        Ok(())
    }
}

fn link_flags(owner: &str, container: &dyn FlagContainer) -> Result<()> {
    for flag in container.flag_instances() {
        flag.definition()?;
    }
    if let Some(key) = container.json_key_flag_name() {
        match container.flag_instance(key)? {
            Some(flag) if flag.is_required() => {}
            Some(_) => {
                return Err(Error::invalid_definition(
                    owner,
                    format!("JSON key flag '{}' must be required", key),
                ));
            }
            None => {
                return Err(Error::reference(DefinitionKind::Flag, key, owner));
            }
        }
    }
    Ok(())
}

fn link_field(field: &FieldDefinition) -> Result<()> {
    link_flags(field.name(), field)?;
    if let Some(JsonValueKey::Flag(name)) = field.json_value_key() {
        if field.flag_instance(name)?.is_none() {
            return Err(Error::reference(DefinitionKind::Flag, name, field.name()));
        }
    }
    Ok(())
}

fn link_assembly(assembly: &AssemblyDefinition) -> Result<()> {
    link_flags(assembly.name(), assembly)?;
    link_model(assembly.name(), assembly.model_instances())
}

fn link_model(owner: &str, model: &[ModelInstance]) -> Result<()> {
    for instance in model {
        match instance {
            ModelInstance::Field(field) => {
                check_occurrence(owner, &**field)?;
                if let Target::Inline(definition) = field.target() {
                    link_field(definition)?;
                }
                let definition = field.definition()?;
                check_keyed(owner, &**field, &*definition)?;
            }
            ModelInstance::Assembly(assembly) => {
                check_occurrence(owner, &**assembly)?;
                if let Target::Inline(definition) = assembly.target() {
                    link_assembly(definition)?;
                }
                let definition = assembly.definition()?;
                check_keyed(owner, &**assembly, &*definition)?;
            }
            ModelInstance::Choice(choice) => link_model(owner, choice.model_instances())?,
        }
    }
    Ok(())
}

fn check_occurrence<I: NamedModelInstance>(owner: &str, instance: &I) -> Result<()> {
    let occurrence = instance.occurrence();
    if let MaxOccurs::Bounded(max) = occurrence.max_occurs {
        if occurrence.min_occurs > max {
            return Err(Error::invalid_definition(
                owner,
                format!(
                    "instance '{}' has min-occurs {} greater than max-occurs {}",
                    instance.name(),
                    occurrence.min_occurs,
                    max
                ),
            ));
        }
    }
    if occurrence.max_occurs.allows_many() && instance.group_as().is_none() {
        return Err(Error::invalid_definition(
            owner,
            format!(
                "instance '{}' allows multiple occurrences but declares no group-as",
                instance.name()
            ),
        ));
    }
    Ok(())
}

fn check_keyed<I: NamedModelInstance>(
    owner: &str,
    instance: &I,
    definition: &dyn FlagContainer,
) -> Result<()> {
    if instance.json_group_as() == JsonGroupAs::Keyed && definition.json_key_flag_name().is_none() {
        return Err(Error::invalid_definition(
            owner,
            format!(
                "instance '{}' is grouped by key but its definition declares no json-key",
                instance.name()
            ),
        ));
    }
    Ok(())
}

/// Turns module sources into definitions bound to one module
struct GraphBuilder<'a> {
    metaschema: Weak<Metaschema>,
    errors: &'a mut Vec<Error>,
}

impl GraphBuilder<'_> {
    fn info(&self, common: CommonSource, inline: bool) -> DefinitionInfo {
        DefinitionInfo {
            name: common.name,
            use_name: common.use_name,
            formal_name: common.formal_name,
            description: common.description,
            remarks: common.remarks,
            scope: if inline {
                ModuleScope::Local
            } else {
                common.scope
            },
            constraints: common.constraints,
        }
    }

    fn flag_definition(&mut self, src: FlagSource, host: Option<Weak<FlagInstance>>) -> FlagDefinition {
        FlagDefinition {
            info: self.info(src.common, host.is_some()),
            data_type: src.as_type,
            default_value: src.default,
            metaschema: self.metaschema.clone(),
            inline_host: host,
        }
    }

    fn field_definition(
        &mut self,
        src: FieldSource,
        host: Option<Weak<FieldInstance>>,
    ) -> FieldDefinition {
        let name = src.common.name.clone();
        let json_value_key = match (src.json_value_key_flag, src.json_value_key) {
            (Some(flag), _) => Some(JsonValueKey::Flag(flag)),
            (None, Some(key)) => Some(JsonValueKey::Name(key)),
            (None, None) => None,
        };
        let flags = src
            .flags
            .into_iter()
            .map(|f| self.flag_instance(&name, f))
            .collect();
        FieldDefinition {
            info: self.info(src.common, host.is_some()),
            data_type: src.as_type,
            default_value: src.default,
            flags,
            json_key_flag: src.json_key,
            json_value_key,
            metaschema: self.metaschema.clone(),
            inline_host: host,
        }
    }

    fn assembly_definition(
        &mut self,
        src: AssemblySource,
        host: Option<Weak<AssemblyInstance>>,
    ) -> AssemblyDefinition {
        let name = src.common.name.clone();
        let flags = src
            .flags
            .into_iter()
            .map(|f| self.flag_instance(&name, f))
            .collect();
        let model = src
            .model
            .into_iter()
            .filter_map(|m| self.model_instance(&name, m))
            .collect();
        AssemblyDefinition {
            info: self.info(src.common, host.is_some()),
            root_name: src.root_name,
            flags,
            json_key_flag: src.json_key,
            model,
            metaschema: self.metaschema.clone(),
            inline_host: host,
        }
    }

    fn flag_instance(&mut self, owner: &str, src: FlagInstanceSource) -> Arc<FlagInstance> {
        let metaschema = self.metaschema.clone();
        match (src.reference, src.define) {
            (Some(reference), None) => Arc::new(FlagInstance {
                target: Target::Reference(reference),
                use_name: src.use_name,
                required: src.required,
                metaschema,
            }),
            (None, Some(define)) => Arc::new_cyclic(|host| FlagInstance {
                target: Target::Inline(Arc::new(self.flag_definition(define, Some(host.clone())))),
                use_name: src.use_name,
                required: src.required,
                metaschema,
            }),
            _ => {
                self.errors.push(Error::invalid_definition(
                    owner,
                    "a flag instance must declare exactly one of 'ref' or 'define'",
                ));
                Arc::new(FlagInstance {
                    target: Target::Reference(String::new()),
                    use_name: None,
                    required: false,
                    metaschema,
                })
            }
        }
    }

    fn model_instance(&mut self, owner: &str, src: ModelSource) -> Option<ModelInstance> {
        match src {
            ModelSource::Field(field) => self.field_instance(owner, field).map(ModelInstance::Field),
            ModelSource::Assembly(assembly) => self
                .assembly_instance(owner, assembly)
                .map(ModelInstance::Assembly),
            ModelSource::Choice(choice) => {
                let alternatives = choice
                    .alternatives
                    .into_iter()
                    .filter_map(|m| match m {
                        ModelSource::Choice(_) => {
                            self.errors.push(Error::invalid_definition(
                                owner,
                                "a choice cannot directly contain another choice",
                            ));
                            None
                        }
                        other => self.model_instance(owner, other),
                    })
                    .collect();
                Some(ModelInstance::Choice(Arc::new(ChoiceInstance {
                    alternatives,
                    min_occurs: choice.min_occurs,
                })))
            }
        }
    }

    fn field_instance(&mut self, owner: &str, src: FieldInstanceSource) -> Option<Arc<FieldInstance>> {
        let metaschema = self.metaschema.clone();
        let occurrence = Occurrence::new(src.min_occurs, src.max_occurs);
        match (src.reference, src.define) {
            (Some(reference), None) => Some(Arc::new(FieldInstance {
                target: Target::Reference(reference),
                use_name: src.use_name,
                occurrence,
                group_as: src.group_as,
                in_xml_wrapped: src.in_xml_wrapped,
                metaschema,
            })),
            (None, Some(define)) => Some(Arc::new_cyclic(|host| FieldInstance {
                target: Target::Inline(Arc::new(self.field_definition(define, Some(host.clone())))),
                use_name: src.use_name,
                occurrence,
                group_as: src.group_as,
                in_xml_wrapped: src.in_xml_wrapped,
                metaschema,
            })),
            _ => {
                self.errors.push(Error::invalid_definition(
                    owner,
                    "a field instance must declare exactly one of 'ref' or 'define'",
                ));
                None
            }
        }
    }

    fn assembly_instance(
        &mut self,
        owner: &str,
        src: AssemblyInstanceSource,
    ) -> Option<Arc<AssemblyInstance>> {
        let metaschema = self.metaschema.clone();
        let occurrence = Occurrence::new(src.min_occurs, src.max_occurs);
        match (src.reference, src.define) {
            (Some(reference), None) => Some(Arc::new(AssemblyInstance {
                target: Target::Reference(reference),
                use_name: src.use_name,
                occurrence,
                group_as: src.group_as,
                metaschema,
            })),
            (None, Some(define)) => Some(Arc::new_cyclic(|host| AssemblyInstance {
                target: Target::Inline(Arc::new(
                    self.assembly_definition(*define, Some(host.clone())),
                )),
                use_name: src.use_name,
                occurrence,
                group_as: src.group_as,
                metaschema,
            })),
            _ => {
                self.errors.push(Error::invalid_definition(
                    owner,
                    "an assembly instance must declare exactly one of 'ref' or 'define'",
                ));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Valued;

    fn module(yaml: &str) -> MetaschemaSource {
        MetaschemaSource::from_yaml_str("test.yaml", yaml).unwrap()
    }

    const COMPUTER: &str = r#"
short-name: computer
namespace: http://example.com/ns/computer
definitions:
  - define-flag:
      name: id
  - define-field:
      name: vendor
      use-name: maker
      flags:
        - ref: id
  - define-assembly:
      name: computer
      root-name: computer
      flags:
        - ref: id
          required: true
      model:
        - field:
            ref: vendor
            min-occurs: 1
        - assembly:
            define:
              name: port
              json-key: id
              flags:
                - define:
                    name: id
                    as-type: token
                  required: true
            max-occurs: unbounded
            group-as:
              name: ports
              in-json: BY_KEY
"#;

    #[test]
    fn test_build_and_lookup() {
        let ms = Metaschema::from_source("computer.yaml", module(COMPUTER), vec![]).unwrap();
        assert_eq!(ms.location(), "computer.yaml");
        assert_eq!(ms.header().short_name.as_deref(), Some("computer"));

        let computer = ms.assembly_definition("computer").unwrap();
        assert_eq!(computer.root_name(), Some("computer"));
        assert_eq!(computer.flag_instances().len(), 1);
        assert_eq!(computer.field_instances().len(), 1);
        assert_eq!(computer.assembly_instances().len(), 1);
        assert!(computer.choice_instances().is_empty());
        assert!(!computer.is_inline());

        let vendor = computer.field_instance("maker").unwrap().unwrap();
        assert_eq!(vendor.name(), "vendor");
        assert_eq!(vendor.json_name().unwrap(), "maker");
        assert!(computer.field_instance("vendor").unwrap().is_none());

        let ports = computer.assembly_instance("port").unwrap().unwrap();
        assert_eq!(ports.json_name().unwrap(), "ports");
        assert_eq!(ports.json_group_as(), JsonGroupAs::Keyed);
        let port = ports.definition().unwrap();
        assert!(port.is_inline());
        assert_eq!(port.scope(), ModuleScope::Local);
        assert!(Arc::ptr_eq(&port.inline_instance().unwrap(), &ports));
        let key = port.json_key_flag_instance().unwrap().unwrap();
        assert_eq!(key.definition().unwrap().data_type(), "token");
        assert!(key.definition().unwrap().is_inline());

        assert!(ms.root_assembly_by_root_name("computer").is_some());
        assert!(ms.root_assembly_by_root_name("laptop").is_none());
    }

    #[test]
    fn test_effective_name() {
        let ms = Metaschema::from_source("computer.yaml", module(COMPUTER), vec![]).unwrap();
        let vendor = ms.field_definition("vendor").unwrap();
        assert_eq!(vendor.effective_name(), "maker");
        let id = ms.flag_definition("id").unwrap();
        assert_eq!(id.effective_name(), "id");
        let computer = ms.assembly_definition("computer").unwrap();
        assert_eq!(computer.effective_name(), "computer");
    }

    #[test]
    fn test_missing_reference() {
        let yaml = r#"
definitions:
  - define-assembly:
      name: a
      model:
        - field:
            ref: nowhere
"#;
        let err = Metaschema::from_source("a.yaml", module(yaml), vec![]).unwrap_err();
        assert_eq!(
            err,
            Error::reference(DefinitionKind::Field, "nowhere", "a.yaml")
        );
    }

    #[test]
    fn test_json_key_must_be_required() {
        let yaml = r#"
definitions:
  - define-flag:
      name: id
  - define-assembly:
      name: a
      json-key: id
      flags:
        - ref: id
"#;
        let err = Metaschema::from_source("a.yaml", module(yaml), vec![]).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition { .. }));
    }

    #[test]
    fn test_group_as_required_for_many() {
        let yaml = r#"
definitions:
  - define-field:
      name: f
  - define-assembly:
      name: a
      model:
        - field:
            ref: f
            max-occurs: 2
"#;
        let err = Metaschema::from_source("a.yaml", module(yaml), vec![]).unwrap_err();
        assert!(err.to_string().contains("group-as"));
    }

    #[test]
    fn test_import_scope_and_precedence() {
        let base = Metaschema::from_source(
            "base.yaml",
            module(
                r#"
definitions:
  - define-flag:
      name: shared
      as-type: string
  - define-flag:
      name: hidden
      scope: local
"#,
            ),
            vec![],
        )
        .unwrap();
        let overlay = Metaschema::from_source(
            "overlay.yaml",
            module(
                r#"
definitions:
  - define-flag:
      name: shared
      as-type: integer
"#,
            ),
            vec![],
        )
        .unwrap();
        let top = Metaschema::from_source(
            "top.yaml",
            MetaschemaSource::default(),
            vec![base.clone(), overlay],
        )
        .unwrap();

        assert_eq!(top.flag_definition("shared").unwrap().data_type(), "integer");
        assert!(top.flag_definition("hidden").is_none());
        assert!(base.flag_definition("hidden").is_some());
        assert!(matches!(
            top.definition_by_name::<FlagDefinition>("hidden"),
            Err(Error::Reference { .. })
        ));
    }

    #[test]
    fn test_duplicate_definition() {
        let yaml = r#"
definitions:
  - define-flag:
      name: id
  - define-flag:
      name: id
"#;
        let err = Metaschema::from_source("a.yaml", module(yaml), vec![]).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
