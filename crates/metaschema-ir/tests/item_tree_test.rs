//! Integration tests for building and navigating item trees

use std::sync::Arc;

use metaschema_ir::{
    AssemblyItem, Cursor, DocumentItem, Error, FieldItem, FlagItem, ModelItem, ModelMap,
    ModelValue, ParentItem, Value, Visitor, ancestors, owning_document, walk,
};
use metaschema_model::{
    FlagContainer, Metaschema, MetaschemaSource, ModelContainer, NamedModelInstance,
};

const COMPUTER: &str = r#"
definitions:
  - define-flag:
      name: id
  - define-field:
      name: vendor
      flags:
        - ref: id
  - define-assembly:
      name: port
      flags:
        - ref: id
          required: true
  - define-assembly:
      name: computer
      root-name: computer
      flags:
        - ref: id
          required: true
      model:
        - field:
            ref: vendor
        - assembly:
            ref: port
            max-occurs: unbounded
            group-as:
              name: ports
"#;

fn metaschema() -> Arc<Metaschema> {
    let source = MetaschemaSource::from_yaml_str("computer.yaml", COMPUTER).unwrap();
    Metaschema::from_source("computer.yaml", source, vec![]).unwrap()
}

fn port(ms: &Metaschema, id: &str) -> Arc<AssemblyItem> {
    let computer = ms.assembly_definition("computer").unwrap();
    let instance = computer.assembly_instance("port").unwrap().unwrap();
    let port = instance.definition().unwrap();
    let flag = FlagItem::new(port.flag_instance("id").unwrap().unwrap(), Value::from(id)).unwrap();
    AssemblyItem::new(instance, vec![flag], ModelMap::new()).unwrap()
}

fn computer_document(ms: &Metaschema) -> Arc<DocumentItem> {
    let computer = ms.assembly_definition("computer").unwrap();
    let vendor_instance = computer.field_instance("vendor").unwrap().unwrap();
    let vendor = FieldItem::simple(vendor_instance, Value::from("Acme")).unwrap();

    let mut model = ModelMap::new();
    model.insert("vendor".to_string(), ModelValue::Single(vendor.into()));
    model.insert(
        "port".to_string(),
        ModelValue::List(vec![port(ms, "eth0").into(), port(ms, "usb1").into()]),
    );
    let id = FlagItem::new(computer.flag_instance("id").unwrap().unwrap(), Value::from("pc1")).unwrap();
    let root = AssemblyItem::new(computer, vec![id], model).unwrap();
    DocumentItem::new(root, Some("computer.json".to_string())).unwrap()
}

#[test]
fn test_parent_before_registration_fails() {
    let ms = metaschema();
    let id = ms.flag_definition("id").unwrap();
    let flag = FlagItem::new(id, Value::from("x")).unwrap();
    assert_eq!(
        flag.parent().unwrap_err(),
        Error::UnregisteredParent {
            item: "id".to_string()
        }
    );
}

#[test]
fn test_parent_after_construction() {
    let ms = metaschema();
    let vendor_def = ms.field_definition("vendor").unwrap();
    let flag = FlagItem::new(vendor_def.flag_instance("id").unwrap().unwrap(), Value::from("v")).unwrap();
    let field = FieldItem::new(vendor_def, Value::from("Acme"), vec![flag.clone()]).unwrap();

    match flag.parent().unwrap() {
        ParentItem::Field(parent) => assert!(Arc::ptr_eq(&parent, &field)),
        other => panic!("unexpected parent {:?}", other),
    }
}

#[test]
fn test_child_cannot_join_two_parents() {
    let ms = metaschema();
    let vendor_def = ms.field_definition("vendor").unwrap();
    let flag = FlagItem::new(vendor_def.flag_instance("id").unwrap().unwrap(), Value::from("v")).unwrap();
    FieldItem::new(vendor_def.clone(), Value::from("a"), vec![flag.clone()]).unwrap();
    let err = FieldItem::new(vendor_def, Value::from("b"), vec![flag]).unwrap_err();
    assert!(matches!(err, Error::AlreadyLinked { .. }));
}

#[test]
fn test_upward_traversal_reaches_document() {
    let ms = metaschema();
    let document = computer_document(&ms);
    let root = document.root();
    assert!(matches!(root.parent().unwrap(), ParentItem::Document(_)));

    let ports = root.child("port").unwrap();
    assert_eq!(ports.len(), 2);
    let second = ports.items()[1].as_assembly().unwrap();
    assert_eq!(second.flag("id").unwrap().value(), &Value::from("usb1"));

    let flag = second.flag("id").unwrap();
    let found = owning_document(flag.parent().unwrap()).unwrap();
    assert!(Arc::ptr_eq(&found, &document));

    let chain = ancestors(flag.parent().unwrap()).unwrap();
    assert_eq!(chain.len(), 3);
    assert!(chain[1].as_assembly().is_some());
    assert!(chain[2].as_document().is_some());
}

#[test]
fn test_document_metadata() {
    let ms = metaschema();
    let document = computer_document(&ms);
    assert_eq!(document.root_name(), "computer");
    assert_eq!(document.location(), Some("computer.json"));
    assert_eq!(document.root().flag("id").unwrap().value().as_str(), Some("pc1"));
}

#[test]
fn test_cursor_navigation() {
    let ms = metaschema();
    let document = computer_document(&ms);
    let cursor = Cursor::from_document(&document);

    let usb = cursor.navigate("port[1]").unwrap();
    assert_eq!(usb.flag("id").unwrap().value().as_str(), Some("usb1"));
    assert_eq!(usb.path(), &["computer", "port[1]"]);

    let vendor = cursor.child("vendor").unwrap();
    match vendor.item() {
        ModelItem::Field(field) => assert_eq!(field.value(), &Value::from("Acme")),
        other => panic!("unexpected item {:?}", other),
    }

    assert!(matches!(
        cursor.navigate("port[9]"),
        Err(Error::NodeNotFound { .. })
    ));
    assert!(matches!(
        cursor.navigate("port[x]"),
        Err(Error::InvalidPath { .. })
    ));
}

#[test]
fn test_malformed_paths_are_rejected() {
    let ms = metaschema();
    let document = computer_document(&ms);
    let cursor = Cursor::from_document(&document);

    for path in ["x]y[", "port]1[", "port[1]x", "port[1", "port[1][2]", "[1]", "port]"] {
        assert!(
            matches!(cursor.navigate(path), Err(Error::InvalidPath { .. })),
            "accepted '{}'",
            path
        );
    }
}

#[derive(Default)]
struct Collector {
    fields: Vec<String>,
    flags: Vec<String>,
    assemblies: usize,
}

impl Visitor for Collector {
    fn visit_flag(&mut self, flag: &FlagItem, path: &[String]) {
        self.flags.push(format!("{}/@{}", path.join("/"), flag.name()));
    }

    fn visit_field(&mut self, field: &FieldItem, _path: &[String]) {
        self.fields.push(field.name().to_string());
    }

    fn enter_assembly(&mut self, _assembly: &AssemblyItem, _path: &[String]) {
        self.assemblies += 1;
    }
}

#[test]
fn test_visitor_walk() {
    let ms = metaschema();
    let document = computer_document(&ms);
    let mut collector = Collector::default();
    walk(document.root(), &mut collector);

    assert_eq!(collector.assemblies, 3);
    assert_eq!(collector.fields, vec!["vendor"]);
    assert_eq!(
        collector.flags,
        vec!["computer/@id", "computer/port[0]/@id", "computer/port[1]/@id"]
    );
}

#[test]
fn test_equality_ignores_parents() {
    let ms = metaschema();
    let a = computer_document(&ms);
    let b = computer_document(&ms);
    assert_eq!(a, b);
    assert_ne!(port(&ms, "eth0"), port(&ms, "usb1"));
}
