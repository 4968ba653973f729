//! Element tree to XML text

use crate::element::{QName, XmlElement, XmlNode};
use quick_xml::escape::{escape, partial_escape};
use std::collections::BTreeMap;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Options for writing XML text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlWriteOptions {
    /// Emit an `<?xml ...?>` declaration (default: true)
    pub declaration: bool,
    /// Indentation width for element-only content, `None` for compact output
    pub indent: Option<usize>,
}

impl Default for XmlWriteOptions {
    fn default() -> Self {
        Self {
            declaration: true,
            indent: Some(2),
        }
    }
}

impl XmlWriteOptions {
    /// Compact output without declaration
    pub fn compact() -> Self {
        Self {
            declaration: false,
            indent: None,
        }
    }
}

/// Serialize an element tree as a document
pub fn to_string(root: &XmlElement, options: &XmlWriteOptions) -> String {
    let mut out = String::new();
    if options.declaration {
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        if options.indent.is_some() {
            out.push('\n');
        }
    }
    let mut writer = Writer {
        out,
        indent: options.indent,
    };
    writer.element(root, None, 0);
    if options.indent.is_some() {
        writer.out.push('\n');
    }
    writer.out
}

/// Serialize a sequence of nodes as the content of an element whose default
/// namespace is `default_namespace`
pub fn fragment_to_string(nodes: &[XmlNode], default_namespace: Option<&str>) -> String {
    let mut writer = Writer {
        out: String::new(),
        indent: None,
    };
    for node in nodes {
        writer.node(node, default_namespace, 0);
    }
    writer.out
}

struct Writer {
    out: String,
    indent: Option<usize>,
}

impl Writer {
    fn node(&mut self, node: &XmlNode, default_ns: Option<&str>, depth: usize) {
        match node {
            XmlNode::Element(e) => self.element(e, default_ns, depth),
            XmlNode::Text(t) => self.out.push_str(&partial_escape(t.as_str())),
        }
    }

    fn element(&mut self, element: &XmlElement, default_ns: Option<&str>, depth: usize) {
        let name = &element.name().local_name;
        self.out.push('<');
        self.out.push_str(name);

        let element_ns = element.namespace();
        if element_ns != default_ns {
            self.out.push_str(" xmlns=\"");
            self.out.push_str(&escape(element_ns.unwrap_or_default()));
            self.out.push('"');
        }

        let prefixes = self.attribute_prefixes(element);
        for (ns, prefix) in &prefixes {
            if ns != XML_NAMESPACE {
                self.out.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape(ns.as_str())));
            }
        }
        for attr in element.attributes() {
            self.out.push(' ');
            self.out.push_str(&qualified(&attr.name, &prefixes));
            self.out.push_str("=\"");
            self.out.push_str(&escape(attr.value.as_str()));
            self.out.push('"');
        }

        if element.children().is_empty() {
            self.out.push_str("/>");
            return;
        }
        self.out.push('>');

        let element_only = element
            .children()
            .iter()
            .all(|n| matches!(n, XmlNode::Element(_)));
        let pretty = self.indent.filter(|_| element_only);

        for child in element.children() {
            if let Some(width) = pretty {
                self.newline(width * (depth + 1));
            }
            self.node(child, element_ns, depth + 1);
        }
        if let Some(width) = pretty {
            self.newline(width * depth);
        }

        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    fn attribute_prefixes(&self, element: &XmlElement) -> BTreeMap<String, String> {
        let mut prefixes = BTreeMap::new();
        for attr in element.attributes() {
            if let Some(ns) = &attr.name.namespace {
                if prefixes.contains_key(ns) {
                    continue;
                }
                let prefix = if ns == XML_NAMESPACE {
                    "xml".to_string()
                } else {
                    format!("ns{}", prefixes.len() + 1)
                };
                prefixes.insert(ns.clone(), prefix);
            }
        }
        prefixes
    }

    fn newline(&mut self, spaces: usize) {
        self.out.push('\n');
        self.out.extend(std::iter::repeat_n(' ', spaces));
    }
}

fn qualified(name: &QName, prefixes: &BTreeMap<String, String>) -> String {
    match name.namespace.as_ref().and_then(|ns| prefixes.get(ns)) {
        Some(prefix) => format!("{}:{}", prefix, name.local_name),
        None => name.local_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::parse;

    #[test]
    fn test_write_compact() {
        let ns = Some("urn:c");
        let root = XmlElement::new(QName::new(ns, "computer"))
            .with_attribute("id", "a&b")
            .with_child(XmlElement::new(QName::new(ns, "name")).with_text("x < y"));
        let xml = to_string(&root, &XmlWriteOptions::compact());
        assert_eq!(
            xml,
            r#"<computer xmlns="urn:c" id="a&amp;b"><name>x &lt; y</name></computer>"#
        );
    }

    #[test]
    fn test_write_pretty_leaves_mixed_content_inline() {
        let root = XmlElement::new(QName::local("doc")).with_child(
            XmlElement::new(QName::local("p"))
                .with_text("a ")
                .with_child(XmlElement::new(QName::local("em")).with_text("b")),
        );
        let xml = to_string(&root, &XmlWriteOptions::default());
        assert!(xml.contains("\n  <p>a <em>b</em></p>\n"));
    }

    #[test]
    fn test_write_resets_default_namespace() {
        let root = XmlElement::new(QName::new(Some("urn:a"), "a"))
            .with_child(XmlElement::new(QName::local("b")));
        let xml = to_string(&root, &XmlWriteOptions::compact());
        assert_eq!(xml, r#"<a xmlns="urn:a"><b xmlns=""/></a>"#);
    }

    #[test]
    fn test_write_then_parse_qualified_attribute() {
        let root = XmlElement::new(QName::local("a"))
            .with_attribute(QName::new(Some("urn:ext"), "flag"), "on");
        let xml = to_string(&root, &XmlWriteOptions::compact());
        let parsed = parse(&xml).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn test_fragment_to_string() {
        let nodes = vec![
            XmlNode::Element(XmlElement::new(QName::new(Some("urn:x"), "p")).with_text("one")),
            XmlNode::Text(" & ".to_string()),
        ];
        assert_eq!(fragment_to_string(&nodes, Some("urn:x")), "<p>one</p> &amp; ");
    }
}
