//! Element tree types

use std::fmt;

/// A namespace-qualified XML name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace URI, `None` for names in no namespace
    pub namespace: Option<String>,

    /// Local part of the name
    pub local_name: String,
}

impl QName {
    /// Create a name in the given namespace
    pub fn new(namespace: Option<&str>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            local_name: local_name.into(),
        }
    }

    /// Create a name in no namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    /// Check whether this name matches a namespace and local name
    pub fn matches(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == namespace
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

impl From<&str> for QName {
    fn from(local_name: &str) -> Self {
        Self::local(local_name)
    }
}

/// An attribute on an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: QName,
    pub value: String,
}

/// A child of an element: either a nested element or a run of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlNode {
    /// Borrow the element, if this node is one
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        }
    }
}

/// An XML element with resolved names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: QName,
    attributes: Vec<XmlAttribute>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// Create an empty element
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.name.namespace.as_deref()
    }

    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Take ownership of the child nodes
    pub fn into_children(self) -> Vec<XmlNode> {
        self.children
    }

    /// Get an unqualified attribute value
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.matches(None, local_name))
            .map(|a| a.value.as_str())
    }

    /// Get a namespace-qualified attribute value
    pub fn attribute_ns(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| &a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set an attribute, replacing any existing value
    pub fn set_attribute(&mut self, name: impl Into<QName>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(XmlAttribute { name, value }),
        }
        self
    }

    /// Append a child element
    pub fn push_element(&mut self, child: XmlElement) -> &mut Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Append a text run, merging with a preceding text run
    pub fn push_text(&mut self, text: impl Into<String>) -> &mut Self {
        let text = text.into();
        if text.is_empty() {
            return self;
        }
        if let Some(XmlNode::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(XmlNode::Text(text));
        }
        self
    }

    /// Append arbitrary child nodes
    pub fn extend_nodes(&mut self, nodes: impl IntoIterator<Item = XmlNode>) -> &mut Self {
        for node in nodes {
            match node {
                XmlNode::Element(e) => self.push_element(e),
                XmlNode::Text(t) => self.push_text(t),
            };
        }
        self
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: impl Into<QName>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder-style text setter
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    /// Builder-style child setter
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.push_element(child);
        self
    }

    /// Iterate over child elements, skipping text
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    /// Iterate over child elements with the given name
    pub fn elements_named<'a>(
        &'a self,
        namespace: Option<&'a str>,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.child_elements()
            .filter(move |e| e.name.matches(namespace, local_name))
    }

    /// First child element with the given name
    pub fn first_element(&self, namespace: Option<&str>, local_name: &str) -> Option<&XmlElement> {
        self.child_elements()
            .find(|e| e.name.matches(namespace, local_name))
    }

    /// Concatenated direct text content
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Whether the element has neither attributes nor children
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.children.is_empty()
    }

    /// Drop whitespace-only text runs when the element holds no other text.
    ///
    /// Mixed content keeps every run so inline spacing survives.
    pub(crate) fn normalize_whitespace(&mut self) {
        let has_text = self
            .children
            .iter()
            .any(|n| matches!(n, XmlNode::Text(t) if !t.trim().is_empty()));
        let has_elements = self
            .children
            .iter()
            .any(|n| matches!(n, XmlNode::Element(_)));
        if !has_text && has_elements {
            self.children.retain(|n| matches!(n, XmlNode::Element(_)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_display() {
        assert_eq!(QName::local("a").to_string(), "a");
        assert_eq!(QName::new(Some("urn:x"), "a").to_string(), "{urn:x}a");
    }

    #[test]
    fn test_attributes_replace() {
        let mut e = XmlElement::new(QName::local("root"));
        e.set_attribute("id", "1");
        e.set_attribute("id", "2");
        assert_eq!(e.attributes().len(), 1);
        assert_eq!(e.attribute("id"), Some("2"));
        assert_eq!(e.attribute("missing"), None);
    }

    #[test]
    fn test_push_text_merges() {
        let e = XmlElement::new(QName::local("p"))
            .with_text("a")
            .with_text("b");
        assert_eq!(e.children().len(), 1);
        assert_eq!(e.text(), "ab");
    }

    #[test]
    fn test_elements_named() {
        let ns = Some("urn:x");
        let e = XmlElement::new(QName::new(ns, "root"))
            .with_child(XmlElement::new(QName::new(ns, "item")))
            .with_child(XmlElement::new(QName::local("item")))
            .with_child(XmlElement::new(QName::new(ns, "item")));
        assert_eq!(e.elements_named(ns, "item").count(), 2);
        assert_eq!(e.elements_named(None, "item").count(), 1);
        assert!(e.first_element(ns, "other").is_none());
    }

    #[test]
    fn test_normalize_whitespace() {
        let mut pure = XmlElement::new(QName::local("a"))
            .with_text("\n  ")
            .with_child(XmlElement::new(QName::local("b")));
        pure.normalize_whitespace();
        assert_eq!(pure.children().len(), 1);

        let mut mixed = XmlElement::new(QName::local("p"))
            .with_text("x ")
            .with_child(XmlElement::new(QName::local("em")));
        mixed.push_text(" ");
        mixed.normalize_whitespace();
        assert_eq!(mixed.children().len(), 3);
    }
}
