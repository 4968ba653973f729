//! XML text to element tree

use crate::element::{QName, XmlElement, XmlNode};
use crate::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use tracing::trace;

/// Parse an XML document and return its root element
pub fn parse(xml: &str) -> Result<XmlElement> {
    let mut reader = NsReader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let (resolved, event) = match reader.read_resolved_event() {
            Ok(pair) => pair,
            Err(e) => return Err(Error::syntax(position(&reader), e.to_string())),
        };
        let namespace = owned_namespace(resolved)?;

        match event {
            Event::Start(start) => {
                let element = open_element(&reader, namespace, &start)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(&reader, namespace, &start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| Error::syntax(position(&reader), "unmatched end tag"))?;
                element.normalize_whitespace();
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| Error::syntax(position(&reader), e.to_string()))?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                push_text(&mut stack, &text)?;
            }
            Event::Eof => break,
            // declarations, comments, processing instructions and doctypes carry no data
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::syntax(
            position(&reader),
            format!("unclosed element '{}'", open.name()),
        ));
    }

    root.ok_or(Error::NoRootElement)
}

/// Parse a sequence of nodes as if they were the content of an element in
/// `default_namespace`.
///
/// Used for mixed-content values that are stored as serialized fragments.
pub fn parse_fragment(fragment: &str, default_namespace: Option<&str>) -> Result<Vec<XmlNode>> {
    let wrapped = match default_namespace {
        Some(ns) => format!(
            "<fragment xmlns=\"{}\">{}</fragment>",
            quick_xml::escape::escape(ns),
            fragment
        ),
        None => format!("<fragment>{}</fragment>", fragment),
    };
    let wrapper = parse(&wrapped)?;
    Ok(wrapper.into_children())
}

fn position(reader: &NsReader<&[u8]>) -> u64 {
    reader.buffer_position() as u64
}

fn owned_namespace(resolved: ResolveResult<'_>) -> Result<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(utf8(ns.as_ref())?)),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(Error::UnboundPrefix(
            String::from_utf8_lossy(&prefix).into_owned(),
        )),
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::Encoding(e.to_string()))
}

fn open_element(
    reader: &NsReader<&[u8]>,
    namespace: Option<String>,
    start: &BytesStart<'_>,
) -> Result<XmlElement> {
    let local_name = utf8(start.local_name().as_ref())?;
    let mut element = XmlElement::new(QName {
        namespace,
        local_name,
    });

    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::syntax(position(reader), e.to_string()))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let attr_namespace = owned_namespace(resolved)?;
        let value = attr
            .unescape_value()
            .map_err(|e| Error::syntax(position(reader), e.to_string()))?;
        element.set_attribute(
            QName {
                namespace: attr_namespace,
                local_name: utf8(local.as_ref())?,
            },
            value.into_owned(),
        );
    }

    trace!("Opened element {}", element.name());
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push_element(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(Error::TrailingContent(element.name().to_string()));
    }
    *root = Some(element);
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: &str) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push_text(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(Error::TrailingContent(text.trim().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_namespaces() {
        let xml = r#"<?xml version="1.0"?>
<c:computer xmlns:c="urn:computer" xmlns="urn:default" id="pc1">
  <c:motherboard type="atx"/>
  <note>hello</note>
</c:computer>"#;
        let root = parse(xml).unwrap();
        assert!(root.name().matches(Some("urn:computer"), "computer"));
        assert_eq!(root.attribute("id"), Some("pc1"));
        assert_eq!(root.attributes().len(), 1);
        assert_eq!(root.children().len(), 2);

        let board = root.first_element(Some("urn:computer"), "motherboard").unwrap();
        assert_eq!(board.attribute("type"), Some("atx"));

        let note = root.first_element(Some("urn:default"), "note").unwrap();
        assert_eq!(note.text(), "hello");
    }

    #[test]
    fn test_parse_entities_and_cdata() {
        let root = parse("<a>x &amp; y<![CDATA[ <z> ]]></a>").unwrap();
        assert_eq!(root.text(), "x & y <z> ");
    }

    #[test]
    fn test_parse_mixed_content_keeps_spacing() {
        let root = parse("<p>a <em>b</em> <b>c</b></p>").unwrap();
        assert_eq!(root.children().len(), 4);
    }

    #[test]
    fn test_parse_unbound_prefix() {
        let err = parse("<x:a/>").unwrap_err();
        assert!(matches!(err, Error::UnboundPrefix(_)));
    }

    #[test]
    fn test_parse_empty_input() {
        assert_eq!(parse("  ").unwrap_err(), Error::NoRootElement);
    }

    #[test]
    fn test_parse_unclosed() {
        assert!(parse("<a><b></b>").is_err());
    }

    #[test]
    fn test_parse_fragment() {
        let nodes = parse_fragment("<p>one</p><p>two</p>", Some("urn:x")).unwrap();
        assert_eq!(nodes.len(), 2);
        let first = nodes[0].as_element().unwrap();
        assert!(first.name().matches(Some("urn:x"), "p"));
        assert_eq!(first.text(), "one");
    }
}
