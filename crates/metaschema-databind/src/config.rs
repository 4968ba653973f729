//! Serializer configuration

/// What to do with document content no definition accounts for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownContent {
    /// Skip it, logging at debug level
    #[default]
    Ignore,
    /// Fail the read with a malformed-document error
    Reject,
}

/// Options for reading and writing documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerConfig {
    /// Handling of unrecognized properties, elements, and attributes
    pub unknown_content: UnknownContent,
    /// Indent XML and JSON text output
    pub pretty: bool,
    /// Emit an XML declaration when writing XML text
    pub xml_declaration: bool,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            unknown_content: UnknownContent::Ignore,
            pretty: true,
            xml_declaration: true,
        }
    }
}

impl SerializerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail on content that no definition declares
    pub fn strict(mut self) -> Self {
        self.unknown_content = UnknownContent::Reject;
        self
    }

    pub fn with_unknown_content(mut self, unknown_content: UnknownContent) -> Self {
        self.unknown_content = unknown_content;
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn with_xml_declaration(mut self, xml_declaration: bool) -> Self {
        self.xml_declaration = xml_declaration;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SerializerConfig::default();
        assert_eq!(config.unknown_content, UnknownContent::Ignore);
        assert!(config.pretty);
        assert!(config.xml_declaration);
    }

    #[test]
    fn test_config_builder() {
        let config = SerializerConfig::new()
            .strict()
            .with_pretty(false)
            .with_xml_declaration(false);
        assert_eq!(config.unknown_content, UnknownContent::Reject);
        assert!(!config.pretty);
        assert!(!config.xml_declaration);
    }
}
