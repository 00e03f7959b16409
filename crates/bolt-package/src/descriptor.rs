//! XML package descriptor tree.

use std::collections::BTreeMap;

use xml::reader::{EventReader, XmlEvent};

use crate::error::{PackageError, Result};

/// A piece of element content, kept in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DescriptorContent {
    Text(String),
    Element(DescriptorNode),
}

/// An element of a package descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DescriptorNode {
    tag: String,
    attributes: BTreeMap<String, String>,
    content: Vec<DescriptorContent>,
}

impl DescriptorNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            content: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: DescriptorNode) -> Self {
        self.content.push(DescriptorContent::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text.into());
        self
    }

    /// Parses descriptor XML into a tree.
    ///
    /// Namespaces are dropped and only local names are kept. Text, CDATA and
    /// whitespace are preserved verbatim so rule bodies survive unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use bolt_package::DescriptorNode;
    ///
    /// let root = DescriptorNode::parse(r#"<source name="hello"><rules><build>make</build></rules></source>"#).unwrap();
    /// assert_eq!(root.attr("name"), Some("hello"));
    /// assert_eq!(root.select("rules/build")[0].text_content(), "make");
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let mut stack: Vec<DescriptorNode> = Vec::new();
        let mut root = None;

        for event in EventReader::from_str(text) {
            match event? {
                XmlEvent::StartElement {
                    name, attributes, ..
                } => {
                    let node = attributes
                        .into_iter()
                        .fold(DescriptorNode::new(name.local_name), |node, attr| {
                            node.with_attr(attr.name.local_name, attr.value)
                        });
                    stack.push(node);
                }
                XmlEvent::EndElement {
                    ..
                } => {
                    let Some(node) = stack.pop() else {
                        return Err(PackageError::Descriptor("unbalanced end tag".into()));
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.content.push(DescriptorContent::Element(node)),
                        None => root = Some(node),
                    }
                }
                XmlEvent::Characters(s) | XmlEvent::CData(s) | XmlEvent::Whitespace(s) => {
                    if let Some(node) = stack.last_mut() {
                        node.push_text(s);
                    }
                }
                _ => {}
            }
        }

        root.ok_or_else(|| PackageError::Descriptor("document has no root element".into()))
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attr_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.attr(name).unwrap_or(default)
    }

    /// Child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = &DescriptorNode> {
        self.content.iter().filter_map(|c| {
            match c {
                DescriptorContent::Element(node) => Some(node),
                DescriptorContent::Text(_) => None,
            }
        })
    }

    /// First child element named `tag`.
    pub fn child(&self, tag: &str) -> Option<&DescriptorNode> {
        self.children().find(|node| node.tag == tag)
    }

    /// Resolves a `/` separated path of tags, returning all matches in document
    /// order. A `*` segment matches any tag.
    pub fn select(&self, path: &str) -> Vec<&DescriptorNode> {
        let mut current = vec![self];
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|node| node.children())
                .filter(|node| segment == "*" || node.tag == segment)
                .collect();
        }
        current
    }

    /// All text below this element, concatenated in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for content in &self.content {
            match content {
                DescriptorContent::Text(text) => out.push_str(text),
                DescriptorContent::Element(node) => node.collect_text(out),
            }
        }
    }

    fn push_text(&mut self, text: String) {
        match self.content.last_mut() {
            Some(DescriptorContent::Text(existing)) => existing.push_str(&text),
            _ => self.content.push(DescriptorContent::Text(text)),
        }
    }
}
