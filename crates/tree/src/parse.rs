//! Builds arena documents from XML text with roxmltree.

use crate::document::{Document, DocumentKind, Location, NodeId, NodeName, is_whitespace};
use crate::error::TreeError;
use trellis_xpath1::{ExpandedName, XML_NAMESPACE};

/// Options controlling what [`Document::parse_with`] keeps.
pub struct ParseOptions<'a> {
    /// Selects the elements whose whitespace-only text children are dropped.
    /// `xml:space="preserve"` overrides it for a subtree.
    pub strip_whitespace: Option<&'a dyn Fn(&ExpandedName) -> bool>,
    pub keep_comments: bool,
    pub keep_processing_instructions: bool,
    pub base_uri: Option<String>,
}

impl Default for ParseOptions<'_> {
    fn default() -> Self {
        Self {
            strip_whitespace: None,
            keep_comments: true,
            keep_processing_instructions: true,
            base_uri: None,
        }
    }
}

impl<'a> ParseOptions<'a> {
    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.base_uri = Some(uri.into());
        self
    }

    pub fn with_whitespace_stripping(mut self, strip: &'a dyn Fn(&ExpandedName) -> bool) -> Self {
        self.strip_whitespace = Some(strip);
        self
    }
}

impl Document {
    pub fn parse_str(text: &str) -> Result<Self, TreeError> {
        Self::parse_with(text, &ParseOptions::default())
    }

    pub fn parse_with(text: &str, options: &ParseOptions<'_>) -> Result<Self, TreeError> {
        let parsing = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let source = roxmltree::Document::parse_with_options(text, parsing)?;
        let mut doc = Document::with_kind(DocumentKind::Document);
        if let Some(base) = &options.base_uri {
            doc.set_base_uri(base.clone());
        }
        let mut builder = Builder {
            source: &source,
            doc: &mut doc,
            options,
        };
        builder.append_children(source.root(), NodeId::ROOT, false, false);
        log::debug!(
            "Parsed document {} ({} nodes) from {}",
            doc.id(),
            doc.len(),
            options.base_uri.as_deref().unwrap_or("<string>")
        );
        Ok(doc)
    }
}

struct Builder<'s, 'input, 'd, 'o> {
    source: &'s roxmltree::Document<'input>,
    doc: &'d mut Document,
    options: &'o ParseOptions<'o>,
}

impl<'s, 'input> Builder<'s, 'input, '_, '_> {
    fn append_children(&mut self, parent: roxmltree::Node<'s, 'input>, target: NodeId, strip: bool, preserve: bool) {
        for child in parent.children() {
            match child.node_type() {
                roxmltree::NodeType::Element => {
                    let element = self.build_element(child);
                    self.doc.attach(target, element);
                    let preserve = match child.attribute((XML_NAMESPACE, "space")) {
                        Some("preserve") => true,
                        Some("default") => false,
                        _ => preserve,
                    };
                    let strip = !preserve
                        && self.options.strip_whitespace.is_some_and(|predicate| {
                            predicate(&ExpandedName::new(
                                child.tag_name().namespace(),
                                child.tag_name().name(),
                            ))
                        });
                    self.append_children(child, element, strip, preserve);
                }
                roxmltree::NodeType::Text => {
                    let text = child.text().unwrap_or("");
                    if strip && is_whitespace(text) {
                        continue;
                    }
                    let node = self.doc.create_text(text);
                    self.doc.attach(target, node);
                }
                roxmltree::NodeType::Comment if self.options.keep_comments => {
                    let node = self.doc.create_comment(child.text().unwrap_or(""));
                    self.located(node, child);
                    self.doc.attach(target, node);
                }
                roxmltree::NodeType::PI if self.options.keep_processing_instructions => {
                    if let Some(pi) = child.pi() {
                        let node = self.doc.create_processing_instruction(pi.target, pi.value.unwrap_or(""));
                        self.located(node, child);
                        self.doc.attach(target, node);
                    }
                }
                _ => {}
            }
        }
    }

    fn build_element(&mut self, node: roxmltree::Node<'s, 'input>) -> NodeId {
        let tag = node.tag_name();
        let prefix = tag.namespace().and_then(|uri| element_prefix(node, uri));
        let element = self
            .doc
            .create_element(NodeName::new(prefix, tag.name(), tag.namespace()));
        self.located(element, node);

        let inherited: Vec<(Option<&str>, &str)> = node
            .parent_element()
            .map(|parent| parent.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
            .unwrap_or_default();
        for ns in node.namespaces() {
            if ns.name() == Some("xml") || inherited.contains(&(ns.name(), ns.uri())) {
                continue;
            }
            self.doc
                .namespaces_mut(element)
                .push((ns.name().map(str::to_string), ns.uri().to_string()));
        }

        for attr in node.attributes() {
            let prefix = attr.namespace().and_then(|uri| attribute_prefix(node, uri));
            let name = NodeName::new(prefix, attr.name(), attr.namespace());
            let attribute = self.doc.create_attribute(name, attr.value());
            self.doc.attach_attribute(element, attribute);
        }
        element
    }

    fn located(&mut self, id: NodeId, node: roxmltree::Node<'s, 'input>) {
        let pos = self.source.text_pos_at(node.range().start);
        self.doc
            .set_location(id, Location::from((pos.row as usize, pos.col as usize)));
    }
}

fn element_prefix<'a>(node: roxmltree::Node<'a, '_>, uri: &str) -> Option<&'a str> {
    node.namespaces().find(|ns| ns.uri() == uri).and_then(|ns| ns.name())
}

fn attribute_prefix<'a>(node: roxmltree::Node<'a, '_>, uri: &str) -> Option<&'a str> {
    if uri == XML_NAMESPACE {
        return Some("xml");
    }
    node.namespaces()
        .find(|ns| ns.uri() == uri && ns.name().is_some())
        .and_then(|ns| ns.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_xpath1::NodeType;

    #[test]
    fn test_parse_structure_and_names() {
        let doc = Document::parse_str(
            r#"<?xml version="1.0"?><p:root xmlns:p="urn:p" xmlns="urn:d"><child p:a="1" b="2"/><?go now?></p:root>"#,
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        let name = doc.name(root).unwrap();
        assert_eq!(name.qualified(), "p:root");
        assert_eq!(name.namespace_uri.as_deref(), Some("urn:p"));
        assert_eq!(doc.namespaces(root).len(), 2);

        let child = doc.children(root)[0];
        let child_name = doc.name(child).unwrap();
        assert_eq!(child_name.prefix, None);
        assert_eq!(child_name.namespace_uri.as_deref(), Some("urn:d"));
        assert!(doc.namespaces(child).is_empty());
        assert_eq!(doc.attribute(child, Some("urn:p"), "a"), Some("1"));
        let first_attr = doc.attributes(child)[0];
        assert_eq!(doc.name(first_attr).unwrap().qualified(), "p:a");

        let pi = doc.children(root)[1];
        assert_eq!(doc.node_type(pi), NodeType::ProcessingInstruction);
        assert_eq!(doc.name(pi).unwrap().local_name, "go");
        assert_eq!(doc.value(pi), "now");
    }

    #[test]
    fn test_locations_are_recorded() {
        let doc = Document::parse_str("<a>\n  <b/>\n</a>").unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[1];
        assert_eq!(doc.location(b), Some(&Location { line: 2, col: 3 }));
    }

    #[test]
    fn test_options_strip_and_drop() {
        let strip = |name: &ExpandedName| name.local_name != "pre";
        let options = ParseOptions {
            keep_comments: false,
            keep_processing_instructions: false,
            ..ParseOptions::default()
        }
        .with_whitespace_stripping(&strip)
        .with_base_uri("file:///tmp/in.xml");
        let doc = Document::parse_with(
            "<a>\n <!--c--><?p?><pre> </pre><b xml:space=\"preserve\"> </b><c> </c></a>",
            &options,
        )
        .unwrap();
        let a = doc.document_element().unwrap();
        assert_eq!(doc.child_count(a), 3);
        let [pre, b, c] = [doc.children(a)[0], doc.children(a)[1], doc.children(a)[2]];
        assert_eq!(doc.child_count(pre), 1);
        assert_eq!(doc.child_count(b), 1);
        assert_eq!(doc.child_count(c), 0);
        assert_eq!(doc.base_uri(), Some("file:///tmp/in.xml"));
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        assert!(matches!(Document::parse_str("<a><b></a>"), Err(TreeError::Xml(_))));
    }
}
