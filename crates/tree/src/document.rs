//! The arena document model.
//!
//! A [`Document`] owns every node record in a flat vector and hands out [`NodeId`]s.
//! Documents are built through `&mut` methods and then frozen behind an `Rc`, after which
//! [`Node`] handles give read-only access for expression evaluation.

use crate::error::TreeError;
use crate::node::Node;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use trellis_xpath1::{DataSourceNode, ExpandedName, NodeType, XML_NAMESPACE};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique document identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    pub fn next() -> Self {
        DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Index of a node record within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A parsed source or stylesheet document.
    Document,
    /// A result tree or temporary tree built during a transformation.
    Fragment,
}

/// A position in the source text, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

impl From<(usize, usize)> for Location {
    fn from((line, col): (usize, usize)) -> Self {
        Location { line, col }
    }
}

/// The name of an element, attribute or processing instruction (target in `local_name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeName {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace_uri: Option<String>,
}

impl NodeName {
    pub fn new(prefix: Option<&str>, local_name: &str, namespace_uri: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local_name: local_name.to_string(),
            namespace_uri: namespace_uri.map(str::to_string),
        }
    }

    pub fn local(local_name: &str) -> Self {
        Self::new(None, local_name, None)
    }

    pub fn expanded(&self) -> ExpandedName {
        ExpandedName::new(self.namespace_uri.as_deref(), &self.local_name)
    }

    pub fn is(&self, namespace_uri: Option<&str>, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace_uri.as_deref() == namespace_uri
    }

    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local_name),
            None => self.local_name.clone(),
        }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeType,
    name: Option<NodeName>,
    /// Text, attribute value, comment text or PI data.
    value: String,
    /// Text written without escaping.
    raw: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<NodeId>,
    namespaces: Vec<(Option<String>, String)>,
    sibling_index: usize,
    location: Option<Location>,
}

impl NodeData {
    fn new(kind: NodeType) -> Self {
        Self {
            kind,
            name: None,
            value: String::new(),
            raw: false,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            sibling_index: 0,
            location: None,
        }
    }
}

/// An XML tree stored as an arena of node records. Node 0 is the root.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    kind: DocumentKind,
    base_uri: Option<String>,
    nodes: Vec<NodeData>,
    ids: HashMap<String, NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_kind(DocumentKind::Document)
    }

    pub fn new_fragment() -> Self {
        Self::with_kind(DocumentKind::Fragment)
    }

    pub(crate) fn with_kind(kind: DocumentKind) -> Self {
        Self {
            id: DocumentId::next(),
            kind,
            base_uri: None,
            nodes: vec![NodeData::new(NodeType::Root)],
            ids: HashMap::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn is_fragment(&self) -> bool {
        self.kind == DocumentKind::Fragment
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    pub fn set_base_uri(&mut self, uri: impl Into<String>) {
        self.base_uri = Some(uri.into());
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// The first element child of the root.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(NodeId::ROOT)
            .iter()
            .copied()
            .find(|&child| self.node_type(child) == NodeType::Element)
    }

    /// Number of node records, including detached ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(NodeId::ROOT).is_empty()
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    // --- Accessors ---

    pub fn node_type(&self, id: NodeId) -> NodeType {
        self.data(id).kind
    }

    pub fn name(&self, id: NodeId) -> Option<&NodeName> {
        self.data(id).name.as_ref()
    }

    pub fn value(&self, id: NodeId) -> &str {
        &self.data(id).value
    }

    pub fn is_raw_text(&self, id: NodeId) -> bool {
        self.data(id).raw
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.data(id).children
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.data(id).children.len()
    }

    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        &self.data(id).attributes
    }

    /// Namespace declarations made on an element, as `(prefix, uri)` pairs.
    pub fn namespaces(&self, id: NodeId) -> &[(Option<String>, String)] {
        &self.data(id).namespaces
    }

    pub(crate) fn namespaces_mut(&mut self, id: NodeId) -> &mut Vec<(Option<String>, String)> {
        &mut self.data_mut(id).namespaces
    }

    pub fn sibling_index(&self, id: NodeId) -> usize {
        self.data(id).sibling_index
    }

    pub fn location(&self, id: NodeId) -> Option<&Location> {
        self.data(id).location.as_ref()
    }

    pub fn set_location(&mut self, id: NodeId, location: Location) {
        self.data_mut(id).location = Some(location);
    }

    pub fn attribute(&self, element: NodeId, namespace_uri: Option<&str>, local_name: &str) -> Option<&str> {
        self.find_attribute(element, namespace_uri, local_name)
            .map(|attr| self.value(attr))
    }

    fn find_attribute(&self, element: NodeId, namespace_uri: Option<&str>, local_name: &str) -> Option<NodeId> {
        self.attributes(element).iter().copied().find(|&attr| {
            self.name(attr)
                .is_some_and(|name| name.is(namespace_uri, local_name))
        })
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// The XPath string-value: own value for leaves, concatenated descendant text otherwise.
    pub fn string_value(&self, id: NodeId) -> String {
        match self.node_type(id) {
            NodeType::Root | NodeType::Element => {
                let mut text = String::new();
                let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
                while let Some(current) = stack.pop() {
                    let data = self.data(current);
                    match data.kind {
                        NodeType::Text => text.push_str(&data.value),
                        NodeType::Element => stack.extend(data.children.iter().rev().copied()),
                        _ => {}
                    }
                }
                text
            }
            _ => self.data(id).value.clone(),
        }
    }

    // --- Construction ---

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    pub fn create_element(&mut self, name: NodeName) -> NodeId {
        let mut data = NodeData::new(NodeType::Element);
        data.name = Some(name);
        self.push(data)
    }

    pub fn create_attribute(&mut self, name: NodeName, value: &str) -> NodeId {
        let mut data = NodeData::new(NodeType::Attribute);
        data.name = Some(name);
        data.value = value.to_string();
        self.push(data)
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        let mut data = NodeData::new(NodeType::Text);
        data.value = text.to_string();
        self.push(data)
    }

    /// A text node the serializer writes without escaping.
    pub fn create_raw_text(&mut self, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.data_mut(id).raw = true;
        id
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        let mut data = NodeData::new(NodeType::Comment);
        data.value = text.to_string();
        self.push(data)
    }

    pub fn create_processing_instruction(&mut self, target: &str, data: &str) -> NodeId {
        let mut record = NodeData::new(NodeType::ProcessingInstruction);
        record.name = Some(NodeName::local(target));
        record.value = data.to_string();
        self.push(record)
    }

    /// Records a namespace declaration on an element. Re-declaring a prefix replaces its URI.
    pub fn declare_namespace(&mut self, element: NodeId, prefix: Option<&str>, uri: &str) -> Result<(), TreeError> {
        if self.node_type(element) != NodeType::Element {
            return Err(TreeError::InvalidOperation(
                "namespaces can only be declared on elements".to_string(),
            ));
        }
        let namespaces = &mut self.data_mut(element).namespaces;
        match namespaces.iter_mut().find(|(p, _)| p.as_deref() == prefix) {
            Some(existing) => existing.1 = uri.to_string(),
            None => namespaces.push((prefix.map(str::to_string), uri.to_string())),
        }
        Ok(())
    }

    /// Appends `child` as the last child of `parent`. Empty text is dropped and adjacent
    /// text nodes are merged.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let parent_kind = self.node_type(parent);
        if !matches!(parent_kind, NodeType::Root | NodeType::Element) {
            return Err(TreeError::InvalidOperation(format!(
                "cannot append children to a {:?} node",
                parent_kind
            )));
        }
        let child_kind = self.node_type(child);
        if matches!(child_kind, NodeType::Root | NodeType::Attribute) {
            return Err(TreeError::InvalidOperation(format!(
                "a {:?} node cannot be a child",
                child_kind
            )));
        }
        if self.parent(child).is_some() {
            return Err(TreeError::InvalidOperation("node already has a parent".to_string()));
        }
        if child == parent {
            return Err(TreeError::InvalidOperation("node cannot contain itself".to_string()));
        }
        self.attach(parent, child);
        Ok(())
    }

    /// Links without validation. Callers guarantee the structure is well formed.
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        if self.node_type(child) == NodeType::Text {
            if self.data(child).value.is_empty() {
                return;
            }
            let raw = self.data(child).raw;
            if let Some(&last) = self.data(parent).children.last()
                && self.node_type(last) == NodeType::Text
                && self.data(last).raw == raw
            {
                let text = std::mem::take(&mut self.data_mut(child).value);
                self.data_mut(last).value.push_str(&text);
                return;
            }
        }
        let index = self.data(parent).children.len();
        let data = self.data_mut(child);
        data.parent = Some(parent);
        data.sibling_index = index;
        self.data_mut(parent).children.push(child);
    }

    /// Attaches an attribute node to an element, replacing any attribute with the same
    /// expanded name.
    pub fn set_attribute(&mut self, element: NodeId, attribute: NodeId) -> Result<(), TreeError> {
        if self.node_type(element) != NodeType::Element {
            return Err(TreeError::InvalidOperation(
                "attributes can only be set on elements".to_string(),
            ));
        }
        if self.node_type(attribute) != NodeType::Attribute {
            return Err(TreeError::InvalidOperation(format!(
                "expected an attribute node, got {:?}",
                self.node_type(attribute)
            )));
        }
        if self.parent(attribute).is_some() {
            return Err(TreeError::InvalidOperation("attribute already has an owner".to_string()));
        }
        self.attach_attribute(element, attribute);
        Ok(())
    }

    pub(crate) fn attach_attribute(&mut self, element: NodeId, attribute: NodeId) {
        let Some(name) = self.name(attribute).cloned() else {
            return;
        };
        let existing = self.find_attribute(element, name.namespace_uri.as_deref(), &name.local_name);
        let index = match existing {
            Some(old) => {
                let index = self.data(old).sibling_index;
                self.data_mut(old).parent = None;
                self.data_mut(element).attributes[index] = attribute;
                index
            }
            None => {
                let attributes = &mut self.data_mut(element).attributes;
                attributes.push(attribute);
                attributes.len() - 1
            }
        };
        let data = self.data_mut(attribute);
        data.parent = Some(element);
        data.sibling_index = index;

        let is_id = match name.namespace_uri.as_deref() {
            None => name.local_name == "id",
            Some(XML_NAMESPACE) => name.local_name == "id",
            Some(_) => false,
        };
        if is_id {
            let value = self.value(attribute).trim().to_string();
            self.ids.entry(value).or_insert(element);
        }
    }

    /// Concatenates `text` onto the value of a text, attribute, comment or PI node.
    pub fn append_text(&mut self, id: NodeId, text: &str) -> Result<(), TreeError> {
        match self.node_type(id) {
            NodeType::Text | NodeType::Attribute | NodeType::Comment | NodeType::ProcessingInstruction => {
                self.data_mut(id).value.push_str(text);
                Ok(())
            }
            other => Err(TreeError::InvalidOperation(format!(
                "cannot append text to a {:?} node",
                other
            ))),
        }
    }

    /// Copies a node from another document into this one, detached. A shallow element copy
    /// keeps the name and namespace declarations only; a deep copy brings attributes and
    /// descendants along.
    pub fn import_node(&mut self, node: &Node, deep: bool) -> Result<NodeId, TreeError> {
        if node.node_type() == NodeType::Root {
            return Err(TreeError::InvalidOperation("cannot import a root node".to_string()));
        }
        Ok(self.import_from(node.document(), node.id(), deep))
    }

    fn import_from(&mut self, source: &Document, id: NodeId, deep: bool) -> NodeId {
        let original = source.data(id);
        let mut data = NodeData::new(original.kind);
        data.name = original.name.clone();
        data.value = original.value.clone();
        data.raw = original.raw;
        data.namespaces = original.namespaces.clone();
        data.location = original.location;
        let copy = self.push(data);
        if deep && original.kind == NodeType::Element {
            for &attr in &original.attributes {
                let attr_copy = self.import_from(source, attr, false);
                self.attach_attribute(copy, attr_copy);
            }
            for &child in &original.children {
                let child_copy = self.import_from(source, child, true);
                self.attach(copy, child_copy);
            }
        }
        copy
    }

    /// Copies every node of this document into a new document with a fresh identity.
    pub fn duplicate(&self) -> Document {
        Document {
            id: DocumentId::next(),
            kind: self.kind,
            base_uri: self.base_uri.clone(),
            nodes: self.nodes.clone(),
            ids: self.ids.clone(),
        }
    }

    /// A copy with whitespace-only text removed from elements selected by `strip`, except
    /// where `xml:space="preserve"` is in effect. The copy has a fresh identity.
    pub fn strip_whitespace(&self, strip: &dyn Fn(&ExpandedName) -> bool) -> Document {
        let mut out = Document::with_kind(self.kind);
        out.base_uri = self.base_uri.clone();
        self.copy_stripped(NodeId::ROOT, &mut out, NodeId::ROOT, strip, false);
        out
    }

    fn copy_stripped(
        &self,
        from: NodeId,
        out: &mut Document,
        to: NodeId,
        strip: &dyn Fn(&ExpandedName) -> bool,
        preserve: bool,
    ) {
        let strip_here = !preserve
            && self
                .name(from)
                .filter(|_| self.node_type(from) == NodeType::Element)
                .is_some_and(|name| strip(&name.expanded()));
        for &child in self.children(from) {
            let data = self.data(child);
            match data.kind {
                NodeType::Text if strip_here && is_whitespace(&data.value) => {}
                NodeType::Element => {
                    let preserve = match self.attribute(child, Some(XML_NAMESPACE), "space") {
                        Some("preserve") => true,
                        Some("default") => false,
                        _ => preserve,
                    };
                    let copy = out.import_from(self, child, false);
                    for &attr in self.attributes(child) {
                        let attr_copy = out.import_from(self, attr, false);
                        out.attach_attribute(copy, attr_copy);
                    }
                    out.attach(to, copy);
                    self.copy_stripped(child, out, copy, strip, preserve);
                }
                _ => {
                    let copy = out.import_from(self, child, true);
                    out.attach(to, copy);
                }
            }
        }
    }
}

/// True for text made only of XML whitespace characters.
pub fn is_whitespace(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn sample() -> (Document, NodeId) {
        let mut doc = Document::new();
        let root = doc.create_element(NodeName::local("root"));
        doc.append_child(NodeId::ROOT, root).unwrap();
        let id_attr = doc.create_attribute(NodeName::local("id"), "r1");
        doc.set_attribute(root, id_attr).unwrap();
        let a = doc.create_element(NodeName::local("a"));
        doc.append_child(root, a).unwrap();
        let text = doc.create_text("one");
        doc.append_child(a, text).unwrap();
        let comment = doc.create_comment("note");
        doc.append_child(root, comment).unwrap();
        (doc, root)
    }

    #[test]
    fn test_document_ids_are_unique() {
        let a = Document::new();
        let b = Document::new_fragment();
        assert_ne!(a.id(), b.id());
        assert!(b.is_fragment());
        assert_ne!(a.duplicate().id(), a.id());
    }

    #[test]
    fn test_construction_and_accessors() {
        let (doc, root) = sample();
        assert_eq!(doc.document_element(), Some(root));
        assert_eq!(doc.child_count(root), 2);
        assert_eq!(doc.string_value(NodeId::ROOT), "one");
        assert_eq!(doc.attribute(root, None, "id"), Some("r1"));
        assert_eq!(doc.element_by_id("r1"), Some(root));
        assert_eq!(doc.sibling_index(doc.children(root)[1]), 1);
    }

    #[test]
    fn test_adjacent_text_is_merged_and_empty_text_dropped() {
        let mut doc = Document::new_fragment();
        let first = doc.create_text("a");
        let empty = doc.create_text("");
        let second = doc.create_text("b");
        doc.append_child(NodeId::ROOT, first).unwrap();
        doc.append_child(NodeId::ROOT, empty).unwrap();
        doc.append_child(NodeId::ROOT, second).unwrap();
        assert_eq!(doc.child_count(NodeId::ROOT), 1);
        assert_eq!(doc.value(first), "ab");
    }

    #[test]
    fn test_set_attribute_replaces_same_name() {
        let mut doc = Document::new();
        let el = doc.create_element(NodeName::local("e"));
        let first = doc.create_attribute(NodeName::local("x"), "1");
        let other = doc.create_attribute(NodeName::local("y"), "2");
        let second = doc.create_attribute(NodeName::local("x"), "3");
        doc.set_attribute(el, first).unwrap();
        doc.set_attribute(el, other).unwrap();
        doc.set_attribute(el, second).unwrap();
        assert_eq!(doc.attributes(el), &[second, other]);
        assert_eq!(doc.attribute(el, None, "x"), Some("3"));
    }

    #[test]
    fn test_invalid_operations_are_rejected() {
        let mut doc = Document::new();
        let text = doc.create_text("t");
        let el = doc.create_element(NodeName::local("e"));
        let attr = doc.create_attribute(NodeName::local("a"), "v");
        assert!(doc.append_child(text, el).is_err());
        assert!(doc.append_child(el, attr).is_err());
        assert!(doc.set_attribute(text, attr).is_err());
        doc.append_child(NodeId::ROOT, el).unwrap();
        assert!(doc.append_child(NodeId::ROOT, el).is_err());
        assert!(doc.append_text(el, "x").is_err());
        doc.append_text(attr, "w").unwrap();
        assert_eq!(doc.value(attr), "vw");
    }

    #[test]
    fn test_import_node_deep_and_shallow() {
        let (source, root) = sample();
        let source = Rc::new(source);
        let node = Node::new(Rc::clone(&source), root);

        let mut target = Document::new_fragment();
        let deep = target.import_node(&node, true).unwrap();
        assert_eq!(target.child_count(deep), 2);
        assert_eq!(target.attribute(deep, None, "id"), Some("r1"));
        assert_eq!(target.string_value(deep), "one");

        let shallow = target.import_node(&node, false).unwrap();
        assert_eq!(target.child_count(shallow), 0);
        assert!(target.attributes(shallow).is_empty());

        assert!(target.import_node(&Node::root(&source), true).is_err());
    }

    #[test]
    fn test_strip_whitespace_honours_xml_space() {
        let mut doc = Document::new();
        let root = doc.create_element(NodeName::local("root"));
        doc.append_child(NodeId::ROOT, root).unwrap();
        let ws = doc.create_text("\n  ");
        doc.append_child(root, ws).unwrap();
        let keep = doc.create_element(NodeName::local("keep"));
        let space = doc.create_attribute(NodeName::new(Some("xml"), "space", Some(XML_NAMESPACE)), "preserve");
        doc.set_attribute(keep, space).unwrap();
        doc.append_child(root, keep).unwrap();
        let inner = doc.create_text(" ");
        doc.append_child(keep, inner).unwrap();

        let stripped = doc.strip_whitespace(&|_| true);
        assert_ne!(stripped.id(), doc.id());
        let new_root = stripped.document_element().unwrap();
        assert_eq!(stripped.child_count(new_root), 1);
        let new_keep = stripped.children(new_root)[0];
        assert_eq!(stripped.string_value(new_keep), " ");
    }
}
