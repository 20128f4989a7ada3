//! Shared node handles over frozen documents.

use crate::document::{Document, Location, NodeId, NodeName};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use trellis_xpath1::{DataSourceNode, NodeType, QName};

/// A node of a shared document. Cloning is cheap; equality and hashing use the
/// (document id, node id) pair.
#[derive(Clone)]
pub struct Node {
    doc: Rc<Document>,
    id: NodeId,
}

impl Node {
    pub fn new(doc: Rc<Document>, id: NodeId) -> Self {
        Self { doc, id }
    }

    /// The root node of `doc`.
    pub fn root(doc: &Rc<Document>) -> Self {
        Self::new(Rc::clone(doc), NodeId::ROOT)
    }

    pub fn document(&self) -> &Rc<Document> {
        &self.doc
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_name(&self) -> Option<&NodeName> {
        self.doc.name(self.id)
    }

    /// The stored value of a leaf node (text, attribute value, comment, PI data).
    pub fn value(&self) -> &str {
        self.doc.value(self.id)
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.doc.base_uri()
    }

    pub fn location(&self) -> Option<&Location> {
        self.doc.location(self.id)
    }

    /// True when this is the root of a parsed document rather than of a fragment.
    pub fn is_document_root(&self) -> bool {
        self.id == NodeId::ROOT && !self.doc.is_fragment()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = Node> + '_ {
        self.doc
            .children(self.id)
            .iter()
            .filter(|&&child| self.doc.node_type(child) == NodeType::Element)
            .map(|&child| self.at(child))
    }

    fn at(&self, id: NodeId) -> Node {
        Node::new(Rc::clone(&self.doc), id)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.doc.id() == other.doc.id()
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.doc.id().hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}:{} {:?}", self.doc.id(), self.id.index(), self.node_type())?;
        if let Some(name) = self.node_name() {
            write!(f, " {}", name)?;
        }
        write!(f, ")")
    }
}

impl DataSourceNode for Node {
    fn node_type(&self) -> NodeType {
        self.doc.node_type(self.id)
    }

    fn name(&self) -> Option<QName<'_>> {
        self.doc.name(self.id).map(|name| QName {
            prefix: name.prefix.as_deref(),
            local_part: &name.local_name,
            namespace_uri: name.namespace_uri.as_deref(),
        })
    }

    fn string_value(&self) -> String {
        self.doc.string_value(self.id)
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + '_> {
        Box::new(self.doc.attributes(self.id).iter().map(move |&attr| self.at(attr)))
    }

    fn parent(&self) -> Option<Self> {
        self.doc.parent(self.id).map(|parent| self.at(parent))
    }

    fn first_child(&self) -> Option<Self> {
        self.doc.children(self.id).first().map(|&child| self.at(child))
    }

    fn last_child(&self) -> Option<Self> {
        self.doc.children(self.id).last().map(|&child| self.at(child))
    }

    fn next_sibling(&self) -> Option<Self> {
        if self.node_type() == NodeType::Attribute {
            return None;
        }
        let parent = self.doc.parent(self.id)?;
        let index = self.doc.sibling_index(self.id);
        self.doc.children(parent).get(index + 1).map(|&sibling| self.at(sibling))
    }

    fn previous_sibling(&self) -> Option<Self> {
        if self.node_type() == NodeType::Attribute {
            return None;
        }
        let parent = self.doc.parent(self.id)?;
        let index = self.doc.sibling_index(self.id).checked_sub(1)?;
        self.doc.children(parent).get(index).map(|&sibling| self.at(sibling))
    }

    fn document_id(&self) -> u64 {
        self.doc.id().get()
    }

    fn sibling_index(&self) -> usize {
        self.doc.sibling_index(self.id)
    }

    fn namespace_declarations(&self) -> Vec<(Option<String>, String)> {
        self.doc.namespaces(self.id).to_vec()
    }

    fn element_by_id(&self, id: &str) -> Option<Self> {
        self.doc.element_by_id(id).map(|element| self.at(element))
    }

    fn attribute_value(&self, namespace_uri: Option<&str>, local_name: &str) -> Option<String> {
        self.doc
            .attribute(self.id, namespace_uri, local_name)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_xpath1::{EvaluationContext, StaticEnvironment, XPathValue, evaluate, parse_expression};

    fn doc() -> Rc<Document> {
        Rc::new(
            Document::parse_str(r#"<list xmlns:x="urn:x"><item id="a" x:n="1">one</item><!--c--><item id="b">two</item></list>"#)
                .unwrap(),
        )
    }

    #[test]
    fn test_navigation() {
        let doc = doc();
        let root = Node::root(&doc);
        let list = root.first_child().unwrap();
        assert_eq!(list.name().unwrap().local_part, "list");
        let first = list.first_child().unwrap();
        let comment = first.next_sibling().unwrap();
        assert_eq!(comment.node_type(), NodeType::Comment);
        assert_eq!(comment.previous_sibling(), Some(first.clone()));
        assert_eq!(list.last_child().unwrap().string_value(), "two");
        assert_eq!(first.attributes().count(), 2);
        let attr = first.attributes().next().unwrap();
        assert_eq!(attr.parent(), Some(first.clone()));
        assert!(attr.next_sibling().is_none());
        assert_eq!(first.attribute_value(Some("urn:x"), "n").as_deref(), Some("1"));
        assert_eq!(root.element_by_id("b").unwrap().string_value(), "two");
        assert_eq!(list.namespace_declarations(), vec![(Some("x".to_string()), "urn:x".to_string())]);
    }

    #[test]
    fn test_identity_is_document_and_node() {
        let a = doc();
        let b = doc();
        assert_eq!(Node::root(&a), Node::root(&a));
        assert_ne!(Node::root(&a), Node::root(&b));
        assert!(Node::root(&a).is_document_root());
    }

    #[test]
    fn test_xpath_over_arena_nodes() {
        let doc = doc();
        let env = StaticEnvironment::new().with_namespace("x", "urn:x");
        let ctx = EvaluationContext::new(Node::root(&doc), 1, 1, &env);
        let eval = |source: &str| evaluate(&parse_expression(source).unwrap(), &ctx).unwrap();

        assert_eq!(eval("count(//item)"), XPathValue::Number(2.0));
        assert_eq!(eval("string(id('b'))"), XPathValue::String("two".to_string()));
        assert_eq!(eval("string(//@x:n)"), XPathValue::String("1".to_string()));
        assert_eq!(eval("count(/list/node())"), XPathValue::Number(3.0));
        assert_eq!(eval("string(//item[2]/preceding::comment())"), XPathValue::String("c".to_string()));
    }

    #[test]
    fn test_attribute_axis_follows_name_order() {
        let doc = Rc::new(Document::parse_str(r#"<r><x b="1" a="2"/></r>"#).unwrap());
        let env = StaticEnvironment::new();
        let ctx = EvaluationContext::new(Node::root(&doc), 1, 1, &env);
        let names = |source: &str| match evaluate(&parse_expression(source).unwrap(), &ctx).unwrap() {
            XPathValue::NodeSet(nodes) => nodes
                .iter()
                .map(|n| n.name().map(|q| q.local_part.to_string()).unwrap_or_default())
                .collect::<Vec<_>>(),
            other => panic!("expected a node-set, got {:?}", other),
        };

        assert_eq!(names("r/x/@*"), vec!["a", "b"]);
        assert_eq!(names("(r/x/@*)"), vec!["a", "b"]);
        assert_eq!(names("r/x/@* | r/x/@*"), vec!["a", "b"]);
        assert_eq!(names("r/x/@*[1]"), vec!["a"]);
    }
}
