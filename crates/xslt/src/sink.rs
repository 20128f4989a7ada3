//! Result sinks: where instructions write their output.

use crate::error::TransformError;
use std::cell::RefCell;
use std::rc::Rc;
use trellis_tree::{Document, Node, NodeId, TreeError};
use trellis_xpath1::{DataSourceNode, NodeType};

/// A value written to a sink.
#[derive(Debug, Clone)]
pub enum ResultItem {
    Text(String),
    /// Text written without output escaping.
    RawText(String),
    /// A node of another (frozen) document. It is copied into the sink's tree.
    Node(Node),
    /// A detached node already created in the sink's own tree.
    Created(NodeId),
    List(Vec<ResultItem>),
}

/// Either a node of a result tree under construction, or a plain text accumulator.
#[derive(Clone)]
pub enum ResultSink {
    Node { tree: Rc<RefCell<Document>>, node: NodeId },
    Text(Rc<RefCell<String>>),
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultSink::Node { tree, node } => write!(f, "ResultSink::Node({}:{})", tree.borrow().id(), node.index()),
            ResultSink::Text(text) => write!(f, "ResultSink::Text({:?})", text.borrow()),
        }
    }
}

impl ResultSink {
    /// The root of a new, empty result tree fragment.
    pub fn fragment() -> Self {
        ResultSink::Node {
            tree: Rc::new(RefCell::new(Document::new_fragment())),
            node: NodeId::ROOT,
        }
    }

    pub fn text() -> Self {
        ResultSink::Text(Rc::new(RefCell::new(String::new())))
    }

    /// A sink writing into `node` of the same tree.
    pub fn child(&self, node: NodeId) -> Result<Self, TransformError> {
        match self {
            ResultSink::Node { tree, .. } => Ok(ResultSink::Node {
                tree: Rc::clone(tree),
                node,
            }),
            ResultSink::Text(_) => Err(TransformError::InvalidContent(
                "cannot address nodes of a text result".to_string(),
            )),
        }
    }

    /// Creates a detached node in the sink's tree. Only structural sinks accept new nodes.
    pub fn create<F>(&self, build: F) -> Result<NodeId, TransformError>
    where
        F: FnOnce(&mut Document) -> Result<NodeId, TreeError>,
    {
        match self {
            ResultSink::Node { tree, node } => {
                let mut doc = tree.borrow_mut();
                if !matches!(doc.node_type(*node), NodeType::Root | NodeType::Element) {
                    return Err(TransformError::InvalidContent(format!(
                        "a {:?} node can only contain text",
                        doc.node_type(*node)
                    )));
                }
                Ok(build(&mut doc)?)
            }
            ResultSink::Text(_) => Err(TransformError::InvalidContent(
                "nodes cannot be created in a text-only result".to_string(),
            )),
        }
    }

    /// The text accumulated by a text sink, or the string value of a node sink.
    pub fn string_value(&self) -> String {
        match self {
            ResultSink::Node { tree, node } => tree.borrow().string_value(*node),
            ResultSink::Text(text) => text.borrow().clone(),
        }
    }

    /// Freezes the tree behind a fragment sink. When other handles to the tree are still
    /// alive the tree is copied instead.
    pub fn into_document(self) -> Result<Rc<Document>, TransformError> {
        match self {
            ResultSink::Node { tree, .. } => Ok(Rc::new(match Rc::try_unwrap(tree) {
                Ok(cell) => cell.into_inner(),
                Err(shared) => shared.borrow().duplicate(),
            })),
            ResultSink::Text(_) => Err(TransformError::InvalidContent(
                "a text result has no tree".to_string(),
            )),
        }
    }

    pub fn push(&self, item: ResultItem) -> Result<(), TransformError> {
        match self {
            ResultSink::Text(text) => match item {
                ResultItem::List(items) => items.into_iter().try_for_each(|item| self.push(item)),
                other => {
                    let s = text_content(&other, None)?;
                    text.borrow_mut().push_str(&s);
                    Ok(())
                }
            },
            ResultSink::Node { tree, node } => {
                let kind = tree.borrow().node_type(*node);
                match kind {
                    NodeType::Root | NodeType::Element => self.push_structural(tree, *node, item),
                    _ => match item {
                        ResultItem::List(items) => items.into_iter().try_for_each(|item| self.push(item)),
                        other => {
                            let s = text_content(&other, Some(&tree.borrow()))?;
                            tree.borrow_mut().append_text(*node, &s)?;
                            Ok(())
                        }
                    },
                }
            }
        }
    }

    fn push_structural(&self, tree: &Rc<RefCell<Document>>, parent: NodeId, item: ResultItem) -> Result<(), TransformError> {
        match item {
            ResultItem::List(items) => items.into_iter().try_for_each(|item| self.push(item)),
            ResultItem::Text(text) => {
                let mut doc = tree.borrow_mut();
                let id = doc.create_text(&text);
                doc.append_child(parent, id)?;
                Ok(())
            }
            ResultItem::RawText(text) => {
                let mut doc = tree.borrow_mut();
                let id = doc.create_raw_text(&text);
                doc.append_child(parent, id)?;
                Ok(())
            }
            ResultItem::Created(id) => {
                let mut doc = tree.borrow_mut();
                if doc.node_type(id) == NodeType::Attribute {
                    add_attribute(&mut doc, parent, id)
                } else {
                    doc.append_child(parent, id)?;
                    Ok(())
                }
            }
            ResultItem::Node(source) => match source.node_type() {
                NodeType::Root if source.is_document_root() => {
                    for element in source.child_elements() {
                        self.push_structural(tree, parent, ResultItem::Node(element))?;
                    }
                    Ok(())
                }
                NodeType::Root => {
                    for child in source.children() {
                        self.push_structural(tree, parent, ResultItem::Node(child))?;
                    }
                    Ok(())
                }
                NodeType::Attribute => {
                    let mut doc = tree.borrow_mut();
                    let id = doc.import_node(&source, false)?;
                    add_attribute(&mut doc, parent, id)
                }
                _ => {
                    let mut doc = tree.borrow_mut();
                    let id = doc.import_node(&source, true)?;
                    doc.append_child(parent, id)?;
                    Ok(())
                }
            },
        }
    }
}

fn add_attribute(doc: &mut Document, element: NodeId, attribute: NodeId) -> Result<(), TransformError> {
    if doc.node_type(element) != NodeType::Element || doc.child_count(element) > 0 {
        let name = doc.name(attribute).map(|name| name.qualified()).unwrap_or_default();
        return Err(TransformError::UnexpectedAttribute(name));
    }
    doc.set_attribute(element, attribute)?;
    Ok(())
}

/// The text of an item written to a text-only sink.
fn text_content(item: &ResultItem, tree: Option<&Document>) -> Result<String, TransformError> {
    match item {
        ResultItem::Text(text) | ResultItem::RawText(text) => Ok(text.clone()),
        ResultItem::Node(node) if node.node_type() == NodeType::Text => Ok(node.value().to_string()),
        ResultItem::Created(id) if tree.is_some_and(|doc| doc.node_type(*id) == NodeType::Text) => {
            Ok(tree.map(|doc| doc.value(*id).to_string()).unwrap_or_default())
        }
        other => Err(TransformError::InvalidContent(format!(
            "only text can be written here, got {}",
            describe(other, tree)
        ))),
    }
}

fn describe(item: &ResultItem, tree: Option<&Document>) -> String {
    match item {
        ResultItem::Node(node) => format!("a {:?} node", node.node_type()),
        ResultItem::Created(id) => match tree {
            Some(doc) => format!("a {:?} node", doc.node_type(*id)),
            None => "a node".to_string(),
        },
        ResultItem::List(_) => "a list".to_string(),
        ResultItem::Text(_) | ResultItem::RawText(_) => "text".to_string(),
    }
}
