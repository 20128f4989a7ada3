//! Defines the core abstraction for a navigable data source tree.
use std::fmt::Debug;
use std::hash::Hash;

/// A node name as exposed by a data source: prefix, local part and resolved namespace URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub local_part: &'a str,
    pub namespace_uri: Option<&'a str>,
}

impl<'a> QName<'a> {
    pub fn local(local_part: &'a str) -> Self {
        Self {
            prefix: None,
            local_part,
            namespace_uri: None,
        }
    }

    /// The lexical form, `prefix:local` or `local`.
    pub fn qualified(&self) -> String {
        match self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local_part),
            None => self.local_part.to_string(),
        }
    }
}

/// The type of a node in the data source tree, aligned with the XPath 1.0 data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

/// The universal contract for a node in a hierarchical data source.
///
/// The XPath engine is written exclusively against this trait, so any tree that can
/// answer these navigation questions can be queried. Node handles are cheap to clone
/// and compare by identity.
pub trait DataSourceNode: Debug + Clone + PartialEq + Eq + Hash {
    /// The type of the node (Element, Text, Attribute, etc.).
    fn node_type(&self) -> NodeType;

    /// The name of the node. Returns `None` for node types that do not have names,
    /// such as text or root nodes. For a processing-instruction, this is its target.
    fn name(&self) -> Option<QName<'_>>;

    /// The string value of the node, as defined by the XPath 1.0 `string()` function.
    /// - For a text node, this is its content.
    /// - For an element or root, this is the concatenation of all descendant text nodes.
    /// - For an attribute, this is its value.
    /// - For a comment or processing instruction, this is its content.
    fn string_value(&self) -> String;

    /// The attribute nodes of this node. Empty for non-element nodes.
    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + '_>;

    /// The parent node. For an attribute this is its owner element. `None` for the root.
    fn parent(&self) -> Option<Self>;

    fn first_child(&self) -> Option<Self>;

    fn last_child(&self) -> Option<Self>;

    /// The next sibling. Attributes have no siblings.
    fn next_sibling(&self) -> Option<Self>;

    /// The previous sibling. Attributes have no siblings.
    fn previous_sibling(&self) -> Option<Self>;

    /// An identity for the document this node belongs to, unique within the process.
    fn document_id(&self) -> u64;

    /// The 0-based index of this node among its parent's children.
    fn sibling_index(&self) -> usize {
        let mut index = 0;
        let mut current = self.previous_sibling();
        while let Some(node) = current {
            index += 1;
            current = node.previous_sibling();
        }
        index
    }

    /// Namespace declarations made on this element, as `(prefix, uri)` pairs.
    /// The default namespace has no prefix.
    fn namespace_declarations(&self) -> Vec<(Option<String>, String)> {
        Vec::new()
    }

    /// Looks up an element in this node's document by its ID attribute.
    fn element_by_id(&self, _id: &str) -> Option<Self> {
        None
    }

    /// The value of the attribute with the given namespace and local name.
    fn attribute_value(&self, namespace_uri: Option<&str>, local_name: &str) -> Option<String> {
        self.attributes()
            .find(|attr| {
                attr.name()
                    .is_some_and(|n| n.local_part == local_name && n.namespace_uri == namespace_uri)
            })
            .map(|attr| attr.string_value())
    }

    /// An iterator over the child nodes of this node.
    fn children(&self) -> Children<Self> {
        Children {
            next: self.first_child(),
        }
    }

    /// The root of the tree this node belongs to.
    fn root(&self) -> Self {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }
}

/// Iterator over the children of a node, following `next_sibling` links.
#[derive(Debug, Clone)]
pub struct Children<N> {
    next: Option<N>,
}

impl<N: DataSourceNode> Iterator for Children<N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        let current = self.next.take()?;
        self.next = current.next_sibling();
        Some(current)
    }
}

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

// Test utilities - publicly available for integration testing in downstream crates
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::hash::Hasher;

    // --- Mock Implementation for TDD ---

    #[derive(Debug, Clone)]
    struct MockNodeData {
        node_type: NodeType,
        name: Option<(Option<&'static str>, &'static str, Option<&'static str>)>,
        value: String,
        children: Vec<usize>,
        attributes: Vec<usize>,
        namespaces: Vec<(Option<String>, String)>,
    }

    #[derive(Debug)]
    pub struct MockTree {
        pub document_id: u64,
        nodes: HashMap<usize, MockNodeData>,
        // We need a way to map a child ID back to its parent ID for the parent() method.
        parent_map: HashMap<usize, usize>,
    }

    /// A simple, in-memory node representation that holds a reference to its tree.
    /// This is necessary so that the node can navigate itself (e.g., find its parent or children).
    #[derive(Debug, Clone, Copy)]
    pub struct MockNode<'a> {
        pub id: usize,
        pub tree: &'a MockTree,
    }

    impl<'a> PartialEq for MockNode<'a> {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id && self.tree.document_id == other.tree.document_id
        }
    }
    impl<'a> Eq for MockNode<'a> {}

    impl<'a> Hash for MockNode<'a> {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.tree.document_id.hash(state);
            self.id.hash(state);
        }
    }

    impl MockTree {
        pub fn node(&self, id: usize) -> MockNode<'_> {
            MockNode { id, tree: self }
        }

        pub fn root(&self) -> MockNode<'_> {
            self.node(0)
        }

        fn data(&self, id: usize) -> &MockNodeData {
            &self.nodes[&id]
        }

        fn sibling(&self, id: usize, offset: isize) -> Option<usize> {
            let data = self.data(id);
            if data.node_type == NodeType::Attribute {
                return None;
            }
            let parent = self.parent_map.get(&id)?;
            let siblings = &self.data(*parent).children;
            let index = siblings.iter().position(|&c| c == id)? as isize + offset;
            if index < 0 {
                return None;
            }
            siblings.get(index as usize).copied()
        }
    }

    impl<'a> DataSourceNode for MockNode<'a> {
        fn node_type(&self) -> NodeType {
            self.tree.data(self.id).node_type
        }

        fn name(&self) -> Option<QName<'_>> {
            self.tree
                .data(self.id)
                .name
                .map(|(prefix, local_part, namespace_uri)| QName {
                    prefix,
                    local_part,
                    namespace_uri,
                })
        }

        fn string_value(&self) -> String {
            match self.node_type() {
                NodeType::Root | NodeType::Element => self
                    .children()
                    .filter(|c| matches!(c.node_type(), NodeType::Element | NodeType::Text))
                    .map(|c| c.string_value())
                    .collect(),
                _ => self.tree.data(self.id).value.clone(),
            }
        }

        fn attributes(&self) -> Box<dyn Iterator<Item = Self> + '_> {
            let tree = self.tree;
            Box::new(
                tree.data(self.id)
                    .attributes
                    .iter()
                    .map(move |&id| MockNode { id, tree }),
            )
        }

        fn parent(&self) -> Option<Self> {
            self.tree.parent_map.get(&self.id).map(|&pid| MockNode {
                id: pid,
                tree: self.tree,
            })
        }

        fn first_child(&self) -> Option<Self> {
            let tree = self.tree;
            tree.data(self.id)
                .children
                .first()
                .map(|&id| MockNode { id, tree })
        }

        fn last_child(&self) -> Option<Self> {
            let tree = self.tree;
            tree.data(self.id)
                .children
                .last()
                .map(|&id| MockNode { id, tree })
        }

        fn next_sibling(&self) -> Option<Self> {
            self.tree.sibling(self.id, 1).map(|id| self.tree.node(id))
        }

        fn previous_sibling(&self) -> Option<Self> {
            self.tree.sibling(self.id, -1).map(|id| self.tree.node(id))
        }

        fn document_id(&self) -> u64 {
            self.tree.document_id
        }

        fn namespace_declarations(&self) -> Vec<(Option<String>, String)> {
            self.tree.data(self.id).namespaces.clone()
        }

        fn element_by_id(&self, id: &str) -> Option<Self> {
            let tree = self.tree;
            tree.nodes
                .iter()
                .filter(|(_, data)| data.node_type == NodeType::Attribute)
                .filter(|(_, data)| matches!(data.name, Some((None, "id", None))))
                .filter(|(_, data)| data.value == id)
                .filter_map(|(attr, _)| tree.parent_map.get(attr))
                .map(|&owner| tree.node(owner))
                .next()
        }
    }

    fn insert(
        nodes: &mut HashMap<usize, MockNodeData>,
        parent_map: &mut HashMap<usize, usize>,
        id: usize,
        parent: Option<usize>,
        node_type: NodeType,
        name: Option<(Option<&'static str>, &'static str, Option<&'static str>)>,
        value: &str,
    ) {
        nodes.insert(
            id,
            MockNodeData {
                node_type,
                name,
                value: value.to_string(),
                children: vec![],
                attributes: vec![],
                namespaces: vec![],
            },
        );
        if let Some(parent) = parent {
            parent_map.insert(id, parent);
            let parent_data = nodes.get_mut(&parent).map(|p| {
                if node_type == NodeType::Attribute {
                    &mut p.attributes
                } else {
                    &mut p.children
                }
            });
            if let Some(list) = parent_data {
                list.push(id);
            }
        }
    }

    /// Creates a simple mock tree for testing:
    /// <root> <!-- id 0 -->
    ///   <para id="p1" xml:lang="en">Hello</para> <!-- id 1, attr 2&3, text 4 -->
    ///   <!-- comment node --> <!-- id 8 -->
    ///   <div></div> <!-- id 5 -->
    ///   <?pi-target pi-value?> <!-- id 9 -->
    ///   <para>World</para> <!-- id 6, text 7 -->
    ///   <x:item xmlns:x="urn:x" x:code="c1"><x:sub>42</x:sub></x:item> <!-- id 10, attr 11, 12, text 13 -->
    /// </root>
    pub fn create_test_tree() -> MockTree {
        create_test_tree_with_id(1)
    }

    /// Same shape as [`create_test_tree`], with an explicit document identity.
    pub fn create_test_tree_with_id(document_id: u64) -> MockTree {
        let mut nodes = HashMap::new();
        let mut parent_map = HashMap::new();
        let (n, p) = (&mut nodes, &mut parent_map);

        insert(n, p, 0, None, NodeType::Root, None, "");
        insert(n, p, 1, Some(0), NodeType::Element, Some((None, "para", None)), "");
        insert(n, p, 2, Some(1), NodeType::Attribute, Some((None, "id", None)), "p1");
        insert(
            n,
            p,
            3,
            Some(1),
            NodeType::Attribute,
            Some((Some("xml"), "lang", Some(XML_NAMESPACE))),
            "en",
        );
        insert(n, p, 4, Some(1), NodeType::Text, None, "Hello");
        insert(n, p, 8, Some(0), NodeType::Comment, None, " comment node ");
        insert(n, p, 5, Some(0), NodeType::Element, Some((None, "div", None)), "");
        insert(
            n,
            p,
            9,
            Some(0),
            NodeType::ProcessingInstruction,
            Some((None, "pi-target", None)),
            "pi-value",
        );
        insert(n, p, 6, Some(0), NodeType::Element, Some((None, "para", None)), "");
        insert(n, p, 7, Some(6), NodeType::Text, None, "World");
        insert(
            n,
            p,
            10,
            Some(0),
            NodeType::Element,
            Some((Some("x"), "item", Some("urn:x"))),
            "",
        );
        insert(
            n,
            p,
            11,
            Some(10),
            NodeType::Attribute,
            Some((Some("x"), "code", Some("urn:x"))),
            "c1",
        );
        insert(
            n,
            p,
            12,
            Some(10),
            NodeType::Element,
            Some((Some("x"), "sub", Some("urn:x"))),
            "",
        );
        insert(n, p, 13, Some(12), NodeType::Text, None, "42");

        if let Some(item) = nodes.get_mut(&10) {
            item.namespaces
                .push((Some("x".to_string()), "urn:x".to_string()));
        }

        MockTree {
            document_id,
            nodes,
            parent_map,
        }
    }
}
