//! Lazy axis traversal.
//!
//! Every axis is an iterator struct holding explicit traversal state, so it can be cloned to
//! restart and never materializes the whole axis up front. Forward axes yield in document
//! order; reverse axes (`ancestor`, `ancestor-or-self`, `preceding`, `preceding-sibling`)
//! yield nearest-first, which is reverse document order.

use crate::ast::Axis;
use crate::datasource::{DataSourceNode, NodeType};
use crate::order::attribute_order_key;

impl Axis {
    /// True for axes that run against document order.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }

    /// The node kind a name test on this axis selects.
    pub fn principal_node_type(self) -> NodeType {
        match self {
            Axis::Attribute => NodeType::Attribute,
            _ => NodeType::Element,
        }
    }
}

/// Creates the lazy iterator for `axis` starting at `node`.
///
/// The namespace axis has no nodes in this data model and yields nothing; the evaluator
/// rejects it before traversal.
pub fn axis_iter<N: DataSourceNode>(axis: Axis, node: &N) -> AxisIter<N> {
    match axis {
        Axis::Child => AxisIter::Siblings(Siblings::forward(node.first_child())),
        Axis::Descendant => AxisIter::Descendants(Descendants::of(node, false)),
        Axis::DescendantOrSelf => AxisIter::Descendants(Descendants::of(node, true)),
        Axis::Attribute => {
            let mut attributes: Vec<N> = node.attributes().collect();
            attributes.sort_by_cached_key(attribute_order_key);
            AxisIter::Attributes(attributes.into_iter())
        }
        Axis::Parent => AxisIter::Single(node.parent()),
        Axis::Ancestor => AxisIter::Ancestors(Ancestors { next: node.parent() }),
        Axis::AncestorOrSelf => AxisIter::Ancestors(Ancestors {
            next: Some(node.clone()),
        }),
        Axis::SelfAxis => AxisIter::Single(Some(node.clone())),
        Axis::FollowingSibling => AxisIter::Siblings(Siblings::forward(node.next_sibling())),
        Axis::PrecedingSibling => AxisIter::Siblings(Siblings::backward(node.previous_sibling())),
        Axis::Following => AxisIter::Following(Following::of(node)),
        Axis::Preceding => AxisIter::Preceding(Preceding::of(node)),
        Axis::Namespace => AxisIter::Single(None),
    }
}

#[derive(Debug, Clone)]
pub enum AxisIter<N> {
    Single(Option<N>),
    Siblings(Siblings<N>),
    Attributes(std::vec::IntoIter<N>),
    Ancestors(Ancestors<N>),
    Descendants(Descendants<N>),
    Following(Following<N>),
    Preceding(Preceding<N>),
}

impl<N: DataSourceNode> Iterator for AxisIter<N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        match self {
            AxisIter::Single(slot) => slot.take(),
            AxisIter::Siblings(it) => it.next(),
            AxisIter::Attributes(it) => it.next(),
            AxisIter::Ancestors(it) => it.next(),
            AxisIter::Descendants(it) => it.next(),
            AxisIter::Following(it) => it.next(),
            AxisIter::Preceding(it) => it.next(),
        }
    }
}

/// Walks a sibling chain in one direction.
#[derive(Debug, Clone)]
pub struct Siblings<N> {
    next: Option<N>,
    forward: bool,
}

impl<N> Siblings<N> {
    fn forward(start: Option<N>) -> Self {
        Self {
            next: start,
            forward: true,
        }
    }

    fn backward(start: Option<N>) -> Self {
        Self {
            next: start,
            forward: false,
        }
    }
}

impl<N: DataSourceNode> Iterator for Siblings<N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        let current = self.next.take()?;
        self.next = if self.forward {
            current.next_sibling()
        } else {
            current.previous_sibling()
        };
        Some(current)
    }
}

#[derive(Debug, Clone)]
pub struct Ancestors<N> {
    next: Option<N>,
}

impl<N: DataSourceNode> Iterator for Ancestors<N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

/// Depth-first, pre-order traversal of a subtree using a work stack.
///
/// The stack holds the next node to visit on top; visiting a node pushes its next sibling
/// and then its first child, so the child is explored before the sibling.
#[derive(Debug, Clone)]
pub struct Descendants<N> {
    pending_self: Option<N>,
    stack: Vec<N>,
}

impl<N: DataSourceNode> Descendants<N> {
    fn of(node: &N, include_self: bool) -> Self {
        Self {
            pending_self: include_self.then(|| node.clone()),
            stack: node.first_child().into_iter().collect(),
        }
    }
}

impl<N: DataSourceNode> Iterator for Descendants<N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        if let Some(node) = self.pending_self.take() {
            return Some(node);
        }
        let current = self.stack.pop()?;
        if let Some(sibling) = current.next_sibling() {
            self.stack.push(sibling);
        }
        if let Some(child) = current.first_child() {
            self.stack.push(child);
        }
        Some(current)
    }
}

/// Every node after the context node in document order, excluding its descendants.
///
/// Subtrees of the following siblings of the context node are walked first, then those
/// of the parent's following siblings, and so on up to the root.
#[derive(Debug, Clone)]
pub struct Following<N> {
    stack: Vec<N>,
    anchor: Option<N>,
}

impl<N: DataSourceNode> Following<N> {
    fn of(node: &N) -> Self {
        if node.node_type() == NodeType::Attribute {
            // The owner's children follow its attributes.
            let owner = node.parent();
            let stack = owner
                .as_ref()
                .and_then(|o| o.first_child())
                .into_iter()
                .collect();
            return Self {
                stack,
                anchor: owner,
            };
        }
        Self {
            stack: Vec::new(),
            anchor: Some(node.clone()),
        }
    }
}

impl<N: DataSourceNode> Iterator for Following<N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        while self.stack.is_empty() {
            let anchor = self.anchor.take()?;
            if let Some(sibling) = anchor.next_sibling() {
                self.stack.push(sibling);
            }
            self.anchor = anchor.parent();
        }
        let current = self.stack.pop()?;
        if let Some(sibling) = current.next_sibling() {
            self.stack.push(sibling);
        }
        if let Some(child) = current.first_child() {
            self.stack.push(child);
        }
        Some(current)
    }
}

/// Every node before the context node, nearest first, excluding its ancestors.
///
/// Stack entries are `(node, expanded)`. Expanding a node schedules its previous sibling,
/// then the node itself, then its last child; so a subtree is produced in reverse
/// pre-order and sibling chains run right to left.
#[derive(Debug, Clone)]
pub struct Preceding<N> {
    stack: Vec<(N, bool)>,
    anchor: Option<N>,
}

impl<N: DataSourceNode> Preceding<N> {
    fn of(node: &N) -> Self {
        let anchor = if node.node_type() == NodeType::Attribute {
            node.parent()
        } else {
            Some(node.clone())
        };
        Self {
            stack: Vec::new(),
            anchor,
        }
    }
}

impl<N: DataSourceNode> Iterator for Preceding<N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        loop {
            while self.stack.is_empty() {
                let anchor = self.anchor.take()?;
                if let Some(sibling) = anchor.previous_sibling() {
                    self.stack.push((sibling, false));
                }
                self.anchor = anchor.parent();
            }
            let (current, expanded) = self.stack.pop()?;
            if expanded {
                return Some(current);
            }
            if let Some(sibling) = current.previous_sibling() {
                self.stack.push((sibling, false));
            }
            let last_child = current.last_child();
            self.stack.push((current, true));
            if let Some(child) = last_child {
                self.stack.push((child, false));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::create_test_tree;

    fn ids<'a>(it: impl Iterator<Item = crate::datasource::tests::MockNode<'a>>) -> Vec<usize> {
        it.map(|n| n.id).collect()
    }

    #[test]
    fn test_child_and_descendant_axes() {
        let tree = create_test_tree();
        let root = tree.root();
        assert_eq!(ids(axis_iter(Axis::Child, &root)), vec![1, 8, 5, 9, 6, 10]);
        assert_eq!(
            ids(axis_iter(Axis::Descendant, &root)),
            vec![1, 4, 8, 5, 9, 6, 7, 10, 12, 13]
        );
        assert_eq!(
            ids(axis_iter(Axis::DescendantOrSelf, &tree.node(6))),
            vec![6, 7]
        );
    }

    #[test]
    fn test_axes_are_restartable() {
        let tree = create_test_tree();
        let iter = axis_iter(Axis::Descendant, &tree.root());
        let first: Vec<usize> = ids(iter.clone());
        let second: Vec<usize> = ids(iter);
        assert_eq!(first, second);
    }

    #[test]
    fn test_ancestor_axes_are_nearest_first() {
        let tree = create_test_tree();
        let text = tree.node(13);
        assert_eq!(ids(axis_iter(Axis::Ancestor, &text)), vec![12, 10, 0]);
        assert_eq!(ids(axis_iter(Axis::AncestorOrSelf, &text)), vec![13, 12, 10, 0]);
        assert!(Axis::Ancestor.is_reverse());
        assert!(!Axis::Descendant.is_reverse());
    }

    #[test]
    fn test_sibling_axes() {
        let tree = create_test_tree();
        let div = tree.node(5);
        assert_eq!(ids(axis_iter(Axis::FollowingSibling, &div)), vec![9, 6, 10]);
        assert_eq!(ids(axis_iter(Axis::PrecedingSibling, &div)), vec![8, 1]);
        // attributes have no siblings
        assert!(ids(axis_iter(Axis::FollowingSibling, &tree.node(2))).is_empty());
    }

    #[test]
    fn test_following_skips_descendants() {
        let tree = create_test_tree();
        assert_eq!(
            ids(axis_iter(Axis::Following, &tree.node(1))),
            vec![8, 5, 9, 6, 7, 10, 12, 13]
        );
        // From a text node deep in the tree, following climbs out of the parent.
        assert_eq!(ids(axis_iter(Axis::Following, &tree.node(4))), vec![8, 5, 9, 6, 7, 10, 12, 13]);
    }

    #[test]
    fn test_following_from_attribute_includes_owner_children() {
        let tree = create_test_tree();
        assert_eq!(
            ids(axis_iter(Axis::Following, &tree.node(2))),
            vec![4, 8, 5, 9, 6, 7, 10, 12, 13]
        );
    }

    #[test]
    fn test_preceding_is_reverse_document_order_without_ancestors() {
        let tree = create_test_tree();
        assert_eq!(
            ids(axis_iter(Axis::Preceding, &tree.node(13))),
            vec![7, 6, 9, 5, 8, 4, 1]
        );
        assert_eq!(ids(axis_iter(Axis::Preceding, &tree.node(6))), vec![9, 5, 8, 4, 1]);
    }

    #[test]
    fn test_attribute_axis_and_principal_type() {
        let tree = create_test_tree();
        assert_eq!(ids(axis_iter(Axis::Attribute, &tree.node(1))), vec![2, 3]);
        assert_eq!(Axis::Attribute.principal_node_type(), NodeType::Attribute);
        assert_eq!(Axis::Child.principal_node_type(), NodeType::Element);
    }
}
