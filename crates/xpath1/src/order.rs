//! Document order: a total order over the nodes of one or more documents.
//!
//! The key of a node is built from the root down. The root contributes its document
//! identity, every other node its 0-based sibling index, and an attribute contributes a
//! marker that sorts before any child index, followed by its name. Comparing keys
//! lexicographically yields document order. Nodes of different documents are ordered by
//! document identity.

use crate::datasource::{DataSourceNode, NodeType};
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OrderComponent {
    Document(u64),
    /// Attributes sort before children, then by local name and namespace.
    Attribute {
        local_name: String,
        namespace_uri: String,
    },
    Child(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentOrderKey(pub Vec<OrderComponent>);

/// Computes the document order key of a node.
pub fn document_order_key<N: DataSourceNode>(node: &N) -> DocumentOrderKey {
    let mut components = Vec::new();
    let mut current = Some(node.clone());
    while let Some(n) = current {
        let parent = n.parent();
        match (n.node_type(), &parent) {
            (_, None) => components.push(OrderComponent::Document(n.document_id())),
            (NodeType::Attribute, Some(_)) => {
                let (local_name, namespace_uri) = attribute_order_key(&n);
                components.push(OrderComponent::Attribute {
                    local_name,
                    namespace_uri,
                });
            }
            (_, Some(_)) => components.push(OrderComponent::Child(n.sibling_index())),
        }
        current = parent;
    }
    components.reverse();
    DocumentOrderKey(components)
}

/// The (local name, namespace URI) pair that orders attributes of one element.
pub fn attribute_order_key<N: DataSourceNode>(attribute: &N) -> (String, String) {
    attribute
        .name()
        .map(|q| {
            (
                q.local_part.to_string(),
                q.namespace_uri.unwrap_or_default().to_string(),
            )
        })
        .unwrap_or_default()
}

/// Compares two nodes by document order.
pub fn compare_document_order<N: DataSourceNode>(a: &N, b: &N) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    document_order_key(a).cmp(&document_order_key(b))
}

/// Sorts nodes into document order. Each key is computed once per sort.
pub fn sort_document_order<N: DataSourceNode>(nodes: &mut [N]) {
    nodes.sort_by_cached_key(document_order_key);
}

/// Sorts nodes into document order and removes duplicates.
pub fn sort_unique<N: DataSourceNode>(nodes: &mut Vec<N>) {
    sort_document_order(nodes);
    nodes.dedup();
}

/// The union of two node-sets, in document order and without duplicates.
pub fn union<N: DataSourceNode>(left: Vec<N>, right: Vec<N>) -> Vec<N> {
    let mut merged = left;
    merged.extend(right);
    sort_unique(&mut merged);
    merged
}

/// The first node of a node-set in document order.
pub fn first_in_document_order<N: DataSourceNode>(nodes: &[N]) -> Option<&N> {
    nodes.iter().min_by_key(|n| document_order_key(*n))
}

/// Merges `batch` (already in document order) into `target` (in document order), skipping
/// nodes already present. When every new node follows the current tail the batch is
/// appended; otherwise the whole set is re-sorted.
pub fn merge_into<N: DataSourceNode>(target: &mut Vec<N>, seen: &mut HashSet<N>, batch: Vec<N>) {
    let fresh: Vec<N> = batch.into_iter().filter(|n| seen.insert(n.clone())).collect();
    let Some(first_fresh) = fresh.first() else {
        return;
    };
    let in_order = match target.last() {
        None => true,
        Some(tail) => document_order_key(tail) < document_order_key(first_fresh),
    };
    target.extend(fresh);
    if !in_order {
        sort_document_order(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{create_test_tree, create_test_tree_with_id};

    #[test]
    fn test_key_shape() {
        let tree = create_test_tree();
        assert_eq!(
            document_order_key(&tree.root()),
            DocumentOrderKey(vec![OrderComponent::Document(1)])
        );
        // <div> is the third child of the root (after para and the comment).
        assert_eq!(
            document_order_key(&tree.node(5)),
            DocumentOrderKey(vec![OrderComponent::Document(1), OrderComponent::Child(2)])
        );
    }

    #[test]
    fn test_attributes_sort_after_owner_before_children_by_name() {
        let tree = create_test_tree();
        let mut nodes = vec![tree.node(4), tree.node(3), tree.node(1), tree.node(2)];
        sort_document_order(&mut nodes);
        let ids: Vec<usize> = nodes.iter().map(|n| n.id).collect();
        // element, then @id ("id" < "lang"), then @xml:lang, then the text child
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_union_removes_duplicates_and_orders() {
        let tree = create_test_tree();
        let left = vec![tree.node(6), tree.node(1)];
        let right = vec![tree.node(5), tree.node(6)];
        let ids: Vec<usize> = union(left, right).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 5, 6]);
    }

    #[test]
    fn test_documents_are_ordered_by_identity() {
        let first = create_test_tree_with_id(7);
        let second = create_test_tree_with_id(3);
        assert_eq!(
            compare_document_order(&first.node(1), &second.node(6)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_merge_into_appends_or_resorts() {
        let tree = create_test_tree();
        let mut target = vec![];
        let mut seen = HashSet::new();
        merge_into(&mut target, &mut seen, vec![tree.node(5)]);
        merge_into(&mut target, &mut seen, vec![tree.node(6), tree.node(7)]);
        merge_into(&mut target, &mut seen, vec![tree.node(1), tree.node(5)]);
        let ids: Vec<usize> = target.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 5, 6, 7]);
    }

    #[test]
    fn test_first_in_document_order() {
        let tree = create_test_tree();
        let nodes = vec![tree.node(7), tree.node(4), tree.node(6)];
        assert_eq!(first_in_document_order(&nodes).map(|n| n.id), Some(4));
        assert!(first_in_document_order::<crate::datasource::tests::MockNode>(&[]).is_none());
    }
}
