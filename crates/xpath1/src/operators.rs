//! Contains pure functions for evaluating XPath binary operators.

use super::ast::BinaryOperator;
use super::engine::XPathValue;
use crate::datasource::DataSourceNode;
use crate::error::XPathError;
use crate::order;

pub fn evaluate<N: DataSourceNode>(
    op: BinaryOperator,
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    use BinaryOperator::*;
    match op {
        Or => Ok(XPathValue::Boolean(left.to_bool() || right.to_bool())),
        And => Ok(XPathValue::Boolean(left.to_bool() && right.to_bool())),
        Equals | NotEquals | LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
            Ok(XPathValue::Boolean(compare(op, &left, &right)))
        }
        Plus => Ok(XPathValue::Number(left.to_number() + right.to_number())),
        Minus => Ok(XPathValue::Number(left.to_number() - right.to_number())),
        Multiply => Ok(XPathValue::Number(left.to_number() * right.to_number())),
        Divide => Ok(XPathValue::Number(left.to_number() / right.to_number())),
        Modulo => Ok(XPathValue::Number(left.to_number() % right.to_number())),
        Union => evaluate_union(left, right),
    }
}

/// Compares two values. When a node-set is involved the comparison is existential: it
/// holds if it holds for the string-value of at least one node (or pair of nodes).
pub fn compare<N: DataSourceNode>(
    op: BinaryOperator,
    left: &XPathValue<N>,
    right: &XPathValue<N>,
) -> bool {
    match (left, right) {
        (XPathValue::NodeSet(l), XPathValue::NodeSet(r)) => {
            let right_strings: Vec<XPathValue<N>> = r
                .iter()
                .map(|n| XPathValue::String(n.string_value()))
                .collect();
            l.iter().any(|a| {
                let a = XPathValue::String(a.string_value());
                right_strings.iter().any(|b| compare_atomic(op, &a, b))
            })
        }
        (XPathValue::NodeSet(l), other) => l
            .iter()
            .any(|n| compare_atomic(op, &XPathValue::String(n.string_value()), other)),
        (other, XPathValue::NodeSet(r)) => r
            .iter()
            .any(|n| compare_atomic(op, other, &XPathValue::String(n.string_value()))),
        _ => compare_atomic(op, left, right),
    }
}

fn compare_atomic<N: DataSourceNode>(
    op: BinaryOperator,
    left: &XPathValue<N>,
    right: &XPathValue<N>,
) -> bool {
    use BinaryOperator::*;
    match op {
        Equals | NotEquals => {
            let equal = if left.is_boolean() || right.is_boolean() {
                left.to_bool() == right.to_bool()
            } else if left.is_number() || right.is_number() {
                left.to_number() == right.to_number()
            } else {
                left.to_string() == right.to_string()
            };
            if op == Equals { equal } else { !equal }
        }
        LessThan => left.to_number() < right.to_number(),
        LessThanOrEqual => left.to_number() <= right.to_number(),
        GreaterThan => left.to_number() > right.to_number(),
        GreaterThanOrEqual => left.to_number() >= right.to_number(),
        _ => false,
    }
}

fn evaluate_union<N: DataSourceNode>(
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    let XPathValue::NodeSet(l_nodes) = left else {
        return Err(XPathError::type_error(
            "left-hand side of '|' must be a node-set",
        ));
    };
    let XPathValue::NodeSet(r_nodes) = right else {
        return Err(XPathError::type_error(
            "right-hand side of '|' must be a node-set",
        ));
    };
    Ok(XPathValue::NodeSet(order::union(l_nodes, r_nodes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};

    type V<'a> = XPathValue<MockNode<'a>>;

    #[test]
    fn test_logical_operators() {
        let t = V::Boolean(true);
        let f = V::Boolean(false);
        assert!(evaluate(BinaryOperator::Or, t.clone(), f.clone()).unwrap().to_bool());
        assert!(!evaluate(BinaryOperator::And, t, f).unwrap().to_bool());
    }

    #[test]
    fn test_equality_coercion_order() {
        // boolean wins over number and string
        assert!(compare(BinaryOperator::Equals, &V::Boolean(true), &V::String("x".into())));
        // number wins over string
        assert!(compare(BinaryOperator::Equals, &V::Number(1.0), &V::String(" 1 ".into())));
        // plain strings compare as strings
        assert!(compare(
            BinaryOperator::NotEquals,
            &V::String("1.0".into()),
            &V::String("1".into())
        ));
        // NaN is unequal to itself
        assert!(!compare(BinaryOperator::Equals, &V::Number(f64::NAN), &V::Number(f64::NAN)));
    }

    #[test]
    fn test_relational_operators_use_numbers() {
        assert!(compare(
            BinaryOperator::LessThan,
            &V::String("2".into()),
            &V::String("10".into())
        ));
        assert!(!compare(BinaryOperator::GreaterThanOrEqual, &V::String("a".into()), &V::Number(0.0)));
    }

    #[test]
    fn test_node_set_comparisons_are_existential() {
        let tree = create_test_tree();
        let paras = V::NodeSet(vec![tree.node(1), tree.node(6)]);
        assert!(compare(BinaryOperator::Equals, &paras, &V::String("World".into())));
        assert!(compare(BinaryOperator::NotEquals, &paras, &V::String("World".into())));
        assert!(!compare(BinaryOperator::Equals, &paras, &V::String("Nope".into())));

        let sub = V::NodeSet(vec![tree.node(12)]);
        assert!(compare(BinaryOperator::GreaterThan, &sub, &V::Number(41.0)));
        assert!(compare(BinaryOperator::Equals, &sub, &V::NodeSet(vec![tree.node(13)])));

        let empty = V::NodeSet(vec![]);
        assert!(!compare(BinaryOperator::Equals, &empty, &V::String("".into())));
        assert!(!compare(BinaryOperator::NotEquals, &empty, &V::String("".into())));
    }

    #[test]
    fn test_arithmetic() {
        let n = |x: f64| V::Number(x);
        assert_eq!(evaluate(BinaryOperator::Divide, n(1.0), n(0.0)).unwrap().to_number(), f64::INFINITY);
        assert_eq!(
            evaluate(BinaryOperator::Divide, n(-1.0), n(0.0)).unwrap().to_number(),
            f64::NEG_INFINITY
        );
        assert!(evaluate(BinaryOperator::Divide, n(0.0), n(0.0)).unwrap().to_number().is_nan());
        assert_eq!(evaluate(BinaryOperator::Modulo, n(5.0), n(2.0)).unwrap().to_number(), 1.0);
        assert_eq!(evaluate(BinaryOperator::Modulo, n(-5.0), n(2.0)).unwrap().to_number(), -1.0);
        assert_eq!(
            evaluate(BinaryOperator::Plus, V::String("2".into()), V::Boolean(true))
                .unwrap()
                .to_number(),
            3.0
        );
    }

    #[test]
    fn test_union_requires_node_sets() {
        let tree = create_test_tree();
        let result = evaluate(
            BinaryOperator::Union,
            V::NodeSet(vec![tree.node(6), tree.node(1)]),
            V::NodeSet(vec![tree.node(1)]),
        )
        .unwrap();
        match result {
            XPathValue::NodeSet(nodes) => {
                assert_eq!(nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 6])
            }
            other => panic!("Expected NodeSet, got {:?}", other),
        }

        let err = evaluate(BinaryOperator::Union, V::NodeSet(vec![]), V::Number(1.0)).unwrap_err();
        assert!(matches!(err, XPathError::TypeError(_)));
    }
}
