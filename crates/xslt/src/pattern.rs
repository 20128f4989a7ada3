//! Match patterns: parsing, validation, default priorities and matching.
//!
//! A pattern is an expression restricted to `child`/`attribute` steps joined by `/` and `//`,
//! optionally starting at `id()` or `key()`. Matching evaluates the pattern in its absolute
//! form (`/descendant-or-self::node()/...`) from the document root; the nodes it selects are
//! exactly the nodes the pattern matches.
use crate::error::CompileError;
use std::fmt;
use std::sync::Arc;
use trellis_xpath1::{
    Axis, BinaryOperator, DataSourceNode, Environment, EvaluationContext, Expression, ExpressionCache, LocationPath,
    NodeTest, NodeTypeTest, Step, XPathError, evaluate,
};

/// One alternative of a `match` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    source: String,
    select: Arc<Expression>,
    default_priority: f64,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Pattern {
    /// The absolute expression that selects every matching node of a document.
    pub fn expression(&self) -> &Expression {
        &self.select
    }

    pub fn default_priority(&self) -> f64 {
        self.default_priority
    }

    /// All nodes of the context node's document that match, in document order.
    pub fn select_all<E: Environment>(&self, ctx: &EvaluationContext<'_, E>) -> Result<Vec<E::Node>, XPathError> {
        let root = ctx.context_node.root();
        let at_root = ctx.with_focus(root, 1, 1);
        evaluate(&self.select, &at_root)?.into_node_set("a match pattern")
    }

    /// Whether `node` matches.
    pub fn matches<E: Environment>(&self, node: &E::Node, ctx: &EvaluationContext<'_, E>) -> Result<bool, XPathError> {
        Ok(self.select_all(ctx)?.contains(node))
    }
}

/// Parses a `match` attribute, splitting a union into one pattern per alternative.
pub fn parse(text: &str, cache: &mut ExpressionCache) -> Result<Vec<Pattern>, CompileError> {
    let parsed = cache.get_or_parse(text)?;
    let mut alternatives = Vec::new();
    split_union(&parsed, &mut alternatives);
    alternatives
        .into_iter()
        .map(|alternative| {
            let default_priority = default_priority(alternative)?;
            let select = absolute_form(alternative).map_err(|reason| CompileError::invalid_value("match", text, reason))?;
            Ok(Pattern {
                source: alternative.to_string(),
                select: Arc::new(select),
                default_priority,
            })
        })
        .collect()
}

fn split_union<'e>(expr: &'e Expression, out: &mut Vec<&'e Expression>) {
    match expr {
        Expression::BinaryOp {
            left,
            op: BinaryOperator::Union,
            right,
        } => {
            split_union(left, out);
            split_union(right, out);
        }
        other => out.push(other),
    }
}

/// The default priority of a single pattern alternative.
///
/// | pattern | priority |
/// |---|---|
/// | `name`, `@name`, `processing-instruction('t')` | 0 |
/// | `prefix:*`, `@prefix:*` | -0.25 |
/// | `*`, `@*` | -0.5 |
/// | anything else | 0.5 |
///
/// A union has no single default priority and is a type error.
pub fn default_priority(expr: &Expression) -> Result<f64, XPathError> {
    if expr.is_union() {
        return Err(XPathError::TypeError(
            "a union pattern must be split before computing its priority".to_string(),
        ));
    }
    let Expression::LocationPath(LocationPath {
        start_point: None,
        is_absolute: false,
        steps,
    }) = expr
    else {
        return Ok(0.5);
    };
    let [step] = steps.as_slice() else {
        return Ok(0.5);
    };
    if !step.predicates.is_empty() || !matches!(step.axis, Axis::Child | Axis::Attribute) {
        return Ok(0.5);
    }
    Ok(match &step.node_test {
        NodeTest::Name(_) => 0.0,
        NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(Some(_))) => 0.0,
        NodeTest::NamespaceWildcard(_) => -0.25,
        NodeTest::Wildcard => -0.5,
        NodeTest::NodeType(_) => 0.5,
    })
}

fn absolute_form(expr: &Expression) -> Result<Expression, String> {
    match expr {
        Expression::FunctionCall { name, .. } => {
            check_start(name.prefix.as_deref(), &name.local_name)?;
            Ok(expr.clone())
        }
        Expression::LocationPath(path) => {
            check_steps(&path.steps)?;
            match path.start_point.as_deref() {
                Some(Expression::FunctionCall { name, .. }) => {
                    check_start(name.prefix.as_deref(), &name.local_name)?;
                    Ok(expr.clone())
                }
                Some(other) => Err(format!("'{}' cannot start a pattern", other)),
                None if path.is_absolute => Ok(expr.clone()),
                None => {
                    let mut steps = Vec::with_capacity(path.steps.len() + 1);
                    steps.push(Step::descendant_or_self_node());
                    steps.extend(path.steps.iter().cloned());
                    Ok(Expression::LocationPath(LocationPath {
                        start_point: None,
                        is_absolute: true,
                        steps,
                    }))
                }
            }
        }
        other => Err(format!("'{}' is not a pattern", other)),
    }
}

fn check_start(prefix: Option<&str>, local: &str) -> Result<(), String> {
    match (prefix, local) {
        (None, "id" | "key") => Ok(()),
        _ => Err(format!("only id() and key() may start a pattern, found {}()", local)),
    }
}

fn check_steps(steps: &[Step]) -> Result<(), String> {
    for step in steps {
        let allowed = match step.axis {
            Axis::Child | Axis::Attribute => true,
            Axis::DescendantOrSelf => {
                step.node_test == NodeTest::NodeType(NodeTypeTest::Node) && step.predicates.is_empty()
            }
            _ => false,
        };
        if !allowed {
            return Err(format!("the {} axis is not allowed in a pattern", step.axis.name()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_xpath1::StaticEnvironment;
    use trellis_xpath1::parse_expression;
    use trellis_xpath1::tests::{MockNode, create_test_tree};

    fn patterns(text: &str) -> Vec<Pattern> {
        parse(text, &mut ExpressionCache::default()).unwrap()
    }

    fn priority(text: &str) -> f64 {
        default_priority(&parse_expression(text).unwrap()).unwrap()
    }

    #[test]
    fn test_default_priorities() {
        assert_eq!(priority("a:b"), 0.0);
        assert_eq!(priority("para"), 0.0);
        assert_eq!(priority("@id"), 0.0);
        assert_eq!(priority("processing-instruction('go')"), 0.0);
        assert_eq!(priority("a:*"), -0.25);
        assert_eq!(priority("@a:*"), -0.25);
        assert_eq!(priority("*"), -0.5);
        assert_eq!(priority("@*"), -0.5);
        assert_eq!(priority("node()"), 0.5);
        assert_eq!(priority("text()"), 0.5);
        assert_eq!(priority("processing-instruction()"), 0.5);
        assert_eq!(priority("/a:b"), 0.5);
        assert_eq!(priority("div/para"), 0.5);
        assert_eq!(priority("para[1]"), 0.5);
        assert_eq!(priority("/"), 0.5);
    }

    #[test]
    fn test_union_priority_is_rejected() {
        let union = parse_expression("a | b").unwrap();
        assert!(matches!(default_priority(&union), Err(XPathError::TypeError(_))));
    }

    #[test]
    fn test_union_is_split_with_own_priorities() {
        let split = patterns("para | *  | /");
        assert_eq!(split.len(), 3);
        assert_eq!(split[0].to_string(), "child::para");
        assert_eq!(split[0].default_priority(), 0.0);
        assert_eq!(split[1].default_priority(), -0.5);
        assert_eq!(split[2].default_priority(), 0.5);
    }

    #[test]
    fn test_relative_patterns_become_absolute() {
        let pattern = &patterns("div/para")[0];
        let Expression::LocationPath(path) = pattern.expression() else {
            panic!("expected a location path");
        };
        assert!(path.is_absolute);
        assert_eq!(path.steps.len(), 3);
        assert_eq!(path.steps[0], Step::descendant_or_self_node());
    }

    #[test]
    fn test_invalid_patterns() {
        for text in ["ancestor::a", "$v", "1 + 2", "string(a)", "a/parent::b", "count(a)"] {
            let result = parse(text, &mut ExpressionCache::default());
            assert!(
                matches!(result, Err(CompileError::InvalidAttributeValue { .. })),
                "{} should be rejected, got {:?}",
                text,
                result
            );
        }
        assert!(parse("id('a')/b", &mut ExpressionCache::default()).is_ok());
        assert!(parse("key('k', 'v')", &mut ExpressionCache::default()).is_ok());
    }

    #[test]
    fn test_matching_on_mock_tree() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new();
        let ctx = EvaluationContext::new(tree.root(), 1, 1, &env);
        let all_para = &patterns("para")[0];
        let matched: Vec<MockNode<'_>> = all_para.select_all(&ctx).unwrap();
        assert!(!matched.is_empty());
        for node in &matched {
            assert_eq!(node.name().unwrap().local_part, "para");
            assert!(all_para.matches(node, &ctx).unwrap());
        }

        let root = &patterns("/")[0];
        assert!(root.matches(&tree.root(), &ctx).unwrap());
        assert!(!root.matches(&matched[0], &ctx).unwrap());
    }
}
