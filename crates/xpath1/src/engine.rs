//! The evaluation engine for executing a parsed XPath AST against a generic `DataSourceNode`.
//!
//! Evaluation is parameterized by an [`Environment`], which supplies everything an
//! expression can refer to besides the tree itself: functions, variables and namespace
//! bindings. [`StaticEnvironment`] is a self-contained implementation for standalone use.

use super::ast::{Axis, Expression, LocationPath, NodeTest, NodeTypeTest, Step, UnaryOperator};
use super::functions::FunctionTable;
use super::{axes, operators, order};
use crate::datasource::{DataSourceNode, NodeType, XML_NAMESPACE};
use crate::error::XPathError;
use crate::name::{ExpandedName, QualifiedName};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Represents the possible result types of an XPath expression evaluation.
#[derive(Debug, Clone)]
pub enum XPathValue<N> {
    NodeSet(Vec<N>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl<N: DataSourceNode> XPathValue<N> {
    /// Coerces the XPath value to a boolean as per XPath 1.0 rules.
    pub fn to_bool(&self) -> bool {
        match self {
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::Boolean(b) => *b,
        }
    }

    /// Coerces the XPath value to a number as per XPath 1.0 rules.
    pub fn to_number(&self) -> f64 {
        match self {
            XPathValue::Number(n) => *n,
            XPathValue::String(s) => string_to_number(s),
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XPathValue::NodeSet(_) => string_to_number(&self.to_string()),
        }
    }

    pub fn is_node_set(&self) -> bool {
        matches!(self, XPathValue::NodeSet(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, XPathValue::Number(_))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, XPathValue::Boolean(_))
    }

    pub fn as_node_set(&self) -> Option<&[N]> {
        match self {
            XPathValue::NodeSet(nodes) => Some(nodes),
            _ => None,
        }
    }

    /// Unwraps a node-set, raising a `TypeError` naming `what` for any other value.
    pub fn into_node_set(self, what: &str) -> Result<Vec<N>, XPathError> {
        match self {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            other => Err(XPathError::type_error(format!(
                "{} must be a node-set, got {}",
                what,
                other.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            XPathValue::NodeSet(_) => "node-set",
            XPathValue::String(_) => "string",
            XPathValue::Number(_) => "number",
            XPathValue::Boolean(_) => "boolean",
        }
    }
}

impl<N: DataSourceNode> fmt::Display for XPathValue<N> {
    /// Coerces the XPath value to a string as per XPath 1.0 rules.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XPathValue::NodeSet(nodes) => match order::first_in_document_order(nodes) {
                Some(node) => write!(f, "{}", node.string_value()),
                None => Ok(()),
            },
            XPathValue::String(s) => write!(f, "{}", s),
            XPathValue::Number(n) => write!(f, "{}", format_number(*n)),
            XPathValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl<N> PartialEq for XPathValue<N>
where
    N: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (XPathValue::NodeSet(a), XPathValue::NodeSet(b)) => a == b,
            (XPathValue::String(a), XPathValue::String(b)) => a == b,
            (XPathValue::Number(a), XPathValue::Number(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (XPathValue::Boolean(a), XPathValue::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

/// Formats a number the way XPath's `string()` does: no exponent, no trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// Parses a string as an XPath number: optional whitespace, an optional minus sign, then
/// digits with at most one decimal point. Anything else is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'));
    let body = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !body.is_empty()
        && body != "."
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.matches('.').count() <= 1;
    if !valid {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// Everything besides the tree that an expression can refer to.
pub trait Environment: Sized {
    type Node: DataSourceNode;

    fn functions(&self) -> &FunctionTable<Self>;

    fn variable(&self, name: &ExpandedName) -> Option<XPathValue<Self::Node>>;

    /// The namespace bound to `prefix`.
    fn namespace_uri(&self, prefix: &str) -> Option<&str>;

    /// The namespace applied to unprefixed element name tests.
    fn default_namespace(&self) -> Option<&str> {
        None
    }
}

/// The dynamic context of one evaluation: focus plus environment.
pub struct EvaluationContext<'e, E: Environment> {
    pub context_node: E::Node,
    /// 1-based.
    pub context_position: usize,
    pub context_size: usize,
    pub env: &'e E,
}

impl<'e, E: Environment> EvaluationContext<'e, E> {
    pub fn new(context_node: E::Node, context_position: usize, context_size: usize, env: &'e E) -> Self {
        Self {
            context_node,
            context_position,
            context_size,
            env,
        }
    }

    /// The same environment with a different focus.
    pub fn with_focus(&self, context_node: E::Node, context_position: usize, context_size: usize) -> Self {
        Self::new(context_node, context_position, context_size, self.env)
    }

    /// Resolves a lexical name. `use_default` applies the default namespace to unprefixed
    /// names.
    pub fn resolve_name(&self, name: &QualifiedName, use_default: bool) -> Result<ExpandedName, XPathError> {
        match &name.prefix {
            Some(prefix) => {
                let uri = self
                    .env
                    .namespace_uri(prefix)
                    .or_else(|| (prefix == "xml").then_some(XML_NAMESPACE))
                    .ok_or_else(|| XPathError::UnknownPrefix(prefix.clone()))?;
                Ok(ExpandedName::new(Some(uri), &name.local_name))
            }
            None if use_default => Ok(ExpandedName::new(self.env.default_namespace(), &name.local_name)),
            None => Ok(ExpandedName::local(&name.local_name)),
        }
    }
}

/// Evaluates a compiled expression and returns a concrete `XPathValue`.
pub fn evaluate<E: Environment>(
    expr: &Expression,
    e_ctx: &EvaluationContext<'_, E>,
) -> Result<XPathValue<E::Node>, XPathError> {
    match expr {
        Expression::Literal(s) => Ok(XPathValue::String(s.clone())),
        Expression::Number(n) => Ok(XPathValue::Number(*n)),
        Expression::LocationPath(path) => Ok(XPathValue::NodeSet(evaluate_location_path(path, e_ctx)?)),
        Expression::Variable(name) => {
            let expanded = e_ctx.resolve_name(name, false)?;
            e_ctx
                .env
                .variable(&expanded)
                .ok_or_else(|| XPathError::UnknownVariable(name.to_string()))
        }
        Expression::FunctionCall { name, args } => {
            let expanded = e_ctx.resolve_name(name, false)?;
            let mut evaluated_args = Vec::with_capacity(args.len());
            for arg in args {
                evaluated_args.push(evaluate(arg, e_ctx)?);
            }
            e_ctx.env.functions().invoke(&expanded, e_ctx, evaluated_args)
        }
        Expression::Filter { primary, predicates } => {
            let mut nodes = evaluate(primary, e_ctx)?.into_node_set("predicate input")?;
            order::sort_unique(&mut nodes);
            for predicate in predicates {
                nodes = apply_predicate(nodes, predicate, e_ctx)?;
            }
            Ok(XPathValue::NodeSet(nodes))
        }
        Expression::BinaryOp { left, op, right } => {
            use super::ast::BinaryOperator::{And, Or};
            match op {
                Or => {
                    if evaluate(left, e_ctx)?.to_bool() {
                        return Ok(XPathValue::Boolean(true));
                    }
                    Ok(XPathValue::Boolean(evaluate(right, e_ctx)?.to_bool()))
                }
                And => {
                    if !evaluate(left, e_ctx)?.to_bool() {
                        return Ok(XPathValue::Boolean(false));
                    }
                    Ok(XPathValue::Boolean(evaluate(right, e_ctx)?.to_bool()))
                }
                _ => {
                    let left_val = evaluate(left, e_ctx)?;
                    let right_val = evaluate(right, e_ctx)?;
                    operators::evaluate(*op, left_val, right_val)
                }
            }
        }
        Expression::UnaryOp { op, expr } => {
            let val = evaluate(expr, e_ctx)?;
            match op {
                UnaryOperator::Minus => Ok(XPathValue::Number(-val.to_number())),
            }
        }
    }
}

fn evaluate_location_path<E: Environment>(
    path: &LocationPath,
    e_ctx: &EvaluationContext<'_, E>,
) -> Result<Vec<E::Node>, XPathError> {
    let mut current = if let Some(start_expr) = &path.start_point {
        evaluate(start_expr, e_ctx)?.into_node_set("path step")?
    } else if path.is_absolute {
        vec![e_ctx.context_node.root()]
    } else {
        vec![e_ctx.context_node.clone()]
    };

    for step in &path.steps {
        let size = current.len();
        let mut next = Vec::new();
        let mut seen = HashSet::new();
        for (i, node) in current.iter().enumerate() {
            let step_ctx = e_ctx.with_focus(node.clone(), i + 1, size);
            let batch = evaluate_step(step, &step_ctx)?;
            order::merge_into(&mut next, &mut seen, batch);
        }
        current = next;
    }
    Ok(current)
}

/// Evaluates one step from the context node. The result is in document order.
fn evaluate_step<E: Environment>(
    step: &Step,
    e_ctx: &EvaluationContext<'_, E>,
) -> Result<Vec<E::Node>, XPathError> {
    if step.axis == Axis::Namespace {
        return Err(XPathError::type_error("namespace axis is not supported"));
    }
    let principal = step.axis.principal_node_type();
    let test = ResolvedTest::resolve(&step.node_test, principal, e_ctx)?;

    // Axis order: predicates number positions along the axis direction.
    let mut nodes: Vec<E::Node> = axes::axis_iter(step.axis, &e_ctx.context_node)
        .filter(|n| test.matches(n, principal))
        .collect();
    for predicate in &step.predicates {
        nodes = apply_predicate(nodes, predicate, e_ctx)?;
    }
    if step.axis.is_reverse() {
        nodes.reverse();
    }
    Ok(nodes)
}

fn apply_predicate<E: Environment>(
    nodes: Vec<E::Node>,
    predicate: &Expression,
    e_ctx: &EvaluationContext<'_, E>,
) -> Result<Vec<E::Node>, XPathError> {
    let size = nodes.len();
    let mut kept = Vec::with_capacity(size);
    for (i, node) in nodes.into_iter().enumerate() {
        let position = i + 1;
        let predicate_ctx = e_ctx.with_focus(node, position, size);
        let keep = match evaluate(predicate, &predicate_ctx)? {
            XPathValue::Number(n) => n == position as f64,
            other => other.to_bool(),
        };
        if keep {
            kept.push(predicate_ctx.context_node);
        }
    }
    Ok(kept)
}

/// A node test with its prefixes resolved against the environment.
enum ResolvedTest<'t> {
    Principal,
    Name(ExpandedName),
    Namespace(String),
    Kind(&'t NodeTypeTest),
}

impl<'t> ResolvedTest<'t> {
    fn resolve<E: Environment>(
        test: &'t NodeTest,
        principal: NodeType,
        e_ctx: &EvaluationContext<'_, E>,
    ) -> Result<Self, XPathError> {
        Ok(match test {
            NodeTest::Wildcard => ResolvedTest::Principal,
            NodeTest::NamespaceWildcard(prefix) => {
                let name = e_ctx.resolve_name(&QualifiedName::new(Some(prefix.as_str()), "*"), false)?;
                ResolvedTest::Namespace(name.namespace_uri.unwrap_or_default())
            }
            NodeTest::Name(name) => {
                ResolvedTest::Name(e_ctx.resolve_name(name, principal == NodeType::Element)?)
            }
            NodeTest::NodeType(kind) => ResolvedTest::Kind(kind),
        })
    }

    fn matches<N: DataSourceNode>(&self, node: &N, principal: NodeType) -> bool {
        if let ResolvedTest::Kind(kind) = self {
            return match kind {
                NodeTypeTest::Node => true,
                NodeTypeTest::Text => node.node_type() == NodeType::Text,
                NodeTypeTest::Comment => node.node_type() == NodeType::Comment,
                NodeTypeTest::ProcessingInstruction(target) => {
                    node.node_type() == NodeType::ProcessingInstruction
                        && target.as_ref().is_none_or(|t| {
                            node.name().is_some_and(|q| q.local_part == t.as_str())
                        })
                }
            };
        }
        if node.node_type() != principal {
            return false;
        }
        match self {
            ResolvedTest::Principal => true,
            ResolvedTest::Name(expected) => node.name().is_some_and(|q| {
                q.local_part == expected.local_name
                    && q.namespace_uri == expected.namespace_uri.as_deref()
            }),
            ResolvedTest::Namespace(uri) => node
                .name()
                .is_some_and(|q| q.namespace_uri == Some(uri.as_str())),
            ResolvedTest::Kind(_) => true,
        }
    }
}

/// A self-contained environment: the core function library, a variable map and a
/// namespace map.
pub struct StaticEnvironment<N: DataSourceNode> {
    functions: FunctionTable<StaticEnvironment<N>>,
    variables: HashMap<ExpandedName, XPathValue<N>>,
    namespaces: HashMap<String, String>,
    default_namespace: Option<String>,
}

impl<N: DataSourceNode> Default for StaticEnvironment<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: DataSourceNode> StaticEnvironment<N> {
    pub fn new() -> Self {
        Self {
            functions: FunctionTable::core(),
            variables: HashMap::new(),
            namespaces: HashMap::new(),
            default_namespace: None,
        }
    }

    pub fn with_functions(mut self, functions: FunctionTable<Self>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, value: XPathValue<N>) -> Self {
        self.variables.insert(name, value);
        self
    }

    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.insert(prefix.to_string(), uri.to_string());
        self
    }

    pub fn with_default_namespace(mut self, uri: &str) -> Self {
        self.default_namespace = Some(uri.to_string());
        self
    }

    pub fn set_variable(&mut self, name: ExpandedName, value: XPathValue<N>) {
        self.variables.insert(name, value);
    }
}

impl<N: DataSourceNode> Environment for StaticEnvironment<N> {
    type Node = N;

    fn functions(&self) -> &FunctionTable<Self> {
        &self.functions
    }

    fn variable(&self, name: &ExpandedName) -> Option<XPathValue<N>> {
        self.variables.get(name).cloned()
    }

    fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};
    use crate::parser::parse_expression;

    fn eval<'a>(
        source: &str,
        node: MockNode<'a>,
        env: &StaticEnvironment<MockNode<'a>>,
    ) -> Result<XPathValue<MockNode<'a>>, XPathError> {
        let expr = parse_expression(source)?;
        evaluate(&expr, &EvaluationContext::new(node, 1, 1, env))
    }

    fn ids(value: XPathValue<MockNode<'_>>) -> Vec<usize> {
        match value {
            XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.id).collect(),
            other => panic!("Expected a NodeSet, got {:?}", other),
        }
    }

    #[test]
    fn test_predicate_by_attribute() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new();
        let result = eval("child::para[@id='p1']", tree.root(), &env).unwrap();
        assert_eq!(ids(result), vec![1]);
    }

    #[test]
    fn test_predicate_by_position() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new();
        assert_eq!(ids(eval("child::para[1]", tree.root(), &env).unwrap()), vec![1]);
        assert_eq!(ids(eval("para[position()=2]", tree.root(), &env).unwrap()), vec![6]);
        assert_eq!(ids(eval("para[last()]", tree.root(), &env).unwrap()), vec![6]);
        // a non-integral number never equals a position
        assert!(ids(eval("para[1.5]", tree.root(), &env).unwrap()).is_empty());
    }

    #[test]
    fn test_reverse_axis_positions_and_result_order() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new();
        // preceding-sibling::*[1] is the nearest element sibling
        assert_eq!(ids(eval("preceding-sibling::*[1]", tree.node(6), &env).unwrap()), vec![5]);
        // the full reverse axis is still returned in document order
        assert_eq!(ids(eval("preceding-sibling::node()", tree.node(6), &env).unwrap()), vec![1, 8, 5, 9]);
        assert_eq!(ids(eval("ancestor::node()", tree.node(13), &env).unwrap()), vec![0, 10, 12]);
    }

    #[test]
    fn test_filter_expression_uses_document_order_positions() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new();
        assert_eq!(ids(eval("(//para | //div)[2]", tree.root(), &env).unwrap()), vec![5]);
        assert_eq!(ids(eval("(ancestor::node())[1]", tree.node(13), &env).unwrap()), vec![0]);
    }

    #[test]
    fn test_variable_evaluation() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new().with_variable(
            ExpandedName::local("myVar"),
            XPathValue::String("test-value".to_string()),
        );
        let result = eval("$myVar", tree.root(), &env).unwrap();
        assert_eq!(result.to_string(), "test-value");

        let err = eval("$missing", tree.root(), &env).unwrap_err();
        assert_eq!(err, XPathError::UnknownVariable("missing".into()));
    }

    #[test]
    fn test_path_from_variable_node_set() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new().with_variable(
            ExpandedName::local("para_node"),
            XPathValue::NodeSet(vec![tree.node(1)]),
        );
        let result = eval("$para_node/text()", tree.root(), &env).unwrap();
        assert_eq!(ids(result), vec![4]);
    }

    #[test]
    fn test_path_from_non_node_set_is_type_error() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new()
            .with_variable(ExpandedName::local("s"), XPathValue::String("x".into()));
        assert!(matches!(eval("$s/foo", tree.root(), &env), Err(XPathError::TypeError(_))));
        assert!(matches!(eval("$s[1]", tree.root(), &env), Err(XPathError::TypeError(_))));
    }

    #[test]
    fn test_namespaced_name_tests() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new().with_namespace("y", "urn:x");
        assert_eq!(ids(eval("y:item/y:sub", tree.root(), &env).unwrap()), vec![12]);
        assert_eq!(ids(eval("y:item/@y:code", tree.root(), &env).unwrap()), vec![11]);
        assert_eq!(ids(eval("y:*", tree.root(), &env).unwrap()), vec![10]);
        // an unprefixed test does not match a namespaced element
        assert!(ids(eval("item", tree.root(), &env).unwrap()).is_empty());
        assert!(matches!(eval("z:item", tree.root(), &env), Err(XPathError::UnknownPrefix(p)) if p == "z"));
        // the xml prefix is always bound
        assert_eq!(ids(eval("para/@xml:lang", tree.root(), &env).unwrap()), vec![3]);
    }

    #[test]
    fn test_default_namespace_applies_to_elements_only() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new().with_default_namespace("urn:x");
        assert_eq!(ids(eval("item/sub", tree.root(), &env).unwrap()), vec![12]);
        assert!(ids(eval("item/@code", tree.root(), &env).unwrap()).is_empty());
    }

    #[test]
    fn test_principal_node_type_filters_name_tests() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new();
        // `*` on the child axis selects elements only, on the attribute axis attributes only
        assert_eq!(ids(eval("*", tree.root(), &env).unwrap()), vec![1, 5, 6, 10]);
        assert_eq!(ids(eval("para/@*", tree.root(), &env).unwrap()), vec![2, 3]);
        assert_eq!(ids(eval("processing-instruction('pi-target')", tree.root(), &env).unwrap()), vec![9]);
        assert!(ids(eval("processing-instruction('other')", tree.root(), &env).unwrap()).is_empty());
        assert_eq!(ids(eval("comment()", tree.root(), &env).unwrap()), vec![8]);
    }

    #[test]
    fn test_namespace_axis_is_rejected() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new();
        assert_eq!(
            eval("namespace::*", tree.node(10), &env).unwrap_err(),
            XPathError::TypeError("namespace axis is not supported".into())
        );
    }

    #[test]
    fn test_short_circuit_skips_failing_operand() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new();
        assert!(eval("true() or $undefined", tree.root(), &env).unwrap().to_bool());
        assert!(!eval("false() and $undefined", tree.root(), &env).unwrap().to_bool());
        assert!(eval("false() or $undefined", tree.root(), &env).is_err());
    }

    #[test]
    fn test_descendant_paths_are_deduplicated_in_document_order() {
        let tree = create_test_tree();
        let env = StaticEnvironment::new();
        assert_eq!(ids(eval("//node()/..", tree.root(), &env).unwrap()), vec![0, 1, 6, 10, 12]);
        assert_eq!(ids(eval("//text()", tree.root(), &env).unwrap()), vec![4, 7, 13]);
    }

    #[test]
    fn test_number_formatting_and_parsing() {
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.5), "-2.5");
        assert_eq!(format_number(1e21), "1000000000000000000000");

        assert_eq!(string_to_number(" 12.5 "), 12.5);
        assert_eq!(string_to_number("-.5"), -0.5);
        assert!(string_to_number("1e3").is_nan());
        assert!(string_to_number("+1").is_nan());
        assert!(string_to_number("").is_nan());
        assert!(string_to_number("Infinity").is_nan());
    }

    #[test]
    fn test_node_set_string_value_uses_document_order() {
        let tree = create_test_tree();
        let value: XPathValue<MockNode<'_>> = XPathValue::NodeSet(vec![tree.node(6), tree.node(1)]);
        assert_eq!(value.to_string(), "Hello");
        assert_eq!(XPathValue::<MockNode<'_>>::NodeSet(vec![]).to_string(), "");
    }
}
