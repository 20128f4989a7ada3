//! Defines the function table and built-in implementations for XPath 1.0 functions.
//!
//! Functions are keyed by expanded name. A table is built once and never mutated while
//! expressions are being evaluated; hosts extend the core library by merging their own
//! entries into a copy of it.

use super::engine::{Environment, EvaluationContext, XPathValue, string_to_number};
use crate::datasource::{DataSourceNode, NodeType, XML_NAMESPACE};
use crate::error::XPathError;
use crate::name::ExpandedName;
use crate::order;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Signature of a function implementation.
pub type FunctionImpl<E> = fn(
    &EvaluationContext<'_, E>,
    Vec<XPathValue<<E as Environment>::Node>>,
) -> Result<XPathValue<<E as Environment>::Node>, XPathError>;

/// An entry in a [`FunctionTable`]: an arity range plus the implementation.
pub struct Function<E: Environment> {
    pub min_args: usize,
    /// `None` means variadic.
    pub max_args: Option<usize>,
    pub call: FunctionImpl<E>,
}

impl<E: Environment> Clone for Function<E> {
    fn clone(&self) -> Self {
        Self {
            min_args: self.min_args,
            max_args: self.max_args,
            call: self.call,
        }
    }
}

impl<E: Environment> fmt::Debug for Function<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish_non_exhaustive()
    }
}

impl<E: Environment> Function<E> {
    fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }

    fn arity_description(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("exactly {}", max),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }
}

/// Functions available to expressions, keyed by (namespace URI, local name).
pub struct FunctionTable<E: Environment> {
    functions: HashMap<ExpandedName, Function<E>>,
}

impl<E: Environment> Clone for FunctionTable<E> {
    fn clone(&self) -> Self {
        Self {
            functions: self.functions.clone(),
        }
    }
}

impl<E: Environment> fmt::Debug for FunctionTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.functions.keys().map(|n| n.to_string()).collect();
        names.sort();
        f.debug_struct("FunctionTable").field("functions", &names).finish()
    }
}

impl<E: Environment> Default for FunctionTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Environment> FunctionTable<E> {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// The XPath 1.0 core function library.
    pub fn core() -> Self {
        Self::new()
            // node-set
            .register(None, "last", 0, Some(0), last::<E>)
            .register(None, "position", 0, Some(0), position::<E>)
            .register(None, "count", 1, Some(1), count::<E>)
            .register(None, "id", 1, Some(1), id::<E>)
            .register(None, "local-name", 0, Some(1), local_name::<E>)
            .register(None, "namespace-uri", 0, Some(1), namespace_uri::<E>)
            .register(None, "name", 0, Some(1), name::<E>)
            // string
            .register(None, "string", 0, Some(1), string::<E>)
            .register(None, "concat", 2, None, concat::<E>)
            .register(None, "starts-with", 2, Some(2), starts_with::<E>)
            .register(None, "contains", 2, Some(2), contains::<E>)
            .register(None, "substring-before", 2, Some(2), substring_before::<E>)
            .register(None, "substring-after", 2, Some(2), substring_after::<E>)
            .register(None, "substring", 2, Some(3), substring::<E>)
            .register(None, "string-length", 0, Some(1), string_length::<E>)
            .register(None, "normalize-space", 0, Some(1), normalize_space::<E>)
            .register(None, "translate", 3, Some(3), translate::<E>)
            // boolean
            .register(None, "boolean", 1, Some(1), boolean::<E>)
            .register(None, "not", 1, Some(1), not::<E>)
            .register(None, "true", 0, Some(0), true_fn::<E>)
            .register(None, "false", 0, Some(0), false_fn::<E>)
            .register(None, "lang", 1, Some(1), lang::<E>)
            // number
            .register(None, "number", 0, Some(1), number::<E>)
            .register(None, "sum", 1, Some(1), sum::<E>)
            .register(None, "floor", 1, Some(1), floor::<E>)
            .register(None, "ceiling", 1, Some(1), ceiling::<E>)
            .register(None, "round", 1, Some(1), round::<E>)
    }

    /// Adds (or replaces) a function and returns the table.
    pub fn register(
        mut self,
        namespace_uri: Option<&str>,
        local_name: &str,
        min_args: usize,
        max_args: Option<usize>,
        call: FunctionImpl<E>,
    ) -> Self {
        self.insert(
            ExpandedName::new(namespace_uri, local_name),
            Function {
                min_args,
                max_args,
                call,
            },
        );
        self
    }

    pub fn insert(&mut self, name: ExpandedName, function: Function<E>) {
        self.functions.insert(name, function);
    }

    /// Adds every entry of `other`, replacing entries of the same name.
    pub fn merge(mut self, other: FunctionTable<E>) -> Self {
        self.functions.extend(other.functions);
        self
    }

    pub fn get(&self, name: &ExpandedName) -> Option<&Function<E>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &ExpandedName) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Checks the argument count and calls the function.
    pub fn invoke(
        &self,
        name: &ExpandedName,
        e_ctx: &EvaluationContext<'_, E>,
        args: Vec<XPathValue<E::Node>>,
    ) -> Result<XPathValue<E::Node>, XPathError> {
        let function = self
            .get(name)
            .ok_or_else(|| XPathError::UnknownFunction(name.to_string()))?;
        if !function.accepts(args.len()) {
            return Err(XPathError::type_error(format!(
                "{}() takes {} argument(s), {} given",
                name,
                function.arity_description(),
                args.len()
            )));
        }
        (function.call)(e_ctx, args)
    }
}

// --- Argument helpers ---

pub type Args<E> = Vec<XPathValue<<E as Environment>::Node>>;
pub type FnResult<E> = Result<XPathValue<<E as Environment>::Node>, XPathError>;

/// The string value of argument `index`, or of the context node when it is absent.
fn string_or_context<E: Environment>(e_ctx: &EvaluationContext<'_, E>, args: &Args<E>, index: usize) -> String {
    match args.get(index) {
        Some(value) => value.to_string(),
        None => e_ctx.context_node.string_value(),
    }
}

fn string_arg<N: DataSourceNode>(args: &[XPathValue<N>], index: usize) -> String {
    args.get(index).map(|v| v.to_string()).unwrap_or_default()
}

fn number_arg<N: DataSourceNode>(args: &[XPathValue<N>], index: usize) -> f64 {
    args.get(index).map(|v| v.to_number()).unwrap_or(f64::NAN)
}

/// The node an optional node-set argument designates: the first in document order, the
/// context node when the argument is absent, `None` for an empty node-set.
fn node_or_context<E: Environment>(
    function: &str,
    e_ctx: &EvaluationContext<'_, E>,
    args: Args<E>,
) -> Result<Option<E::Node>, XPathError> {
    match args.into_iter().next() {
        None => Ok(Some(e_ctx.context_node.clone())),
        Some(value) => {
            let nodes = value.into_node_set(&format!("argument of {}()", function))?;
            Ok(order::first_in_document_order(&nodes).cloned())
        }
    }
}

// --- Node-set functions ---

fn last<E: Environment>(e_ctx: &EvaluationContext<'_, E>, _args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Number(e_ctx.context_size as f64))
}

fn position<E: Environment>(e_ctx: &EvaluationContext<'_, E>, _args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Number(e_ctx.context_position as f64))
}

fn count<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let nodes = args
        .into_iter()
        .next()
        .map(|v| v.into_node_set("argument of count()"))
        .transpose()?
        .unwrap_or_default();
    Ok(XPathValue::Number(nodes.len() as f64))
}

fn id<E: Environment>(e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let tokens: Vec<String> = match args.into_iter().next() {
        Some(XPathValue::NodeSet(nodes)) => nodes
            .iter()
            .flat_map(|n| {
                xml_tokens(&n.string_value())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect(),
        Some(other) => xml_tokens(&other.to_string()).map(str::to_string).collect(),
        None => Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut results: Vec<E::Node> = tokens
        .iter()
        .filter_map(|token| e_ctx.context_node.element_by_id(token))
        .filter(|node| seen.insert(node.clone()))
        .collect();
    order::sort_document_order(&mut results);
    Ok(XPathValue::NodeSet(results))
}

fn local_name<E: Environment>(e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let node = node_or_context("local-name", e_ctx, args)?;
    let name = node
        .and_then(|n| n.name().map(|q| q.local_part.to_string()))
        .unwrap_or_default();
    Ok(XPathValue::String(name))
}

fn namespace_uri<E: Environment>(e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let node = node_or_context("namespace-uri", e_ctx, args)?;
    let uri = node
        .and_then(|n| n.name().and_then(|q| q.namespace_uri.map(str::to_string)))
        .unwrap_or_default();
    Ok(XPathValue::String(uri))
}

fn name<E: Environment>(e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let node = node_or_context("name", e_ctx, args)?;
    let name = node
        .and_then(|n| n.name().map(|q| q.qualified()))
        .unwrap_or_default();
    Ok(XPathValue::String(name))
}

// --- String functions ---

fn string<E: Environment>(e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::String(string_or_context(e_ctx, &args, 0)))
}

fn concat<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::String(args.iter().map(|v| v.to_string()).collect()))
}

fn starts_with<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Boolean(
        string_arg(&args, 0).starts_with(&string_arg(&args, 1)),
    ))
}

fn contains<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Boolean(
        string_arg(&args, 0).contains(&string_arg(&args, 1)),
    ))
}

fn substring_before<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let haystack = string_arg(&args, 0);
    let needle = string_arg(&args, 1);
    let before = haystack
        .find(&needle)
        .map(|i| haystack[..i].to_string())
        .unwrap_or_default();
    Ok(XPathValue::String(before))
}

fn substring_after<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let haystack = string_arg(&args, 0);
    let needle = string_arg(&args, 1);
    let after = haystack
        .find(&needle)
        .map(|i| haystack[i + needle.len()..].to_string())
        .unwrap_or_default();
    Ok(XPathValue::String(after))
}

/// Characters at 1-based positions `p` with `round(start) <= p < round(start) + round(len)`.
/// NaN bounds select nothing.
fn substring<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let source = string_arg(&args, 0);
    let start = xpath_round(number_arg(&args, 1));
    let end = match args.get(2) {
        Some(len) => start + xpath_round(len.to_number()),
        None => f64::INFINITY,
    };
    let result: String = source
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= start && p < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(XPathValue::String(result))
}

fn string_length<E: Environment>(e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let s = string_or_context(e_ctx, &args, 0);
    Ok(XPathValue::Number(s.chars().count() as f64))
}

/// Splits on XML whitespace (space, tab, carriage return, line feed) only.
fn xml_tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
        .filter(|token| !token.is_empty())
}

fn normalize_space<E: Environment>(e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let s = string_or_context(e_ctx, &args, 0);
    Ok(XPathValue::String(
        xml_tokens(&s).collect::<Vec<_>>().join(" "),
    ))
}

/// Maps each character found in `from` to the character at the same index in `to`, or
/// drops it when `to` is shorter. The first occurrence in `from` wins.
fn translate<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let source = string_arg(&args, 0);
    let from: Vec<char> = string_arg(&args, 1).chars().collect();
    let to: Vec<char> = string_arg(&args, 2).chars().collect();
    let mut mapping: HashMap<char, Option<char>> = HashMap::new();
    for (i, c) in from.iter().enumerate() {
        mapping.entry(*c).or_insert_with(|| to.get(i).copied());
    }
    let result: String = source
        .chars()
        .filter_map(|c| match mapping.get(&c) {
            Some(replacement) => *replacement,
            None => Some(c),
        })
        .collect();
    Ok(XPathValue::String(result))
}

// --- Boolean functions ---

fn boolean<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Boolean(args.first().is_some_and(|v| v.to_bool())))
}

fn not<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Boolean(!args.first().is_some_and(|v| v.to_bool())))
}

fn true_fn<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, _args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Boolean(true))
}

fn false_fn<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, _args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Boolean(false))
}

/// True if the nearest `xml:lang` on the context node or an ancestor equals the argument
/// or is a sub-language of it, ignoring case.
fn lang<E: Environment>(e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let wanted = string_arg(&args, 0).to_lowercase();
    let mut current = Some(e_ctx.context_node.clone());
    while let Some(node) = current {
        let declared = match node.node_type() {
            NodeType::Element => node.attribute_value(Some(XML_NAMESPACE), "lang"),
            _ => None,
        };
        if let Some(value) = declared {
            let value = value.to_lowercase();
            let matches = value == wanted
                || value
                    .strip_prefix(&wanted)
                    .is_some_and(|rest| rest.starts_with('-'));
            return Ok(XPathValue::Boolean(matches));
        }
        current = node.parent();
    }
    Ok(XPathValue::Boolean(false))
}

// --- Number functions ---

fn number<E: Environment>(e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let n = match args.first() {
        Some(value) => value.to_number(),
        None => string_to_number(&e_ctx.context_node.string_value()),
    };
    Ok(XPathValue::Number(n))
}

fn sum<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    let nodes = args
        .into_iter()
        .next()
        .map(|v| v.into_node_set("argument of sum()"))
        .transpose()?
        .unwrap_or_default();
    let total = nodes
        .iter()
        .map(|n| string_to_number(&n.string_value()))
        .sum();
    Ok(XPathValue::Number(total))
}

fn floor<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Number(number_arg(&args, 0).floor()))
}

fn ceiling<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Number(number_arg(&args, 0).ceil()))
}

fn round<E: Environment>(_e_ctx: &EvaluationContext<'_, E>, args: Args<E>) -> FnResult<E> {
    Ok(XPathValue::Number(xpath_round(number_arg(&args, 0))))
}

/// Rounds half toward positive infinity, keeping NaN, infinities and negative zero.
pub fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else if (-0.5..0.0).contains(&n) {
        -0.0
    } else {
        (n + 0.5).floor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};
    use crate::engine::{StaticEnvironment, evaluate};
    use crate::parser::parse_expression;

    fn eval_at<'a>(source: &str, node: MockNode<'a>) -> XPathValue<MockNode<'a>> {
        let env = StaticEnvironment::new();
        let expr = parse_expression(source).unwrap();
        evaluate(&expr, &EvaluationContext::new(node, 1, 1, &env)).unwrap()
    }

    fn eval_err(source: &str) -> XPathError {
        let tree = create_test_tree();
        let env = StaticEnvironment::new();
        let expr = parse_expression(source).unwrap();
        evaluate(&expr, &EvaluationContext::new(tree.root(), 1, 1, &env)).unwrap_err()
    }

    // --- String Function Tests ---

    #[test]
    fn test_func_concat() {
        let tree = create_test_tree();
        let result = eval_at("concat('Hello', ' ', 'World', 42)", tree.root());
        assert_eq!(result.to_string(), "Hello World42");
    }

    #[test]
    fn test_func_starts_with_and_contains() {
        let tree = create_test_tree();
        assert!(eval_at("starts-with('abcdef', 'abc')", tree.root()).to_bool());
        assert!(!eval_at("starts-with('abcdef', 'def')", tree.root()).to_bool());
        assert!(eval_at("contains('abcdef', 'cd')", tree.root()).to_bool());
        assert!(eval_at("contains('abc', '')", tree.root()).to_bool());
    }

    #[test]
    fn test_func_substring_before_and_after() {
        let tree = create_test_tree();
        assert_eq!(eval_at("substring-before('1999/04/01', '/')", tree.root()).to_string(), "1999");
        assert_eq!(eval_at("substring-after('1999/04/01', '/')", tree.root()).to_string(), "04/01");
        assert_eq!(eval_at("substring-after('abc', 'x')", tree.root()).to_string(), "");
    }

    #[test]
    fn test_func_substring() {
        let tree = create_test_tree();
        let root = tree.root();
        assert_eq!(eval_at("substring('12345', 2, 3)", root).to_string(), "234");
        assert_eq!(eval_at("substring('12345', 2)", root).to_string(), "2345");
        assert_eq!(eval_at("substring('12345', 1.5, 2.6)", root).to_string(), "234");
        assert_eq!(eval_at("substring('12345', 0, 3)", root).to_string(), "12");
        assert_eq!(eval_at("substring('12345', 0 div 0, 3)", root).to_string(), "");
        assert_eq!(eval_at("substring('12345', 1, 0 div 0)", root).to_string(), "");
        assert_eq!(eval_at("substring('12345', -42, 1 div 0)", root).to_string(), "12345");
        assert_eq!(eval_at("substring('12345', -1 div 0, 1 div 0)", root).to_string(), "");
    }

    #[test]
    fn test_func_string_length_defaults_to_context() {
        let tree = create_test_tree();
        assert_eq!(eval_at("string-length()", tree.node(1)).to_number(), 5.0);
        assert_eq!(eval_at("string-length('four')", tree.node(1)).to_number(), 4.0);
    }

    #[test]
    fn test_func_normalize_space() {
        let tree = create_test_tree();
        let result = eval_at("normalize-space('  leading \n and   \t trailing  ')", tree.root());
        assert_eq!(result.to_string(), "leading and trailing");
    }

    #[test]
    fn test_only_xml_whitespace_separates_tokens() {
        let tree = create_test_tree();
        let result = eval_at("normalize-space(' a\u{a0}b \r\n c\u{3000}')", tree.root());
        assert_eq!(result.to_string(), "a\u{a0}b c\u{3000}");
        match eval_at("id('p1\u{a0}')", tree.root()) {
            XPathValue::NodeSet(nodes) => assert!(nodes.is_empty()),
            other => panic!("Expected NodeSet, got {:?}", other),
        }
    }

    #[test]
    fn test_func_translate() {
        let tree = create_test_tree();
        assert_eq!(eval_at("translate('bar', 'abc', 'ABC')", tree.root()).to_string(), "BAr");
        assert_eq!(eval_at("translate('--aaa--', 'abc-', 'ABC')", tree.root()).to_string(), "AAA");
        assert_eq!(eval_at("translate('abc', 'aa', 'xy')", tree.root()).to_string(), "xbc");
    }

    // --- Node-set Function Tests ---

    #[test]
    fn test_func_count_and_position() {
        let tree = create_test_tree();
        assert_eq!(eval_at("count(//para)", tree.root()).to_number(), 2.0);
        assert_eq!(eval_at("count(//para[position() = last()])", tree.root()).to_number(), 1.0);
    }

    #[test]
    fn test_func_names() {
        let tree = create_test_tree();
        assert_eq!(eval_at("name(*[last()])", tree.root()).to_string(), "x:item");
        assert_eq!(eval_at("local-name(*[last()])", tree.root()).to_string(), "item");
        assert_eq!(eval_at("namespace-uri(*[last()])", tree.root()).to_string(), "urn:x");
        assert_eq!(eval_at("name()", tree.node(1)).to_string(), "para");
        assert_eq!(eval_at("name(nothing)", tree.root()).to_string(), "");
        assert_eq!(eval_at("name(processing-instruction())", tree.root()).to_string(), "pi-target");
    }

    #[test]
    fn test_func_id() {
        let tree = create_test_tree();
        let result = eval_at("id('missing p1')", tree.root());
        match result {
            XPathValue::NodeSet(nodes) => assert_eq!(nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1]),
            other => panic!("Expected NodeSet, got {:?}", other),
        }
    }

    // --- Boolean Function Tests ---

    #[test]
    fn test_func_boolean_family() {
        let tree = create_test_tree();
        assert!(eval_at("boolean(//div)", tree.root()).to_bool());
        assert!(eval_at("not(//nothing)", tree.root()).to_bool());
        assert!(eval_at("true() and not(false())", tree.root()).to_bool());
    }

    #[test]
    fn test_func_lang() {
        let tree = create_test_tree();
        assert!(eval_at("lang('en')", tree.node(4)).to_bool());
        assert!(eval_at("lang('EN')", tree.node(1)).to_bool());
        assert!(!eval_at("lang('de')", tree.node(4)).to_bool());
        assert!(!eval_at("lang('en')", tree.node(7)).to_bool());
    }

    // --- Number Function Tests ---

    #[test]
    fn test_func_number_and_sum() {
        let tree = create_test_tree();
        assert_eq!(eval_at("number('12')", tree.root()).to_number(), 12.0);
        assert!(eval_at("number()", tree.node(1)).to_number().is_nan());
        assert_eq!(eval_at("sum(//*[local-name() = 'sub'])", tree.root()).to_number(), 42.0);
        assert_eq!(eval_at("number(true())", tree.root()).to_number(), 1.0);
    }

    #[test]
    fn test_func_rounding() {
        let tree = create_test_tree();
        let root = tree.root();
        assert_eq!(eval_at("floor(2.7)", root).to_number(), 2.0);
        assert_eq!(eval_at("ceiling(2.1)", root).to_number(), 3.0);
        assert_eq!(eval_at("round(2.5)", root).to_number(), 3.0);
        assert_eq!(eval_at("round(-2.5)", root).to_number(), -2.0);
        assert_eq!(eval_at("round(-0.4)", root).to_string(), "0");
        assert!(xpath_round(-0.4).is_sign_negative());
        assert!(eval_at("round(0 div 0)", root).to_number().is_nan());
    }

    // --- Table Tests ---

    #[test]
    fn test_arity_is_checked_before_invocation() {
        assert!(matches!(eval_err("concat('a')"), XPathError::TypeError(_)));
        assert!(matches!(eval_err("true(1)"), XPathError::TypeError(_)));
        assert!(matches!(eval_err("count('x')"), XPathError::TypeError(_)));
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(eval_err("frobnicate()"), XPathError::UnknownFunction("frobnicate".into()));
    }

    #[test]
    fn test_host_functions_are_dispatched_by_expanded_name() {
        fn answer<E: Environment>(_: &EvaluationContext<'_, E>, _: Args<E>) -> FnResult<E> {
            Ok(XPathValue::Number(42.0))
        }
        let tree = create_test_tree();
        let table: FunctionTable<StaticEnvironment<MockNode<'_>>> =
            FunctionTable::core().register(Some("urn:ext"), "answer", 0, Some(0), answer);
        assert!(table.contains(&ExpandedName::new(Some("urn:ext"), "answer")));
        let env = StaticEnvironment::new()
            .with_functions(table)
            .with_namespace("ext", "urn:ext");
        let expr = parse_expression("ext:answer() + 1").unwrap();
        let value = evaluate(&expr, &EvaluationContext::new(tree.root(), 1, 1, &env)).unwrap();
        assert_eq!(value.to_number(), 43.0);
    }
}
