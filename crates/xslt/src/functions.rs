//! Functions the rule language adds to the XPath core library.

use crate::context::{ExecutionContext, KeyIndex, Value};
use crate::error::TransformError;
use crate::qname::XSLT_NAMESPACE;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use trellis_tree::{Document, Node, ParseOptions};
use trellis_xpath1::functions::{Args, FnResult};
use trellis_xpath1::order::{first_in_document_order, sort_unique};
use trellis_xpath1::{DataSourceNode, EvaluationContext, ExpandedName, FunctionTable, XPathError, XPathValue};

/// Instructions `element-available()` reports.
const INSTRUCTIONS: &[&str] = &[
    "apply-imports",
    "apply-templates",
    "attribute",
    "call-template",
    "choose",
    "comment",
    "copy",
    "copy-of",
    "element",
    "fallback",
    "for-each",
    "if",
    "message",
    "processing-instruction",
    "text",
    "value-of",
    "variable",
];

type Ctx<'a, 'e> = &'a EvaluationContext<'e, ExecutionContext>;

/// The XPath core library plus the rule-language functions.
pub fn xslt_functions() -> FunctionTable<ExecutionContext> {
    FunctionTable::core().merge(
        FunctionTable::new()
            .register(None, "current", 0, Some(0), current)
            .register(None, "generate-id", 0, Some(1), generate_id)
            .register(None, "key", 2, Some(2), key)
            .register(None, "system-property", 1, Some(1), system_property)
            .register(None, "element-available", 1, Some(1), element_available)
            .register(None, "function-available", 1, Some(1), function_available)
            .register(None, "unparsed-entity-uri", 1, Some(1), unparsed_entity_uri)
            .register(None, "document", 1, Some(2), document),
    )
}

fn function_error(function: &str, message: impl ToString) -> XPathError {
    XPathError::FunctionError {
        function: function.to_string(),
        message: message.to_string(),
    }
}

/// Resolves a QName argument against the namespaces of the calling instruction.
fn expanded_name_arg(function: &str, e_ctx: Ctx<'_, '_>, value: &Value) -> Result<ExpandedName, XPathError> {
    e_ctx
        .env
        .namespaces
        .resolve(value.to_string().trim(), false)
        .map_err(|err| function_error(function, err))
}

/// The node the instruction is running for, unlike the context node of a predicate.
fn current(e_ctx: Ctx<'_, '_>, _args: Args<ExecutionContext>) -> FnResult<ExecutionContext> {
    Ok(XPathValue::NodeSet(vec![e_ctx.env.node().clone()]))
}

fn generate_id(e_ctx: Ctx<'_, '_>, args: Args<ExecutionContext>) -> FnResult<ExecutionContext> {
    let node = match args.into_iter().next() {
        None => Some(e_ctx.context_node.clone()),
        Some(value) => {
            let nodes = value.into_node_set("argument of generate-id()")?;
            first_in_document_order(&nodes).cloned()
        }
    };
    Ok(XPathValue::String(match node {
        Some(node) => format!("{}n{}", node.document().id(), node.id().index()),
        None => String::new(),
    }))
}

fn key(e_ctx: Ctx<'_, '_>, args: Args<ExecutionContext>) -> FnResult<ExecutionContext> {
    let mut args = args.into_iter();
    let (Some(name), Some(value)) = (args.next(), args.next()) else {
        return Err(function_error("key", "expected a key name and a value"));
    };
    let name = expanded_name_arg("key", e_ctx, &name)?;
    let index = key_index(e_ctx.env, &e_ctx.context_node, &name)?;

    let lookups: Vec<String> = match value {
        XPathValue::NodeSet(nodes) => nodes.iter().map(|node| node.string_value()).collect(),
        other => vec![other.to_string()],
    };
    let mut found: Vec<Node> = lookups
        .iter()
        .filter_map(|lookup| index.get(lookup))
        .flatten()
        .cloned()
        .collect();
    sort_unique(&mut found);
    Ok(XPathValue::NodeSet(found))
}

/// The index of key `name` over the document holding `node`, built on first use.
fn key_index(ctx: &ExecutionContext, node: &Node, name: &ExpandedName) -> Result<KeyIndex, XPathError> {
    let cache_key = (node.document().id(), name.clone());
    if let Some(index) = ctx.state.keys.borrow().get(&cache_key) {
        return Ok(Rc::clone(index));
    }
    let stylesheet = Arc::clone(&ctx.state.stylesheet);
    let definitions = stylesheet
        .keys(name)
        .ok_or_else(|| function_error("key", format!("no key named '{}'", name)))?;

    let root = node.root();
    let mut index: HashMap<String, Vec<Node>> = HashMap::new();
    for definition in definitions {
        let mut env = ctx.with_node(root.clone());
        env.reset_variables();
        env.namespaces = Arc::clone(&definition.namespaces);
        let e_ctx = EvaluationContext::new(root.clone(), 1, 1, &env);
        for pattern in &definition.patterns {
            for matched in pattern.select_all(&e_ctx)? {
                let values = match env.with_node(matched.clone()).evaluate(&definition.use_expr)? {
                    XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
                    other => vec![other.to_string()],
                };
                for value in values {
                    index.entry(value).or_default().push(matched.clone());
                }
            }
        }
    }
    for nodes in index.values_mut() {
        sort_unique(nodes);
    }
    log::debug!(
        "Built key {} over document {}: {} values",
        name,
        root.document().id(),
        index.len()
    );
    let index = Rc::new(index);
    ctx.state.keys.borrow_mut().insert(cache_key, Rc::clone(&index));
    Ok(index)
}

fn system_property(e_ctx: Ctx<'_, '_>, args: Args<ExecutionContext>) -> FnResult<ExecutionContext> {
    let Some(arg) = args.first() else {
        return Ok(XPathValue::String(String::new()));
    };
    let name = expanded_name_arg("system-property", e_ctx, arg)?;
    if name.namespace_uri.as_deref() != Some(XSLT_NAMESPACE) {
        return Ok(XPathValue::String(String::new()));
    }
    let config = &e_ctx.env.state.config;
    Ok(match name.local_name.as_str() {
        "version" => XPathValue::Number(1.0),
        "vendor" => XPathValue::String(config.vendor.clone()),
        "vendor-url" => XPathValue::String(config.vendor_url.clone()),
        _ => XPathValue::String(String::new()),
    })
}

fn element_available(e_ctx: Ctx<'_, '_>, args: Args<ExecutionContext>) -> FnResult<ExecutionContext> {
    let Some(arg) = args.first() else {
        return Ok(XPathValue::Boolean(false));
    };
    let name = expanded_name_arg("element-available", e_ctx, arg)?;
    Ok(XPathValue::Boolean(
        name.namespace_uri.as_deref() == Some(XSLT_NAMESPACE) && INSTRUCTIONS.contains(&name.local_name.as_str()),
    ))
}

fn function_available(e_ctx: Ctx<'_, '_>, args: Args<ExecutionContext>) -> FnResult<ExecutionContext> {
    let Some(arg) = args.first() else {
        return Ok(XPathValue::Boolean(false));
    };
    let name = expanded_name_arg("function-available", e_ctx, arg)?;
    Ok(XPathValue::Boolean(e_ctx.env.state.functions.contains(&name)))
}

/// Documents carry no unparsed entity declarations.
fn unparsed_entity_uri(_e_ctx: Ctx<'_, '_>, _args: Args<ExecutionContext>) -> FnResult<ExecutionContext> {
    Ok(XPathValue::String(String::new()))
}

/// Loads documents through the provider. Each URI in a node-set argument resolves against
/// the base URI of the node holding it, unless a second argument names the base.
fn document(e_ctx: Ctx<'_, '_>, args: Args<ExecutionContext>) -> FnResult<ExecutionContext> {
    let env = e_ctx.env;
    let mut args = args.into_iter();
    let Some(target) = args.next() else {
        return Err(function_error("document", "expected at least one argument"));
    };
    let explicit_base = match args.next() {
        Some(value) => {
            let nodes = value.into_node_set("second argument of document()")?;
            Some(first_in_document_order(&nodes).and_then(|n| n.base_uri().map(str::to_string)))
        }
        None => None,
    };

    let requests: Vec<(String, Option<String>)> = match target {
        XPathValue::NodeSet(nodes) => nodes
            .iter()
            .map(|node| {
                let base = match &explicit_base {
                    Some(base) => base.clone(),
                    None => node.base_uri().map(str::to_string),
                };
                (node.string_value(), base)
            })
            .collect(),
        other => {
            let base = match explicit_base {
                Some(base) => base,
                None => env.base_uri.as_deref().map(str::to_string),
            };
            vec![(other.to_string(), base)]
        }
    };

    let mut loaded = Vec::with_capacity(requests.len());
    for (uri, base) in requests {
        let uri = uri.split('#').next().unwrap_or_default().trim();
        let absolute = env.state.provider.resolve(uri, base.as_deref());
        let doc = load_source(env, &absolute).map_err(|err| function_error("document", err))?;
        loaded.push(Node::root(&doc));
    }
    sort_unique(&mut loaded);
    Ok(XPathValue::NodeSet(loaded))
}

/// Loads a source document, applying the stylesheet's whitespace stripping rules.
fn load_source(env: &ExecutionContext, uri: &str) -> Result<Rc<Document>, TransformError> {
    let stylesheet = Arc::clone(&env.state.stylesheet);
    let strip = move |name: &ExpandedName| stylesheet.strips_whitespace(name);
    let mut options = ParseOptions::default();
    if env.state.config.strip_source_whitespace && env.state.stylesheet.has_whitespace_rules() {
        options = options.with_whitespace_stripping(&strip);
    }
    Ok(env.state.provider.load(uri, &options)?)
}
