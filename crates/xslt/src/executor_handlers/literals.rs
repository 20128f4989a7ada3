//! Handlers for literal output: text, `value-of`, literal result elements and the
//! instructions that construct nodes by computed name.

use crate::ast::Body;
use crate::avt::AttributeValueTemplate;
use crate::context::ExecutionContext;
use crate::error::TransformError;
use crate::executor::{execute_body, instantiate_text};
use crate::matcher::use_attribute_set;
use crate::sink::ResultItem;
use trellis_tree::NodeName;
use trellis_xpath1::name::is_ncname;
use trellis_xpath1::{ExpandedName, Expression, QualifiedName, XPathError};

pub(crate) fn handle_text(ctx: &mut ExecutionContext, text: &str, disable_escaping: bool) -> Result<(), TransformError> {
    ctx.result.push(text_item(text.to_string(), disable_escaping))
}

pub(crate) fn handle_value_of(
    ctx: &mut ExecutionContext,
    select: &Expression,
    disable_escaping: bool,
) -> Result<(), TransformError> {
    let content = ctx.evaluate_string(select)?;
    ctx.result.push(text_item(content, disable_escaping))
}

fn text_item(text: String, disable_escaping: bool) -> ResultItem {
    if disable_escaping {
        ResultItem::RawText(text)
    } else {
        ResultItem::Text(text)
    }
}

pub(crate) fn handle_literal_element(
    ctx: &mut ExecutionContext,
    name: &NodeName,
    namespaces: &[(Option<String>, String)],
    attributes: &[(NodeName, AttributeValueTemplate)],
    use_attribute_sets: &[ExpandedName],
    body: &Body,
) -> Result<(), TransformError> {
    let name = aliased(ctx, name);
    let declarations: Vec<(Option<String>, String)> = namespaces
        .iter()
        .filter_map(|(prefix, uri)| aliased_declaration(ctx, prefix, uri))
        .collect();

    let mut inner = start_element(ctx, name, &declarations)?;
    for set in use_attribute_sets {
        use_attribute_set(&inner, set)?;
    }
    for (attr_name, avt) in attributes {
        let value = avt.evaluate(&inner)?;
        let attr_name = aliased(&inner, attr_name);
        let id = inner.result.create(|doc| Ok(doc.create_attribute(attr_name, &value)))?;
        inner.result.push(ResultItem::Created(id))?;
    }
    execute_body(body, &mut inner)
}

/// Creates an element in the current sink, attaches it and returns a context writing into it.
fn start_element(
    ctx: &ExecutionContext,
    name: NodeName,
    declarations: &[(Option<String>, String)],
) -> Result<ExecutionContext, TransformError> {
    let id = ctx.result.create(|doc| {
        let element = doc.create_element(name);
        for (prefix, uri) in declarations {
            doc.declare_namespace(element, prefix.as_deref(), uri)?;
        }
        Ok(element)
    })?;
    ctx.result.push(ResultItem::Created(id))?;
    Ok(ctx.with_result(ctx.result.child(id)?))
}

/// Applies `xsl:namespace-alias` to a name copied from the stylesheet.
fn aliased(ctx: &ExecutionContext, name: &NodeName) -> NodeName {
    let uri = name.namespace_uri.as_deref().unwrap_or("");
    match ctx.state.stylesheet.namespace_alias(uri) {
        Some(alias) => NodeName::new(alias.prefix.as_deref(), &name.local_name, alias.uri.as_deref()),
        None => name.clone(),
    }
}

fn aliased_declaration(ctx: &ExecutionContext, prefix: &Option<String>, uri: &str) -> Option<(Option<String>, String)> {
    match ctx.state.stylesheet.namespace_alias(uri) {
        Some(alias) => alias.uri.clone().map(|uri| (alias.prefix.clone(), uri)),
        None => Some((prefix.clone(), uri.to_string())),
    }
}

/// Resolves the computed name of `xsl:element` or `xsl:attribute`. An explicit namespace
/// wins over the prefix; the default namespace only applies to elements.
fn computed_name(
    ctx: &ExecutionContext,
    name: &AttributeValueTemplate,
    namespace: Option<&AttributeValueTemplate>,
    use_default: bool,
) -> Result<NodeName, TransformError> {
    let text = name.evaluate(ctx)?;
    let qname = QualifiedName::parse(&text).ok_or_else(|| TransformError::InvalidName(text.clone()))?;
    let uri = match namespace {
        Some(avt) => {
            let uri = avt.evaluate(ctx)?;
            (!uri.is_empty()).then_some(uri)
        }
        None => match &qname.prefix {
            Some(prefix) => Some(
                ctx.namespaces
                    .get(prefix)
                    .ok_or_else(|| XPathError::UnknownPrefix(prefix.clone()))?
                    .to_string(),
            ),
            None if use_default => ctx.namespaces.default_namespace().map(str::to_string),
            None => None,
        },
    };
    let prefix = qname.prefix.as_deref().filter(|_| uri.is_some());
    Ok(NodeName::new(prefix, &qname.local_name, uri.as_deref()))
}

pub(crate) fn handle_element(
    ctx: &mut ExecutionContext,
    name: &AttributeValueTemplate,
    namespace: Option<&AttributeValueTemplate>,
    use_attribute_sets: &[ExpandedName],
    body: &Body,
) -> Result<(), TransformError> {
    let name = computed_name(ctx, name, namespace, true)?;
    let declarations: Vec<(Option<String>, String)> = name
        .namespace_uri
        .iter()
        .map(|uri| (name.prefix.clone(), uri.clone()))
        .collect();
    let mut inner = start_element(ctx, name, &declarations)?;
    for set in use_attribute_sets {
        use_attribute_set(&inner, set)?;
    }
    execute_body(body, &mut inner)
}

pub(crate) fn handle_attribute(
    ctx: &mut ExecutionContext,
    name: &AttributeValueTemplate,
    namespace: Option<&AttributeValueTemplate>,
    body: &Body,
) -> Result<(), TransformError> {
    let name = computed_name(ctx, name, namespace, false)?;
    if name.prefix.is_none() && name.local_name == "xmlns" {
        return Err(TransformError::InvalidName(name.local_name));
    }
    let value = instantiate_text(body, ctx)?;
    let id = ctx.result.create(|doc| Ok(doc.create_attribute(name, &value)))?;
    ctx.result.push(ResultItem::Created(id))
}

pub(crate) fn handle_comment(ctx: &mut ExecutionContext, body: &Body) -> Result<(), TransformError> {
    let text = instantiate_text(body, ctx)?;
    // "--" and a trailing "-" are not allowed in comment text.
    let mut text = text.replace("--", "- -");
    if text.ends_with('-') {
        text.push(' ');
    }
    let id = ctx.result.create(|doc| Ok(doc.create_comment(&text)))?;
    ctx.result.push(ResultItem::Created(id))
}

pub(crate) fn handle_processing_instruction(
    ctx: &mut ExecutionContext,
    name: &AttributeValueTemplate,
    body: &Body,
) -> Result<(), TransformError> {
    let target = name.evaluate(ctx)?;
    if !is_ncname(&target) || target.eq_ignore_ascii_case("xml") {
        return Err(TransformError::InvalidName(target));
    }
    let data = instantiate_text(body, ctx)?.replace("?>", "? >");
    let data = data.trim_start();
    let id = ctx
        .result
        .create(|doc| Ok(doc.create_processing_instruction(&target, data)))?;
    ctx.result.push(ResultItem::Created(id))
}
