//! Handlers for `xsl:copy` and `xsl:copy-of`.

use crate::ast::Body;
use crate::context::ExecutionContext;
use crate::error::TransformError;
use crate::executor::execute_body;
use crate::matcher::use_attribute_set;
use crate::sink::ResultItem;
use trellis_xpath1::{DataSourceNode, ExpandedName, Expression, NodeType, XPathValue};

/// Copies the context node without its attributes or children. The body only runs for
/// the root and for elements, whose namespace declarations travel with the copy.
pub(crate) fn handle_copy(
    ctx: &mut ExecutionContext,
    use_attribute_sets: &[ExpandedName],
    body: &Body,
) -> Result<(), TransformError> {
    let node = ctx.node().clone();
    match node.node_type() {
        NodeType::Root => execute_body(body, &mut ctx.copy()),
        NodeType::Element => {
            let id = ctx.result.create(|doc| doc.import_node(&node, false))?;
            ctx.result.push(ResultItem::Created(id))?;
            let mut inner = ctx.with_result(ctx.result.child(id)?);
            for set in use_attribute_sets {
                use_attribute_set(&inner, set)?;
            }
            execute_body(body, &mut inner)
        }
        NodeType::Text => ctx.result.push(ResultItem::Text(node.value().to_string())),
        NodeType::Attribute | NodeType::Comment | NodeType::ProcessingInstruction => {
            ctx.result.push(ResultItem::Node(node))
        }
    }
}

/// Copies selected nodes deeply. Any other value is written as its string.
pub(crate) fn handle_copy_of(ctx: &mut ExecutionContext, select: &Expression) -> Result<(), TransformError> {
    match ctx.evaluate(select)? {
        XPathValue::NodeSet(nodes) => {
            let items = nodes.into_iter().map(ResultItem::Node).collect();
            ctx.result.push(ResultItem::List(items))
        }
        other => ctx.result.push(ResultItem::Text(other.to_string())),
    }
}
