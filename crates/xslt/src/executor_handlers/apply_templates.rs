//! Handlers for `xsl:apply-templates` and `xsl:apply-imports`.

use crate::ast::{Mode, SortKey, VariableBinding};
use crate::context::{Cause, ExecutionContext};
use crate::error::TransformError;
use crate::executor_handlers::call_template::evaluate_params;
use crate::executor_handlers::sort::sort_nodes;
use crate::matcher::apply_builtin;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use trellis_tree::Node;
use trellis_xpath1::{DataSourceNode, Expression};

pub(crate) fn handle_apply_templates(
    ctx: &mut ExecutionContext,
    select: Option<&Expression>,
    mode: &Mode,
    sort: &[SortKey],
    params: &[VariableBinding],
) -> Result<(), TransformError> {
    let nodes: Vec<Node> = match select {
        Some(expr) => ctx.evaluate_node_set(expr, "xsl:apply-templates select")?,
        None => ctx.node().children().collect(),
    };
    if nodes.is_empty() {
        return Ok(());
    }
    let nodes = sort_nodes(ctx, nodes, sort)?;
    let params = evaluate_params(ctx, params)?;

    let mut inner = ctx.enter()?;
    inner.params = Rc::new(params);
    let inner = inner.with_nodes(Rc::from(nodes), 1);
    let top = Arc::clone(&ctx.state.stylesheet);
    top.apply_templates(&inner, mode)
}

/// Continues the current invocation in the imports of the module that declared the
/// executing template. Built-in rules cover a mode invocation nothing else handles.
pub(crate) fn handle_apply_imports(ctx: &mut ExecutionContext) -> Result<(), TransformError> {
    let scope = Arc::clone(&ctx.scope);
    let mut inner = ctx.copy();
    inner.params = Rc::new(HashMap::new());
    if scope.apply_imports(&mut inner)? {
        return Ok(());
    }
    if let Cause::Mode(mode) = &ctx.cause {
        apply_builtin(&inner, mode)?;
    }
    Ok(())
}
