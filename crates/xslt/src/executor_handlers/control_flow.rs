//! Handlers for conditionals, iteration, messages and forwards-compatible fallback.

use crate::ast::{Body, InstructionKind, SortKey};
use crate::context::{Cause, ExecutionContext};
use crate::error::TransformError;
use crate::executor::{execute, execute_body, instantiate_fragment};
use crate::executor_handlers::sort::sort_nodes;
use std::rc::Rc;
use std::sync::Arc;
use trellis_tree::Node;
use trellis_xpath1::Expression;

pub(crate) fn handle_if(ctx: &mut ExecutionContext, test: &Expression, body: &Body) -> Result<(), TransformError> {
    if ctx.evaluate(test)?.to_bool() {
        execute_body(body, &mut ctx.copy())?;
    }
    Ok(())
}

pub(crate) fn handle_choose(
    ctx: &mut ExecutionContext,
    whens: &[(Arc<Expression>, Body)],
    otherwise: Option<&Body>,
) -> Result<(), TransformError> {
    for (test, body) in whens {
        if ctx.evaluate(test)?.to_bool() {
            return execute_body(body, &mut ctx.copy());
        }
    }
    match otherwise {
        Some(body) => execute_body(body, &mut ctx.copy()),
        None => Ok(()),
    }
}

/// Runs the body once per selected node. The invocation cause is cleared, so
/// `xsl:apply-imports` inside the loop has nothing to continue.
pub(crate) fn handle_for_each(
    ctx: &mut ExecutionContext,
    select: &Expression,
    sort: &[SortKey],
    body: &Body,
) -> Result<(), TransformError> {
    let nodes = ctx.evaluate_node_set(select, "xsl:for-each select")?;
    if nodes.is_empty() {
        return Ok(());
    }
    let nodes: Rc<[Node]> = Rc::from(sort_nodes(ctx, nodes, sort)?);
    for position in 1..=nodes.len() {
        let mut inner = ctx.with_nodes(Rc::clone(&nodes), position);
        inner.cause = Cause::None;
        execute_body(body, &mut inner)?;
    }
    Ok(())
}

pub(crate) fn handle_message(ctx: &mut ExecutionContext, terminate: bool, body: &Body) -> Result<(), TransformError> {
    let fragment = instantiate_fragment(body, ctx)?;
    let text = fragment.string_value(fragment.root());
    log::info!("xsl:message: {}", text);
    ctx.state.add_message(text.clone());
    if terminate {
        return Err(TransformError::Terminate(text));
    }
    Ok(())
}

pub(crate) fn handle_fallback(ctx: &mut ExecutionContext, body: &Body) -> Result<(), TransformError> {
    if !ctx.fallback {
        return Ok(());
    }
    let mut inner = ctx.copy();
    inner.fallback = false;
    execute_body(body, &mut inner)
}

/// Runs the `xsl:fallback` children of an instruction this processor does not implement.
pub(crate) fn handle_unsupported(ctx: &mut ExecutionContext, name: &str, body: &Body) -> Result<(), TransformError> {
    let fallbacks: Vec<_> = body
        .0
        .iter()
        .filter(|instruction| matches!(instruction.kind, InstructionKind::Fallback { .. }))
        .collect();
    if fallbacks.is_empty() {
        return Err(TransformError::Unsupported(name.to_string()));
    }
    log::warn!("{} is not supported, running its fallback", name);
    let mut inner = ctx.copy();
    inner.fallback = true;
    for instruction in fallbacks {
        execute(instruction, &mut inner)?;
    }
    Ok(())
}
