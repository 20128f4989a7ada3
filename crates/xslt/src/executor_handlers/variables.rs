//! Handlers for `xsl:variable` and `xsl:param`.

use crate::ast::{VariableBinding, VariableValue};
use crate::context::{ExecutionContext, Value};
use crate::error::TransformError;
use crate::executor::instantiate_fragment;
use trellis_tree::Node;
use trellis_xpath1::XPathValue;

/// The value of a binding. Content becomes a result tree fragment, seen by expressions as
/// a node-set holding the fragment root.
pub(crate) fn evaluate_binding(ctx: &ExecutionContext, value: &VariableValue) -> Result<Value, TransformError> {
    match value {
        VariableValue::Select(expr) => Ok(ctx.evaluate(expr)?),
        VariableValue::Content(body) => {
            let fragment = instantiate_fragment(body, ctx)?;
            Ok(XPathValue::NodeSet(vec![Node::root(&fragment)]))
        }
        VariableValue::Empty => Ok(XPathValue::String(String::new())),
    }
}

pub(crate) fn handle_variable(ctx: &mut ExecutionContext, binding: &VariableBinding) -> Result<(), TransformError> {
    let value = evaluate_binding(ctx, &binding.value)?;
    ctx.bind(binding.name.clone(), value);
    Ok(())
}

/// Binds a passed parameter, or the declared default when none was passed.
pub(crate) fn handle_param(ctx: &mut ExecutionContext, binding: &VariableBinding) -> Result<(), TransformError> {
    let value = match ctx.params.get(&binding.name) {
        Some(value) => value.clone(),
        None => evaluate_binding(ctx, &binding.value)?,
    };
    ctx.bind(binding.name.clone(), value);
    Ok(())
}
