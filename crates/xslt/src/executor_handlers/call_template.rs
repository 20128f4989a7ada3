//! Handler for `xsl:call-template`, and parameter evaluation shared with
//! `xsl:apply-templates`.

use crate::ast::VariableBinding;
use crate::context::{ExecutionContext, Value};
use crate::error::TransformError;
use crate::executor_handlers::variables::evaluate_binding;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use trellis_xpath1::ExpandedName;

/// Evaluates `xsl:with-param` values in the caller's context.
pub(crate) fn evaluate_params(
    ctx: &ExecutionContext,
    params: &[VariableBinding],
) -> Result<HashMap<ExpandedName, Value>, TransformError> {
    params
        .iter()
        .map(|param| Ok((param.name.clone(), evaluate_binding(ctx, &param.value)?)))
        .collect()
}

pub(crate) fn handle_call_template(
    ctx: &mut ExecutionContext,
    name: &ExpandedName,
    params: &[VariableBinding],
) -> Result<(), TransformError> {
    let values = evaluate_params(ctx, params)?;
    let mut inner = ctx.copy();
    inner.params = Rc::new(values);
    let top = Arc::clone(&ctx.state.stylesheet);
    top.call_template(&mut inner, name)?;
    Ok(())
}
