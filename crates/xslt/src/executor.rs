//! Runs compiled instructions against an [`ExecutionContext`].
//!
//! Each instruction runs with its own static namespace bindings and base URI installed on
//! the context it receives. Bindings made by `xsl:variable` and `xsl:param` stay in that
//! context and are visible to the following siblings; instructions with bodies run them in
//! copies so nested bindings go out of scope with the body.

use crate::ast::{Body, Instruction, InstructionKind};
use crate::context::ExecutionContext;
use crate::error::TransformError;
use crate::executor_handlers::{apply_templates, call_template, control_flow, copy, literals, variables};
use crate::sink::ResultSink;
use std::rc::Rc;
use trellis_tree::Document;

pub fn execute_body(body: &Body, ctx: &mut ExecutionContext) -> Result<(), TransformError> {
    for instruction in &body.0 {
        execute(instruction, ctx)?;
    }
    Ok(())
}

pub fn execute(instruction: &Instruction, ctx: &mut ExecutionContext) -> Result<(), TransformError> {
    ctx.with_static(instruction, |ctx| dispatch(instruction, ctx))
        .inspect_err(|err| {
            if let Some(location) = instruction.location
                && !matches!(err, TransformError::Terminate(_))
            {
                log::debug!(
                    "{} at {} failed: {}",
                    instruction.kind.element_name(),
                    location,
                    err
                );
            }
        })
}

fn dispatch(instruction: &Instruction, ctx: &mut ExecutionContext) -> Result<(), TransformError> {
    match &instruction.kind {
        InstructionKind::Text { text, disable_escaping } => literals::handle_text(ctx, text, *disable_escaping),
        InstructionKind::LiteralElement {
            name,
            namespaces,
            attributes,
            use_attribute_sets,
            body,
        } => literals::handle_literal_element(ctx, name, namespaces, attributes, use_attribute_sets, body),
        InstructionKind::ApplyTemplates {
            select,
            mode,
            sort,
            params,
        } => apply_templates::handle_apply_templates(ctx, select.as_deref(), mode, sort, params),
        InstructionKind::CallTemplate { name, params } => call_template::handle_call_template(ctx, name, params),
        InstructionKind::ApplyImports => apply_templates::handle_apply_imports(ctx),
        InstructionKind::ForEach { select, sort, body } => control_flow::handle_for_each(ctx, select, sort, body),
        InstructionKind::ValueOf {
            select,
            disable_escaping,
        } => literals::handle_value_of(ctx, select, *disable_escaping),
        InstructionKind::CopyOf { select } => copy::handle_copy_of(ctx, select),
        InstructionKind::Copy {
            use_attribute_sets,
            body,
        } => copy::handle_copy(ctx, use_attribute_sets, body),
        InstructionKind::If { test, body } => control_flow::handle_if(ctx, test, body),
        InstructionKind::Choose { whens, otherwise } => control_flow::handle_choose(ctx, whens, otherwise.as_ref()),
        InstructionKind::Variable(binding) => variables::handle_variable(ctx, binding),
        InstructionKind::Param(binding) => variables::handle_param(ctx, binding),
        InstructionKind::Element {
            name,
            namespace,
            use_attribute_sets,
            body,
        } => literals::handle_element(ctx, name, namespace.as_ref(), use_attribute_sets, body),
        InstructionKind::Attribute { name, namespace, body } => {
            literals::handle_attribute(ctx, name, namespace.as_ref(), body)
        }
        InstructionKind::Comment { body } => literals::handle_comment(ctx, body),
        InstructionKind::ProcessingInstruction { name, body } => {
            literals::handle_processing_instruction(ctx, name, body)
        }
        InstructionKind::Message { terminate, body } => control_flow::handle_message(ctx, *terminate, body),
        InstructionKind::Fallback { body } => control_flow::handle_fallback(ctx, body),
        InstructionKind::Unsupported { name, body } => control_flow::handle_unsupported(ctx, name, body),
    }
}

/// Instantiates `body` into a new result tree fragment.
pub fn instantiate_fragment(body: &Body, ctx: &ExecutionContext) -> Result<Rc<Document>, TransformError> {
    let sink = ResultSink::fragment();
    let mut inner = ctx.enter()?.with_result(sink.clone());
    execute_body(body, &mut inner)?;
    drop(inner);
    sink.into_document()
}

/// Instantiates `body` into a text-only sink and returns the text.
pub fn instantiate_text(body: &Body, ctx: &ExecutionContext) -> Result<String, TransformError> {
    let sink = ResultSink::text();
    let mut inner = ctx.with_result(sink.clone());
    execute_body(body, &mut inner)?;
    Ok(sink.string_value())
}
