//! Compilation of `xsl:variable`, `xsl:param` and `xsl:with-param`, and of template
//! bodies with their leading parameters.

use crate::ast::{Body, InstructionKind, VariableBinding, VariableValue};
use crate::compiler::{ModuleCompiler, element_name, is_xslt, optional, required};
use crate::error::CompileError;
use crate::qname::Namespaces;
use std::sync::Arc;
use trellis_tree::Node;
use trellis_xpath1::DataSourceNode;

impl ModuleCompiler<'_> {
    /// The name and value of a binding element. A `select` attribute and content are
    /// mutually exclusive.
    pub(crate) fn compile_binding(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<VariableBinding, CompileError> {
        let name = namespaces.resolve(&required(element, "name")?, false)?;
        let has_content = element.children().next().is_some();
        let value = match optional(element, "select") {
            Some(_) if has_content => return Err(CompileError::UnexpectedNode(element_name(element))),
            Some(select) => VariableValue::Select(self.expression(&select)?),
            None if has_content => VariableValue::Content(self.compile_body(element, namespaces)?),
            None => VariableValue::Empty,
        };
        Ok(VariableBinding { name, value })
    }

    /// Compiles a local binding and makes its name visible to the following siblings.
    fn declare_local(&mut self, element: &Node, namespaces: &Arc<Namespaces>) -> Result<VariableBinding, CompileError> {
        let binding = self.compile_binding(element, namespaces)?;
        if self.locals.contains(&binding.name) {
            return Err(CompileError::VariableRedefinition(binding.name.to_string()));
        }
        self.locals.push(binding.name.clone());
        Ok(binding)
    }

    pub(crate) fn compile_local_variable(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        Ok(InstructionKind::Variable(self.declare_local(element, namespaces)?))
    }

    /// A template body: `xsl:param` elements first, then instructions.
    pub(crate) fn compile_template_body(&mut self, template: &Node, namespaces: &Arc<Namespaces>) -> Result<Body, CompileError> {
        self.locals.clear();
        let children: Vec<Node> = template.children().collect();
        let leading = children.iter().take_while(|child| is_xslt(child, "param")).count();

        let mut body = Vec::with_capacity(children.len());
        for param in &children[..leading] {
            let location = param.location().copied();
            let scope = self.scope_for(param, namespaces, None).map_err(|err| err.at(location))?;
            let binding = self.declare_local(param, &scope).map_err(|err| err.at(location))?;
            body.push(self.instruction(InstructionKind::Param(binding), &scope, param));
        }
        body.extend(self.compile_nodes(&children[leading..], namespaces)?.0);
        self.locals.clear();
        Ok(Body(body))
    }

    /// The `xsl:with-param` children of `apply-templates` or `call-template`. Each name may
    /// be passed once.
    pub(crate) fn compile_with_param(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
        params: &mut Vec<VariableBinding>,
    ) -> Result<(), CompileError> {
        let location = element.location().copied();
        let scope = self.scope_for(element, namespaces, None).map_err(|err| err.at(location))?;
        let binding = self.compile_binding(element, &scope).map_err(|err| err.at(location))?;
        if params.iter().any(|param| param.name == binding.name) {
            return Err(CompileError::DuplicateName(binding.name.to_string()).at(location));
        }
        params.push(binding);
        Ok(())
    }
}
