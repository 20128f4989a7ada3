//! Compilation of template invocation, iteration and conditional instructions.

use crate::ast::{Body, InstructionKind, SortKey};
use crate::compiler::{ModuleCompiler, element_name, is_xslt, optional, optional_flag, required};
use crate::error::CompileError;
use crate::qname::Namespaces;
use std::sync::Arc;
use trellis_tree::Node;
use trellis_xpath1::{DataSourceNode, NodeType};

impl ModuleCompiler<'_> {
    pub(crate) fn compile_apply_templates(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        let select = optional(element, "select")
            .map(|select| self.expression(&select))
            .transpose()?;
        let mode = optional(element, "mode")
            .map(|mode| namespaces.resolve(&mode, false))
            .transpose()?;

        let mut sort = Vec::new();
        let mut params = Vec::new();
        for child in element.children() {
            if is_xslt(&child, "sort") {
                sort.push(self.compile_sort(&child)?);
            } else if is_xslt(&child, "with-param") {
                self.compile_with_param(&child, namespaces, &mut params)?;
            } else {
                return Err(unexpected(&child));
            }
        }
        Ok(InstructionKind::ApplyTemplates {
            select,
            mode,
            sort,
            params,
        })
    }

    pub(crate) fn compile_call_template(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        let name = namespaces.resolve(&required(element, "name")?, false)?;
        let mut params = Vec::new();
        for child in element.children() {
            if !is_xslt(&child, "with-param") {
                return Err(unexpected(&child));
            }
            self.compile_with_param(&child, namespaces, &mut params)?;
        }
        Ok(InstructionKind::CallTemplate { name, params })
    }

    pub(crate) fn compile_for_each(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        let select = self.expression(&required(element, "select")?)?;
        let children: Vec<Node> = element.children().collect();
        let leading = children.iter().take_while(|child| is_xslt(child, "sort")).count();
        let sort = children[..leading]
            .iter()
            .map(|child| self.compile_sort(child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(InstructionKind::ForEach {
            select,
            sort,
            body: self.compile_nodes(&children[leading..], namespaces)?,
        })
    }

    fn compile_sort(&mut self, element: &Node) -> Result<SortKey, CompileError> {
        let location = element.location().copied();
        self.compile_sort_key(element).map_err(|err| err.at(location))
    }

    fn compile_sort_key(&mut self, element: &Node) -> Result<SortKey, CompileError> {
        if let Some(child) = element.children().next() {
            return Err(unexpected(&child));
        }
        Ok(SortKey {
            select: self.expression(optional(element, "select").as_deref().unwrap_or("."))?,
            data_type: self.optional_avt(element, "data-type")?,
            order: self.optional_avt(element, "order")?,
            case_order: self.optional_avt(element, "case-order")?,
        })
    }

    pub(crate) fn compile_if(&mut self, element: &Node, namespaces: &Arc<Namespaces>) -> Result<InstructionKind, CompileError> {
        Ok(InstructionKind::If {
            test: self.expression(&required(element, "test")?)?,
            body: self.compile_body(element, namespaces)?,
        })
    }

    /// `xsl:when` branches followed by at most one `xsl:otherwise`.
    pub(crate) fn compile_choose(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        let mut whens = Vec::new();
        let mut otherwise: Option<Body> = None;
        for child in element.children() {
            let location = child.location().copied();
            if is_xslt(&child, "when") && otherwise.is_none() {
                let scope = self.scope_for(&child, namespaces, None).map_err(|err| err.at(location))?;
                let test = self
                    .expression(&required(&child, "test").map_err(|err| err.at(location))?)
                    .map_err(|err| err.at(location))?;
                whens.push((test, self.compile_body(&child, &scope)?));
            } else if is_xslt(&child, "otherwise") && otherwise.is_none() {
                let scope = self.scope_for(&child, namespaces, None).map_err(|err| err.at(location))?;
                otherwise = Some(self.compile_body(&child, &scope)?);
            } else {
                return Err(unexpected(&child));
            }
        }
        if whens.is_empty() {
            return Err(CompileError::UnexpectedNode(element_name(element)));
        }
        Ok(InstructionKind::Choose { whens, otherwise })
    }

    pub(crate) fn compile_message(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        Ok(InstructionKind::Message {
            terminate: optional_flag(element, "terminate")?.unwrap_or(false),
            body: self.compile_body(element, namespaces)?,
        })
    }
}

/// The error for a child that is not allowed where it appears.
fn unexpected(node: &Node) -> CompileError {
    let name = match node.node_type() {
        NodeType::Text => "#text".to_string(),
        _ => element_name(node),
    };
    CompileError::UnexpectedNode(name).at(node.location().copied())
}
