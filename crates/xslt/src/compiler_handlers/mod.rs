//! Compilation of stylesheet elements, split by concern. Every handler is a method on
//! [`ModuleCompiler`]; this module holds the body walker and the instruction dispatch.

pub(super) mod control_flow;
pub(super) mod literals;
pub(super) mod stylesheet;
pub(super) mod variables;

use crate::ast::{Body, Instruction, InstructionKind};
use crate::compiler::{ModuleCompiler, element_name};
use crate::error::CompileError;
use crate::qname::{Namespaces, XSLT_NAMESPACE};
use std::sync::Arc;
use trellis_tree::Node;
use trellis_xpath1::{DataSourceNode, ExpandedName, NodeType};

/// XSLT 1.0 instructions this processor parses but does not implement. They fail at run
/// time unless they carry an `xsl:fallback`.
const UNIMPLEMENTED: &[&str] = &["number"];

impl ModuleCompiler<'_> {
    /// Compiles the children of `parent` as a sequence of instructions. Local variables
    /// declared in the body go out of scope at its end.
    pub(crate) fn compile_body(&mut self, parent: &Node, namespaces: &Arc<Namespaces>) -> Result<Body, CompileError> {
        let children: Vec<Node> = parent.children().collect();
        self.compile_nodes(&children, namespaces)
    }

    pub(crate) fn compile_nodes(&mut self, nodes: &[Node], namespaces: &Arc<Namespaces>) -> Result<Body, CompileError> {
        let mark = self.locals.len();
        let result = nodes
            .iter()
            .filter_map(|node| self.compile_node(node, namespaces).transpose())
            .collect::<Result<Vec<_>, _>>();
        self.locals.truncate(mark);
        Ok(Body(result?))
    }

    fn compile_node(&mut self, node: &Node, namespaces: &Arc<Namespaces>) -> Result<Option<Instruction>, CompileError> {
        match node.node_type() {
            NodeType::Text => Ok(Some(self.instruction(
                InstructionKind::Text {
                    text: node.value().to_string(),
                    disable_escaping: false,
                },
                namespaces,
                node,
            ))),
            NodeType::Element => self.compile_element(node, namespaces).map(Some),
            _ => Ok(None),
        }
    }

    /// Wraps a compiled instruction with its static context.
    pub(crate) fn instruction(&self, kind: InstructionKind, namespaces: &Arc<Namespaces>, node: &Node) -> Instruction {
        Instruction {
            kind,
            namespaces: Arc::clone(namespaces),
            base_uri: self.base_uri.clone(),
            location: node.location().copied(),
        }
    }

    fn compile_element(&mut self, element: &Node, parent: &Arc<Namespaces>) -> Result<Instruction, CompileError> {
        let location = element.location().copied();
        let Some(name) = element.node_name() else {
            return Err(CompileError::UnexpectedNode(element_name(element)).at(location));
        };
        let in_xslt = name.namespace_uri.as_deref() == Some(XSLT_NAMESPACE);
        let attribute_namespace = if in_xslt { None } else { Some(XSLT_NAMESPACE) };
        let local_name = name.local_name.clone();

        let compiled = self
            .scope_for(element, parent, attribute_namespace)
            .and_then(|namespaces| {
                let kind = if in_xslt {
                    self.compile_instruction(element, &local_name, &namespaces)?
                } else {
                    self.compile_literal_element(element, &namespaces)?
                };
                Ok(self.instruction(kind, &namespaces, element))
            });
        compiled.map_err(|err| err.at(location))
    }

    fn compile_instruction(
        &mut self,
        element: &Node,
        local_name: &str,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        match local_name {
            "apply-templates" => self.compile_apply_templates(element, namespaces),
            "call-template" => self.compile_call_template(element, namespaces),
            "apply-imports" => Ok(InstructionKind::ApplyImports),
            "for-each" => self.compile_for_each(element, namespaces),
            "if" => self.compile_if(element, namespaces),
            "choose" => self.compile_choose(element, namespaces),
            "message" => self.compile_message(element, namespaces),
            "fallback" => Ok(InstructionKind::Fallback {
                body: self.compile_body(element, namespaces)?,
            }),
            "text" => self.compile_text(element),
            "value-of" => self.compile_value_of(element),
            "copy-of" => self.compile_copy_of(element),
            "copy" => self.compile_copy(element, namespaces),
            "element" => self.compile_computed_element(element, namespaces),
            "attribute" => self.compile_computed_attribute(element, namespaces),
            "comment" => Ok(InstructionKind::Comment {
                body: self.compile_body(element, namespaces)?,
            }),
            "processing-instruction" => self.compile_processing_instruction(element, namespaces),
            "variable" => self.compile_local_variable(element, namespaces),
            "param" | "sort" | "when" | "otherwise" | "with-param" => {
                Err(CompileError::UnexpectedNode(element_name(element)))
            }
            name if UNIMPLEMENTED.contains(&name) || self.forwards_compatible => {
                log::warn!("xsl:{} is not supported; it runs its xsl:fallback children", name);
                Ok(InstructionKind::Unsupported {
                    name: format!("xsl:{}", name),
                    body: self.compile_body(element, namespaces)?,
                })
            }
            _ => Err(CompileError::UnexpectedNode(element_name(element))),
        }
    }

    /// Resolves a whitespace-separated list of QNames, as in `use-attribute-sets`.
    pub(crate) fn resolve_names(&self, value: Option<&str>, namespaces: &Namespaces) -> Result<Vec<ExpandedName>, CompileError> {
        value
            .unwrap_or_default()
            .split_whitespace()
            .map(|name| namespaces.resolve(name, false))
            .collect()
    }
}
