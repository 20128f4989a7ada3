//! Compilation of output instructions: literal result elements, text, `value-of`,
//! `copy`, `copy-of` and the computed-name constructors.

use crate::ast::InstructionKind;
use crate::avt::AttributeValueTemplate;
use crate::compiler::{ModuleCompiler, element_name, optional, optional_flag, required};
use crate::error::CompileError;
use crate::qname::{Namespaces, XSLT_NAMESPACE};
use std::sync::Arc;
use trellis_tree::Node;
use trellis_xpath1::{DataSourceNode, NodeType};

impl ModuleCompiler<'_> {
    /// A literal result element. Attributes in the XSLT namespace are directives and are
    /// not copied; every other attribute is an attribute value template.
    pub(crate) fn compile_literal_element(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        let name = element
            .node_name()
            .cloned()
            .ok_or_else(|| CompileError::UnexpectedNode(element_name(element)))?;
        let doc = element.document();

        let mut attributes = Vec::new();
        for &attribute in doc.attributes(element.id()) {
            let Some(attr_name) = doc.name(attribute) else { continue };
            if attr_name.namespace_uri.as_deref() == Some(XSLT_NAMESPACE) {
                continue;
            }
            let avt = AttributeValueTemplate::parse(doc.value(attribute), self.compiler.expressions())?;
            attributes.push((attr_name.clone(), avt));
        }

        let use_attribute_sets = self.resolve_names(
            doc.attribute(element.id(), Some(XSLT_NAMESPACE), "use-attribute-sets"),
            namespaces,
        )?;
        let declarations = namespaces
            .in_scope()
            .into_iter()
            .filter(|(_, uri)| !namespaces.is_excluded(uri))
            .map(|(prefix, uri)| (prefix.map(str::to_string), uri.to_string()))
            .collect();

        Ok(InstructionKind::LiteralElement {
            name,
            namespaces: declarations,
            attributes,
            use_attribute_sets,
            body: self.compile_body(element, namespaces)?,
        })
    }

    pub(crate) fn compile_text(&mut self, element: &Node) -> Result<InstructionKind, CompileError> {
        let mut text = String::new();
        for child in element.children() {
            if child.node_type() != NodeType::Text {
                return Err(CompileError::UnexpectedNode(element_name(&child)));
            }
            text.push_str(child.value());
        }
        Ok(InstructionKind::Text {
            text,
            disable_escaping: optional_flag(element, "disable-output-escaping")?.unwrap_or(false),
        })
    }

    pub(crate) fn compile_value_of(&mut self, element: &Node) -> Result<InstructionKind, CompileError> {
        Ok(InstructionKind::ValueOf {
            select: self.expression(&required(element, "select")?)?,
            disable_escaping: optional_flag(element, "disable-output-escaping")?.unwrap_or(false),
        })
    }

    pub(crate) fn compile_copy_of(&mut self, element: &Node) -> Result<InstructionKind, CompileError> {
        Ok(InstructionKind::CopyOf {
            select: self.expression(&required(element, "select")?)?,
        })
    }

    pub(crate) fn compile_copy(&mut self, element: &Node, namespaces: &Arc<Namespaces>) -> Result<InstructionKind, CompileError> {
        Ok(InstructionKind::Copy {
            use_attribute_sets: self.resolve_names(optional(element, "use-attribute-sets").as_deref(), namespaces)?,
            body: self.compile_body(element, namespaces)?,
        })
    }

    pub(crate) fn compile_computed_element(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        Ok(InstructionKind::Element {
            name: self.avt(&required(element, "name")?)?,
            namespace: self.optional_avt(element, "namespace")?,
            use_attribute_sets: self.resolve_names(optional(element, "use-attribute-sets").as_deref(), namespaces)?,
            body: self.compile_body(element, namespaces)?,
        })
    }

    pub(crate) fn compile_computed_attribute(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        Ok(InstructionKind::Attribute {
            name: self.avt(&required(element, "name")?)?,
            namespace: self.optional_avt(element, "namespace")?,
            body: self.compile_body(element, namespaces)?,
        })
    }

    pub(crate) fn compile_processing_instruction(
        &mut self,
        element: &Node,
        namespaces: &Arc<Namespaces>,
    ) -> Result<InstructionKind, CompileError> {
        Ok(InstructionKind::ProcessingInstruction {
            name: self.avt(&required(element, "name")?)?,
            body: self.compile_body(element, namespaces)?,
        })
    }

    pub(crate) fn avt(&mut self, text: &str) -> Result<AttributeValueTemplate, CompileError> {
        AttributeValueTemplate::parse(text, self.compiler.expressions())
    }

    pub(crate) fn optional_avt(&mut self, element: &Node, attribute: &str) -> Result<Option<AttributeValueTemplate>, CompileError> {
        optional(element, attribute).map(|text| self.avt(&text)).transpose()
    }
}
