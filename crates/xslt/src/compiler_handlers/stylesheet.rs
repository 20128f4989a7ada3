//! Handlers for the top-level elements of a stylesheet module.

use crate::ast::{AttributeSet, GlobalVariable, InstructionKind, KeyDefinition, Template};
use crate::compiler::{ModuleCompiler, element_name, is_xslt, optional, optional_flag, required};
use crate::error::CompileError;
use crate::pattern;
use crate::qname::{NameTest, Namespaces, XSLT_NAMESPACE};
use crate::stylesheet::{NamespaceAlias, OutputDeclaration};
use std::sync::Arc;
use trellis_tree::Node;
use trellis_xpath1::{DataSourceNode, NodeType};

impl ModuleCompiler<'_> {
    /// Compiles the children of `xsl:stylesheet`. `xsl:import` must precede every other
    /// declaration.
    pub(crate) fn compile_top_level(&mut self, stylesheet: &Node, namespaces: &Arc<Namespaces>) -> Result<(), CompileError> {
        let mut imports_allowed = true;
        for child in stylesheet.children() {
            let location = child.location().copied();
            match child.node_type() {
                NodeType::Element => {}
                NodeType::Text => return Err(CompileError::UnexpectedNode("#text".to_string()).at(location)),
                _ => continue,
            }
            let is_import = is_xslt(&child, "import");
            if is_import && !imports_allowed {
                return Err(CompileError::UnexpectedNode(element_name(&child)).at(location));
            }
            imports_allowed &= is_import;
            self.compile_declaration(&child, namespaces)
                .map_err(|err| err.at(location))?;
        }
        Ok(())
    }

    fn compile_declaration(&mut self, element: &Node, parent: &Arc<Namespaces>) -> Result<(), CompileError> {
        let Some(name) = element.node_name() else {
            return Ok(());
        };
        match name.namespace_uri.as_deref() {
            Some(XSLT_NAMESPACE) => {}
            Some(uri) => {
                log::debug!("Ignoring top-level element {} in namespace {}", name.qualified(), uri);
                return Ok(());
            }
            None => return Err(CompileError::UnexpectedNode(name.qualified())),
        }
        let namespaces = self.scope_for(element, parent, None)?;
        match name.local_name.as_str() {
            "import" => self.compile_import(element),
            "include" => self.compile_include(element),
            "template" => self.compile_template(element, &namespaces),
            "variable" => self.compile_global(element, &namespaces, false),
            "param" => self.compile_global(element, &namespaces, true),
            "strip-space" => {
                for test in self.name_tests(element, &namespaces)? {
                    self.builder.add_strip_space(test);
                }
                Ok(())
            }
            "preserve-space" => {
                for test in self.name_tests(element, &namespaces)? {
                    self.builder.add_preserve_space(test);
                }
                Ok(())
            }
            "output" => self.compile_output(element, &namespaces),
            "key" => self.compile_key(element, &namespaces),
            "namespace-alias" => self.compile_namespace_alias(element, &namespaces),
            "attribute-set" => self.compile_attribute_set(element, &namespaces),
            "decimal-format" => {
                log::warn!("xsl:decimal-format is not supported and is ignored");
                Ok(())
            }
            other if self.forwards_compatible => {
                log::warn!("Ignoring unknown top-level element xsl:{}", other);
                Ok(())
            }
            _ => Err(CompileError::UnexpectedNode(name.qualified())),
        }
    }

    /// Compiles an imported module into its own scope.
    fn compile_import(&mut self, element: &Node) -> Result<(), CompileError> {
        let href = required(element, "href")?;
        let doc = self.compiler.load_module(&href, self.base_uri.as_deref())?;
        let imported = self.compiler.compile_document(&doc)?;
        self.builder.add_import(imported);
        Ok(())
    }

    /// Compiles an included module's declarations into this scope.
    fn compile_include(&mut self, element: &Node) -> Result<(), CompileError> {
        let href = required(element, "href")?;
        let doc = self.compiler.load_module(&href, self.base_uri.as_deref())?;
        self.compiler.enter_module(doc.base_uri().unwrap_or_default());
        let result = self.compile_root(&doc);
        self.compiler.leave_module();
        result
    }

    fn compile_template(&mut self, element: &Node, namespaces: &Arc<Namespaces>) -> Result<(), CompileError> {
        let patterns = match optional(element, "match") {
            Some(text) => pattern::parse(&text, self.compiler.expressions())?,
            None => Vec::new(),
        };
        let name = optional(element, "name")
            .map(|name| namespaces.resolve(&name, false))
            .transpose()?;
        if patterns.is_empty() && name.is_none() {
            return Err(CompileError::required("match", &element_name(element)));
        }
        let mode = match optional(element, "mode") {
            Some(mode) if patterns.is_empty() => {
                return Err(CompileError::invalid_value("mode", &mode, "a template without a match pattern has no mode"));
            }
            Some(mode) => Some(namespaces.resolve(&mode, false)?),
            None => None,
        };
        let priority = optional(element, "priority")
            .map(|text| match text.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(value),
                _ => Err(CompileError::invalid_value("priority", &text, "expected a number")),
            })
            .transpose()?;

        let body = self.compile_template_body(element, namespaces)?;
        self.builder.add_template(Template {
            name,
            patterns,
            mode,
            priority,
            body,
            namespaces: Arc::clone(namespaces),
            location: element.location().copied(),
        })
    }

    fn compile_global(&mut self, element: &Node, namespaces: &Arc<Namespaces>, is_param: bool) -> Result<(), CompileError> {
        let binding = self.compile_binding(element, namespaces)?;
        let name = binding.name.clone();
        let kind = if is_param {
            InstructionKind::Param(binding)
        } else {
            InstructionKind::Variable(binding)
        };
        let instruction = self.instruction(kind, namespaces, element);
        self.builder.add_variable(GlobalVariable { name, instruction })
    }

    fn name_tests(&self, element: &Node, namespaces: &Namespaces) -> Result<Vec<NameTest>, CompileError> {
        required(element, "elements")?
            .split_whitespace()
            .map(|token| NameTest::parse(token, namespaces))
            .collect()
    }

    fn compile_output(&mut self, element: &Node, namespaces: &Namespaces) -> Result<(), CompileError> {
        let cdata_section_elements = optional(element, "cdata-section-elements")
            .unwrap_or_default()
            .split_whitespace()
            .map(|name| namespaces.resolve(name, true))
            .collect::<Result<Vec<_>, _>>()?;
        let output = OutputDeclaration {
            method: optional(element, "method").map(|method| method.trim().to_string()),
            version: optional(element, "version"),
            encoding: optional(element, "encoding"),
            omit_xml_declaration: optional_flag(element, "omit-xml-declaration")?,
            standalone: optional_flag(element, "standalone")?,
            doctype_public: optional(element, "doctype-public"),
            doctype_system: optional(element, "doctype-system"),
            indent: optional_flag(element, "indent")?,
            media_type: optional(element, "media-type"),
            cdata_section_elements,
        };
        self.builder.add_output(&output);
        Ok(())
    }

    fn compile_key(&mut self, element: &Node, namespaces: &Arc<Namespaces>) -> Result<(), CompileError> {
        let name = namespaces.resolve(&required(element, "name")?, false)?;
        let patterns = pattern::parse(&required(element, "match")?, self.compiler.expressions())?;
        let use_expr = self.expression(&required(element, "use")?)?;
        self.builder.add_key(KeyDefinition {
            name,
            patterns,
            use_expr,
            namespaces: Arc::clone(namespaces),
        });
        Ok(())
    }

    /// `#default` names the default namespace on either side. Stylesheet names in no
    /// namespace are aliased under the empty URI.
    fn compile_namespace_alias(&mut self, element: &Node, namespaces: &Namespaces) -> Result<(), CompileError> {
        let stylesheet_prefix = required(element, "stylesheet-prefix")?;
        let result_prefix = required(element, "result-prefix")?;
        let stylesheet_uri = prefix_uri(&stylesheet_prefix, namespaces)?.unwrap_or_default();
        let uri = prefix_uri(&result_prefix, namespaces)?;
        let prefix = (result_prefix != "#default" && uri.is_some()).then_some(result_prefix);
        self.builder
            .add_namespace_alias(stylesheet_uri, NamespaceAlias { prefix, uri });
        Ok(())
    }

    fn compile_attribute_set(&mut self, element: &Node, namespaces: &Arc<Namespaces>) -> Result<(), CompileError> {
        let name = namespaces.resolve(&required(element, "name")?, false)?;
        let use_attribute_sets = self.resolve_names(optional(element, "use-attribute-sets").as_deref(), namespaces)?;
        let children: Vec<Node> = element.children().collect();
        if let Some(other) = children.iter().find(|child| !is_xslt(child, "attribute")) {
            let name = match other.node_type() {
                NodeType::Text => "#text".to_string(),
                _ => element_name(other),
            };
            return Err(CompileError::UnexpectedNode(name).at(other.location().copied()));
        }
        let body = self.compile_nodes(&children, namespaces)?;
        self.builder.add_attribute_set(AttributeSet {
            name,
            use_attribute_sets,
            body,
            namespaces: Arc::clone(namespaces),
        });
        Ok(())
    }
}

fn prefix_uri(prefix: &str, namespaces: &Namespaces) -> Result<Option<String>, CompileError> {
    if prefix == "#default" {
        return Ok(namespaces.default_namespace().map(str::to_string));
    }
    namespaces
        .get(prefix)
        .map(|uri| Some(uri.to_string()))
        .ok_or_else(|| CompileError::NamespaceNotFound(prefix.to_string()))
}
