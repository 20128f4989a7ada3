//! Compiles stylesheet documents into [`Stylesheet`] scopes.
//!
//! The stylesheet is parsed into a `trellis-tree` document first. Top-level declarations
//! and instruction bodies are then compiled by the handlers in `compiler_handlers`, each an
//! `impl` block on [`ModuleCompiler`]. Imported modules are compiled into their own scopes
//! through the same [`Compiler`], which detects import cycles.

use crate::config::TransformConfig;
use crate::error::CompileError;
use crate::provider::DocumentProvider;
use crate::qname::{Namespaces, XSLT_NAMESPACE};
use crate::stylesheet::{Stylesheet, StylesheetBuilder};
use std::rc::Rc;
use std::sync::Arc;
use trellis_tree::{Document, Node, ParseOptions};
use trellis_xpath1::{ExpandedName, Expression, ExpressionCache};

pub struct Compiler {
    provider: Rc<DocumentProvider>,
    expressions: ExpressionCache,
    /// URIs of the modules currently being compiled, outermost first.
    loading: Vec<String>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_provider(Rc::new(DocumentProvider::new()))
    }

    /// A compiler that loads imported and included modules through `provider`.
    pub fn with_provider(provider: Rc<DocumentProvider>) -> Self {
        Self {
            provider,
            expressions: ExpressionCache::default(),
            loading: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: &TransformConfig) -> Self {
        self.expressions = ExpressionCache::new(config.expression_cache_capacity);
        self
    }

    pub fn provider(&self) -> &Rc<DocumentProvider> {
        &self.provider
    }

    /// Compiles stylesheet text. `base_uri` anchors relative `import` and `include` hrefs.
    pub fn compile_str(&mut self, text: &str, base_uri: Option<&str>) -> Result<Arc<Stylesheet>, CompileError> {
        let doc = parse_stylesheet(text, base_uri)?;
        self.compile_document(&doc)
    }

    /// Loads and compiles the stylesheet at `uri` through the document provider.
    pub fn compile_uri(&mut self, uri: &str) -> Result<Arc<Stylesheet>, CompileError> {
        let doc = self.load_module(uri, None)?;
        self.compile_document(&doc)
    }

    pub(crate) fn compile_document(&mut self, doc: &Rc<Document>) -> Result<Arc<Stylesheet>, CompileError> {
        let uri = doc.base_uri().map(str::to_string);
        if let Some(uri) = &uri {
            self.loading.push(uri.clone());
        }
        let result = self.compile_module(doc);
        if uri.is_some() {
            self.loading.pop();
        }
        result
    }

    fn compile_module(&mut self, doc: &Rc<Document>) -> Result<Arc<Stylesheet>, CompileError> {
        let builder = StylesheetBuilder::new(doc.base_uri().map(str::to_string));
        let mut module = ModuleCompiler::new(self, builder);
        module.compile_root(doc)?;
        let stylesheet = module.builder.finish();
        log::debug!(
            "Compiled stylesheet {}: {} rules, {} imports",
            doc.base_uri().unwrap_or("<inline>"),
            stylesheet.rule_count(),
            stylesheet.imports().len()
        );
        Ok(Arc::new(stylesheet))
    }

    /// Resolves `href` against `base` and parses the module there, refusing modules that
    /// are already being compiled.
    pub(crate) fn load_module(&mut self, href: &str, base: Option<&str>) -> Result<Rc<Document>, CompileError> {
        let uri = self.provider.resolve(href, base);
        if self.loading.contains(&uri) {
            return Err(CompileError::CircularImport(uri));
        }
        log::debug!("Loading stylesheet module '{}'", uri);
        let text = self.provider.load_text(&uri)?;
        parse_stylesheet(&text, Some(&uri))
    }

    pub(crate) fn expression(&mut self, text: &str) -> Result<Arc<Expression>, CompileError> {
        Ok(self.expressions.get_or_parse(text)?)
    }

    pub(crate) fn expressions(&mut self) -> &mut ExpressionCache {
        &mut self.expressions
    }

    pub(crate) fn enter_module(&mut self, uri: &str) {
        self.loading.push(uri.to_string());
    }

    pub(crate) fn leave_module(&mut self) {
        self.loading.pop();
    }
}

/// Parses stylesheet text. Whitespace-only text is dropped outside `xsl:text`, and so are
/// comments and processing instructions.
fn parse_stylesheet(text: &str, base_uri: Option<&str>) -> Result<Rc<Document>, CompileError> {
    let strip = |name: &ExpandedName| !is_xslt_name(name, "text");
    let options = ParseOptions {
        strip_whitespace: Some(&strip),
        keep_comments: false,
        keep_processing_instructions: false,
        base_uri: base_uri.map(str::to_string),
    };
    Ok(Rc::new(Document::parse_with(text, &options)?))
}

fn is_xslt_name(name: &ExpandedName, local_name: &str) -> bool {
    name.namespace_uri.as_deref() == Some(XSLT_NAMESPACE) && name.local_name == local_name
}

/// Compiles one module, and the modules it includes, into a single builder.
pub(crate) struct ModuleCompiler<'c> {
    pub(crate) compiler: &'c mut Compiler,
    pub(crate) builder: StylesheetBuilder,
    /// Base URI of the document being compiled; differs from the module's inside includes.
    pub(crate) base_uri: Option<Arc<str>>,
    /// Set while compiling a document whose `version` is not 1.0.
    pub(crate) forwards_compatible: bool,
    /// Local variables and parameters visible at the current point of a template body.
    pub(crate) locals: Vec<ExpandedName>,
}

impl<'c> ModuleCompiler<'c> {
    fn new(compiler: &'c mut Compiler, builder: StylesheetBuilder) -> Self {
        let base_uri = builder.base_uri.as_deref().map(Arc::from);
        Self {
            compiler,
            builder,
            base_uri,
            forwards_compatible: false,
            locals: Vec::new(),
        }
    }

    /// Compiles the `xsl:stylesheet` element of `doc` into this module.
    pub(crate) fn compile_root(&mut self, doc: &Rc<Document>) -> Result<(), CompileError> {
        let root = Node::root(doc);
        let element = root
            .child_elements()
            .next()
            .ok_or_else(|| CompileError::UnexpectedNode("empty stylesheet document".to_string()))?;
        let location = element.location().copied();
        let is_stylesheet = element
            .node_name()
            .is_some_and(|name| name.is(Some(XSLT_NAMESPACE), "stylesheet") || name.is(Some(XSLT_NAMESPACE), "transform"));
        if !is_stylesheet {
            return Err(CompileError::UnexpectedNode(element_name(&element)).at(location));
        }

        let saved_base = std::mem::replace(&mut self.base_uri, doc.base_uri().map(Arc::from));
        let version = required(&element, "version").map_err(|err| err.at(location))?;
        let saved_fc = std::mem::replace(&mut self.forwards_compatible, version.trim() != "1.0");
        if self.forwards_compatible {
            self.builder.forwards_compatible = true;
            log::debug!("Stylesheet version {} is compiled in forwards-compatible mode", version);
        }

        let result = self
            .scope_for(&element, &Arc::new(Namespaces::new()), None)
            .map_err(|err| err.at(location))
            .and_then(|namespaces| self.compile_top_level(&element, &namespaces));

        self.base_uri = saved_base;
        self.forwards_compatible = saved_fc;
        result
    }

    /// The namespace scope of `element`: the parent's bindings plus its own declarations,
    /// and the URIs its exclusion attributes name. `in_namespace` selects the XSLT-namespaced
    /// attribute names used on literal result elements.
    pub(crate) fn scope_for(
        &self,
        element: &Node,
        parent: &Arc<Namespaces>,
        in_namespace: Option<&str>,
    ) -> Result<Arc<Namespaces>, CompileError> {
        let doc = element.document();
        let declarations = doc.namespaces(element.id());
        let mut excluded: Vec<String> = Vec::new();
        for attribute in ["exclude-result-prefixes", "extension-element-prefixes"] {
            if let Some(value) = doc.attribute(element.id(), in_namespace, attribute) {
                excluded.extend(value.split_whitespace().map(str::to_string));
            }
        }
        if declarations.is_empty() && excluded.is_empty() {
            return Ok(Arc::clone(parent));
        }
        let excluded: Vec<&str> = excluded.iter().map(String::as_str).collect();
        Ok(Arc::new(parent.extended(declarations, &excluded)?))
    }

    pub(crate) fn expression(&mut self, text: &str) -> Result<Arc<Expression>, CompileError> {
        self.compiler.expression(text)
    }
}

/// The qualified name of an element, for diagnostics.
pub(crate) fn element_name(node: &Node) -> String {
    node.node_name().map(|name| name.qualified()).unwrap_or_default()
}

/// The value of an attribute in no namespace.
pub(crate) fn optional(node: &Node, attribute: &str) -> Option<String> {
    node.document()
        .attribute(node.id(), None, attribute)
        .map(str::to_string)
}

pub(crate) fn required(node: &Node, attribute: &str) -> Result<String, CompileError> {
    optional(node, attribute).ok_or_else(|| CompileError::required(attribute, &element_name(node)))
}

/// A `yes`/`no` attribute.
pub(crate) fn optional_flag(node: &Node, attribute: &str) -> Result<Option<bool>, CompileError> {
    match optional(node, attribute).as_deref().map(str::trim) {
        None => Ok(None),
        Some("yes") => Ok(Some(true)),
        Some("no") => Ok(Some(false)),
        Some(other) => Err(CompileError::invalid_value(attribute, other, "expected 'yes' or 'no'")),
    }
}

/// Whether `node` is the XSLT element `local_name`.
pub(crate) fn is_xslt(node: &Node, local_name: &str) -> bool {
    node.node_name().is_some_and(|name| name.is(Some(XSLT_NAMESPACE), local_name))
}
