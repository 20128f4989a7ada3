//! Rule selection and invocation over the import precedence chain.
//!
//! Each module matches its own rule table against a whole document once per mode and
//! caches the node-to-template assignment. Selection then tries the module's own
//! assignment, then its imports in descending precedence, and only the top-level module
//! falls back to the built-in rules.

use crate::ast::{Mode, Template};
use crate::context::{Cause, ExecutionContext, MatchTable};
use crate::error::TransformError;
use crate::executor::execute_body;
use crate::sink::ResultItem;
use crate::stylesheet::Stylesheet;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use trellis_tree::Node;
use trellis_xpath1::{DataSourceNode, EvaluationContext, ExpandedName, NodeType};

impl Stylesheet {
    /// Ensures this module and every module it imports have matched the context node's
    /// document in `mode`.
    pub fn init_mode(self: &Arc<Self>, ctx: &ExecutionContext, mode: &Mode) -> Result<(), TransformError> {
        let key = (self.id(), ctx.node().document().id(), mode.clone());
        if !ctx.state.match_cache.borrow().contains_key(&key) {
            let table = self.match_all(ctx, mode)?;
            ctx.state.match_cache.borrow_mut().insert(key, table);
        }
        for import in self.imports() {
            import.init_mode(ctx, mode)?;
        }
        Ok(())
    }

    /// Matches every rule of `mode` against the context node's document. Rules are tried in
    /// ascending priority so a later assignment (higher priority, or equal priority and
    /// declared later) replaces an earlier one.
    pub fn match_all(self: &Arc<Self>, ctx: &ExecutionContext, mode: &Mode) -> Result<MatchTable, TransformError> {
        let mut assigned: HashMap<_, Arc<Template>> = HashMap::new();
        let root = ctx.node().root();
        for entry in self.rules(mode) {
            let mut env = ctx.with_node(root.clone());
            env.reset_variables();
            env.namespaces = Arc::clone(&entry.template.namespaces);
            let e_ctx = EvaluationContext::new(root.clone(), 1, 1, &env);
            for node in entry.pattern.select_all(&e_ctx)? {
                assigned.insert(node.id(), Arc::clone(&entry.template));
            }
        }
        log::debug!(
            "Matched {} rules of mode {} in document {}: {} nodes assigned",
            self.rules(mode).len(),
            describe_mode(mode),
            root.document().id(),
            assigned.len()
        );
        Ok(Rc::new(assigned))
    }

    fn matched_template(&self, ctx: &ExecutionContext, mode: &Mode) -> Option<Arc<Template>> {
        let node = ctx.node();
        let key = (self.id(), node.document().id(), mode.clone());
        let cache = ctx.state.match_cache.borrow();
        cache.get(&key).and_then(|table| table.get(&node.id()).cloned())
    }

    /// Applies templates to each node of the context's node list, in order.
    pub fn apply_templates(self: &Arc<Self>, ctx: &ExecutionContext, mode: &Mode) -> Result<(), TransformError> {
        for position in 1..=ctx.size() {
            let mut item = ctx.with_nodes(Rc::clone(ctx.nodes()), position);
            self.apply_templates_impl(&mut item, mode)?;
        }
        Ok(())
    }

    /// Applies the best rule for the context node. Returns `false` when no rule of this
    /// module or its imports matched and this is not the top-level module.
    pub fn apply_templates_impl(self: &Arc<Self>, ctx: &mut ExecutionContext, mode: &Mode) -> Result<bool, TransformError> {
        self.init_mode(ctx, mode)?;
        ctx.cause = Cause::Mode(mode.clone());
        if let Some(template) = self.matched_template(ctx, mode) {
            log::trace!("{:?} matched {}", ctx.node(), template.describe());
            self.instantiate(ctx, &template)?;
            return Ok(true);
        }
        if self.apply_imports(ctx)? {
            return Ok(true);
        }
        if !ctx.state.is_top_level(self) {
            return Ok(false);
        }
        apply_builtin(ctx, mode)?;
        Ok(true)
    }

    /// Continues the current invocation in the imported modules, highest precedence first.
    /// Returns `false` when there is no current invocation or no import handles it.
    pub fn apply_imports(self: &Arc<Self>, ctx: &mut ExecutionContext) -> Result<bool, TransformError> {
        match ctx.cause.clone() {
            Cause::None => Ok(false),
            Cause::Mode(mode) => {
                for import in self.imports() {
                    if import.apply_templates_impl(ctx, &mode)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Cause::Named(name) => {
                for import in self.imports() {
                    if import.call_template(ctx, &name)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Instantiates the template named `name` declared in this module or, failing that, in
    /// an import. Only the top-level module reports a missing template as an error.
    pub fn call_template(self: &Arc<Self>, ctx: &mut ExecutionContext, name: &ExpandedName) -> Result<bool, TransformError> {
        ctx.cause = Cause::Named(name.clone());
        if let Some(template) = self.named_template(name) {
            let template = Arc::clone(template);
            self.instantiate(ctx, &template)?;
            return Ok(true);
        }
        if self.apply_imports(ctx)? {
            return Ok(true);
        }
        if ctx.state.is_top_level(self) {
            return Err(TransformError::NotFound(name.to_string()));
        }
        Ok(false)
    }

    /// Runs a template body in a fresh variable scope, with this module as the current
    /// scope. The caller's cause and parameters carry over.
    pub fn instantiate(self: &Arc<Self>, ctx: &ExecutionContext, template: &Template) -> Result<(), TransformError> {
        let mut inner = ctx.enter()?;
        inner.reset_variables();
        inner.scope = Arc::clone(self);
        inner.namespaces = Arc::clone(&template.namespaces);
        inner.fallback = false;
        execute_body(&template.body, &mut inner)
    }

    /// Adds the attributes of the sets named `name`: imported sets first, lowest precedence
    /// first, then this module's, so the highest-precedence value of an attribute wins.
    /// Returns whether any set of that name exists.
    pub fn instantiate_attribute_set(self: &Arc<Self>, ctx: &ExecutionContext, name: &ExpandedName) -> Result<bool, TransformError> {
        let mut found = false;
        for import in self.imports().iter().rev() {
            found |= import.instantiate_attribute_set(ctx, name)?;
        }
        for set in self.attribute_sets(name) {
            found = true;
            let mut inner = ctx.enter()?;
            inner.reset_variables();
            inner.namespaces = Arc::clone(&set.namespaces);
            for used in &set.use_attribute_sets {
                use_attribute_set(&inner, used)?;
            }
            execute_body(&set.body, &mut inner)?;
        }
        Ok(found)
    }
}

/// Instantiates a named attribute set starting from the top-level module.
pub(crate) fn use_attribute_set(ctx: &ExecutionContext, name: &ExpandedName) -> Result<(), TransformError> {
    let top = Arc::clone(&ctx.state.stylesheet);
    if top.instantiate_attribute_set(ctx, name)? {
        Ok(())
    } else {
        Err(TransformError::NotFound(format!("attribute-set {}", name)))
    }
}

/// The built-in template rules: elements and the root apply templates to their children
/// in the same mode; text and attributes copy their value; comments and processing
/// instructions produce nothing.
pub(crate) fn apply_builtin(ctx: &ExecutionContext, mode: &Mode) -> Result<(), TransformError> {
    let node = ctx.node();
    match node.node_type() {
        NodeType::Root | NodeType::Element => {
            let children: Vec<Node> = node.children().collect();
            if children.is_empty() {
                return Ok(());
            }
            let mut inner = ctx.enter()?;
            inner.params = Rc::new(HashMap::new());
            let inner = inner.with_nodes(Rc::from(children), 1);
            let top = Arc::clone(&ctx.state.stylesheet);
            top.apply_templates(&inner, mode)
        }
        NodeType::Text | NodeType::Attribute => ctx.result.push(ResultItem::Text(node.string_value())),
        NodeType::Comment | NodeType::ProcessingInstruction => Ok(()),
    }
}

pub(crate) fn describe_mode(mode: &Mode) -> String {
    match mode {
        Some(name) => name.to_string(),
        None => "#default".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::config::TransformConfig;
    use crate::context::TransformState;
    use crate::functions::xslt_functions;
    use crate::provider::DocumentProvider;
    use crate::sink::ResultSink;
    use trellis_tree::Document;

    #[test]
    fn test_match_tables_are_cached_per_document() {
        let provider = Rc::new(DocumentProvider::new());
        provider.insert("a.xml", "<list><entry>a1</entry><entry>a2</entry></list>");
        provider.insert("b.xml", "<list><entry>b1</entry></list>");
        let sheet = Compiler::new()
            .compile_str(
                r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                     <xsl:template match="/">
                       <xsl:apply-templates select="document('a.xml')//entry"/>
                       <xsl:apply-templates select="document('b.xml')//entry"/>
                       <xsl:apply-templates select="document('a.xml')//entry"/>
                     </xsl:template>
                     <xsl:template match="entry">[<xsl:value-of select="."/>]</xsl:template>
                   </xsl:stylesheet>"#,
                None,
            )
            .unwrap();
        let source = Rc::new(Document::parse_str("<start/>").unwrap());
        let state = Rc::new(TransformState::new(
            Arc::clone(&sheet),
            TransformConfig::default(),
            Rc::clone(&provider),
            Rc::new(xslt_functions()),
        ));
        let sink = ResultSink::fragment();
        let ctx = ExecutionContext::new(Rc::clone(&state), Node::root(&source), sink.clone());
        sheet.apply_templates(&ctx, &None).unwrap();

        assert_eq!(sink.string_value(), "[a1][a2][b1][a1][a2]");

        // One table per document in the default mode: the source, a.xml and b.xml.
        let cache = state.match_cache.borrow();
        assert_eq!(cache.len(), 3);
        let options = trellis_tree::ParseOptions::default();
        for uri in ["a.xml", "b.xml"] {
            let doc = provider.load(uri, &options).unwrap();
            let table = &cache[&(sheet.id(), doc.id(), None)];
            let entries = Node::root(&doc)
                .first_child()
                .map(|list| list.children().count())
                .unwrap_or_default();
            // "/" assigns the document root as well.
            assert_eq!(table.len(), entries + 1);
        }
    }
}
