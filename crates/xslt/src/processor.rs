//! Runs compiled stylesheets against source documents.

use crate::config::TransformConfig;
use crate::context::{ExecutionContext, TransformState, Value};
use crate::error::TransformError;
use crate::executor::execute;
use crate::functions::xslt_functions;
use crate::provider::DocumentProvider;
use crate::sink::ResultSink;
use crate::stylesheet::Stylesheet;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use trellis_tree::{Document, Node, OutputSettings, serialize};
use trellis_xpath1::{ExpandedName, FunctionTable};

/// The outcome of one transformation.
#[derive(Debug)]
pub struct Transformation {
    /// The result tree, a fragment whose root holds the output.
    pub result: Rc<Document>,
    /// The text of every `xsl:message`, in the order they ran.
    pub messages: Vec<String>,
    pub output: OutputSettings,
}

impl Transformation {
    pub fn serialize(&self) -> Result<String, TransformError> {
        Ok(serialize(&self.result, &self.output)?)
    }
}

/// Applies one compiled stylesheet to any number of source documents.
pub struct Processor {
    stylesheet: Arc<Stylesheet>,
    config: TransformConfig,
    provider: Rc<DocumentProvider>,
    functions: Rc<FunctionTable<ExecutionContext>>,
}

impl Processor {
    pub fn new(stylesheet: Arc<Stylesheet>) -> Self {
        Self {
            stylesheet,
            config: TransformConfig::default(),
            provider: Rc::new(DocumentProvider::new()),
            functions: Rc::new(xslt_functions()),
        }
    }

    pub fn with_config(mut self, config: TransformConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads `document()` targets through `provider`.
    pub fn with_provider(mut self, provider: Rc<DocumentProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn stylesheet(&self) -> &Arc<Stylesheet> {
        &self.stylesheet
    }

    pub fn transform(&self, source: &Rc<Document>) -> Result<Transformation, TransformError> {
        self.transform_with_params(source, HashMap::new())
    }

    /// Transforms `source`, binding top-level `xsl:param`s from `params`.
    pub fn transform_with_params(
        &self,
        source: &Rc<Document>,
        params: HashMap<ExpandedName, Value>,
    ) -> Result<Transformation, TransformError> {
        let source = self.prepare_source(source);
        let state = Rc::new(TransformState::new(
            Arc::clone(&self.stylesheet),
            self.config.clone(),
            Rc::clone(&self.provider),
            Rc::clone(&self.functions),
        ));
        let sink = ResultSink::fragment();
        let ctx = ExecutionContext::new(Rc::clone(&state), Node::root(&source), sink.clone());

        self.bind_globals(&ctx, params)?;
        log::debug!("Transforming document {}", source.id());
        self.stylesheet.apply_templates(&ctx, &None)?;
        drop(ctx);

        Ok(Transformation {
            result: sink.into_document()?,
            messages: state.messages(),
            output: self.stylesheet.output().settings(),
        })
    }

    /// Transforms `source` and serializes the result with the stylesheet's output settings.
    pub fn transform_to_string(&self, source: &Rc<Document>) -> Result<String, TransformError> {
        self.transform(source)?.serialize()
    }

    /// A whitespace-stripped copy of `source` when the stylesheet asks for one.
    fn prepare_source(&self, source: &Rc<Document>) -> Rc<Document> {
        if !self.config.strip_source_whitespace || !self.stylesheet.has_whitespace_rules() {
            return Rc::clone(source);
        }
        let stylesheet = &self.stylesheet;
        Rc::new(source.strip_whitespace(&|name: &ExpandedName| stylesheet.strips_whitespace(name)))
    }

    /// Evaluates global variables and parameters in merged declaration order. A parameter
    /// passed by the caller replaces the declared default.
    fn bind_globals(&self, ctx: &ExecutionContext, mut params: HashMap<ExpandedName, Value>) -> Result<(), TransformError> {
        for global in self.stylesheet.global_variables() {
            if global.is_param()
                && let Some(value) = params.remove(&global.name)
            {
                ctx.state.set_global(global.name.clone(), value);
                continue;
            }
            let mut scope = ctx.copy();
            scope.reset_variables();
            execute(&global.instruction, &mut scope)?;
            let value = scope
                .variables
                .remove(&global.name)
                .unwrap_or_else(|| Value::String(String::new()));
            ctx.state.set_global(global.name.clone(), value);
        }
        Ok(())
    }
}
