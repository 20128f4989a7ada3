//! The execution context threaded through instruction execution, and the state shared by
//! every context of one transformation.

use crate::ast::{Instruction, Mode, Template};
use crate::config::TransformConfig;
use crate::error::TransformError;
use crate::provider::DocumentProvider;
use crate::qname::Namespaces;
use crate::sink::ResultSink;
use crate::stylesheet::{ScopeId, Stylesheet};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use trellis_tree::{DocumentId, Node, NodeId};
use trellis_xpath1::{Environment, EvaluationContext, ExpandedName, Expression, FunctionTable, XPathError, XPathValue};

pub type Value = XPathValue<Node>;

/// What invoked the template currently executing. `xsl:apply-imports` continues the same
/// invocation in lower-precedence modules.
#[derive(Debug, Clone, PartialEq)]
pub enum Cause {
    /// Top level, or inside `xsl:for-each`.
    None,
    Mode(Mode),
    Named(ExpandedName),
}

pub(crate) type MatchKey = (ScopeId, DocumentId, Mode);
pub(crate) type MatchTable = Rc<HashMap<NodeId, Arc<Template>>>;
pub(crate) type KeyIndex = Rc<HashMap<String, Vec<Node>>>;

/// State shared by every context of one transformation.
pub struct TransformState {
    pub stylesheet: Arc<Stylesheet>,
    pub config: TransformConfig,
    pub provider: Rc<DocumentProvider>,
    pub functions: Rc<FunctionTable<ExecutionContext>>,
    pub(crate) globals: RefCell<HashMap<ExpandedName, Value>>,
    pub(crate) messages: RefCell<Vec<String>>,
    pub(crate) match_cache: RefCell<HashMap<MatchKey, MatchTable>>,
    pub(crate) keys: RefCell<HashMap<(DocumentId, ExpandedName), KeyIndex>>,
}

impl TransformState {
    pub fn new(
        stylesheet: Arc<Stylesheet>,
        config: TransformConfig,
        provider: Rc<DocumentProvider>,
        functions: Rc<FunctionTable<ExecutionContext>>,
    ) -> Self {
        Self {
            stylesheet,
            config,
            provider,
            functions,
            globals: RefCell::new(HashMap::new()),
            messages: RefCell::new(Vec::new()),
            match_cache: RefCell::new(HashMap::new()),
            keys: RefCell::new(HashMap::new()),
        }
    }

    /// Whether `scope` is the stylesheet the transformation started from.
    pub fn is_top_level(&self, scope: &Stylesheet) -> bool {
        self.stylesheet.id() == scope.id()
    }

    pub fn global(&self, name: &ExpandedName) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub(crate) fn set_global(&self, name: ExpandedName, value: Value) {
        self.globals.borrow_mut().insert(name, value);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    pub(crate) fn add_message(&self, message: String) {
        self.messages.borrow_mut().push(message);
    }
}

/// The dynamic context of instruction execution.
///
/// Contexts are copied, never shared: a copy gets its own variable map and shares the
/// result sink, the current scope and the transformation state with its origin.
#[derive(Clone)]
pub struct ExecutionContext {
    nodes: Rc<[Node]>,
    /// 1-based index into `nodes`.
    position: usize,
    pub(crate) variables: HashMap<ExpandedName, Value>,
    pub(crate) namespaces: Arc<Namespaces>,
    pub(crate) result: ResultSink,
    pub(crate) cause: Cause,
    /// Parameters passed to the template being instantiated.
    pub(crate) params: Rc<HashMap<ExpandedName, Value>>,
    /// Set while running `xsl:fallback` for an unsupported instruction.
    pub(crate) fallback: bool,
    pub(crate) base_uri: Option<Arc<str>>,
    /// The module that declared the executing template.
    pub(crate) scope: Arc<Stylesheet>,
    pub(crate) state: Rc<TransformState>,
    pub(crate) depth: usize,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("node", self.node())
            .field("position", &self.position)
            .field("size", &self.size())
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("cause", &self.cause)
            .field("depth", &self.depth)
            .finish()
    }
}

impl ExecutionContext {
    /// The top-level context of a transformation, focused on `node`.
    pub fn new(state: Rc<TransformState>, node: Node, result: ResultSink) -> Self {
        Self {
            nodes: Rc::from(vec![node]),
            position: 1,
            variables: HashMap::new(),
            namespaces: Arc::new(Namespaces::new()),
            result,
            cause: Cause::None,
            params: Rc::new(HashMap::new()),
            fallback: false,
            base_uri: state.stylesheet.base_uri().map(Arc::from),
            scope: Arc::clone(&state.stylesheet),
            state,
            depth: 0,
        }
    }

    pub fn node(&self) -> &Node {
        &self.nodes[self.position - 1]
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &Rc<[Node]> {
        &self.nodes
    }

    pub fn state(&self) -> &Rc<TransformState> {
        &self.state
    }

    pub fn scope(&self) -> &Arc<Stylesheet> {
        &self.scope
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn result(&self) -> &ResultSink {
        &self.result
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// A copy focused on `nodes[position - 1]`. `nodes` must not be empty.
    pub fn with_nodes(&self, nodes: Rc<[Node]>, position: usize) -> Self {
        debug_assert!(position >= 1 && position <= nodes.len());
        let mut next = self.clone();
        next.nodes = nodes;
        next.position = position;
        next
    }

    /// A copy focused on a single node.
    pub fn with_node(&self, node: Node) -> Self {
        self.with_nodes(Rc::from(vec![node]), 1)
    }

    pub fn with_result(&self, result: ResultSink) -> Self {
        let mut next = self.clone();
        next.result = result;
        next
    }

    /// A copy one level deeper, failing once the configured depth is exceeded.
    pub fn enter(&self) -> Result<Self, TransformError> {
        let max_depth = self.state.config.max_depth;
        if self.depth >= max_depth {
            return Err(TransformError::RecursionLimit(max_depth));
        }
        let mut next = self.clone();
        next.depth += 1;
        Ok(next)
    }

    /// Drops local variables, leaving only globals visible.
    pub fn reset_variables(&mut self) {
        self.variables.clear();
    }

    pub fn bind(&mut self, name: ExpandedName, value: Value) {
        self.variables.insert(name, value);
    }

    /// Runs `f` with the static context of `instruction` installed, restoring the previous
    /// one afterwards.
    pub(crate) fn with_static<T>(&mut self, instruction: &Instruction, f: impl FnOnce(&mut Self) -> T) -> T {
        let namespaces = std::mem::replace(&mut self.namespaces, Arc::clone(&instruction.namespaces));
        let base_uri = match &instruction.base_uri {
            Some(uri) => std::mem::replace(&mut self.base_uri, Some(Arc::clone(uri))),
            None => self.base_uri.clone(),
        };
        let result = f(self);
        self.namespaces = namespaces;
        self.base_uri = base_uri;
        result
    }

    pub fn evaluate(&self, expr: &Expression) -> Result<Value, XPathError> {
        let e_ctx = EvaluationContext::new(self.node().clone(), self.position, self.size(), self);
        trellis_xpath1::evaluate(expr, &e_ctx)
    }

    pub fn evaluate_string(&self, expr: &Expression) -> Result<String, XPathError> {
        Ok(self.evaluate(expr)?.to_string())
    }

    pub fn evaluate_node_set(&self, expr: &Expression, what: &str) -> Result<Vec<Node>, XPathError> {
        self.evaluate(expr)?.into_node_set(what)
    }
}

impl Environment for ExecutionContext {
    type Node = Node;

    fn functions(&self) -> &FunctionTable<Self> {
        &self.state.functions
    }

    fn variable(&self, name: &ExpandedName) -> Option<Value> {
        self.variables
            .get(name)
            .cloned()
            .or_else(|| self.state.global(name))
    }

    fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix)
    }
}
