//! XSLT 1.0 rule-resolution engine over `trellis-tree` documents.
//!
//! A [`Compiler`] turns stylesheet text into an immutable, shareable [`Stylesheet`] scope
//! tree. A [`Processor`] applies it to source documents: templates are selected by pattern
//! and priority within each scope, then by import precedence across scopes, and their
//! instructions write into a result tree fragment.

pub mod ast;
pub mod avt;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod functions;
pub mod matcher;
pub mod pattern;
pub mod processor;
pub mod provider;
pub mod qname;
pub mod sink;
pub mod stylesheet;

mod compiler_handlers;
mod executor_handlers;

pub use compiler::Compiler;
pub use config::TransformConfig;
pub use context::{Cause, ExecutionContext, TransformState, Value};
pub use error::{CompileError, TransformError};
pub use functions::xslt_functions;
pub use pattern::Pattern;
pub use processor::{Processor, Transformation};
pub use provider::DocumentProvider;
pub use qname::{Namespaces, XSLT_NAMESPACE};
pub use sink::{ResultItem, ResultSink};
pub use stylesheet::{OutputDeclaration, Stylesheet};
