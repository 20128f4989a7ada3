//! XPath 1.0: parser, evaluator, axes and the core function library, written against the
//! [`DataSourceNode`] tree-adapter trait.

pub mod ast;
pub mod axes;
pub mod cache;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod functions;
pub mod name;
pub mod operators;
pub mod order;
pub mod parser;

pub use ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, NodeTypeTest, Step};
pub use cache::ExpressionCache;
pub use datasource::{DataSourceNode, NodeType, QName, XML_NAMESPACE};
pub use engine::{Environment, EvaluationContext, StaticEnvironment, XPathValue, evaluate};
pub use functions::{Function, FunctionTable};
pub use name::{ExpandedName, QualifiedName};

// Re-export test utilities for integration testing in downstream crates
pub use datasource::tests;
pub use error::XPathError;
pub use parser::parse_expression;
