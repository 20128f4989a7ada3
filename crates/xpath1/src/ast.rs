//! Defines the Abstract Syntax Tree (AST) for XPath 1.0 expressions.

use crate::name::QualifiedName;
use std::fmt;

/// The top-level expression that can be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    LocationPath(LocationPath),
    Variable(QualifiedName),
    FunctionCall {
        name: QualifiedName,
        args: Vec<Expression>,
    },
    /// A primary expression filtered by predicates, like `$items[2]` or `(a | b)[last()]`.
    Filter {
        primary: Box<Expression>,
        predicates: Vec<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
}

impl Expression {
    /// Checks if the expression is a `LocationPath` variant.
    pub fn is_location_path(&self) -> bool {
        matches!(self, Expression::LocationPath(_))
    }

    /// Checks if the expression is a `BinaryOp` variant.
    pub fn is_binary_op(&self) -> bool {
        matches!(self, Expression::BinaryOp { .. })
    }

    /// Checks if the expression is a union at its top level.
    pub fn is_union(&self) -> bool {
        matches!(
            self,
            Expression::BinaryOp {
                op: BinaryOperator::Union,
                ..
            }
        )
    }
}

/// A unary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
}

/// A binary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // Equality
    Equals,
    NotEquals,
    // Relational
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Additive
    Plus,
    Minus,
    // Multiplicative
    Multiply,
    Divide,
    Modulo,
    // Set
    Union,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Or => "or",
            BinaryOperator::And => "and",
            BinaryOperator::Equals => "=",
            BinaryOperator::NotEquals => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "div",
            BinaryOperator::Modulo => "mod",
            BinaryOperator::Union => "|",
        }
    }
}

/// Represents a full location path, like `/child::foo`, `descendant::bar[1]`, or `$var/item`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    /// An optional starting expression, for paths like `$var/foo` or `func()/foo`.
    /// If `None`, the path starts from the context node or root.
    pub start_point: Option<Box<Expression>>,
    /// True if the path starts from the document root (e.g., `/foo`).
    /// Meaningless if `start_point` is `Some`.
    pub is_absolute: bool,
    pub steps: Vec<Step>,
}

/// Represents a single step in a location path, like `child::foo[position() > 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
}

impl Step {
    pub fn new(axis: Axis, node_test: NodeTest) -> Self {
        Self {
            axis,
            node_test,
            predicates: vec![],
        }
    }

    /// The `descendant-or-self::node()` step that `//` abbreviates.
    pub fn descendant_or_self_node() -> Self {
        Self::new(Axis::DescendantOrSelf, NodeTest::NodeType(NodeTypeTest::Node))
    }
}

/// The axis of movement from the context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Namespace,
}

impl Axis {
    pub fn name(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Attribute => "attribute",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::SelfAxis => "self",
            Axis::FollowingSibling => "following-sibling",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Following => "following",
            Axis::Preceding => "preceding",
            Axis::Namespace => "namespace",
        }
    }
}

/// A test to apply to nodes on a given axis to see if they should be included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// A qualified name test (e.g., `foo`, `xsl:if`).
    Name(QualifiedName),
    /// A wildcard test (`*`), matching any name in any namespace.
    Wildcard,
    /// A namespace wildcard (`xsl:*`), holding the prefix.
    NamespaceWildcard(String),
    /// A node type test (e.g., `text()`, `node()`).
    NodeType(NodeTypeTest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTypeTest {
    Text,
    Node,
    Comment,
    /// `processing-instruction()` with an optional literal target.
    ProcessingInstruction(Option<String>),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(s) if s.contains('\'') => write!(f, "\"{}\"", s),
            Expression::Literal(s) => write!(f, "'{}'", s),
            Expression::Number(n) => write!(f, "{}", n),
            Expression::LocationPath(path) => write!(f, "{}", path),
            Expression::Variable(name) => write!(f, "${}", name),
            Expression::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Filter { primary, predicates } => {
                write!(f, "({})", primary)?;
                for predicate in predicates {
                    write!(f, "[{}]", predicate)?;
                }
                Ok(())
            }
            Expression::BinaryOp { left, op, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expression::UnaryOp { expr, .. } => write!(f, "(-{})", expr),
        }
    }
}

impl fmt::Display for LocationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = &self.start_point {
            write!(f, "{}", start)?;
            for step in &self.steps {
                write!(f, "/{}", step)?;
            }
            return Ok(());
        }
        if self.is_absolute {
            write!(f, "/")?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.axis.name(), self.node_test)?;
        for predicate in &self.predicates {
            write!(f, "[{}]", predicate)?;
        }
        Ok(())
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Name(name) => write!(f, "{}", name),
            NodeTest::Wildcard => write!(f, "*"),
            NodeTest::NamespaceWildcard(prefix) => write!(f, "{}:*", prefix),
            NodeTest::NodeType(NodeTypeTest::Text) => write!(f, "text()"),
            NodeTest::NodeType(NodeTypeTest::Node) => write!(f, "node()"),
            NodeTest::NodeType(NodeTypeTest::Comment) => write!(f, "comment()"),
            NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(None)) => {
                write!(f, "processing-instruction()")
            }
            NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(Some(target))) => {
                write!(f, "processing-instruction('{}')", target)
            }
        }
    }
}
