use thiserror::Error;
use trellis_tree::{Location, TreeError};
use trellis_xpath1::XPathError;

/// Errors raised while compiling a stylesheet.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("XPath error: {0}")]
    Parse(#[from] XPathError),

    #[error("Invalid qualified name '{0}'")]
    InvalidName(String),

    #[error("Namespace prefix '{0}' is not declared")]
    NamespaceNotFound(String),

    #[error("Duplicate declaration of '{0}'")]
    DuplicateName(String),

    #[error("Variable '{0}' is already bound in this scope")]
    VariableRedefinition(String),

    #[error("Attribute '{attribute}' is required on <{element}>")]
    AttributeRequired { attribute: String, element: String },

    #[error("Unexpected node <{0}>")]
    UnexpectedNode(String),

    #[error("Invalid value '{value}' for attribute '{attribute}': {reason}")]
    InvalidAttributeValue {
        attribute: String,
        value: String,
        reason: String,
    },

    #[error("Document error: {0}")]
    Document(#[from] TreeError),

    #[error("Stylesheet '{0}' is already being loaded")]
    CircularImport(String),

    #[error("{error} at {location}")]
    Located {
        error: Box<CompileError>,
        location: Location,
    },
}

impl CompileError {
    /// Attaches a source location unless one is already present.
    pub fn at(self, location: Option<Location>) -> Self {
        match (self, location) {
            (located @ CompileError::Located { .. }, _) => located,
            (error, Some(location)) => CompileError::Located {
                error: Box::new(error),
                location,
            },
            (error, None) => error,
        }
    }

    /// The underlying error without its location.
    pub fn kind(&self) -> &CompileError {
        match self {
            CompileError::Located { error, .. } => error.kind(),
            other => other,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            CompileError::Located { location, .. } => Some(*location),
            _ => None,
        }
    }

    pub(crate) fn required(attribute: &str, element: &str) -> Self {
        CompileError::AttributeRequired {
            attribute: attribute.to_string(),
            element: element.to_string(),
        }
    }

    pub(crate) fn invalid_value(attribute: &str, value: &str, reason: impl Into<String>) -> Self {
        CompileError::InvalidAttributeValue {
            attribute: attribute.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while running a transformation.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("XPath evaluation error: {0}")]
    XPath(#[from] XPathError),

    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Attribute '{0}' cannot be added after child content or outside an element")]
    UnexpectedAttribute(String),

    #[error("No template named '{0}'")]
    NotFound(String),

    #[error("Transformation terminated: {0}")]
    Terminate(String),

    #[error("Maximum template nesting depth of {0} exceeded")]
    RecursionLimit(usize),

    #[error("Document error: {0}")]
    Document(#[from] TreeError),

    #[error("Compilation error: {0}")]
    Compile(#[from] CompileError),

    #[error("Invalid name '{0}'")]
    InvalidName(String),

    #[error("Instruction <{0}> is not supported and has no fallback")]
    Unsupported(String),
}
