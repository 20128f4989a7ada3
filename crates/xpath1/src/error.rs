use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    #[error("XPath parse error in '{expression}' at offset {offset}: {message}")]
    ParseError {
        expression: String,
        offset: usize,
        message: String,
    },

    #[error("Function '{function}' error: {message}")]
    FunctionError { function: String, message: String },

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Unknown function '{0}()'")]
    UnknownFunction(String),

    #[error("Variable '{0}' not found")]
    UnknownVariable(String),

    #[error("Namespace prefix '{0}' is not bound")]
    UnknownPrefix(String),
}

impl XPathError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        XPathError::TypeError(message.into())
    }
}
