use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("XML parsing error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Serialization error: {0}")]
    Write(String),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid tree operation: {0}")]
    InvalidOperation(String),
}
