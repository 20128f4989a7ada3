//! # trellis
//!
//! An XPath 1.0 expression engine and an XSLT 1.0 rule-resolution engine.
//!
//! The work is split across three crates, re-exported here:
//!
//! - [`xpath`] (`trellis-xpath1`) parses and evaluates expressions over any tree that
//!   implements [`DataSourceNode`].
//! - [`tree`] (`trellis-tree`) is the arena document model: parsing, construction,
//!   whitespace stripping and serialization.
//! - [`xslt`] (`trellis-xslt`) compiles stylesheets into import-precedence scope trees and
//!   runs them against documents.
//!
//! ```no_run
//! let out = trellis::transform_str(
//!     r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
//!          <xsl:output method="text"/>
//!          <xsl:template match="/"><xsl:value-of select="count(//item)"/></xsl:template>
//!        </xsl:stylesheet>"#,
//!     "<list><item/><item/></list>",
//! )?;
//! assert_eq!(out, "2");
//! # Ok::<(), trellis::Error>(())
//! ```

use std::rc::Rc;
use thiserror::Error;

pub use trellis_tree as tree;
pub use trellis_xpath1 as xpath;
pub use trellis_xslt as xslt;

pub use trellis_tree::{Document, Node, OutputSettings, TreeError};
pub use trellis_xpath1::{DataSourceNode, ExpandedName, XPathError, XPathValue};
pub use trellis_xslt::{
    CompileError, Compiler, DocumentProvider, Processor, Stylesheet, TransformConfig, TransformError,
    Transformation, Value,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Stylesheet compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Transformation failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Document error: {0}")]
    Tree(#[from] TreeError),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Reads a JSON [`TransformConfig`] from `path`. Fields left out take their defaults.
pub fn load_config(path: &str) -> Result<TransformConfig, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| TreeError::Io {
        path: path.to_string(),
        source,
    })?;
    let config = TransformConfig::from_json(&text)?;
    log::debug!("Loaded configuration from '{}'", path);
    Ok(config)
}

/// Compiles `stylesheet`, applies it to `source` and serializes the result with the
/// stylesheet's output settings.
pub fn transform_str(stylesheet: &str, source: &str) -> Result<String, Error> {
    transform_str_with_config(stylesheet, source, TransformConfig::default())
}

pub fn transform_str_with_config(stylesheet: &str, source: &str, config: TransformConfig) -> Result<String, Error> {
    let compiled = Compiler::new().with_config(&config).compile_str(stylesheet, None)?;
    let document = Rc::new(Document::parse_str(source)?);
    log::debug!("Running stylesheet over document {}", document.id());
    let result = Processor::new(compiled).with_config(config).transform(&document)?;
    for message in &result.messages {
        log::debug!("Stylesheet message: {}", message);
    }
    Ok(result.serialize()?)
}
