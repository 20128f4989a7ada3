#![allow(dead_code)]

use std::rc::Rc;
use trellis::{Compiler, Document, DocumentProvider, Processor, Transformation};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const XSL_HEADER: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">"#;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Wraps top-level declarations in a stylesheet that writes XML without a declaration.
pub fn stylesheet(declarations: &str) -> String {
    format!(
        "{}<xsl:output omit-xml-declaration=\"yes\"/>{}</xsl:stylesheet>",
        XSL_HEADER, declarations
    )
}

/// Wraps top-level declarations in a stylesheet with text output.
pub fn text_stylesheet(declarations: &str) -> String {
    format!("{}<xsl:output method=\"text\"/>{}</xsl:stylesheet>", XSL_HEADER, declarations)
}

pub fn parse(source: &str) -> Result<Rc<Document>, trellis::Error> {
    Ok(Rc::new(Document::parse_str(source)?))
}

/// Compiles `stylesheet` and applies it to `source`, returning the serialized result.
pub fn transform(stylesheet: &str, source: &str) -> Result<String, trellis::Error> {
    init_logging();
    trellis::transform_str(stylesheet, source)
}

/// Like [`transform`], resolving imports and `document()` through `provider`.
pub fn transform_with_provider(
    provider: Rc<DocumentProvider>,
    stylesheet: &str,
    base_uri: Option<&str>,
    source: &str,
) -> Result<Transformation, trellis::Error> {
    init_logging();
    let compiled = Compiler::with_provider(Rc::clone(&provider)).compile_str(stylesheet, base_uri)?;
    let document = parse(source)?;
    Ok(Processor::new(compiled).with_provider(provider).transform(&document)?)
}
