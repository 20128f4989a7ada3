//! Loads and memoizes documents by URI for `xsl:import`, `xsl:include` and `document()`.
//!
//! Documents registered with [`DocumentProvider::insert`] are served from memory; any other
//! URI is read from the filesystem (`file://` URIs and plain paths).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use trellis_tree::{Document, ParseOptions, TreeError};

#[derive(Debug, Default)]
pub struct DocumentProvider {
    sources: RefCell<HashMap<String, String>>,
    documents: RefCell<HashMap<String, Rc<Document>>>,
}

impl DocumentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers document text under `uri`. A previously loaded document for the same URI
    /// is forgotten.
    pub fn insert(&self, uri: impl Into<String>, text: impl Into<String>) {
        let uri = uri.into();
        self.documents.borrow_mut().remove(&uri);
        self.sources.borrow_mut().insert(uri, text.into());
    }

    /// Resolves `uri` against `base`. An empty URI is the base itself; an absolute URI or
    /// path is returned normalized; anything else is joined to the base's directory.
    pub fn resolve(&self, uri: &str, base: Option<&str>) -> String {
        if uri.is_empty() {
            return base.unwrap_or_default().to_string();
        }
        if is_absolute(uri) {
            return normalize(uri);
        }
        match base {
            Some(base) => {
                let directory = match base.rfind('/') {
                    Some(index) => &base[..=index],
                    None => "",
                };
                normalize(&format!("{}{}", directory, uri))
            }
            None => normalize(uri),
        }
    }

    /// The text of the document at `uri`.
    pub fn load_text(&self, uri: &str) -> Result<String, TreeError> {
        if let Some(text) = self.sources.borrow().get(uri) {
            return Ok(text.clone());
        }
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        log::debug!("Reading document '{}' from the filesystem", path);
        std::fs::read_to_string(path).map_err(|source| TreeError::Io {
            path: path.to_string(),
            source,
        })
    }

    /// The parsed document at `uri`. Repeated loads of one URI return the same document.
    pub fn load(&self, uri: &str, options: &ParseOptions<'_>) -> Result<Rc<Document>, TreeError> {
        if let Some(doc) = self.documents.borrow().get(uri) {
            return Ok(Rc::clone(doc));
        }
        let text = self.load_text(uri)?;
        let options = ParseOptions {
            strip_whitespace: options.strip_whitespace,
            keep_comments: options.keep_comments,
            keep_processing_instructions: options.keep_processing_instructions,
            base_uri: Some(uri.to_string()),
        };
        let doc = Rc::new(Document::parse_with(&text, &options)?);
        self.documents
            .borrow_mut()
            .insert(uri.to_string(), Rc::clone(&doc));
        Ok(doc)
    }
}

fn is_absolute(uri: &str) -> bool {
    uri.starts_with('/') || uri.contains("://") || has_scheme(uri)
}

fn has_scheme(uri: &str) -> bool {
    match uri.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Removes `.` segments and folds `..` segments into their parent, lexically.
fn normalize(uri: &str) -> String {
    let (prefix, path) = match uri.find("://") {
        Some(index) => {
            let after_scheme = index + 3;
            let path_start = uri[after_scheme..]
                .find('/')
                .map_or(uri.len(), |offset| after_scheme + offset);
            (&uri[..path_start], &uri[path_start..])
        }
        None => ("", uri),
    };

    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(&last) if last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let mut normalized = String::from(prefix);
    if absolute {
        normalized.push('/');
    }
    normalized.push_str(&itertools::join(&segments, "/"));
    if path.ends_with('/') && !segments.is_empty() {
        normalized.push('/');
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_relative_to_base_directory() {
        let provider = DocumentProvider::new();
        assert_eq!(provider.resolve("b.xsl", Some("/styles/a.xsl")), "/styles/b.xsl");
        assert_eq!(provider.resolve("../c.xml", Some("/styles/sub/a.xsl")), "/styles/c.xml");
        assert_eq!(provider.resolve("./d.xml", Some("a.xsl")), "d.xml");
        assert_eq!(
            provider.resolve("e.xml", Some("file:///data/x/a.xsl")),
            "file:///data/x/e.xml"
        );
        assert_eq!(provider.resolve("/abs/f.xml", Some("/styles/a.xsl")), "/abs/f.xml");
        assert_eq!(provider.resolve("", Some("/styles/a.xsl")), "/styles/a.xsl");
        assert_eq!(provider.resolve("g.xml", None), "g.xml");
    }

    #[test]
    fn test_in_memory_documents_are_memoized() {
        let provider = DocumentProvider::new();
        provider.insert("mem:data.xml", "<data/>");
        let first = provider.load("mem:data.xml", &ParseOptions::default()).unwrap();
        let second = provider.load("mem:data.xml", &ParseOptions::default()).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.base_uri(), Some("mem:data.xml"));
    }

    #[test]
    fn test_filesystem_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.xml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "<doc>on disk</doc>").unwrap();

        let provider = DocumentProvider::new();
        let uri = format!("file://{}", path.display());
        let doc = provider.load(&uri, &ParseOptions::default()).unwrap();
        assert_eq!(doc.string_value(doc.root()), "on disk");

        let missing = provider.load_text(&dir.path().join("nope.xml").display().to_string());
        assert!(matches!(missing, Err(TreeError::Io { .. })));
    }
}
