//! Namespace bindings of stylesheet elements and name resolution against them.

use crate::error::CompileError;
use trellis_xpath1::{ExpandedName, QualifiedName, XML_NAMESPACE};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// The namespace bindings in scope on a stylesheet element, plus the namespace URIs
/// excluded from literal result elements at that point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespaces {
    bindings: Vec<(Option<String>, String)>,
    excluded: Vec<String>,
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindings of a child element: these bindings, then `declarations`, then the URIs of
    /// `excluded_prefixes` (`#default` names the default namespace).
    pub fn extended(
        &self,
        declarations: &[(Option<String>, String)],
        excluded_prefixes: &[&str],
    ) -> Result<Self, CompileError> {
        let mut next = self.clone();
        next.bindings.extend(declarations.iter().cloned());
        for &prefix in excluded_prefixes {
            let uri = if prefix == "#default" {
                next.default_namespace().unwrap_or("").to_string()
            } else {
                next.get(prefix)
                    .ok_or_else(|| CompileError::NamespaceNotFound(prefix.to_string()))?
                    .to_string()
            };
            if !next.excluded.contains(&uri) {
                next.excluded.push(uri);
            }
        }
        Ok(next)
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == Some(prefix))
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// The default namespace. An empty declaration (`xmlns=""`) undeclares it.
    pub fn default_namespace(&self) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p.is_none())
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// Every binding visible here, innermost declaration winning, in first-declared order.
    pub fn in_scope(&self) -> Vec<(Option<&str>, &str)> {
        let mut seen: Vec<(Option<&str>, &str)> = Vec::new();
        for (prefix, uri) in &self.bindings {
            let prefix = prefix.as_deref();
            match seen.iter_mut().find(|(p, _)| *p == prefix) {
                Some(existing) => existing.1 = uri,
                None => seen.push((prefix, uri)),
            }
        }
        seen.retain(|(_, uri)| !uri.is_empty());
        seen
    }

    /// Whether a namespace URI is left off literal result elements. The XSLT namespace
    /// always is.
    pub fn is_excluded(&self, uri: &str) -> bool {
        uri == XSLT_NAMESPACE || self.excluded.iter().any(|excluded| excluded == uri)
    }

    /// Resolves a lexical QName. The default namespace applies only when `use_default`.
    pub fn resolve(&self, text: &str, use_default: bool) -> Result<ExpandedName, CompileError> {
        let name = QualifiedName::parse(text.trim()).ok_or_else(|| CompileError::InvalidName(text.to_string()))?;
        self.resolve_qualified(&name, use_default)
    }

    pub fn resolve_qualified(&self, name: &QualifiedName, use_default: bool) -> Result<ExpandedName, CompileError> {
        let uri = match &name.prefix {
            Some(prefix) => Some(
                self.get(prefix)
                    .ok_or_else(|| CompileError::NamespaceNotFound(prefix.clone()))?,
            ),
            None if use_default => self.default_namespace(),
            None => None,
        };
        Ok(ExpandedName::new(uri, &name.local_name))
    }
}

/// A name test from `xsl:strip-space` or `xsl:preserve-space`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `prefix:*`
    Namespace(String),
    Name(ExpandedName),
}

impl NameTest {
    pub fn parse(token: &str, namespaces: &Namespaces) -> Result<Self, CompileError> {
        if token == "*" {
            return Ok(NameTest::Any);
        }
        if let Some(prefix) = token.strip_suffix(":*") {
            let uri = namespaces
                .get(prefix)
                .ok_or_else(|| CompileError::NamespaceNotFound(prefix.to_string()))?;
            return Ok(NameTest::Namespace(uri.to_string()));
        }
        namespaces.resolve(token, false).map(NameTest::Name)
    }

    pub fn matches(&self, name: &ExpandedName) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Namespace(uri) => name.namespace_uri.as_deref() == Some(uri.as_str()),
            NameTest::Name(expected) => expected == name,
        }
    }

    /// Same scale as pattern default priorities.
    pub fn priority(&self) -> f64 {
        match self {
            NameTest::Any => -0.5,
            NameTest::Namespace(_) => -0.25,
            NameTest::Name(_) => 0.0,
        }
    }

    /// Whether every name matched by `other` is matched by this test.
    pub fn covers(&self, other: &NameTest) -> bool {
        match (self, other) {
            (NameTest::Any, _) => true,
            (NameTest::Namespace(a), NameTest::Namespace(b)) => a == b,
            (NameTest::Namespace(uri), NameTest::Name(name)) => name.namespace_uri.as_deref() == Some(uri.as_str()),
            (NameTest::Name(a), NameTest::Name(b)) => a == b,
            _ => false,
        }
    }
}
