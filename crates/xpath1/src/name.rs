//! Lexical and expanded names shared by the expression engine and its hosts.

use std::fmt;

/// A name as written in source text: an optional prefix and a local part (`xsl:template`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub prefix: Option<String>,
    pub local_name: String,
}

impl QualifiedName {
    pub fn new(prefix: Option<&str>, local_name: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local_name: local_name.to_string(),
        }
    }

    pub fn local(local_name: &str) -> Self {
        Self::new(None, local_name)
    }

    /// Splits `prefix:local` on the first colon. Returns `None` when either part is empty
    /// or when a second colon is present.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text.split_once(':') {
            Some((prefix, local)) => {
                if prefix.is_empty() || local.is_empty() || local.contains(':') {
                    return None;
                }
                if !is_ncname(prefix) || !is_ncname(local) {
                    return None;
                }
                Some(Self::new(Some(prefix), local))
            }
            None if is_ncname(text) => Some(Self::local(text)),
            None => None,
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

/// A resolved name: a namespace URI (or none) and a local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub namespace_uri: Option<String>,
    pub local_name: String,
}

impl ExpandedName {
    pub fn new(namespace_uri: Option<&str>, local_name: &str) -> Self {
        Self {
            namespace_uri: namespace_uri.map(str::to_string),
            local_name: local_name.to_string(),
        }
    }

    pub fn local(local_name: &str) -> Self {
        Self::new(None, local_name)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace_uri {
            Some(uri) => write!(f, "{{{}}}{}", uri, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

pub(crate) fn is_name_start_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

/// True if `text` is a non-colonized XML name.
pub fn is_ncname(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified_name() {
        assert_eq!(
            QualifiedName::parse("xsl:template"),
            Some(QualifiedName::new(Some("xsl"), "template"))
        );
        assert_eq!(QualifiedName::parse(" para "), Some(QualifiedName::local("para")));
        assert_eq!(QualifiedName::parse("a:b:c"), None);
        assert_eq!(QualifiedName::parse(":b"), None);
        assert_eq!(QualifiedName::parse("1abc"), None);
    }

    #[test]
    fn test_expanded_name_display_uses_clark_notation() {
        assert_eq!(ExpandedName::new(Some("urn:x"), "item").to_string(), "{urn:x}item");
        assert_eq!(ExpandedName::local("item").to_string(), "item");
    }
}
