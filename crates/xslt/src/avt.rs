//! Attribute value templates: `{expr}` segments embedded in attribute text.

use crate::context::ExecutionContext;
use crate::error::{CompileError, TransformError};
use std::sync::Arc;
use trellis_xpath1::{Expression, ExpressionCache, XPathError};

#[derive(Debug, Clone, PartialEq)]
pub enum AvtPart {
    Static(String),
    Dynamic(Arc<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValueTemplate {
    Static(String),
    Dynamic(Vec<AvtPart>),
}

impl AttributeValueTemplate {
    /// Parses attribute text. `{{` and `}}` stand for literal braces; quotes inside an
    /// expression may contain braces. An unmatched brace is a parse error.
    pub fn parse(text: &str, cache: &mut ExpressionCache) -> Result<Self, CompileError> {
        if !text.contains('{') && !text.contains('}') {
            return Ok(AttributeValueTemplate::Static(text.to_string()));
        }

        let mut parts = Vec::new();
        let mut current_static = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|&(_, next)| next) == Some('{') => {
                    chars.next();
                    current_static.push('{');
                }
                '{' => {
                    if !current_static.is_empty() {
                        parts.push(AvtPart::Static(std::mem::take(&mut current_static)));
                    }
                    let mut expr_str = String::new();
                    let mut quote: Option<char> = None;
                    let mut closed = false;
                    for (_, ec) in chars.by_ref() {
                        match (quote, ec) {
                            (None, '}') => {
                                closed = true;
                                break;
                            }
                            (None, '"' | '\'') => quote = Some(ec),
                            (Some(q), _) if q == ec => quote = None,
                            _ => {}
                        }
                        expr_str.push(ec);
                    }
                    if !closed {
                        return Err(unmatched(text, offset, "unterminated '{' in attribute value template"));
                    }
                    let expr = cache.get_or_parse(&expr_str)?;
                    parts.push(AvtPart::Dynamic(expr));
                }
                '}' if chars.peek().map(|&(_, next)| next) == Some('}') => {
                    chars.next();
                    current_static.push('}');
                }
                '}' => return Err(unmatched(text, offset, "unmatched '}' in attribute value template")),
                _ => current_static.push(c),
            }
        }

        if !current_static.is_empty() {
            parts.push(AvtPart::Static(current_static));
        }
        match parts.as_slice() {
            [] => Ok(AttributeValueTemplate::Static(String::new())),
            [AvtPart::Static(s)] => Ok(AttributeValueTemplate::Static(s.clone())),
            _ => Ok(AttributeValueTemplate::Dynamic(parts)),
        }
    }

    /// The value when it needs no evaluation.
    pub fn as_static(&self) -> Option<&str> {
        match self {
            AttributeValueTemplate::Static(s) => Some(s),
            AttributeValueTemplate::Dynamic(_) => None,
        }
    }

    pub fn evaluate(&self, ctx: &ExecutionContext) -> Result<String, TransformError> {
        match self {
            AttributeValueTemplate::Static(s) => Ok(s.clone()),
            AttributeValueTemplate::Dynamic(parts) => {
                let mut result = String::new();
                for part in parts {
                    match part {
                        AvtPart::Static(s) => result.push_str(s),
                        AvtPart::Dynamic(expr) => result.push_str(&ctx.evaluate(expr)?.to_string()),
                    }
                }
                Ok(result)
            }
        }
    }
}

fn unmatched(text: &str, offset: usize, message: &str) -> CompileError {
    CompileError::Parse(XPathError::ParseError {
        expression: text.to_string(),
        offset,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<AttributeValueTemplate, CompileError> {
        AttributeValueTemplate::parse(text, &mut ExpressionCache::default())
    }

    #[test]
    fn test_static_text_and_escapes() {
        assert_eq!(parse("plain").unwrap().as_static(), Some("plain"));
        assert_eq!(parse("a{{b}}c").unwrap().as_static(), Some("a{b}c"));
        assert_eq!(parse("").unwrap().as_static(), Some(""));
    }

    #[test]
    fn test_dynamic_parts() {
        let AttributeValueTemplate::Dynamic(parts) = parse("id-{@n}-{'}'}").unwrap() else {
            panic!("expected a dynamic template");
        };
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], AvtPart::Static("id-".to_string()));
        assert!(matches!(&parts[3], AvtPart::Dynamic(expr) if **expr == Expression::Literal("}".to_string())));
    }

    #[test]
    fn test_unmatched_braces_are_parse_errors() {
        for text in ["{@a", "a}b", "{1 + }"] {
            assert!(
                matches!(parse(text), Err(CompileError::Parse(XPathError::ParseError { .. }))),
                "{} should fail",
                text
            );
        }
    }
}
