//! A bounded cache of parsed expressions, keyed by source text.

use crate::ast::Expression;
use crate::error::XPathError;
use crate::parser::parse_expression;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub const DEFAULT_CAPACITY: usize = 100;

/// Parsed expressions by source text. When full, the oldest half of the entries (by
/// insertion) is dropped before inserting.
#[derive(Debug, Clone)]
pub struct ExpressionCache {
    capacity: usize,
    entries: HashMap<String, Arc<Expression>>,
    order: VecDeque<String>,
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ExpressionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn get_or_parse(&mut self, source: &str) -> Result<Arc<Expression>, XPathError> {
        self.get_or_insert_with(source, parse_expression)
    }

    /// Returns the cached expression for `source`, building it with `parse` on a miss.
    /// Failed parses are not cached.
    pub fn get_or_insert_with<F>(&mut self, source: &str, parse: F) -> Result<Arc<Expression>, XPathError>
    where
        F: FnOnce(&str) -> Result<Expression, XPathError>,
    {
        if let Some(expr) = self.entries.get(source) {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parse(source)?);
        if self.entries.len() >= self.capacity {
            self.evict_oldest_half();
        }
        self.entries.insert(source.to_string(), Arc::clone(&expr));
        self.order.push_back(source.to_string());
        Ok(expr)
    }

    fn evict_oldest_half(&mut self) {
        let count = (self.order.len() / 2).max(1);
        for key in self.order.drain(..count) {
            self.entries.remove(&key);
        }
        log::debug!(
            "Expression cache full, evicted {} entries ({} remain)",
            count,
            self.entries.len()
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hits_return_the_same_expression() {
        let mut cache = ExpressionCache::default();
        let first = cache.get_or_parse("a/b").unwrap();
        let second = cache.get_or_parse("a/b").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_eviction_drops_oldest_half() {
        let mut cache = ExpressionCache::new(4);
        for source in ["1", "2", "3", "4"] {
            cache.get_or_parse(source).unwrap();
        }
        assert_eq!(cache.len(), 4);
        cache.get_or_parse("5").unwrap();
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("1"));
        assert!(!cache.contains("2"));
        assert!(cache.contains("3"));
        assert!(cache.contains("5"));
    }

    #[test]
    fn test_parse_errors_are_not_cached() {
        let mut cache = ExpressionCache::new(4);
        assert!(cache.get_or_parse("a[").is_err());
        assert!(cache.is_empty());
    }
}
