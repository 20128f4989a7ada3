use serde::{Deserialize, Serialize};

/// Settings for compiling and running transformations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformConfig {
    /// Number of parsed expressions kept by the compiler, keyed by source text. When the
    /// cache is full the oldest half is dropped.
    ///
    /// Defaults to `100`.
    pub expression_cache_capacity: usize,
    /// Maximum nesting of template, attribute-set and variable instantiations before the
    /// transformation fails with a recursion error. Every level takes several native stack
    /// frames, so values above the default need a thread stack larger than 2 MiB.
    ///
    /// Defaults to `150`.
    pub max_depth: usize,
    /// Whether source documents are whitespace-stripped according to the stylesheet's
    /// `xsl:strip-space` and `xsl:preserve-space` declarations.
    pub strip_source_whitespace: bool,
    /// Reported by `system-property('xsl:vendor')`.
    pub vendor: String,
    /// Reported by `system-property('xsl:vendor-url')`.
    pub vendor_url: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            expression_cache_capacity: 100,
            max_depth: 150,
            strip_source_whitespace: true,
            vendor: "trellis".to_string(),
            vendor_url: String::new(),
        }
    }
}

impl TransformConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = TransformConfig::from_json(r#"{ "maxDepth": 50 }"#).unwrap();
        assert_eq!(config.max_depth, 50);
        assert_eq!(config.expression_cache_capacity, 100);
        assert_eq!(config.vendor, "trellis");
        assert!(config.strip_source_whitespace);
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = TransformConfig {
            vendor: "acme".to_string(),
            strip_source_whitespace: false,
            ..TransformConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains("\"stripSourceWhitespace\":false"));
        assert_eq!(TransformConfig::from_json(&text).unwrap(), config);
    }
}
