//! Request types accepted by the engine.

use serde::{Deserialize, Serialize};

/// Find the rules closest to a set of natural-language queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveQuery {
    /// Number of rules to return.
    pub n: usize,

    /// Restrict candidates to this rule type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,

    /// Query texts, averaged into a single query vector.
    pub queries: Vec<String>,
}

impl RetrieveQuery {
    pub fn new(n: usize, queries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            n,
            rule_type: None,
            queries: queries.into_iter().map(Into::into).collect(),
        }
    }

    /// Only consider rules of the given type.
    pub fn with_type(mut self, rule_type: impl Into<String>) -> Self {
        self.rule_type = Some(rule_type.into());
        self
    }
}

/// Create a rule of a named type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRule {
    #[serde(rename = "type")]
    pub rule_type: String,

    /// Opaque payload, stored verbatim.
    pub content: serde_json::Value,
}

impl CreateRule {
    pub fn new(rule_type: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            rule_type: rule_type.into(),
            content,
        }
    }
}

/// Replace the type and content of an existing rule.
pub type UpdateRule = CreateRule;

/// Text embedded for a rule's content.
///
/// String content embeds the string itself; anything else embeds its compact
/// JSON form.
pub fn content_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
