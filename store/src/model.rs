//! Domain records shared by the store, the retrieval engine and the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vector_rules_embeddings::Embedding;

/// Identifier of a rule.
pub type RuleId = i64;

/// Identifier of a rule type.
pub type RuleTypeId = i64;

/// A named category of rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleType {
    pub id: RuleTypeId,

    /// Unique category label.
    pub name: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored rule joined with the name of its type.
///
/// The embedding is never serialized; API clients see the content and
/// metadata only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub rule_type_id: RuleTypeId,

    /// Name of the referenced rule type, filled in on read.
    pub rule_type_name: String,

    /// Opaque payload, stored verbatim.
    pub content: serde_json::Value,

    /// Embedding of the content.
    #[serde(skip)]
    pub embedding: Embedding,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written when creating or replacing a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRule {
    pub rule_type_id: RuleTypeId,
    pub content: serde_json::Value,
    pub embedding: Embedding,
}

/// A rule ranked by a similarity query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleMatch {
    #[serde(flatten)]
    pub rule: Rule,

    /// Cosine similarity to the query, higher is more similar.
    pub score: f32,
}

/// Offset pagination for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    /// Page size used when a caller does not ask for one.
    pub const DEFAULT_LIMIT: usize = 10;

    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rule_match_serializes_flat_without_embedding() {
        let now = Utc::now();
        let matched = RuleMatch {
            rule: Rule {
                id: 7,
                rule_type_id: 2,
                rule_type_name: "style".to_string(),
                content: serde_json::json!({"text": "no tabs"}),
                embedding: vec![1.0, 0.0],
                created_at: now,
                updated_at: now,
            },
            score: 0.5,
        };

        let value = serde_json::to_value(&matched).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["rule_type_name"], "style");
        assert_eq!(value["content"]["text"], "no tabs");
        assert_eq!(value["score"], 0.5);
        assert!(value.get("embedding").is_none());
    }
}
