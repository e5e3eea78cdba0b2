//! Repository traits the retrieval engine persists through.

use async_trait::async_trait;
use vector_rules_embeddings::Embedding;

use crate::error::Result;
use crate::model::{NewRule, Page, Rule, RuleId, RuleType, RuleTypeId};

/// Data access for rule types.
#[async_trait]
pub trait RuleTypeRepository: Send + Sync {
    /// Create a rule type. Names are unique.
    async fn create(&self, name: &str) -> Result<RuleType>;

    /// Get a rule type by id.
    async fn get(&self, id: RuleTypeId) -> Result<RuleType>;

    /// Get a rule type by its exact name.
    async fn get_by_name(&self, name: &str) -> Result<RuleType>;

    /// Rename a rule type.
    async fn rename(&self, id: RuleTypeId, name: &str) -> Result<RuleType>;

    /// Delete a rule type that no rule references.
    async fn delete(&self, id: RuleTypeId) -> Result<()>;

    /// List rule types ordered by name.
    async fn list(&self, page: Page) -> Result<Vec<RuleType>>;

    /// Number of rule types.
    async fn count(&self) -> Result<usize>;
}

/// Data access for rules.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Create a rule. The referenced rule type must exist.
    async fn create(&self, rule: NewRule) -> Result<Rule>;

    /// Get a rule by id.
    async fn get(&self, id: RuleId) -> Result<Rule>;

    /// Get several rules in the order of `ids`, skipping ids that do not exist.
    async fn get_many(&self, ids: &[RuleId]) -> Result<Vec<Rule>>;

    /// Replace type, content and embedding of an existing rule.
    async fn update(&self, id: RuleId, rule: NewRule) -> Result<Rule>;

    /// Replace only the embedding of an existing rule.
    async fn update_embedding(&self, id: RuleId, embedding: Embedding) -> Result<Rule>;

    /// Write a previously read rule back verbatim, recreating it if needed.
    async fn restore(&self, rule: Rule) -> Result<()>;

    /// Delete a rule, returning what was removed.
    async fn delete(&self, id: RuleId) -> Result<Rule>;

    /// List rules, newest first, optionally restricted to one rule type name.
    async fn list(&self, rule_type: Option<&str>, page: Page) -> Result<Vec<Rule>>;

    /// Every rule, ordered by id.
    async fn all(&self) -> Result<Vec<Rule>>;

    /// Number of rules.
    async fn count(&self) -> Result<usize>;

    /// Identifier of the embedding model the stored embeddings came from,
    /// `None` until one has been recorded.
    async fn embedding_model(&self) -> Result<Option<String>>;

    /// Record the embedding model the stored embeddings came from.
    async fn set_embedding_model(&self, model: &str) -> Result<()>;
}
