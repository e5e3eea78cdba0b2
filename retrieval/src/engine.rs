//! Rule retrieval engine implementation.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vector_rules_embeddings::{
    CacheStats, Embedding, EmbeddingProvider, SimilarityIndex, average,
};
use vector_rules_store::{
    JsonStore, NewRule, Page, Rule, RuleId, RuleMatch, RuleRepository, RuleType, RuleTypeId,
    RuleTypeRepository, StoreError,
};

use crate::config::{EmbeddingProviderType, RetrievalConfig};
use crate::error::{Result, RetrievalError};
use crate::request::{CreateRule, RetrieveQuery, UpdateRule, content_text};

/// Rule retrieval engine.
///
/// Owns the embedding provider, the rule repositories and the in-memory
/// similarity index, and keeps the index in step with the stored rules:
/// - every stored rule carries an embedding computed from its content
/// - every stored rule has exactly one entry in the index
/// - writes are all-or-nothing across the store and the index
pub struct RuleEngine {
    /// Configuration.
    config: RetrievalConfig,

    /// Embedding provider.
    provider: Arc<dyn EmbeddingProvider>,

    /// Rule type storage.
    rule_types: Arc<dyn RuleTypeRepository>,

    /// Rule storage.
    rules: Arc<dyn RuleRepository>,

    /// Embedding similarity index. Its write guard serializes commits.
    index: Arc<RwLock<SimilarityIndex>>,
}

impl RuleEngine {
    /// Create a new engine builder.
    pub fn builder() -> RuleEngineBuilder {
        RuleEngineBuilder::new()
    }

    /// Open the store under the configured data directory and build the
    /// configured provider.
    pub async fn new(config: RetrievalConfig) -> Result<Self> {
        Self::builder().with_config(config).build().await
    }

    /// Assemble an engine from explicit parts and load the index from the
    /// stored rules.
    pub async fn with_parts(
        config: RetrievalConfig,
        provider: Arc<dyn EmbeddingProvider>,
        rule_types: Arc<dyn RuleTypeRepository>,
        rules: Arc<dyn RuleRepository>,
    ) -> Result<Self> {
        config.validate()?;
        if provider.dimension() != config.embedding.dimension {
            return Err(RetrievalError::Config(format!(
                "provider {} produces {}-dimensional embeddings, configured dimension is {}",
                provider.name(),
                provider.dimension(),
                config.embedding.dimension
            )));
        }

        let index = SimilarityIndex::new(config.embedding.dimension)
            .with_max_limit(config.query.max_results);

        let engine = Self {
            config,
            provider,
            rule_types,
            rules,
            index: Arc::new(RwLock::new(index)),
        };
        engine.rebuild_index().await?;

        info!("Rule engine initialized");
        Ok(engine)
    }

    /// Load every stored rule into the index.
    ///
    /// Rules are re-embedded when their stored vector does not have the
    /// configured dimension, or when the store records a different embedding
    /// model than the current provider.
    async fn rebuild_index(&self) -> Result<()> {
        let rules = self.rules.all().await?;
        let dimension = self.dimension();
        let model = model_id(self.provider.as_ref());
        let recorded = self.rules.embedding_model().await?;
        let model_changed = recorded.as_deref().is_some_and(|recorded| recorded != model);
        if let Some(recorded) = recorded.as_deref().filter(|_| model_changed) {
            warn!("Embedding model changed from {recorded} to {model}, re-embedding all rules");
        }

        let mut index = self.index.write().await;
        index.clear();

        let mut reembedded = 0usize;
        for rule in rules {
            let embedding = if !model_changed && rule.embedding.len() == dimension {
                rule.embedding
            } else {
                if !model_changed {
                    warn!(
                        "Rule {} has a {}-dimensional embedding, re-embedding with {dimension} dimensions",
                        rule.id,
                        rule.embedding.len()
                    );
                }
                let embedding = self.provider.embed(&content_text(&rule.content)).await?;
                reembedded += 1;
                self.rules.update_embedding(rule.id, embedding).await?.embedding
            };
            index.upsert(rule.id, rule.rule_type_id, embedding)?;
        }
        if recorded.as_deref() != Some(model.as_str()) {
            self.rules.set_embedding_model(&model).await?;
        }

        info!(
            "Indexed {} rules ({reembedded} re-embedded)",
            index.len()
        );
        Ok(())
    }

    /// Get the configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Get the embedding provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Number of components in every embedding.
    pub fn dimension(&self) -> usize {
        self.config.embedding.dimension
    }

    /// Find the rules most similar to the averaged query texts.
    ///
    /// Results are ordered by descending similarity, ties by ascending rule
    /// id. A type filter naming no existing rule type matches nothing.
    pub async fn retrieve_similar(
        &self,
        query: RetrieveQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<RuleMatch>> {
        let max_results = self.config.query.max_results;
        if query.n == 0 || query.n > max_results {
            return Err(RetrievalError::InvalidInput(format!(
                "n must be between 1 and {max_results}, got {}",
                query.n
            )));
        }
        if query.queries.is_empty() {
            return Err(RetrievalError::InvalidInput(
                "at least one query is required".to_string(),
            ));
        }
        if let Some(position) = query.queries.iter().position(|q| q.trim().is_empty()) {
            return Err(RetrievalError::InvalidInput(format!(
                "query {position} is empty"
            )));
        }

        debug!("Retrieving {} rules for {} queries", query.n, query.queries.len());

        let embeddings = cancellable(cancel, async {
            self.provider
                .embed_batch(&query.queries)
                .await
                .map_err(RetrievalError::from)
        })
        .await?;
        let query_vector = average(&embeddings)?;

        let rule_type = query
            .rule_type
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let category = match rule_type {
            Some(name) => match self.rule_types.get_by_name(name).await {
                Ok(rule_type) => Some(rule_type.id),
                Err(StoreError::RuleTypeNotFound(_)) => {
                    debug!("No rule type named {name}, nothing to retrieve");
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err.into()),
            },
            None => None,
        };

        // Rank and hydrate under one read guard so a commit is never seen half-applied.
        let index = self.index.read().await;
        let ranked = index.query(&query_vector, category, query.n)?;
        let ids: Vec<RuleId> = ranked.iter().map(|result| result.id).collect();
        let mut rules: HashMap<RuleId, Rule> = self
            .rules
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|rule| (rule.id, rule))
            .collect();
        drop(index);

        let matches: Vec<RuleMatch> = ranked
            .into_iter()
            .filter_map(|result| {
                rules.remove(&result.id).map(|rule| RuleMatch {
                    rule,
                    score: result.score,
                })
            })
            .collect();

        debug!("Retrieved {} rules", matches.len());
        Ok(matches)
    }

    /// Create a rule of an existing type, embedding its content.
    pub async fn create_rule(
        &self,
        request: CreateRule,
        cancel: &CancellationToken,
    ) -> Result<Rule> {
        let rule_type = self.resolve_rule_type(&request.rule_type).await?;
        let embedding = self.embed_content(&request.content, cancel).await?;
        ensure_active(cancel)?;

        let new_rule = NewRule {
            rule_type_id: rule_type.id,
            content: request.content,
            embedding,
        };
        let rule = run_commit(commit_create(
            Arc::clone(&self.rules),
            Arc::clone(&self.index),
            new_rule,
        ))
        .await?;

        info!("Created rule {} ({})", rule.id, rule.rule_type_name);
        Ok(rule)
    }

    /// Replace the type and content of a rule, re-embedding the content.
    pub async fn update_rule(
        &self,
        id: RuleId,
        request: UpdateRule,
        cancel: &CancellationToken,
    ) -> Result<Rule> {
        let rule_type = self.resolve_rule_type(&request.rule_type).await?;
        self.rules.get(id).await?;
        let embedding = self.embed_content(&request.content, cancel).await?;
        ensure_active(cancel)?;

        let new_rule = NewRule {
            rule_type_id: rule_type.id,
            content: request.content,
            embedding,
        };
        let rule = run_commit(commit_update(
            Arc::clone(&self.rules),
            Arc::clone(&self.index),
            id,
            new_rule,
        ))
        .await?;

        info!("Updated rule {id}");
        Ok(rule)
    }

    /// Delete a rule and its vector.
    pub async fn delete_rule(&self, id: RuleId, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;

        run_commit(commit_delete(
            Arc::clone(&self.rules),
            Arc::clone(&self.index),
            id,
        ))
        .await?;

        info!("Deleted rule {id}");
        Ok(())
    }

    /// Get a rule by id.
    pub async fn get_rule(&self, id: RuleId) -> Result<Rule> {
        Ok(self.rules.get(id).await?)
    }

    /// List rules, newest first, optionally of one rule type.
    pub async fn list_rules(&self, rule_type: Option<&str>, page: Page) -> Result<Vec<Rule>> {
        Ok(self.rules.list(rule_type, page).await?)
    }

    /// Recompute the embedding of one rule from its current content.
    ///
    /// If the rule is updated while its content is being embedded, the
    /// update's embedding is kept and the rule is returned as it now stands.
    pub async fn reembed_rule(&self, id: RuleId, cancel: &CancellationToken) -> Result<Rule> {
        let rule = self.rules.get(id).await?;
        let embedding = self.embed_content(&rule.content, cancel).await?;
        ensure_active(cancel)?;

        let rule = run_commit(commit_embedding(
            Arc::clone(&self.rules),
            Arc::clone(&self.index),
            rule,
            embedding,
        ))
        .await?;

        debug!("Re-embedded rule {id}");
        Ok(rule)
    }

    /// Recompute the embedding of every rule. Returns how many were updated.
    pub async fn reembed_all(&self, cancel: &CancellationToken) -> Result<usize> {
        let ids: Vec<RuleId> = self.rules.all().await?.iter().map(|rule| rule.id).collect();

        let mut updated = 0;
        for id in ids {
            match self.reembed_rule(id, cancel).await {
                Ok(_) => updated += 1,
                Err(RetrievalError::RuleNotFound(_)) => {
                    debug!("Rule {id} was deleted before it could be re-embedded");
                }
                Err(err) => return Err(err),
            }
        }

        info!("Re-embedded {updated} rules");
        Ok(updated)
    }

    /// Create a rule type.
    pub async fn create_rule_type(&self, name: &str) -> Result<RuleType> {
        let name = required_name(name)?;
        let rule_type = self.rule_types.create(name).await?;
        info!("Created rule type {} ({name})", rule_type.id);
        Ok(rule_type)
    }

    /// Get a rule type by id.
    pub async fn get_rule_type(&self, id: RuleTypeId) -> Result<RuleType> {
        Ok(self.rule_types.get(id).await?)
    }

    /// Rename a rule type. Rules keep referring to it by id.
    pub async fn rename_rule_type(&self, id: RuleTypeId, name: &str) -> Result<RuleType> {
        let name = required_name(name)?;
        let rule_type = self.rule_types.rename(id, name).await?;
        info!("Renamed rule type {id} to {name}");
        Ok(rule_type)
    }

    /// Delete a rule type that no rule uses.
    pub async fn delete_rule_type(&self, id: RuleTypeId) -> Result<()> {
        self.rule_types.delete(id).await?;
        Ok(())
    }

    /// List rule types ordered by name.
    pub async fn list_rule_types(&self, page: Page) -> Result<Vec<RuleType>> {
        Ok(self.rule_types.list(page).await?)
    }

    /// Get engine statistics.
    pub async fn stats(&self) -> Result<EngineStats> {
        let rule_types = self.rule_types.count().await?;
        let rules = self.rules.count().await?;
        let indexed_vectors = self.index.read().await.len();

        Ok(EngineStats {
            rule_types,
            rules,
            indexed_vectors,
            dimension: self.dimension(),
            provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
            cache: self.provider.cache_stats().await,
        })
    }

    async fn resolve_rule_type(&self, name: &str) -> Result<RuleType> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RetrievalError::InvalidInput(
                "rule type is required".to_string(),
            ));
        }
        Ok(self.rule_types.get_by_name(name).await?)
    }

    /// Embed the textual form of rule content, racing the cancellation token.
    async fn embed_content(
        &self,
        content: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<Embedding> {
        let text = content_text(content);
        if content.is_null() || text.trim().is_empty() {
            return Err(RetrievalError::InvalidInput(
                "rule content cannot be empty".to_string(),
            ));
        }

        cancellable(cancel, async {
            self.provider
                .embed(&text)
                .await
                .map_err(RetrievalError::from)
        })
        .await
    }
}

/// Run `future` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RetrievalError::Cancelled),
        result = future => result,
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RetrievalError::Cancelled);
    }
    Ok(())
}

/// Run a commit on its own task so that neither cancellation nor a dropped
/// caller can stop it between the row write and the index write.
async fn run_commit<T>(commit: impl Future<Output = Result<T>> + Send + 'static) -> Result<T>
where
    T: Send + 'static,
{
    tokio::spawn(commit)
        .await
        .map_err(|err| RetrievalError::StorageUnavailable(format!("commit task failed: {err}")))?
}

async fn commit_create(
    rules: Arc<dyn RuleRepository>,
    index: Arc<RwLock<SimilarityIndex>>,
    new_rule: NewRule,
) -> Result<Rule> {
    let mut index = index.write().await;
    index.check_dimension(&new_rule.embedding)?;

    let rule = rules.create(new_rule).await?;
    commit_index(&mut index, rules.as_ref(), &rule, None).await?;
    Ok(rule)
}

async fn commit_update(
    rules: Arc<dyn RuleRepository>,
    index: Arc<RwLock<SimilarityIndex>>,
    id: RuleId,
    new_rule: NewRule,
) -> Result<Rule> {
    let mut index = index.write().await;
    index.check_dimension(&new_rule.embedding)?;

    let previous = rules.get(id).await?;
    let rule = rules.update(id, new_rule).await?;
    commit_index(&mut index, rules.as_ref(), &rule, Some(previous)).await?;
    Ok(rule)
}

/// Store a re-computed embedding for `embedded`, the rule as it was read
/// before embedding. Skipped when the content changed in the meantime.
async fn commit_embedding(
    rules: Arc<dyn RuleRepository>,
    index: Arc<RwLock<SimilarityIndex>>,
    embedded: Rule,
    embedding: Embedding,
) -> Result<Rule> {
    let mut index = index.write().await;
    index.check_dimension(&embedding)?;

    let previous = rules.get(embedded.id).await?;
    if previous.content != embedded.content {
        debug!(
            "Rule {} changed while it was re-embedded, keeping its newer embedding",
            previous.id
        );
        return Ok(previous);
    }
    let rule = rules.update_embedding(previous.id, embedding).await?;
    commit_index(&mut index, rules.as_ref(), &rule, Some(previous)).await?;
    Ok(rule)
}

async fn commit_delete(
    rules: Arc<dyn RuleRepository>,
    index: Arc<RwLock<SimilarityIndex>>,
    id: RuleId,
) -> Result<()> {
    let mut index = index.write().await;
    rules.delete(id).await?;
    index.remove(id);
    Ok(())
}

/// Mirror a freshly written row into the index.
///
/// If the index rejects the row, the row is rolled back: restored to
/// `previous`, or deleted when it was just created.
async fn commit_index(
    index: &mut SimilarityIndex,
    rules: &dyn RuleRepository,
    rule: &Rule,
    previous: Option<Rule>,
) -> Result<()> {
    let Err(err) = index.upsert(rule.id, rule.rule_type_id, rule.embedding.clone()) else {
        return Ok(());
    };

    let rollback = match previous {
        Some(previous) => rules.restore(previous).await,
        None => rules.delete(rule.id).await.map(|_removed| ()),
    };
    match rollback {
        Ok(()) => warn!("Rolled back rule {} after index failure: {err}", rule.id),
        Err(rollback_err) => error!(
            "Failed to roll back rule {} after index failure ({err}): {rollback_err}",
            rule.id
        ),
    }
    Err(err.into())
}

/// Identifies the embeddings a provider produces.
fn model_id(provider: &dyn EmbeddingProvider) -> String {
    format!("{}/{}", provider.name(), provider.model())
}

fn required_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RetrievalError::InvalidInput(
            "rule type name is required".to_string(),
        ));
    }
    Ok(name)
}

/// Builder for [`RuleEngine`].
pub struct RuleEngineBuilder {
    config: RetrievalConfig,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    repositories: Option<(Arc<dyn RuleTypeRepository>, Arc<dyn RuleRepository>)>,
    in_memory: bool,
}

impl RuleEngineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RetrievalConfig::default(),
            provider: None,
            repositories: None,
            in_memory: false,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// Set the embedding provider type.
    pub fn with_embedding_provider(mut self, provider: EmbeddingProviderType) -> Self {
        self.config.embedding.provider = provider;
        self
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.config.embedding.dimension = dimension;
        self
    }

    /// Set the largest number of results a retrieval may ask for.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.config.query.max_results = max_results;
        self
    }

    /// Use an already constructed provider instead of the configured one.
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.config.embedding.dimension = provider.dimension();
        self.provider = Some(provider);
        self
    }

    /// Use the given repositories instead of opening a store.
    pub fn with_repositories(
        mut self,
        rule_types: Arc<dyn RuleTypeRepository>,
        rules: Arc<dyn RuleRepository>,
    ) -> Self {
        self.repositories = Some((rule_types, rules));
        self
    }

    /// Keep rules in memory only.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    /// Build the engine.
    pub async fn build(self) -> Result<RuleEngine> {
        self.config.validate()?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => self.config.embedding.build_provider()?,
        };

        let (rule_types, rules) = match self.repositories {
            Some(repositories) => repositories,
            None => {
                let store = if self.in_memory {
                    JsonStore::in_memory()
                } else {
                    JsonStore::open(&self.config.data_dir).await?
                };
                let store = Arc::new(store);
                let rule_types: Arc<dyn RuleTypeRepository> = store.clone();
                let rules: Arc<dyn RuleRepository> = store;
                (rule_types, rules)
            }
        };

        RuleEngine::with_parts(self.config, provider, rule_types, rules).await
    }
}

impl Default for RuleEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the retrieval engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Number of rule types.
    pub rule_types: usize,

    /// Number of stored rules.
    pub rules: usize,

    /// Number of vectors in the similarity index.
    pub indexed_vectors: usize,

    /// Embedding dimension.
    pub dimension: usize,

    /// Name of the embedding provider.
    pub provider: String,

    /// Embedding model.
    pub model: String,

    /// Embedding cache statistics, when caching is enabled.
    pub cache: Option<CacheStats>,
}
