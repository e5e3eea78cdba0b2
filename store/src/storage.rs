//! File-backed rule storage.
//!
//! `JsonStore` keeps every rule type and rule in one snapshot. The snapshot
//! lives in memory and, unless the store is in-memory only, is mirrored to
//! `store.json` in the store's root directory. Every mutation is applied to a
//! copy of the snapshot, written atomically (temp file, then rename), and only
//! swapped in once the write succeeded, so a failed write leaves the store
//! exactly as it was.
//!
//! Each mutation clones and rewrites the whole snapshot, embeddings included,
//! so a write costs time proportional to `rules × dimension`. The retrieval
//! engine commits while holding its index write guard, which stalls
//! retrievals for the duration of that write. This suits rule sets in the
//! thousands; larger sets want a backend with per-row writes behind the same
//! repository traits.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use vector_rules_embeddings::Embedding;

use crate::error::{Result, StorageError, StoreError};
use crate::model::{NewRule, Page, Rule, RuleId, RuleType, RuleTypeId};
use crate::repository::{RuleRepository, RuleTypeRepository};

const SNAPSHOT_FILE: &str = "store.json";

/// A rule as persisted, without the joined type name.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleRow {
    id: RuleId,
    rule_type_id: RuleTypeId,
    content: serde_json::Value,
    embedding: Embedding,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    next_rule_type_id: RuleTypeId,
    next_rule_id: RuleId,
    rule_types: BTreeMap<RuleTypeId, RuleType>,
    rules: BTreeMap<RuleId, RuleRow>,

    /// Model that produced every stored embedding.
    #[serde(default)]
    embedding_model: Option<String>,
}

impl Snapshot {
    fn rule_type(&self, id: RuleTypeId) -> Result<&RuleType> {
        self.rule_types
            .get(&id)
            .ok_or_else(|| StoreError::RuleTypeNotFound(format!("id {id}")))
    }

    fn rule_type_by_name(&self, name: &str) -> Option<&RuleType> {
        self.rule_types.values().find(|t| t.name == name)
    }

    fn row(&self, id: RuleId) -> Result<&RuleRow> {
        self.rules.get(&id).ok_or(StoreError::RuleNotFound(id))
    }

    /// Join a row with its rule type name.
    fn hydrate(&self, row: &RuleRow) -> Result<Rule> {
        let rule_type = self.rule_type(row.rule_type_id)?;
        Ok(Rule {
            id: row.id,
            rule_type_id: row.rule_type_id,
            rule_type_name: rule_type.name.clone(),
            content: row.content.clone(),
            embedding: row.embedding.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Storage backend for rules and rule types.
pub struct JsonStore {
    /// Snapshot file, `None` for an in-memory store.
    path: Option<PathBuf>,

    /// Current snapshot.
    state: Mutex<Snapshot>,
}

impl JsonStore {
    /// Open (or create) a store rooted at the given directory.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::CreateDirectory(format!("{}: {e}", root.display())))?;

        let path = root.join(SNAPSHOT_FILE);
        let snapshot = if fs::try_exists(&path).await.unwrap_or(false) {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| StorageError::ReadFile(format!("{}: {e}", path.display())))?;
            serde_json::from_str(&content)?
        } else {
            Snapshot::default()
        };

        info!(
            "Loaded {} rule types and {} rules from {}",
            snapshot.rule_types.len(),
            snapshot.rules.len(),
            path.display()
        );

        Ok(Self {
            path: Some(path),
            state: Mutex::new(snapshot),
        })
    }

    /// Create a store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(Snapshot::default()),
        }
    }

    /// Snapshot file backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist `next` and make it the current snapshot.
    async fn commit(&self, state: &mut MutexGuard<'_, Snapshot>, next: Snapshot) -> Result<()> {
        if let Some(path) = &self.path {
            save(path, &next).await?;
        }
        **state = next;
        Ok(())
    }
}

/// Write a snapshot atomically using a temp file.
async fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let content = serde_json::to_string(snapshot)?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content)
        .await
        .map_err(|e| StorageError::WriteFile(format!("{}: {e}", temp_path.display())))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| StorageError::WriteFile(format!("{}: {e}", path.display())))?;

    debug!("Saved store snapshot to {}", path.display());
    Ok(())
}

fn paginate<T>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items.skip(page.offset).take(page.limit).collect()
}

#[async_trait]
impl RuleTypeRepository for JsonStore {
    async fn create(&self, name: &str) -> Result<RuleType> {
        let mut state = self.state.lock().await;
        if state.rule_type_by_name(name).is_some() {
            return Err(StoreError::DuplicateRuleType(name.to_string()));
        }

        let mut next = state.clone();
        next.next_rule_type_id += 1;
        let now = Utc::now();
        let rule_type = RuleType {
            id: next.next_rule_type_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        next.rule_types.insert(rule_type.id, rule_type.clone());

        self.commit(&mut state, next).await?;
        debug!("Created rule type {} ({name})", rule_type.id);
        Ok(rule_type)
    }

    async fn get(&self, id: RuleTypeId) -> Result<RuleType> {
        self.state.lock().await.rule_type(id).cloned()
    }

    async fn get_by_name(&self, name: &str) -> Result<RuleType> {
        self.state
            .lock()
            .await
            .rule_type_by_name(name)
            .cloned()
            .ok_or_else(|| StoreError::RuleTypeNotFound(name.to_string()))
    }

    async fn rename(&self, id: RuleTypeId, name: &str) -> Result<RuleType> {
        let mut state = self.state.lock().await;
        state.rule_type(id)?;
        if state.rule_type_by_name(name).is_some_and(|t| t.id != id) {
            return Err(StoreError::DuplicateRuleType(name.to_string()));
        }

        let mut next = state.clone();
        let rule_type = next
            .rule_types
            .get_mut(&id)
            .ok_or_else(|| StoreError::RuleTypeNotFound(format!("id {id}")))?;
        rule_type.name = name.to_string();
        rule_type.updated_at = Utc::now();
        let renamed = rule_type.clone();

        self.commit(&mut state, next).await?;
        Ok(renamed)
    }

    async fn delete(&self, id: RuleTypeId) -> Result<()> {
        let mut state = self.state.lock().await;
        let name = state.rule_type(id)?.name.clone();
        let rules = state
            .rules
            .values()
            .filter(|row| row.rule_type_id == id)
            .count();
        if rules > 0 {
            return Err(StoreError::RuleTypeInUse { name, rules });
        }

        let mut next = state.clone();
        next.rule_types.remove(&id);
        self.commit(&mut state, next).await?;
        info!("Deleted rule type {id} ({name})");
        Ok(())
    }

    async fn list(&self, page: Page) -> Result<Vec<RuleType>> {
        let state = self.state.lock().await;
        let mut rule_types: Vec<_> = state.rule_types.values().cloned().collect();
        rule_types.sort_by_key(|t| t.name.clone());
        Ok(paginate(rule_types.into_iter(), page))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.lock().await.rule_types.len())
    }
}

#[async_trait]
impl RuleRepository for JsonStore {
    async fn create(&self, rule: NewRule) -> Result<Rule> {
        let mut state = self.state.lock().await;
        state.rule_type(rule.rule_type_id)?;

        let mut next = state.clone();
        next.next_rule_id += 1;
        let now = Utc::now();
        let row = RuleRow {
            id: next.next_rule_id,
            rule_type_id: rule.rule_type_id,
            content: rule.content,
            embedding: rule.embedding,
            created_at: now,
            updated_at: now,
        };
        let created = next.hydrate(&row)?;
        next.rules.insert(row.id, row);

        self.commit(&mut state, next).await?;
        debug!("Created rule {}", created.id);
        Ok(created)
    }

    async fn get(&self, id: RuleId) -> Result<Rule> {
        let state = self.state.lock().await;
        state.hydrate(state.row(id)?)
    }

    async fn get_many(&self, ids: &[RuleId]) -> Result<Vec<Rule>> {
        let state = self.state.lock().await;
        ids.iter()
            .filter_map(|id| state.rules.get(id))
            .map(|row| state.hydrate(row))
            .collect()
    }

    async fn update(&self, id: RuleId, rule: NewRule) -> Result<Rule> {
        let mut state = self.state.lock().await;
        state.row(id)?;
        state.rule_type(rule.rule_type_id)?;

        let mut next = state.clone();
        let row = next.rules.get_mut(&id).ok_or(StoreError::RuleNotFound(id))?;
        row.rule_type_id = rule.rule_type_id;
        row.content = rule.content;
        row.embedding = rule.embedding;
        row.updated_at = Utc::now();
        let row = row.clone();
        let updated = next.hydrate(&row)?;

        self.commit(&mut state, next).await?;
        debug!("Updated rule {id}");
        Ok(updated)
    }

    async fn update_embedding(&self, id: RuleId, embedding: Embedding) -> Result<Rule> {
        let mut state = self.state.lock().await;
        state.row(id)?;

        let mut next = state.clone();
        let row = next.rules.get_mut(&id).ok_or(StoreError::RuleNotFound(id))?;
        row.embedding = embedding;
        row.updated_at = Utc::now();
        let row = row.clone();
        let updated = next.hydrate(&row)?;

        self.commit(&mut state, next).await?;
        Ok(updated)
    }

    async fn restore(&self, rule: Rule) -> Result<()> {
        let mut state = self.state.lock().await;
        state.rule_type(rule.rule_type_id)?;

        let mut next = state.clone();
        next.next_rule_id = next.next_rule_id.max(rule.id);
        next.rules.insert(
            rule.id,
            RuleRow {
                id: rule.id,
                rule_type_id: rule.rule_type_id,
                content: rule.content,
                embedding: rule.embedding,
                created_at: rule.created_at,
                updated_at: rule.updated_at,
            },
        );

        self.commit(&mut state, next).await?;
        debug!("Restored rule {}", rule.id);
        Ok(())
    }

    async fn delete(&self, id: RuleId) -> Result<Rule> {
        let mut state = self.state.lock().await;
        let removed = state.hydrate(state.row(id)?)?;

        let mut next = state.clone();
        next.rules.remove(&id);
        self.commit(&mut state, next).await?;
        info!("Deleted rule {id}");
        Ok(removed)
    }

    async fn list(&self, rule_type: Option<&str>, page: Page) -> Result<Vec<Rule>> {
        let state = self.state.lock().await;
        let type_id = match rule_type {
            Some(name) => match state.rule_type_by_name(name) {
                Some(t) => Some(t.id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let mut rows: Vec<&RuleRow> = state
            .rules
            .values()
            .filter(|row| type_id.is_none_or(|id| row.rule_type_id == id))
            .collect();
        rows.sort_by_key(|row| Reverse((row.created_at, row.id)));

        paginate(rows.into_iter(), page)
            .into_iter()
            .map(|row| state.hydrate(row))
            .collect()
    }

    async fn all(&self) -> Result<Vec<Rule>> {
        let state = self.state.lock().await;
        state.rules.values().map(|row| state.hydrate(row)).collect()
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.lock().await.rules.len())
    }

    async fn embedding_model(&self) -> Result<Option<String>> {
        Ok(self.state.lock().await.embedding_model.clone())
    }

    async fn set_embedding_model(&self, model: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.embedding_model.as_deref() == Some(model) {
            return Ok(());
        }

        let mut next = state.clone();
        next.embedding_model = Some(model.to_string());
        self.commit(&mut state, next).await?;
        debug!("Recorded embedding model {model}");
        Ok(())
    }
}
