//! # Rule Retrieval Engine
//!
//! This crate ties the rule store and the embeddings system together:
//!
//! - **Write Path**: Every created or updated rule is embedded before it is
//!   stored, and its vector is mirrored into the similarity index
//! - **Retrieval**: Query texts are embedded, averaged and ranked against the
//!   stored rule vectors
//! - **Cancellation**: Operations race a caller-supplied token while
//!   embedding and commit atomically afterwards
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Rule Engine                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │  Embedding   │  │  Similarity  │  │    Rule      │           │
//! │  │  Provider    │  │    Index     │  │    Store     │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! │         │                │                  │                   │
//! │         └────────────────┼──────────────────┘                   │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │  RuleEngine  │                               │
//! │                  └──────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vector_rules_retrieval::{CreateRule, RetrieveQuery, RuleEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = RuleEngine::builder()
//!     .with_data_dir("/var/lib/vector-rules")
//!     .build()
//!     .await?;
//!
//! let cancel = CancellationToken::new();
//! engine.create_rule_type("style").await?;
//! engine
//!     .create_rule(CreateRule::new("style", json!("Indent with four spaces")), &cancel)
//!     .await?;
//!
//! let matches = engine
//!     .retrieve_similar(RetrieveQuery::new(5, ["how should I indent?"]), &cancel)
//!     .await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod request;

pub use config::{EmbeddingConfig, EmbeddingProviderType, QueryConfig, RetrievalConfig};
pub use engine::{EngineStats, RuleEngine, RuleEngineBuilder};
pub use error::{Result, RetrievalError};
pub use request::{CreateRule, RetrieveQuery, UpdateRule, content_text};

// Re-export from dependencies for convenience
pub use tokio_util::sync::CancellationToken;
pub use vector_rules_embeddings::{EmbeddingProvider, SimilarityIndex};
pub use vector_rules_store::{Page, Rule, RuleId, RuleMatch, RuleType, RuleTypeId};
