//! # Rule Store
//!
//! Persistence for rules and rule types.
//!
//! - **Rule Types**: Uniquely named categories
//! - **Rules**: Opaque JSON content plus the embedding of that content
//! - **JsonStore**: Snapshot storage with atomic writes, or purely in memory
//!
//! The retrieval engine only talks to the [`RuleRepository`] and
//! [`RuleTypeRepository`] traits, so other backends can be plugged in.

pub mod error;
pub mod model;
pub mod repository;
pub mod storage;

pub use error::{Result, StorageError, StoreError};
pub use model::{NewRule, Page, Rule, RuleId, RuleMatch, RuleType, RuleTypeId};
pub use repository::{RuleRepository, RuleTypeRepository};
pub use storage::JsonStore;
