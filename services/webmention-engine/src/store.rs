// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Storage for accepted Webmentions.
//!
//! Rows are keyed by `(source, target)`: inserting the same pair again
//! replaces the row and refreshes `updated_at`.

use crate::extension::{StoredMention, Webmention};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
#[error("Storage error: {0}")]
pub struct StoreError(pub String);

/// Filter for [`MentionStore::list`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct MentionQuery {
    pub source: Option<String>,
    pub target: Option<String>,
}

/// Persistence for accepted mentions.
#[async_trait]
pub trait MentionStore: Send + Sync {
    /// Insert or replace the mention for its `(source, target)` pair.
    async fn insert(&self, mention: &Webmention) -> Result<(), StoreError>;

    async fn delete(&self, source: &str, target: &str) -> Result<(), StoreError>;

    /// Matching mentions, newest first.
    async fn list(&self, query: &MentionQuery) -> Result<Vec<StoredMention>, StoreError>;
}

/// Process-local store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    rows: Arc<RwLock<HashMap<(String, String), StoredMention>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MentionStore for InMemoryStore {
    async fn insert(&self, mention: &Webmention) -> Result<(), StoreError> {
        let row = mention.to_stored(Utc::now());
        let key = (row.source.clone(), row.target.clone());

        let mut rows = self.rows.write().await;
        let replaced = rows.insert(key, row).is_some();
        debug!(
            source = %mention.source,
            target = %mention.target,
            replaced,
            "Stored Webmention"
        );
        Ok(())
    }

    async fn delete(&self, source: &str, target: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let removed = rows
            .remove(&(source.to_string(), target.to_string()))
            .is_some();
        debug!(source, target, removed, "Deleted Webmention");
        Ok(())
    }

    async fn list(&self, query: &MentionQuery) -> Result<Vec<StoredMention>, StoreError> {
        let rows = self.rows.read().await;
        let mut matches: Vec<StoredMention> = rows
            .values()
            .filter(|row| query.source.as_ref().map_or(true, |s| *s == row.source))
            .filter(|row| query.target.as_ref().map_or(true, |t| *t == row.target))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matches)
    }
}
