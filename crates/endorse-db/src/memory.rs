//! In-process [`HistoryRepository`] with the same version semantics as the
//! Postgres implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use endorse_core::{Clock, EndorsementHistory, HistoryKey, SystemClock};

use crate::{repository::HistoryRepository, DbError};

#[derive(Debug, Default)]
struct Store {
    by_id: HashMap<Uuid, EndorsementHistory>,
    by_key: HashMap<HistoryKey, Uuid>,
    /// Creation order, used to return listings oldest first.
    order: Vec<Uuid>,
}

impl Store {
    fn insert_new(&mut self, history: EndorsementHistory) {
        self.by_key.insert(history.key(), history.id);
        self.order.push(history.id);
        self.by_id.insert(history.id, history);
    }

    fn ordered<'a>(
        &'a self,
        mut keep: impl FnMut(&EndorsementHistory) -> bool + 'a,
    ) -> impl Iterator<Item = EndorsementHistory> + 'a {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .filter(move |h| keep(*h))
            .cloned()
    }
}

/// `created_at` / `updated_at` come from the injected [`Clock`].
pub struct MemoryHistoryRepository {
    store: RwLock<Store>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MemoryHistoryRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHistoryRepository")
            .finish_non_exhaustive()
    }
}

impl Default for MemoryHistoryRepository {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemoryHistoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RwLock::default(),
            clock,
        }
    }

    /// Number of stored histories.
    pub async fn len(&self) -> usize {
        self.store.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl HistoryRepository for MemoryHistoryRepository {
    async fn get_or_create(
        &self,
        key: &HistoryKey,
        entity_name: &str,
    ) -> Result<EndorsementHistory, DbError> {
        let mut store = self.store.write().await;
        if let Some(existing) = store.by_key.get(key).and_then(|id| store.by_id.get(id)) {
            return Ok(existing.clone());
        }
        let history = EndorsementHistory::new(key, entity_name, self.clock.now());
        store.insert_new(history.clone());
        Ok(history)
    }

    async fn find(&self, key: &HistoryKey) -> Result<Option<EndorsementHistory>, DbError> {
        let store = self.store.read().await;
        Ok(store
            .by_key
            .get(key)
            .and_then(|id| store.by_id.get(id))
            .cloned())
    }

    async fn get(&self, id: Uuid) -> Result<Option<EndorsementHistory>, DbError> {
        Ok(self.store.read().await.by_id.get(&id).cloned())
    }

    async fn save(&self, history: &EndorsementHistory) -> Result<EndorsementHistory, DbError> {
        let mut store = self.store.write().await;

        let mut stored = history.clone();
        stored.version = history.version + 1;
        stored.updated_at = self.clock.now();

        let Some(current) = store.by_id.get_mut(&history.id) else {
            store.insert_new(stored.clone());
            return Ok(stored);
        };

        if current.version != history.version {
            return Err(DbError::VersionConflict {
                id: history.id,
                expected: history.version,
            });
        }

        // Identity and creation time are immutable once stored.
        stored.user_id.clone_from(&current.user_id);
        stored.entity_type = current.entity_type;
        stored.entity_id.clone_from(&current.entity_id);
        stored.created_at = current.created_at;
        *current = stored.clone();
        Ok(stored)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EndorsementHistory>, DbError> {
        let store = self.store.read().await;
        Ok(store.ordered(|h| h.user_id == user_id).collect())
    }

    async fn list_all(&self) -> Result<Vec<EndorsementHistory>, DbError> {
        let store = self.store.read().await;
        let mut all: Vec<EndorsementHistory> = store.ordered(|_| true).collect();
        // Stable sort keeps creation order within each user.
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(all)
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use endorse_core::{EndorsementPeriod, EntityType, FixedClock};

    use super::*;

    fn key(user: &str, entity: &str) -> HistoryKey {
        HistoryKey::new(user, EntityType::Brand, entity)
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let repo = MemoryHistoryRepository::new();
        let first = repo.get_or_create(&key("u1", "b1"), "Acme").await.unwrap();
        let second = repo
            .get_or_create(&key("u1", "b1"), "Renamed")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.entity_name, "Acme", "get_or_create never renames");
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn save_bumps_version_and_rejects_stale_copy() {
        let repo = MemoryHistoryRepository::new();
        let loaded = repo.get_or_create(&key("u1", "b1"), "Acme").await.unwrap();
        let stale = loaded.clone();

        let mut updated = loaded;
        updated.push_period(EndorsementPeriod::open(Utc::now(), 2));
        let saved = repo.save(&updated).await.unwrap();
        assert_eq!(saved.version, 1);

        let err = repo.save(&stale).await.unwrap_err();
        assert!(matches!(err, DbError::VersionConflict { expected: 0, .. }));

        let reloaded = repo.get(saved.id).await.unwrap().unwrap();
        assert_eq!(reloaded.periods.len(), 1, "winner's write survives");
    }

    #[tokio::test]
    async fn list_for_user_filters_and_keeps_creation_order() {
        let repo = MemoryHistoryRepository::new();
        repo.get_or_create(&key("u1", "b1"), "One").await.unwrap();
        repo.get_or_create(&key("u2", "b1"), "Other").await.unwrap();
        repo.get_or_create(&key("u1", "b2"), "Two").await.unwrap();

        let names: Vec<String> = repo
            .list_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.entity_name)
            .collect();
        assert_eq!(names, vec!["One", "Two"]);

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].user_id, "u2");
    }

    #[tokio::test]
    async fn timestamps_follow_the_injected_clock() {
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(created));
        let repo = MemoryHistoryRepository::with_clock(clock.clone());

        let loaded = repo.get_or_create(&key("u1", "b1"), "Acme").await.unwrap();
        assert_eq!(loaded.created_at, created);
        assert_eq!(loaded.updated_at, created);

        clock.advance(Duration::days(2));
        let saved = repo.save(&loaded).await.unwrap();
        assert_eq!(saved.created_at, created, "creation time is immutable");
        assert_eq!(saved.updated_at, created + Duration::days(2));
    }

    #[tokio::test]
    async fn find_returns_none_for_unknown_key() {
        let repo = MemoryHistoryRepository::new();
        assert!(repo.find(&key("nobody", "b1")).await.unwrap().is_none());
        assert!(repo.is_empty().await);
    }
}
