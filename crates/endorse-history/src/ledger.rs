//! Shared plumbing for every write: key lock, load, mutate, versioned save.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use endorse_core::{Clock, EndorsementHistory, HistoryKey};
use endorse_db::HistoryRepository;

use crate::error::HistoryError;
use crate::locks::KeyedLocks;
use crate::retry::{retry_transient, retry_unsent, RetryPolicy};

/// How the document is obtained before mutating it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Load<'a> {
    /// Create an empty history named `entity_name` if none exists.
    GetOrCreate { entity_name: &'a str },
    /// Leave missing histories alone; the mutation is skipped.
    Existing,
}

pub(crate) struct Ledger {
    repo: Arc<dyn HistoryRepository>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
    retry: RetryPolicy,
}

impl Ledger {
    pub(crate) fn new(
        repo: Arc<dyn HistoryRepository>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            repo,
            clock,
            locks: KeyedLocks::new(),
            retry,
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Lock `key`, load its history, run `apply`, and save if `apply`
    /// reports a change.
    ///
    /// Returns `Ok(None)` only for [`Load::Existing`] when no history exists.
    pub(crate) async fn mutate<F>(
        &self,
        key: &HistoryKey,
        load: Load<'_>,
        apply: F,
    ) -> Result<Option<EndorsementHistory>, HistoryError>
    where
        F: FnOnce(&mut EndorsementHistory) -> Result<bool, HistoryError> + Send,
    {
        let _guard = self.locks.lock(key).await;

        let loaded = match load {
            Load::GetOrCreate { entity_name } => Some(
                retry_transient(self.retry, "get_or_create", || {
                    self.repo.get_or_create(key, entity_name)
                })
                .await?,
            ),
            Load::Existing => retry_transient(self.retry, "find", || self.repo.find(key)).await?,
        };
        let Some(mut history) = loaded else {
            return Ok(None);
        };

        if !apply(&mut history)? {
            return Ok(Some(history));
        }

        let saved = retry_unsent(self.retry, "save", || self.repo.save(&history)).await?;
        Ok(Some(saved))
    }

    /// Like [`Ledger::mutate`] for callers that only know the history id.
    /// The document is re-read under the key lock before `apply` runs.
    pub(crate) async fn mutate_by_id<F>(
        &self,
        history_id: Uuid,
        apply: F,
    ) -> Result<EndorsementHistory, HistoryError>
    where
        F: FnOnce(&mut EndorsementHistory) -> Result<bool, HistoryError> + Send,
    {
        let key = self.get_by_id(history_id).await?.key();
        self.mutate(&key, Load::Existing, apply)
            .await?
            .ok_or_else(|| missing_history(history_id))
    }

    pub(crate) async fn find(
        &self,
        key: &HistoryKey,
    ) -> Result<Option<EndorsementHistory>, HistoryError> {
        Ok(retry_transient(self.retry, "find", || self.repo.find(key)).await?)
    }

    pub(crate) async fn get_by_id(
        &self,
        history_id: Uuid,
    ) -> Result<EndorsementHistory, HistoryError> {
        retry_transient(self.retry, "get", || self.repo.get(history_id))
            .await?
            .ok_or_else(|| missing_history(history_id))
    }

    pub(crate) async fn list_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<EndorsementHistory>, HistoryError> {
        Ok(retry_transient(self.retry, "list_for_user", || self.repo.list_for_user(user_id)).await?)
    }

    pub(crate) async fn list_all(&self) -> Result<Vec<EndorsementHistory>, HistoryError> {
        Ok(retry_transient(self.retry, "list_all", || self.repo.list_all()).await?)
    }

    pub(crate) async fn ping(&self) -> Result<(), HistoryError> {
        Ok(self.repo.ping().await?)
    }
}

fn missing_history(history_id: Uuid) -> HistoryError {
    HistoryError::NotFound(format!("endorsement history {history_id}"))
}
