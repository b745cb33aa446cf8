//! Postgres-backed [`HistoryRepository`] over the `endorsement_histories` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use endorse_core::{EndorsementHistory, EndorsementPeriod, EntityType, HistoryKey};

use crate::{repository::HistoryRepository, DbError};

const HISTORY_COLUMNS: &str = "id, user_id, entity_type, entity_id, entity_name, \
     total_days_endorsed, total_days_in_top5, total_days_in_top10, periods, \
     is_currently_endorsed, current_position, current_period_start_date, \
     created_at, updated_at, version";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `endorsement_histories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryRow {
    pub id: Uuid,
    pub user_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub entity_name: String,
    pub total_days_endorsed: i64,
    pub total_days_in_top5: i64,
    pub total_days_in_top10: i64,
    pub periods: Json<Vec<EndorsementPeriod>>,
    pub is_currently_endorsed: bool,
    pub current_position: Option<i32>,
    pub current_period_start_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl TryFrom<HistoryRow> for EndorsementHistory {
    type Error = DbError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let entity_type = row
            .entity_type
            .parse::<EntityType>()
            .map_err(|e| DbError::InvalidRow {
                id: row.id,
                reason: e.to_string(),
            })?;

        Ok(EndorsementHistory {
            id: row.id,
            user_id: row.user_id,
            entity_type,
            entity_id: row.entity_id,
            entity_name: row.entity_name,
            total_days_endorsed: row.total_days_endorsed,
            total_days_in_top5: row.total_days_in_top5,
            total_days_in_top10: row.total_days_in_top10,
            periods: row.periods.0,
            is_currently_endorsed: row.is_currently_endorsed,
            current_position: row.current_position,
            current_period_start_date: row.current_period_start_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

fn into_histories(rows: Vec<HistoryRow>) -> Result<Vec<EndorsementHistory>, DbError> {
    rows.into_iter().map(EndorsementHistory::try_from).collect()
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgHistoryRepository {
    pool: PgPool,
}

impl PgHistoryRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl HistoryRepository for PgHistoryRepository {
    /// Inserts an empty history if the key is absent, then reads it back.
    ///
    /// `ON CONFLICT DO NOTHING` on the `(user_id, entity_type, entity_id)`
    /// constraint makes concurrent first references converge on one row.
    async fn get_or_create(
        &self,
        key: &HistoryKey,
        entity_name: &str,
    ) -> Result<EndorsementHistory, DbError> {
        sqlx::query(
            "INSERT INTO endorsement_histories (id, user_id, entity_type, entity_id, entity_name) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, entity_type, entity_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(&key.user_id)
        .bind(key.entity_type.as_str())
        .bind(&key.entity_id)
        .bind(entity_name)
        .execute(&self.pool)
        .await?;

        self.find(key).await?.ok_or(DbError::NotFound)
    }

    async fn find(&self, key: &HistoryKey) -> Result<Option<EndorsementHistory>, DbError> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM endorsement_histories \
             WHERE user_id = $1 AND entity_type = $2 AND entity_id = $3"
        ))
        .bind(&key.user_id)
        .bind(key.entity_type.as_str())
        .bind(&key.entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EndorsementHistory::try_from).transpose()
    }

    async fn get(&self, id: Uuid) -> Result<Option<EndorsementHistory>, DbError> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM endorsement_histories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EndorsementHistory::try_from).transpose()
    }

    /// Upserts the whole document, conditional on the stored version.
    ///
    /// A brand-new id is inserted with `version + 1`. An existing row is
    /// updated only when its `version` still equals `history.version`;
    /// otherwise no row comes back and the write is rejected as stale.
    async fn save(&self, history: &EndorsementHistory) -> Result<EndorsementHistory, DbError> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "INSERT INTO endorsement_histories \
                 (id, user_id, entity_type, entity_id, entity_name, \
                  total_days_endorsed, total_days_in_top5, total_days_in_top10, periods, \
                  is_currently_endorsed, current_position, current_period_start_date, \
                  created_at, updated_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), $14 + 1) \
             ON CONFLICT (id) DO UPDATE SET \
                 entity_name               = EXCLUDED.entity_name, \
                 total_days_endorsed       = EXCLUDED.total_days_endorsed, \
                 total_days_in_top5        = EXCLUDED.total_days_in_top5, \
                 total_days_in_top10       = EXCLUDED.total_days_in_top10, \
                 periods                   = EXCLUDED.periods, \
                 is_currently_endorsed     = EXCLUDED.is_currently_endorsed, \
                 current_position          = EXCLUDED.current_position, \
                 current_period_start_date = EXCLUDED.current_period_start_date, \
                 updated_at                = NOW(), \
                 version                   = endorsement_histories.version + 1 \
             WHERE endorsement_histories.version = $14 \
             RETURNING {HISTORY_COLUMNS}"
        ))
        .bind(history.id)
        .bind(&history.user_id)
        .bind(history.entity_type.as_str())
        .bind(&history.entity_id)
        .bind(&history.entity_name)
        .bind(history.total_days_endorsed)
        .bind(history.total_days_in_top5)
        .bind(history.total_days_in_top10)
        .bind(Json(&history.periods))
        .bind(history.is_currently_endorsed)
        .bind(history.current_position)
        .bind(history.current_period_start_date)
        .bind(history.created_at)
        .bind(history.version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => EndorsementHistory::try_from(row),
            None => {
                tracing::warn!(
                    history_id = %history.id,
                    expected_version = history.version,
                    "rejected stale endorsement history write"
                );
                Err(DbError::VersionConflict {
                    id: history.id,
                    expected: history.version,
                })
            }
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EndorsementHistory>, DbError> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM endorsement_histories \
             WHERE user_id = $1 \
             ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        into_histories(rows)
    }

    async fn list_all(&self) -> Result<Vec<EndorsementHistory>, DbError> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM endorsement_histories \
             ORDER BY user_id, created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        into_histories(rows)
    }

    async fn ping(&self) -> Result<(), DbError> {
        crate::ping(&self.pool).await?;
        Ok(())
    }
}
