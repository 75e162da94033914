//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::instance::{InstanceStatus, WorkflowInstance};

use super::{
    decode_state, state_at_next_revision, BookmarkKey, InstanceSummary, ListInstancesFilter,
    Persistence,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    /// The caller is responsible for having run migrations.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// This convenience constructor handles all setup:
    /// - Creates parent directories if they don't exist
    /// - Creates the database file if it doesn't exist
    /// - Connects to the database with sensible defaults
    /// - Runs all migrations
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::Database {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let path_str = path.to_string_lossy();
        let url = format!("sqlite:{}?mode=rwc", path_str);
        Self::connect(&url).await
    }

    /// Connect to a SQLite URL (e.g. `sqlite:oxbow.db?mode=rwc` or
    /// `sqlite::memory:`) and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| EngineError::Database {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at '{}': {}", url, e),
            })?;

        MIGRATOR.run(&pool).await.map_err(|e| EngineError::Database {
            operation: "migrate".to_string(),
            details: format!("Failed to run migrations: {}", e),
        })?;

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct BookmarkRow {
    bookmark_id: String,
    instance_id: String,
    activity_kind: String,
    correlation: String,
    due_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl BookmarkRow {
    fn into_key(self) -> Result<BookmarkKey> {
        Ok(BookmarkKey {
            instance_id: parse_uuid(&self.instance_id)?,
            bookmark_id: parse_uuid(&self.bookmark_id)?,
            activity_kind: self.activity_kind,
            correlation: self.correlation,
            due_at: self.due_at,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    instance_id: String,
    definition_id: String,
    revision: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SummaryRow {
    fn into_summary(self) -> Result<InstanceSummary> {
        let status: InstanceStatus =
            self.status
                .parse()
                .map_err(|details| EngineError::Serialization { details })?;
        Ok(InstanceSummary {
            instance_id: parse_uuid(&self.instance_id)?,
            definition_id: self.definition_id,
            status,
            revision: self.revision as u64,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| EngineError::Serialization {
        details: format!("stored ID '{}' is not a UUID: {}", raw, e),
    })
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<u64> {
        let (new_revision, state) = state_at_next_revision(instance)?;
        let instance_id = instance.id.to_string();
        let mut tx = self.pool.begin().await?;

        if instance.revision == 0 {
            let inserted = sqlx::query(
                r#"
                INSERT INTO instances (instance_id, definition_id, revision, status, state, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(instance_id) DO NOTHING
                "#,
            )
            .bind(&instance_id)
            .bind(&instance.definition_id)
            .bind(new_revision as i64)
            .bind(instance.status.as_str())
            .bind(&state)
            .bind(instance.created_at)
            .bind(instance.updated_at)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 0 {
                return Err(EngineError::Conflict {
                    instance_id: instance.id,
                    revision: 0,
                });
            }
        } else {
            let updated = sqlx::query(
                r#"
                UPDATE instances
                SET revision = ?, status = ?, state = ?, updated_at = ?
                WHERE instance_id = ? AND revision = ?
                "#,
            )
            .bind(new_revision as i64)
            .bind(instance.status.as_str())
            .bind(&state)
            .bind(instance.updated_at)
            .bind(&instance_id)
            .bind(instance.revision as i64)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(EngineError::Conflict {
                    instance_id: instance.id,
                    revision: instance.revision,
                });
            }
        }

        // The bookmark index mirrors instance state, so rebuild it inside
        // the same transaction.
        sqlx::query("DELETE FROM bookmarks WHERE instance_id = ?")
            .bind(&instance_id)
            .execute(&mut *tx)
            .await?;

        for bookmark in &instance.bookmarks {
            sqlx::query(
                r#"
                INSERT INTO bookmarks (bookmark_id, instance_id, activity_kind, correlation, due_at, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(bookmark.id.to_string())
            .bind(&instance_id)
            .bind(&bookmark.activity_kind)
            .bind(&bookmark.correlation)
            .bind(bookmark.due_at)
            .bind(bookmark.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(new_revision)
    }

    async fn load_instance(&self, instance_id: Uuid) -> Result<WorkflowInstance> {
        let state: Option<(String,)> =
            sqlx::query_as("SELECT state FROM instances WHERE instance_id = ?")
                .bind(instance_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match state {
            Some((state,)) => decode_state(instance_id, &state),
            None => Err(EngineError::InstanceNotFound { instance_id }),
        }
    }

    async fn find_bookmarks(
        &self,
        activity_kind: &str,
        correlation: &str,
    ) -> Result<Vec<BookmarkKey>> {
        let rows = sqlx::query_as::<_, BookmarkRow>(
            r#"
            SELECT bookmark_id, instance_id, activity_kind, correlation, due_at, created_at
            FROM bookmarks
            WHERE activity_kind = ? AND correlation = ?
            ORDER BY created_at ASC, bookmark_id ASC
            "#,
        )
        .bind(activity_kind)
        .bind(correlation)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BookmarkRow::into_key).collect()
    }

    async fn due_timers(&self, as_of: DateTime<Utc>, limit: u32) -> Result<Vec<BookmarkKey>> {
        let rows = sqlx::query_as::<_, BookmarkRow>(
            r#"
            SELECT bookmark_id, instance_id, activity_kind, correlation, due_at, created_at
            FROM bookmarks
            WHERE due_at IS NOT NULL AND due_at <= ?
            ORDER BY due_at ASC, created_at ASC, bookmark_id ASC
            LIMIT ?
            "#,
        )
        .bind(as_of)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BookmarkRow::into_key).collect()
    }

    async fn list_instances(&self, filter: ListInstancesFilter) -> Result<Vec<InstanceSummary>> {
        // LIMIT -1 means "no limit" in SQLite.
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let status = filter.status.map(|s| s.as_str().to_string());

        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT instance_id, definition_id, revision, status, created_at, updated_at
            FROM instances
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR definition_id = ?2)
            ORDER BY created_at DESC, instance_id ASC
            LIMIT ?3
            "#,
        )
        .bind(status)
        .bind(filter.definition_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    async fn delete_instance(&self, instance_id: Uuid) -> Result<bool> {
        let instance_id = instance_id.to_string();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM bookmarks WHERE instance_id = ?")
            .bind(&instance_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM instances WHERE instance_id = ?")
            .bind(&instance_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
