//! Persistence interfaces and backends for oxbow-core.
//!
//! This module defines the persistence abstraction and backend implementations.
//!
//! Instances are stored whole: one row per instance carrying the full
//! serialized state under an optimistic revision counter. Bookmarks are
//! additionally denormalized into their own indexed table so the resume
//! dispatcher can match `(activity_kind, correlation)` and the timer
//! scheduler can scan `due_at` without loading every instance.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryPersistence;
pub use self::sqlite::SqlitePersistence;

use crate::error::{EngineError, Result};
use crate::instance::{InstanceStatus, WorkflowInstance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Pointer to a bookmark somewhere in storage, with enough context to
/// load the owning instance and resume it.
#[derive(Debug, Clone, PartialEq)]
pub struct BookmarkKey {
    /// Instance owning the bookmark.
    pub instance_id: Uuid,
    /// The bookmark's unique ID.
    pub bookmark_id: Uuid,
    /// Kind of the suspended activity.
    pub activity_kind: String,
    /// Correlation value.
    pub correlation: String,
    /// Due time for timer bookmarks.
    pub due_at: Option<DateTime<Utc>>,
    /// When the bookmark was created.
    pub created_at: DateTime<Utc>,
}

/// Lightweight instance listing row, without the full state payload.
#[derive(Debug, Clone)]
pub struct InstanceSummary {
    /// Instance ID.
    pub instance_id: Uuid,
    /// Definition the instance executes.
    pub definition_id: String,
    /// Current status.
    pub status: InstanceStatus,
    /// Current revision.
    pub revision: u64,
    /// When the instance was created.
    pub created_at: DateTime<Utc>,
    /// When the instance last changed.
    pub updated_at: DateTime<Utc>,
}

/// Filter options for listing instances.
#[derive(Debug, Clone, Default)]
pub struct ListInstancesFilter {
    /// Only instances with this status.
    pub status: Option<InstanceStatus>,
    /// Only instances of this definition.
    pub definition_id: Option<String>,
    /// Maximum number of rows to return.
    pub limit: Option<u32>,
}

/// Storage abstraction for workflow instances and their bookmark index.
///
/// Saves use optimistic concurrency: the caller passes the instance at
/// the revision it loaded, and the save succeeds only if storage still
/// holds that revision. A lost race surfaces as
/// [`EngineError::Conflict`]; callers retry from a fresh load.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Persist an instance and its bookmark index atomically.
    ///
    /// An instance at revision 0 is inserted; any other revision is a
    /// compare-and-swap update. Returns the new revision, which the
    /// caller must adopt before saving again.
    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<u64>;

    /// Load an instance by ID. Fails with
    /// [`EngineError::InstanceNotFound`] when absent.
    async fn load_instance(&self, instance_id: Uuid) -> Result<WorkflowInstance>;

    /// Find bookmarks matching a resume key across all instances, oldest
    /// first. An empty result means the delivery is a no-op.
    async fn find_bookmarks(
        &self,
        activity_kind: &str,
        correlation: &str,
    ) -> Result<Vec<BookmarkKey>>;

    /// Timer bookmarks due at or before `as_of`, in due order. The timer
    /// scheduler calls this periodically and resumes each hit.
    async fn due_timers(&self, as_of: DateTime<Utc>, limit: u32) -> Result<Vec<BookmarkKey>>;

    /// List instances matching a filter, newest first.
    async fn list_instances(&self, filter: ListInstancesFilter) -> Result<Vec<InstanceSummary>>;

    /// Delete an instance and its bookmarks. Returns whether a row was
    /// deleted.
    async fn delete_instance(&self, instance_id: Uuid) -> Result<bool>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<()>;
}

/// Compute the revision a successful save of `instance` will produce.
pub(crate) fn next_revision(instance: &WorkflowInstance) -> u64 {
    instance.revision + 1
}

/// Serialize an instance for storage at the revision the save will
/// commit, so a later load observes the same revision in both the row
/// and the state payload.
pub(crate) fn state_at_next_revision(instance: &WorkflowInstance) -> Result<(u64, String)> {
    let new_revision = next_revision(instance);
    let mut to_store = instance.clone();
    to_store.revision = new_revision;
    let state = serde_json::to_string(&to_store)?;
    Ok((new_revision, state))
}

/// Decode a stored state payload.
pub(crate) fn decode_state(instance_id: Uuid, state: &str) -> Result<WorkflowInstance> {
    serde_json::from_str(state).map_err(|e| EngineError::Serialization {
        details: format!("instance '{}' state is unreadable: {}", instance_id, e),
    })
}
