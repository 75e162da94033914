//! In-memory persistence implementation.
//!
//! Keeps whole-instance state as serialized JSON behind an async lock,
//! with the same optimistic revision semantics as the SQLite backend.
//! Useful for embedding and for tests that don't want a database file.

use super::{
    decode_state, state_at_next_revision, BookmarkKey, InstanceSummary, ListInstancesFilter,
    Persistence,
};
use crate::error::{EngineError, Result};
use crate::instance::{InstanceStatus, WorkflowInstance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredInstance {
    revision: u64,
    definition_id: String,
    status: InstanceStatus,
    state: String,
    bookmarks: Vec<BookmarkKey>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Memory-backed persistence provider.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    instances: Arc<RwLock<HashMap<Uuid, StoredInstance>>>,
}

impl MemoryPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances.
    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }
}

fn bookmark_rows(instance: &WorkflowInstance) -> Vec<BookmarkKey> {
    instance
        .bookmarks
        .iter()
        .map(|b| BookmarkKey {
            instance_id: instance.id,
            bookmark_id: b.id,
            activity_kind: b.activity_kind.clone(),
            correlation: b.correlation.clone(),
            due_at: b.due_at,
            created_at: b.created_at,
        })
        .collect()
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<u64> {
        let (new_revision, state) = state_at_next_revision(instance)?;
        let mut instances = self.instances.write().await;

        match instances.get_mut(&instance.id) {
            None if instance.revision == 0 => {
                instances.insert(
                    instance.id,
                    StoredInstance {
                        revision: new_revision,
                        definition_id: instance.definition_id.clone(),
                        status: instance.status,
                        state,
                        bookmarks: bookmark_rows(instance),
                        created_at: instance.created_at,
                        updated_at: instance.updated_at,
                    },
                );
                Ok(new_revision)
            }
            None => Err(EngineError::InstanceNotFound {
                instance_id: instance.id,
            }),
            // An insert raced with another insert of the same instance.
            Some(_) if instance.revision == 0 => Err(EngineError::Conflict {
                instance_id: instance.id,
                revision: 0,
            }),
            Some(stored) => {
                if stored.revision != instance.revision {
                    return Err(EngineError::Conflict {
                        instance_id: instance.id,
                        revision: instance.revision,
                    });
                }
                stored.revision = new_revision;
                stored.status = instance.status;
                stored.state = state;
                stored.bookmarks = bookmark_rows(instance);
                stored.updated_at = instance.updated_at;
                Ok(new_revision)
            }
        }
    }

    async fn load_instance(&self, instance_id: Uuid) -> Result<WorkflowInstance> {
        let instances = self.instances.read().await;
        let stored = instances
            .get(&instance_id)
            .ok_or(EngineError::InstanceNotFound { instance_id })?;
        decode_state(instance_id, &stored.state)
    }

    async fn find_bookmarks(
        &self,
        activity_kind: &str,
        correlation: &str,
    ) -> Result<Vec<BookmarkKey>> {
        let instances = self.instances.read().await;
        let mut hits: Vec<BookmarkKey> = instances
            .values()
            .flat_map(|stored| stored.bookmarks.iter())
            .filter(|b| b.activity_kind == activity_kind && b.correlation == correlation)
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.bookmark_id.cmp(&b.bookmark_id))
        });
        Ok(hits)
    }

    async fn due_timers(&self, as_of: DateTime<Utc>, limit: u32) -> Result<Vec<BookmarkKey>> {
        let instances = self.instances.read().await;
        let mut due: Vec<BookmarkKey> = instances
            .values()
            .flat_map(|stored| stored.bookmarks.iter())
            .filter(|b| b.due_at.is_some_and(|at| at <= as_of))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.due_at
                .cmp(&b.due_at)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.bookmark_id.cmp(&b.bookmark_id))
        });
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn list_instances(&self, filter: ListInstancesFilter) -> Result<Vec<InstanceSummary>> {
        let instances = self.instances.read().await;
        let mut summaries: Vec<InstanceSummary> = instances
            .iter()
            .filter(|(_, stored)| {
                filter.status.is_none_or(|s| stored.status == s)
                    && filter
                        .definition_id
                        .as_ref()
                        .is_none_or(|d| &stored.definition_id == d)
            })
            .map(|(id, stored)| InstanceSummary {
                instance_id: *id,
                definition_id: stored.definition_id.clone(),
                status: stored.status,
                revision: stored.revision,
                created_at: stored.created_at,
                updated_at: stored.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        if let Some(limit) = filter.limit {
            summaries.truncate(limit as usize);
        }
        Ok(summaries)
    }

    async fn delete_instance(&self, instance_id: Uuid) -> Result<bool> {
        let mut instances = self.instances.write().await;
        Ok(instances.remove(&instance_id).is_some())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
