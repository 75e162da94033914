// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity contract and registry.
//!
//! Activities are the executable units workflow nodes refer to by kind.
//! The engine calls [`Activity::execute`] when a branch reaches a node; the
//! activity either completes with an outcome or suspends behind a
//! bookmark. When a matching signal or timer arrives later, the engine
//! consumes the bookmark and calls [`Activity::resume`] with the payload.
//!
//! Implementations hold no per-instance state. Everything an execution
//! needs arrives through the [`ActivityContext`], and everything durable
//! lives in the instance.

use crate::instance::InstanceSettings;
use crate::variables::Variables;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oxbow_dsl::{ActivityCatalog, OUTCOME_DONE};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Activity Errors
// ============================================================================

/// Failure raised by an activity. The engine wraps it with instance and
/// node context and faults the instance.
#[derive(Debug, Clone)]
pub struct ActivityError {
    /// Human-readable failure description.
    pub message: String,
}

impl ActivityError {
    /// Create an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        ActivityError {
            message: message.into(),
        }
    }

    /// Error for a config field the activity requires but did not get.
    pub fn missing_config(field: &str) -> Self {
        ActivityError {
            message: format!("required config field '{}' is missing", field),
        }
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ActivityError {}

impl From<String> for ActivityError {
    fn from(message: String) -> Self {
        ActivityError { message }
    }
}

impl From<&str> for ActivityError {
    fn from(message: &str) -> Self {
        ActivityError {
            message: message.to_string(),
        }
    }
}

// ============================================================================
// Execution Results
// ============================================================================

/// What an activity asks for when it suspends.
#[derive(Debug, Clone, PartialEq)]
pub struct Suspension {
    /// Correlation value for the bookmark, e.g. a signal name or endpoint
    /// path. Resumes match on `(activity kind, correlation)`.
    pub correlation: String,
    /// For timers, the absolute time the bookmark becomes due. Signal
    /// bookmarks leave this unset and wait indefinitely.
    pub due_at: Option<DateTime<Utc>>,
}

impl Suspension {
    /// Suspend until a signal with this correlation arrives.
    pub fn signal(correlation: impl Into<String>) -> Self {
        Suspension {
            correlation: correlation.into(),
            due_at: None,
        }
    }

    /// Suspend until the timer scheduler fires at `due_at`.
    pub fn timer(correlation: impl Into<String>, due_at: DateTime<Utc>) -> Self {
        Suspension {
            correlation: correlation.into(),
            due_at: Some(due_at),
        }
    }
}

/// Result of [`Activity::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityExecution {
    /// The activity finished with an outcome; the branch follows the
    /// matching edge.
    Completed {
        /// The produced outcome, one of [`Activity::outcomes`].
        outcome: String,
    },
    /// The activity parked behind a bookmark; the branch waits.
    Suspended(Suspension),
}

impl ActivityExecution {
    /// Complete with an arbitrary outcome.
    pub fn completed(outcome: impl Into<String>) -> Self {
        ActivityExecution::Completed {
            outcome: outcome.into(),
        }
    }

    /// Complete with the default `"Done"` outcome.
    pub fn done() -> Self {
        Self::completed(OUTCOME_DONE)
    }
}

// ============================================================================
// Activity Context
// ============================================================================

/// Everything an activity sees during one execute or resume call.
///
/// `config` holds the node's input bindings already evaluated against the
/// instance variables. Variable writes go through `variables` and are
/// persisted with the instance when the tick saves.
pub struct ActivityContext<'a> {
    /// The executing instance.
    pub instance_id: Uuid,
    /// The node being executed.
    pub node_id: &'a str,
    /// The branch executing it.
    pub branch_id: u64,
    /// Evaluated input bindings.
    pub config: &'a HashMap<String, Value>,
    /// Instance variables, mutable for the duration of the call.
    pub variables: &'a mut Variables,
    /// The instance's output slot. Whatever is here when the instance
    /// finishes is its result.
    pub output: &'a mut Option<Value>,
    /// Configuration snapshot from instance creation.
    pub settings: &'a InstanceSettings,
    /// Scheduler's current time. Activities use this instead of the wall
    /// clock so replays and tests are deterministic.
    pub now: DateTime<Utc>,
}

impl ActivityContext<'_> {
    /// Get an evaluated config value.
    pub fn config_value(&self, field: &str) -> Option<&Value> {
        self.config.get(field)
    }

    /// Get a config value, failing if absent.
    pub fn require_config(&self, field: &str) -> Result<&Value, ActivityError> {
        self.config
            .get(field)
            .ok_or_else(|| ActivityError::missing_config(field))
    }

    /// Get a config value as a string, failing if absent or not a string.
    pub fn require_config_str(&self, field: &str) -> Result<&str, ActivityError> {
        self.require_config(field)?.as_str().ok_or_else(|| {
            ActivityError::new(format!("config field '{}' must be a string", field))
        })
    }

    /// Set the instance output.
    pub fn set_output(&mut self, value: Value) {
        *self.output = Some(value);
    }
}

// ============================================================================
// Activity Trait
// ============================================================================

/// An executable unit of work referenced by workflow nodes.
#[async_trait]
pub trait Activity: Send + Sync {
    /// The kind this activity registers under, e.g. `"ReceiveSignal"`.
    fn kind(&self) -> &str;

    /// The outcomes this activity can complete with. Validation checks
    /// edge labels against this vocabulary at build time.
    fn outcomes(&self) -> Vec<String> {
        vec![OUTCOME_DONE.to_string()]
    }

    /// Execute the activity at a node. Runs when a branch first reaches
    /// the node, and again on every later visit (loops re-execute).
    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityExecution, ActivityError>;

    /// Resume after a suspension, consuming the delivered payload, and
    /// produce the final outcome for the node.
    ///
    /// The default rejects resumption; only activities that suspend need
    /// to override this.
    async fn resume(
        &self,
        ctx: &mut ActivityContext<'_>,
        payload: Value,
    ) -> Result<String, ActivityError> {
        let _ = (ctx, payload);
        Err(ActivityError::new(format!(
            "activity kind '{}' does not support resume",
            self.kind()
        )))
    }

    /// Correlation under which this activity can act as a workflow
    /// trigger, derived from its raw config evaluated with no variables.
    ///
    /// When a definition's entry node returns `Some`, delivering a
    /// payload for `(kind, correlation)` with no matching bookmark starts
    /// a fresh instance. Most activities are not triggers and return
    /// `None`.
    fn trigger_correlation(&self, config: &HashMap<String, Value>) -> Option<String> {
        let _ = config;
        None
    }
}

/// Shared handle to a registered activity.
pub type DynActivity = Arc<dyn Activity>;

// ============================================================================
// Activity Registry
// ============================================================================

/// Maps activity kinds to implementations.
///
/// The registry doubles as the source of the [`ActivityCatalog`] used to
/// validate definitions, so the outcome vocabulary the validator checks
/// is exactly the one the runtime executes.
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    activities: HashMap<String, DynActivity>,
}

impl ActivityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity under its kind. Re-registering a kind
    /// replaces the previous implementation.
    pub fn register(&mut self, activity: DynActivity) {
        self.activities
            .insert(activity.kind().to_string(), activity);
    }

    /// Register, builder style.
    pub fn with(mut self, activity: DynActivity) -> Self {
        self.register(activity);
        self
    }

    /// Look up an activity by kind.
    pub fn get(&self, kind: &str) -> Option<DynActivity> {
        self.activities.get(kind).cloned()
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.activities.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Number of registered activities.
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Build the validation catalog from the registered activities.
    pub fn catalog(&self) -> ActivityCatalog {
        let mut catalog = ActivityCatalog::new();
        for activity in self.activities.values() {
            catalog.register(activity.kind(), activity.outcomes());
        }
        catalog
    }
}

impl std::fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Probe;

    #[async_trait]
    impl Activity for Probe {
        fn kind(&self) -> &str {
            "Probe"
        }

        fn outcomes(&self) -> Vec<String> {
            vec!["High".to_string(), "Low".to_string()]
        }

        async fn execute(
            &self,
            ctx: &mut ActivityContext<'_>,
        ) -> Result<ActivityExecution, ActivityError> {
            let threshold = ctx
                .require_config("Threshold")?
                .as_i64()
                .ok_or_else(|| ActivityError::new("Threshold must be a number"))?;
            let outcome = if threshold > 10 { "High" } else { "Low" };
            Ok(ActivityExecution::completed(outcome))
        }
    }

    fn context<'a>(
        config: &'a HashMap<String, Value>,
        variables: &'a mut Variables,
        output: &'a mut Option<Value>,
        settings: &'a InstanceSettings,
    ) -> ActivityContext<'a> {
        ActivityContext {
            instance_id: Uuid::new_v4(),
            node_id: "probe",
            branch_id: 0,
            config,
            variables,
            output,
            settings,
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_execute_reads_config() {
        let mut config = HashMap::new();
        config.insert("Threshold".to_string(), json!(42));
        let mut variables = Variables::new();
        let mut output = None;
        let settings = InstanceSettings::default();
        let mut ctx = context(&config, &mut variables, &mut output, &settings);

        let result = Probe.execute(&mut ctx).await.unwrap();
        assert_eq!(result, ActivityExecution::completed("High"));
    }

    #[tokio::test]
    async fn test_missing_config_fails() {
        let config = HashMap::new();
        let mut variables = Variables::new();
        let mut output = None;
        let settings = InstanceSettings::default();
        let mut ctx = context(&config, &mut variables, &mut output, &settings);

        let err = Probe.execute(&mut ctx).await.unwrap_err();
        assert!(err.message.contains("Threshold"));
    }

    #[tokio::test]
    async fn test_default_resume_rejects() {
        let config = HashMap::new();
        let mut variables = Variables::new();
        let mut output = None;
        let settings = InstanceSettings::default();
        let mut ctx = context(&config, &mut variables, &mut output, &settings);

        let err = Probe.resume(&mut ctx, json!({})).await.unwrap_err();
        assert!(err.message.contains("does not support resume"));
    }

    #[test]
    fn test_registry_builds_catalog() {
        let registry = ActivityRegistry::new().with(Arc::new(Probe));
        assert_eq!(registry.kinds(), vec!["Probe".to_string()]);

        let catalog = registry.catalog();
        assert!(catalog.contains("Probe"));
        assert_eq!(
            catalog.outcomes("Probe"),
            Some(&["High".to_string(), "Low".to_string()][..])
        );
    }

    #[test]
    fn test_registry_lookup_miss() {
        let registry = ActivityRegistry::new();
        assert!(registry.get("Probe").is_none());
        assert!(registry.is_empty());
    }
}
