// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable timers.

use async_trait::async_trait;
use chrono::Duration;
use oxbow_core::activity::{
    Activity, ActivityContext, ActivityError, ActivityExecution, Suspension,
};
use serde_json::Value;
use tracing::debug;

/// Suspends the branch for a duration.
///
/// Config:
/// - `Seconds` (number, required): how long to wait, measured from the
///   scheduler's current time.
///
/// The wait is durable: it survives restarts because it is a bookmark with
/// a due time, fired by the timer scheduler's scan rather than an in-process
/// sleep. The node's own id is the correlation, so a looping delay creates
/// a fresh bookmark on every pass.
pub struct Delay;

#[async_trait]
impl Activity for Delay {
    fn kind(&self) -> &str {
        "Delay"
    }

    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityExecution, ActivityError> {
        let seconds = ctx
            .require_config("Seconds")?
            .as_i64()
            .ok_or_else(|| ActivityError::new("config field 'Seconds' must be a number"))?;
        let due_at = ctx.now + Duration::seconds(seconds);
        debug!(instance = %ctx.instance_id, node = ctx.node_id, seconds, %due_at, "sleeping");
        Ok(ActivityExecution::Suspended(Suspension::timer(
            ctx.node_id,
            due_at,
        )))
    }

    async fn resume(
        &self,
        _ctx: &mut ActivityContext<'_>,
        _payload: Value,
    ) -> Result<String, ActivityError> {
        Ok("Done".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{execute_standalone, resume_standalone};
    use serde_json::json;

    #[tokio::test]
    async fn test_execute_suspends_with_due_time() {
        let (execution, _) = execute_standalone(&Delay, [("Seconds", json!(60))])
            .await
            .unwrap();
        let ActivityExecution::Suspended(suspension) = execution else {
            panic!("expected suspension");
        };
        assert!(suspension.due_at.is_some());
        // Correlation is the node id used by the test harness.
        assert_eq!(suspension.correlation, "node-under-test");
    }

    #[tokio::test]
    async fn test_non_numeric_seconds_rejected() {
        let err = execute_standalone(&Delay, [("Seconds", json!("soon"))])
            .await
            .unwrap_err();
        assert!(err.message.contains("Seconds"));
    }

    #[tokio::test]
    async fn test_resume_completes() {
        let (outcome, _) = resume_standalone(&Delay, [("Seconds", json!(1))], Value::Null)
            .await
            .unwrap();
        assert_eq!(outcome, "Done");
    }
}
