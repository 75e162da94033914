// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Named signals.

use async_trait::async_trait;
use oxbow_core::activity::{
    Activity, ActivityContext, ActivityError, ActivityExecution, Suspension,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Waits for a named signal.
///
/// Config:
/// - `Signal` (string, required): the signal name; the bookmark's
///   correlation key.
/// - `SaveTo` (string, optional): variable to store the signal payload in.
///
/// When `Signal` is a static binding on a definition's entry node, the
/// signal doubles as a start trigger: delivering it with no matching
/// bookmark starts a fresh instance.
pub struct ReceiveSignal;

#[async_trait]
impl Activity for ReceiveSignal {
    fn kind(&self) -> &str {
        "ReceiveSignal"
    }

    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityExecution, ActivityError> {
        let signal = ctx.require_config_str("Signal")?;
        debug!(instance = %ctx.instance_id, node = ctx.node_id, signal, "waiting for signal");
        Ok(ActivityExecution::Suspended(Suspension::signal(signal)))
    }

    async fn resume(
        &self,
        ctx: &mut ActivityContext<'_>,
        payload: Value,
    ) -> Result<String, ActivityError> {
        if let Some(save_to) = ctx.config_value("SaveTo").and_then(Value::as_str) {
            ctx.variables.set(save_to.to_string(), payload);
        }
        Ok("Done".to_string())
    }

    fn trigger_correlation(&self, config: &HashMap<String, Value>) -> Option<String> {
        config
            .get("Signal")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
