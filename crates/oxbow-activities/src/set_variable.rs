// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Variable assignment.

use async_trait::async_trait;
use oxbow_core::activity::{Activity, ActivityContext, ActivityError, ActivityExecution};
use tracing::debug;

/// Stores a value in the instance variables.
///
/// Config:
/// - `Name` (string, required): the variable to write.
/// - `Value` (any, required): the value; usually a reference binding so the
///   stored value comes from earlier output.
pub struct SetVariable;

#[async_trait]
impl Activity for SetVariable {
    fn kind(&self) -> &str {
        "SetVariable"
    }

    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityExecution, ActivityError> {
        let name = ctx.require_config_str("Name")?.to_string();
        let value = ctx.require_config("Value")?.clone();
        debug!(instance = %ctx.instance_id, node = ctx.node_id, variable = %name, "setting variable");
        ctx.variables.set(name, value);
        Ok(ActivityExecution::done())
    }
}
