// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP-shaped triggers and responses.
//!
//! The engine ships no HTTP server; a host routes inbound requests by
//! delivering a trigger with the `"{METHOD} {path}"` correlation these
//! activities declare. [`HttpEndpoint`] parks a workflow (or starts one)
//! on such a trigger and [`HttpResponse`] records the reply the host
//! should send, as the instance output.

use async_trait::async_trait;
use oxbow_core::activity::{
    Activity, ActivityContext, ActivityError, ActivityExecution, Suspension,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

fn endpoint_correlation(method: &str, path: &str) -> String {
    format!("{} {}", method.to_uppercase(), path)
}

/// Waits for an HTTP request on a method and path.
///
/// Config:
/// - `Path` (string, required): request path, e.g. `/documents`.
/// - `Method` (string, optional): HTTP method, default `POST`.
/// - `SaveTo` (string, optional): variable for the request payload,
///   default `Input`.
///
/// With a static config this also acts as a start trigger, so a request
/// hitting the path with no suspended instance starts a fresh one.
pub struct HttpEndpoint;

#[async_trait]
impl Activity for HttpEndpoint {
    fn kind(&self) -> &str {
        "HttpEndpoint"
    }

    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityExecution, ActivityError> {
        let path = ctx.require_config_str("Path")?;
        let method = ctx
            .config_value("Method")
            .and_then(Value::as_str)
            .unwrap_or("POST");
        let correlation = endpoint_correlation(method, path);
        debug!(instance = %ctx.instance_id, node = ctx.node_id, %correlation, "waiting for request");
        Ok(ActivityExecution::Suspended(Suspension::signal(correlation)))
    }

    async fn resume(
        &self,
        ctx: &mut ActivityContext<'_>,
        payload: Value,
    ) -> Result<String, ActivityError> {
        let save_to = ctx
            .config_value("SaveTo")
            .and_then(Value::as_str)
            .unwrap_or("Input");
        ctx.variables.set(save_to.to_string(), payload);
        Ok("Done".to_string())
    }

    fn trigger_correlation(&self, config: &HashMap<String, Value>) -> Option<String> {
        let path = config.get("Path").and_then(Value::as_str)?;
        let method = config
            .get("Method")
            .and_then(Value::as_str)
            .unwrap_or("POST");
        Some(endpoint_correlation(method, path))
    }
}

/// Records the HTTP reply as the instance output.
///
/// Config:
/// - `Body` (any, optional): response body.
/// - `StatusCode` (number, optional): default 200.
///
/// Output shape: `{"statusCode": .., "body": ..}`.
pub struct HttpResponse;

#[async_trait]
impl Activity for HttpResponse {
    fn kind(&self) -> &str {
        "HttpResponse"
    }

    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityExecution, ActivityError> {
        let status = ctx
            .config_value("StatusCode")
            .and_then(Value::as_i64)
            .unwrap_or(200);
        let body = ctx.config_value("Body").cloned().unwrap_or(Value::Null);
        ctx.set_output(json!({ "statusCode": status, "body": body }));
        Ok(ActivityExecution::done())
    }
}
