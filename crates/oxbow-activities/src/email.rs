// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Email sending behind a delivery trait.

use async_trait::async_trait;
use oxbow_core::activity::{Activity, ActivityContext, ActivityError, ActivityExecution};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// An outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Delivery mechanism for [`SendEmail`]. Transport details (SMTP, an API,
/// a queue) belong to the host.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message.
    async fn send(&self, email: Email) -> Result<(), ActivityError>;
}

/// A mailer that records messages instead of delivering them.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message recorded so far.
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), ActivityError> {
        self.sent.lock().expect("mailer lock poisoned").push(email);
        Ok(())
    }
}

/// Sends an email through the injected [`Mailer`].
///
/// Config:
/// - `To` (string, required)
/// - `Subject` (string, required)
/// - `Body` (string, optional)
///
/// Outcomes: `Done` on delivery, `Failed` when the mailer reports an
/// error. A delivery failure follows the `Failed` edge instead of
/// faulting the instance, so workflows can route around a flaky
/// transport.
pub struct SendEmail {
    mailer: Arc<dyn Mailer>,
}

impl SendEmail {
    /// Create the activity around a delivery mechanism.
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        SendEmail { mailer }
    }
}

#[async_trait]
impl Activity for SendEmail {
    fn kind(&self) -> &str {
        "SendEmail"
    }

    fn outcomes(&self) -> Vec<String> {
        vec!["Done".to_string(), "Failed".to_string()]
    }

    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityExecution, ActivityError> {
        let email = Email {
            to: ctx.require_config_str("To")?.to_string(),
            subject: ctx.require_config_str("Subject")?.to_string(),
            body: ctx
                .config_value("Body")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        match self.mailer.send(email).await {
            Ok(()) => {
                debug!(instance = %ctx.instance_id, node = ctx.node_id, "email sent");
                Ok(ActivityExecution::done())
            }
            Err(err) => {
                warn!(instance = %ctx.instance_id, node = ctx.node_id, error = %err, "email delivery failed");
                Ok(ActivityExecution::completed("Failed"))
            }
        }
    }
}
