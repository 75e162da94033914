// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Standard activity library.
//!
//! The engine executes whatever implements `Activity`; this crate supplies
//! the kinds most workflows are built from: variable assignment, named
//! signals, durable delays, HTTP-shaped triggers and responses, and email
//! behind a pluggable [`Mailer`]. [`standard_registry`] bundles them into a
//! ready-made `ActivityRegistry`.

#![deny(missing_docs)]

pub mod delay;
pub mod email;
pub mod http;
pub mod set_variable;
pub mod signals;

pub use delay::Delay;
pub use email::{Email, Mailer, RecordingMailer, SendEmail};
pub use http::{HttpEndpoint, HttpResponse};
pub use set_variable::SetVariable;
pub use signals::ReceiveSignal;

use oxbow_core::activity::ActivityRegistry;
use std::sync::Arc;

/// Registry with every standard activity registered.
///
/// `SendEmail` needs a delivery mechanism, so the host supplies the
/// [`Mailer`]; everything else is stateless.
pub fn standard_registry(mailer: Arc<dyn Mailer>) -> ActivityRegistry {
    ActivityRegistry::new()
        .with(Arc::new(SetVariable))
        .with(Arc::new(ReceiveSignal))
        .with(Arc::new(Delay))
        .with(Arc::new(HttpEndpoint))
        .with(Arc::new(HttpResponse))
        .with(Arc::new(SendEmail::new(mailer)))
}

/// Commonly used types for building and running workflows.
pub mod prelude {
    pub use crate::{
        standard_registry, Delay, Email, HttpEndpoint, HttpResponse, Mailer, ReceiveSignal,
        RecordingMailer, SendEmail, SetVariable,
    };
    pub use oxbow_core::{Engine, InstanceStatus, MemoryPersistence};
    pub use oxbow_dsl::{BindingValue, JoinMode, WorkflowBuilder};
}
