// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end document approval workflow.
//!
//! A request parks the instance on three competing waits: an approve
//! signal, a reject signal, and a reminder loop on a durable timer. The
//! first signal wins the wait-any join and the instance answers the
//! original request.

use chrono::{Duration, Utc};
use oxbow_activities::prelude::*;
use oxbow_core::{Clock, Engine, ManualClock, MemoryPersistence};
use oxbow_dsl::{BindingValue, WorkflowDefinition};
use serde_json::{json, Value};
use std::sync::Arc;

fn approval_definition(mailer: &Arc<RecordingMailer>, mode: JoinMode) -> WorkflowDefinition {
    let registry = standard_registry(mailer.clone());
    WorkflowBuilder::new("document-approval")
        .activity("receive", "HttpEndpoint", [(
            "Path",
            BindingValue::immediate("/documents"),
        )])
        .activity("store", "SetVariable", [
            ("Name", BindingValue::immediate("Document")),
            ("Value", BindingValue::reference("Input.Body")),
        ])
        .fork("split", ["approve", "reject", "remind"])
        .activity("approve", "ReceiveSignal", [(
            "Signal",
            BindingValue::immediate("Approve"),
        )])
        .activity("reject", "ReceiveSignal", [(
            "Signal",
            BindingValue::immediate("Reject"),
        )])
        .activity_named("remind", "Reminder", "Delay", [(
            "Seconds",
            BindingValue::immediate(60),
        )])
        .activity("notify", "SendEmail", [
            ("To", BindingValue::immediate("boss@acme.example")),
            ("Subject", BindingValue::immediate("Document waiting")),
            ("Body", BindingValue::immediate("Please review it.")),
        ])
        .join("merge", mode)
        .activity("respond", "HttpResponse", [(
            "Body",
            BindingValue::immediate("Thanks for the hard work!"),
        )])
        .then("receive", "store")
        .then("store", "split")
        .then("approve", "merge")
        .then("reject", "merge")
        .then("remind", "notify")
        // The reminder loops through its named node until a signal wins.
        .then("notify", "Reminder")
        .then("merge", "respond")
        .build(&registry.catalog())
        .expect("definition should validate")
}

struct Harness {
    engine: Engine,
    mailer: Arc<RecordingMailer>,
    clock: Arc<ManualClock>,
    persistence: MemoryPersistence,
}

fn harness(mode: JoinMode) -> Harness {
    let mailer = Arc::new(RecordingMailer::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let persistence = MemoryPersistence::new();
    let engine = Engine::builder()
        .persistence(Arc::new(persistence.clone()))
        .activities(standard_registry(mailer.clone()))
        .definition(approval_definition(&mailer, mode))
        .clock(clock.clone())
        .build()
        .expect("engine should build");
    Harness {
        engine,
        mailer,
        clock,
        persistence,
    }
}

async fn submit_document(engine: &Engine) -> uuid::Uuid {
    let touched = engine
        .deliver_trigger(
            "HttpEndpoint",
            "POST /documents",
            json!({ "Body": { "Id": 3, "Author": { "Name": "John" } } }),
        )
        .await
        .expect("trigger should deliver");
    assert_eq!(touched.len(), 1, "one instance should start");
    touched[0]
}

#[tokio::test]
async fn test_request_parks_instance_on_three_bookmarks() {
    let h = harness(JoinMode::WaitAny);
    let id = submit_document(&h.engine).await;

    let instance = h.engine.instance(id).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Suspended);
    assert_eq!(
        instance.variables.get("Document"),
        Some(&json!({ "Id": 3, "Author": { "Name": "John" } }))
    );

    let mut correlations: Vec<_> = instance
        .bookmarks
        .iter()
        .map(|b| b.correlation.as_str())
        .collect();
    correlations.sort();
    assert_eq!(correlations, ["Approve", "Reject", "remind"]);
    let timer = instance
        .bookmarks
        .iter()
        .find(|b| b.due_at.is_some())
        .expect("reminder timer bookmark");
    assert_eq!(timer.due_at, Some(h.clock.now() + Duration::seconds(60)));
}

#[tokio::test]
async fn test_approval_wins_the_wait_any_join() {
    let h = harness(JoinMode::WaitAny);
    let id = submit_document(&h.engine).await;

    let touched = h.engine.signal("Approve", json!("ok")).await.unwrap();
    assert_eq!(touched, vec![id]);

    let instance = h.engine.instance(id).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Finished);
    assert!(
        instance.bookmarks.is_empty(),
        "losing bookmarks must be deleted"
    );
    assert_eq!(
        instance.output,
        Some(json!({ "statusCode": 200, "body": "Thanks for the hard work!" }))
    );

    // The losing reject signal finds nothing to resume.
    let late = h.engine.signal("Reject", Value::Null).await.unwrap();
    assert!(late.is_empty());
    let after = h.engine.instance(id).await.unwrap();
    assert_eq!(after.status, InstanceStatus::Finished);
}

#[tokio::test]
async fn test_reminder_fires_and_loops_before_any_signal() {
    let h = harness(JoinMode::WaitAny);
    let id = submit_document(&h.engine).await;
    let started_at = h.clock.now();

    h.clock.advance(Duration::seconds(60));
    let fired = h.engine.fire_due_timers(10).await.unwrap();
    assert_eq!(fired, 1);

    assert_eq!(
        h.mailer.sent(),
        vec![Email {
            to: "boss@acme.example".to_string(),
            subject: "Document waiting".to_string(),
            body: "Please review it.".to_string(),
        }]
    );

    // The loop re-entered the reminder node: still suspended, signal
    // bookmarks untouched, and a fresh timer one interval out.
    let instance = h.engine.instance(id).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Suspended);
    assert_eq!(instance.bookmarks.len(), 3);
    let timer = instance
        .bookmarks
        .iter()
        .find(|b| b.due_at.is_some())
        .expect("fresh reminder bookmark");
    assert_eq!(timer.due_at, Some(started_at + Duration::seconds(120)));

    // An approval still completes the workflow after any number of
    // reminders.
    h.clock.advance(Duration::seconds(60));
    assert_eq!(h.engine.fire_due_timers(10).await.unwrap(), 1);
    h.engine.signal("Approve", Value::Null).await.unwrap();
    let finished = h.engine.instance(id).await.unwrap();
    assert_eq!(finished.status, InstanceStatus::Finished);
    assert_eq!(h.mailer.sent().len(), 2);
}

#[tokio::test]
async fn test_wait_all_join_needs_both_signals() {
    let mailer = Arc::new(RecordingMailer::new());
    let registry = standard_registry(mailer.clone());
    // Two signals, no reminder: wait-all would never release with a
    // looping branch in the group.
    let definition = WorkflowBuilder::new("countersign")
        .activity("receive", "HttpEndpoint", [(
            "Path",
            BindingValue::immediate("/contracts"),
        )])
        .fork("split", ["first", "second"])
        .activity("first", "ReceiveSignal", [(
            "Signal",
            BindingValue::immediate("FirstSigned"),
        )])
        .activity("second", "ReceiveSignal", [(
            "Signal",
            BindingValue::immediate("SecondSigned"),
        )])
        .join("merge", JoinMode::WaitAll)
        .activity("respond", "HttpResponse", [(
            "Body",
            BindingValue::immediate("Fully signed"),
        )])
        .then("receive", "split")
        .then("first", "merge")
        .then("second", "merge")
        .then("merge", "respond")
        .build(&registry.catalog())
        .unwrap();
    let engine = Engine::builder()
        .persistence(Arc::new(MemoryPersistence::new()))
        .activities(registry)
        .definition(definition)
        .build()
        .unwrap();

    let touched = engine
        .deliver_trigger("HttpEndpoint", "POST /contracts", Value::Null)
        .await
        .unwrap();
    let id = touched[0];

    engine.signal("SecondSigned", Value::Null).await.unwrap();
    let halfway = engine.instance(id).await.unwrap();
    assert_eq!(halfway.status, InstanceStatus::Suspended);
    assert_eq!(halfway.bookmarks.len(), 1);

    engine.signal("FirstSigned", Value::Null).await.unwrap();
    let done = engine.instance(id).await.unwrap();
    assert_eq!(done.status, InstanceStatus::Finished);
    assert_eq!(
        done.output,
        Some(json!({ "statusCode": 200, "body": "Fully signed" }))
    );
}

#[tokio::test]
async fn test_suspended_instance_survives_restart() {
    let h = harness(JoinMode::WaitAny);
    let id = submit_document(&h.engine).await;
    let before = h.engine.instance(id).await.unwrap();

    // A second engine over the same store stands in for a restarted
    // process.
    let revived = Engine::builder()
        .persistence(Arc::new(h.persistence.clone()))
        .activities(standard_registry(h.mailer.clone()))
        .definition(approval_definition(&h.mailer, JoinMode::WaitAny))
        .clock(h.clock.clone())
        .build()
        .unwrap();

    let reloaded = revived.instance(id).await.unwrap();
    assert_eq!(reloaded.variables.as_json(), before.variables.as_json());
    assert_eq!(reloaded.bookmarks, before.bookmarks);
    assert_eq!(reloaded.branches.len(), before.branches.len());

    revived.signal("Approve", Value::Null).await.unwrap();
    let finished = revived.instance(id).await.unwrap();
    assert_eq!(finished.status, InstanceStatus::Finished);
}

#[tokio::test]
async fn test_concurrent_signals_serialize_to_one_winner() {
    let h = harness(JoinMode::WaitAny);
    let id = submit_document(&h.engine).await;

    let approve = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.signal("Approve", Value::Null).await })
    };
    let reject = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.signal("Reject", Value::Null).await })
    };
    let approved = approve.await.unwrap().unwrap();
    let rejected = reject.await.unwrap().unwrap();

    // Exactly one signal reaches the join; the other finds its bookmark
    // already cancelled.
    assert_eq!(approved.len() + rejected.len(), 1);

    let instance = h.engine.instance(id).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Finished);
    assert!(instance.bookmarks.is_empty());
    assert_eq!(
        instance.output,
        Some(json!({ "statusCode": 200, "body": "Thanks for the hard work!" }))
    );
}

#[tokio::test]
async fn test_cancellation_clears_waits() {
    let h = harness(JoinMode::WaitAny);
    let id = submit_document(&h.engine).await;

    h.engine.cancel_instance(id).await.unwrap();

    let instance = h.engine.instance(id).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Cancelled);
    assert!(instance.bookmarks.is_empty());

    // Neither a late signal nor a due timer revives it.
    h.clock.advance(Duration::seconds(120));
    assert_eq!(h.engine.fire_due_timers(10).await.unwrap(), 0);
    let late = h.engine.signal("Approve", Value::Null).await.unwrap();
    assert!(late.is_empty());
    assert!(h.mailer.sent().is_empty());
}
