//! Session registry lifecycle against the scripted factory.

use std::sync::Arc;
use std::time::Duration;

use acp_bridge::conversation::Conversation;
use acp_bridge::models::mode::{ConfirmationMode, ConfirmationPolicy};
use acp_bridge::AppError;
use serde_json::{json, Map};
use uuid::Uuid;

use super::test_helpers::{drain, harness, terminal_action, terminal_output, update_kinds};

#[tokio::test]
async fn get_or_create_returns_same_handle() {
    let h = harness();
    let id = Uuid::new_v4();

    let first = h.registry.get_or_create(id, None, None).await.expect("create");
    let second = h.registry.get_or_create(id, None, None).await.expect("cached");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.factory.created().len(), 1);
    assert_eq!(first.id(), id);
}

#[tokio::test]
async fn concurrent_creation_starts_one_conversation() {
    let h = harness();
    h.factory.set_start_delay(Duration::from_millis(50));
    let id = Uuid::new_v4();

    let (a, b) = tokio::join!(
        h.registry.get_or_create(id, None, None),
        h.registry.get_or_create(id, None, None),
    );

    assert!(Arc::ptr_eq(&a.expect("first"), &b.expect("second")));
    assert_eq!(h.factory.created().len(), 1);
}

#[tokio::test]
async fn slow_creation_leaves_other_sessions_reachable() {
    let h = harness();
    let ready = Uuid::new_v4();
    h.registry.get_or_create(ready, None, None).await.expect("create");
    h.factory.set_start_delay(Duration::from_secs(5));

    let registry = Arc::clone(&h.registry);
    let slow = Uuid::new_v4();
    let creating = tokio::spawn(async move { registry.get_or_create(slow, None, None).await.map(drop) });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!creating.is_finished());

    tokio::time::timeout(Duration::from_millis(500), async {
        assert!(h.registry.get(ready).await.is_some());
        assert_eq!(h.registry.list().await.len(), 1);
        h.registry
            .set_mode(ready, ConfirmationMode::AlwaysApprove)
            .await
            .expect("set mode");
        h.registry.close(ready).await.expect("close");
    })
    .await
    .expect("operations on other sessions do not wait for the slow start");

    creating.abort();
}

#[tokio::test]
async fn get_or_load_resumes_persisted_conversation() {
    let h = harness();
    let id = Uuid::new_v4();
    h.factory.persist(id, vec![terminal_action("c1", "ls")]);

    let handle = h.registry.get_or_load(id).await.expect("load");
    let again = h.registry.get_or_load(id).await.expect("cached");

    assert!(Arc::ptr_eq(&handle, &again));
    let specs = h.factory.specs();
    assert_eq!(specs.len(), 1);
    assert!(specs[0].resume);
    assert_eq!(h.factory.last().logged_events().len(), 1);
}

#[tokio::test]
async fn new_session_uses_default_dir_and_mode() {
    let h = harness();
    let id = Uuid::new_v4();
    h.registry.get_or_create(id, None, None).await.expect("create");

    let session = h.registry.session(id).await.expect("cached");
    assert_eq!(session.working_dir, h.temp.path());
    assert_eq!(session.mode, ConfirmationMode::AlwaysAsk);

    let specs = h.factory.specs();
    let spec = &specs[0];
    assert!(!spec.resume);
    assert_eq!(spec.conversation_id, id);
    assert_eq!(
        h.factory.last().policy_changes(),
        vec![ConfirmationPolicy::AlwaysConfirm]
    );
}

#[tokio::test]
async fn missing_working_dir_is_created() {
    let h = harness();
    let dir = h.temp.path().join("nested").join("workspace");

    h.registry
        .get_or_create(Uuid::new_v4(), Some(&dir), None)
        .await
        .expect("create");

    assert!(dir.is_dir());
}

#[tokio::test]
async fn file_as_working_dir_is_rejected_and_not_cached() {
    let h = harness();
    let file = h.temp.path().join("not-a-dir");
    std::fs::write(&file, "x").expect("write");
    let id = Uuid::new_v4();

    let err = h
        .registry
        .get_or_create(id, Some(&file), None)
        .await
        .err()
        .expect("rejected");

    assert!(matches!(err, AppError::InvalidInput(_)));
    assert!(h.registry.get(id).await.is_none());
    assert!(h.factory.created().is_empty());
}

#[tokio::test]
async fn factory_failure_is_not_cached() {
    let h = harness();
    let id = Uuid::new_v4();
    h.factory.fail_next("Agent not configured");

    let err = h.registry.get_or_create(id, None, None).await.err().expect("fails");
    assert!(matches!(err, AppError::NotConfigured(_)));
    assert!(h.registry.get(id).await.is_none());

    h.registry.get_or_create(id, None, None).await.expect("retry succeeds");
    assert_eq!(h.factory.created().len(), 1);
}

#[tokio::test]
async fn client_mcp_servers_merge_over_base() {
    let h = harness();
    let mut extra = Map::new();
    extra.insert("fs".into(), json!({"command": "mcp-fs", "transport": "stdio"}));

    h.registry
        .get_or_create(Uuid::new_v4(), None, Some(extra))
        .await
        .expect("create");

    let specs = h.factory.specs();
    let spec = &specs[0];
    assert_eq!(spec.mcp_servers["fs"]["command"], "mcp-fs");
}

#[tokio::test]
async fn resume_replaces_handle_and_keeps_mode() {
    let h = harness();
    let id = Uuid::new_v4();
    let first = h.registry.get_or_create(id, None, None).await.expect("create");
    h.registry
        .set_mode(id, ConfirmationMode::AlwaysApprove)
        .await
        .expect("set mode");

    let resumed = h.registry.resume(id, None, None).await.expect("resume");

    assert!(!Arc::ptr_eq(&first, &resumed));
    assert!(h.factory.created()[0].is_closed());
    assert!(h.factory.specs()[1].resume);
    assert_eq!(h.registry.mode(id).await, Some(ConfirmationMode::AlwaysApprove));
    assert_eq!(
        h.factory.last().policy_changes(),
        vec![ConfirmationPolicy::NeverConfirm]
    );
}

#[tokio::test]
async fn replay_history_sends_stored_events_in_order() {
    let mut h = harness();
    let id = Uuid::new_v4();
    h.factory.persist(
        id,
        vec![terminal_action("c1", "ls"), terminal_output("c1", "a.txt")],
    );
    h.registry.resume(id, None, None).await.expect("resume");

    let sent = h.registry.replay_history(id).await.expect("replay");

    assert_eq!(sent, 2);
    let messages = drain(&mut h.outbound);
    assert_eq!(update_kinds(&messages), vec!["tool_call", "tool_call_update"]);
    assert_eq!(messages[0]["params"]["sessionId"], id.to_string());
}

#[tokio::test]
async fn replay_of_unknown_session_is_not_found() {
    let h = harness();
    let err = h.registry.replay_history(Uuid::new_v4()).await.err().expect("fails");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn close_is_idempotent() {
    let h = harness();
    let id = Uuid::new_v4();
    h.registry.get_or_create(id, None, None).await.expect("create");

    h.registry.close(id).await.expect("close");
    h.registry.close(id).await.expect("close again");
    h.registry.close(Uuid::new_v4()).await.expect("close unknown");

    assert!(h.registry.get(id).await.is_none());
    assert!(h.factory.last().is_closed());
}

#[tokio::test]
async fn close_all_releases_everything() {
    let h = harness();
    for _ in 0..3 {
        h.registry.get_or_create(Uuid::new_v4(), None, None).await.expect("create");
    }

    h.registry.close_all().await;

    assert!(h.registry.list().await.is_empty());
    assert!(h.factory.created().iter().all(|conversation| conversation.is_closed()));
}

#[tokio::test]
async fn list_is_oldest_first() {
    let h = harness();
    let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    for id in ids {
        h.registry.get_or_create(id, None, None).await.expect("create");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let listed: Vec<String> = h
        .registry
        .list()
        .await
        .into_iter()
        .map(|info| info.session_id)
        .collect();

    let expected: Vec<String> = ids.iter().map(Uuid::to_string).collect();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn set_mode_on_unknown_session_is_not_found() {
    let h = harness();
    let err = h
        .registry
        .set_mode(Uuid::new_v4(), ConfirmationMode::LlmApprove)
        .await
        .err()
        .expect("fails");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn set_mode_updates_policy_and_record() {
    let h = harness();
    let id = Uuid::new_v4();
    h.registry.get_or_create(id, None, None).await.expect("create");

    h.registry
        .set_mode(id, ConfirmationMode::LlmApprove)
        .await
        .expect("set mode");

    assert_eq!(h.registry.mode(id).await, Some(ConfirmationMode::LlmApprove));
    assert_eq!(
        h.factory.last().policy_changes().last().copied(),
        Some(ConfirmationPolicy::confirm_risky())
    );
}
