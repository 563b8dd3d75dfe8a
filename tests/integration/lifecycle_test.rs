//! Lifecycle manager integration tests.

use std::collections::HashMap;

use serde_json::json;

use plughost_core::{ErrorKind, HostConfig};
use plughost_plugin::{HookContext, PluginSource, PluginState, TriggerOptions};

use crate::helpers::{Behavior, REPLY_ERROR_KEY, REPLY_KEY, TestApp, meta, source};

#[tokio::test]
async fn test_activation_activates_dependencies_first() {
    let app = TestApp::new();
    app.load(vec![
        source("core", &[], &[]),
        source("inbox", &["core"], &[]),
        source("ui", &["inbox"], &[]),
    ])
    .await;

    app.lifecycle.activate("ui").await.unwrap();

    assert_eq!(
        app.calls.matching("activate:"),
        vec!["activate:core", "activate:inbox", "activate:ui"]
    );

    let core = app.lifecycle.plugin_info("core").await.unwrap();
    let inbox = app.lifecycle.plugin_info("inbox").await.unwrap();
    let ui = app.lifecycle.plugin_info("ui").await.unwrap();
    assert_eq!(ui.state, PluginState::Active);
    assert!(core.activated_at.unwrap() <= inbox.activated_at.unwrap());
    assert!(inbox.activated_at.unwrap() <= ui.activated_at.unwrap());
}

#[tokio::test]
async fn test_deactivation_deactivates_dependents_first() {
    let app = TestApp::new();
    app.load(vec![
        source("core", &[], &[]),
        source("inbox", &["core"], &[]),
        source("ui", &["inbox"], &[]),
    ])
    .await;
    app.lifecycle.activate("ui").await.unwrap();

    app.lifecycle.deactivate("core").await.unwrap();

    assert_eq!(
        app.calls.matching("deactivate:"),
        vec!["deactivate:ui", "deactivate:inbox", "deactivate:core"]
    );
    for id in ["core", "inbox", "ui"] {
        assert_eq!(
            app.lifecycle.registry().state(id).await,
            Some(PluginState::Loaded)
        );
    }
}

#[tokio::test]
async fn test_unload_is_blocked_by_dependents() {
    let app = TestApp::new();
    app.load(vec![source("core", &[], &[]), source("inbox", &["core"], &[])])
        .await;
    app.lifecycle.activate("inbox").await.unwrap();

    let err = app.lifecycle.unload("core").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnloadBlocked);
    assert!(err.message.contains("inbox"));

    // Nothing moved.
    assert_eq!(
        app.lifecycle.registry().state("core").await,
        Some(PluginState::Active)
    );
    assert!(app.calls.matching("deactivate:").is_empty());

    app.lifecycle.unload("inbox").await.unwrap();
    app.lifecycle.unload("core").await.unwrap();
    assert_eq!(app.lifecycle.registry().count().await, 0);
}

#[tokio::test]
async fn test_round_trip_leaves_registry_unchanged() {
    let app = TestApp::new();
    app.load(vec![source("core", &[], &[])]).await;

    let before = app.lifecycle.registry().ids().await;

    app.load(vec![source("solo", &[], &["mail.received"])]).await;
    app.lifecycle.activate("solo").await.unwrap();
    app.lifecycle.deactivate("solo").await.unwrap();
    app.lifecycle.unload("solo").await.unwrap();

    assert_eq!(app.lifecycle.registry().ids().await, before);
    assert!(app.lifecycle.registry().state("solo").await.is_none());
    assert_eq!(
        app.lifecycle.plugin_info("solo").await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert!(!app.lifecycle.hooks().has_subscribers("mail.received").await);
    assert_eq!(
        app.calls.entries(),
        vec!["activate:solo", "deactivate:solo", "cleanup:solo"]
    );
}

#[tokio::test]
async fn test_missing_dependency_is_isolated() {
    let app = TestApp::new();

    let err = app
        .lifecycle
        .load(source("compose", &["ghost"], &[]), false)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingDependency);

    let info = app.lifecycle.plugin_info("compose").await.unwrap();
    assert_eq!(info.state, PluginState::Error);
    assert!(info.error.unwrap().contains("ghost"));

    app.load(vec![source("standalone", &[], &[])]).await;
    app.lifecycle.activate("standalone").await.unwrap();

    let status = app.lifecycle.status().await;
    assert_eq!(status.total, 2);
    assert_eq!(status.states.error, 1);
    assert_eq!(status.states.active, 1);
}

#[tokio::test]
async fn test_dependency_in_error_fails_dependent_load() {
    let app = TestApp::with_behaviors(&[(
        "core",
        Behavior {
            fail_activate: true,
            ..Behavior::default()
        },
    )]);
    app.load(vec![source("core", &[], &[])]).await;
    assert!(app.lifecycle.activate("core").await.is_err());

    let err = app
        .lifecycle
        .load(source("inbox", &["core"], &[]), false)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingDependency);
    assert!(err.message.contains("error"));
}

#[tokio::test]
async fn test_fault_cascades_to_active_dependents() {
    let app = TestApp::new();
    app.load(vec![
        source("core", &[], &[]),
        source("inbox", &["core"], &[]),
        source("ui", &["inbox"], &[]),
        source("other", &[], &[]),
    ])
    .await;
    app.lifecycle.activate("ui").await.unwrap();
    app.lifecycle.activate("other").await.unwrap();
    app.calls.clear();

    app.lifecycle.fault("core", "lost connection").await.unwrap();

    assert_eq!(
        app.calls.entries(),
        vec!["deactivate:ui", "deactivate:inbox", "cleanup:core"]
    );

    let registry = app.lifecycle.registry();
    assert_eq!(registry.state("ui").await, Some(PluginState::Loaded));
    assert_eq!(registry.state("inbox").await, Some(PluginState::Loaded));
    assert_eq!(registry.state("other").await, Some(PluginState::Active));

    let core = app.lifecycle.plugin_info("core").await.unwrap();
    assert_eq!(core.state, PluginState::Error);
    assert_eq!(core.error.as_deref(), Some("lost connection"));
    assert!(core.activated_at.is_none());

    // The faulted plugin stays pinned by its loaded dependent.
    assert_eq!(
        app.lifecycle.unload("core").await.unwrap_err().kind,
        ErrorKind::UnloadBlocked
    );
    // A dependent cannot come back while its dependency is broken.
    assert_eq!(
        app.lifecycle.activate("inbox").await.unwrap_err().kind,
        ErrorKind::MissingDependency
    );
}

#[tokio::test]
async fn test_fault_requires_active_plugin() {
    let app = TestApp::new();
    app.load(vec![source("core", &[], &[])]).await;

    let err = app.lifecycle.fault("core", "boom").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);
}

#[tokio::test]
async fn test_disable_and_enable() {
    let app = TestApp::new();
    let plugin = source("labels", &[], &["mail.received"]);
    app.load(vec![plugin.clone()]).await;
    app.lifecycle.activate("labels").await.unwrap();

    app.lifecycle.disable("labels").await.unwrap();
    let info = app.lifecycle.plugin_info("labels").await.unwrap();
    assert_eq!(info.state, PluginState::Disabled);
    assert!(app.lifecycle.registry().instance("labels").await.is_none());
    assert!(!app.lifecycle.hooks().has_subscribers("mail.received").await);
    assert_eq!(
        app.calls.entries(),
        vec!["activate:labels", "deactivate:labels", "cleanup:labels"]
    );

    let err = app.lifecycle.load(plugin, false).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    app.lifecycle.enable("labels").await.unwrap();
    assert_eq!(
        app.lifecycle.registry().state("labels").await,
        Some(PluginState::Loaded)
    );
    app.lifecycle.activate("labels").await.unwrap();
    assert!(app.lifecycle.hooks().has_subscribers("mail.received").await);
}

#[tokio::test]
async fn test_disabled_record_can_be_discarded() {
    let app = TestApp::new();
    app.load(vec![source("labels", &[], &[])]).await;
    app.lifecycle.disable("labels").await.unwrap();

    app.lifecycle.unload("labels").await.unwrap();
    assert_eq!(app.lifecycle.registry().count().await, 0);
}

#[tokio::test]
async fn test_sandbox_grant_policy_denies_load() {
    let mut config = HostConfig::default();
    config.sandbox.grantable_permissions = vec!["storage".to_string()];
    let app = TestApp::with(config, HashMap::new());

    let metadata = meta("net").with_permission("storage").with_permission("network");
    let err = app
        .lifecycle
        .load(PluginSource::builtin("net", metadata), false)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::SandboxDenied);
    assert_eq!(
        app.lifecycle.registry().state("net").await,
        Some(PluginState::Error)
    );
}

#[tokio::test]
async fn test_interface_calls_are_gated_by_sandbox() {
    let app = TestApp::new();
    app.load(vec![
        PluginSource::builtin("book", meta("book").with_interface("contacts")),
        PluginSource::builtin("allowed", meta("allowed").with_api("contacts")),
        PluginSource::builtin("admin", meta("admin").with_api("*")),
        PluginSource::builtin("denied", meta("denied")),
    ])
    .await;

    // The caller must be active.
    let err = app
        .lifecycle
        .call_interface("allowed", "contacts", "echo", json!(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(err.message.contains("allowed"));

    for id in ["allowed", "admin", "denied"] {
        app.lifecycle.activate(id).await.unwrap();
    }

    // So must the provider.
    let err = app
        .lifecycle
        .call_interface("allowed", "contacts", "echo", json!(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(err.message.contains("book"));

    app.lifecycle.activate("book").await.unwrap();

    let reply = app
        .lifecycle
        .call_interface("allowed", "contacts", "echo", json!({ "q": "ada" }))
        .await
        .unwrap();
    assert_eq!(reply["from"], "book");
    assert_eq!(reply["payload"]["q"], "ada");

    assert!(
        app.lifecycle
            .call_interface("admin", "contacts", "echo", json!(null))
            .await
            .is_ok()
    );

    let err = app
        .lifecycle
        .call_interface("denied", "contacts", "echo", json!(null))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SandboxDenied);

    let err = app
        .lifecycle
        .call_interface("admin", "calendar", "echo", json!(null))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_interface_has_single_provider() {
    let app = TestApp::new();
    app.load(vec![PluginSource::builtin(
        "book",
        meta("book").with_interface("contacts"),
    )])
    .await;

    let err = app
        .lifecycle
        .load(
            PluginSource::builtin("crm", meta("crm").with_interface("contacts")),
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(
        app.lifecycle.interfaces().provider("contacts").await.as_deref(),
        Some("book")
    );
    assert_eq!(app.calls.entries(), vec!["cleanup:crm"]);
}

#[tokio::test]
async fn test_undeclared_hook_binding_fails_validation() {
    let app = TestApp::with_behaviors(&[(
        "sneaky",
        Behavior {
            extra_hook: Some("mail.sent".to_string()),
            ..Behavior::default()
        },
    )]);

    let err = app
        .lifecycle
        .load(source("sneaky", &[], &["mail.received"]), false)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ValidationFailure);
    assert!(!app.lifecycle.hooks().has_subscribers("mail.received").await);
    assert_eq!(app.lifecycle.hooks().subscription_count().await, 0);
}

#[tokio::test]
async fn test_invalid_metadata_fails_validation() {
    let app = TestApp::new();
    let mut metadata = meta("odd");
    metadata.version = "one".to_string();

    let err = app
        .lifecycle
        .load(PluginSource::builtin("odd", metadata), false)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValidationFailure);
}

#[tokio::test]
async fn test_self_dependency_never_enters_loading() {
    let app = TestApp::new();
    let err = app
        .lifecycle
        .load(source("loop", &["loop"], &[]), false)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::CircularDependency);
    assert!(app.lifecycle.registry().state("loop").await.is_none());
}

#[tokio::test]
async fn test_concurrent_loads_of_same_id_are_serialised() {
    let app = TestApp::new();

    let (a, b) = tokio::join!(
        app.lifecycle.load(source("dup", &[], &[]), false),
        app.lifecycle.load(source("dup", &[], &[]), false),
    );

    let kinds: Vec<Option<ErrorKind>> = [a, b]
        .into_iter()
        .map(|r| r.err().map(|e| e.kind))
        .collect();
    assert!(kinds.contains(&None));
    assert!(kinds.contains(&Some(ErrorKind::Conflict)));
    assert_eq!(app.lifecycle.registry().count().await, 1);
}

#[tokio::test]
async fn test_unload_all_goes_dependents_first() {
    let app = TestApp::new();
    app.load(vec![
        source("core", &[], &[]),
        source("inbox", &["core"], &[]),
        source("ui", &["inbox"], &[]),
    ])
    .await;
    app.lifecycle.activate("ui").await.unwrap();

    app.lifecycle.unload_all().await.unwrap();

    assert_eq!(
        app.calls.matching("cleanup:"),
        vec!["cleanup:ui", "cleanup:inbox", "cleanup:core"]
    );
    assert_eq!(app.lifecycle.registry().count().await, 0);
}

#[tokio::test]
async fn test_dependencies_activate_in_declared_order() {
    let app = TestApp::new();
    app.load(vec![
        source("alpha", &[], &[]),
        source("zeta", &[], &[]),
        source("app", &["zeta", "alpha"], &[]),
    ])
    .await;

    app.lifecycle.activate("app").await.unwrap();

    assert_eq!(
        app.calls.matching("activate:"),
        vec!["activate:zeta", "activate:alpha", "activate:app"]
    );
    assert_eq!(
        app.lifecycle.registry().dependencies("app").await,
        vec!["zeta", "alpha"]
    );
}

#[tokio::test]
async fn test_plugin_calls_interface_from_hook_handler() {
    let caller = Behavior {
        call_interface: Some("contacts".to_string()),
        ..Behavior::default()
    };
    let app = TestApp::with_behaviors(&[("crm", caller.clone()), ("spy", caller)]);
    app.load(vec![
        PluginSource::builtin("book", meta("book").with_interface("contacts")),
        PluginSource::builtin(
            "crm",
            meta("crm").with_hook("mail.received").with_api("contacts"),
        ),
        PluginSource::builtin("spy", meta("spy").with_hook("mail.sent")),
    ])
    .await;
    for id in ["book", "crm", "spy"] {
        app.lifecycle.activate(id).await.unwrap();
    }

    let out = app
        .lifecycle
        .trigger("mail.received", HookContext::new(), TriggerOptions::default())
        .await
        .unwrap();
    assert_eq!(
        out.get(REPLY_KEY),
        Some(&json!({ "from": "book", "payload": "crm" }))
    );

    // Without the API in its sandbox the call is refused.
    let out = app
        .lifecycle
        .trigger("mail.sent", HookContext::new(), TriggerOptions::default())
        .await
        .unwrap();
    assert_eq!(out.get_string(REPLY_ERROR_KEY), Some("SandboxDenied"));
    assert!(out.get(REPLY_KEY).is_none());
}
