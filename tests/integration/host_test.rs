//! Discovery and bulk loading integration tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use plughost_core::{AppResult, ErrorKind, HostConfig};
use plughost_plugin::{
    DirectoryDiscovery, DiscoveryReport, PluginDiscovery, PluginLoadResult, PluginState,
    StaticDiscovery,
};

use crate::helpers::{TEST_MAIN, TestApp, source};

fn write_manifest(root: &Path, id: &str, deps: &[&str]) {
    let manifest = serde_json::json!({
        "name": id,
        "version": "1.0.0",
        "main": TEST_MAIN,
        "dependencies": deps,
    });
    write_raw(root, id, &manifest.to_string());
}

fn write_raw(root: &Path, id: &str, content: &str) {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("plugin.json"), content).unwrap();
}

/// core <- inbox, a <-> b, orphan -> ghost, and an unreadable manifest.
fn plugin_tree() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    write_manifest(root.path(), "inbox", &["core"]);
    write_manifest(root.path(), "core", &[]);
    write_manifest(root.path(), "a", &["b"]);
    write_manifest(root.path(), "b", &["a"]);
    write_manifest(root.path(), "orphan", &["ghost"]);
    write_raw(root.path(), "broken", "{ not json");
    std::fs::create_dir_all(root.path().join("assets")).unwrap();
    std::fs::write(root.path().join("README.txt"), "not a plugin").unwrap();
    root
}

fn by_id(results: Vec<PluginLoadResult>) -> HashMap<String, AppResult<PluginState>> {
    results.into_iter().map(|r| (r.id, r.result)).collect()
}

fn kind_of(result: &AppResult<PluginState>) -> Option<ErrorKind> {
    result.as_ref().err().map(|e| e.kind)
}

#[tokio::test]
async fn test_load_all_from_directory() {
    let root = plugin_tree();
    let app = TestApp::new();
    let host = app.host(Arc::new(DirectoryDiscovery::new(root.path(), "plugin.json")));

    let results = by_id(host.load_all().await.unwrap());
    assert_eq!(results.len(), 6);

    assert_eq!(results["core"].as_ref().ok(), Some(&PluginState::Active));
    assert_eq!(results["inbox"].as_ref().ok(), Some(&PluginState::Active));
    assert_eq!(kind_of(&results["a"]), Some(ErrorKind::CircularDependency));
    assert_eq!(kind_of(&results["b"]), Some(ErrorKind::CircularDependency));
    assert_eq!(kind_of(&results["orphan"]), Some(ErrorKind::MissingDependency));
    assert_eq!(kind_of(&results["broken"]), Some(ErrorKind::ValidationFailure));

    let registry = app.lifecycle.registry();
    assert!(registry.state("a").await.is_none());
    assert!(registry.state("b").await.is_none());
    assert!(registry.state("broken").await.is_none());

    let orphan = app.lifecycle.plugin_info("orphan").await.unwrap();
    assert_eq!(orphan.state, PluginState::Error);
    assert!(orphan.error.unwrap().contains("ghost"));

    assert_eq!(
        app.calls.matching("activate:"),
        vec!["activate:core", "activate:inbox"]
    );
}

#[tokio::test]
async fn test_second_pass_keeps_known_plugins() {
    let root = plugin_tree();
    let app = TestApp::new();
    let host = app.host(Arc::new(DirectoryDiscovery::new(root.path(), "plugin.json")));

    host.load_all().await.unwrap();
    app.lifecycle.disable("inbox").await.unwrap();
    app.calls.clear();

    let results = by_id(host.load_all().await.unwrap());

    assert_eq!(results["core"].as_ref().ok(), Some(&PluginState::Active));
    assert_eq!(results["inbox"].as_ref().ok(), Some(&PluginState::Disabled));
    assert_eq!(kind_of(&results["orphan"]), Some(ErrorKind::MissingDependency));
    assert!(app.calls.entries().is_empty());

    let registry = app.lifecycle.registry();
    assert_eq!(registry.state("inbox").await, Some(PluginState::Disabled));
    assert_eq!(registry.state("orphan").await, Some(PluginState::Error));
    assert_eq!(registry.count().await, 3);
}

#[tokio::test]
async fn test_error_record_recovers_once_dependency_appears() {
    let root = plugin_tree();
    let app = TestApp::new();
    let host = app.host(Arc::new(DirectoryDiscovery::new(root.path(), "plugin.json")));

    host.load_all().await.unwrap();
    write_manifest(root.path(), "ghost", &[]);

    let results = by_id(host.load_all().await.unwrap());

    assert_eq!(results["ghost"].as_ref().ok(), Some(&PluginState::Active));
    assert_eq!(results["orphan"].as_ref().ok(), Some(&PluginState::Active));
    let orphan = app.lifecycle.plugin_info("orphan").await.unwrap();
    assert!(orphan.error.is_none());
}

#[tokio::test]
async fn test_load_all_without_auto_activate() {
    let mut config = HostConfig::default();
    config.plugins.auto_activate = false;
    let app = TestApp::with(config, HashMap::new());
    let host = app.host(Arc::new(StaticDiscovery::new(vec![
        source("inbox", &["core"], &[]),
        source("core", &[], &[]),
    ])));

    let results = host.load_all().await.unwrap();

    assert!(results.iter().all(PluginLoadResult::is_ok));
    assert_eq!(
        app.lifecycle.registry().ids_in(PluginState::Loaded).await,
        vec!["core", "inbox"]
    );
    assert!(app.calls.entries().is_empty());
}

#[tokio::test]
async fn test_missing_directory_loads_nothing() {
    let root = tempfile::tempdir().unwrap();
    let app = TestApp::new();
    let host = app.host(Arc::new(DirectoryDiscovery::new(
        root.path().join("absent"),
        "plugin.json",
    )));

    assert!(host.load_all().await.unwrap().is_empty());
    assert_eq!(app.lifecycle.registry().count().await, 0);
}

#[tokio::test]
async fn test_shutdown_unloads_dependents_first() {
    let app = TestApp::new();
    let host = app.host(Arc::new(StaticDiscovery::new(vec![
        source("core", &[], &[]),
        source("inbox", &["core"], &[]),
        source("ui", &["inbox"], &[]),
    ])));
    host.load_all().await.unwrap();

    host.shutdown().await.unwrap();

    assert_eq!(
        app.calls.matching("deactivate:"),
        vec!["deactivate:ui", "deactivate:inbox", "deactivate:core"]
    );
    assert_eq!(
        app.calls.matching("cleanup:"),
        vec!["cleanup:ui", "cleanup:inbox", "cleanup:core"]
    );
    assert_eq!(app.lifecycle.registry().count().await, 0);
}

#[derive(Debug)]
struct StalledDiscovery;

#[async_trait]
impl PluginDiscovery for StalledDiscovery {
    async fn discover(&self) -> AppResult<DiscoveryReport> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(DiscoveryReport::default())
    }
}

#[tokio::test(start_paused = true)]
async fn test_discovery_timeout() {
    let mut config = HostConfig::default();
    config.lifecycle.discovery_timeout_ms = 250;
    let app = TestApp::with(config, HashMap::new());
    let host = app.host(Arc::new(StalledDiscovery));

    let err = host.load_all().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(app.lifecycle.registry().count().await, 0);
}
