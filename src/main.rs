//! plughost — extension-module host
//!
//! Main entry point that wires the plugin runtime together, loads the
//! discovered plugins, and unloads them again on shutdown.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use plughost_core::config::LoggingConfig;
use plughost_core::{AppError, HostConfig};
use plughost_plugin::{
    DirectoryDiscovery, FactoryLoader, LifecycleManager, PluginHost, PluginRegistry,
};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Plugin host failed");
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<HostConfig, AppError> {
    if let Ok(path) = std::env::var("PLUGHOST_CONFIG") {
        return HostConfig::load_from(&path);
    }

    let env = std::env::var("PLUGHOST_ENV").unwrap_or_else(|_| "development".to_string());
    HostConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main host run function
async fn run(config: HostConfig) -> Result<(), AppError> {
    tracing::info!("Starting plughost v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Loader with compiled-in factories ────────────────
    let mut loader = FactoryLoader::new();
    plugin_event_log::register(&mut loader);

    #[cfg(feature = "dynamic")]
    {
        // SAFETY: only trusted libraries are deployed to the plugin directory.
        let dynamic = unsafe { plughost_plugin::loader::DynamicLoader::new() };
        loader.register_loader(Arc::new(dynamic));
        tracing::info!("Dynamic plugin loading enabled");
    }

    // ── Step 2: Registry, lifecycle manager, host ────────────────
    let registry = Arc::new(PluginRegistry::new());
    let lifecycle = Arc::new(LifecycleManager::new(registry, Arc::new(loader), &config));
    let discovery = Arc::new(DirectoryDiscovery::from_config(&config.plugins));
    let host = PluginHost::new(Arc::clone(&lifecycle), discovery, &config);

    // ── Step 3: Discovery pass ───────────────────────────────────
    if config.plugins.auto_load {
        tracing::info!(directory = %config.plugins.directory, "Loading plugins...");
        for outcome in host.load_all().await? {
            match &outcome.result {
                Ok(state) => tracing::info!(plugin_id = %outcome.id, state = %state, "Plugin ready"),
                Err(e) => tracing::warn!(plugin_id = %outcome.id, error = %e, "Plugin not loaded"),
            }
        }
    } else {
        tracing::info!("Automatic plugin loading is disabled");
    }

    // ── Step 4: Status snapshot ──────────────────────────────────
    let status = lifecycle.status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, unloading plugins...");
    host.shutdown().await?;

    tracing::info!("Plughost shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
