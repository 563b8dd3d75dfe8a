//! Loader strategies — turn a plugin source into a running instance.
//!
//! [`FactoryLoader`] is the default: a closed table of compiled-in factories
//! keyed by the metadata main entry (falling back to the plugin id), with
//! additional loaders chained behind it. With the `dynamic` feature,
//! [`DynamicLoader`] instantiates plugins from shared libraries.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use plughost_core::{AppError, AppResult};

use crate::metadata::PluginSource;
use crate::traits::Plugin;

/// Strategy for constructing plugin instances.
pub trait PluginLoader: Send + Sync + std::fmt::Debug {
    /// Loader name for logs.
    fn name(&self) -> &str;

    /// Whether this loader knows how to instantiate `source`.
    fn can_load(&self, source: &PluginSource) -> bool;

    /// Constructs the plugin instance. Must not run any lifecycle hook.
    fn instantiate(&self, source: &PluginSource) -> AppResult<Arc<dyn Plugin>>;
}

/// Factory function for a compiled-in plugin.
pub type PluginFactory = Arc<dyn Fn(&PluginSource) -> AppResult<Arc<dyn Plugin>> + Send + Sync>;

/// Closed registry of plugin factories, plus chained loaders.
#[derive(Default)]
pub struct FactoryLoader {
    /// Main-entry reference or plugin id → factory.
    factories: HashMap<String, PluginFactory>,
    /// Consulted in order when no factory matches.
    fallbacks: Vec<Arc<dyn PluginLoader>>,
}

impl std::fmt::Debug for FactoryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.factories.keys().collect();
        keys.sort();
        f.debug_struct("FactoryLoader")
            .field("factories", &keys)
            .field("fallbacks", &self.fallbacks)
            .finish()
    }
}

impl FactoryLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a main-entry reference or plugin id.
    pub fn register<F>(&mut self, key: &str, factory: F) -> &mut Self
    where
        F: Fn(&PluginSource) -> AppResult<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.insert(key.to_string(), Arc::new(factory));
        self
    }

    /// Chains another loader behind the factory table.
    pub fn register_loader(&mut self, loader: Arc<dyn PluginLoader>) -> &mut Self {
        self.fallbacks.push(loader);
        self
    }

    /// Whether a factory exists for `key`.
    pub fn has_factory(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    fn factory_for(&self, source: &PluginSource) -> Option<&PluginFactory> {
        self.factories
            .get(&source.metadata.main)
            .or_else(|| self.factories.get(&source.id))
    }
}

impl PluginLoader for FactoryLoader {
    fn name(&self) -> &str {
        "factory"
    }

    fn can_load(&self, source: &PluginSource) -> bool {
        self.factory_for(source).is_some() || self.fallbacks.iter().any(|l| l.can_load(source))
    }

    fn instantiate(&self, source: &PluginSource) -> AppResult<Arc<dyn Plugin>> {
        if let Some(factory) = self.factory_for(source) {
            debug!(plugin_id = %source.id, main = %source.metadata.main, "Instantiating from factory");
            return factory(source);
        }

        match self.fallbacks.iter().find(|l| l.can_load(source)) {
            Some(loader) => {
                debug!(plugin_id = %source.id, loader = loader.name(), "Instantiating from loader");
                loader.instantiate(source)
            }
            None => Err(AppError::validation(format!(
                "No loader can instantiate plugin '{}' (main '{}')",
                source.id, source.metadata.main
            ))),
        }
    }
}

#[cfg(feature = "dynamic")]
pub use dynamic::{CREATE_PLUGIN_SYMBOL, CreatePluginFn, DynamicLoader};

#[cfg(feature = "dynamic")]
mod dynamic {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use tracing::info;

    use plughost_core::{AppError, AppResult};

    use super::PluginLoader;
    use crate::metadata::PluginSource;
    use crate::traits::Plugin;

    /// Symbol every dynamic plugin library must export.
    pub const CREATE_PLUGIN_SYMBOL: &[u8] = b"plughost_create_plugin\0";

    /// Signature of [`CREATE_PLUGIN_SYMBOL`]; returns a leaked `Box<Box<dyn Plugin>>`.
    pub type CreatePluginFn = unsafe extern "C" fn() -> *mut Box<dyn Plugin>;

    /// Loads plugins from shared libraries (`.so` / `.dll` / `.dylib`).
    ///
    /// The library path is the plugin location joined with the metadata main
    /// entry. Libraries stay mapped for the lifetime of the loader.
    pub struct DynamicLoader {
        /// Loaded libraries.
        libraries: Mutex<Vec<libloading::Library>>,
    }

    impl std::fmt::Debug for DynamicLoader {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let loaded = self.libraries.lock().map(|l| l.len()).unwrap_or_default();
            f.debug_struct("DynamicLoader")
                .field("loaded_count", &loaded)
                .finish()
        }
    }

    impl DynamicLoader {
        /// Creates a dynamic loader.
        ///
        /// # Safety
        /// Every library this loader opens runs arbitrary code in-process.
        /// Callers must only point it at trusted libraries that export
        /// [`CREATE_PLUGIN_SYMBOL`] with the [`CreatePluginFn`] signature and
        /// were built against the same version of this crate.
        pub unsafe fn new() -> Self {
            Self {
                libraries: Mutex::new(Vec::new()),
            }
        }

        fn library_path(source: &PluginSource) -> PathBuf {
            source.location.join(&source.metadata.main)
        }
    }

    impl PluginLoader for DynamicLoader {
        fn name(&self) -> &str {
            "dynamic"
        }

        fn can_load(&self, source: &PluginSource) -> bool {
            Self::library_path(source)
                .extension()
                .is_some_and(|ext| ext.to_str() == Some(std::env::consts::DLL_EXTENSION))
        }

        fn instantiate(&self, source: &PluginSource) -> AppResult<Arc<dyn Plugin>> {
            let path = Self::library_path(source);

            // SAFETY: trust in the library was asserted when the loader was created.
            let library = unsafe { libloading::Library::new(&path) }.map_err(|e| {
                AppError::validation(format!(
                    "Failed to load plugin library '{}': {}",
                    path.display(),
                    e
                ))
            })?;

            // SAFETY: the symbol signature is part of the contract accepted in `new`.
            let plugin = unsafe {
                let create: libloading::Symbol<CreatePluginFn> =
                    library.get(CREATE_PLUGIN_SYMBOL).map_err(|e| {
                        AppError::validation(format!(
                            "Plugin library '{}' does not export plughost_create_plugin: {}",
                            path.display(),
                            e
                        ))
                    })?;

                let raw = create();
                if raw.is_null() {
                    return Err(AppError::validation(format!(
                        "Plugin library '{}' returned a null plugin",
                        path.display()
                    )));
                }
                *Box::from_raw(raw)
            };

            self.libraries
                .lock()
                .map_err(|_| AppError::internal("Dynamic loader library table is poisoned"))?
                .push(library);

            info!(plugin_id = %source.id, path = %path.display(), "Dynamic plugin loaded");

            Ok(Arc::from(plugin))
        }
    }
}
