use super::types::Config;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

pub type ConfigListener = Arc<dyn Fn(&Arc<Config>) + Send + Sync>;

/// Settings collaborator consumed by the orchestrator.
pub trait SettingsStore: Send + Sync {
    fn global_sandbox_enabled(&self) -> bool;
    fn on_config_change(&self, listener: ConfigListener);
}

/// Shared configuration. Readers take an `Arc<Config>` snapshot; writers swap
/// the whole object, so no reader ever observes a half-applied update.
pub struct ConfigHandle {
    current: RwLock<Arc<Config>>,
    listeners: Mutex<Vec<ConfigListener>>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        Arc::clone(&self.current.read())
    }

    /// Swap in `config` and notify listeners. Returns the previous snapshot.
    pub fn replace(&self, config: Config) -> Arc<Config> {
        let next = Arc::new(config);
        let previous = {
            let mut guard = self.current.write();
            std::mem::replace(&mut *guard, Arc::clone(&next))
        };

        // listeners run outside the write lock so they may call snapshot()
        let listeners: Vec<ConfigListener> = self.listeners.lock().clone();
        for listener in listeners {
            listener(&next);
        }
        previous
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl SettingsStore for ConfigHandle {
    fn global_sandbox_enabled(&self) -> bool {
        self.current.read().sandbox_enabled
    }

    fn on_config_change(&self, listener: ConfigListener) {
        self.listeners.lock().push(listener);
    }
}
