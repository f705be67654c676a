//! Explicitly owned settings cache.
//!
//! A [`SettingsStore`] is constructed by the host and passed to whoever needs
//! configuration. It lazily loads from its path on first [`get`](SettingsStore::get)
//! and hands out cheap `Arc` snapshots until invalidated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::loader::{load_settings_from_path, settings_path};
use crate::types::RuntimeSettings;

/// Lazily loaded, invalidatable settings snapshot.
pub struct SettingsStore {
    path: PathBuf,
    cached: RwLock<Option<Arc<RuntimeSettings>>>,
}

impl SettingsStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(None),
        }
    }

    /// Store backed by `~/.anvil/settings.json`.
    pub fn from_default_path() -> Self {
        Self::new(settings_path())
    }

    /// Store pre-populated with `settings`. Nothing is read until invalidated.
    pub fn with_settings(path: impl Into<PathBuf>, settings: RuntimeSettings) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(Some(Arc::new(settings))),
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot, loading it if nothing is cached.
    ///
    /// A failed load is logged and yields defaults.
    pub fn get(&self) -> Arc<RuntimeSettings> {
        if let Some(settings) = self.cached.read().as_ref() {
            return Arc::clone(settings);
        }
        let mut slot = self.cached.write();
        if let Some(settings) = slot.as_ref() {
            return Arc::clone(settings);
        }
        let loaded = Arc::new(self.load_or_default());
        *slot = Some(Arc::clone(&loaded));
        loaded
    }

    /// Drop the cached snapshot; the next `get` reloads.
    pub fn invalidate(&self) {
        debug!(path = ?self.path, "settings cache invalidated");
        *self.cached.write() = None;
    }

    /// Reload from disk now.
    ///
    /// On success the new snapshot replaces the cache. On failure the cache is
    /// left untouched and the error is returned.
    pub fn reload(&self) -> Result<Arc<RuntimeSettings>> {
        let settings = Arc::new(load_settings_from_path(&self.path)?);
        *self.cached.write() = Some(Arc::clone(&settings));
        Ok(settings)
    }

    fn load_or_default(&self) -> RuntimeSettings {
        match load_settings_from_path(&self.path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "failed to load settings, using defaults");
                RuntimeSettings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_caches_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"agent": {"maxSteps": 7}}"#).unwrap();

        let store = SettingsStore::new(&path);
        let first = store.get();
        assert_eq!(first.agent.max_steps, 7);

        std::fs::write(&path, r#"{"agent": {"maxSteps": 9}}"#).unwrap();
        let second = store.get();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.agent.max_steps, 7);
    }

    #[test]
    fn invalidate_forces_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"agent": {"maxSteps": 7}}"#).unwrap();

        let store = SettingsStore::new(&path);
        assert_eq!(store.get().agent.max_steps, 7);

        std::fs::write(&path, r#"{"agent": {"maxSteps": 9}}"#).unwrap();
        store.invalidate();
        assert_eq!(store.get().agent.max_steps, 9);
    }

    #[test]
    fn bad_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{{{").unwrap();

        let store = SettingsStore::new(&path);
        assert_eq!(*store.get(), RuntimeSettings::default());
    }

    #[test]
    fn reload_error_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"agent": {"maxSteps": 3}}"#).unwrap();

        let store = SettingsStore::new(&path);
        assert_eq!(store.get().agent.max_steps, 3);

        std::fs::write(&path, "broken").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.get().agent.max_steps, 3);

        std::fs::write(&path, r#"{"agent": {"maxSteps": 4}}"#).unwrap();
        assert_eq!(store.reload().unwrap().agent.max_steps, 4);
        assert_eq!(store.get().agent.max_steps, 4);
    }

    #[test]
    fn with_settings_skips_disk() {
        let mut settings = RuntimeSettings::default();
        settings.agent.max_steps = 2;
        let store = SettingsStore::with_settings("/nonexistent/settings.json", settings);
        assert_eq!(store.get().agent.max_steps, 2);
        store.invalidate();
        assert_eq!(store.get().agent.max_steps, 100);
    }
}
