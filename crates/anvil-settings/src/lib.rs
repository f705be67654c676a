//! # anvil-settings
//!
//! Layered runtime configuration.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RuntimeSettings::default()`]
//! 2. **User file**: `~/.anvil/settings.json` (overlaid per key)
//! 3. **Environment variables**: `ANVIL_*` overrides (highest priority)
//!
//! There is no process-wide singleton. Hosts build a [`SettingsStore`] and
//! pass it to the components that read configuration.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod store;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, load_with_env, overlay, settings_path};
pub use store::SettingsStore;
pub use types::*;
