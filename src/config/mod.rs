//! Tuner Configuration Module
//!
//! Simulator, severity and optimizer settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `STIMTUNE_CONFIG` environment variable (path to TOML file)
//! 2. `stimtune.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! Binaries call `config::init()` once at startup and read it back with
//! `config::get()`. Library operations never read the global; they take the
//! relevant section explicitly.
//!
//! ```ignore
//! config::init(TunerConfig::load());
//! let batch = config::get().optimizer.batch_size;
//! ```

pub mod defaults;
mod tuner_config;
pub mod validation;

pub use tuner_config::*;

use std::sync::OnceLock;

static TUNER_CONFIG: OnceLock<TunerConfig> = OnceLock::new();

/// Initialize the global tuner configuration. Later calls are ignored.
pub fn init(config: TunerConfig) {
    if TUNER_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Global tuner configuration, or the built-in defaults if `init()` was never called.
pub fn get() -> &'static TunerConfig {
    TUNER_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() called before config::init(), using defaults");
        TunerConfig::default()
    })
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    TUNER_CONFIG.get().is_some()
}
