//! Infrastructure layer
//!
//! Filesystem-backed stores and the local implementations of the engine's
//! capability ports:
//! - Configuration loading (figment)
//! - Logging (tracing)
//! - Atomic writes and the environment lock
//! - Ledger, settings and instruction document stores
//! - Installers, trust store, value resolver and confirmer

pub mod capabilities;
pub mod config;
pub mod fs;
pub mod ledger_store;
pub mod logging;
pub mod settings_store;
pub mod template_store;
