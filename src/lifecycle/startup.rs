//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a loaded service configuration into an assembled [`App`]
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners are bound by the caller, after assembly succeeds

use crate::assembler::{App, AssembleError};
use crate::config::AppConfig;

/// Assemble the application described by `config`.
pub fn assemble(config: &AppConfig) -> Result<App, AssembleError> {
    tracing::info!(
        definition = %config.definition_path.display(),
        bind_address = %config.listener.bind_address,
        "Assembling application"
    );
    App::builder(config.definition_path.clone())
        .options(config.options.clone())
        .build()
}
