//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! service file (TOML)               AppOptions built in code
//!     → loader.rs (parse)                   │
//!     → validation.rs (semantic checks) ◀───┘
//!     → AppOptions (validated, immutable)
//!     → consumed once by the assembler
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Unknown keys are rejected rather than ignored
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod size;
pub mod validation;

pub use schema::{
    AppConfig, AppOptions, CorsConfig, DocsConfig, ListenerConfig, LoggingConfig,
    ObservabilityConfig, ParserConfig, RoutingConfig, StatusThreshold, ValidatorConfig,
};
pub use size::ByteSize;
