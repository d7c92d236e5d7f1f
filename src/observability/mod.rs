//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → access lines under the `access` target (middleware::access_log)
//!
//! Consumers:
//!     → logging.rs (EnvFilter + plain or JSON fmt layer on stdout)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID carried on every access line
//! - `RUST_LOG` wins over the configured level

pub mod logging;

pub use logging::init_tracing;
