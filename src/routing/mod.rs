//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Handler registration (at construction):
//!     operation key → registry.rs (axum handler, boxed)
//!
//! Route compilation (at construction):
//!     OperationIndex + HandlerRegistry
//!     → dispatch.rs (one axum route per path template)
//!     → nested under the API base path
//!     → frozen as an immutable axum Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at construction, immutable at runtime
//! - Deterministic: the same document and handlers produce the same routes
//! - Undocumented requests never reach a handler

pub mod dispatch;
pub mod registry;

pub use dispatch::{build_router, RoutingError};
pub use registry::HandlerRegistry;
