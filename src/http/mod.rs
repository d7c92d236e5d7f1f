//! HTTP plumbing shared by every stage.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum::serve, connect info, graceful shutdown)
//!     → assembled pipeline (crate::assembler)
//!     → stage fails → error.rs (ApiError + Failure marker)
//!     → failure.rs (FailureHandler renders the response)
//!     → Send to client
//! ```

pub mod error;
pub mod failure;
pub mod media;
pub mod server;

pub use error::{ApiError, ErrorDetail};
pub use failure::{FailureHandler, JsonFailureHandler};
pub use server::HttpServer;
