//! Pipeline stages.
//!
//! # Data Flow
//! ```text
//! Request
//!     → cors.rs (preflight and response headers)
//!     → body.rs (size limit, JSON / form / text / raw parsing)
//!     → access_log.rs (one line per response at or above the threshold)
//!     → cookies.rs (CookieJar extension)
//!     → docs.rs (documentation UI, served before validation)
//!     → validate.rs (operation lookup, parameter and body schemas)
//!     → normalize.rs (coerced RequestParams extension)
//!     → custom.rs (caller middlewares, in registration order)
//!     → routing (operation handlers)
//! ```
//!
//! # Design Decisions
//! - Stages are plain axum middleware functions with `Arc` state
//! - Stages that fail return [`ApiError`](crate::http::ApiError); rendering
//!   happens once, at the edge of the pipeline

pub mod access_log;
pub mod body;
pub mod cookies;
pub mod cors;
pub mod custom;
pub mod docs;
pub mod normalize;
pub mod validate;

pub use access_log::AccessLog;
pub use body::{BodyParser, ParsedBody};
pub use custom::Middleware;
pub use normalize::{ParamNormalizer, RequestParams};
pub use validate::RequestValidator;
