//! Schema document subsystem.
//!
//! # Data Flow
//! ```text
//! openapi.yaml / openapi.json
//!     → loader.rs (read once, deserialize to serde_json::Value)
//!     → refs.rs (resolve local $refs, prepare schemas for the validator)
//!     → index.rs (compile operations, path templates → matchit)
//!     → params.rs (coerce raw parameter strings per schema)
//!     → shared via Arc by docs, validation, normalization and dispatch
//! ```
//!
//! # Design Decisions
//! - The document is immutable after loading
//! - Only OpenAPI 3.x is accepted
//! - Every schema is compiled at construction; request handling never
//!   compiles or resolves anything

pub mod index;
pub mod loader;
pub mod params;
pub mod refs;

pub use index::{CompiledOperation, Lookup, OperationIndex, OperationMatch, ParamLocation};
pub use loader::{DocumentError, SchemaDocument};
