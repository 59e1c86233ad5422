//! Tether Core - Query references, canonical arguments and errors.
//!
//! This crate provides the foundational types shared by every Tether crate:
//!
//! - `QueryRef`: Stable name of a remote read operation
//! - `ArgsSource` / `ResolvedArgs` / `CanonicalArgs`: Argument resolution with
//!   a skip sentinel and byte-exact canonical equality
//! - `QueryRegistry`: Maps serialized reference names back to queries
//! - `RemoteError` / `QueryOutcome`: What a subscription delivers
//! - `Error`: Error types for local failures
//!
//! # Example
//!
//! ```rust
//! use tether_core::{args_equal, ArgsSource, QueryRegistry};
//! use serde_json::json;
//!
//! let mut registry = QueryRegistry::new();
//! let tasks = registry.register("tasks.get");
//!
//! let a = ArgsSource::from(json!({ "list": "l1", "limit": 10 })).resolve().unwrap();
//! let b = ArgsSource::from(json!({ "limit": 10, "list": "l1" })).resolve().unwrap();
//! assert!(args_equal(&a, &b));
//! assert_eq!(registry.resolve("tasks.get").unwrap(), tasks);
//! ```

pub mod args;
mod error;
mod query;
pub mod registry;

pub use args::{
    args_equal, canonical_json, ArgsInput, ArgsSource, ArgsThunk, CanonicalArgs, ResolvedArgs,
    SKIP_MARKER,
};
pub use error::{Error, QueryOutcome, RemoteError, Result};
pub use query::{OpaqueId, QueryRef};
pub use registry::QueryRegistry;

// Re-export the JSON value type used throughout the API
pub use serde_json::Value;
