//! Tether Envelope - Carrying server results into live client subscriptions.
//!
//! This crate provides:
//!
//! - `Envelope`: Tagged wire format (`query-envelope`, `user-envelope`, `plain`)
//! - `encode` / `decode_query`: Serialize a result on the server, decode it on
//!   the client into a seeded `DetachedSubscription`
//! - `LiveUser` / `decode_user`: Current-user state with swap gating on a
//!   resource field
//! - `ReadinessProbe`: The async precondition a gated swap waits on
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use serde_json::json;
//! use tether_cache::{DisabledChannel, QueryCache};
//! use tether_core::{CanonicalArgs, QueryRef, QueryRegistry};
//! use tether_envelope::{decode_query, encode, Envelope};
//!
//! let registry = QueryRegistry::with_queries(["tasks.get"]);
//! let envelope = Envelope::query(
//!     &QueryRef::new("tasks.get"),
//!     &CanonicalArgs::empty(),
//!     json!([{ "id": 1, "text": "a" }]),
//! );
//! let wire = encode(&envelope).unwrap();
//!
//! let cache = QueryCache::new(Rc::new(DisabledChannel));
//! let live = decode_query(&wire, &registry, &cache).unwrap();
//! assert_eq!(live.state().data, Some(json!([{ "id": 1, "text": "a" }])));
//! ```

pub mod envelope;
pub mod probe;
pub mod user;

#[cfg(feature = "wasm")]
pub mod preload;

pub use envelope::{decode_query, encode, Envelope, TransportEnvelope, UserEnvelope};
pub use probe::{AlwaysReady, PreloadOutcome, ReadinessProbe, ReadyCallback};
pub use user::{decode_user, LiveUser, UserOptions, DEFAULT_RESOURCE_FIELD};

#[cfg(feature = "wasm")]
pub use preload::ImagePreloader;
