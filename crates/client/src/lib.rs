//! Tether Client - Live queries with zero-flicker server handoff.
//!
//! `Client` ties the Tether crates together for one session or one server
//! request:
//!
//! - `query`: A live `QueryView` backed by the shared cache
//! - `load_once`: One-shot fetch; an envelope on the server, a seeded live
//!   subscription on the client
//! - `prefetch`: Fetch then keep live, for navigation
//! - `encode` / `decode` / `decode_user`: Envelope handoff
//! - `shutdown`: Close every channel at the end of a request
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use futures::executor::block_on;
//! use serde_json::json;
//! use tether_cache::MemoryChannel;
//! use tether_client::{Client, ClientConfig, Envelope, Loaded};
//!
//! // Server render
//! let backend = Rc::new(MemoryChannel::new());
//! let mut server = Client::new(backend.clone(), ClientConfig::server());
//! let tasks = server.register("tasks.get");
//! backend.publish(&tasks, &Default::default(), Ok(json!([{ "id": 1 }])));
//!
//! let loaded = block_on(server.load_once(&tasks, json!({}))).unwrap();
//! let envelope = match loaded {
//!     Loaded::Envelope(envelope) => Envelope::QueryEnvelope(envelope),
//!     Loaded::Live(_) => unreachable!(),
//! };
//! let wire = server.encode(&envelope).unwrap();
//! server.shutdown();
//!
//! // Client hydration
//! let mut client = Client::new(Rc::new(MemoryChannel::new()), ClientConfig::new());
//! client.register("tasks.get");
//! let live = client.decode(&wire).unwrap();
//! assert_eq!(live.state().data, Some(json!([{ "id": 1 }])));
//! ```

mod client;
mod config;

pub use client::{Client, Loaded};
pub use config::{ClientConfig, RenderMode};

pub use tether_cache::{DisabledChannel, Disposer, MemoryChannel, QueryCache, SubscriptionChannel};
pub use tether_core::{
    ArgsInput, ArgsSource, CanonicalArgs, Error, QueryOutcome, QueryRef, QueryRegistry,
    RemoteError, Result, Value,
};
pub use tether_envelope::{
    AlwaysReady, Envelope, LiveUser, PreloadOutcome, ReadinessProbe, ReadyCallback,
    TransportEnvelope, UserEnvelope,
};
pub use tether_reactive::{DetachedSubscription, OverrideToken, QueryOptions, QueryState, QueryView};
