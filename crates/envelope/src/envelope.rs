//! Envelope wire format.
//!
//! An envelope carries a server-side result across to the client, where it is
//! decoded into a live subscription seeded with that result. Every envelope is
//! tagged with an explicit `kind`:
//!
//! ```text
//! { "kind": "query-envelope", "refName": "tasks.get", "args": {...}, "data": ... }
//! { "kind": "user-envelope", "data": {...} }
//! ```
//!
//! `plain` values are ordinary load data and are never encoded.

use std::rc::Rc;
use serde::{Deserialize, Serialize};
use tether_cache::QueryCache;
use tether_core::{CanonicalArgs, Error, QueryRef, QueryRegistry, Result, Value};
use tether_reactive::DetachedSubscription;

/// Snapshot of one query result, keyed by reference name and args.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportEnvelope {
    /// Registered name of the query
    pub ref_name: String,
    /// Canonical args as a JSON object
    pub args: Value,
    /// Result at the time the envelope was built
    pub data: Value,
}

impl TransportEnvelope {
    /// Builds an envelope for (query, args) holding `data`.
    pub fn new(query: &QueryRef, args: &CanonicalArgs, data: Value) -> Self {
        Self {
            ref_name: query.name().into(),
            args: args.to_value(),
            data,
        }
    }
}

/// Snapshot of the current user, upgraded through a separately supplied query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserEnvelope {
    /// Seed value; `null` means no authenticated user
    pub data: Value,
}

/// A value crossing the server/client boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Envelope {
    /// Result of a registered query
    QueryEnvelope(TransportEnvelope),
    /// External user seed
    UserEnvelope(UserEnvelope),
    /// Anything else; passed through untouched
    Plain { value: Value },
}

impl Envelope {
    /// Builds a query envelope.
    pub fn query(query: &QueryRef, args: &CanonicalArgs, data: Value) -> Self {
        Envelope::QueryEnvelope(TransportEnvelope::new(query, args, data))
    }

    /// Builds a user envelope.
    pub fn user(data: Value) -> Self {
        Envelope::UserEnvelope(UserEnvelope { data })
    }

    /// Wraps ordinary data.
    pub fn plain(value: Value) -> Self {
        Envelope::Plain { value }
    }

    /// Parses a serialized envelope.
    pub fn from_json(json: &Value) -> Result<Self> {
        Envelope::deserialize(json).map_err(|err| Error::invalid_envelope(err.to_string()))
    }

    /// Returns the wire tag of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::QueryEnvelope(_) => "query-envelope",
            Envelope::UserEnvelope(_) => "user-envelope",
            Envelope::Plain { .. } => "plain",
        }
    }
}

/// Serializes an envelope for transport.
///
/// Returns `None` for plain values: they are not handled here and travel with
/// the rest of the load data.
pub fn encode(envelope: &Envelope) -> Option<Value> {
    if let Envelope::Plain { .. } = envelope {
        return None;
    }
    match serde_json::to_value(envelope) {
        Ok(json) => Some(json),
        Err(err) => {
            tracing::warn!(kind = envelope.kind(), error = %err, "failed to serialize envelope");
            None
        }
    }
}

/// Decodes a query envelope into a seeded live subscription.
///
/// Fails with `Error::UnknownQuery` if `refName` is not registered, and with
/// `Error::InvalidEnvelope` for anything that is not a query envelope.
pub fn decode_query(
    json: &Value,
    registry: &QueryRegistry,
    cache: &Rc<QueryCache>,
) -> Result<DetachedSubscription> {
    let envelope = match Envelope::from_json(json)? {
        Envelope::QueryEnvelope(envelope) => envelope,
        other => {
            return Err(Error::invalid_envelope(format!(
                "expected query-envelope, found {}",
                other.kind()
            )))
        }
    };

    let query = registry.resolve(&envelope.ref_name)?;
    let args = CanonicalArgs::from_value(envelope.args)?;
    tracing::debug!(query = %query, args = %args, "decoding query envelope");
    Ok(DetachedSubscription::new(cache, query, args, envelope.data))
}
