//! The client context.
//!
//! A `Client` owns the query cache, the registry used to resolve serialized
//! reference names, and the configuration for one render. Build one per
//! client session or per server request and call `shutdown` when done.

use crate::config::ClientConfig;
use std::rc::Rc;
use std::fmt;
use tether_cache::{QueryCache, SubscriptionChannel};
use tether_core::{ArgsSource, CanonicalArgs, QueryRef, QueryRegistry, Result, Value};
use tether_envelope::{
    decode_query, decode_user, encode, Envelope, LiveUser, ReadinessProbe, TransportEnvelope,
    UserOptions,
};
use tether_reactive::{DetachedSubscription, QueryOptions, QueryView};

/// Result of a one-shot load.
#[derive(Debug)]
pub enum Loaded {
    /// Server render: an envelope to ship to the client
    Envelope(TransportEnvelope),
    /// Client: a live subscription seeded with the fetched value
    Live(DetachedSubscription),
}

impl Loaded {
    /// Returns the value currently shown.
    pub fn data(&self) -> Option<Value> {
        match self {
            Loaded::Envelope(envelope) => Some(envelope.data.clone()),
            Loaded::Live(live) => live.state().data,
        }
    }

    /// Returns the envelope, if this is a server load.
    pub fn into_envelope(self) -> Option<TransportEnvelope> {
        match self {
            Loaded::Envelope(envelope) => Some(envelope),
            Loaded::Live(_) => None,
        }
    }

    /// Returns the live subscription, if this is a client load.
    pub fn into_live(self) -> Option<DetachedSubscription> {
        match self {
            Loaded::Live(live) => Some(live),
            Loaded::Envelope(_) => None,
        }
    }
}

/// Context for live queries and envelopes.
pub struct Client {
    config: ClientConfig,
    cache: Rc<QueryCache>,
    registry: QueryRegistry,
}

impl Client {
    /// Creates a client over a channel.
    ///
    /// Channels are never opened in server mode, when the configuration
    /// disables them, or when the channel itself reports disabled.
    pub fn new(channel: Rc<dyn SubscriptionChannel>, config: ClientConfig) -> Self {
        let disabled = config.is_server() || config.disabled || channel.is_disabled();
        tracing::debug!(mode = ?config.render_mode, disabled, "creating client");
        Self {
            cache: QueryCache::with_disabled(channel, disabled),
            registry: QueryRegistry::new(),
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the shared query cache.
    pub fn cache(&self) -> &Rc<QueryCache> {
        &self.cache
    }

    /// Returns the registry.
    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }

    /// Returns true if channels are never opened.
    pub fn is_disabled(&self) -> bool {
        self.cache.is_disabled()
    }

    /// Registers a query so envelopes naming it can be decoded.
    pub fn register(&mut self, name: &str) -> QueryRef {
        self.registry.register(name)
    }

    /// Options seeded from the configuration.
    pub fn default_options(&self) -> QueryOptions {
        QueryOptions::new().keep_previous_data(self.config.keep_previous_data)
    }

    /// Creates a live view.
    ///
    /// `options` is used as given; configuration defaults such as
    /// `keep_previous_data` only apply through [`Client::default_options`] or
    /// [`Client::query_with_defaults`].
    pub fn query(
        &self,
        query: &QueryRef,
        args: impl Into<ArgsSource>,
        options: QueryOptions,
    ) -> QueryView {
        QueryView::new(self.cache.clone(), query.clone(), args, options)
    }

    /// Creates a live view with options taken from the configuration.
    pub fn query_with_defaults(&self, query: &QueryRef, args: impl Into<ArgsSource>) -> QueryView {
        self.query(query, args, self.default_options())
    }

    /// Fetches (query, args) once.
    ///
    /// In server mode the result is wrapped in an envelope for the client. In
    /// client mode it seeds a live subscription directly. A remote failure is
    /// returned as `Error::Remote`.
    pub async fn load_once(&self, query: &QueryRef, args: Value) -> Result<Loaded> {
        let args = CanonicalArgs::from_value(args)?;
        let data = self.cache.fetch_once(query, &args).await?;

        if self.config.is_server() {
            Ok(Loaded::Envelope(TransportEnvelope::new(query, &args, data)))
        } else {
            Ok(Loaded::Live(DetachedSubscription::new(
                &self.cache,
                query.clone(),
                args,
                data,
            )))
        }
    }

    /// Fetches (query, args) once and keeps it live.
    ///
    /// The subscription is seeded with the fetched value, so it never shows
    /// loading before the first push.
    pub async fn prefetch(&self, query: &QueryRef, args: Value) -> Result<DetachedSubscription> {
        let args = CanonicalArgs::from_value(args)?;
        tracing::debug!(query = %query, args = %args, "prefetching");
        let data = self.cache.fetch_once(query, &args).await?;
        Ok(DetachedSubscription::new(&self.cache, query.clone(), args, data))
    }

    /// Serializes an envelope; `None` for plain values.
    pub fn encode(&self, envelope: &Envelope) -> Option<Value> {
        encode(envelope)
    }

    /// Decodes a query envelope into a live subscription.
    pub fn decode(&self, json: &Value) -> Result<DetachedSubscription> {
        decode_query(json, &self.registry, &self.cache)
    }

    /// Decodes a user envelope, kept live through `live_query`.
    pub fn decode_user(
        &self,
        json: &Value,
        live_query: &QueryRef,
        live_args: CanonicalArgs,
        probe: Rc<dyn ReadinessProbe>,
    ) -> Result<LiveUser> {
        let options =
            UserOptions::default().resource_field(self.config.user_resource_field.as_str());
        decode_user(json, &self.cache, live_query.clone(), live_args, probe, options)
    }

    /// Closes every open channel.
    ///
    /// Views created before shutdown stay readable but no longer update, and
    /// no channel is opened afterwards, even when a view's args change.
    pub fn shutdown(&self) {
        tracing::debug!(entries = self.cache.entry_count(), "shutting down client");
        self.cache.clear();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("queries", &self.registry.len())
            .field("cache", &self.cache)
            .finish()
    }
}
