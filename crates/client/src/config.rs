//! Client configuration.

use serde::{Deserialize, Serialize};
use tether_core::{Error, Result};
use tether_envelope::DEFAULT_RESOURCE_FIELD;

/// Where the client runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Interactive client: channels are opened
    #[default]
    Client,
    /// Server render pass: channels are never opened and one-shot loads
    /// produce envelopes
    Server,
}

/// Configuration for a `Client`.
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Client or server render
    pub render_mode: RenderMode,
    /// Never open channels, even in client mode
    pub disabled: bool,
    /// Default for `QueryOptions::keep_previous_data`
    pub keep_previous_data: bool,
    /// Gated field on user objects
    pub user_resource_field: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::Client,
            disabled: false,
            keep_previous_data: false,
            user_resource_field: DEFAULT_RESOURCE_FIELD.to_string(),
        }
    }
}

impl ClientConfig {
    /// Default client-side configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default server-side configuration.
    pub fn server() -> Self {
        Self {
            render_mode: RenderMode::Server,
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| Error::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field values.
    pub fn validate(&self) -> Result<()> {
        if self.user_resource_field.is_empty() {
            return Err(Error::config("user_resource_field must not be empty"));
        }
        Ok(())
    }

    /// Returns true for server render.
    #[inline]
    pub fn is_server(&self) -> bool {
        self.render_mode == RenderMode::Server
    }
}
