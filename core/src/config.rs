//! Adapter configuration.
//!
//! The hosting bridge hands the adapter a flat key/value property map. The
//! property names are fixed (`Username`, `Password`, `Elastic URL`).
//! Deserializing a [`BridgeConfig`] reads the same map and applies the same
//! normalization as [`BridgeConfig::from_properties`].

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// Names of the configurable properties.
pub mod properties {
    pub const USERNAME: &str = "Username";
    pub const PASSWORD: &str = "Password";
    pub const ELASTIC_URL: &str = "Elastic URL";
}

/// Connection settings fixed at adapter construction.
///
/// The password is redacted in `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(try_from = "HashMap<String, String>")]
pub struct BridgeConfig {
    pub elastic_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl TryFrom<HashMap<String, String>> for BridgeConfig {
    type Error = BridgeError;

    fn try_from(props: HashMap<String, String>) -> Result<Self> {
        Self::from_properties(&props)
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("elastic_url", &self.elastic_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl BridgeConfig {
    /// Config for an unauthenticated endpoint.
    pub fn new(elastic_url: &str) -> Self {
        Self {
            elastic_url: elastic_url.trim_end_matches('/').to_string(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = non_blank(Some(username));
        self.password = non_blank(Some(password));
        self
    }

    /// Build a config from the bridge's property map.
    ///
    /// `Elastic URL` is required and loses any trailing `/`. Blank
    /// credentials count as absent; others are kept byte for byte.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let elastic_url = props
            .get(properties::ELASTIC_URL)
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                BridgeError::Configuration(format!(
                    "the '{}' property is required",
                    properties::ELASTIC_URL
                ))
            })?;

        Ok(Self {
            elastic_url: elastic_url.trim_end_matches('/').to_string(),
            username: non_blank(props.get(properties::USERNAME).map(String::as_str)),
            password: non_blank(props.get(properties::PASSWORD).map(String::as_str)),
        })
    }

    /// Username and password, only when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}
