//! Relay configuration loaded from a TOML file.

use crate::error::{Error, Result};
use graphrelay_oauth::provider::GRAPH_DEFAULT_SCOPE;
use graphrelay_smtp::ServerConfig;
use graphrelay_smtp::server::DEFAULT_MAX_MESSAGE_BYTES;
use serde::Deserialize;
use std::path::Path;

/// Complete relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Upstream Graph application credentials.
    pub graph: GraphConfig,
    /// SMTP listener settings.
    #[serde(default)]
    pub server: ListenerConfig,
    /// Process settings.
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Azure AD application used to call Graph.
#[derive(Clone, Deserialize)]
pub struct GraphConfig {
    /// Directory (tenant) id.
    pub tenant_id: String,
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Token scope.
    #[serde(default = "default_scope")]
    pub scope: String,
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

/// SMTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Name announced in the greeting and EHLO reply.
    pub hostname: String,
    /// Largest accepted message.
    pub max_message_bytes: usize,
    /// Recipients accepted per transaction.
    pub max_recipients: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2525,
            hostname: "graphrelay.local".to_string(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_recipients: 100,
        }
    }
}

impl ListenerConfig {
    /// Returns `host:port` for binding.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the SMTP engine configuration.
    #[must_use]
    pub fn smtp_config(&self) -> ServerConfig {
        ServerConfig::new(&self.hostname)
            .with_max_message_bytes(self.max_message_bytes)
            .with_max_recipients(self.max_recipients)
    }
}

/// Process settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Enables debug-level logging.
    pub debug: bool,
}

fn default_scope() -> String {
    GRAPH_DEFAULT_SCOPE.to_string()
}

impl Config {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, is not valid
    /// TOML or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        text.parse()
    }

    /// Checks that required settings are present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("graph.tenant_id", &self.graph.tenant_id),
            ("graph.client_id", &self.graph.client_id),
            ("graph.client_secret", &self.graph.client_secret),
            ("graph.scope", &self.graph.scope),
            ("server.host", &self.server.host),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::Config(format!("{field} must not be empty")));
        }
        if self.server.port == 0 {
            return Err(Error::Config("server.port must not be 0".into()));
        }
        if self.server.max_message_bytes == 0 {
            return Err(Error::Config("server.max_message_bytes must not be 0".into()));
        }
        if self.server.max_recipients == 0 {
            return Err(Error::Config("server.max_recipients must not be 0".into()));
        }
        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [graph]
        tenant_id = "contoso"
        client_id = "app-id"
        client_secret = "s3cret"
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config: Config = MINIMAL.parse().unwrap();
        assert_eq!(config.graph.scope, "https://graph.microsoft.com/.default");
        assert_eq!(config.server.bind_address(), "127.0.0.1:2525");
        assert_eq!(config.server.max_message_bytes, 25 * 1024 * 1024);
        assert!(!config.service.debug);
    }

    #[test]
    fn test_full_config() {
        let config: Config = r#"
            [graph]
            tenant_id = "contoso"
            client_id = "app-id"
            client_secret = "s3cret"
            scope = "https://graph.microsoft.com/.default"

            [server]
            host = "0.0.0.0"
            port = 25
            hostname = "relay.contoso.com"
            max_recipients = 10

            [service]
            debug = true
        "#
        .parse()
        .unwrap();

        assert_eq!(config.server.bind_address(), "0.0.0.0:25");
        assert!(config.service.debug);

        let smtp = config.server.smtp_config();
        assert_eq!(smtp.hostname, "relay.contoso.com");
        assert_eq!(smtp.max_recipients, 10);
    }

    #[test]
    fn test_validation_errors() {
        let missing_secret = MINIMAL.replace("s3cret", " ");
        let err = missing_secret.parse::<Config>().unwrap_err();
        assert!(err.to_string().contains("graph.client_secret"));

        let zero_port = format!("{MINIMAL}\n[server]\nport = 0\n");
        assert!(zero_port.parse::<Config>().is_err());

        assert!("[graph]\ntenant_id = \"x\"".parse::<Config>().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config: Config = MINIMAL.parse().unwrap();
        let debug = format!("{:?}", config.graph);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/graphrelay.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
