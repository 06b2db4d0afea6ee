//! File-based client configuration.
//!
//! ```toml
//! [server]
//! uri = "wss://localhost"
//! port = 7450
//!
//! [settings]
//! display_current_time = true
//!
//! [tls]
//! verify = "none"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::session::{Endpoint, SessionError};
use crate::transport::{TlsOptions, TransportError, WebSocketTransport};

/// Client configuration loaded from TOML.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub settings: DisplaySettings,
    #[serde(default)]
    pub tls: TlsOptions,
}

/// Remote server location.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// `ws://` or `wss://` URI, optionally without the port.
    pub uri: String,
    /// Port appended to `uri` when set.
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplaySettings {
    /// Prefix each inbound line with the local wall-clock time.
    pub display_current_time: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Endpoint(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientConfig {
    /// Reads and parses a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!(event = "config_loaded", path = %path.display(), uri = %config.server.uri);
        Ok(config)
    }

    /// Parses a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Endpoint string, joining `uri` and `port` as `uri:port`.
    pub fn endpoint_str(&self) -> String {
        let uri = self.server.uri.trim_end();
        match self.server.port {
            Some(port) => format!("{uri}:{port}"),
            None => uri.to_string(),
        }
    }

    /// Validated endpoint.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        Ok(Endpoint::parse(&self.endpoint_str())?)
    }

    /// Websocket transport with the configured TLS trust options.
    pub fn transport(&self) -> Result<WebSocketTransport, ConfigError> {
        Ok(WebSocketTransport::with_tls(&self.tls)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientConfig, ConfigError};
    use crate::transport::TlsVerifyMode;

    #[test]
    fn parses_full_config() {
        let config = ClientConfig::from_toml_str(
            r#"
            [server]
            uri = "wss://localhost"
            port = 7450

            [settings]
            display_current_time = true

            [tls]
            verify = "none"
            "#,
        )
        .expect("parse config");

        assert_eq!(config.endpoint_str(), "wss://localhost:7450");
        assert!(config.settings.display_current_time);
        assert_eq!(config.tls.verify, TlsVerifyMode::None);
        assert!(config.endpoint().expect("endpoint").is_secure());
    }

    #[test]
    fn optional_sections_default() {
        let config = ClientConfig::from_toml_str(
            r#"
            [server]
            uri = "ws://chat.example/ws"
            "#,
        )
        .expect("parse config");

        assert_eq!(config.endpoint_str(), "ws://chat.example/ws");
        assert!(!config.settings.display_current_time);
        assert_eq!(config.tls.verify, TlsVerifyMode::Verify);
        assert!(config.tls.ca_path.is_none());
    }

    #[test]
    fn missing_server_section_is_rejected() {
        let err = ClientConfig::from_toml_str("[settings]\ndisplay_current_time = true\n")
            .expect_err("server is required");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn malformed_uri_surfaces_as_endpoint_error() {
        let config = ClientConfig::from_toml_str("[server]\nuri = \"localhost\"\nport = 7450\n")
            .expect("parse config");
        assert!(matches!(config.endpoint(), Err(ConfigError::Endpoint(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ClientConfig::load("/nonexistent/ws-session.toml").expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
