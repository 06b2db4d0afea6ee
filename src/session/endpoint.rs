use std::fmt;
use std::str::FromStr;

use tokio_tungstenite::tungstenite::http::Uri;

use crate::session::SessionError;

/// Validated `ws://` or `wss://` connection target.
///
/// Immutable once built; a session keeps the endpoint it was started with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    raw: String,
    uri: Uri,
}

impl Endpoint {
    /// Parses and validates an endpoint URI.
    ///
    /// Trailing whitespace is ignored. The scheme must be `ws` or `wss` and the
    /// authority must name a host.
    pub fn parse(input: &str) -> Result<Self, SessionError> {
        let raw = input.trim_end();
        if raw.is_empty() {
            return Err(SessionError::InvalidEndpoint("endpoint is empty".to_string()));
        }

        let uri: Uri = raw
            .parse()
            .map_err(|err| SessionError::InvalidEndpoint(format!("{raw}: {err}")))?;

        match uri.scheme_str() {
            Some("ws") | Some("wss") => {}
            Some(other) => {
                return Err(SessionError::InvalidEndpoint(format!(
                    "{raw}: unsupported scheme `{other}`, expected ws or wss"
                )));
            }
            None => {
                return Err(SessionError::InvalidEndpoint(format!(
                    "{raw}: missing ws:// or wss:// scheme"
                )));
            }
        }

        if uri.host().map_or(true, str::is_empty) {
            return Err(SessionError::InvalidEndpoint(format!("{raw}: missing host")));
        }

        if let Some(port) = uri.port() {
            if uri.port_u16().is_none() {
                return Err(SessionError::InvalidEndpoint(format!(
                    "{raw}: invalid port `{}`",
                    port.as_str()
                )));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            uri,
        })
    }

    /// Returns the endpoint as given, without trailing whitespace.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Host component, without port.
    pub fn host(&self) -> &str {
        self.uri.host().unwrap_or_default()
    }

    /// Returns true when the endpoint requires TLS.
    pub fn is_secure(&self) -> bool {
        self.uri.scheme_str() == Some("wss")
    }
}

impl FromStr for Endpoint {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
