//! Connection configuration for a vmrest server
//!
//! All the tunables the transport and call layers consume live here:
//! server address and port, credentials, request timeout, session-cookie
//! TTL, the connect-poll budget used when dialing a phone call, and the TLS
//! trust policy. Values that look like magic numbers in the protocol (the
//! 60-second cookie lifetime, the single 200 ms connect retry) are defaults
//! on this struct, not hard-coded constants.
//!
//! # Examples
//!
//! ```rust
//! use vmrest_client::ConnectionConfig;
//! use std::time::Duration;
//!
//! let config = ConnectionConfig::new("conn1.example.com", "admin", "s3cret")
//!     .with_port(8443)
//!     .with_request_timeout(Duration::from_secs(20))
//!     .with_cluster_fetch(true);
//!
//! assert_eq!(config.base_url(), "https://conn1.example.com:8443/vmrest");
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, Result};

/// Configuration for one server connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server host name or address
    pub server: String,
    /// Administrative login name
    pub username: String,
    /// Administrative login secret
    pub password: String,
    /// HTTPS port for the vmrest interface
    pub port: u16,
    /// Per-request timeout; record/play requests override this with
    /// `media_timeout`
    pub request_timeout: Duration,
    /// Timeout applied to blocking record/play exchanges, which only return
    /// when the far end reports a terminal state
    pub media_timeout: Duration,
    /// Age after which a cached session cookie is discarded before reuse.
    /// The server-side lifetime is undocumented; this biases toward
    /// re-authenticating over risking a stale cookie.
    pub cookie_ttl: Duration,
    /// Extra status polls after the first when waiting for a dialed call to
    /// reach the connected state
    pub connect_poll_retries: u32,
    /// Delay between connect-status polls
    pub connect_poll_delay: Duration,
    /// Accept self-signed / invalid TLS certificates. Admin servers commonly
    /// run with self-signed certs, so this defaults to true.
    pub accept_invalid_certs: bool,
    /// Fetch the cluster membership list during login on servers that
    /// support it
    pub fetch_cluster_info: bool,
    /// Override of the derived `https://{server}:{port}/vmrest` root, for
    /// nonstandard front ends and test servers
    pub base_url_override: Option<String>,
}

impl ConnectionConfig {
    /// Create a configuration with library defaults for everything but the
    /// server address and credentials.
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            password: password.into(),
            port: 8443,
            request_timeout: Duration::from_secs(20),
            media_timeout: Duration::from_secs(300),
            cookie_ttl: Duration::from_secs(60),
            connect_poll_retries: 1,
            connect_poll_delay: Duration::from_millis(200),
            accept_invalid_certs: true,
            fetch_cluster_info: true,
            base_url_override: None,
        }
    }

    /// Set the HTTPS port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the timeout for blocking record/play exchanges
    pub fn with_media_timeout(mut self, timeout: Duration) -> Self {
        self.media_timeout = timeout;
        self
    }

    /// Set the session-cookie time-to-live
    pub fn with_cookie_ttl(mut self, ttl: Duration) -> Self {
        self.cookie_ttl = ttl;
        self
    }

    /// Set the connect-poll budget used while dialing
    pub fn with_connect_poll(mut self, retries: u32, delay: Duration) -> Self {
        self.connect_poll_retries = retries;
        self.connect_poll_delay = delay;
        self
    }

    /// Set the TLS trust policy
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Enable or disable the cluster-membership fetch during login
    pub fn with_cluster_fetch(mut self, fetch: bool) -> Self {
        self.fetch_cluster_info = fetch;
        self
    }

    /// Point the client at an explicit vmrest root instead of the one
    /// derived from server and port
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url_override = Some(url.into());
        self
    }

    /// Root of the administrative REST interface
    pub fn base_url(&self) -> String {
        match &self.base_url_override {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}:{}/vmrest", self.server, self.port),
        }
    }

    /// Root of the legacy voice-file servlet (no vmrest port)
    pub fn voice_servlet_url(&self, filename: &str) -> String {
        format!(
            "https://{}/cuals/VoiceServlet?filename={}",
            self.server, filename
        )
    }

    /// Reject configurations that must never go over the wire
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(ClientError::config("server name must not be empty"));
        }
        if self.username.trim().is_empty() {
            return Err(ClientError::config("login name must not be empty"));
        }
        if self.password.is_empty() {
            return Err(ClientError::config("login password must not be empty"));
        }
        let base = self.base_url();
        let parsed = Url::parse(&base)
            .map_err(|e| ClientError::config(format!("base URL {:?} does not parse: {}", base, e)))?;
        if parsed.host_str().is_none() {
            return Err(ClientError::config(format!("base URL {:?} has no host", base)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ConnectionConfig::new("host", "admin", "pw");
        assert_eq!(config.port, 8443);
        assert_eq!(config.cookie_ttl, Duration::from_secs(60));
        assert_eq!(config.connect_poll_retries, 1);
        assert_eq!(config.connect_poll_delay, Duration::from_millis(200));
        assert!(config.accept_invalid_certs);
        assert!(config.fetch_cluster_info);
    }

    #[test]
    fn base_url_uses_configured_port() {
        let config = ConnectionConfig::new("conn1", "admin", "pw").with_port(9443);
        assert_eq!(config.base_url(), "https://conn1:9443/vmrest");
    }

    #[test]
    fn base_url_override_wins() {
        let config =
            ConnectionConfig::new("conn1", "admin", "pw").with_base_url("http://127.0.0.1:9/vmrest/");
        assert_eq!(config.base_url(), "http://127.0.0.1:9/vmrest");
    }

    #[test]
    fn voice_servlet_url_skips_the_vmrest_port() {
        let config = ConnectionConfig::new("conn1", "admin", "pw");
        assert_eq!(
            config.voice_servlet_url("stream.wav"),
            "https://conn1/cuals/VoiceServlet?filename=stream.wav"
        );
    }

    #[test]
    fn empty_server_or_credentials_rejected() {
        assert!(ConnectionConfig::new("", "admin", "pw").validate().is_err());
        assert!(ConnectionConfig::new("host", " ", "pw").validate().is_err());
        assert!(ConnectionConfig::new("host", "admin", "").validate().is_err());
        assert!(ConnectionConfig::new("host", "admin", "pw").validate().is_ok());
    }

    #[test]
    fn unparseable_base_url_override_rejected() {
        let config = ConnectionConfig::new("conn1", "admin", "pw").with_base_url("not a url");
        assert!(matches!(
            config.validate().unwrap_err(),
            ClientError::Configuration { .. }
        ));

        let config = ConnectionConfig::new("conn1", "admin", "pw")
            .with_base_url("http://127.0.0.1:9/vmrest");
        assert!(config.validate().is_ok());
    }
}
