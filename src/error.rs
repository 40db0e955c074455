//! Error types for the vmrest client library
//!
//! Hard errors are reserved for conditions the caller cannot sensibly
//! continue from: bad configuration, a failed login handshake, and a phone
//! call that never reached the connected state. Every ordinary remote-call
//! outcome — including 4xx/5xx responses and network failures — is reported
//! through [`RestResult`](crate::result::RestResult) instead, so callers
//! branch on its success flag rather than catching errors.

use thiserror::Error;

/// Result type for vmrest client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur in the vmrest client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error (empty server name, empty credentials, bad URL).
    /// Raised before anything goes over the wire.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Login handshake failed (version fetch/parse or cluster enumeration).
    /// No partially-initialized session is ever returned alongside this.
    #[error("Login failed: {message}")]
    Login { message: String },

    /// A phone call could not be established within the connect-poll budget.
    #[error("Call setup failed: {message}")]
    CallSetup { message: String },

    /// A play operation was requested with no stream resource, no message
    /// id, and no prior recording to fall back on.
    #[error("No media resource available: {message}")]
    MissingResource { message: String },
}

impl ClientError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a login error
    pub fn login(message: impl Into<String>) -> Self {
        Self::Login {
            message: message.into(),
        }
    }

    /// Create a call setup error
    pub fn call_setup(message: impl Into<String>) -> Self {
        Self::CallSetup {
            message: message.into(),
        }
    }

    /// Create a missing-resource error
    pub fn missing_resource(message: impl Into<String>) -> Self {
        Self::MissingResource {
            message: message.into(),
        }
    }
}
