//! # vmrest-client — REST client for voice-messaging server administration
//!
//! This crate talks to the HTTPS administrative interface of a
//! voice-messaging server (`https://{server}:8443/vmrest/...`), exchanging
//! XML or JSON payloads and surfacing the results as strongly-typed
//! objects. It provides the shared core the per-entity domain layer builds
//! on:
//!
//! - a serialized [`Transport`] with Basic-Auth injection, session-cookie
//!   capture and proactive expiry, and uniform failure shaping;
//! - the [`RestResult`] envelope every remote call returns, success or not;
//! - a reflection-free wire mapper ([`WireRecord`]) with per-property
//!   scalar coercion and populate-in-place semantics;
//! - paging-clause construction and total-count recovery;
//! - a [`PhoneSession`] state machine for phone-based media recording and
//!   playback built on the same transport primitives.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use vmrest_client::{ConnectionConfig, ServerSession};
//!
//! # async fn example() -> vmrest_client::Result<()> {
//! let config = ConnectionConfig::new("conn1.example.com", "admin", "s3cret");
//! let session = ServerSession::connect(config).await?;
//! println!("logged in to {}", session.version());
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod config;
pub mod error;
pub mod mapper;
pub mod paging;
pub mod result;
pub mod session;
pub mod transport;
pub mod version;
pub mod xml;

pub use call::{CallKind, CallState, PhoneSession};
pub use config::ConnectionConfig;
pub use error::{ClientError, Result};
pub use mapper::{FieldOutcome, FieldValue, WireEnum, WireRecord};
pub use result::{ParsedBody, RestResult};
pub use session::{ClusterMember, ConnectionLocation, ServerRole, ServerSession};
pub use transport::{
    ContentKind, CookieJar, HttpMethod, HttpTransport, MessageAttachment, RestRequest,
    StubTransport, Transport,
};
pub use version::ServerVersion;
pub use xml::XmlNode;
