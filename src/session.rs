//! Authenticated relationship with one server
//!
//! [`ServerSession`] is built by an explicit login handshake that either
//! fully succeeds or fails as a whole — no partially-initialized session
//! ever escapes [`ServerSession::connect`]. The handshake fetches and
//! parses the server version, then (on servers at or above 9.0.1.0, when
//! requested) enumerates the cluster members; an empty or failed cluster
//! fetch aborts the login.
//!
//! The session also carries the generic contract the per-entity domain
//! layer consumes: fetch a typed list or object from a URL, or re-populate
//! an existing instance in place. Those helpers are built purely on the
//! transport, mapper, and paging primitives.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::error::{ClientError, Result};
use crate::mapper::{self, FieldOutcome, FieldValue, WireEnum, WireRecord};
use crate::result::RestResult;
use crate::transport::{CookieJar, HttpTransport, RestRequest, Transport};
use crate::version::ServerVersion;

/// Role a cluster member plays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerRole {
    #[default]
    Unknown,
    Primary,
    Secondary,
}

impl WireEnum for ServerRole {
    fn from_symbol(symbol: &str) -> Option<Self> {
        if symbol.eq_ignore_ascii_case("primary") {
            Some(Self::Primary)
        } else if symbol.eq_ignore_ascii_case("secondary") {
            Some(Self::Secondary)
        } else {
            None
        }
    }
}

/// Flat descriptor of one cluster member server. The library tracks the
/// list only; no federation logic sits on top of it.
#[derive(Debug, Clone, Default)]
pub struct ClusterMember {
    pub object_id: String,
    pub host_name: String,
    pub ip_address: String,
    pub role: ServerRole,
}

impl WireRecord for ClusterMember {
    const WIRE_NAME: &'static str = "VmsServer";

    fn apply_field(&mut self, name: &str, value: &FieldValue<'_>) -> FieldOutcome {
        match name {
            "HostName" => self.host_name = value.to_string_value(),
            "IpAddress" => self.ip_address = value.to_string_value(),
            "ServerRole" => self.role = value.to_enum(),
            _ => return FieldOutcome::Unknown,
        }
        FieldOutcome::Applied
    }

    fn apply_identity(&mut self, object_id: &str) {
        self.object_id = object_id.to_string();
    }
}

/// Server-side location descriptor, used for the lazily-resolved
/// primary-location lookup
#[derive(Debug, Clone, Default)]
pub struct ConnectionLocation {
    pub object_id: String,
    pub display_name: String,
    pub host_address: String,
}

impl WireRecord for ConnectionLocation {
    const WIRE_NAME: &'static str = "ConnectionLocation";

    fn apply_field(&mut self, name: &str, value: &FieldValue<'_>) -> FieldOutcome {
        match name {
            "DisplayName" => self.display_name = value.to_string_value(),
            "HostAddress" => self.host_address = value.to_string_value(),
            _ => return FieldOutcome::Unknown,
        }
        FieldOutcome::Applied
    }

    fn apply_identity(&mut self, object_id: &str) {
        self.object_id = object_id.to_string();
    }
}

/// Minimum version that exposes the cluster-membership resource
const CLUSTER_MIN_VERSION: (u32, u32, u32, u32, u32) = (9, 0, 1, 0, 0);

/// One authenticated server connection
pub struct ServerSession {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    cookies: Arc<CookieJar>,
    version: ServerVersion,
    cluster: Vec<ClusterMember>,
    primary_location: OnceCell<String>,
    home_server: OnceCell<String>,
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("version", &self.version)
            .field("cluster", &self.cluster)
            .finish_non_exhaustive()
    }
}

impl ServerSession {
    /// Log in against a server. Validates the configuration, fetches and
    /// parses the version, and (version- and config-gated) the cluster
    /// membership. Any failure aborts the whole construction.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let cookies = Arc::new(CookieJar::new(config.cookie_ttl));
        let transport = Arc::new(HttpTransport::new(&config, Arc::clone(&cookies))?);
        Self::login(config, transport, cookies).await
    }

    /// Log in through a caller-supplied transport (test doubles, custom
    /// stacks). The cookie jar still follows the configured TTL.
    pub async fn connect_with_transport(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let cookies = Arc::new(CookieJar::new(config.cookie_ttl));
        Self::login(config, transport, cookies).await
    }

    async fn login(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        cookies: Arc<CookieJar>,
    ) -> Result<Self> {
        let base = config.base_url();

        let envelope = transport.send(RestRequest::get(format!("{}/version", base))).await;
        if !envelope.success {
            warn!("version fetch failed during login:\n{}", envelope);
            return Err(ClientError::login(format!(
                "version fetch failed: {}",
                envelope.error_text
            )));
        }
        let version_text = envelope.body.field("version").ok_or_else(|| {
            ClientError::login("version response carried no version field")
        })?;
        let version = ServerVersion::parse(&version_text).ok_or_else(|| {
            ClientError::login(format!("unparsable server version {:?}", version_text))
        })?;
        debug!(%version, server = %config.server, "server version resolved");

        let mut cluster = Vec::new();
        let (j, n, r, b, e) = CLUSTER_MIN_VERSION;
        if config.fetch_cluster_info && version.is_at_least(j, n, r, b, e) {
            let envelope = transport
                .send(RestRequest::get(format!("{}/vms/servers", base)))
                .await;
            if !envelope.success {
                warn!("cluster fetch failed during login:\n{}", envelope);
                return Err(ClientError::login(format!(
                    "cluster fetch failed: {}",
                    envelope.error_text
                )));
            }
            cluster = mapper::populate_list_from_body::<ClusterMember>(&envelope.body, None);
            if cluster.is_empty() {
                return Err(ClientError::login("cluster fetch returned no servers"));
            }
            debug!(members = cluster.len(), "cluster membership resolved");
        }

        Ok(Self {
            config,
            transport,
            cookies,
            version,
            cluster,
            primary_location: OnceCell::new(),
            home_server: OnceCell::new(),
        })
    }

    /// Parsed server version
    pub fn version(&self) -> ServerVersion {
        self.version
    }

    /// Cluster member descriptors captured at login (empty when the fetch
    /// was skipped)
    pub fn cluster_members(&self) -> &[ClusterMember] {
        &self.cluster
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Root URL of the administrative interface
    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    /// Diagnostic view of the current session cookie, TTL not applied
    pub fn session_cookie(&self) -> Option<String> {
        self.cookies.peek()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Issue a raw exchange through this session's transport
    pub async fn send(&self, request: RestRequest) -> RestResult {
        self.transport.send(request).await
    }

    /// Fetch a typed list from a fully-built URL
    pub async fn fetch_list<T: WireRecord>(&self, url: &str) -> (RestResult, Vec<T>) {
        self.fetch_list_named(url, None).await
    }

    /// Fetch a typed list whose wire name differs from the type's own
    pub async fn fetch_list_named<T: WireRecord>(
        &self,
        url: &str,
        name_override: Option<&str>,
    ) -> (RestResult, Vec<T>) {
        let envelope = self.transport.send(RestRequest::get(url)).await;
        let records = if envelope.success {
            mapper::populate_list_from_body(&envelope.body, name_override)
        } else {
            Vec::new()
        };
        (envelope, records)
    }

    /// Fetch a single typed object. The fresh instance receives its
    /// identity through the mapper's one-time hook.
    pub async fn fetch_one<T: WireRecord>(&self, url: &str) -> (RestResult, Option<T>) {
        let envelope = self.transport.send(RestRequest::get(url)).await;
        let record = if envelope.success {
            mapper::populate_list_from_body::<T>(&envelope.body, None)
                .into_iter()
                .next()
        } else {
            None
        };
        (envelope, record)
    }

    /// Re-populate an existing object in place. Refresh semantics apply:
    /// the object's identity is never altered.
    pub async fn populate<T: WireRecord>(&self, url: &str, target: &mut T) -> RestResult {
        let envelope = self.transport.send(RestRequest::get(url)).await;
        if envelope.success {
            mapper::populate_object_from_body(&envelope.body, target);
        }
        envelope
    }

    /// Object id of the primary location, fetched lazily and cached for
    /// the life of the session
    pub async fn primary_location_object_id(&self) -> Option<String> {
        self.primary_location
            .get_or_try_init(|| async {
                let url = format!("{}/locations/connectionlocations", self.base_url());
                let (envelope, locations) = self.fetch_list::<ConnectionLocation>(&url).await;
                match locations.into_iter().next() {
                    Some(location) if envelope.success => Ok(location.object_id),
                    _ => {
                        warn!("primary location lookup failed:\n{}", envelope);
                        Err(())
                    }
                }
            })
            .await
            .ok()
            .cloned()
    }

    /// Object id of the home server, resolved from the login-time cluster
    /// list when available and lazily fetched otherwise
    pub async fn home_server_object_id(&self) -> Option<String> {
        if let Some(first) = self.cluster.first() {
            return Some(first.object_id.clone());
        }
        self.home_server
            .get_or_try_init(|| async {
                let url = format!("{}/vms/servers", self.base_url());
                let (envelope, servers) = self.fetch_list::<ClusterMember>(&url).await;
                match servers.into_iter().next() {
                    Some(server) if envelope.success => Ok(server.object_id),
                    _ => {
                        warn!("home server lookup failed:\n{}", envelope);
                        Err(())
                    }
                }
            })
            .await
            .ok()
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ParsedBody;
    use crate::transport::StubTransport;

    fn ok_response(raw: &str) -> RestResult {
        RestResult {
            success: true,
            status: 200,
            raw: raw.to_string(),
            body: ParsedBody::parse(raw),
            ..Default::default()
        }
    }

    fn not_found() -> RestResult {
        RestResult {
            success: false,
            status: 404,
            status_description: "Not Found".to_string(),
            error_text: "404 Not Found".to_string(),
            ..Default::default()
        }
    }

    fn test_config() -> ConnectionConfig {
        ConnectionConfig::new("conn1.example.com", "admin", "pw")
    }

    #[tokio::test]
    async fn login_resolves_version_and_cluster() {
        let stub = Arc::new(StubTransport::new());
        stub.push_response(ok_response(r#"{"version":"10.5.2.0ES3"}"#));
        stub.push_response(ok_response(
            r#"{"VmsServer":[{"ObjectId":"srv1","HostName":"conn1","ServerRole":"Primary"},{"ObjectId":"srv2","HostName":"conn2","ServerRole":"Secondary"}]}"#,
        ));

        let session = ServerSession::connect_with_transport(test_config(), stub.clone())
            .await
            .unwrap();
        assert_eq!(session.version().to_string(), "10.5.2.0ES3");
        assert_eq!(session.cluster_members().len(), 2);
        assert_eq!(session.cluster_members()[0].role, ServerRole::Primary);
        assert_eq!(
            session.home_server_object_id().await.as_deref(),
            Some("srv1")
        );

        let requests = stub.requests();
        assert!(requests[0].url.ends_with("/vmrest/version"));
        assert!(requests[1].url.ends_with("/vmrest/vms/servers"));
    }

    #[tokio::test]
    async fn pre_cluster_version_skips_cluster_fetch() {
        let stub = Arc::new(StubTransport::new());
        stub.push_response(ok_response(r#"{"version":"8.6.2.0"}"#));

        let session = ServerSession::connect_with_transport(test_config(), stub.clone())
            .await
            .unwrap();
        assert!(session.cluster_members().is_empty());
        assert_eq!(stub.requests().len(), 1);
    }

    #[tokio::test]
    async fn cluster_fetch_can_be_disabled() {
        let stub = Arc::new(StubTransport::new());
        stub.push_response(ok_response(r#"{"version":"12.0.1.0"}"#));

        let config = test_config().with_cluster_fetch(false);
        let session = ServerSession::connect_with_transport(config, stub.clone())
            .await
            .unwrap();
        assert!(session.cluster_members().is_empty());
        assert_eq!(stub.requests().len(), 1);
    }

    #[tokio::test]
    async fn failed_version_fetch_is_hard_login_failure() {
        let stub = Arc::new(StubTransport::new());
        stub.push_response(not_found());

        let err = ServerSession::connect_with_transport(test_config(), stub)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Login { .. }));
    }

    #[tokio::test]
    async fn unparsable_version_is_hard_login_failure() {
        let stub = Arc::new(StubTransport::new());
        stub.push_response(ok_response(r#"{"version":"not.a.version"}"#));

        let err = ServerSession::connect_with_transport(test_config(), stub)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Login { .. }));
    }

    #[tokio::test]
    async fn empty_cluster_aborts_login() {
        let stub = Arc::new(StubTransport::new());
        stub.push_response(ok_response(r#"{"version":"10.0.1.0"}"#));
        stub.push_response(ok_response(r#"{"VmsServer":[]}"#));

        let err = ServerSession::connect_with_transport(test_config(), stub)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Login { .. }));
    }

    #[tokio::test]
    async fn failed_cluster_fetch_aborts_login() {
        let stub = Arc::new(StubTransport::new());
        stub.push_response(ok_response(r#"{"version":"10.0.1.0"}"#));
        stub.push_response(not_found());

        let err = ServerSession::connect_with_transport(test_config(), stub)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Login { .. }));
    }

    #[tokio::test]
    async fn invalid_config_never_reaches_the_wire() {
        let stub = Arc::new(StubTransport::new());
        let err = ServerSession::connect_with_transport(
            ConnectionConfig::new("", "admin", "pw"),
            stub.clone(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Configuration { .. }));
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn fetch_list_and_populate_round_trip() {
        let stub = Arc::new(StubTransport::new());
        stub.push_response(ok_response(r#"{"version":"10.0.1.0"}"#));
        stub.push_response(ok_response(
            r#"{"VmsServer":[{"ObjectId":"srv1","HostName":"conn1"}]}"#,
        ));
        // fetch_list
        stub.push_response(ok_response(
            r#"{"@total":"2","ConnectionLocation":[{"ObjectId":"loc1","DisplayName":"HQ"},{"ObjectId":"loc2","DisplayName":"Branch"}]}"#,
        ));
        // populate
        stub.push_response(ok_response(
            r#"{"ConnectionLocation":{"ObjectId":"evil","DisplayName":"Renamed"}}"#,
        ));

        let session = ServerSession::connect_with_transport(test_config(), stub)
            .await
            .unwrap();

        let url = format!("{}/locations/connectionlocations", session.base_url());
        let (envelope, mut locations) = session.fetch_list::<ConnectionLocation>(&url).await;
        assert!(envelope.success);
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].object_id, "loc1");

        let target = &mut locations[0];
        let envelope = session
            .populate(&format!("{}/{}", url, target.object_id), target)
            .await;
        assert!(envelope.success);
        assert_eq!(target.display_name, "Renamed");
        assert_eq!(target.object_id, "loc1");
    }

    #[tokio::test]
    async fn lazy_primary_location_is_fetched_once() {
        let stub = Arc::new(StubTransport::new());
        stub.push_response(ok_response(r#"{"version":"8.6.2.0"}"#));
        stub.push_response(ok_response(
            r#"{"ConnectionLocation":{"ObjectId":"loc1","DisplayName":"HQ"}}"#,
        ));

        let session = ServerSession::connect_with_transport(test_config(), stub.clone())
            .await
            .unwrap();

        assert_eq!(
            session.primary_location_object_id().await.as_deref(),
            Some("loc1")
        );
        // Second call answers from the cache; the stub queue is empty.
        assert_eq!(
            session.primary_location_object_id().await.as_deref(),
            Some("loc1")
        );
        assert_eq!(stub.requests().len(), 2);
    }
}
