//! HTTP transport with session-cookie lifecycle
//!
//! One [`Transport`] instance performs one exchange at a time: every send
//! funnels through a per-instance async mutex, a deliberate simplification
//! for low-concurrency administrative use rather than a throughput
//! optimization. Basic-Auth credentials ride on **every** request — not
//! just after a 401 challenge — to avoid the extra round trip, and an
//! opportunistic session cookie is attached whenever a fresh one is cached.
//!
//! Failure shaping follows the envelope contract: a 4xx/5xx response is a
//! normal `success=false` [`RestResult`] with the body preserved for
//! diagnostics, while DNS/connect/timeout errors produce the status-`0`
//! sentinel envelope. Nothing at this layer raises a hard error once a
//! transport has been constructed.

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::error::{ClientError, Result};
use crate::paging;
use crate::result::{ParsedBody, RestResult};

/// HTTP method of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body dialect of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Xml,
}

impl ContentKind {
    fn mime(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }
}

/// One outbound request
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub url: String,
    pub method: HttpMethod,
    pub body: String,
    pub content: ContentKind,
    /// Override of the transport's default timeout; the blocking
    /// record/play exchanges run far past it
    pub timeout: Option<Duration>,
}

impl RestRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            body: String::new(),
            content: ContentKind::Json,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn with_body(mut self, body: impl Into<String>, content: ContentKind) -> Self {
        self.body = body.into();
        self.content = content;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Attachment shape for a message upload
#[derive(Debug, Clone)]
pub enum MessageAttachment {
    /// Inline WAV payload
    Wav { filename: String, data: Vec<u8> },
    /// Reference to a stream resource already recorded on the server
    StreamResource { resource_id: String },
}

/// One HTTP exchange seam. Implemented by the real reqwest transport and by
/// the scripted [`StubTransport`] test double.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one exchange and shape the outcome into an envelope. Never
    /// fails hard; all failure modes are encoded in the [`RestResult`].
    async fn send(&self, request: RestRequest) -> RestResult;

    /// Fetch a binary payload (legacy voice-file servlet). The envelope
    /// reports the exchange; bytes are empty unless it succeeded.
    async fn download(&self, url: &str) -> (RestResult, Vec<u8>);

    /// Post a multipart/form-data message with a WAV attachment or a
    /// stream-resource reference.
    async fn upload_message(
        &self,
        url: &str,
        message_json: String,
        attachment: MessageAttachment,
    ) -> RestResult;
}

/// Session cookie plus its issue timestamp, guarded as one unit so readers
/// can never observe a torn pair.
#[derive(Debug)]
pub struct CookieJar {
    ttl: Duration,
    state: StdMutex<Option<StoredCookie>>,
}

#[derive(Debug, Clone)]
struct StoredCookie {
    value: String,
    issued_at: Instant,
}

impl CookieJar {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: StdMutex::new(None),
        }
    }

    /// Current cookie, proactively clearing one older than the TTL. The
    /// real server-side lifetime is unknown; expiring early biases toward
    /// re-authenticating over sending a stale cookie.
    pub fn current(&self) -> Option<String> {
        let mut state = self.state.lock().expect("cookie lock poisoned");
        match state.as_ref() {
            Some(stored) if stored.issued_at.elapsed() <= self.ttl => Some(stored.value.clone()),
            Some(_) => {
                debug!("session cookie past TTL, clearing before reuse");
                *state = None;
                None
            }
            None => None,
        }
    }

    /// Replace the stored cookie with a freshly issued one
    pub fn store(&self, value: String) {
        let mut state = self.state.lock().expect("cookie lock poisoned");
        *state = Some(StoredCookie {
            value,
            issued_at: Instant::now(),
        });
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().expect("cookie lock poisoned");
        *state = None;
    }

    /// Diagnostic view of the stored cookie, TTL not applied
    pub fn peek(&self) -> Option<String> {
        let state = self.state.lock().expect("cookie lock poisoned");
        state.as_ref().map(|s| s.value.clone())
    }
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    auth_header: String,
    cookies: std::sync::Arc<CookieJar>,
    default_timeout: Duration,
    exchange_lock: Mutex<()>,
}

impl HttpTransport {
    /// Build a transport for one server connection. Construction is the
    /// only fallible step; everything after returns envelopes.
    pub fn new(config: &ConnectionConfig, cookies: std::sync::Arc<CookieJar>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(concat!("vmrest-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::config(format!("HTTP client construction failed: {}", e)))?;

        let credentials = format!("{}:{}", config.username, config.password);
        let auth_header = format!("Basic {}", BASE64.encode(credentials.as_bytes()));

        Ok(Self {
            client,
            auth_header,
            cookies,
            default_timeout: config.request_timeout,
            exchange_lock: Mutex::new(()),
        })
    }

    fn builder_for(&self, request: &RestRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };

        builder = builder
            .header(AUTHORIZATION, &self.auth_header)
            .header(ACCEPT, "application/json, application/xml")
            .timeout(request.timeout.unwrap_or(self.default_timeout));

        if let Some(cookie) = self.cookies.current() {
            builder = builder.header(COOKIE, cookie);
        }

        if !request.body.is_empty() {
            builder = builder
                .header(CONTENT_TYPE, request.content.mime())
                .body(request.body.clone());
        }

        builder
    }

    /// Capture any session token the server set. Unity-style servers issue
    /// `JSESSIONID`/`JSESSIONIDSSO` pairs; everything else is ignored.
    fn capture_cookies(&self, headers: &reqwest::header::HeaderMap) {
        let mut captured: Vec<String> = Vec::new();
        for value in headers.get_all(SET_COOKIE) {
            if let Ok(text) = value.to_str() {
                if text.contains("JSESSIONID") {
                    if let Some(pair) = text.split(';').next() {
                        captured.push(pair.trim().to_string());
                    }
                }
            }
        }
        if !captured.is_empty() {
            self.cookies.store(captured.join("; "));
        }
    }

    async fn envelope_from_response(
        &self,
        request: &RestRequest,
        response: reqwest::Response,
    ) -> RestResult {
        let status = response.status();
        let status_description = status.canonical_reason().unwrap_or("").to_string();

        self.capture_cookies(response.headers());

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let raw = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                warn!(url = %request.url, "response body read failed: {}", err);
                return RestResult::transport_failure(
                    request.method.as_str(),
                    &request.url,
                    &request.body,
                    format!("response body read failed: {}", err),
                );
            }
        };

        let body = ParsedBody::parse(&raw);
        let total_count = paging::total_object_count(&body);
        let success = RestResult::status_accepted(status.as_u16());

        let returned_object_id = if success {
            extract_created_id(location.as_deref(), &raw)
        } else {
            None
        };

        let error_text = if success {
            String::new()
        } else {
            warn!(
                method = request.method.as_str(),
                url = %request.url,
                status = status.as_u16(),
                "protocol failure: {} {}",
                status.as_u16(),
                status_description
            );
            body.field("errors")
                .or_else(|| body.field("message"))
                .unwrap_or_else(|| format!("{} {}", status.as_u16(), status_description))
        };

        RestResult {
            success,
            status: status.as_u16(),
            status_description,
            raw,
            body,
            total_count,
            returned_object_id,
            error_text,
            method: request.method.as_str().to_string(),
            url: request.url.clone(),
            request_body: request.body.clone(),
        }
    }
}

/// Id of a created resource: the trailing segment of a `Location` header,
/// or of a bare path echoed as the response body.
fn extract_created_id(location: Option<&str>, raw: &str) -> Option<String> {
    let candidate = match location {
        Some(loc) if !loc.is_empty() => loc,
        _ => {
            let trimmed = raw.trim();
            if trimmed.contains('/') && !trimmed.contains(char::is_whitespace) && !trimmed.starts_with('<') && !trimmed.starts_with('{') {
                trimmed
            } else {
                return None;
            }
        }
    };
    candidate
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RestRequest) -> RestResult {
        // One exchange in flight per transport instance.
        let _guard = self.exchange_lock.lock().await;

        debug!(method = request.method.as_str(), url = %request.url, "dispatching request");

        match self.builder_for(&request).send().await {
            Ok(response) => self.envelope_from_response(&request, response).await,
            Err(err) => {
                warn!(url = %request.url, "transport failure: {}", err);
                RestResult::transport_failure(
                    request.method.as_str(),
                    &request.url,
                    &request.body,
                    err.to_string(),
                )
            }
        }
    }

    async fn download(&self, url: &str) -> (RestResult, Vec<u8>) {
        let _guard = self.exchange_lock.lock().await;

        debug!(url = %url, "downloading voice file");

        let mut builder = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.auth_header)
            .timeout(self.default_timeout);
        if let Some(cookie) = self.cookies.current() {
            builder = builder.header(COOKIE, cookie);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                self.capture_cookies(response.headers());
                let success = RestResult::status_accepted(status.as_u16());
                let bytes = match response.bytes().await {
                    Ok(b) => b.to_vec(),
                    Err(err) => {
                        let envelope = RestResult::transport_failure(
                            "GET",
                            url,
                            "",
                            format!("download body read failed: {}", err),
                        );
                        return (envelope, Vec::new());
                    }
                };
                let envelope = RestResult {
                    success,
                    status: status.as_u16(),
                    status_description: status.canonical_reason().unwrap_or("").to_string(),
                    error_text: if success {
                        String::new()
                    } else {
                        format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""))
                    },
                    method: "GET".to_string(),
                    url: url.to_string(),
                    ..Default::default()
                };
                if success {
                    (envelope, bytes)
                } else {
                    (envelope, Vec::new())
                }
            }
            Err(err) => (
                RestResult::transport_failure("GET", url, "", err.to_string()),
                Vec::new(),
            ),
        }
    }

    async fn upload_message(
        &self,
        url: &str,
        message_json: String,
        attachment: MessageAttachment,
    ) -> RestResult {
        let _guard = self.exchange_lock.lock().await;

        debug!(url = %url, "uploading message");

        let message_part = reqwest::multipart::Part::text(message_json.clone())
            .mime_str("application/json")
            .unwrap_or_else(|_| reqwest::multipart::Part::text(message_json.clone()));

        let mut form = reqwest::multipart::Form::new().part("message", message_part);
        form = match attachment {
            MessageAttachment::Wav { filename, data } => {
                let part = match reqwest::multipart::Part::bytes(data)
                    .file_name(filename)
                    .mime_str("audio/wav")
                {
                    Ok(part) => part,
                    Err(err) => {
                        return RestResult::transport_failure(
                            "POST",
                            url,
                            &message_json,
                            format!("attachment part construction failed: {}", err),
                        )
                    }
                };
                form.part("recording", part)
            }
            MessageAttachment::StreamResource { resource_id } => {
                let reference = serde_json::json!({ "resourceId": resource_id }).to_string();
                form.text("recordingref", reference)
            }
        };

        let mut builder = self
            .client
            .post(url)
            .header(AUTHORIZATION, &self.auth_header)
            .timeout(self.default_timeout)
            .multipart(form);
        if let Some(cookie) = self.cookies.current() {
            builder = builder.header(COOKIE, cookie);
        }

        let request = RestRequest {
            url: url.to_string(),
            method: HttpMethod::Post,
            body: message_json,
            content: ContentKind::Json,
            timeout: None,
        };

        match builder.send().await {
            Ok(response) => self.envelope_from_response(&request, response).await,
            Err(err) => RestResult::transport_failure("POST", url, &request.body, err.to_string()),
        }
    }
}

/// Scripted transport for tests: responses come off a queue, and every
/// request is recorded for assertions.
#[derive(Default)]
pub struct StubTransport {
    responses: StdMutex<VecDeque<RestResult>>,
    requests: StdMutex<Vec<RestRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next envelope to hand back
    pub fn push_response(&self, response: RestResult) {
        self.responses
            .lock()
            .expect("stub lock poisoned")
            .push_back(response);
    }

    /// Requests seen so far, in order
    pub fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().expect("stub lock poisoned").clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: RestRequest) -> RestResult {
        let mut envelope = self
            .responses
            .lock()
            .expect("stub lock poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                RestResult::transport_failure(
                    request.method.as_str(),
                    &request.url,
                    &request.body,
                    "stub transport exhausted",
                )
            });
        envelope.method = request.method.as_str().to_string();
        envelope.url = request.url.clone();
        envelope.request_body = request.body.clone();
        self.requests
            .lock()
            .expect("stub lock poisoned")
            .push(request);
        envelope
    }

    async fn download(&self, url: &str) -> (RestResult, Vec<u8>) {
        let envelope = self.send(RestRequest::get(url)).await;
        (envelope, Vec::new())
    }

    async fn upload_message(
        &self,
        url: &str,
        message_json: String,
        _attachment: MessageAttachment,
    ) -> RestResult {
        self.send(RestRequest::post(url).with_body(message_json, ContentKind::Json))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_jar_reuses_fresh_and_clears_stale() {
        let jar = CookieJar::new(Duration::from_secs(60));
        assert!(jar.current().is_none());

        jar.store("JSESSIONID=abc123".to_string());
        assert_eq!(jar.current().as_deref(), Some("JSESSIONID=abc123"));
        assert_eq!(jar.current().as_deref(), Some("JSESSIONID=abc123"));

        let short_jar = CookieJar::new(Duration::from_millis(0));
        short_jar.store("JSESSIONID=zzz".to_string());
        std::thread::sleep(Duration::from_millis(5));
        assert!(short_jar.current().is_none());
        // Clearing is sticky until a fresh cookie arrives.
        assert!(short_jar.peek().is_none());
    }

    #[test]
    fn created_id_prefers_location_header() {
        assert_eq!(
            extract_created_id(Some("https://s:8443/vmrest/users/abc-123"), ""),
            Some("abc-123".to_string())
        );
        assert_eq!(
            extract_created_id(None, "/vmrest/calls/77"),
            Some("77".to_string())
        );
        assert_eq!(extract_created_id(None, r#"{"ok":true}"#), None);
        assert_eq!(extract_created_id(None, "plain error text"), None);
        assert_eq!(extract_created_id(Some(""), ""), None);
    }

    #[tokio::test]
    async fn stub_transport_replays_and_records() {
        let stub = StubTransport::new();
        stub.push_response(RestResult {
            success: true,
            status: 200,
            raw: r#"{"version":"10.0.1.0"}"#.to_string(),
            body: ParsedBody::parse(r#"{"version":"10.0.1.0"}"#),
            ..Default::default()
        });

        let envelope = stub.send(RestRequest::get("https://s/vmrest/version")).await;
        assert!(envelope.success);
        assert_eq!(envelope.url, "https://s/vmrest/version");

        let exhausted = stub.send(RestRequest::get("https://s/vmrest/next")).await;
        assert!(!exhausted.success);
        assert_eq!(exhausted.status, 0);

        let seen = stub.requests();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].method, HttpMethod::Get);
    }
}
