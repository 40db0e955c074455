//! Phone-based record and playback call control
//!
//! A [`PhoneSession`] wraps one service-issued call: dial out to a phone,
//! record audio through it, play streams or messages back over it, and hang
//! up. Construction is all-or-nothing — the dial request must yield a call
//! id and the call must report `connected` within the configured poll
//! budget, or [`PhoneSession::dial`] fails hard and nothing half-connected
//! reaches the caller.
//!
//! Record and play are blocking by contract: the request does not come back
//! until the far end reports a terminal state (caller hung up or pressed
//! the terminator key), so those exchanges run with the long media timeout
//! rather than the ordinary request timeout. [`PhoneSession::hang_up`] is
//! idempotent. Dropping a still-active session fires a best-effort hang-up,
//! but `Drop` cannot await: the disconnect runs on a spawned task that needs
//! a live tokio runtime and may be abandoned during runtime shutdown. Call
//! [`PhoneSession::hang_up`] explicitly whenever the disconnect must be
//! guaranteed.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::result::RestResult;
use crate::session::ServerSession;
use crate::transport::{ContentKind, RestRequest, Transport};

/// Media flavor of the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Audio,
    Video,
}

impl CallKind {
    fn wire_symbol(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Observable state of an established call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Recording,
    Playing,
    Disconnected,
}

/// Servers at or above this version take an explicit call type on dial
const CALL_TYPE_MIN_VERSION: (u32, u32, u32, u32, u32) = (10, 0, 1, 0, 0);

/// One phone-based media call
pub struct PhoneSession {
    transport: Arc<dyn Transport>,
    base_url: String,
    call_id: String,
    number: String,
    kind: CallKind,
    state: CallState,
    media_timeout: Duration,
    /// Stream resource id of the most recent successful recording
    recording_resource_id: Option<String>,
    /// Video recording session id, captured only when the server sends one
    recording_session_id: Option<String>,
}

impl std::fmt::Debug for PhoneSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhoneSession")
            .field("call_id", &self.call_id)
            .field("number", &self.number)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PhoneSession {
    /// Dial a phone and wait for the call to connect.
    ///
    /// Issues the call-creation request (destination number, ring ceiling,
    /// and — on servers new enough to accept it — the call type), extracts
    /// the call id from the `.../calls/<id>` location, then polls the call
    /// status with the configured budget. Every failure along the way is a
    /// hard [`ClientError::CallSetup`]; a call that got created but never
    /// connected is torn down before returning the error.
    pub async fn dial(
        session: &ServerSession,
        number: &str,
        maximum_rings: u32,
        kind: CallKind,
    ) -> Result<PhoneSession> {
        if number.trim().is_empty() {
            return Err(ClientError::config("destination number must not be empty"));
        }

        let config = session.config();
        let base_url = session.base_url();
        let transport = Arc::clone(session.transport());

        let mut body = json!({
            "number": number,
            "maximumRings": maximum_rings,
        });
        if session.version().is_at_least(
            CALL_TYPE_MIN_VERSION.0,
            CALL_TYPE_MIN_VERSION.1,
            CALL_TYPE_MIN_VERSION.2,
            CALL_TYPE_MIN_VERSION.3,
            CALL_TYPE_MIN_VERSION.4,
        ) {
            body["callType"] = json!(kind.wire_symbol());
        }
        let body = body.to_string();

        debug!(number = %number, "dialing phone");
        let envelope = transport
            .send(RestRequest::post(format!("{}/calls", base_url)).with_body(body, ContentKind::Json))
            .await;
        if !envelope.success {
            warn!("call creation failed:\n{}", envelope);
            return Err(ClientError::call_setup(format!(
                "call creation failed: {}",
                envelope.error_text
            )));
        }
        let call_id = envelope
            .returned_object_id
            .clone()
            .ok_or_else(|| ClientError::call_setup("call creation response carried no call id"))?;

        let mut call = PhoneSession {
            transport,
            base_url,
            call_id,
            number: number.to_string(),
            kind,
            state: CallState::Idle,
            media_timeout: config.media_timeout,
            recording_resource_id: None,
            recording_session_id: None,
        };

        // Small fixed poll budget; a phone that has not answered by now is
        // reported as a construction failure, not a half-connected call.
        let attempts = 1 + config.connect_poll_retries;
        for attempt in 0..attempts {
            if attempt > 0 {
                sleep(config.connect_poll_delay).await;
            }
            let envelope = call.transport.send(RestRequest::get(call.call_url())).await;
            let connected = envelope
                .body
                .field("connected")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
            if envelope.success && connected {
                debug!(call_id = %call.call_id, "call connected");
                return Ok(call);
            }
        }

        // Tear the unanswered call down before failing the construction.
        call.state = CallState::Disconnected;
        let call_url = call.call_url();
        let _ = call.transport.send(RestRequest::delete(call_url)).await;
        Err(ClientError::call_setup(format!(
            "call to {} did not reach connected state within {} poll(s)",
            call.number, attempts
        )))
    }

    fn call_url(&self) -> String {
        format!("{}/calls/{}", self.base_url, self.call_id)
    }

    /// Service-issued call identifier
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Destination number this call was dialed to
    pub fn number(&self) -> &str {
        &self.number
    }

    /// Media flavor requested at dial time
    pub fn kind(&self) -> CallKind {
        self.kind
    }

    /// Current call state
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Stream resource id of the most recent successful recording
    pub fn recording_resource_id(&self) -> Option<&str> {
        self.recording_resource_id.as_deref()
    }

    /// Video recording session id, when one was reported
    pub fn recording_session_id(&self) -> Option<&str> {
        self.recording_session_id.as_deref()
    }

    /// Record through the phone. Blocks until the remote side reports the
    /// recording terminated. Success requires `lastResult == 0` and a
    /// non-empty resource id; both advance this session's recording
    /// identifiers, and a failed attempt leaves them untouched.
    pub async fn record(&mut self) -> RestResult {
        self.state = CallState::Recording;
        debug!(call_id = %self.call_id, "recording started");

        let mut envelope = self
            .transport
            .send(
                RestRequest::post(format!("{}/recordings", self.call_url()))
                    .with_timeout(self.media_timeout),
            )
            .await;
        self.state = CallState::Idle;

        if !envelope.success {
            return envelope;
        }

        let last_result = envelope.body.field("lastResult").unwrap_or_default();
        let resource_id = envelope.body.field("resourceId").unwrap_or_default();
        if last_result == "0" && !resource_id.is_empty() {
            self.recording_resource_id = Some(resource_id);
            if let Some(session_id) = envelope.body.field("sessionId") {
                if !session_id.is_empty() {
                    self.recording_session_id = Some(session_id);
                }
            }
        } else {
            envelope.success = false;
            envelope.error_text = format!(
                "recording did not complete: lastResult={:?} resourceId={:?}",
                last_result, resource_id
            );
            warn!("{}", envelope.error_text);
        }
        envelope
    }

    /// Play the most recent recording made on this session
    pub async fn play_recording(&mut self) -> Result<RestResult> {
        let resource_id = self
            .recording_resource_id
            .clone()
            .ok_or_else(|| ClientError::missing_resource("no recording exists on this call"))?;
        Ok(self.play(json!({ "resourceId": resource_id }).to_string()).await)
    }

    /// Play a stream resource by id
    pub async fn play_stream(&mut self, resource_id: &str) -> Result<RestResult> {
        if resource_id.trim().is_empty() {
            return Err(ClientError::missing_resource("stream resource id is empty"));
        }
        Ok(self.play(json!({ "resourceId": resource_id }).to_string()).await)
    }

    /// Play a stored message by id
    pub async fn play_message(&mut self, message_id: &str) -> Result<RestResult> {
        if message_id.trim().is_empty() {
            return Err(ClientError::missing_resource("message id is empty"));
        }
        Ok(self.play(json!({ "messageId": message_id }).to_string()).await)
    }

    /// Blocking play primitive; terminal once `lastResult` comes back
    async fn play(&mut self, body: String) -> RestResult {
        self.state = CallState::Playing;
        debug!(call_id = %self.call_id, "playback started");

        let mut envelope = self
            .transport
            .send(
                RestRequest::post(format!("{}/plays", self.call_url()))
                    .with_body(body, ContentKind::Json)
                    .with_timeout(self.media_timeout),
            )
            .await;
        self.state = CallState::Idle;

        if envelope.success {
            let last_result = envelope.body.field("lastResult").unwrap_or_default();
            if last_result != "0" {
                envelope.success = false;
                envelope.error_text =
                    format!("playback did not complete: lastResult={:?}", last_result);
                warn!("{}", envelope.error_text);
            }
        }
        envelope
    }

    /// Hang the call up. Safe to invoke any number of times; hanging up a
    /// call that is already gone is not an error.
    pub async fn hang_up(&mut self) -> RestResult {
        if self.state == CallState::Disconnected {
            debug!(call_id = %self.call_id, "hang up with no active call");
            return RestResult {
                success: true,
                method: "DELETE".to_string(),
                url: self.call_url(),
                ..Default::default()
            };
        }
        self.state = CallState::Disconnected;
        self.transport
            .send(RestRequest::delete(self.call_url()))
            .await
    }
}

/// Last-resort cleanup for a still-active call. `Drop` is synchronous, so
/// the disconnect is handed to a spawned task: it is skipped entirely when
/// no tokio runtime is current, and a task spawned during runtime shutdown
/// may never run. Explicit [`PhoneSession::hang_up`] is the reliable path.
impl Drop for PhoneSession {
    fn drop(&mut self) {
        if self.state != CallState::Disconnected {
            let transport = Arc::clone(&self.transport);
            let url = self.call_url();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = transport.send(RestRequest::delete(url)).await;
                });
            }
        }
    }
}
