//! Session manager.
//!
//! A run owns exactly one session identifier. `start` acquires it, and every
//! later request goes through `SessionClient`, which stamps the identifier on
//! the way out and refuses to send a request claiming a different session.
use crate::error::HarnessError;
use crate::http::{ApiRequest, ApiResponse, Transport, SESSION_HEADER};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Instant;

/// Progress flag the "create" restore variant sets before pushing a snapshot.
pub const NEW_RESTORED_FLAG: &str = "PUT_NEW_RESTORED_CHALLENGER_PROGRESS_STATUS";

/// The opaque identifier scoping all service-side state for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
}

impl Session {
    /// Attach to a session created elsewhere (progress inspection).
    pub fn existing(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Create a new session. The response is returned as well so the caller can
/// assert on the creation exchange itself.
pub fn start(transport: &dyn Transport) -> Result<(Session, ApiResponse)> {
    let response = transport
        .send(&ApiRequest::post("challenger"))
        .context("create challenger session")?;
    if response.status != 201 {
        return Err(HarnessError::SessionInit {
            status: Some(response.status),
            detail: format!("expected 201, body {:?}", crate::util::snippet(&response.text())),
        }
        .into());
    }
    let id = response
        .header(SESSION_HEADER)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| HarnessError::SessionInit {
            status: Some(response.status),
            detail: format!("response has no {SESSION_HEADER} header"),
        })?
        .to_string();
    tracing::info!(session = %id, "session acquired");
    Ok((Session { id }, response))
}

/// Which representation of a session's progress to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSource {
    /// The service's in-memory view.
    Live,
    /// The durable-storage view (`/challenger/database/{id}`).
    Database,
}

impl ProgressSource {
    fn path(&self, session: &Session) -> String {
        match self {
            ProgressSource::Live => format!("challenger/{}", session.id),
            ProgressSource::Database => format!("challenger/database/{}", session.id),
        }
    }

    /// Status the service answers a successful restore with.
    pub fn restore_status(&self) -> u16 {
        match self {
            ProgressSource::Live => 200,
            ProgressSource::Database => 204,
        }
    }
}

/// A challenge-completion snapshot. Fields the harness does not model are
/// kept verbatim so a restore echoes them back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(rename = "xChallenger", default, skip_serializing_if = "Option::is_none")]
    pub x_challenger: Option<String>,
    #[serde(rename = "challengeStatus", default)]
    pub challenge_status: BTreeMap<String, bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressSnapshot {
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).context("parse progress snapshot")
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).context("serialize progress snapshot")
    }

    pub fn entries(&self) -> usize {
        self.challenge_status.len()
    }

    pub fn completed(&self) -> usize {
        self.challenge_status.values().filter(|done| **done).count()
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.challenge_status.get(key).copied().unwrap_or(false)
    }

    /// Copy of this snapshot with one flag forced to `value`.
    pub fn with_flag(&self, key: &str, value: bool) -> Self {
        let mut next = self.clone();
        next.challenge_status.insert(key.to_string(), value);
        next
    }
}

/// Sends requests on behalf of one session.
pub struct SessionClient<'a> {
    transport: &'a dyn Transport,
    session: Session,
}

impl<'a> SessionClient<'a> {
    pub fn new(transport: &'a dyn Transport, session: Session) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Stamp the session header, or fail if the request already names another
    /// session.
    pub fn stamp(&self, mut request: ApiRequest) -> Result<ApiRequest> {
        match request.header_value(SESSION_HEADER) {
            None => request.set_header(SESSION_HEADER, self.session.id.as_str()),
            Some(found) if found == self.session.id => {}
            Some(found) => {
                return Err(HarnessError::SessionMismatch {
                    expected: self.session.id.clone(),
                    found: Some(found.to_string()).filter(|found| !found.is_empty()),
                }
                .into())
            }
        }
        Ok(request)
    }

    pub fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request = self.stamp(request)?;
        let started = Instant::now();
        let response = self
            .transport
            .send(&request)
            .with_context(|| format!("{} {}", request.method, request.target()))?;
        tracing::debug!(
            method = %request.method,
            path = %request.target(),
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "exchange"
        );
        Ok(response)
    }

    /// Fetch a progress snapshot. The snapshot is `None` when the service did
    /// not answer 200 with a parsable document.
    pub fn fetch_progress(
        &self,
        source: ProgressSource,
    ) -> Result<(ApiResponse, Option<ProgressSnapshot>)> {
        let response = self.send(ApiRequest::get(source.path(&self.session)))?;
        if response.status != 200 {
            return Ok((response, None));
        }
        let snapshot = match response
            .json()
            .and_then(|value| ProgressSnapshot::from_value(&value))
        {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::debug!(error = %format!("{err:#}"), "progress body not parsable");
                None
            }
        };
        Ok((response, snapshot))
    }

    /// Fetch the raw durable-storage document, which holds the session's
    /// entities rather than challenge flags.
    pub fn fetch_stored(&self) -> Result<(ApiResponse, Option<Value>)> {
        let response = self.send(ApiRequest::get(ProgressSource::Database.path(&self.session)))?;
        let document = if response.status == 200 {
            response.json().ok()
        } else {
            None
        };
        Ok((response, document))
    }

    /// Push a document back to the live or durable representation.
    pub fn restore_progress(
        &self,
        source: ProgressSource,
        document: &Value,
    ) -> Result<ApiResponse> {
        let request = ApiRequest::put(source.path(&self.session)).json(document)?;
        self.send(request)
    }
}
