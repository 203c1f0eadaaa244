//! Harness-level error taxonomy.
//!
//! These errors describe problems with the harness itself (no session, broken
//! transport, bad setup). They travel inside `anyhow::Error` chains and are
//! recovered by downcasting, so service-under-test failures never use them.

/// Harness failure kinds that abort a scenario (or the whole run).
#[derive(Debug)]
pub enum HarnessError {
    /// Session creation did not yield a usable identifier.
    SessionInit { status: Option<u16>, detail: String },
    /// A request was about to leave without the active session identifier.
    SessionMismatch {
        expected: String,
        found: Option<String>,
    },
    /// The transport failed before a complete response arrived.
    Transport {
        method: String,
        url: String,
        detail: String,
    },
    /// The harness could not build the request it intended to send.
    Setup(String),
    /// A scenario's precondition (produced by another scenario) is missing.
    Precondition(String),
}

impl HarnessError {
    /// Whether the error invalidates every remaining scenario in the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::SessionInit { .. } | HarnessError::SessionMismatch { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::SessionInit { .. } => "session_init",
            HarnessError::SessionMismatch { .. } => "session_mismatch",
            HarnessError::Transport { .. } => "transport",
            HarnessError::Setup(_) => "setup",
            HarnessError::Precondition(_) => "precondition",
        }
    }
}

impl std::fmt::Display for HarnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarnessError::SessionInit { status, detail } => match status {
                Some(status) => write!(f, "session init failed (status {status}): {detail}"),
                None => write!(f, "session init failed: {detail}"),
            },
            HarnessError::SessionMismatch { expected, found } => match found {
                Some(found) => write!(
                    f,
                    "request carries session {found:?} but the run owns {expected:?}"
                ),
                None => write!(f, "request is missing session header for {expected:?}"),
            },
            HarnessError::Transport {
                method,
                url,
                detail,
            } => write!(f, "transport failure for {method} {url}: {detail}"),
            HarnessError::Setup(detail) => write!(f, "request setup failed: {detail}"),
            HarnessError::Precondition(detail) => write!(f, "precondition missing: {detail}"),
        }
    }
}

impl std::error::Error for HarnessError {}

/// Find the first harness error in an error chain, if any.
pub fn harness_error(err: &anyhow::Error) -> Option<&HarnessError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<HarnessError>())
}
