//! The declared challenge catalog.
//!
//! Ids, display names and progress keys mirror what the service reports, so a
//! run can be reconciled against `GET /challenges` and progress snapshots.
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;

pub const CHALLENGE_COUNT: usize = 59;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Section {
    GettingStarted,
    FirstRealChallenge,
    Get,
    Head,
    CreatePost,
    CreatePut,
    UpdatePost,
    UpdatePut,
    Delete,
    Options,
    Accept,
    ContentType,
    RestoreSession,
    MixedFormats,
    StatusCodes,
    MethodOverride,
    Authentication,
    Authorization,
    Miscellaneous,
}

impl Section {
    pub fn title(&self) -> &'static str {
        match self {
            Section::GettingStarted => "Getting Started",
            Section::FirstRealChallenge => "First Real Challenge",
            Section::Get => "GET Challenges",
            Section::Head => "HEAD Challenges",
            Section::CreatePost => "Creation Challenges with POST",
            Section::CreatePut => "Creation Challenges with PUT",
            Section::UpdatePost => "Update Challenges with POST",
            Section::UpdatePut => "Update Challenges with PUT",
            Section::Delete => "DELETE Challenges",
            Section::Options => "OPTIONS Challenges",
            Section::Accept => "Accept Challenges",
            Section::ContentType => "Content-Type Challenges",
            Section::RestoreSession => "Fancy a Break? Restore your session",
            Section::MixedFormats => "Mix Accept and Content-Type Challenges",
            Section::StatusCodes => "Status Code Challenges",
            Section::MethodOverride => "HTTP Method Override Challenges",
            Section::Authentication => "Authentication Challenges",
            Section::Authorization => "Authorization Challenges",
            Section::Miscellaneous => "Miscellaneous Challenges",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Challenge {
    pub id: u8,
    /// Key used in progress snapshots (`challengeStatus`).
    pub key: &'static str,
    pub name: &'static str,
    pub section: Section,
}

const fn challenge(id: u8, key: &'static str, name: &'static str, section: Section) -> Challenge {
    Challenge {
        id,
        key,
        name,
        section,
    }
}

use Section::*;

#[rustfmt::skip]
pub const CHALLENGES: [Challenge; CHALLENGE_COUNT] = [
    challenge(1, "CREATE_NEW_CHALLENGER", "POST /challenger (201)", GettingStarted),
    challenge(2, "GET_CHALLENGES", "GET /challenges (200)", FirstRealChallenge),
    challenge(3, "GET_TODOS", "GET /todos (200)", Get),
    challenge(4, "GET_TODOS_NOT_PLURAL_404", "GET /todo (404) not plural", Get),
    challenge(5, "GET_TODO", "GET /todos/{id} (200)", Get),
    challenge(6, "GET_TODO_404", "GET /todos/{id} (404)", Get),
    challenge(7, "GET_TODOS_FILTERED", "GET /todos (200) ?filter", Get),
    challenge(8, "GET_HEAD_TODOS", "HEAD /todos (200)", Head),
    challenge(9, "POST_TODOS", "POST /todos (201)", CreatePost),
    challenge(10, "POST_TODOS_BAD_DONE_STATUS", "POST /todos (400) doneStatus", CreatePost),
    challenge(11, "POST_TODOS_TOO_LONG_TITLE_LENGTH", "POST /todos (400) title too long", CreatePost),
    challenge(12, "POST_TODOS_TOO_LONG_DESCRIPTION_LENGTH", "POST /todos (400) description too long", CreatePost),
    challenge(13, "POST_MAX_OUT_TITLE_DESCRIPTION_LENGTH", "POST /todos (201) max out content", CreatePost),
    challenge(14, "POST_TODOS_TOO_LONG_PAYLOAD_SIZE", "POST /todos (413) content too long", CreatePost),
    challenge(15, "POST_TODOS_INVALID_EXTRA_FIELD", "POST /todos (400) extra", CreatePost),
    challenge(16, "PUT_TODOS_400", "PUT /todos/{id} (400)", CreatePut),
    challenge(17, "POST_UPDATE_TODO", "POST /todos/{id} (200)", UpdatePost),
    challenge(18, "POST_TODOS_404", "POST /todos/{id} (404)", UpdatePost),
    challenge(19, "PUT_TODOS_FULL_200", "PUT /todos/{id} full (200)", UpdatePut),
    challenge(20, "PUT_TODOS_PARTIAL_200", "PUT /todos/{id} partial (200)", UpdatePut),
    challenge(21, "PUT_TODOS_MISSING_TITLE_400", "PUT /todos/{id} no title (400)", UpdatePut),
    challenge(22, "PUT_TODOS_400_NO_AMEND_ID", "PUT /todos/{id} no amend id (400)", UpdatePut),
    challenge(23, "DELETE_A_TODO", "DELETE /todos/{id} (200)", Delete),
    challenge(24, "OPTIONS_TODOS", "OPTIONS /todos (200)", Options),
    challenge(25, "GET_ACCEPT_XML", "GET /todos (200) XML", Accept),
    challenge(26, "GET_ACCEPT_JSON", "GET /todos (200) JSON", Accept),
    challenge(27, "GET_ACCEPT_ANY_DEFAULT_JSON", "GET /todos (200) ANY", Accept),
    challenge(28, "GET_ACCEPT_XML_PREFERRED", "GET /todos (200) XML pref", Accept),
    challenge(29, "GET_JSON_BY_DEFAULT_NO_ACCEPT", "GET /todos (200) no accept", Accept),
    challenge(30, "GET_UNSUPPORTED_ACCEPT_406", "GET /todos (406)", Accept),
    challenge(31, "POST_CREATE_XML", "POST /todos XML", ContentType),
    challenge(32, "POST_CREATE_JSON", "POST /todos JSON", ContentType),
    challenge(33, "POST_TODOS_415", "POST /todos (415)", ContentType),
    challenge(34, "GET_RESTORABLE_CHALLENGER_PROGRESS_STATUS", "GET /challenger/guid (existing X-CHALLENGER)", RestoreSession),
    challenge(35, "PUT_RESTORABLE_CHALLENGER_PROGRESS_STATUS", "PUT /challenger/guid RESTORE", RestoreSession),
    challenge(36, "PUT_NEW_RESTORED_CHALLENGER_PROGRESS_STATUS", "PUT /challenger/guid CREATE", RestoreSession),
    challenge(37, "GET_RESTORABLE_TODOS", "GET /challenger/database/guid (200)", RestoreSession),
    challenge(38, "PUT_RESTORABLE_TODOS", "PUT /challenger/database/guid (Update)", RestoreSession),
    challenge(39, "POST_CREATE_XML_ACCEPT_JSON", "POST /todos XML to JSON", MixedFormats),
    challenge(40, "POST_CREATE_JSON_ACCEPT_XML", "POST /todos JSON to XML", MixedFormats),
    challenge(41, "DELETE_HEARTBEAT_405", "DELETE /heartbeat (405)", StatusCodes),
    challenge(42, "PATCH_HEARTBEAT_500", "PATCH /heartbeat (500)", StatusCodes),
    challenge(43, "TRACE_HEARTBEAT_501", "TRACE /heartbeat (501)", StatusCodes),
    challenge(44, "GET_HEARTBEAT_204", "GET /heartbeat (204)", StatusCodes),
    challenge(45, "OVERRIDE_DELETE_HEARTBEAT_405", "POST /heartbeat as DELETE (405)", MethodOverride),
    challenge(46, "OVERRIDE_PATCH_HEARTBEAT_500", "POST /heartbeat as PATCH (500)", MethodOverride),
    challenge(47, "OVERRIDE_TRACE_HEARTBEAT_501", "POST /heartbeat as Trace (501)", MethodOverride),
    challenge(48, "CREATE_SECRET_TOKEN_401", "POST /secret/token (401)", Authentication),
    challenge(49, "CREATE_SECRET_TOKEN_201", "POST /secret/token (201)", Authentication),
    challenge(50, "GET_SECRET_NOTE_403", "GET /secret/note (403)", Authorization),
    challenge(51, "GET_SECRET_NOTE_401", "GET /secret/note (401)", Authorization),
    challenge(52, "GET_SECRET_NOTE_200", "GET /secret/note (200)", Authorization),
    challenge(53, "POST_SECRET_NOTE_200", "POST /secret/note (200)", Authorization),
    challenge(54, "POST_SECRET_NOTE_401", "POST /secret/note (401)", Authorization),
    challenge(55, "POST_SECRET_NOTE_403", "POST /secret/note (403)", Authorization),
    challenge(56, "GET_SECRET_NOTE_BEARER_200", "GET /secret/note (Bearer)", Authorization),
    challenge(57, "POST_SECRET_NOTE_BEARER_200", "POST /secret/note (Bearer)", Authorization),
    challenge(58, "DELETE_ALL_TODOS", "DELETE /todos/{id} (200) all", Miscellaneous),
    challenge(59, "CREATE_ALL_TODOS", "POST /todos (201) all", Miscellaneous),
];

pub fn lookup(id: u8) -> Option<&'static Challenge> {
    CHALLENGES.iter().find(|challenge| challenge.id == id)
}

pub fn by_key(key: &str) -> Option<&'static Challenge> {
    CHALLENGES.iter().find(|challenge| challenge.key == key)
}

/// A catalog entry as the service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceChallenge {
    pub id: Option<u8>,
    pub name: String,
    pub completed: bool,
}

impl ServiceChallenge {
    /// The declared challenge this entry corresponds to: by name first, since
    /// names are stable, then by id.
    pub fn declared(&self) -> Option<&'static Challenge> {
        CHALLENGES
            .iter()
            .find(|challenge| challenge.name == self.name)
            .or_else(|| self.id.and_then(lookup))
    }
}

/// Parse a `GET /challenges` document. Ids may be numbers or zero-padded
/// strings.
pub fn parse_service_catalog(document: &Value) -> Result<Vec<ServiceChallenge>> {
    let items = document
        .get("challenges")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("catalog document has no challenges array"))?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("catalog entry {index} has no name"))?;
            let id = match item.get("id") {
                Some(Value::Number(number)) => number.as_u64().and_then(|id| u8::try_from(id).ok()),
                Some(Value::String(text)) => text.trim().parse::<u8>().ok(),
                _ => None,
            };
            let completed = item.get("status").and_then(Value::as_bool).unwrap_or(false);
            Ok(ServiceChallenge {
                id,
                name: name.to_string(),
                completed,
            })
        })
        .collect()
}
