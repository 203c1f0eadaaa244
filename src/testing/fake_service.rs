//! In-memory API Challenges service.
//!
//! Implements enough of the real service to let the whole scenario table pass:
//! per-session entities, field rules, content negotiation, the heartbeat
//! taxonomy, secret notes and progress snapshots. A challenge is marked
//! completed when a request satisfying it arrives. `Faults` switch individual
//! behaviours off so tests can check that the harness notices.
use crate::auth::Credentials;
use crate::catalog::{self, CHALLENGES};
use crate::codec::{self, negotiate, Format, Negotiation};
use crate::error::HarnessError;
use crate::http::{
    ApiRequest, ApiResponse, Method, Transport, ACCEPT, ALLOW, AUTHORIZATION, AUTH_TOKEN_HEADER,
    CONTENT_TYPE, METHOD_OVERRIDE_HEADER, SESSION_HEADER,
};
use crate::session::{ProgressSnapshot, NEW_RESTORED_FLAG};
use crate::todo::{
    self, Operation, Todo, Violation, ViolationKind, MAX_DESCRIPTION_LENGTH, MAX_TITLE_LENGTH,
    MAX_TODOS,
};
use anyhow::Result;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

const SEEDED_TODOS: u64 = 10;

const CAPACITY_MESSAGE: &str = "ERROR: Cannot add instance, maximum limit of 20 reached";
const PUT_CREATION_MESSAGE: &str = "Cannot create todo with PUT due to Auto fields id";

/// How inserts into a full collection are answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AtCapacity {
    #[default]
    Refuse,
    /// Stored as though there were no cap.
    Accept,
    /// A bare response with this status.
    Answer(u16),
}

/// Behaviours the fake can be told to get wrong.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Session creation answers without the session header.
    pub no_session_header: bool,
    /// Creation answers omit the session header.
    pub unstamped_creation: bool,
    /// Titles of any length are accepted.
    pub ignore_title_length: bool,
    /// `Authorization: Bearer` is not recognised.
    pub ignore_bearer: bool,
    /// Requests to paths starting with this prefix fail at the transport.
    pub unreachable_prefix: Option<String>,
    /// This challenge is never marked completed.
    pub unmarked: Option<u8>,
    pub at_capacity: AtCapacity,
    /// Rejected full replaces carry an unrelated error message.
    pub garbled_replace_rejections: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    todos: BTreeMap<u64, Todo>,
    next_id: u64,
    completed: BTreeSet<u8>,
    note: String,
    token: Option<String>,
}

impl SessionState {
    fn seeded() -> Self {
        let mut state = Self {
            next_id: 1,
            ..Default::default()
        };
        for index in 0..SEEDED_TODOS {
            let todo = Todo {
                id: state.next_id,
                title: format!("seeded todo {}", index + 1),
                done_status: false,
                description: String::new(),
            };
            state.todos.insert(todo.id, todo);
            state.next_id += 1;
        }
        state
    }

    fn snapshot(&self, id: &str) -> Value {
        let status: serde_json::Map<String, Value> = CHALLENGES
            .iter()
            .map(|challenge| {
                (
                    challenge.key.to_string(),
                    Value::Bool(self.completed.contains(&challenge.id)),
                )
            })
            .collect();
        json!({"xChallenger": id, "challengeStatus": status})
    }

    fn stored(&self) -> Value {
        let todos: Vec<Value> = self.todos.values().map(Todo::to_value).collect();
        json!({"todos": todos})
    }
}

#[derive(Debug, Default)]
struct State {
    sessions: BTreeMap<String, SessionState>,
    created: usize,
    requests: usize,
}

pub struct FakeService {
    faults: Faults,
    state: RefCell<State>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::with_faults(Faults::default())
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            faults,
            state: RefCell::new(State::default()),
        }
    }

    /// Challenge ids the service has marked completed for `session`.
    pub fn completed(&self, session: &str) -> BTreeSet<u8> {
        self.state
            .borrow()
            .sessions
            .get(session)
            .map(|state| state.completed.clone())
            .unwrap_or_default()
    }

    pub fn live_todos(&self, session: &str) -> usize {
        self.state
            .borrow()
            .sessions
            .get(session)
            .map_or(0, |state| state.todos.len())
    }

    pub fn request_count(&self) -> usize {
        self.state.borrow().requests
    }

    fn mark(&self, session: &mut SessionState, challenge: u8) {
        if self.faults.unmarked != Some(challenge) {
            session.completed.insert(challenge);
        }
    }

    fn route(&self, state: &mut State, request: &ApiRequest) -> ApiResponse {
        let segments: Vec<&str> = request.path.split('/').filter(|s| !s.is_empty()).collect();
        if request.method == Method::Post && segments == ["challenger"] {
            return self.create_session(state);
        }

        let Some(id) = request.header_value(SESSION_HEADER).map(str::to_string) else {
            return errors(401, Format::Json, &["X-CHALLENGER header is required".to_string()]);
        };
        let Some(session) = state.sessions.get_mut(&id) else {
            return errors(401, Format::Json, &[format!("unknown challenger {id}")]);
        };

        let response = match segments.as_slice() {
            ["challenges"] => self.challenges(session, request),
            ["todos"] => self.todos(session, request),
            ["todos", todo_id] => match todo_id.parse::<u64>() {
                Ok(todo_id) => self.todo(session, request, todo_id),
                Err(_) => errors(404, Format::Json, &[format!("Could not find todos/{todo_id}")]),
            },
            ["todo"] => {
                self.mark(session, 4);
                ApiResponse::new(404)
            }
            ["heartbeat"] => self.heartbeat(session, request),
            ["secret", "token"] if request.method == Method::Post => {
                self.token(session, &id, request)
            }
            ["secret", "note"] => self.note(session, request),
            ["challenger", target] if *target == id => self.progress(session, &id, request),
            ["challenger", "database", target] if *target == id => self.database(session, request),
            _ => ApiResponse::new(404),
        };

        let stamp = !(self.faults.unstamped_creation
            && segments == ["todos"]
            && request.method == Method::Post);
        if stamp {
            response.with_header(SESSION_HEADER, id)
        } else {
            response
        }
    }

    fn create_session(&self, state: &mut State) -> ApiResponse {
        state.created += 1;
        let id = format!("fake-{:04}", state.created);
        let mut session = SessionState::seeded();
        self.mark(&mut session, 1);
        state.sessions.insert(id.clone(), session);
        let response = ApiResponse::new(201);
        if self.faults.no_session_header {
            response
        } else {
            response.with_header(SESSION_HEADER, id)
        }
    }

    fn challenges(&self, session: &mut SessionState, request: &ApiRequest) -> ApiResponse {
        if request.method != Method::Get {
            return ApiResponse::new(405);
        }
        self.mark(session, 2);
        let items: Vec<Value> = CHALLENGES
            .iter()
            .map(|challenge| {
                json!({
                    "id": format!("{:02}", challenge.id),
                    "name": challenge.name,
                    "description": challenge.section.title(),
                    "status": session.completed.contains(&challenge.id),
                })
            })
            .collect();
        document(200, Format::Json, &json!({"challenges": items}), "challenges")
    }

    fn todos(&self, session: &mut SessionState, request: &ApiRequest) -> ApiResponse {
        match request.method {
            Method::Get => self.list(session, request),
            Method::Head => {
                self.mark(session, 8);
                ApiResponse::new(200).with_header(CONTENT_TYPE, Format::Json.mime())
            }
            Method::Options => {
                self.mark(session, 24);
                ApiResponse::new(200).with_header(ALLOW, "OPTIONS, GET, HEAD, POST")
            }
            Method::Post => self.insert(session, request),
            _ => ApiResponse::new(405),
        }
    }

    fn list(&self, session: &mut SessionState, request: &ApiRequest) -> ApiResponse {
        let accept = request.header_value(ACCEPT);
        let format = match negotiate(accept) {
            Negotiation::Respond(format) => format,
            Negotiation::NotAcceptable => {
                self.mark(session, 30);
                return errors(406, Format::Json, &["Unrecognised Accept Type".to_string()]);
            }
        };
        let challenge = match accept.map(str::trim) {
            None => Some(3),
            Some("") => Some(29),
            Some("application/xml") => Some(25),
            Some("application/json") => Some(26),
            Some("*/*") => Some(27),
            Some("application/xml, application/json") => Some(28),
            Some(_) => None,
        };
        if let Some(challenge) = challenge {
            self.mark(session, challenge);
        }

        let filter = request
            .query
            .iter()
            .find(|(key, _)| key == "doneStatus")
            .map(|(_, value)| value == "true");
        if filter.is_some() {
            self.mark(session, 7);
        }
        let todos: Vec<Value> = session
            .todos
            .values()
            .filter(|todo| filter.map_or(true, |done| todo.done_status == done))
            .map(Todo::to_value)
            .collect();
        document(200, format, &json!({"todos": todos}), "todos")
    }

    fn insert(&self, session: &mut SessionState, request: &ApiRequest) -> ApiResponse {
        let content_type = request.header_value(CONTENT_TYPE);
        let request_format = match content_type {
            None => Format::Json,
            Some(value) => match Format::from_media_type(value) {
                Some(format) => format,
                None => {
                    self.mark(session, 33);
                    let message = format!("Unsupported Content Type - {value}");
                    return errors(415, Format::Json, &[message]);
                }
            },
        };
        let accept = request.header_value(ACCEPT);
        let response_format = match negotiate(accept) {
            Negotiation::Respond(format) => format,
            Negotiation::NotAcceptable => return ApiResponse::new(406),
        };

        let payload = match decode_request(request, content_type) {
            Ok(payload) => payload,
            Err(message) => return errors(400, response_format, &[message]),
        };
        let violations = self.violations(&payload, Operation::Create, request_format);
        if !violations.is_empty() {
            for violation in &violations {
                let challenge = match (violation.kind, violation.field.as_deref()) {
                    (ViolationKind::TypeMismatch, Some("doneStatus")) => Some(10),
                    (ViolationKind::LengthExceeded, Some("title")) => Some(11),
                    (ViolationKind::LengthExceeded, Some("description")) => Some(12),
                    (ViolationKind::PayloadTooLarge, _) => Some(14),
                    (ViolationKind::UnknownField, _) => Some(15),
                    _ => None,
                };
                if let Some(challenge) = challenge {
                    self.mark(session, challenge);
                }
            }
            return rejection(response_format, &violations);
        }
        if session.todos.len() >= MAX_TODOS {
            match self.faults.at_capacity {
                AtCapacity::Refuse => {
                    self.mark(session, 59);
                    return errors(400, response_format, &[CAPACITY_MESSAGE.to_string()]);
                }
                AtCapacity::Accept => self.mark(session, 59),
                AtCapacity::Answer(status) => return ApiResponse::new(status),
            }
        }

        let fields = match todo::validate(&payload, Operation::Create, request_format) {
            Ok(fields) => fields,
            Err(_) => todo::TodoFields {
                title: payload.get("title").and_then(Value::as_str).map(str::to_string),
                done_status: payload.get("doneStatus").and_then(Value::as_bool),
                description: payload
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                id: None,
            },
        };
        let created = fields.create(session.next_id);
        session.next_id += 1;
        session.todos.insert(created.id, created.clone());

        self.mark(session, 9);
        if created.title.chars().count() == MAX_TITLE_LENGTH
            && created.description.chars().count() == MAX_DESCRIPTION_LENGTH
        {
            self.mark(session, 13);
        }
        let mixed = match (request_format, response_format) {
            (Format::Xml, Format::Xml) => Some(31),
            (Format::Json, Format::Json) if accept.is_some() => Some(32),
            (Format::Xml, Format::Json) => Some(39),
            (Format::Json, Format::Xml) => Some(40),
            _ => None,
        };
        if let Some(challenge) = mixed {
            self.mark(session, challenge);
        }
        document(201, response_format, &created.to_value(), "todo")
    }

    fn todo(&self, session: &mut SessionState, request: &ApiRequest, id: u64) -> ApiResponse {
        let missing = || {
            let message = format!("Could not find an instance with todos/{id}");
            errors(404, Format::Json, &[message])
        };
        match request.method {
            Method::Get => match session.todos.get(&id) {
                Some(found) => {
                    let body = json!({"todos": [found.to_value()]});
                    self.mark(session, 5);
                    document(200, Format::Json, &body, "todos")
                }
                None => {
                    self.mark(session, 6);
                    missing()
                }
            },
            Method::Post => {
                let Some(base) = session.todos.get(&id).cloned() else {
                    self.mark(session, 18);
                    return missing();
                };
                let payload = match decode_request(request, request.header_value(CONTENT_TYPE)) {
                    Ok(payload) => payload,
                    Err(message) => return errors(400, Format::Json, &[message]),
                };
                match todo::validate(&payload, Operation::Amend { target: id }, Format::Json) {
                    Ok(fields) => {
                        let updated = fields.amend(&base);
                        session.todos.insert(id, updated.clone());
                        self.mark(session, 17);
                        document(200, Format::Json, &updated.to_value(), "todo")
                    }
                    Err(violations) => rejection(Format::Json, &violations),
                }
            }
            Method::Put => {
                let Some(base) = session.todos.get(&id).cloned() else {
                    self.mark(session, 16);
                    return errors(400, Format::Json, &[PUT_CREATION_MESSAGE.to_string()]);
                };
                let payload = match decode_request(request, request.header_value(CONTENT_TYPE)) {
                    Ok(payload) => payload,
                    Err(message) => return errors(400, Format::Json, &[message]),
                };
                match todo::validate(&payload, Operation::Replace { target: id }, Format::Json) {
                    Ok(fields) => {
                        let replaced = fields.replace(&base);
                        session.todos.insert(id, replaced.clone());
                        let full = ["title", "doneStatus", "description"]
                            .iter()
                            .all(|field| payload.get(*field).is_some());
                        self.mark(session, if full { 19 } else { 20 });
                        document(200, Format::Json, &replaced.to_value(), "todo")
                    }
                    Err(violations) => {
                        if violations.iter().any(|v| v.kind == ViolationKind::MissingRequired) {
                            self.mark(session, 21);
                        }
                        if violations.iter().any(|v| v.kind == ViolationKind::ImmutableId) {
                            self.mark(session, 22);
                        }
                        if self.faults.garbled_replace_rejections {
                            return errors(400, Format::Json, &["Something went wrong".to_string()]);
                        }
                        rejection(Format::Json, &violations)
                    }
                }
            }
            Method::Delete => {
                if session.todos.remove(&id).is_none() {
                    return missing();
                }
                self.mark(session, 23);
                if session.todos.is_empty() {
                    self.mark(session, 58);
                }
                ApiResponse::new(200)
            }
            _ => ApiResponse::new(405),
        }
    }

    fn heartbeat(&self, session: &mut SessionState, request: &ApiRequest) -> ApiResponse {
        let overridden = request
            .header_value(METHOD_OVERRIDE_HEADER)
            .filter(|_| request.method == Method::Post)
            .and_then(Method::parse);
        let method = overridden.unwrap_or(request.method);
        let (status, direct, via_override) = match method {
            Method::Get | Method::Head => (204, Some(44), None),
            Method::Delete => (405, Some(41), Some(45)),
            Method::Patch => (500, Some(42), Some(46)),
            Method::Trace => (501, Some(43), Some(47)),
            _ => (405, None, None),
        };
        let challenge = if overridden.is_some() { via_override } else { direct };
        if let Some(challenge) = challenge {
            self.mark(session, challenge);
        }
        ApiResponse::new(status)
    }

    fn token(&self, session: &mut SessionState, id: &str, request: &ApiRequest) -> ApiResponse {
        let expected = Credentials::default().basic_authorization();
        if request.header_value(AUTHORIZATION) != Some(expected.as_str()) {
            self.mark(session, 48);
            return ApiResponse::new(401);
        }
        let token = format!("token-{id}");
        session.token = Some(token.clone());
        self.mark(session, 49);
        ApiResponse::new(201).with_header(AUTH_TOKEN_HEADER, token)
    }

    fn note(&self, session: &mut SessionState, request: &ApiRequest) -> ApiResponse {
        let bearer = request
            .header_value(AUTHORIZATION)
            .filter(|_| !self.faults.ignore_bearer)
            .and_then(|value| value.strip_prefix("Bearer "));
        let presented = request.header_value(AUTH_TOKEN_HEADER).or(bearer);
        let reading = request.method == Method::Get;
        let Some(presented) = presented else {
            self.mark(session, if reading { 51 } else { 54 });
            return ApiResponse::new(401);
        };
        if session.token.as_deref() != Some(presented) {
            self.mark(session, if reading { 50 } else { 55 });
            return ApiResponse::new(403);
        }
        let via_bearer = request.header_value(AUTH_TOKEN_HEADER).is_none();
        match request.method {
            Method::Get => {
                self.mark(session, if via_bearer { 56 } else { 52 });
            }
            Method::Post => {
                let payload = decode_request(request, request.header_value(CONTENT_TYPE)).ok();
                let note = payload.as_ref().and_then(|payload| payload.get("note"));
                let Some(note) = note.and_then(Value::as_str).map(String::from) else {
                    return errors(400, Format::Json, &["note is required".to_string()]);
                };
                session.note = note;
                self.mark(session, if via_bearer { 57 } else { 53 });
            }
            _ => return ApiResponse::new(405),
        }
        document(200, Format::Json, &json!({"note": session.note}), "note")
    }

    fn progress(&self, session: &mut SessionState, id: &str, request: &ApiRequest) -> ApiResponse {
        match request.method {
            Method::Get => {
                self.mark(session, 34);
                document(200, Format::Json, &session.snapshot(id), "challenger")
            }
            Method::Put => {
                let snapshot = decode_request(request, request.header_value(CONTENT_TYPE))
                    .ok()
                    .and_then(|value| ProgressSnapshot::from_value(&value).ok());
                let Some(snapshot) = snapshot else {
                    return errors(400, Format::Json, &["invalid progress document".to_string()]);
                };
                let was_flagged = catalog::by_key(NEW_RESTORED_FLAG)
                    .is_some_and(|flag| session.completed.contains(&flag.id));
                for (key, done) in &snapshot.challenge_status {
                    if let Some(challenge) = catalog::by_key(key).filter(|_| *done) {
                        self.mark(session, challenge.id);
                    }
                }
                // A push that newly raises the flag counts as the "create"
                // restore; anything else is a plain restore.
                if !(snapshot.is_completed(NEW_RESTORED_FLAG) && !was_flagged) {
                    self.mark(session, 35);
                }
                document(200, Format::Json, &session.snapshot(id), "challenger")
            }
            _ => ApiResponse::new(405),
        }
    }

    fn database(&self, session: &mut SessionState, request: &ApiRequest) -> ApiResponse {
        match request.method {
            Method::Get => {
                self.mark(session, 37);
                document(200, Format::Json, &session.stored(), "todos")
            }
            Method::Put => {
                let todos = decode_request(request, request.header_value(CONTENT_TYPE))
                    .ok()
                    .and_then(|document| todo::todos_from_document(&document).ok());
                let Some(todos) = todos else {
                    return errors(400, Format::Json, &["invalid stored document".to_string()]);
                };
                let next = todos.iter().map(|todo| todo.id + 1).max().unwrap_or(1);
                session.next_id = session.next_id.max(next);
                session.todos = todos.into_iter().map(|todo| (todo.id, todo)).collect();
                self.mark(session, 38);
                ApiResponse::new(204)
            }
            _ => ApiResponse::new(405),
        }
    }

    fn violations(&self, payload: &Value, operation: Operation, format: Format) -> Vec<Violation> {
        match todo::validate(payload, operation, format) {
            Ok(_) => Vec::new(),
            Err(violations) => violations
                .into_iter()
                .filter(|violation| {
                    !(self.faults.ignore_title_length
                        && violation.kind == ViolationKind::LengthExceeded
                        && violation.field.as_deref() == Some("title"))
                })
                .collect(),
        }
    }
}

impl Default for FakeService {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for FakeService {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut state = self.state.borrow_mut();
        state.requests += 1;
        if let Some(prefix) = &self.faults.unreachable_prefix {
            if request.path.starts_with(prefix.as_str()) {
                return Err(HarnessError::Transport {
                    method: request.method.to_string(),
                    url: request.target(),
                    detail: "connection refused".to_string(),
                }
                .into());
            }
        }
        Ok(self.route(&mut state, request))
    }
}

fn decode_request(request: &ApiRequest, content_type: Option<&str>) -> Result<Value, String> {
    let body = request.body.as_deref().unwrap_or_default();
    codec::decode(body, content_type).map_err(|err| format!("Invalid payload: {err:#}"))
}

fn document(status: u16, format: Format, body: &Value, root: &str) -> ApiResponse {
    match codec::encode(body, root, format) {
        Ok(bytes) => ApiResponse::new(status).with_body(format.mime(), bytes),
        Err(err) => ApiResponse::new(500).with_body("text/plain", format!("{err:#}").into_bytes()),
    }
}

fn errors(status: u16, format: Format, messages: &[String]) -> ApiResponse {
    document(status, format, &json!({"errorMessages": messages}), "errorMessages")
}

fn rejection(format: Format, violations: &[Violation]) -> ApiResponse {
    let messages: Vec<String> = violations.iter().map(service_message).collect();
    errors(todo::rejection_status(violations), format, &messages)
}

/// The service's wording for rules whose text is fixed. Kept as literals so a
/// drifted message in `todo` fails the full run instead of agreeing with itself.
fn service_message(violation: &Violation) -> String {
    let literal = match (violation.kind, violation.field.as_deref()) {
        (ViolationKind::TypeMismatch, Some("doneStatus")) => {
            "Failed Validation: doneStatus should be BOOLEAN but was STRING"
        }
        (ViolationKind::LengthExceeded, Some("title")) => {
            "Failed Validation: Maximum allowable length exceeded for title - maximum allowed is 50"
        }
        (ViolationKind::LengthExceeded, Some("description")) => {
            "Failed Validation: Maximum allowable length exceeded for description - maximum allowed is 200"
        }
        (ViolationKind::PayloadTooLarge, _) => {
            "Error: Request body too large, max allowed is 5000 bytes"
        }
        (ViolationKind::UnknownField, Some("unrecognisedField")) => {
            "Could not find field: unrecognisedField"
        }
        (ViolationKind::CapacityExceeded, _) => CAPACITY_MESSAGE,
        _ => return violation.message.clone(),
    };
    literal.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(service: &FakeService) -> String {
        let response = service
            .send(&ApiRequest::post("challenger"))
            .expect("create session");
        response.header(SESSION_HEADER).expect("session id").to_string()
    }

    fn error_messages(response: &ApiResponse) -> Vec<String> {
        let body = response.json().expect("JSON body");
        serde_json::from_value(body["errorMessages"].clone()).expect("errorMessages")
    }

    #[test]
    fn rejections_use_service_wording() {
        let service = FakeService::new();
        let id = session(&service);
        let request = ApiRequest::post("todos")
            .header(SESSION_HEADER, id.as_str())
            .json(&json!({"title": "t", "doneStatus": "bob", "unrecognisedField": 1}))
            .expect("request");
        let response = service.send(&request).expect("send");

        assert_eq!(response.status, 400);
        let messages = error_messages(&response);
        assert!(messages.contains(
            &"Failed Validation: doneStatus should be BOOLEAN but was STRING".to_string()
        ));
        assert!(messages.contains(&"Could not find field: unrecognisedField".to_string()));
    }

    #[test]
    fn full_collection_answers_by_fault() {
        for (at_capacity, status) in [
            (AtCapacity::Refuse, 400),
            (AtCapacity::Accept, 201),
            (AtCapacity::Answer(500), 500),
        ] {
            let service = FakeService::with_faults(Faults {
                at_capacity,
                ..Default::default()
            });
            let id = session(&service);
            let mut last = 0;
            for _ in SEEDED_TODOS..=MAX_TODOS as u64 {
                let request = ApiRequest::post("todos")
                    .header(SESSION_HEADER, id.as_str())
                    .json(&json!({"title": "fill"}))
                    .expect("request");
                last = service.send(&request).expect("send").status;
            }
            assert_eq!(last, status, "{at_capacity:?}");
        }
    }
}
