//! Per-run scenario context.
//!
//! State that one scenario produces and a later one consumes (entity ids, the
//! captured progress snapshot, the last secret note) lives here and is passed
//! explicitly to every scenario.
use super::expect::Expect;
use crate::auth::{AuthController, AuthScheme, Credentials};
use crate::codec::{self, Format};
use crate::error::HarnessError;
use crate::http::{ApiRequest, ApiResponse, ACCEPT};
use crate::session::{ProgressSnapshot, SessionClient};
use crate::todo::{self, Todo};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Gap between the highest id seen and the id used for "unknown entity" probes.
const UNUSED_ID_GAP: u64 = 1000;

/// What the harness believes about the session's live entities.
#[derive(Debug, Default)]
pub struct TodoLedger {
    known: BTreeMap<u64, Todo>,
    live: Option<usize>,
}

impl TodoLedger {
    pub fn observe_list(&mut self, todos: &[Todo]) {
        self.known = todos.iter().map(|todo| (todo.id, todo.clone())).collect();
        self.live = Some(todos.len());
    }

    pub fn created(&mut self, todo: Option<Todo>) {
        if let Some(todo) = todo {
            self.known.insert(todo.id, todo);
        }
        self.live = self.live.map(|live| live + 1);
    }

    pub fn updated(&mut self, todo: Todo) {
        self.known.insert(todo.id, todo);
    }

    pub fn deleted(&mut self, id: u64) {
        if self.known.remove(&id).is_some() {
            self.live = self.live.map(|live| live.saturating_sub(1));
        }
    }

    /// Live entity count, when it has been observed.
    pub fn live(&self) -> Option<usize> {
        self.live
    }

    pub fn newest(&self) -> Option<&Todo> {
        self.known.values().next_back()
    }

    pub fn find_done(&self) -> Option<&Todo> {
        self.known.values().find(|todo| todo.done_status)
    }

    pub fn get(&self, id: u64) -> Option<&Todo> {
        self.known.get(&id)
    }

    pub fn unused_id(&self) -> u64 {
        self.known.keys().next_back().copied().unwrap_or(0) + UNUSED_ID_GAP
    }
}

pub struct ScenarioContext<'a> {
    client: SessionClient<'a>,
    auth: AuthController,
    pub(super) todos: TodoLedger,
    pub(super) progress: Option<ProgressSnapshot>,
    pub(super) stored: Option<Value>,
    pub(super) note: Option<String>,
}

impl<'a> ScenarioContext<'a> {
    pub fn new(client: SessionClient<'a>, credentials: Credentials) -> Self {
        Self {
            client,
            auth: AuthController::new(credentials),
            todos: TodoLedger::default(),
            progress: None,
            stored: None,
            note: None,
        }
    }

    pub fn client(&self) -> &SessionClient<'a> {
        &self.client
    }

    pub fn session_id(&self) -> &str {
        self.client.session().id()
    }

    pub fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.client.send(request)
    }

    /// Expectation seeded with `status` and the session header every
    /// response must echo.
    pub fn expect(&self, status: u16) -> Expect {
        Expect::status(status).session(self.session_id())
    }

    pub fn expect_any(&self, statuses: &[u16]) -> Expect {
        Expect::status_in(statuses).session(self.session_id())
    }

    pub fn auth(&self) -> &AuthController {
        &self.auth
    }

    pub fn exchange_credentials(&mut self, credentials: &Credentials) -> Result<ApiResponse> {
        self.auth.exchange(&self.client, credentials)
    }

    pub fn ensure_token(&mut self) -> Result<String> {
        self.auth.ensure_token(&self.client)
    }

    /// Mint a token if needed and attach it with `scheme`.
    pub fn authorized(&mut self, request: ApiRequest, scheme: AuthScheme) -> Result<ApiRequest> {
        self.ensure_token()?;
        self.auth.authorize(request, scheme)
    }

    /// Fetch the live entity list and refresh the ledger from it.
    pub fn list_todos(&mut self) -> Result<Vec<Todo>> {
        let response = self.send(ApiRequest::get("todos").header(ACCEPT, Format::Json.mime()))?;
        if response.status != 200 {
            return Err(HarnessError::Precondition(format!(
                "listing todos answered {}",
                response.status
            ))
            .into());
        }
        let document = codec::decode(&response.body, response.content_type())?;
        let todos = todo::todos_from_document(&document).context("parse todo list")?;
        self.todos.observe_list(&todos);
        Ok(todos)
    }

    /// Create an entity as a fixture for a later step.
    pub fn create_todo(&mut self, payload: &Value) -> Result<Todo> {
        let request = ApiRequest::post("todos")
            .header(ACCEPT, Format::Json.mime())
            .json(payload)?;
        let response = self.send(request)?;
        if response.status != 201 {
            return Err(HarnessError::Precondition(format!(
                "fixture creation answered {}",
                response.status
            ))
            .into());
        }
        let todo: Todo = serde_json::from_value(response.json()?).context("parse created todo")?;
        self.todos.created(Some(todo.clone()));
        Ok(todo)
    }

    /// Some live entity, listing or creating one as needed.
    pub fn ensure_todo(&mut self) -> Result<Todo> {
        if let Some(todo) = self.todos.newest() {
            return Ok(todo.clone());
        }
        if let Some(todo) = self.list_todos()?.into_iter().last() {
            return Ok(todo);
        }
        self.create_todo(&json!({"title": "fixture todo", "doneStatus": false}))
    }

    /// Some live entity with `doneStatus: true`.
    pub fn ensure_done_todo(&mut self) -> Result<Todo> {
        if let Some(todo) = self.todos.find_done() {
            return Ok(todo.clone());
        }
        if let Some(todo) = self.list_todos()?.into_iter().find(|todo| todo.done_status) {
            return Ok(todo);
        }
        self.create_todo(&json!({"title": "fixture done todo", "doneStatus": true}))
    }

    /// An id no live entity has, based on a fresh listing.
    pub fn unused_todo_id(&mut self) -> Result<u64> {
        self.list_todos()?;
        Ok(self.todos.unused_id())
    }

    /// Update the ledger from a creation response in whatever format it came.
    pub fn record_creation(&mut self, response: &ApiResponse) {
        if response.status != 201 {
            return;
        }
        let todo = codec::decode(&response.body, response.content_type())
            .ok()
            .and_then(|document| serde_json::from_value::<Todo>(document).ok());
        self.todos.created(todo);
    }
}
