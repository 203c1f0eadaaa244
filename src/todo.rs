//! Task entity model and the field rules the service enforces on it.
//!
//! The validator is used to predict the service's answer before a request is
//! sent, so every message it produces is the service's literal wording.
use crate::codec::{self, Format};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_TITLE_LENGTH: usize = 50;
pub const MAX_DESCRIPTION_LENGTH: usize = 200;
pub const MAX_PAYLOAD_BYTES: usize = 5000;
pub const MAX_TODOS: usize = 20;

const ID: &str = "id";
const TITLE: &str = "title";
const DONE_STATUS: &str = "doneStatus";
const DESCRIPTION: &str = "description";

/// A task as the service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: u64,
    pub title: String,
    pub done_status: bool,
    #[serde(default)]
    pub description: String,
}

impl Todo {
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "title": self.title,
            "doneStatus": self.done_status,
            "description": self.description,
        })
    }
}

/// Normalized, accepted payload fields. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoFields {
    pub id: Option<u64>,
    pub title: Option<String>,
    pub done_status: Option<bool>,
    pub description: Option<String>,
}

impl TodoFields {
    /// Build a new entity; the id always comes from the service.
    pub fn create(&self, id: u64) -> Todo {
        Todo {
            id,
            title: self.title.clone().unwrap_or_default(),
            done_status: self.done_status.unwrap_or(false),
            description: self.description.clone().unwrap_or_default(),
        }
    }

    /// Partial update: unspecified fields keep their prior values.
    pub fn amend(&self, base: &Todo) -> Todo {
        Todo {
            id: base.id,
            title: self.title.clone().unwrap_or_else(|| base.title.clone()),
            done_status: self.done_status.unwrap_or(base.done_status),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| base.description.clone()),
        }
    }

    /// Full replace: unspecified fields fall back to defaults.
    pub fn replace(&self, base: &Todo) -> Todo {
        self.create(base.id)
    }
}

/// Which call the payload is destined for; id rules differ per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Amend { target: u64 },
    Replace { target: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    TypeMismatch,
    LengthExceeded,
    UnknownField,
    MissingRequired,
    ImmutableId,
    PayloadTooLarge,
    CapacityExceeded,
}

/// One rule breach. `field` is `None` for whole-payload or capacity rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub field: Option<String>,
    pub message: String,
}

impl Violation {
    fn on_field(kind: ViolationKind, field: &str, message: String) -> Self {
        Self {
            kind,
            field: Some(field.to_string()),
            message,
        }
    }

    pub fn type_mismatch(field: &str, expected: &str, actual: &Value) -> Self {
        Self::on_field(
            ViolationKind::TypeMismatch,
            field,
            format!(
                "Failed Validation: {field} should be {expected} but was {}",
                json_kind(actual)
            ),
        )
    }

    pub fn length_exceeded(field: &str, max: usize) -> Self {
        Self::on_field(
            ViolationKind::LengthExceeded,
            field,
            format!(
                "Failed Validation: Maximum allowable length exceeded for {field} - maximum allowed is {max}"
            ),
        )
    }

    pub fn unknown_field(field: &str) -> Self {
        Self::on_field(
            ViolationKind::UnknownField,
            field,
            format!("Could not find field: {field}"),
        )
    }

    pub fn missing_required(field: &str) -> Self {
        Self::on_field(
            ViolationKind::MissingRequired,
            field,
            format!("{field} : field is mandatory"),
        )
    }

    pub fn id_on_create() -> Self {
        Self::on_field(
            ViolationKind::ImmutableId,
            ID,
            "Failed Validation: Not allowed to create with id".to_string(),
        )
    }

    pub fn id_amended(from: u64, to: &Value) -> Self {
        Self::on_field(
            ViolationKind::ImmutableId,
            ID,
            format!("Can not amend id from {from} to {}", scalar_text(to)),
        )
    }

    /// PUT against an id that does not exist: ids are service-assigned.
    pub fn put_creation_refused() -> Self {
        Self::on_field(
            ViolationKind::ImmutableId,
            ID,
            "Cannot create todo with PUT due to Auto fields id".to_string(),
        )
    }

    pub fn payload_too_large() -> Self {
        Self {
            kind: ViolationKind::PayloadTooLarge,
            field: None,
            message: format!(
                "Error: Request body too large, max allowed is {MAX_PAYLOAD_BYTES} bytes"
            ),
        }
    }

    pub fn capacity_exceeded() -> Self {
        Self {
            kind: ViolationKind::CapacityExceeded,
            field: None,
            message: format!("ERROR: Cannot add instance, maximum limit of {MAX_TODOS} reached"),
        }
    }
}

/// Validate a candidate payload for `operation`, as encoded in `format`.
///
/// Field checks run first, in field-name order, followed by the required
/// field check and finally the encoded-size check. Any violation rejects the
/// whole payload.
pub fn validate(
    payload: &Value,
    operation: Operation,
    format: Format,
) -> Result<TodoFields, Vec<Violation>> {
    let Some(object) = payload.as_object() else {
        return Err(vec![Violation::type_mismatch("todo", "OBJECT", payload)]);
    };

    let mut violations = Vec::new();
    let mut fields = TodoFields::default();
    for (name, value) in object {
        match name.as_str() {
            ID => check_id(value, operation, &mut fields, &mut violations),
            TITLE => {
                fields.title = check_text(TITLE, value, MAX_TITLE_LENGTH, &mut violations);
            }
            DESCRIPTION => {
                fields.description =
                    check_text(DESCRIPTION, value, MAX_DESCRIPTION_LENGTH, &mut violations);
            }
            DONE_STATUS => match value {
                Value::Bool(flag) => fields.done_status = Some(*flag),
                other => violations.push(Violation::type_mismatch(DONE_STATUS, "BOOLEAN", other)),
            },
            other => violations.push(Violation::unknown_field(other)),
        }
    }

    let title_required = matches!(operation, Operation::Create | Operation::Replace { .. });
    if title_required && !object.contains_key(TITLE) {
        violations.push(Violation::missing_required(TITLE));
    }

    if encoded_len(payload, format) > MAX_PAYLOAD_BYTES {
        violations.push(Violation::payload_too_large());
    }

    if violations.is_empty() {
        Ok(fields)
    } else {
        Err(violations)
    }
}

fn check_id(
    value: &Value,
    operation: Operation,
    fields: &mut TodoFields,
    violations: &mut Vec<Violation>,
) {
    let parsed = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    match operation {
        Operation::Create => violations.push(Violation::id_on_create()),
        Operation::Amend { target } | Operation::Replace { target } => match parsed {
            Some(id) if id == target => fields.id = Some(id),
            Some(_) => violations.push(Violation::id_amended(target, value)),
            None => violations.push(Violation::type_mismatch(ID, "NUMBER", value)),
        },
    }
}

fn check_text(
    field: &str,
    value: &Value,
    max: usize,
    violations: &mut Vec<Violation>,
) -> Option<String> {
    let Value::String(text) = value else {
        violations.push(Violation::type_mismatch(field, "STRING", value));
        return None;
    };
    if text.chars().count() > max {
        violations.push(Violation::length_exceeded(field, max));
        return None;
    }
    Some(text.clone())
}

/// Capacity rule applied at insertion time only.
pub fn check_capacity(live_todos: usize) -> Result<(), Violation> {
    if live_todos >= MAX_TODOS {
        return Err(Violation::capacity_exceeded());
    }
    Ok(())
}

/// Status the service answers with when it rejects a payload.
pub fn rejection_status(violations: &[Violation]) -> u16 {
    if violations
        .iter()
        .any(|violation| violation.kind == ViolationKind::PayloadTooLarge)
    {
        413
    } else {
        400
    }
}

/// Expected service answer for a request, derived from the field rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub status: u16,
    pub violations: Vec<Violation>,
}

impl Prediction {
    fn accept(status: u16) -> Self {
        Self {
            status,
            violations: Vec::new(),
        }
    }

    fn reject(violations: Vec<Violation>) -> Self {
        Self {
            status: rejection_status(&violations),
            violations,
        }
    }

    pub fn accepted(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.violations
            .iter()
            .map(|violation| violation.message.as_str())
            .collect()
    }

    /// Message of the first violation of `kind`, if predicted.
    pub fn message(&self, kind: ViolationKind) -> Option<&str> {
        self.violations
            .iter()
            .find(|violation| violation.kind == kind)
            .map(|violation| violation.message.as_str())
    }
}

/// Predict the outcome of `POST /todos`. Capacity is only predicted when the
/// live entity count is known.
pub fn predict_insert(payload: &Value, format: Format, live_todos: Option<usize>) -> Prediction {
    match validate(payload, Operation::Create, format) {
        Err(violations) => Prediction::reject(violations),
        Ok(_) => match live_todos.map(check_capacity) {
            Some(Err(violation)) => Prediction::reject(vec![violation]),
            _ => Prediction::accept(201),
        },
    }
}

/// Predict the outcome of an update against an entity known to exist.
pub fn predict_update(payload: &Value, operation: Operation, format: Format) -> Prediction {
    match validate(payload, operation, format) {
        Err(violations) => Prediction::reject(violations),
        Ok(_) => Prediction::accept(200),
    }
}

fn encoded_len(payload: &Value, format: Format) -> usize {
    codec::encode(payload, "todo", format)
        .map(|bytes| bytes.len())
        .unwrap_or_else(|_| payload.to_string().len())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "STRING",
        Value::Bool(_) => "BOOLEAN",
        Value::Number(_) => "NUMBER",
        Value::Null => "NULL",
        Value::Array(_) => "ARRAY",
        Value::Object(_) => "OBJECT",
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Parse a todo list document (`{"todos": [...]}`) into entities.
pub fn todos_from_document(document: &Value) -> Result<Vec<Todo>> {
    let items = document
        .get("todos")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("document has no todos array"))?;
    Ok(serde_json::from_value(items)?)
}

#[cfg(test)]
#[path = "todo_tests.rs"]
mod tests;
