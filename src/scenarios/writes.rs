//! Entity creation, update and deletion scenarios.
//!
//! Expected statuses and messages come from the local field rules
//! (`todo::predict_*`), so a scenario states the payload and the rule it
//! targets rather than a hardcoded answer.
use super::ScenarioContext;
use crate::codec::Format;
use crate::error::HarnessError;
use crate::http::{ApiRequest, ApiResponse, ACCEPT};
use crate::todo::{
    self, Operation, Prediction, ViolationKind, MAX_DESCRIPTION_LENGTH, MAX_PAYLOAD_BYTES,
    MAX_TITLE_LENGTH,
};
use crate::util::filler;
use anyhow::Result;
use serde_json::{json, Value};

pub(super) fn create_todo(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let payload = json!({
        "title": "create todo process payroll",
        "doneStatus": true,
        "description": "",
    });
    accepted_create(ctx, payload)
}

pub(super) fn create_bad_done_status(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let payload = json!({
        "title": "create new todo",
        "doneStatus": "bob",
        "description": "created via insomnia",
    });
    rejected_create(ctx, payload, ViolationKind::TypeMismatch)
}

pub(super) fn create_title_too_long(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let payload = json!({
        "title": filler(MAX_TITLE_LENGTH + 1),
        "doneStatus": true,
        "description": "created via insomnia",
    });
    rejected_create(ctx, payload, ViolationKind::LengthExceeded)
}

pub(super) fn create_description_too_long(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let payload = json!({
        "title": "create new todo",
        "doneStatus": true,
        "description": filler(MAX_DESCRIPTION_LENGTH + 1),
    });
    rejected_create(ctx, payload, ViolationKind::LengthExceeded)
}

pub(super) fn create_max_content(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let payload = json!({
        "title": filler(MAX_TITLE_LENGTH),
        "doneStatus": true,
        "description": filler(MAX_DESCRIPTION_LENGTH),
    });
    accepted_create(ctx, payload)
}

pub(super) fn create_payload_too_large(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let half = MAX_PAYLOAD_BYTES / 2 + 100;
    let payload = json!({
        "title": filler(half),
        "doneStatus": true,
        "description": filler(half),
    });
    rejected_create(ctx, payload, ViolationKind::PayloadTooLarge)
}

pub(super) fn create_extra_field(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let payload = json!({
        "title": "create new todo",
        "doneStatus": true,
        "description": "created via insomnia",
        "unrecognisedField": false,
    });
    rejected_create(ctx, payload, ViolationKind::UnknownField)
}

/// PUT cannot create: ids are service-assigned.
pub(super) fn put_creation_refused(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let missing = ctx.unused_todo_id()?;
    let payload = json!({
        "title": "create new todo",
        "doneStatus": true,
        "description": "created via insomnia",
    });
    let response = ctx.send(ApiRequest::put(format!("todos/{missing}")).json(&payload)?)?;
    Ok(ctx
        .expect(400)
        .error_message(&todo::Violation::put_creation_refused().message)
        .check(&response))
}

/// Partial update through POST keeps every field it does not name.
pub(super) fn amend_todo(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let target = ctx.ensure_todo()?;
    let payload = json!({"title": "updated title"});
    let operation = Operation::Amend { target: target.id };
    let (prediction, fields) = predict_accepted_update(&payload, operation)?;
    let expected = fields.amend(&target);

    let response = ctx.send(ApiRequest::post(format!("todos/{}", target.id)).json(&payload)?)?;
    let failures = ctx
        .expect(prediction.status)
        .body_subset(expected.to_value())
        .check(&response);
    if failures.is_empty() {
        ctx.todos.updated(expected);
    }
    Ok(failures)
}

pub(super) fn amend_missing_todo(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let missing = ctx.unused_todo_id()?;
    let payload = json!({"title": "create new todo"});
    let response = ctx.send(ApiRequest::post(format!("todos/{missing}")).json(&payload)?)?;
    Ok(ctx.expect(404).check(&response))
}

pub(super) fn replace_full(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let payload = json!({
        "title": "updated title",
        "doneStatus": false,
        "description": "new todo",
    });
    replace(ctx, payload)
}

/// Partial replace resets the unnamed fields, so only the named one is
/// asserted.
pub(super) fn replace_partial(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    replace(ctx, json!({"title": "updated title"}))
}

pub(super) fn replace_without_title(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let target = ctx.ensure_todo()?;
    let payload = json!({"doneStatus": false});
    rejected_update(ctx, target.id, payload, ViolationKind::MissingRequired)
}

pub(super) fn replace_amending_id(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let target = ctx.ensure_todo()?;
    let payload = json!({
        "id": target.id + 9,
        "title": "updated title",
        "doneStatus": false,
        "description": "new todo",
    });
    rejected_update(ctx, target.id, payload, ViolationKind::ImmutableId)
}

/// Delete one entity, then confirm it is gone.
pub(super) fn delete_todo(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let target = ctx.ensure_todo()?;
    let path = format!("todos/{}", target.id);
    let response = ctx.send(ApiRequest::delete(path.clone()))?;
    let mut failures = ctx.expect(200).check(&response);
    if response.status == 200 {
        ctx.todos.deleted(target.id);
        let check = ctx.send(ApiRequest::get(path))?;
        if check.status != 404 {
            failures.push(format!(
                "deleted todo {} still readable (status {})",
                target.id, check.status
            ));
        }
    }
    Ok(failures)
}

fn predict_create(ctx: &ScenarioContext<'_>, payload: &Value) -> Prediction {
    todo::predict_insert(payload, Format::Json, ctx.todos.live())
}

fn post_todo(ctx: &mut ScenarioContext<'_>, payload: &Value) -> Result<ApiResponse> {
    let request = ApiRequest::post("todos")
        .header(ACCEPT, Format::Json.mime())
        .json(payload)?;
    let response = ctx.send(request)?;
    ctx.record_creation(&response);
    Ok(response)
}

/// A valid payload: 201 with the entity echoed back, or the capacity
/// rejection when the session is already full.
pub(super) fn accepted_create(
    ctx: &mut ScenarioContext<'_>,
    payload: Value,
) -> Result<Vec<String>> {
    let prediction = predict_create(ctx, &payload);
    if let Some(message) = prediction.message(ViolationKind::CapacityExceeded) {
        let message = message.to_string();
        let response = post_todo(ctx, &payload)?;
        return Ok(ctx
            .expect(prediction.status)
            .error_message(&message)
            .check(&response));
    }
    if !prediction.accepted() {
        return Err(HarnessError::Setup(format!(
            "fixture payload is invalid: {:?}",
            prediction.messages()
        ))
        .into());
    }
    let response = post_todo(ctx, &payload)?;
    let mut failures = ctx
        .expect(prediction.status)
        .content_type(Format::Json)
        .body_subset(payload)
        .check(&response);
    failures.extend(assigned_id_failures(&response));
    Ok(failures)
}

/// A payload built to break `rule`: the predicted status plus the rule's
/// literal message.
fn rejected_create(
    ctx: &mut ScenarioContext<'_>,
    payload: Value,
    rule: ViolationKind,
) -> Result<Vec<String>> {
    let prediction = predict_create(ctx, &payload);
    let message = targeted_message(&prediction, rule)?;
    let response = post_todo(ctx, &payload)?;
    Ok(ctx
        .expect(prediction.status)
        .error_message(&message)
        .check(&response))
}

fn rejected_update(
    ctx: &mut ScenarioContext<'_>,
    target: u64,
    payload: Value,
    rule: ViolationKind,
) -> Result<Vec<String>> {
    let prediction = todo::predict_update(&payload, Operation::Replace { target }, Format::Json);
    let message = targeted_message(&prediction, rule)?;
    let response = ctx.send(ApiRequest::put(format!("todos/{target}")).json(&payload)?)?;
    Ok(ctx
        .expect(prediction.status)
        .error_message(&message)
        .check(&response))
}

fn replace(ctx: &mut ScenarioContext<'_>, payload: Value) -> Result<Vec<String>> {
    let target = ctx.ensure_todo()?;
    let operation = Operation::Replace { target: target.id };
    let (prediction, fields) = predict_accepted_update(&payload, operation)?;
    let response = ctx.send(ApiRequest::put(format!("todos/{}", target.id)).json(&payload)?)?;
    let failures = ctx
        .expect(prediction.status)
        .body_subset(payload)
        .check(&response);
    if failures.is_empty() {
        ctx.todos.updated(fields.replace(&target));
    }
    Ok(failures)
}

fn predict_accepted_update(
    payload: &Value,
    operation: Operation,
) -> Result<(Prediction, todo::TodoFields)> {
    let fields = todo::validate(payload, operation, Format::Json).map_err(|violations| {
        HarnessError::Setup(format!(
            "update payload is invalid: {:?}",
            violations
                .iter()
                .map(|violation| violation.message.as_str())
                .collect::<Vec<_>>()
        ))
    })?;
    Ok((todo::predict_update(payload, operation, Format::Json), fields))
}

fn targeted_message(prediction: &Prediction, rule: ViolationKind) -> Result<String> {
    prediction
        .message(rule)
        .map(str::to_string)
        .ok_or_else(|| {
            HarnessError::Setup(format!("payload does not break the {rule:?} rule")).into()
        })
}

/// A created entity must carry a numeric, service-assigned id.
pub(super) fn assigned_id_failures(response: &ApiResponse) -> Vec<String> {
    if response.status != 201 {
        return Vec::new();
    }
    let id = crate::codec::decode(&response.body, response.content_type())
        .ok()
        .and_then(|document| document.get("id").cloned());
    match id {
        Some(Value::Number(number)) if number.is_u64() => Vec::new(),
        other => vec![format!("created todo has no numeric id (observed {other:?})")],
    }
}
