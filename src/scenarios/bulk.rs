//! Bulk deletion and fill-to-capacity scenarios.
use super::ScenarioContext;
use crate::codec::Format;
use crate::http::{ApiRequest, ACCEPT};
use crate::todo::{self, ViolationKind, MAX_DESCRIPTION_LENGTH, MAX_TITLE_LENGTH, MAX_TODOS};
use crate::util::filler;
use anyhow::Result;
use serde_json::json;

/// Delete every live entity by id, then confirm the collection is empty.
pub(super) fn delete_all_todos(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let todos = ctx.list_todos()?;
    let mut failures = Vec::new();
    for todo in todos {
        let response = ctx.send(ApiRequest::delete(format!("todos/{}", todo.id)))?;
        failures.extend(
            ctx.expect(200)
                .check(&response)
                .into_iter()
                .map(|failure| format!("delete todo {}: {failure}", todo.id)),
        );
        if response.status == 200 {
            ctx.todos.deleted(todo.id);
        }
    }
    let response = ctx.send(ApiRequest::get("todos").header(ACCEPT, Format::Json.mime()))?;
    failures.extend(ctx.expect(200).array_len("/todos", 0).check(&response));
    Ok(failures)
}

/// Insert one more entity than the cap allows. Each answer must be either a
/// creation echoing the payload or the capacity rejection; whichever comes
/// back is judged on its own terms.
pub(super) fn create_until_full(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let payload = json!({
        "title": filler(MAX_TITLE_LENGTH),
        "doneStatus": true,
        "description": filler(MAX_DESCRIPTION_LENGTH),
    });
    let capacity = todo::Violation::capacity_exceeded().message;
    ctx.list_todos()?;

    let mut failures = Vec::new();
    for attempt in 1..=MAX_TODOS + 1 {
        let prediction = todo::predict_insert(&payload, Format::Json, ctx.todos.live());
        let request = ApiRequest::post("todos")
            .header(ACCEPT, Format::Json.mime())
            .json(&payload)?;
        let response = ctx.send(request)?;
        ctx.record_creation(&response);

        let outcome = match response.status {
            201 => {
                let mut outcome = ctx.expect(201).body_subset(payload.clone()).check(&response);
                outcome.extend(super::writes::assigned_id_failures(&response));
                outcome
            }
            400 => ctx.expect(400).error_message(&capacity).check(&response),
            _ => ctx.expect_any(&[201, 400]).check(&response),
        };
        failures.extend(
            outcome
                .into_iter()
                .map(|failure| format!("attempt {attempt}: {failure}")),
        );
        let past_cap = prediction.message(ViolationKind::CapacityExceeded).is_some();
        if past_cap && response.status == 201 {
            tracing::debug!(attempt, "service accepted an insert past the predicted cap");
        }
    }
    Ok(failures)
}
