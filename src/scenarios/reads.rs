//! Catalog and entity reads, plus the OPTIONS probe.
use super::ScenarioContext;
use crate::catalog::CHALLENGE_COUNT;
use crate::codec::{self, Format};
use crate::http::{ApiRequest, Method, ALLOW};
use crate::todo;
use anyhow::Result;
use serde_json::json;

const ALLOWED_TODOS_METHODS: &str = "OPTIONS, GET, HEAD, POST";

pub(super) fn get_challenges(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let response = ctx.send(ApiRequest::get("challenges"))?;
    Ok(ctx
        .expect(200)
        .content_type(Format::Json)
        .array_len("/challenges", CHALLENGE_COUNT)
        .check(&response))
}

pub(super) fn get_todos(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let response = ctx.send(ApiRequest::get("todos"))?;
    let failures = ctx
        .expect(200)
        .content_type(Format::Json)
        .body_key("todos")
        .check(&response);
    if response.status == 200 {
        if let Ok(todos) = codec::decode(&response.body, response.content_type())
            .and_then(|document| todo::todos_from_document(&document))
        {
            ctx.todos.observe_list(&todos);
        }
    }
    Ok(failures)
}

pub(super) fn get_todo_not_plural(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let response = ctx.send(ApiRequest::get("todo"))?;
    Ok(ctx.expect(404).check(&response))
}

pub(super) fn get_todo(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let target = ctx.ensure_todo()?;
    let response = ctx.send(ApiRequest::get(format!("todos/{}", target.id)))?;
    Ok(ctx
        .expect(200)
        .array_len("/todos", 1)
        .body_field("/todos/0/id", json!(target.id))
        .check(&response))
}

pub(super) fn get_todo_missing(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let missing = ctx.unused_todo_id()?;
    let response = ctx.send(ApiRequest::get(format!("todos/{missing}")))?;
    Ok(ctx.expect(404).body_key("errorMessages").check(&response))
}

/// `?doneStatus=true` must return at least one entity, and only done ones.
pub(super) fn get_todos_filtered(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let done = ctx.ensure_done_todo()?;
    let response = ctx.send(ApiRequest::get("todos").query("doneStatus", "true"))?;
    Ok(ctx
        .expect(200)
        .any_item("/todos", json!({"id": done.id, "doneStatus": true}))
        .every_item("/todos", json!({"doneStatus": true}))
        .check(&response))
}

pub(super) fn head_todos(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let response = ctx.send(ApiRequest::head("todos"))?;
    let mut failures = ctx.expect(200).content_type(Format::Json).check(&response);
    if !response.body.is_empty() {
        failures.push(format!(
            "HEAD response carried a {} byte body",
            response.body.len()
        ));
    }
    Ok(failures)
}

pub(super) fn options_todos(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let response = ctx.send(ApiRequest::new(Method::Options, "todos"))?;
    Ok(ctx
        .expect(200)
        .header_contains(ALLOW, ALLOWED_TODOS_METHODS)
        .check(&response))
}
