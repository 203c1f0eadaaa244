//! Accept and Content-Type scenarios.
use super::writes::assigned_id_failures;
use super::ScenarioContext;
use crate::codec::{self, negotiate, Format, Negotiation};
use crate::error::HarnessError;
use crate::http::{ApiRequest, ACCEPT};
use crate::todo::{self, ViolationKind};
use anyhow::Result;
use serde_json::{json, Value};

pub(super) fn accept_xml(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    list_with_accept(ctx, "application/xml")
}

pub(super) fn accept_json(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    list_with_accept(ctx, "application/json")
}

pub(super) fn accept_any(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    list_with_accept(ctx, "*/*")
}

pub(super) fn accept_xml_preferred(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    list_with_accept(ctx, "application/xml, application/json")
}

pub(super) fn accept_empty(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    list_with_accept(ctx, "")
}

pub(super) fn accept_unsupported(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    list_with_accept(ctx, "application/gzip")
}

fn list_with_accept(ctx: &mut ScenarioContext<'_>, accept: &str) -> Result<Vec<String>> {
    let negotiation = negotiate(Some(accept));
    let response = ctx.send(ApiRequest::get("todos").header(ACCEPT, accept))?;
    let expect = ctx.expect(negotiation.read_status());
    let expect = match negotiation {
        Negotiation::Respond(format) => expect.content_type(format).body_key("todos"),
        Negotiation::NotAcceptable => expect,
    };
    Ok(expect.check(&response))
}

pub(super) fn create_xml(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    create_in_formats(ctx, Format::Xml, Format::Xml)
}

pub(super) fn create_json(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    create_in_formats(ctx, Format::Json, Format::Json)
}

pub(super) fn create_xml_accept_json(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    create_in_formats(ctx, Format::Xml, Format::Json)
}

pub(super) fn create_json_accept_xml(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    create_in_formats(ctx, Format::Json, Format::Xml)
}

pub(super) fn create_unsupported_content_type(
    ctx: &mut ScenarioContext<'_>,
) -> Result<Vec<String>> {
    let request = ApiRequest::post("todos")
        .header(ACCEPT, Format::Json.mime())
        .body("bob", Vec::new());
    let response = ctx.send(request)?;
    Ok(ctx.expect(415).check(&response))
}

fn sample_todo(format: Format) -> Value {
    match format {
        Format::Xml => json!({
            "doneStatus": true,
            "description": "file paperwork today",
            "title": "file paperwork today",
        }),
        Format::Json => json!({
            "title": "create todo process payroll",
            "doneStatus": true,
            "description": "Hi! :)",
        }),
    }
}

/// Create in `request_format`, ask for `response_format` back, and check
/// that the fields survive both directions. The entity is then read back as
/// JSON and compared again.
fn create_in_formats(
    ctx: &mut ScenarioContext<'_>,
    request_format: Format,
    response_format: Format,
) -> Result<Vec<String>> {
    let payload = sample_todo(request_format);
    let sent = payload
        .as_object()
        .cloned()
        .ok_or_else(|| HarnessError::Setup("sample todo is not an object".to_string()))?;
    let prediction = todo::predict_insert(&payload, request_format, ctx.todos.live());
    let capacity = prediction
        .message(ViolationKind::CapacityExceeded)
        .map(str::to_string);
    if !prediction.accepted() && capacity.is_none() {
        return Err(HarnessError::Setup(format!(
            "sample payload is invalid: {:?}",
            prediction.messages()
        ))
        .into());
    }

    let body = codec::encode(&payload, "todo", request_format)?;
    let request = ApiRequest::post("todos")
        .header(ACCEPT, response_format.mime())
        .body(request_format.mime(), body);
    let response = ctx.send(request)?;
    ctx.record_creation(&response);

    let mut expect = ctx
        .expect(prediction.status)
        .content_type(response_format);
    if let Some(message) = capacity {
        return Ok(expect.error_message(&message).check(&response));
    }
    if response_format == Format::Xml {
        expect = expect.text_matches("<todo>");
    }
    let mut failures = expect.check(&response);
    if response.status != 201 {
        return Ok(failures);
    }
    failures.extend(assigned_id_failures(&response));

    let created = match codec::decode(&response.body, response.content_type()) {
        Ok(created) => created,
        Err(_) => return Ok(failures),
    };
    failures.extend(codec::round_trip_mismatches(&sent, &created));

    if let Some(id) = created.get("id").and_then(Value::as_u64) {
        let read =
            ctx.send(ApiRequest::get(format!("todos/{id}")).header(ACCEPT, Format::Json.mime()))?;
        let read_back = codec::decode(&read.body, read.content_type())
            .ok()
            .and_then(|document| document.pointer("/todos/0").cloned());
        match read_back {
            Some(entity) => failures.extend(
                codec::round_trip_mismatches(&sent, &entity)
                    .into_iter()
                    .map(|mismatch| format!("JSON read-back {mismatch}")),
            ),
            None => failures.push(format!(
                "JSON read-back of todo {id} answered {} without an entity",
                read.status
            )),
        }
    }
    Ok(failures)
}
