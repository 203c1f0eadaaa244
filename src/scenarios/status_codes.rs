//! Heartbeat status-code taxonomy, sent directly and through method override.
use super::ScenarioContext;
use crate::http::{ApiRequest, Method, METHOD_OVERRIDE_HEADER};
use anyhow::Result;

/// Status the heartbeat endpoint answers each verb with.
fn heartbeat_status(method: Method) -> u16 {
    match method {
        Method::Get => 204,
        Method::Patch => 500,
        Method::Trace => 501,
        _ => 405,
    }
}

fn probe(ctx: &mut ScenarioContext<'_>, method: Method) -> Result<Vec<String>> {
    let response = ctx.send(ApiRequest::new(method, "heartbeat"))?;
    Ok(ctx.expect(heartbeat_status(method)).check(&response))
}

/// POST carrying `X-HTTP-Method-Override`; the service must treat it as the
/// overriding verb.
fn probe_override(ctx: &mut ScenarioContext<'_>, method: Method) -> Result<Vec<String>> {
    let request = ApiRequest::post("heartbeat").header(METHOD_OVERRIDE_HEADER, method.as_str());
    let response = ctx.send(request)?;
    Ok(ctx.expect(heartbeat_status(method)).check(&response))
}

pub(super) fn delete_heartbeat(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    probe(ctx, Method::Delete)
}

pub(super) fn patch_heartbeat(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    probe(ctx, Method::Patch)
}

pub(super) fn trace_heartbeat(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    probe(ctx, Method::Trace)
}

pub(super) fn get_heartbeat(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    probe(ctx, Method::Get)
}

pub(super) fn override_delete_heartbeat(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    probe_override(ctx, Method::Delete)
}

pub(super) fn override_patch_heartbeat(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    probe_override(ctx, Method::Patch)
}

pub(super) fn override_trace_heartbeat(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    probe_override(ctx, Method::Trace)
}
