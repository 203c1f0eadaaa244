//! Credential exchange and secret-note scenarios.
//!
//! A missing token must be refused as an authentication failure (401) and a
//! presented but invalid one as an authorization failure (403).
use super::ScenarioContext;
use crate::auth::{AuthScheme, AuthState, Denial};
use crate::http::{ApiRequest, AUTH_TOKEN_HEADER};
use anyhow::Result;
use serde_json::json;

const NOTE: &str = "my note";
const BEARER_NOTE: &str = "my note edited bearer";

pub(super) fn token_wrong_secret(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let before = ctx.auth().state().clone();
    let wrong = ctx.auth().credentials().corrupted();
    let response = ctx.exchange_credentials(&wrong)?;
    let mut failures = ctx.expect(Denial::Authentication.status()).check(&response);
    if ctx.auth().state() != &before {
        failures.push("refused exchange changed the authentication state".to_string());
    }
    Ok(failures)
}

pub(super) fn token_created(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let credentials = ctx.auth().credentials().clone();
    let response = ctx.exchange_credentials(&credentials)?;
    let mut failures = ctx
        .expect(201)
        .header_present(AUTH_TOKEN_HEADER)
        .check(&response);
    if response.status == 201 && !matches!(ctx.auth().state(), AuthState::Authenticated { .. }) {
        failures.push("exchange answered 201 without a usable token".to_string());
    }
    Ok(failures)
}

pub(super) fn get_note_invalid_token(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let request = ApiRequest::get("secret/note").header(AUTH_TOKEN_HEADER, "bob");
    denied(ctx, request, Denial::Authorization)
}

pub(super) fn get_note_without_token(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    denied(ctx, ApiRequest::get("secret/note"), Denial::Authentication)
}

pub(super) fn get_note(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    read_note(ctx, AuthScheme::TokenHeader)
}

pub(super) fn post_note(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    write_note(ctx, AuthScheme::TokenHeader, NOTE)
}

pub(super) fn post_note_without_token(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let request = ApiRequest::post("secret/note").json(&json!({"note": NOTE}))?;
    denied(ctx, request, Denial::Authentication)
}

pub(super) fn post_note_invalid_token(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let request = ApiRequest::post("secret/note")
        .header(AUTH_TOKEN_HEADER, "not token")
        .json(&json!({"note": NOTE}))?;
    denied(ctx, request, Denial::Authorization)
}

pub(super) fn get_note_bearer(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    read_note(ctx, AuthScheme::Bearer)
}

pub(super) fn post_note_bearer(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    write_note(ctx, AuthScheme::Bearer, BEARER_NOTE)
}

fn denied(
    ctx: &mut ScenarioContext<'_>,
    request: ApiRequest,
    denial: Denial,
) -> Result<Vec<String>> {
    let response = ctx.send(request)?;
    let mut failures = ctx.expect(denial.status()).check(&response);
    let observed = Denial::classify(response.status).filter(|observed| *observed != denial);
    if let Some(observed) = observed {
        failures.push(format!("refusal classified as {observed:?}, expected {denial:?}"));
    }
    Ok(failures)
}

fn read_note(ctx: &mut ScenarioContext<'_>, scheme: AuthScheme) -> Result<Vec<String>> {
    let request = ctx.authorized(ApiRequest::get("secret/note"), scheme)?;
    let response = ctx.send(request)?;
    let mut expect = ctx.expect(200).body_key("note");
    if let Some(note) = ctx.note.as_deref() {
        expect = expect.body_field("/note", json!(note));
    }
    Ok(expect.check(&response))
}

fn write_note(
    ctx: &mut ScenarioContext<'_>,
    scheme: AuthScheme,
    note: &str,
) -> Result<Vec<String>> {
    let request = ApiRequest::post("secret/note").json(&json!({"note": note}))?;
    let request = ctx.authorized(request, scheme)?;
    let response = ctx.send(request)?;
    let failures = ctx
        .expect(200)
        .body_field("/note", json!(note))
        .check(&response);
    if response.status == 200 {
        ctx.note = Some(note.to_string());
    }
    Ok(failures)
}
