//! Session progress capture and restore.
use super::ScenarioContext;
use crate::error::HarnessError;
use crate::session::{ProgressSnapshot, ProgressSource, NEW_RESTORED_FLAG};
use anyhow::Result;

pub(super) fn get_progress(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let (response, snapshot) = ctx.client().fetch_progress(ProgressSource::Live)?;
    let mut failures = ctx.expect(200).body_key("challengeStatus").check(&response);
    match snapshot {
        Some(snapshot) => {
            if let Some(owner) = snapshot.x_challenger.as_deref() {
                if owner != ctx.session_id() {
                    failures.push(format!(
                        "progress belongs to {owner:?}, expected {:?}",
                        ctx.session_id()
                    ));
                }
            }
            ctx.progress = Some(snapshot);
        }
        None if response.status == 200 => {
            failures.push("progress body is not a snapshot document".to_string());
        }
        None => {}
    }
    Ok(failures)
}

/// Push the captured snapshot with the "restored as new" flag set. The pushed
/// snapshot replaces the captured one so the later restore keeps the flag.
pub(super) fn put_progress_create(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let snapshot = captured_progress(ctx)?.with_flag(NEW_RESTORED_FLAG, true);
    let response = ctx
        .client()
        .restore_progress(ProgressSource::Live, &snapshot.to_value()?)?;
    let failures = ctx
        .expect(ProgressSource::Live.restore_status())
        .body_key("challengeStatus")
        .check(&response);
    ctx.progress = Some(snapshot);
    Ok(failures)
}

pub(super) fn put_progress_restore(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let snapshot = captured_progress(ctx)?;
    let response = ctx
        .client()
        .restore_progress(ProgressSource::Live, &snapshot.to_value()?)?;
    Ok(ctx
        .expect(ProgressSource::Live.restore_status())
        .check(&response))
}

pub(super) fn get_stored_todos(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let (response, document) = ctx.client().fetch_stored()?;
    let mut failures = ctx.expect(200).check(&response);
    if document.is_none() && response.status == 200 {
        failures.push("stored progress body is not JSON".to_string());
    }
    ctx.stored = document;
    Ok(failures)
}

pub(super) fn put_stored_todos(ctx: &mut ScenarioContext<'_>) -> Result<Vec<String>> {
    let document = match ctx.stored.clone() {
        Some(document) => document,
        None => {
            let (_, document) = ctx.client().fetch_stored()?;
            document.ok_or_else(|| {
                HarnessError::Precondition("no stored progress document to push".to_string())
            })?
        }
    };
    let response = ctx
        .client()
        .restore_progress(ProgressSource::Database, &document)?;
    Ok(ctx
        .expect(ProgressSource::Database.restore_status())
        .check(&response))
}

/// The snapshot captured earlier in the run, or a fresh one.
fn captured_progress(ctx: &mut ScenarioContext<'_>) -> Result<ProgressSnapshot> {
    if let Some(snapshot) = ctx.progress.clone() {
        return Ok(snapshot);
    }
    let (response, snapshot) = ctx.client().fetch_progress(ProgressSource::Live)?;
    let snapshot = snapshot.ok_or_else(|| {
        HarnessError::Precondition(format!(
            "no progress snapshot available (status {})",
            response.status
        ))
    })?;
    ctx.progress = Some(snapshot.clone());
    Ok(snapshot)
}
