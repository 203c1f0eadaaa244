//! Scenario runner.
//!
//! Scenarios run sequentially against one session, in an order that puts each
//! scenario after the ones whose postconditions it relies on. Assertion
//! failures are accumulated per scenario; harness errors abort the scenario,
//! and a fatal one (lost session) ends the run.
mod auth_flow;
mod bulk;
mod context;
mod expect;
mod negotiation;
mod progress;
mod reads;
mod status_codes;
mod writes;

pub use context::ScenarioContext;
pub use expect::Expect;

use crate::auth::Credentials;
use crate::catalog::{self, Challenge};
use crate::http::{Transport, SESSION_HEADER};
use crate::report::{self, RunReport, ScenarioOutcome};
use crate::session::{self, SessionClient};
use anyhow::Result;
use std::collections::BTreeSet;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A scenario returns its assertion failures; `Err` means it could not be
/// judged at all.
pub type ScenarioFn = fn(&mut ScenarioContext<'_>) -> Result<Vec<String>>;

pub struct ScenarioDef {
    pub challenge: u8,
    pub run: ScenarioFn,
}

const fn def(challenge: u8, run: ScenarioFn) -> ScenarioDef {
    ScenarioDef { challenge, run }
}

/// Every scenario except session creation, in execution order.
///
/// Creation (9) precedes the filtered read (7) so a done entity exists, and
/// the "create" progress push (36) precedes the "restore" push (35) so the
/// restore carries the newer snapshot.
pub fn scenario_table() -> Vec<ScenarioDef> {
    vec![
        def(2, reads::get_challenges),
        def(3, reads::get_todos),
        def(4, reads::get_todo_not_plural),
        def(5, reads::get_todo),
        def(6, reads::get_todo_missing),
        def(9, writes::create_todo),
        def(7, reads::get_todos_filtered),
        def(8, reads::head_todos),
        def(10, writes::create_bad_done_status),
        def(11, writes::create_title_too_long),
        def(12, writes::create_description_too_long),
        def(13, writes::create_max_content),
        def(14, writes::create_payload_too_large),
        def(15, writes::create_extra_field),
        def(16, writes::put_creation_refused),
        def(17, writes::amend_todo),
        def(18, writes::amend_missing_todo),
        def(19, writes::replace_full),
        def(20, writes::replace_partial),
        def(21, writes::replace_without_title),
        def(22, writes::replace_amending_id),
        def(23, writes::delete_todo),
        def(24, reads::options_todos),
        def(25, negotiation::accept_xml),
        def(26, negotiation::accept_json),
        def(27, negotiation::accept_any),
        def(28, negotiation::accept_xml_preferred),
        def(29, negotiation::accept_empty),
        def(30, negotiation::accept_unsupported),
        def(31, negotiation::create_xml),
        def(32, negotiation::create_json),
        def(33, negotiation::create_unsupported_content_type),
        def(34, progress::get_progress),
        def(36, progress::put_progress_create),
        def(35, progress::put_progress_restore),
        def(37, progress::get_stored_todos),
        def(38, progress::put_stored_todos),
        def(39, negotiation::create_xml_accept_json),
        def(40, negotiation::create_json_accept_xml),
        def(41, status_codes::delete_heartbeat),
        def(42, status_codes::patch_heartbeat),
        def(43, status_codes::trace_heartbeat),
        def(44, status_codes::get_heartbeat),
        def(45, status_codes::override_delete_heartbeat),
        def(46, status_codes::override_patch_heartbeat),
        def(47, status_codes::override_trace_heartbeat),
        def(48, auth_flow::token_wrong_secret),
        def(49, auth_flow::token_created),
        def(50, auth_flow::get_note_invalid_token),
        def(51, auth_flow::get_note_without_token),
        def(52, auth_flow::get_note),
        def(53, auth_flow::post_note),
        def(54, auth_flow::post_note_without_token),
        def(55, auth_flow::post_note_invalid_token),
        def(56, auth_flow::get_note_bearer),
        def(57, auth_flow::post_note_bearer),
        def(58, bulk::delete_all_todos),
        def(59, bulk::create_until_full),
    ]
}

pub struct RunOptions {
    /// Restrict to these challenge ids; session creation always runs.
    pub only: Option<BTreeSet<u8>>,
    pub credentials: Credentials,
    pub reconcile: bool,
    pub expected_challenges: usize,
    pub base_url: String,
}

impl RunOptions {
    fn selected(&self, challenge: u8) -> bool {
        self.only
            .as_ref()
            .map_or(true, |only| only.contains(&challenge))
    }
}

/// Execute the selected scenarios and collect a report.
pub fn run_scenarios(transport: &dyn Transport, options: &RunOptions) -> Result<RunReport> {
    let started = Instant::now();
    let started_at_epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let mut report = RunReport::new(options.base_url.clone(), started_at_epoch_ms);
    let table = scenario_table();
    let creation = lookup_challenge(1)?;

    let step = Instant::now();
    let (session, response) = match session::start(transport) {
        Ok(started) => started,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "session creation failed");
            report.push(ScenarioOutcome::aborted(creation, &err, elapsed_ms(step)));
            for def in table.iter().filter(|def| options.selected(def.challenge)) {
                report.push(ScenarioOutcome::skipped(lookup_challenge(def.challenge)?));
            }
            report.fatal = Some(format!("{err:#}"));
            report.elapsed_ms = elapsed_ms(started);
            return Ok(report);
        }
    };
    let failures = Expect::status(201)
        .header_eq(SESSION_HEADER, session.id())
        .check(&response);
    report.session_id = Some(session.id().to_string());
    report.push(ScenarioOutcome::judged(creation, failures, elapsed_ms(step)));

    let client = SessionClient::new(transport, session);
    let mut ctx = ScenarioContext::new(client, options.credentials.clone());

    let mut remaining = table
        .iter()
        .filter(|def| options.selected(def.challenge));
    for def in remaining.by_ref() {
        let challenge = lookup_challenge(def.challenge)?;
        let span = tracing::info_span!("scenario", challenge = challenge.id);
        let _entered = span.enter();
        let step = Instant::now();
        match (def.run)(&mut ctx) {
            Ok(failures) => {
                if !failures.is_empty() {
                    tracing::warn!(
                        name = challenge.name,
                        failures = failures.len(),
                        "scenario failed"
                    );
                }
                report.push(ScenarioOutcome::judged(challenge, failures, elapsed_ms(step)));
            }
            Err(err) => {
                let fatal = crate::error::harness_error(&err).is_some_and(|err| err.is_fatal());
                tracing::warn!(
                    name = challenge.name,
                    error = %format!("{err:#}"),
                    fatal,
                    "scenario aborted"
                );
                report.push(ScenarioOutcome::aborted(challenge, &err, elapsed_ms(step)));
                if fatal {
                    report.fatal = Some(format!("{err:#}"));
                    break;
                }
            }
        }
    }
    for def in remaining {
        report.push(ScenarioOutcome::skipped(lookup_challenge(def.challenge)?));
    }

    if options.reconcile && report.fatal.is_none() {
        let passed = report.passed_ids();
        match report::reconcile(ctx.client(), &passed, options.expected_challenges) {
            Ok(reconciliation) => report.reconciliation = Some(reconciliation),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "reconciliation failed");
                report.reconciliation = Some(report::Reconciliation {
                    failures: vec![format!("reconciliation could not complete: {err:#}")],
                    ..Default::default()
                });
            }
        }
    }

    report.elapsed_ms = elapsed_ms(started);
    tracing::info!(
        passed = report.pass_count,
        failed = report.fail_count,
        aborted = report.abort_count,
        elapsed_ms = report.elapsed_ms,
        "run finished"
    );
    Ok(report)
}

fn lookup_challenge(id: u8) -> Result<&'static Challenge> {
    catalog::lookup(id)
        .ok_or_else(|| anyhow::anyhow!("scenario table names unknown challenge {id}"))
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
