//! Run report, catalog reconciliation, and exit-code policy.
use crate::catalog::{self, Challenge};
use crate::http::{ApiRequest, ACCEPT};
use crate::session::{ProgressSource, SessionClient};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

pub const EXIT_PASSED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_HARNESS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Passed,
    Failed,
    /// A harness error stopped the scenario before it could be judged.
    Aborted,
    /// Never started because an earlier fatal error ended the run.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub challenge: u8,
    pub name: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub elapsed_ms: u64,
}

impl ScenarioOutcome {
    pub fn judged(challenge: &Challenge, failures: Vec<String>, elapsed_ms: u64) -> Self {
        let status = if failures.is_empty() {
            OutcomeStatus::Passed
        } else {
            OutcomeStatus::Failed
        };
        Self {
            challenge: challenge.id,
            name: challenge.name.to_string(),
            status,
            failures,
            error: None,
            error_kind: None,
            elapsed_ms,
        }
    }

    pub fn aborted(challenge: &Challenge, err: &anyhow::Error, elapsed_ms: u64) -> Self {
        Self {
            challenge: challenge.id,
            name: challenge.name.to_string(),
            status: OutcomeStatus::Aborted,
            failures: Vec::new(),
            error: Some(format!("{err:#}")),
            error_kind: crate::error::harness_error(err).map(|err| err.kind().to_string()),
            elapsed_ms,
        }
    }

    pub fn skipped(challenge: &Challenge) -> Self {
        Self {
            challenge: challenge.id,
            name: challenge.name.to_string(),
            status: OutcomeStatus::Skipped,
            failures: Vec::new(),
            error: None,
            error_kind: None,
            elapsed_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == OutcomeStatus::Passed
    }
}

/// Terminal comparison of the local verdicts with the service's own view.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    pub service_challenges: usize,
    pub service_completed: usize,
    pub progress_entries: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub base_url: String,
    pub session_id: Option<String>,
    pub started_at_epoch_ms: u128,
    pub elapsed_ms: u64,
    pub pass_count: usize,
    pub fail_count: usize,
    pub abort_count: usize,
    pub skip_count: usize,
    pub outcomes: Vec<ScenarioOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<Reconciliation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl RunReport {
    pub fn new(base_url: String, started_at_epoch_ms: u128) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            base_url,
            session_id: None,
            started_at_epoch_ms,
            elapsed_ms: 0,
            pass_count: 0,
            fail_count: 0,
            abort_count: 0,
            skip_count: 0,
            outcomes: Vec::new(),
            reconciliation: None,
            fatal: None,
        }
    }

    pub fn push(&mut self, outcome: ScenarioOutcome) {
        match outcome.status {
            OutcomeStatus::Passed => self.pass_count += 1,
            OutcomeStatus::Failed => self.fail_count += 1,
            OutcomeStatus::Aborted => self.abort_count += 1,
            OutcomeStatus::Skipped => self.skip_count += 1,
        }
        self.outcomes.push(outcome);
    }

    #[cfg(test)]
    pub fn outcome(&self, challenge: u8) -> Option<&ScenarioOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.challenge == challenge)
    }

    pub fn passed_ids(&self) -> Vec<u8> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.passed())
            .map(|outcome| outcome.challenge)
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        if self.fatal.is_some() || self.abort_count > 0 {
            return EXIT_HARNESS;
        }
        let reconciliation_failed = self
            .reconciliation
            .as_ref()
            .is_some_and(|reconciliation| !reconciliation.failures.is_empty());
        if self.fail_count > 0 || reconciliation_failed {
            return EXIT_FAILED;
        }
        EXIT_PASSED
    }

    /// Plain-text summary: one line per scenario that did not pass, then totals.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            match outcome.status {
                OutcomeStatus::Passed | OutcomeStatus::Skipped => {}
                OutcomeStatus::Failed => {
                    out.push_str(&format!("FAIL {:>2} {}\n", outcome.challenge, outcome.name));
                    for failure in &outcome.failures {
                        out.push_str(&format!("       {failure}\n"));
                    }
                }
                OutcomeStatus::Aborted => {
                    out.push_str(&format!(
                        "ABORT {:>2} {}\n       {}\n",
                        outcome.challenge,
                        outcome.name,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    ));
                }
            }
        }
        if let Some(reconciliation) = &self.reconciliation {
            for failure in &reconciliation.failures {
                out.push_str(&format!("RECONCILE {failure}\n"));
            }
        }
        if let Some(fatal) = &self.fatal {
            out.push_str(&format!("FATAL {fatal}\n"));
        }
        out.push_str(&format!(
            "{} passed, {} failed, {} aborted, {} skipped ({} ms)\n",
            self.pass_count, self.fail_count, self.abort_count, self.skip_count, self.elapsed_ms
        ));
        out
    }
}

/// Re-query the service catalog and progress snapshot after a run.
///
/// Every locally passed challenge must be flagged completed by the service,
/// and both views must list the full catalog.
pub fn reconcile(
    client: &SessionClient<'_>,
    passed: &[u8],
    expected_challenges: usize,
) -> Result<Reconciliation> {
    let mut reconciliation = Reconciliation::default();

    let response = client.send(ApiRequest::get("challenges").header(ACCEPT, "application/json"))?;
    if response.status == 200 {
        let document = response.json().context("decode challenge catalog")?;
        let entries = catalog::parse_service_catalog(&document)?;
        reconciliation.service_challenges = entries.len();
        reconciliation.service_completed = entries.iter().filter(|entry| entry.completed).count();
        if entries.len() != expected_challenges {
            reconciliation.failures.push(format!(
                "service lists {} challenges, expected {expected_challenges}",
                entries.len()
            ));
        }
        for id in passed {
            let Some(declared) = catalog::lookup(*id) else {
                continue;
            };
            let entry = entries
                .iter()
                .find(|entry| entry.declared().map(|found| found.id) == Some(*id));
            match entry {
                Some(entry) if entry.completed => {}
                Some(_) => reconciliation.failures.push(format!(
                    "challenge {id} ({}) passed but the service has not marked it completed",
                    declared.name
                )),
                None => reconciliation.failures.push(format!(
                    "challenge {id} ({}) is missing from the service catalog",
                    declared.name
                )),
            }
        }
    } else {
        reconciliation.failures.push(format!(
            "GET /challenges answered {}, expected 200",
            response.status
        ));
    }

    let (response, snapshot) = client.fetch_progress(ProgressSource::Live)?;
    match snapshot {
        Some(snapshot) => {
            reconciliation.progress_entries = Some(snapshot.entries());
            if snapshot.entries() != expected_challenges {
                reconciliation.failures.push(format!(
                    "progress snapshot has {} entries, expected {expected_challenges}",
                    snapshot.entries()
                ));
            }
        }
        None => reconciliation.failures.push(format!(
            "progress snapshot unavailable (status {})",
            response.status
        )),
    }

    tracing::info!(
        service_completed = reconciliation.service_completed,
        failures = reconciliation.failures.len(),
        "reconciliation finished"
    );
    Ok(reconciliation)
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create report dir {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(report).context("serialize run report")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
