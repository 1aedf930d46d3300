//! Table runner.
//!
//! Runs each scenario of a table through a [`Driver`] in its own profile
//! and log directory, and compares the result with the outcome the row
//! declares. The report serializes to JSON for external consumers.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::controller::ApController;
use crate::driver::{Driver, PhaseAssociation, RunOutcome};
use crate::error::Result;
use crate::fabric::RadioFabric;
use crate::network_manager::NetworkManager;
use crate::scenario::{Expectation, Mode, Scenario};
use crate::utils::{elapsed_ms, now_ms, sanitize_file_name};

/// Result of one scenario.
#[derive(Clone, Debug, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub mode: Mode,
    pub expect: Expectation,
    pub passed: bool,
    /// `Associated`, or the error kind.
    pub outcome: String,
    pub error: Option<String>,
    pub associations: Vec<PhaseAssociation>,
    pub log_dir: PathBuf,
    pub started_at_ms: u64,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    pub passed: usize,
    pub failed: usize,
    pub scenarios: Vec<ScenarioReport>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    fn push(&mut self, report: ScenarioReport) {
        if report.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.scenarios.push(report);
    }
}

/// Whether `result` is the outcome `expect` declares.
pub fn meets_expectation(expect: Expectation, result: &Result<RunOutcome>) -> bool {
    match (expect, result) {
        (Expectation::Associated, Ok(_)) => true,
        (Expectation::Timeout, Err(err)) => err.is_timeout(),
        _ => false,
    }
}

pub struct Runner<'a> {
    driver: Driver<'a>,
    config: &'a HarnessConfig,
    fabric: &'a RadioFabric,
    work_dir: PathBuf,
}

impl<'a> Runner<'a> {
    pub fn new(
        nm: &'a dyn NetworkManager,
        controller: &'a dyn ApController,
        config: &'a HarnessConfig,
        fabric: &'a RadioFabric,
        work_dir: &Path,
    ) -> Self {
        Self {
            driver: Driver::new(nm, controller, config),
            config,
            fabric,
            work_dir: work_dir.to_path_buf(),
        }
    }

    /// Run every scenario in order. Never stops early.
    pub async fn run_table(&self, table: &[Scenario]) -> RunReport {
        let mut report = RunReport::default();
        for scenario in table {
            report.push(self.run_scenario(scenario).await);
        }
        info!(
            passed = report.passed,
            failed = report.failed,
            "scenario table finished"
        );
        report
    }

    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioReport {
        let mut scenario = scenario.clone();
        if let Some(tls) = &self.config.default_tls {
            scenario.apply_default_tls(tls);
        }

        let log_dir = self.work_dir.join(sanitize_file_name(&scenario.name));
        let started_at_ms = now_ms();
        let started = Instant::now();

        let result = match tokio::fs::create_dir_all(&log_dir).await {
            Ok(()) => {
                let deadline = started + self.config.scenario_timeout;
                self.driver
                    .run(&scenario, self.fabric, &log_dir, deadline)
                    .await
            }
            Err(err) => {
                warn!(dir = %log_dir.display(), "cannot create log directory: {}", err);
                Err(crate::error::HarnessError::InvalidScenario(format!(
                    "cannot create log directory {}: {err}",
                    log_dir.display()
                )))
            }
        };

        let passed = meets_expectation(scenario.expect, &result);
        let (outcome, error, associations) = match result {
            Ok(outcome) => ("Associated".to_string(), None, outcome.associations),
            Err(err) => (err.kind().to_string(), Some(err.to_string()), Vec::new()),
        };
        if !passed {
            warn!(
                scenario = %scenario.name,
                expected = ?scenario.expect,
                outcome = %outcome,
                "scenario did not meet its expectation"
            );
        }

        ScenarioReport {
            name: scenario.name,
            mode: scenario.mode,
            expect: scenario.expect,
            passed,
            outcome,
            error,
            associations,
            log_dir,
            started_at_ms,
            duration_ms: elapsed_ms(started),
        }
    }
}
