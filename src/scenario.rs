//! Declarative scenario table.
//!
//! A scenario is data: credentials, the APs to bring up, the SSID the device
//! is expected to pick, the mode, and the expected outcome. Adding a case is
//! a table row, built in or loaded from JSON.

use std::path::Path;

use anyhow::Context;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::access_point::AccessPoint;
use crate::credentials::{Auth, Credentials, Oi, TlsMaterial};
use crate::error::{HarnessError, Result};

pub const BLUE_DOMAIN: &str = "blue.example";
pub const GREEN_DOMAIN: &str = "green.example";
pub const RED_DOMAIN: &str = "red.example";

pub const HOME_OI: Oi = 0xaa;
pub const ROAMING_OI_1: Oi = 0xbb;
pub const ROAMING_OI_2: Oi = 0xcc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// All APs at once, one association expected.
    #[default]
    Selection,
    /// One AP per phase, in table order.
    Roaming,
}

/// Outcome the table row declares.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    #[default]
    Associated,
    Timeout,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub mode: Mode,
    pub credentials: Vec<Credentials>,
    pub aps: Vec<AccessPoint>,
    pub expected_ssid: String,
    #[serde(default)]
    pub expect: Expectation,
}

/// APs started together and the one expected to win.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Phase {
    pub aps: SmallVec<usize, 4>,
    pub expected: usize,
}

impl Scenario {
    pub fn selection(
        name: &str,
        credentials: Vec<Credentials>,
        aps: Vec<AccessPoint>,
        expected_ssid: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Selection,
            credentials,
            aps,
            expected_ssid: expected_ssid.to_string(),
            expect: Expectation::Associated,
        }
    }

    pub fn roaming(
        name: &str,
        credentials: Vec<Credentials>,
        aps: Vec<AccessPoint>,
        expected_ssid: &str,
    ) -> Self {
        Self {
            mode: Mode::Roaming,
            ..Self::selection(name, credentials, aps, expected_ssid)
        }
    }

    pub fn expecting(mut self, expect: Expectation) -> Self {
        self.expect = expect;
        self
    }

    /// Check the scenario against the number of AP interfaces available.
    pub fn validate(&self, ap_ifaces: usize) -> Result<()> {
        let invalid = |msg: String| Err(HarnessError::InvalidScenario(format!("{}: {msg}", self.name)));

        if self.credentials.is_empty() {
            return invalid("no credentials".into());
        }
        if self.aps.is_empty() {
            return invalid("no access points".into());
        }
        if self.aps.len() > ap_ifaces {
            return invalid(format!(
                "needs {} AP interfaces, only {ap_ifaces} available",
                self.aps.len()
            ));
        }
        let mut seen = FxHashSet::default();
        if let Some(dup) = self.aps.iter().find(|ap| !seen.insert(ap.ssid.as_str())) {
            return invalid(format!("SSID {} used twice", dup.ssid));
        }
        if self.expected_index().is_none() {
            return invalid(format!(
                "expected SSID {} is not among the access points",
                self.expected_ssid
            ));
        }
        Ok(())
    }

    pub fn expected_index(&self) -> Option<usize> {
        self.aps.iter().position(|ap| ap.ssid == self.expected_ssid)
    }

    /// Phases to run. Selection is one phase over every AP; roaming is one
    /// phase per AP, each expecting that AP.
    pub fn phases(&self) -> Vec<Phase> {
        match self.mode {
            Mode::Selection => self
                .expected_index()
                .map(|expected| Phase {
                    aps: (0..self.aps.len()).collect(),
                    expected,
                })
                .into_iter()
                .collect(),
            Mode::Roaming => (0..self.aps.len())
                .map(|idx| Phase {
                    aps: SmallVec::from_iter([idx]),
                    expected: idx,
                })
                .collect(),
        }
    }

    /// Give `tls` to every credential set that has no TLS material.
    pub fn apply_default_tls(&mut self, tls: &TlsMaterial) {
        for creds in self.credentials.iter_mut().filter(|c| c.tls.is_none()) {
            creds.tls = Some(tls.clone());
        }
    }
}

/// Check a whole table: scenario names must be unique and non-empty.
pub fn validate_table(table: &[Scenario]) -> Result<()> {
    let mut names = FxHashSet::default();
    for scenario in table {
        if scenario.name.is_empty() {
            return Err(HarnessError::InvalidScenario("unnamed scenario".into()));
        }
        if !names.insert(scenario.name.as_str()) {
            return Err(HarnessError::InvalidScenario(format!(
                "scenario {} listed twice",
                scenario.name
            )));
        }
    }
    Ok(())
}

/// Load a JSON table, i.e. an array of scenarios.
pub fn load_table(path: &Path) -> anyhow::Result<Vec<Scenario>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read scenario table {}", path.display()))?;
    let table: Vec<Scenario> = serde_json::from_str(&raw)
        .with_context(|| format!("parse scenario table {}", path.display()))?;
    validate_table(&table)?;
    Ok(table)
}

/// Keep only the scenarios named in `names`; all of them if `names` is empty.
pub fn filter_table(table: Vec<Scenario>, names: &[String]) -> Result<Vec<Scenario>> {
    if names.is_empty() {
        return Ok(table);
    }
    if let Some(unknown) = names.iter().find(|n| !table.iter().any(|s| &s.name == *n)) {
        return Err(HarnessError::InvalidScenario(format!(
            "unknown scenario {unknown}"
        )));
    }
    Ok(table
        .into_iter()
        .filter(|s| names.contains(&s.name))
        .collect())
}

fn passpoint_ap(ssid: &str, domain: &str, realms: &[&str], oi: Oi) -> AccessPoint {
    AccessPoint::new(ssid)
        .with_domain(domain)
        .with_realms(realms)
        .with_roaming_consortium(oi)
}

fn blue_ap() -> AccessPoint {
    passpoint_ap("passpoint-blue", BLUE_DOMAIN, &[BLUE_DOMAIN], HOME_OI)
}

fn green_ap(oi: Oi) -> AccessPoint {
    passpoint_ap("passpoint-green", GREEN_DOMAIN, &[GREEN_DOMAIN], oi)
}

/// The built-in table.
pub fn builtin_table() -> Vec<Scenario> {
    vec![
        Scenario::selection(
            "home_match_with_domain",
            vec![Credentials::new(BLUE_DOMAIN)],
            vec![blue_ap()],
            "passpoint-blue",
        ),
        Scenario::selection(
            "home_match_with_oi",
            vec![Credentials::new(BLUE_DOMAIN).with_home_ois(&[HOME_OI])],
            vec![green_ap(HOME_OI)],
            "passpoint-green",
        ),
        Scenario::selection(
            "home_match_with_required_oi",
            vec![Credentials::new(BLUE_DOMAIN).with_required_home_ois(&[HOME_OI])],
            vec![
                blue_ap(),
                AccessPoint::new("passpoint-another-blue")
                    .with_domain(BLUE_DOMAIN)
                    .with_realms(&[BLUE_DOMAIN]),
            ],
            "passpoint-blue",
        ),
        Scenario::selection(
            "roaming_match_with_domain",
            vec![Credentials::new(BLUE_DOMAIN)],
            vec![passpoint_ap(
                "passpoint-green",
                GREEN_DOMAIN,
                &[GREEN_DOMAIN, BLUE_DOMAIN],
                ROAMING_OI_1,
            )],
            "passpoint-green",
        ),
        Scenario::selection(
            "roaming_match_with_oi",
            vec![
                Credentials::new(BLUE_DOMAIN)
                    .with_home_ois(&[HOME_OI])
                    .with_roaming_ois(&[ROAMING_OI_1]),
            ],
            vec![green_ap(ROAMING_OI_1)],
            "passpoint-green",
        ),
        Scenario::selection(
            "home_over_roaming_ap",
            vec![
                Credentials::new(BLUE_DOMAIN)
                    .with_home_ois(&[HOME_OI])
                    .with_roaming_ois(&[ROAMING_OI_1]),
            ],
            vec![blue_ap(), green_ap(ROAMING_OI_1)],
            "passpoint-blue",
        ),
        Scenario::selection(
            "roaming_match_with_security",
            vec![Credentials::new(BLUE_DOMAIN).with_auth(Auth::Ttls)],
            vec![
                passpoint_ap("passpoint-ttls", BLUE_DOMAIN, &[BLUE_DOMAIN], ROAMING_OI_1),
                passpoint_ap("passpoint-tls", BLUE_DOMAIN, &[BLUE_DOMAIN], ROAMING_OI_2)
                    .with_auth(Auth::Tls),
            ],
            "passpoint-ttls",
        ),
        Scenario::selection(
            "two_home_credentials",
            vec![
                Credentials::new(BLUE_DOMAIN).with_home_ois(&[HOME_OI]),
                Credentials::new(RED_DOMAIN).with_home_ois(&[HOME_OI]),
            ],
            vec![blue_ap()],
            "passpoint-blue",
        ),
        Scenario::selection(
            "two_roaming_credentials",
            vec![
                Credentials::new(GREEN_DOMAIN)
                    .with_home_ois(&[ROAMING_OI_1])
                    .with_roaming_ois(&[HOME_OI]),
                Credentials::new(RED_DOMAIN)
                    .with_home_ois(&[ROAMING_OI_2])
                    .with_roaming_ois(&[HOME_OI]),
            ],
            vec![blue_ap()],
            "passpoint-blue",
        ),
        Scenario::selection(
            "home_over_roaming_credentials",
            vec![
                Credentials::new(BLUE_DOMAIN).with_home_ois(&[HOME_OI]),
                Credentials::new(RED_DOMAIN)
                    .with_home_ois(&[ROAMING_OI_2])
                    .with_roaming_ois(&[ROAMING_OI_1]),
            ],
            vec![blue_ap(), green_ap(ROAMING_OI_1)],
            "passpoint-blue",
        ),
        Scenario::roaming(
            "roaming_to_home",
            vec![
                Credentials::new(BLUE_DOMAIN)
                    .with_home_ois(&[HOME_OI])
                    .with_roaming_ois(&[ROAMING_OI_1, ROAMING_OI_2]),
            ],
            vec![
                AccessPoint::new("passpoint-green")
                    .with_realms(&[GREEN_DOMAIN])
                    .with_roaming_consortium(ROAMING_OI_1),
                AccessPoint::new("passpoint-blue")
                    .with_realms(&[BLUE_DOMAIN])
                    .with_roaming_consortium(HOME_OI),
            ],
            "passpoint-blue",
        ),
        Scenario::selection(
            "no_match",
            vec![Credentials::new(RED_DOMAIN)],
            vec![blue_ap()],
            "passpoint-blue",
        )
        .expecting(Expectation::Timeout),
    ]
}
