//! Harness configuration.
//!
//! Timeouts, the profile used for provisioning, and the settings the
//! hostapd controller needs. Built from CLI flags by the runner binary, or
//! from `Default` in library use and tests.

use std::path::PathBuf;
use std::time::Duration;

use crate::access_point::DEFAULT_CHANNEL;
use crate::credentials::TlsMaterial;

/// Overall budget for one scenario, cleanup included.
pub const DEFAULT_SCENARIO_TIMEOUT: Duration = Duration::from_secs(60);
/// How long to wait for the expected association in each phase.
pub const DEFAULT_ASSOCIATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Part of the scenario budget kept back for teardown.
pub const DEFAULT_CLEANUP_RESERVE: Duration = Duration::from_secs(5);
/// How long an AP may take to start beaconing.
pub const DEFAULT_AP_START_TIMEOUT: Duration = Duration::from_secs(10);
/// Shill user profile dedicated to the harness.
pub const DEFAULT_PROFILE_NAME: &str = "~passpoint/test";

pub const DEFAULT_EAP_IDENTITY: &str = "test-user";
pub const DEFAULT_EAP_PASSWORD: &str = "test-password";

/// Settings for spawning hostapd.
#[derive(Clone, Debug)]
pub struct HostapdSettings {
    pub binary: PathBuf,
    /// EAP user database. Generated from `eap_identity`/`eap_password` when
    /// unset.
    pub eap_user_file: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
    pub server_cert: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub eap_identity: String,
    pub eap_password: String,
    pub channel: u8,
    pub start_timeout: Duration,
}

impl Default for HostapdSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("hostapd"),
            eap_user_file: None,
            ca_cert: None,
            server_cert: None,
            private_key: None,
            eap_identity: DEFAULT_EAP_IDENTITY.to_string(),
            eap_password: DEFAULT_EAP_PASSWORD.to_string(),
            channel: DEFAULT_CHANNEL,
            start_timeout: DEFAULT_AP_START_TIMEOUT,
        }
    }
}

impl HostapdSettings {
    /// Contents of a generated EAP user database.
    ///
    /// Phase 1 accepts TTLS and TLS for any identity; phase 2 checks the
    /// MSCHAPv2 password of the configured user.
    pub fn eap_users(&self) -> String {
        format!(
            "* TTLS,TLS\n\"{}\" TTLS-MSCHAPV2 \"{}\" [2]\n",
            self.eap_identity, self.eap_password
        )
    }
}

#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub scenario_timeout: Duration,
    pub association_timeout: Duration,
    pub cleanup_reserve: Duration,
    pub profile_name: String,
    pub hostapd: HostapdSettings,
    /// TLS material applied to credentials that carry none.
    pub default_tls: Option<TlsMaterial>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            scenario_timeout: DEFAULT_SCENARIO_TIMEOUT,
            association_timeout: DEFAULT_ASSOCIATION_TIMEOUT,
            cleanup_reserve: DEFAULT_CLEANUP_RESERVE,
            profile_name: DEFAULT_PROFILE_NAME.to_string(),
            hostapd: HostapdSettings::default(),
            default_tls: None,
        }
    }
}

impl HarnessConfig {
    /// Create config from CLI arguments.
    ///
    /// The cleanup reserve is capped to half the scenario timeout so a short
    /// scenario budget still leaves time for the phases.
    pub fn from_cli(
        scenario_timeout_secs: u64,
        association_timeout_secs: u64,
        profile_name: &str,
        hostapd: HostapdSettings,
        default_tls: Option<TlsMaterial>,
    ) -> Self {
        let scenario_timeout = Duration::from_secs(scenario_timeout_secs);
        Self {
            scenario_timeout,
            association_timeout: Duration::from_secs(association_timeout_secs),
            cleanup_reserve: DEFAULT_CLEANUP_RESERVE.min(scenario_timeout / 2),
            profile_name: profile_name.to_string(),
            hostapd,
            default_tls,
        }
    }

    /// Budget available to the phases once the cleanup reserve is set aside.
    pub fn work_budget(&self) -> Duration {
        self.scenario_timeout.saturating_sub(self.cleanup_reserve)
    }
}
