//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::time::Duration;

use hwsim_fabric::check_hwsim_deps;
use passpoint_harness::HarnessConfig;

/// Check all real-radio test dependencies. Returns `true` if tests should
/// be skipped (prints the reason to stderr). Use at the top of every test.
pub fn skip_without_deps() -> bool {
    match check_hwsim_deps() {
        Ok(()) => false,
        Err(reason) => {
            eprintln!("Skipping: {reason}");
            true
        }
    }
}

/// Timeouts for real radios: hostapd start and EAP take a few seconds.
pub fn radio_config() -> HarnessConfig {
    HarnessConfig {
        scenario_timeout: Duration::from_secs(90),
        association_timeout: Duration::from_secs(45),
        ..Default::default()
    }
}
