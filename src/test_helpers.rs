#![cfg(any(test, feature = "test-internals"))]
#![allow(dead_code)] // Allow unused helpers - they're used by library tests but not binary tests

use std::time::Duration;

use crate::access_point::AccessPoint;
use crate::config::HarnessConfig;
use crate::credentials::Credentials;
use crate::fabric::{ClientIface, MacAddr, RadioFabric};
use crate::scenario::{BLUE_DOMAIN, GREEN_DOMAIN, HOME_OI, ROAMING_OI_1};

pub const SIM_CLIENT: &str = "sim-client0";
pub const SIM_CLIENT_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0]);

/// Fabric with one client `sim-client0` and `aps` AP interfaces named
/// `sim-ap0`, `sim-ap1`, ...
pub fn sim_fabric(aps: usize) -> RadioFabric {
    RadioFabric::new(
        vec![ClientIface::new(SIM_CLIENT, SIM_CLIENT_MAC)],
        (0..aps).map(|i| format!("sim-ap{i}")).collect(),
    )
    .unwrap()
}

/// Home AP of `blue.example`: domain, realm and the home OI.
pub fn blue_ap() -> AccessPoint {
    AccessPoint::new("passpoint-blue")
        .with_domain(BLUE_DOMAIN)
        .with_realms(&[BLUE_DOMAIN])
        .with_roaming_consortium(HOME_OI)
}

/// Roaming partner AP advertising the first roaming OI.
pub fn green_ap() -> AccessPoint {
    AccessPoint::new("passpoint-green")
        .with_domain(GREEN_DOMAIN)
        .with_realms(&[GREEN_DOMAIN])
        .with_roaming_consortium(ROAMING_OI_1)
}

pub fn blue_credentials() -> Credentials {
    Credentials::new(BLUE_DOMAIN)
        .with_home_ois(&[HOME_OI])
        .with_roaming_ois(&[ROAMING_OI_1])
}

/// Short timeouts for runs against the simulated air.
pub fn fast_config() -> HarnessConfig {
    HarnessConfig {
        scenario_timeout: Duration::from_secs(5),
        association_timeout: Duration::from_millis(500),
        cleanup_reserve: Duration::from_secs(1),
        ..Default::default()
    }
}
