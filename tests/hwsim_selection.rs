//! Passpoint selection on mac80211_hwsim radios with hostapd and shill.
//!
//! Needs passwordless sudo, hostapd, the hwsim module and a running shill;
//! skipped otherwise.

mod common;

use hwsim_fabric::Hwsim;
use passpoint_harness::hostapd::{HostapdController, find_hostapd};
use passpoint_harness::scenario::{builtin_table, filter_table};
use passpoint_harness::shill::ShillManager;
use passpoint_harness::{ClientIface, RadioFabric, Runner};

#[tokio::test]
async fn test_home_over_roaming_on_real_radios() {
    if common::skip_without_deps() {
        return;
    }

    let hwsim = Hwsim::load(3).unwrap();
    let radios = hwsim.radios();
    let client = ClientIface::new(&radios[0].iface, radios[0].mac.parse().unwrap());
    let fabric = RadioFabric::new(
        vec![client],
        radios[1..].iter().map(|r| r.iface.clone()).collect(),
    )
    .unwrap();

    let mut config = common::radio_config();
    config.hostapd.binary = find_hostapd().unwrap();
    let nm = ShillManager::connect().await.unwrap();
    let controller = HostapdController::new(config.hostapd.clone());
    let dir = tempfile::tempdir().unwrap();

    let table = filter_table(
        builtin_table(),
        &[
            "home_match_with_domain".to_string(),
            "home_over_roaming_ap".to_string(),
        ],
    )
    .unwrap();
    let report = Runner::new(&nm, &controller, &config, &fabric, dir.path())
        .run_table(&table)
        .await;
    for scenario in &report.scenarios {
        assert!(scenario.passed, "{}: {:?}", scenario.name, scenario.error);
    }
}
