#![cfg(test)]

use std::path::Path;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::time::{Duration, Instant};

use crate::controller::{ApController, ApInstance, ControlChannel, ControlEvent};
use crate::error::HarnessError;
use crate::fabric::MacAddr;
use crate::monitor::{AssociationKind, AssociationMonitor};
use crate::sim::SimulatedAir;
use crate::test_helpers::{SIM_CLIENT, SIM_CLIENT_MAC, blue_ap, green_ap, sim_fabric};

const OTHER_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x99]);

struct Fixture {
    blue: ApInstance,
    green: ApInstance,
    blue_tx: UnboundedSender<String>,
    green_tx: UnboundedSender<String>,
    monitor: AssociationMonitor,
}

fn fixture() -> Fixture {
    let blue = ApInstance::new(&blue_ap(), "sim-ap0", Path::new("/tmp"));
    let green = ApInstance::new(&green_ap(), "sim-ap1", Path::new("/tmp"));
    let (blue_tx, blue_rx) = unbounded_channel();
    let (green_tx, green_rx) = unbounded_channel();

    let mut clients = FxHashMap::default();
    clients.insert(SIM_CLIENT_MAC, SIM_CLIENT.to_string());
    let monitor = AssociationMonitor::from_channels(
        vec![
            (ControlChannel::new(blue.id(), blue_rx), blue.ssid().to_string()),
            (ControlChannel::new(green.id(), green_rx), green.ssid().to_string()),
        ],
        clients,
    );
    Fixture {
        blue,
        green,
        blue_tx,
        green_tx,
        monitor,
    }
}

fn connected(mac: MacAddr, iface: &str) -> String {
    ControlEvent::StaConnected(mac).to_line(iface)
}

fn disconnected(mac: MacAddr, iface: &str) -> String {
    ControlEvent::StaDisconnected(mac).to_line(iface)
}

fn soon() -> Instant {
    Instant::now() + Duration::from_secs(2)
}

#[tokio::test]
async fn test_wait_associated_on_expected_ap() {
    let mut f = fixture();
    f.blue_tx.send("sim-ap0: AP-ENABLED".into()).unwrap();
    f.blue_tx.send(connected(SIM_CLIENT_MAC, "sim-ap0")).unwrap();

    let event = f
        .monitor
        .wait_associated_on(&f.blue, SIM_CLIENT, soon())
        .await
        .unwrap();
    assert_eq!(event.instance, f.blue.id());
    assert_eq!(event.ssid, "passpoint-blue");
    assert_eq!(event.kind, AssociationKind::Associated);
    assert_eq!(event.client_iface.as_deref(), Some(SIM_CLIENT));
}

#[tokio::test]
async fn test_wrong_ap_is_reported() {
    let mut f = fixture();
    f.green_tx.send(connected(SIM_CLIENT_MAC, "sim-ap1")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    f.blue_tx.send(connected(SIM_CLIENT_MAC, "sim-ap0")).unwrap();

    // The green association arrived first and must fail the wait, even
    // though the expected AP follows.
    match f.monitor.wait_associated_on(&f.blue, SIM_CLIENT, soon()).await {
        Err(HarnessError::WrongAp {
            client,
            expected,
            actual,
        }) => {
            assert_eq!(client, SIM_CLIENT);
            assert_eq!(expected, "passpoint-blue");
            assert_eq!(actual, "passpoint-green");
        }
        other => panic!("expected WrongAp, got {other:?}"),
    }
}

#[tokio::test]
async fn test_foreign_stations_are_ignored() {
    let mut f = fixture();
    f.green_tx.send(connected(OTHER_MAC, "sim-ap1")).unwrap();
    f.green_tx.send(disconnected(SIM_CLIENT_MAC, "sim-ap1")).unwrap();
    f.blue_tx.send("sim-ap0: CTRL-EVENT-EAP-STARTED".into()).unwrap();
    f.blue_tx.send(connected(SIM_CLIENT_MAC, "sim-ap0")).unwrap();

    let event = f
        .monitor
        .wait_associated_on(&f.blue, SIM_CLIENT, soon())
        .await
        .unwrap();
    assert_eq!(event.ssid, "passpoint-blue");
}

#[tokio::test]
async fn test_wait_associated_any_ap() {
    let mut f = fixture();
    f.green_tx.send(connected(SIM_CLIENT_MAC, "sim-ap1")).unwrap();

    let event = f.monitor.wait_associated(SIM_CLIENT, soon()).await.unwrap();
    assert_eq!(event.instance, f.green.id());
}

#[tokio::test]
async fn test_wait_disassociated() {
    let mut f = fixture();
    f.blue_tx.send(connected(SIM_CLIENT_MAC, "sim-ap0")).unwrap();
    f.blue_tx.send(disconnected(SIM_CLIENT_MAC, "sim-ap0")).unwrap();

    let event = f.monitor.wait_disassociated(SIM_CLIENT, soon()).await.unwrap();
    assert_eq!(event.kind, AssociationKind::Disassociated);
    assert_eq!(event.instance, f.blue.id());
}

#[tokio::test]
async fn test_per_ap_order_is_kept() {
    let mut f = fixture();
    f.blue_tx.send(connected(SIM_CLIENT_MAC, "sim-ap0")).unwrap();
    f.blue_tx.send(disconnected(SIM_CLIENT_MAC, "sim-ap0")).unwrap();

    let first = f.monitor.wait_associated(SIM_CLIENT, soon()).await.unwrap();
    let second = f.monitor.wait_disassociated(SIM_CLIENT, soon()).await.unwrap();
    assert!(first.at <= second.at);
}

#[tokio::test]
async fn test_deadline_gives_timeout() {
    let mut f = fixture();
    let started = Instant::now();
    let result = f
        .monitor
        .wait_associated_on(&f.blue, SIM_CLIENT, started + Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(HarnessError::Timeout(_))));
    assert!(started.elapsed() >= Duration::from_millis(100));
    // Keep the senders alive until after the wait.
    drop(f.blue_tx);
    drop(f.green_tx);
}

#[tokio::test]
async fn test_closed_channels_end_the_wait_early() {
    let Fixture {
        blue,
        blue_tx,
        green_tx,
        mut monitor,
        ..
    } = fixture();
    drop(blue_tx);
    drop(green_tx);

    let started = Instant::now();
    let result = monitor
        .wait_associated_on(&blue, SIM_CLIENT, started + Duration::from_secs(10))
        .await;
    match result {
        Err(HarnessError::Timeout(msg)) => assert!(msg.contains("closed")),
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stop_discards_events() {
    let mut f = fixture();
    f.monitor.stop();
    let _ = f.blue_tx.send(connected(SIM_CLIENT_MAC, "sim-ap0"));

    let result = f.monitor.wait_associated(SIM_CLIENT, soon()).await;
    assert!(matches!(result, Err(HarnessError::Timeout(_))));
}

#[tokio::test]
async fn test_start_takes_control_channels() {
    let fabric = sim_fabric(2);
    let air = SimulatedAir::new(&fabric);
    let dir = tempfile::tempdir().unwrap();

    let mut blue = air.configure(&blue_ap(), "sim-ap0", dir.path()).await.unwrap();
    air.start(&mut blue).await.unwrap();

    let monitor = AssociationMonitor::start(&air, &[&blue], &fabric).unwrap();
    assert_eq!(monitor.watched().collect::<Vec<_>>(), vec!["passpoint-blue"]);

    // A second monitor cannot take the same channel.
    assert!(matches!(
        AssociationMonitor::start(&air, &[&blue], &fabric),
        Err(HarnessError::NotStarted(_))
    ));

    let idle = air.configure(&green_ap(), "sim-ap1", dir.path()).await.unwrap();
    assert!(matches!(
        AssociationMonitor::start(&air, &[&idle], &fabric),
        Err(HarnessError::NotStarted(_))
    ));

    drop(monitor);
    air.stop(&mut blue).await.unwrap();
}
