//! Association monitor.
//!
//! One reader task per AP drains its control channel into a single merged
//! channel, tagging each event with the originating instance. Per-AP order
//! is the control-channel order; across APs it is arrival order.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace};

use crate::controller::{ApController, ApInstance, ControlChannel, ControlEvent, InstanceId};
use crate::error::{HarnessError, Result};
use crate::fabric::{MacAddr, RadioFabric};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AssociationKind {
    Associated,
    Disassociated,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociationEvent {
    /// Client interface owning the station MAC, if it is one of ours.
    pub client_iface: Option<String>,
    pub mac: MacAddr,
    pub instance: InstanceId,
    pub ssid: String,
    pub kind: AssociationKind,
    pub at: Instant,
}

impl AssociationEvent {
    fn is(&self, kind: AssociationKind, client_iface: &str) -> bool {
        self.kind == kind && self.client_iface.as_deref() == Some(client_iface)
    }
}

struct ReaderHandle {
    handle: JoinHandle<()>,
}

type ClientMacs = Arc<FxHashMap<MacAddr, String>>;

fn spawn_reader(
    mut channel: ControlChannel,
    ssid: String,
    clients: ClientMacs,
    event_tx: UnboundedSender<AssociationEvent>,
) -> ReaderHandle {
    let handle = tokio::spawn(async move {
        let instance = channel.instance();
        while let Some(event) = channel.next_event().await {
            let (kind, mac) = match event {
                ControlEvent::StaConnected(mac) => (AssociationKind::Associated, mac),
                ControlEvent::StaDisconnected(mac) => (AssociationKind::Disassociated, mac),
            };
            let client_iface = clients.get(&mac).cloned();
            trace!(ssid = %ssid, %mac, ?kind, ?client_iface, "station event");
            let event = AssociationEvent {
                client_iface,
                mac,
                instance,
                ssid: ssid.clone(),
                kind,
                at: Instant::now(),
            };
            if event_tx.send(event).is_err() {
                return; // Monitor stopped
            }
        }
        debug!(ssid = %ssid, "control channel ended");
    });
    ReaderHandle { handle }
}

pub struct AssociationMonitor {
    events: UnboundedReceiver<AssociationEvent>,
    readers: SmallVec<ReaderHandle, 4>,
    ssids: FxHashMap<InstanceId, String>,
}

impl AssociationMonitor {
    /// Start draining the control channels of `instances`.
    ///
    /// Takes each instance's control channel, so an instance can be watched
    /// by at most one monitor.
    pub fn start(
        controller: &dyn ApController,
        instances: &[&ApInstance],
        fabric: &RadioFabric,
    ) -> Result<Self> {
        let mut channels = Vec::with_capacity(instances.len());
        for inst in instances {
            channels.push((controller.control_channel(inst)?, inst.ssid().to_string()));
        }
        let clients = fabric
            .clients()
            .iter()
            .filter_map(|c| {
                fabric
                    .client_for_mac(&c.mac)
                    .map(|name| (c.mac, name.to_string()))
            })
            .collect();
        Ok(Self::from_channels(channels, clients))
    }

    /// Start from already-taken channels. `clients` maps station MACs to
    /// client interface names.
    pub fn from_channels(
        channels: Vec<(ControlChannel, String)>,
        clients: FxHashMap<MacAddr, String>,
    ) -> Self {
        let clients = Arc::new(clients);
        let (event_tx, events) = unbounded_channel();
        let mut readers = SmallVec::new();
        let mut ssids = FxHashMap::default();
        for (channel, ssid) in channels {
            ssids.insert(channel.instance(), ssid.clone());
            readers.push(spawn_reader(channel, ssid, clients.clone(), event_tx.clone()));
        }
        Self {
            events,
            readers,
            ssids,
        }
    }

    /// First `Associated` event on `client_iface`, on any AP.
    pub async fn wait_associated(
        &mut self,
        client_iface: &str,
        deadline: Instant,
    ) -> Result<AssociationEvent> {
        let what = format!("{client_iface} to associate");
        loop {
            let event = self.next_event(deadline, &what).await?;
            if event.is(AssociationKind::Associated, client_iface) {
                return Ok(event);
            }
        }
    }

    /// Succeeds only if the first `Associated` event on `client_iface` is on
    /// `instance`. An association elsewhere is a `WrongAp` failure.
    pub async fn wait_associated_on(
        &mut self,
        instance: &ApInstance,
        client_iface: &str,
        deadline: Instant,
    ) -> Result<AssociationEvent> {
        let what = format!("{client_iface} to associate with {}", instance.ssid());
        loop {
            let event = self.next_event(deadline, &what).await?;
            if !event.is(AssociationKind::Associated, client_iface) {
                continue;
            }
            if event.instance != instance.id() {
                return Err(HarnessError::WrongAp {
                    client: client_iface.to_string(),
                    expected: instance.ssid().to_string(),
                    actual: event.ssid,
                });
            }
            return Ok(event);
        }
    }

    /// First `Disassociated` event on `client_iface`, on any AP.
    pub async fn wait_disassociated(
        &mut self,
        client_iface: &str,
        deadline: Instant,
    ) -> Result<AssociationEvent> {
        let what = format!("{client_iface} to disassociate");
        loop {
            let event = self.next_event(deadline, &what).await?;
            if event.is(AssociationKind::Disassociated, client_iface) {
                return Ok(event);
            }
        }
    }

    /// SSIDs of the watched instances.
    pub fn watched(&self) -> impl Iterator<Item = &str> {
        self.ssids.values().map(String::as_str)
    }

    /// Stop all readers. Pending events are discarded.
    pub fn stop(&mut self) {
        for reader in self.readers.drain(..) {
            reader.handle.abort();
        }
        self.events.close();
    }

    async fn next_event(&mut self, deadline: Instant, what: &str) -> Result<AssociationEvent> {
        match timeout_at(deadline, self.events.recv()).await {
            Ok(Some(event)) => Ok(event),
            // Every control channel ended; nothing can arrive any more.
            Ok(None) => Err(HarnessError::Timeout(format!(
                "{what} (all control channels closed)"
            ))),
            Err(_) => Err(HarnessError::Timeout(what.to_string())),
        }
    }
}

impl Drop for AssociationMonitor {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.handle.abort();
        }
    }
}
