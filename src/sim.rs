//! Simulated air.
//!
//! A deterministic in-memory backend implementing both the AP controller
//! and the network-manager facade over shared state. On a scan it picks an
//! AP with the Passpoint ranking in [`crate::selection`] and reports the
//! association on that AP's control channel, exactly as hostapd would.
//! Faults can be injected to exercise the driver's error paths.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};

use crate::access_point::AccessPoint;
use crate::controller::{
    ApController, ApInstance, ApState, Bindings, ControlChannel, ControlEvent, InstanceId,
};
use crate::credentials::Credentials;
use crate::error::{HarnessError, Result};
use crate::fabric::{ClientIface, RadioFabric};
use crate::network_manager::{NetworkManager, Profile};
use crate::selection;

/// Faults to inject into the simulated air.
#[derive(Clone, Debug, Default)]
pub struct SimFaults {
    /// SSIDs whose authenticator fails to come up.
    pub fail_start: FxHashSet<String>,
    /// Time every AP start takes.
    pub start_delay: Duration,
    /// Time every AP stop takes.
    pub stop_delay: Duration,
    /// Every facade call fails with a transport error.
    pub transport_failure: bool,
    /// The facade refuses credentials at runtime.
    pub reject_credentials: bool,
    /// Associate with this SSID on scan, whatever the ranking says.
    pub forced_association: Option<String>,
}

struct RunningAp {
    ap: AccessPoint,
    iface: String,
    order: u64,
    lines: UnboundedSender<String>,
    channel: Option<UnboundedReceiver<String>>,
}

struct SimProfile {
    name: String,
    credentials: Vec<Credentials>,
}

#[derive(Default)]
struct AirState {
    faults: SimFaults,
    profiles: Vec<SimProfile>,
    interworking: FxHashMap<String, bool>,
    running: FxHashMap<InstanceId, RunningAp>,
    /// Client interface to the instance it is associated with.
    associations: FxHashMap<String, InstanceId>,
    next_order: u64,
    starts: FxHashMap<String, usize>,
    stops: FxHashMap<String, usize>,
    history: Vec<(String, String)>,
}

impl AirState {
    fn check_transport(&self) -> Result<()> {
        if self.faults.transport_failure {
            return Err(HarnessError::Transport("simulated transport failure".into()));
        }
        Ok(())
    }

    fn disassociate(&mut self, client: &ClientIface) {
        let Some(id) = self.associations.remove(&client.name) else {
            return;
        };
        if let Some(running) = self.running.get(&id) {
            let line = ControlEvent::StaDisconnected(client.mac).to_line(&running.iface);
            let _ = running.lines.send(line);
        }
    }
}

pub struct SimulatedAir {
    clients: Vec<ClientIface>,
    bindings: Bindings,
    state: Mutex<AirState>,
}

impl SimulatedAir {
    pub fn new(fabric: &RadioFabric) -> Self {
        Self {
            clients: fabric.clients().to_vec(),
            bindings: Bindings::default(),
            state: Mutex::new(AirState::default()),
        }
    }

    pub fn with_faults(self, faults: SimFaults) -> Self {
        self.set_faults(faults);
        self
    }

    pub fn set_faults(&self, faults: SimFaults) {
        self.lock().faults = faults;
    }

    /// Names of the existing profiles.
    pub fn profiles(&self) -> Vec<String> {
        self.lock().profiles.iter().map(|p| p.name.clone()).collect()
    }

    pub fn interworking_enabled(&self, client_iface: &str) -> bool {
        self.lock()
            .interworking
            .get(client_iface)
            .copied()
            .unwrap_or(false)
    }

    /// SSIDs currently beaconing, in start order.
    pub fn running_ssids(&self) -> Vec<String> {
        let state = self.lock();
        let mut running: Vec<_> = state.running.values().collect();
        running.sort_by_key(|r| r.order);
        running.iter().map(|r| r.ap.ssid.clone()).collect()
    }

    pub fn start_count(&self, ssid: &str) -> usize {
        self.lock().starts.get(ssid).copied().unwrap_or(0)
    }

    pub fn stop_count(&self, ssid: &str) -> usize {
        self.lock().stops.get(ssid).copied().unwrap_or(0)
    }

    /// Every association so far as `(client iface, ssid)`.
    pub fn history(&self) -> Vec<(String, String)> {
        self.lock().history.clone()
    }

    pub fn is_iface_busy(&self, iface: &str) -> bool {
        self.bindings.is_busy(iface)
    }

    fn client(&self, iface: &str) -> Result<&ClientIface> {
        self.clients
            .iter()
            .find(|c| c.name == iface)
            .ok_or_else(|| HarnessError::Transport(format!("no wifi device for {iface}")))
    }

    fn lock(&self) -> MutexGuard<'_, AirState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ApController for SimulatedAir {
    async fn configure(&self, ap: &AccessPoint, iface: &str, log_dir: &Path) -> Result<ApInstance> {
        self.bindings.configure(ap, iface, log_dir)
    }

    async fn start(&self, instance: &mut ApInstance) -> Result<()> {
        self.bindings.claim(instance)?;

        let (delay, fail) = {
            let state = self.lock();
            (
                state.faults.start_delay,
                state.faults.fail_start.contains(instance.ssid()),
            )
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            self.bindings.release_iface(instance);
            return Err(HarnessError::StartFailed {
                ssid: instance.ssid().into(),
                reason: "Interface initialization failed".into(),
            });
        }

        // Log content is for humans only.
        let log = serde_json::to_string_pretty(instance.descriptor()).unwrap_or_default();
        if let Err(err) = tokio::fs::write(instance.log_path(), log).await {
            warn!(ssid = instance.ssid(), "cannot write AP log: {}", err);
        }

        let (lines, channel) = unbounded_channel();
        let _ = lines.send(format!("{}: AP-ENABLED", instance.iface()));
        {
            let mut state = self.lock();
            let order = state.next_order;
            state.next_order += 1;
            *state.starts.entry(instance.ssid().to_string()).or_default() += 1;
            state.running.insert(
                instance.id(),
                RunningAp {
                    ap: instance.descriptor().clone(),
                    iface: instance.iface().to_string(),
                    order,
                    lines,
                    channel: Some(channel),
                },
            );
        }
        instance.set_state(ApState::Started);
        debug!(ssid = instance.ssid(), iface = instance.iface(), "simulated AP started");
        Ok(())
    }

    async fn stop(&self, instance: &mut ApInstance) -> Result<()> {
        let delay = self.lock().faults.stop_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        {
            let mut state = self.lock();
            if let Some(running) = state.running.remove(&instance.id()) {
                let gone: Vec<String> = state
                    .associations
                    .iter()
                    .filter(|(_, id)| **id == instance.id())
                    .map(|(client, _)| client.clone())
                    .collect();
                for name in gone {
                    state.associations.remove(&name);
                    if let Some(client) = self.clients.iter().find(|c| c.name == name) {
                        let line = ControlEvent::StaDisconnected(client.mac).to_line(&running.iface);
                        let _ = running.lines.send(line);
                    }
                }
                *state.stops.entry(instance.ssid().to_string()).or_default() += 1;
                debug!(ssid = instance.ssid(), "simulated AP stopped");
            }
        }
        self.bindings.release(instance);
        instance.set_state(ApState::Stopped);
        Ok(())
    }

    fn control_channel(&self, instance: &ApInstance) -> Result<ControlChannel> {
        let mut state = self.lock();
        state
            .running
            .get_mut(&instance.id())
            .and_then(|r| r.channel.take())
            .map(|lines| ControlChannel::new(instance.id(), lines))
            .ok_or_else(|| HarnessError::NotStarted(instance.ssid().into()))
    }
}

#[async_trait]
impl NetworkManager for SimulatedAir {
    async fn create_profile(&self, name: &str) -> Result<Profile> {
        let mut state = self.lock();
        state.check_transport()?;
        if state.profiles.iter().any(|p| p.name == name) {
            return Err(HarnessError::ProfileExists(name.into()));
        }
        state.profiles.push(SimProfile {
            name: name.to_string(),
            credentials: Vec::new(),
        });
        Ok(Profile {
            name: name.to_string(),
            path: format!("/profile/{}", state.profiles.len() - 1),
        })
    }

    async fn remove_profile(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.check_transport()?;
        let idx = state
            .profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| HarnessError::ProfileMissing(name.into()))?;
        state.profiles.remove(idx);
        Ok(())
    }

    async fn add_credentials(&self, profile: &Profile, creds: &Credentials) -> Result<()> {
        let mut state = self.lock();
        state.check_transport()?;
        creds.validate()?;
        if state.faults.reject_credentials {
            return Err(HarnessError::ProvisionFailed(format!(
                "credentials for {} refused",
                creds.domain
            )));
        }
        let target = state
            .profiles
            .iter_mut()
            .find(|p| p.name == profile.name)
            .ok_or_else(|| {
                HarnessError::ProvisionFailed(format!("profile {} does not exist", profile.name))
            })?;
        target.credentials.push(creds.clone());
        Ok(())
    }

    async fn set_interworking_select(&self, client_iface: &str, enabled: bool) -> Result<()> {
        self.client(client_iface)?;
        let mut state = self.lock();
        state.check_transport()?;
        state.interworking.insert(client_iface.to_string(), enabled);
        Ok(())
    }

    async fn request_scan(&self, client_iface: &str) -> Result<()> {
        let client = self.client(client_iface)?;
        let mut state = self.lock();
        state.check_transport()?;

        if !state.interworking.get(client_iface).copied().unwrap_or(false) {
            debug!(iface = client_iface, "interworking select off, scan has no effect");
            return Ok(());
        }
        if let Some(current) = state.associations.get(client_iface)
            && state.running.contains_key(current)
        {
            return Ok(());
        }

        let mut candidates: Vec<(InstanceId, &RunningAp)> =
            state.running.iter().map(|(id, r)| (*id, r)).collect();
        candidates.sort_by_key(|(_, r)| r.order);

        let chosen = match &state.faults.forced_association {
            Some(ssid) => candidates.iter().position(|(_, r)| &r.ap.ssid == ssid),
            None => {
                let credentials: Vec<Credentials> = state
                    .profiles
                    .iter()
                    .flat_map(|p| p.credentials.iter().cloned())
                    .collect();
                selection::select(&credentials, candidates.iter().map(|(_, r)| &r.ap))
            }
        };
        let Some((id, ssid)) = chosen.map(|idx| (candidates[idx].0, candidates[idx].1.ap.ssid.clone()))
        else {
            debug!(iface = client_iface, "no matching access point");
            return Ok(());
        };

        state.disassociate(client);
        if let Some(running) = state.running.get(&id) {
            let line = ControlEvent::StaConnected(client.mac).to_line(&running.iface);
            let _ = running.lines.send(line);
        }
        state.associations.insert(client_iface.to_string(), id);
        state.history.push((client_iface.to_string(), ssid.clone()));
        info!(iface = client_iface, ssid = %ssid, "simulated association");
        Ok(())
    }
}
