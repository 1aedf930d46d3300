//! AP controller capability.
//!
//! An [`ApInstance`] pairs one descriptor with one AP interface and moves
//! through `Created -> Started -> Stopped`. Controllers own whatever runs
//! behind an instance; the instance itself is a plain handle owned by the
//! driver.

use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::access_point::AccessPoint;
use crate::error::{HarnessError, Result};
use crate::fabric::MacAddr;
use crate::utils::sanitize_file_name;

pub type InstanceId = u64;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// File name stem for an SSID's hostapd files.
///
/// SSIDs that are not already safe file names get a hash of the raw SSID
/// appended, so `"pp blue"` and `"pp_blue"` never share files.
pub fn file_stem(ssid: &str) -> String {
    let safe = sanitize_file_name(ssid);
    if safe == ssid {
        return format!("hostapd-{safe}");
    }
    let mut hasher = FxHasher::default();
    hasher.write(ssid.as_bytes());
    format!("hostapd-{safe}-{:08x}", hasher.finish() as u32)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApState {
    Created,
    Started,
    Stopped,
}

/// Handle to one configured access point.
#[derive(Debug)]
pub struct ApInstance {
    id: InstanceId,
    ap: AccessPoint,
    iface: String,
    file_stem: String,
    log_path: PathBuf,
    state: ApState,
}

impl ApInstance {
    /// New idle instance. Log output goes to `<log_dir>/hostapd-<ssid>.log`.
    pub fn new(ap: &AccessPoint, iface: &str, log_dir: &Path) -> Self {
        let file_stem = file_stem(&ap.ssid);
        Self {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            ap: ap.clone(),
            iface: iface.to_string(),
            log_path: log_dir.join(format!("{file_stem}.log")),
            file_stem,
            state: ApState::Created,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn ssid(&self) -> &str {
        &self.ap.ssid
    }

    pub fn descriptor(&self) -> &AccessPoint {
        &self.ap
    }

    pub fn iface(&self) -> &str {
        &self.iface
    }

    /// Stem shared by every file written for this instance.
    pub fn file_stem(&self) -> &str {
        &self.file_stem
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn state(&self) -> ApState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == ApState::Started
    }

    pub(crate) fn set_state(&mut self, state: ApState) {
        self.state = state;
    }
}

/// Event parsed from an AP control line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    StaConnected(MacAddr),
    StaDisconnected(MacAddr),
}

pub const STA_CONNECTED: &str = "AP-STA-CONNECTED";
pub const STA_DISCONNECTED: &str = "AP-STA-DISCONNECTED";

impl ControlEvent {
    /// Parse a control line such as `wlan1: AP-STA-CONNECTED 02:00:00:00:00:00`.
    /// Lines that are not station events yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            let ctor: fn(MacAddr) -> Self = match token {
                STA_CONNECTED => ControlEvent::StaConnected,
                STA_DISCONNECTED => ControlEvent::StaDisconnected,
                _ => continue,
            };
            return tokens.next()?.parse().ok().map(ctor);
        }
        None
    }

    /// Line in the format hostapd prints.
    pub fn to_line(&self, iface: &str) -> String {
        match self {
            ControlEvent::StaConnected(mac) => format!("{iface}: {STA_CONNECTED} {mac}"),
            ControlEvent::StaDisconnected(mac) => format!("{iface}: {STA_DISCONNECTED} {mac}"),
        }
    }
}

/// Finite, non-restartable stream of raw control lines from one instance.
///
/// Ends when the instance stops.
#[derive(Debug)]
pub struct ControlChannel {
    instance: InstanceId,
    lines: UnboundedReceiver<String>,
}

impl ControlChannel {
    pub fn new(instance: InstanceId, lines: UnboundedReceiver<String>) -> Self {
        Self { instance, lines }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Next station event, skipping other lines.
    pub async fn next_event(&mut self) -> Option<ControlEvent> {
        while let Some(line) = self.next_line().await {
            if let Some(event) = ControlEvent::parse(&line) {
                return Some(event);
            }
        }
        None
    }
}

/// Starts and stops beaconing access points.
#[async_trait]
pub trait ApController: Send + Sync {
    /// Bind `ap` to `iface`. Fails with `InvalidDescriptor` on an invalid
    /// descriptor or an SSID already bound by a live instance.
    async fn configure(&self, ap: &AccessPoint, iface: &str, log_dir: &Path) -> Result<ApInstance>;

    /// Bring up the authenticator and return once it beacons.
    async fn start(&self, instance: &mut ApInstance) -> Result<()>;

    /// Stop beaconing and release the interface and SSID. Safe on instances
    /// that never started.
    async fn stop(&self, instance: &mut ApInstance) -> Result<()>;

    /// Take the control channel of a started instance. Only once.
    fn control_channel(&self, instance: &ApInstance) -> Result<ControlChannel>;
}

/// Bookkeeping shared by controllers: bound SSIDs and busy interfaces.
#[derive(Debug, Default)]
pub struct Bindings {
    inner: Mutex<BindingsInner>,
}

#[derive(Debug, Default)]
struct BindingsInner {
    ssids: FxHashSet<String>,
    ifaces: FxHashMap<String, InstanceId>,
}

impl Bindings {
    /// Validate `ap` and reserve its SSID, producing an idle instance.
    pub fn configure(&self, ap: &AccessPoint, iface: &str, log_dir: &Path) -> Result<ApInstance> {
        ap.validate()?;
        if iface.is_empty() {
            return Err(HarnessError::InvalidDescriptor(format!(
                "{}: no interface",
                ap.ssid
            )));
        }
        let mut inner = self.lock();
        if !inner.ssids.insert(ap.ssid.clone()) {
            return Err(HarnessError::InvalidDescriptor(format!(
                "SSID {} is already configured",
                ap.ssid
            )));
        }
        Ok(ApInstance::new(ap, iface, log_dir))
    }

    /// Check the lifecycle and claim the interface for `instance`.
    pub fn claim(&self, instance: &ApInstance) -> Result<()> {
        match instance.state() {
            ApState::Created => {}
            ApState::Started => return Err(HarnessError::AlreadyStarted(instance.ssid().into())),
            ApState::Stopped => {
                return Err(HarnessError::StartFailed {
                    ssid: instance.ssid().into(),
                    reason: "instance was stopped".into(),
                });
            }
        }
        let mut inner = self.lock();
        match inner.ifaces.get(instance.iface()) {
            Some(owner) if *owner != instance.id() => Err(HarnessError::StartFailed {
                ssid: instance.ssid().into(),
                reason: format!("interface {} is busy", instance.iface()),
            }),
            _ => {
                inner.ifaces.insert(instance.iface().to_string(), instance.id());
                Ok(())
            }
        }
    }

    /// Give back the interface claimed by `instance`, if any.
    pub fn release_iface(&self, instance: &ApInstance) {
        let mut inner = self.lock();
        if inner.ifaces.get(instance.iface()) == Some(&instance.id()) {
            inner.ifaces.remove(instance.iface());
        }
    }

    /// Release everything `instance` holds.
    pub fn release(&self, instance: &ApInstance) {
        self.release_iface(instance);
        self.lock().ssids.remove(instance.ssid());
    }

    pub fn is_busy(&self, iface: &str) -> bool {
        self.lock().ifaces.contains_key(iface)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BindingsInner> {
        // The maps stay consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
