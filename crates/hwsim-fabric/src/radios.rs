//! `mac80211_hwsim` radio management.

use std::path::Path;
use std::process::{Command, Output};
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

pub const SYSFS_NET: &str = "/sys/class/net";
const MODULE: &str = "mac80211_hwsim";
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
const DISCOVERY_POLL: Duration = Duration::from_millis(100);

/// A network interface backed by a hwsim radio.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Radio {
    pub iface: String,
    /// Permanent address as printed by sysfs, e.g. `02:00:00:00:00:00`.
    pub mac: String,
}

/// Interfaces under `sysfs_net` whose device is a hwsim radio, sorted by
/// name.
pub fn discover_radios(sysfs_net: &Path) -> Result<Vec<Radio>> {
    let mut radios = Vec::new();
    let entries =
        std::fs::read_dir(sysfs_net).with_context(|| format!("read {}", sysfs_net.display()))?;
    for entry in entries {
        let entry = entry?;
        let Ok(device) = std::fs::read_link(entry.path().join("device")) else {
            continue;
        };
        let is_hwsim = device
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("hwsim"));
        if !is_hwsim {
            continue;
        }
        let iface = entry.file_name().to_string_lossy().into_owned();
        let mac = std::fs::read_to_string(entry.path().join("address"))
            .with_context(|| format!("read address of {iface}"))?
            .trim()
            .to_string();
        radios.push(Radio { iface, mac });
    }
    radios.sort_by(|a, b| a.iface.cmp(&b.iface));
    Ok(radios)
}

/// Loaded hwsim module. Unloads the module on drop.
pub struct Hwsim {
    radios: Vec<Radio>,
}

impl Hwsim {
    /// Load the module with `count` radios and wait for their interfaces.
    pub fn load(count: usize) -> Result<Self> {
        if count == 0 {
            bail!("at least one radio is needed");
        }
        if Path::new("/sys/module").join(MODULE).exists() {
            bail!("{MODULE} is already loaded; refusing to take over its radios");
        }

        sudo_checked(&["modprobe", MODULE, &format!("radios={count}")])?;
        let mut hwsim = Self { radios: Vec::new() };

        let deadline = Instant::now() + DISCOVERY_TIMEOUT;
        loop {
            hwsim.radios = discover_radios(Path::new(SYSFS_NET))?;
            if hwsim.radios.len() >= count {
                break;
            }
            if Instant::now() >= deadline {
                bail!(
                    "only {} of {count} hwsim interfaces appeared",
                    hwsim.radios.len()
                );
            }
            sleep(DISCOVERY_POLL);
        }

        for radio in &hwsim.radios {
            sudo_checked(&["ip", "link", "set", &radio.iface, "up"])?;
        }
        info!(radios = count, "loaded {}", MODULE);
        Ok(hwsim)
    }

    pub fn radios(&self) -> &[Radio] {
        &self.radios
    }
}

impl Drop for Hwsim {
    fn drop(&mut self) {
        debug!("unloading {}", MODULE);
        if let Err(err) = sudo_checked(&["modprobe", "-r", MODULE]) {
            warn!("failed to unload {}: {:#}", MODULE, err);
        }
    }
}

// -- helpers --

/// Run `sudo <args>`, returning output on success or bailing with stderr.
fn sudo_checked(args: &[&str]) -> Result<Output> {
    let output = Command::new("sudo")
        .args(args)
        .output()
        .with_context(|| format!("sudo {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "command failed: sudo {}\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}
