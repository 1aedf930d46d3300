//! Dependency checks for hwsim integration tests.

use std::path::Path;
use std::process::Command;

use crate::test_util::{check_binary, check_privileges};

/// Reason why hwsim tests must be skipped.
#[derive(Debug)]
pub enum SkipReason {
    NotRoot,
    MissingBinary(String),
    NoHwsim,
    HwsimInUse,
    NoShill,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotRoot => write!(f, "requires root / passwordless sudo"),
            SkipReason::MissingBinary(b) => write!(f, "{b} not found in PATH"),
            SkipReason::NoHwsim => write!(
                f,
                "mac80211_hwsim kernel module not available (try: sudo modprobe mac80211_hwsim)"
            ),
            SkipReason::HwsimInUse => write!(f, "mac80211_hwsim is already loaded"),
            SkipReason::NoShill => write!(f, "shill is not running on the system bus"),
        }
    }
}

/// Check everything a real-radio test needs: privileges, hostapd, an
/// unloaded but loadable hwsim module, and a running shill.
///
/// Returns `Ok(())` if everything is available, or `Err(SkipReason)` with
/// the first missing dependency.
pub fn check_hwsim_deps() -> std::result::Result<(), SkipReason> {
    if !check_privileges() {
        return Err(SkipReason::NotRoot);
    }

    for bin in &["hostapd", "dbus-send"] {
        if check_binary(bin).is_none() {
            return Err(SkipReason::MissingBinary(bin.to_string()));
        }
    }

    if Path::new("/sys/module/mac80211_hwsim").exists() {
        return Err(SkipReason::HwsimInUse);
    }
    let available = Command::new("modinfo")
        .arg("mac80211_hwsim")
        .output()
        .is_ok_and(|o| o.status.success());
    if !available {
        return Err(SkipReason::NoHwsim);
    }

    let shill = Command::new("dbus-send")
        .args([
            "--system",
            "--print-reply",
            "--dest=org.freedesktop.DBus",
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus.NameHasOwner",
            "string:org.chromium.flimflam",
        ])
        .output()
        .is_ok_and(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).contains("true"));
    if !shill {
        return Err(SkipReason::NoShill);
    }

    Ok(())
}
