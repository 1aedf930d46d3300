use std::path::PathBuf;
use std::process::Command;

/// Returns `true` if the environment can load kernel modules
/// (requires `modprobe` and passwordless `sudo`).
pub fn check_privileges() -> bool {
    check_binary("modprobe").is_some()
        && Command::new("sudo")
            .args(["-n", "true"])
            .output()
            .is_ok_and(|o| o.status.success())
}

/// Check if a binary exists in PATH.
pub fn check_binary(name: &str) -> Option<PathBuf> {
    Command::new("sh")
        .args(["-c", &format!("command -v {name}")])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}
