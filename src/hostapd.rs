//! hostapd-backed AP controller.
//!
//! Each started instance is one `hostapd -dd` process with a generated
//! configuration. Its stdout is pumped line by line into the instance log
//! and a channel; the first lines decide readiness, the rest form the
//! control channel. The process is killed when the controller is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::access_point::{AccessPoint, EapServerFiles, format_hostapd_config};
use crate::config::HostapdSettings;
use crate::controller::{ApController, ApInstance, ApState, Bindings, ControlChannel, InstanceId};
use crate::error::{HarnessError, Result};

/// Printed once the interface beacons.
pub const READY_MARKER: &str = "Setup of interface done";
/// Printed when the interface cannot be brought up.
pub const FAILED_MARKER: &str = "Interface initialization failed";

/// Grace period between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(2);

struct Running {
    child: Child,
    pump: JoinHandle<()>,
    channel: Option<UnboundedReceiver<String>>,
}

pub struct HostapdController {
    settings: HostapdSettings,
    bindings: Bindings,
    running: Mutex<FxHashMap<InstanceId, Running>>,
}

impl HostapdController {
    pub fn new(settings: HostapdSettings) -> Self {
        Self {
            settings,
            bindings: Bindings::default(),
            running: Mutex::new(FxHashMap::default()),
        }
    }

    /// Write the configuration files next to the log and spawn hostapd,
    /// returning once it reports the interface ready.
    async fn launch(&self, instance: &ApInstance) -> anyhow::Result<Running> {
        let dir = instance.log_path().parent().unwrap_or(Path::new("."));
        let stem = instance.file_stem();
        let conf_path = dir.join(format!("{stem}.conf"));
        let ctrl_path = dir.join(format!("{stem}.ctrl"));

        let eap_user_file = match &self.settings.eap_user_file {
            Some(path) => path.clone(),
            None => {
                let path = dir.join(format!("{stem}.eap_users"));
                tokio::fs::write(&path, self.settings.eap_users())
                    .await
                    .with_context(|| format!("write {}", path.display()))?;
                path
            }
        };
        let eap = EapServerFiles {
            eap_user_file: &eap_user_file,
            ca_cert: self.settings.ca_cert.as_deref(),
            server_cert: self.settings.server_cert.as_deref(),
            private_key: self.settings.private_key.as_deref(),
        };
        let conf = format_hostapd_config(
            instance.descriptor(),
            instance.iface(),
            &ctrl_path,
            self.settings.channel,
            &eap,
        );
        tokio::fs::write(&conf_path, conf)
            .await
            .with_context(|| format!("write {}", conf_path.display()))?;

        let log = std::fs::File::create(instance.log_path())
            .with_context(|| format!("create {}", instance.log_path().display()))?;
        let stderr_log = log.try_clone().context("clone log handle")?;

        let mut child = Command::new(&self.settings.binary)
            .arg("-dd")
            .arg("-K")
            .arg(&conf_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_log))
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn {}", self.settings.binary.display()))?;
        debug!(ssid = instance.ssid(), pid = child.id(), "spawned hostapd");

        let stdout = child.stdout.take().context("hostapd stdout not captured")?;
        let (line_tx, mut lines) = unbounded_channel();
        let pump = tokio::spawn(pump_lines(stdout, tokio::fs::File::from_std(log), line_tx));

        match timeout(self.settings.start_timeout, wait_ready(&mut lines)).await {
            Ok(Ok(())) => Ok(Running {
                child,
                pump,
                channel: Some(lines),
            }),
            Ok(Err(err)) => {
                pump.abort();
                Err(err)
            }
            Err(_) => {
                pump.abort();
                bail!(
                    "not ready after {:?}, see {}",
                    self.settings.start_timeout,
                    instance.log_path().display()
                )
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<InstanceId, Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Copy hostapd's stdout into the log and the line channel.
///
/// Keeps draining after the receiver is gone so hostapd never blocks on a
/// full pipe.
async fn pump_lines(stdout: ChildStdout, mut log: tokio::fs::File, line_tx: UnboundedSender<String>) {
    let mut reader = BufReader::new(stdout).lines();
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                let _ = log.write_all(line.as_bytes()).await;
                let _ = log.write_all(b"\n").await;
                let _ = line_tx.send(line);
            }
            Ok(None) => break,
            Err(err) => {
                warn!("hostapd stdout read error: {}", err);
                break;
            }
        }
    }
    let _ = log.flush().await;
}

async fn wait_ready(lines: &mut UnboundedReceiver<String>) -> anyhow::Result<()> {
    while let Some(line) = lines.recv().await {
        if line.contains(READY_MARKER) {
            return Ok(());
        }
        if line.contains(FAILED_MARKER) {
            bail!("{FAILED_MARKER}");
        }
    }
    bail!("hostapd exited before the interface was set up")
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) takes no pointers; the pid belongs to our unreaped child.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> std::io::Result<()> {
    Err(std::io::ErrorKind::Unsupported.into())
}

/// SIGTERM, wait briefly, then SIGKILL.
async fn terminate(child: &mut Child) -> anyhow::Result<()> {
    if let Some(pid) = child.id() {
        match send_sigterm(pid) {
            Ok(()) => {
                if timeout(TERM_GRACE, child.wait()).await.is_ok() {
                    return Ok(());
                }
                debug!(pid, "hostapd ignored SIGTERM");
            }
            Err(err) => warn!(pid, "failed to send SIGTERM to hostapd: {}", err),
        }
    }
    child.start_kill().context("kill hostapd")?;
    child.wait().await.context("reap hostapd")?;
    Ok(())
}

#[async_trait]
impl ApController for HostapdController {
    async fn configure(&self, ap: &AccessPoint, iface: &str, log_dir: &Path) -> Result<ApInstance> {
        self.bindings.configure(ap, iface, log_dir)
    }

    async fn start(&self, instance: &mut ApInstance) -> Result<()> {
        self.bindings.claim(instance)?;
        match self.launch(instance).await {
            Ok(running) => {
                self.lock().insert(instance.id(), running);
                instance.set_state(ApState::Started);
                info!(ssid = instance.ssid(), iface = instance.iface(), "hostapd ready");
                Ok(())
            }
            Err(err) => {
                self.bindings.release_iface(instance);
                Err(HarnessError::StartFailed {
                    ssid: instance.ssid().into(),
                    reason: format!("{err:#}"),
                })
            }
        }
    }

    async fn stop(&self, instance: &mut ApInstance) -> Result<()> {
        let running = self.lock().remove(&instance.id());
        if let Some(mut running) = running {
            if let Err(err) = terminate(&mut running.child).await {
                warn!(ssid = instance.ssid(), "failed to terminate hostapd: {:#}", err);
            }
            // The pump ends on EOF once hostapd is gone.
            if timeout(TERM_GRACE, &mut running.pump).await.is_err() {
                running.pump.abort();
            }
            debug!(ssid = instance.ssid(), "hostapd stopped");
        }
        self.bindings.release(instance);
        instance.set_state(ApState::Stopped);
        Ok(())
    }

    fn control_channel(&self, instance: &ApInstance) -> Result<ControlChannel> {
        self.lock()
            .get_mut(&instance.id())
            .and_then(|r| r.channel.take())
            .map(|lines| ControlChannel::new(instance.id(), lines))
            .ok_or_else(|| HarnessError::NotStarted(instance.ssid().into()))
    }
}

/// Default location of the hostapd binary, if it is on `PATH`.
pub fn find_hostapd() -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join("hostapd"))
            .find(|candidate| candidate.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fake hostapd: a shell script that prints `lines` then sleeps.
    fn fake_hostapd(dir: &Path, lines: &[&str]) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-hostapd");
        let mut script = String::from("#!/bin/sh\n");
        for line in lines {
            script.push_str(&format!("echo '{line}'\n"));
        }
        script.push_str("exec sleep 30\n");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn settings(binary: PathBuf) -> HostapdSettings {
        HostapdSettings {
            binary,
            start_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_reads_readiness_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_hostapd(
            dir.path(),
            &[
                "random: Trying to read entropy",
                "wlan1: interface state UNINITIALIZED->ENABLED",
                "wlan1: Setup of interface done.",
                "wlan1: AP-STA-CONNECTED 02:00:00:00:00:00",
            ],
        );
        let controller = HostapdController::new(settings(binary));
        let ap = AccessPoint::new("passpoint-blue").with_realms(&["blue.example"]);

        let mut inst = controller.configure(&ap, "wlan1", dir.path()).await.unwrap();
        controller.start(&mut inst).await.unwrap();
        assert!(inst.is_started());

        let mut channel = controller.control_channel(&inst).unwrap();
        let event = channel.next_event().await.unwrap();
        assert_eq!(
            event,
            crate::controller::ControlEvent::StaConnected("02:00:00:00:00:00".parse().unwrap())
        );

        let conf = std::fs::read_to_string(dir.path().join("hostapd-passpoint-blue.conf")).unwrap();
        assert!(conf.contains("interface=wlan1"));
        assert!(dir.path().join("hostapd-passpoint-blue.eap_users").exists());

        controller.stop(&mut inst).await.unwrap();
        assert_eq!(inst.state(), ApState::Stopped);
        assert_eq!(channel.next_event().await, None);

        let log = std::fs::read_to_string(inst.log_path()).unwrap();
        assert!(log.contains("Setup of interface done"));
    }

    #[tokio::test]
    async fn test_start_fails_on_init_failure() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_hostapd(dir.path(), &["wlan1: Interface initialization failed"]);
        let controller = HostapdController::new(settings(binary));

        let mut inst = controller
            .configure(&AccessPoint::new("passpoint-blue"), "wlan1", dir.path())
            .await
            .unwrap();
        let err = controller.start(&mut inst).await.unwrap_err();
        assert!(matches!(err, HarnessError::StartFailed { .. }), "{err}");
        assert!(!controller.bindings.is_busy("wlan1"));

        controller.stop(&mut inst).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_fails_on_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let controller = HostapdController::new(settings(dir.path().join("missing")));

        let mut inst = controller
            .configure(&AccessPoint::new("passpoint-blue"), "wlan1", dir.path())
            .await
            .unwrap();
        assert!(matches!(
            controller.start(&mut inst).await,
            Err(HarnessError::StartFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_hostapd(dir.path(), &["wlan1: still starting"]);
        let controller = HostapdController::new(HostapdSettings {
            start_timeout: Duration::from_millis(200),
            ..settings(binary)
        });

        let mut inst = controller
            .configure(&AccessPoint::new("passpoint-blue"), "wlan1", dir.path())
            .await
            .unwrap();
        assert!(matches!(
            controller.start(&mut inst).await,
            Err(HarnessError::StartFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_terminate_uses_sigterm() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let started = tokio::time::Instant::now();
        terminate(&mut child).await.unwrap();
        assert!(started.elapsed() < TERM_GRACE);
        let status = child.wait().await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_sigkill() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; exec sleep 30"])
            .spawn()
            .unwrap();
        // Let the shell install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        terminate(&mut child).await.unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }
}
