//! Selection/roaming driver.
//!
//! Runs one scenario: Prepare, Provision, one or more phases, Teardown.
//! The driver owns the profile, every AP instance, and the monitor.
//! Teardown runs on every exit path, including the scenario deadline, and
//! its own failures are logged, never returned.

use std::path::Path;

use serde::Serialize;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::controller::{ApController, ApInstance};
use crate::error::{HarnessError, Result};
use crate::fabric::RadioFabric;
use crate::monitor::AssociationMonitor;
use crate::network_manager::{NetworkManager, Profile};
use crate::scenario::{Phase, Scenario};

/// One successful phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PhaseAssociation {
    pub phase: usize,
    pub client_iface: String,
    pub ssid: String,
    /// Time from the scan request to the association.
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub associations: Vec<PhaseAssociation>,
}

/// Resources acquired by a run, released by teardown.
#[derive(Default)]
struct Acquired {
    instances: Vec<ApInstance>,
    profile: Option<Profile>,
    interworking_iface: Option<String>,
}

pub struct Driver<'a> {
    nm: &'a dyn NetworkManager,
    controller: &'a dyn ApController,
    config: &'a HarnessConfig,
}

impl<'a> Driver<'a> {
    pub fn new(
        nm: &'a dyn NetworkManager,
        controller: &'a dyn ApController,
        config: &'a HarnessConfig,
    ) -> Self {
        Self {
            nm,
            controller,
            config,
        }
    }

    /// Run `scenario` on `fabric` before `deadline`.
    ///
    /// AP logs go to `work_dir`. Waits stop at the deadline minus the
    /// cleanup reserve; teardown then gets the reserve on its own.
    pub async fn run(
        &self,
        scenario: &Scenario,
        fabric: &RadioFabric,
        work_dir: &Path,
        deadline: Instant,
    ) -> Result<RunOutcome> {
        // Prepare
        scenario.validate(fabric.ap_ifaces().len())?;
        let client = fabric.primary_client().name.clone();
        let now = Instant::now();
        let work_deadline = deadline
            .checked_sub(self.config.cleanup_reserve)
            .unwrap_or(deadline)
            .min(now + self.config.work_budget())
            .max(now);

        info!(scenario = %scenario.name, mode = ?scenario.mode, client = %client, "starting scenario");

        let mut acquired = Acquired::default();
        let result = match timeout_at(
            work_deadline,
            self.run_body(scenario, fabric, work_dir, &client, work_deadline, &mut acquired),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Timeout(format!(
                "scenario {} deadline",
                scenario.name
            ))),
        };

        self.teardown(&scenario.name, &mut acquired).await;

        match &result {
            Ok(_) => info!(scenario = %scenario.name, "scenario passed"),
            Err(err) => info!(scenario = %scenario.name, kind = err.kind(), "scenario failed: {}", err),
        }
        result
    }

    async fn run_body(
        &self,
        scenario: &Scenario,
        fabric: &RadioFabric,
        work_dir: &Path,
        client: &str,
        work_deadline: Instant,
        acquired: &mut Acquired,
    ) -> Result<RunOutcome> {
        for (ap, iface) in scenario.aps.iter().zip(fabric.ap_ifaces()) {
            let instance = self.controller.configure(ap, iface, work_dir).await?;
            acquired.instances.push(instance);
        }

        // Provision
        acquired.profile = Some(self.nm.create_profile(&self.config.profile_name).await?);
        acquired.interworking_iface = Some(client.to_string());
        self.nm.set_interworking_select(client, true).await?;
        if let Some(profile) = &acquired.profile {
            for creds in &scenario.credentials {
                self.nm.add_credentials(profile, creds).await?;
            }
        }

        let mut outcome = RunOutcome::default();
        for (idx, phase) in scenario.phases().iter().enumerate() {
            let association = self
                .run_phase(idx, phase, fabric, client, work_deadline, &mut acquired.instances)
                .await?;
            outcome.associations.push(association);
        }
        Ok(outcome)
    }

    async fn run_phase(
        &self,
        idx: usize,
        phase: &Phase,
        fabric: &RadioFabric,
        client: &str,
        work_deadline: Instant,
        instances: &mut [ApInstance],
    ) -> Result<PhaseAssociation> {
        for &ap in &phase.aps {
            let instance = &mut instances[ap];
            debug!(phase = idx, ssid = instance.ssid(), iface = instance.iface(), "starting AP");
            self.controller.start(instance).await?;
        }

        let watched: Vec<&ApInstance> = phase.aps.iter().map(|&ap| &instances[ap]).collect();
        let mut monitor = AssociationMonitor::start(self.controller, &watched, fabric)?;
        debug!(phase = idx, watched = ?monitor.watched().collect::<Vec<_>>(), "monitor started");

        let scanned_at = Instant::now();
        self.nm.request_scan(client).await?;

        let wait_deadline = (scanned_at + self.config.association_timeout).min(work_deadline);
        let expected = &instances[phase.expected];
        let event = monitor
            .wait_associated_on(expected, client, wait_deadline)
            .await?;
        monitor.stop();

        info!(phase = idx, ssid = %event.ssid, client, "associated with expected AP");
        let association = PhaseAssociation {
            phase: idx,
            client_iface: client.to_string(),
            ssid: event.ssid,
            elapsed_ms: event.at.saturating_duration_since(scanned_at).as_millis() as u64,
        };

        for &ap in &phase.aps {
            self.controller.stop(&mut instances[ap]).await?;
        }
        Ok(association)
    }

    /// Release everything in `acquired`: stop APs, disable interworking
    /// select, remove the profile. Errors are logged and absorbed.
    ///
    /// AP stops may use at most half the cleanup reserve; the facade steps
    /// always get the rest, so a hung authenticator cannot leave the
    /// profile behind.
    async fn teardown(&self, scenario: &str, acquired: &mut Acquired) {
        let started = Instant::now();
        let ap_deadline = started + self.config.cleanup_reserve / 2;
        let deadline = started + self.config.cleanup_reserve;

        if timeout_at(ap_deadline, self.stop_all(&mut acquired.instances))
            .await
            .is_err()
        {
            warn!(scenario, "stopping APs did not finish within the cleanup reserve");
        }
        if timeout_at(deadline, self.release_provisioning(acquired))
            .await
            .is_err()
        {
            warn!(scenario, "provisioning cleanup did not finish within the cleanup reserve");
        }
    }

    async fn stop_all(&self, instances: &mut [ApInstance]) {
        for instance in instances {
            if let Err(err) = self.controller.stop(instance).await {
                warn!(ssid = instance.ssid(), "failed to stop AP: {}", err);
            }
        }
    }

    async fn release_provisioning(&self, acquired: &mut Acquired) {
        if let Some(iface) = acquired.interworking_iface.take()
            && let Err(err) = self.nm.set_interworking_select(&iface, false).await
        {
            warn!(iface = %iface, "failed to disable interworking select: {}", err);
        }

        if let Some(profile) = acquired.profile.take()
            && let Err(err) = self.nm.remove_profile(&profile.name).await
        {
            warn!(profile = %profile.name, "failed to remove profile: {}", err);
        }
    }
}
