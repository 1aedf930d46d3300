use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use hwsim_fabric::Hwsim;
use passpoint_harness::config::{DEFAULT_EAP_IDENTITY, DEFAULT_EAP_PASSWORD, DEFAULT_PROFILE_NAME};
use passpoint_harness::fabric::read_iface_mac;
use passpoint_harness::hostapd::{HostapdController, find_hostapd};
use passpoint_harness::scenario::{builtin_table, filter_table, load_table, validate_table};
use passpoint_harness::shill::ShillManager;
use passpoint_harness::{
    ClientIface, HarnessConfig, HostapdSettings, MacAddr, RadioFabric, RunReport, Runner,
    Scenario, SimulatedAir, TlsMaterial,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator for the binary (non-Windows only)
#[cfg(not(windows))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(
    name = "passpoint_harness",
    author,
    version,
    disable_version_flag = true,
    about = "Passpoint network selection and roaming test runner"
)]
struct Cli {
    /// Print the version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    print_version: bool,

    /// List the scenarios that would run and exit
    #[arg(long = "list")]
    list: bool,

    /// JSON scenario table to use instead of the built-in one
    #[arg(long = "table")]
    table: Option<PathBuf>,
    /// Run only the named scenario (repeatable)
    #[arg(long = "scenario")]
    scenarios: Vec<String>,

    /// Run against the in-memory simulated air
    #[arg(long = "simulate", conflicts_with = "hwsim")]
    simulate: bool,
    /// Load mac80211_hwsim and use its radios as the fabric
    #[arg(long = "hwsim", conflicts_with_all = ["client", "aps"])]
    hwsim: bool,
    /// Client interface managed by the network manager
    #[arg(long = "client")]
    client: Option<String>,
    /// AP interface (repeatable, order matters)
    #[arg(long = "ap", id = "aps")]
    aps: Vec<String>,

    /// Overall budget per scenario, cleanup included, in seconds
    #[arg(long = "scenario-timeout", default_value = "60")]
    scenario_timeout_secs: u64,
    /// Association wait per phase, in seconds
    #[arg(long = "association-timeout", default_value = "30")]
    association_timeout_secs: u64,
    /// Network-manager profile dedicated to the harness
    #[arg(long = "profile", default_value = DEFAULT_PROFILE_NAME)]
    profile: String,

    /// hostapd binary (defaults to the one in PATH)
    #[arg(long = "hostapd")]
    hostapd: Option<PathBuf>,
    /// hostapd EAP user database (generated when absent)
    #[arg(long = "eap-users")]
    eap_users: Option<PathBuf>,
    /// CA certificate for the AP's EAP server and the client credentials
    #[arg(long = "ca-cert")]
    ca_cert: Option<PathBuf>,
    /// EAP server certificate
    #[arg(long = "server-cert")]
    server_cert: Option<PathBuf>,
    /// EAP server private key
    #[arg(long = "private-key")]
    private_key: Option<PathBuf>,
    /// EAP identity given to credentials without TLS material
    #[arg(long = "eap-identity", default_value = DEFAULT_EAP_IDENTITY)]
    eap_identity: String,
    /// EAP password given to credentials without TLS material
    #[arg(long = "eap-password", default_value = DEFAULT_EAP_PASSWORD)]
    eap_password: String,

    /// Directory for per-scenario logs (a temporary one when absent)
    #[arg(long = "work-dir")]
    work_dir: Option<PathBuf>,
    /// Also write the JSON report to this file
    #[arg(long = "report")]
    report: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Cli::parse();
    if args.print_version {
        println!(
            "{} [{}]",
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_NAME")
        );
        return Ok(());
    }

    let table = match &args.table {
        Some(path) => load_table(path)?,
        None => builtin_table(),
    };
    validate_table(&table)?;
    let table = filter_table(table, &args.scenarios)?;

    if args.list {
        for scenario in &table {
            println!(
                "{}\t{:?}\t{} APs\texpect {:?} on {}",
                scenario.name,
                scenario.mode,
                scenario.aps.len(),
                scenario.expect,
                scenario.expected_ssid
            );
        }
        return Ok(());
    }

    let config = build_config(&args).await?;
    let work_dir = match &args.work_dir {
        Some(dir) => dir.clone(),
        None => std::env::temp_dir().join(format!(
            "passpoint_harness-{}",
            passpoint_harness::now_ms()
        )),
    };
    tokio::fs::create_dir_all(&work_dir)
        .await
        .with_context(|| format!("create work dir {}", work_dir.display()))?;
    info!(dir = %work_dir.display(), scenarios = table.len(), "running scenario table");

    let report = run(&args, &config, &table, &work_dir)
        .await
        .context("passpoint_harness failed")?;

    let json = serde_json::to_string_pretty(&report)?;
    println!("{json}");
    if let Some(path) = &args.report {
        tokio::fs::write(path, &json)
            .await
            .with_context(|| format!("write report {}", path.display()))?;
    }

    if !report.all_passed() {
        bail!("{} of {} scenarios failed", report.failed, report.scenarios.len());
    }
    Ok(())
}

async fn build_config(args: &Cli) -> Result<HarnessConfig> {
    let binary = match &args.hostapd {
        Some(path) => path.clone(),
        None => find_hostapd().unwrap_or_else(|| PathBuf::from("hostapd")),
    };
    let hostapd = HostapdSettings {
        binary,
        eap_user_file: args.eap_users.clone(),
        ca_cert: args.ca_cert.clone(),
        server_cert: args.server_cert.clone(),
        private_key: args.private_key.clone(),
        eap_identity: args.eap_identity.clone(),
        eap_password: args.eap_password.clone(),
        ..Default::default()
    };

    let ca_cert_pem = match &args.ca_cert {
        Some(path) => vec![
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("read CA certificate {}", path.display()))?,
        ],
        None => Vec::new(),
    };
    let default_tls = TlsMaterial {
        identity: Some(args.eap_identity.clone()),
        password: Some(args.eap_password.clone()),
        ca_cert_pem,
        ..Default::default()
    };

    Ok(HarnessConfig::from_cli(
        args.scenario_timeout_secs,
        args.association_timeout_secs,
        &args.profile,
        hostapd,
        Some(default_tls),
    ))
}

/// AP interfaces the table needs at most.
fn max_aps(table: &[Scenario]) -> usize {
    table.iter().map(|s| s.aps.len()).max().unwrap_or(0)
}

async fn run(
    args: &Cli,
    config: &HarnessConfig,
    table: &[Scenario],
    work_dir: &Path,
) -> Result<RunReport> {
    if args.simulate {
        let fabric = if args.client.is_some() || !args.aps.is_empty() {
            explicit_fabric(args)?
        } else {
            RadioFabric::new(
                vec![ClientIface::new("sim-client0", MacAddr::random_local())],
                (0..max_aps(table)).map(|i| format!("sim-ap{i}")).collect(),
            )?
        };
        let air = SimulatedAir::new(&fabric);
        let runner = Runner::new(&air, &air, config, &fabric, work_dir);
        return Ok(runner.run_table(table).await);
    }

    // Kept alive until the table is done; dropping it unloads the radios.
    let hwsim;
    let fabric = if args.hwsim {
        hwsim = Hwsim::load(1 + max_aps(table)).context("load mac80211_hwsim")?;
        let mut radios = hwsim.radios().iter();
        let client = radios.next().context("no hwsim radio for the client")?;
        let client = ClientIface::new(
            &client.iface,
            client.mac.parse().map_err(anyhow::Error::msg)?,
        );
        RadioFabric::new(vec![client], radios.map(|r| r.iface.clone()).collect())?
    } else {
        explicit_fabric(args)?
    };

    let nm = ShillManager::connect().await.context("connect to shill")?;
    let controller = HostapdController::new(config.hostapd.clone());
    let runner = Runner::new(&nm, &controller, config, &fabric, work_dir);
    Ok(runner.run_table(table).await)
}

/// Fabric from `--client` and `--ap`, with MACs read from sysfs.
fn explicit_fabric(args: &Cli) -> Result<RadioFabric> {
    let Some(client) = &args.client else {
        bail!("--client is required unless --hwsim is given");
    };
    let mac = if args.simulate {
        read_iface_mac(client).unwrap_or_else(|_| MacAddr::random_local())
    } else {
        read_iface_mac(client)?
    };
    Ok(RadioFabric::new(
        vec![ClientIface::new(client, mac)],
        args.aps.clone(),
    )?)
}
