use std::path::PathBuf;

/// Reset SIGPIPE to default behavior so piping (e.g. `ociscope discover | jq`)
/// exits cleanly instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ociscope::cli::invoke::OciCli;
use ociscope::config::profile::read_tenancy_ocid;
use ociscope::discovery::{orchestrator, DiscoveryCtx};
use ociscope::output::formatter;
use ociscope::provision::engine::{ProvisionEnd, Provisioner, RetryPolicy};
use ociscope::provision::lock::ProcessLock;
use ociscope::provision::spec::render_ad_specs;
use ociscope::signals;
use ociscope::snapshot::store::{cleanup_strays, SnapshotStore};

/// Tag namespaces excluded from cloning by default.
const DEFAULT_IGNORED_NAMESPACES: &[&str] = &["Oracle-Tags"];

/// ociscope - tenancy discovery and instance provisioning for OCI
#[derive(Parser)]
#[command(name = "ociscope", version, about, long_about = None)]
struct Cli {
    /// OCI CLI profile name
    #[arg(short, long, env = "OCI_PROFILE", default_value = "DEFAULT", global = true)]
    profile: String,

    /// Path to the OCI config file (default ~/.oci/config)
    #[arg(short, long, env = "OCI_CONFIG_FILE", global = true)]
    config: Option<PathBuf>,

    /// External OCI CLI binary to drive
    #[arg(long, env = "OCI_CLI_BIN", default_value = "oci", global = true)]
    cli_bin: String,

    /// Read timeout in seconds passed to the CLI (0 = CLI default)
    #[arg(short, long, default_value = "0", global = true)]
    timeout: u64,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a complete tenancy inventory into a JSON snapshot
    Discover {
        /// Snapshot file (default snapshot-<profile>-<timestamp>.json)
        #[arg(short, long, env = "OCI_SNAPSHOT_OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Launch a compute instance, rotating availability domains under a retry policy
    #[command(name = "instance-provision")]
    InstanceProvision {
        /// Launch spec template ({{AD_NUMBER}} placeholders allowed)
        #[arg(short, long)]
        spec: PathBuf,

        /// Write the instance JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Comma-separated availability domain numbers to rotate through
        #[arg(short, long, default_value = "1,2,3")]
        ads: String,

        /// Render specs and log the commands without invoking the CLI
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    signals::install();

    match cli.command {
        Commands::Discover { ref output } => cmd_discover(&cli, output.clone()).await,
        Commands::InstanceProvision {
            ref spec,
            ref output,
            ref ads,
            dry_run,
        } => {
            let (spec, output, ads) = (spec.clone(), output.clone(), ads.clone());
            cmd_provision(&cli, spec, output, &ads, dry_run).await
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Usage errors exit 2, matching clap's own convention.
fn usage_error(msg: &str) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(2);
}

fn resolve_config_path(config: &Option<PathBuf>) -> PathBuf {
    if let Some(path) = config {
        return path.clone();
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".oci").join("config"),
        Err(_) => usage_error("no --config given and HOME is not set"),
    }
}

fn default_snapshot_name(profile: &str) -> PathBuf {
    PathBuf::from(format!(
        "snapshot-{}-{}.json",
        profile.to_lowercase(),
        chrono::Utc::now().format("%Y%m%d%H%M%S")
    ))
}

fn parse_ads(raw: &str) -> Result<Vec<u32>, String> {
    let mut ads = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        match part.parse::<u32>() {
            Ok(ad) if ad > 0 => ads.push(ad),
            _ => return Err(format!("invalid availability domain number '{part}'")),
        }
    }
    if ads.is_empty() {
        return Err("at least one availability domain number is required".to_string());
    }
    Ok(ads)
}

fn build_cli(cli: &Cli) -> OciCli {
    let oci = OciCli::new(&cli.cli_bin, &cli.profile, cli.timeout);
    match &cli.config {
        Some(path) => oci.with_config_file(path.clone()),
        None => oci,
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn cmd_discover(cli: &Cli, output: Option<PathBuf>) -> Result<()> {
    let config_path = resolve_config_path(&cli.config);
    let tenancy_ocid = read_tenancy_ocid(&config_path, &cli.profile)
        .context("unable to discover tenancy OCID")?;

    let out_path = output.unwrap_or_else(|| default_snapshot_name(&cli.profile));
    let ctx = DiscoveryCtx {
        cli: build_cli(cli),
        store: SnapshotStore::new(&out_path),
        tenancy_ocid,
        ignored_namespaces: DEFAULT_IGNORED_NAMESPACES
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };

    let status = orchestrator::run(&ctx).await?;

    let snapshot_dir = out_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let _ = cleanup_strays(snapshot_dir);

    if status == 0 {
        formatter::print_success(&format!("Snapshot written to {}", out_path.display()));
        Ok(())
    } else {
        formatter::print_error(&format!(
            "Discovery completed with errors; partial snapshot at {}",
            out_path.display()
        ));
        std::process::exit(status);
    }
}

async fn cmd_provision(
    cli: &Cli,
    spec: PathBuf,
    output: Option<PathBuf>,
    ads: &str,
    dry_run: bool,
) -> Result<()> {
    let ads = match parse_ads(ads) {
        Ok(ads) => ads,
        Err(msg) => usage_error(&msg),
    };
    let template = match std::fs::read_to_string(&spec) {
        Ok(template) => template,
        Err(e) => usage_error(&format!("cannot read spec file {}: {e}", spec.display())),
    };

    let workdir = tempfile::tempdir().context("cannot create working directory")?;
    let rendered = render_ad_specs(&template, &ads, workdir.path())?;

    let _lock = ProcessLock::acquire("instance-provision")?;
    let oci = build_cli(cli);

    if dry_run {
        let common = oci.common_args().join(" ");
        for (ad, path) in &rendered {
            let args = Provisioner::launch_args(path);
            tracing::info!(ad = %ad, "would run: {} {} {}", cli.cli_bin, args.join(" "), common);
        }
        formatter::print_success("Dry run complete; no instance launched.");
        return Ok(());
    }

    let provisioner = Provisioner::new(oci, ads, RetryPolicy::default());
    match provisioner.run(&rendered).await? {
        ProvisionEnd::Launched(instance) => {
            let body = serde_json::to_string_pretty(&instance)?;
            match output {
                Some(path) => std::fs::write(&path, format!("{body}\n"))
                    .with_context(|| format!("cannot write instance JSON to {}", path.display()))?,
                None => println!("{body}"),
            }
            formatter::print_success("Instance launched.");
            Ok(())
        }
        ProvisionEnd::Interrupted(code) => {
            // Release the lock and rendered specs before terminating.
            drop(_lock);
            drop(workdir);
            std::process::exit(code);
        }
    }
}
