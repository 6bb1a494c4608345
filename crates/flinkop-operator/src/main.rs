//! flinkop - Flink application reconciliation on Kubernetes

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use kube::{Api, Client, CustomResourceExt, ResourceExt};

use flinkop_client::RestJobManagerClient;
use flinkop_common::crd::FlinkApplication;
use flinkop_common::telemetry::{init_telemetry, TelemetryConfig};
use flinkop_common::{config, hash_for_application, ControllerConfig};
use flinkop_controller::resources::{
    job_manager_deployment_name, task_manager_deployment_name, versioned_service_name,
};
use flinkop_controller::FlinkController;

/// flinkop - reconcile Flink applications against their live clusters
#[derive(Parser, Debug)]
#[command(name = "flinkop", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Tunables shared by every command
#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// Job-manager REST port
    #[arg(long, env = "FLINKOP_JOBMANAGER_PORT", default_value_t = config::DEFAULT_JOBMANAGER_PORT)]
    jobmanager_port: u16,

    /// Seconds after which a task manager without heartbeat is unhealthy
    #[arg(
        long,
        env = "FLINKOP_HEARTBEAT_STALENESS_SECS",
        default_value_t = config::DEFAULT_HEARTBEAT_STALENESS.as_secs()
    )]
    heartbeat_staleness_secs: u64,

    /// Seconds a job stays Red after it was last seen failing
    #[arg(
        long,
        env = "FLINKOP_FAILING_WINDOW_SECS",
        default_value_t = config::DEFAULT_FAILING_WINDOW.as_secs()
    )]
    failing_window_secs: u64,
}

impl ConfigArgs {
    fn into_config(self) -> anyhow::Result<ControllerConfig> {
        let config = ControllerConfig {
            jobmanager_port: self.jobmanager_port,
            heartbeat_staleness: Duration::from_secs(self.heartbeat_staleness_secs),
            failing_window: Duration::from_secs(self.failing_window_secs),
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the FlinkApplication CRD manifest
    Crd,

    /// Install or update the FlinkApplication CRD with server-side apply
    InstallCrd,

    /// Print the spec hash and revision resource names of a manifest
    Hash {
        /// FlinkApplication manifest (YAML)
        manifest: PathBuf,
    },

    /// Show the current and stale revisions of an application
    Plan {
        /// FlinkApplication manifest (YAML)
        manifest: PathBuf,
    },

    /// Observe the job manager of a revision and print the derived status
    Probe {
        /// FlinkApplication manifest (YAML)
        manifest: PathBuf,

        /// Revision to probe; defaults to the deployed hash, then the spec hash
        #[arg(long)]
        hash: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(cli.config.into_config()?);

    // Manifest output goes to stdout; keep it free of log lines
    if let Commands::Crd = cli.command {
        let crd = serde_yaml::to_string(&FlinkApplication::crd())
            .context("failed to serialize CRD")?;
        println!("{crd}");
        return Ok(());
    }

    let telemetry = init_telemetry(TelemetryConfig::default())?;
    let result = run(cli.command, config).await;
    telemetry.shutdown();
    result
}

async fn run(command: Commands, config: Arc<ControllerConfig>) -> anyhow::Result<()> {
    match command {
        Commands::Crd => Ok(()),
        Commands::InstallCrd => {
            let client = Client::try_default().await?;
            install_crd(&client, &config.field_manager).await
        }
        Commands::Hash { manifest } => {
            let app = load_manifest(&manifest)?;
            let hash = hash_for_application(&app);
            println!("hash: {hash}");
            println!("service: {}", versioned_service_name(&app, &hash));
            println!("jobmanager: {}", job_manager_deployment_name(&app, &hash));
            println!("taskmanager: {}", task_manager_deployment_name(&app, &hash));
            println!("url: {}", config.jobmanager_url(&app, &hash));
            Ok(())
        }
        Commands::Plan { manifest } => {
            let app = load_manifest(&manifest)?;
            let controller = build_controller(config).await?;
            let (current, stale) = controller.get_current_and_stale_deployments(&app).await?;
            match current {
                Some(set) => println!("current: {}", set.hash),
                None => println!("current: none (want {})", hash_for_application(&app)),
            }
            for set in stale {
                println!("stale: {} (complete: {})", set.hash, set.is_complete());
            }
            Ok(())
        }
        Commands::Probe { manifest, hash } => {
            let mut app = load_manifest(&manifest)?;
            let hash = hash
                .or_else(|| app.status.as_ref().and_then(|s| s.deployed_hash.clone()))
                .unwrap_or_else(|| hash_for_application(&app));
            let controller = build_controller(config).await?;
            let changed = controller.update_status(&mut app, &hash).await?;
            tracing::info!(app = %app.name_any(), hash = %hash, changed, "probed application");
            println!("{}", serde_yaml::to_string(&app.status)?);
            Ok(())
        }
    }
}

async fn build_controller(config: Arc<ControllerConfig>) -> anyhow::Result<FlinkController> {
    let client = Client::try_default().await?;
    let job_manager = Arc::new(RestJobManagerClient::new()?);
    Ok(FlinkController::new(client, job_manager, config))
}

fn load_manifest(path: &Path) -> anyhow::Result<FlinkApplication> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// The CRD version always matches the binary that installs it
async fn install_crd(client: &Client, field_manager: &str) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();
    let crd = FlinkApplication::crd();
    let name = crd.name_any();

    tracing::info!(crd = %name, "installing CRD");
    crds.patch(&name, &params, &Patch::Apply(&crd))
        .await
        .with_context(|| format!("failed to install {name}"))?;
    Ok(())
}
