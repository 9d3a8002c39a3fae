use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use kube::config::{KubeConfigOptions, Kubeconfig};
use submariner_agent_status::controller::{
    self, conditions::find_condition, AddOnStatusClient, ControllerConfig, KubeAddOnStatusClient,
    CONDITION_TYPE_AGENT_DEGRADED,
};
use submariner_agent_status::Error;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the status controller
    Run(RunArgs),
    /// Show version and build information
    Version,
    /// Show the agent condition currently published on the hub
    Info(InfoArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
struct HubArgs {
    /// Managed cluster name (namespace of the ManagedClusterAddOn on the hub)
    #[arg(long, env = "CLUSTER_NAME")]
    cluster_name: String,

    /// Name of the ManagedClusterAddOn
    #[arg(long, env = "ADDON_NAME", default_value = "submariner")]
    addon_name: String,

    /// Kubeconfig for the hub; the in-cluster configuration is used when unset
    #[arg(long, env = "HUB_KUBECONFIG")]
    hub_kubeconfig: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    hub: HubArgs,

    /// Namespace the Submariner components are installed in
    #[arg(
        long,
        env = "INSTALLATION_NAMESPACE",
        default_value = "submariner-operator"
    )]
    installation_namespace: String,

    /// Name of the Submariner resource to report on
    #[arg(long, env = "TARGET_NAME", default_value = "submariner")]
    target_name: String,

    /// Name of the operator Subscription
    #[arg(long, env = "SUBSCRIPTION_NAME", default_value = "submariner")]
    subscription_name: String,

    /// Number of concurrent reconcile workers
    #[arg(long, env = "WORKERS", default_value_t = 2)]
    workers: usize,

    /// Attempts per status write before giving up on conflicts
    #[arg(long, env = "MAX_UPDATE_ATTEMPTS", default_value_t = 5)]
    max_update_attempts: u32,

    /// Upper bound for one status write including retries
    #[arg(long, env = "STATUS_UPDATE_TIMEOUT_SECS", default_value_t = 30)]
    status_update_timeout_secs: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Address for the /health and /metrics endpoints
    #[cfg(feature = "rest-api")]
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: std::net::SocketAddr,
}

impl RunArgs {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            cluster_name: self.hub.cluster_name.clone(),
            installation_namespace: self.installation_namespace.clone(),
            target_name: self.target_name.clone(),
            addon_name: self.hub.addon_name.clone(),
            subscription_name: self.subscription_name.clone(),
            workers: self.workers,
            max_update_attempts: self.max_update_attempts,
            status_update_timeout: Duration::from_secs(self.status_update_timeout_secs),
        }
    }
}

#[derive(Parser, Debug)]
struct InfoArgs {
    #[command(flatten)]
    hub: HubArgs,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Submariner agent status v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_agent(run_args).await,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn hub_client(kubeconfig: Option<&Path>) -> Result<kube::Client, Error> {
    let Some(path) = kubeconfig else {
        return kube::Client::try_default().await.map_err(Error::KubeError);
    };

    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        Error::KubeconfigError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::KubeconfigError(format!("Invalid hub kubeconfig: {}", e)))?;
    kube::Client::try_from(config).map_err(Error::KubeError)
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = hub_client(args.hub.hub_kubeconfig.as_deref()).await?;
    let addon = KubeAddOnStatusClient::new(client)
        .get(&args.hub.cluster_name, &args.hub.addon_name)
        .await?;

    let status = addon.status_or_default();
    match find_condition(&status.conditions, CONDITION_TYPE_AGENT_DEGRADED) {
        Some(condition) => {
            println!("{}: {}", condition.type_, condition.status);
            println!("Reason: {}", condition.reason);
            println!("Message: {}", condition.message);
        }
        None => println!(
            "No {} condition on {}/{}",
            CONDITION_TYPE_AGENT_DEGRADED, args.hub.cluster_name, args.hub.addon_name
        ),
    }
    Ok(())
}

async fn run_agent(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_format);

    info!(
        "Starting Submariner agent status v{}",
        env!("CARGO_PKG_VERSION")
    );

    if args.hub.cluster_name.is_empty() {
        return Err(Error::ConfigError("cluster name must not be empty".to_string()));
    }

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    let hub = hub_client(args.hub.hub_kubeconfig.as_deref()).await?;
    info!("Connected to managed cluster and hub");

    #[cfg(feature = "rest-api")]
    {
        let addr = args.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = submariner_agent_status::rest_api::run_server(addr).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }

    controller::run_controller(client, hub, args.controller_config()).await
}
