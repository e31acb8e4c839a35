//! ka manager - runs the cluster addon controller

use std::time::Duration;

use clap::{Parser, Subcommand};
use ka_kube::config::{DEFAULT_FIELD_MANAGER, DEFAULT_LEDGER_NAME, DEFAULT_LEDGER_NAMESPACE};
use ka_kube::{ControllerConfig, Stack};
use kube::CustomResourceExt;
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ka-manager")]
#[command(version)]
#[command(about = "Installs and removes addon stacks described by Stack resources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Namespace of the ledger ConfigMap
    #[arg(long, env = "KA_LEDGER_NAMESPACE", default_value = DEFAULT_LEDGER_NAMESPACE, global = true)]
    ledger_namespace: String,

    /// Name of the ledger ConfigMap
    #[arg(long, env = "KA_LEDGER_NAME", default_value = DEFAULT_LEDGER_NAME, global = true)]
    ledger_name: String,

    /// Field manager for server-side apply
    #[arg(long, env = "KA_FIELD_MANAGER", default_value = DEFAULT_FIELD_MANAGER, global = true)]
    field_manager: String,

    /// helm executable
    #[arg(long, env = "KA_HELM_BIN", default_value = "helm", global = true)]
    helm_bin: String,

    /// Deadline for one reconcile pass, in seconds
    #[arg(long, env = "KA_RECONCILE_TIMEOUT_SECS", default_value_t = 900, global = true)]
    reconcile_timeout_secs: u64,

    /// Timeout for manifest downloads and release lookups, in seconds
    #[arg(long, env = "KA_HTTP_TIMEOUT_SECS", default_value_t = 30, global = true)]
    http_timeout_secs: u64,

    /// GitHub token for release lookups
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    github_token: Option<String>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq, Debug)]
enum Commands {
    /// Run the controller (default)
    Run,
    /// Print the Stack CustomResourceDefinition
    Crd,
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            ledger_namespace: self.ledger_namespace.clone(),
            ledger_name: self.ledger_name.clone(),
            field_manager: self.field_manager.clone(),
            helm_bin: self.helm_bin.clone(),
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            github_token: self.github_token.clone().filter(|t| !t.is_empty()),
            ..Default::default()
        }
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_panic_hook();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Crd => {
            let crd = serde_yaml::to_string(&Stack::crd()).into_diagnostic()?;
            print!("{crd}");
            Ok(())
        }
        Commands::Run => {
            init_logging(&cli.log_level);
            let config = cli.controller_config();
            tracing::info!(
                ledger = %format!("{}/{}", config.ledger_namespace, config.ledger_name),
                field_manager = %config.field_manager,
                timeout_secs = config.reconcile_timeout.as_secs(),
                "ka-manager starting"
            );

            let client = kube::Client::try_default()
                .await
                .into_diagnostic()
                .wrap_err("failed to create Kubernetes client")?;
            ka_kube::run(client, config)
                .await
                .into_diagnostic()
                .wrap_err("controller failed")
        }
    }
}
