mod config;

use clap::{Parser, Subcommand, ValueEnum};
use config::{Config, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use reconciler::client::{ApiClient, ApiError, HealthError};
use reconciler::config::ApiConfigError;
use reconciler::data_sources::{self, KeySelector};
use reconciler::errors::ReconcileError;
use reconciler::lifecycle;
use reconciler::resources::{
    ClientKey, MetricAlert, Organization, OrganizationMember, Project, ResourceKind, Team,
    TeamMember, UptimeMonitor,
};
use reconciler::state::{InstanceState, StateStore};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(about = "Inspect and adopt Sentry organization objects")]
struct Cli {
    /// YAML config file. The API token and base URL fall back to the environment.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Checks that the base URL and token are accepted.
    Health,
    Organization {
        slug: String,
    },
    Members {
        organization: String,
    },
    Member {
        organization: String,
        email: String,
    },
    Teams {
        organization: String,
    },
    Integration {
        organization: String,
        /// Provider of the integration, e.g. `github`.
        provider_key: String,
        name: String,
    },
    /// Maps every visible project ID to its slug.
    Projects,
    Keys {
        organization: String,
        project: String,
        #[arg(long, conflicts_with = "name")]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Only the first key.
        #[arg(long, conflicts_with_all = ["id", "name"])]
        first: bool,
    },
    /// Reads an existing object by its key and prints the resulting state.
    Import {
        kind: Kind,
        /// Slash-separated key, e.g. `acme/backend` for a team.
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Organization,
    OrganizationMember,
    Team,
    TeamMember,
    Project,
    ClientKey,
    MetricAlert,
    UptimeMonitor,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    ApiConfig(#[from] ApiConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Health(#[from] HealthError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    fn is_cancelled(&self) -> bool {
        match self {
            CliError::Api(ApiError::Cancelled) => true,
            CliError::Health(HealthError::Api(ApiError::Cancelled)) => true,
            CliError::Reconcile(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

fn init_logging(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry::integrations::tracing::layer())
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some("orgsync"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(reconciler::metrics_defs::ALL_METRICS);
    Ok(())
}

fn print<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn import<K: ResourceKind>(kind: &K, client: &ApiClient, id: &str) -> Result<(), CliError> {
    let mut state = InstanceState::new();
    lifecycle::import(kind, client, &mut state, id).await?;
    print(&serde_json::json!({
        "type": K::TYPE_NAME,
        "id": state.id(),
        "attributes": state.attributes(),
    }))
}

async fn run(command: CliCommand, client: &ApiClient) -> Result<(), CliError> {
    match command {
        CliCommand::Health => {
            client.health_check().await?;
            println!("ok");
            Ok(())
        }
        CliCommand::Organization { slug } => {
            print(&data_sources::organization(client, &slug).await?)
        }
        CliCommand::Members { organization } => {
            print(&data_sources::all_organization_members(client, &organization).await?)
        }
        CliCommand::Member {
            organization,
            email,
        } => print(&data_sources::organization_member(client, &organization, &email).await?),
        CliCommand::Teams { organization } => {
            print(&data_sources::all_teams(client, &organization).await?)
        }
        CliCommand::Integration {
            organization,
            provider_key,
            name,
        } => print(
            &data_sources::organization_integration(client, &organization, &provider_key, &name)
                .await?,
        ),
        CliCommand::Projects => print(&data_sources::project_id_to_slug(client).await?),
        CliCommand::Keys {
            organization,
            project,
            id,
            name,
            first,
        } => {
            let selector = match (id, name) {
                (Some(id), _) => KeySelector::Id(id),
                (None, Some(name)) => KeySelector::Name(name),
                (None, None) if first => KeySelector::First,
                (None, None) => {
                    return print(
                        &data_sources::all_client_keys(client, &organization, &project).await?,
                    );
                }
            };
            print(&data_sources::client_key(client, &organization, &project, &selector).await?)
        }
        CliCommand::Import { kind, id } => match kind {
            Kind::Organization => import(&Organization, client, &id).await,
            Kind::OrganizationMember => import(&OrganizationMember, client, &id).await,
            Kind::Team => import(&Team, client, &id).await,
            Kind::TeamMember => import(&TeamMember, client, &id).await,
            Kind::Project => import(&Project, client, &id).await,
            Kind::ClientKey => import(&ClientKey, client, &id).await,
            Kind::MetricAlert => import(&MetricAlert, client, &id).await,
            Kind::UptimeMonitor => import(&UptimeMonitor, client, &id).await,
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    let _sentry = init_logging(&config.logging);

    match execute(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => {
            tracing::warn!("Interrupted before the command finished");
            ExitCode::from(130)
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: CliCommand, config: Config) -> Result<(), CliError> {
    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }
    let api = config.api.with_env()?;
    let client = ApiClient::from_config(&api)?;

    let cancel = client.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling outstanding requests");
            cancel.cancel();
        }
    });

    run(command, &client).await
}
