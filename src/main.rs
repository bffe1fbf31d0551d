//! astrolabe - planned-maintenance test driver.
//!
//! This is the main entry point that:
//! - Parses the command line (every provider option has an env fallback)
//! - Initializes structured logging
//! - Runs the requested command against the provider API

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use astrolabe::client::{AtlasClient, ProjectAdmin, ResourceClient};
use astrolabe::config::{
    ApiCredentials, ControllerConfig, DEFAULT_API_VERSION, DEFAULT_BASE_URL, ExecutionMode,
    PollerSettings, RunSettings,
};
use astrolabe::controller::provisioning::{
    dedicated_replica_set, ensure_database_user, toggle_javascript,
};
use astrolabe::controller::run_spec_tests;
use astrolabe::document::Document;
use astrolabe::plan::{ClusterNamer, DEFAULT_CLUSTER_NAME_LENGTH, TestPlanRegistry};
use astrolabe::report::{DEFAULT_JUNIT_PATH, write_json, write_junit};

/// astrolabe - drive planned-maintenance tests against provisioned clusters
#[derive(Parser, Debug)]
#[command(name = "astrolabe", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    api: ApiArgs,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ApiArgs {
    /// Base URL of the provider API
    #[arg(long = "atlas-base-url", env = "ATLAS_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Version of the provider API
    #[arg(long = "atlas-api-version", env = "ATLAS_API_VERSION", default_value = DEFAULT_API_VERSION)]
    api_version: String,

    /// API username
    #[arg(short = 'u', long = "atlas-api-username", env = "ATLAS_API_USERNAME")]
    username: String,

    /// API password
    #[arg(
        short = 'p',
        long = "atlas-api-password",
        env = "ATLAS_API_PASSWORD",
        hide_env_values = true
    )]
    password: String,

    /// Per-request HTTP timeout, in seconds
    #[arg(long, env = "ATLAS_HTTP_TIMEOUT", default_value = "10", value_parser = parse_seconds)]
    http_timeout: Duration,

    /// Maximum time to wait for a cluster state, in seconds
    #[arg(long, env = "ATLAS_POLLING_TIMEOUT", default_value = "600", value_parser = parse_seconds)]
    polling_timeout: Duration,

    /// Polling frequency, in Hz
    #[arg(long, env = "ATLAS_POLLING_FREQUENCY", default_value_t = 1.0)]
    polling_frequency: f64,
}

impl ApiArgs {
    fn polling(&self) -> PollerSettings {
        PollerSettings::from_frequency(self.polling_frequency, self.polling_timeout)
    }

    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::new(ApiCredentials::new(&self.username, &self.password))
            .with_base_url(&self.base_url)
            .with_api_version(&self.api_version)
            .with_http_timeout(self.http_timeout)
            .with_polling(self.polling())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the provider accepts the API credentials
    CheckConnection,

    /// Inspect organizations
    Organizations {
        #[command(subcommand)]
        command: OrganizationCommands,
    },

    /// Create and inspect projects
    Projects {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Create and list database users
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Create, change, inspect and delete individual clusters
    Clusters {
        #[command(subcommand)]
        command: ClusterCommands,
    },

    /// Run maintenance spec tests
    SpecTests {
        #[command(subcommand)]
        command: SpecTestCommands,
    },
}

#[derive(Subcommand, Debug)]
enum OrganizationCommands {
    /// List every organization visible to the credentials
    List,
    /// Print one organization, or "None" if no organization has that name
    GetOne(OrganizationArgs),
}

#[derive(Args, Debug)]
struct OrganizationArgs {
    /// Name of the organization
    #[arg(long = "org-name", default_value = "MongoDB")]
    organization_name: String,
}

#[derive(Subcommand, Debug)]
enum ProjectCommands {
    /// Create a project in an organization
    Create {
        #[command(flatten)]
        organization: OrganizationArgs,
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// List every project visible to the credentials
    List,
    /// Print one project
    GetOne(ProjectArgs),
}

#[derive(Args, Debug)]
struct ProjectArgs {
    /// Name of the project
    #[arg(long = "group-name", env = "EVERGREEN_PROJECT_ID")]
    project_name: String,
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    /// Create (or reset) a database user with admin privileges
    Create {
        #[command(flatten)]
        credentials: DbCredentialArgs,
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// List the database users of a project
    List(ProjectArgs),
}

#[derive(Args, Debug)]
struct DbCredentialArgs {
    /// Database username
    #[arg(long, default_value = "atlasuser")]
    db_username: String,

    /// Database password
    #[arg(long, default_value = "mypassword123", hide_default_value = true)]
    db_password: String,
}

#[derive(Subcommand, Debug)]
enum ClusterCommands {
    /// Create a dedicated-tier replica set
    CreateDedicated(DedicatedClusterArgs),
    /// Move an existing dedicated-tier cluster to another instance size
    ResizeDedicated(DedicatedClusterArgs),
    /// Enable or disable server-side JavaScript on a cluster
    ToggleJs(ClusterArgs),
    /// List every cluster in a project
    List(ProjectArgs),
    /// Print a cluster's description
    GetOne(ClusterArgs),
    /// Print whether a cluster is IDLE; exits non-zero if it is not
    #[command(alias = "isready")]
    IsReady(ClusterArgs),
    /// Request deletion of a cluster
    Delete(ClusterArgs),
}

impl ClusterCommands {
    fn project_name(&self) -> &str {
        match self {
            ClusterCommands::CreateDedicated(args) | ClusterCommands::ResizeDedicated(args) => {
                &args.cluster.project.project_name
            }
            ClusterCommands::List(args) => &args.project_name,
            ClusterCommands::ToggleJs(args)
            | ClusterCommands::GetOne(args)
            | ClusterCommands::IsReady(args)
            | ClusterCommands::Delete(args) => &args.project.project_name,
        }
    }
}

#[derive(Args, Debug)]
struct ClusterArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Name of the cluster
    #[arg(long)]
    cluster_name: String,
}

#[derive(Args, Debug)]
struct DedicatedClusterArgs {
    #[command(flatten)]
    cluster: ClusterArgs,

    /// AWS cluster tier
    #[arg(short = 's', long = "instance-size-name", value_enum)]
    instance_size: InstanceSize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum InstanceSize {
    #[value(name = "M10")]
    M10,
    #[value(name = "M20")]
    M20,
}

impl InstanceSize {
    fn as_str(self) -> &'static str {
        match self {
            InstanceSize::M10 => "M10",
            InstanceSize::M20 => "M20",
        }
    }
}

#[derive(Subcommand, Debug)]
enum SpecTestCommands {
    /// Run every test file in a directory
    Run(RunArgs),
    /// Run a single test file
    RunOne(RunOneArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory holding one YAML file per test case
    spec_tests_directory: PathBuf,

    #[command(flatten)]
    options: RunOptions,
}

#[derive(Args, Debug)]
struct RunOneArgs {
    /// YAML file describing the test case
    spec_test_file: PathBuf,

    #[command(flatten)]
    options: RunOptions,
}

#[derive(Args, Debug)]
struct RunOptions {
    /// Path to the workload executor
    #[arg(short = 'e', long)]
    workload_executor: PathBuf,

    /// Database user handed to the workload executor
    #[arg(long, default_value = "atlasuser")]
    db_username: String,

    /// Database password handed to the workload executor
    #[arg(long, default_value = "mypassword123")]
    db_password: String,

    /// Organization that owns the project
    #[arg(long = "org-name", default_value = "MongoDB")]
    organization_name: String,

    /// Project the clusters are created in
    #[arg(long = "group-name", env = "EVERGREEN_PROJECT_ID")]
    project_name: String,

    /// Salt mixed into every cluster name
    #[arg(long, env = "EVERGREEN_BUILD_ID")]
    cluster_name_salt: String,

    /// Length of derived cluster names
    #[arg(long, default_value_t = DEFAULT_CLUSTER_NAME_LENGTH)]
    cluster_name_length: usize,

    /// JUnit XML output file
    #[arg(long, default_value = DEFAULT_JUNIT_PATH)]
    junit_output: PathBuf,

    /// Optional JSON report output file
    #[arg(long)]
    json_output: Option<PathBuf>,

    /// Run every test case concurrently, each on its own cluster
    #[arg(long)]
    parallel: bool,

    /// Delete each cluster once its test case has been recorded
    #[arg(long)]
    delete_clusters: bool,

    /// Seconds the workload executor may take to exit after an interrupt
    #[arg(long, default_value = "60", value_parser = parse_seconds)]
    workload_stop_timeout: Duration,

    /// Seconds to wait after triggering maintenance before polling
    #[arg(long, default_value = "3", value_parser = parse_seconds)]
    maintenance_grace: Duration,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|e| format!("invalid number of seconds {value:?}: {e}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration {value:?}: {e}"))
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format)?;

    let config = cli.api.controller_config();
    let client = AtlasClient::new(&config)?;

    match cli.command {
        Commands::CheckConnection => {
            client.ping().await?;
            info!(base_url = %config.base_url, "Connection to the provider API succeeded");
            println!("SUCCESS");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Organizations { command } => run_organization_command(&client, command).await,
        Commands::Projects { command } => run_project_command(&client, command).await,
        Commands::Users { command } => run_user_command(&client, command).await,
        Commands::Clusters { command } => run_cluster_command(&client, command).await,
        Commands::SpecTests { command } => {
            let (path, options) = match command {
                SpecTestCommands::Run(args) => (args.spec_tests_directory, args.options),
                SpecTestCommands::RunOne(args) => (args.spec_test_file, args.options),
            };
            run_spec_tests_command(&client, &cli.api, path, options).await
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_organization_command(
    client: &AtlasClient,
    command: OrganizationCommands,
) -> Result<ExitCode, Box<dyn Error>> {
    match command {
        OrganizationCommands::List => print_json(&client.list_organizations().await?)?,
        OrganizationCommands::GetOne(args) => {
            match client.find_organization(&args.organization_name).await? {
                Some(organization) => print_json(&organization)?,
                None => println!("None"),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_project_command(
    client: &AtlasClient,
    command: ProjectCommands,
) -> Result<ExitCode, Box<dyn Error>> {
    match command {
        ProjectCommands::Create {
            organization,
            project,
        } => {
            let org = client
                .find_organization(&organization.organization_name)
                .await?
                .ok_or_else(|| {
                    format!("organization {:?} not found", organization.organization_name)
                })?;
            let created = client.create_project(&project.project_name, &org.id).await?;
            info!(project = %created.name, id = %created.id, "Project created");
            print_json(&created)?;
        }
        ProjectCommands::List => print_json(&client.list_projects().await?)?,
        ProjectCommands::GetOne(args) => print_json(&client.get_project(&args.project_name).await?)?,
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_user_command(
    client: &AtlasClient,
    command: UserCommands,
) -> Result<ExitCode, Box<dyn Error>> {
    match command {
        UserCommands::Create {
            credentials,
            project,
        } => {
            let project = client.get_project(&project.project_name).await?;
            ensure_database_user(
                client,
                &project.id,
                &credentials.db_username,
                &credentials.db_password,
            )
            .await?;
            let users = client.list_database_users(&project.id).await?;
            let created: Vec<&Document> = users
                .iter()
                .filter(|user| {
                    user.get("username").and_then(Document::as_str)
                        == Some(credentials.db_username.as_str())
                })
                .collect();
            print_json(&created)?;
        }
        UserCommands::List(args) => {
            let project = client.get_project(&args.project_name).await?;
            print_json(&client.list_database_users(&project.id).await?)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_cluster_command(
    client: &AtlasClient,
    command: ClusterCommands,
) -> Result<ExitCode, Box<dyn Error>> {
    let project = client.get_project(command.project_name()).await?;
    let clusters = client.clusters(&project.id);

    match command {
        ClusterCommands::CreateDedicated(args) => {
            let mut config = dedicated_replica_set(args.instance_size.as_str());
            if let Some(map) = config.as_object_mut() {
                map.insert(
                    "name".to_string(),
                    Document::String(args.cluster.cluster_name.clone()),
                );
            }
            clusters.create_cluster(&config).await?;
            info!(cluster = %args.cluster.cluster_name, size = args.instance_size.as_str(), "Cluster creation requested");
            let cluster = clusters.get_cluster(&args.cluster.cluster_name).await?;
            print_json(&cluster.document)?;
            Ok(ExitCode::SUCCESS)
        }
        ClusterCommands::ResizeDedicated(args) => {
            let config = dedicated_replica_set(args.instance_size.as_str());
            clusters
                .modify_cluster(&args.cluster.cluster_name, &config)
                .await?;
            info!(cluster = %args.cluster.cluster_name, size = args.instance_size.as_str(), "Cluster resize requested");
            let cluster = clusters.get_cluster(&args.cluster.cluster_name).await?;
            print_json(&cluster.document)?;
            Ok(ExitCode::SUCCESS)
        }
        ClusterCommands::ToggleJs(args) => {
            toggle_javascript(&clusters, &args.cluster_name).await?;
            print_json(&clusters.get_process_arguments(&args.cluster_name).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        ClusterCommands::List(_) => {
            let documents: Vec<Document> = clusters
                .list_clusters()
                .await?
                .into_iter()
                .map(|cluster| cluster.document)
                .collect();
            print_json(&documents)?;
            Ok(ExitCode::SUCCESS)
        }
        ClusterCommands::GetOne(args) => {
            let cluster = clusters.get_cluster(&args.cluster_name).await?;
            print_json(&cluster.document)?;
            Ok(ExitCode::SUCCESS)
        }
        ClusterCommands::IsReady(args) => {
            let cluster = clusters.get_cluster(&args.cluster_name).await?;
            if cluster.is_idle() {
                println!("True");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("False");
                Ok(ExitCode::FAILURE)
            }
        }
        ClusterCommands::Delete(args) => {
            clusters.delete_cluster(&args.cluster_name).await?;
            info!(cluster = %args.cluster_name, "Cluster deletion requested");
            println!("DONE!");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_spec_tests_command(
    client: &AtlasClient,
    api: &ApiArgs,
    path: PathBuf,
    args: RunOptions,
) -> Result<ExitCode, Box<dyn Error>> {
    let namer =
        ClusterNamer::new(args.cluster_name_salt.as_str()).with_length(args.cluster_name_length);
    let registry = if path.is_dir() {
        TestPlanRegistry::discover(&path, &namer)?
    } else {
        TestPlanRegistry::from_file(&path, &namer)?
    };
    info!(path = %path.display(), cases = registry.len(), "Test plan loaded");

    let mode = if args.parallel {
        ExecutionMode::Parallel
    } else {
        ExecutionMode::Sequential
    };
    let settings = RunSettings::new(
        &path,
        &args.workload_executor,
        args.cluster_name_salt.as_str(),
    )
    .with_project(args.organization_name.as_str(), args.project_name.as_str())
    .with_db_credentials(args.db_username.as_str(), args.db_password.as_str())
    .with_cluster_name_length(namer.length())
    .with_polling(api.polling())
    .with_maintenance_grace(args.maintenance_grace)
    .with_workload_stop_timeout(args.workload_stop_timeout)
    .with_mode(mode)
    .with_delete_clusters(args.delete_clusters);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("Received shutdown signal, cancelling run");
            cancel.cancel();
        }
    });

    let report = run_spec_tests(
        client,
        |project| Arc::new(client.clusters(&project.id)) as Arc<dyn ResourceClient>,
        settings,
        registry,
        cancel,
    )
    .await;

    write_junit(&report, &args.junit_output)?;
    if let Some(path) = &args.json_output {
        write_json(&report, path)?;
    }

    if report.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn init_tracing(verbose: u8, format: LogFormat) -> Result<(), Box<dyn Error>> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn").add_directive(format!("astrolabe={level}").parse()?),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the run cannot be
/// cancelled cleanly without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
