use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use morphlyca_core::api::auth::LoginRequest;
use morphlyca_core::api::media::{download_url, proxy_url};
use morphlyca_core::api::ApiClient;
use morphlyca_core::config::{
    config_path, data_dir, initialize_data_dir, resolve_relative_to, AppConfig,
};
use morphlyca_core::credentials::SessionCredentials;
use morphlyca_core::explore::ExploreSession;
use morphlyca_core::logging::{
    self, FileSinkPlan, LoggingInitOptions, RuntimeLogMode, DEFAULT_LOG_FILTER,
};
use morphlyca_core::poller::PollState;
use morphlyca_core::server::{app_router_with_static, AppState};
use morphlyca_core::submission::UploadFile;
use morphlyca_core::types::{Job, JobStatus};

pub const ENV_TOKEN: &str = "MORPHLYCA_TOKEN";

#[derive(Parser)]
#[command(
    name = "morphlyca",
    about = "Face-swap job console and media gateway",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        global = true,
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(long = "api-url", value_name = "URL", global = true, help = "Backend API base URL")]
    api_url: Option<String>,

    #[arg(long, env = ENV_TOKEN, global = true, hide_env_values = true, help = "Bearer token")]
    token: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    host: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's weight quota.
    Quota,
    /// List the feature catalog.
    Features(FeaturesArgs),
    /// Upload a source and target and start a job.
    Submit(SubmitArgs),
    /// Show one job.
    Job { id: String },
    /// Requeue a failed job.
    Requeue(RequeueArgs),
    /// List recent jobs.
    Jobs(JobsArgs),
    #[command(subcommand)]
    Media(MediaCommand),
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Sign in with email and password and print the issued token.
    Login(LoginArgs),
}

#[derive(Args)]
struct FeaturesArgs {
    #[arg(long, help = "Include inactive entries and processor options")]
    all: bool,
}

#[derive(Args)]
struct SubmitArgs {
    #[arg(help = "Face image to take the identity from")]
    source: PathBuf,
    #[arg(help = "Image or video to apply it to")]
    target: PathBuf,
    #[arg(long)]
    audio: Option<PathBuf>,
    #[arg(
        long = "processor",
        value_name = "NAME",
        help = "Processor to enable (repeatable; default: face_swapper)"
    )]
    processors: Vec<String>,
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,
    #[arg(long, default_value_t = 0)]
    device: u32,
    #[arg(long)]
    no_cuda: bool,
    #[arg(long, value_name = "JSON", help = "Extra worker options as a JSON object")]
    extra: Option<String>,
    #[arg(long, help = "Return once the job is accepted instead of waiting for it")]
    no_wait: bool,
}

#[derive(Args)]
struct RequeueArgs {
    id: String,
    #[arg(long)]
    wait: bool,
}

#[derive(Args)]
struct JobsArgs {
    #[arg(long, default_value_t = 20)]
    take: u32,
    #[arg(long, default_value_t = 0)]
    skip: u32,
}

#[derive(Subcommand)]
enum MediaCommand {
    /// List every output asset.
    List,
    /// Delete an output asset.
    Delete { id: String },
    /// Print the gateway preview and download paths for an asset.
    Url { id: String },
}

#[derive(Subcommand)]
enum AdminCommand {
    Plans,
    Entitlements {
        #[arg(long)]
        plan: Option<i64>,
    },
    Users,
    Subscriptions,
    Summary {
        #[arg(long, default_value_t = morphlyca_core::api::jobs::DEFAULT_ANALYTICS_DAYS)]
        days: u32,
    },
}

#[derive(Args)]
struct LoginArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "MORPHLYCA_PASSWORD", hide_env_values = true)]
    password: String,
}

pub async fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let mode = if cli.command.is_some() {
        RuntimeLogMode::Cli
    } else {
        RuntimeLogMode::Server
    };
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());

    init_logging(
        mode,
        Some(resolved_data_dir.as_path()),
        cli.verbose,
        cli.log_filter.as_deref(),
    );
    log_startup_metadata(mode, Some(resolved_data_dir.as_path()));

    let mut config = load_config(&resolved_data_dir);
    if let Some(api_url) = &cli.api_url {
        config.api.base_url = api_url.clone();
    }

    let Some(command) = cli.command else {
        return run_server(config, cli.port, cli.host, resolved_data_dir).await;
    };

    let credentials = Arc::new(SessionCredentials::new(cli.token));
    let client = Arc::new(
        ApiClient::from_config(&config.api, credentials).context("Invalid API configuration")?,
    );

    match command {
        Commands::Quota => print_json(&client.quota_today().await?),
        Commands::Features(args) => {
            let features = client.all_features().await?;
            let shown: Vec<_> = features
                .iter()
                .filter(|feature| args.all || feature.is_active_processor())
                .collect();
            print_json(&shown)
        }
        Commands::Submit(args) => submit(client, &config, args).await,
        Commands::Job { id } => print_json(&client.get_job(&id).await?),
        Commands::Requeue(args) => requeue(client, &config, args).await,
        Commands::Jobs(args) => print_json(&client.list_jobs(args.take, args.skip).await?),
        Commands::Media(command) => media(&client, command).await,
        Commands::Admin(command) => admin(&client, command).await,
        Commands::Login(args) => {
            let request = LoginRequest {
                email: args.email,
                password: args.password,
            };
            match client.login(&request).await? {
                Some(token) => {
                    println!("{token}");
                    Ok(())
                }
                None => bail!("login succeeded but the response carried no token"),
            }
        }
    }
}

fn load_config(data_dir: &Path) -> AppConfig {
    if let Err(e) = initialize_data_dir(data_dir) {
        warn!(error = %e, "Failed to initialize data directory");
    }
    let cfg_path = config_path(data_dir);
    let mut config = match AppConfig::load_from_path(&cfg_path) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config file, using defaults");
            AppConfig::default()
        }
    };
    config.apply_env_overrides();
    config
}

#[cfg(test)]
fn select_log_filter(
    noise_base: &str,
    rust_log_env: Option<&str>,
    verbose: u8,
    cli_log_filter: Option<&str>,
) -> String {
    let options = LoggingInitOptions {
        mode: RuntimeLogMode::Server,
        data_dir: None,
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: rust_log_env.map(ToString::to_string),
        default_log_filter: DEFAULT_LOG_FILTER.to_string(),
        noise_filter: noise_base.to_string(),
        include_noise_filter_when_implicit: true,
        retention_files: logging::DEFAULT_LOG_RETENTION_FILES,
    };

    logging::select_log_filter(&options)
}

fn init_logging(
    mode: RuntimeLogMode,
    data_dir: Option<&Path>,
    verbose: u8,
    cli_log_filter: Option<&str>,
) {
    let init_options = LoggingInitOptions {
        mode,
        data_dir: data_dir.map(Path::to_path_buf),
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        ..Default::default()
    };
    let init_plan = logging::compose_logging_init_plan(&init_options);
    let console_filter = init_plan.filters.console_filter;
    let file_filter = init_plan.filters.file_filter;

    match init_plan.file_sink {
        FileSinkPlan::Ready(ready) => {
            let console_env_filter = parse_env_filter_with_fallback(&console_filter, "console");
            let file_env_filter = parse_env_filter_with_fallback(&file_filter, "file");

            let subscriber = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_filter(console_env_filter),
                )
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(logging::redacting_make_writer(ready.appender))
                        .with_filter(file_env_filter),
                );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
            }
        }
        FileSinkPlan::Fallback(fallback) => {
            let attempted_log_dir = fallback
                .attempted_log_dir
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<none>".to_string());
            let reason = fallback.reason;

            let console_env_filter = parse_env_filter_with_fallback(&console_filter, "console");
            let subscriber = tracing_subscriber::registry().with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(console_env_filter),
            );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
                return;
            }

            warn!(
                attempted_log_dir = %attempted_log_dir,
                reason = %reason,
                "Persistent file logging unavailable; continuing with console-only logging"
            );
        }
    }
}

fn parse_env_filter_with_fallback(filter: &str, sink_name: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid {sink_name} log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

fn log_startup_metadata(mode: RuntimeLogMode, data_dir: Option<&Path>) {
    let pid = std::process::id();
    if let Some(data_dir) = data_dir {
        let cfg_path = config_path(data_dir);
        info!(
            mode = mode.name(),
            pid,
            data_dir = %data_dir.display(),
            config_path = %cfg_path.display(),
            "Runtime startup metadata"
        );
    } else {
        info!(mode = mode.name(), pid, "Runtime startup metadata");
    }
}

async fn run_server(
    config: AppConfig,
    port_override: Option<u16>,
    host_override: Option<String>,
    data_dir: PathBuf,
) -> Result<()> {
    let port = port_override.unwrap_or(config.server.port);
    let host = host_override.unwrap_or_else(|| config.server.host.clone());

    let static_path = config
        .server
        .static_dir
        .as_deref()
        .map(|dir| resolve_relative_to(&data_dir, dir))
        .filter(|dir| {
            let found = dir.is_dir();
            if !found {
                info!(path = %dir.display(), "Static directory not found; serving API only");
            }
            found
        });

    let state = AppState::from_config(config);
    let app = app_router_with_static(state, static_path.as_deref());

    let addr = format!("{host}:{port}");
    info!(%addr, "Starting morphlyca gateway");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolve the processors to enable against the active catalog. An empty
/// request keeps the default selection.
fn resolve_processors(available: &[String], requested: &[String]) -> Result<Option<Vec<String>>> {
    if requested.is_empty() {
        return Ok(None);
    }
    if let Some(unknown) = requested.iter().find(|name| !available.contains(name)) {
        bail!(
            "unknown or inactive processor '{unknown}' (available: {})",
            available.join(", ")
        );
    }
    Ok(Some(requested.to_vec()))
}

async fn submit(client: Arc<ApiClient>, config: &AppConfig, args: SubmitArgs) -> Result<()> {
    let mut session = ExploreSession::with_client(client, &config.polling);
    session.load().await.context("Failed to load the feature catalog")?;

    let available: Vec<String> = session.processors().map(|p| p.name.clone()).collect();
    if let Some(requested) = resolve_processors(&available, &args.processors)? {
        for name in &available {
            session.set_processor(name, requested.contains(name));
        }
    }

    session.set_source(Some(UploadFile::from_path(&args.source).await?));
    session.set_target(Some(UploadFile::from_path(&args.target).await?));
    if let Some(audio) = &args.audio {
        session.set_audio(Some(UploadFile::from_path(audio).await?));
    }

    let options = session.options_mut();
    if let Some(model) = args.model {
        options.face_swapper_model = model;
    }
    options.use_cuda = !args.no_cuda;
    options.device_id = args.device;
    if let Some(extra) = &args.extra {
        options.merge_raw_extra(extra);
    }

    let summary = session.summary();
    if !session.can_submit() {
        bail!(
            "selection needs {} weight but only {} of {} remains today",
            summary.total_selected_weight,
            summary.remaining,
            summary.daily_limit
        );
    }

    let job_id = session.submit().await?;
    info!(
        job_id = %job_id,
        weight = summary.total_selected_weight,
        "Job accepted"
    );
    if args.no_wait {
        println!("{job_id}");
        session.teardown();
        return Ok(());
    }

    let job = wait_for_settle(&session).await;
    session.teardown();
    report_settled(job?)
}

async fn requeue(client: Arc<ApiClient>, config: &AppConfig, args: RequeueArgs) -> Result<()> {
    let current = client.get_job(&args.id).await?;
    if current.status != JobStatus::Failed {
        bail!("job {} is {}; only failed jobs can be requeued", current.id, current.status);
    }
    if !args.wait {
        return print_json(&client.requeue_job(&args.id).await?);
    }

    let session = ExploreSession::with_client(client, &config.polling);
    session.poller().track(current);
    let requeued = session.requeue().await?;
    info!(job_id = %requeued.id, "Job requeued");
    let job = wait_for_settle(&session).await;
    session.teardown();
    report_settled(job?)
}

/// Block until the active poll settles or the user interrupts.
async fn wait_for_settle(session: &ExploreSession) -> Result<Job> {
    let mut updates = session.poller().subscribe();
    let mut last_status = None;
    loop {
        {
            let state = updates.borrow_and_update();
            if let PollState::Settled(job) = &*state {
                return Ok(job.clone());
            }
            let status = state.status();
            if status != last_status {
                if let Some(status) = status {
                    info!(job_id = state.job_id().unwrap_or_default(), %status, "Job status");
                }
                last_status = status;
            }
        }

        tokio::select! {
            changed = updates.changed() => changed.context("job poller stopped")?,
            _ = tokio::signal::ctrl_c() => bail!("interrupted; the job keeps running on the server"),
        }
    }
}

fn report_settled(job: Job) -> Result<()> {
    print_json(&job)?;
    if job.status == JobStatus::Failed {
        bail!(
            "job {} failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("no error message")
        );
    }
    Ok(())
}

async fn media(client: &ApiClient, command: MediaCommand) -> Result<()> {
    match command {
        MediaCommand::List => print_json(&client.all_media().await?),
        MediaCommand::Delete { id } => print_json(&client.delete_media(&id).await?),
        MediaCommand::Url { id } => {
            let assets = client.all_media().await?;
            let asset = assets
                .iter()
                .find(|asset| asset.id == id)
                .with_context(|| format!("no output asset with id {id}"))?;
            println!("{}", proxy_url(asset));
            println!("{}", download_url(asset));
            Ok(())
        }
    }
}

async fn admin(client: &ApiClient, command: AdminCommand) -> Result<()> {
    match command {
        AdminCommand::Plans => print_json(&client.plans().await?),
        AdminCommand::Entitlements { plan: Some(plan) } => {
            print_json(&client.entitlements_for_plan(plan).await?)
        }
        AdminCommand::Entitlements { plan: None } => print_json(&client.entitlements().await?),
        AdminCommand::Users => print_json(&client.users().await?),
        AdminCommand::Subscriptions => print_json(&client.subscriptions().await?),
        AdminCommand::Summary { days } => print_json(&client.summary_analytics(days).await?),
    }
}
