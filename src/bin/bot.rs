use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vps_deployer::bot::Bot;
use vps_deployer::bot::config::BotConfig;
use vps_deployer::bot::state::AppState;
use vps_deployer::chat::ChatTransport;
use vps_deployer::chat::discord::{DiscordRest, Gateway};
use vps_deployer::db::{JsonFileStore, Store, VpsRecord};
use vps_deployer::docker::{ContainerRuntime, DockerCli};
use vps_deployer::notifications::AuditNotifier;
use vps_deployer::provisioning::{Orchestrator, OrchestratorSettings, ProvisionJournal, ProvisionTicket};
use vps_deployer::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "bot.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = match BotConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load bot configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!(version = VERSION, prefix = %config.command_prefix, data_dir = %config.data_dir, "Starting VPS deployer bot.");

    // --- Record stores ---
    let records = JsonFileStore::<VpsRecord>::open(config.vps_store_path()).await?;
    let tickets = JsonFileStore::<ProvisionTicket>::open(config.journal_path()).await?;
    let records: Arc<dyn Store<VpsRecord>> = Arc::new(records);
    let journal = ProvisionJournal::new(Arc::new(tickets));

    // --- Orchestrator ---
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(config.docker_bin.clone()));
    match runtime.server_version().await {
        Ok(version) => info!(docker_version = %version, "Docker is reachable."),
        Err(e) => warn!(error = %e, "Docker did not answer. Commands will fail until it does."),
    }
    let orchestrator = Arc::new(Orchestrator::new(
        runtime,
        records,
        journal,
        OrchestratorSettings::from(config.as_ref()),
    ));
    match orchestrator.recover_interrupted().await {
        Ok(0) => {}
        Ok(recovered) => info!(recovered, "Rolled back interrupted provisioning runs."),
        Err(e) => error!(error = %e, "Failed to recover interrupted provisioning runs."),
    }

    // --- Chat ---
    let chat: Arc<dyn ChatTransport> = Arc::new(DiscordRest::new(&config.discord_token)?);
    let audit = AuditNotifier::from_config(&config);
    if audit.is_some() {
        info!("Audit webhook enabled.");
    }
    let state = Arc::new(AppState::new(config.clone(), orchestrator, chat, audit));
    let gateway = Gateway::new(&config.discord_token, Arc::new(Bot::new(state)));

    tokio::select! {
        result = gateway.run() => {
            if let Err(e) = result {
                error!(error = %e, "Gateway stopped.");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down.");
        }
    }

    Ok(())
}
