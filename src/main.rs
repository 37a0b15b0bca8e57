mod cli;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use lintas::config::LintasConfig;
use lintas::mirror::{MemoryMirror, Mirror, RealtimeDbClient};
use lintas::state_machine::{CleaningPayload, DeliveryPayload, EntityKind, Payload};
use lintas::store::Store;
use lintas::{ReplicationSettings, TransitionService};

const MAX_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = LintasConfig::load(&cli.config)?;
    let grace = Duration::from_secs(cli.wait_secs);

    match cli.command.kind() {
        None => {
            Store::connect(&config.database_url, 1)
                .await
                .with_context(|| format!("migrating {}", config.database_url))?;
            println!("schema up to date at {}", config.database_url);
            Ok(())
        }
        Some(EntityKind::Delivery) => run::<DeliveryPayload>(cli.command, &config, grace).await,
        Some(EntityKind::Cleaning) => run::<CleaningPayload>(cli.command, &config, grace).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "lintas=debug" } else { "lintas=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn build_mirror(config: &LintasConfig) -> Result<Arc<dyn Mirror>> {
    if config.mirror.base_url.is_empty() {
        warn!("mirror.base_url not set; mirroring to memory only");
        return Ok(Arc::new(MemoryMirror::new()));
    }
    let client = RealtimeDbClient::new(
        config.mirror.base_url.clone(),
        Some(config.mirror.auth_token.clone()),
        config.mirror.push_timeout(),
    )
    .context("building mirror client")?;
    Ok(Arc::new(client))
}

async fn run<P: Payload>(command: Command, config: &LintasConfig, grace: Duration) -> Result<()> {
    let table = config.table(P::KIND);
    let graph = table.graph()?;

    if let Command::Stages { .. } = command {
        ui::print_stages(P::KIND, &graph);
        return Ok(());
    }

    let store = Store::connect(&config.database_url, MAX_CONNECTIONS)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    let service = TransitionService::<P>::start(
        graph,
        store,
        build_mirror(config)?,
        ReplicationSettings {
            domain: table.domain.clone(),
            backoff: config.retry.backoff(),
            queue_capacity: config.retry.queue_capacity,
            push_timeout: config.mirror.push_timeout(),
        },
    );

    let outcome = execute(&service, command).await;

    let progress = ui::DrainProgress::start(P::KIND);
    let report = service.shutdown(grace).await;
    progress.finish(&report);

    outcome
}

async fn execute<P: Payload>(service: &TransitionService<P>, command: Command) -> Result<()> {
    match command {
        Command::Register { date, payload, .. } => {
            let payload: P = serde_json::from_str(&payload).context("parsing --payload")?;
            let record = service.register(date, payload).await?;
            ui::print_record(&format!("{} {} registered", P::KIND, record.id), &record);
        }
        Command::Transition {
            id,
            status,
            actor,
            notes,
            ..
        } => match service.request_transition(id, &status, &actor, &notes).await {
            Ok(record) => {
                ui::print_record(&format!("{} {id} → {status}", P::KIND), &record);
            }
            Err(err) if err.is_rejection() => {
                let current = service.current(id).await.ok();
                let allowed = current
                    .as_ref()
                    .map(|record| service.graph().successors(&record.status));
                ui::print_rejection(&err, allowed.as_deref());
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        },
        Command::Status { id, .. } => {
            let record = service.current(id).await?;
            ui::print_record(&format!("{} {id}", P::KIND), &record);
        }
        Command::History { id, .. } => {
            let entries = service.history(id).await?;
            ui::print_history(P::KIND, id, &entries);
        }
        Command::Resync { date, .. } => {
            let report = service.resync(date).await?;
            ui::print_resync(P::KIND, &report);
        }
        // Handled before the service starts.
        Command::Migrate | Command::Stages { .. } => {}
    }
    Ok(())
}
