//! parcel-mesh - Control plane for a distributed workflow mesh
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use console::style;
use parcel_mesh::agent::ParcelAgent;
use parcel_mesh::archive::{ParcelArchive, SqliteArchive};
use parcel_mesh::config::{store_config, CliArgs, Command, NodeConfig, ParcelFilter};
use parcel_mesh::identity::Identifier;
use parcel_mesh::monitor::DeadlineMonitor;
use parcel_mesh::node::{CoordinatorConfig, Directories, NodeCoordinator, RedisSiteForwarder};
use parcel_mesh::store::RedisStoreConfig;
use parcel_mesh::task::{ComponentStatus, Parcel, ParcelStatus};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose, args.quiet)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        match &args.command {
            Command::Node(node) => {
                let config = NodeConfig::from_node_args(&args, node).context("Invalid configuration")?;
                run_node(config).await
            }
            Command::Status { format } => run_status(&store_config(&args), format).await,
            Command::Parcel { key, format } => run_parcel(&store_config(&args), key, format).await,
            Command::Parcels { function, all, format } => {
                run_parcels(&store_config(&args), function.as_deref(), *all, format).await
            }
        }
    })
}

async fn run_node(config: NodeConfig) -> Result<()> {
    if config.show_progress {
        println!(
            "{} {}",
            style("[Node]").cyan().bold(),
            style(&config.node_id).green()
        );
        println!("  Redis: {}", style(&config.store.url).dim());
        if config.coordinator.peers.is_empty() {
            println!("  Peers: {}", style("none").dim());
        } else {
            for peer in &config.coordinator.peers {
                println!("  Peer:  {}", style(peer).yellow());
            }
        }
        if config.agent.critical_write {
            println!("  Archive: {}", style(config.archive_path.display()).yellow());
        }
    }

    let directories = Directories::connect_redis(&config.store)
        .await
        .context("Failed to connect to the replicated store")?;
    let forwarder = Arc::new(RedisSiteForwarder::new(&config.store.key_prefix));
    let coordinator = Arc::new(NodeCoordinator::new(
        config.coordinator.clone(),
        directories,
        forwarder,
    ));

    let archive: Option<Arc<dyn ParcelArchive>> = if config.agent.critical_write {
        let archive = SqliteArchive::open(&config.archive_path)
            .with_context(|| format!("Failed to open archive {}", config.archive_path.display()))?;
        Some(Arc::new(archive))
    } else {
        None
    };
    let agent = ParcelAgent::new(Arc::clone(&coordinator), config.agent, archive)
        .context("Invalid agent configuration")?;

    let monitor = DeadlineMonitor::new(Arc::clone(&coordinator), config.deadline);

    // Setup signal handler for graceful shutdown
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        if signal.is_cancelled() {
            eprintln!("\nForce shutdown!");
            std::process::exit(130);
        }
        eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
        signal.cancel();
    })
    .context("Failed to set signal handler")?;

    coordinator.start();
    monitor.start();
    info!(node = %agent.coordinator().node_id(), "Node running");

    shutdown.cancelled().await;

    monitor.stop().await;
    coordinator.stop().await;

    let stats = coordinator.stats();
    if config.show_progress {
        println!();
        println!("{}", style("Node Stopped").green().bold());
        println!("  Heartbeats:         {}", style(stats.heartbeats).cyan());
        println!("  Forwards delivered: {}", style(stats.forwards_delivered).green());
        if stats.forwards_failed > 0 {
            println!("  Forwards failed:    {}", style(stats.forwards_failed).red());
        }
        println!("  Late parcels:       {}", style(stats.late_parcels).yellow());
        println!("  Deadlines fired:    {}", style(monitor.fired()).dim());
    }

    Ok(())
}

/// Coordinator used only for reads; never started
async fn inspector(store: &RedisStoreConfig) -> Result<NodeCoordinator> {
    let directories = Directories::connect_redis(store)
        .await
        .context("Failed to connect to the replicated store")?;
    let node_id = Identifier::new("inspector", "parcel-mesh")?;
    Ok(NodeCoordinator::new(
        CoordinatorConfig::new(node_id),
        directories,
        Arc::new(RedisSiteForwarder::new(&store.key_prefix)),
    ))
}

async fn run_status(store: &RedisStoreConfig, format: &str) -> Result<()> {
    let coordinator = inspector(store).await?;
    let entries = coordinator.watchdog_entries().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let now = Utc::now();
    println!("{}", style("parcel-mesh Status").cyan().bold());
    println!("{}", "=".repeat(50));
    println!();

    let (nodes, wups): (Vec<_>, Vec<_>) =
        entries.iter().partition(|e| e.supported_function.is_none());

    println!("{}", style("Nodes").yellow().bold());
    if nodes.is_empty() {
        println!("  {}", style("No nodes registered").dim());
    }
    for entry in nodes {
        println!(
            "  {} {} (last seen: {}s ago)",
            status_icon(entry.status),
            entry.component_id,
            entry.age_secs(now)
        );
    }
    println!();

    println!("{}", style("Work unit processors").yellow().bold());
    if wups.is_empty() {
        println!("  {}", style("No WUPs registered").dim());
    }
    for entry in wups {
        let function = entry
            .supported_function
            .as_ref()
            .map(Identifier::render)
            .unwrap_or_default();
        println!(
            "  {} {} [{}] {}",
            status_icon(entry.status),
            entry.component_id,
            style(function).dim(),
            entry.status
        );
        if let Some(parcel) = &entry.current_parcel {
            println!("      working on {}", style(parcel).cyan());
        }
    }
    println!();

    println!("Last updated: {}", style(now.format("%Y-%m-%d %H:%M:%S UTC")).dim());
    Ok(())
}

async fn run_parcel(store: &RedisStoreConfig, key: &str, format: &str) -> Result<()> {
    let coordinator = inspector(store).await?;
    let Some(parcel) = coordinator.parcel(key).await? else {
        anyhow::bail!("No parcel stored under {}", key);
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&parcel)?);
        return Ok(());
    }

    let registration = &parcel.registration;
    println!("{}", style(parcel.key()).cyan().bold());
    println!("  Status:     {}", status_text(parcel.status));
    println!("  Function:   {}", registration.supporting_function);
    println!("  Registered: {} by {}", registration.instantiation_instant, registration.registering_wup);
    println!("  Expected:   {}", registration.expected_completion_instant);
    println!("  Owner:      {} ({})", parcel.watchdog.wup_id, parcel.watchdog.status);
    if let Some(outcome) = parcel.uow.outcome {
        println!("  Outcome:    {}", outcome);
    }
    if let Some(precursor) = &parcel.precursor {
        println!("  Precursor:  {}", precursor);
    }
    for successor in parcel.successors() {
        println!("  Successor:  {}", successor);
    }
    for wup in &registration.registered_wups {
        println!("  Interested: {}", style(wup).dim());
    }
    Ok(())
}

async fn run_parcels(
    store: &RedisStoreConfig,
    function: Option<&str>,
    all: bool,
    format: &str,
) -> Result<()> {
    let filter = ParcelFilter {
        function: function
            .map(Identifier::parse)
            .transpose()
            .context("Invalid function identifier")?,
        include_finalised: all,
    };

    let coordinator = inspector(store).await?;
    let mut parcels: Vec<Parcel> = coordinator
        .parcels()
        .await?
        .into_iter()
        .filter(|p| filter.admits(p))
        .collect();
    parcels.sort_by_key(|p| p.registration.instantiation_instant);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&parcels)?);
        return Ok(());
    }

    if parcels.is_empty() {
        println!("{}", style("No parcels stored").dim());
        return Ok(());
    }
    for parcel in &parcels {
        println!(
            "{:<10} {} {}",
            status_text(parcel.status),
            parcel.key(),
            style(&parcel.watchdog.wup_id).dim()
        );
    }
    println!();
    println!("{} parcel(s)", style(parcels.len()).cyan());
    Ok(())
}

fn status_icon(status: ComponentStatus) -> console::StyledObject<&'static str> {
    match status {
        ComponentStatus::Active => style("●").green(),
        ComponentStatus::Idle => style("●").dim(),
        ComponentStatus::Unresponsive => style("○").yellow(),
        ComponentStatus::Failed => style("○").red(),
    }
}

fn status_text(status: ParcelStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        ParcelStatus::Registered => style(text).dim(),
        ParcelStatus::Active => style(text).cyan(),
        ParcelStatus::Finished => style(text).green(),
        ParcelStatus::Finalised => style(text).green().bold(),
        ParcelStatus::Failed => style(text).red(),
    }
}

fn setup_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("parcel_mesh=debug,warn")
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("parcel_mesh=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
