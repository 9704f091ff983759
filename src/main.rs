//! npad-core - emulated controller core
//!
//! Inspect a player table, replay scripted input against a controller, or
//! keep controllers alive and hot-reload them as the table changes.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::*;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use npad_core::config::{AppConfig, ConfigWatcher, MemoryRepository};
use npad_core::controller::types::PLAYER_SLOTS;
use npad_core::input::engine::VirtualEngine;
use npad_core::replay::{virtual_profile, Replay, Script};
use npad_core::{ControllerUpdateCallback, DeviceFactory, EmulatedController, NpadIdType};

/// npad-core - canonical emulated controller state
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the player table
    #[arg(short, long, default_value = "players.yaml")]
    config: String,

    /// Player number (1-8, 9 = handheld, 10 = other) for --script
    #[arg(short, long)]
    player: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Replay a YAML script and print the report after each step as JSON
    #[arg(long)]
    script: Option<String>,

    /// Keep controllers alive and reload them when the player table changes
    #[arg(long)]
    watch: bool,

    /// Tabulate the configured players
    #[arg(long)]
    list_players: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting npad-core...");
    debug!("Player table: {}", args.config);

    if let Some(script) = &args.script {
        return run_script(&args, script).await;
    }

    if args.watch {
        return run_watch(&args.config).await;
    }

    let config = AppConfig::load(&args.config).await?;
    list_players(&config);
    if !args.list_players {
        println!(
            "\n{}",
            "Use --script <file> to replay input or --watch to keep controllers alive".dimmed()
        );
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}

fn npad_for_player(player: usize) -> Result<NpadIdType> {
    match player.checked_sub(1).and_then(NpadIdType::from_index) {
        Some(id) => Ok(id),
        None => bail!("Player must be between 1 and {}, got {}", PLAYER_SLOTS, player),
    }
}

fn list_players(config: &AppConfig) {
    println!("\n{}", "=== Players ===".bold().cyan());
    println!(
        "  {:<10} {:<22} {:<10} {:<5} {}",
        "SLOT".bold(),
        "TYPE".bold(),
        "STATE".bold(),
        "LED".bold(),
        "MAPPED".bold()
    );

    let supported = config.supported_style_tag();
    for (id, player) in NpadIdType::ALL.iter().zip(&config.players) {
        let style = npad_core::NpadStyleIndex::from(player.controller_type);
        let state = if player.connected {
            "connected".green()
        } else {
            "-".dimmed()
        };
        let kind = format!("{:?}", player.controller_type);
        let kind = if supported.supports(style) {
            kind.normal()
        } else {
            kind.red()
        };
        let mapped = player
            .buttons
            .iter()
            .chain(&player.analogs)
            .filter(|text| !npad_core::ParamPackage::parse(text).is_empty())
            .count();
        println!(
            "  {:<10} {:<22} {:<10} {:<5} {}",
            id.to_string().yellow(),
            kind,
            state,
            id.led_pattern().as_bits(),
            mapped
        );
    }
}

/// Player table for replay: the configured one if it exists, otherwise a
/// table whose every slot is bound to the virtual engine
async fn replay_config(path: &str) -> Result<AppConfig> {
    if Path::new(path).exists() {
        return AppConfig::load(path).await;
    }
    info!("{} not found, binding every slot to the virtual engine", path);
    Ok(AppConfig {
        players: vec![virtual_profile(); PLAYER_SLOTS],
        supported_styles: None,
    })
}

async fn run_script(args: &Args, path: &str) -> Result<()> {
    let script = Script::load(path).await?;
    let player = args.player.or(script.player).unwrap_or(1);
    let npad_id = npad_for_player(player)?;

    let config = replay_config(&args.config).await?;
    let repository = Arc::new(MemoryRepository::new(config));
    let replay = Replay::new(npad_id, repository.clone())?;
    replay
        .controller()
        .set_supported_npad_style_tag(repository.supported_style_tag());

    println!(
        "{} {} ({} steps)",
        "Replaying".bold().cyan(),
        path,
        script.steps.len()
    );

    for report in replay.run(&script) {
        let header = format!("#{} {}", report.step, report.action);
        let header = if report.delivered > 0 {
            header.green()
        } else {
            header.yellow()
        };
        println!("\n{}", header.bold());
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize step report")?;
        println!("{}", json);
    }
    Ok(())
}

async fn run_watch(config_path: &str) -> Result<()> {
    let (mut watcher, initial_config) = ConfigWatcher::new(config_path.to_string()).await?;
    let repository = Arc::new(MemoryRepository::new(initial_config));

    // No physical backend is linked in; the virtual engine stands in for one
    let factory = Arc::new(DeviceFactory::new());
    factory.register(Arc::new(VirtualEngine::new()));

    let controllers: Vec<EmulatedController> = NpadIdType::ALL
        .iter()
        .map(|id| EmulatedController::new(*id, repository.clone(), factory.clone()))
        .collect();

    for controller in &controllers {
        let id = controller.npad_id();
        controller.set_callback(ControllerUpdateCallback::new(move |kind| {
            info!("{}: {:?}", id, kind);
        }));
    }
    reload_all(&controllers, &repository);
    info!("{} controllers ready, watching for changes", controllers.len());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(config) = watcher.next_config() => {
                repository.replace(config);
                reload_all(&controllers, &repository);
            }
            _ = &mut shutdown => break,
        }
    }

    for controller in &controllers {
        controller.unload_input();
    }
    info!("npad-core shutdown complete");
    Ok(())
}

fn reload_all(controllers: &[EmulatedController], repository: &MemoryRepository) {
    let supported = repository.supported_style_tag();
    for controller in controllers {
        if let Err(e) = controller.reload_from_settings() {
            warn!("Failed to reload {}: {}", controller.npad_id(), e);
            continue;
        }
        controller.set_supported_npad_style_tag(supported);
    }
}
