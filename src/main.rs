//! Armitage CLI entry point.
//!
//! Provides `replay`, `storm`, and `catalog` subcommands for feeding
//! recorded faults through the engine, exercising it with a synthetic
//! fault storm, and inspecting the signature table.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use armitage::config::{load_config, EngineConfig};
use armitage::engine::Engine;
use armitage::fault::{FaultSource, RawFault};
use armitage::logging;
use armitage::recovery::FaultOutcome;

/// Runtime fault classification and self-mitigation engine.
#[derive(Parser)]
#[command(name = "armitage", version, about)]
struct Cli {
    /// Path to the engine config TOML; shipped defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Replay recorded faults (one JSON object per line) through the engine.
    Replay {
        /// Path to the JSONL fault capture.
        #[arg(long)]
        input: PathBuf,
    },
    /// Run a deterministic synthetic fault storm and print statistics.
    Storm {
        /// Number of synthetic faults to feed through the engine.
        #[arg(long, default_value_t = 24)]
        count: u32,

        /// RNG seed; equal seeds produce equal storms.
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
    /// Print the signature table in match order.
    Catalog,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_cli();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Replay { input } => handle_replay(&config, &input).await,
        Command::Storm { count, seed } => handle_storm(&config, count, seed).await,
        Command::Catalog => handle_catalog(&config),
    }
}

/// Replay a JSONL fault capture through a fresh engine.
async fn handle_replay(config: &EngineConfig, input: &Path) -> anyhow::Result<()> {
    let engine = Engine::start(config)?;

    let contents = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let mut processed = 0_u64;
    let mut propagated = 0_u64;
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let raw: RawFault = serde_json::from_str(line).with_context(|| {
            format!("invalid fault record on line {}", index.saturating_add(1))
        })?;
        if engine.process(raw).await == FaultOutcome::Propagated {
            propagated = propagated.saturating_add(1);
        }
        processed = processed.saturating_add(1);
    }

    engine.shutdown().await;
    info!(processed, propagated, "replay complete");
    print_statistics(&engine)
}

/// Message and component pairs the storm generator draws from.
const STORM_FAULTS: &[(&str, &str)] = &[
    ("locale data missing for ru-RU", "formatter"),
    ("Collator failed during locale-aware sort", "contact_list"),
    ("malformed surrogate pair in message body", "chat_view"),
    ("accessibility service disconnected", "screen_reader"),
    ("native module 'MediaPlayer' is missing", "bridge"),
    ("bridge payload invalid: expected object", "bridge"),
    ("audio session activation failed", "audio"),
    ("gc pause exceeded budget", "heap_monitor"),
    ("connection reset by peer", "sync_client"),
    ("template render glitch", "home_screen"),
];

/// Drive a seeded random storm of synthetic faults through the engine.
async fn handle_storm(config: &EngineConfig, count: u32, seed: u64) -> anyhow::Result<()> {
    let engine = Engine::start(config)?;
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..count {
        if let Some(&(message, component)) = STORM_FAULTS.choose(&mut rng) {
            let raw = RawFault::new(message, "", FaultSource::DiagnosticLog, false, component);
            engine.process(raw).await;
        }
    }

    engine.shutdown().await;
    info!(count, seed, "storm complete");
    print_statistics(&engine)
}

/// Print the configured signature table in match order.
fn handle_catalog(config: &EngineConfig) -> anyhow::Result<()> {
    let catalog = config
        .signature_catalog()
        .context("invalid signature catalog")?;

    println!(
        "{:<26} {:<14} {:<9} {:<9} {:<22} pattern",
        "id", "category", "action", "severity", "strategy"
    );
    for signature in catalog.iter() {
        println!(
            "{:<26} {:<14} {:<9} {:<9} {:<22} {}",
            signature.id,
            signature.category.to_string(),
            signature.action.to_string(),
            signature.severity.to_string(),
            signature.strategy.as_deref().unwrap_or("-"),
            signature.pattern(),
        );
    }
    Ok(())
}

/// Print engine statistics as pretty JSON on stdout.
fn print_statistics(engine: &Engine) -> anyhow::Result<()> {
    let statistics = engine.statistics();
    let rendered =
        serde_json::to_string_pretty(&statistics).context("failed to render statistics")?;
    println!("{rendered}");
    Ok(())
}
