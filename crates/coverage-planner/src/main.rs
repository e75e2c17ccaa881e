//! Satellite Pool Planning CLI
//!
//! Plans a working pool from propagated candidates and writes the plan,
//! coverage report and verdict as JSON.
//!
//! Usage:
//!   plan-pool --candidates data/starlink_candidates.json \
//!             --preset starlink --target-pool-size 96 \
//!             --output data/starlink_pool_plan.json
//!
//! Grow a previous plan after a failed verdict:
//!   plan-pool --candidates data/starlink_candidates.json \
//!             --seed-pool data/starlink_pool_plan.json --target-pool-size 120
//!
//! Plan a mixed catalog, one pool per constellation:
//!   plan-pool --candidates data/mixed_candidates.json \
//!             --preset starlink --preset oneweb --output data/pool_plans.json

use anyhow::{Context, Result};
use clap::Parser;
use coverage_planner::{
    loader, planner, ConstellationPlanOutcome, ConstellationPreset, ConstellationProfiles,
    PlanOutcome, PlannerConfig,
};
use std::fs::File;
use serde::Serialize;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "plan-pool",
    about = "Plan a coverage-driven LEO satellite pool for a ground observer"
)]
struct Args {
    /// Candidate satellites JSON (array or {"candidates": [...]})
    #[arg(short = 'c', long)]
    candidates: PathBuf,

    /// Planning profile JSON; overrides --preset
    #[arg(short = 'p', long)]
    profile: Option<PathBuf>,

    /// Constellation profiles JSON ({"starlink": {...}, "oneweb": {...}});
    /// plans each constellation separately
    #[arg(long, conflicts_with = "profile")]
    profiles: Option<PathBuf>,

    /// Built-in constellation profile; repeat to plan several constellations
    #[arg(long, value_enum)]
    preset: Vec<ConstellationPreset>,

    /// Existing pool to grow (id list or a previous plan output)
    #[arg(long)]
    seed_pool: Option<PathBuf>,

    #[arg(short = 't', long)]
    target_pool_size: Option<usize>,

    /// Required simultaneously visible satellites
    #[arg(short = 'm', long)]
    min_visible: Option<usize>,

    /// Output JSON file
    #[arg(short, long, default_value = "data/pool_plan.json")]
    output: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", "=".repeat(60));
    info!("LEO Satellite Pool Planner");
    info!("{}", "=".repeat(60));

    let multi = match (&args.profiles, args.preset.len()) {
        (Some(path), _) => Some(
            ConstellationProfiles::from_json_file(path)
                .with_context(|| format!("reading profiles {:?}", path))?,
        ),
        (None, n) if n > 1 && args.profile.is_none() => {
            Some(ConstellationProfiles::from_presets(&args.preset))
        }
        _ => None,
    };

    match multi {
        Some(profiles) => run_constellations(&args, &profiles),
        None => run_single(&args),
    }
}

fn run_single(args: &Args) -> Result<()> {
    let mut config = match (&args.profile, args.preset.first()) {
        (Some(path), _) => PlannerConfig::from_json_file(path)
            .with_context(|| format!("reading profile {:?}", path))?,
        (None, Some(preset)) => preset.config(),
        (None, None) => PlannerConfig::default(),
    };
    if let Some(n) = args.target_pool_size {
        config = config.target_pool_size(n);
    }
    if let Some(n) = args.min_visible {
        config = config.min_visible(n);
        // Keep the visible range consistent when only the floor is raised
        if config.max_visible_satellites < n {
            config = config.max_visible(n);
        }
    }
    config.validate()?;

    let catalog = loader::load_candidates(&args.candidates, &config)
        .with_context(|| format!("loading candidates from {:?}", args.candidates))?;

    let outcome = match &args.seed_pool {
        Some(path) => {
            let seed = loader::load_seed_ids(path)?;
            planner::extend(&config, catalog, &seed)?
        }
        None => planner::plan(&config, catalog)?,
    };

    write_output(&args.output, &outcome)?;

    info!("{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    summarize(&outcome);

    Ok(())
}

fn run_constellations(args: &Args, profiles: &ConstellationProfiles) -> Result<()> {
    if args.seed_pool.is_some() {
        anyhow::bail!("--seed-pool grows a single pool; pass one --preset or --profile");
    }
    if args.target_pool_size.is_some() || args.min_visible.is_some() {
        warn!("--target-pool-size and --min-visible are ignored with several constellations");
    }
    profiles.validate()?;

    let catalog = loader::load_candidates(&args.candidates, profiles)
        .with_context(|| format!("loading candidates from {:?}", args.candidates))?;
    let outcome: ConstellationPlanOutcome = planner::plan_constellations(profiles, catalog)?;

    write_output(&args.output, &outcome)?;

    info!("{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!(
        "{} candidates, {} accepted, {} skipped",
        outcome.metadata.total_candidates,
        outcome.metadata.accepted_candidates,
        outcome.metadata.skipped_count
    );
    for (tag, plan) in &outcome.constellations {
        info!("[{}]", tag);
        summarize(plan);
    }
    info!("Overall: {}", if outcome.passed { "PASS" } else { "FAIL" });

    Ok(())
}

fn write_output(path: &Path, outcome: &impl Serialize) -> Result<()> {
    info!("Writing plan to {:?}", path);
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, outcome)?;
    Ok(())
}

fn summarize(outcome: &PlanOutcome) {
    let verdict = &outcome.verdict;
    info!(
        "Pool: {} / {} satellites ({} candidates, {} skipped)",
        outcome.pool.satellite_ids.len(),
        outcome.pool.target_size,
        outcome.metadata.accepted_candidates,
        outcome.metadata.skipped_count
    );
    info!(
        "Coverage: {:.1}%  visible min/avg/max {}/{:.1}/{}",
        verdict.coverage_ratio * 100.0,
        verdict.min_visible,
        verdict.avg_visible,
        verdict.max_visible
    );
    info!(
        "Gaps: {} (longest {:.1} min)  phase diversity {:.2} ({:?})",
        verdict.gaps_count, verdict.max_gap_minutes, verdict.phase_diversity, verdict.diversity_rating
    );
    info!(
        "Remediation: {} iterations, {:?}",
        outcome.remediation.steps.len(),
        outcome.remediation.termination
    );
    info!("Verdict: {}", if verdict.passed { "PASS" } else { "FAIL" });
    for diagnostic in &verdict.diagnostics {
        info!("  {}", diagnostic);
    }
}
