#![deny(warnings)]

//! Batch driver for the deep-earth mining planner.
//!
//! Runs the two sequential phases: the depth phase picks the optimal
//! mining depth per location and horizon and persists its result table;
//! the portfolio phase re-reads that table and picks the mineral set and
//! ore tonnage for one location. Either phase can run alone.

use anyhow::{bail, Context, Result};
use mine_core::{default_registry, Location, MineralRegistry};
use mine_opt::{
    optimize_depths, optimize_portfolio, zero_depth_assignment, DepthChoice, PortfolioChoice,
    SearchConfig,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    Depth,
    Portfolio,
    All,
}

struct Args {
    data_dir: PathBuf,
    out_dir: PathBuf,
    config: Option<PathBuf>,
    phase: Phase,
    location: Location,
}

fn parse_args() -> Result<Args> {
    let mut data_dir = PathBuf::from("data");
    let mut out_dir = PathBuf::from("out");
    let mut config = None;
    let mut phase = Phase::All;
    let mut location = Location::from_short("A");
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--data-dir" => data_dir = it.next().context("--data-dir needs a path")?.into(),
            "--out-dir" => out_dir = it.next().context("--out-dir needs a path")?.into(),
            "--config" => config = Some(it.next().context("--config needs a path")?.into()),
            "--phase" => {
                phase = match it.next().as_deref() {
                    Some("depth") => Phase::Depth,
                    Some("portfolio") => Phase::Portfolio,
                    Some("all") => Phase::All,
                    other => bail!("unknown phase {other:?}; expected depth, portfolio, or all"),
                }
            }
            "--location" => {
                location =
                    Location::from_short(&it.next().context("--location needs a label")?)
            }
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(Args {
        data_dir,
        out_dir,
        config,
        phase,
        location,
    })
}

fn load_config(path: Option<&Path>) -> Result<SearchConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_yaml::from_str(&text).context("parsing search config")?
        }
        None => SearchConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn print_depth_table(choices: &[DepthChoice]) {
    println!("{:<14} {:>8} {:>14} {:>16}", "Horizon", "Location", "Optimal Depth", "Profit (B USD)");
    println!("{}", "-".repeat(56));
    for c in choices {
        println!(
            "{:<14} {:>8} {:>11} km {:>16.3}",
            c.horizon.label(),
            c.location.short_label(),
            c.depth_km,
            c.profit_usd / 1e9
        );
    }
}

fn print_portfolio_table(choices: &[PortfolioChoice], registry: &MineralRegistry) {
    println!(
        "{:<14} {:>8} {:>9} {:>14} {:>16}  Minerals",
        "Horizon", "Depth", "Count", "Ore (tons)", "Profit (B USD)"
    );
    println!("{}", "-".repeat(80));
    for c in choices {
        let minerals = c
            .minerals
            .iter()
            .map(|id| registry.display(id).unwrap_or(&id.0).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<14} {:>5} km {:>9} {:>14.0} {:>16.3}  {}",
            c.horizon.label(),
            c.depth_km,
            c.minerals.len(),
            c.ore_tons,
            c.profit_usd / 1e9,
            minerals
        );
    }
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args()?;
    let config = load_config(args.config.as_deref())?;
    let registry = default_registry()?;
    let tables = data_pipeline::load_reference_tables(&args.data_dir, &registry)
        .with_context(|| format!("loading reference tables from {}", args.data_dir.display()))?;
    info!(
        composition_rows = tables.composition.len(),
        cost_rows = tables.cost.len(),
        market_rows = tables.market.len(),
        "reference tables loaded"
    );

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let depth_path = args.out_dir.join("depth_results.csv");

    if args.phase == Phase::Depth || args.phase == Phase::All {
        let choices = optimize_depths(&tables, &config)?;
        print_depth_table(&choices);
        persistence::write_depth_results(&depth_path, &choices)?;
        info!(path = %depth_path.display(), "depth phase complete");
    }

    if args.phase == Phase::Portfolio || args.phase == Phase::All {
        let depths = match persistence::read_depth_assignment(&depth_path, &args.location) {
            Ok(depths) => depths,
            Err(e) => {
                warn!(
                    error = %e,
                    "depth results unavailable; falling back to surface depth for every horizon"
                );
                zero_depth_assignment()
            }
        };
        let choices = optimize_portfolio(&tables, &args.location, &depths, &config)?;
        if choices.is_empty() {
            info!(location = %args.location, "no viable production at any horizon");
        } else {
            print_portfolio_table(&choices, &registry);
        }
        let portfolio_path = args.out_dir.join("portfolio_results.csv");
        persistence::write_portfolio_results(&portfolio_path, &choices, &registry)?;
        info!(path = %portfolio_path.display(), "portfolio phase complete");
    }

    Ok(())
}
