#![deny(warnings)]

//! Persistence layer: the CSV exchange tables between the two phases.
//!
//! The depth phase's result table is the system's only persisted artifact
//! relevant to correctness: the portfolio phase re-reads it as its sole
//! source of per-horizon depth selection. Its schema (horizon label,
//! location short label, `"<n> km"` depth label, profit in billions) must
//! match exactly between writer and reader; the round-trip is lossless for
//! (horizon, location, depth).

use mine_core::{Horizon, Location, MineralRegistry};
use mine_opt::{DepthAssignment, DepthChoice, PortfolioChoice};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Tagged persistence failures. The caller decides between the zero-depth
/// fallback and aborting; nothing here swallows errors into defaults.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("unrecognized horizon label: {0:?}")]
    BadHorizonLabel(String),
    #[error("unrecognized depth label: {0:?}")]
    BadDepthLabel(String),
    #[error("no depth row for {} at horizon {}", location, horizon.label())]
    MissingHorizon { location: Location, horizon: Horizon },
}

const BILLION: f64 = 1e9;

#[derive(Debug, Serialize, Deserialize)]
struct DepthRow {
    #[serde(rename = "Horizon")]
    horizon: String,
    #[serde(rename = "Location")]
    location: String,
    #[serde(rename = "Optimal Depth")]
    depth: String,
    #[serde(rename = "Profit (B USD)")]
    profit_b_usd: f64,
}

#[derive(Debug, Serialize)]
struct PortfolioRow {
    #[serde(rename = "Horizon")]
    horizon: String,
    #[serde(rename = "Optimal Depth")]
    depth: String,
    #[serde(rename = "Number of Minerals")]
    mineral_count: usize,
    #[serde(rename = "Minerals Selected")]
    minerals: String,
    #[serde(rename = "Ore Tonnage (tons)")]
    ore_tons: f64,
    #[serde(rename = "Profit (B USD)")]
    profit_b_usd: f64,
}

/// Depth label: integral depths print without a fractional part
/// ("2 km"), others keep it ("2.5 km"). Lossless for the survey's depths.
fn format_depth_label(depth_km: f64) -> String {
    if depth_km.fract() == 0.0 {
        format!("{} km", depth_km as i64)
    } else {
        format!("{depth_km} km")
    }
}

fn parse_depth_label(label: &str) -> Result<f64, PersistError> {
    label
        .strip_suffix(" km")
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or_else(|| PersistError::BadDepthLabel(label.to_string()))
}

/// Write the depth phase's result table.
pub fn write_depth_results(path: &Path, choices: &[DepthChoice]) -> Result<(), PersistError> {
    let mut writer = csv::Writer::from_path(path)?;
    for choice in choices {
        writer.serialize(DepthRow {
            horizon: choice.horizon.label().to_string(),
            location: choice.location.short_label().to_string(),
            depth: format_depth_label(choice.depth_km),
            profit_b_usd: choice.profit_usd / BILLION,
        })?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = choices.len(), "depth results written");
    Ok(())
}

/// Re-read the persisted depth table as the portfolio phase's depth
/// assignment for one location. Every horizon must be present; a partial
/// table is a [`PersistError::MissingHorizon`], not a silent default.
pub fn read_depth_assignment(
    path: &Path,
    location: &Location,
) -> Result<DepthAssignment, PersistError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut assignment = DepthAssignment::new();
    for row in reader.deserialize() {
        let row: DepthRow = row?;
        if row.location != location.short_label() {
            continue;
        }
        let horizon = Horizon::parse_label(&row.horizon)
            .ok_or_else(|| PersistError::BadHorizonLabel(row.horizon.clone()))?;
        assignment.insert(horizon, parse_depth_label(&row.depth)?);
    }
    for horizon in Horizon::ALL {
        if !assignment.contains_key(&horizon) {
            return Err(PersistError::MissingHorizon {
                location: location.clone(),
                horizon,
            });
        }
    }
    Ok(assignment)
}

/// Write the portfolio phase's result table. Minerals are joined by their
/// display labels; ids missing from the registry fall back to the
/// canonical form.
pub fn write_portfolio_results(
    path: &Path,
    choices: &[PortfolioChoice],
    registry: &MineralRegistry,
) -> Result<(), PersistError> {
    let mut writer = csv::Writer::from_path(path)?;
    for choice in choices {
        let minerals = choice
            .minerals
            .iter()
            .map(|id| registry.display(id).unwrap_or(&id.0).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writer.serialize(PortfolioRow {
            horizon: choice.horizon.label().to_string(),
            depth: format_depth_label(choice.depth_km),
            mineral_count: choice.minerals.len(),
            minerals,
            ore_tons: choice.ore_tons,
            profit_b_usd: choice.profit_usd / BILLION,
        })?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = choices.len(), "portfolio results written");
    Ok(())
}
