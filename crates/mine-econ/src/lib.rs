#![deny(warnings)]

//! Economic model for the deep-earth mining planner.
//!
//! This crate provides:
//! - The profit model: total extraction profit for a (location, depth,
//!   year, mineral set, ore tonnage) trial
//! - Demand-gap ranking: which minerals are worth considering at all
//! - Unit-margin ranking: the per-ton profitability order the portfolio
//!   search consumes
//!
//! All functions are pure over an immutable [`ReferenceTables`] borrow;
//! lookups are exact-match with no interpolation across depths or years.

use mine_core::{DepthKm, Location, MarketTable, MineralId, ReferenceTables};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors produced by profit evaluation. Every variant is a missing
/// reference row; the caller decides whether that makes a trial
/// unattainable (depth search) or is a hard failure (portfolio search).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("no composition row for {location} at {depth_km} km")]
    MissingCompositionRow { location: Location, depth_km: f64 },
    #[error("no cost row for {location} at {depth_km} km")]
    MissingCostRow { location: Location, depth_km: f64 },
    #[error("no market row for {mineral} in {year}")]
    MissingMarketRow { mineral: MineralId, year: i32 },
    #[error("no refining cost for {mineral}")]
    MissingRefiningCost { mineral: MineralId },
}

/// Profit calculator over a set of reference tables.
pub struct ProfitModel<'a> {
    tables: &'a ReferenceTables,
}

impl<'a> ProfitModel<'a> {
    pub fn new(tables: &'a ReferenceTables) -> Self {
        Self { tables }
    }

    /// Total profit in USD for processing `ore_tons` of ore at
    /// (location, depth), selling the listed minerals at `year` prices.
    ///
    /// Per mineral: recoverable metal mass is the composition share of the
    /// ore tonnage, capped by the unmet market demand (negative gaps clamp
    /// to zero); the blended per-ton-ore mining cost is reallocated onto
    /// the mineral's metal mass proportionally to its ore share; the
    /// contribution is effective mass times (price minus mining minus
    /// refining cost) and may be negative. Minerals absent from the row or
    /// with a saturated market contribute zero.
    pub fn profit(
        &self,
        location: &Location,
        depth: DepthKm,
        year: i32,
        minerals: &[MineralId],
        ore_tons: f64,
    ) -> Result<f64, EvalError> {
        let row = self.tables.composition.row(location, depth).ok_or_else(|| {
            EvalError::MissingCompositionRow {
                location: location.clone(),
                depth_km: depth.into_inner(),
            }
        })?;
        let cost_per_ton_ore = self
            .tables
            .cost
            .mining_cost_per_ton(location, depth)
            .ok_or_else(|| EvalError::MissingCostRow {
                location: location.clone(),
                depth_km: depth.into_inner(),
            })?;

        let mut total = 0.0;
        for mineral in minerals {
            total += self.contribution(row, cost_per_ton_ore, year, mineral, ore_tons)?;
        }
        Ok(total)
    }

    /// [`ProfitModel::profit`] minus the logistics surcharge for
    /// processing `minerals.len()` streams, sized by ore tonnage. Used by
    /// the portfolio search only.
    pub fn profit_with_logistics(
        &self,
        location: &Location,
        depth: DepthKm,
        year: i32,
        minerals: &[MineralId],
        ore_tons: f64,
    ) -> Result<f64, EvalError> {
        let base = self.profit(location, depth, year, minerals, ore_tons)?;
        let per_ton = self
            .tables
            .logistics
            .cost_per_ton(location, minerals.len() as u32);
        Ok(base - per_ton * ore_tons)
    }

    fn contribution(
        &self,
        row: &BTreeMap<MineralId, f64>,
        cost_per_ton_ore: f64,
        year: i32,
        mineral: &MineralId,
        ore_tons: f64,
    ) -> Result<f64, EvalError> {
        let Some(pct) = row.get(mineral).copied().filter(|p| *p > 0.0) else {
            return Ok(0.0);
        };
        let mass_metal = pct / 100.0 * ore_tons;

        let entry = self.tables.market.get(mineral, year).ok_or_else(|| {
            EvalError::MissingMarketRow {
                mineral: mineral.clone(),
                year,
            }
        })?;
        let gap_tons = (entry.gap_kt() * 1000.0).max(0.0);
        if gap_tons == 0.0 {
            // Saturated market: nothing sellable.
            return Ok(0.0);
        }
        let effective_mass = mass_metal.min(gap_tons);

        let mining_cost_per_ton_metal = cost_per_ton_ore / (pct / 100.0);
        let refining = self.tables.refining.cost_per_ton(mineral).ok_or_else(|| {
            EvalError::MissingRefiningCost {
                mineral: mineral.clone(),
            }
        })?;
        let total_cost_per_ton = mining_cost_per_ton_metal + refining;

        Ok(effective_mass * (entry.price_usd_per_ton - total_cost_per_ton))
    }

    /// Per-ton-of-metal margin for one mineral: price minus reallocated
    /// mining cost minus refining cost. Ignores the demand cap; it ranks
    /// minerals, it does not measure total profit. `Ok(None)` when the
    /// mineral is absent from the row or its market is saturated.
    pub fn unit_margin(
        &self,
        location: &Location,
        depth: DepthKm,
        year: i32,
        mineral: &MineralId,
    ) -> Result<Option<f64>, EvalError> {
        let row = self.tables.composition.row(location, depth).ok_or_else(|| {
            EvalError::MissingCompositionRow {
                location: location.clone(),
                depth_km: depth.into_inner(),
            }
        })?;
        let cost_per_ton_ore = self
            .tables
            .cost
            .mining_cost_per_ton(location, depth)
            .ok_or_else(|| EvalError::MissingCostRow {
                location: location.clone(),
                depth_km: depth.into_inner(),
            })?;
        let Some(pct) = row.get(mineral).copied().filter(|p| *p > 0.0) else {
            return Ok(None);
        };
        let entry = self.tables.market.get(mineral, year).ok_or_else(|| {
            EvalError::MissingMarketRow {
                mineral: mineral.clone(),
                year,
            }
        })?;
        if entry.gap_kt() * 1000.0 <= 0.0 {
            return Ok(None);
        }
        let refining = self.tables.refining.cost_per_ton(mineral).ok_or_else(|| {
            EvalError::MissingRefiningCost {
                mineral: mineral.clone(),
            }
        })?;
        let mining_cost_per_ton_metal = cost_per_ton_ore / (pct / 100.0);
        Ok(Some(
            entry.price_usd_per_ton - (mining_cost_per_ton_metal + refining),
        ))
    }
}

/// A mineral ranked by unit margin for the portfolio search.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedMineral {
    pub id: MineralId,
    /// Price minus allocated mining cost minus refining cost, per ton.
    pub margin: f64,
    /// Unmet demand in tons at the ranking year, clamped at zero.
    pub gap_tons: f64,
    /// Composition percentage at the ranked row.
    pub pct: f64,
}

/// The `n` minerals with the largest mean demand-supply gap, averaged
/// across all years present in the market table, descending. Ties keep
/// canonical-id order (the table's iteration order), so the result is
/// deterministic.
pub fn top_minerals_by_gap(market: &MarketTable, n: usize) -> Vec<MineralId> {
    let mut sums: BTreeMap<&MineralId, (f64, u32)> = BTreeMap::new();
    for ((mineral, _year), entry) in market.iter() {
        let slot = sums.entry(mineral).or_insert((0.0, 0));
        slot.0 += entry.gap_kt();
        slot.1 += 1;
    }
    let mut means: Vec<(&MineralId, f64)> = sums
        .into_iter()
        .map(|(m, (sum, count))| (m, sum / f64::from(count)))
        .collect();
    // Stable sort keeps id order on exact ties.
    means.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    means.truncate(n);
    means.into_iter().map(|(m, _)| m.clone()).collect()
}

/// Minerals worth considering at (location, depth) for `year`: strictly
/// positive composition percentage and strictly positive demand gap.
/// Returned in canonical-id order; callers re-rank by margin. Fails if the
/// composition row is absent.
pub fn available_minerals(
    tables: &ReferenceTables,
    location: &Location,
    depth: DepthKm,
    year: i32,
) -> Result<Vec<MineralId>, EvalError> {
    let row = tables.composition.row(location, depth).ok_or_else(|| {
        EvalError::MissingCompositionRow {
            location: location.clone(),
            depth_km: depth.into_inner(),
        }
    })?;
    let mut found = Vec::new();
    for (mineral, &pct) in row {
        if pct <= 0.0 {
            continue;
        }
        let Some(entry) = tables.market.get(mineral, year) else {
            continue;
        };
        if entry.gap_kt() > 0.0 {
            found.push(mineral.clone());
        }
    }
    Ok(found)
}

/// Rank `minerals` by unit margin at (location, depth, year), descending.
/// Minerals absent from the row or with a saturated market are dropped;
/// exact margin ties keep the input order (first-seen-wins downstream).
pub fn rank_by_margin(
    tables: &ReferenceTables,
    location: &Location,
    depth: DepthKm,
    year: i32,
    minerals: &[MineralId],
) -> Result<Vec<RankedMineral>, EvalError> {
    let model = ProfitModel::new(tables);
    let row = tables.composition.row(location, depth).ok_or_else(|| {
        EvalError::MissingCompositionRow {
            location: location.clone(),
            depth_km: depth.into_inner(),
        }
    })?;
    let mut ranked = Vec::with_capacity(minerals.len());
    for mineral in minerals {
        let Some(margin) = model.unit_margin(location, depth, year, mineral)? else {
            continue;
        };
        let pct = row.get(mineral).copied().unwrap_or(0.0);
        let gap_tons = tables
            .market
            .get(mineral, year)
            .map(|e| (e.gap_kt() * 1000.0).max(0.0))
            .unwrap_or(0.0);
        ranked.push(RankedMineral {
            id: mineral.clone(),
            margin,
            gap_tons,
            pct,
        });
    }
    ranked.sort_by(|a, b| b.margin.partial_cmp(&a.margin).unwrap_or(Ordering::Equal));
    Ok(ranked)
}
