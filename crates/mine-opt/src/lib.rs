#![deny(warnings)]

//! Optimization searches for the deep-earth mining planner.
//!
//! Two sequential phases over immutable reference tables:
//! - Depth search: per (location, horizon), exhaustive evaluation of the
//!   profit model across every surveyed depth
//! - Portfolio search: for one location, a ranked, bounded grid search
//!   over (mineral count, ore tonnage) including the logistics surcharge
//!
//! Both keep a strict-greater maximizer: the first candidate to reach the
//! best value wins on exact ties. Candidates are visited in a fixed order
//! (depths ascending, minerals in stable margin rank, tonnages ascending),
//! so repeated runs over unchanged tables produce identical output.

use mine_core::{DepthKm, Horizon, Location, MineralId, ReferenceTables};
use mine_econ::{available_minerals, rank_by_margin, top_minerals_by_gap, EvalError, ProfitModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Tunable search policy. These are policy constants, not values derived
/// from data; a finer tonnage grid changes the optimum's precision but not
/// the search contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Fixed ore tonnage assumed by the depth phase.
    pub depth_phase_ore_tons: f64,
    /// How many top-gap minerals the depth phase evaluates.
    pub top_gap_count: usize,
    /// Cap on portfolio size during the (k, tonnage) search.
    pub max_portfolio_minerals: usize,
    /// Ore tonnage grid, inclusive on both ends.
    pub tonnage_min: f64,
    pub tonnage_max: f64,
    pub tonnage_step: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            depth_phase_ore_tons: 100_000.0,
            top_gap_count: 4,
            max_portfolio_minerals: 10,
            tonnage_min: 50_000.0,
            tonnage_max: 1_000_000.0,
            tonnage_step: 50_000.0,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), SearchError> {
        if !(self.depth_phase_ore_tons.is_finite() && self.depth_phase_ore_tons > 0.0) {
            return Err(SearchError::InvalidConfig("depth_phase_ore_tons must be > 0"));
        }
        if self.top_gap_count == 0 {
            return Err(SearchError::InvalidConfig("top_gap_count must be >= 1"));
        }
        if self.max_portfolio_minerals == 0 {
            return Err(SearchError::InvalidConfig("max_portfolio_minerals must be >= 1"));
        }
        if !(self.tonnage_step.is_finite() && self.tonnage_step > 0.0) {
            return Err(SearchError::InvalidConfig("tonnage_step must be > 0"));
        }
        if !(self.tonnage_min.is_finite()
            && self.tonnage_max.is_finite()
            && self.tonnage_min > 0.0
            && self.tonnage_min <= self.tonnage_max)
        {
            return Err(SearchError::InvalidConfig(
                "tonnage range must satisfy 0 < min <= max",
            ));
        }
        Ok(())
    }

    /// The ore tonnage candidates, ascending and inclusive of the bounds.
    pub fn tonnage_grid(&self) -> Vec<f64> {
        let steps = ((self.tonnage_max - self.tonnage_min) / self.tonnage_step).floor() as usize;
        (0..=steps)
            .map(|i| self.tonnage_min + self.tonnage_step * i as f64)
            .collect()
    }
}

/// Search failures.
#[derive(Debug, Error, PartialEq)]
pub enum SearchError {
    /// Every depth of a location was unattainable for a horizon. The
    /// reference data guarantees at least one valid row, so this is a
    /// configuration error, not a legitimate outcome.
    #[error("no attainable depth for {location} at horizon {}", horizon.label())]
    NoAttainableDepth { location: Location, horizon: Horizon },
    /// A reference row was missing at the chosen depth of the portfolio
    /// phase; upstream selection should have guaranteed it exists.
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("invalid search config: {0}")]
    InvalidConfig(&'static str),
}

/// The depth phase's answer for one (location, horizon) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthChoice {
    pub horizon: Horizon,
    pub location: Location,
    pub depth_km: f64,
    pub profit_usd: f64,
}

/// For each location x horizon, pick the surveyed depth that maximizes
/// profit over the top-gap mineral set at the fixed depth-phase tonnage
/// (no logistics term). Depths with missing reference rows are
/// unattainable and excluded. Output is ordered by horizon, then location.
pub fn optimize_depths(
    tables: &ReferenceTables,
    config: &SearchConfig,
) -> Result<Vec<DepthChoice>, SearchError> {
    config.validate()?;
    let model = ProfitModel::new(tables);
    let top = top_minerals_by_gap(&tables.market, config.top_gap_count);
    debug!(minerals = ?top, "depth phase mineral set");

    let locations = tables.composition.locations();
    let mut choices = Vec::with_capacity(locations.len() * Horizon::ALL.len());
    for horizon in Horizon::ALL {
        let year = horizon.year();
        for location in &locations {
            let mut best: Option<(DepthKm, f64)> = None;
            for depth in tables.composition.depths_for(location) {
                let profit = match model.profit(
                    location,
                    depth,
                    year,
                    &top,
                    config.depth_phase_ore_tons,
                ) {
                    Ok(p) => p,
                    Err(e) => {
                        // Missing reference rows make the depth unattainable.
                        trace!(%location, depth = depth.into_inner(), error = %e, "depth excluded");
                        continue;
                    }
                };
                // Strict greater: first-seen depth wins exact ties.
                if best.map_or(true, |(_, b)| profit > b) {
                    best = Some((depth, profit));
                }
            }
            let (depth, profit) = best.ok_or_else(|| SearchError::NoAttainableDepth {
                location: location.clone(),
                horizon,
            })?;
            choices.push(DepthChoice {
                horizon,
                location: location.clone(),
                depth_km: depth.into_inner(),
                profit_usd: profit,
            });
        }
    }
    Ok(choices)
}

/// Per-horizon depth input for the portfolio phase, keyed by horizon.
pub type DepthAssignment = BTreeMap<Horizon, f64>;

/// Fallback when the persisted depth table is unavailable: surface depth
/// for every horizon.
pub fn zero_depth_assignment() -> DepthAssignment {
    Horizon::ALL.into_iter().map(|h| (h, 0.0)).collect()
}

/// The portfolio phase's answer for one horizon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioChoice {
    pub horizon: Horizon,
    pub depth_km: f64,
    /// Chosen minerals in margin-rank order.
    pub minerals: Vec<MineralId>,
    pub ore_tons: f64,
    pub profit_usd: f64,
}

/// For one location, per horizon: rank the available minerals by unit
/// margin, then search (k, ore tonnage) over the top-k prefixes and the
/// configured tonnage grid, maximizing logistics-adjusted profit.
/// Horizons with no available minerals produce no output row.
pub fn optimize_portfolio(
    tables: &ReferenceTables,
    location: &Location,
    depths: &DepthAssignment,
    config: &SearchConfig,
) -> Result<Vec<PortfolioChoice>, SearchError> {
    config.validate()?;
    let model = ProfitModel::new(tables);
    let grid = config.tonnage_grid();

    let mut choices = Vec::new();
    for horizon in Horizon::ALL {
        let Some(&depth) = depths.get(&horizon) else {
            warn!(horizon = horizon.label(), "no depth assigned; horizon skipped");
            continue;
        };
        let depth = mine_core::depth_km(depth);
        let year = horizon.year();

        let available = match available_minerals(tables, location, depth, year) {
            Ok(found) => found,
            // A fallback depth may point at an unsurveyed row; that horizon
            // has no viable production.
            Err(EvalError::MissingCompositionRow { .. }) => {
                warn!(
                    horizon = horizon.label(),
                    depth = depth.into_inner(),
                    "no composition row at assigned depth; horizon skipped"
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if available.is_empty() {
            debug!(horizon = horizon.label(), "no viable minerals; horizon skipped");
            continue;
        }

        let ranked = rank_by_margin(tables, location, depth, year, &available)?;
        let max_k = ranked.len().min(config.max_portfolio_minerals);
        let mut best: Option<(usize, f64, f64)> = None; // (k, tonnage, profit)
        for k in 1..=max_k {
            let candidate: Vec<MineralId> =
                ranked[..k].iter().map(|r| r.id.clone()).collect();
            for &ore_tons in &grid {
                let profit =
                    model.profit_with_logistics(location, depth, year, &candidate, ore_tons)?;
                if best.map_or(true, |(_, _, b)| profit > b) {
                    best = Some((k, ore_tons, profit));
                }
            }
        }
        // max_k >= 1 and the grid is non-empty, so a best trial exists.
        let Some((k, ore_tons, profit)) = best else {
            continue;
        };
        choices.push(PortfolioChoice {
            horizon,
            depth_km: depth.into_inner(),
            minerals: ranked[..k].iter().map(|r| r.id.clone()).collect(),
            ore_tons,
            profit_usd: profit,
        });
    }
    Ok(choices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mine_core::{depth_km, MarketEntry};
    use std::collections::BTreeMap;

    fn loc_a() -> Location {
        Location::from_short("A")
    }

    fn mineral(id: &str) -> MineralId {
        MineralId::new(id)
    }

    fn comp_row(pcts: &[(&str, f64)]) -> BTreeMap<MineralId, f64> {
        pcts.iter().map(|(m, p)| (mineral(m), *p)).collect()
    }

    fn market_all_years(tables: &mut ReferenceTables, id: &str, demand: f64, supply: f64, price: f64) {
        for h in Horizon::ALL {
            tables.market.insert(
                mineral(id),
                h.year(),
                MarketEntry {
                    demand_kt: demand,
                    supply_kt: supply,
                    price_usd_per_ton: price,
                },
            );
        }
    }

    /// Two locations, two depths each. Lithium is richer and cheaper at
    /// depth 2 of Location A; Location B only pays off at depth 0.
    fn fixture() -> ReferenceTables {
        let mut tables = ReferenceTables::default();
        let a = loc_a();
        let b = Location::from_short("B");

        tables
            .composition
            .insert(a.clone(), depth_km(0.0), comp_row(&[("Lithium", 10.0), ("Cobalt", 4.0)]));
        tables
            .composition
            .insert(a.clone(), depth_km(2.0), comp_row(&[("Lithium", 30.0), ("Cobalt", 2.0)]));
        tables
            .composition
            .insert(b.clone(), depth_km(0.0), comp_row(&[("Cobalt", 8.0)]));
        tables
            .composition
            .insert(b.clone(), depth_km(2.0), comp_row(&[("Cobalt", 1.0)]));

        tables.cost.insert(a.clone(), depth_km(0.0), 300.0);
        tables.cost.insert(a.clone(), depth_km(2.0), 400.0);
        tables.cost.insert(b.clone(), depth_km(0.0), 200.0);
        tables.cost.insert(b.clone(), depth_km(2.0), 5_000.0);

        market_all_years(&mut tables, "Lithium", 500.0, 100.0, 30_000.0);
        market_all_years(&mut tables, "Cobalt", 300.0, 50.0, 40_000.0);

        tables.refining.insert(mineral("Lithium"), 2_000.0);
        tables.refining.insert(mineral("Cobalt"), 3_000.0);

        tables.logistics.insert(a.clone(), 1, 50.0);
        tables.logistics.insert(a.clone(), 2, 120.0);
        tables
    }

    fn small_config() -> SearchConfig {
        SearchConfig {
            tonnage_min: 50_000.0,
            tonnage_max: 200_000.0,
            tonnage_step: 50_000.0,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn tonnage_grid_is_inclusive() {
        let grid = SearchConfig::default().tonnage_grid();
        assert_eq!(grid.len(), 20);
        assert_eq!(grid[0], 50_000.0);
        assert_eq!(grid[19], 1_000_000.0);
    }

    #[test]
    fn config_validation() {
        assert!(SearchConfig::default().validate().is_ok());
        let bad = SearchConfig {
            tonnage_step: 0.0,
            ..SearchConfig::default()
        };
        assert!(matches!(bad.validate(), Err(SearchError::InvalidConfig(_))));
        let bad = SearchConfig {
            tonnage_min: 500.0,
            tonnage_max: 100.0,
            ..SearchConfig::default()
        };
        assert!(matches!(bad.validate(), Err(SearchError::InvalidConfig(_))));
    }

    #[test]
    fn depth_choice_is_optimal_over_all_candidates() {
        let tables = fixture();
        let config = SearchConfig::default();
        let choices = optimize_depths(&tables, &config).unwrap();
        // 2 locations x 3 horizons, horizon-major order.
        assert_eq!(choices.len(), 6);
        assert_eq!(choices[0].horizon, Horizon::FiveYears);
        assert_eq!(choices[0].location, loc_a());
        assert_eq!(choices[1].location, Location::from_short("B"));

        let model = ProfitModel::new(&tables);
        let top = top_minerals_by_gap(&tables.market, config.top_gap_count);
        for choice in &choices {
            for depth in tables.composition.depths_for(&choice.location) {
                if let Ok(p) = model.profit(
                    &choice.location,
                    depth,
                    choice.horizon.year(),
                    &top,
                    config.depth_phase_ore_tons,
                ) {
                    assert!(choice.profit_usd >= p);
                }
            }
        }
    }

    #[test]
    fn depth_ties_go_to_first_seen() {
        let mut tables = ReferenceTables::default();
        let a = loc_a();
        // Identical rows at both depths: identical profit, shallower wins.
        for d in [0.0, 2.0] {
            tables
                .composition
                .insert(a.clone(), depth_km(d), comp_row(&[("Lithium", 10.0)]));
            tables.cost.insert(a.clone(), depth_km(d), 300.0);
        }
        market_all_years(&mut tables, "Lithium", 500.0, 100.0, 30_000.0);
        tables.refining.insert(mineral("Lithium"), 2_000.0);

        let choices = optimize_depths(&tables, &SearchConfig::default()).unwrap();
        assert!(choices.iter().all(|c| c.depth_km == 0.0));
    }

    #[test]
    fn unattainable_depths_are_excluded() {
        let mut tables = fixture();
        // Remove the cost row for Location A depth 0: only depth 2 remains.
        let mut cost = mine_core::CostTable::default();
        for ((l, d), c) in tables.cost.iter() {
            if !(l == &loc_a() && *d == depth_km(0.0)) {
                cost.insert(l.clone(), *d, *c);
            }
        }
        tables.cost = cost;

        let choices = optimize_depths(&tables, &SearchConfig::default()).unwrap();
        for c in choices.iter().filter(|c| c.location == loc_a()) {
            assert_eq!(c.depth_km, 2.0);
        }
    }

    #[test]
    fn no_attainable_depth_is_fatal() {
        let mut tables = fixture();
        tables.cost = Default::default();
        let err = optimize_depths(&tables, &SearchConfig::default()).unwrap_err();
        assert!(matches!(err, SearchError::NoAttainableDepth { .. }));
    }

    #[test]
    fn depth_search_is_idempotent() {
        let tables = fixture();
        let config = SearchConfig::default();
        let first = optimize_depths(&tables, &config).unwrap();
        let second = optimize_depths(&tables, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn portfolio_choice_is_optimal_over_the_grid() {
        let tables = fixture();
        let config = small_config();
        let depths: DepthAssignment = Horizon::ALL.into_iter().map(|h| (h, 2.0)).collect();
        let choices = optimize_portfolio(&tables, &loc_a(), &depths, &config).unwrap();
        assert_eq!(choices.len(), 3);

        let model = ProfitModel::new(&tables);
        for choice in &choices {
            let year = choice.horizon.year();
            let depth = depth_km(choice.depth_km);
            let available = available_minerals(&tables, &loc_a(), depth, year).unwrap();
            let ranked = rank_by_margin(&tables, &loc_a(), depth, year, &available).unwrap();
            let max_k = ranked.len().min(config.max_portfolio_minerals);
            for k in 1..=max_k {
                let candidate: Vec<MineralId> =
                    ranked[..k].iter().map(|r| r.id.clone()).collect();
                for &t in &config.tonnage_grid() {
                    let p = model
                        .profit_with_logistics(&loc_a(), depth, year, &candidate, t)
                        .unwrap();
                    assert!(choice.profit_usd >= p);
                }
            }
            assert!(!choice.minerals.is_empty());
            assert!(choice.minerals.len() <= config.max_portfolio_minerals);
        }
    }

    #[test]
    fn empty_available_set_skips_horizon() {
        let mut tables = fixture();
        // Saturate every market: nothing is available anywhere.
        market_all_years(&mut tables, "Lithium", 10.0, 50.0, 30_000.0);
        market_all_years(&mut tables, "Cobalt", 10.0, 50.0, 40_000.0);
        let depths = zero_depth_assignment();
        let choices =
            optimize_portfolio(&tables, &loc_a(), &depths, &small_config()).unwrap();
        assert!(choices.is_empty());
    }

    #[test]
    fn unsurveyed_fallback_depth_skips_horizon() {
        let tables = fixture();
        let depths: DepthAssignment = Horizon::ALL.into_iter().map(|h| (h, 9.0)).collect();
        let choices =
            optimize_portfolio(&tables, &loc_a(), &depths, &small_config()).unwrap();
        assert!(choices.is_empty());
    }

    #[test]
    fn logistics_surcharge_can_shrink_the_portfolio() {
        let mut tables = fixture();
        // Make the second stream ruinously expensive per ton of ore.
        tables.logistics = Default::default();
        tables.logistics.insert(loc_a(), 1, 0.0);
        tables.logistics.insert(loc_a(), 2, 1_000_000.0);
        let depths = zero_depth_assignment();
        let choices =
            optimize_portfolio(&tables, &loc_a(), &depths, &small_config()).unwrap();
        for c in &choices {
            assert_eq!(c.minerals.len(), 1);
        }
    }

    #[test]
    fn portfolio_minerals_are_in_margin_order() {
        let tables = fixture();
        let depths = zero_depth_assignment();
        let choices =
            optimize_portfolio(&tables, &loc_a(), &depths, &small_config()).unwrap();
        for c in &choices {
            let ranked = rank_by_margin(
                &tables,
                &loc_a(),
                depth_km(c.depth_km),
                c.horizon.year(),
                &available_minerals(&tables, &loc_a(), depth_km(c.depth_km), c.horizon.year())
                    .unwrap(),
            )
            .unwrap();
            let expected: Vec<MineralId> = ranked[..c.minerals.len()]
                .iter()
                .map(|r| r.id.clone())
                .collect();
            assert_eq!(c.minerals, expected);
        }
    }

    #[test]
    fn zero_depth_assignment_covers_all_horizons() {
        let depths = zero_depth_assignment();
        assert_eq!(depths.len(), 3);
        assert!(Horizon::ALL.iter().all(|h| depths[h] == 0.0));
    }
}
