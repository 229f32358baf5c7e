#![deny(warnings)]

//! Core domain models for the deep-earth mining planner.
//!
//! This crate defines the reference tables the optimizers consume, the
//! mineral name registry, and validation helpers that guarantee basic
//! invariants. All tables are built once during ingestion and stay
//! immutable for the remainder of a run.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Canonical identifier for a mineral, e.g. "Nickel", "RareEarth".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MineralId(pub String);

impl MineralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for MineralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mining site label, e.g. "Location A".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location(pub String);

impl Location {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Build from the short form used in result tables, e.g. "A".
    pub fn from_short(short: &str) -> Self {
        Self(format!("Location {short}"))
    }

    /// Short form for result tables: "Location A" -> "A".
    pub fn short_label(&self) -> &str {
        self.0.strip_prefix("Location ").unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Depth below surface in kilometres, usable as an ordered map key.
pub type DepthKm = OrderedFloat<f64>;

/// Convenience constructor for [`DepthKm`].
pub fn depth_km(km: f64) -> DepthKm {
    OrderedFloat(km)
}

/// Planning horizon. Each horizon maps to exactly one target year for
/// market lookups; the label format is part of the persisted exchange
/// schema and must not change independently of the readers.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Horizon {
    FiveYears,
    TenYears,
    FifteenYears,
}

impl Horizon {
    /// All horizons, ascending.
    pub const ALL: [Horizon; 3] = [Horizon::FiveYears, Horizon::TenYears, Horizon::FifteenYears];

    /// Planning distance in years.
    pub fn years(self) -> u32 {
        match self {
            Horizon::FiveYears => 5,
            Horizon::TenYears => 10,
            Horizon::FifteenYears => 15,
        }
    }

    /// Target year for market lookups.
    pub fn year(self) -> i32 {
        match self {
            Horizon::FiveYears => 2030,
            Horizon::TenYears => 2035,
            Horizon::FifteenYears => 2040,
        }
    }

    /// Label used in result tables, e.g. "5 yrs (2030)".
    pub fn label(self) -> &'static str {
        match self {
            Horizon::FiveYears => "5 yrs (2030)",
            Horizon::TenYears => "10 yrs (2035)",
            Horizon::FifteenYears => "15 yrs (2040)",
        }
    }

    /// Inverse of [`Horizon::label`].
    pub fn parse_label(label: &str) -> Option<Horizon> {
        Horizon::ALL.into_iter().find(|h| h.label() == label)
    }
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Two registry entries share a display label.
    #[error("duplicate display label in mineral registry: {0}")]
    DuplicateDisplayLabel(String),
    /// Two registry entries share a canonical id.
    #[error("duplicate canonical id in mineral registry: {0}")]
    DuplicateCanonicalId(String),
    /// Location label does not follow the "Location X" convention.
    #[error("malformed location label: {0}")]
    BadLocationLabel(String),
    /// Numeric field must be finite.
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    /// Composition percentage above 100.
    #[error("composition percentage out of range for {mineral}: {pct}")]
    PctOutOfRange { mineral: MineralId, pct: f64 },
    /// Price or cost must be non-negative.
    #[error("negative monetary value in {0}")]
    NegativeMoney(&'static str),
}

/// Bidirectional mapping between market display labels (e.g.
/// "Nickel (Million Tonnes)") and canonical ids (e.g. "Nickel").
/// Validated at construction: exactly one label per id and vice versa.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MineralRegistry {
    display_by_id: BTreeMap<MineralId, String>,
    id_by_display: BTreeMap<String, MineralId>,
}

impl MineralRegistry {
    /// Build a registry from (display label, canonical id) pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut reg = MineralRegistry::default();
        for (display, id) in pairs {
            let id = MineralId::new(id);
            if reg.display_by_id.contains_key(&id) {
                return Err(ValidationError::DuplicateCanonicalId(id.0));
            }
            if reg.id_by_display.contains_key(display) {
                return Err(ValidationError::DuplicateDisplayLabel(display.to_string()));
            }
            reg.display_by_id.insert(id.clone(), display.to_string());
            reg.id_by_display.insert(display.to_string(), id);
        }
        Ok(reg)
    }

    /// Display label for a canonical id.
    pub fn display(&self, id: &MineralId) -> Option<&str> {
        self.display_by_id.get(id).map(String::as_str)
    }

    /// Canonical id for a display label.
    pub fn canonical(&self, display: &str) -> Option<&MineralId> {
        self.id_by_display.get(display)
    }

    /// Whether the canonical id is known.
    pub fn contains(&self, id: &MineralId) -> bool {
        self.display_by_id.contains_key(id)
    }

    /// All canonical ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = &MineralId> {
        self.display_by_id.keys()
    }

    pub fn len(&self) -> usize {
        self.display_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.display_by_id.is_empty()
    }
}

/// The 30 minerals of the survey workbook. Market sheets label some
/// minerals with unit annotations; composition and refining sheets use the
/// bare canonical names.
pub fn default_registry() -> Result<MineralRegistry, ValidationError> {
    MineralRegistry::from_pairs([
        ("Lithium", "Lithium"),
        ("Nickel (Million Tonnes)", "Nickel"),
        ("Cobalt", "Cobalt"),
        ("Graphite", "Graphite"),
        ("Manganese", "Manganese"),
        ("Copper (Million Tones)", "Copper"),
        ("RareEarth", "RareEarth"),
        ("Zinc", "Zinc"),
        ("Tin", "Tin"),
        ("Aluminum ('000 Mil tonnes)", "Aluminum"),
        ("Iron ('000 mil ton)", "Iron"),
        ("Lead", "Lead"),
        ("Silver (per Kg)", "Silver"),
        ("Gold (per Kg)", "Gold"),
        ("Platinum (per Kg)", "Platinum"),
        ("Phosphorus", "Phosphorus"),
        ("Potash", "Potash"),
        ("Silicon ('000 mil tons)", "Silicon"),
        ("Germanium", "Germanium"),
        ("Gallium", "Gallium"),
        ("Antimony", "Antimony"),
        ("Molybdenum", "Molybdenum"),
        ("Vanadium", "Vanadium"),
        ("Tungsten", "Tungsten"),
        ("Selenium", "Selenium"),
        ("Indium", "Indium"),
        ("Tellurium", "Tellurium"),
        ("Bismuth", "Bismuth"),
        ("Cadmium", "Cadmium"),
        ("Chromium", "Chromium"),
    ])
}

/// Ore composition by site and depth: percentage of each mineral in the
/// ore (0-100). Absent or non-positive entries mean "not present".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompositionTable {
    rows: BTreeMap<(Location, DepthKm), BTreeMap<MineralId, f64>>,
}

impl CompositionTable {
    pub fn insert(&mut self, location: Location, depth: DepthKm, pcts: BTreeMap<MineralId, f64>) {
        self.rows.insert((location, depth), pcts);
    }

    /// The full mineral row at (location, depth), if surveyed.
    pub fn row(&self, location: &Location, depth: DepthKm) -> Option<&BTreeMap<MineralId, f64>> {
        self.rows.get(&(location.clone(), depth))
    }

    /// Percentage content of one mineral, if present in the row.
    pub fn pct(&self, location: &Location, depth: DepthKm, mineral: &MineralId) -> Option<f64> {
        self.row(location, depth).and_then(|r| r.get(mineral)).copied()
    }

    /// Distinct locations, in label order.
    pub fn locations(&self) -> Vec<Location> {
        let set: BTreeSet<&Location> = self.rows.keys().map(|(l, _)| l).collect();
        set.into_iter().cloned().collect()
    }

    /// Depths surveyed for one location, ascending.
    pub fn depths_for(&self, location: &Location) -> Vec<DepthKm> {
        self.rows
            .keys()
            .filter(|(l, _)| l == location)
            .map(|(_, d)| *d)
            .collect()
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&(Location, DepthKm), &BTreeMap<MineralId, f64>)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Blended mining cost per ton of ore by site and depth. The value is
/// already derived from the raw sheet: extraction cost in thousands x 1000
/// plus manpower cost.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CostTable {
    rows: BTreeMap<(Location, DepthKm), f64>,
}

impl CostTable {
    pub fn insert(&mut self, location: Location, depth: DepthKm, cost_per_ton_ore: f64) {
        self.rows.insert((location, depth), cost_per_ton_ore);
    }

    pub fn mining_cost_per_ton(&self, location: &Location, depth: DepthKm) -> Option<f64> {
        self.rows.get(&(location.clone(), depth)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(Location, DepthKm), &f64)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Market figures for one mineral in one year. Demand and supply are in
/// thousands of tons; price is per ton of metal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketEntry {
    pub demand_kt: f64,
    pub supply_kt: f64,
    pub price_usd_per_ton: f64,
}

impl MarketEntry {
    /// Demand minus supply, thousands of tons. Negative means the market
    /// is saturated.
    pub fn gap_kt(&self) -> f64 {
        self.demand_kt - self.supply_kt
    }
}

/// Market table keyed by (mineral, year).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarketTable {
    rows: BTreeMap<(MineralId, i32), MarketEntry>,
}

impl MarketTable {
    pub fn insert(&mut self, mineral: MineralId, year: i32, entry: MarketEntry) {
        self.rows.insert((mineral, year), entry);
    }

    pub fn get(&self, mineral: &MineralId, year: i32) -> Option<&MarketEntry> {
        self.rows.get(&(mineral.clone(), year))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(MineralId, i32), &MarketEntry)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Refining cost per ton of metal, one row per mineral.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RefiningTable {
    rows: BTreeMap<MineralId, f64>,
}

impl RefiningTable {
    pub fn insert(&mut self, mineral: MineralId, cost_per_ton: f64) {
        self.rows.insert(mineral, cost_per_ton);
    }

    pub fn cost_per_ton(&self, mineral: &MineralId) -> Option<f64> {
        self.rows.get(mineral).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MineralId, &f64)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-location surcharge per ton of ore, keyed by the number of distinct
/// minerals processed simultaneously. Sparse: only observed counts are
/// tabulated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogisticsTable {
    rows: BTreeMap<Location, BTreeMap<u32, f64>>,
}

impl LogisticsTable {
    pub fn insert(&mut self, location: Location, mineral_count: u32, cost_per_ton_ore: f64) {
        self.rows
            .entry(location)
            .or_default()
            .insert(mineral_count, cost_per_ton_ore);
    }

    /// Surcharge per ton of ore for processing `mineral_count` minerals at
    /// `location`. Zero minerals cost nothing; counts beyond the largest
    /// tabulated key clamp to the cost at that key; a location with no
    /// tabulated counts costs nothing.
    pub fn cost_per_ton(&self, location: &Location, mineral_count: u32) -> f64 {
        if mineral_count == 0 {
            return 0.0;
        }
        let Some(by_count) = self.rows.get(location) else {
            return 0.0;
        };
        let Some((&max_count, &max_cost)) = by_count.last_key_value() else {
            return 0.0;
        };
        if mineral_count > max_count {
            return max_cost;
        }
        by_count.get(&mineral_count).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Location, &BTreeMap<u32, f64>)> {
        self.rows.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The immutable bundle of reference tables every phase reads from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceTables {
    pub composition: CompositionTable,
    pub cost: CostTable,
    pub market: MarketTable,
    pub refining: RefiningTable,
    pub logistics: LogisticsTable,
}

/// Validate the bundle: location labels well-formed, percentages within
/// range, monetary values finite and non-negative. A composition row
/// without a matching cost row is legal; the optimizers treat that depth
/// as unattainable.
pub fn validate_tables(tables: &ReferenceTables) -> Result<(), ValidationError> {
    for ((location, _), pcts) in tables.composition.iter() {
        if !location.0.starts_with("Location ") {
            return Err(ValidationError::BadLocationLabel(location.0.clone()));
        }
        for (mineral, &pct) in pcts {
            if !pct.is_finite() {
                return Err(ValidationError::NonFinite("composition percentage"));
            }
            if pct > 100.0 {
                return Err(ValidationError::PctOutOfRange {
                    mineral: mineral.clone(),
                    pct,
                });
            }
        }
    }
    for ((location, _), &cost) in tables.cost.iter() {
        if !location.0.starts_with("Location ") {
            return Err(ValidationError::BadLocationLabel(location.0.clone()));
        }
        if !cost.is_finite() {
            return Err(ValidationError::NonFinite("mining cost"));
        }
        if cost < 0.0 {
            return Err(ValidationError::NegativeMoney("mining cost"));
        }
    }
    for (_, entry) in tables.market.iter() {
        if !(entry.demand_kt.is_finite()
            && entry.supply_kt.is_finite()
            && entry.price_usd_per_ton.is_finite())
        {
            return Err(ValidationError::NonFinite("market entry"));
        }
        if entry.price_usd_per_ton < 0.0 {
            return Err(ValidationError::NegativeMoney("market price"));
        }
    }
    for (_, &cost) in tables.refining.iter() {
        if !cost.is_finite() {
            return Err(ValidationError::NonFinite("refining cost"));
        }
        if cost < 0.0 {
            return Err(ValidationError::NegativeMoney("refining cost"));
        }
    }
    for (_, by_count) in tables.logistics.iter() {
        for (_, &cost) in by_count {
            if !cost.is_finite() {
                return Err(ValidationError::NonFinite("logistics cost"));
            }
            if cost < 0.0 {
                return Err(ValidationError::NegativeMoney("logistics cost"));
            }
        }
    }
    Ok(())
}
