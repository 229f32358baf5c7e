#![deny(warnings)]

//! Ingestion of the survey workbook's sheets (exported as CSV) into the
//! reference tables.
//!
//! The raw sheets are messy in known ways and the cleaning rules live
//! here, not in the model crates: location labels are forward-filled down
//! through blank cells, rows outside recognized location groups are
//! discarded, depths are coerced to numeric with unparseable rows dropped,
//! and the sparse logistics columns skip embedded header rows silently.

use mine_core::{
    depth_km, validate_tables, CompositionTable, CostTable, Location, LogisticsTable, MarketEntry,
    MarketTable, MineralId, MineralRegistry, RefiningTable, ReferenceTables, ValidationError,
};
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{trace, warn};

/// Ingestion failures. Row-level noise is cleaned or skipped, never an
/// error; these cover structural problems only.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("sheet {sheet} is missing column {column:?}")]
    MissingColumn { sheet: &'static str, column: &'static str },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

fn column_index(
    headers: &csv::StringRecord,
    sheet: &'static str,
    column: &'static str,
) -> Result<usize, IngestError> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or(IngestError::MissingColumn { sheet, column })
}

fn optional_column_index(headers: &csv::StringRecord, column: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == column)
}

/// Forward-fills location labels and yields only rows belonging to a
/// recognized location group with a numeric depth.
struct SiteRows {
    loc_idx: usize,
    depth_idx: usize,
    last_location: Option<String>,
}

impl SiteRows {
    fn new(loc_idx: usize, depth_idx: usize) -> Self {
        Self {
            loc_idx,
            depth_idx,
            last_location: None,
        }
    }

    /// Cleaned (location, depth) for a raw record, or `None` when the row
    /// is dropped.
    fn clean(&mut self, record: &csv::StringRecord) -> Option<(Location, f64)> {
        let raw_loc = record.get(self.loc_idx).unwrap_or("").trim();
        if !raw_loc.is_empty() {
            self.last_location = Some(raw_loc.to_string());
        }
        // Blank cells belong to the previous location group.
        let label = self.last_location.as_deref()?;
        if !label.starts_with("Location") {
            return None;
        }
        let raw_depth = record.get(self.depth_idx).unwrap_or("").trim();
        let Ok(depth) = raw_depth.parse::<f64>() else {
            trace!(location = label, depth = raw_depth, "row dropped: depth not numeric");
            return None;
        };
        Some((Location::new(label), depth))
    }
}

/// Read the composition sheet: one column per canonical mineral, cells are
/// percentage content of ore. Blank or non-numeric cells mean "absent".
pub fn read_composition<R: Read>(
    mut reader: csv::Reader<R>,
    registry: &MineralRegistry,
) -> Result<CompositionTable, IngestError> {
    const SHEET: &str = "Composition";
    let headers = reader.headers()?.clone();
    let loc_idx = column_index(&headers, SHEET, "Location")?;
    let depth_idx = column_index(&headers, SHEET, "Depth_km")?;
    let mineral_cols: Vec<(usize, MineralId)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            let id = MineralId::new(h.trim());
            registry.contains(&id).then_some((i, id))
        })
        .collect();

    let mut cleaner = SiteRows::new(loc_idx, depth_idx);
    let mut table = CompositionTable::default();
    for record in reader.records() {
        let record = record?;
        let Some((location, depth)) = cleaner.clean(&record) else {
            continue;
        };
        let pcts = mineral_cols
            .iter()
            .filter_map(|(i, id)| {
                let cell = record.get(*i).unwrap_or("").trim();
                cell.parse::<f64>().ok().map(|pct| (id.clone(), pct))
            })
            .collect();
        table.insert(location, depth_km(depth), pcts);
    }
    Ok(table)
}

/// Read the cost sheet: derives the blended mining cost per ton of ore
/// (extraction cost in thousands x 1000 plus manpower cost) and the sparse
/// logistics table riding along in its extra columns.
pub fn read_cost<R: Read>(
    mut reader: csv::Reader<R>,
) -> Result<(CostTable, LogisticsTable), IngestError> {
    const SHEET: &str = "Cost";
    let headers = reader.headers()?.clone();
    let loc_idx = column_index(&headers, SHEET, "Location")?;
    let depth_idx = column_index(&headers, SHEET, "Depth_km")?;
    let extraction_idx = column_index(&headers, SHEET, "Total Extraction Cost ('000 USD/ton)")?;
    let manpower_idx = column_index(&headers, SHEET, "Manpower Cost (USD/ton)")?;
    let count_idx = optional_column_index(&headers, "Number of minerals");
    let add_cost_idx = optional_column_index(&headers, "Additional Cost");

    let mut cleaner = SiteRows::new(loc_idx, depth_idx);
    let mut cost = CostTable::default();
    let mut logistics = LogisticsTable::default();
    for record in reader.records() {
        let record = record?;
        let Some((location, depth)) = cleaner.clean(&record) else {
            continue;
        };

        let extraction = record.get(extraction_idx).unwrap_or("").trim().parse::<f64>();
        let manpower = record.get(manpower_idx).unwrap_or("").trim().parse::<f64>();
        match (extraction, manpower) {
            (Ok(extraction_k), Ok(manpower_usd)) => {
                cost.insert(
                    location.clone(),
                    depth_km(depth),
                    extraction_k * 1000.0 + manpower_usd,
                );
            }
            _ => {
                trace!(%location, depth, "row dropped: cost cells not numeric");
            }
        }

        // Logistics entries are sparse; non-numeric cells (including a
        // stray header row embedded in the data) are skipped silently.
        if let (Some(count_idx), Some(add_cost_idx)) = (count_idx, add_cost_idx) {
            let count = record.get(count_idx).unwrap_or("").trim().parse::<f64>();
            let add_cost = record.get(add_cost_idx).unwrap_or("").trim().parse::<f64>();
            if let (Ok(count), Ok(add_cost_k)) = (count, add_cost) {
                if count.is_finite() && count >= 0.0 && add_cost_k.is_finite() {
                    // Cost column is in '000 USD per ton of ore.
                    logistics.insert(location, count as u32, add_cost_k * 1000.0);
                }
            }
        }
    }
    Ok((cost, logistics))
}

/// Read the market sheet, mapping display labels to canonical ids through
/// the registry. Unknown labels are skipped with a warning.
pub fn read_market<R: Read>(
    mut reader: csv::Reader<R>,
    registry: &MineralRegistry,
) -> Result<MarketTable, IngestError> {
    const SHEET: &str = "Market";
    let headers = reader.headers()?.clone();
    let mineral_idx = column_index(&headers, SHEET, "Mineral")?;
    let year_idx = column_index(&headers, SHEET, "Year")?;
    let demand_idx = column_index(&headers, SHEET, "Demand ('000 Tonnes)")?;
    let supply_idx = column_index(&headers, SHEET, "Supply ('000 Tonnes)")?;
    let price_idx = column_index(&headers, SHEET, "Price_USD_per_ton")?;

    let mut table = MarketTable::default();
    for record in reader.records() {
        let record = record?;
        let label = record.get(mineral_idx).unwrap_or("").trim();
        let Some(mineral) = registry.canonical(label) else {
            warn!(label, "market row skipped: unknown mineral label");
            continue;
        };
        let year = record.get(year_idx).unwrap_or("").trim().parse::<f64>();
        let demand = record.get(demand_idx).unwrap_or("").trim().parse::<f64>();
        let supply = record.get(supply_idx).unwrap_or("").trim().parse::<f64>();
        let price = record.get(price_idx).unwrap_or("").trim().parse::<f64>();
        let (Ok(year), Ok(demand_kt), Ok(supply_kt), Ok(price_usd_per_ton)) =
            (year, demand, supply, price)
        else {
            warn!(label, "market row skipped: non-numeric cell");
            continue;
        };
        table.insert(
            mineral.clone(),
            year as i32,
            MarketEntry {
                demand_kt,
                supply_kt,
                price_usd_per_ton,
            },
        );
    }
    Ok(table)
}

/// Read the refining sheet: one cost per mineral, no time dimension. The
/// mineral column holds canonical names; display labels are accepted too.
pub fn read_refining<R: Read>(
    mut reader: csv::Reader<R>,
    registry: &MineralRegistry,
) -> Result<RefiningTable, IngestError> {
    const SHEET: &str = "Refining Costs";
    let headers = reader.headers()?.clone();
    // The sheet's first column carries no meaningful header in some
    // exports; fall back to the first column when "Mineral" is absent.
    let mineral_idx = optional_column_index(&headers, "Mineral").unwrap_or(0);
    let cost_idx = column_index(&headers, SHEET, "Refining Cost (USD/Ton)")?;

    let mut table = RefiningTable::default();
    for record in reader.records() {
        let record = record?;
        let name = record.get(mineral_idx).unwrap_or("").trim();
        let id = MineralId::new(name);
        let id = if registry.contains(&id) {
            id
        } else if let Some(canonical) = registry.canonical(name) {
            canonical.clone()
        } else {
            warn!(name, "refining row skipped: unknown mineral");
            continue;
        };
        let Ok(cost) = record.get(cost_idx).unwrap_or("").trim().parse::<f64>() else {
            warn!(name, "refining row skipped: non-numeric cost");
            continue;
        };
        table.insert(id, cost);
    }
    Ok(table)
}

/// Load and validate the full reference bundle from a directory holding
/// `composition.csv`, `cost.csv`, `market.csv`, and `refining.csv`.
pub fn load_reference_tables(
    dir: &Path,
    registry: &MineralRegistry,
) -> Result<ReferenceTables, IngestError> {
    let composition = read_composition(csv::Reader::from_path(dir.join("composition.csv"))?, registry)?;
    let (cost, logistics) = read_cost(csv::Reader::from_path(dir.join("cost.csv"))?)?;
    let market = read_market(csv::Reader::from_path(dir.join("market.csv"))?, registry)?;
    let refining = read_refining(csv::Reader::from_path(dir.join("refining.csv"))?, registry)?;
    let tables = ReferenceTables {
        composition,
        cost,
        market,
        refining,
        logistics,
    };
    validate_tables(&tables)?;
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mine_core::default_registry;

    fn reader(text: &str) -> csv::Reader<&[u8]> {
        csv::Reader::from_reader(text.as_bytes())
    }

    #[test]
    fn composition_forward_fills_and_filters() {
        let registry = default_registry().unwrap();
        let text = "\
Location,Depth_km,Lithium,Nickel
Location A,0,2.0,5.0
,2,1.5,
,abc,9.9,9.9
Notes section,0,1.0,1.0
Location B,0,,3.0
";
        let table = read_composition(reader(text), &registry).unwrap();
        // The blank-location row inherits Location A; the non-numeric depth
        // row and the unrecognized group are dropped.
        assert_eq!(table.len(), 3);
        let a = Location::from_short("A");
        assert_eq!(table.pct(&a, depth_km(0.0), &MineralId::new("Lithium")), Some(2.0));
        assert_eq!(table.pct(&a, depth_km(2.0), &MineralId::new("Lithium")), Some(1.5));
        // Blank cell means absent, not zero.
        assert_eq!(table.pct(&a, depth_km(2.0), &MineralId::new("Nickel")), None);
        let b = Location::from_short("B");
        assert_eq!(table.pct(&b, depth_km(0.0), &MineralId::new("Nickel")), Some(3.0));
    }

    #[test]
    fn cost_derivation_and_logistics() {
        let text = "\
Location,Depth_km,Total Extraction Cost ('000 USD/ton),Manpower Cost (USD/ton),Number of minerals,Additional Cost
Location A,0,1.2,300,1,0.5
,2,2.0,400,2,0.8
,4,3.0,500,Number of minerals,Additional Cost
Location B,0,0.5,100,,
";
        let (cost, logistics) = read_cost(reader(text)).unwrap();
        let a = Location::from_short("A");
        assert_eq!(cost.mining_cost_per_ton(&a, depth_km(0.0)), Some(1_500.0));
        assert_eq!(cost.mining_cost_per_ton(&a, depth_km(2.0)), Some(2_400.0));
        assert_eq!(
            cost.mining_cost_per_ton(&Location::from_short("B"), depth_km(0.0)),
            Some(600.0)
        );
        // '000 USD converted, embedded header row skipped silently.
        assert_eq!(logistics.cost_per_ton(&a, 1), 500.0);
        assert_eq!(logistics.cost_per_ton(&a, 2), 800.0);
        assert_eq!(logistics.cost_per_ton(&a, 9), 800.0);
    }

    #[test]
    fn market_maps_display_labels() {
        let registry = default_registry().unwrap();
        let text = "\
Mineral,Year,Demand ('000 Tonnes),Supply ('000 Tonnes),Price_USD_per_ton
Lithium,2030,120,80,30000
Nickel (Million Tonnes),2030,50,60,20000
Unobtainium,2030,1,0,1
";
        let table = read_market(reader(text), &registry).unwrap();
        assert_eq!(table.len(), 2);
        let entry = table.get(&MineralId::new("Lithium"), 2030).unwrap();
        assert_eq!(entry.gap_kt(), 40.0);
        let entry = table.get(&MineralId::new("Nickel"), 2030).unwrap();
        assert_eq!(entry.gap_kt(), -10.0);
    }

    #[test]
    fn refining_accepts_canonical_and_display_names() {
        let registry = default_registry().unwrap();
        let text = "\
Mineral,Refining Cost (USD/Ton)
Lithium,2000
Nickel (Million Tonnes),1000
Unobtainium,5
";
        let table = read_refining(reader(text), &registry).unwrap();
        assert_eq!(table.cost_per_ton(&MineralId::new("Lithium")), Some(2_000.0));
        assert_eq!(table.cost_per_ton(&MineralId::new("Nickel")), Some(1_000.0));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn missing_column_is_a_structural_error() {
        let registry = default_registry().unwrap();
        let err = read_composition(reader("Location,Lithium\nLocation A,2\n"), &registry)
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::MissingColumn {
                sheet: "Composition",
                column: "Depth_km"
            }
        ));
    }

    proptest::proptest! {
        /// Depth coercion keeps exactly the numeric rows.
        #[test]
        fn only_numeric_depths_survive(depths in proptest::collection::vec("([0-9]{1,2}|x|)", 1..12)) {
            let registry = default_registry().unwrap();
            let mut text = String::from("Location,Depth_km,Lithium\n");
            for d in &depths {
                text.push_str(&format!("Location A,{d},1.0\n"));
            }
            let table = read_composition(reader(&text), &registry).unwrap();
            let numeric: std::collections::BTreeSet<u32> =
                depths.iter().filter_map(|d| d.parse().ok()).collect();
            proptest::prop_assert_eq!(table.len(), numeric.len());
        }
    }

    #[test]
    fn full_bundle_loads_and_validates() {
        let registry = default_registry().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("composition.csv"),
            "Location,Depth_km,Lithium\nLocation A,0,2.0\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("cost.csv"),
            "Location,Depth_km,Total Extraction Cost ('000 USD/ton),Manpower Cost (USD/ton)\nLocation A,0,0.4,100\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("market.csv"),
            "Mineral,Year,Demand ('000 Tonnes),Supply ('000 Tonnes),Price_USD_per_ton\nLithium,2030,120,80,30000\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("refining.csv"),
            "Mineral,Refining Cost (USD/Ton)\nLithium,2000\n",
        )
        .unwrap();

        let tables = load_reference_tables(dir.path(), &registry).unwrap();
        assert_eq!(tables.composition.len(), 1);
        assert_eq!(
            tables
                .cost
                .mining_cost_per_ton(&Location::from_short("A"), depth_km(0.0)),
            Some(500.0)
        );
        assert!(tables.logistics.is_empty());
    }
}
