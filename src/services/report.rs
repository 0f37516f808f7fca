//! Report rows derived from a finished batch.

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::catalog::models::PhenologyTable;
use crate::helpers::kg_to_t;
use crate::services::aggregator::{BatchResult, ScenarioResult};
use crate::services::engine::RawRunOutput;
use crate::services::gdd::GDD_COLUMN;

/// Default ratio of realized to simulated yield.
pub const DEFAULT_YIELD_GAP_FACTOR: f64 = 0.35;

/// Accepted range for the yield gap factor.
pub const YIELD_GAP_RANGE: std::ops::RangeInclusive<f64> = 0.1..=1.0;

/// Development stage at flowering.
const DVS_FLOWERING: f64 = 1.0;

/// Development stage treated as maturity.
const DVS_MATURITY: f64 = 1.95;

/// One row of the scenario summary table.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SummaryRow {
    pub scenario: String,
    /// N rate (kg/ha)
    pub n_rate: f64,
    /// Simulated potential yield (t/ha)
    pub yield_t: f64,
    /// Potential yield scaled by the yield gap factor (t/ha)
    pub actual_yield_t: f64,
    /// Total aboveground biomass (t/ha)
    pub biomass_t: f64,
    pub lai_max: f64,
    /// Accumulated growing degree days at the end of the run
    pub total_gdd: Option<f64>,
    /// First day with DVS >= 1.0
    pub flowering_date: Option<NaiveDate>,
    /// First day with DVS >= 1.95
    pub maturity_date: Option<NaiveDate>,
    /// `total_gdd` as a fraction of the crop's reference thermal time
    pub thermal_progress: Option<f64>,
    /// Development phase reached at the end of the run
    pub phase_reached: Option<String>,
}

/// A development phase expressed in accumulated GDD.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PhaseBoundary {
    pub name: String,
    pub start_gdd: f64,
    pub end_gdd: f64,
}

pub fn phase_boundaries(table: &PhenologyTable) -> Vec<PhaseBoundary> {
    table
        .phases
        .iter()
        .map(|p| PhaseBoundary {
            name: p.name.clone(),
            start_gdd: p.start_fraction * table.total_gdd,
            end_gdd: p.end_fraction * table.total_gdd,
        })
        .collect()
}

/// Phenology markers read from a run's daily output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Phenology {
    pub total_gdd: Option<f64>,
    pub flowering: Option<NaiveDate>,
    pub maturity: Option<NaiveDate>,
}

pub fn phenology(output: &RawRunOutput) -> Phenology {
    if output.is_empty() {
        return Phenology::default();
    }
    let total_gdd = output
        .column(GDD_COLUMN)
        .and_then(|gdd| gdd.last().copied().flatten());

    let first_reaching = |threshold: f64| -> Option<NaiveDate> {
        let dvs = output.column("DVS")?;
        output
            .days()
            .iter()
            .zip(dvs)
            .find(|(_, v)| v.is_some_and(|v| v >= threshold))
            .map(|(day, _)| *day)
    };

    Phenology {
        total_gdd,
        flowering: first_reaching(DVS_FLOWERING),
        maturity: first_reaching(DVS_MATURITY),
    }
}

pub fn summary_row(
    result: &ScenarioResult,
    output: Option<&RawRunOutput>,
    reference: Option<&PhenologyTable>,
    yield_gap_factor: f64,
) -> SummaryRow {
    let pheno = output.map(phenology).unwrap_or_default();
    let placed = reference.zip(pheno.total_gdd);
    SummaryRow {
        scenario: result.scenario.clone(),
        n_rate: result.n_rate,
        yield_t: result.yield_t,
        actual_yield_t: result.yield_t * yield_gap_factor,
        biomass_t: kg_to_t(result.tagp),
        lai_max: result.laimax,
        total_gdd: pheno.total_gdd,
        flowering_date: pheno.flowering,
        maturity_date: pheno.maturity,
        thermal_progress: placed.map(|(table, gdd)| gdd / table.total_gdd),
        phase_reached: placed
            .and_then(|(table, gdd)| table.phase_at(gdd))
            .map(|p| p.name.clone()),
    }
}

/// Summary rows for every successful scenario, in processing order.
pub fn summary_rows(batch: &BatchResult, yield_gap_factor: f64) -> Vec<SummaryRow> {
    batch
        .results
        .iter()
        .map(|r| {
            summary_row(
                r,
                batch.outputs.get(&r.scenario),
                batch.phenology.as_ref(),
                yield_gap_factor,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::presets;
    use serde_json::json;

    fn barley_phases() -> PhenologyTable {
        presets::crops().remove(0).phenology.unwrap()
    }

    fn output() -> RawRunOutput {
        let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_value(json!([
            {"day": "2023-03-15", "DVS": 0.0},
            {"day": "2023-05-01", "DVS": 0.98},
            {"day": "2023-05-02", "DVS": 1.01},
            {"day": "2023-07-01", "DVS": 1.96},
            {"day": "2023-07-02", "DVS": 2.0}
        ]))
        .unwrap();
        let mut out = RawRunOutput::from_records(&records).unwrap();
        out.attach_column(GDD_COLUMN, vec![10.0, 500.0, 520.0, 1400.0, 1420.0])
            .unwrap();
        out
    }

    fn result() -> ScenarioResult {
        ScenarioResult {
            scenario: "Low (25 kg N/ha)".to_string(),
            scenario_key: "low".to_string(),
            n_rate: 25.0,
            yield_kg: 4000.0,
            yield_t: 4.0,
            tagp: 9500.0,
            laimax: 3.8,
            yield_from_biomass: false,
        }
    }

    #[test]
    fn test_phenology_markers() {
        let p = phenology(&output());
        assert_eq!(p.total_gdd, Some(1420.0));
        assert_eq!(p.flowering, Some("2023-05-02".parse().unwrap()));
        assert_eq!(p.maturity, Some("2023-07-01".parse().unwrap()));
    }

    #[test]
    fn test_phenology_without_dvs() {
        let p = phenology(&RawRunOutput::default());
        assert_eq!(p, Phenology::default());
    }

    #[test]
    fn test_summary_row_applies_yield_gap() {
        let out = output();
        let row = summary_row(&result(), Some(&out), None, 0.5);
        assert_eq!(row.actual_yield_t, 2.0);
        assert_eq!(row.biomass_t, 9.5);
        assert_eq!(row.total_gdd, Some(1420.0));
        assert_eq!(row.lai_max, 3.8);
    }

    #[test]
    fn test_summary_row_without_output_table() {
        let row = summary_row(&result(), None, Some(&barley_phases()), DEFAULT_YIELD_GAP_FACTOR);
        assert_eq!(row.flowering_date, None);
        assert_eq!(row.total_gdd, None);
        assert_eq!(row.phase_reached, None);
        assert!((row.actual_yield_t - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_yield_gap_range() {
        assert!(YIELD_GAP_RANGE.contains(&DEFAULT_YIELD_GAP_FACTOR));
        assert!(!YIELD_GAP_RANGE.contains(&0.05));
        assert!(!YIELD_GAP_RANGE.contains(&1.2));
    }

    #[test]
    fn test_summary_row_places_run_in_phase() {
        // 1420 GDD of barley's 1550 reference is 0.916: past grain fill.
        let out = output();
        let row = summary_row(&result(), Some(&out), Some(&barley_phases()), 0.35);
        assert!((row.thermal_progress.unwrap() - 1420.0 / 1550.0).abs() < 1e-12);
        assert_eq!(row.phase_reached.as_deref(), Some("Maturity"));

        let mut short = output();
        short
            .attach_column(GDD_COLUMN, vec![10.0, 200.0, 300.0, 400.0, 500.0])
            .unwrap();
        let row = summary_row(&result(), Some(&short), Some(&barley_phases()), 0.35);
        assert_eq!(row.phase_reached.as_deref(), Some("Stem Extension"));
    }

    #[test]
    fn test_phase_boundaries_in_gdd() {
        let bounds = phase_boundaries(&barley_phases());
        assert_eq!(bounds.len(), 7);
        assert_eq!(bounds[0].start_gdd, 0.0);
        assert!((bounds[1].start_gdd - 0.07 * 1550.0).abs() < 1e-9);
        assert_eq!(bounds.last().unwrap().end_gdd, 1550.0);
        for pair in bounds.windows(2) {
            assert_eq!(pair[0].end_gdd, pair[1].start_gdd);
        }
    }
}
