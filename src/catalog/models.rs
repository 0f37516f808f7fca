use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::CatalogError;

/// Nitrogen demand class of a crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum NitrogenDemand {
    Low,
    Medium,
    MediumHigh,
    High,
}

/// Broad crop class; decides the yield fallback fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CropClass {
    /// Grain and seed crops.
    Grain,
    /// Root and tuber crops (potato, cassava, sweet potato).
    RootTuber,
}

/// A crop preset. Immutable once the catalog is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CropProfile {
    /// Catalog key, also the crop name handed to the engine (e.g. "barley")
    pub key: String,
    /// Engine variety identifier (e.g. "Spring_barley_301")
    pub variety: String,
    /// Maximum season length in days
    pub season_days: u32,
    pub n_demand: NitrogenDemand,
    pub crop_class: CropClass,
    /// Default planting month (1-12)
    pub planting_month: u32,
    /// Default planting day of month
    pub planting_day: u32,
    /// Force the vernalization parameters to zero before running
    #[serde(default)]
    pub needs_vern_override: bool,
    /// Reference thermal time and development phases, if known
    #[serde(default)]
    pub phenology: Option<PhenologyTable>,
}

impl CropProfile {
    pub fn validate(&self) -> Result<(), CatalogError> {
        require_key("crop", &self.key)?;
        if self.variety.trim().is_empty() {
            return Err(CatalogError::invalid(&self.key, "variety", "must not be empty"));
        }
        if self.season_days == 0 {
            return Err(CatalogError::invalid(&self.key, "season_days", "must be positive"));
        }
        if chrono::NaiveDate::from_ymd_opt(2023, self.planting_month, self.planting_day).is_none() {
            return Err(CatalogError::invalid(
                &self.key,
                "planting_month/planting_day",
                format!("{}-{} is not a calendar date", self.planting_month, self.planting_day),
            ));
        }
        if let Some(table) = &self.phenology {
            table.validate(&self.key)?;
        }
        Ok(())
    }
}

/// A named development phase, as fractions of the reference thermal time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Phenophase {
    pub name: String,
    pub start_fraction: f64,
    pub end_fraction: f64,
}

/// Thermal time (base 0 C) a crop needs from planting to maturity, split
/// into contiguous phases covering 0..=1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PhenologyTable {
    pub total_gdd: f64,
    pub phases: Vec<Phenophase>,
}

impl PhenologyTable {
    fn validate(&self, owner: &str) -> Result<(), CatalogError> {
        if !self.total_gdd.is_finite() || self.total_gdd <= 0.0 {
            return Err(CatalogError::invalid(owner, "phenology.total_gdd", "must be positive"));
        }
        let mut expected_start = 0.0;
        for phase in &self.phases {
            if phase.name.trim().is_empty() {
                return Err(CatalogError::invalid(owner, "phenology.phases", "unnamed phase"));
            }
            if (phase.start_fraction - expected_start).abs() > 1e-9 {
                return Err(CatalogError::invalid(
                    owner,
                    "phenology.phases",
                    format!("'{}' starts at {}, expected {}", phase.name, phase.start_fraction, expected_start),
                ));
            }
            if phase.end_fraction.is_nan() || phase.end_fraction <= phase.start_fraction {
                return Err(CatalogError::invalid(
                    owner,
                    "phenology.phases",
                    format!("'{}' ends before it starts", phase.name),
                ));
            }
            expected_start = phase.end_fraction;
        }
        if (expected_start - 1.0).abs() > 1e-9 {
            return Err(CatalogError::invalid(owner, "phenology.phases", "must end at 1.0"));
        }
        Ok(())
    }

    /// Phase a crop is in after accumulating `gdd`. Past the reference total
    /// the crop stays in its last phase.
    pub fn phase_at(&self, gdd: f64) -> Option<&Phenophase> {
        if !gdd.is_finite() || gdd < 0.0 {
            return None;
        }
        let fraction = gdd / self.total_gdd;
        self.phases
            .iter()
            .find(|p| fraction >= p.start_fraction && fraction < p.end_fraction)
            .or_else(|| self.phases.last().filter(|_| fraction >= 1.0))
    }
}

/// A simulation site.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Location {
    /// Catalog key, also the weather file stem (e.g. "narok")
    pub key: String,
    /// Display name (e.g. "Narok")
    pub name: String,
    /// Latitude (WGS84)
    pub latitude: f64,
    /// Longitude (WGS84)
    pub longitude: f64,
}

impl Location {
    pub fn validate(&self) -> Result<(), CatalogError> {
        require_key("location", &self.key)?;
        if self.name.trim().is_empty() {
            return Err(CatalogError::invalid(&self.key, "name", "must not be empty"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CatalogError::invalid(&self.key, "latitude", "out of range"));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CatalogError::invalid(&self.key, "longitude", "out of range"));
        }
        Ok(())
    }
}

/// Soil water and nitrogen parameters, named the way the engine names them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub struct SoilParams {
    /// Soil moisture at saturation (cm3/cm3)
    pub sm0: f64,
    /// Soil moisture at field capacity (cm3/cm3)
    pub smfcf: f64,
    /// Soil moisture at wilting point (cm3/cm3)
    pub smw: f64,
    /// Critical air content for root aeration (cm3/cm3)
    pub crairc: f64,
    /// Maximum rootable depth (cm)
    pub rdmsol: f64,
    /// Hydraulic conductivity of saturated soil (cm/day)
    pub k0: f64,
    /// Maximum percolation rate of the root zone (cm/day)
    pub sope: f64,
    /// Maximum percolation rate to the subsoil (cm/day)
    pub ksub: f64,
    /// Base soil N mineralisation (kg N/ha)
    pub nsoilbase: f64,
    /// Fraction of base soil N mineralised per day
    #[serde(default, rename = "NSOILBASE_FR")]
    pub nsoilbase_fr: Option<f64>,
}

impl SoilParams {
    pub fn validate(&self, owner: &str) -> Result<(), CatalogError> {
        let named = [
            ("SM0", self.sm0),
            ("SMFCF", self.smfcf),
            ("SMW", self.smw),
            ("CRAIRC", self.crairc),
            ("RDMSOL", self.rdmsol),
            ("K0", self.k0),
            ("SOPE", self.sope),
            ("KSUB", self.ksub),
            ("NSOILBASE", self.nsoilbase),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(CatalogError::invalid(owner, name, "must be a finite, non-negative number"));
            }
        }
        if let Some(fr) = self.nsoilbase_fr {
            if !(0.0..=1.0).contains(&fr) {
                return Err(CatalogError::invalid(owner, "NSOILBASE_FR", "must be within [0, 1]"));
            }
        }
        if !(self.smw <= self.smfcf && self.smfcf <= self.sm0) {
            return Err(CatalogError::invalid(
                owner,
                "SMW/SMFCF/SM0",
                "expected SMW <= SMFCF <= SM0",
            ));
        }
        Ok(())
    }
}

/// A named soil preset.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SoilProfile {
    pub key: String,
    pub name: String,
    pub params: SoilParams,
}

impl SoilProfile {
    pub fn validate(&self) -> Result<(), CatalogError> {
        require_key("soil", &self.key)?;
        self.params.validate(&self.key)
    }
}

/// One nitrogen application, relative to the planting date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Application {
    /// Days after planting (0 = at planting)
    pub day_offset: u32,
    /// Amount applied (kg N/ha)
    pub amount_kg_ha: f64,
    /// Fraction of the applied N recovered by the crop, in (0, 1]
    pub recovery: f64,
}

impl Application {
    pub fn new(day_offset: u32, amount_kg_ha: f64, recovery: f64) -> Self {
        Self {
            day_offset,
            amount_kg_ha,
            recovery,
        }
    }
}

/// A fertilizer regime, evaluated as one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FertilizerScenario {
    pub key: String,
    /// Display name, also the key of the scenario's output table
    pub name: String,
    /// Total nitrogen applied (kg N/ha), used as the N rate in reports
    pub total_n: f64,
    /// Applications in the order they are scheduled
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl FertilizerScenario {
    pub fn validate(&self) -> Result<(), CatalogError> {
        require_key("scenario", &self.key)?;
        if self.name.trim().is_empty() {
            return Err(CatalogError::invalid(&self.key, "name", "must not be empty"));
        }
        if !self.total_n.is_finite() || self.total_n < 0.0 {
            return Err(CatalogError::invalid(&self.key, "total_n", "must be non-negative"));
        }
        for (i, app) in self.applications.iter().enumerate() {
            let field = format!("applications[{}]", i);
            if !app.amount_kg_ha.is_finite() || app.amount_kg_ha <= 0.0 {
                return Err(CatalogError::invalid(&self.key, &field, "amount must be positive"));
            }
            if !(app.recovery > 0.0 && app.recovery <= 1.0) {
                return Err(CatalogError::invalid(&self.key, &field, "recovery must be within (0, 1]"));
            }
        }
        Ok(())
    }
}

fn require_key(kind: &str, key: &str) -> Result<(), CatalogError> {
    if key.trim().is_empty() {
        return Err(CatalogError::invalid(kind, "key", "must not be empty"));
    }
    Ok(())
}
