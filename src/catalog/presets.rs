//! Built-in catalog tables, used when `DATA_DIR` carries no override file.

use super::models::{
    Application, CropClass, CropProfile, FertilizerScenario, Location, NitrogenDemand, Phenophase,
    PhenologyTable, SoilParams, SoilProfile,
};

/// Soil used when a batch request names none.
pub const DEFAULT_SOIL_KEY: &str = "nitisol";

fn crop(
    key: &str,
    variety: &str,
    season_days: u32,
    n_demand: NitrogenDemand,
    crop_class: CropClass,
    planting: (u32, u32),
    phenology: PhenologyTable,
) -> CropProfile {
    CropProfile {
        key: key.to_string(),
        variety: variety.to_string(),
        season_days,
        n_demand,
        crop_class,
        planting_month: planting.0,
        planting_day: planting.1,
        needs_vern_override: false,
        phenology: Some(phenology),
    }
}

/// `phases` holds (name, start fraction, end fraction).
fn phenology(total_gdd: f64, phases: &[(&str, f64, f64)]) -> PhenologyTable {
    PhenologyTable {
        total_gdd,
        phases: phases
            .iter()
            .map(|&(name, start_fraction, end_fraction)| Phenophase {
                name: name.to_string(),
                start_fraction,
                end_fraction,
            })
            .collect(),
    }
}

pub fn crops() -> Vec<CropProfile> {
    use CropClass::{Grain, RootTuber};
    use NitrogenDemand::{High, Low, Medium, MediumHigh};

    let barley_phases = phenology(
        1550.0,
        &[
            ("Germination", 0.0, 0.07),
            ("Tillering", 0.07, 0.25),
            ("Stem Extension", 0.25, 0.45),
            ("Heading", 0.45, 0.55),
            ("Flowering", 0.55, 0.65),
            ("Grain Fill", 0.65, 0.90),
            ("Maturity", 0.90, 1.0),
        ],
    );
    let wheat_phases = phenology(
        1800.0,
        &[
            ("Germination", 0.0, 0.06),
            ("Tillering", 0.06, 0.22),
            ("Stem Extension", 0.22, 0.42),
            ("Heading", 0.42, 0.52),
            ("Flowering", 0.52, 0.62),
            ("Grain Fill", 0.62, 0.88),
            ("Maturity", 0.88, 1.0),
        ],
    );
    let potato_phases = phenology(
        1500.0,
        &[
            ("Sprouting", 0.0, 0.10),
            ("Vegetative", 0.10, 0.35),
            ("Tuber Init.", 0.35, 0.50),
            ("Tuber Bulk", 0.50, 0.85),
            ("Maturity", 0.85, 1.0),
        ],
    );
    let cassava_phases = phenology(
        4500.0,
        &[
            ("Sprouting", 0.0, 0.05),
            ("Leaf Dev.", 0.05, 0.20),
            ("Vegetative", 0.20, 0.50),
            ("Root Bulk", 0.50, 0.90),
            ("Maturity", 0.90, 1.0),
        ],
    );
    let sweetpotato_phases = phenology(
        2200.0,
        &[
            ("Establishment", 0.0, 0.10),
            ("Vine Dev.", 0.10, 0.35),
            ("Root Init.", 0.35, 0.50),
            ("Root Bulk", 0.50, 0.90),
            ("Maturity", 0.90, 1.0),
        ],
    );

    let mut wheat = crop("wheat", "Winter_wheat_101", 150, MediumHigh, Grain, (6, 1), wheat_phases);
    // Winter wheat never meets its vernalization requirement in the tropics.
    wheat.needs_vern_override = true;

    vec![
        crop("barley", "Spring_barley_301", 120, Medium, Grain, (3, 15), barley_phases),
        wheat,
        crop("potato", "Potato_701", 120, High, RootTuber, (3, 15), potato_phases),
        crop("cassava", "Cassava_VanHeemst_1988", 300, Low, RootTuber, (3, 15), cassava_phases),
        crop(
            "sweetpotato",
            "Sweetpotato_VanHeemst_1988",
            150,
            Low,
            RootTuber,
            (3, 15),
            sweetpotato_phases,
        ),
    ]
}

fn location(key: &str, name: &str, latitude: f64, longitude: f64) -> Location {
    Location {
        key: key.to_string(),
        name: name.to_string(),
        latitude,
        longitude,
    }
}

pub fn locations() -> Vec<Location> {
    vec![
        location("trans_nzoia", "Trans Nzoia (Kitale)", 1.0167, 35.0000),
        location("narok", "Narok", -1.0833, 35.8667),
        location("mwea", "Mwea (Kirinyaga)", -0.7333, 37.3500),
        location("busia", "Busia (Western)", 0.4608, 34.1108),
        location("machakos", "Machakos (Eastern)", -1.5177, 37.2634),
        location("nyandarua", "Nyandarua (Central)", -0.4000, 36.5000),
        location("kilifi", "Kilifi (Coast)", -3.6305, 39.8499),
    ]
}

pub fn soils() -> Vec<SoilProfile> {
    vec![SoilProfile {
        key: DEFAULT_SOIL_KEY.to_string(),
        name: "Nitisol (highland red clay)".to_string(),
        params: SoilParams {
            sm0: 0.52,
            smfcf: 0.36,
            smw: 0.19,
            crairc: 0.06,
            rdmsol: 120.0,
            k0: 12.0,
            sope: 1.2,
            ksub: 0.8,
            nsoilbase: 30.0,
            nsoilbase_fr: Some(0.025),
        },
    }]
}

fn scenario(key: &str, name: &str, total_n: f64, apps: &[(u32, f64, f64)], description: &str) -> FertilizerScenario {
    FertilizerScenario {
        key: key.to_string(),
        name: name.to_string(),
        total_n,
        applications: apps
            .iter()
            .map(|&(d, a, r)| Application::new(d, a, r))
            .collect(),
        description: description.to_string(),
        enabled: true,
    }
}

pub fn scenarios() -> Vec<FertilizerScenario> {
    vec![
        scenario("none", "No Fertilizer", 0.0, &[], "Baseline - soil N only"),
        scenario(
            "low",
            "Low (25 kg N/ha)",
            25.0,
            &[(0, 15.0, 0.7), (30, 10.0, 0.6)],
            "Typical smallholder",
        ),
        scenario(
            "medium",
            "Medium (50 kg N/ha)",
            50.0,
            &[(0, 20.0, 0.7), (30, 15.0, 0.65), (50, 15.0, 0.6)],
            "Improved smallholder",
        ),
        scenario(
            "recommended",
            "Recommended (75 kg N/ha)",
            75.0,
            &[(0, 25.0, 0.7), (30, 25.0, 0.65), (50, 25.0, 0.6)],
            "Extension recommendation",
        ),
        scenario(
            "high",
            "High (100 kg N/ha)",
            100.0,
            &[(0, 30.0, 0.7), (25, 35.0, 0.65), (50, 35.0, 0.6)],
            "Commercial/intensive",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for c in crops() {
            c.validate().unwrap();
        }
        for l in locations() {
            l.validate().unwrap();
        }
        for s in soils() {
            s.validate().unwrap();
        }
        for s in scenarios() {
            s.validate().unwrap();
        }
    }

    #[test]
    fn test_only_wheat_needs_vern_override() {
        let flagged: Vec<String> = crops()
            .into_iter()
            .filter(|c| c.needs_vern_override)
            .map(|c| c.key)
            .collect();
        assert_eq!(flagged, vec!["wheat".to_string()]);
    }

    #[test]
    fn test_scenario_totals_match_applications() {
        for s in scenarios() {
            let applied: f64 = s.applications.iter().map(|a| a.amount_kg_ha).sum();
            assert_eq!(applied, s.total_n, "scenario {}", s.key);
        }
    }

    #[test]
    fn test_root_tuber_crops() {
        let roots: Vec<String> = crops()
            .into_iter()
            .filter(|c| c.crop_class == CropClass::RootTuber)
            .map(|c| c.key)
            .collect();
        assert_eq!(roots, vec!["potato", "cassava", "sweetpotato"]);
    }

    #[test]
    fn test_every_crop_has_phenology() {
        for c in crops() {
            let table = c.phenology.as_ref().unwrap();
            assert!(table.total_gdd > 0.0, "crop {}", c.key);
            assert_eq!(table.phases.last().unwrap().name, "Maturity", "crop {}", c.key);
        }
        let barley = crops().remove(0);
        assert_eq!(barley.phenology.unwrap().total_gdd, 1550.0);
    }
}
