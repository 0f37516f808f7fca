//! Season calendar and timed nitrogen events for one scenario run.
//!
//! The calendar is serialized verbatim into the engine request, so the shape
//! of `timed_events` matters: `None` goes out as `null` ("no management") and
//! is never collapsed into an empty list.

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

use crate::catalog::models::{CropProfile, FertilizerScenario};

/// Engine signal carried by every nitrogen event.
const APPLY_N_SIGNAL: &str = "apply_n";

/// How the crop is established on the planting date.
const CROP_START_TYPE: &str = "emergence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CropEndType {
    /// Stop at maturity or at the end date, whichever comes first.
    Earliest,
}

/// One dated nitrogen application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedEvent {
    pub event_signal: &'static str,
    /// "N application {n}", n being the 1-based position in the scenario
    pub name: String,
    pub comment: String,
    pub date: NaiveDate,
    pub amount_kg_ha: f64,
    pub recovery: f64,
}

/// The season calendar for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgroCalendar {
    pub crop_name: String,
    pub variety_name: String,
    pub crop_start_date: NaiveDate,
    pub crop_start_type: &'static str,
    pub crop_end_date: NaiveDate,
    pub crop_end_type: CropEndType,
    pub max_duration: u32,
    /// `None` when the scenario has no applications.
    pub timed_events: Option<Vec<TimedEvent>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Application {index} at +{offset} days falls outside the calendar")]
    DateOutOfRange { index: usize, offset: u32 },
    #[error("No December 31 for planting year {0}")]
    NoSeasonEnd(i32),
}

/// Build the calendar for `scenario`, planted on `planting_date`.
///
/// Applications are consumed in the order given; offsets are not sorted or
/// checked against the season length.
pub fn build_agro_calendar(
    crop: &CropProfile,
    planting_date: NaiveDate,
    scenario: &FertilizerScenario,
) -> Result<AgroCalendar, ScheduleError> {
    let year = planting_date.year();
    let crop_end_date =
        NaiveDate::from_ymd_opt(year, 12, 31).ok_or(ScheduleError::NoSeasonEnd(year))?;

    let timed_events = if scenario.applications.is_empty() {
        None
    } else {
        let mut events = Vec::with_capacity(scenario.applications.len());
        for (i, app) in scenario.applications.iter().enumerate() {
            let date = planting_date
                .checked_add_days(Days::new(u64::from(app.day_offset)))
                .ok_or(ScheduleError::DateOutOfRange {
                    index: i + 1,
                    offset: app.day_offset,
                })?;
            events.push(TimedEvent {
                event_signal: APPLY_N_SIGNAL,
                name: format!("N application {}", i + 1),
                comment: format!("{} kg N/ha", app.amount_kg_ha),
                date,
                amount_kg_ha: app.amount_kg_ha,
                recovery: app.recovery,
            });
        }
        Some(events)
    };

    Ok(AgroCalendar {
        crop_name: crop.key.clone(),
        variety_name: crop.variety.clone(),
        crop_start_date: planting_date,
        crop_start_type: CROP_START_TYPE,
        crop_end_date,
        crop_end_type: CropEndType::Earliest,
        max_duration: crop.season_days,
        timed_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::Application;
    use crate::catalog::presets;

    fn barley() -> CropProfile {
        presets::crops().into_iter().find(|c| c.key == "barley").unwrap()
    }

    fn scenario(apps: Vec<Application>) -> FertilizerScenario {
        FertilizerScenario {
            key: "s".to_string(),
            name: "S".to_string(),
            total_n: apps.iter().map(|a| a.amount_kg_ha).sum(),
            applications: apps,
            description: String::new(),
            enabled: true,
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_applications_have_no_event_entity() {
        let cal = build_agro_calendar(&barley(), date("2023-03-15"), &scenario(vec![])).unwrap();
        assert!(cal.timed_events.is_none());

        let json = serde_json::to_value(&cal).unwrap();
        assert!(json["timed_events"].is_null(), "must serialize as null, not []");
    }

    #[test]
    fn test_event_dates_from_offsets() {
        let s = scenario(vec![
            Application::new(0, 15.0, 0.7),
            Application::new(30, 10.0, 0.6),
        ]);
        let cal = build_agro_calendar(&barley(), date("2023-03-15"), &s).unwrap();
        let events = cal.timed_events.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].date, date("2023-03-15"));
        assert_eq!(events[1].date, date("2023-04-14"));
        assert_eq!(events[0].amount_kg_ha, 15.0);
        assert_eq!(events[1].recovery, 0.6);
        assert_eq!(events[0].event_signal, "apply_n");
    }

    #[test]
    fn test_events_keep_input_order_and_labels() {
        let s = scenario(vec![
            Application::new(50, 15.0, 0.6),
            Application::new(0, 20.0, 0.7),
            Application::new(30, 15.0, 0.65),
        ]);
        let cal = build_agro_calendar(&barley(), date("2023-03-15"), &s).unwrap();
        let events = cal.timed_events.unwrap();

        let dates: Vec<NaiveDate> = events.iter().map(|e| e.date).collect();
        assert_eq!(
            dates,
            vec![date("2023-05-04"), date("2023-03-15"), date("2023-04-14")]
        );
        let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["N application 1", "N application 2", "N application 3"]);
        assert_eq!(events[1].comment, "20 kg N/ha");
    }

    #[test]
    fn test_season_window() {
        let crop = barley();
        let cal = build_agro_calendar(&crop, date("2023-03-15"), &scenario(vec![])).unwrap();
        assert_eq!(cal.crop_start_date, date("2023-03-15"));
        assert_eq!(cal.crop_end_date, date("2023-12-31"));
        assert_eq!(cal.crop_end_type, CropEndType::Earliest);
        assert_eq!(cal.max_duration, crop.season_days);
        assert_eq!(cal.crop_name, "barley");
        assert_eq!(cal.variety_name, "Spring_barley_301");
    }

    #[test]
    fn test_offsets_may_run_past_season_end() {
        let s = scenario(vec![Application::new(400, 10.0, 0.5)]);
        let cal = build_agro_calendar(&barley(), date("2023-03-15"), &s).unwrap();
        assert_eq!(cal.timed_events.unwrap()[0].date, date("2024-04-18"));
    }
}
