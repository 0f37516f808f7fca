//! In-process stand-ins for the engine and the weather provider.

use chrono::{Days, NaiveDate};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::catalog::models::Location;
use crate::services::agromanagement::AgroCalendar;
use crate::services::engine::{
    CropEngine, EngineError, EngineOutput, ParameterSet, RawRunOutput, RunSummary,
};
use crate::services::weather::{
    WeatherError, WeatherProvider, WeatherSample, WeatherSource, WeatherTable,
};

/// Every day of `year` at tmax 25 / tmin 11 (18 GDD per day).
pub(crate) fn uniform_weather(year: i32) -> WeatherTable {
    let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
    WeatherTable::new(
        start
            .iter_days()
            .take_while(|d| *d <= NaiveDate::from_ymd_opt(year, 12, 31).unwrap())
            .map(|date| WeatherSample {
                date,
                tmax: 25.0,
                tmin: 11.0,
                rain: 1.0,
                radiation: 18.0,
            }),
    )
}

/// Deterministic engine: `days` daily rows from the planting date and a
/// storage-organ yield of 1000 kg/ha plus 20 kg per kg of applied N.
pub(crate) struct FakeEngine {
    days: u64,
    available: bool,
    with_summary: bool,
    fail_on_calls: Vec<usize>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    seen: Mutex<Vec<(ParameterSet, AgroCalendar)>>,
}

impl FakeEngine {
    pub(crate) fn new(days: u64) -> Self {
        Self {
            days,
            available: true,
            with_summary: true,
            fail_on_calls: Vec::new(),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long inside every run.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of runs observed in progress at the same time.
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Fail the `index`-th invocation (0-based).
    pub(crate) fn failing_on_call(mut self, index: usize) -> Self {
        self.fail_on_calls.push(index);
        self
    }

    pub(crate) fn without_summary(mut self) -> Self {
        self.with_summary = false;
        self
    }

    pub(crate) fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub(crate) fn seen_params(&self) -> Vec<ParameterSet> {
        self.seen.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub(crate) fn seen_calendars(&self) -> Vec<AgroCalendar> {
        self.seen.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }
}

impl CropEngine for FakeEngine {
    fn check_available(&self) -> Result<(), EngineError> {
        if self.available {
            Ok(())
        } else {
            Err(EngineError::Unavailable("fake engine switched off".to_string()))
        }
    }

    fn run_till_terminate(
        &self,
        params: &ParameterSet,
        _weather: &dyn WeatherProvider,
        calendar: &AgroCalendar,
    ) -> Result<EngineOutput, EngineError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let outcome = self.simulate(params, calendar);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

impl FakeEngine {
    fn simulate(
        &self,
        params: &ParameterSet,
        calendar: &AgroCalendar,
    ) -> Result<EngineOutput, EngineError> {
        let index = {
            let mut seen = self.seen.lock().unwrap();
            seen.push((params.clone(), calendar.clone()));
            seen.len() - 1
        };
        if self.fail_on_calls.contains(&index) {
            return Err(EngineError::Failed {
                status: "status 1".to_string(),
                stderr: "simulated crash".to_string(),
            });
        }

        let records: Vec<serde_json::Map<String, serde_json::Value>> = (0..self.days)
            .map(|i| {
                let day = calendar.crop_start_date + Days::new(i);
                let dvs = 2.0 * i as f64 / self.days.max(1) as f64;
                let row = json!({"day": day.to_string(), "DVS": dvs, "LAI": 0.1 * i as f64});
                row.as_object().cloned().unwrap_or_default()
            })
            .collect();

        let applied: f64 = calendar
            .timed_events
            .as_ref()
            .map(|events| events.iter().map(|e| e.amount_kg_ha).sum())
            .unwrap_or(0.0);
        let summary = self.with_summary.then(|| {
            RunSummary::from([
                ("TWSO", 1000.0 + 20.0 * applied),
                ("TAGP", 5000.0 + 40.0 * applied),
                ("LAIMAX", 3.5),
            ])
        });

        Ok(EngineOutput {
            daily: RawRunOutput::from_records(&records)?,
            summary,
        })
    }
}

/// Hands out a fixed weather table, or fails when `table` is `None`.
pub(crate) struct FakeWeatherSource {
    table: Option<WeatherTable>,
}

impl FakeWeatherSource {
    pub(crate) fn with(table: WeatherTable) -> Self {
        Self { table: Some(table) }
    }

    pub(crate) fn broken() -> Self {
        Self { table: None }
    }
}

impl WeatherSource for FakeWeatherSource {
    fn open(&self, location: &Location) -> Result<Arc<dyn WeatherProvider>, WeatherError> {
        match &self.table {
            Some(table) => Ok(Arc::new(table.clone())),
            None => Err(WeatherError::Unavailable(format!(
                "no weather for {}",
                location.name
            ))),
        }
    }
}
