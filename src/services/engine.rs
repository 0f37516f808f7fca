//! External crop-growth engine boundary.
//!
//! The engine is opaque: it takes a parameter set, a weather provider and an
//! agromanagement calendar, runs until maturity or the calendar end, and
//! hands back a daily output table plus end-of-run summary values.
//!
//! `SubprocessEngine` drives an engine executable over stdin/stdout:
//! one JSON request in, one JSON document out.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

use crate::helpers::json_to_f64;
use crate::services::agromanagement::AgroCalendar;
use crate::services::weather::{collect_range, WeatherProvider, WeatherSample};

/// Number of stderr lines kept in error messages.
const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to start engine: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("Engine protocol error: {0}")]
    Protocol(String),
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Crop, soil and site parameters for one run, plus forced overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSet {
    pub crop_name: String,
    pub variety_name: String,
    pub soil: BTreeMap<String, f64>,
    pub site: BTreeMap<String, f64>,
    /// Applied on top of the engine's crop parameter file.
    pub overrides: BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Daily engine output, stored column-wise and aligned with `days`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawRunOutput {
    days: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl RawRunOutput {
    /// Build from per-day records. Every record must carry a `day` field
    /// holding an ISO date; every other field becomes a column.
    pub fn from_records(
        records: &[serde_json::Map<String, serde_json::Value>],
    ) -> Result<Self, EngineError> {
        let mut days = Vec::with_capacity(records.len());
        let mut columns: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();

        for (i, record) in records.iter().enumerate() {
            let day = record
                .get("day")
                .and_then(|v| v.as_str())
                .ok_or_else(|| EngineError::Protocol(format!("output row {} has no 'day'", i)))?;
            let day = day.get(..10).unwrap_or(day).parse::<NaiveDate>().map_err(|e| {
                EngineError::Protocol(format!("output row {}: bad day '{}': {}", i, day, e))
            })?;
            days.push(day);

            for (name, value) in record {
                if name == "day" {
                    continue;
                }
                let column = columns
                    .entry(name.clone())
                    .or_insert_with(|| vec![None; i]);
                column.push(json_to_f64(value));
            }
            // Pad columns this row did not mention.
            for column in columns.values_mut() {
                if column.len() < days.len() {
                    column.push(None);
                }
            }
        }

        Ok(Self { days, columns })
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Attach a derived column. `values` must be index-aligned with `days`.
    pub fn attach_column(&mut self, name: &str, values: Vec<f64>) -> Result<(), EngineError> {
        if values.len() != self.days.len() {
            return Err(EngineError::Protocol(format!(
                "column '{}' has {} values for {} days",
                name,
                values.len(),
                self.days.len()
            )));
        }
        self.columns
            .insert(name.to_string(), values.into_iter().map(Some).collect());
        Ok(())
    }
}

/// End-of-run scalar statistics, keyed by engine variable name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    values: BTreeMap<String, Option<f64>>,
}

impl RunSummary {
    pub fn from_record(record: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            values: record
                .iter()
                .map(|(k, v)| (k.clone(), json_to_f64(v)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    /// Storage organ mass (kg/ha).
    pub fn twso(&self) -> Option<f64> {
        self.get("TWSO")
    }

    /// Total aboveground biomass (kg/ha).
    pub fn tagp(&self) -> Option<f64> {
        self.get("TAGP")
    }

    /// Peak leaf area index.
    pub fn laimax(&self) -> Option<f64> {
        self.get("LAIMAX")
    }
}

#[cfg(test)]
impl<const N: usize> From<[(&str, f64); N]> for RunSummary {
    fn from(pairs: [(&str, f64); N]) -> Self {
        Self {
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Some(*v)))
                .collect(),
        }
    }
}

/// Everything a finished run hands back.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub daily: RawRunOutput,
    /// First summary record, if the engine produced one.
    pub summary: Option<RunSummary>,
}

/// An external crop-growth engine. Calls are never made concurrently.
pub trait CropEngine: Send + Sync {
    /// Verify the engine can be invoked at all. Called once per batch.
    fn check_available(&self) -> Result<(), EngineError>;

    /// Run one simulation to natural or calendar termination.
    fn run_till_terminate(
        &self,
        params: &ParameterSet,
        weather: &dyn WeatherProvider,
        calendar: &AgroCalendar,
    ) -> Result<EngineOutput, EngineError>;
}

// ---------------------------------------------------------------------------
// Subprocess engine
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EngineRequest<'a> {
    parameters: &'a ParameterSet,
    agromanagement: &'a AgroCalendar,
    weather: Vec<WeatherSample>,
}

#[derive(Deserialize)]
struct EngineResponse {
    output: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    summary: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Runs the engine as a child process per scenario.
#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    program: String,
    args: Vec<String>,
}

impl SubprocessEngine {
    /// `command` is the program followed by its arguments.
    pub fn new(command: &[String]) -> Result<Self, EngineError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| EngineError::Unavailable("empty engine command".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn resolve_program(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }
}

impl CropEngine for SubprocessEngine {
    fn check_available(&self) -> Result<(), EngineError> {
        match self.resolve_program() {
            Some(path) => {
                tracing::debug!("Engine: using {}", path.display());
                Ok(())
            }
            None => Err(EngineError::Unavailable(format!(
                "'{}' not found",
                self.program
            ))),
        }
    }

    fn run_till_terminate(
        &self,
        params: &ParameterSet,
        weather: &dyn WeatherProvider,
        calendar: &AgroCalendar,
    ) -> Result<EngineOutput, EngineError> {
        let request = EngineRequest {
            parameters: params,
            agromanagement: calendar,
            weather: collect_range(weather, calendar.crop_start_date, calendar.crop_end_date),
        };
        let input = serde_json::to_vec(&request)
            .map_err(|e| EngineError::Protocol(format!("failed to encode request: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            // An engine may exit before reading its whole request; its exit
            // status and stderr explain why, so the child is still reaped.
            if let Err(e) = stdin.write_all(&input) {
                tracing::warn!("Engine: request write failed: {}", e);
            }
        }
        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                status: output
                    .status
                    .code()
                    .map(|c| format!("status {}", c))
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: stderr_tail(&output.stderr),
            });
        }

        parse_response(&output.stdout)
    }
}

/// Decode the engine's stdout document.
fn parse_response(stdout: &[u8]) -> Result<EngineOutput, EngineError> {
    let response: EngineResponse = serde_json::from_slice(stdout)
        .map_err(|e| EngineError::Protocol(format!("invalid engine output: {}", e)))?;
    Ok(EngineOutput {
        daily: RawRunOutput::from_records(&response.output)?,
        summary: response.summary.first().map(RunSummary::from_record),
    })
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    if lines.is_empty() {
        "no stderr output".to_string()
    } else {
        lines[start..].join(" | ")
    }
}
