//! Shared helpers for engine-reported numbers.
//!
//! The external engine reports state variables as JSON numbers that may be
//! null, missing or (after arithmetic on our side) non-finite. Everything that
//! ends up in a report goes through these helpers so a bad value degrades to
//! 0 instead of leaking NaN into JSON.

/// Kilograms per tonne.
const KG_PER_TONNE: f64 = 1000.0;

/// Return `v`, or 0 for non-finite inputs (NaN, ±Inf).
pub(crate) fn finite_or_zero(v: f64) -> f64 {
    if !v.is_finite() {
        tracing::warn!("finite_or_zero received non-finite value {}, defaulting to 0", v);
        return 0.0;
    }
    v
}

/// Unwrap an optional engine value, defaulting to 0 when absent or non-finite.
pub(crate) fn opt_finite_or_zero(v: Option<f64>) -> f64 {
    v.map(finite_or_zero).unwrap_or(0.0)
}

/// Convert kg/ha to t/ha.
pub(crate) fn kg_to_t(kg: f64) -> f64 {
    kg / KG_PER_TONNE
}

/// Interpret a JSON value as an engine number. Null, strings and other
/// non-numeric values become `None`.
pub(crate) fn json_to_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
}
