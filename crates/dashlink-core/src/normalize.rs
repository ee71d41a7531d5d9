//! Metric Normalization
//!
//! Maps raw metric values from the telemetry feed onto a `[0, 1]` fraction:
//! - Ratio metrics (`Simple1`, `Simple3`, `Simple5`): value / 100
//! - Temperature metrics (`Simple2`, `Simple4`, `Simple6`): value / max temperature
//! - Speed metrics (`Simple7`, `Simple8`): value / max speed
//! - Fine-speed metrics (`Simple9`, `Simple10`): value / (max speed * 0.1)
//!
//! Unrecognized keys normalize to 0.

use std::sync::OnceLock;

use regex::Regex;

/// Upper bounds used to scale the ceiling-based metric classes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ceilings {
    /// Temperature that maps to 100%
    pub max_temperature: f64,
    /// Speed that maps to 100%
    pub max_speed: f64,
}

/// Normalization formula family of a metric key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricClass {
    /// Already a percentage
    Ratio,
    /// Scaled by the temperature ceiling
    Temperature,
    /// Scaled by the speed ceiling
    Speed,
    /// Scaled by a tenth of the speed ceiling
    FineSpeed,
    /// No known formula
    Unknown,
}

impl MetricClass {
    /// Classify a frame key.
    ///
    /// Only the metric identifier after the last `|` of the key is
    /// considered, so labelled keys like `CPU|Simple1` classify as `Simple1`.
    pub fn from_key(key: &str) -> Self {
        let id = key.rsplit('|').next().unwrap_or(key).trim();
        match id {
            "Simple1" | "Simple3" | "Simple5" => MetricClass::Ratio,
            "Simple2" | "Simple4" | "Simple6" => MetricClass::Temperature,
            "Simple7" | "Simple8" => MetricClass::Speed,
            "Simple9" | "Simple10" => MetricClass::FineSpeed,
            _ => MetricClass::Unknown,
        }
    }

    /// Fraction of full scale for `value`, clamped into `[0, 1]`
    pub fn percentage(self, value: f64, ceilings: &Ceilings) -> f64 {
        let raw = match self {
            MetricClass::Ratio => value / 100.0,
            MetricClass::Temperature => value / ceilings.max_temperature,
            MetricClass::Speed => value / ceilings.max_speed,
            MetricClass::FineSpeed => value / (ceilings.max_speed * 0.1),
            MetricClass::Unknown => 0.0,
        };
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, 1.0)
        }
    }
}

/// One normalized metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Frame key the sample came from
    pub key: String,
    /// Unrounded fraction of full scale
    pub percentage: f64,
    /// Fraction quantized to hundredths
    pub rounded: f64,
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("static pattern is valid"))
}

/// Extract the first number embedded in a value such as `"CPU 75.3%"`
pub fn extract_number(raw: &str) -> Option<f64> {
    number_pattern()
        .find(raw)
        .and_then(|m| m.as_str().parse().ok())
}

/// Round to two decimal places
pub fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Normalize one `(key, raw value)` pair.
///
/// Returns `None` when the value carries no number.
pub fn normalize(key: &str, raw_value: &str, ceilings: &Ceilings) -> Option<MetricSample> {
    let value = extract_number(raw_value)?;
    let percentage = MetricClass::from_key(key).percentage(value, ceilings);
    Some(MetricSample {
        key: key.to_string(),
        percentage,
        rounded: round_hundredths(percentage),
    })
}
