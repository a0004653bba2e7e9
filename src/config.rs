//! Run configuration and request types.
use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Constant overrides keyed by node name. Ordered so iteration is deterministic.
pub type Overrides = BTreeMap<String, f64>;

/// Time axis of a simulation. Defaults match the reference model's control
/// variables: months 0 to 120 in steps of one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_time: f64,
    pub final_time: f64,
    pub step_size: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { initial_time: 0.0, final_time: 120.0, step_size: 1.0 }
    }
}

impl SimulationConfig {
    pub fn new(initial_time: f64, final_time: f64, step_size: f64) -> Self {
        Self { initial_time, final_time, step_size }
    }

    /// Same axis, ending at `final_time`.
    pub fn until(final_time: f64) -> Self {
        Self { final_time, ..Self::default() }
    }

    /// Validates the axis and returns the number of steps it spans.
    pub fn step_count(&self) -> Result<u64> {
        let Self { initial_time, final_time, step_size } = *self;
        if !(initial_time.is_finite() && final_time.is_finite() && step_size.is_finite()) {
            return Err(SimulationError::invalid_parameter("time axis", "times must be finite"));
        }
        if step_size <= 0.0 {
            return Err(SimulationError::invalid_parameter(
                "step_size",
                format!("must be positive, got {step_size}"),
            ));
        }
        if final_time < initial_time {
            return Err(SimulationError::invalid_parameter(
                "final_time",
                format!("{final_time} precedes initial_time {initial_time}"),
            ));
        }

        let span = (final_time - initial_time) / step_size;
        let steps = span.round();
        if (span - steps).abs() > 1e-9 * span.max(1.0) {
            return Err(SimulationError::invalid_parameter(
                "step_size",
                format!("{step_size} does not divide the interval {initial_time}..{final_time}"),
            ));
        }
        Ok(steps as u64)
    }

    /// Time at step `k`, derived from the index rather than accumulated.
    #[inline(always)]
    pub fn time_at(&self, k: u64) -> f64 {
        self.initial_time + k as f64 * self.step_size
    }
}

/// A complete run: overrides, requested columns and an optional time axis.
///
/// Missing axis fields fall back to [`SimulationConfig::default`]. An empty
/// column list selects every node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunRequest {
    pub overrides: Overrides,
    pub columns: Vec<String>,
    pub initial_time: Option<f64>,
    pub final_time: Option<f64>,
    pub step_size: Option<f64>,
}

impl RunRequest {
    pub fn new(overrides: Overrides, columns: &[&str]) -> Self {
        Self {
            overrides,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_config(mut self, config: SimulationConfig) -> Self {
        self.initial_time = Some(config.initial_time);
        self.final_time = Some(config.final_time);
        self.step_size = Some(config.step_size);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SimulationError::MalformedRequest(e.to_string()))
    }

    pub fn config(&self) -> SimulationConfig {
        let base = SimulationConfig::default();
        SimulationConfig {
            initial_time: self.initial_time.unwrap_or(base.initial_time),
            final_time: self.final_time.unwrap_or(base.final_time),
            step_size: self.step_size.unwrap_or(base.step_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SimulationConfig::default(), 120)]
    #[case(SimulationConfig::new(0.0, 12.0, 0.25), 48)]
    #[case(SimulationConfig::new(5.0, 5.0, 1.0), 0)]
    #[case(SimulationConfig::new(0.0, 1.0, 0.1), 10)]
    fn test_step_count(#[case] config: SimulationConfig, #[case] expected: u64) {
        assert_eq!(config.step_count().unwrap(), expected);
    }

    #[rstest]
    #[case(SimulationConfig::new(0.0, 10.0, 0.0))]
    #[case(SimulationConfig::new(0.0, 10.0, -1.0))]
    #[case(SimulationConfig::new(10.0, 0.0, 1.0))]
    #[case(SimulationConfig::new(0.0, 10.0, 3.0))]
    #[case(SimulationConfig::new(0.0, f64::INFINITY, 1.0))]
    fn test_invalid_axis(#[case] config: SimulationConfig) {
        assert!(matches!(config.step_count(), Err(SimulationError::InvalidParameter { .. })));
    }

    #[test]
    fn test_request_from_json_fills_defaults() {
        let req = RunRequest::from_json(r#"{"overrides": {"carbon_tax_rate": 500}, "final_time": 24}"#).unwrap();
        assert_eq!(req.overrides.get("carbon_tax_rate"), Some(&500.0));
        assert!(req.columns.is_empty());
        assert_eq!(req.config(), SimulationConfig::new(0.0, 24.0, 1.0));
    }

    #[test]
    fn test_malformed_request() {
        let err = RunRequest::from_json(r#"{"overrides": {"tax": "high"}}"#).unwrap_err();
        assert!(matches!(err, SimulationError::MalformedRequest(_)));
    }
}
