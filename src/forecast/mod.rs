pub(crate) mod artifact;
pub(crate) mod daylight;
pub(crate) mod model;

use serde::Deserialize;
use thiserror::Error;

use crate::forecast::artifact::PredictionArtifact;
use crate::forecast::daylight::{Month, daylight_indicator, window_for_month};

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("expected {expected} features, got {got}")]
    FeatureCount { expected: usize, got: usize },
    #[error("feature index {feature} out of range for {len} features")]
    FeatureIndex { feature: usize, len: usize },
    #[error("tree {tree} references missing node {node}")]
    NodeIndex { tree: usize, node: usize },
    #[error("tree {tree} does not terminate in a leaf")]
    UnterminatedTree { tree: usize },
    #[error("model produced a non-finite value: {0}")]
    NonFinite(f64),
    #[error("{0}")]
    Backend(String),
}

/// Observed conditions for the current hour
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PredictionRequest {
    pub current_energy: f64,
    pub current_humidity: f64,
    pub current_hour: i64,
    pub current_month: Month,
}

impl PredictionRequest {
    /// Name of the first float field holding NaN or an infinity
    pub fn non_finite_field(&self) -> Option<&'static str> {
        if !self.current_energy.is_finite() {
            Some("current_energy")
        } else if !self.current_humidity.is_finite() {
            Some("current_humidity")
        } else {
            None
        }
    }
}

/// The hour being forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextSlot {
    pub hour: i64,
    pub month: Month,
}

impl NextSlot {
    /// Advance one hour. The month only moves forward when the hour wraps past 23.
    pub fn after(hour: i64, month: Month) -> Self {
        let next_hour = (hour.rem_euclid(24) + 1) % 24;
        let next_month = if next_hour == 0 {
            month.rem_euclid(12) + 1
        } else {
            month
        };

        Self {
            hour: next_hour,
            month: next_month,
        }
    }

    pub fn daylight(&self) -> u8 {
        daylight_indicator(self.hour, self.month)
    }
}

/// Predict generation for the hour after `request`.
///
/// Returns 0 without touching the model when that hour is outside the
/// daylight window. Otherwise the features `[energy, humidity, daylight]`
/// are scaled and fed to the regressor, and the result is clamped at 0.
pub fn predict_next_generation(
    artifact: &PredictionArtifact,
    request: &PredictionRequest,
) -> Result<f64, PredictionError> {
    let next = NextSlot::after(request.current_hour, request.current_month);
    let daylight = next.daylight();

    if daylight == 0 {
        tracing::debug!(
            hour = next.hour,
            month = next.month,
            window = %window_for_month(next.month),
            "next hour is dark"
        );
        return Ok(0.0);
    }

    let features = [
        request.current_energy,
        request.current_humidity,
        f64::from(daylight),
    ];
    let scaled = artifact.scaler().transform(&features)?;
    let prediction = artifact.model().predict(&scaled)?.max(0.0);

    // NaN is already clamped to 0, infinities cannot be encoded as JSON
    if !prediction.is_finite() {
        return Err(PredictionError::NonFinite(prediction));
    }

    Ok(prediction)
}

/// Round to two decimal places, exact ties to even
pub fn round_generation(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
