//! One-dimensional Kalman filter used to denoise the price spread
//!
//! The filter assumes a random-walk state: predict widens the variance by the
//! process noise `Q`, correct blends in each observation with gain
//! `K = P / (P + R)`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Windows shorter than this are returned unchanged
pub const MIN_SMOOTHING_LEN: usize = 5;

/// Noise parameters for [`KalmanSmoother`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KalmanParams {
    /// Process noise `Q` added to the variance on every predict step
    pub process_noise: f64,
    /// Observation noise `R`
    pub observation_noise: f64,
    /// Variance `P₀` of the initial estimate
    pub initial_variance: f64,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            process_noise: 1.0,
            observation_noise: 1.0,
            initial_variance: 1.0,
        }
    }
}

impl KalmanParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.process_noise.is_finite() || self.process_noise < 0.0 {
            return Err(ConfigError::invalid("process_noise", "must be finite and >= 0"));
        }
        if !self.observation_noise.is_finite() || self.observation_noise <= 0.0 {
            return Err(ConfigError::invalid("observation_noise", "must be finite and > 0"));
        }
        if !self.initial_variance.is_finite() || self.initial_variance < 0.0 {
            return Err(ConfigError::invalid("initial_variance", "must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Current estimate and its variance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SmootherState {
    pub estimate: f64,
    pub error_variance: f64,
}

/// Scalar recursive filter. The first observation seeds the estimate; every
/// later one goes through predict/correct.
#[derive(Debug, Clone)]
pub struct KalmanSmoother {
    params: KalmanParams,
    state: Option<SmootherState>,
}

impl KalmanSmoother {
    pub fn new(params: KalmanParams) -> Self {
        Self { params, state: None }
    }

    pub fn params(&self) -> &KalmanParams {
        &self.params
    }

    pub fn state(&self) -> Option<SmootherState> {
        self.state
    }

    /// Feed one observation and return the updated estimate
    pub fn update(&mut self, observation: f64) -> f64 {
        let next = match self.state {
            None => SmootherState {
                estimate: observation,
                error_variance: self.params.initial_variance,
            },
            Some(SmootherState { estimate, error_variance }) => {
                let predicted_variance = error_variance + self.params.process_noise;
                let gain = predicted_variance / (predicted_variance + self.params.observation_noise);
                SmootherState {
                    estimate: estimate + gain * (observation - estimate),
                    error_variance: (1.0 - gain) * predicted_variance,
                }
            }
        };
        self.state = Some(next);
        next.estimate
    }

    pub fn reset(&mut self) {
        self.state = None;
    }

    /// Smooth a whole window from a fresh state.
    ///
    /// Windows shorter than [`MIN_SMOOTHING_LEN`] are returned as-is.
    pub fn smooth(params: KalmanParams, values: &[f64]) -> Vec<f64> {
        if values.len() < MIN_SMOOTHING_LEN {
            return values.to_vec();
        }

        let mut smoother = Self::new(params);
        values.iter().map(|&y| smoother.update(y)).collect()
    }
}
