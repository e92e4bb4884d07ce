use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest epsilon a debug run may request.
pub const MAX_DEBUG_EPSILON: f64 = 64.0;

#[derive(Debug, Error, PartialEq)]
pub enum PrivacyParamsError {
    #[error("delta must be in (0, 1), got {0}")]
    InvalidDelta(f64),

    #[error("epsilon must be positive and finite, got {0}")]
    InvalidEpsilon(f64),

    #[error("debug privacy epsilon must be in (0, 64], got {0}")]
    InvalidDebugEpsilon(f64),

    #[error("l1 sensitivity must be positive, got {0}")]
    InvalidL1Sensitivity(i64),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum Mechanism {
    #[default]
    Laplace,
}

/// Privacy parameters of one job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobScopedPrivacyParams {
    pub mechanism: Mechanism,
    pub epsilon: f64,
    pub l1_sensitivity: i64,
    /// Only used for thresholding.
    pub delta: f64,
}

impl JobScopedPrivacyParams {
    /// Checked constructor.
    pub fn new(
        epsilon: f64,
        l1_sensitivity: i64,
        delta: f64,
    ) -> Result<Self, PrivacyParamsError> {
        let params = Self {
            mechanism: Mechanism::Laplace,
            epsilon,
            l1_sensitivity,
            delta,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), PrivacyParamsError> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(PrivacyParamsError::InvalidEpsilon(self.epsilon));
        }
        if self.l1_sensitivity <= 0 {
            return Err(PrivacyParamsError::InvalidL1Sensitivity(
                self.l1_sensitivity,
            ));
        }
        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(PrivacyParamsError::InvalidDelta(self.delta));
        }
        Ok(())
    }

    /// Laplace scale `b = l1 / epsilon`.
    pub fn laplace_scale(&self) -> f64 {
        self.l1_sensitivity as f64 / self.epsilon
    }

    /// Copy of these params with `epsilon` replaced by a validated debug
    /// epsilon. `self` is left untouched.
    pub fn with_debug_epsilon(
        &self,
        debug_epsilon: f64,
    ) -> Result<Self, PrivacyParamsError> {
        validate_debug_epsilon(debug_epsilon)?;
        Ok(Self {
            epsilon: debug_epsilon,
            ..*self
        })
    }

    /// Params for one request: the debug override if given, else `self`.
    pub fn scoped(
        &self,
        debug_epsilon: Option<f64>,
    ) -> Result<Self, PrivacyParamsError> {
        match debug_epsilon {
            Some(epsilon) => self.with_debug_epsilon(epsilon),
            None => Ok(*self),
        }
    }
}

pub fn validate_debug_epsilon(epsilon: f64) -> Result<(), PrivacyParamsError> {
    if epsilon > 0.0 && epsilon <= MAX_DEBUG_EPSILON {
        Ok(())
    } else {
        Err(PrivacyParamsError::InvalidDebugEpsilon(epsilon))
    }
}
