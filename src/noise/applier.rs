use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp};

use crate::noise::params::{JobScopedPrivacyParams, PrivacyParamsError};

/// Adds noise to a single metric.
pub trait NoiseApplier: Send + Sync {
    fn apply(
        &self,
        value: i64,
        params: &JobScopedPrivacyParams,
    ) -> Result<i64, PrivacyParamsError>;
}

/// Laplace mechanism with location 0 and scale `l1 / epsilon`.
///
/// One sample is the difference of two exponential draws with rate
/// `1 / scale`. The sample is rounded to the nearest integer.
pub struct LaplaceNoiseApplier {
    rng: Mutex<ChaCha8Rng>,
}

impl LaplaceNoiseApplier {
    /// Seeded applier. The same seed replays the same noise sequence.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    pub fn new(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    pub fn sample(
        &self,
        params: &JobScopedPrivacyParams,
    ) -> Result<f64, PrivacyParamsError> {
        let scale = params.laplace_scale();
        let exp = Exp::new(1.0 / scale)
            .map_err(|_| PrivacyParamsError::InvalidEpsilon(params.epsilon))?;
        let mut rng = self.rng.lock();
        Ok(exp.sample(&mut *rng) - exp.sample(&mut *rng))
    }
}

impl NoiseApplier for LaplaceNoiseApplier {
    fn apply(
        &self,
        value: i64,
        params: &JobScopedPrivacyParams,
    ) -> Result<i64, PrivacyParamsError> {
        let noise = self.sample(params)?.round() as i64;
        Ok(value.saturating_add(noise))
    }
}

/// Adds the same value every time, for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantNoiseApplier(pub i64);

impl NoiseApplier for ConstantNoiseApplier {
    fn apply(
        &self,
        value: i64,
        _params: &JobScopedPrivacyParams,
    ) -> Result<i64, PrivacyParamsError> {
        Ok(value.saturating_add(self.0))
    }
}
