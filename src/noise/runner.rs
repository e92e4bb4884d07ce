use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::{
    model::AggregatedFact,
    noise::{
        applier::NoiseApplier,
        params::{JobScopedPrivacyParams, PrivacyParamsError},
        result::NoisedAggregationResult,
    },
};

/// Absolute tolerance of the threshold comparison.
pub const THRESHOLD_TOLERANCE: f64 = 0.0001;

/// Noise threshold for `params`: `scale * (epsilon + ln(1 / delta))`.
pub fn threshold_for(
    params: &JobScopedPrivacyParams,
) -> Result<f64, PrivacyParamsError> {
    params.validate()?;
    Ok(params.laplace_scale() * (params.epsilon + (1.0 / params.delta).ln()))
}

/// Whether `metric` reaches `threshold`, within [`THRESHOLD_TOLERANCE`].
pub fn passes_threshold(metric: f64, threshold: f64) -> bool {
    metric >= threshold - THRESHOLD_TOLERANCE
}

/// Adds noise to aggregated facts and drops those below the noise
/// threshold.
///
/// The runner holds the job defaults. A debug epsilon given to a call
/// applies to that call only.
#[derive(Clone)]
pub struct NoisedAggregationRunner {
    params: JobScopedPrivacyParams,
    noise_applier: Arc<dyn NoiseApplier>,
    parallel: bool,
}

impl NoisedAggregationRunner {
    pub fn new(
        params: JobScopedPrivacyParams,
        noise_applier: Arc<dyn NoiseApplier>,
    ) -> Result<Self, PrivacyParamsError> {
        params.validate()?;
        Ok(Self {
            params,
            noise_applier,
            parallel: false,
        })
    }

    /// Noises facts on the rayon pool. Draws from a seeded applier are then
    /// handed out in scheduling order, so per-bucket noise is no longer
    /// reproducible.
    pub fn with_parallel_noising(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn parallel_noising(&self) -> bool {
        self.parallel
    }

    pub fn params(&self) -> &JobScopedPrivacyParams {
        &self.params
    }

    /// Noises every fact independently. Each output fact keeps its raw
    /// sum in `unnoised_metric`.
    pub fn noise(
        &self,
        facts: impl IntoIterator<Item = AggregatedFact>,
        debug_epsilon: Option<f64>,
    ) -> Result<NoisedAggregationResult, PrivacyParamsError> {
        let params = self.params.scoped(debug_epsilon)?;
        let noised = if self.parallel {
            facts
                .into_iter()
                .collect::<Vec<_>>()
                .into_par_iter()
                .map(|fact| self.noise_with(fact, &params))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            facts
                .into_iter()
                .map(|fact| self.noise_with(fact, &params))
                .collect::<Result<Vec<_>, _>>()?
        };
        debug!(
            "Noised {} facts with epsilon {}",
            noised.len(),
            params.epsilon
        );
        Ok(NoisedAggregationResult::new(params, noised))
    }

    pub fn noise_single_fact(
        &self,
        fact: AggregatedFact,
        debug_epsilon: Option<f64>,
    ) -> Result<AggregatedFact, PrivacyParamsError> {
        let params = self.params.scoped(debug_epsilon)?;
        self.noise_with(fact, &params)
    }

    fn noise_with(
        &self,
        fact: AggregatedFact,
        params: &JobScopedPrivacyParams,
    ) -> Result<AggregatedFact, PrivacyParamsError> {
        let noised = self.noise_applier.apply(fact.metric, params)?;
        Ok(AggregatedFact {
            bucket: fact.bucket,
            metric: noised,
            unnoised_metric: Some(fact.metric),
            debug_annotations: fact.debug_annotations,
        })
    }

    /// Keeps the facts whose metric passes the threshold of the
    /// request-scoped params, which the result carries.
    pub fn threshold(
        &self,
        facts: impl IntoIterator<Item = AggregatedFact>,
        debug_epsilon: Option<f64>,
    ) -> Result<NoisedAggregationResult, PrivacyParamsError> {
        let params = self.params.scoped(debug_epsilon)?;
        let threshold = threshold_for(&params)?;
        let kept: Vec<AggregatedFact> = facts
            .into_iter()
            .filter(|fact| passes_threshold(fact.metric as f64, threshold))
            .collect();
        debug!("{} facts at or above threshold {}", kept.len(), threshold);
        Ok(NoisedAggregationResult::new(params, kept))
    }

    pub fn threshold_value(
        &self,
        debug_epsilon: Option<f64>,
    ) -> Result<f64, PrivacyParamsError> {
        threshold_for(&self.params.scoped(debug_epsilon)?)
    }
}
