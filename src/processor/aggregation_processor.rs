use std::{collections::HashSet, sync::Arc};

use log::{info, warn};
use rayon::prelude::*;

use crate::{
    aggregation::{AggregationEngine, AggregationEngineFactory},
    budget::{
        PrivacyBudgetKeyGeneratorFactory, PrivacyBudgetingServiceBridge,
    },
    config::{JobParameters, WorkerConfig},
    domain::{BlobStorageClient, OutputDomainReader},
    model::{AggregatedFact, AggregationKey, Report},
    noise::{
        params::validate_debug_epsilon, LaplaceNoiseApplier, NoiseApplier,
        NoisedAggregationResult, NoisedAggregationRunner,
    },
    processor::error::AggregationJobError,
};

/// Results of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationJobOutput {
    /// Facts to publish, sorted by bucket.
    pub summary: NoisedAggregationResult,

    /// Every bucket with its debug annotations, only for debug runs.
    pub debug: Option<NoisedAggregationResult>,

    pub accepted_reports: usize,
}

/// Runs a whole aggregation job: reads the output domain, aggregates the
/// reports, charges the privacy budget and noises the result.
pub struct AggregationProcessor {
    config: WorkerConfig,
    engine_factory: AggregationEngineFactory,
    domain_reader: OutputDomainReader,
    noise_runner: NoisedAggregationRunner,
    budget_bridge: Arc<dyn PrivacyBudgetingServiceBridge>,
}

impl AggregationProcessor {
    pub fn new(
        config: WorkerConfig,
        key_generator_factory: Arc<PrivacyBudgetKeyGeneratorFactory>,
        storage: Arc<dyn BlobStorageClient>,
        budget_bridge: Arc<dyn PrivacyBudgetingServiceBridge>,
    ) -> Result<Self, AggregationJobError> {
        let applier = LaplaceNoiseApplier::new(config.noise_seed);
        Self::with_noise_applier(
            config,
            key_generator_factory,
            storage,
            budget_bridge,
            Arc::new(applier),
        )
    }

    pub fn with_noise_applier(
        config: WorkerConfig,
        key_generator_factory: Arc<PrivacyBudgetKeyGeneratorFactory>,
        storage: Arc<dyn BlobStorageClient>,
        budget_bridge: Arc<dyn PrivacyBudgetingServiceBridge>,
        noise_applier: Arc<dyn NoiseApplier>,
    ) -> Result<Self, AggregationJobError> {
        let noise_runner = NoisedAggregationRunner::new(
            config.privacy_params()?,
            noise_applier,
        )?
        .with_parallel_noising(config.parallel_noising);
        let domain_reader = OutputDomainReader::new(
            storage,
            config.domain_file_format,
            config.domain_read_parallelism,
        );
        Ok(Self {
            engine_factory: AggregationEngineFactory::new(
                key_generator_factory,
            ),
            domain_reader,
            noise_runner,
            budget_bridge,
            config,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn process(
        &self,
        reports: Vec<Report>,
        job: &JobParameters,
    ) -> Result<AggregationJobOutput, AggregationJobError> {
        if let Some(epsilon) = job.debug_privacy_epsilon {
            validate_debug_epsilon(epsilon)?;
        }

        // Start the domain read first so it overlaps with aggregation.
        let domain_read = match &job.output_domain {
            Some(location) => {
                Some(self.domain_reader.read_and_dedup_domain(location)?)
            }
            None if self.config.domain_optional => None,
            None => return Err(AggregationJobError::MissingOutputDomain),
        };

        let engine = Arc::new(
            self.engine_factory.create(job.filtering_ids.iter().copied()),
        );
        let total_reports = reports.len();
        let accepted_reports = Self::aggregate(Arc::clone(&engine), reports)
            .await?;
        info!(
            "Aggregated {} of {} reports into {} buckets",
            accepted_reports,
            total_reports,
            engine.key_set().len()
        );

        let report_buckets: HashSet<u128> =
            engine.key_set().into_iter().map(|key| key.bucket()).collect();
        let domain = match domain_read {
            Some(handle) => handle
                .await
                .map_err(|e| AggregationJobError::TaskFailed(e.to_string()))??,
            None => HashSet::new(),
        };

        // Debug runs are not charged.
        if !job.debug_run {
            self.consume_privacy_budget(&engine, job)?;
        }

        for bucket in &domain {
            engine.accept_key(AggregationKey(*bucket));
        }

        let mut aggregation = engine.make_aggregation();
        let report_only: Vec<AggregatedFact> = report_buckets
            .difference(&domain)
            .filter_map(|bucket| aggregation.remove(&AggregationKey(*bucket)))
            .collect();

        let epsilon = job.debug_privacy_epsilon;
        let noised_domain =
            self.noise_runner.noise(aggregation.into_values(), epsilon)?;
        let noised_report_only =
            if job.debug_run || self.config.domain_optional {
                Some(self.noise_runner.noise(report_only, epsilon)?)
            } else {
                None
            };

        let mut summary = noised_domain.clone();
        if let (true, Some(noised)) =
            (self.config.domain_optional, &noised_report_only)
        {
            let kept = if self.config.enable_thresholding {
                self.noise_runner
                    .threshold(noised.noised_aggregated_facts.clone(), epsilon)?
            } else {
                noised.clone()
            };
            summary = summary.merge(kept);
        }
        sort_by_bucket(&mut summary);

        let debug = match (job.debug_run, noised_report_only) {
            (true, Some(report_only)) => {
                let mut debug = noised_domain
                    .merge(report_only)
                    .with_debug_annotations(&report_buckets, &domain);
                sort_by_bucket(&mut debug);
                Some(debug)
            }
            _ => None,
        };

        Ok(AggregationJobOutput {
            summary,
            debug,
            accepted_reports,
        })
    }

    /// Accepts all reports on the rayon pool. Returns how many reports
    /// were new.
    async fn aggregate(
        engine: Arc<AggregationEngine>,
        reports: Vec<Report>,
    ) -> Result<usize, AggregationJobError> {
        let accepted = tokio::task::spawn_blocking(move || {
            reports
                .par_iter()
                .map(|report| engine.accept(report).map(usize::from))
                .try_reduce(|| 0, |a, b| Ok(a + b))
        })
        .await
        .map_err(|e| AggregationJobError::TaskFailed(e.to_string()))??;
        Ok(accepted)
    }

    fn consume_privacy_budget(
        &self,
        engine: &AggregationEngine,
        job: &JobParameters,
    ) -> Result<(), AggregationJobError> {
        let identity = job
            .attribution_report_to
            .as_deref()
            .ok_or(AggregationJobError::MissingAttributionReportTo)?;
        let units = engine.privacy_budget_units();
        if units.is_empty() {
            return Ok(());
        }

        let exhausted =
            self.budget_bridge.consume_privacy_budget(&units, identity)?;
        if exhausted.is_empty() {
            info!("Consumed {} privacy budget units", units.len());
            return Ok(());
        }

        warn!(
            "Privacy budget exhausted for {} of {} units",
            exhausted.len(),
            units.len()
        );
        Err(AggregationJobError::PrivacyBudgetExhausted(
            engine.privacy_budget_key_inputs_from_privacy_budget_units(
                &exhausted,
            ),
        ))
    }
}

fn sort_by_bucket(result: &mut NoisedAggregationResult) {
    result
        .noised_aggregated_facts
        .sort_unstable_by_key(|fact| fact.bucket);
}
