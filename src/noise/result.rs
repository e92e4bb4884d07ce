use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    model::{AggregatedFact, DebugBucketAnnotation},
    noise::params::JobScopedPrivacyParams,
};

/// Noised facts together with the parameters that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoisedAggregationResult {
    pub privacy_params: JobScopedPrivacyParams,
    pub noised_aggregated_facts: Vec<AggregatedFact>,
}

impl NoisedAggregationResult {
    pub fn new(
        privacy_params: JobScopedPrivacyParams,
        noised_aggregated_facts: Vec<AggregatedFact>,
    ) -> Self {
        Self {
            privacy_params,
            noised_aggregated_facts,
        }
    }

    /// Concatenates the facts of two results noised with the same params.
    /// The params of `self` are kept.
    pub fn merge(mut self, other: NoisedAggregationResult) -> Self {
        self.noised_aggregated_facts
            .extend(other.noised_aggregated_facts);
        self
    }

    /// Annotates every fact with where its bucket came from: the reports,
    /// the output domain, or both.
    pub fn with_debug_annotations(
        mut self,
        report_buckets: &HashSet<u128>,
        domain_buckets: &HashSet<u128>,
    ) -> Self {
        for fact in &mut self.noised_aggregated_facts {
            let mut annotations = Vec::new();
            if report_buckets.contains(&fact.bucket) {
                annotations.push(DebugBucketAnnotation::InReports);
            }
            if domain_buckets.contains(&fact.bucket) {
                annotations.push(DebugBucketAnnotation::InDomain);
            }
            fact.debug_annotations = Some(annotations);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.noised_aggregated_facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.noised_aggregated_facts.is_empty()
    }
}
