use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use log::{debug, warn};
use uuid::Uuid;

use crate::{
    aggregation::concurrent_map::ShardedMap,
    budget::{
        KeyGenerationError, PrivacyBudgetKeyGeneratorFactory,
        PrivacyBudgetKeyInput, PrivacyBudgetUnit,
    },
    model::{AggregatedFact, AggregationKey, Report},
};

/// Filtering id of contributions that carry none.
pub const DEFAULT_FILTERING_ID: u64 = 0;

/// Sums report contributions per bucket and records the privacy budget
/// units the accepted reports consume.
///
/// Every method takes `&self` and can be called from many threads at once.
/// Readers that need a complete picture (`make_aggregation`,
/// `privacy_budget_units`) must run after all `accept` calls returned.
pub struct AggregationEngine {
    key_generator_factory: Arc<PrivacyBudgetKeyGeneratorFactory>,
    filtering_ids: BTreeSet<u64>,
    aggregation: ShardedMap<AggregationKey, AtomicI64>,
    report_ids: ShardedMap<Uuid, ()>,
    budget_units: ShardedMap<PrivacyBudgetUnit, PrivacyBudgetKeyInput>,
}

impl AggregationEngine {
    /// Creates an engine counting contributions whose filtering id is in
    /// `filtering_ids`. An empty set means `{0}`.
    pub fn new(
        key_generator_factory: Arc<PrivacyBudgetKeyGeneratorFactory>,
        filtering_ids: impl IntoIterator<Item = u64>,
    ) -> Self {
        let mut filtering_ids: BTreeSet<u64> =
            filtering_ids.into_iter().collect();
        if filtering_ids.is_empty() {
            filtering_ids.insert(DEFAULT_FILTERING_ID);
        }
        Self {
            key_generator_factory,
            filtering_ids,
            aggregation: ShardedMap::default(),
            report_ids: ShardedMap::default(),
            budget_units: ShardedMap::default(),
        }
    }

    pub fn filtering_ids(&self) -> &BTreeSet<u64> {
        &self.filtering_ids
    }

    /// Adds a report to the aggregation.
    ///
    /// Returns `Ok(false)` without any side effect on the sums when the
    /// report id was already seen or is missing. Budget units are recorded
    /// for every configured filtering id, whether or not a fact matches it.
    pub fn accept(&self, report: &Report) -> Result<bool, KeyGenerationError> {
        let info = &report.shared_info;
        let Some(report_id) = info
            .report_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
        else {
            warn!(
                "Skipping report from {} with missing or invalid id {:?}",
                info.reporting_origin, info.report_id
            );
            return Ok(false);
        };

        // A report is only marked as seen once all of its units exist.
        let units = self
            .filtering_ids
            .iter()
            .map(|filtering_id| {
                let key_input = PrivacyBudgetKeyInput::new(
                    info.clone(),
                    Some(*filtering_id),
                );
                let key = self
                    .key_generator_factory
                    .generate_privacy_budget_key(&key_input)?;
                let unit = PrivacyBudgetUnit::new(
                    key,
                    info.scheduled_report_time,
                    info.reporting_origin.clone(),
                );
                Ok((unit, key_input))
            })
            .collect::<Result<Vec<_>, KeyGenerationError>>()?;

        if !self.report_ids.insert_if_absent(report_id, || ()) {
            warn!("Dropping duplicate report {}", report_id);
            return Ok(false);
        }

        for (unit, key_input) in units {
            self.budget_units.insert_if_absent(unit, || key_input);
        }

        for fact in &report.facts {
            if fact.is_null()
                || !self.filtering_ids.contains(&fact.filtering_id_or_default())
            {
                continue;
            }
            self.aggregation.update_or_insert_with(
                AggregationKey(fact.bucket),
                AtomicI64::default,
                |sum| sum.fetch_add(fact.value, Ordering::Relaxed),
            );
        }

        debug!(
            "Accepted report {} with {} facts",
            report_id,
            report.facts.len()
        );
        Ok(true)
    }

    /// Makes sure `key` shows up in the aggregation, with a zero sum if no
    /// report contributed to it. Consumes no budget.
    pub fn accept_key(&self, key: AggregationKey) {
        self.aggregation.insert_if_absent(key, AtomicI64::default);
    }

    pub fn aggregated_value_or_default(
        &self,
        key: &AggregationKey,
        default: i64,
    ) -> i64 {
        self.aggregation
            .with_value(key, |sum| sum.load(Ordering::Relaxed))
            .unwrap_or(default)
    }

    pub fn remove(&self, key: &AggregationKey) -> Option<i64> {
        self.aggregation.remove(key).map(AtomicI64::into_inner)
    }

    pub fn contains_key(&self, key: &AggregationKey) -> bool {
        self.aggregation.contains_key(key)
    }

    pub fn key_set(&self) -> HashSet<AggregationKey> {
        self.aggregation.keys().into_iter().collect()
    }

    pub fn entries(&self) -> Vec<(AggregationKey, i64)> {
        self.aggregation
            .map_entries(|key, sum| (*key, sum.load(Ordering::Relaxed)))
    }

    /// Snapshot of the sums as unnoised facts.
    pub fn make_aggregation(&self) -> HashMap<AggregationKey, AggregatedFact> {
        self.aggregation
            .map_entries(|key, sum| {
                (
                    *key,
                    AggregatedFact::new(
                        key.bucket(),
                        sum.load(Ordering::Relaxed),
                    ),
                )
            })
            .into_iter()
            .collect()
    }

    /// Distinct budget units of every accepted report, sorted.
    pub fn privacy_budget_units(&self) -> Vec<PrivacyBudgetUnit> {
        let mut units = self.budget_units.keys();
        units.sort();
        units
    }

    /// Key inputs that first produced each of `units`. Units this engine
    /// never produced are skipped.
    pub fn privacy_budget_key_inputs_from_privacy_budget_units(
        &self,
        units: &[PrivacyBudgetUnit],
    ) -> Vec<PrivacyBudgetKeyInput> {
        units
            .iter()
            .filter_map(|unit| {
                self.budget_units.with_value(unit, |input| input.clone())
            })
            .collect()
    }

    pub fn accepted_report_count(&self) -> usize {
        self.report_ids.len()
    }
}

/// Builds engines that share one key generator factory.
#[derive(Clone, Default)]
pub struct AggregationEngineFactory {
    key_generator_factory: Arc<PrivacyBudgetKeyGeneratorFactory>,
}

impl AggregationEngineFactory {
    pub fn new(
        key_generator_factory: Arc<PrivacyBudgetKeyGeneratorFactory>,
    ) -> Self {
        Self {
            key_generator_factory,
        }
    }

    /// Engine for the given filtering ids, `{0}` if none are given.
    pub fn create(
        &self,
        filtering_ids: impl IntoIterator<Item = u64>,
    ) -> AggregationEngine {
        AggregationEngine::new(
            Arc::clone(&self.key_generator_factory),
            filtering_ids,
        )
    }

    pub fn create_default(&self) -> AggregationEngine {
        self.create([DEFAULT_FILTERING_ID])
    }
}
