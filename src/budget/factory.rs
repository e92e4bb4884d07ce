use std::{collections::HashMap, sync::Arc};

use log::debug;

use crate::{
    budget::{
        key_generators::SharedInfoKeyGenerator,
        traits::{
            KeyGenerationError, PrivacyBudgetKeyGenerator,
            PrivacyBudgetKeyInput,
        },
    },
    model::{ApiType, Version},
};

/// Decides whether a generator applies to a key input.
pub type KeyInputPredicate =
    Box<dyn Fn(&PrivacyBudgetKeyInput) -> Result<bool, KeyGenerationError>
        + Send
        + Sync>;

fn input_version(
    input: &PrivacyBudgetKeyInput,
) -> Result<Version, KeyGenerationError> {
    Ok(input.shared_info.version.parse()?)
}

/// Inputs without a filtering id (or with id 0) from versions below 1.0.
pub fn v1_predicate() -> KeyInputPredicate {
    let below_v1 = Version::below(Version::V1_0);
    Box::new(move |input: &PrivacyBudgetKeyInput| {
        input_version(input).map(|version| {
            below_v1(&version) && input.filtering_id.unwrap_or(0) == 0
        })
    })
}

/// Inputs from version 1.0 onwards, or carrying a non-zero filtering id.
pub fn v2_predicate() -> KeyInputPredicate {
    let from_v1 = Version::at_least(Version::V1_0);
    Box::new(move |input: &PrivacyBudgetKeyInput| {
        input_version(input).map(|version| {
            from_v1(&version) || input.filtering_id.unwrap_or(0) != 0
        })
    })
}

/// Ordered (predicate, generator) pairs for one API.
#[derive(Default)]
pub struct VersionedKeyGeneratorProvider {
    generators:
        Vec<(KeyInputPredicate, Arc<dyn PrivacyBudgetKeyGenerator>)>,
}

impl VersionedKeyGeneratorProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generator(
        mut self,
        predicate: KeyInputPredicate,
        generator: Arc<dyn PrivacyBudgetKeyGenerator>,
    ) -> Self {
        self.generators.push((predicate, generator));
        self
    }

    /// The V1/V2 pair every supported API uses.
    pub fn v1_v2(
        v1: SharedInfoKeyGenerator,
        v2: SharedInfoKeyGenerator,
    ) -> Self {
        Self::new()
            .with_generator(v1_predicate(), Arc::new(v1))
            .with_generator(v2_predicate(), Arc::new(v2))
    }

    /// Generators whose predicate accepts `input`, in registration order.
    pub fn matching_generators(
        &self,
        input: &PrivacyBudgetKeyInput,
    ) -> Result<Vec<Arc<dyn PrivacyBudgetKeyGenerator>>, KeyGenerationError>
    {
        let mut matching = Vec::new();
        for (predicate, generator) in &self.generators {
            if predicate(input)? {
                matching.push(Arc::clone(generator));
            }
        }
        Ok(matching)
    }

    /// Returns the single generator matching `input`. Zero or several
    /// matches are configuration errors.
    pub fn generator_for(
        &self,
        input: &PrivacyBudgetKeyInput,
    ) -> Result<Arc<dyn PrivacyBudgetKeyGenerator>, KeyGenerationError> {
        let mut matching = self.matching_generators(input)?;
        match matching.len() {
            1 => Ok(matching.remove(0)),
            0 => Err(KeyGenerationError::NoMatchingGenerator {
                api: input.shared_info.api.clone(),
                version: input.shared_info.version.clone(),
                filtering_id: input.filtering_id,
            }),
            count => Err(KeyGenerationError::AmbiguousGenerators {
                api: input.shared_info.api.clone(),
                version: input.shared_info.version.clone(),
                filtering_id: input.filtering_id,
                count,
            }),
        }
    }
}

/// Long-lived, stateless lookup from API to its versioned generators.
pub struct PrivacyBudgetKeyGeneratorFactory {
    providers: HashMap<ApiType, VersionedKeyGeneratorProvider>,
}

impl Default for PrivacyBudgetKeyGeneratorFactory {
    fn default() -> Self {
        Self::standard()
    }
}

impl PrivacyBudgetKeyGeneratorFactory {
    /// Factory with no API registered.
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Factory with the V1/V2 generators of every supported API.
    pub fn standard() -> Self {
        Self::empty()
            .with_provider(
                ApiType::AttributionReporting,
                VersionedKeyGeneratorProvider::v1_v2(
                    SharedInfoKeyGenerator::attribution_reporting_v1(),
                    SharedInfoKeyGenerator::attribution_reporting_v2(),
                ),
            )
            .with_provider(
                ApiType::AttributionReportingDebug,
                VersionedKeyGeneratorProvider::v1_v2(
                    SharedInfoKeyGenerator::attribution_reporting_debug_v1(),
                    SharedInfoKeyGenerator::attribution_reporting_debug_v2(),
                ),
            )
            .with_provider(
                ApiType::ProtectedAudience,
                VersionedKeyGeneratorProvider::v1_v2(
                    SharedInfoKeyGenerator::protected_audience_v1(),
                    SharedInfoKeyGenerator::protected_audience_v2(),
                ),
            )
            .with_provider(
                ApiType::SharedStorage,
                VersionedKeyGeneratorProvider::v1_v2(
                    SharedInfoKeyGenerator::shared_storage_v1(),
                    SharedInfoKeyGenerator::shared_storage_v2(),
                ),
            )
    }

    pub fn with_provider(
        mut self,
        api: ApiType,
        provider: VersionedKeyGeneratorProvider,
    ) -> Self {
        self.providers.insert(api, provider);
        self
    }

    fn provider(
        &self,
        input: &PrivacyBudgetKeyInput,
    ) -> Result<&VersionedKeyGeneratorProvider, KeyGenerationError> {
        let unsupported = || KeyGenerationError::UnsupportedApi {
            api: input.shared_info.api.clone(),
            version: input.shared_info.version.clone(),
        };
        let api: ApiType =
            input.shared_info.api.parse().map_err(|_| unsupported())?;
        self.providers.get(&api).ok_or_else(unsupported)
    }

    pub fn generator_for(
        &self,
        input: &PrivacyBudgetKeyInput,
    ) -> Result<Arc<dyn PrivacyBudgetKeyGenerator>, KeyGenerationError> {
        self.provider(input)?.generator_for(input)
    }

    /// Picks the generator for `input` and derives its key.
    pub fn generate_privacy_budget_key(
        &self,
        input: &PrivacyBudgetKeyInput,
    ) -> Result<String, KeyGenerationError> {
        let generator = self.generator_for(input)?;
        let key = generator.generate_privacy_budget_key(input);
        debug!(
            "Budget key {} for api {} version {} filtering id {:?}",
            key, input.shared_info.api, input.shared_info.version,
            input.filtering_id
        );
        Ok(key)
    }

    /// True iff exactly one registered generator accepts `input`.
    pub fn exactly_one_generator_matches(
        &self,
        input: &PrivacyBudgetKeyInput,
    ) -> bool {
        self.provider(input)
            .and_then(|provider| provider.matching_generators(input))
            .is_ok_and(|matching| matching.len() == 1)
    }
}
