use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{version::VersionParseError, SharedInfo};

/// Separator placed between fields before hashing them into a key.
pub const PRIVACY_BUDGET_KEY_DELIMITER: &str = "-";

/// Configuration errors raised while picking or running a key generator.
/// None of them is retryable.
#[derive(Debug, Error)]
pub enum KeyGenerationError {
    #[error("no privacy budget key generator for api {api:?} (version {version})")]
    UnsupportedApi { api: String, version: String },

    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),

    #[error("no privacy budget key generator matches api {api}, version {version}, filtering id {filtering_id:?}")]
    NoMatchingGenerator {
        api: String,
        version: String,
        filtering_id: Option<u64>,
    },

    #[error("{count} privacy budget key generators match api {api}, version {version}, filtering id {filtering_id:?}")]
    AmbiguousGenerators {
        api: String,
        version: String,
        filtering_id: Option<u64>,
        count: usize,
    },
}

/// Everything a generator may fold into a privacy budget key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyBudgetKeyInput {
    #[serde(rename = "relevant_shared_info")]
    pub shared_info: SharedInfo,

    /// Queried filtering id, part of the key from V2 onwards.
    pub filtering_id: Option<u64>,
}

impl PrivacyBudgetKeyInput {
    pub fn new(shared_info: SharedInfo, filtering_id: Option<u64>) -> Self {
        Self {
            shared_info,
            filtering_id,
        }
    }

    /// Fields of the shared info that take part in budgeting. Two inputs
    /// that differ only in e.g. report id are the same for budgeting
    /// purposes.
    #[allow(clippy::type_complexity)]
    fn budgeting_fields(
        &self,
    ) -> (
        &str,
        &str,
        &str,
        &chrono::DateTime<chrono::Utc>,
        Option<&chrono::DateTime<chrono::Utc>>,
        Option<&str>,
        u64,
    ) {
        let info = &self.shared_info;
        (
            info.api.as_str(),
            info.version.as_str(),
            info.reporting_origin.as_str(),
            &info.scheduled_report_time,
            info.source_registration_time.as_ref(),
            info.destination.as_deref(),
            self.filtering_id.unwrap_or(0),
        )
    }
}

impl PartialEq for PrivacyBudgetKeyInput {
    fn eq(&self, other: &Self) -> bool {
        self.budgeting_fields() == other.budgeting_fields()
    }
}

impl Eq for PrivacyBudgetKeyInput {}

impl Hash for PrivacyBudgetKeyInput {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.budgeting_fields().hash(state);
    }
}

/// Derives the budget "account" a report charges.
///
/// Implementations must be pure: the same input gives the same key across
/// processes and across versions of this crate, because the budget service
/// stores keys durably.
pub trait PrivacyBudgetKeyGenerator: Send + Sync {
    fn generate_privacy_budget_key(
        &self,
        input: &PrivacyBudgetKeyInput,
    ) -> String;

    /// Checks that every field this generator reads is present.
    fn validate_privacy_budget_key_input(
        &self,
        input: &PrivacyBudgetKeyInput,
    ) -> bool;
}
