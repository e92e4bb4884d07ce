use thiserror::Error;

use crate::{
    budget::{BridgeError, KeyGenerationError, PrivacyBudgetKeyInput},
    domain::DomainReadError,
    noise::PrivacyParamsError,
};

/// Why an aggregation job failed.
#[derive(Debug, Error)]
pub enum AggregationJobError {
    #[error(transparent)]
    KeyGeneration(#[from] KeyGenerationError),

    #[error(transparent)]
    PrivacyParams(#[from] PrivacyParamsError),

    #[error(transparent)]
    DomainRead(#[from] DomainReadError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("an output domain is required unless the domain is optional")]
    MissingOutputDomain,

    #[error("attribution_report_to is required to consume privacy budget")]
    MissingAttributionReportTo,

    #[error("privacy budget exhausted for {} budget keys", .0.len())]
    PrivacyBudgetExhausted(Vec<PrivacyBudgetKeyInput>),

    #[error("aggregation task failed: {0}")]
    TaskFailed(String),
}
