//! Aggregation core of a privacy-preserving measurement worker: sums
//! reports per bucket, derives privacy budget units, reads output domains
//! and adds differentially private noise to the result.

pub mod aggregation;
pub mod budget;
pub mod config;
pub mod domain;
pub mod model;
pub mod noise;
pub mod processor;
pub mod util;

pub use aggregation::{AggregationEngine, AggregationEngineFactory};
pub use budget::{
    KeyGenerationError, PrivacyBudgetKeyGeneratorFactory,
    PrivacyBudgetKeyInput, PrivacyBudgetUnit,
};
pub use domain::{DomainReadError, OutputDomainReader};
pub use noise::{NoisedAggregationRunner, PrivacyParamsError};
pub use processor::{AggregationJobError, AggregationProcessor};
