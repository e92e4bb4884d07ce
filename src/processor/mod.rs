pub mod aggregation_processor;
pub mod error;

pub use aggregation_processor::{AggregationJobOutput, AggregationProcessor};
pub use error::AggregationJobError;
