pub mod aggregated_fact;
pub mod numeric;
pub mod report;
pub mod version;

pub use aggregated_fact::{
    AggregatedFact, AggregationKey, DebugBucketAnnotation,
};
pub use report::{ApiType, Fact, Report, SharedInfo};
pub use version::Version;
