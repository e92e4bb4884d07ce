use serde::{Deserialize, Serialize};

/// Key of the aggregation map. Only the bucket matters for equality.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct AggregationKey(pub u128);

impl AggregationKey {
    pub fn bucket(&self) -> u128 {
        self.0
    }
}

impl From<u128> for AggregationKey {
    fn from(bucket: u128) -> Self {
        Self(bucket)
    }
}

/// Where a bucket of a debug run came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebugBucketAnnotation {
    InDomain,
    InReports,
}

/// One bucket of a summary report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedFact {
    pub bucket: u128,

    /// Final value, noised once the fact went through the noise runner.
    pub metric: i64,

    /// Raw sum, only set after noising.
    pub unnoised_metric: Option<i64>,

    /// Only set for debug runs.
    pub debug_annotations: Option<Vec<DebugBucketAnnotation>>,
}

impl AggregatedFact {
    pub fn new(bucket: u128, metric: i64) -> Self {
        Self {
            bucket,
            metric,
            unnoised_metric: None,
            debug_annotations: None,
        }
    }

    pub fn with_unnoised(bucket: u128, metric: i64, unnoised: i64) -> Self {
        Self {
            bucket,
            metric,
            unnoised_metric: Some(unnoised),
            debug_annotations: None,
        }
    }

    pub fn key(&self) -> AggregationKey {
        AggregationKey(self.bucket)
    }
}
