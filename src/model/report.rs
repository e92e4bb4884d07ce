use std::{fmt, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const ATTRIBUTION_REPORTING_API: &str = "attribution-reporting";
pub const ATTRIBUTION_REPORTING_DEBUG_API: &str = "attribution-reporting-debug";
pub const PROTECTED_AUDIENCE_API: &str = "protected-audience";
pub const SHARED_STORAGE_API: &str = "shared-storage";

/// Reporting APIs the worker knows how to budget.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum ApiType {
    #[serde(rename = "attribution-reporting")]
    AttributionReporting,
    #[serde(rename = "attribution-reporting-debug")]
    AttributionReportingDebug,
    #[serde(rename = "protected-audience")]
    ProtectedAudience,
    #[serde(rename = "shared-storage")]
    SharedStorage,
}

impl ApiType {
    pub const ALL: [ApiType; 4] = [
        ApiType::AttributionReporting,
        ApiType::AttributionReportingDebug,
        ApiType::ProtectedAudience,
        ApiType::SharedStorage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::AttributionReporting => ATTRIBUTION_REPORTING_API,
            ApiType::AttributionReportingDebug => {
                ATTRIBUTION_REPORTING_DEBUG_API
            }
            ApiType::ProtectedAudience => PROTECTED_AUDIENCE_API,
            ApiType::SharedStorage => SHARED_STORAGE_API,
        }
    }
}

impl FromStr for ApiType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApiType::ALL
            .into_iter()
            .find(|api| api.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report metadata that travels in clear text next to the encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedInfo {
    /// Kept as the raw string so unknown APIs can be reported as such.
    pub api: String,

    /// Schema version, `major.minor`.
    pub version: String,

    /// UUID, unique per report within a batch.
    pub report_id: Option<String>,

    pub reporting_origin: String,

    pub destination: Option<String>,

    pub scheduled_report_time: DateTime<Utc>,

    pub source_registration_time: Option<DateTime<Utc>>,

    /// Pre-computed key sent by older clients. Not used for budgeting.
    pub privacy_budget_key: Option<String>,

    #[serde(default)]
    pub debug_mode: bool,
}

/// A single contribution. `filtering_id: None` is the same as `Some(0)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Fact {
    pub bucket: u128,
    pub value: i64,
    pub filtering_id: Option<u64>,
}

impl Fact {
    pub fn new(bucket: u128, value: i64) -> Self {
        Self {
            bucket,
            value,
            filtering_id: None,
        }
    }

    pub fn with_filtering_id(bucket: u128, value: i64, id: u64) -> Self {
        Self {
            bucket,
            value,
            filtering_id: Some(id),
        }
    }

    /// Padding contribution, both bucket and value are zero.
    pub fn is_null(&self) -> bool {
        self.bucket == 0 && self.value == 0
    }

    pub fn filtering_id_or_default(&self) -> u64 {
        self.filtering_id.unwrap_or(0)
    }
}

/// A decrypted and validated report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub shared_info: SharedInfo,
    pub facts: Vec<Fact>,
}

/// Formats a timestamp the way budget keys have always embedded it:
/// RFC 3339 in UTC with a `Z` suffix, fractional seconds only when non-zero.
pub fn format_instant(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Drops minutes, seconds and sub-seconds.
pub fn truncate_to_hour(time: DateTime<Utc>) -> DateTime<Utc> {
    let secs = time.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(time)
}
