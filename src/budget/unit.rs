use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::report::truncate_to_hour;

/// One unit of privacy budget: a budget key within an hour, for an origin.
///
/// Reports in the same hour that map to the same key share a unit.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PrivacyBudgetUnit {
    pub privacy_budget_key: String,
    pub scheduled_report_time: DateTime<Utc>,
    pub reporting_origin: String,
}

impl PrivacyBudgetUnit {
    /// Builds a unit, truncating `scheduled_report_time` to the hour.
    pub fn new(
        privacy_budget_key: String,
        scheduled_report_time: DateTime<Utc>,
        reporting_origin: String,
    ) -> Self {
        Self {
            privacy_budget_key,
            scheduled_report_time: truncate_to_hour(scheduled_report_time),
            reporting_origin,
        }
    }
}
