use std::collections::HashMap;

use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::budget::unit::PrivacyBudgetUnit;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("privacy budget service unavailable: {0}")]
    Unavailable(String),

    #[error("caller {0:?} is not authorized to consume budget")]
    Unauthorized(String),
}

/// Client side of the budget service.
pub trait PrivacyBudgetingServiceBridge: Send + Sync {
    /// Consumes one unit of budget for every unit in `units` on behalf of
    /// `claimed_identity`, all or nothing. Returns the units that had no
    /// budget left; an empty vector means the whole batch was charged.
    fn consume_privacy_budget(
        &self,
        units: &[PrivacyBudgetUnit],
        claimed_identity: &str,
    ) -> Result<Vec<PrivacyBudgetUnit>, BridgeError>;
}

#[derive(Debug, Default)]
struct BridgeState {
    consumed: HashMap<PrivacyBudgetUnit, u32>,
    last_identity: Option<String>,
}

/// Bridge that keeps the budget ledger in memory. Each unit can be
/// consumed `budget_per_unit` times.
#[derive(Debug)]
pub struct InMemoryPrivacyBudgetingServiceBridge {
    budget_per_unit: u32,
    state: Mutex<BridgeState>,
}

impl Default for InMemoryPrivacyBudgetingServiceBridge {
    fn default() -> Self {
        Self::new(1)
    }
}

impl InMemoryPrivacyBudgetingServiceBridge {
    pub fn new(budget_per_unit: u32) -> Self {
        Self {
            budget_per_unit,
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// Marks `unit` as fully spent.
    pub fn exhaust(&self, unit: PrivacyBudgetUnit) {
        self.state.lock().consumed.insert(unit, self.budget_per_unit);
    }

    pub fn remaining_budget(&self, unit: &PrivacyBudgetUnit) -> u32 {
        let consumed =
            self.state.lock().consumed.get(unit).copied().unwrap_or(0);
        self.budget_per_unit.saturating_sub(consumed)
    }

    pub fn last_claimed_identity(&self) -> Option<String> {
        self.state.lock().last_identity.clone()
    }
}

impl PrivacyBudgetingServiceBridge for InMemoryPrivacyBudgetingServiceBridge {
    fn consume_privacy_budget(
        &self,
        units: &[PrivacyBudgetUnit],
        claimed_identity: &str,
    ) -> Result<Vec<PrivacyBudgetUnit>, BridgeError> {
        if claimed_identity.is_empty() {
            return Err(BridgeError::Unauthorized(claimed_identity.into()));
        }

        let mut state = self.state.lock();
        state.last_identity = Some(claimed_identity.to_string());

        let exhausted: Vec<PrivacyBudgetUnit> = units
            .iter()
            .filter(|unit| {
                state.consumed.get(*unit).copied().unwrap_or(0)
                    >= self.budget_per_unit
            })
            .cloned()
            .collect();

        if !exhausted.is_empty() {
            warn!(
                "{} of {} budget units exhausted for {}",
                exhausted.len(),
                units.len(),
                claimed_identity
            );
            return Ok(exhausted);
        }

        for unit in units {
            *state.consumed.entry(unit.clone()).or_insert(0) += 1;
        }
        debug!(
            "Consumed {} budget units for {}",
            units.len(),
            claimed_identity
        );
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn unit(key: &str) -> PrivacyBudgetUnit {
        PrivacyBudgetUnit::new(
            key.to_string(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            "https://adtech.example".to_string(),
        )
    }

    #[test]
    fn test_consume_once() -> Result<(), anyhow::Error> {
        let bridge = InMemoryPrivacyBudgetingServiceBridge::default();
        let units = vec![unit("a"), unit("b")];

        assert!(bridge.consume_privacy_budget(&units, "adtech")?.is_empty());
        assert_eq!(bridge.remaining_budget(&unit("a")), 0);
        assert_eq!(bridge.last_claimed_identity().as_deref(), Some("adtech"));

        let failed = bridge.consume_privacy_budget(&units, "adtech")?;
        assert_eq!(failed, units);
        Ok(())
    }

    #[test]
    fn test_batch_is_all_or_nothing() -> Result<(), anyhow::Error> {
        let bridge = InMemoryPrivacyBudgetingServiceBridge::new(2);
        bridge.exhaust(unit("a"));

        let failed =
            bridge.consume_privacy_budget(&[unit("a"), unit("b")], "adtech")?;
        assert_eq!(failed, vec![unit("a")]);
        // Nothing was charged for "b".
        assert_eq!(bridge.remaining_budget(&unit("b")), 2);
        Ok(())
    }

    #[test]
    fn test_empty_identity_is_rejected() {
        let bridge = InMemoryPrivacyBudgetingServiceBridge::default();
        assert!(matches!(
            bridge.consume_privacy_budget(&[unit("a")], ""),
            Err(BridgeError::Unauthorized(_))
        ));
    }
}
