//! Privacy budget key generators for each reporting API.
//!
//! A generator is a fixed list of fields joined with
//! [`PRIVACY_BUDGET_KEY_DELIMITER`] and hashed with SHA-256. The field order
//! of every generator below is frozen: budget keys are stored by the budget
//! service and must not change for reports that were already budgeted.

use sha2::{Digest, Sha256};

use crate::{
    budget::traits::{
        PrivacyBudgetKeyGenerator, PrivacyBudgetKeyInput,
        PRIVACY_BUDGET_KEY_DELIMITER,
    },
    model::report::format_instant,
};

/// Fields a [`SharedInfoKeyGenerator`] folds into the key, after api,
/// version and reporting origin which are always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFields {
    pub destination: bool,
    pub source_registration_time: bool,
    pub filtering_id: bool,
}

/// Hashes the shared info fields selected by `fields`.
#[derive(Debug, Clone)]
pub struct SharedInfoKeyGenerator {
    name: &'static str,
    fields: KeyFields,
}

impl SharedInfoKeyGenerator {
    pub const fn new(name: &'static str, fields: KeyFields) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> KeyFields {
        self.fields
    }

    /// Attribution reporting (and its debug variant) before filtering ids.
    pub const fn attribution_reporting_v1() -> Self {
        Self::new(
            "attribution-reporting-v1",
            KeyFields {
                destination: true,
                source_registration_time: true,
                filtering_id: false,
            },
        )
    }

    pub const fn attribution_reporting_v2() -> Self {
        Self::new(
            "attribution-reporting-v2",
            KeyFields {
                destination: true,
                source_registration_time: true,
                filtering_id: true,
            },
        )
    }

    pub const fn attribution_reporting_debug_v1() -> Self {
        Self::new(
            "attribution-reporting-debug-v1",
            KeyFields {
                destination: true,
                source_registration_time: true,
                filtering_id: false,
            },
        )
    }

    pub const fn attribution_reporting_debug_v2() -> Self {
        Self::new(
            "attribution-reporting-debug-v2",
            KeyFields {
                destination: true,
                source_registration_time: true,
                filtering_id: true,
            },
        )
    }

    pub const fn protected_audience_v1() -> Self {
        Self::new(
            "protected-audience-v1",
            KeyFields {
                destination: false,
                source_registration_time: false,
                filtering_id: false,
            },
        )
    }

    pub const fn protected_audience_v2() -> Self {
        Self::new(
            "protected-audience-v2",
            KeyFields {
                destination: false,
                source_registration_time: false,
                filtering_id: true,
            },
        )
    }

    pub const fn shared_storage_v1() -> Self {
        Self::new(
            "shared-storage-v1",
            KeyFields {
                destination: false,
                source_registration_time: false,
                filtering_id: false,
            },
        )
    }

    pub const fn shared_storage_v2() -> Self {
        Self::new(
            "shared-storage-v2",
            KeyFields {
                destination: false,
                source_registration_time: false,
                filtering_id: true,
            },
        )
    }

    /// The delimited string that gets hashed.
    pub fn key_material(&self, input: &PrivacyBudgetKeyInput) -> String {
        let info = &input.shared_info;
        let mut parts: Vec<String> = vec![
            info.api.clone(),
            info.version.clone(),
            info.reporting_origin.clone(),
        ];
        if self.fields.destination {
            parts.push(info.destination.clone().unwrap_or_default());
        }
        if self.fields.source_registration_time {
            // Optional even for the generators that support it.
            if let Some(time) = &info.source_registration_time {
                parts.push(format_instant(time));
            }
        }
        if self.fields.filtering_id {
            parts.push(input.filtering_id.unwrap_or(0).to_string());
        }
        parts.join(PRIVACY_BUDGET_KEY_DELIMITER)
    }
}

impl PrivacyBudgetKeyGenerator for SharedInfoKeyGenerator {
    fn generate_privacy_budget_key(
        &self,
        input: &PrivacyBudgetKeyInput,
    ) -> String {
        let digest = Sha256::digest(self.key_material(input).as_bytes());
        hex::encode(digest)
    }

    fn validate_privacy_budget_key_input(
        &self,
        input: &PrivacyBudgetKeyInput,
    ) -> bool {
        let info = &input.shared_info;
        if info.api.is_empty()
            || info.version.is_empty()
            || info.reporting_origin.is_empty()
        {
            return false;
        }
        !self.fields.destination
            || info.destination.as_deref().is_some_and(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::SharedInfo;

    fn input(
        api: &str,
        version: &str,
        filtering_id: Option<u64>,
    ) -> PrivacyBudgetKeyInput {
        let mut info = SharedInfo::mock();
        info.api = api.to_string();
        info.version = version.to_string();
        PrivacyBudgetKeyInput::new(info, filtering_id)
    }

    fn sha256_hex(material: &str) -> String {
        hex::encode(Sha256::digest(material.as_bytes()))
    }

    #[test]
    fn test_attribution_reporting_v2_key_material() {
        let generator = SharedInfoKeyGenerator::attribution_reporting_v2();
        let mut key_input = input("attribution-reporting", "1.0", Some(5));
        key_input.shared_info.source_registration_time =
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());

        let material = generator.key_material(&key_input);
        assert_eq!(
            material,
            "attribution-reporting-1.0-https://adtech.example\
             -https://shoes.example-2023-01-01T00:00:00Z-5"
        );
        assert_eq!(
            generator.generate_privacy_budget_key(&key_input),
            sha256_hex(&material)
        );
    }

    #[test]
    fn test_source_registration_time_is_optional() {
        let generator = SharedInfoKeyGenerator::attribution_reporting_v1();
        let mut key_input = input("attribution-reporting", "0.1", None);
        key_input.shared_info.source_registration_time = None;
        assert_eq!(
            generator.key_material(&key_input),
            "attribution-reporting-0.1-https://adtech.example\
             -https://shoes.example"
        );
    }

    #[test]
    fn test_shared_storage_keys() {
        let v1 = SharedInfoKeyGenerator::shared_storage_v1();
        let v2 = SharedInfoKeyGenerator::shared_storage_v2();
        let key_input = input("shared-storage", "1.0", None);

        assert_eq!(
            v1.key_material(&key_input),
            "shared-storage-1.0-https://adtech.example"
        );
        // Absent filtering id is hashed as 0.
        assert_eq!(
            v2.key_material(&key_input),
            "shared-storage-1.0-https://adtech.example-0"
        );
    }

    #[test]
    fn test_keys_are_deterministic_and_lowercase_hex() {
        let generator = SharedInfoKeyGenerator::protected_audience_v2();
        let a = input("protected-audience", "1.0", Some(3));
        let b = input("protected-audience", "1.0", Some(3));
        let c = input("protected-audience", "1.0", Some(4));

        let key = generator.generate_privacy_budget_key(&a);
        assert_eq!(key, generator.generate_privacy_budget_key(&b));
        assert_ne!(key, generator.generate_privacy_budget_key(&c));
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_digit()
            || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_report_id_does_not_change_key() {
        let generator = SharedInfoKeyGenerator::attribution_reporting_v2();
        let a = input("attribution-reporting", "1.0", Some(1));
        let mut b = a.clone();
        b.shared_info.report_id = Some(uuid::Uuid::new_v4().to_string());
        assert_eq!(a, b);
        assert_eq!(
            generator.generate_privacy_budget_key(&a),
            generator.generate_privacy_budget_key(&b)
        );
    }

    #[test]
    fn test_validate_requires_destination_for_attribution() {
        let ara = SharedInfoKeyGenerator::attribution_reporting_v1();
        let shared_storage = SharedInfoKeyGenerator::shared_storage_v1();
        let mut key_input = input("attribution-reporting", "0.1", None);
        assert!(ara.validate_privacy_budget_key_input(&key_input));

        key_input.shared_info.destination = None;
        assert!(!ara.validate_privacy_budget_key_input(&key_input));
        assert!(shared_storage.validate_privacy_budget_key_input(&key_input));
    }
}
