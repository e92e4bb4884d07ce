use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::Path,
};

use anyhow::Context;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    domain::{reader::DEFAULT_READ_PARALLELISM, DataLocation, DomainFileFormat},
    noise::{
        params::validate_debug_epsilon, JobScopedPrivacyParams,
        PrivacyParamsError,
    },
};

pub const JOB_PARAM_DEBUG_PRIVACY_EPSILON: &str = "debug_privacy_epsilon";
pub const JOB_PARAM_DEBUG_RUN: &str = "debug_run";
pub const JOB_PARAM_ATTRIBUTION_REPORT_TO: &str = "attribution_report_to";
pub const JOB_PARAM_FILTERING_IDS: &str = "input_filtering_ids";
pub const JOB_PARAM_OUTPUT_DOMAIN_BUCKET: &str = "output_domain_bucket_name";
pub const JOB_PARAM_OUTPUT_DOMAIN_PREFIX: &str = "output_domain_blob_prefix";

/// Process-wide worker settings, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub epsilon: f64,
    pub l1_sensitivity: i64,
    pub delta: f64,

    /// When set, buckets found only in reports are kept if they pass the
    /// noise threshold. Otherwise only domain buckets are output.
    pub domain_optional: bool,

    pub enable_thresholding: bool,
    pub domain_file_format: DomainFileFormat,
    pub domain_read_parallelism: usize,

    /// Noise facts on the rayon pool.
    pub parallel_noising: bool,

    /// Fixed seed for the noise generator, for reproducible runs only.
    pub noise_seed: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            epsilon: 10.0,
            l1_sensitivity: 65536,
            delta: 1e-5,
            domain_optional: false,
            enable_thresholding: true,
            domain_file_format: DomainFileFormat::Binary,
            domain_read_parallelism: DEFAULT_READ_PARALLELISM,
            parallel_noising: false,
            noise_seed: None,
        }
    }
}

impl WorkerConfig {
    /// Loads and validates a JSON config. Missing fields take their
    /// default values.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).with_context(|| {
            format!("Failed to read worker config {}", path.display())
        })?;
        let config: Self = serde_json::from_str(&raw).with_context(|| {
            format!("Failed to parse worker config {}", path.display())
        })?;
        config.validate().context("Invalid worker config")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PrivacyParamsError> {
        self.privacy_params().map(|_| ())
    }

    pub fn privacy_params(
        &self,
    ) -> Result<JobScopedPrivacyParams, PrivacyParamsError> {
        JobScopedPrivacyParams::new(
            self.epsilon,
            self.l1_sensitivity,
            self.delta,
        )
    }
}

/// Per-job settings taken from the job request parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobParameters {
    pub debug_privacy_epsilon: Option<f64>,
    pub debug_run: bool,
    pub attribution_report_to: Option<String>,
    pub filtering_ids: BTreeSet<u64>,
    pub output_domain: Option<DataLocation>,
}

#[derive(Debug, Error)]
pub enum JobParametersError {
    #[error(transparent)]
    DebugEpsilon(#[from] PrivacyParamsError),

    #[error("invalid filtering id {0:?}: must be an unsigned 64-bit integer")]
    InvalidFilteringId(String),
}

impl JobParameters {
    /// Reads the known keys of `params`.
    ///
    /// A debug epsilon that is not a number is logged and ignored. One that
    /// parses but lies outside `(0, 64]`, or any filtering id that is not an
    /// unsigned integer, fails the job.
    pub fn from_map(
        params: &HashMap<String, String>,
    ) -> Result<Self, JobParametersError> {
        let get = |key: &str| {
            params
                .get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };

        let debug_privacy_epsilon = match get(JOB_PARAM_DEBUG_PRIVACY_EPSILON)
        {
            Some(raw) => match raw.parse::<f64>() {
                Ok(epsilon) => {
                    validate_debug_epsilon(epsilon)?;
                    Some(epsilon)
                }
                Err(_) => {
                    warn!(
                        "Ignoring unparsable debug privacy epsilon {:?}",
                        raw
                    );
                    None
                }
            },
            None => None,
        };

        let debug_run = get(JOB_PARAM_DEBUG_RUN)
            .is_some_and(|raw| raw.eq_ignore_ascii_case("true"));

        let filtering_ids = match get(JOB_PARAM_FILTERING_IDS) {
            Some(raw) => parse_filtering_ids(raw)?,
            None => BTreeSet::new(),
        };

        let output_domain = get(JOB_PARAM_OUTPUT_DOMAIN_BUCKET).map(|bucket| {
            DataLocation::new(
                bucket,
                get(JOB_PARAM_OUTPUT_DOMAIN_PREFIX).unwrap_or_default(),
            )
        });

        Ok(Self {
            debug_privacy_epsilon,
            debug_run,
            attribution_report_to: get(JOB_PARAM_ATTRIBUTION_REPORT_TO)
                .map(str::to_string),
            filtering_ids,
            output_domain,
        })
    }
}

/// Comma separated unsigned ids. Blank entries are skipped.
fn parse_filtering_ids(raw: &str) -> Result<BTreeSet<u64>, JobParametersError> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<u64>()
                .map_err(|_| JobParametersError::InvalidFilteringId(id.into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_defaults() -> Result<(), anyhow::Error> {
        let config = WorkerConfig::default();
        let params = config.privacy_params()?;
        assert_relative_eq!(params.epsilon, 10.0);
        assert_eq!(params.l1_sensitivity, 65536);
        assert_relative_eq!(params.delta, 1e-5);
        Ok(())
    }

    #[test]
    fn test_from_file() -> Result<(), anyhow::Error> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{"epsilon": 2.5, "domain_optional": true,
                "domain_file_format": "text", "noise_seed": 7,
                "parallel_noising": true}}"#
        )?;

        let config = WorkerConfig::from_file(file.path())?;
        assert_relative_eq!(config.epsilon, 2.5);
        assert!(config.domain_optional);
        assert_eq!(config.domain_file_format, DomainFileFormat::Text);
        assert_eq!(config.noise_seed, Some(7));
        assert!(config.parallel_noising);
        assert_eq!(config.l1_sensitivity, 65536);
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected() -> Result<(), anyhow::Error> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"delta": 1.5}}"#)?;
        assert!(WorkerConfig::from_file(file.path()).is_err());
        assert!(WorkerConfig::from_file("/nonexistent/config.json").is_err());
        Ok(())
    }

    #[test]
    fn test_job_parameters() -> Result<(), anyhow::Error> {
        let params = HashMap::from([
            (JOB_PARAM_DEBUG_PRIVACY_EPSILON.to_string(), "0.5".to_string()),
            (JOB_PARAM_DEBUG_RUN.to_string(), "TRUE".to_string()),
            (
                JOB_PARAM_ATTRIBUTION_REPORT_TO.to_string(),
                "https://adtech.example".to_string(),
            ),
            (JOB_PARAM_FILTERING_IDS.to_string(), "3, 1,,3".to_string()),
            (JOB_PARAM_OUTPUT_DOMAIN_BUCKET.to_string(), "/data".to_string()),
            (JOB_PARAM_OUTPUT_DOMAIN_PREFIX.to_string(), "domain".to_string()),
        ]);

        let job = JobParameters::from_map(&params)?;
        assert_eq!(job.debug_privacy_epsilon, Some(0.5));
        assert!(job.debug_run);
        assert_eq!(
            job.attribution_report_to.as_deref(),
            Some("https://adtech.example")
        );
        assert_eq!(job.filtering_ids, BTreeSet::from([1, 3]));
        assert_eq!(
            job.output_domain,
            Some(DataLocation::new("/data", "domain"))
        );

        assert_eq!(
            JobParameters::from_map(&HashMap::new())?,
            JobParameters::default()
        );
        Ok(())
    }

    fn single(key: &str, value: &str) -> HashMap<String, String> {
        HashMap::from([(key.to_string(), value.to_string())])
    }

    #[test]
    fn test_unparsable_debug_epsilon_is_ignored(
    ) -> Result<(), anyhow::Error> {
        let params = single(JOB_PARAM_DEBUG_PRIVACY_EPSILON, "abc");
        let job = JobParameters::from_map(&params)?;
        assert_eq!(job.debug_privacy_epsilon, None);
        Ok(())
    }

    #[test]
    fn test_out_of_range_debug_epsilon_fails() {
        for raw in ["0", "65", "-1"] {
            let params = single(JOB_PARAM_DEBUG_PRIVACY_EPSILON, raw);
            assert!(
                matches!(
                    JobParameters::from_map(&params),
                    Err(JobParametersError::DebugEpsilon(
                        PrivacyParamsError::InvalidDebugEpsilon(_)
                    ))
                ),
                "{raw}"
            );
        }
        let params = single(JOB_PARAM_DEBUG_PRIVACY_EPSILON, "64");
        assert!(JobParameters::from_map(&params).is_ok());
    }

    #[test]
    fn test_invalid_filtering_id_fails() {
        for raw in ["x", "1,x", "-1", "18446744073709551616"] {
            let params = single(JOB_PARAM_FILTERING_IDS, raw);
            assert!(
                matches!(
                    JobParameters::from_map(&params),
                    Err(JobParametersError::InvalidFilteringId(_))
                ),
                "{raw}"
            );
        }
    }
}
