use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared-info schema version, always written as `major.minor`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid report version {0:?}, expected `major.minor`")]
pub struct VersionParseError(pub String);

impl Version {
    pub const V0_1: Version = Version::new(0, 1);
    pub const V1_0: Version = Version::new(1, 0);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn parse(version: &str) -> Result<Self, VersionParseError> {
        let err = || VersionParseError(version.to_string());

        let (major, minor) = version.split_once('.').ok_or_else(err)?;
        let is_digits =
            |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !is_digits(major) || !is_digits(minor) {
            return Err(err());
        }

        Ok(Self {
            major: major.parse().map_err(|_| err())?,
            minor: minor.parse().map_err(|_| err())?,
        })
    }

    /// Returns a predicate matching versions `< upper`.
    pub fn below(
        upper_exclusive: Version,
    ) -> impl Fn(&Version) -> bool + Send + Sync + 'static {
        move |version| *version < upper_exclusive
    }

    /// Returns a predicate matching versions `>= lower`.
    pub fn at_least(
        lower_inclusive: Version,
    ) -> impl Fn(&Version) -> bool + Send + Sync + 'static {
        move |version| *version >= lower_inclusive
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
