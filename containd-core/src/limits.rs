//! Resource limit values as written to cgroup v2 control files

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A resource limit: either a positive count or the `"max"` sentinel.
///
/// The `Display` form is exactly the text written verbatim into a cgroup
/// control file (`pids.max`, `memory.max`), so a written limit reads back
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LimitValue {
    /// Unlimited, written as the literal string `max`
    Max,
    /// A positive integer (process count or byte count)
    Limited(u64),
}

impl LimitValue {
    /// The sentinel the kernel uses for "no limit"
    pub const SENTINEL: &'static str = "max";

    /// Create a finite limit
    ///
    /// # Errors
    /// Returns error if the value is zero; the kernel treats `0` as
    /// "no processes / no memory at all", which is never what a caller
    /// configuring a container wants.
    pub fn limited(value: u64) -> Result<Self> {
        if value == 0 {
            return Err(Error::InvalidConfig {
                message: "Limit must be a positive integer or \"max\"".to_string(),
            });
        }
        Ok(Self::Limited(value))
    }

    /// True if this is the unlimited sentinel
    #[must_use]
    pub const fn is_max(self) -> bool {
        matches!(self, Self::Max)
    }
}

impl fmt::Display for LimitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => write!(f, "{}", Self::SENTINEL),
            Self::Limited(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for LimitValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == Self::SENTINEL {
            return Ok(Self::Max);
        }
        let value: u64 = s.parse().map_err(|_| Error::InvalidConfig {
            message: format!("Malformed limit value: {s:?} (expected a positive integer or \"max\")"),
        })?;
        Self::limited(value)
    }
}

impl TryFrom<String> for LimitValue {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<LimitValue> for String {
    fn from(limit: LimitValue) -> Self {
        limit.to_string()
    }
}
