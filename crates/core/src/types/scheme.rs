use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

// =============================================================================
// Tiers
// =============================================================================

/// Retention granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Tier {
    /// All tiers in classification priority order.
    pub const ALL: [Tier; 5] = [
        Tier::Hourly,
        Tier::Daily,
        Tier::Weekly,
        Tier::Monthly,
        Tier::Yearly,
    ];

    /// Lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hourly => "hourly",
            Tier::Daily => "daily",
            Tier::Weekly => "weekly",
            Tier::Monthly => "monthly",
            Tier::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Retention Scheme
// =============================================================================

/// Capacity of the yearly tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearlyLimit {
    /// Keep every yearly-eligible record.
    Unlimited,
    /// Keep at most this many yearly records. `0` disables the tier.
    Limited(usize),
}

impl YearlyLimit {
    /// Interpret a signed flag value: any negative number means unlimited.
    pub fn from_flag(value: i64) -> Self {
        if value < 0 {
            Self::Unlimited
        } else {
            Self::Limited(value as usize)
        }
    }

    /// Signed representation, `-1` for unlimited.
    pub fn as_flag(&self) -> i64 {
        match self {
            Self::Unlimited => -1,
            Self::Limited(n) => *n as i64,
        }
    }
}

/// How many representatives to keep per tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionScheme {
    pub hourly: usize,
    pub daily: usize,
    pub weekly: usize,
    pub monthly: usize,
    pub yearly: YearlyLimit,
    /// Classify and report without deleting anything.
    pub dry_run: bool,
}

impl RetentionScheme {
    /// Build a scheme from signed limits, as they arrive from flags or config.
    ///
    /// Only `yearly` may be negative (the unlimited sentinel).
    pub fn from_limits(
        hourly: i64,
        daily: i64,
        weekly: i64,
        monthly: i64,
        yearly: i64,
        dry_run: bool,
    ) -> Result<Self> {
        Ok(Self {
            hourly: non_negative(Tier::Hourly, hourly)?,
            daily: non_negative(Tier::Daily, daily)?,
            weekly: non_negative(Tier::Weekly, weekly)?,
            monthly: non_negative(Tier::Monthly, monthly)?,
            yearly: YearlyLimit::from_flag(yearly),
            dry_run,
        })
    }

    /// Maximum records for a tier; `None` is unbounded.
    pub fn capacity(&self, tier: Tier) -> Option<usize> {
        match tier {
            Tier::Hourly => Some(self.hourly),
            Tier::Daily => Some(self.daily),
            Tier::Weekly => Some(self.weekly),
            Tier::Monthly => Some(self.monthly),
            Tier::Yearly => match self.yearly {
                YearlyLimit::Unlimited => None,
                YearlyLimit::Limited(n) => Some(n),
            },
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl Default for RetentionScheme {
    fn default() -> Self {
        Self {
            hourly: 24,
            daily: 7,
            weekly: 14,
            monthly: 12,
            yearly: YearlyLimit::Unlimited,
            dry_run: false,
        }
    }
}

fn non_negative(tier: Tier, value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        Error::invalid_scheme(format!("{} limit must be >= 0, got {}", tier, value))
    })
}
