use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::CatalogRecord;
use super::scheme::Tier;

// =============================================================================
// Summary
// =============================================================================

/// Records assigned to one section of the summary, with their byte total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBucket {
    pub records: Vec<CatalogRecord>,
    pub size_total: u64,
}

impl TierBucket {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: CatalogRecord) {
        self.size_total += record.size_bytes;
        self.records.push(record);
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.records.iter().any(|r| r.identifier == identifier)
    }
}

/// Categorized result of one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub hourly: TierBucket,
    pub daily: TierBucket,
    pub weekly: TierBucket,
    pub monthly: TierBucket,
    pub yearly: TierBucket,
    pub for_delete: TierBucket,
    /// Bytes kept across all five tiers.
    pub size_total_kept: u64,
}

impl Summary {
    pub fn bucket(&self, tier: Tier) -> &TierBucket {
        match tier {
            Tier::Hourly => &self.hourly,
            Tier::Daily => &self.daily,
            Tier::Weekly => &self.weekly,
            Tier::Monthly => &self.monthly,
            Tier::Yearly => &self.yearly,
        }
    }

    pub(crate) fn bucket_mut(&mut self, tier: Tier) -> &mut TierBucket {
        match tier {
            Tier::Hourly => &mut self.hourly,
            Tier::Daily => &mut self.daily,
            Tier::Weekly => &mut self.weekly,
            Tier::Monthly => &mut self.monthly,
            Tier::Yearly => &mut self.yearly,
        }
    }

    /// Append a record to a keep tier and account for its size.
    pub fn keep(&mut self, tier: Tier, record: CatalogRecord) {
        self.size_total_kept += record.size_bytes;
        self.bucket_mut(tier).push(record);
    }

    /// Append a record to the delete set.
    pub fn discard(&mut self, record: CatalogRecord) {
        self.for_delete.push(record);
    }

    /// Number of records across all six sections.
    pub fn total_categorized(&self) -> usize {
        self.kept_count() + self.for_delete.len()
    }

    /// Number of records kept in any tier.
    pub fn kept_count(&self) -> usize {
        Tier::ALL.iter().map(|t| self.bucket(*t).len()).sum()
    }

    /// Bytes across kept and deleted records.
    pub fn size_total(&self) -> u64 {
        self.size_total_kept + self.for_delete.size_total
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, "Delete", &self.for_delete)?;
        for tier in Tier::ALL.iter().rev() {
            write_section(f, section_title(*tier), self.bucket(*tier))?;
        }
        Ok(())
    }
}

fn section_title(tier: Tier) -> &'static str {
    match tier {
        Tier::Hourly => "Hourly",
        Tier::Daily => "Daily",
        Tier::Weekly => "Weekly",
        Tier::Monthly => "Monthly",
        Tier::Yearly => "Yearly",
    }
}

fn write_section(f: &mut fmt::Formatter<'_>, title: &str, bucket: &TierBucket) -> fmt::Result {
    writeln!(f, "{} matched [{}]:", title, bucket.len())?;
    if bucket.is_empty() {
        writeln!(f, "  No files")?;
    } else {
        for record in &bucket.records {
            writeln!(
                f,
                "  {} {} {}",
                record.identifier,
                format_size(record.size_bytes),
                record.timestamp.format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        writeln!(f, "  Total Size: {}", format_size(bucket.size_total))?;
    }
    writeln!(f)
}

/// Human-readable size using binary prefixes and one decimal place.
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!("{:.1}{}B", bytes as f64 / div as f64, PREFIXES[exp])
}
