//! Rotation counters. No recorder is installed here; embedders pick one.

use rotate_core::{Summary, Tier};

/// Count classified records per tier, plus the delete set.
pub fn track_classification(summary: &Summary) {
    for tier in Tier::ALL {
        metrics::counter!("rotate_records_classified_total", "tier" => tier.as_str())
            .increment(summary.bucket(tier).len() as u64);
    }
    metrics::counter!("rotate_records_classified_total", "tier" => "delete")
        .increment(summary.for_delete.len() as u64);
}

/// Count one delete attempt by result (`ok`, `error`, `dry_run`).
pub fn track_delete(result: &'static str) {
    metrics::counter!("rotate_deletes_total", "result" => result).increment(1);
}

/// Track bytes reclaimed by successful deletes.
pub fn track_bytes_freed(bytes: u64) {
    metrics::counter!("rotate_bytes_freed_total").increment(bytes);
}
