//! Grandfather-father-son classification.
//!
//! A single newest-first pass assigns every record to the first tier that
//! accepts it (hourly, daily, weekly, monthly, yearly) or to the delete set.
//! A tier accepts a record when the record is inside the tier's window, opens
//! a calendar period the tier has not picked yet, and the tier is below
//! capacity.

use chrono::{DateTime, FixedOffset, TimeDelta};
use rotate_core::{CatalogRecord, ClassifyOutcome, Error, Result, RetentionScheme, Summary, Tier};

use crate::calendar::{self, LocalTime};

const HOURLY_WINDOW_HOURS: i64 = 24;
const DAILY_MIN_DAYS: i64 = 1;
const DAILY_MAX_DAYS: i64 = 7;
const MONTHLY_MAX_MONTHS: i64 = 13;
const MONTHLY_MIN_WEEKS: i64 = 4;
const YEARLY_MIN_MONTHS: i64 = 12;
const YEARLY_OTHER_YEAR_MIN_MONTHS: i64 = 6;

/// Partition `records` into retention tiers relative to `now`.
///
/// Calendar periods (hour, day, ISO week, month, year) are evaluated in
/// `now`'s UTC offset. The result depends only on the inputs: records are
/// scanned newest first with ties broken by identifier.
pub fn classify(
    records: &[CatalogRecord],
    scheme: Option<&RetentionScheme>,
    now: DateTime<FixedOffset>,
) -> Result<ClassifyOutcome> {
    let scheme = scheme.ok_or_else(|| Error::invalid_scheme("no rotation scheme provided"))?;

    match records.len() {
        0 => return Ok(ClassifyOutcome::NoArtifacts),
        1 => return Ok(ClassifyOutcome::NotEligible),
        _ => {}
    }

    let mut sorted = records.to_vec();
    sorted.sort_by(CatalogRecord::newest_first);

    let mut pass = Pass::new(scheme, now);
    for record in sorted {
        pass.assign(record);
    }

    let summary = pass.finish();
    tracing::debug!(
        total = summary.total_categorized(),
        kept = summary.kept_count(),
        delete = summary.for_delete.len(),
        "Classification complete"
    );
    Ok(ClassifyOutcome::Classified(summary))
}

/// Whether `ts` falls inside `tier`'s eligibility window.
pub fn in_window(tier: Tier, ts: &LocalTime, now: &LocalTime, weekly_limit: usize) -> bool {
    match tier {
        Tier::Hourly => calendar::age(ts, now) <= TimeDelta::hours(HOURLY_WINDOW_HOURS),
        Tier::Daily => {
            let days = calendar::days_between(ts, now);
            (DAILY_MIN_DAYS..=DAILY_MAX_DAYS).contains(&days)
        }
        Tier::Weekly => {
            calendar::weeks_between(ts, now) <= weekly_limit as i64
                && calendar::is_last_day_of_week(ts)
        }
        Tier::Monthly => {
            calendar::months_between(ts, now) <= MONTHLY_MAX_MONTHS
                && calendar::weeks_between(ts, now) >= MONTHLY_MIN_WEEKS
        }
        Tier::Yearly => {
            let months = calendar::months_between(ts, now);
            months >= YEARLY_MIN_MONTHS
                || (months > YEARLY_OTHER_YEAR_MIN_MONTHS && !calendar::same_year(ts, now))
        }
    }
}

/// Whether `a` and `b` share `tier`'s calendar period.
pub fn same_period(tier: Tier, a: &LocalTime, b: &LocalTime) -> bool {
    match tier {
        Tier::Hourly => calendar::same_hour(a, b),
        Tier::Daily => calendar::same_day(a, b),
        Tier::Weekly => calendar::same_week(a, b),
        Tier::Monthly => calendar::same_month(a, b),
        Tier::Yearly => calendar::same_year(a, b),
    }
}

/// State of one classification pass.
struct Pass<'a> {
    scheme: &'a RetentionScheme,
    now: LocalTime,
    /// Timestamp of the last record accepted per tier, indexed like `Tier::ALL`.
    cursors: [Option<LocalTime>; 5],
    summary: Summary,
}

impl<'a> Pass<'a> {
    fn new(scheme: &'a RetentionScheme, now: LocalTime) -> Self {
        Self {
            scheme,
            now,
            cursors: [None; 5],
            summary: Summary::default(),
        }
    }

    fn assign(&mut self, record: CatalogRecord) {
        let ts = record.timestamp.with_timezone(self.now.offset());

        match Tier::ALL.into_iter().find(|tier| self.accepts(*tier, &ts)) {
            Some(tier) => {
                tracing::trace!(path = %record.identifier, tier = %tier, "Keeping");
                self.cursors[tier as usize] = Some(ts);
                self.summary.keep(tier, record);
            }
            None => {
                tracing::trace!(path = %record.identifier, "Marking for deletion");
                self.summary.discard(record);
            }
        }
    }

    fn accepts(&self, tier: Tier, ts: &LocalTime) -> bool {
        let has_room = match self.scheme.capacity(tier) {
            Some(limit) => self.summary.bucket(tier).len() < limit,
            None => true,
        };
        if !has_room {
            return false;
        }

        if let Some(cursor) = &self.cursors[tier as usize] {
            if same_period(tier, ts, cursor) {
                return false;
            }
        }

        in_window(tier, ts, &self.now, self.scheme.weekly)
    }

    fn finish(self) -> Summary {
        self.summary
    }
}
