//! Append-only earnings ledger.
//!
//! Records are kept newest-first. The weekly total covers Monday 00:00:00
//! through Sunday 23:59:59 of the week containing `now`, both inclusive.

use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta};

use crate::models::earnings::EarningsRecord;

/// Newest-first log of completed deliveries.
#[derive(Debug, Clone, Default)]
pub struct EarningsLedger {
    records: Vec<EarningsRecord>,
}

impl EarningsLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ledger from records in any order.
    #[must_use]
    pub fn from_records(mut records: Vec<EarningsRecord>) -> Self {
        records.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Self { records }
    }

    /// Prepend a newly completed record.
    pub fn record(&mut self, record: EarningsRecord) {
        self.records.insert(0, record);
    }

    /// All records, newest first.
    #[must_use]
    pub fn records(&self) -> &[EarningsRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of all amounts.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.records.iter().map(|r| r.amount).sum()
    }

    /// The `n` most recent records.
    #[must_use]
    pub fn recent(&self, n: usize) -> &[EarningsRecord] {
        &self.records[..n.min(self.records.len())]
    }

    /// Sum of amounts completed in the week containing `now`.
    #[must_use]
    pub fn week_total(&self, now: NaiveDateTime) -> f64 {
        let (start, end) = week_bounds(now);
        self.records
            .iter()
            .filter(|r| r.completed_at >= start && r.completed_at <= end)
            .map(|r| r.amount)
            .sum()
    }

    /// Fraction of `goal` reached this week, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn week_progress(&self, now: NaiveDateTime, goal: f64) -> f64 {
        if goal <= 0.0 {
            return 1.0;
        }
        (self.week_total(now) / goal).clamp(0.0, 1.0)
    }
}

/// Inclusive bounds of the Monday-to-Sunday week containing `now`.
///
/// The end bound is the last nanosecond of Sunday, so any timestamp
/// displayed as `23:59:59` is inside the week.
#[must_use]
pub fn week_bounds(now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    let back = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date() - TimeDelta::days(back);
    let start = monday.and_time(NaiveTime::MIN);
    let end = start + TimeDelta::days(7) - TimeDelta::nanoseconds(1);
    (start, end)
}
