//! Partition schemes: mapping a time range and a prefix to a blob list.

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::errors::Result;

pub mod mabel;

pub use mabel::MabelScheme;

/// Directory listing callback supplied by the connector.
pub type BlobLister<'a> = &'a dyn Fn(&str) -> Vec<String>;

pub trait PartitionScheme {
    fn blobs_in_partition(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        list_getter: BlobLister<'_>,
        prefix: &str,
    ) -> Result<Vec<String>>;
}

/// Every hour boundary in `[start, end]`, inclusive.
pub fn hourly_timestamps(start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDateTime> {
    let mut slots = Vec::new();
    let floor = start.with_minute(0).unwrap_or(start);
    let mut cursor = floor.with_second(0).unwrap_or(floor);
    while cursor <= end {
        slots.push(cursor);
        cursor += Duration::hours(1);
    }
    slots
}

/// Unpartitioned data: everything under the prefix, sorted.
pub struct FlatScheme;

impl PartitionScheme for FlatScheme {
    fn blobs_in_partition(
        &self,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
        list_getter: BlobLister<'_>,
        prefix: &str,
    ) -> Result<Vec<String>> {
        let mut blobs = list_getter(prefix);
        blobs.sort();
        blobs.dedup();
        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_hourly_timestamps_inclusive() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(22, 30, 0)
            .unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        let slots = hourly_timestamps(start, end);
        assert_eq!(slots.len(), 4); // 22:00, 23:00, 00:00, 01:00
        assert_eq!(slots[0].hour(), 22);
        assert_eq!(slots[3].hour(), 1);
    }
}
