//! The Mabel partition scheme.
//!
//! Paths follow
//! `<prefix>/year_YYYY/month_MM/day_DD[/by_hour/hour=HH]/as_at_<token>/…`.
//! For each hour in the range the scheme lists the day's blobs, prefers
//! `by_hour` segments when they exist, rejects any other segmentation, and
//! selects the latest `as_at` frame that carries a `frame.complete` marker
//! and no `frame.ignore`. Blobs are yielded sorted and deduplicated across
//! hours.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::errors::{EngineError, Result};
use crate::partitions::{hourly_timestamps, BlobLister, PartitionScheme};

pub struct MabelScheme;

fn extract_part_from_path<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    path.split('/').find(|part| part.starts_with(prefix))
}

fn extract_as_at(path: &str) -> Option<&str> {
    extract_part_from_path(path, "as_at_")
}

fn extract_by(path: &str) -> Option<&str> {
    extract_part_from_path(path, "by_")
}

fn frame_is_complete(blobs: &[String], as_at: &str) -> bool {
    let marker = format!("{as_at}/frame.complete");
    blobs.iter().any(|blob| blob.contains(&marker))
}

fn frame_is_invalid(blobs: &[String], as_at: &str) -> bool {
    let marker = format!("{as_at}/frame.ignore");
    blobs.iter().any(|blob| blob.contains(&marker))
}

impl MabelScheme {
    /// Blobs for one hour slot of the range.
    fn hour_blobs(
        &self,
        timestamp: NaiveDateTime,
        list_getter: BlobLister<'_>,
        prefix: &str,
    ) -> Result<Vec<String>> {
        let date_path = format!(
            "{prefix}/year_{:04}/month_{:02}/day_{:02}",
            timestamp.year(),
            timestamp.month(),
            timestamp.day()
        );
        let mut blob_names = list_getter(&date_path);

        // the only segmentation understood below the day level is by_hour
        for blob in &blob_names {
            if let Some(segment) = extract_by(blob) {
                if segment != "by_hour" {
                    return Err(EngineError::UnsupportedSegmentation(prefix.to_string()));
                }
            }
        }

        let hour_segment = format!("/by_hour/hour={:02}/", timestamp.hour());
        if blob_names.iter().any(|blob| blob.contains(&hour_segment)) {
            blob_names.retain(|blob| blob.contains(&hour_segment));
        }

        // latest complete, non-ignored frame wins
        let mut as_ats: Vec<String> = blob_names
            .iter()
            .filter_map(|blob| extract_as_at(blob))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut selected: Option<String> = None;
        while let Some(candidate) = as_ats.pop() {
            if frame_is_complete(&blob_names, &candidate)
                && !frame_is_invalid(&blob_names, &candidate)
            {
                selected = Some(candidate);
                break;
            }
            blob_names.retain(|blob| !blob.contains(&candidate));
        }

        if let Some(as_at) = selected {
            blob_names.retain(|blob| blob.contains(&as_at));
        }
        Ok(blob_names)
    }
}

impl PartitionScheme for MabelScheme {
    fn blobs_in_partition(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        list_getter: BlobLister<'_>,
        prefix: &str,
    ) -> Result<Vec<String>> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut output = Vec::new();
        for slot in hourly_timestamps(start, end) {
            let blobs = self.hour_blobs(slot, list_getter, prefix)?;
            let fresh: BTreeSet<String> = blobs
                .into_iter()
                .filter(|blob| !seen.contains(blob))
                .collect();
            for blob in fresh {
                seen.insert(blob.clone());
                output.push(blob);
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range() -> (NaiveDateTime, NaiveDateTime) {
        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        (
            day.and_hms_opt(0, 0, 0).unwrap(),
            day.and_hms_opt(23, 59, 0).unwrap(),
        )
    }

    fn lister(blobs: Vec<&'static str>) -> impl Fn(&str) -> Vec<String> {
        move |prefix: &str| {
            blobs
                .iter()
                .filter(|blob| blob.starts_with(prefix))
                .map(|blob| blob.to_string())
                .collect()
        }
    }

    #[test]
    fn test_latest_complete_frame_selected() {
        let (start, end) = range();
        let list = lister(vec![
            "data/year_2024/month_02/day_01/as_at_001/frame.complete",
            "data/year_2024/month_02/day_01/as_at_001/part-0.jsonl",
            "data/year_2024/month_02/day_01/as_at_002/frame.complete",
            "data/year_2024/month_02/day_01/as_at_002/part-0.jsonl",
        ]);
        let blobs = MabelScheme
            .blobs_in_partition(start, end, &list, "data")
            .unwrap();
        assert!(blobs.iter().all(|blob| blob.contains("as_at_002")));
        assert!(blobs.iter().any(|blob| blob.ends_with("part-0.jsonl")));
    }

    #[test]
    fn test_incomplete_and_ignored_frames_skipped() {
        let (start, end) = range();
        let list = lister(vec![
            "data/year_2024/month_02/day_01/as_at_001/frame.complete",
            "data/year_2024/month_02/day_01/as_at_001/part-0.jsonl",
            // 002 never completed
            "data/year_2024/month_02/day_01/as_at_002/part-0.jsonl",
            // 003 completed but ignored
            "data/year_2024/month_02/day_01/as_at_003/frame.complete",
            "data/year_2024/month_02/day_01/as_at_003/frame.ignore",
            "data/year_2024/month_02/day_01/as_at_003/part-0.jsonl",
        ]);
        let blobs = MabelScheme
            .blobs_in_partition(start, end, &list, "data")
            .unwrap();
        assert!(blobs.iter().all(|blob| blob.contains("as_at_001")), "{blobs:?}");
    }

    #[test]
    fn test_by_hour_segments_preferred() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let start = day.and_hms_opt(9, 0, 0).unwrap();
        let end = day.and_hms_opt(9, 30, 0).unwrap();
        let list = lister(vec![
            "data/year_2024/month_02/day_01/by_hour/hour=08/part-0.jsonl",
            "data/year_2024/month_02/day_01/by_hour/hour=09/part-0.jsonl",
        ]);
        let blobs = MabelScheme
            .blobs_in_partition(start, end, &list, "data")
            .unwrap();
        assert_eq!(
            blobs,
            vec!["data/year_2024/month_02/day_01/by_hour/hour=09/part-0.jsonl".to_string()]
        );
    }

    #[test]
    fn test_foreign_segmentation_rejected() {
        let (start, end) = range();
        let list = lister(vec![
            "data/year_2024/month_02/day_01/by_region/region=eu/part-0.jsonl",
        ]);
        let result = MabelScheme.blobs_in_partition(start, end, &list, "data");
        assert!(matches!(
            result,
            Err(EngineError::UnsupportedSegmentation(_))
        ));
    }

    #[test]
    fn test_deduplicated_across_hours() {
        let (start, end) = range();
        let list = lister(vec![
            "data/year_2024/month_02/day_01/part-0.jsonl",
            "data/year_2024/month_02/day_01/part-1.jsonl",
        ]);
        let blobs = MabelScheme
            .blobs_in_partition(start, end, &list, "data")
            .unwrap();
        assert_eq!(blobs.len(), 2);
    }
}
