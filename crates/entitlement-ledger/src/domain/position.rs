//! # Segment Position and State
//!
//! Pure functions over a package's ledger segments. No I/O: the order service
//! loads the segments under lock and asks these functions what to do.
//!
//! ## Position of a new segment
//!
//! | Current segment      | Candidate before it          | Candidate after it |
//! |----------------------|------------------------------|--------------------|
//! | none                 | Current                      | Current            |
//! | contains now         | Past                         | Future             |
//! | ended before now     | Past                         | Current            |
//! | starts after now     | Past if it ended, else Current | Future           |
//!
//! Any overlap with a live segment is rejected before the table applies.

use super::entities::StudentPackageOrder;
use serde::{Deserialize, Serialize};
use shared_types::{Revisable, TimeWindow, Timestamp};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudentPackagePosition {
    Past,
    Current,
    Future,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PositionError {
    #[error("segment window ends before it starts")]
    InvertedWindow,

    #[error("segment window overlaps live segment {segment_id}")]
    Overlap { segment_id: String },
}

/// Inferred lifecycle state of a segment. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentState {
    Pending,
    Current,
    Superseded,
    Cancelled,
}

/// Where `candidate` falls relative to the package's current segment.
///
/// `candidate_id` excludes the candidate itself when it is already stored.
pub fn determine_position(
    candidate: &TimeWindow,
    candidate_id: Option<&str>,
    segments: &[StudentPackageOrder],
    now: Timestamp,
) -> Result<StudentPackagePosition, PositionError> {
    if candidate.end < candidate.start {
        return Err(PositionError::InvertedWindow);
    }

    let live: Vec<&StudentPackageOrder> = segments
        .iter()
        .filter(|s| s.is_active())
        .filter(|s| Some(s.student_package_order_id.as_str()) != candidate_id)
        .collect();

    if let Some(clash) = live.iter().find(|s| s.window().overlaps(candidate)) {
        return Err(PositionError::Overlap {
            segment_id: clash.student_package_order_id.clone(),
        });
    }

    let Some(current) = live.iter().find(|s| s.is_current_student_package) else {
        return Ok(StudentPackagePosition::Current);
    };
    let current = current.window();
    let after = candidate.is_after(&current);

    let position = if current.contains(now) {
        if after {
            StudentPackagePosition::Future
        } else {
            StudentPackagePosition::Past
        }
    } else if current.end < now {
        if after {
            StudentPackagePosition::Current
        } else {
            StudentPackagePosition::Past
        }
    } else if after {
        StudentPackagePosition::Future
    } else if candidate.end < now {
        StudentPackagePosition::Past
    } else {
        StudentPackagePosition::Current
    };

    Ok(position)
}

/// Segment that should carry the current flag at `now`: the live one containing
/// `now`, else the earliest live one starting after `now`.
pub fn select_current_segment(
    segments: &[StudentPackageOrder],
    now: Timestamp,
) -> Option<&StudentPackageOrder> {
    let live = segments.iter().filter(|s| s.is_active());
    if let Some(active) = live.clone().find(|s| s.window().contains(now)) {
        return Some(active);
    }
    live.filter(|s| s.start_at > now).min_by_key(|s| s.start_at)
}

/// Infer each segment's state from the current flag and supersession links.
pub fn classify_segments(segments: &[StudentPackageOrder]) -> Vec<(String, SegmentState)> {
    let current = segments
        .iter()
        .find(|s| s.is_active() && s.is_current_student_package);

    segments
        .iter()
        .map(|s| {
            let state = if !s.is_active() {
                SegmentState::Cancelled
            } else if s.is_current_student_package {
                SegmentState::Current
            } else if segments.iter().any(|other| {
                other.is_active()
                    && other.from_student_package_order_id.as_deref()
                        == Some(s.student_package_order_id.as_str())
            }) || current.map_or(false, |c| c.start_at > s.end_at)
            {
                SegmentState::Superseded
            } else {
                SegmentState::Pending
            };
            (s.student_package_order_id.clone(), state)
        })
        .collect()
}
