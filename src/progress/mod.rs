//! Aggregate progress view
//!
//! Derived, side-effect-free computation over a registry snapshot that yields
//! a single global percentage and an "uploads pending" flag.
//!
//! Uploaded bytes only count once compression produced a known denominator,
//! so the percentage is never reported against a total that is about to
//! shrink. Settled jobs still contribute their last known totals.

use serde::Serialize;

use crate::job::{UploadJob, UploadStatus};

/// Global upload progress across every job in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregateProgress {
    /// True iff at least one job is in `progress`
    pub any_pending: bool,
    /// 0..=100, 100 when nothing is pending
    pub global_percentage: u8,
}

impl AggregateProgress {
    /// Nothing pending, vacuously complete
    pub const IDLE: AggregateProgress = AggregateProgress {
        any_pending: false,
        global_percentage: 100,
    };

    /// Compute the view over all jobs
    pub fn from_jobs(jobs: &[UploadJob]) -> Self {
        let any_pending = jobs
            .iter()
            .any(|job| job.status == UploadStatus::Progress);

        if !any_pending {
            return Self::IDLE;
        }

        let (uploaded, total) = jobs.iter().fold((0u64, 0u64), |(uploaded, total), job| {
            let counted = if job.compressed_size_bytes.is_some() {
                job.uploaded_size_bytes
            } else {
                0
            };
            (
                uploaded.saturating_add(counted),
                total.saturating_add(job.effective_total_bytes()),
            )
        });

        Self {
            any_pending,
            global_percentage: rounded_percentage(uploaded, total),
        }
    }
}

impl Default for AggregateProgress {
    fn default() -> Self {
        Self::IDLE
    }
}

/// `min(100, round(100 * part / whole))`, rounding halves up
///
/// A zero `whole` yields 0.
pub(crate) fn rounded_percentage(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let part = part as u128;
    let whole = whole as u128;
    let rounded = (200 * part + whole) / (2 * whole);
    rounded.min(100) as u8
}
