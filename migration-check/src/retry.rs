//! Bounded re-upload loop around the count check.
//!
//! Weblate imports uploaded files asynchronously, so a copy downloaded
//! right after the migration can be stale. When the message counts
//! disagree, the source catalog is uploaded again and the check is
//! repeated after a fixed delay.

use crate::compare::{ComparisonOutcome, CountReport};
use log::{error, info, warn};
use std::thread;
use std::time::Duration;

/// Maximum number of count checks for one translation.
pub const MAX_ATTEMPTS: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    /// Delay between upload attempts that the server did not accept.
    pub upload_delay: Duration,
    /// Delay between a re-upload and the next count check.
    pub recheck_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            upload_delay: Duration::from_secs(15),
            recheck_delay: Duration::from_secs(10),
        }
    }
}

/// Run the count check until it succeeds or the attempts run out.
///
/// `check` is called with the zero-based attempt number and compares
/// the catalogs. When the total counts differ, `repair` is called
/// with the number of the upcoming attempt to upload the source
/// catalog again; no upload happens after the final attempt. When
/// only the translated counts differ, a re-upload cannot help:
/// `diagnose` runs once for the log and the failure is returned.
///
/// Errors from the closures are returned as is and are not retried.
pub fn run_count_check<C, R, D>(
    policy: &RetryPolicy,
    mut check: C,
    mut repair: R,
    mut diagnose: D,
) -> anyhow::Result<ComparisonOutcome>
where
    C: FnMut(usize) -> anyhow::Result<CountReport>,
    R: FnMut(usize) -> anyhow::Result<()>,
    D: FnMut() -> anyhow::Result<()>,
{
    let mut attempt = 0;
    let mut last_report = CountReport::default();
    loop {
        if attempt == policy.max_attempts {
            error!("Exhausted retries after {attempt} attempts");
            return Ok(ComparisonOutcome::failure(
                last_report.source_total,
                last_report.source_translated,
                format!("exhausted retries after {attempt} attempts"),
            ));
        }

        info!(
            "Checking sentence counts, attempt {}/{}",
            attempt + 1,
            policy.max_attempts
        );
        let report = check(attempt)?;

        if report.counts_match() {
            if report.translated_match() {
                info!(
                    "✓ Count matched (translated/total): {}/{}",
                    report.source_translated, report.source_total
                );
            } else {
                for message in &report.errors {
                    error!("{message}");
                }
                diagnose()?;
            }
            return Ok(report.into_outcome());
        }

        for message in &report.errors {
            error!("{message}");
        }
        last_report = report;
        attempt += 1;
        if attempt < policy.max_attempts {
            warn!("Uploading the source catalog again before attempt {}", attempt + 1);
            repair(attempt)?;
            thread::sleep(policy.recheck_delay);
        }
    }
}
