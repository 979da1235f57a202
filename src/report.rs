//! Aggregated results of a completed run.

use std::fmt;
use std::time::Duration;

use sketches_ddsketch::DDSketch;
use yansi::Paint;

/// Aggregated totals of a completed run.
pub struct Report {
    /// Total number of logical requests dispatched.
    pub total: u64,
    /// Requests that resolved with a 2xx status.
    pub succeeded: u64,
    /// Requests that resolved with any other status, exhausted retries
    /// included.
    pub failed: u64,
    /// Wall-clock duration of the whole run.
    pub duration: Duration,
    /// Per-request latency sketch merged from all workers.
    pub latency: DDSketch,
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("total", &self.total)
            .field("succeeded", &self.succeeded)
            .field("failed", &self.failed)
            .field("duration", &self.duration)
            .field("latency", &format_args!("DDSketch({})", self.latency.count()))
            .finish()
    }
}

impl Report {
    /// Share of succeeded requests, in percent. 0.0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        percentage(self.succeeded, self.total)
    }

    /// Share of failed requests, in percent. 0.0 for an empty run.
    pub fn failure_rate(&self) -> f64 {
        percentage(self.failed, self.total)
    }

    /// Overall requests per second. 0.0 for an empty or instantaneous run.
    pub fn requests_per_second(&self) -> f64 {
        let seconds = self.duration.as_secs_f64();
        if self.total == 0 || seconds == 0.0 {
            return 0.0;
        }
        self.total as f64 / seconds
    }

    /// Prints the final summary.
    pub fn render(&self) {
        println!();
        println!("{}", "## RESULTS".bold());
        println!(
            "  {} requests in {:.2?} ({:.2} requests/s)",
            self.total.bold(),
            self.duration,
            self.requests_per_second().bold(),
        );
        println!(
            "  {} {} ({:.2}%)",
            "succeeded:".bold().green(),
            self.succeeded,
            self.success_rate(),
        );
        println!(
            "  {} {} ({:.2}%)",
            "failed:".bold().red(),
            self.failed,
            self.failure_rate(),
        );

        if self.latency.count() > 0 {
            let sketch = &self.latency;
            let avg = Duration::from_secs_f64(sketch.sum().unwrap() / sketch.count() as f64);
            let p50 = Duration::from_secs_f64(sketch.quantile(0.5).unwrap().unwrap());
            let p90 = Duration::from_secs_f64(sketch.quantile(0.9).unwrap().unwrap());
            let p99 = Duration::from_secs_f64(sketch.quantile(0.99).unwrap().unwrap());
            println!(
                "  latency avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
                avg.bold()
            );
        }
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(total: u64, succeeded: u64, failed: u64, duration: Duration) -> Report {
        Report {
            total,
            succeeded,
            failed,
            duration,
            latency: DDSketch::default(),
        }
    }

    #[test]
    fn computes_percentages_and_rate() {
        let report = report(8, 6, 2, Duration::from_secs(4));

        assert_eq!(report.success_rate(), 75.0);
        assert_eq!(report.failure_rate(), 25.0);
        assert_eq!(report.requests_per_second(), 2.0);
    }

    #[test]
    fn all_failures_still_produce_a_full_breakdown() {
        let report = report(10, 0, 10, Duration::from_secs(1));

        assert_eq!(report.success_rate(), 0.0);
        assert_eq!(report.failure_rate(), 100.0);
    }

    #[test]
    fn empty_run_does_not_divide_by_zero() {
        let report = report(0, 0, 0, Duration::ZERO);

        assert_eq!(report.success_rate(), 0.0);
        assert_eq!(report.failure_rate(), 0.0);
        assert_eq!(report.requests_per_second(), 0.0);
    }

    #[test]
    fn instantaneous_run_has_zero_rate() {
        let report = report(5, 5, 0, Duration::ZERO);

        assert_eq!(report.requests_per_second(), 0.0);
    }
}
