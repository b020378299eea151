//! Metrics for initiator operations
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.

use std::time::Instant;

use metrics::{counter, histogram};

/// Metric names
pub mod names {
    /// Counter: Total number of administrative commands by subcommand and status
    pub const ISCSIADM_COMMANDS_TOTAL: &str = "iscsiadm_commands_total";
    /// Histogram: Duration of connection manager operations in seconds
    pub const OPERATION_DURATION_SECONDS: &str = "initiator_operation_duration_seconds";
    /// Counter: Connection manager operations by type and status
    pub const OPERATIONS_TOTAL: &str = "initiator_operations_total";
}

/// Label for a command: program plus its verb and object (e.g. `iscsiadm list target`).
pub fn subcommand_label(program: &str, args: &[&str]) -> String {
    let program = program.rsplit('/').next().unwrap_or(program);
    let mut parts = vec![program];
    parts.extend(args.iter().take(2).copied());
    parts.join(" ")
}

/// Record one command invocation
pub fn record_command(program: &str, args: &[&str], success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        names::ISCSIADM_COMMANDS_TOTAL,
        "subcommand" => subcommand_label(program, args),
        "status" => status
    )
    .increment(1);
}

/// Record a manager operation with its result
pub fn record_operation(operation: &str, status: &str, duration_secs: f64) {
    counter!(names::OPERATIONS_TOTAL, "operation" => operation.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(names::OPERATION_DURATION_SECONDS, "operation" => operation.to_string())
        .record(duration_secs);
}

/// Helper for timing operations
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Complete the operation, labelling it by outcome.
    pub fn finish<T, E>(self, result: &Result<T, E>) {
        let status = if result.is_ok() { "success" } else { "failure" };
        record_operation(self.operation, status, self.start.elapsed().as_secs_f64());
    }
}

/// Run `f` and record its duration and outcome under `operation`.
pub fn timed<T, E>(operation: &'static str, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
    let timer = OperationTimer::new(operation);
    let result = f();
    timer.finish(&result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_passes_result_through() {
        assert_eq!(timed::<_, ()>("ok", || Ok(7)), Ok(7));
        assert_eq!(timed::<(), _>("err", || Err("boom")), Err("boom"));
    }

    #[test]
    fn test_subcommand_label() {
        assert_eq!(
            subcommand_label("iscsiadm", &["list", "discovery-address", "-v"]),
            "iscsiadm list discovery-address"
        );
        assert_eq!(
            subcommand_label("/usr/sbin/iscsiadm", &["modify", "discovery", "-t", "enable"]),
            "iscsiadm modify discovery"
        );
        assert_eq!(subcommand_label("pkginfo", &["-q"]), "pkginfo -q");
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation");
        // Just verify it doesn't panic - no recorder is installed
        timer.finish::<(), ()>(&Ok(()));
    }
}
