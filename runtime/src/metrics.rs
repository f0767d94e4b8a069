//! Metric names and descriptions for check-in operations.
//!
//! The runtime records through the `metrics` facade only. Installing a
//! recorder (Prometheus, statsd, ...) is up to the embedding application;
//! call [`register_metrics`] once after installing it so exporters pick up
//! the descriptions.

use metrics::{describe_counter, describe_histogram};

/// Scans processed, labelled by `outcome`.
pub const SCANS_TOTAL: &str = "checkin_scans_total";

/// Registrations created, labelled by `path`
/// (`sign_up`, `auto_registered`, `walk_in`).
pub const REGISTRATIONS_CREATED_TOTAL: &str = "checkin_registrations_created_total";

/// Units of work retried after a storage failure or conflict.
pub const STORAGE_RETRIES_TOTAL: &str = "checkin_storage_retries_total";

/// Wall time of one resolve call, including retries.
pub const RESOLVE_DURATION_SECONDS: &str = "checkin_resolve_duration_seconds";

/// Lifecycle transitions applied, labelled by target `status`.
pub const TRANSITIONS_TOTAL: &str = "checkin_transitions_total";

/// Register descriptions for every check-in metric.
pub fn register_metrics() {
    describe_counter!(SCANS_TOTAL, "Total number of scans processed, by outcome");
    describe_counter!(
        REGISTRATIONS_CREATED_TOTAL,
        "Total number of registrations created, by creation path"
    );
    describe_counter!(
        STORAGE_RETRIES_TOTAL,
        "Total number of units of work retried after a transient failure"
    );
    describe_histogram!(
        RESOLVE_DURATION_SECONDS,
        "Time taken to resolve a scan and apply the check-in"
    );
    describe_counter!(
        TRANSITIONS_TOTAL,
        "Total number of explicit lifecycle transitions, by target status"
    );
}
