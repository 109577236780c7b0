//! Metrics for pipeline runs.
//!
//! Recording goes through the `metrics` facade, so it is a no-op until a
//! recorder is installed. The CLI installs a Prometheus recorder when asked
//! and writes the rendered exposition to a file once the batch finishes.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Every metric name the pipeline records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    RowsExtracted,
    StudentsNormalized,
    QualityFindings,
    RowsJoined,
    Runs,
    RunDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RowsExtracted => "etl_rows_extracted_total",
            MetricName::StudentsNormalized => "etl_students_normalized_total",
            MetricName::QualityFindings => "etl_quality_findings_total",
            MetricName::RowsJoined => "etl_rows_joined_total",
            MetricName::Runs => "etl_runs_total",
            MetricName::RunDuration => "etl_run_duration_seconds",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            RowsExtracted,
            StudentsNormalized,
            QualityFindings,
            RowsJoined,
            Runs,
            RunDuration,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder once per process
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics recorder installed");
    Ok(())
}

/// Rendered text exposition, if a recorder was installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

/// Writes the current exposition to `path` (textfile-collector style)
pub fn write_snapshot(path: &Path) -> std::io::Result<bool> {
    match render() {
        Some(text) => {
            std::fs::write(path, text)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

pub mod source {
    use super::MetricName;

    pub fn rows_extracted(table: &str, rows: usize) {
        ::metrics::counter!(MetricName::RowsExtracted.as_str(), "table" => table.to_string())
            .increment(rows as u64);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn students_normalized(rows: usize) {
        ::metrics::counter!(MetricName::StudentsNormalized.as_str()).increment(rows as u64);
    }
}

pub mod quality {
    use super::MetricName;

    pub fn finding(kind: &'static str) {
        ::metrics::counter!(MetricName::QualityFindings.as_str(), "kind" => kind).increment(1);
    }
}

pub mod join {
    use super::MetricName;

    pub fn rows_joined(rows: usize) {
        ::metrics::counter!(MetricName::RowsJoined.as_str()).increment(rows as u64);
    }
}

pub mod run {
    use super::MetricName;

    pub fn completed(outcome: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::Runs.as_str(), "outcome" => outcome).increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(secs);
    }
}
