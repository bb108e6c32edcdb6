//! Standardized metrics collection and reporting for CI integration.
//!
//! Worldtests and the driver binary export a [`MetricsReport`] as JSON for
//! regression tracking.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Top-level metrics report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Test or run identifier
    pub test_name: String,

    /// Timestamp when metrics were collected (RFC 3339)
    pub timestamp: String,

    /// World seed the run used
    pub seed: u64,

    /// Overall result
    pub result: TestResult,

    /// Terrain generation metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terrain: Option<TerrainMetrics>,

    /// Feature placement metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureMetrics>,

    /// Digest of the generated blocks, if computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,

    /// Test execution metrics
    pub test_execution: TestExecutionMetrics,
}

/// Overall test result status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    /// Passed all validations
    Pass,
    /// Failed
    Fail,
    /// Skipped
    Skip,
}

/// Terrain generation performance and quality metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerrainMetrics {
    /// Total chunks generated
    pub chunks_generated: usize,

    /// Non-air blocks across all chunks
    pub blocks_generated: usize,

    /// Average generation time per chunk (microseconds)
    pub avg_gen_time_us: f64,

    /// Min generation time (microseconds)
    pub min_gen_time_us: u128,

    /// Max generation time (microseconds)
    pub max_gen_time_us: u128,

    /// Total generation time (milliseconds)
    pub total_gen_time_ms: f64,

    /// Number of unique biomes present
    pub unique_biomes: usize,

    /// Chunk seam validation results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seam_validation: Option<SeamValidation>,
}

impl TerrainMetrics {
    /// Fill the timing fields from per-chunk generation times.
    pub fn with_timings(mut self, times_us: &[u128]) -> Self {
        self.chunks_generated = times_us.len();
        let total: u128 = times_us.iter().sum();
        self.min_gen_time_us = times_us.iter().copied().min().unwrap_or(0);
        self.max_gen_time_us = times_us.iter().copied().max().unwrap_or(0);
        self.total_gen_time_ms = total as f64 / 1000.0;
        self.avg_gen_time_us = if times_us.is_empty() {
            0.0
        } else {
            total as f64 / times_us.len() as f64
        };
        self
    }
}

/// Chunk boundary seam validation metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeamValidation {
    /// Total seams checked
    pub total_seams: usize,

    /// Seams within the allowed step
    pub seams_valid: usize,

    /// Seams over the allowed step
    pub seams_failed: usize,

    /// Largest height difference observed at a seam
    pub max_seam_diff: i32,

    /// Average of the per-seam maximum differences
    pub avg_seam_diff: f64,
}

impl SeamValidation {
    /// Summarize per-seam maximum steps against `limit`.
    pub fn from_steps(steps: &[i32], limit: i32) -> Self {
        let failed = steps.iter().filter(|&&s| s > limit).count();
        let sum: i64 = steps.iter().map(|&s| i64::from(s)).sum();
        Self {
            total_seams: steps.len(),
            seams_valid: steps.len() - failed,
            seams_failed: failed,
            max_seam_diff: steps.iter().copied().max().unwrap_or(0),
            avg_seam_diff: if steps.is_empty() {
                0.0
            } else {
                sum as f64 / steps.len() as f64
            },
        }
    }
}

/// Feature placement metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureMetrics {
    /// Features that ran and wrote output
    pub placed: usize,

    /// Features skipped because their generator failed
    pub skipped: usize,

    /// Subtasks discarded inside placed features
    pub failed_subtasks: usize,

    /// Feature blocks written into chunks
    pub blocks_written: usize,

    /// Placements per feature key
    pub by_feature: BTreeMap<String, usize>,
}

/// Test execution metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestExecutionMetrics {
    /// Total duration (seconds)
    pub duration_seconds: f64,

    /// Number of assertions checked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertions_checked: Option<usize>,

    /// Number of validations passed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validations_passed: Option<usize>,
}

/// Builder for constructing metrics reports
pub struct MetricsReportBuilder {
    report: MetricsReport,
}

impl MetricsReportBuilder {
    /// Create a new builder with test name and seed
    pub fn new(test_name: impl Into<String>, seed: u64) -> Self {
        Self {
            report: MetricsReport {
                test_name: test_name.into(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                seed,
                result: TestResult::Pass,
                terrain: None,
                features: None,
                content_digest: None,
                test_execution: TestExecutionMetrics::default(),
            },
        }
    }

    /// Set result
    pub fn result(mut self, result: TestResult) -> Self {
        self.report.result = result;
        self
    }

    /// Set terrain metrics
    pub fn terrain(mut self, metrics: TerrainMetrics) -> Self {
        self.report.terrain = Some(metrics);
        self
    }

    /// Set feature metrics
    pub fn features(mut self, metrics: FeatureMetrics) -> Self {
        self.report.features = Some(metrics);
        self
    }

    /// Set content digest
    pub fn digest(mut self, digest: impl Into<String>) -> Self {
        self.report.content_digest = Some(digest.into());
        self
    }

    /// Set execution metrics
    pub fn execution(mut self, metrics: TestExecutionMetrics) -> Self {
        self.report.test_execution = metrics;
        self
    }

    /// Build the metrics report
    pub fn build(self) -> MetricsReport {
        self.report
    }
}

/// Sink for writing metrics reports to JSON files
pub struct MetricsSink {
    path: std::path::PathBuf,
}

impl MetricsSink {
    /// Create a new metrics sink at the specified path
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Write metrics report to file
    pub fn write(&self, report: &MetricsReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        let mut file = File::create(&self.path)?;
        file.write_all(json.as_bytes())?;
        debug!(path = %self.path.display(), test = %report.test_name, "metrics written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn metrics_report_roundtrip() {
        let report = MetricsReportBuilder::new("test_example", 42)
            .terrain(TerrainMetrics {
                unique_biomes: 5,
                seam_validation: Some(SeamValidation::from_steps(&[1, 3, 2, 40], 20)),
                ..TerrainMetrics::default()
            }
            .with_timings(&[2500, 3500, 8000]))
            .digest("abc123")
            .build();

        let json = serde_json::to_string_pretty(&report).unwrap();
        let parsed: MetricsReport = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.test_name, "test_example");
        assert_eq!(parsed.seed, 42);
        assert_eq!(parsed.result, TestResult::Pass);
        let terrain = parsed.terrain.unwrap();
        assert_eq!(terrain.chunks_generated, 3);
        assert_eq!(terrain.min_gen_time_us, 2500);
        assert!((terrain.avg_gen_time_us - 14000.0 / 3.0).abs() < 1e-6);
        let seams = terrain.seam_validation.unwrap();
        assert_eq!(seams.seams_failed, 1);
        assert_eq!(seams.max_seam_diff, 40);
        assert!(parsed.features.is_none());
    }

    #[test]
    fn empty_timings_do_not_divide_by_zero() {
        let terrain = TerrainMetrics::default().with_timings(&[]);
        assert_eq!(terrain.avg_gen_time_us, 0.0);
        assert_eq!(SeamValidation::from_steps(&[], 5).avg_seam_diff, 0.0);
    }

    #[test]
    fn metrics_sink_writes_file() {
        let path = std::env::temp_dir().join(format!(
            "strata-metrics-{}.json",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));

        let report = MetricsReportBuilder::new("sink_test", 7)
            .result(TestResult::Pass)
            .build();

        let sink = MetricsSink::create(&path).unwrap();
        sink.write(&report).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("sink_test"));
        assert!(contents.contains("\"result\": \"pass\""));

        fs::remove_file(&path).ok();
    }
}
