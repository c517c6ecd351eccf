/*!
Test harness for the scheduler service

Bundles one stub per collaborator and lets a test declare how many audit
records it expects, then poll until they show up.
*/

use crate::stubs::{
    CameraProbe, FixedProbe, LinearEphemeris, RecordingAuditSink, ScriptedWeather,
    StaticGeolocator, StubCamera, StubDetector,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use suntrack_core::models::{GeoLocation, HostMetrics};
use tracing::{info, warn};

pub struct TestHarness {
    pub location: GeoLocation,
    pub camera: StubCamera,
    pub detector: Arc<StubDetector>,
    pub weather: Arc<ScriptedWeather>,
    pub geolocator: Arc<StaticGeolocator>,
    pub audit: Arc<RecordingAuditSink>,
    pub probe: Arc<FixedProbe>,
    pub ephemeris: Arc<LinearEphemeris>,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
enum Expectation {
    ProgramRecords(usize),
    ModelRecords(usize),
}

impl TestHarness {
    /// San Francisco, a 640x480 camera, a detector seeing nothing, no weather
    pub fn new() -> Self {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();

        let location = GeoLocation::new(37.7749, -122.4194);
        Self {
            geolocator: Arc::new(StaticGeolocator::at(location.clone())),
            location,
            camera: StubCamera::new(640, 480),
            detector: Arc::new(StubDetector::default()),
            weather: Arc::new(ScriptedWeather::default()),
            audit: Arc::new(RecordingAuditSink::new()),
            probe: Arc::new(FixedProbe(HostMetrics {
                cpu_percent: 12.5,
                memory_percent: 40.0,
                disk_percent: 61.0,
            })),
            ephemeris: Arc::new(LinearEphemeris {
                degrees_per_minute: 0.25,
            }),
            expectations: Vec::new(),
        }
    }

    pub fn camera_probe(&self) -> CameraProbe {
        self.camera.probe()
    }

    pub fn expect_program_records(&mut self, count: usize) -> &mut Self {
        self.expectations.push(Expectation::ProgramRecords(count));
        self
    }

    pub fn expect_model_records(&mut self, count: usize) -> &mut Self {
        self.expectations.push(Expectation::ModelRecords(count));
        self
    }

    /// Checks every declared expectation against the recording sink
    pub fn verify_expectations(&self) -> Result<()> {
        for expectation in &self.expectations {
            let (kind, expected, actual) = match expectation {
                Expectation::ProgramRecords(n) => {
                    ("program", *n, self.audit.program_records().len())
                }
                Expectation::ModelRecords(n) => ("model", *n, self.audit.model_records().len()),
            };
            if actual != expected {
                anyhow::bail!(
                    "expected {} {} records, got {}",
                    expected,
                    kind,
                    actual
                );
            }
            info!("✅ {} {} records as expected", actual, kind);
        }
        Ok(())
    }

    /// Polls `condition` every 10ms until it holds or `timeout_ms` elapses
    pub async fn wait_for<F>(&self, mut condition: F, timeout_ms: u64) -> bool
    where
        F: FnMut() -> bool,
    {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        warn!("⏰ condition not met within {}ms", timeout_ms);
        condition()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use suntrack_core::models::ProgramRecord;
    use suntrack_core::ports::AuditSink;
    use time::OffsetDateTime;

    #[tokio::test]
    async fn test_expectations_count_records() {
        let mut harness = TestHarness::new();
        harness.expect_program_records(1).expect_model_records(0);

        let record = ProgramRecord {
            weather_response: None,
            interval_formula: "Default interval - test".into(),
            next_interval_time: 120,
            timestamp: OffsetDateTime::UNIX_EPOCH,
        };
        harness.audit.program(&record).await.unwrap();

        harness.verify_expectations().unwrap();
    }

    #[tokio::test]
    async fn test_expectations_report_mismatch() {
        let mut harness = TestHarness::new();
        harness.expect_model_records(2);
        assert!(harness.verify_expectations().is_err());
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let harness = TestHarness::new();
        assert!(!harness.wait_for(|| false, 30).await);
        assert!(harness.wait_for(|| true, 30).await);
    }
}
