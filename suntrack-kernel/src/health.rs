use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use sysinfo::System;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub poll_cycles: u64,
    pub capture_failures: u64,
    pub detector_failures: u64,
    pub weather_failures: u64,
    pub audit_failures: u64,
    pub audit_sink: String,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    audit_sink: Arc<str>,
    poll_cycles: Arc<AtomicU64>,
    capture_failures: Arc<AtomicU64>,
    detector_failures: Arc<AtomicU64>,
    weather_failures: Arc<AtomicU64>,
    audit_failures: Arc<AtomicU64>,
}

impl HealthTracker {
    pub fn new(audit_sink: &str) -> Self {
        Self {
            start_time: Instant::now(),
            audit_sink: Arc::from(audit_sink),
            poll_cycles: Arc::new(AtomicU64::new(0)),
            capture_failures: Arc::new(AtomicU64::new(0)),
            detector_failures: Arc::new(AtomicU64::new(0)),
            weather_failures: Arc::new(AtomicU64::new(0)),
            audit_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_cycle(&self) {
        self.poll_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_failure(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detector_failure(&self) {
        self.detector_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_weather_failure(&self) {
        self.weather_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_failure(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            weather_failures: self.weather_failures.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
            audit_sink: self.audit_sink.to_string(),
            memory_usage_mb: process_memory_mb(),
        }
    }
}

/// Resident memory of this process, 0 when it cannot be read
fn process_memory_mb() -> f32 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0.0;
    };
    let mut sys = System::new();
    sys.refresh_process(pid);
    sys.process(pid)
        .map(|p| p.memory() as f32 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}
