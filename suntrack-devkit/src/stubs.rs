/*!
Scripted stand-ins for the poll loop collaborators

Each stub records what it was asked to do so tests can assert on it,
and can be switched into a failing mode to exercise the error paths.
*/

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use suntrack_core::ephemeris::{Ephemeris, EphemerisError, SolarPosition};
use suntrack_core::models::{
    Detection, Frame, GeoLocation, HostMetrics, ModelRecord, ProgramRecord, WeatherSnapshot,
};
use suntrack_core::ports::{
    AuditError, AuditSink, CameraSession, CaptureError, DetectError, Detector, FrameSource,
    GeolocationError, Geolocator, HostProbe, WeatherError, WeatherProvider,
};
use time::OffsetDateTime;

/// Counters shared between a `StubCamera` and its sessions
#[derive(Debug, Clone, Default)]
pub struct CameraProbe {
    opens: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl CameraProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Every opened session has been released
    pub fn all_released(&self) -> bool {
        self.opens() == self.releases()
    }
}

/// Camera producing blank frames, optionally failing to open or to read
#[derive(Debug, Clone)]
pub struct StubCamera {
    width: u32,
    height: u32,
    fail_open: Arc<AtomicBool>,
    failing_reads: Arc<AtomicUsize>,
    probe: CameraProbe,
}

impl StubCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fail_open: Arc::new(AtomicBool::new(false)),
            failing_reads: Arc::new(AtomicUsize::new(0)),
            probe: CameraProbe::default(),
        }
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// The next `n` reads report "no frame"
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }
}

struct StubSession {
    width: u32,
    height: u32,
    failing_reads: Arc<AtomicUsize>,
    probe: CameraProbe,
    released: bool,
}

#[async_trait]
impl CameraSession for StubSession {
    async fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_reads.store(remaining - 1, Ordering::SeqCst);
            return Err(CaptureError::NoFrame("scripted read failure".into()));
        }
        Ok(Frame::blank(self.width, self.height))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.probe.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl FrameSource for StubCamera {
    async fn open(&self) -> Result<Box<dyn CameraSession>, CaptureError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CaptureError::Open("scripted open failure".into()));
        }
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession {
            width: self.width,
            height: self.height,
            failing_reads: self.failing_reads.clone(),
            probe: self.probe.clone(),
            released: false,
        }))
    }

    fn describe(&self) -> String {
        format!("stub camera {}x{}", self.width, self.height)
    }
}

/// Detector answering every frame with the same detections
#[derive(Debug, Default)]
pub struct StubDetector {
    detections: Mutex<Vec<Detection>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StubDetector {
    pub fn returning(detections: Vec<Detection>) -> Self {
        Self {
            detections: Mutex::new(detections),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        let detector = Self::default();
        detector.failing.store(true, Ordering::SeqCst);
        detector
    }

    pub fn set_detections(&self, detections: Vec<Detection>) {
        *self.detections.lock().unwrap() = detections;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for StubDetector {
    async fn infer(&self, _frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DetectError::Request("scripted detector failure".into()));
        }
        Ok(self.detections.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Weather provider returning whatever snapshot is currently scripted; `None` is an outage
#[derive(Debug, Default)]
pub struct ScriptedWeather {
    current: Mutex<Option<WeatherSnapshot>>,
    fetches: AtomicUsize,
}

impl ScriptedWeather {
    pub fn new(snapshot: Option<WeatherSnapshot>) -> Self {
        Self {
            current: Mutex::new(snapshot),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, snapshot: Option<WeatherSnapshot>) {
        *self.current.lock().unwrap() = snapshot;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherProvider for ScriptedWeather {
    async fn fetch(&self, _location: &GeoLocation) -> Result<WeatherSnapshot, WeatherError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| WeatherError::Request("scripted outage".into()))
    }
}

#[derive(Debug, Clone)]
pub struct StaticGeolocator {
    location: Option<GeoLocation>,
}

impl StaticGeolocator {
    pub fn at(location: GeoLocation) -> Self {
        Self {
            location: Some(location),
        }
    }

    pub fn unreachable() -> Self {
        Self { location: None }
    }
}

#[async_trait]
impl Geolocator for StaticGeolocator {
    async fn locate(&self) -> Result<GeoLocation, GeolocationError> {
        self.location
            .clone()
            .ok_or_else(|| GeolocationError::Request("scripted outage".into()))
    }
}

/// Audit sink keeping every record in memory
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    programs: Mutex<Vec<ProgramRecord>>,
    models: Mutex<Vec<ModelRecord>>,
    failing: AtomicBool,
    rejected: AtomicUsize,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While failing, records are rejected and counted instead of stored
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn program_records(&self) -> Vec<ProgramRecord> {
        self.programs.lock().unwrap().clone()
    }

    pub fn model_records(&self) -> Vec<ModelRecord> {
        self.models.lock().unwrap().clone()
    }

    pub fn last_program(&self) -> Option<ProgramRecord> {
        self.programs.lock().unwrap().last().cloned()
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.programs.lock().unwrap().clear();
        self.models.lock().unwrap().clear();
    }

    fn check(&self) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(AuditError::Unavailable("scripted sink failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn program(&self, record: &ProgramRecord) -> Result<(), AuditError> {
        self.check()?;
        self.programs.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn model(&self, record: &ModelRecord) -> Result<(), AuditError> {
        self.check()?;
        self.models.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedProbe(pub HostMetrics);

impl HostProbe for FixedProbe {
    fn sample(&self) -> HostMetrics {
        self.0.clone()
    }
}

/// Sun climbing at a constant rate, so motion over any window is predictable
#[derive(Debug, Clone, Copy)]
pub struct LinearEphemeris {
    pub degrees_per_minute: f64,
}

impl Ephemeris for LinearEphemeris {
    fn position(
        &self,
        at: OffsetDateTime,
        _lat: f64,
        _lon: f64,
    ) -> Result<SolarPosition, EphemerisError> {
        let minutes = at.unix_timestamp() as f64 / 60.0;
        Ok(SolarPosition {
            azimuth: 0.0,
            altitude: (self.degrees_per_minute * minutes).to_radians(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FailingEphemeris;

impl Ephemeris for FailingEphemeris {
    fn position(
        &self,
        _at: OffsetDateTime,
        _lat: f64,
        _lon: f64,
    ) -> Result<SolarPosition, EphemerisError> {
        Err(EphemerisError::Unavailable("scripted outage".into()))
    }
}
