/**
 * SCHEDULER SERVICE - Owns the poll loop and its shared state
 *
 * RÔLE :
 * One camera session, one loop task, driven by the interval scheduler.
 * The HTTP handlers only talk to this object (start, stop, override, status).
 *
 * CYCLE :
 * capture -> sun filter -> detect -> offset geometry -> model record
 *   -> annotated snapshot -> weather refresh -> interval decision -> program record
 *
 * CONCURRENCY :
 * - PollState and the last weather snapshot behind parking_lot mutexes,
 *   never locked across an `.await`
 * - `active` is the cooperative stop flag, checked at each cycle boundary
 * - `wake` interrupts the sleep between cycles (stop, manual override)
 * - the camera session lives in a guard released on every loop exit
 */

use crate::annotate::SnapshotWriter;
use crate::filter::SunFilter;
use crate::health::HealthTracker;
use crate::state::{new_state, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use suntrack_core::ports::{
    AuditSink, CameraSession, CaptureError, Detector, FrameSource, HostProbe, WeatherProvider,
};
use suntrack_core::{
    track, Ephemeris, Frame, GeoLocation, IntervalDecision, IntervalScheduler, ModelDetails,
    ModelRecord, OverrideError, PollPhase, PollState, ProgramRecord, SchedulePolicy,
    SchedulerConfig, TargetRegion, WeatherSnapshot,
};
use time::OffsetDateTime;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("camera is already running")]
    AlreadyActive,
    #[error("camera is not running")]
    NotActive,
    #[error("previous poll loop is still stopping, try again")]
    StillStopping,
    #[error("no detection model loaded")]
    ModelNotLoaded,
    #[error("invalid action '{0}', expected 'start' or 'stop'")]
    InvalidAction(String),
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
}

impl From<OverrideError> for ControlError {
    fn from(e: OverrideError) -> Self {
        ControlError::InvalidInterval(e.to_string())
    }
}

/// External collaborators injected into the service
pub struct Collaborators {
    pub camera: Arc<dyn FrameSource>,
    pub detector: Option<Arc<dyn Detector>>,
    pub weather: Arc<dyn WeatherProvider>,
    pub ephemeris: Arc<dyn Ephemeris>,
    pub audit: Arc<dyn AuditSink>,
    pub probe: Arc<dyn HostProbe>,
}

pub struct ServiceOptions {
    pub target_side: u32,
    pub retry_delay: Duration,
    pub filter: Option<SunFilter>,
    pub snapshots: Option<SnapshotWriter>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            target_side: 50,
            retry_delay: Duration::from_secs(1),
            filter: None,
            snapshots: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub camera_active: bool,
    pub model_loaded: bool,
    pub policy: SchedulePolicy,
    pub poll_state: PollPhase,
    pub interval_time: u64,
    pub next_interval_time: Option<i64>,
    pub last_poll_time: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_detection_time: Option<OffsetDateTime>,
    pub weather_data: Option<WeatherSnapshot>,
    pub location: GeoLocation,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Clone)]
pub struct SchedulerService {
    inner: Arc<Inner>,
}

struct Inner {
    scheduler: IntervalScheduler,
    location: GeoLocation,
    collab: Collaborators,
    options: ServiceOptions,
    health: HealthTracker,
    poll: Shared<PollState>,
    weather: Shared<Option<WeatherSnapshot>>,
    last_detection: Shared<Option<OffsetDateTime>>,
    active: AtomicBool,
    wake: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerService {
    pub fn new(
        config: SchedulerConfig,
        location: GeoLocation,
        collab: Collaborators,
        options: ServiceOptions,
        health: HealthTracker,
    ) -> Self {
        let poll = PollState::new(config.default_interval_secs);
        Self {
            inner: Arc::new(Inner {
                scheduler: IntervalScheduler::new(config),
                location,
                collab,
                options,
                health,
                poll: new_state(poll),
                weather: new_state(None),
                last_detection: new_state(None),
                active: AtomicBool::new(false),
                wake: Notify::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn model_loaded(&self) -> bool {
        self.inner.collab.detector.is_some()
    }

    /// Starts the poll loop. At most one loop runs at a time.
    pub fn start(&self) -> Result<(), ControlError> {
        let mut task = self.inner.task.lock();
        if self.is_active() {
            return Err(ControlError::AlreadyActive);
        }
        if !self.model_loaded() {
            return Err(ControlError::ModelNotLoaded);
        }
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(ControlError::StillStopping);
        }
        self.inner.active.store(true, Ordering::SeqCst);
        *task = Some(tokio::spawn(run_loop(self.inner.clone())));
        info!("▶️ poll loop started ({:?} policy)", self.inner.scheduler.policy());
        Ok(())
    }

    /// Asks the loop to exit at its next cycle boundary
    pub fn stop(&self) -> Result<(), ControlError> {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return Err(ControlError::NotActive);
        }
        self.inner.wake.notify_one();
        info!("⏹️ poll loop stopping");
        Ok(())
    }

    /// Dispatches a control-surface action string
    pub fn apply_action(&self, action: &str) -> Result<(), ControlError> {
        match action {
            "start" => self.start(),
            "stop" => self.stop(),
            other => Err(ControlError::InvalidAction(other.to_string())),
        }
    }

    /// Manual override: forces the interval and re-arms from now
    pub async fn set_interval(&self, requested: i64) -> Result<IntervalDecision, ControlError> {
        let now = OffsetDateTime::now_utc();
        let max = self.inner.scheduler.config().max_interval_secs;
        let decision = self
            .inner
            .poll
            .lock()
            .override_interval(requested, now.unix_timestamp(), max)?;
        self.inner.wake.notify_one();
        info!("⏱️ {}", decision.formula);

        let weather = self.inner.weather.lock().clone();
        self.inner.record_program(&decision, weather, now).await;
        Ok(decision)
    }

    pub fn status(&self) -> ServiceStatus {
        let poll = self.inner.poll.lock().clone();
        ServiceStatus {
            camera_active: self.is_active(),
            model_loaded: self.model_loaded(),
            policy: self.inner.scheduler.policy(),
            poll_state: poll.phase(),
            interval_time: poll.interval_seconds(),
            next_interval_time: poll.next_poll_at(),
            last_poll_time: poll.last_poll_at(),
            last_detection_time: *self.inner.last_detection.lock(),
            weather_data: self.inner.weather.lock().clone(),
            location: self.inner.location.clone(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Releases the camera session however the loop exits
struct CameraGuard {
    session: Box<dyn CameraSession>,
}

impl CameraGuard {
    async fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        self.session.read_frame().await
    }
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        self.session.release();
        info!("📷 camera released");
    }
}

/// Clears the active flag when the loop task ends, panics included
struct ActiveReset<'a>(&'a AtomicBool);

impl Drop for ActiveReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn run_loop(inner: Arc<Inner>) {
    let _active = ActiveReset(&inner.active);

    let session = match inner.collab.camera.open().await {
        Ok(session) => session,
        Err(e) => {
            error!("❌ {}: {e}", inner.collab.camera.describe());
            inner.health.record_capture_failure();
            return;
        }
    };
    let mut camera = CameraGuard { session };
    info!("📷 camera opened: {}", inner.collab.camera.describe());

    while inner.active.load(Ordering::SeqCst) {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let next_poll_at = {
            let poll = inner.poll.lock();
            if poll.is_due(now) {
                None
            } else {
                poll.next_poll_at()
            }
        };
        if let Some(next) = next_poll_at {
            let wait = Duration::from_secs((next - now).max(1) as u64);
            inner.sleep_or_wake(wait).await;
            continue;
        }

        match camera.read_frame().await {
            Ok(frame) => inner.poll_cycle(frame).await,
            Err(e) => {
                warn!("frame capture failed: {e}");
                inner.health.record_capture_failure();
                inner.sleep_or_wake(inner.options.retry_delay).await;
            }
        }
    }

    drop(camera);
    info!("poll loop exited");
}

impl Inner {
    async fn sleep_or_wake(&self, wait: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = self.wake.notified() => {}
        }
    }

    async fn poll_cycle(&self, frame: Frame) {
        let started = OffsetDateTime::now_utc();
        let Some(detector) = self.collab.detector.as_ref() else {
            return;
        };

        let frame = match &self.options.filter {
            Some(filter) => filter.apply(&frame),
            None => frame,
        };

        let tracked = match TargetRegion::centered(frame.width(), frame.height(), self.options.target_side) {
            Ok(region) => {
                let detections = match detector.infer(&frame).await {
                    Ok(detections) => detections,
                    Err(e) => {
                        warn!("detector {} failed: {e}", detector.name());
                        self.health.record_detector_failure();
                        Vec::new()
                    }
                };
                let tracked = track(&detections, &region);
                if let Some(writer) = &self.options.snapshots {
                    match writer.save(&frame, &region, &tracked, started).await {
                        Ok(path) => debug!("snapshot saved to {}", path.display()),
                        Err(e) => warn!("snapshot not saved: {e}"),
                    }
                }
                tracked
            }
            Err(e) => {
                warn!("no target region for this frame: {e}");
                Vec::new()
            }
        };

        for t in &tracked {
            info!(
                "☀️ sun at ({:.0}, {:.0}) conf {:.2}, offset dx={:.1} dy={:.1}",
                t.detection.bbox.center().x,
                t.detection.bbox.center().y,
                t.detection.confidence,
                t.dx,
                t.dy
            );
        }
        if !tracked.is_empty() {
            *self.last_detection.lock() = Some(started);
        }

        let record = ModelRecord {
            model_details: ModelDetails {
                detections: tracked,
                timestamp: started,
            },
            raspberry_details: self.collab.probe.sample(),
            timestamp: started,
        };
        if let Err(e) = self.collab.audit.model(&record).await {
            warn!("audit sink {} rejected model record: {e}", self.collab.audit.name());
            self.health.record_audit_failure();
        }

        let (decision, weather) = self.decide(started).await;
        self.poll.lock().record_poll(started.unix_timestamp(), &decision);
        info!("next poll in {}s: {}", decision.interval_secs, decision.formula);
        self.record_program(&decision, weather, started).await;
        self.health.record_cycle();
    }

    async fn decide(&self, now: OffsetDateTime) -> (IntervalDecision, Option<WeatherSnapshot>) {
        match self.scheduler.policy() {
            SchedulePolicy::Motion => {
                let decision =
                    self.scheduler
                        .motion_interval(self.collab.ephemeris.as_ref(), &self.location, now);
                (decision, None)
            }
            SchedulePolicy::Weather => {
                let snapshot = match self.collab.weather.fetch(&self.location).await {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        warn!("weather unavailable: {e}");
                        self.health.record_weather_failure();
                        None
                    }
                };
                *self.weather.lock() = snapshot.clone();
                let decision = self
                    .scheduler
                    .weather_interval(snapshot.as_ref(), now.unix_timestamp());
                (decision, snapshot)
            }
        }
    }

    async fn record_program(
        &self,
        decision: &IntervalDecision,
        weather: Option<WeatherSnapshot>,
        at: OffsetDateTime,
    ) {
        let record = ProgramRecord {
            weather_response: weather,
            interval_formula: decision.formula.to_string(),
            next_interval_time: decision.next_poll_at,
            timestamp: at,
        };
        if let Err(e) = self.collab.audit.program(&record).await {
            warn!("audit sink {} rejected program record: {e}", self.collab.audit.name());
            self.health.record_audit_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use suntrack_core::{IntervalFormula, SchedulePolicy};
    use suntrack_devkit::{
        DetectionBuilder, FailingEphemeris, StubDetector, TestHarness, WeatherBuilder,
    };

    fn service_with(
        harness: &TestHarness,
        config: SchedulerConfig,
        with_detector: bool,
    ) -> SchedulerService {
        let detector: Option<Arc<dyn Detector>> = if with_detector {
            Some(harness.detector.clone())
        } else {
            None
        };
        SchedulerService::new(
            config,
            harness.location.clone(),
            Collaborators {
                camera: Arc::new(harness.camera.clone()),
                detector,
                weather: harness.weather.clone(),
                ephemeris: harness.ephemeris.clone(),
                audit: harness.audit.clone(),
                probe: harness.probe.clone(),
            },
            ServiceOptions {
                retry_delay: Duration::from_millis(10),
                ..ServiceOptions::default()
            },
            HealthTracker::new("recording"),
        )
    }

    fn service(harness: &TestHarness) -> SchedulerService {
        service_with(harness, SchedulerConfig::default(), true)
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    async fn stop_and_wait(harness: &TestHarness, svc: &SchedulerService) {
        svc.stop().unwrap();
        let probe = harness.camera_probe();
        assert!(harness.wait_for(|| probe.all_released(), 2000).await);
    }

    #[tokio::test]
    async fn test_start_without_detector_is_refused() {
        let harness = TestHarness::new();
        let svc = service_with(&harness, SchedulerConfig::default(), false);
        assert_eq!(svc.start(), Err(ControlError::ModelNotLoaded));
        assert!(!svc.is_active());
        assert_eq!(harness.camera_probe().opens(), 0);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let harness = TestHarness::new();
        let svc = service(&harness);

        assert_eq!(svc.stop(), Err(ControlError::NotActive));
        svc.start().unwrap();
        assert_eq!(svc.start(), Err(ControlError::AlreadyActive));
        assert!(svc.status().camera_active);

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.program_records().is_empty(), 2000).await);

        stop_and_wait(&harness, &svc).await;
        assert!(!svc.status().camera_active);
        assert_eq!(svc.stop(), Err(ControlError::NotActive));
        assert_eq!(harness.camera_probe().opens(), 1);
    }

    #[tokio::test]
    async fn test_idle_loop_polls_immediately_then_arms() {
        let mut harness = TestHarness::new();
        let svc = service(&harness);
        assert_eq!(svc.status().poll_state, PollPhase::Idle);

        let before = now();
        svc.start().unwrap();
        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.program_records().is_empty(), 2000).await);

        let status = svc.status();
        assert_eq!(status.poll_state, PollPhase::Armed);
        // no weather scripted, so the fallback interval applies
        assert_eq!(status.interval_time, 120);
        let last = status.last_poll_time.unwrap();
        assert!(last >= before);
        assert_eq!(status.next_interval_time, Some(last + 120));

        let program = harness.audit.last_program().unwrap();
        assert_eq!(program.interval_formula, "Default interval - weather data unavailable");
        assert_eq!(program.next_interval_time, last + 120);
        assert!(program.weather_response.is_none());

        stop_and_wait(&harness, &svc).await;
        harness.expect_program_records(1).expect_model_records(1);
        harness.verify_expectations().unwrap();
    }

    #[tokio::test]
    async fn test_weather_policy_uses_fresh_snapshot() {
        let harness = TestHarness::new();
        harness
            .weather
            .set(Some(WeatherBuilder::clear_day(now()).clouds(10).build()));
        let svc = service(&harness);
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.program_records().is_empty(), 2000).await);
        stop_and_wait(&harness, &svc).await;

        let status = svc.status();
        assert_eq!(status.interval_time, 60);
        assert_eq!(status.weather_data.unwrap().condition, "Clear");
        let program = harness.audit.last_program().unwrap();
        assert_eq!(program.interval_formula, "Daytime - Based on clear with 10% cloud coverage");
        assert!(program.weather_response.is_some());
        assert_eq!(harness.weather.fetches(), 1);
    }

    #[tokio::test]
    async fn test_night_waits_for_sunrise() {
        let harness = TestHarness::new();
        harness
            .weather
            .set(Some(WeatherBuilder::night(now(), 900).build()));
        let svc = service(&harness);
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.program_records().is_empty(), 2000).await);
        stop_and_wait(&harness, &svc).await;

        // a second or two may pass between scripting and polling
        let interval = svc.status().interval_time;
        assert!((895..=900).contains(&interval), "interval {interval}");
    }

    #[tokio::test]
    async fn test_motion_policy_ignores_weather() {
        let harness = TestHarness::new();
        let config = SchedulerConfig {
            policy: SchedulePolicy::Motion,
            ..SchedulerConfig::default()
        };
        let svc = service_with(&harness, config, true);
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.program_records().is_empty(), 2000).await);
        stop_and_wait(&harness, &svc).await;

        // 0.25 deg/min over a 5 minute window is 1.25 deg
        assert_eq!(svc.status().interval_time, 60);
        assert_eq!(harness.weather.fetches(), 0);
    }

    #[tokio::test]
    async fn test_motion_policy_falls_back_without_ephemeris() {
        let harness = TestHarness::new();
        let config = SchedulerConfig {
            policy: SchedulePolicy::Motion,
            ..SchedulerConfig::default()
        };
        let svc = SchedulerService::new(
            config,
            harness.location.clone(),
            Collaborators {
                camera: Arc::new(harness.camera.clone()),
                detector: Some(harness.detector.clone()),
                weather: harness.weather.clone(),
                ephemeris: Arc::new(FailingEphemeris),
                audit: harness.audit.clone(),
                probe: harness.probe.clone(),
            },
            ServiceOptions::default(),
            HealthTracker::new("recording"),
        );
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.program_records().is_empty(), 2000).await);
        stop_and_wait(&harness, &svc).await;
        assert_eq!(svc.status().interval_time, 120);
    }

    #[tokio::test]
    async fn test_detections_are_tracked_and_audited() {
        let harness = TestHarness::new();
        harness.detector.set_detections(vec![
            DetectionBuilder::sun_at(100.0, 100.0, 20.0).build(),
            DetectionBuilder::sun_at(320.0, 240.0, 20.0).class(2).build(),
        ]);
        let svc = service(&harness);
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.model_records().is_empty(), 2000).await);
        stop_and_wait(&harness, &svc).await;

        let record = &harness.audit.model_records()[0];
        let detections = &record.model_details.detections;
        assert_eq!(detections.len(), 1);
        // 640x480 frame, 50px target: left edge 295, top edge 215
        assert_eq!(detections[0].dx, -195.0);
        assert_eq!(detections[0].dy, -115.0);
        assert_eq!(record.raspberry_details.cpu_percent, 12.5);
        assert!(svc.status().last_detection_time.is_some());
    }

    #[tokio::test]
    async fn test_detector_failure_is_not_a_detection() {
        let harness = TestHarness::new();
        let failing = Arc::new(StubDetector::failing());
        let svc = SchedulerService::new(
            SchedulerConfig::default(),
            harness.location.clone(),
            Collaborators {
                camera: Arc::new(harness.camera.clone()),
                detector: Some(failing.clone()),
                weather: harness.weather.clone(),
                ephemeris: harness.ephemeris.clone(),
                audit: harness.audit.clone(),
                probe: harness.probe.clone(),
            },
            ServiceOptions::default(),
            HealthTracker::new("recording"),
        );
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.program_records().is_empty(), 2000).await);
        stop_and_wait(&harness, &svc).await;

        assert_eq!(failing.calls(), 1);
        assert!(harness.audit.model_records()[0].model_details.detections.is_empty());
        assert!(svc.status().last_detection_time.is_none());
    }

    #[tokio::test]
    async fn test_camera_open_failure_clears_active() {
        let harness = TestHarness::new();
        harness.camera.fail_open(true);
        let svc = service(&harness);
        svc.start().unwrap();

        let probe_svc = svc.clone();
        assert!(harness.wait_for(|| !probe_svc.is_active(), 2000).await);
        assert!(harness.audit.program_records().is_empty());

        // once the failed loop has finished, a new start is accepted
        harness.camera.fail_open(false);
        let restart = svc.clone();
        assert!(harness.wait_for(|| restart.start().is_ok(), 2000).await);
        stop_and_wait(&harness, &svc).await;
    }

    #[tokio::test]
    async fn test_read_failures_are_retried() {
        let harness = TestHarness::new();
        harness.camera.fail_next_reads(3);
        let svc = service(&harness);
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.model_records().is_empty(), 2000).await);
        stop_and_wait(&harness, &svc).await;

        let probe = harness.camera_probe();
        assert_eq!(probe.reads(), 4);
        assert_eq!(probe.opens(), 1);
        assert_eq!(probe.releases(), 1);
    }

    #[tokio::test]
    async fn test_audit_failures_never_stop_the_loop() {
        let harness = TestHarness::new();
        harness.audit.set_failing(true);
        let svc = service(&harness);
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| audit.rejected() >= 2, 2000).await);
        assert!(svc.is_active());
        assert_eq!(svc.status().poll_state, PollPhase::Armed);
        stop_and_wait(&harness, &svc).await;
    }

    #[tokio::test]
    async fn test_manual_override_rearms_from_now() {
        let harness = TestHarness::new();
        let svc = service(&harness);

        let before = now();
        let decision = svc.set_interval(30).await.unwrap();
        assert_eq!(decision.interval_secs, 30);
        assert_eq!(decision.formula, IntervalFormula::Manual { from: 120, to: 30 });
        assert!(decision.next_poll_at >= before + 30 && decision.next_poll_at <= now() + 30);

        let status = svc.status();
        assert_eq!(status.interval_time, 30);
        assert_eq!(status.poll_state, PollPhase::Armed);
        assert_eq!(
            harness.audit.last_program().unwrap().interval_formula,
            "Interval changed manually from 120s to 30s"
        );
    }

    #[tokio::test]
    async fn test_invalid_override_leaves_state_untouched() {
        let harness = TestHarness::new();
        let svc = service(&harness);

        assert!(matches!(svc.set_interval(0).await, Err(ControlError::InvalidInterval(_))));
        assert!(matches!(svc.set_interval(-10).await, Err(ControlError::InvalidInterval(_))));
        assert!(matches!(
            svc.set_interval(86_401).await,
            Err(ControlError::InvalidInterval(_))
        ));

        let status = svc.status();
        assert_eq!(status.poll_state, PollPhase::Idle);
        assert_eq!(status.interval_time, 120);
        assert!(harness.audit.program_records().is_empty());
    }

    #[tokio::test]
    async fn test_override_wakes_a_sleeping_loop() {
        let harness = TestHarness::new();
        let svc = service(&harness);
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| audit.program_records().len() == 1, 2000).await);
        harness.audit.clear();

        // armed for 120s; shorten it and expect the next cycle well before that
        svc.set_interval(1).await.unwrap();
        assert!(harness.wait_for(|| !audit.model_records().is_empty(), 4000).await);
        stop_and_wait(&harness, &svc).await;

        let programs = harness.audit.program_records();
        assert_eq!(
            programs[0].interval_formula,
            "Interval changed manually from 120s to 1s"
        );
    }

    #[tokio::test]
    async fn test_overcast_rain_polls_slowly() {
        let harness = TestHarness::new();
        harness.weather.set(Some(
            WeatherBuilder::clear_day(now())
                .condition("Rain")
                .clouds(90)
                .build(),
        ));
        let svc = service(&harness);
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.program_records().is_empty(), 2000).await);
        stop_and_wait(&harness, &svc).await;

        assert_eq!(svc.status().interval_time, 300);
        assert_eq!(
            harness.audit.last_program().unwrap().interval_formula,
            "Daytime - Based on rain with 90% cloud coverage"
        );
    }

    #[tokio::test]
    async fn test_detector_output_reaches_model_record() {
        let harness = TestHarness::new();
        let detector = Arc::new(StubDetector::returning(vec![DetectionBuilder::sun_at(
            330.0, 250.0, 12.0,
        )
        .confidence(0.42)
        .build()]));
        let svc = SchedulerService::new(
            SchedulerConfig::default(),
            harness.location.clone(),
            Collaborators {
                camera: Arc::new(harness.camera.clone()),
                detector: Some(detector.clone()),
                weather: harness.weather.clone(),
                ephemeris: harness.ephemeris.clone(),
                audit: harness.audit.clone(),
                probe: harness.probe.clone(),
            },
            ServiceOptions::default(),
            HealthTracker::new("recording"),
        );
        svc.start().unwrap();

        let audit = harness.audit.clone();
        assert!(harness.wait_for(|| !audit.model_records().is_empty(), 2000).await);
        stop_and_wait(&harness, &svc).await;

        let tracked = &harness.audit.model_records()[0].model_details.detections[0];
        assert_eq!(tracked.detection.confidence, 0.42);
        // center (330, 250) is inside the 295..345 x 215..265 target
        assert_eq!((tracked.dx, tracked.dy), (0.0, 0.0));
        assert_eq!(detector.calls(), 1);
    }

    #[tokio::test]
    async fn test_apply_action_rejects_unknown() {
        let harness = TestHarness::new();
        let svc = service(&harness);
        assert_eq!(
            svc.apply_action("pause"),
            Err(ControlError::InvalidAction("pause".into()))
        );
        assert!(!svc.is_active());
    }
}
