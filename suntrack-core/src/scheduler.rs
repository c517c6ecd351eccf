//! Adaptive poll scheduling
//!
//! Decides how long to wait before the next capture/detect cycle:
//! - `Motion` policy: fast sun drift means short intervals (ephemeris only)
//! - `Weather` policy: day/night from sunrise/sunset, then cloud cover
//! Any missing input falls back to `default_interval_secs` instead of failing.

use crate::ephemeris::{angular_motion, Ephemeris};
use crate::models::{GeoLocation, WeatherSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

const FAST_INTERVAL_SECS: u64 = 60;
const MEDIUM_INTERVAL_SECS: u64 = 180;
const SLOW_INTERVAL_SECS: u64 = 300;

const FAST_MOTION_DEG: f64 = 1.0;
const MEDIUM_MOTION_DEG: f64 = 0.5;

const CLEAR_CLOUD_PCT: u8 = 20;
const PARTLY_CLOUDY_PCT: u8 = 70;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulePolicy {
    /// Angular sun motion over a short window, no weather dependency
    Motion,
    /// Sunrise/sunset and cloud cover from the weather provider
    #[default]
    Weather,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub policy: SchedulePolicy,
    /// Used whenever weather or ephemeris data is unavailable
    pub default_interval_secs: u64,
    /// Longest wait while the sun is down
    pub night_cap_secs: u64,
    /// Hard ceiling for any interval, manual overrides included
    pub max_interval_secs: u64,
    /// Look-ahead window of the motion policy
    pub motion_window_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: SchedulePolicy::Weather,
            default_interval_secs: 120,
            night_cap_secs: 3600,
            max_interval_secs: 86_400,
            motion_window_secs: 300,
        }
    }
}

/// Which branch produced an interval, kept for the audit trail
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntervalFormula {
    Motion { degrees: f64, window_secs: u64 },
    Night { seconds_until_sunrise: i64 },
    Daytime { condition: String, cloud_coverage: u8 },
    Fallback { reason: String },
    Manual { from: u64, to: u64 },
}

impl fmt::Display for IntervalFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Motion { degrees, window_secs } => write!(
                f,
                "Sun motion - {degrees:.3} deg over the next {window_secs}s"
            ),
            Self::Night { seconds_until_sunrise } => write!(
                f,
                "Nighttime - sun is set, waiting until sunrise ({seconds_until_sunrise}s away)"
            ),
            Self::Daytime { condition, cloud_coverage } => write!(
                f,
                "Daytime - Based on {condition} with {cloud_coverage}% cloud coverage"
            ),
            Self::Fallback { reason } => write!(f, "Default interval - {reason}"),
            Self::Manual { from, to } => {
                write!(f, "Interval changed manually from {from}s to {to}s")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalDecision {
    pub interval_secs: u64,
    /// Epoch seconds
    pub next_poll_at: i64,
    pub formula: IntervalFormula,
}

#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    config: SchedulerConfig,
}

impl IntervalScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn policy(&self) -> SchedulePolicy {
        self.config.policy
    }

    /// Motion policy: > 1 deg over the window -> 60s, > 0.5 deg -> 180s, else 300s
    pub fn motion_interval(
        &self,
        ephemeris: &dyn Ephemeris,
        location: &GeoLocation,
        now: OffsetDateTime,
    ) -> IntervalDecision {
        let window = self.config.motion_window_secs;
        let later = now + Duration::seconds(window as i64);
        let degrees = match angular_motion(
            ephemeris,
            location.latitude,
            location.longitude,
            now,
            later,
        ) {
            Ok(deg) => deg,
            Err(e) => {
                warn!("ephemeris unavailable, using default interval: {e}");
                return self.fallback(now.unix_timestamp(), format!("ephemeris unavailable: {e}"));
            }
        };

        let interval = if degrees > FAST_MOTION_DEG {
            FAST_INTERVAL_SECS
        } else if degrees > MEDIUM_MOTION_DEG {
            MEDIUM_INTERVAL_SECS
        } else {
            SLOW_INTERVAL_SECS
        };
        debug!("sun motion {degrees:.3} deg over {window}s -> {interval}s");

        self.decision(
            now.unix_timestamp(),
            interval,
            IntervalFormula::Motion {
                degrees,
                window_secs: window,
            },
        )
    }

    /// Weather policy. `now` is epoch seconds.
    ///
    /// Night is `now > sunset || now < sunrise`, taken from the snapshot as-is.
    /// Near midnight the snapshot may describe the previous day; that case is
    /// not corrected here.
    pub fn weather_interval(
        &self,
        weather: Option<&WeatherSnapshot>,
        now: i64,
    ) -> IntervalDecision {
        let Some(weather) = weather else {
            return self.fallback(now, "weather data unavailable".into());
        };

        let is_night = now > weather.sunset || now < weather.sunrise;
        if is_night {
            let until_sunrise = if now < weather.sunrise {
                weather.sunrise - now
            } else {
                weather.sunrise + SECONDS_PER_DAY - now
            };
            if until_sunrise <= 0 {
                return self.fallback(now, "weather snapshot is more than a day old".into());
            }
            let interval = (until_sunrise as u64).min(self.config.night_cap_secs);
            debug!("night, sunrise in {until_sunrise}s -> {interval}s");
            return self.decision(
                now,
                interval,
                IntervalFormula::Night {
                    seconds_until_sunrise: until_sunrise,
                },
            );
        }

        let condition = weather.condition.to_lowercase();
        let clouds = weather.cloud_coverage_pct;
        let interval = if condition.contains("clear") || clouds < CLEAR_CLOUD_PCT {
            FAST_INTERVAL_SECS
        } else if condition.contains("cloud") || clouds < PARTLY_CLOUDY_PCT {
            MEDIUM_INTERVAL_SECS
        } else {
            SLOW_INTERVAL_SECS
        };
        debug!("day, {condition} with {clouds}% clouds -> {interval}s");

        self.decision(
            now,
            interval,
            IntervalFormula::Daytime {
                condition,
                cloud_coverage: clouds,
            },
        )
    }

    pub fn fallback(&self, now: i64, reason: String) -> IntervalDecision {
        self.decision(
            now,
            self.config.default_interval_secs,
            IntervalFormula::Fallback { reason },
        )
    }

    fn decision(&self, now: i64, interval: u64, formula: IntervalFormula) -> IntervalDecision {
        let interval_secs = self.bound(interval);
        IntervalDecision {
            interval_secs,
            next_poll_at: now + interval_secs as i64,
            formula,
        }
    }

    fn bound(&self, secs: u64) -> u64 {
        secs.clamp(1, self.config.max_interval_secs.max(1))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OverrideError {
    #[error("interval must be a positive integer, got {0}")]
    NotPositive(i64),
    #[error("interval {requested}s exceeds the maximum of {max}s")]
    TooLarge { requested: i64, max: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollPhase {
    /// No interval computed yet, poll immediately
    Idle,
    /// Waiting for `next_poll_at`
    Armed,
}

/// Poll timing owned by the scheduler service.
///
/// Invariant: once a poll has been recorded, `next_poll_at == last_poll_at + interval_seconds`
/// until a manual override re-arms from "now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollState {
    interval_seconds: u64,
    next_poll_at: Option<i64>,
    last_poll_at: Option<i64>,
}

impl PollState {
    pub fn new(initial_interval_secs: u64) -> Self {
        Self {
            interval_seconds: initial_interval_secs.max(1),
            next_poll_at: None,
            last_poll_at: None,
        }
    }

    pub fn phase(&self) -> PollPhase {
        if self.next_poll_at.is_some() {
            PollPhase::Armed
        } else {
            PollPhase::Idle
        }
    }

    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }

    pub fn next_poll_at(&self) -> Option<i64> {
        self.next_poll_at
    }

    pub fn last_poll_at(&self) -> Option<i64> {
        self.last_poll_at
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.next_poll_at.map_or(true, |next| now >= next)
    }

    /// Arms from a decision that followed a poll at `polled_at`
    pub fn record_poll(&mut self, polled_at: i64, decision: &IntervalDecision) {
        self.last_poll_at = Some(polled_at);
        self.interval_seconds = decision.interval_secs;
        self.next_poll_at = Some(polled_at + decision.interval_secs as i64);
    }

    /// Arms without a poll (e.g. the first decision of a session)
    pub fn arm(&mut self, decision: &IntervalDecision) {
        self.interval_seconds = decision.interval_secs;
        self.next_poll_at = Some(decision.next_poll_at);
    }

    /// Forces the interval, bypassing both policies, and re-arms from `now`
    pub fn override_interval(
        &mut self,
        requested: i64,
        now: i64,
        max_interval_secs: u64,
    ) -> Result<IntervalDecision, OverrideError> {
        if requested <= 0 {
            return Err(OverrideError::NotPositive(requested));
        }
        if requested as u64 > max_interval_secs {
            return Err(OverrideError::TooLarge {
                requested,
                max: max_interval_secs,
            });
        }
        let from = self.interval_seconds;
        let decision = IntervalDecision {
            interval_secs: requested as u64,
            next_poll_at: now + requested,
            formula: IntervalFormula::Manual {
                from,
                to: requested as u64,
            },
        };
        self.arm(&decision);
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ephemeris::{EphemerisError, SolarPosition, SunCalc};
    use time::macros::datetime;

    const T0: i64 = 1_718_000_000;

    /// Altitude grows linearly, so motion over the window is exactly `degrees`
    struct LinearSun {
        degrees_per_window: f64,
        window_secs: f64,
    }

    impl Ephemeris for LinearSun {
        fn position(&self, at: OffsetDateTime, _: f64, _: f64) -> Result<SolarPosition, EphemerisError> {
            let t = (at.unix_timestamp() - T0) as f64;
            Ok(SolarPosition {
                azimuth: 0.0,
                altitude: (self.degrees_per_window * t / self.window_secs).to_radians(),
            })
        }
    }

    struct BrokenEphemeris;

    impl Ephemeris for BrokenEphemeris {
        fn position(&self, _: OffsetDateTime, _: f64, _: f64) -> Result<SolarPosition, EphemerisError> {
            Err(EphemerisError::Unavailable("offline".into()))
        }
    }

    fn scheduler() -> IntervalScheduler {
        IntervalScheduler::new(SchedulerConfig::default())
    }

    fn sf() -> GeoLocation {
        GeoLocation::new(37.7749, -122.4194)
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(T0).unwrap()
    }

    fn weather(condition: &str, clouds: u8, sunrise: i64, sunset: i64) -> WeatherSnapshot {
        WeatherSnapshot {
            condition: condition.into(),
            description: String::new(),
            temperature: 290.0,
            cloud_coverage_pct: clouds,
            wind_speed: 1.0,
            sunrise,
            sunset,
            captured_at: datetime!(2024-06-10 06:00 UTC),
        }
    }

    fn motion(degrees: f64) -> IntervalDecision {
        let eph = LinearSun {
            degrees_per_window: degrees,
            window_secs: 300.0,
        };
        scheduler().motion_interval(&eph, &sf(), now())
    }

    #[test]
    fn test_motion_policy_thresholds() {
        assert_eq!(motion(1.5).interval_secs, 60);
        assert_eq!(motion(0.7).interval_secs, 180);
        assert_eq!(motion(0.3).interval_secs, 300);
    }

    #[test]
    fn test_motion_policy_boundaries_are_strict() {
        assert_eq!(motion(1.0).interval_secs, 180);
        assert_eq!(motion(0.5).interval_secs, 300);
    }

    #[test]
    fn test_motion_policy_formula_and_next_poll() {
        let d = motion(1.5);
        assert_eq!(d.next_poll_at, T0 + 60);
        match d.formula {
            IntervalFormula::Motion { degrees, window_secs } => {
                assert!((degrees - 1.5).abs() < 1e-9);
                assert_eq!(window_secs, 300);
            }
            other => panic!("unexpected formula {other:?}"),
        }
    }

    #[test]
    fn test_motion_policy_with_suncalc_morning() {
        // 09:00 local in San Francisco around the solstice, the sun climbs fast
        let at = datetime!(2024-06-21 16:00 UTC);
        let d = scheduler().motion_interval(&SunCalc, &sf(), at);
        assert_eq!(d.interval_secs, 60);
    }

    #[test]
    fn test_motion_policy_falls_back_on_ephemeris_error() {
        let d = scheduler().motion_interval(&BrokenEphemeris, &sf(), now());
        assert_eq!(d.interval_secs, 120);
        assert!(matches!(d.formula, IntervalFormula::Fallback { .. }));
    }

    #[test]
    fn test_weather_policy_day_conditions() {
        let s = scheduler();
        let day = T0 + 20_000;
        let sunset = T0 + 40_000;
        assert_eq!(s.weather_interval(Some(&weather("Clear", 10, T0, sunset)), day).interval_secs, 60);
        assert_eq!(s.weather_interval(Some(&weather("Clouds", 50, T0, sunset)), day).interval_secs, 180);
        assert_eq!(s.weather_interval(Some(&weather("Rain", 90, T0, sunset)), day).interval_secs, 300);
    }

    #[test]
    fn test_weather_policy_cloud_percentages_override_condition() {
        let s = scheduler();
        let day = T0 + 20_000;
        let sunset = T0 + 40_000;
        assert_eq!(s.weather_interval(Some(&weather("Rain", 15, T0, sunset)), day).interval_secs, 60);
        assert_eq!(s.weather_interval(Some(&weather("Mist", 69, T0, sunset)), day).interval_secs, 180);
        assert_eq!(s.weather_interval(Some(&weather("Clouds", 100, T0, sunset)), day).interval_secs, 180);
    }

    #[test]
    fn test_weather_policy_daytime_scenario() {
        let snap = weather("Clear", 5, T0, T0 + 40_000);
        let now = T0 + 20_000;
        let d = scheduler().weather_interval(Some(&snap), now);
        assert_eq!(d.interval_secs, 60);
        assert_eq!(d.next_poll_at, now + 60);
        assert_eq!(
            d.formula.to_string(),
            "Daytime - Based on clear with 5% cloud coverage"
        );
    }

    #[test]
    fn test_weather_policy_before_sunrise() {
        let snap = weather("Clear", 5, T0, T0 + 40_000);
        let d = scheduler().weather_interval(Some(&snap), T0 - 1000);
        assert_eq!(d.interval_secs, 1000);
        assert_eq!(
            d.formula,
            IntervalFormula::Night {
                seconds_until_sunrise: 1000
            }
        );
    }

    #[test]
    fn test_weather_policy_night_cap() {
        let s = scheduler();
        let snap = weather("Clear", 5, T0, T0 + 40_000);
        assert_eq!(s.weather_interval(Some(&snap), T0 - 3600).interval_secs, 3600);
        assert_eq!(s.weather_interval(Some(&snap), T0 - 20_000).interval_secs, 3600);
        assert_eq!(s.weather_interval(Some(&snap), T0 - 120).interval_secs, 120);
    }

    #[test]
    fn test_weather_policy_after_sunset_uses_next_day_sunrise() {
        let snap = weather("Clear", 5, T0, T0 + 40_000);
        // 300s before tomorrow's assumed sunrise
        let now = T0 + 86_400 - 300;
        let d = scheduler().weather_interval(Some(&snap), now);
        assert_eq!(d.interval_secs, 300);
        assert!(matches!(d.formula, IntervalFormula::Night { .. }));
    }

    #[test]
    fn test_weather_policy_stale_snapshot_falls_back() {
        let snap = weather("Clear", 5, T0, T0 + 40_000);
        let d = scheduler().weather_interval(Some(&snap), T0 + 3 * 86_400);
        assert_eq!(d.interval_secs, 120);
        assert!(matches!(d.formula, IntervalFormula::Fallback { .. }));
    }

    #[test]
    fn test_weather_policy_without_snapshot_falls_back() {
        let d = scheduler().weather_interval(None, T0);
        assert_eq!(d.interval_secs, 120);
        assert_eq!(d.next_poll_at, T0 + 120);
        assert_eq!(d.formula.to_string(), "Default interval - weather data unavailable");
    }

    #[test]
    fn test_max_interval_bounds_decisions() {
        let s = IntervalScheduler::new(SchedulerConfig {
            max_interval_secs: 600,
            ..SchedulerConfig::default()
        });
        let snap = weather("Clear", 5, T0, T0 + 40_000);
        assert_eq!(s.weather_interval(Some(&snap), T0 - 2000).interval_secs, 600);
    }

    #[test]
    fn test_poll_state_lifecycle() {
        let mut state = PollState::new(120);
        assert_eq!(state.phase(), PollPhase::Idle);
        assert!(state.is_due(T0));

        let d = scheduler().weather_interval(None, T0);
        state.record_poll(T0, &d);
        assert_eq!(state.phase(), PollPhase::Armed);
        assert_eq!(state.last_poll_at(), Some(T0));
        assert_eq!(state.next_poll_at(), Some(T0 + 120));
        assert!(!state.is_due(T0 + 119));
        assert!(state.is_due(T0 + 120));

        let snap = weather("Clear", 5, T0, T0 + 40_000);
        let d = scheduler().weather_interval(Some(&snap), T0 + 120);
        state.record_poll(T0 + 120, &d);
        assert_eq!(state.phase(), PollPhase::Armed);
        assert_eq!(
            state.next_poll_at(),
            state.last_poll_at().map(|t| t + state.interval_seconds() as i64)
        );
    }

    #[test]
    fn test_manual_override() {
        let mut state = PollState::new(120);
        let d = state.override_interval(30, T0, 86_400).unwrap();
        assert_eq!(d.formula.to_string(), "Interval changed manually from 120s to 30s");
        assert_eq!(state.interval_seconds(), 30);
        assert_eq!(state.next_poll_at(), Some(T0 + 30));
        assert_eq!(state.last_poll_at(), None);
        assert_eq!(state.phase(), PollPhase::Armed);
    }

    #[test]
    fn test_manual_override_rejections_leave_state_untouched() {
        let mut state = PollState::new(120);
        let before = state.clone();
        assert_eq!(state.override_interval(0, T0, 86_400), Err(OverrideError::NotPositive(0)));
        assert_eq!(state.override_interval(-5, T0, 86_400), Err(OverrideError::NotPositive(-5)));
        assert_eq!(
            state.override_interval(90_000, T0, 86_400),
            Err(OverrideError::TooLarge { requested: 90_000, max: 86_400 })
        );
        assert_eq!(state, before);
    }
}
