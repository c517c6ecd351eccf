//! Suntrack core - the pure decision logic of the sun-tracking pipeline
//!
//! Provides:
//! - Offset geometry between a detected sun and the on-screen target region
//! - Solar motion estimation from ephemeris positions
//! - Adaptive poll scheduling (motion-based and weather-based policies)
//! - Collaborator traits implemented by the kernel (camera, detector, weather...)

pub mod ephemeris;
pub mod geometry;
pub mod models;
pub mod ports;
pub mod scheduler;

pub use ephemeris::{angular_motion, Ephemeris, EphemerisError, SolarPosition, SunCalc};
pub use geometry::{offset, track, GeometryError, Point, TargetRegion};
pub use models::{
    BoundingBox, Detection, Frame, GeoLocation, HostMetrics, ModelDetails, ModelRecord,
    ProgramRecord, TrackedDetection, WeatherSnapshot, SUN_CLASS_ID,
};
pub use scheduler::{
    IntervalDecision, IntervalFormula, IntervalScheduler, OverrideError, PollPhase, PollState,
    SchedulePolicy, SchedulerConfig,
};
