/*!
# Suntrack DevKit - test doubles for the poll loop collaborators

Lets the kernel be exercised without a camera, a detector, network access
or an audit backend:
- Scripted stubs for every trait in `suntrack_core::ports`
- Fixture builders for weather snapshots and detections
- A harness bundling the stubs with record expectations
*/

pub mod fixtures;
pub mod stubs;
pub mod test_utils;

pub use fixtures::{DetectionBuilder, WeatherBuilder};
pub use stubs::{
    CameraProbe, FailingEphemeris, FixedProbe, LinearEphemeris, RecordingAuditSink,
    ScriptedWeather, StaticGeolocator, StubCamera, StubDetector,
};
pub use test_utils::TestHarness;
