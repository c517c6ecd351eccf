//! Solar ephemeris and motion estimation
//!
//! `SunCalc` is the usual low-precision solar position model (good to a
//! fraction of a degree), enough to decide how fast the sun drifts in frame.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use time::OffsetDateTime;

const RAD: f64 = PI / 180.0;
const J1970: f64 = 2_440_588.0;
const J2000: f64 = 2_451_545.0;
const SECONDS_PER_DAY: f64 = 86_400.0;
/// Obliquity of the ecliptic
const OBLIQUITY: f64 = RAD * 23.4397;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EphemerisError {
    #[error("invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },
    #[error("ephemeris unavailable: {0}")]
    Unavailable(String),
}

/// Sun position in radians. Azimuth is measured from south, westward positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolarPosition {
    pub azimuth: f64,
    pub altitude: f64,
}

pub trait Ephemeris: Send + Sync {
    fn position(&self, at: OffsetDateTime, lat: f64, lon: f64)
        -> Result<SolarPosition, EphemerisError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SunCalc;

impl Ephemeris for SunCalc {
    fn position(
        &self,
        at: OffsetDateTime,
        lat: f64,
        lon: f64,
    ) -> Result<SolarPosition, EphemerisError> {
        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(EphemerisError::InvalidCoordinates { lat, lon });
        }

        let lw = RAD * -lon;
        let phi = RAD * lat;
        let d = days_since_j2000(at);

        let m = solar_mean_anomaly(d);
        let l = ecliptic_longitude(m);
        let dec = declination(l, 0.0);
        let ra = right_ascension(l, 0.0);
        let h = sidereal_time(d, lw) - ra;

        Ok(SolarPosition {
            azimuth: h.sin().atan2(h.cos() * phi.sin() - dec.tan() * phi.cos()),
            altitude: (phi.sin() * dec.sin() + phi.cos() * dec.cos() * h.cos()).asin(),
        })
    }
}

fn days_since_j2000(at: OffsetDateTime) -> f64 {
    let secs = at.unix_timestamp_nanos() as f64 / 1e9;
    secs / SECONDS_PER_DAY - 0.5 + J1970 - J2000
}

fn solar_mean_anomaly(d: f64) -> f64 {
    RAD * (357.5291 + 0.985_600_28 * d)
}

fn ecliptic_longitude(m: f64) -> f64 {
    let center = RAD * (1.9148 * m.sin() + 0.02 * (2.0 * m).sin() + 0.0003 * (3.0 * m).sin());
    let perihelion = RAD * 102.9372;
    m + center + perihelion + PI
}

fn declination(l: f64, b: f64) -> f64 {
    (b.sin() * OBLIQUITY.cos() + b.cos() * OBLIQUITY.sin() * l.sin()).asin()
}

fn right_ascension(l: f64, b: f64) -> f64 {
    (l.sin() * OBLIQUITY.cos() - b.tan() * OBLIQUITY.sin()).atan2(l.cos())
}

fn sidereal_time(d: f64, lw: f64) -> f64 {
    RAD * (280.16 + 360.985_623_5 * d) - lw
}

/// Wraps an angle difference into [-PI, PI]
fn wrap_delta(delta: f64) -> f64 {
    let wrapped = (delta + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

/// Combined azimuth/altitude displacement of the sun between `t1` and `t2`, in degrees.
///
/// Treats azimuth and altitude as planar coordinates, which is coarse but
/// sufficient for interval selection.
pub fn angular_motion(
    ephemeris: &dyn Ephemeris,
    lat: f64,
    lon: f64,
    t1: OffsetDateTime,
    t2: OffsetDateTime,
) -> Result<f64, EphemerisError> {
    let p1 = ephemeris.position(t1, lat, lon)?;
    let p2 = ephemeris.position(t2, lat, lon)?;
    let d_az = wrap_delta(p2.azimuth - p1.azimuth);
    let d_alt = p2.altitude - p1.altitude;
    Ok(d_az.hypot(d_alt).to_degrees())
}
