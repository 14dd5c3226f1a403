//! Spherical separations on the celestial sphere.
//!
//! Two flavours are provided. [`angular_separation_deg`] is exact at every
//! separation (Vincenty formula, stable at 0° and 180°). [`projected_separation_deg`]
//! is the flat-sky approximation `sqrt((Δα cos δ)² + Δδ²)`, good to well under an
//! arcsecond for separations below a few degrees away from the poles.

use crate::constants::{DEG_TO_RAD, RAD_TO_DEG};

#[inline]
pub fn vincenty_angular_separation(
    sin_lat1: f64,
    cos_lat1: f64,
    sin_lat2: f64,
    cos_lat2: f64,
    delta_lon: f64,
) -> f64 {
    let (sin_delta_lon, cos_delta_lon) = libm::sincos(delta_lon);

    let num = libm::sqrt(
        (cos_lat2 * sin_delta_lon).powi(2)
            + (cos_lat1 * sin_lat2 - sin_lat1 * cos_lat2 * cos_delta_lon).powi(2),
    );
    let den = sin_lat1 * sin_lat2 + cos_lat1 * cos_lat2 * cos_delta_lon;

    libm::atan2(num, den)
}

/// Exact angular distance between two (RA, Dec) positions, all in degrees.
pub fn angular_separation_deg(ra1_deg: f64, dec1_deg: f64, ra2_deg: f64, dec2_deg: f64) -> f64 {
    let (d1_sin, d1_cos) = libm::sincos(dec1_deg * DEG_TO_RAD);
    let (d2_sin, d2_cos) = libm::sincos(dec2_deg * DEG_TO_RAD);
    let delta_lon = (ra2_deg - ra1_deg) * DEG_TO_RAD;

    vincenty_angular_separation(d1_sin, d1_cos, d2_sin, d2_cos, delta_lon) * RAD_TO_DEG
}

/// Flat-sky angular distance in degrees, with the RA offset scaled by cos(δ₁).
///
/// The first position is the reference (e.g. a field center); its declination
/// sets the cos(δ) correction.
pub fn projected_separation_deg(ra1_deg: f64, dec1_deg: f64, ra2_deg: f64, dec2_deg: f64) -> f64 {
    let cos_dec = libm::cos(dec1_deg * DEG_TO_RAD);
    let dra = wrap_delta_ra_deg(ra2_deg - ra1_deg) * cos_dec;
    let ddec = dec2_deg - dec1_deg;
    libm::sqrt(dra * dra + ddec * ddec)
}

/// Wrap an RA difference into [-180°, 180°).
#[inline]
pub fn wrap_delta_ra_deg(delta_deg: f64) -> f64 {
    let wrapped = libm::fmod(delta_deg + 180.0, 360.0);
    if wrapped < 0.0 {
        wrapped + 180.0
    } else {
        wrapped - 180.0
    }
}

/// Normalize an RA into [0°, 360°).
#[inline]
pub fn normalize_ra_deg(ra_deg: f64) -> f64 {
    let r = libm::fmod(ra_deg, 360.0);
    if r < 0.0 {
        r + 360.0
    } else {
        r
    }
}
