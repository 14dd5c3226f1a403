//! HEALPix nested-scheme pixelisation used to bucket catalog rows.
//!
//! Rows are grouped by the pixel containing their position; a nearest
//! neighbour search then only visits the pixels overlapping a disc around
//! the query point.

use celestial_core::constants::{DEG_TO_RAD, PI, TWOPI};
use celestial_core::math::{angular_separation_deg, normalize_ra_deg};
use std::collections::HashSet;

/// Highest order the index will use (nside = 4096, ~0.86 arcmin pixels).
pub const MAX_ORDER: u32 = 12;

/// Convert (RA, Dec) in degrees to HEALPix nested pixel index.
///
/// Implements the Gorski et al. (2005) algorithm for the nested scheme.
///
/// # Returns
/// Nested pixel index in range [0, 12*nside^2)
pub fn ang2pix_nest(order: u32, ra_deg: f64, dec_deg: f64) -> u64 {
    let phi = normalize_ra_deg(ra_deg) * DEG_TO_RAD;
    let z = libm::sin(dec_deg * DEG_TO_RAD);
    let nside = 1u64 << order;
    let (face, ix, iy) = compute_face_and_position(phi, z, nside);
    let ipix_in_face = xy2pix_nest(ix, iy, order);
    face as u64 * nside * nside + ipix_in_face
}

/// Approximate pixel size in degrees at `order` (square root of the pixel area).
pub fn pixel_size_deg(order: u32) -> f64 {
    // sqrt(4π sr / 12) in degrees is 58.63°
    58.6 / (1u64 << order) as f64
}

/// Expected number of order-`order` pixels covered by a disc of `radius_deg`.
pub fn disc_pixel_count(order: u32, radius_deg: f64) -> f64 {
    let npix = (12u64 << (2 * order)) as f64;
    let fraction = (1.0 - libm::cos(radius_deg.min(180.0) * DEG_TO_RAD)) / 2.0;
    npix * fraction
}

/// Smallest order whose pixel count is at least `count / per_pixel`, capped at [`MAX_ORDER`].
pub fn order_for_density(count: usize, per_pixel: usize) -> u32 {
    let wanted = (count / per_pixel.max(1)).max(1) as u64;
    let mut order = 0;
    while order < MAX_ORDER && 12 * (1u64 << (2 * order)) < wanted {
        order += 1;
    }
    order
}

/// Query all HEALPix pixels that overlap a cone/disc on the sphere.
///
/// Returns a conservative set of pixels - may include some pixels that
/// don't actually overlap the cone, but will never miss pixels that do.
///
/// Samples points within the search cone on a quarter-pixel grid and
/// collects every pixel those points fall into.
pub fn query_disc_nest(order: u32, ra_deg: f64, dec_deg: f64, radius_deg: f64) -> HashSet<u64> {
    let pixel_size_deg = pixel_size_deg(order);
    let step = pixel_size_deg * 0.25;

    let mut pixels = HashSet::new();
    pixels.insert(ang2pix_nest(order, ra_deg, dec_deg));

    // Declination range, padded by one pixel for pixels straddling the boundary
    let dec_min = (dec_deg - radius_deg - pixel_size_deg).max(-90.0);
    let dec_max = (dec_deg + radius_deg + pixel_size_deg).min(90.0);

    let mut dec = dec_min;
    while dec <= dec_max {
        // RA range expands near poles due to convergence
        let cos_dec = libm::cos(dec * PI / 180.0).max(0.01);
        let ra_step = step / cos_dec;

        let ra_range = if libm::fabs(dec) > 89.0 {
            360.0
        } else {
            ((radius_deg + pixel_size_deg) / cos_dec).min(180.0) * 2.0
        };

        let ra_min = ra_deg - ra_range / 2.0;
        let ra_max = ra_deg + ra_range / 2.0;

        let mut ra = ra_min;
        while ra <= ra_max {
            let ra_norm = normalize_ra_deg(ra);
            let dist = angular_separation_deg(ra_deg, dec_deg, ra_norm, dec);
            if dist <= radius_deg + pixel_size_deg {
                pixels.insert(ang2pix_nest(order, ra_norm, dec));
            }
            ra += ra_step;
        }

        dec += step;
    }

    pixels
}

/// Determine which of the 12 HEALPix base faces contains the point,
/// and compute the (ix, iy) position within that face.
fn compute_face_and_position(phi: f64, z: f64, nside: u64) -> (u32, u64, u64) {
    let z_abs = libm::fabs(z);
    let tt = phi_to_tt(phi);
    if z_abs <= 2.0 / 3.0 {
        compute_equatorial_face(tt, z, nside)
    } else {
        compute_polar_face(tt, z, z_abs, nside)
    }
}

/// Convert phi to tt (0..4 range for the 4 quadrants).
fn phi_to_tt(phi: f64) -> f64 {
    let phi_norm = if phi < 0.0 { phi + TWOPI } else { phi };
    phi_norm * 2.0 / PI
}

/// Compute face and position for equatorial belt (-2/3 <= z <= 2/3).
fn compute_equatorial_face(tt: f64, z: f64, nside: u64) -> (u32, u64, u64) {
    let temp1 = nside as f64 * (0.5 + tt);
    let temp2 = nside as f64 * z * 0.75;
    let jp = (temp1 - temp2) as i64;
    let jm = (temp1 + temp2) as i64;
    let nside_i = nside as i64;
    let ifp = jp / nside_i;
    let ifm = jm / nside_i;
    let face = compute_equatorial_face_number(ifp, ifm);
    let ix = jm - (face as i64 % 4) * nside_i;
    let iy = nside_i - 1 - (jp - (face as i64 / 4) * nside_i);
    (face, ix as u64, iy as u64)
}

fn compute_equatorial_face_number(ifp: i64, ifm: i64) -> u32 {
    match (ifp, ifm) {
        (4, _) => ((ifm + 4) % 4) as u32,
        (_, 4) => ((ifp + 4) % 4 + 4) as u32,
        _ if ifp == ifm => (ifp + 4) as u32,
        _ if ifp < ifm => ifp as u32,
        _ => (ifm + 8) as u32,
    }
}

/// Compute face and position for polar caps (|z| > 2/3).
fn compute_polar_face(tt: f64, z: f64, z_abs: f64, nside: u64) -> (u32, u64, u64) {
    let tp = tt - libm::floor(tt);
    let tmp = nside as f64 * libm::sqrt(3.0 * (1.0 - z_abs));
    let jp = (tp * tmp) as i64;
    let jm = ((1.0 - tp) * tmp) as i64;
    let jp = jp.min(nside as i64 - 1);
    let jm = jm.min(nside as i64 - 1);
    let ntt = libm::floor(tt) as u32;
    let face_offset = if z > 0.0 { 0 } else { 8 };
    let face = (ntt % 4) + face_offset;
    let (ix, iy) = if z > 0.0 {
        (nside as i64 - jm - 1, nside as i64 - jp - 1)
    } else {
        (jp, jm)
    };
    (face, ix as u64, iy as u64)
}

/// Convert (ix, iy) to nested pixel index within a base face using Z-order curve.
fn xy2pix_nest(ix: u64, iy: u64, order: u32) -> u64 {
    let mut result: u64 = 0;
    for i in 0..order {
        let bit_x = (ix >> i) & 1;
        let bit_y = (iy >> i) & 1;
        result |= (bit_x << (2 * i)) | (bit_y << (2 * i + 1));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xy2pix_nest() {
        assert_eq!(xy2pix_nest(0, 0, 2), 0);
        assert_eq!(xy2pix_nest(1, 0, 2), 1);
        assert_eq!(xy2pix_nest(0, 1, 2), 2);
        assert_eq!(xy2pix_nest(1, 1, 2), 3);
    }

    #[test]
    fn test_ang2pix_nest_in_range() {
        for order in [0, 3, 8] {
            let npix = 12 * (1u64 << (2 * order));
            for ra in [0.0, 90.0, 180.0, 270.0, 359.9, -10.0] {
                for dec in [-90.0, -89.0, -45.0, 0.0, 45.0, 89.0, 90.0] {
                    let pixel = ang2pix_nest(order, ra, dec);
                    assert!(pixel < npix, "pixel {} >= npix {} for ({}, {})", pixel, npix, ra, dec);
                }
            }
        }
    }

    #[test]
    fn test_negative_ra_same_pixel_as_wrapped() {
        assert_eq!(ang2pix_nest(6, -10.0, 12.0), ang2pix_nest(6, 350.0, 12.0));
    }

    #[test]
    fn test_disc_pixel_count() {
        assert!((disc_pixel_count(3, 180.0) - 768.0).abs() < 1e-9);
        assert!((disc_pixel_count(3, 90.0) - 384.0).abs() < 1e-9);
        assert!(disc_pixel_count(10, 1.0) < disc_pixel_count(10, 2.0));
    }

    #[test]
    fn test_order_for_density() {
        assert_eq!(order_for_density(0, 4), 0);
        assert_eq!(order_for_density(40, 4), 0);
        assert_eq!(order_for_density(2000, 4), 3);
        assert_eq!(order_for_density(usize::MAX, 1), MAX_ORDER);
    }

    #[test]
    fn test_query_disc_contains_center_and_neighbours() {
        let order = 4;
        let pixels = query_disc_nest(order, 0.0, 0.0, 5.0);
        assert!(pixels.contains(&ang2pix_nest(order, 0.0, 0.0)));
        assert!(pixels.contains(&ang2pix_nest(order, 4.0, 2.0)));
        assert!(pixels.contains(&ang2pix_nest(order, 357.0, -3.0)));
    }

    #[test]
    fn test_query_disc_pole() {
        let order = 4;
        let pixels = query_disc_nest(order, 0.0, 90.0, 5.0);
        assert!(pixels.contains(&ang2pix_nest(order, 0.0, 90.0)));
        assert!(pixels.contains(&ang2pix_nest(order, 200.0, 87.0)));
    }
}
