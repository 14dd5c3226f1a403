//! Blank-sky positions around a host for sky-subtraction fibers.
//!
//! Positions are drawn at random inside the host's environs and kept only
//! when no object of any supplied reference catalog lies within the
//! clearance radius.

use crate::criteria::RadiusBound;
use crate::host::Host;
use crate::reference::ReferenceCatalog;
use celestial_catalog::{CatalogError, CatalogResult, SeparationMode, SpatialIndex};
use celestial_core::constants::{ARCSEC_PER_DEG, DEG_TO_RAD, PI, TWOPI};
use celestial_core::math::normalize_ra_deg;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyPositionConfig {
    pub count: usize,
    pub radius: RadiusBound,
    /// Minimum distance to the nearest catalogued object.
    pub clearance_arcsec: f64,
    /// Draws of `count` candidates before giving up.
    pub max_rounds: usize,
    pub seed: Option<u64>,
}

impl Default for SkyPositionConfig {
    fn default() -> Self {
        Self {
            count: 250,
            radius: RadiusBound::Kpc(300.0),
            clearance_arcsec: 15.0,
            max_rounds: 100,
            seed: None,
        }
    }
}

/// `config.count` clear (ra, dec) positions in degrees around `host`.
///
/// Fails with `UnmatchedPosition` when `config.max_rounds` draws do not
/// produce enough clear positions.
pub fn select_sky_positions(
    host: &Host,
    references: &[&ReferenceCatalog],
    config: &SkyPositionConfig,
) -> CatalogResult<Vec<(f64, f64)>> {
    match config.seed {
        Some(seed) => select_sky_positions_with_rng(host, references, config, &mut StdRng::seed_from_u64(seed)),
        None => select_sky_positions_with_rng(host, references, config, &mut rand::rng()),
    }
}

/// [`select_sky_positions`] with a caller-supplied generator.
pub fn select_sky_positions_with_rng<R: Rng + ?Sized>(
    host: &Host,
    references: &[&ReferenceCatalog],
    config: &SkyPositionConfig,
    rng: &mut R,
) -> CatalogResult<Vec<(f64, f64)>> {
    let radius = config.radius.to_degrees(host, "sky", "radius")?;
    if config.clearance_arcsec.is_nan() || config.clearance_arcsec < 0.0 {
        return Err(CatalogError::invalid_cut(
            "sky",
            "clearance_arcsec",
            &format!("clearance {} must not be negative", config.clearance_arcsec),
        ));
    }
    let clearance = config.clearance_arcsec / ARCSEC_PER_DEG;
    let cos_dec = libm::cos(host.dec * DEG_TO_RAD);
    if cos_dec <= 0.0 {
        return Err(CatalogError::invalid_cut(
            "sky",
            "host",
            &format!("cannot place sky positions around a pole (dec {})", host.dec),
        ));
    }

    let indexes = references
        .iter()
        .map(|r| SpatialIndex::build(r.catalog(), r.fields(), SeparationMode::Exact))
        .collect::<CatalogResult<Vec<_>>>()?;

    let mut positions = Vec::with_capacity(config.count);
    let mut rounds = 0;
    while positions.len() < config.count {
        if rounds == config.max_rounds {
            return Err(CatalogError::unmatched_position(
                "sky positions",
                &format!(
                    "only {} of {} clear positions after {} rounds around '{}'",
                    positions.len(),
                    config.count,
                    rounds,
                    host.name
                ),
            ));
        }
        rounds += 1;
        for _ in 0..config.count {
            // Offsets concentrate towards the host: r = R * 2 acos(u) / pi.
            let offset = radius * 2.0 * libm::acos(rng.random::<f64>()) / PI;
            let theta = TWOPI * rng.random::<f64>();
            let dec = host.dec + offset * libm::cos(theta);
            if dec.abs() > 90.0 {
                continue;
            }
            let ra = normalize_ra_deg(host.ra + offset * libm::sin(theta) / cos_dec);
            let clear = indexes
                .iter()
                .all(|index| index.nearest(ra, dec).separation_deg > clearance);
            if clear {
                positions.push((ra, dec));
            }
        }
    }
    positions.truncate(config.count);
    debug!(host = %host.name, positions = positions.len(), rounds, "sky positions");
    Ok(positions)
}
