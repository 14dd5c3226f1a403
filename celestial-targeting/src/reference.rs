//! External reference catalogs used for cross-reference exclusion.
//!
//! A reference catalog carries the rectangular sky region it covers so the
//! pipeline can skip the positional match when the selection and the
//! reference do not overlap. Catalogs are loaded at most once per run through
//! a [`ReferenceCache`] owned by the caller.

use celestial_catalog::{Catalog, CatalogError, CatalogResult, CoordinateFields};
use celestial_core::constants::DEG_TO_RAD;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// RA/Dec rectangle in degrees with `ra_min <= ra_max`. A padded box may run
/// below 0 or past 360; containment and overlap fold RA back onto the circle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
}

impl BoundingBox {
    pub fn new(ra_min: f64, ra_max: f64, dec_min: f64, dec_max: f64) -> CatalogResult<Self> {
        let valid = [ra_min, ra_max, dec_min, dec_max].iter().all(|v| v.is_finite())
            && ra_min <= ra_max
            && dec_min <= dec_max;
        if !valid {
            return Err(CatalogError::unresolved_overlap(
                "overrides",
                &format!(
                    "invalid reference coordinate range ra [{}, {}], dec [{}, {}]",
                    ra_min, ra_max, dec_min, dec_max
                ),
            ));
        }
        Ok(Self {
            ra_min,
            ra_max,
            dec_min,
            dec_max,
        })
    }

    /// Smallest box containing every point; `None` for no points.
    pub fn enclosing(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        points.into_iter().fold(None, |acc, (ra, dec)| {
            Some(match acc {
                None => Self {
                    ra_min: ra,
                    ra_max: ra,
                    dec_min: dec,
                    dec_max: dec,
                },
                Some(b) => Self {
                    ra_min: b.ra_min.min(ra),
                    ra_max: b.ra_max.max(ra),
                    dec_min: b.dec_min.min(dec),
                    dec_max: b.dec_max.max(dec),
                },
            })
        })
    }

    /// RA coverage folded into `[0, 360]`, split in two where it crosses 0.
    fn ra_segments(&self) -> Vec<(f64, f64)> {
        let width = self.ra_max - self.ra_min;
        if width >= 360.0 {
            return vec![(0.0, 360.0)];
        }
        let lo = self.ra_min.rem_euclid(360.0);
        let hi = lo + width;
        if hi > 360.0 {
            vec![(lo, 360.0), (0.0, hi - 360.0)]
        } else {
            vec![(lo, hi)]
        }
    }

    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        let ra = ra.rem_euclid(360.0);
        (self.dec_min..=self.dec_max).contains(&dec)
            && self.ra_segments().iter().any(|&(lo, hi)| lo <= ra && ra <= hi)
    }

    /// RA is compared modulo 360, so a box running past 360 meets one near 0.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        if self.dec_min > other.dec_max || other.dec_min > self.dec_max {
            return false;
        }
        let theirs = other.ra_segments();
        self.ra_segments()
            .iter()
            .any(|&(lo, hi)| theirs.iter().any(|&(olo, ohi)| lo <= ohi && olo <= hi))
    }

    /// Box grown by the angle `margin_deg` on every side.
    ///
    /// The RA margin is stretched by `1 / cos δ` at the edge furthest from
    /// the equator; a box that reaches a pole covers every RA.
    pub fn padded(&self, margin_deg: f64) -> Self {
        let dec_min = (self.dec_min - margin_deg).max(-90.0);
        let dec_max = (self.dec_max + margin_deg).min(90.0);
        let cos_dec = libm::cos(dec_min.abs().max(dec_max.abs()) * DEG_TO_RAD);
        let ra_margin = if cos_dec > 0.0 { margin_deg / cos_dec } else { f64::INFINITY };
        let (ra_min, ra_max) = if self.ra_max - self.ra_min + 2.0 * ra_margin >= 360.0 {
            (0.0, 360.0)
        } else {
            (self.ra_min - ra_margin, self.ra_max + ra_margin)
        };
        Self {
            ra_min,
            ra_max,
            dec_min,
            dec_max,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceCatalog {
    name: String,
    catalog: Catalog,
    fields: CoordinateFields,
    bounds: BoundingBox,
}

impl ReferenceCatalog {
    /// Wraps `catalog`, deriving its coverage from the positions it holds.
    ///
    /// Fails with `UnresolvedOverlapReference` if no row has coordinates.
    pub fn new(name: &str, catalog: Catalog, fields: CoordinateFields) -> CatalogResult<Self> {
        let coords = catalog.coordinates(&fields)?;
        let bounds = BoundingBox::enclosing(coords.into_iter().flatten()).ok_or_else(|| {
            CatalogError::unresolved_overlap(
                "overrides",
                &format!("reference catalog '{}' has no positions to derive its coverage", name),
            )
        })?;
        Ok(Self {
            name: name.to_string(),
            catalog,
            fields,
            bounds,
        })
    }

    /// Replaces the derived coverage with a declared one.
    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn fields(&self) -> &CoordinateFields {
        &self.fields
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }
}

/// Process-scoped store of reference catalogs, keyed by name.
///
/// Created once per run and passed to whatever needs reference data; entries
/// are immutable once loaded.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    entries: HashMap<String, Arc<ReferenceCatalog>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached catalog, calling `load` only on the first request.
    pub fn get_or_load<F>(&mut self, name: &str, load: F) -> CatalogResult<Arc<ReferenceCatalog>>
    where
        F: FnOnce() -> CatalogResult<ReferenceCatalog>,
    {
        if let Some(existing) = self.entries.get(name) {
            return Ok(Arc::clone(existing));
        }
        let loaded = Arc::new(load()?);
        debug!(name, rows = loaded.catalog().len(), "loaded reference catalog");
        self.entries.insert(name.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ReferenceCatalog>> {
        self.entries.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
