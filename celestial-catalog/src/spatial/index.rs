//! Nearest-neighbour matching of catalog positions on the sphere.
//!
//! [`SpatialIndex`] buckets the indexed rows by HEALPix pixel. A query first
//! looks at the pixels overlapping a small disc around the query position and
//! doubles the disc until every row that could beat the best candidate lies
//! inside it. Small catalogs, and discs that would cover more pixels than
//! there are rows, are scanned exhaustively instead.
//!
//! The matcher never applies a tolerance: every query gets its nearest row,
//! however far away. Rejecting distant matches is up to the caller.

use super::healpix::{ang2pix_nest, disc_pixel_count, order_for_density, pixel_size_deg, query_disc_nest};
use crate::error::{CatalogError, CatalogResult};
use crate::record::{Catalog, CoordinateFields};
use celestial_core::constants::DEG_TO_RAD;
use celestial_core::math::{angular_separation_deg, projected_separation_deg};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Below this many rows every query is answered by a full scan.
const BRUTE_FORCE_LIMIT: usize = 256;

/// Disc radius (degrees) beyond which a full scan is cheaper than the pixel query.
const MAX_DISC_RADIUS_DEG: f64 = 30.0;

/// Target mean number of indexed rows per HEALPix pixel.
const ROWS_PER_PIXEL: usize = 4;

/// How angular separations are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparationMode {
    /// Great-circle distance (Vincenty), exact at all separations.
    #[default]
    Exact,
    /// Flat-sky `sqrt((Δα cos δ)² + Δδ²)` using the query declination.
    /// Only meaningful for separations below a few degrees.
    Projected,
}

impl SeparationMode {
    pub fn separation_deg(self, ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
        match self {
            Self::Exact => angular_separation_deg(ra1, dec1, ra2, dec2),
            Self::Projected => projected_separation_deg(ra1, dec1, ra2, dec2),
        }
    }
}

/// Nearest indexed row for one query position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Row index in the indexed catalog.
    pub row: usize,
    pub separation_deg: f64,
}

impl Match {
    pub fn separation_arcsec(&self) -> f64 {
        self.separation_deg * 3600.0
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    row: usize,
    ra: f64,
    dec: f64,
}

#[derive(Debug, Clone)]
pub struct SpatialIndex {
    mode: SeparationMode,
    order: u32,
    points: Vec<IndexedPoint>,
    buckets: HashMap<u64, Vec<usize>>,
}

impl SpatialIndex {
    /// Indexes every row of `catalog` that has both coordinates.
    ///
    /// Rows with an absent coordinate are skipped and can never be returned
    /// as a match. Fails with `EmptyCatalog` when no row is usable.
    pub fn build(
        catalog: &Catalog,
        fields: &CoordinateFields,
        mode: SeparationMode,
    ) -> CatalogResult<Self> {
        let coords = catalog.coordinates(fields)?;
        let points: Vec<IndexedPoint> = coords
            .iter()
            .enumerate()
            .filter_map(|(row, c)| c.map(|(ra, dec)| IndexedPoint { row, ra, dec }))
            .collect();

        if points.is_empty() {
            return Err(CatalogError::empty_catalog(
                catalog.name(),
                &format!(
                    "no rows with both '{}' and '{}' present to index ({} rows total)",
                    fields.ra,
                    fields.dec,
                    catalog.len()
                ),
            ));
        }

        let order = order_for_density(points.len(), ROWS_PER_PIXEL);
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate() {
            buckets
                .entry(ang2pix_nest(order, p.ra, p.dec))
                .or_default()
                .push(i);
        }

        debug!(
            catalog = catalog.name(),
            indexed = points.len(),
            skipped = catalog.len() - points.len(),
            order,
            pixels = buckets.len(),
            "built spatial index"
        );

        Ok(Self {
            mode,
            order,
            points,
            buckets,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn mode(&self) -> SeparationMode {
        self.mode
    }

    /// Nearest indexed row to (`ra`, `dec`). Ties go to the lowest row index.
    pub fn nearest(&self, ra: f64, dec: f64) -> Match {
        if self.points.len() <= BRUTE_FORCE_LIMIT {
            return self.scan(ra, dec, 0..self.points.len());
        }

        let mut radius = pixel_size_deg(self.order);
        while radius <= MAX_DISC_RADIUS_DEG && disc_pixel_count(self.order, radius) <= self.points.len() as f64 {
            let pixels = query_disc_nest(self.order, ra, dec, radius);
            let candidates = pixels
                .iter()
                .filter_map(|pix| self.buckets.get(pix))
                .flatten()
                .copied();
            if let Some(best) = self.best_of(ra, dec, candidates) {
                let p = self.points[best];
                let separation_deg = self.mode.separation_deg(ra, dec, p.ra, p.dec);
                // Every row within `radius` on the sky lies in a visited pixel.
                if self.reach_deg(dec, separation_deg) <= radius {
                    return Match {
                        row: p.row,
                        separation_deg,
                    };
                }
            }
            radius *= 2.0;
        }

        self.scan(ra, dec, 0..self.points.len())
    }

    /// One nearest match per query position; `None` where the position is absent.
    pub fn nearest_match(&self, queries: &[Option<(f64, f64)>]) -> Vec<Option<Match>> {
        queries
            .iter()
            .map(|q| q.map(|(ra, dec)| self.nearest(ra, dec)))
            .collect()
    }

    /// Largest true angular distance of a row whose separation, in this
    /// index's mode, from a query at `dec` is at most `separation_deg`.
    ///
    /// For projected separations both `|Δδ|` and `|Δα| cos δ_q` are bounded
    /// by the separation; walking the meridian and then the row's parallel
    /// bounds the great-circle distance. Unbounded at the poles.
    fn reach_deg(&self, dec: f64, separation_deg: f64) -> f64 {
        match self.mode {
            SeparationMode::Exact => separation_deg,
            SeparationMode::Projected => {
                let cos_query = libm::cos(dec * DEG_TO_RAD);
                if cos_query <= 0.0 {
                    return f64::INFINITY;
                }
                let nearest_parallel = (dec.abs() - separation_deg).max(0.0);
                separation_deg + separation_deg * libm::cos(nearest_parallel * DEG_TO_RAD) / cos_query
            }
        }
    }

    fn scan(&self, ra: f64, dec: f64, range: std::ops::Range<usize>) -> Match {
        // `points` is never empty once built
        let best = self.best_of(ra, dec, range).unwrap_or(0);
        let p = self.points[best];
        Match {
            row: p.row,
            separation_deg: self.mode.separation_deg(ra, dec, p.ra, p.dec),
        }
    }

    fn best_of(&self, ra: f64, dec: f64, candidates: impl Iterator<Item = usize>) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for i in candidates {
            let p = &self.points[i];
            let sep = self.mode.separation_deg(ra, dec, p.ra, p.dec);
            let better = match best {
                None => true,
                Some((b, bsep)) => sep < bsep || (sep == bsep && p.row < self.points[b].row),
            };
            if better {
                best = Some((i, sep));
            }
        }
        best.map(|(i, _)| i)
    }
}

/// Matches every row of `query` to its nearest row of `target`.
///
/// Returns one entry per query row, `None` where the query row has an absent
/// coordinate. Both catalogs must contain at least one usable row.
pub fn match_catalogs(
    query: &Catalog,
    query_fields: &CoordinateFields,
    target: &Catalog,
    target_fields: &CoordinateFields,
    mode: SeparationMode,
) -> CatalogResult<Vec<Option<Match>>> {
    if query.is_empty() {
        return Err(CatalogError::empty_catalog(
            query.name(),
            "query catalog for positional match has no rows",
        ));
    }
    let index = SpatialIndex::build(target, target_fields, mode)?;
    let coords = query.coordinates(query_fields)?;
    Ok(index.nearest_match(&coords))
}
