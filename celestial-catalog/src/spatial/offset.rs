//! Systematic positional offset between two catalogs of the same field.
//!
//! Astrometric catalogs built from different plates or reductions can disagree
//! by a constant shift. The offset is estimated from the median coordinate
//! difference of nearest neighbours, refined once after removing the first
//! estimate so that spurious first-pass pairs drop out.

use super::index::{SeparationMode, SpatialIndex};
use crate::error::{CatalogError, CatalogResult};
use crate::record::{Catalog, CoordinateFields};
use celestial_core::constants::{ARCSEC_PER_DEG, DEG_TO_RAD};
use celestial_core::math::wrap_delta_ra_deg;
use tracing::debug;

/// Median shift `other - reference`, in degrees of RA and Dec.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOffset {
    pub dra_deg: f64,
    pub ddec_deg: f64,
}

/// Estimates the offset of `other` relative to `reference`.
///
/// Fails with `UnmatchedPosition` when the refined offset exceeds
/// `limit_arcsec` (on-sky, with the RA term scaled by cos δ), which usually
/// means the two catalogs do not cover the same field.
pub fn median_offset(
    reference: &Catalog,
    reference_fields: &CoordinateFields,
    other: &Catalog,
    other_fields: &CoordinateFields,
    limit_arcsec: Option<f64>,
) -> CatalogResult<PositionOffset> {
    let index = SpatialIndex::build(reference, reference_fields, SeparationMode::Exact)?;
    let ref_coords = reference.coordinates(reference_fields)?;
    let coords: Vec<(f64, f64)> = other
        .coordinates(other_fields)?
        .into_iter()
        .flatten()
        .collect();
    if coords.is_empty() {
        return Err(CatalogError::empty_catalog(
            other.name(),
            "no positions to compare against the reference catalog",
        ));
    }

    let differences = |shift: (f64, f64)| -> (Vec<f64>, Vec<f64>) {
        coords
            .iter()
            .filter_map(|&(ra, dec)| {
                let m = index.nearest(ra - shift.0, dec - shift.1);
                ref_coords[m.row].map(|(rra, rdec)| (wrap_delta_ra_deg(ra - rra), dec - rdec))
            })
            .unzip()
    };

    let (dra, ddec) = differences((0.0, 0.0));
    let first = (median(dra), median(ddec));
    let (dra, ddec) = differences(first);
    let offset = PositionOffset {
        dra_deg: median(dra),
        ddec_deg: median(ddec),
    };

    let mid_dec = median(coords.iter().map(|c| c.1).collect());
    let residual_arcsec = libm::hypot(
        offset.dra_deg * libm::cos(mid_dec * DEG_TO_RAD),
        offset.ddec_deg,
    ) * ARCSEC_PER_DEG;

    debug!(
        reference = reference.name(),
        other = other.name(),
        dra_arcsec = offset.dra_deg * ARCSEC_PER_DEG,
        ddec_arcsec = offset.ddec_deg * ARCSEC_PER_DEG,
        "estimated positional offset"
    );

    if let Some(limit) = limit_arcsec {
        if residual_arcsec > limit {
            return Err(CatalogError::unmatched_position(
                other.name(),
                &format!(
                    "median offset to '{}' is {:.3} arcsec, above the {} arcsec limit",
                    reference.name(),
                    residual_arcsec,
                    limit
                ),
            ));
        }
    }
    Ok(offset)
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use approx::assert_abs_diff_eq;

    fn grid(shift: (f64, f64)) -> Catalog {
        let mut rows = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                let ra = 150.0 + i as f64 * 0.01 + shift.0;
                let dec = 2.0 + j as f64 * 0.01 + shift.1;
                rows.push(vec![Value::Float(ra), Value::Float(dec)]);
            }
        }
        Catalog::from_rows(&["ra", "dec"], rows).unwrap()
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_recovers_constant_shift() {
        let shift = (0.5 / 3600.0, -0.3 / 3600.0);
        let fields = CoordinateFields::default();
        let offset = median_offset(&grid((0.0, 0.0)), &fields, &grid(shift), &fields, None).unwrap();
        assert_abs_diff_eq!(offset.dra_deg, shift.0, epsilon = 1e-9);
        assert_abs_diff_eq!(offset.ddec_deg, shift.1, epsilon = 1e-9);
    }

    #[test]
    fn test_offset_above_limit_is_error() {
        let fields = CoordinateFields::default();
        let err = median_offset(
            &grid((0.0, 0.0)),
            &fields,
            &grid((0.0, 2.0 / 3600.0)),
            &fields,
            Some(0.5),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::UnmatchedPosition { .. }));
    }
}
