//! Stage 6: override rules.
//!
//! Unlike the narrowing stages these may set mask entries back to `true`
//! (class inclusion) as well as clear them. Rows without a confirmed
//! spectroscopic measurement are never touched by the redshift rule.

use crate::criteria::{CrossReferenceRule, Overrides, RedshiftRule, RedshiftThreshold};
use crate::host::Host;
use crate::reference::{BoundingBox, ReferenceCatalog};
use celestial_catalog::spatial::SpatialIndex;
use celestial_catalog::{Catalog, CatalogError, CatalogResult, CoordinateFields, Mask, Value};
use celestial_core::constants::{ARCSEC_PER_DEG, SPEED_OF_LIGHT_KM_S};
use tracing::debug;

pub(crate) fn apply(
    catalog: &Catalog,
    overrides: &Overrides,
    host: &Host,
    coordinates: &CoordinateFields,
    reference: Option<&ReferenceCatalog>,
    mask: &mut Mask,
) -> CatalogResult<()> {
    if let Some(class) = overrides
        .include_classes
        .iter()
        .find(|c| overrides.exclude_classes.contains(c))
    {
        return Err(CatalogError::invalid_cut(
            "overrides",
            "include_classes/exclude_classes",
            &format!("class '{}' is both force-included and force-excluded", class),
        ));
    }

    let needs_class = !overrides.include_classes.is_empty() || !overrides.exclude_classes.is_empty();
    if needs_class {
        let class = catalog.column(&overrides.class_field)?;
        let is_one_of = |i: usize, classes: &[String]| {
            class[i]
                .as_str()
                .is_some_and(|c| classes.iter().any(|k| k == c))
        };
        let mut included = 0;
        let mut excluded = 0;
        for i in 0..catalog.len() {
            if is_one_of(i, &overrides.include_classes) {
                included += usize::from(!mask.get(i));
                mask.set(i, true);
            } else if is_one_of(i, &overrides.exclude_classes) {
                excluded += usize::from(mask.get(i));
                mask.set(i, false);
            }
        }
        debug!(included, excluded, "class overrides");
    }

    if let Some(rule) = &overrides.redshift {
        redshift(catalog, rule, &overrides.class_field, host, mask)?;
    }

    if let Some(rule) = &overrides.cross_reference {
        let reference = reference.filter(|r| r.name() == rule.catalog).ok_or_else(|| {
            CatalogError::unresolved_overlap(
                "overrides",
                &format!("cross_reference names catalog '{}' but none was provided", rule.catalog),
            )
        })?;
        cross_reference(catalog, rule, coordinates, reference, mask)?;
    }
    Ok(())
}

fn redshift(
    catalog: &Catalog,
    rule: &RedshiftRule,
    class_field: &str,
    host: &Host,
    mask: &mut Mask,
) -> CatalogResult<()> {
    let host_z = host.redshift.ok_or_else(|| {
        CatalogError::invalid_cut("overrides", "redshift", &format!("host '{}' has no redshift", host.name))
    })?;
    let host_err = host.redshift_err.unwrap_or(0.0);
    match rule.threshold {
        RedshiftThreshold::Sigma(k) | RedshiftThreshold::VelocityKms(k) if !(k >= 0.0) => {
            return Err(CatalogError::invalid_cut(
                "overrides",
                "redshift.threshold",
                &format!("threshold {} must be non-negative", k),
            ));
        }
        _ => {}
    }

    let class = catalog.column(class_field)?;
    let z = catalog.column_f64(&rule.redshift_field)?;
    let z_err = catalog.column_f64(&rule.error_field)?;
    let warning = match &rule.warning_field {
        Some(field) => Some(catalog.column(field)?),
        None => None,
    };

    let target = Value::Text(rule.class.clone());
    let mut removed = 0;
    for i in 0..catalog.len() {
        if !class[i].matches(&target) {
            continue;
        }
        let Some(zi) = z[i].filter(|z| z.is_finite()) else {
            continue;
        };
        if z_err[i].is_some_and(|e| e < 0.0) {
            continue;
        }
        if let Some(warning) = &warning {
            if warning[i].as_i64() != Some(0) {
                continue;
            }
        }
        let dz = (zi - host_z).abs();
        let differs = match rule.threshold {
            RedshiftThreshold::Sigma(k) => match z_err[i] {
                Some(e) => dz > k * libm::hypot(host_err, e),
                None => continue,
            },
            RedshiftThreshold::VelocityKms(dv) => dz * SPEED_OF_LIGHT_KM_S > dv,
        };
        if differs {
            removed += usize::from(mask.get(i));
            mask.set(i, false);
        }
    }
    debug!(removed, host_z, "redshift override");
    Ok(())
}

fn cross_reference(
    catalog: &Catalog,
    rule: &CrossReferenceRule,
    coordinates: &CoordinateFields,
    reference: &ReferenceCatalog,
    mask: &mut Mask,
) -> CatalogResult<()> {
    let coords = catalog.coordinates(coordinates)?;
    let candidates: Vec<(usize, f64, f64)> = coords
        .iter()
        .enumerate()
        .filter(|(i, _)| mask.get(*i))
        .filter_map(|(i, c)| c.map(|(ra, dec)| (i, ra, dec)))
        .collect();

    let Some(selection_box) = BoundingBox::enclosing(candidates.iter().map(|&(_, ra, dec)| (ra, dec))) else {
        return Ok(());
    };
    let tolerance_deg = rule.tolerance_arcsec / ARCSEC_PER_DEG;
    if !selection_box.padded(tolerance_deg).overlaps(reference.bounds()) {
        debug!(reference = reference.name(), "no overlap with reference catalog, skipping match");
        return Ok(());
    }

    let index = SpatialIndex::build(reference.catalog(), reference.fields(), Default::default())?;
    let mut removed = 0;
    for (i, ra, dec) in candidates {
        if index.nearest(ra, dec).separation_arcsec() < rule.tolerance_arcsec {
            mask.set(i, false);
            removed += 1;
        }
    }
    debug!(reference = reference.name(), removed, "cross-reference override");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectra() -> Catalog {
        Catalog::from_rows(
            &["ra", "dec", "spec_class", "spec_z", "spec_z_err", "spec_z_warn"],
            vec![
                vec![10.0.into(), 0.0.into(), "GALAXY".into(), 0.0050.into(), 0.0001.into(), 0.into()],
                vec![10.1.into(), 0.0.into(), "GALAXY".into(), 0.0500.into(), 0.0001.into(), 0.into()],
                vec![10.2.into(), 0.0.into(), "GALAXY".into(), 0.0500.into(), (-1.0).into(), 0.into()],
                vec![10.3.into(), 0.0.into(), "GALAXY".into(), 0.0500.into(), 0.0001.into(), 4.into()],
                vec![10.4.into(), 0.0.into(), "STAR".into(), 0.0.into(), 0.0001.into(), 0.into()],
                vec![10.5.into(), 0.0.into(), "QSO".into(), 1.2.into(), 0.001.into(), 0.into()],
                vec![10.6.into(), 0.0.into(), Value::Absent, Value::Absent, Value::Absent, Value::Absent],
            ],
        )
        .unwrap()
    }

    fn host() -> Host {
        Host::new("h", 10.0, 0.0).with_redshift(0.0051, 0.0001)
    }

    #[test]
    fn test_class_include_and_exclude() {
        let cat = spectra();
        let overrides = Overrides {
            include_classes: vec!["QSO".to_string()],
            exclude_classes: vec!["STAR".to_string()],
            ..Overrides::default()
        };
        let mut mask = Mask::from(vec![true, true, true, true, true, false, true]);
        apply(&cat, &overrides, &host(), &CoordinateFields::default(), None, &mut mask).unwrap();
        assert_eq!(mask.as_slice(), &[true, true, true, true, false, true, true]);
    }

    #[test]
    fn test_conflicting_classes() {
        let overrides = Overrides {
            include_classes: vec!["QSO".to_string()],
            exclude_classes: vec!["QSO".to_string()],
            ..Overrides::default()
        };
        let err = apply(&spectra(), &overrides, &host(), &CoordinateFields::default(), None, &mut Mask::all(7))
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidCutSpecification { .. }));
    }

    #[test]
    fn test_redshift_sigma_only_touches_valid_measurements() {
        let cat = spectra();
        let overrides = Overrides {
            redshift: Some(RedshiftRule {
                warning_field: Some("spec_z_warn".to_string()),
                ..RedshiftRule::new(RedshiftThreshold::Sigma(3.0))
            }),
            ..Overrides::default()
        };
        let mut mask = Mask::all(7);
        apply(&cat, &overrides, &host(), &CoordinateFields::default(), None, &mut mask).unwrap();
        // only row 1: a valid GALAXY far from the host redshift
        assert_eq!(mask.as_slice(), &[true, false, true, true, true, true, true]);
    }

    #[test]
    fn test_redshift_velocity_threshold() {
        let cat = spectra();
        let overrides = Overrides {
            redshift: Some(RedshiftRule::new(RedshiftThreshold::VelocityKms(20000.0))),
            ..Overrides::default()
        };
        let mut mask = Mask::all(7);
        apply(&cat, &overrides, &host(), &CoordinateFields::default(), None, &mut mask).unwrap();
        // Δv ≈ 13460 km/s is inside the window
        assert_eq!(mask.count_selected(), 7);
    }

    #[test]
    fn test_redshift_needs_host_redshift() {
        let overrides = Overrides {
            redshift: Some(RedshiftRule::new(RedshiftThreshold::Sigma(3.0))),
            ..Overrides::default()
        };
        let err = apply(
            &spectra(),
            &overrides,
            &Host::new("h", 10.0, 0.0),
            &CoordinateFields::default(),
            None,
            &mut Mask::all(7),
        )
        .unwrap_err();
        assert!(err.to_string().contains("redshift"));
    }

    fn cross_rule() -> Overrides {
        Overrides {
            cross_reference: Some(CrossReferenceRule {
                catalog: "usno".to_string(),
                tolerance_arcsec: 2.0,
            }),
            ..Overrides::default()
        }
    }

    #[test]
    fn test_cross_reference_without_catalog() {
        let err = apply(&spectra(), &cross_rule(), &host(), &CoordinateFields::default(), None, &mut Mask::all(7))
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnresolvedOverlapReference { .. }));
    }

    #[test]
    fn test_cross_reference_excludes_matches() {
        let usno = Catalog::from_rows(
            &["RA", "DEC"],
            vec![vec![10.1.into(), (1.0 / 3600.0).into()], vec![10.4.into(), (5.0 / 3600.0).into()]],
        )
        .unwrap();
        let reference = ReferenceCatalog::new("usno", usno, CoordinateFields::new("RA", "DEC")).unwrap();
        let mut mask = Mask::all(7);
        mask.set(0, false);
        apply(&spectra(), &cross_rule(), &host(), &CoordinateFields::default(), Some(&reference), &mut mask).unwrap();
        assert_eq!(mask.as_slice(), &[false, false, true, true, true, true, true]);
    }

    fn excluded_by_single_star(candidate: (f64, f64), star: (f64, f64)) -> Vec<usize> {
        let catalog = Catalog::from_rows(&["ra", "dec"], vec![vec![candidate.0.into(), candidate.1.into()]]).unwrap();
        let usno = Catalog::from_rows(&["RA", "DEC"], vec![vec![star.0.into(), star.1.into()]]).unwrap();
        let reference = ReferenceCatalog::new("usno", usno, CoordinateFields::new("RA", "DEC")).unwrap();
        let overrides = Overrides {
            cross_reference: Some(CrossReferenceRule {
                catalog: "usno".to_string(),
                tolerance_arcsec: 3.0,
            }),
            ..Overrides::default()
        };
        let mut mask = Mask::all(1);
        apply(&catalog, &overrides, &host(), &CoordinateFields::default(), Some(&reference), &mut mask).unwrap();
        mask.selected_indices()
    }

    #[test]
    fn test_cross_reference_at_high_declination() {
        // 10 arcsec of RA at dec 80 is about 1.74 arcsec on the sky
        assert!(excluded_by_single_star((10.0, 80.0), (10.0 + 10.0 / 3600.0, 80.0)).is_empty());
        assert_eq!(excluded_by_single_star((10.0, 80.0), (10.0 + 30.0 / 3600.0, 80.0)), vec![0]);
    }

    #[test]
    fn test_cross_reference_across_ra_zero() {
        assert!(excluded_by_single_star((359.9995, 0.0), (0.0001, 0.0)).is_empty());
        assert!(excluded_by_single_star((0.0001, 0.0), (359.9995, 0.0)).is_empty());
    }

    #[test]
    fn test_cross_reference_skipped_without_overlap() {
        let usno = Catalog::from_rows(&["RA", "DEC"], vec![vec![200.0.into(), 45.0.into()]]).unwrap();
        let reference = ReferenceCatalog::new("usno", usno, CoordinateFields::new("RA", "DEC")).unwrap();
        let mut mask = Mask::all(7);
        apply(&spectra(), &cross_rule(), &host(), &CoordinateFields::default(), Some(&reference), &mut mask).unwrap();
        assert_eq!(mask.count_selected(), 7);
    }
}
