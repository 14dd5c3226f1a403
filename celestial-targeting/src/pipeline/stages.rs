//! Narrowing stages 1–5 and 7. Each one only ever clears mask entries.

use crate::criteria::{
    BitState, ClassificationGate, ColorCuts, FiberCut, FlagCut, MagnitudeCut, RadialCut,
};
use crate::host::Host;
use celestial_catalog::record::Row;
use celestial_catalog::{Catalog, CatalogError, CatalogResult, CoordinateFields, Mask, SeparationMode};

fn check_limits(stage: &str, parameter: &str, low: Option<f64>, high: Option<f64>) -> CatalogResult<()> {
    if let (Some(lo), Some(hi)) = (low, high) {
        if lo >= hi {
            return Err(CatalogError::invalid_cut(
                stage,
                parameter,
                &format!("lower limit {} is not below upper limit {}", lo, hi),
            ));
        }
    }
    if low.is_some_and(f64::is_nan) || high.is_some_and(f64::is_nan) {
        return Err(CatalogError::invalid_cut(stage, parameter, "limit is NaN"));
    }
    Ok(())
}

fn within(value: f64, low: Option<f64>, high: Option<f64>) -> bool {
    low.map_or(true, |lo| lo < value) && high.map_or(true, |hi| value < hi)
}

pub(crate) fn magnitude(catalog: &Catalog, cut: &MagnitudeCut, mask: &mut Mask) -> CatalogResult<()> {
    check_limits("magnitude", "bright_limit/faint_limit", cut.bright_limit, cut.faint_limit)?;
    let mag = catalog.column_f64(&cut.field)?;
    mask.retain(|i| mag[i].is_some_and(|m| within(m, cut.bright_limit, cut.faint_limit)));
    Ok(())
}

pub(crate) fn classification(catalog: &Catalog, gate: &ClassificationGate, mask: &mut Mask) -> CatalogResult<()> {
    let class = catalog.column(&gate.type_field)?;
    let mag = match gate.all_classes_fainter_than {
        Some(_) => Some(catalog.column_f64(&gate.magnitude_field)?),
        None => None,
    };
    mask.retain(|i| {
        let faint = match (&mag, gate.all_classes_fainter_than) {
            (Some(mag), Some(cutoff)) => mag[i].is_some_and(|m| m > cutoff),
            _ => false,
        };
        faint || class[i].matches(&gate.target_class)
    });
    Ok(())
}

pub(crate) fn colors(catalog: &Catalog, cuts: &ColorCuts, mask: &mut Mask) -> CatalogResult<()> {
    let schema = catalog.schema();
    if let Some(factor) = cuts.uncertainty_padding {
        if !(factor >= 0.0) {
            return Err(CatalogError::invalid_cut(
                "color",
                "uncertainty_padding",
                &format!("factor {} must be non-negative", factor),
            ));
        }
    }

    for (n, cut) in cuts.cuts.iter().enumerate() {
        let parameter = format!("colors[{}]", n);
        let (m1, m2) = cut.bands(&parameter)?;
        check_limits("color", &format!("{}.blue_limit/red_limit", parameter), cut.blue_limit, cut.red_limit)?;

        let band = |name: &str| -> CatalogResult<Vec<Option<f64>>> {
            let mut values = catalog.column_f64(name)?;
            if let Some(prefix) = &cuts.extinction_prefix {
                let ext = catalog.column_f64(&format!("{}{}", prefix, name))?;
                for (v, a) in values.iter_mut().zip(ext) {
                    *v = v.zip(a).map(|(v, a)| v - a);
                }
            }
            Ok(values)
        };
        let mag1 = band(m1)?;
        let mag2 = band(m2)?;

        let errors = match cuts.uncertainty_padding {
            Some(factor) => {
                let err_field = |m: &str| {
                    schema.uncertainty_of(m).map(str::to_string).ok_or_else(|| {
                        CatalogError::schema_mismatch(
                            "color",
                            m,
                            "has no declared uncertainty field but uncertainty_padding is set",
                        )
                    })
                };
                let e1 = catalog.column_f64(&err_field(m1)?)?;
                let e2 = catalog.column_f64(&err_field(m2)?)?;
                Some((factor, e1, e2))
            }
            None => None,
        };

        mask.retain(|i| {
            let Some(color) = mag1[i].zip(mag2[i]).map(|(a, b)| a - b) else {
                return false;
            };
            let slack = match &errors {
                Some((factor, e1, e2)) => match e1[i].zip(e2[i]) {
                    Some((a, b)) => factor * libm::hypot(a, b),
                    None => return false,
                },
                None => 0.0,
            };
            within(
                color,
                cut.blue_limit.map(|b| b - slack),
                cut.red_limit.map(|r| r + slack),
            )
        });
    }
    Ok(())
}

pub(crate) fn predicates<F>(catalog: &Catalog, predicates: &[F], mask: &mut Mask)
where
    F: Fn(&Row<'_>) -> bool,
{
    for predicate in predicates {
        mask.retain(|i| predicate(&catalog.row(i)));
    }
}

/// Separation of every row from the host, in degrees.
pub(crate) fn host_separations(
    catalog: &Catalog,
    fields: &CoordinateFields,
    host: &Host,
    mode: SeparationMode,
) -> CatalogResult<Vec<Option<f64>>> {
    Ok(catalog
        .coordinates(fields)?
        .into_iter()
        .map(|c| c.map(|(ra, dec)| host.separation_deg(ra, dec, mode)))
        .collect())
}

pub(crate) fn radial(
    separations: &[Option<f64>],
    cut: &RadialCut,
    host: &Host,
    mask: &mut Mask,
) -> CatalogResult<()> {
    let inner = cut
        .inner
        .map(|b| b.to_degrees(host, "radial", "inner"))
        .transpose()?;
    let outer = cut
        .outer
        .map(|b| b.to_degrees(host, "radial", "outer"))
        .transpose()?;
    check_limits("radial", "inner/outer", inner, outer)?;
    mask.retain(|i| separations[i].is_some_and(|s| within(s, inner, outer)));
    Ok(())
}

pub(crate) fn flags(catalog: &Catalog, cut: &FlagCut, mask: &mut Mask) -> CatalogResult<()> {
    let values = catalog.column(&cut.field)?;
    mask.retain(|i| {
        let Some(flags) = values[i].as_i64() else {
            return false;
        };
        let flags = flags as u64;
        cut.tests.iter().all(|t| match t.state {
            BitState::Set => flags & t.bits != 0,
            BitState::Clear => flags & t.bits == 0,
        })
    });
    Ok(())
}

pub(crate) fn fiber(catalog: &Catalog, cut: &FiberCut, mask: &mut Mask) -> CatalogResult<()> {
    if let (Some(bright), Some(faint)) = (cut.bright_limit, cut.faint_limit) {
        check_limits("fiber", "bright_limit/faint_limit", Some(bright), Some(faint))?;
    }
    let fiber = catalog.column_f64(&cut.field)?;
    let tier = match &cut.secondary {
        Some(secondary) => {
            check_limits("fiber", "secondary.faint_limit", cut.bright_limit, Some(secondary.faint_limit))?;
            Some((catalog.column_f64(&secondary.magnitude_field)?, secondary))
        }
        None => None,
    };

    mask.retain(|i| {
        let Some(f) = fiber[i] else {
            return false;
        };
        let faint_limit = match &tier {
            Some((mag, secondary)) => match mag[i] {
                Some(m) if m >= secondary.boundary => Some(secondary.faint_limit),
                Some(_) => cut.faint_limit,
                None => return false,
            },
            None => cut.faint_limit,
        };
        within(f, cut.bright_limit, faint_limit)
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{ColorCut, FlagTest, RadiusBound, SecondaryTier, BINNED1, SATURATED};
    use celestial_catalog::Value;

    fn photometry() -> Catalog {
        let mut cat = Catalog::from_rows(
            &["r", "g", "g_err", "r_err", "type"],
            vec![
                vec![16.0.into(), 17.0.into(), 0.1.into(), 0.1.into(), 3.into()],
                vec![21.0.into(), 22.3.into(), 0.2.into(), 0.1.into(), 6.into()],
                vec![Value::Absent, 18.0.into(), 0.1.into(), 0.1.into(), 3.into()],
                vec![20.5.into(), 21.0.into(), Value::Absent, 0.1.into(), 6.into()],
            ],
        )
        .unwrap();
        cat.declare_uncertainty("g", "g_err").unwrap();
        cat.declare_uncertainty("r", "r_err").unwrap();
        cat
    }

    #[test]
    fn test_magnitude_open_interval() {
        let cat = photometry();
        let mut mask = Mask::all(cat.len());
        let cut = MagnitudeCut {
            field: "r".to_string(),
            bright_limit: Some(16.0),
            faint_limit: Some(21.0),
        };
        magnitude(&cat, &cut, &mut mask).unwrap();
        assert_eq!(mask.as_slice(), &[false, false, false, true]);
    }

    #[test]
    fn test_inverted_magnitude_limits() {
        let cat = photometry();
        let cut = MagnitudeCut {
            field: "r".to_string(),
            bright_limit: Some(21.0),
            faint_limit: Some(15.0),
        };
        let err = magnitude(&cat, &cut, &mut Mask::all(cat.len())).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidCutSpecification { ref stage, .. } if stage == "magnitude"));
    }

    #[test]
    fn test_classification_bypassed_when_faint() {
        let cat = photometry();
        let gate = ClassificationGate {
            type_field: "type".to_string(),
            target_class: Value::Int(3),
            magnitude_field: "r".to_string(),
            all_classes_fainter_than: Some(20.0),
        };
        let mut mask = Mask::all(cat.len());
        classification(&cat, &gate, &mut mask).unwrap();
        assert_eq!(mask.as_slice(), &[true, true, true, true]);

        let strict = ClassificationGate {
            all_classes_fainter_than: None,
            ..gate
        };
        let mut mask = Mask::all(cat.len());
        classification(&cat, &strict, &mut mask).unwrap();
        assert_eq!(mask.as_slice(), &[true, false, true, false]);
    }

    #[test]
    fn test_color_padding_needs_errors() {
        let cat = photometry();
        let cuts = ColorCuts {
            cuts: vec![ColorCut::new("g-r", None, Some(1.0))],
            extinction_prefix: None,
            uncertainty_padding: Some(1.0),
        };
        let mut mask = Mask::all(cat.len());
        colors(&cat, &cuts, &mut mask).unwrap();
        // g-r = 1.0 + hypot(0.1, 0.1) padding keeps row 0; row 3 has no g error
        assert_eq!(mask.as_slice(), &[true, false, false, false]);
    }

    #[test]
    fn test_color_padding_without_declared_uncertainty() {
        let cat = Catalog::from_rows(&["g", "r"], vec![vec![1.0.into(), 0.5.into()]]).unwrap();
        let cuts = ColorCuts {
            cuts: vec![ColorCut::new("g-r", None, Some(1.0))],
            extinction_prefix: None,
            uncertainty_padding: Some(2.0),
        };
        let err = colors(&cat, &cuts, &mut Mask::all(1)).unwrap_err();
        assert!(matches!(err, CatalogError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_dereddened_color() {
        let cat = Catalog::from_rows(
            &["g", "r", "Ag", "Ar"],
            vec![vec![18.0.into(), 17.0.into(), 0.5.into(), 0.1.into()]],
        )
        .unwrap();
        let cuts = ColorCuts {
            cuts: vec![ColorCut::new("g-r", None, Some(0.8))],
            extinction_prefix: Some("A".to_string()),
            uncertainty_padding: None,
        };
        let mut mask = Mask::all(1);
        colors(&cat, &cuts, &mut mask).unwrap();
        // raw g-r = 1.0, dereddened 0.6
        assert!(mask.get(0));
    }

    #[test]
    fn test_radial_annulus() {
        let host = Host::new("h", 0.0, 0.0).with_distance(10.0);
        let seps = vec![Some(0.01), Some(0.2), Some(0.6), None];
        let cut = RadialCut {
            inner: Some(RadiusBound::Arcmin(1.0)),
            outer: Some(RadiusBound::Legacy(-30.0)),
        };
        let mut mask = Mask::all(4);
        radial(&seps, &cut, &host, &mut mask).unwrap();
        assert_eq!(mask.as_slice(), &[false, true, false, false]);

        let open = RadialCut { inner: None, outer: None };
        let mut mask = Mask::all(4);
        radial(&seps, &open, &host, &mut mask).unwrap();
        assert_eq!(mask.as_slice(), &[true, true, true, false]);
    }

    #[test]
    fn test_radial_inverted() {
        let host = Host::new("h", 0.0, 0.0);
        let cut = RadialCut {
            inner: Some(RadiusBound::Degrees(1.0)),
            outer: Some(RadiusBound::Degrees(0.5)),
        };
        assert!(radial(&[Some(0.7)], &cut, &host, &mut Mask::all(1)).is_err());
    }

    #[test]
    fn test_flags() {
        let cat = Catalog::from_rows(
            &["flags"],
            vec![
                vec![(BINNED1 as i64).into()],
                vec![((BINNED1 | SATURATED) as i64).into()],
                vec![0.into()],
                vec![Value::Absent],
            ],
        )
        .unwrap();
        let mut mask = Mask::all(4);
        flags(&cat, &FlagCut::sdss_photometry(), &mut mask).unwrap();
        assert_eq!(mask.as_slice(), &[true, false, false, false]);

        let cut = FlagCut {
            field: "flags".to_string(),
            tests: vec![FlagTest { bits: SATURATED, state: BitState::Clear }],
        };
        let mut mask = Mask::all(4);
        flags(&cat, &cut, &mut mask).unwrap();
        assert_eq!(mask.as_slice(), &[true, false, true, false]);
    }

    #[test]
    fn test_fiber_tiers() {
        let cat = Catalog::from_rows(
            &["r", "fibermag_r"],
            vec![
                vec![20.0.into(), 22.5.into()],
                vec![21.5.into(), 22.5.into()],
                vec![21.5.into(), 16.0.into()],
                vec![20.0.into(), 21.0.into()],
            ],
        )
        .unwrap();
        let cut = FiberCut {
            field: "fibermag_r".to_string(),
            bright_limit: Some(17.0),
            faint_limit: Some(22.0),
            secondary: Some(SecondaryTier {
                magnitude_field: "r".to_string(),
                boundary: 21.0,
                faint_limit: 23.0,
            }),
        };
        let mut mask = Mask::all(4);
        fiber(&cat, &cut, &mut mask).unwrap();
        assert_eq!(mask.as_slice(), &[false, true, false, true]);
    }
}
