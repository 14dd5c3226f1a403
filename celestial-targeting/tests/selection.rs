use approx::assert_abs_diff_eq;
use celestial_catalog::{Catalog, CatalogError, CoordinateFields, Mask, Value};
use celestial_targeting::criteria::{
    ColorCut, ColorCuts, CrossReferenceRule, FlagCut, MagnitudeCut, Overrides, RadialCut, RedshiftRule,
    RedshiftThreshold, BINNED1,
};
use celestial_targeting::{
    assign_ranks, build_target_list, select_targets, selected_mask, Host, RadiusBound, RankingRules,
    ReferenceCache, ReferenceCatalog, Selection, SelectionContext, SelectionCriteria, TargetKind,
    TargetListConfig, HOST_SEPARATION_FIELD,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::sync::Arc;

fn random_field(seed: u64, n: usize) -> Catalog {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows = (0..n)
        .map(|i| {
            let r: f64 = rng.random_range(15.0f64..23.0);
            let gmr: f64 = rng.random_range(-0.2f64..1.5);
            vec![
                (i as i64).into(),
                rng.random_range(149.0f64..151.0).into(),
                rng.random_range(1.0f64..3.0).into(),
                r.into(),
                (r + gmr).into(),
                (if rng.random_bool(0.8) { BINNED1 as i64 } else { 0 }).into(),
            ]
        })
        .collect();
    Catalog::from_rows(&["objID", "ra", "dec", "r", "g", "flags"], rows).expect("valid catalog")
}

fn host() -> Host {
    Host::new("host", 150.0, 2.0).with_distance(10.0)
}

#[test]
fn test_each_stage_only_narrows() {
    let catalog = random_field(11, 500);
    let context = SelectionContext::new(host());

    let mut criteria = SelectionCriteria::default();
    let mut previous = Mask::all(catalog.len());
    let steps: Vec<Box<dyn Fn(&mut SelectionCriteria)>> = vec![
        Box::new(|c: &mut SelectionCriteria| {
            c.magnitude = Some(MagnitudeCut {
                field: "r".to_string(),
                bright_limit: Some(16.0),
                faint_limit: Some(21.0),
            })
        }),
        Box::new(|c: &mut SelectionCriteria| {
            c.colors = Some(ColorCuts {
                cuts: vec![ColorCut::new("g-r", None, Some(1.0))],
                ..ColorCuts::default()
            })
        }),
        Box::new(|c: &mut SelectionCriteria| {
            c.radial = Some(RadialCut {
                inner: Some(RadiusBound::Arcmin(5.0)),
                outer: Some(RadiusBound::Kpc(150.0)),
            })
        }),
        Box::new(|c: &mut SelectionCriteria| {
            c.flags = Some(FlagCut {
                field: "flags".to_string(),
                tests: FlagCut::sdss_photometry().tests,
            })
        }),
    ];
    for step in &steps {
        step(&mut criteria);
        let mask = selected_mask(&catalog, &Selection::new(criteria.clone()), &context).unwrap();
        assert!(mask.is_subset_of(&previous));
        previous = mask;
    }
    assert!(previous.count_selected() > 0);
    assert!(previous.count_selected() < catalog.len());
}

#[test]
fn test_color_bounds_are_exclusive_and_padding_widens_them() {
    let mut catalog = Catalog::from_rows(
        &["g", "r", "g_err", "r_err"],
        vec![
            vec![18.0.into(), 17.0.into(), 0.03.into(), 0.04.into()],
            vec![18.049.into(), 17.0.into(), 0.03.into(), 0.04.into()],
            vec![18.06.into(), 17.0.into(), 0.03.into(), 0.04.into()],
            vec![17.9.into(), 17.0.into(), 0.03.into(), 0.04.into()],
        ],
    )
    .unwrap();
    let context = SelectionContext::new(host());
    let cuts = ColorCuts {
        cuts: vec![ColorCut::new("g-r", None, Some(1.0))],
        ..ColorCuts::default()
    };
    let strict = SelectionCriteria {
        colors: Some(cuts.clone()),
        ..SelectionCriteria::default()
    };
    let mask = selected_mask(&catalog, &Selection::new(strict), &context).unwrap();
    assert_eq!(mask.selected_indices(), vec![3]);

    let padded = SelectionCriteria {
        colors: Some(ColorCuts {
            uncertainty_padding: Some(1.0),
            ..cuts
        }),
        ..SelectionCriteria::default()
    };
    let selection = Selection::new(padded);
    let err = selected_mask(&catalog, &selection, &context).unwrap_err();
    assert!(matches!(err, CatalogError::SchemaMismatch { .. }));

    catalog.declare_uncertainty("g", "g_err").unwrap();
    catalog.declare_uncertainty("r", "r_err").unwrap();
    // slack = hypot(0.03, 0.04) = 0.05
    let mask = selected_mask(&catalog, &selection, &context).unwrap();
    assert_eq!(mask.selected_indices(), vec![0, 1, 3]);
}

#[test]
fn test_legacy_radius_encodings() {
    let catalog = Catalog::from_rows(
        &["ra", "dec"],
        vec![
            vec![150.0.into(), 2.49.into()],
            vec![150.0.into(), 2.51.into()],
            vec![150.0.into(), 2.56.into()],
            vec![150.0.into(), 2.6.into()],
        ],
    )
    .unwrap();
    let context = SelectionContext::new(host());
    let with_outer = |outer| SelectionCriteria {
        radial: Some(RadialCut { inner: None, outer: Some(outer) }),
        ..SelectionCriteria::default()
    };

    // -30 is 30 arcmin, 0.5 degrees, whatever the distance
    let mask = selected_mask(&catalog, &Selection::new(with_outer(RadiusBound::Legacy(-30.0))), &context).unwrap();
    assert_eq!(mask.selected_indices(), vec![0]);

    // 100 kpc at 10 Mpc is 0.01 rad, about 0.573 degrees
    assert_abs_diff_eq!(host().kpc_to_deg(100.0).unwrap(), 0.01f64.to_degrees(), epsilon = 1e-12);
    let mask = selected_mask(&catalog, &Selection::new(with_outer(RadiusBound::Legacy(100.0))), &context).unwrap();
    assert_eq!(mask.selected_indices(), vec![0, 1, 2]);

    let no_distance = SelectionContext::new(Host::new("host", 150.0, 2.0));
    let err = selected_mask(&catalog, &Selection::new(with_outer(RadiusBound::Kpc(100.0))), &no_distance).unwrap_err();
    assert!(matches!(err, CatalogError::InvalidCutSpecification { .. }));
}

#[test]
fn test_redshift_override_excludes_only_confirmed_outliers() {
    let catalog = Catalog::from_rows(
        &["ra", "dec", "r", "spec_class", "spec_z", "spec_z_err"],
        vec![
            vec![150.0.into(), 2.0.into(), 18.0.into(), "GALAXY".into(), 0.0055.into(), 0.0001.into()],
            vec![150.0.into(), 2.1.into(), 18.0.into(), "GALAXY".into(), 0.0080.into(), 0.0001.into()],
            vec![150.0.into(), 2.2.into(), 18.0.into(), "GALAXY".into(), 0.0500.into(), (-1.0).into()],
            vec![150.0.into(), 2.3.into(), 18.0.into(), Value::Absent, Value::Absent, Value::Absent],
            vec![150.0.into(), 2.4.into(), 22.0.into(), "GALAXY".into(), 0.0050.into(), 0.0001.into()],
        ],
    )
    .unwrap();
    let host = host().with_redshift(0.005, 0.0001);
    let criteria = SelectionCriteria {
        magnitude: Some(MagnitudeCut {
            field: "r".to_string(),
            bright_limit: None,
            faint_limit: Some(21.0),
        }),
        overrides: Some(Overrides {
            redshift: Some(RedshiftRule::new(RedshiftThreshold::Sigma(10.0))),
            ..Overrides::default()
        }),
        ..SelectionCriteria::default()
    };
    let mask = selected_mask(&catalog, &Selection::new(criteria), &SelectionContext::new(host)).unwrap();
    // row 1 is 3e-3 away against 10σ ≈ 1.4e-3; row 4 failed the magnitude cut and stays out
    assert_eq!(mask.selected_indices(), vec![0, 2, 3]);
}

#[test]
fn test_cross_reference_with_cached_reference() {
    let catalog = Catalog::from_rows(
        &["ra", "dec"],
        vec![vec![150.0.into(), 2.0.into()], vec![150.2.into(), 2.0.into()]],
    )
    .unwrap();
    let criteria = SelectionCriteria {
        overrides: Some(Overrides {
            cross_reference: Some(CrossReferenceRule {
                catalog: "stars".to_string(),
                tolerance_arcsec: 3.0,
            }),
            ..Overrides::default()
        }),
        ..SelectionCriteria::default()
    };
    let selection = Selection::new(criteria);

    let mut cache = ReferenceCache::new();
    let mut loads = 0;
    let mut load = |rows: Vec<Vec<Value>>| {
        cache
            .get_or_load("stars", || {
                loads += 1;
                ReferenceCatalog::new("stars", Catalog::from_rows(&["ra", "dec"], rows)?, CoordinateFields::default())
            })
            .unwrap()
    };
    let reference = load(vec![vec![150.2.into(), (2.0 + 1.0 / 3600.0).into()]]);
    let again: Arc<ReferenceCatalog> = load(vec![vec![10.0.into(), 10.0.into()]]);
    assert!(Arc::ptr_eq(&reference, &again));
    assert_eq!(loads, 1);

    let context = SelectionContext::new(host()).with_reference(reference);
    let mask = selected_mask(&catalog, &selection, &context).unwrap();
    assert_eq!(mask.selected_indices(), vec![0]);

    let err = selected_mask(&catalog, &selection, &SelectionContext::new(host())).unwrap_err();
    assert!(matches!(err, CatalogError::UnresolvedOverlapReference { .. }));
}

#[test]
fn test_json_criteria_to_target_list() {
    let catalog = random_field(5, 300);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "magnitude": {{"field": "r", "faint_limit": 21.0}},
            "radial": {{"outer": {{"kpc": 150}}}},
            "randomize": true,
            "seed": 42
        }}"#
    )
    .unwrap();
    let criteria = SelectionCriteria::load_json(file.path()).unwrap();
    let host = host().with_magnitude(11.0);
    let context = SelectionContext::new(host.clone());

    let targets = select_targets(&catalog, &Selection::new(criteria.clone()), &context).unwrap();
    let again = select_targets(&catalog, &Selection::new(criteria), &context).unwrap();
    assert_eq!(targets.column("objID").unwrap(), again.column("objID").unwrap());
    assert!(!targets.is_empty());

    let outer = host.kpc_to_deg(150.0).unwrap();
    for rhost in targets.column_f64(HOST_SEPARATION_FIELD).unwrap() {
        assert!(rhost.unwrap() < outer);
    }

    let rules = RankingRules::primary_secondary(20.0, None);
    let ranks = assign_ranks(&targets, &rules, &host).unwrap();
    let empty = Catalog::new(&["objID", "ra", "dec", "r"]).unwrap();
    let list = build_target_list(&host, &targets, &ranks, &empty, &empty, &TargetListConfig::default()).unwrap();

    assert_eq!(list.len(), targets.len() + 1);
    assert_eq!(list[0].name, "host");
    assert_eq!(list[0].rank, 2);
    for (entry, r) in list[1..].iter().zip(targets.column_f64("r").unwrap()) {
        assert_eq!(entry.kind, TargetKind::Target);
        assert_eq!(entry.rank, if r.unwrap() < 20.0 { 3 } else { 4 });
    }
}
