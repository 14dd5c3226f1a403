//! The multi-stage selection pipeline.
//!
//! Stages run in a fixed order over one running [`Mask`]:
//!
//! | # | Stage | Criteria field |
//! |---|-------|----------------|
//! | 1 | Magnitude band | [`magnitude`](SelectionCriteria::magnitude) |
//! | 2 | Classification gate | [`classification`](SelectionCriteria::classification) |
//! | 3 | Color cuts and row predicates | [`colors`](SelectionCriteria::colors), [`Selection::with_predicate`] |
//! | 4 | Radial zone around the host | [`radial`](SelectionCriteria::radial) |
//! | 5 | Quality flags | [`flags`](SelectionCriteria::flags) |
//! | 6 | Overrides | [`overrides`](SelectionCriteria::overrides) |
//! | 7 | Fiber magnitude | [`fiber`](SelectionCriteria::fiber) |
//!
//! Every stage but the sixth only clears mask entries. A stage whose field
//! is `None` is skipped.

mod overrides;
mod stages;

use crate::criteria::SelectionCriteria;
use crate::host::Host;
use crate::reference::ReferenceCatalog;
use celestial_catalog::record::Row;
use celestial_catalog::{Catalog, CatalogResult, Mask, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the column [`select_targets`] adds: separation from the host in degrees.
pub const HOST_SEPARATION_FIELD: &str = "rhost";

pub type RowPredicate = Box<dyn Fn(&Row<'_>) -> bool + Send + Sync>;

/// Serializable criteria plus any row predicates attached in code.
pub struct Selection {
    pub criteria: SelectionCriteria,
    predicates: Vec<RowPredicate>,
}

impl Selection {
    pub fn new(criteria: SelectionCriteria) -> Self {
        Self {
            criteria,
            predicates: Vec::new(),
        }
    }

    /// Adds a color-stage predicate. Predicates AND with each other and with
    /// the declared color bounds.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Row<'_>) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Box::new(predicate));
        self
    }

    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }
}

impl From<SelectionCriteria> for Selection {
    fn from(criteria: SelectionCriteria) -> Self {
        Self::new(criteria)
    }
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("criteria", &self.criteria)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

/// Per-run inputs that are not part of the criteria.
#[derive(Debug, Clone)]
pub struct SelectionContext {
    pub host: Host,
    pub reference: Option<Arc<ReferenceCatalog>>,
}

impl SelectionContext {
    pub fn new(host: Host) -> Self {
        Self { host, reference: None }
    }

    pub fn with_reference(mut self, reference: Arc<ReferenceCatalog>) -> Self {
        self.reference = Some(reference);
        self
    }
}

fn log_stage(stage: &str, before: usize, mask: &Mask) {
    debug!(stage, before, after = mask.count_selected(), "selection stage");
}

fn mask_with_separations(
    catalog: &Catalog,
    selection: &Selection,
    context: &SelectionContext,
) -> CatalogResult<(Mask, Option<Vec<Option<f64>>>)> {
    let criteria = &selection.criteria;
    let host = &context.host;
    let mut mask = Mask::all(catalog.len());

    if let Some(cut) = &criteria.magnitude {
        let before = mask.count_selected();
        stages::magnitude(catalog, cut, &mut mask)?;
        log_stage("magnitude", before, &mask);
    }
    if let Some(gate) = &criteria.classification {
        let before = mask.count_selected();
        stages::classification(catalog, gate, &mut mask)?;
        log_stage("classification", before, &mask);
    }
    if criteria.colors.is_some() || !selection.predicates.is_empty() {
        let before = mask.count_selected();
        if let Some(cuts) = &criteria.colors {
            stages::colors(catalog, cuts, &mut mask)?;
        }
        stages::predicates(catalog, &selection.predicates, &mut mask);
        log_stage("color", before, &mask);
    }

    let mut separations = None;
    if let Some(cut) = &criteria.radial {
        let before = mask.count_selected();
        let rhost = stages::host_separations(catalog, &criteria.coordinates, host, criteria.separation)?;
        stages::radial(&rhost, cut, host, &mut mask)?;
        separations = Some(rhost);
        log_stage("radial", before, &mask);
    }
    if let Some(cut) = &criteria.flags {
        let before = mask.count_selected();
        stages::flags(catalog, cut, &mut mask)?;
        log_stage("flags", before, &mask);
    }
    if let Some(rules) = &criteria.overrides {
        let before = mask.count_selected();
        overrides::apply(
            catalog,
            rules,
            host,
            &criteria.coordinates,
            context.reference.as_deref(),
            &mut mask,
        )?;
        log_stage("overrides", before, &mask);
    }
    if let Some(cut) = &criteria.fiber {
        let before = mask.count_selected();
        stages::fiber(catalog, cut, &mut mask)?;
        log_stage("fiber", before, &mask);
    }
    Ok((mask, separations))
}

/// Runs stages 1–7 and returns the final mask.
pub fn selected_mask(
    catalog: &Catalog,
    selection: &Selection,
    context: &SelectionContext,
) -> CatalogResult<Mask> {
    mask_with_separations(catalog, selection, context).map(|(mask, _)| mask)
}

/// Runs the pipeline and returns the selected rows with an `rhost` column.
///
/// Unlike [`selected_mask`] this always needs the coordinate fields, since
/// every selected row gets its separation from the host.
///
/// When `criteria.randomize` is set the rows are shuffled, reproducibly if a
/// seed is configured.
pub fn select_targets(
    catalog: &Catalog,
    selection: &Selection,
    context: &SelectionContext,
) -> CatalogResult<Catalog> {
    match selection.criteria.seed {
        Some(seed) => select_targets_with_rng(catalog, selection, context, &mut StdRng::seed_from_u64(seed)),
        None => select_targets_with_rng(catalog, selection, context, &mut rand::rng()),
    }
}

/// [`select_targets`] with a caller-supplied generator for the shuffle.
pub fn select_targets_with_rng<R: Rng + ?Sized>(
    catalog: &Catalog,
    selection: &Selection,
    context: &SelectionContext,
    rng: &mut R,
) -> CatalogResult<Catalog> {
    let (mask, separations) = mask_with_separations(catalog, selection, context)?;
    let separations = match separations {
        Some(separations) => separations,
        None => {
            let criteria = &selection.criteria;
            stages::host_separations(catalog, &criteria.coordinates, &context.host, criteria.separation)?
        }
    };
    let mut selected = catalog.filter(&mask)?;
    let rhost = mask
        .selected_indices()
        .into_iter()
        .map(|i| Value::from_option(separations[i]))
        .collect();
    selected.set_column(HOST_SEPARATION_FIELD, rhost)?;
    if selection.criteria.randomize {
        selected.shuffle(rng);
    }
    info!(
        host = %context.host.name,
        candidates = catalog.len(),
        selected = selected.len(),
        randomized = selection.criteria.randomize,
        "target selection complete"
    );
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{MagnitudeCut, RadialCut, RadiusBound};
    use approx::assert_abs_diff_eq;

    fn field() -> Catalog {
        Catalog::from_rows(
            &["objID", "ra", "dec", "r", "g"],
            vec![
                vec![1.into(), 150.0.into(), 2.0.into(), 17.0.into(), 17.5.into()],
                vec![2.into(), 150.1.into(), 2.0.into(), 19.0.into(), 19.9.into()],
                vec![3.into(), 150.2.into(), 2.0.into(), 20.5.into(), 20.6.into()],
                vec![4.into(), 151.5.into(), 2.0.into(), 18.0.into(), 18.2.into()],
                vec![5.into(), Value::Absent, 2.0.into(), 18.0.into(), 18.2.into()],
            ],
        )
        .unwrap()
    }

    fn criteria() -> SelectionCriteria {
        SelectionCriteria {
            magnitude: Some(MagnitudeCut {
                field: "r".to_string(),
                bright_limit: None,
                faint_limit: Some(20.0),
            }),
            radial: Some(RadialCut {
                inner: None,
                outer: Some(RadiusBound::Degrees(1.0)),
            }),
            ..SelectionCriteria::default()
        }
    }

    fn context() -> SelectionContext {
        SelectionContext::new(Host::new("host", 150.0, 2.0))
    }

    #[test]
    fn test_empty_criteria_keeps_everything() {
        let selection = Selection::new(SelectionCriteria::default());
        let mask = selected_mask(&field(), &selection, &context()).unwrap();
        assert_eq!(mask.count_selected(), 5);
    }

    #[test]
    fn test_stages_combine() {
        let selection = Selection::new(criteria());
        let mask = selected_mask(&field(), &selection, &context()).unwrap();
        assert_eq!(mask.selected_indices(), vec![0, 1]);
    }

    #[test]
    fn test_predicate_narrows_color_stage() {
        let selection = Selection::new(criteria()).with_predicate(|row| {
            matches!((row.f64("g"), row.f64("r")), (Some(g), Some(r)) if g - r < 0.7)
        });
        assert_eq!(selection.predicate_count(), 1);
        let mask = selected_mask(&field(), &selection, &context()).unwrap();
        assert_eq!(mask.selected_indices(), vec![0]);
    }

    #[test]
    fn test_select_targets_adds_host_separation() {
        let selected = select_targets(&field(), &Selection::new(criteria()), &context()).unwrap();
        assert_eq!(selected.len(), 2);
        let rhost = selected.column_f64(HOST_SEPARATION_FIELD).unwrap();
        assert_abs_diff_eq!(rhost[0].unwrap(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rhost[1].unwrap(), 0.1 * 2f64.to_radians().cos(), epsilon = 1e-5);
    }

    #[test]
    fn test_mask_without_coordinates() {
        let photometry = Catalog::from_rows(&["r"], vec![vec![18.0.into()], vec![21.5.into()]]).unwrap();
        let selection = Selection::new(SelectionCriteria {
            magnitude: criteria().magnitude,
            ..SelectionCriteria::default()
        });
        let mask = selected_mask(&photometry, &selection, &context()).unwrap();
        assert_eq!(mask.selected_indices(), vec![0]);

        let err = select_targets(&photometry, &selection, &context()).unwrap_err();
        assert!(matches!(err, celestial_catalog::CatalogError::SchemaMismatch { ref field, .. } if field == "ra"));
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let selection = Selection::new(SelectionCriteria {
            randomize: true,
            seed: Some(7),
            ..SelectionCriteria::default()
        });
        let a = select_targets(&field(), &selection, &context()).unwrap();
        let b = select_targets(&field(), &selection, &context()).unwrap();
        assert_eq!(a.column("objID").unwrap(), b.column("objID").unwrap());

        let mut ids: Vec<i64> = a.column("objID").unwrap().iter().filter_map(|v| v.as_i64()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }
}
