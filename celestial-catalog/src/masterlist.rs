//! Maintenance steps applied to a consolidated master catalog.
//!
//! These run after the joins: dropping rows that cannot serve as hosts,
//! removing objects on a curated remove list, filling gaps from a positional
//! supplement, and appending objects only a later survey knows about.

use crate::error::{CatalogError, CatalogResult};
use crate::record::{Catalog, CoordinateFields, Mask, Value};
use crate::spatial::{match_catalogs, SeparationMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Row filter for the master catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterFilter {
    pub coordinates: CoordinateFields,
    pub distance_field: String,
    pub velocity_field: String,
    /// Rows with velocity at or above this (km/s) are dropped. Rows without a
    /// velocity are kept if they have a distance.
    pub velocity_cutoff_kms: Option<f64>,
    /// When non-empty, rows need at least one of these fields present.
    pub nir_fields: Vec<String>,
}

impl Default for MasterFilter {
    fn default() -> Self {
        Self {
            coordinates: CoordinateFields::default(),
            distance_field: "distance".to_string(),
            velocity_field: "vhelio".to_string(),
            velocity_cutoff_kms: None,
            nir_fields: Vec::new(),
        }
    }
}

pub fn filter_master_catalog(catalog: &Catalog, filter: &MasterFilter) -> CatalogResult<Catalog> {
    let coords = catalog.coordinates(&filter.coordinates)?;
    let distance = catalog.column_f64(&filter.distance_field)?;
    let velocity = catalog.column_f64(&filter.velocity_field)?;
    let nir = filter
        .nir_fields
        .iter()
        .map(|f| catalog.column(f))
        .collect::<CatalogResult<Vec<_>>>()?;

    let mut mask = Mask::from_fn(catalog.len(), |i| coords[i].is_some());
    mask.retain(|i| distance[i].is_some() || velocity[i].is_some());
    if let Some(cut) = filter.velocity_cutoff_kms {
        mask.retain(|i| velocity[i].map_or(true, |v| v < cut));
    }
    if !nir.is_empty() {
        mask.retain(|i| nir.iter().any(|col| col[i].is_present()));
    }

    let kept = catalog.filter(&mask)?;
    info!(
        catalog = catalog.name(),
        before = catalog.len(),
        after = kept.len(),
        "filtered master catalog"
    );
    Ok(kept)
}

/// What to do with a remove-list entry that has no counterpart in tolerance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    #[default]
    Error,
    Warn,
}

/// Positional counterpart search between the master catalog and another one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionalMatch {
    #[serde(default)]
    pub fields: CoordinateFields,
    #[serde(default)]
    pub other_fields: CoordinateFields,
    pub tolerance_arcsec: f64,
    #[serde(default)]
    pub mode: SeparationMode,
}

impl PositionalMatch {
    pub fn new(tolerance_arcsec: f64) -> Self {
        Self {
            fields: CoordinateFields::default(),
            other_fields: CoordinateFields::default(),
            tolerance_arcsec,
            mode: SeparationMode::Exact,
        }
    }

    pub fn with_fields(mut self, fields: CoordinateFields, other_fields: CoordinateFields) -> Self {
        self.fields = fields;
        self.other_fields = other_fields;
        self
    }

    /// For each row of `other`, the master row within tolerance, plus the
    /// distance in arcsec to the nearest master row.
    fn master_rows_for(&self, master: &Catalog, other: &Catalog) -> CatalogResult<Vec<(Option<usize>, Option<f64>)>> {
        let matches = match_catalogs(other, &self.other_fields, master, &self.fields, self.mode)?;
        Ok(matches
            .into_iter()
            .map(|m| match m {
                Some(m) => {
                    let d = m.separation_arcsec();
                    ((d < self.tolerance_arcsec).then_some(m.row), Some(d))
                }
                None => (None, None),
            })
            .collect())
    }

    /// For each master row, the row of `other` within tolerance.
    fn other_rows_for(&self, master: &Catalog, other: &Catalog) -> CatalogResult<Vec<Option<usize>>> {
        let matches = match_catalogs(master, &self.fields, other, &self.other_fields, self.mode)?;
        Ok(matches
            .into_iter()
            .map(|m| m.filter(|m| m.separation_arcsec() < self.tolerance_arcsec).map(|m| m.row))
            .collect())
    }
}

/// Removes every master row that is the positional counterpart of a
/// remove-list entry.
///
/// Entries without a counterpart are an `UnmatchedPosition` error under
/// [`UnmatchedPolicy::Error`], and are logged and skipped under
/// [`UnmatchedPolicy::Warn`].
pub fn remove_listed(
    master: &Catalog,
    remove_list: &Catalog,
    matching: &PositionalMatch,
    policy: UnmatchedPolicy,
) -> CatalogResult<Catalog> {
    if remove_list.is_empty() {
        return Ok(master.clone());
    }
    let counterparts = matching.master_rows_for(master, remove_list)?;

    let unmatched: Vec<String> = counterparts
        .iter()
        .enumerate()
        .filter(|(_, (row, _))| row.is_none())
        .map(|(i, (_, d))| match d {
            Some(d) => format!("{} ({:.3} arcsec)", i, d),
            None => format!("{} (no coordinates)", i),
        })
        .collect();
    if !unmatched.is_empty() {
        let msg = format!(
            "no counterpart within {} arcsec for remove-list entries {}",
            matching.tolerance_arcsec,
            unmatched.join(", ")
        );
        match policy {
            UnmatchedPolicy::Error => {
                return Err(CatalogError::unmatched_position(remove_list.name(), &msg));
            }
            UnmatchedPolicy::Warn => warn!(remove_list = remove_list.name(), "{}, continuing", msg),
        }
    }

    let mut mask = Mask::all(master.len());
    for row in counterparts.iter().filter_map(|(row, _)| *row) {
        mask.set(row, false);
    }
    let kept = master.filter(&mask)?;
    info!(
        remove_list = remove_list.name(),
        removed = master.len() - kept.len(),
        "applied remove list"
    );
    Ok(kept)
}

/// Copies `source` of another catalog into `target` of the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub target: String,
    pub source: String,
    #[serde(default)]
    pub scale: Option<f64>,
}

impl ColumnMapping {
    pub fn new(target: &str, source: &str) -> Self {
        Self {
            target: target.to_string(),
            source: source.to_string(),
            scale: None,
        }
    }

    pub fn scaled(target: &str, source: &str, scale: f64) -> Self {
        Self {
            scale: Some(scale),
            ..Self::new(target, source)
        }
    }

    fn convert(&self, value: &Value, context: &str) -> CatalogResult<Value> {
        match (self.scale, value) {
            (_, Value::Absent) | (None, _) => Ok(value.clone()),
            (Some(s), v) => v.as_f64().map(|x| Value::Float(x * s)).ok_or_else(|| {
                CatalogError::schema_mismatch(
                    context,
                    &self.source,
                    &format!("holds non-numeric value '{}' but a scale is configured", v),
                )
            }),
        }
    }
}

struct ResolvedMapping<'a> {
    mapping: &'a ColumnMapping,
    target: usize,
    source: usize,
}

fn resolve_mappings<'a>(
    master: &Catalog,
    other: &Catalog,
    mappings: &'a [ColumnMapping],
) -> CatalogResult<Vec<ResolvedMapping<'a>>> {
    mappings
        .iter()
        .map(|m| {
            Ok(ResolvedMapping {
                mapping: m,
                target: master.schema().require(master.name(), &m.target)?,
                source: other.schema().require(other.name(), &m.source)?,
            })
        })
        .collect()
}

/// Fills absent master values from the positional counterpart in
/// `supplement`. Present values are never overwritten. Returns the number of
/// cells filled.
pub fn supplement_missing(
    master: &mut Catalog,
    supplement: &Catalog,
    matching: &PositionalMatch,
    mappings: &[ColumnMapping],
) -> CatalogResult<usize> {
    let resolved = resolve_mappings(master, supplement, mappings)?;
    let counterparts = matching.other_rows_for(master, supplement)?;

    let mut updates = Vec::new();
    for (row, other_row) in counterparts.iter().enumerate() {
        let Some(other_row) = *other_row else { continue };
        let master_row = master.row(row).values();
        for r in &resolved {
            if master_row[r.target].is_absent() {
                let value = r
                    .mapping
                    .convert(&supplement.row(other_row).values()[r.source], supplement.name())?;
                if value.is_present() {
                    updates.push((row, r.mapping.target.as_str(), value));
                }
            }
        }
    }

    let filled = updates.len();
    for (row, field, value) in updates {
        master.set(row, field, value)?;
    }
    debug!(
        master = master.name(),
        supplement = supplement.name(),
        filled,
        "supplemented missing values"
    );
    Ok(filled)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendSummary {
    pub appended: usize,
    pub filled: usize,
}

/// Appends rows of `extra` that match no master row within tolerance, and
/// fills absent mapped values of master rows that do match.
///
/// Appended rows take their coordinates and mapped fields from `extra`; every
/// other field is absent.
pub fn append_unmatched(
    master: &mut Catalog,
    extra: &Catalog,
    matching: &PositionalMatch,
    mappings: &[ColumnMapping],
) -> CatalogResult<AppendSummary> {
    let resolved = resolve_mappings(master, extra, mappings)?;
    let counterparts = matching.master_rows_for(master, extra)?;
    let ra = master.schema().require(master.name(), &matching.fields.ra)?;
    let dec = master.schema().require(master.name(), &matching.fields.dec)?;
    let extra_coords = extra.coordinates(&matching.other_fields)?;
    let width = master.schema().len();

    let mut new_rows = Vec::new();
    let mut updates = Vec::new();
    for (i, (counterpart, _)) in counterparts.iter().enumerate() {
        let values = extra.row(i).values();
        match (counterpart, extra_coords[i]) {
            (Some(row), _) => {
                let master_row = master.row(*row).values();
                for r in resolved.iter().filter(|r| master_row[r.target].is_absent()) {
                    let value = r.mapping.convert(&values[r.source], extra.name())?;
                    if value.is_present() {
                        updates.push((*row, r.mapping.target.as_str(), value));
                    }
                }
            }
            (None, Some((ra_deg, dec_deg))) => {
                let mut out = vec![Value::Absent; width];
                out[ra] = Value::Float(ra_deg);
                out[dec] = Value::Float(dec_deg);
                for r in &resolved {
                    out[r.target] = r.mapping.convert(&values[r.source], extra.name())?;
                }
                new_rows.push(out);
            }
            // no coordinates: cannot be placed on the sky
            (None, None) => {}
        }
    }

    let summary = AppendSummary {
        appended: new_rows.len(),
        filled: updates.len(),
    };
    for (row, field, value) in updates {
        master.set(row, field, value)?;
    }
    for row in new_rows {
        master.push_row(row)?;
    }
    info!(
        master = master.name(),
        extra = extra.name(),
        appended = summary.appended,
        filled = summary.filled,
        "appended unmatched rows"
    );
    Ok(summary)
}
