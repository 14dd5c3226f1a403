//! Joins mediated by sky position.
//!
//! The right catalog has no key of its own, so each right row borrows the key
//! of its nearest left row when that row lies within the tolerance. Rows
//! without such a neighbour get the "unmatched" sentinel, never an absent
//! key. After optional duplicate resolution the result is key-joined back to
//! the left catalog.

use super::duplicates::{default_distance_field, resolve_duplicate_keys, DuplicateResolution};
use super::join::{JoinType, KeyJoin};
use crate::error::CatalogResult;
use crate::record::{Catalog, CoordinateFields, Value};
use crate::spatial::{match_catalogs, SeparationMode};
use celestial_core::constants::ARCSEC_PER_DEG;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionJoin {
    /// Key join performed once keys are assigned; `join.key` names the key field.
    pub join: KeyJoin,
    pub tolerance_arcsec: f64,
    #[serde(default)]
    pub left_coordinates: CoordinateFields,
    #[serde(default)]
    pub right_coordinates: CoordinateFields,
    #[serde(default)]
    pub mode: SeparationMode,
    /// Column written on the right catalog with the nearest-neighbour distance.
    #[serde(default = "default_distance_field")]
    pub distance_field: String,
    #[serde(default)]
    pub duplicates: Option<DuplicateResolution>,
}

impl PositionJoin {
    /// Outer join on `key` keeping matches closer than `tolerance_arcsec`.
    pub fn new(key: &str, tolerance_arcsec: f64) -> Self {
        Self {
            join: KeyJoin::new(key, JoinType::Outer),
            tolerance_arcsec,
            left_coordinates: CoordinateFields::default(),
            right_coordinates: CoordinateFields::default(),
            mode: SeparationMode::Exact,
            distance_field: default_distance_field(),
            duplicates: None,
        }
    }

    pub fn with_coordinates(mut self, left: CoordinateFields, right: CoordinateFields) -> Self {
        self.left_coordinates = left;
        self.right_coordinates = right;
        self
    }

    pub fn with_duplicates(mut self, rule: DuplicateResolution) -> Self {
        self.duplicates = Some(rule);
        self
    }

    pub fn with_join(mut self, join: KeyJoin) -> Self {
        self.join = join;
        self
    }

    /// Copy of `right` with the key column (replaced if present) and the
    /// match-distance column filled in, plus the per-row match distance in
    /// arcsec (`None` where the right row has no coordinates).
    pub fn assign_keys(&self, left: &Catalog, right: &Catalog) -> CatalogResult<(Catalog, Vec<Option<f64>>)> {
        let key = self.join.key.as_str();
        let left_keys = left.column(key)?;
        let matches = match_catalogs(
            right,
            &self.right_coordinates,
            left,
            &self.left_coordinates,
            self.mode,
        )?;

        let distances: Vec<Option<f64>> = matches
            .iter()
            .map(|m| m.map(|m| m.separation_deg * ARCSEC_PER_DEG))
            .collect();

        let keys: Vec<Value> = matches
            .iter()
            .zip(&distances)
            .map(|(m, d)| match (m, d) {
                (Some(m), Some(d)) if *d < self.tolerance_arcsec && left_keys[m.row].is_present() => {
                    left_keys[m.row].clone()
                }
                _ => self.join.unmatched.clone(),
            })
            .collect();
        let matched = keys.iter().filter(|k| !k.matches(&self.join.unmatched)).count();

        let mut assigned = right.clone();
        assigned.set_column(key, keys)?;
        assigned.set_column(
            &self.distance_field,
            distances.iter().map(|d| Value::from_option(*d)).collect(),
        )?;

        let reassigned = match &self.duplicates {
            Some(rule) => resolve_duplicate_keys(&mut assigned, key, rule, &self.join.unmatched)?,
            None => 0,
        };

        debug!(
            left = left.name(),
            right = right.name(),
            tolerance_arcsec = self.tolerance_arcsec,
            matched,
            reassigned,
            "assigned keys by position"
        );
        Ok((assigned, distances))
    }

    /// Assigns keys by position and key-joins the result to `left`.
    pub fn apply(&self, left: &Catalog, right: &Catalog) -> CatalogResult<(Catalog, Vec<Option<f64>>)> {
        let (assigned, distances) = self.assign_keys(left, right)?;
        let joined = self.join.apply(left, &assigned)?;
        info!(
            left = left.name(),
            right = right.name(),
            rows = joined.len(),
            "position join"
        );
        Ok((joined, distances))
    }
}

/// Outer join of `right` onto `left` by nearest neighbour within `tolerance_arcsec`,
/// on RA/Dec fields named `ra`/`dec`.
pub fn join_on_position(
    left: &Catalog,
    right: &Catalog,
    key: &str,
    tolerance_arcsec: f64,
) -> CatalogResult<(Catalog, Vec<Option<f64>>)> {
    PositionJoin::new(key, tolerance_arcsec).apply(left, right)
}
