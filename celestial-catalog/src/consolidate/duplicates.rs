//! Reduce a catalog to at most one row per key value.
//!
//! After positional key assignment several rows can claim the same key. One
//! claimant per key is kept according to a [`DuplicateResolution`] rule; every
//! other claimant has its key replaced by the "unmatched" sentinel, so later
//! key joins treat it as unmatched rather than dropping it.

use super::join::JoinKey;
use crate::error::CatalogResult;
use crate::record::{Catalog, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extremum {
    Min,
    Max,
}

/// Which claimant of a repeated key survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DuplicateResolution {
    /// Smallest value of the match-distance field.
    Closest {
        #[serde(default = "default_distance_field")]
        distance_field: String,
    },
    /// Extremum of an arbitrary numeric field, e.g. the brightest absolute magnitude.
    Field { name: String, extremum: Extremum },
}

pub(crate) fn default_distance_field() -> String {
    "match_dist_arcsec".to_string()
}

impl DuplicateResolution {
    pub fn closest() -> Self {
        Self::Closest {
            distance_field: default_distance_field(),
        }
    }

    pub fn minimum(field: &str) -> Self {
        Self::Field {
            name: field.to_string(),
            extremum: Extremum::Min,
        }
    }

    pub fn maximum(field: &str) -> Self {
        Self::Field {
            name: field.to_string(),
            extremum: Extremum::Max,
        }
    }

    fn criterion(&self) -> (&str, Extremum) {
        match self {
            Self::Closest { distance_field } => (distance_field.as_str(), Extremum::Min),
            Self::Field { name, extremum } => (name.as_str(), *extremum),
        }
    }
}

/// Keeps one row per key in `catalog[key]` and sets the key of every other
/// claimant to `unmatched`. Returns how many keys were reassigned.
///
/// Deterministic for a given row order: rows with an absent criterion lose to
/// rows with a present one, and exact ties go to the first occurrence.
/// Running it again on its own output changes nothing.
pub fn resolve_duplicate_keys(
    catalog: &mut Catalog,
    key: &str,
    rule: &DuplicateResolution,
    unmatched: &Value,
) -> CatalogResult<usize> {
    let context = format!("resolve_duplicate_keys({})", catalog.name());
    let (criterion_field, extremum) = rule.criterion();
    let keys = catalog.column(key)?;
    let criterion = catalog.column_f64(criterion_field)?;

    let mut groups: HashMap<JoinKey, Vec<usize>> = HashMap::new();
    for (i, value) in keys.iter().enumerate() {
        if let Some(k) = JoinKey::from_value(value, unmatched, &context, key)? {
            groups.entry(k).or_default().push(i);
        }
    }

    let mut losers: Vec<usize> = Vec::new();
    for rows in groups.values().filter(|rows| rows.len() > 1) {
        let mut best = rows[0];
        for &candidate in &rows[1..] {
            if beats(criterion[candidate], criterion[best], extremum) {
                best = candidate;
            }
        }
        losers.extend(rows.iter().copied().filter(|&r| r != best));
    }
    losers.sort_unstable();

    for &row in &losers {
        catalog.set(row, key, unmatched.clone())?;
    }

    debug!(
        catalog = catalog.name(),
        key,
        criterion = criterion_field,
        reassigned = losers.len(),
        "resolved duplicate keys"
    );
    Ok(losers.len())
}

/// Strict improvement only, so earlier rows keep ties.
fn beats(candidate: Option<f64>, incumbent: Option<f64>, extremum: Extremum) -> bool {
    match (candidate, incumbent) {
        (Some(c), Some(i)) => match extremum {
            Extremum::Min => c < i,
            Extremum::Max => c > i,
        },
        (Some(c), None) => !c.is_nan(),
        (None, _) => false,
    }
}
