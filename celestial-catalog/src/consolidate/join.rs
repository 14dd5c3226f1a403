//! Exact-match joins on a key field.
//!
//! Output layout: every left field in order, then every right field except
//! the key. A non-key name defined on both sides is emitted twice with the
//! source tags as suffixes (`dist_edd`, `dist_kk`); names defined on one side
//! only pass through unchanged.
//!
//! Row order: left rows in order, each immediately followed by its right
//! matches in right order (one-to-many joins repeat the left row). Outer joins
//! then append the right rows nobody matched. Absent keys and the configured
//! "unmatched" sentinel never match anything.

use crate::error::{CatalogError, CatalogResult};
use crate::record::{Catalog, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Outer,
}

impl FromStr for JoinType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "outer" => Ok(Self::Outer),
            _ => Err(CatalogError::invalid_join_type(s)),
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Outer => "outer",
        };
        f.write_str(s)
    }
}

/// Hashable form of a key value. Integral floats collapse onto integers so
/// that `7` and `7.0` join.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum JoinKey {
    Int(i64),
    Text(String),
}

impl JoinKey {
    /// `Ok(None)` for values that never match: absent, or equal to `unmatched`.
    pub(crate) fn from_value(
        value: &Value,
        unmatched: &Value,
        context: &str,
        field: &str,
    ) -> CatalogResult<Option<Self>> {
        if value.is_absent() || value.matches(unmatched) {
            return Ok(None);
        }
        match value {
            Value::Int(i) => Ok(Some(Self::Int(*i))),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(Some(Self::Int(*f as i64))),
            Value::Float(f) => Err(CatalogError::schema_mismatch(
                context,
                field,
                &format!("holds non-integral key value {}", f),
            )),
            Value::Text(s) => Ok(Some(Self::Text(s.clone()))),
            Value::Absent => Ok(None),
        }
    }
}

/// Configuration of a key join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyJoin {
    pub key: String,
    pub join_type: JoinType,
    #[serde(default = "default_left_tag")]
    pub left_tag: String,
    #[serde(default = "default_right_tag")]
    pub right_tag: String,
    /// Key value meaning "matched nothing"; never joins.
    #[serde(default = "default_unmatched")]
    pub unmatched: Value,
}

fn default_left_tag() -> String {
    "left".to_string()
}

fn default_right_tag() -> String {
    "right".to_string()
}

pub(crate) fn default_unmatched() -> Value {
    Value::Int(-1)
}

impl KeyJoin {
    pub fn new(key: &str, join_type: JoinType) -> Self {
        Self {
            key: key.to_string(),
            join_type,
            left_tag: default_left_tag(),
            right_tag: default_right_tag(),
            unmatched: default_unmatched(),
        }
    }

    pub fn with_tags(mut self, left: &str, right: &str) -> Self {
        self.left_tag = left.to_string();
        self.right_tag = right.to_string();
        self
    }

    pub fn with_unmatched(mut self, sentinel: Value) -> Self {
        self.unmatched = sentinel;
        self
    }

    pub fn apply(&self, left: &Catalog, right: &Catalog) -> CatalogResult<Catalog> {
        let context = format!("join_on_key({} {} {})", left.name(), self.join_type, right.name());
        let left_key = left.schema().require(&context, &self.key)?;
        let right_key = right.schema().require(&context, &self.key)?;

        let layout = self.output_layout(left, right, &context)?;

        let mut by_key: HashMap<JoinKey, Vec<usize>> = HashMap::new();
        for (i, row) in right.rows().enumerate() {
            if let Some(k) = JoinKey::from_value(&row.values()[right_key], &self.unmatched, &context, &self.key)? {
                by_key.entry(k).or_default().push(i);
            }
        }

        let right_width = right.schema().len() - 1;
        let mut right_used = vec![false; right.len()];
        let mut rows = Vec::new();

        for lrow in left.rows() {
            let key = JoinKey::from_value(&lrow.values()[left_key], &self.unmatched, &context, &self.key)?;
            let matches = key.as_ref().and_then(|k| by_key.get(k));
            match matches {
                Some(indices) => {
                    for &ri in indices {
                        right_used[ri] = true;
                        let mut out = lrow.values().to_vec();
                        out.extend(non_key_values(right.row(ri).values(), right_key));
                        rows.push(out);
                    }
                }
                None if self.join_type != JoinType::Inner => {
                    let mut out = lrow.values().to_vec();
                    out.extend(std::iter::repeat(Value::Absent).take(right_width));
                    rows.push(out);
                }
                None => {}
            }
        }

        let matched_right = right_used.iter().filter(|u| **u).count();
        if self.join_type == JoinType::Outer {
            let left_width = left.schema().len();
            for (ri, used) in right_used.iter().enumerate() {
                if *used {
                    continue;
                }
                let rvals = right.row(ri).values();
                let mut out = vec![Value::Absent; left_width];
                out[left_key] = rvals[right_key].clone();
                out.extend(non_key_values(rvals, right_key));
                rows.push(out);
            }
        }

        let mut joined = Catalog::from_rows(&layout.fields, rows)?
            .with_name(&format!("{}+{}", left.name(), right.name()));
        for (field, err) in layout.uncertainties {
            joined.declare_uncertainty(&field, &err)?;
        }

        debug!(
            left = left.len(),
            right = right.len(),
            matched_right,
            rows = joined.len(),
            join_type = %self.join_type,
            key = %self.key,
            "key join"
        );
        Ok(joined)
    }

    fn output_layout(&self, left: &Catalog, right: &Catalog, context: &str) -> CatalogResult<Layout> {
        let left_names: HashSet<&str> = left.field_names().iter().map(String::as_str).collect();
        let right_names: HashSet<&str> = right.field_names().iter().map(String::as_str).collect();
        let collides = |name: &str| name != self.key && left_names.contains(name) && right_names.contains(name);

        let has_collision = left.field_names().iter().any(|f| collides(f.as_str()));
        if has_collision && (self.left_tag.is_empty() || self.right_tag.is_empty() || self.left_tag == self.right_tag) {
            let field = left
                .field_names()
                .iter()
                .find(|f| collides(f.as_str()))
                .map(String::as_str)
                .unwrap_or_default();
            return Err(CatalogError::key_collision(
                context,
                field,
                &format!(
                    "is defined on both sides but the source tags '{}' and '{}' cannot tell them apart",
                    self.left_tag, self.right_tag
                ),
            ));
        }

        let mut left_map = HashMap::new();
        let mut right_map = HashMap::new();
        let mut fields = Vec::with_capacity(left.schema().len() + right.schema().len());
        for f in left.field_names() {
            let out = if collides(f.as_str()) { format!("{}_{}", f, self.left_tag) } else { f.clone() };
            left_map.insert(f.as_str(), out.clone());
            fields.push(out);
        }
        for f in right.field_names().iter().filter(|f| **f != self.key) {
            let out = if collides(f.as_str()) { format!("{}_{}", f, self.right_tag) } else { f.clone() };
            right_map.insert(f.as_str(), out.clone());
            fields.push(out);
        }

        let mut seen = HashSet::new();
        for f in &fields {
            if !seen.insert(f.as_str()) {
                return Err(CatalogError::key_collision(
                    context,
                    f,
                    "appears twice after suffixing; rename one source field or choose other tags",
                ));
            }
        }

        let mut uncertainties = Vec::new();
        for (map, cat) in [(&left_map, left), (&right_map, right)] {
            for (field, err) in cat.schema().uncertainties() {
                if let (Some(f), Some(e)) = (map.get(field.as_str()), map.get(err.as_str())) {
                    uncertainties.push((f.clone(), e.clone()));
                }
            }
        }

        Ok(Layout { fields, uncertainties })
    }
}

struct Layout {
    fields: Vec<String>,
    uncertainties: Vec<(String, String)>,
}

fn non_key_values(values: &[Value], key: usize) -> impl Iterator<Item = Value> + '_ {
    values
        .iter()
        .enumerate()
        .filter(move |(i, _)| *i != key)
        .map(|(_, v)| v.clone())
}

/// Joins `left` and `right` on `key` with default `left`/`right` tags and the
/// `-1` unmatched sentinel.
pub fn join_on_key(left: &Catalog, right: &Catalog, key: &str, join_type: JoinType) -> CatalogResult<Catalog> {
    KeyJoin::new(key, join_type).apply(left, right)
}
