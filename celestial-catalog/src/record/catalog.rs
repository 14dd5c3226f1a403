//! The in-memory catalog: an ordered sequence of rows sharing one [`Schema`].
//!
//! Rows are stored positionally against the schema, so every row always has
//! exactly one value per field. Operations that add a field add it to every
//! row; the only operations that drop rows are [`Catalog::filter`] and
//! [`Catalog::take`].

use super::mask::Mask;
use super::schema::{CoordinateFields, FieldAliases, Schema};
use super::value::Value;
use crate::error::{CatalogError, CatalogResult};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    name: String,
    schema: Schema,
    rows: Vec<Vec<Value>>,
}

/// Borrowed view of one catalog row with by-name access.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    index: usize,
    schema: &'a Schema,
    values: &'a [Value],
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Value of `field`, or `None` if the schema has no such field.
    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.schema.position(field).map(|pos| &self.values[pos])
    }

    /// Numeric value of `field`; `None` if missing, absent or text.
    pub fn f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

impl Catalog {
    pub fn new<S: AsRef<str>>(fields: &[S]) -> CatalogResult<Self> {
        Ok(Self {
            name: "catalog".to_string(),
            schema: Schema::new(fields)?,
            rows: Vec::new(),
        })
    }

    pub fn from_rows<S: AsRef<str>>(fields: &[S], rows: Vec<Vec<Value>>) -> CatalogResult<Self> {
        let mut catalog = Self::new(fields)?;
        catalog.rows.reserve(rows.len());
        for row in rows {
            catalog.push_row(row)?;
        }
        Ok(catalog)
    }

    pub(crate) fn from_parts(name: String, schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == schema.len()));
        Self { name, schema, rows }
    }

    /// Sets the name used in log lines and error contexts.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn field_names(&self) -> &[String] {
        self.schema.fields()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.schema.contains(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn declare_uncertainty(&mut self, field: &str, error_field: &str) -> CatalogResult<()> {
        self.schema.declare_uncertainty(field, error_field)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> CatalogResult<()> {
        if row.len() != self.schema.len() {
            return Err(CatalogError::schema_mismatch(
                &self.name,
                &format!("row {}", self.rows.len()),
                &format!(
                    "has {} values but the schema has {} fields",
                    row.len(),
                    self.schema.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// # Panics
    /// If `i` is out of range.
    pub fn row(&self, i: usize) -> Row<'_> {
        Row {
            index: i,
            schema: &self.schema,
            values: &self.rows[i],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().enumerate().map(move |(index, values)| Row {
            index,
            schema: &self.schema,
            values,
        })
    }

    pub fn get(&self, row: usize, field: &str) -> CatalogResult<&Value> {
        let pos = self.schema.require(&self.name, field)?;
        Ok(&self.rows[row][pos])
    }

    pub fn set(&mut self, row: usize, field: &str, value: Value) -> CatalogResult<()> {
        let pos = self.schema.require(&self.name, field)?;
        self.rows[row][pos] = value;
        Ok(())
    }

    pub fn column(&self, field: &str) -> CatalogResult<Vec<&Value>> {
        let pos = self.schema.require(&self.name, field)?;
        Ok(self.rows.iter().map(|r| &r[pos]).collect())
    }

    pub fn column_f64(&self, field: &str) -> CatalogResult<Vec<Option<f64>>> {
        let pos = self.schema.require(&self.name, field)?;
        Ok(self.rows.iter().map(|r| r[pos].as_f64()).collect())
    }

    /// (RA, Dec) per row; `None` where either coordinate is absent.
    pub fn coordinates(&self, fields: &CoordinateFields) -> CatalogResult<Vec<Option<(f64, f64)>>> {
        let ra = self.schema.require(&self.name, &fields.ra)?;
        let dec = self.schema.require(&self.name, &fields.dec)?;
        Ok(self
            .rows
            .iter()
            .map(|r| match (r[ra].as_f64(), r[dec].as_f64()) {
                (Some(a), Some(d)) if a.is_finite() && d.is_finite() => Some((a, d)),
                _ => None,
            })
            .collect())
    }

    /// Appends a new field holding `values`, one per row.
    pub fn add_column(&mut self, field: &str, values: Vec<Value>) -> CatalogResult<()> {
        self.check_column_len(field, values.len())?;
        self.schema.push(field)?;
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Replaces the values of `field`, adding the field if it does not exist yet.
    pub fn set_column(&mut self, field: &str, values: Vec<Value>) -> CatalogResult<()> {
        match self.schema.position(field) {
            Some(pos) => {
                self.check_column_len(field, values.len())?;
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[pos] = value;
                }
                Ok(())
            }
            None => self.add_column(field, values),
        }
    }

    pub fn add_absent_column(&mut self, field: &str) -> CatalogResult<()> {
        self.add_column(field, vec![Value::Absent; self.len()])
    }

    pub fn drop_field(&mut self, field: &str) -> CatalogResult<()> {
        let pos = self
            .schema
            .remove(field)
            .ok_or_else(|| CatalogError::missing_field(&self.name, field))?;
        for row in &mut self.rows {
            row.remove(pos);
        }
        Ok(())
    }

    /// Drops several fields; nothing is dropped unless all of them exist.
    pub fn drop_fields(&mut self, fields: &[&str]) -> CatalogResult<()> {
        for field in fields {
            self.schema.require(&self.name, field)?;
        }
        fields.iter().try_for_each(|field| self.drop_field(field))
    }

    pub fn rename_field(&mut self, from: &str, to: &str) -> CatalogResult<()> {
        self.schema.rename(from, to)
    }

    /// Renames source-specific spellings to canonical names.
    pub fn apply_aliases(&mut self, aliases: &FieldAliases) -> CatalogResult<()> {
        for entry in &aliases.entries {
            if self.has_field(&entry.canonical) {
                continue;
            }
            match entry.aliases.iter().find(|a| self.has_field(a)) {
                Some(alias) => {
                    let alias = alias.clone();
                    self.rename_field(&alias, &entry.canonical)?;
                }
                None if entry.required => {
                    return Err(CatalogError::schema_mismatch(
                        &self.name,
                        &entry.canonical,
                        &format!("has none of its aliases present: {}", entry.aliases.join(", ")),
                    ));
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Keeps the rows selected by `mask`, in order.
    pub fn filter(&self, mask: &Mask) -> CatalogResult<Catalog> {
        if mask.len() != self.len() {
            return Err(CatalogError::schema_mismatch(
                &self.name,
                "mask",
                &format!("has length {} but the catalog has {} rows", mask.len(), self.len()),
            ));
        }
        let rows = self
            .rows
            .iter()
            .zip(mask.as_slice())
            .filter(|(_, keep)| **keep)
            .map(|(r, _)| r.clone())
            .collect();
        Ok(Self::from_parts(self.name.clone(), self.schema.clone(), rows))
    }

    /// New catalog made of the given rows, in the given order (repeats allowed).
    ///
    /// # Panics
    /// If any index is out of range.
    pub fn take(&self, indices: &[usize]) -> Catalog {
        let rows = indices.iter().map(|&i| self.rows[i].clone()).collect();
        Self::from_parts(self.name.clone(), self.schema.clone(), rows)
    }

    /// Uniform random permutation of the rows.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.rows.shuffle(rng);
    }

    /// Appends the rows of `other`, which must have exactly the same field set
    /// (order may differ).
    pub fn vstack(&mut self, other: &Catalog) -> CatalogResult<()> {
        if other.schema.len() != self.schema.len() {
            return Err(CatalogError::schema_mismatch(
                &self.name,
                other.name(),
                &format!(
                    "cannot be stacked: {} fields vs {}",
                    other.schema.len(),
                    self.schema.len()
                ),
            ));
        }
        let mut mapping = Vec::with_capacity(self.schema.len());
        for field in self.schema.fields() {
            mapping.push(other.schema.require(other.name(), field)?);
        }
        for row in &other.rows {
            self.rows
                .push(mapping.iter().map(|&pos| row[pos].clone()).collect());
        }
        Ok(())
    }

    fn check_column_len(&self, field: &str, len: usize) -> CatalogResult<()> {
        if len != self.len() {
            return Err(CatalogError::schema_mismatch(
                &self.name,
                field,
                &format!("has {} values but the catalog has {} rows", len, self.len()),
            ));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        let doc: CatalogDocument =
            serde_json::from_str(json).map_err(|e| CatalogError::config("catalog", &e.to_string()))?;
        doc.try_into()
    }

    pub fn load_json(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::config(&path.display().to_string(), &e.to_string()))?;
        let doc: CatalogDocument = serde_json::from_str(&text)
            .map_err(|e| CatalogError::config(&path.display().to_string(), &e.to_string()))?;
        doc.try_into()
    }

    pub fn to_json_string(&self) -> CatalogResult<String> {
        serde_json::to_string(&CatalogDocument::from(self))
            .map_err(|e| CatalogError::config(&self.name, &e.to_string()))
    }
}

/// Serialized form of a [`Catalog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub name: Option<String>,
    pub fields: Vec<String>,
    #[serde(default)]
    pub uncertainties: HashMap<String, String>,
    pub rows: Vec<Vec<Value>>,
}

impl TryFrom<CatalogDocument> for Catalog {
    type Error = CatalogError;

    fn try_from(doc: CatalogDocument) -> CatalogResult<Self> {
        let mut catalog = Catalog::from_rows(&doc.fields, doc.rows)?;
        if let Some(name) = doc.name {
            catalog.name = name;
        }
        let mut pairs: Vec<_> = doc.uncertainties.into_iter().collect();
        pairs.sort();
        for (field, err) in pairs {
            catalog.declare_uncertainty(&field, &err)?;
        }
        Ok(catalog)
    }
}

impl From<&Catalog> for CatalogDocument {
    fn from(catalog: &Catalog) -> Self {
        Self {
            name: Some(catalog.name.clone()),
            fields: catalog.schema.fields().to_vec(),
            uncertainties: catalog.schema.uncertainties().clone(),
            rows: catalog.rows.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample() -> Catalog {
        Catalog::from_rows(
            &["id", "ra", "dec", "r"],
            vec![
                vec![1.into(), 10.0.into(), 20.0.into(), 17.5.into()],
                vec![2.into(), Value::Absent, 21.0.into(), 18.0.into()],
                vec![3.into(), 12.0.into(), 22.0.into(), Value::Absent],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_drop_fields_is_all_or_nothing() {
        let mut cat = sample();
        assert!(cat.drop_fields(&["r", "nope"]).is_err());
        assert_eq!(cat.field_names().len(), 4);
        cat.drop_fields(&["ra", "r"]).unwrap();
        assert_eq!(cat.field_names(), &["id", "dec"]);
        assert_eq!(cat.row(2).values(), &[Value::Int(3), Value::Float(22.0)]);
    }

    #[test]
    fn test_push_row_checks_arity() {
        let mut cat = Catalog::new(&["a", "b"]).unwrap();
        let err = cat.push_row(vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err, CatalogError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_add_column_reaches_every_row() {
        let mut cat = sample();
        cat.add_absent_column("dist").unwrap();
        assert!(cat.rows().all(|r| r.get("dist") == Some(&Value::Absent)));
        let err = cat.add_column("x", vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err, CatalogError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_coordinates_skip_absent() {
        let coords = sample().coordinates(&CoordinateFields::default()).unwrap();
        assert_eq!(coords[0], Some((10.0, 20.0)));
        assert_eq!(coords[1], None);
    }

    #[test]
    fn test_filter_preserves_order() {
        let cat = sample();
        let out = cat.filter(&Mask::from(vec![true, false, true])).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(1, "id").unwrap(), &Value::Int(3));
    }

    #[test]
    fn test_filter_rejects_wrong_length() {
        assert!(sample().filter(&Mask::all(2)).is_err());
    }

    #[test]
    fn test_vstack_matches_by_name() {
        let mut a = Catalog::from_rows(&["x", "y"], vec![vec![1.into(), 2.into()]]).unwrap();
        let b = Catalog::from_rows(&["y", "x"], vec![vec![20.into(), 10.into()]]).unwrap();
        a.vstack(&b).unwrap();
        assert_eq!(a.get(1, "x").unwrap(), &Value::Int(10));
        let c = Catalog::from_rows(&["x", "z"], vec![]).unwrap();
        assert!(a.vstack(&c).is_err());
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut cat = Catalog::from_rows(&["i"], (0..50).map(|i| vec![Value::Int(i)]).collect()).unwrap();
        cat.shuffle(&mut StdRng::seed_from_u64(7));
        let mut ids: Vec<i64> = cat.rows().map(|r| r.get("i").unwrap().as_i64().unwrap()).collect();
        assert_ne!(ids, (0..50).collect::<Vec<_>>());
        ids.sort();
        assert_eq!(ids, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_apply_aliases() {
        let mut cat = Catalog::new(&["RA", "DEC", "objid"]).unwrap();
        let aliases = FieldAliases::new()
            .alias("ra", &["RA", "obsra"], true)
            .alias("dec", &["DEC", "obsdec"], true)
            .alias("spec_class", &["class"], false);
        cat.apply_aliases(&aliases).unwrap();
        assert!(cat.has_field("ra") && cat.has_field("dec"));
        assert!(!cat.has_field("spec_class"));

        let strict = FieldAliases::new().alias("z", &["Z", "z_helio"], true);
        assert!(cat.apply_aliases(&strict).is_err());
    }

    #[test]
    fn test_json_document() {
        let json = r#"{
            "name": "sdss",
            "fields": ["ra", "dec", "r", "r_err"],
            "uncertainties": {"r": "r_err"},
            "rows": [[10.0, 20.0, 17.1, 0.02], [11.0, 21.0, null, null]]
        }"#;
        let cat = Catalog::from_json_str(json).unwrap();
        assert_eq!(cat.name(), "sdss");
        assert_eq!(cat.schema().uncertainty_of("r"), Some("r_err"));
        assert!(cat.get(1, "r").unwrap().is_absent());
        let again = Catalog::from_json_str(&cat.to_json_string().unwrap()).unwrap();
        assert_eq!(again, cat);
    }
}
