//! Ordered field sets, uncertainty companions and alias resolution.

use crate::error::{CatalogError, CatalogResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Names of the two coordinate fields (RA, Dec in degrees) of a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateFields {
    pub ra: String,
    pub dec: String,
}

impl CoordinateFields {
    pub fn new(ra: &str, dec: &str) -> Self {
        Self {
            ra: ra.to_string(),
            dec: dec.to_string(),
        }
    }
}

impl Default for CoordinateFields {
    fn default() -> Self {
        Self::new("ra", "dec")
    }
}

/// The field set shared by every row of a catalog.
///
/// Names are unique and ordered; lookup by name is O(1). A field may declare an
/// uncertainty companion (e.g. `r` → `r_err`), which the color-cut stage uses
/// for uncertainty padding.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<String>,
    index: HashMap<String, usize>,
    uncertainties: HashMap<String, String>,
}

impl Schema {
    pub fn new<S: AsRef<str>>(fields: &[S]) -> CatalogResult<Self> {
        let mut schema = Self {
            fields: Vec::with_capacity(fields.len()),
            index: HashMap::with_capacity(fields.len()),
            uncertainties: HashMap::new(),
        };
        for name in fields {
            schema.push(name.as_ref())?;
        }
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Like [`position`](Self::position), but a missing field is a
    /// [`SchemaMismatch`](CatalogError::SchemaMismatch) attributed to `context`.
    pub fn require(&self, context: &str, name: &str) -> CatalogResult<usize> {
        self.position(name)
            .ok_or_else(|| CatalogError::missing_field(context, name))
    }

    pub(crate) fn push(&mut self, name: &str) -> CatalogResult<usize> {
        if self.index.contains_key(name) {
            return Err(CatalogError::duplicate_field("schema", name));
        }
        let pos = self.fields.len();
        self.fields.push(name.to_string());
        self.index.insert(name.to_string(), pos);
        Ok(pos)
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<usize> {
        let pos = self.index.remove(name)?;
        self.fields.remove(pos);
        for (i, field) in self.fields.iter().enumerate().skip(pos) {
            self.index.insert(field.clone(), i);
        }
        self.uncertainties.remove(name);
        self.uncertainties.retain(|_, err| err != name);
        Some(pos)
    }

    pub(crate) fn rename(&mut self, from: &str, to: &str) -> CatalogResult<()> {
        if from == to {
            return self.require("rename_field", from).map(|_| ());
        }
        if self.contains(to) {
            return Err(CatalogError::duplicate_field("rename_field", to));
        }
        let pos = self.require("rename_field", from)?;
        self.index.remove(from);
        self.index.insert(to.to_string(), pos);
        self.fields[pos] = to.to_string();
        if let Some(err) = self.uncertainties.remove(from) {
            self.uncertainties.insert(to.to_string(), err);
        }
        for err in self.uncertainties.values_mut() {
            if err == from {
                *err = to.to_string();
            }
        }
        Ok(())
    }

    /// Declares `error_field` as the 1σ uncertainty of `field`. Both must exist.
    pub fn declare_uncertainty(&mut self, field: &str, error_field: &str) -> CatalogResult<()> {
        self.require("declare_uncertainty", field)?;
        self.require("declare_uncertainty", error_field)?;
        self.uncertainties
            .insert(field.to_string(), error_field.to_string());
        Ok(())
    }

    pub fn uncertainty_of(&self, field: &str) -> Option<&str> {
        self.uncertainties.get(field).map(String::as_str)
    }

    pub fn uncertainties(&self) -> &HashMap<String, String> {
        &self.uncertainties
    }

    /// Returns the first candidate present in the schema.
    ///
    /// Catalogs from different sources spell the same quantity differently
    /// (`ra`/`RA`/`obsra`); callers list the spellings they accept, in order.
    pub fn resolve_alias<'a>(&self, candidates: &[&'a str]) -> CatalogResult<&'a str> {
        candidates
            .iter()
            .copied()
            .find(|name| self.contains(name))
            .ok_or_else(|| {
                CatalogError::schema_mismatch(
                    "resolve_alias",
                    &candidates.join("|"),
                    "matches none of the schema fields",
                )
            })
    }
}

/// A declared set of spellings for canonical field names.
///
/// Applying it renames, for each canonical name, the first alias found in the
/// catalog. Canonical names with no alias present are left alone unless they
/// are marked required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldAliases {
    pub entries: Vec<AliasEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub canonical: String,
    pub aliases: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

impl FieldAliases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, canonical: &str, aliases: &[&str], required: bool) -> Self {
        self.entries.push(AliasEntry {
            canonical: canonical.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            required,
        });
        self
    }
}
