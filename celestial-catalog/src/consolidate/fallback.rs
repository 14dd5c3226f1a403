//! Ordered fallback merge: one output field from several sources, first
//! present source wins, decided independently for every row.

use crate::error::{CatalogError, CatalogResult};
use crate::record::{Catalog, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Restricts a source to rows where `field` equals `equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub equals: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSource {
    pub field: String,
    /// Multiplier applied to numeric values (hours → degrees, z → km/s).
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub when: Option<Condition>,
}

impl FallbackSource {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            scale: None,
            when: None,
        }
    }
}

/// Priority-ordered sources for one output field, highest priority first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackChain {
    pub output: String,
    pub sources: Vec<FallbackSource>,
}

impl FallbackChain {
    pub fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
            sources: Vec::new(),
        }
    }

    /// Chain over plain source fields.
    pub fn of(output: &str, fields: &[&str]) -> Self {
        fields
            .iter()
            .fold(Self::new(output), |chain, f| chain.source(f))
    }

    pub fn source(mut self, field: &str) -> Self {
        self.sources.push(FallbackSource::new(field));
        self
    }

    pub fn scaled(mut self, field: &str, scale: f64) -> Self {
        self.sources.push(FallbackSource {
            scale: Some(scale),
            ..FallbackSource::new(field)
        });
        self
    }

    pub fn source_when(mut self, field: &str, condition_field: &str, equals: Value) -> Self {
        self.sources.push(FallbackSource {
            when: Some(Condition {
                field: condition_field.to_string(),
                equals,
            }),
            ..FallbackSource::new(field)
        });
        self
    }

    /// Computes the merged values without touching the catalog.
    pub fn merge(&self, catalog: &Catalog) -> CatalogResult<Vec<Value>> {
        let context = format!("fallback '{}'", self.output);
        if self.sources.is_empty() {
            return Err(CatalogError::schema_mismatch(&context, &self.output, "has no source fields"));
        }

        let schema = catalog.schema();
        let mut resolved = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let pos = schema.require(&context, &source.field)?;
            let cond = match &source.when {
                Some(c) => Some((schema.require(&context, &c.field)?, &c.equals)),
                None => None,
            };
            resolved.push((source, pos, cond));
        }

        let mut merged = Vec::with_capacity(catalog.len());
        for row in catalog.rows() {
            let values = row.values();
            let mut out = Value::Absent;
            for (source, pos, cond) in &resolved {
                if let Some((cpos, equals)) = cond {
                    if !values[*cpos].matches(equals) {
                        continue;
                    }
                }
                let value = &values[*pos];
                if value.is_absent() {
                    continue;
                }
                out = match (source.scale, value) {
                    (None, v) => v.clone(),
                    (Some(s), v) => match v.as_f64() {
                        Some(x) => Value::Float(x * s),
                        None => {
                            return Err(CatalogError::schema_mismatch(
                                &context,
                                &source.field,
                                &format!("holds non-numeric value '{}' but a scale is configured", v),
                            ))
                        }
                    },
                };
                break;
            }
            merged.push(out);
        }
        Ok(merged)
    }

    /// Writes the merged field into `catalog`, replacing it if it exists.
    pub fn apply(&self, catalog: &mut Catalog) -> CatalogResult<()> {
        let merged = self.merge(catalog)?;
        let filled = merged.iter().filter(|v| v.is_present()).count();
        catalog.set_column(&self.output, merged)?;
        debug!(
            output = %self.output,
            sources = self.sources.len(),
            filled,
            rows = catalog.len(),
            "fallback merge"
        );
        Ok(())
    }
}

/// Sets `output` to the first present of `sources` on every row.
pub fn merge_fallback(catalog: &mut Catalog, output: &str, sources: &[&str]) -> CatalogResult<()> {
    FallbackChain::of(output, sources).apply(catalog)
}
