//! Assembly of the final observing target list.

use crate::host::Host;
use crate::rank::ReservedRanks;
use celestial_catalog::{Catalog, CatalogError, CatalogResult, CoordinateFields, Value};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    #[serde(rename = "TARGET")]
    Target,
    #[serde(rename = "guide")]
    Guide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub ra: f64,
    pub dec: f64,
    pub name: String,
    pub rank: u32,
    pub kind: TargetKind,
    pub mag: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetListConfig {
    pub name_field: String,
    pub magnitude_field: String,
    pub coordinates: CoordinateFields,
    /// How many times each calibration star is listed.
    pub repeat_flux: usize,
    pub reserved: ReservedRanks,
}

impl Default for TargetListConfig {
    fn default() -> Self {
        Self {
            name_field: "objID".to_string(),
            magnitude_field: "r".to_string(),
            coordinates: CoordinateFields::default(),
            repeat_flux: 1,
            reserved: ReservedRanks::default(),
        }
    }
}

struct Source<'a> {
    name: Vec<&'a Value>,
    mag: Vec<Option<f64>>,
    coords: Vec<Option<(f64, f64)>>,
}

impl<'a> Source<'a> {
    fn read(catalog: &'a Catalog, config: &TargetListConfig) -> CatalogResult<Self> {
        Ok(Self {
            name: catalog.column(&config.name_field)?,
            mag: catalog.column_f64(&config.magnitude_field)?,
            coords: catalog.coordinates(&config.coordinates)?,
        })
    }

    fn name(&self, i: usize) -> String {
        match self.name[i] {
            Value::Absent => format!("row{}", i),
            v => v.to_string(),
        }
    }
}

/// Host first, then ranked science targets in catalog order, calibration
/// stars (each `repeat_flux` times, named `{name}_1`, `{name}_2`, ...) and
/// guide stars.
///
/// Targets without a rank and rows without coordinates are left out.
pub fn build_target_list(
    host: &Host,
    targets: &Catalog,
    ranks: &[Option<u32>],
    flux: &Catalog,
    guide: &Catalog,
    config: &TargetListConfig,
) -> CatalogResult<Vec<TargetEntry>> {
    if ranks.len() != targets.len() {
        return Err(CatalogError::schema_mismatch(
            "target list",
            "rank",
            &format!("{} ranks given for {} targets", ranks.len(), targets.len()),
        ));
    }
    let reserved = config.reserved;
    let mut entries = vec![TargetEntry {
        ra: host.ra,
        dec: host.dec,
        name: host.name.clone(),
        rank: reserved.reference,
        kind: TargetKind::Target,
        mag: host.magnitude,
    }];

    let science = Source::read(targets, config)?;
    for (i, rank) in ranks.iter().enumerate() {
        let (Some(rank), Some((ra, dec))) = (rank, science.coords[i]) else {
            continue;
        };
        entries.push(TargetEntry {
            ra,
            dec,
            name: science.name(i),
            rank: *rank,
            kind: TargetKind::Target,
            mag: science.mag[i],
        });
    }
    let n_targets = entries.len() - 1;

    let stars = Source::read(flux, config)?;
    for i in 0..flux.len() {
        let Some((ra, dec)) = stars.coords[i] else {
            continue;
        };
        let name = stars.name(i);
        for n in 1..=config.repeat_flux {
            entries.push(TargetEntry {
                ra,
                dec,
                name: format!("{}_{}", name, n),
                rank: reserved.calibration,
                kind: TargetKind::Target,
                mag: stars.mag[i],
            });
        }
    }

    let guides = Source::read(guide, config)?;
    for i in 0..guide.len() {
        let Some((ra, dec)) = guides.coords[i] else {
            continue;
        };
        entries.push(TargetEntry {
            ra,
            dec,
            name: guides.name(i),
            rank: reserved.guide,
            kind: TargetKind::Guide,
            mag: guides.mag[i],
        });
    }

    info!(
        host = %host.name,
        targets = n_targets,
        flux_stars = flux.len(),
        guide_stars = guide.len(),
        entries = entries.len(),
        "built target list"
    );
    Ok(entries)
}
