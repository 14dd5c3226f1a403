//! Calibration (flux standard), guide and fiber positioning star selection
//! from photometric catalogs of the field.

use celestial_catalog::{Catalog, CatalogError, CatalogResult, Mask, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Spectrophotometric standards sit in `15.5 < g < 17`.
pub const SPECPHOT_G_RANGE: (f64, f64) = (15.5, 17.0);
/// Reddening standards sit in `17 < g < 18.5`.
pub const REDDENING_G_RANGE: (f64, f64) = (17.0, 18.5);

/// F-star colour box used for flux calibration stars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluxStarCriteria {
    pub type_field: String,
    pub star_class: Value,
    pub u_field: String,
    pub g_field: String,
    pub r_field: String,
    /// Subtract `{prefix}{band}` extinction fields before computing colours.
    pub extinction_prefix: Option<String>,
    /// Open range on r; the order of the two limits does not matter.
    pub r_range: (f64, f64),
}

impl Default for FluxStarCriteria {
    fn default() -> Self {
        Self {
            type_field: "type".to_string(),
            star_class: Value::Int(6),
            u_field: "u".to_string(),
            g_field: "g".to_string(),
            r_field: "r".to_string(),
            extinction_prefix: None,
            r_range: (17.0, 17.7),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideStarCriteria {
    pub type_field: String,
    pub star_class: Value,
    pub magnitude_field: String,
    pub magnitude_range: (f64, f64),
}

impl Default for GuideStarCriteria {
    fn default() -> Self {
        Self {
            type_field: "type".to_string(),
            star_class: Value::Int(6),
            magnitude_field: "r".to_string(),
            magnitude_range: (14.0, 15.0),
        }
    }
}

/// Fiber positioning stars from an astrometric catalog such as USNO-B,
/// where a zero magnitude means "not measured".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FopCriteria {
    pub magnitude_field: String,
    /// Second-epoch magnitude that must also have been measured.
    pub confirm_field: String,
    pub magnitude_range: (f64, f64),
    pub randomize: bool,
    pub seed: Option<u64>,
}

impl Default for FopCriteria {
    fn default() -> Self {
        Self {
            magnitude_field: "R2".to_string(),
            confirm_field: "R1".to_string(),
            magnitude_range: (12.0, 13.5),
            randomize: true,
            seed: None,
        }
    }
}

fn ordered(stage: &str, parameter: &str, (a, b): (f64, f64)) -> CatalogResult<(f64, f64)> {
    if a.is_nan() || b.is_nan() || a == b {
        return Err(CatalogError::invalid_cut(
            stage,
            parameter,
            &format!("range ({}, {}) is empty", a, b),
        ));
    }
    Ok((a.min(b), a.max(b)))
}

fn inside(value: f64, (lo, hi): (f64, f64)) -> bool {
    lo < value && value < hi
}

/// Stars in the F-star colour box that are either spectrophotometric or
/// reddening standards by g magnitude, and inside the r range.
pub fn select_flux_stars(catalog: &Catalog, criteria: &FluxStarCriteria) -> CatalogResult<Catalog> {
    let r_range = ordered("flux_stars", "r_range", criteria.r_range)?;
    let class = catalog.column(&criteria.type_field)?;
    let band = |field: &str, band: &str| -> CatalogResult<Vec<Option<f64>>> {
        let mut mag = catalog.column_f64(field)?;
        if let Some(prefix) = &criteria.extinction_prefix {
            let extinction = catalog.column_f64(&format!("{}{}", prefix, band))?;
            for (m, a) in mag.iter_mut().zip(extinction) {
                *m = m.zip(a).map(|(m, a)| m - a);
            }
        }
        Ok(mag)
    };
    let u = band(&criteria.u_field, "u")?;
    let g = band(&criteria.g_field, "g")?;
    let r = band(&criteria.r_field, "r")?;

    let mask = Mask::from_fn(catalog.len(), |i| {
        if !class[i].matches(&criteria.star_class) {
            return false;
        }
        let (Some(u), Some(g), Some(r)) = (u[i], g[i], r[i]) else {
            return false;
        };
        let umg = u - g;
        let gmr = g - r;
        let std_color = inside(umg, (0.6, 1.2)) && inside(gmr, (0.0, 0.6)) && gmr > 0.75 * umg - 0.45;
        let standard = inside(g, SPECPHOT_G_RANGE) || inside(g, REDDENING_G_RANGE);
        std_color && standard && inside(r, r_range)
    });
    debug!(candidates = catalog.len(), selected = mask.count_selected(), "flux stars");
    catalog.filter(&mask)
}

/// Point sources inside the magnitude range.
pub fn select_guide_stars(catalog: &Catalog, criteria: &GuideStarCriteria) -> CatalogResult<Catalog> {
    let range = ordered("guide_stars", "magnitude_range", criteria.magnitude_range)?;
    let class = catalog.column(&criteria.type_field)?;
    let mag = catalog.column_f64(&criteria.magnitude_field)?;
    let mask = Mask::from_fn(catalog.len(), |i| {
        class[i].matches(&criteria.star_class) && mag[i].is_some_and(|m| inside(m, range))
    });
    debug!(candidates = catalog.len(), selected = mask.count_selected(), "guide stars");
    catalog.filter(&mask)
}

/// Stars with both magnitudes measured and the primary one inside the range,
/// shuffled when `criteria.randomize` is set.
pub fn select_fops(catalog: &Catalog, criteria: &FopCriteria) -> CatalogResult<Catalog> {
    match criteria.seed {
        Some(seed) => select_fops_with_rng(catalog, criteria, &mut StdRng::seed_from_u64(seed)),
        None => select_fops_with_rng(catalog, criteria, &mut rand::rng()),
    }
}

/// [`select_fops`] with a caller-supplied generator for the shuffle.
pub fn select_fops_with_rng<R: Rng + ?Sized>(
    catalog: &Catalog,
    criteria: &FopCriteria,
    rng: &mut R,
) -> CatalogResult<Catalog> {
    let range = ordered("fops", "magnitude_range", criteria.magnitude_range)?;
    let mag = catalog.column_f64(&criteria.magnitude_field)?;
    let confirm = catalog.column_f64(&criteria.confirm_field)?;
    let measured = |m: Option<f64>| m.is_some_and(|m| m != 0.0);
    let mask = Mask::from_fn(catalog.len(), |i| {
        measured(mag[i]) && measured(confirm[i]) && mag[i].is_some_and(|m| inside(m, range))
    });
    let mut fops = catalog.filter(&mask)?;
    if criteria.randomize {
        fops.shuffle(rng);
    }
    debug!(candidates = catalog.len(), selected = fops.len(), "fiber positioning stars");
    Ok(fops)
}
