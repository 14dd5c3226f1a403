//! Serializable selection configuration.
//!
//! Every stage is an `Option`: a stage left out of the configuration is
//! skipped. Bounds are validated when the pipeline runs, so a bad document
//! fails with the stage and parameter that are wrong.

use crate::host::Host;
use celestial_catalog::{CatalogError, CatalogResult, CoordinateFields, SeparationMode, Value};
use celestial_core::constants::ARCMIN_PER_DEG;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionCriteria {
    pub coordinates: CoordinateFields,
    pub separation: SeparationMode,
    pub magnitude: Option<MagnitudeCut>,
    pub classification: Option<ClassificationGate>,
    pub colors: Option<ColorCuts>,
    pub radial: Option<RadialCut>,
    pub flags: Option<FlagCut>,
    pub overrides: Option<Overrides>,
    pub fiber: Option<FiberCut>,
    /// Shuffle the selected rows.
    pub randomize: bool,
    /// Seed for the shuffle; a fresh OS seed when absent.
    pub seed: Option<u64>,
}

impl SelectionCriteria {
    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        serde_json::from_str(json).map_err(|e| CatalogError::config("selection criteria", &e.to_string()))
    }

    pub fn load_json(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::config(&origin, &e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| CatalogError::config(&origin, &e.to_string()))
    }
}

/// Stage 1: `bright_limit < mag < faint_limit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeCut {
    pub field: String,
    #[serde(default)]
    pub bright_limit: Option<f64>,
    #[serde(default)]
    pub faint_limit: Option<f64>,
}

/// Stage 2: keep the target class, or anything fainter than
/// `all_classes_fainter_than`, where imaging classification is unreliable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationGate {
    #[serde(default = "default_type_field")]
    pub type_field: String,
    pub target_class: Value,
    #[serde(default = "default_magnitude_field")]
    pub magnitude_field: String,
    #[serde(default)]
    pub all_classes_fainter_than: Option<f64>,
}

fn default_type_field() -> String {
    "type".to_string()
}

fn default_magnitude_field() -> String {
    "r".to_string()
}

/// Stage 3.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorCuts {
    pub cuts: Vec<ColorCut>,
    /// Deredden with extinction fields named `prefix + band` (`Ar` for `r`).
    pub extinction_prefix: Option<String>,
    /// Widen every bound by `factor * sqrt(err1² + err2²)`.
    pub uncertainty_padding: Option<f64>,
}

/// One color bound, e.g. `{"color": "g-r", "red_limit": 1.3}`. A missing
/// limit is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorCut {
    pub color: String,
    #[serde(default)]
    pub blue_limit: Option<f64>,
    #[serde(default)]
    pub red_limit: Option<f64>,
}

impl ColorCut {
    pub fn new(color: &str, blue_limit: Option<f64>, red_limit: Option<f64>) -> Self {
        Self {
            color: color.to_string(),
            blue_limit,
            red_limit,
        }
    }

    /// The two magnitude fields of `"m1-m2"`.
    pub fn bands(&self, parameter: &str) -> CatalogResult<(&str, &str)> {
        match self.color.split_once('-') {
            Some((a, b)) if !a.trim().is_empty() && !b.trim().is_empty() && !b.contains('-') => {
                Ok((a.trim(), b.trim()))
            }
            _ => Err(CatalogError::invalid_cut(
                "color",
                parameter,
                &format!("'{}' is not of the form 'm1-m2'", self.color),
            )),
        }
    }
}

/// A radius in one of the supported units.
///
/// `Legacy` follows the old single-number convention: negative values are
/// arcminutes, positive values kiloparsecs at the host distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadiusBound {
    Degrees(f64),
    Arcmin(f64),
    Kpc(f64),
    Legacy(f64),
}

impl RadiusBound {
    /// Radius in degrees. Arcminute values ignore the host distance.
    pub fn to_degrees(&self, host: &Host, stage: &str, parameter: &str) -> CatalogResult<f64> {
        let negative = |v: f64| {
            CatalogError::invalid_cut(stage, parameter, &format!("radius {} must not be negative", v))
        };
        let physical = |kpc: f64| {
            host.kpc_to_deg(kpc).ok_or_else(|| {
                CatalogError::invalid_cut(
                    stage,
                    parameter,
                    &format!("physical radius {} kpc needs a positive host distance", kpc),
                )
            })
        };
        match *self {
            Self::Degrees(v) if v >= 0.0 => Ok(v),
            Self::Arcmin(v) if v >= 0.0 => Ok(v / ARCMIN_PER_DEG),
            Self::Kpc(v) if v >= 0.0 => physical(v),
            Self::Legacy(v) if v < 0.0 => Ok(-v / ARCMIN_PER_DEG),
            Self::Legacy(v) => physical(v),
            Self::Degrees(v) | Self::Arcmin(v) | Self::Kpc(v) => Err(negative(v)),
        }
    }
}

/// Stage 4: `inner < separation < outer`. A missing bound is not applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadialCut {
    pub inner: Option<RadiusBound>,
    pub outer: Option<RadiusBound>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitState {
    /// At least one of the bits is set.
    Set,
    /// None of the bits is set.
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagTest {
    pub bits: u64,
    pub state: BitState,
}

/// SDSS photometric flag bits used by the photometry preset.
pub const BINNED1: u64 = 0x1000_0000;
pub const SATURATED: u64 = 0x0004_0000;
pub const BAD_COUNTS_ERROR: u64 = 0x0100_0000_0000;

/// Stage 5: every test must pass against the integer `field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagCut {
    #[serde(default = "default_flags_field")]
    pub field: String,
    pub tests: Vec<FlagTest>,
}

fn default_flags_field() -> String {
    "flags".to_string()
}

impl FlagCut {
    /// Detected in BINNED1, not saturated, no bad-counts error.
    pub fn sdss_photometry() -> Self {
        Self {
            field: default_flags_field(),
            tests: vec![
                FlagTest { bits: BINNED1, state: BitState::Set },
                FlagTest { bits: SATURATED, state: BitState::Clear },
                FlagTest { bits: BAD_COUNTS_ERROR, state: BitState::Clear },
            ],
        }
    }
}

/// Stage 6, applied in field order: include classes, exclude classes,
/// redshift rule, cross-reference exclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default = "default_class_field")]
    pub class_field: String,
    #[serde(default)]
    pub include_classes: Vec<String>,
    #[serde(default)]
    pub exclude_classes: Vec<String>,
    #[serde(default)]
    pub redshift: Option<RedshiftRule>,
    #[serde(default)]
    pub cross_reference: Option<CrossReferenceRule>,
}

fn default_class_field() -> String {
    "spec_class".to_string()
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            class_field: default_class_field(),
            include_classes: Vec::new(),
            exclude_classes: Vec::new(),
            redshift: None,
            cross_reference: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedshiftThreshold {
    /// Exclude when `|z - z_host| > k * sqrt(σ_host² + σ²)`.
    Sigma(f64),
    /// Exclude when `c |z - z_host| > Δv` (km/s).
    VelocityKms(f64),
}

/// Excludes spectroscopically confirmed members of `class` that sit at a
/// different redshift from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedshiftRule {
    #[serde(default = "default_redshift_class")]
    pub class: String,
    #[serde(default = "default_redshift_field")]
    pub redshift_field: String,
    #[serde(default = "default_redshift_err_field")]
    pub error_field: String,
    /// Measurement is valid only where this field is zero.
    #[serde(default)]
    pub warning_field: Option<String>,
    pub threshold: RedshiftThreshold,
}

fn default_redshift_class() -> String {
    "GALAXY".to_string()
}

fn default_redshift_field() -> String {
    "spec_z".to_string()
}

fn default_redshift_err_field() -> String {
    "spec_z_err".to_string()
}

impl RedshiftRule {
    pub fn new(threshold: RedshiftThreshold) -> Self {
        Self {
            class: default_redshift_class(),
            redshift_field: default_redshift_field(),
            error_field: default_redshift_err_field(),
            warning_field: None,
            threshold,
        }
    }
}

/// Excludes rows with a counterpart in an external survey catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReferenceRule {
    /// Name of the reference catalog the run context must provide.
    pub catalog: String,
    pub tolerance_arcsec: f64,
}

/// Stage 7: fiber-magnitude limits, with a fainter limit allowed for the
/// secondary tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberCut {
    #[serde(default = "default_fiber_field")]
    pub field: String,
    /// Rows must be fainter than this (fiber saturation).
    #[serde(default)]
    pub bright_limit: Option<f64>,
    /// Primary-tier faint limit.
    #[serde(default)]
    pub faint_limit: Option<f64>,
    #[serde(default)]
    pub secondary: Option<SecondaryTier>,
}

fn default_fiber_field() -> String {
    "fibermag_r".to_string()
}

/// Rows with `magnitude_field >= boundary` use `faint_limit` instead of the
/// primary one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryTier {
    #[serde(default = "default_magnitude_field")]
    pub magnitude_field: String,
    pub boundary: f64,
    pub faint_limit: f64,
}
