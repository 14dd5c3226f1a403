//! The reference object a selection run is centred on.

use celestial_catalog::consolidate::derived::distance_modulus;
use celestial_catalog::{CatalogError, CatalogResult, SeparationMode};
use celestial_core::constants::{KPC_PER_MPC, RAD_TO_DEG};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A host galaxy (or any field centre) with the properties selection needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    /// Degrees.
    pub ra: f64,
    /// Degrees.
    pub dec: f64,
    #[serde(default)]
    pub distance_mpc: Option<f64>,
    #[serde(default)]
    pub redshift: Option<f64>,
    #[serde(default)]
    pub redshift_err: Option<f64>,
    /// Apparent magnitude, reported in the target list.
    #[serde(default)]
    pub magnitude: Option<f64>,
}

impl Host {
    pub fn new(name: &str, ra: f64, dec: f64) -> Self {
        Self {
            name: name.to_string(),
            ra,
            dec,
            distance_mpc: None,
            redshift: None,
            redshift_err: None,
            magnitude: None,
        }
    }

    pub fn with_distance(mut self, distance_mpc: f64) -> Self {
        self.distance_mpc = Some(distance_mpc);
        self
    }

    pub fn with_redshift(mut self, z: f64, z_err: f64) -> Self {
        self.redshift = Some(z);
        self.redshift_err = Some(z_err);
        self
    }

    pub fn with_magnitude(mut self, magnitude: f64) -> Self {
        self.magnitude = Some(magnitude);
        self
    }

    pub fn separation_deg(&self, ra: f64, dec: f64, mode: SeparationMode) -> f64 {
        mode.separation_deg(self.ra, self.dec, ra, dec)
    }

    /// Angle in degrees subtended by `kpc` at the host distance.
    pub fn kpc_to_deg(&self, kpc: f64) -> Option<f64> {
        let d = self.distance_mpc.filter(|d| *d > 0.0)?;
        Some(kpc / (KPC_PER_MPC * d) * RAD_TO_DEG)
    }

    pub fn distance_modulus(&self) -> Option<f64> {
        distance_modulus(self.distance_mpc)
    }

    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        serde_json::from_str(json).map_err(|e| CatalogError::config("host", &e.to_string()))
    }

    pub fn load_json(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::config(&origin, &e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| CatalogError::config(&origin, &e.to_string()))
    }
}
