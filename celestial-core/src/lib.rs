//! Shared constants and spherical geometry for the celestial catalog crates.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`constants`] | Angle conversions, speed of light, default Hubble constant |
//! | [`math`] | Exact and projected angular separations, RA wrapping |

pub mod constants;
pub mod math;

pub use math::{angular_separation_deg, projected_separation_deg};
