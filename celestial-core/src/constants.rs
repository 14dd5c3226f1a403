#[allow(clippy::excessive_precision)]
#[allow(clippy::approx_constant)]
pub const PI: f64 = 3.141592653589793238462643;

#[allow(clippy::excessive_precision)]
#[allow(clippy::approx_constant)]
pub const TWOPI: f64 = 6.283185307179586476925287;

#[allow(clippy::excessive_precision)]
pub const DEG_TO_RAD: f64 = 1.745329251994329576923691e-2;

#[allow(clippy::excessive_precision)]
pub const RAD_TO_DEG: f64 = 57.29577951308232087679815;

pub const ARCMIN_PER_DEG: f64 = 60.0;

pub const ARCSEC_PER_DEG: f64 = 3600.0;

/// Hours of right ascension to degrees.
pub const DEG_PER_HOUR: f64 = 15.0;

/// Speed of light in km/s (exact, SI definition).
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Hubble constant in km/s/Mpc used when a caller does not supply one (WMAP 9-year).
pub const DEFAULT_HUBBLE_CONSTANT: f64 = 69.32;

/// Kiloparsecs per megaparsec.
pub const KPC_PER_MPC: f64 = 1000.0;
