//! Derived physical quantities with absence propagation.
//!
//! Every function takes `Option` inputs and yields `None` as soon as any
//! required input is absent or the result is not a finite number.

use crate::error::CatalogResult;
use crate::record::{Catalog, Value};
use celestial_core::constants::{DEFAULT_HUBBLE_CONSTANT, SPEED_OF_LIGHT_KM_S};

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

/// cz in km/s.
pub fn redshift_to_velocity(z: Option<f64>) -> Option<f64> {
    finite(z? * SPEED_OF_LIGHT_KM_S)
}

pub fn velocity_to_redshift(velocity_kms: Option<f64>) -> Option<f64> {
    finite(velocity_kms? / SPEED_OF_LIGHT_KM_S)
}

/// Hubble-law distance in Mpc, `v / H0`. Non-positive `h0` yields `None`.
pub fn velocity_to_distance(velocity_kms: Option<f64>, h0: f64) -> Option<f64> {
    if h0 <= 0.0 {
        return None;
    }
    finite(velocity_kms? / h0)
}

/// [`velocity_to_distance`] with the default Hubble constant.
pub fn hubble_distance(velocity_kms: Option<f64>) -> Option<f64> {
    velocity_to_distance(velocity_kms, DEFAULT_HUBBLE_CONSTANT)
}

/// `5 log10(d) + 25` for a distance in Mpc. Non-positive distances have none.
pub fn distance_modulus(distance_mpc: Option<f64>) -> Option<f64> {
    let d = distance_mpc?;
    if d <= 0.0 {
        return None;
    }
    finite(5.0 * libm::log10(d) + 25.0)
}

pub fn apparent_magnitude(absolute_mag: Option<f64>, distance_mpc: Option<f64>) -> Option<f64> {
    finite(absolute_mag? + distance_modulus(distance_mpc)?)
}

pub fn absolute_magnitude(apparent_mag: Option<f64>, distance_mpc: Option<f64>) -> Option<f64> {
    finite(apparent_mag? - distance_modulus(distance_mpc)?)
}

/// Adds or replaces `output` with `f` applied to the numeric values of `inputs`.
///
/// `f` receives one `Option<f64>` per input field, in order; absent and text
/// values arrive as `None`.
pub fn derive_column<F>(catalog: &mut Catalog, output: &str, inputs: &[&str], f: F) -> CatalogResult<()>
where
    F: Fn(&[Option<f64>]) -> Option<f64>,
{
    let columns = inputs
        .iter()
        .map(|name| catalog.column_f64(name))
        .collect::<CatalogResult<Vec<_>>>()?;

    let mut args = vec![None; inputs.len()];
    let values = (0..catalog.len())
        .map(|row| {
            for (arg, column) in args.iter_mut().zip(&columns) {
                *arg = column[row];
            }
            Value::from_option(f(&args))
        })
        .collect();
    catalog.set_column(output, values)
}
