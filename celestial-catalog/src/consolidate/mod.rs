//! Consolidation Engine: key joins, positional joins, duplicate-key
//! resolution, fallback merges and derived quantities.

pub mod derived;
pub mod duplicates;
pub mod fallback;
pub mod join;
pub mod position;

pub use derived::{
    absolute_magnitude, apparent_magnitude, derive_column, distance_modulus, hubble_distance,
    redshift_to_velocity, velocity_to_distance, velocity_to_redshift,
};
pub use duplicates::{resolve_duplicate_keys, DuplicateResolution, Extremum};
pub use fallback::{merge_fallback, Condition, FallbackChain, FallbackSource};
pub use join::{join_on_key, JoinType, KeyJoin};
pub use position::{join_on_position, PositionJoin};
