//! Spatial Index & Matcher.

pub mod healpix;
pub mod index;
pub mod offset;

pub use index::{match_catalogs, Match, SeparationMode, SpatialIndex};
pub use offset::{median_offset, PositionOffset};
