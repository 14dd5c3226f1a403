//! Schema-checked astronomical catalogs, positional cross-matching and
//! catalog consolidation.
//!
//! Several independently sourced catalogs are merged into one master catalog:
//! key joins where the sources share an identifier, nearest-neighbour joins
//! where they only share the sky, per-field fallback chains where several
//! sources measure the same quantity.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`record`] | [`Value`] with explicit absence, [`Schema`], [`Catalog`], [`Mask`] |
//! | [`spatial`] | HEALPix-bucketed [`SpatialIndex`], [`match_catalogs`], [`median_offset`] |
//! | [`consolidate`] | [`join_on_key`], [`PositionJoin`], [`resolve_duplicate_keys`], [`FallbackChain`], derived quantities |
//! | [`masterlist`] | Master-catalog filtering, remove lists, positional supplements |
//! | [`error`] | [`CatalogError`] and the [`CatalogResult`] alias |
//!
//! # Quick Start
//!
//! ```ignore
//! use celestial_catalog::{join_on_key, Catalog, FallbackChain, JoinType};
//!
//! let edd = Catalog::load_json("edd.json")?;
//! let kk = Catalog::load_json("kk.json")?;
//! let mut master = join_on_key(&edd, &kk, "pgc", JoinType::Outer)?;
//! FallbackChain::of("distance", &["dist_left", "dist_right"]).apply(&mut master)?;
//! ```

pub mod consolidate;
pub mod error;
pub mod masterlist;
pub mod record;
pub mod spatial;

pub use consolidate::{
    join_on_key, join_on_position, resolve_duplicate_keys, DuplicateResolution, FallbackChain,
    JoinType, KeyJoin, PositionJoin,
};
pub use error::{CatalogError, CatalogResult};
pub use masterlist::{
    append_unmatched, filter_master_catalog, remove_listed, supplement_missing, AppendSummary,
    ColumnMapping, MasterFilter, PositionalMatch, UnmatchedPolicy,
};
pub use record::{Catalog, CoordinateFields, FieldAliases, Mask, Schema, Value};
pub use spatial::{match_catalogs, median_offset, Match, SeparationMode, SpatialIndex};
