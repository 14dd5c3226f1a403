//! Declarative target selection over a consolidated catalog.
//!
//! A selection run centres on a [`Host`], narrows the catalog through the
//! stages configured in [`SelectionCriteria`], ranks what survives and
//! assembles an observing list with calibration and guide stars.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`criteria`] | Serializable stage configuration ([`SelectionCriteria`]) |
//! | [`pipeline`] | [`selected_mask`], [`select_targets`], row predicates |
//! | [`host`] | The reference object a run is centred on |
//! | [`reference`] | External cross-reference catalogs and their cache |
//! | [`rank`] | [`RankingRules`] and [`assign_ranks`] |
//! | [`calibration`] | Flux standard, guide and fiber positioning star selection |
//! | [`sky`] | Blank-sky positions clear of catalogued objects |
//! | [`target_list`] | [`build_target_list`] |
//!
//! # Quick Start
//!
//! ```ignore
//! use celestial_targeting::{select_targets, Host, Selection, SelectionContext, SelectionCriteria};
//!
//! let criteria = SelectionCriteria::load_json("saga.json")?;
//! let host = Host::new("NGC 6181", 248.087, 19.826).with_distance(33.0);
//! let targets = select_targets(&catalog, &Selection::new(criteria), &SelectionContext::new(host))?;
//! ```

pub mod calibration;
pub mod criteria;
pub mod host;
pub mod pipeline;
pub mod rank;
pub mod reference;
pub mod sky;
pub mod target_list;

pub use calibration::{
    select_flux_stars, select_fops, select_fops_with_rng, select_guide_stars, FluxStarCriteria, FopCriteria,
    GuideStarCriteria,
};
pub use criteria::{RadiusBound, SelectionCriteria};
pub use host::Host;
pub use pipeline::{
    select_targets, select_targets_with_rng, selected_mask, RowPredicate, Selection, SelectionContext,
    HOST_SEPARATION_FIELD,
};
pub use rank::{assign_ranks, RankRule, RankingRules, ReservedRanks, ZoneTest};
pub use reference::{BoundingBox, ReferenceCache, ReferenceCatalog};
pub use sky::{select_sky_positions, select_sky_positions_with_rng, SkyPositionConfig};
pub use target_list::{build_target_list, TargetEntry, TargetKind, TargetListConfig};
