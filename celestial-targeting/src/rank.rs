//! Priority ranks for selected targets.
//!
//! Rules are evaluated top to bottom and the first match wins. A rule tests
//! a magnitude limit and a radial zone around the host; rows that match no
//! rule get no rank and are left out of the target list. Calibration stars,
//! guide stars and the host itself use [`ReservedRanks`], which science rules
//! may not reuse.

use crate::criteria::RadiusBound;
use crate::host::Host;
use crate::pipeline::HOST_SEPARATION_FIELD;
use celestial_catalog::{Catalog, CatalogError, CatalogResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservedRanks {
    pub guide: u32,
    pub calibration: u32,
    pub reference: u32,
}

impl Default for ReservedRanks {
    fn default() -> Self {
        Self {
            guide: 0,
            calibration: 1,
            reference: 2,
        }
    }
}

impl ReservedRanks {
    fn contains(&self, rank: u32) -> bool {
        rank == self.guide || rank == self.calibration || rank == self.reference
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneTest {
    #[default]
    Any,
    /// Separation from the host at most this radius.
    Inside(RadiusBound),
    /// Separation from the host beyond this radius.
    Outside(RadiusBound),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankRule {
    /// Matches rows brighter than this magnitude; any magnitude when `None`.
    #[serde(default)]
    pub fainter_limit: Option<f64>,
    #[serde(default)]
    pub zone: ZoneTest,
    pub rank: u32,
}

impl RankRule {
    pub fn new(fainter_limit: Option<f64>, zone: ZoneTest, rank: u32) -> Self {
        Self {
            fainter_limit,
            zone,
            rank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRules {
    #[serde(default = "default_magnitude_field")]
    pub magnitude_field: String,
    #[serde(default = "default_separation_field")]
    pub separation_field: String,
    pub rules: Vec<RankRule>,
    #[serde(default)]
    pub reserved: ReservedRanks,
}

fn default_magnitude_field() -> String {
    "r".to_string()
}

fn default_separation_field() -> String {
    HOST_SEPARATION_FIELD.to_string()
}

impl RankingRules {
    pub fn new(rules: Vec<RankRule>) -> Self {
        Self {
            magnitude_field: default_magnitude_field(),
            separation_field: default_separation_field(),
            rules,
            reserved: ReservedRanks::default(),
        }
    }

    /// Every row gets `rank`.
    pub fn uniform(rank: u32) -> Self {
        Self::new(vec![RankRule::new(None, ZoneTest::Any, rank)])
    }

    /// Primaries (brighter than `boundary`) rank 3, secondaries 4.
    ///
    /// With `outer`, targets beyond that radius drop one rank: primaries
    /// inside 3, outside 4, secondaries inside 5, outside 6.
    pub fn primary_secondary(boundary: f64, outer: Option<RadiusBound>) -> Self {
        let rules = match outer {
            None => vec![
                RankRule::new(Some(boundary), ZoneTest::Any, 3),
                RankRule::new(None, ZoneTest::Any, 4),
            ],
            Some(radius) => vec![
                RankRule::new(Some(boundary), ZoneTest::Inside(radius), 3),
                RankRule::new(Some(boundary), ZoneTest::Outside(radius), 4),
                RankRule::new(None, ZoneTest::Inside(radius), 5),
                RankRule::new(None, ZoneTest::Outside(radius), 6),
            ],
        };
        Self::new(rules)
    }

    pub fn validate(&self) -> CatalogResult<()> {
        let r = &self.reserved;
        if r.guide == r.calibration || r.guide == r.reference || r.calibration == r.reference {
            return Err(CatalogError::invalid_cut(
                "ranking",
                "reserved",
                &format!(
                    "guide ({}), calibration ({}) and reference ({}) ranks must differ",
                    r.guide, r.calibration, r.reference
                ),
            ));
        }
        if let Some(rule) = self.rules.iter().find(|r| self.reserved.contains(r.rank)) {
            return Err(CatalogError::invalid_cut(
                "ranking",
                "rules.rank",
                &format!("rank {} is reserved for the host, calibration or guide stars", rule.rank),
            ));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        serde_json::from_str(json).map_err(|e| CatalogError::config("ranking rules", &e.to_string()))
    }

    pub fn load_json(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::config(&origin, &e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| CatalogError::config(&origin, &e.to_string()))
    }
}

/// Rank for every row of `selected`, `None` where no rule matches.
///
/// Zone tests read the separation column written by
/// [`select_targets`](crate::pipeline::select_targets).
pub fn assign_ranks(selected: &Catalog, rules: &RankingRules, host: &Host) -> CatalogResult<Vec<Option<u32>>> {
    rules.validate()?;
    let mag = selected.column_f64(&rules.magnitude_field)?;
    let needs_zone = rules.rules.iter().any(|r| r.zone != ZoneTest::Any);
    let separation = if needs_zone {
        selected.column_f64(&rules.separation_field)?
    } else {
        vec![None; selected.len()]
    };

    let zones = rules
        .rules
        .iter()
        .map(|rule| match rule.zone {
            ZoneTest::Any => Ok(None),
            ZoneTest::Inside(b) => b.to_degrees(host, "ranking", "zone.inside").map(|d| Some((d, true))),
            ZoneTest::Outside(b) => b.to_degrees(host, "ranking", "zone.outside").map(|d| Some((d, false))),
        })
        .collect::<CatalogResult<Vec<_>>>()?;

    let ranks: Vec<Option<u32>> = (0..selected.len())
        .map(|i| {
            rules
                .rules
                .iter()
                .zip(&zones)
                .find(|(rule, zone)| {
                    let bright = rule.fainter_limit.map_or(true, |lim| mag[i].is_some_and(|m| m < lim));
                    let in_zone = match zone {
                        None => true,
                        Some((radius, true)) => separation[i].is_some_and(|s| s <= *radius),
                        Some((radius, false)) => separation[i].is_some_and(|s| s > *radius),
                    };
                    bright && in_zone
                })
                .map(|(rule, _)| rule.rank)
        })
        .collect();
    debug!(
        ranked = ranks.iter().flatten().count(),
        unranked = ranks.iter().filter(|r| r.is_none()).count(),
        "assigned ranks"
    );
    Ok(ranks)
}
