//! Runs one selection over a catalog document and writes the ranked
//! target list as JSON.

use anyhow::{bail, Context};
use celestial_catalog::{Catalog, CoordinateFields};
use celestial_targeting::{
    assign_ranks, build_target_list, select_flux_stars, select_guide_stars, select_targets,
    FluxStarCriteria, GuideStarCriteria, Host, RankingRules, ReferenceCache, ReferenceCatalog,
    Selection, SelectionContext, SelectionCriteria, TargetListConfig,
};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "select-targets")]
#[command(about = "Select, rank and list spectroscopic targets around a host")]
struct Cli {
    /// Consolidated catalog document (JSON)
    #[arg(long)]
    catalog: PathBuf,

    /// Host description (JSON)
    #[arg(long)]
    host: PathBuf,

    /// Selection criteria (JSON)
    #[arg(long)]
    criteria: PathBuf,

    /// Cross-reference catalog document, named after the file stem
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Coordinate fields of the reference catalog
    #[arg(long, default_value = "ra")]
    reference_ra: String,

    #[arg(long, default_value = "dec")]
    reference_dec: String,

    /// Ranking rules (JSON); every target gets rank 3 without them
    #[arg(long)]
    ranking: Option<PathBuf>,

    /// Photometric survey catalog to draw flux and guide stars from
    #[arg(long)]
    stars: Option<PathBuf>,

    /// Times each flux star is listed
    #[arg(long, default_value = "1")]
    repeat_flux: usize,

    /// Output target list (JSON)
    #[arg(long)]
    output: PathBuf,

    /// Log every pipeline stage
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let catalog = Catalog::load_json(&cli.catalog)
        .with_context(|| format!("Failed to load catalog {}", cli.catalog.display()))?;
    let host = Host::load_json(&cli.host).with_context(|| format!("Failed to load host {}", cli.host.display()))?;
    let criteria = SelectionCriteria::load_json(&cli.criteria)
        .with_context(|| format!("Failed to load criteria {}", cli.criteria.display()))?;

    let mut context = SelectionContext::new(host.clone());
    if let Some(path) = &cli.reference {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            bail!("Reference path {} has no usable file name", path.display());
        };
        let fields = CoordinateFields::new(&cli.reference_ra, &cli.reference_dec);
        let mut cache = ReferenceCache::new();
        let reference = cache
            .get_or_load(name, || ReferenceCatalog::new(name, Catalog::load_json(path)?, fields))
            .with_context(|| format!("Failed to load reference catalog {}", path.display()))?;
        context = context.with_reference(reference);
    }

    let targets = select_targets(&catalog, &Selection::new(criteria), &context).context("Target selection failed")?;

    let rules = match &cli.ranking {
        Some(path) => RankingRules::load_json(path)
            .with_context(|| format!("Failed to load ranking rules {}", path.display()))?,
        None => RankingRules::uniform(3),
    };
    let ranks = assign_ranks(&targets, &rules, &host).context("Rank assignment failed")?;

    let (flux, guide) = match &cli.stars {
        Some(path) => {
            let stars = Catalog::load_json(path)
                .with_context(|| format!("Failed to load star catalog {}", path.display()))?;
            (
                select_flux_stars(&stars, &FluxStarCriteria::default())?,
                select_guide_stars(&stars, &GuideStarCriteria::default())?,
            )
        }
        None => (Catalog::new(&["objID", "ra", "dec", "r"])?, Catalog::new(&["objID", "ra", "dec", "r"])?),
    };

    let config = TargetListConfig {
        repeat_flux: cli.repeat_flux,
        reserved: rules.reserved,
        ..TargetListConfig::default()
    };
    let list = build_target_list(&host, &targets, &ranks, &flux, &guide, &config)?;

    let json = serde_json::to_string_pretty(&list)?;
    std::fs::write(&cli.output, json).with_context(|| format!("Failed to write {}", cli.output.display()))?;
    info!(output = %cli.output.display(), entries = list.len(), "wrote target list");
    Ok(())
}
