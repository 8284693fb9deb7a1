//! Ground Station Site Analysis CLI
//!
//! Ranks candidate ground-station sites inside a bounding box, or scores a
//! single point in full mode.
//!
//! Usage:
//!   analyze-sites --bbox=150,-35,152,-33 --max-sites 10 --min-score 0.1 \
//!                 --features data/backhaul.json \
//!                 --mobile-sites telstra=data/telstra_sites.csv \
//!                 --output data/sydney_sites.json
//!
//!   analyze-sites --point=151.2,-33.9 --mode full

use anyhow::{bail, Context, Result};
use clap::Parser;
use site_selector::loader::{self, Carrier};
use site_selector::{
    AnalysisRequest, BoundingBox, Collaborators, GeoPoint, InMemorySpatialIndex, RegionTable, ScoringMode,
    SelectorConfig, SiteSelector, WeightVector,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "analyze-sites",
    about = "Rank ground station sites by backhaul, demand, terrain, interference and orbital access"
)]
struct Args {
    /// Bounding box as min_lon,min_lat,max_lon,max_lat
    #[arg(long, value_delimiter = ',', num_args = 4, allow_hyphen_values = true)]
    bbox: Option<Vec<f64>>,

    /// Score a single lon,lat point instead of a region
    #[arg(long, value_delimiter = ',', num_args = 2, allow_hyphen_values = true, conflicts_with = "bbox")]
    point: Option<Vec<f64>>,

    /// Factor weights as JSON, e.g. '{"backhaul":0.3,...}'
    #[arg(short, long)]
    weights: Option<String>,

    /// Maximum sites to return
    #[arg(long)]
    max_sites: Option<usize>,

    /// Minimum total score for a returned site
    #[arg(long)]
    min_score: Option<f64>,

    /// Base grid resolution in degrees
    #[arg(long)]
    resolution: Option<f64>,

    /// Scoring mode: fast or full
    #[arg(short, long)]
    mode: Option<ScoringMode>,

    /// Analysis deadline in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Selector configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Region table JSON (defaults to the built-in Australian table)
    #[arg(short, long)]
    regions: Option<PathBuf>,

    /// Infrastructure feature JSON files
    #[arg(short, long)]
    features: Vec<PathBuf>,

    /// Carrier site exports as carrier=path (optus, telstra, tpg)
    #[arg(long, value_parser = parse_mobile_sites)]
    mobile_sites: Vec<(Carrier, PathBuf)>,

    /// Output JSON file
    #[arg(short, long, default_value = "site_analysis.json")]
    output: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_mobile_sites(arg: &str) -> std::result::Result<(Carrier, PathBuf), String> {
    let (carrier, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected carrier=path, got {:?}", arg))?;
    let carrier = carrier.parse::<Carrier>().map_err(|e| e.to_string())?;
    Ok((carrier, PathBuf::from(path)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", "=".repeat(60));
    info!("Ground Station Site Analysis");
    info!("{}", "=".repeat(60));

    let config = match &args.config {
        Some(path) => SelectorConfig::from_path(path)?,
        None => SelectorConfig::default(),
    };
    let regions = Arc::new(match &args.regions {
        Some(path) => RegionTable::from_path(path)?,
        None => RegionTable::australia(),
    });

    // Load infrastructure
    let features = loader::load_all_features(&args.features, &args.mobile_sites)?;
    let index = InMemorySpatialIndex::new(features);
    let collaborators = Collaborators::regional(Arc::clone(&regions), index);

    let selector = SiteSelector::new(config, regions, collaborators)?;

    let weights = match &args.weights {
        Some(raw) => Some(serde_json::from_str::<WeightVector>(raw).context("parsing --weights")?),
        None => None,
    };

    if let Some(point) = &args.point {
        let point = GeoPoint::new(point[0], point[1]);
        let site = selector.score_site(point, weights).await?;

        info!("{:.3} | {} | {}", site.total_score, site.candidate.id, site.reasoning);
        write_json(&args.output, &site)?;
        return Ok(());
    }

    let Some(bbox) = &args.bbox else {
        bail!("either --bbox or --point is required");
    };
    let bbox = BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3])?;

    let mut request = AnalysisRequest::new(bbox);
    request.weights = weights.unwrap_or_default();
    request.max_sites = args.max_sites;
    request.min_score = args.min_score;
    request.grid_resolution = args.resolution;
    request.mode = args.mode;
    request.deadline_ms = args.deadline_ms;

    let result = selector.analyze(&request).await?;

    info!("\nTop 10 sites by score:");
    for s in result.sites.iter().take(10) {
        info!(
            "  {:.3} | {:28} | {:?} | {}",
            s.total_score,
            s.candidate.id,
            s.status,
            s.region.as_deref().unwrap_or("-")
        );
    }

    write_json(&args.output, &result)?;

    // Summary
    let summary = &result.summary;
    info!("\n{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!(
        "Grid: {:.4}° resolution ({} x {}), {} land candidates",
        summary.grid.resolution_deg, summary.grid.columns, summary.grid.rows, summary.candidates_generated
    );
    info!("Scored: {} ({} fallback, {} degraded)", summary.sites_scored, summary.fallback_sites, summary.degraded_sites);
    info!("Returned: {}", summary.sites_returned);
    if let Some(message) = &summary.message {
        info!("Note: {}", message);
    }

    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    info!("\nWriting output to {:?}", path);
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}
