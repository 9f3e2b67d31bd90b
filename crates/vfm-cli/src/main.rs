/// Command-line driver for the fertilization map engine.
///
/// Every subcommand reads GeoJSON / JSON files and writes JSON to `--output`
/// (or stdout). Settings come from `--config` with individual flags on top.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vfm_core::geojson::{
    grid_from_geojson, grid_to_geojson, parse_collection, parse_field, vfm_from_geojson, GridProperties, VfmMap,
};
use vfm_core::{
    build_base_grid, create_vfm, find_optimal_rotation, update_vfm, BaseGrid, FieldPolygon, GridOrigin,
    RasterSample, VfmConfig,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vfm", about = "Variable-rate fertilization maps from a field boundary and a humus raster")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the grid rotation giving the tightest bounding box.
    Rotation {
        /// Field boundary (Polygon, Feature or FeatureCollection).
        #[arg(short, long)]
        field: PathBuf,
    },
    /// Tile a field into a base grid.
    Grid {
        #[arg(short, long)]
        field: PathBuf,
        #[command(flatten)]
        settings: Settings,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Whole-sample humus mean and standard deviation.
    Stats {
        /// Raster sample JSON (as written by raster_sampler).
        #[arg(short, long)]
        sample: PathBuf,
    },
    /// Build a map from a field, a raster sample and optionally a saved grid.
    Create {
        #[arg(short, long)]
        field: PathBuf,
        #[arg(short, long)]
        sample: PathBuf,
        /// Reuse a grid written by `vfm grid` instead of building one.
        #[arg(short, long)]
        grid: Option<PathBuf>,
        #[command(flatten)]
        settings: Settings,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Redistribute an exported map under new rate settings.
    Update {
        /// Map document written by `vfm create`.
        #[arg(short, long)]
        map: PathBuf,
        #[command(flatten)]
        settings: Settings,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct Settings {
    /// JSON settings file; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Cell width east-west in metres.
    #[arg(long)]
    ew: Option<f64>,
    /// Cell height north-south in metres.
    #[arg(long)]
    ns: Option<f64>,
    /// Anchor corner: NW or SE.
    #[arg(long)]
    origin: Option<GridOrigin>,
    /// Fixed grid rotation in degrees (default: optimal).
    #[arg(long)]
    rotation: Option<f64>,
    /// Base amount, kg/10a.
    #[arg(long)]
    base: Option<f64>,
    /// Rate range, percent of the base amount.
    #[arg(long)]
    range: Option<f64>,
    /// Continuous rates instead of five steps.
    #[arg(long)]
    stepless: bool,
    /// Give covered cells without humus data the base amount.
    #[arg(long)]
    interpolate: bool,
    /// Drop cells that do not touch the field.
    #[arg(long)]
    clip: bool,
    /// Nearest-point fallback radius in metres for cells without points.
    #[arg(long)]
    nearest: Option<f64>,
    /// Grow (or, negative, shrink) the field by this many metres first.
    #[arg(long, allow_hyphen_values = true)]
    buffer: Option<f64>,
}

impl Settings {
    fn resolve(&self) -> Result<VfmConfig> {
        self.resolve_over(VfmConfig::default())
    }

    /// `--config`, then the flags, layered over `base`.
    fn resolve_over(&self, base: VfmConfig) -> Result<VfmConfig> {
        let mut cfg = match &self.config {
            Some(path) => base
                .with_json(&read(path)?)
                .with_context(|| format!("Failed to parse config {}", path.display()))?,
            None => base,
        };
        if let Some(v) = self.ew {
            cfg.grid_ew_m = v;
        }
        if let Some(v) = self.ns {
            cfg.grid_ns_m = v;
        }
        if let Some(v) = self.origin {
            cfg.origin = v;
        }
        if self.rotation.is_some() {
            cfg.rotation_deg = self.rotation;
        }
        if let Some(v) = self.base {
            cfg.base_amount = v;
        }
        if let Some(v) = self.range {
            cfg.range_percent = v;
        }
        if self.stepless {
            cfg.five_steps = false;
        }
        if self.interpolate {
            cfg.interpolate_missing = true;
        }
        if self.clip {
            cfg.clip_outside_field = true;
        }
        if self.nearest.is_some() {
            cfg.nearest_fallback_m = self.nearest;
        }
        if let Some(v) = self.buffer {
            cfg.buffer_m = v;
        }
        if !(0.0..=100.0).contains(&cfg.range_percent) {
            bail!("range must be between 0 and 100 percent, got {}", cfg.range_percent);
        }
        Ok(cfg)
    }
}

// ── IO helpers ───────────────────────────────────────────────────────────────

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
}

fn load_field(path: &Path) -> Result<FieldPolygon> {
    parse_field(&read(path)?).with_context(|| format!("Invalid field boundary in {}", path.display()))
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Write failed: {}", path.display()))?;
            info!(path = %path.display(), "written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn report_grid(grid: &BaseGrid) {
    info!(
        rows = grid.rows,
        columns = grid.columns,
        cells = grid.cell_count(),
        rotation = grid.rotation_deg,
        "base grid"
    );
    if grid.is_dense() {
        warn!(cells = grid.cell_count(), "dense grid: building the map will be slow");
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────────

fn run(command: Command) -> Result<()> {
    match command {
        Command::Rotation { field } => {
            let field = load_field(&field)?;
            println!("{:.1}", find_optimal_rotation(&field));
        }
        Command::Grid { field, settings, output } => {
            let cfg = settings.resolve()?;
            let field = cfg.buffered_field(&load_field(&field)?)?;
            let grid = build_base_grid(&field, &cfg.grid_params())?;
            report_grid(&grid);
            write_json(&grid_to_geojson(&grid), output.as_deref())?;
        }
        Command::Stats { sample } => {
            let sample: RasterSample = serde_json::from_str(&read(&sample)?)
                .with_context(|| format!("Invalid raster sample in {}", sample.display()))?;
            let stats = sample.stats()?;
            write_json(&stats, None)?;
        }
        Command::Create { field, sample, grid, settings, output } => {
            let cfg = settings.resolve()?;
            let field = cfg.buffered_field(&load_field(&field)?)?;
            let sample: RasterSample = serde_json::from_str(&read(&sample)?)
                .with_context(|| format!("Invalid raster sample in {}", sample.display()))?;

            let grid = match grid {
                Some(path) => {
                    let fc = parse_collection::<GridProperties>(&read(&path)?)?;
                    grid_from_geojson(fc).with_context(|| format!("Invalid grid in {}", path.display()))?
                }
                None => build_base_grid(&field, &cfg.grid_params())?,
            };
            report_grid(&grid);

            let points = sample.points_near(&field, cfg.raster_margin_m)?;
            let result = create_vfm(&field, &grid, &points, &cfg.aggregate_options(), &cfg.vfm_params());
            info!(
                cells = result.features.len(),
                area_m2 = result.area_sum,
                amount_kg = result.amount_sum,
                "map created"
            );
            write_json(&VfmMap::new(&result, cfg.base_amount, cfg.range_percent), output.as_deref())?;
        }
        Command::Update { map, settings, output } => {
            let doc: VfmMap = serde_json::from_str(&read(&map)?)
                .with_context(|| format!("Invalid map document in {}", map.display()))?;
            let cfg = settings.resolve_over(VfmConfig::for_map(&doc))?;
            let features = vfm_from_geojson(doc.vfm)?;
            let result = update_vfm(&features, &cfg.vfm_params());
            info!(area_m2 = result.area_sum, amount_kg = result.amount_sum, "map updated");
            write_json(&VfmMap::new(&result, cfg.base_amount, cfg.range_percent), output.as_deref())?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vfm=info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    run(Cli::parse().command)
}
