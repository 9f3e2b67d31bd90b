/// Humus raster sampling tool: crops a single-band GeoTIFF to the query area
/// of a field and writes the raster sample JSON that `vfm create` consumes.
///
/// Georeferencing comes from ModelTiepointTag + ModelPixelScaleTag (north-up
/// rasters only) or from `--bounds`. Pixels equal to the nodata value (from
/// `--nodata` or the GDAL_NODATA tag) are written as 0, the no-data sentinel.
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, ensure, Context, Result};
use clap::Parser;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vfm_core::geojson::parse_field;
use vfm_core::raster::DEFAULT_RASTER_MARGIN_M;
use vfm_core::{query_bbox, BBox, GeoRaster, RasterSource};

// ── Constants ────────────────────────────────────────────────────────────────

/// GDAL stores the nodata value as ASCII in this private tag.
const GDAL_NODATA_TAG: u16 = 42113;
/// EPSG:3857.
const WEB_MERCATOR: &str = "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs";
/// Lon/lat on the same sphere, so no datum shift is involved.
const MERCATOR_LONLAT: &str = "+proj=longlat +a=6378137 +b=6378137 +no_defs";

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "raster_sampler", about = "Crop a humus GeoTIFF to a field's query area as raster sample JSON")]
struct Args {
    /// Single-band humus GeoTIFF
    #[arg(short, long)]
    tiff: PathBuf,

    /// Field boundary GeoJSON (Polygon, Feature or FeatureCollection)
    #[arg(short, long)]
    field: PathBuf,

    /// Margin around the field's bounding box, metres
    #[arg(long, default_value_t = DEFAULT_RASTER_MARGIN_M)]
    margin: f64,

    /// Raster bounds as min_lon,min_lat,max_lon,max_lat (overrides GeoTIFF tags)
    #[arg(long)]
    bounds: Option<String>,

    /// Georeferencing is EPSG:3857 metres rather than degrees
    #[arg(long)]
    web_mercator: bool,

    /// Pixel value meaning "no data" (default: GDAL_NODATA tag, if any)
    #[arg(long)]
    nodata: Option<f64>,

    /// Multiply every valid value by this factor (e.g. 0.1 for per-mille rasters)
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Output JSON path (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

// ── Georeferencing ───────────────────────────────────────────────────────────

fn parse_bounds(s: &str) -> Result<BBox> {
    let v: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("Invalid bounds: {s}"))?;
    let [min_lon, min_lat, max_lon, max_lat] = v.as_slice() else {
        bail!("bounds need 4 comma-separated numbers, got {}", v.len());
    };
    let b = BBox::new(*min_lon, *min_lat, *max_lon, *max_lat);
    ensure!(b.is_valid(), "bounds are empty or inverted: {s}");
    Ok(b)
}

/// Raster extent from a GeoTIFF tiepoint `[i, j, k, x, y, z]` and pixel
/// scale `[sx, sy, sz]`, in the raster's own units.
fn bounds_from_tags(tiepoint: &[f64], scale: &[f64], width: usize, height: usize) -> Result<BBox> {
    ensure!(tiepoint.len() >= 6, "ModelTiepointTag needs 6 values, got {}", tiepoint.len());
    ensure!(scale.len() >= 2, "ModelPixelScaleTag needs 2 values, got {}", scale.len());
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let (sx, sy) = (scale[0], scale[1]);
    ensure!(sx > 0.0 && sy > 0.0, "pixel scale must be positive");

    let min_x = x - i * sx;
    let max_y = y + j * sy;
    Ok(BBox::new(min_x, max_y - height as f64 * sy, min_x + width as f64 * sx, max_y))
}

/// EPSG:3857 metres to degrees. A north-up Mercator raster is bounded by
/// meridians and parallels, so its corners give the geographic extent;
/// pixel rows in between are not equally spaced in latitude.
fn mercator_to_degrees(b: BBox) -> Result<BBox> {
    let from = Proj::from_proj_string(WEB_MERCATOR).map_err(|e| anyhow!("Invalid EPSG:3857 definition: {e:?}"))?;
    let to = Proj::from_proj_string(MERCATOR_LONLAT).map_err(|e| anyhow!("Invalid lon/lat definition: {e:?}"))?;
    let corner = |x: f64, y: f64| -> Result<(f64, f64)> {
        let mut p = (x, y, 0.0);
        transform(&from, &to, &mut p).map_err(|e| anyhow!("Cannot reproject ({x}, {y}): {e:?}"))?;
        Ok((p.0.to_degrees(), p.1.to_degrees()))
    };
    let (min_lon, min_lat) = corner(b.min_lon, b.min_lat)?;
    let (max_lon, max_lat) = corner(b.max_lon, b.max_lat)?;
    Ok(BBox::new(min_lon, min_lat, max_lon, max_lat))
}

// ── Decoding ─────────────────────────────────────────────────────────────────

fn band_to_f64(image: DecodingResult) -> Result<Vec<f64>> {
    Ok(match image {
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        _ => bail!("unsupported pixel type (expected 8/16/32-bit integers or floats)"),
    })
}

/// Map nodata pixels to the 0 sentinel and scale the rest.
fn normalise(values: &mut [f64], nodata: Option<f64>, scale: f64) {
    for v in values.iter_mut() {
        if nodata.is_some_and(|nd| *v == nd) || !v.is_finite() {
            *v = 0.0;
        } else {
            *v *= scale;
        }
    }
}

fn read_raster(path: &Path, args: &Args) -> Result<GeoRaster> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file)).with_context(|| format!("Not a valid TIFF: {}", path.display()))?;

    let (w, h) = decoder.dimensions().context("Cannot read TIFF dimensions")?;
    let (width, height) = (w as usize, h as usize);

    let bounds = match &args.bounds {
        Some(s) => parse_bounds(s)?,
        None => {
            let tiepoint = decoder
                .get_tag_f64_vec(Tag::ModelTiepointTag)
                .context("No ModelTiepointTag; pass --bounds")?;
            let scale = decoder
                .get_tag_f64_vec(Tag::ModelPixelScaleTag)
                .context("No ModelPixelScaleTag; pass --bounds")?;
            let native = bounds_from_tags(&tiepoint, &scale, width, height)?;
            if args.web_mercator {
                mercator_to_degrees(native)?
            } else {
                native
            }
        }
    };

    let nodata = args.nodata.or_else(|| {
        decoder
            .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA_TAG))
            .ok()
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse().ok())
    });

    let mut values = band_to_f64(decoder.read_image().context("Cannot decode image data")?)?;
    if values.len() != width * height {
        warn!(
            values = values.len(),
            pixels = width * height,
            "multi-band raster, keeping the first band"
        );
        let bands = values.len() / (width * height).max(1);
        values = values.into_iter().step_by(bands.max(1)).take(width * height).collect();
    }
    normalise(&mut values, nodata, args.scale);

    info!(width, height, ?nodata, ?bounds, "decoded raster");
    Ok(GeoRaster::new(width, height, values, bounds)?)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("raster_sampler=info,vfm=info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let field_text = fs::read_to_string(&args.field).with_context(|| format!("Cannot read {}", args.field.display()))?;
    let field = parse_field(&field_text).with_context(|| format!("Invalid field boundary in {}", args.field.display()))?;
    let query = query_bbox(&field, args.margin);

    let raster = read_raster(&args.tiff, &args)?;
    let sample = raster
        .sample(&query)
        .with_context(|| format!("Field query area {query:?} does not overlap the raster"))?;

    match sample.stats() {
        Ok(s) => info!(
            width = sample.width(),
            height = sample.height(),
            mean = s.mean,
            std_dev = s.std_dev,
            "sampled"
        ),
        Err(e) => warn!(width = sample.width(), height = sample.height(), "sampled, {e}"),
    }

    let json = serde_json::to_string(&sample)?;
    match &args.output {
        Some(path) => fs::write(path, json).with_context(|| format!("Write failed: {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_parse_and_validate() {
        assert_eq!(parse_bounds("141, 43, 141.5, 43.5").unwrap(), BBox::new(141.0, 43.0, 141.5, 43.5));
        assert!(parse_bounds("141,43,141.5").is_err());
        assert!(parse_bounds("141,43.5,141.5,43").is_err());
        assert!(parse_bounds("a,b,c,d").is_err());
    }

    #[test]
    fn tiepoint_at_origin_pixel() {
        let b = bounds_from_tags(&[0.0, 0.0, 0.0, 141.0, 44.0, 0.0], &[0.001, 0.002, 0.0], 100, 50).unwrap();
        assert_eq!(b.min_lon, 141.0);
        assert_eq!(b.max_lat, 44.0);
        assert!((b.max_lon - 141.1).abs() < 1e-9);
        assert!((b.min_lat - 43.9).abs() < 1e-9);
        assert!(bounds_from_tags(&[0.0; 3], &[1.0, 1.0], 1, 1).is_err());
    }

    #[test]
    fn mercator_corners_convert() {
        let b = mercator_to_degrees(BBox::new(0.0, 0.0, 111_319.490_793_273_6, 111_325.142_866_385_1)).unwrap();
        assert!(b.min_lon.abs() < 1e-9 && b.min_lat.abs() < 1e-9);
        assert!((b.max_lon - 1.0).abs() < 1e-9);
        assert!((b.max_lat - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nodata_becomes_sentinel() {
        let mut v = vec![-9999.0, 42.0, f64::NAN, 50.0];
        normalise(&mut v, Some(-9999.0), 0.5);
        assert_eq!(v, vec![0.0, 21.0, 0.0, 25.0]);
    }

    #[test]
    fn integer_bands_widen() {
        assert_eq!(band_to_f64(DecodingResult::U16(vec![1, 300])).unwrap(), vec![1.0, 300.0]);
        assert_eq!(band_to_f64(DecodingResult::I16(vec![-5])).unwrap(), vec![-5.0]);
    }
}
