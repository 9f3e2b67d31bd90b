use anyhow::{Context, Result};
use serde::Serialize;
use wasm_bindgen::prelude::*;

use vfm_core::geojson::{
    grid_from_geojson, grid_to_geojson, parse_collection, parse_field, vfm_from_geojson, GridProperties, VfmMap,
};
use vfm_core::{BaseGrid, GridOrigin, RasterSample, VfmConfig};

#[wasm_bindgen(start)]
pub fn init() {}

/// Plain JS objects rather than `Map`s, so results can go straight to a map library.
fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

fn js_err(e: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{e:#}"))
}

/// `config_json` (may be empty) layered over `base`.
fn config_over(base: VfmConfig, config_json: &str) -> Result<VfmConfig> {
    if config_json.trim().is_empty() {
        return Ok(base);
    }
    base.with_json(config_json).context("Invalid settings")
}

fn config(config_json: &str) -> Result<VfmConfig> {
    config_over(VfmConfig::default(), config_json)
}

fn rotation(field_json: &str) -> Result<f64> {
    let field = parse_field(field_json).context("Invalid field")?;
    Ok(vfm_core::find_optimal_rotation(&field))
}

fn mesh(field_json: &str, ew_m: f64, ns_m: f64, origin: &str) -> Result<BaseGrid> {
    let field = parse_field(field_json).context("Invalid field")?;
    let origin: GridOrigin = origin.parse().map_err(anyhow::Error::msg)?;
    Ok(vfm_core::generate_mesh(&field, ew_m, ns_m, origin)?)
}

fn base_grid(field_json: &str, config_json: &str) -> Result<BaseGrid> {
    let cfg = config(config_json)?;
    let field = cfg.buffered_field(&parse_field(field_json).context("Invalid field")?)?;
    Ok(vfm_core::build_base_grid(&field, &cfg.grid_params())?)
}

fn create(field_json: &str, grid_json: &str, sample_json: &str, config_json: &str) -> Result<VfmMap> {
    let cfg = config(config_json)?;
    let field = cfg.buffered_field(&parse_field(field_json).context("Invalid field")?)?;
    let grid = grid_from_geojson(parse_collection::<GridProperties>(grid_json)?).context("Invalid grid")?;
    let sample: RasterSample = serde_json::from_str(sample_json).context("Invalid raster sample")?;
    let result = vfm_core::create_vfm(
        &field,
        &grid,
        &sample.points_near(&field, cfg.raster_margin_m)?,
        &cfg.aggregate_options(),
        &cfg.vfm_params(),
    );
    Ok(VfmMap::new(&result, cfg.base_amount, cfg.range_percent))
}

fn update(map_json: &str, config_json: &str) -> Result<VfmMap> {
    let doc: VfmMap = serde_json::from_str(map_json).context("Invalid map document")?;
    let cfg = config_over(VfmConfig::for_map(&doc), config_json)?;
    let features = vfm_from_geojson(doc.vfm)?;
    let result = vfm_core::update_vfm(&features, &cfg.vfm_params());
    Ok(VfmMap::new(&result, cfg.base_amount, cfg.range_percent))
}

/// Rotation in degrees giving the tightest grid for a field GeoJSON.
#[wasm_bindgen(js_name = findOptimalRotation)]
pub fn find_optimal_rotation(field_json: &str) -> Result<f64, JsValue> {
    rotation(field_json).map_err(js_err)
}

/// North-up mesh over the field's bounding box, as a grid FeatureCollection.
#[wasm_bindgen(js_name = generateMesh)]
pub fn generate_mesh(field_json: &str, ew_m: f64, ns_m: f64, origin: &str) -> Result<JsValue, JsValue> {
    let grid = mesh(field_json, ew_m, ns_m, origin).map_err(js_err)?;
    to_js(&grid_to_geojson(&grid))
}

/// Rotated base grid for a field under the given settings JSON (may be empty).
#[wasm_bindgen(js_name = buildBaseGrid)]
pub fn build_base_grid(field_json: &str, config_json: &str) -> Result<JsValue, JsValue> {
    let grid = base_grid(field_json, config_json).map_err(js_err)?;
    to_js(&grid_to_geojson(&grid))
}

#[wasm_bindgen(js_name = humusStats)]
pub fn humus_stats(sample_json: &str) -> Result<JsValue, JsValue> {
    let sample: RasterSample = serde_json::from_str(sample_json)
        .context("Invalid raster sample")
        .map_err(js_err)?;
    let stats = sample.stats().map_err(|e| js_err(e.into()))?;
    to_js(&stats)
}

#[wasm_bindgen(js_name = createVfm)]
pub fn create_vfm(field_json: &str, grid_json: &str, sample_json: &str, config_json: &str) -> Result<JsValue, JsValue> {
    to_js(&create(field_json, grid_json, sample_json, config_json).map_err(js_err)?)
}

#[wasm_bindgen(js_name = updateVfm)]
pub fn update_vfm(map_json: &str, config_json: &str) -> Result<JsValue, JsValue> {
    to_js(&update(map_json, config_json).map_err(js_err)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELD: &str = r#"{"type":"Polygon","coordinates":[[
        [141.349,43.0595],[141.351,43.0595],[141.351,43.0605],[141.349,43.0605],[141.349,43.0595]]]}"#;

    fn sample_json() -> String {
        // 40 x 20 pixels over the field, humus rising eastward.
        let values: Vec<f64> = (0..20).flat_map(|_| (0..40).map(|c| 30.0 + c as f64)).collect();
        serde_json::json!({
            "width": 40,
            "height": 20,
            "values": values,
            "bbox": {"min_lon": 141.349, "min_lat": 43.0595, "max_lon": 141.351, "max_lat": 43.0605}
        })
        .to_string()
    }

    #[test]
    fn empty_settings_mean_defaults() {
        assert_eq!(config("  ").unwrap(), VfmConfig::default());
        assert!(config("{\"origin\":1}").is_err());
    }

    #[test]
    fn create_then_update_through_json() {
        let grid = base_grid(FIELD, r#"{"rotation_deg":0}"#).unwrap();
        let grid_json = serde_json::to_string(&grid_to_geojson(&grid)).unwrap();

        let created = create(FIELD, &grid_json, &sample_json(), "").unwrap();
        assert!(!created.vfm.features.is_empty());
        assert_eq!(created.amount_10a, 100.0);

        let map_json = serde_json::to_string(&created).unwrap();
        let same = update(&map_json, "").unwrap();
        assert_eq!(same, created);

        let wider = update(&map_json, r#"{"range_percent":40}"#).unwrap();
        assert_eq!(wider.fertilization_range, 40.0);
        let units = |m: &VfmMap| m.vfm.features.iter().map(|f| f.properties.amount_fertilization_unit).fold(0.0, f64::max);
        assert!(units(&wider) > units(&created));
    }

    #[test]
    fn update_starts_from_the_map_settings() {
        let grid = base_grid(FIELD, r#"{"rotation_deg":0}"#).unwrap();
        let grid_json = serde_json::to_string(&grid_to_geojson(&grid)).unwrap();
        let created = create(FIELD, &grid_json, &sample_json(), r#"{"base_amount":80}"#).unwrap();
        let map_json = serde_json::to_string(&created).unwrap();

        let wider = update(&map_json, r#"{"range_percent":30}"#).unwrap();
        assert_eq!(wider.amount_10a, 80.0);
        assert_eq!(wider.fertilization_range, 30.0);
        let max_unit = wider.vfm.features.iter().map(|f| f.properties.amount_fertilization_unit).fold(0.0, f64::max);
        assert!(max_unit <= 80.0 * 1.3 + 0.5, "rates around 80, got {max_unit}");
    }

    #[test]
    fn mesh_rejects_unknown_origin() {
        assert!(mesh(FIELD, 20.0, 20.0, "NE").is_err());
        assert!(mesh(FIELD, 20.0, 20.0, "se").is_ok());
        assert!(rotation(FIELD).is_ok());
    }
}
