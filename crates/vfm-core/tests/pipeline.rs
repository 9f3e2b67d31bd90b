//! Field → grid → raster window → map, end to end.
use approx::assert_abs_diff_eq;

use vfm_core::distribution::NO_DATA_FACTOR;
use vfm_core::geodesy::rhumb_destination;
use vfm_core::geojson::{parse_field, vfm_from_geojson, vfm_to_geojson, VfmMap};
use vfm_core::{
    build_base_grid, create_vfm, query_bbox, update_vfm, AggregateOptions, BBox, FieldPolygon, GeoRaster,
    GridError, GridParams, LonLat, RasterSource, VfmConfig, VfmParams,
};

const PIXEL_DEG: f64 = 0.00005;

/// 200 m x 100 m rectangle centred on (141.35°E, 43.06°N), tilted 25°.
fn field() -> FieldPolygon {
    let c = LonLat::new(141.35, 43.06);
    let north = rhumb_destination(c, 50.0, 0.0).lat;
    let south = rhumb_destination(c, 50.0, 180.0).lat;
    let east = rhumb_destination(c, 100.0, 90.0).lon;
    let west = rhumb_destination(c, 100.0, 270.0).lon;
    let upright = FieldPolygon::new(vec![
        LonLat::new(west, south),
        LonLat::new(east, south),
        LonLat::new(east, north),
        LonLat::new(west, north),
        LonLat::new(west, south),
    ])
    .unwrap();
    upright.rotated(25.0, upright.bbox().center())
}

/// Right triangle with 200 m legs and the right angle at the SW corner.
fn triangle() -> FieldPolygon {
    let sw = LonLat::new(141.35, 43.06);
    let se = LonLat::new(rhumb_destination(sw, 200.0, 90.0).lon, sw.lat);
    let nw = LonLat::new(sw.lon, rhumb_destination(sw, 200.0, 0.0).lat);
    FieldPolygon::new(vec![sw, se, nw, sw]).unwrap()
}

/// Humus rising west to east; `blank` columns hold the no-data value.
fn raster_around(field: &FieldPolygon, blank: std::ops::Range<usize>) -> GeoRaster {
    let q = query_bbox(field, 10.0);
    let bounds = BBox::new(q.min_lon - PIXEL_DEG, q.min_lat - PIXEL_DEG, q.max_lon + PIXEL_DEG, q.max_lat + PIXEL_DEG);
    let width = (bounds.width_deg() / PIXEL_DEG).ceil() as usize;
    let height = (bounds.height_deg() / PIXEL_DEG).ceil() as usize;
    let mut data = Vec::with_capacity(width * height);
    for _row in 0..height {
        for col in 0..width {
            data.push(if blank.contains(&col) { 0.0 } else { 20.0 + (col / 4) as f64 });
        }
    }
    GeoRaster::new(width, height, data, bounds).unwrap()
}

#[test]
fn five_step_map_is_balanced_and_monotone() {
    let field = field();
    let grid = build_base_grid(&field, &GridParams::default()).unwrap();
    assert!(!grid.is_dense());

    let raster = raster_around(&field, 0..0);
    let sample = raster.sample(&query_bbox(&field, 10.0)).unwrap();
    let points = sample.to_points();
    let params = VfmParams::default();
    let result = create_vfm(&field, &grid, &points, &AggregateOptions::default(), &params);

    assert!(!result.features.is_empty());
    assert!(result.features.iter().all(|f| f.humus_mean > 0 && f.intersects));

    // Symmetric factors over equal-area tiers average out to zero.
    let total: f64 = result.features.iter().map(|f| f.cell.area as f64).sum();
    let weighted: f64 = result.features.iter().map(|f| f.factor * f.cell.area as f64).sum::<f64>() / total;
    assert_abs_diff_eq!(weighted, 0.0, epsilon = 1e-9);

    // Poorer soil never gets less than richer soil.
    assert!(result.features.windows(2).all(|w| w[0].humus_mean <= w[1].humus_mean));
    assert!(result.features.windows(2).all(|w| w[0].factor >= w[1].factor - 1e-12));
    assert!(result.features.iter().all(|f| (80.0..=120.0).contains(&f.unit)));

    assert_eq!(result.area_sum, total);
    let nominal = params.base_amount * total / 1000.0;
    assert!((result.amount_sum - nominal).abs() / nominal < 0.01, "{} vs {nominal}", result.amount_sum);
}

#[test]
fn update_reproduces_create_and_is_idempotent() {
    let field = field();
    let grid = build_base_grid(&field, &GridParams::default()).unwrap();
    let points = raster_around(&field, 0..0).window(&query_bbox(&field, 10.0)).unwrap().to_points();
    let params = VfmParams::default();
    let created = create_vfm(&field, &grid, &points, &AggregateOptions::default(), &params);

    assert_eq!(update_vfm(&created.features, &params), created);

    let stepless = VfmParams { five_steps: false, ..params };
    let once = update_vfm(&created.features, &stepless);
    let twice = update_vfm(&once.features, &stepless);
    assert_eq!(once, twice);
    assert!(once.features.iter().all(|f| f.factor.abs() <= 0.2 + 1e-12));
    assert!(once.features.iter().any(|f| f.factor != 0.0));
}

#[test]
fn interpolation_fills_covered_cells_without_data() {
    let field = field();
    let grid = build_base_grid(&field, &GridParams::default()).unwrap();
    let raster = raster_around(&field, 0..0);
    // A 60 m no-data stripe through the middle of the field.
    let mid = raster.width / 2;
    let raster = raster_around(&field, mid - 7..mid + 8);
    let points = raster.window(&query_bbox(&field, 10.0)).unwrap().to_points();

    let off = create_vfm(&field, &grid, &points, &AggregateOptions::default(), &VfmParams::default());
    let blank: Vec<_> = off.features.iter().filter(|f| f.humus_mean == 0).collect();
    assert!(!blank.is_empty(), "stripe should leave covered cells without data");
    assert!(blank.iter().all(|f| f.intersects && f.factor == NO_DATA_FACTOR && f.unit == 0.0));

    let params = VfmParams { interpolate_missing: true, ..Default::default() };
    let on = update_vfm(&off.features, &params);
    for f in on.features.iter().filter(|f| f.humus_mean == 0) {
        assert_eq!((f.factor, f.unit), (0.0, params.base_amount));
    }
    assert!(on.area_sum > off.area_sum);
    assert!(on.amount_sum > off.amount_sum);
}

#[test]
fn config_drives_the_whole_chain() {
    let field = field();
    let cfg = VfmConfig::from_json(r#"{"grid_ew_m":25,"grid_ns_m":15,"origin":"SE","range_percent":30,"clip_outside_field":true}"#)
        .unwrap();
    let grid = build_base_grid(&field, &cfg.grid_params()).unwrap();
    let points = raster_around(&field, 0..0)
        .window(&query_bbox(&field, cfg.raster_margin_m))
        .unwrap()
        .to_points();
    let result = create_vfm(&field, &grid, &points, &cfg.aggregate_options(), &cfg.vfm_params());

    assert!(result.features.len() <= grid.cell_count());
    assert!(result.features.iter().all(|f| f.in_field));
    assert!(result.features.iter().all(|f| (70.0..=130.0).contains(&f.unit)));
}

#[test]
fn oversized_grid_is_reported_not_truncated() {
    let field = field();
    // The fitted rotation leaves ≈ 200 x 100 m to tile: ≈ 200 cells at 10 m.
    let ok = build_base_grid(&field, &GridParams { ew_m: 10.0, ns_m: 10.0, ..Default::default() });
    assert!(ok.is_ok());

    let big = {
        let c = LonLat::new(141.35, 43.06);
        let ne = LonLat::new(rhumb_destination(c, 600.0, 90.0).lon, rhumb_destination(c, 600.0, 0.0).lat);
        FieldPolygon::new(BBox::new(c.lon, c.lat, ne.lon, ne.lat).ring().to_vec()).unwrap()
    };
    let err = build_base_grid(&big, &GridParams { ew_m: 10.0, ns_m: 10.0, rotation_deg: Some(0.0), ..Default::default() })
        .unwrap_err();
    assert!(matches!(err, GridError::TooLarge { max: 2000, .. }), "{err}");
    assert!(err.to_string().contains("increase the cell size"));
}

#[test]
fn geojson_round_trip_feeds_update() {
    let json = r#"{"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[
        [141.349,43.0595],[141.351,43.0595],[141.351,43.0605],[141.349,43.0605],[141.349,43.0595]]]}}"#;
    let field = parse_field(json).unwrap();
    let grid = build_base_grid(&field, &GridParams { rotation_deg: Some(0.0), ..Default::default() }).unwrap();
    let points = raster_around(&field, 0..0).window(&query_bbox(&field, 10.0)).unwrap().to_points();
    let params = VfmParams::default();
    let result = create_vfm(&field, &grid, &points, &AggregateOptions::default(), &params);

    let exported = serde_json::to_string(&VfmMap::new(&result, params.base_amount, 20.0)).unwrap();
    let doc: VfmMap = serde_json::from_str(&exported).unwrap();
    let features = vfm_from_geojson(doc.vfm).unwrap();
    assert_eq!(update_vfm(&features, &params), result);
    assert_eq!(vfm_to_geojson(&features).features.len(), result.features.len());
}

#[test]
fn corner_cells_far_from_the_field_get_no_coverage() {
    let field = triangle();
    let grid = build_base_grid(&field, &GridParams { rotation_deg: Some(0.0), ..Default::default() }).unwrap();
    let sample = raster_around(&field, 0..0).window(&query_bbox(&field, 10.0)).unwrap();
    let params = VfmParams::default();
    let opts = AggregateOptions::default();

    // The NE cell is ≈ 130 m from the hypotenuse.
    let ne = field.bbox().ne();
    let corner = grid.cells.iter().find(|c| c.bbox().contains(ne)).unwrap();

    let whole_window = create_vfm(&field, &grid, &sample.to_points(), &opts, &params);
    let rated = whole_window.features.iter().find(|f| f.cell == *corner).unwrap();
    assert!(rated.unit > 0.0, "every bbox pixel counts without the filter");

    let points = sample.points_near(&field, 10.0).unwrap();
    assert!(points.len() < sample.to_points().len());
    let near = create_vfm(&field, &grid, &points, &opts, &params);
    assert!(near.features.iter().all(|f| f.cell != *corner), "corner cell dropped");
    assert!(near.features.len() < whole_window.features.len());
    assert!(near.area_sum < whole_window.area_sum);
    assert!(near.features.iter().all(|f| f.intersects));
}

#[test]
fn buffer_grows_the_gridded_area() {
    let field = field();
    let plain = build_base_grid(&field, &VfmConfig::default().grid_params()).unwrap();

    let cfg = VfmConfig::from_json(r#"{"buffer_m":15}"#).unwrap();
    let grown_field = cfg.buffered_field(&field).unwrap();
    assert!(field.ring().iter().all(|&p| grown_field.contains(p)));
    let grown = build_base_grid(&grown_field, &cfg.grid_params()).unwrap();
    assert!(grown.total_area() > plain.total_area());
}
