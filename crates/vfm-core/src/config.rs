//! User-facing settings for one map, and the engine parameters they imply.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GeometryError;
use crate::geojson::VfmMap;
use crate::geometry::FieldPolygon;
use crate::grid::{GridOrigin, GridParams};
use crate::humus::AggregateOptions;
use crate::raster::DEFAULT_RASTER_MARGIN_M;
use crate::vfm::{application_steps, VfmParams};

/// Every field is optional in JSON; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfmConfig {
    /// Cell width east-west, metres.
    pub grid_ew_m: f64,
    /// Cell height north-south, metres.
    pub grid_ns_m: f64,
    pub origin: GridOrigin,
    /// Fixed grid rotation in degrees; absent means search for the tightest fit.
    pub rotation_deg: Option<f64>,
    /// kg/10a.
    pub base_amount: f64,
    /// Maximum increase/decrease, percent of the base amount.
    pub range_percent: f64,
    pub five_steps: bool,
    pub interpolate_missing: bool,
    pub clip_outside_field: bool,
    pub nearest_fallback_m: Option<f64>,
    /// Growth of the field (negative shrinks it) before gridding, metres.
    pub buffer_m: f64,
    /// Sample points further than this outside the buffered field are
    /// ignored; also the growth of the raster query area. Metres.
    pub raster_margin_m: f64,
}

impl Default for VfmConfig {
    fn default() -> Self {
        Self {
            grid_ew_m: 20.0,
            grid_ns_m: 20.0,
            origin: GridOrigin::NW,
            rotation_deg: None,
            base_amount: 100.0,
            range_percent: 20.0,
            five_steps: true,
            interpolate_missing: false,
            clip_outside_field: false,
            nearest_fallback_m: None,
            buffer_m: 0.0,
            raster_margin_m: DEFAULT_RASTER_MARGIN_M,
        }
    }
}

impl VfmConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Settings a saved map was made with, as far as the document records them.
    pub fn for_map(map: &VfmMap) -> Self {
        Self {
            base_amount: map.amount_10a,
            range_percent: map.fertilization_range,
            ..Self::default()
        }
    }

    /// `self` with the fields present in the JSON object `json` overridden.
    pub fn with_json(&self, json: &str) -> Result<Self, serde_json::Error> {
        let overrides: Map<String, Value> = serde_json::from_str(json)?;
        let mut merged = serde_json::to_value(self)?;
        if let Value::Object(fields) = &mut merged {
            fields.extend(overrides);
        }
        serde_json::from_value(merged)
    }

    /// The field the grid and the aggregation work on: `field` after the buffer.
    pub fn buffered_field(&self, field: &FieldPolygon) -> Result<FieldPolygon, GeometryError> {
        field.buffered(self.buffer_m)
    }

    pub fn grid_params(&self) -> GridParams {
        GridParams {
            ew_m: self.grid_ew_m,
            ns_m: self.grid_ns_m,
            origin: self.origin,
            rotation_deg: self.rotation_deg,
        }
    }

    pub fn vfm_params(&self) -> VfmParams {
        VfmParams {
            five_steps: self.five_steps,
            factors: application_steps(self.range_percent),
            base_amount: self.base_amount,
            interpolate_missing: self.interpolate_missing,
        }
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            clip_outside_field: self.clip_outside_field,
            nearest_fallback_m: self.nearest_fallback_m,
        }
    }
}
