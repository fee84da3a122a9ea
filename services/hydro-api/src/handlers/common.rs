//! Query parsing shared by the bbox endpoints.

use serde::Deserialize;

use hydro_common::{BoundingBox, HydroError, HydroResult};

/// A bounding box given either as four edges or as
/// `bbox=west,south,east,north`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BboxParams {
    pub north: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub west: Option<f64>,
    pub bbox: Option<String>,
}

impl BboxParams {
    pub fn to_bbox(&self) -> HydroResult<BoundingBox> {
        if let Some(raw) = &self.bbox {
            return BoundingBox::from_param_string(raw)
                .map_err(|e| HydroError::InvalidBbox(e.to_string()));
        }
        match (self.north, self.south, self.east, self.west) {
            (Some(north), Some(south), Some(east), Some(west)) => {
                Ok(BoundingBox::new(north, south, east, west))
            }
            _ => Err(HydroError::InvalidBbox(
                "north, south, east and west are all required".to_string(),
            )),
        }
    }
}
