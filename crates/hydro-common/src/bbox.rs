//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::error::{HydroError, HydroResult};

/// Decimal places kept when turning a bbox into a cache key (~100 m).
pub const KEY_PRECISION: i32 = 3;

/// A geographic bounding box in WGS84 degrees.
///
/// Valid boxes satisfy `south < north` and `west < east` with every edge
/// inside [-90, 90] / [-180, 180]. Antimeridian-crossing boxes are not
/// supported; callers split them before reaching this layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Create a new bounding box from its four edges.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Parse a map-style BBOX parameter string: "west,south,east,north"
    pub fn from_param_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let parse = |p: &str| -> Result<f64, BboxParseError> {
            let value: f64 = p
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(p.to_string()))?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(BboxParseError::InvalidNumber(p.to_string()))
            }
        };

        Ok(Self {
            west: parse(parts[0])?,
            south: parse(parts[1])?,
            east: parse(parts[2])?,
            north: parse(parts[3])?,
        })
    }

    /// Height of the box in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Width of the box in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn center_lat(&self) -> f64 {
        (self.north + self.south) / 2.0
    }

    pub fn center_lon(&self) -> f64 {
        (self.east + self.west) / 2.0
    }

    /// True when every edge is a finite number.
    pub fn is_finite(&self) -> bool {
        self.north.is_finite()
            && self.south.is_finite()
            && self.east.is_finite()
            && self.west.is_finite()
    }

    /// Check the box against the domain and ordering invariants.
    pub fn validate(&self) -> HydroResult<()> {
        if !self.is_finite() {
            return Err(HydroError::InvalidBbox(format!(
                "non-finite edge in {:?}",
                self
            )));
        }
        if !(-90.0..=90.0).contains(&self.south) || !(-90.0..=90.0).contains(&self.north) {
            return Err(HydroError::InvalidBbox(format!(
                "latitude out of range: south={}, north={}",
                self.south, self.north
            )));
        }
        if !(-180.0..=180.0).contains(&self.west) || !(-180.0..=180.0).contains(&self.east) {
            return Err(HydroError::InvalidBbox(format!(
                "longitude out of range: west={}, east={}",
                self.west, self.east
            )));
        }
        if self.south >= self.north {
            return Err(HydroError::InvalidBbox(format!(
                "south ({}) must be less than north ({})",
                self.south, self.north
            )));
        }
        if self.west >= self.east {
            return Err(HydroError::InvalidBbox(format!(
                "west ({}) must be less than east ({})",
                self.west, self.east
            )));
        }
        Ok(())
    }

    /// Reorder swapped edges and clamp to the coordinate domain.
    ///
    /// Non-finite edges are left untouched so `validate` still rejects them.
    pub fn clamped(&self) -> Self {
        let (south, north) = if self.south <= self.north {
            (self.south, self.north)
        } else {
            (self.north, self.south)
        };
        let (west, east) = if self.west <= self.east {
            (self.west, self.east)
        } else {
            (self.east, self.west)
        };

        Self {
            north: north.clamp(-90.0, 90.0),
            south: south.clamp(-90.0, 90.0),
            east: east.clamp(-180.0, 180.0),
            west: west.clamp(-180.0, 180.0),
        }
    }

    /// Validate, attempting the clamped fallback before giving up.
    pub fn validated_or_clamped(&self) -> HydroResult<Self> {
        if self.validate().is_ok() {
            return Ok(*self);
        }
        let clamped = self.clamped();
        clamped.validate()?;
        Ok(clamped)
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.west < other.east
            && self.east > other.west
            && self.south < other.north
            && self.north > other.south
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    /// Stable cache key fragment for this bbox.
    ///
    /// Edges are rounded to [`KEY_PRECISION`] decimals so viewports that
    /// differ by sub-rounding noise share a key. Swapped edges produce the
    /// same key as the ordered box.
    pub fn cache_key(&self) -> String {
        let north = round_to(self.north.max(self.south), KEY_PRECISION);
        let south = round_to(self.north.min(self.south), KEY_PRECISION);
        let east = round_to(self.east.max(self.west), KEY_PRECISION);
        let west = round_to(self.east.min(self.west), KEY_PRECISION);
        format!("{:.3}_{:.3}_{:.3}_{:.3}", north, south, east, west)
    }
}

/// Canonicalize a bbox into its cache key. See [`BoundingBox::cache_key`].
pub fn canonicalize(bbox: &BoundingBox) -> String {
    bbox.cache_key()
}

/// Round to `places` decimals, folding negative zero into zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor + 0.0
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid BBOX format: {0}. Expected 'west,south,east,north'")]
    InvalidFormat(String),

    #[error("Invalid number in BBOX: {0}")]
    InvalidNumber(String),
}
