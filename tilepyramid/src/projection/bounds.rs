//! Geographic bounding boxes.

use super::ProjectionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Valid latitude range in degrees.
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Valid longitude range in degrees.
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// A longitude/latitude rectangle in degrees (EPSG:4326).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeoBounds {
    /// Creates validated bounds.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, ProjectionError> {
        let bounds = Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// The whole Web Mercator world, trimmed to ±85° latitude.
    pub const fn world() -> Self {
        Self {
            min_lon: -180.0,
            min_lat: -85.0,
            max_lon: 180.0,
            max_lat: 85.0,
        }
    }

    /// Returns true if the point lies inside or on the edge of the box.
    #[inline]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.min_lon..=self.max_lon).contains(&lon) && (self.min_lat..=self.max_lat).contains(&lat)
    }

    /// Returns true if the two boxes share any area.
    pub fn intersects(&self, other: &GeoBounds) -> bool {
        self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
            && self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
    }

    fn validate(&self) -> Result<(), ProjectionError> {
        let values = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ProjectionError::InvalidBounds(
                *self,
                "coordinates must be finite",
            ));
        }
        if !(MIN_LON..=MAX_LON).contains(&self.min_lon) || !(MIN_LON..=MAX_LON).contains(&self.max_lon) {
            return Err(ProjectionError::InvalidBounds(
                *self,
                "longitude must be between -180 and 180",
            ));
        }
        if !(MIN_LAT..=MAX_LAT).contains(&self.min_lat) || !(MIN_LAT..=MAX_LAT).contains(&self.max_lat) {
            return Err(ProjectionError::InvalidBounds(
                *self,
                "latitude must be between -90 and 90",
            ));
        }
        if self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(ProjectionError::InvalidBounds(
                *self,
                "minimum must be smaller than maximum",
            ));
        }
        Ok(())
    }
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self::world()
    }
}

impl fmt::Display for GeoBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl FromStr for GeoBounds {
    type Err = ProjectionError;

    /// Parses `minlon,minlat,maxlon,maxlat`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ProjectionError::Malformed(s.to_string()))?;

        match values.as_slice() {
            [min_lon, min_lat, max_lon, max_lat] => {
                GeoBounds::new(*min_lon, *min_lat, *max_lon, *max_lat)
            }
            _ => Err(ProjectionError::Malformed(s.to_string())),
        }
    }
}
