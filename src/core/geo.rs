//! Geographic primitives for butterfly-probe
//!
//! Coordinates are `(lon, lat)` pairs in degrees, matching the order OSRM
//! expects in request paths.

use std::fmt;
use std::str::FromStr;

use geo::{HaversineDistance, Point};

use crate::core::error::{Error, Result};

/// Decimal places kept for generated coordinates
pub const COORDINATE_PRECISION: i32 = 6;

/// Round a degree value to [`COORDINATE_PRECISION`] decimals
pub fn round_coordinate(value: f64) -> f64 {
    let factor = 10f64.powi(COORDINATE_PRECISION);
    (value * factor).round() / factor
}

/// A `(lon, lat)` position in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Same position rounded to the generation precision
    pub fn rounded(self) -> Self {
        Self {
            lon: round_coordinate(self.lon),
            lat: round_coordinate(self.lat),
        }
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

impl From<Coordinate> for Point<f64> {
    fn from(c: Coordinate) -> Self {
        Point::new(c.lon, c.lat)
    }
}

/// Great-circle distance in meters (haversine, mean Earth radius)
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let p1: Point<f64> = a.into();
    let p2: Point<f64> = b.into();
    p1.haversine_distance(&p2)
}

/// Axis-aligned bounding box in longitude/latitude
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Geometric sanity check: ordered corners inside lon/lat ranges
    pub fn is_valid(&self) -> bool {
        let coords = [self.min_x, self.min_y, self.max_x, self.max_y];
        if coords.iter().any(|c| c.is_nan()) {
            return false;
        }

        !(self.min_x > self.max_x
            || self.min_x < -180.0
            || self.max_x > 180.0
            || self.min_y > self.max_y
            || self.min_y < -90.0
            || self.max_y > 90.0)
    }

    /// Validate, turning a rejected box into a configuration error
    pub fn validated(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(Error::InvalidBbox(self.to_string()))
        }
    }

    pub fn contains(&self, c: Coordinate) -> bool {
        c.lon >= self.min_x && c.lon <= self.max_x && c.lat >= self.min_y && c.lat <= self.max_y
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Parses `"x_min,y_min,x_max,y_max"`; does not validate ranges
impl FromStr for BoundingBox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(Error::InvalidBbox(format!(
                "expected \"x_min,y_min,x_max,y_max\", got {s:?}"
            )));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f64>()
                .map_err(|_| Error::InvalidBbox(format!("{part:?} is not a number")))?;
        }

        Ok(BoundingBox::new(values[0], values[1], values[2], values[3]))
    }
}
