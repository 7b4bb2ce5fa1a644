//! Constrained random location generation
//!
//! A pair keeps its first point and resamples the second until the haversine
//! distance between them satisfies the [`AcceptanceRule`].

use std::fmt;
use std::str::FromStr;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::config::Defaults;
use crate::core::error::{Error, Result};
use crate::core::geo::{distance_meters, round_coordinate, BoundingBox, Coordinate};

/// Two waypoints for one route request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationPair {
    pub origin: Coordinate,
    pub destination: Coordinate,
}

impl LocationPair {
    pub fn new(origin: Coordinate, destination: Coordinate) -> Self {
        Self {
            origin,
            destination,
        }
    }

    /// Haversine distance between the two waypoints
    pub fn distance(&self) -> f64 {
        distance_meters(self.origin, self.destination)
    }

    pub fn coordinates(&self) -> [Coordinate; 2] {
        [self.origin, self.destination]
    }
}

/// When a candidate second point is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptanceRule {
    /// Stop once the distance falls outside `[lower, upper]`
    /// (`d < lower || d > upper`). Historic behavior of the tool.
    #[default]
    Outside,
    /// Stop once `lower < d < upper`
    Inside,
}

impl AcceptanceRule {
    pub fn accepts(&self, distance: f64, lower: f64, upper: f64) -> bool {
        match self {
            AcceptanceRule::Outside => distance > upper || distance < lower,
            AcceptanceRule::Inside => distance > lower && distance < upper,
        }
    }
}

impl fmt::Display for AcceptanceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptanceRule::Outside => write!(f, "outside"),
            AcceptanceRule::Inside => write!(f, "inside"),
        }
    }
}

impl FromStr for AcceptanceRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "outside" => Ok(AcceptanceRule::Outside),
            "inside" => Ok(AcceptanceRule::Inside),
            other => Err(Error::InvalidInput(format!(
                "acceptance rule must be 'outside' or 'inside', got '{other}'"
            ))),
        }
    }
}

/// Shared, read-only parameters of a generation run
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub bbox: BoundingBox,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub rule: AcceptanceRule,
    /// Ceiling on draws of the second point per pair
    pub max_attempts: u64,
    /// Base seed; worker `i` uses `seed + i`
    pub seed: Option<u64>,
}

impl GeneratorConfig {
    pub fn new(bbox: BoundingBox, lower_limit: f64, upper_limit: f64) -> Self {
        Self {
            bbox,
            lower_limit,
            upper_limit,
            rule: AcceptanceRule::default(),
            max_attempts: Defaults::MAX_ATTEMPTS,
            seed: None,
        }
    }

    /// Startup checks; runs before any worker is spawned
    pub fn validate(&self) -> Result<()> {
        self.bbox.validated()?;

        let limits = [self.lower_limit, self.upper_limit];
        if limits.iter().any(|l| l.is_nan() || *l < 0.0) {
            return Err(Error::InvalidInput(
                "distance limits must be non-negative".to_string(),
            ));
        }
        if self.lower_limit > self.upper_limit {
            return Err(Error::InvalidInput(format!(
                "lower limit {} m exceeds upper limit {} m",
                self.lower_limit, self.upper_limit
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidInput(
                "max attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GeneratorConfig {
    /// Whole world with the default distance limits
    fn default() -> Self {
        Self::new(
            BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            Defaults::LOWER_LIMIT,
            Defaults::UPPER_LIMIT,
        )
    }
}

/// Per-worker generator state
pub struct LocationSampler {
    config: GeneratorConfig,
    rng: StdRng,
}

impl LocationSampler {
    /// Build the sampler for worker `worker_index`
    pub fn new(config: GeneratorConfig, worker_index: usize) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker_index as u64)),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    /// Uniform point inside the bbox, rounded to 6 decimals
    ///
    /// Rounding never moves a point across the bbox edges, even when the
    /// bounds carry more decimals than the output.
    pub fn sample_point(&mut self) -> Coordinate {
        let bbox = self.config.bbox;
        let lon = sample_axis(&mut self.rng, bbox.min_x, bbox.max_x);
        let lat = sample_axis(&mut self.rng, bbox.min_y, bbox.max_y);
        Coordinate::new(lon, lat)
    }

    /// Generate one pair under the configured acceptance rule
    pub fn generate_pair(&mut self) -> Result<LocationPair> {
        let origin = self.sample_point();
        let (lower, upper) = (self.config.lower_limit, self.config.upper_limit);

        for attempt in 1..=self.config.max_attempts {
            let destination = self.sample_point();
            let distance = distance_meters(origin, destination);
            if self.config.rule.accepts(distance, lower, upper) {
                if attempt > 1 {
                    debug!("Accepted pair after {attempt} draws ({distance:.1} m)");
                }
                return Ok(LocationPair::new(origin, destination));
            }
        }

        Err(Error::GenerationExhausted {
            attempts: self.config.max_attempts,
        })
    }
}

/// Rounded uniform value, pulled back inside `[min, max]`
fn sample_axis(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    round_coordinate(uniform(rng, min, max)).max(min).min(max)
}

/// `gen_range` rejects empty ranges; degenerate axes collapse to their bound
fn uniform(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    if min < max {
        rng.gen_range(min..=max)
    } else {
        min
    }
}
