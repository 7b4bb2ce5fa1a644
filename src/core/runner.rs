//! The two pipelines: location generation and request testing
//!
//! Both follow the same shape: a [`WorkerPool`] applies a per-item function
//! with a worker-local context built by an init hook, and the caller reduces
//! the unordered results.

use std::io::BufRead;
use std::time::{Duration, Instant};

use log::info;

use crate::core::config::{Action, RunConfig};
use crate::core::dispatch::{Backend, Probe, ProbeStatus, RequestDispatcher, WorkItem};
use crate::core::error::{Error, Result};
use crate::core::geo::Coordinate;
use crate::core::locations::{read_locations, read_pairs};
use crate::core::pool::WorkerPool;
use crate::core::sampler::{GeneratorConfig, LocationPair, LocationSampler};
use crate::core::stats::{summarize, LatencyStats, Summary};

/// Output of a generation run
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedLocations {
    /// One pair per requested route
    Routes(Vec<LocationPair>),
    /// Flattened pairs for one matrix
    Matrix(Vec<Coordinate>),
}

impl GeneratedLocations {
    pub fn len(&self) -> usize {
        match self {
            GeneratedLocations::Routes(pairs) => pairs.len(),
            GeneratedLocations::Matrix(coords) => coords.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which generated matrix coordinates reach the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatrixOutput {
    /// The two coordinates of the first pair that completed
    #[default]
    FirstPair,
    /// Every generated pair, flattened
    AllPairs,
}

impl GeneratedLocations {
    /// Keep what `output` selects; routes pass through unchanged
    pub fn select(self, output: MatrixOutput) -> Self {
        match (self, output) {
            (GeneratedLocations::Matrix(mut coords), MatrixOutput::FirstPair) => {
                coords.truncate(2);
                GeneratedLocations::Matrix(coords)
            }
            (generated, _) => generated,
        }
    }
}

/// Number of pairs to generate for `locations` requested locations
///
/// The matrix action flattens pairs, so it needs half as many.
pub fn pairs_needed(action: Action, locations: usize) -> usize {
    match action {
        Action::Route => locations,
        Action::Matrix => locations / 2,
    }
}

/// Generate locations in parallel
///
/// `on_pair` is called on the calling thread for every pair as it arrives.
pub fn generate_locations<F>(
    config: &GeneratorConfig,
    action: Action,
    locations: usize,
    workers: usize,
    mut on_pair: F,
) -> Result<GeneratedLocations>
where
    F: FnMut(&LocationPair),
{
    config.validate()?;

    let count = pairs_needed(action, locations);
    info!(
        "Generating {count} pairs in {} (limits {} m / {} m, accept {})",
        config.bbox, config.lower_limit, config.upper_limit, config.rule
    );

    let pool = WorkerPool::new(workers);
    let pairs = pool.run(
        (0..count).collect::<Vec<_>>(),
        |index, _| Ok(LocationSampler::new(config.clone(), index)),
        |sampler, _| sampler.generate_pair(),
        |pair| on_pair(pair),
    )?;

    Ok(match action {
        Action::Route => GeneratedLocations::Routes(pairs),
        Action::Matrix => GeneratedLocations::Matrix(
            pairs.iter().flat_map(|p| p.coordinates()).collect(),
        ),
    })
}

/// Build the work items of a test run from a locations file
///
/// Route: one item per line. Matrix: every coordinate of every line forms a
/// single matrix item.
pub fn load_work_items<R: BufRead>(action: Action, reader: R) -> Result<Vec<WorkItem>> {
    match action {
        Action::Route => Ok(read_pairs(reader)?
            .into_iter()
            .map(WorkItem::Route)
            .collect()),
        Action::Matrix => {
            let coords: Vec<Coordinate> = read_locations(reader)?.into_iter().flatten().collect();
            if coords.is_empty() {
                return Err(Error::InvalidInput(
                    "locations file holds no coordinates".to_string(),
                ));
            }
            Ok(vec![WorkItem::Matrix(coords)])
        }
    }
}

/// Aggregated outcome of a test run
pub struct TestReport {
    /// Wall-clock time spent in the pool
    pub elapsed: Duration,
    pub requests: usize,
    /// Distance summary; `None` without report mode or without successes
    pub distances: Option<Summary>,
    pub latency: LatencyStats,
}

impl TestReport {
    pub fn from_probes(probes: &[Probe], elapsed: Duration) -> Self {
        let mut latency = LatencyStats::new();
        for probe in probes {
            latency.record(probe.latency);
            match probe.status {
                ProbeStatus::Ok => {}
                ProbeStatus::NoRoute => latency.record_unroutable(),
                ProbeStatus::Failed => latency.record_failure(),
            }
        }

        Self {
            elapsed,
            requests: probes.len(),
            distances: summarize(probes.iter().map(|p| p.distance)),
            latency,
        }
    }

    pub fn requests_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.requests as f64 / secs
        } else {
            0.0
        }
    }
}

/// Replay `items` against the routing engine
///
/// `config` must already be validated and `backend` resolved for it.
pub fn run_test<F>(
    config: &RunConfig,
    backend: &Backend,
    items: Vec<WorkItem>,
    mut on_probe: F,
) -> Result<TestReport>
where
    F: FnMut(&Probe),
{
    info!(
        "Testing {} {} requests with {} workers",
        items.len(),
        config.action,
        config.workers
    );

    let pool = WorkerPool::new(config.workers);
    let start = Instant::now();
    let probes = pool.run(
        items,
        |_, lock| RequestDispatcher::init(config, backend, lock),
        |dispatcher, item| dispatcher.dispatch(&item),
        |probe| on_probe(probe),
    )?;
    let elapsed = start.elapsed();

    Ok(TestReport::from_probes(&probes, elapsed))
}
