//! Request dispatch
//!
//! A [`RequestDispatcher`] is the private context of one worker: it owns that
//! worker's HTTP client or native engine and turns one [`WorkItem`] into one
//! [`Probe`]. Transport failures never escape `dispatch`; they become a probe
//! without a distance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::core::config::{Action, RunConfig, TransportTarget};
use crate::core::error::{Error, Result};
use crate::core::geo::Coordinate;
use crate::core::native::{load_binding, EngineFactory, RoutingEngine};
use crate::core::sampler::LocationPair;

/// One unit of work for the test pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    Route(LocationPair),
    /// Locations used as both sources and targets
    Matrix(Vec<Coordinate>),
}

impl WorkItem {
    pub fn coordinates(&self) -> Vec<Coordinate> {
        match self {
            WorkItem::Route(pair) => pair.coordinates().to_vec(),
            WorkItem::Matrix(coords) => coords.clone(),
        }
    }
}

/// How a single request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The engine answered
    Ok,
    /// The engine answered without a route
    NoRoute,
    /// Connection failure, timeout or engine runtime error
    Failed,
}

/// Outcome of one timed request
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub latency: Duration,
    /// Route or mean matrix distance; only computed in report mode
    pub distance: Option<f64>,
    pub status: ProbeStatus,
}

impl Probe {
    fn new(latency: Duration, distance: Option<f64>, status: ProbeStatus) -> Self {
        Self {
            latency,
            distance,
            status,
        }
    }
}

/// Transport capability resolved once at startup
#[derive(Clone)]
pub enum Backend {
    Http,
    Native(Arc<dyn EngineFactory>),
}

impl Backend {
    /// Resolve the backend for `config`; loads the native binding if selected
    pub fn resolve(config: &RunConfig) -> Result<Self> {
        match config.target {
            TransportTarget::Http { .. } => Ok(Backend::Http),
            TransportTarget::Native { .. } => Ok(Backend::Native(load_binding()?)),
        }
    }
}

/// Per-worker transport state
enum WorkerTransport {
    Http { client: Client, host: String },
    Native(Box<dyn RoutingEngine>),
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    routes: Option<Vec<RouteEntry>>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    distance: f64,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    sources_to_targets: Option<Vec<Vec<Option<MatrixCell>>>>,
}

#[derive(Debug, Deserialize)]
struct MatrixCell {
    distance: Option<f64>,
}

/// `lon,lat` pairs joined by `;`
pub fn coordinates_path(coords: &[Coordinate]) -> String {
    coords
        .iter()
        .map(|c| format!("{},{}", c.lon, c.lat))
        .collect::<Vec<_>>()
        .join(";")
}

/// Full request URL for `item` against `host`
pub fn request_url(host: &str, action: Action, coords: &[Coordinate]) -> String {
    format!(
        "{}/{}/v1/driving/{}",
        host.trim_end_matches('/'),
        action.service(),
        coordinates_path(coords)
    )
}

/// Sum of `routes[].distance`; `None` when the response has no `routes`
pub fn route_distance(body: &[u8]) -> Result<Option<f64>> {
    let response: RouteResponse = serde_json::from_slice(body)
        .map_err(|e| Error::RoutingError(format!("invalid route response: {e}")))?;
    Ok(response
        .routes
        .map(|routes| routes.iter().map(|r| r.distance).sum()))
}

/// Mean of every present `sources_to_targets[i][j].distance`
///
/// With `exclude_diagonal`, cells with `i == j` are skipped. Returns `None`
/// when the key is missing or no cell carries a distance.
pub fn matrix_distance(body: &[u8], exclude_diagonal: bool) -> Result<Option<f64>> {
    let response: MatrixResponse = serde_json::from_slice(body)
        .map_err(|e| Error::RoutingError(format!("invalid matrix response: {e}")))?;

    let Some(grid) = response.sources_to_targets else {
        return Ok(None);
    };

    let distances: Vec<f64> = grid
        .iter()
        .enumerate()
        .flat_map(|(i, row)| {
            row.iter()
                .enumerate()
                .filter(move |(j, _)| !(exclude_diagonal && i == *j))
                .filter_map(|(_, cell)| cell.as_ref().and_then(|c| c.distance))
        })
        .collect();

    if distances.is_empty() {
        return Ok(None);
    }
    Ok(Some(distances.iter().sum::<f64>() / distances.len() as f64))
}

fn describe(item: &WorkItem) -> String {
    match item {
        WorkItem::Route(pair) => format!(
            "({}, {}) to ({}, {})",
            pair.origin.lon, pair.origin.lat, pair.destination.lon, pair.destination.lat
        ),
        WorkItem::Matrix(coords) => format!("a {}x{} matrix", coords.len(), coords.len()),
    }
}

/// Worker-local request context
pub struct RequestDispatcher<'a> {
    config: &'a RunConfig,
    transport: WorkerTransport,
}

impl<'a> RequestDispatcher<'a> {
    /// Build the context of one worker
    ///
    /// For the native backend the engine is constructed while holding `lock`,
    /// so only one engine is ever being built at a time across the pool.
    pub fn init(config: &'a RunConfig, backend: &Backend, lock: &Mutex<()>) -> Result<Self> {
        let transport = match (&config.target, backend) {
            (TransportTarget::Http { .. }, _) => {
                let client = Client::builder()
                    .timeout(config.timeout)
                    .connect_timeout(config.timeout.min(Duration::from_secs(10)))
                    .user_agent(format!("butterfly-probe/{}", env!("PROBE_VERSION")))
                    .build()?;
                let host = config.host().unwrap_or_default().to_string();
                WorkerTransport::Http { client, host }
            }
            (TransportTarget::Native { resource }, Backend::Native(factory)) => {
                let _guard = lock.lock();
                debug!("Constructing routing engine from {}", resource.display());
                WorkerTransport::Native(factory.create(resource, &config.algorithm)?)
            }
            (TransportTarget::Native { .. }, Backend::Http) => {
                return Err(Error::BindingUnavailable(
                    "native transport selected but no binding was resolved".to_string(),
                ))
            }
        };

        Ok(Self { config, transport })
    }

    /// Issue the request for `item` and time it
    pub fn dispatch(&mut self, item: &WorkItem) -> Result<Probe> {
        match &mut self.transport {
            WorkerTransport::Http { client, host } => {
                Ok(Self::dispatch_http(self.config, client, host, item))
            }
            WorkerTransport::Native(engine) => match item {
                WorkItem::Route(pair) => {
                    Ok(Self::dispatch_native(self.config, engine.as_mut(), pair))
                }
                WorkItem::Matrix(_) => Err(Error::UnsupportedOperation(
                    "the matrix action is not available through the native binding".to_string(),
                )),
            },
        }
    }

    fn dispatch_http(config: &RunConfig, client: &Client, host: &str, item: &WorkItem) -> Probe {
        let url = request_url(host, config.action, &item.coordinates());

        let start = Instant::now();
        let body = client.get(&url).send().and_then(|response| response.bytes());
        let latency = start.elapsed();

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                debug!("Request for {} failed: {}", describe(item), Error::from(e));
                return Probe::new(latency, None, ProbeStatus::Failed);
            }
        };

        if !config.report {
            return Probe::new(latency, None, ProbeStatus::Ok);
        }

        let parsed = match item {
            WorkItem::Route(_) => route_distance(&body),
            WorkItem::Matrix(_) => matrix_distance(&body, config.exclude_diagonal),
        };

        match parsed {
            Ok(Some(distance)) => Probe::new(latency, Some(distance), ProbeStatus::Ok),
            Ok(None) => {
                error!(
                    "No route was found for {}. Try regenerating the locations or specify \
                     a more narrow bounding box.",
                    describe(item)
                );
                Probe::new(latency, None, ProbeStatus::NoRoute)
            }
            Err(e) => {
                debug!("Unusable response for {}: {e}", describe(item));
                Probe::new(latency, None, ProbeStatus::Failed)
            }
        }
    }

    fn dispatch_native(
        config: &RunConfig,
        engine: &mut dyn RoutingEngine,
        pair: &LocationPair,
    ) -> Probe {
        let start = Instant::now();
        let outcome = engine.route(pair);
        let latency = start.elapsed();

        match outcome {
            Ok(summary) => {
                let distance = config.report.then(|| summary.total_distance());
                Probe::new(latency, distance, ProbeStatus::Ok)
            }
            Err(e) => {
                debug!("Routing {} failed: {e}", describe(&WorkItem::Route(*pair)));
                Probe::new(latency, None, ProbeStatus::Failed)
            }
        }
    }
}
