//! # Butterfly-probe Library
//!
//! Synthetic waypoint generation and parallel load testing for
//! OSRM-compatible routing engines.
//!
//! ## Features
//!
//! - **Constrained sampling**: random waypoint pairs inside a bounding box,
//!   filtered by haversine distance limits
//! - **Two transports**: OSRM HTTP API or the in-process `libosrmc` binding
//! - **Worker pool**: fixed number of OS threads, each with its own client or
//!   engine, built once under a shared lock
//! - **Reporting**: latency percentiles and route/matrix distance statistics
//!
//! ## Generating locations
//!
//! ```rust,no_run
//! use butterfly_probe::{Action, BoundingBox, GeneratorConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bbox: BoundingBox = "4.2,50.7,4.5,51.0".parse()?;
//!     let config = GeneratorConfig::new(bbox, 400.0, 4000.0);
//!
//!     let generated =
//!         butterfly_probe::generate_locations(&config, Action::Route, 100, 4, |_| {})?;
//!     let mut file = std::fs::File::create("locations.txt")?;
//!     butterfly_probe::write_locations(&generated, &mut file)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Testing a server
//!
//! ```rust,no_run
//! use std::io::BufReader;
//! use butterfly_probe::{Action, RunConfig, TransportTarget};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = RunConfig::new(
//!         Action::Route,
//!         TransportTarget::Http { host: "http://localhost:5000".to_string() },
//!     );
//!     config.report = true;
//!
//!     let file = BufReader::new(std::fs::File::open("locations.txt")?);
//!     let report = butterfly_probe::test_locations(&config, file, |_| {})?;
//!     if let Some(summary) = report.distances {
//!         println!("Average distance: {summary}");
//!     }
//!     Ok(())
//! }
//! ```

use std::io::{BufRead, Write};

// Re-export core types that users might need
pub use crate::core::config::{Action, Defaults, RunConfig, TransportTarget};
pub use crate::core::dispatch::{Backend, Probe, ProbeStatus, RequestDispatcher, WorkItem};
pub use crate::core::error::{Error, Result};
pub use crate::core::geo::{distance_meters, BoundingBox, Coordinate};
pub use crate::core::native::{EngineFactory, RouteSummary, RoutingEngine};
pub use crate::core::pool::WorkerPool;
pub use crate::core::runner::{
    generate_locations, load_work_items, run_test, GeneratedLocations, MatrixOutput, TestReport,
};
pub use crate::core::sampler::{AcceptanceRule, GeneratorConfig, LocationPair, LocationSampler};
pub use crate::core::stats::{summarize, LatencyStats, Summary};

// Internal modules
pub mod core;

/// Write generated locations in the locations file format
///
/// Routes are written one pair per line, matrices one coordinate per line.
pub fn write_locations<W: Write>(generated: &GeneratedLocations, writer: &mut W) -> Result<()> {
    match generated {
        GeneratedLocations::Routes(pairs) => core::locations::write_pairs(writer, pairs)?,
        GeneratedLocations::Matrix(coords) => core::locations::write_coordinates(writer, coords)?,
    }
    writer.flush()?;
    Ok(())
}

/// Validate `config`, resolve its transport, read the work items and run
///
/// All configuration errors surface before any worker starts.
pub fn test_locations<R, F>(config: &RunConfig, reader: R, on_probe: F) -> Result<TestReport>
where
    R: BufRead,
    F: FnMut(&Probe),
{
    config.validate()?;
    let backend = Backend::resolve(config)?;
    let items = load_work_items(config.action, reader)?;
    run_test(config, &backend, items, on_probe)
}
