//! Run configuration for butterfly-probe
//!
//! Everything here is built once from the command line, validated before any
//! worker starts, and then shared read-only with every worker.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::error::{suggest_algorithm, Error, Result, KNOWN_ALGORITHMS};

/// Built-in defaults
pub struct Defaults;

impl Defaults {
    pub const ACTIONS: &'static [&'static str] = &["route", "matrix"];
    pub const ALGORITHM: &'static str = "MLD";
    pub const LOWER_LIMIT: f64 = 400.0;
    pub const UPPER_LIMIT: f64 = 4000.0;
    pub const MAX_ATTEMPTS: u64 = 100_000;
    pub const TIMEOUT_SECS: u64 = 30;
    pub const HOST: &'static str = "http://localhost:5000";

    /// All available (virtual) cores minus one, at least one
    pub fn workers() -> usize {
        num_cpus::get().saturating_sub(1).max(1)
    }
}

/// Request type replayed against the routing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// One origin, one destination
    #[default]
    Route,
    /// All-to-all distances between one set of locations
    Matrix,
}

impl Action {
    /// Service segment of the OSRM-style request path
    pub fn service(&self) -> &'static str {
        match self {
            Action::Route => "route",
            Action::Matrix => "sources_to_targets",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Route => write!(f, "route"),
            Action::Matrix => write!(f, "matrix"),
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "route" => Ok(Action::Route),
            "matrix" => Ok(Action::Matrix),
            other => Err(Error::InvalidInput(format!(
                "action must be one of {:?}, got '{other}'",
                Defaults::ACTIONS
            ))),
        }
    }
}

/// Where requests go
#[derive(Debug, Clone, PartialEq)]
pub enum TransportTarget {
    /// OSRM-compatible HTTP server, e.g. `http://localhost:5000`
    Http { host: String },
    /// Prepared `.osrm` dataset opened through the native binding
    Native { resource: PathBuf },
}

/// Immutable configuration of one test run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub action: Action,
    pub target: TransportTarget,
    /// Routing algorithm for the native binding (`CH`, `CoreCH`, `MLD`)
    pub algorithm: String,
    /// Parse response bodies and collect distances
    pub report: bool,
    /// Drop the zero self-distances from matrix averages
    pub exclude_diagonal: bool,
    pub workers: usize,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl RunConfig {
    pub fn new(action: Action, target: TransportTarget) -> Self {
        Self {
            action,
            target,
            algorithm: Defaults::ALGORITHM.to_string(),
            report: false,
            exclude_diagonal: false,
            workers: Defaults::workers(),
            timeout: Duration::from_secs(Defaults::TIMEOUT_SECS),
        }
    }

    /// Startup checks; any error here is a configuration error
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidInput(
                "worker count must be at least 1".to_string(),
            ));
        }

        match &self.target {
            TransportTarget::Http { host } => {
                let url = reqwest::Url::parse(host)
                    .map_err(|e| Error::InvalidInput(format!("host '{host}' is not a URL: {e}")))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(Error::InvalidInput(format!(
                        "host '{host}' must use http or https"
                    )));
                }
            }
            TransportTarget::Native { resource } => {
                if self.action == Action::Matrix {
                    return Err(Error::UnsupportedOperation(
                        "the matrix action is only available over HTTP".to_string(),
                    ));
                }
                if !resource.exists() {
                    return Err(Error::InvalidInput(format!(
                        "OSRM file '{}' does not exist",
                        resource.display()
                    )));
                }
                self.validate_algorithm()?;
            }
        }

        Ok(())
    }

    fn validate_algorithm(&self) -> Result<()> {
        if KNOWN_ALGORITHMS
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&self.algorithm))
        {
            return Ok(());
        }

        let mut msg = format!(
            "unknown algorithm '{}' (expected one of {:?})",
            self.algorithm, KNOWN_ALGORITHMS
        );
        if let Some(suggestion) = suggest_algorithm(&self.algorithm) {
            msg.push_str(&format!(". Did you mean '{suggestion}'?"));
        }
        Err(Error::InvalidInput(msg))
    }

    /// Host without trailing slashes, when the HTTP transport is selected
    pub fn host(&self) -> Option<&str> {
        match &self.target {
            TransportTarget::Http { host } => Some(host.trim_end_matches('/')),
            TransportTarget::Native { .. } => None,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(
            Action::default(),
            TransportTarget::Http {
                host: Defaults::HOST.to_string(),
            },
        )
    }
}
