//! # Butterfly-probe CLI
//!
//! Command-line interface for the butterfly-probe library.
//! Generates synthetic waypoint files and replays them against an OSRM
//! server or a local `.osrm` dataset.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use butterfly_probe::core::runner::pairs_needed;
use butterfly_probe::{
    AcceptanceRule, Action, Backend, BoundingBox, Defaults, GeneratedLocations, GeneratorConfig,
    MatrixOutput, RunConfig, TransportTarget,
};
use clap::{ArgGroup, Parser, Subcommand};
use log::{error, info, warn};

mod cli;

/// Command-line interface for butterfly-probe
#[derive(Parser, Debug)]
#[command(name = "butterfly-probe")]
#[command(about = "Load tester and waypoint generator for OSRM routing engines")]
#[command(long_about = "Generates random waypoints and replays them against a routing engine:
  butterfly-probe create-locations 1000 4.2,50.7,4.5,51.0 brussels.txt
  butterfly-probe test brussels.txt --host http://localhost:5000 --report
  butterfly-probe test brussels.txt --osrm-file belgium.osrm --algorithm CH
  butterfly-probe -a matrix create-locations 100 -- -0.2,51.4,0.1,51.6 london.txt

Verbosity:
  -v                               # Progress messages
  -vv                              # Per-request debug output (or set RUST_LOG)")]
#[command(version = env!("PROBE_VERSION"))]
struct Cli {
    /// Request type: route or matrix
    #[arg(short, long, global = true, default_value = "route")]
    action: Action,

    /// Number of worker threads
    #[arg(short, long, global = true, default_value_t = Defaults::workers())]
    cores: usize,

    /// Increase logging verbosity (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a locations file against a routing engine
    #[command(group(
        ArgGroup::new("transport")
            .required(true)
            .args(["host", "osrm_file"])
    ))]
    Test {
        /// Locations file to replay
        file: PathBuf,

        /// OSRM HTTP server, e.g. http://localhost:5000
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Prepared .osrm dataset to open through libosrmc
        #[arg(short = 'f', long)]
        osrm_file: Option<PathBuf>,

        /// Routing algorithm of the dataset (CH, CoreCH, MLD)
        #[arg(short = 'A', long, default_value = Defaults::ALGORITHM, conflicts_with = "host")]
        algorithm: String,

        /// Parse responses and report the average distance
        #[arg(short, long)]
        report: bool,

        /// Ignore self-distances when averaging matrices
        #[arg(long)]
        exclude_diagonal: bool,

        /// HTTP request timeout in seconds
        #[arg(long, default_value_t = Defaults::TIMEOUT_SECS)]
        timeout: u64,
    },

    /// Generate random locations inside a bounding box
    CreateLocations {
        /// Number of locations to generate
        locations: usize,

        /// Bounding box as min_lon,min_lat,max_lon,max_lat
        #[arg(allow_hyphen_values = true)]
        bbox: BoundingBox,

        /// Output file
        file: PathBuf,

        /// Lower distance limit in meters
        #[arg(short, long, default_value_t = Defaults::LOWER_LIMIT)]
        lower_limit: f64,

        /// Upper distance limit in meters
        #[arg(short, long, default_value_t = Defaults::UPPER_LIMIT)]
        upper_limit: f64,

        /// Keep pairs whose distance falls outside or inside the limits
        #[arg(long, default_value = "outside")]
        accept: AcceptanceRule,

        /// Seed for reproducible output
        #[arg(short, long)]
        seed: Option<u64>,

        /// Draws of the second point before giving up on a pair
        #[arg(long, default_value_t = Defaults::MAX_ATTEMPTS)]
        max_attempts: u64,

        /// Matrix only: write every generated pair instead of the first one
        #[arg(long)]
        all_pairs: bool,
    },
}

/// Log level for a `-v` count; `RUST_LOG` still takes precedence
fn log_level(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    }
}

fn init_logging(verbose: u8) {
    // Initialize logging to stderr
    env_logger::Builder::new()
        .filter_level(log_level(verbose))
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    info!("🦋 Butterfly-probe v{} starting...", env!("PROBE_VERSION"));

    match cli.command {
        Command::Test {
            file,
            host,
            osrm_file,
            algorithm,
            report,
            exclude_diagonal,
            timeout,
        } => {
            let target = match (host, osrm_file) {
                (Some(host), _) => TransportTarget::Http { host },
                (None, Some(resource)) => TransportTarget::Native { resource },
                (None, None) => anyhow::bail!("either --host or --osrm-file is required"),
            };

            let mut config = RunConfig::new(cli.action, target);
            config.algorithm = algorithm;
            config.report = report;
            config.exclude_diagonal = exclude_diagonal;
            config.workers = cli.cores;
            config.timeout = Duration::from_secs(timeout);

            test_file(&config, &file, cli.verbose > 0)
        }
        Command::CreateLocations {
            locations,
            bbox,
            file,
            lower_limit,
            upper_limit,
            accept,
            seed,
            max_attempts,
            all_pairs,
        } => {
            let mut config = GeneratorConfig::new(bbox, lower_limit, upper_limit);
            config.rule = accept;
            config.seed = seed;
            config.max_attempts = max_attempts;

            let output = if all_pairs {
                MatrixOutput::AllPairs
            } else {
                MatrixOutput::FirstPair
            };
            let options = CreateOptions {
                action: cli.action,
                locations,
                workers: cli.cores,
                output,
                verbose: cli.verbose > 0,
            };
            create_locations(&config, &options, &file)
        }
    }
}

/// Replay `file` against the configured engine and print the report
fn test_file(config: &RunConfig, file: &Path, verbose: bool) -> anyhow::Result<()> {
    config.validate()?;
    let backend = Backend::resolve(config)?;

    let reader = File::open(file)
        .with_context(|| format!("Failed to open locations file {}", file.display()))?;
    let items = butterfly_probe::load_work_items(config.action, BufReader::new(reader))?;

    let progress = cli::ProgressManager::new(
        items.len() as u64,
        &format!("🚀 Testing {} {} requests", items.len(), config.action),
        verbose,
    );
    let report = butterfly_probe::run_test(config, &backend, items, |_| progress.tick())?;
    progress.finish("✅ Test completed!");

    if config.report {
        let noun = match config.action {
            Action::Route => "routes",
            Action::Matrix => "matrices",
        };
        match &report.distances {
            Some(summary) => println!("Average distance of {} {noun}: {summary}", summary.count),
            None => println!("No successful {noun} to average"),
        }
    }

    println!("Latency: {}", report.latency);
    if report.latency.failed() > 0 || report.latency.unroutable() > 0 {
        println!(
            "Failed requests: {}, unroutable: {}",
            report.latency.failed(),
            report.latency.unroutable()
        );
    }
    println!(
        "Total time passed: {:.3} secs ({:.1} requests/sec)",
        report.elapsed.as_secs_f64(),
        report.requests_per_second()
    );

    Ok(())
}

/// How `create-locations` runs, apart from the generator itself
struct CreateOptions {
    action: Action,
    locations: usize,
    workers: usize,
    output: MatrixOutput,
    verbose: bool,
}

/// Generate locations, write them to `file` and print their distance summary
fn create_locations(
    config: &GeneratorConfig,
    options: &CreateOptions,
    file: &Path,
) -> anyhow::Result<()> {
    config.validate()?;

    let CreateOptions {
        action,
        locations,
        workers,
        output: matrix_output,
        verbose,
    } = *options;

    if action == Action::Matrix && locations % 2 != 0 {
        warn!(
            "Matrix locations are generated in pairs, generating {} pairs",
            locations / 2
        );
    }

    // Open before generating so an unwritable path fails fast
    let output = File::create(file)
        .with_context(|| format!("Failed to create output file {}", file.display()))?;

    let total = pairs_needed(action, locations) as u64;
    let progress = cli::ProgressManager::new(
        total,
        &format!("🎲 Generating {locations} locations in {}", config.bbox),
        verbose,
    );
    let generated = butterfly_probe::generate_locations(config, action, locations, workers, |_| {
        progress.tick()
    })?;
    progress.finish("✅ Locations generated!");

    if action == Action::Matrix && matrix_output == MatrixOutput::FirstPair && generated.len() > 2 {
        info!(
            "Writing the first of {} matrix pairs (use --all-pairs for all)",
            generated.len() / 2
        );
    }
    let generated = generated.select(matrix_output);

    let mut writer = BufWriter::new(output);
    butterfly_probe::write_locations(&generated, &mut writer)?;
    info!("📁 Saved {} entries to {}", generated.len(), file.display());

    if let GeneratedLocations::Routes(pairs) = &generated {
        let summary = butterfly_probe::summarize(pairs.iter().map(|p| Some(p.distance())));
        if let Some(summary) = summary {
            println!("Average distance of {} routes: {summary}", summary.count);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(log_level(0), log::LevelFilter::Error);
        assert_eq!(log_level(1), log::LevelFilter::Info);
        assert_eq!(log_level(2), log::LevelFilter::Debug);
        assert_eq!(log_level(5), log::LevelFilter::Debug);
    }

    #[test]
    fn test_parse_create_locations_with_negative_bbox() {
        let cli = Cli::try_parse_from([
            "butterfly-probe",
            "create-locations",
            "10",
            "-1.5,-1,1,1",
            "out.txt",
            "--seed",
            "7",
        ])
        .unwrap();

        assert_eq!(cli.action, Action::Route);
        match cli.command {
            Command::CreateLocations {
                locations,
                bbox,
                seed,
                lower_limit,
                accept,
                all_pairs,
                ..
            } => {
                assert!(!all_pairs);
                assert_eq!(locations, 10);
                assert_eq!(bbox, BoundingBox::new(-1.5, -1.0, 1.0, 1.0));
                assert_eq!(seed, Some(7));
                assert_eq!(lower_limit, Defaults::LOWER_LIMIT);
                assert_eq!(accept, AcceptanceRule::Outside);
            }
            other => panic!("Expected create-locations, got {other:?}"),
        }
    }

    #[test]
    fn test_global_action_after_subcommand() {
        let cli = Cli::try_parse_from([
            "butterfly-probe",
            "test",
            "locations.txt",
            "--host",
            "http://localhost:5000",
            "--action",
            "matrix",
        ])
        .unwrap();
        assert_eq!(cli.action, Action::Matrix);
    }

    #[test]
    fn test_transport_is_required() {
        let result = Cli::try_parse_from(["butterfly-probe", "test", "locations.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_transports_are_exclusive() {
        let result = Cli::try_parse_from([
            "butterfly-probe",
            "test",
            "locations.txt",
            "--host",
            "http://localhost:5000",
            "--osrm-file",
            "map.osrm",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_algorithm_conflicts_with_host() {
        let result = Cli::try_parse_from([
            "butterfly-probe",
            "test",
            "locations.txt",
            "--host",
            "http://localhost:5000",
            "--algorithm",
            "CH",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_native_with_algorithm() {
        let cli = Cli::try_parse_from([
            "butterfly-probe",
            "test",
            "locations.txt",
            "-f",
            "map.osrm",
            "-A",
            "CH",
            "-r",
        ])
        .unwrap();

        match cli.command {
            Command::Test {
                osrm_file,
                algorithm,
                report,
                host,
                ..
            } => {
                assert_eq!(osrm_file, Some(PathBuf::from("map.osrm")));
                assert_eq!(algorithm, "CH");
                assert!(report);
                assert!(host.is_none());
            }
            other => panic!("Expected test, got {other:?}"),
        }
    }
}
