#[macro_use]
extern crate slog;
extern crate swarm_simulator;

use clap::{App, Arg, ArgMatches};
use swarm_simulator::logging;
use swarm_simulator::node::NodeReport;
use swarm_simulator::scenario::{Scenario, ScenarioSpec};
use swarm_simulator::{SwarmSimError, SwarmSimErrorKind};
use std::fs;
use std::path::{Path, PathBuf};

const ARG_SCENARIO: &str = "scenario";
const ARG_WORK_DIR: &str = "work_dir";
const ARG_DURATION: &str = "duration";
const ARG_TERMINAL_LOG: &str = "term_log";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const ERROR_EXECUTION_FAILURE: i32 = 1;
const ERROR_INITIALIZATION: i32 = 2;

struct CliConfig {
    spec: ScenarioSpec,
    work_dir: PathBuf,
    term_log: bool,
}

fn run(config: CliConfig) -> Result<Vec<NodeReport>, SwarmSimError> {
    let log_file_name = config
        .work_dir
        .join(logging::LOG_DIR_NAME)
        .join(logging::DEFAULT_SCENARIO_LOG);
    let logger = logging::create_logger(&log_file_name, config.term_log).unwrap_or_else(|e| {
        println!("swarm_cli failed with the following error: {}", e);
        ::std::process::exit(ERROR_INITIALIZATION);
    });

    info!(logger, "Scenario: {:?}", &config.spec);
    let reports = Scenario::run(&config.spec, logger.clone())?;
    for r in reports.iter() {
        info!(
            logger,
            "Node report";
            "node" => &r.id,
            "routes" => r.routes.len(),
            "delivered_data" => r.delivered_data.len(),
            "delivered_commands" => r.delivered_commands.len(),
            "pending" => r.pending,
        );
    }

    Ok(reports)
}

fn get_cli_parameters<'a>() -> ArgMatches<'a> {
    App::new("Swarm_cli").version(VERSION)
                         .about("CLI interface to run drone swarm scenarios")
                         .arg(Arg::with_name(ARG_SCENARIO)
                               .short("s")
                               .long("scenario")
                               .value_name("FILE")
                               .help("Scenario file to run.")
                               .required(true)
                               .takes_value(true))
                         .arg(Arg::with_name(ARG_WORK_DIR)
                               .short("d")
                               .long("work_dir")
                               .value_name("DIR")
                               .help("Operating directory for the program, where results and logs will be placed.")
                               .takes_value(true))
                         .arg(Arg::with_name(ARG_DURATION)
                               .short("t")
                               .long("duration")
                               .value_name("MILLISECONDS")
                               .help("Overrides the duration set in the scenario file.")
                               .takes_value(true))
                         .arg(Arg::with_name(ARG_TERMINAL_LOG)
                               .short("l")
                               .long("log_to_terminal")
                               .value_name("true/false")
                               .help("Should the scenario log operations to the terminal as well")
                               .takes_value(true))
                         .get_matches()
}

/// The init process performs all initialization required for the swarm_cli.
/// It performs 2 main tasks: read the scenario file and process the command line parameters.
fn init(matches: &ArgMatches) -> Result<CliConfig, SwarmSimError> {
    let scenario_file = matches.value_of(ARG_SCENARIO).unwrap_or_default();
    let mut spec = ScenarioSpec::parse(scenario_file)?;

    if let Some(d) = matches.value_of(ARG_DURATION) {
        spec.duration = d.parse::<u64>().map_err(|e| {
            let err_msg = String::from("duration must be a positive integer");
            SwarmSimError {
                kind: SwarmSimErrorKind::Configuration(err_msg),
                cause: Some(Box::new(e)),
            }
        })?;
    }

    //work_dir
    let work_dir = PathBuf::from(matches.value_of(ARG_WORK_DIR).unwrap_or("."));
    fs::create_dir_all(&work_dir).map_err(|e| {
        let err_msg = String::from("work_dir is not a valid directory or it's not writable");
        SwarmSimError {
            kind: SwarmSimErrorKind::Configuration(err_msg),
            cause: Some(Box::new(e)),
        }
    })?;
    check_work_dir(&work_dir)?;

    // Log to terminal
    let term_log = matches
        .value_of(ARG_TERMINAL_LOG)
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    Ok(CliConfig {
        spec,
        work_dir,
        term_log,
    })
}

fn check_work_dir(dir: &Path) -> Result<(), SwarmSimError> {
    let info = fs::metadata(dir).map_err(|e| {
        let err_msg = String::from("work_dir is not a valid directory or it's not writable");
        SwarmSimError {
            kind: SwarmSimErrorKind::Configuration(err_msg),
            cause: Some(Box::new(e)),
        }
    })?;
    if !info.is_dir() || info.permissions().readonly() {
        let err_msg = String::from("work_dir is not a valid directory or it's not writable");
        return Err(SwarmSimErrorKind::Configuration(err_msg).into());
    }
    Ok(())
}

fn main() {
    //Enable the a more readable version of backtraces
    color_backtrace::install();

    //Get the CLI parameters
    let matches = get_cli_parameters();

    //Initialization
    let config = init(&matches).unwrap_or_else(|e| {
        println!("swarm_cli failed with the following error: {}", e);
        std::process::exit(ERROR_INITIALIZATION);
    });

    match run(config) {
        Ok(reports) => {
            for r in reports {
                println!(
                    "node {}: {} routes, {} data delivered, {} commands delivered, {} pending",
                    r.id,
                    r.routes.len(),
                    r.delivered_data.len(),
                    r.delivered_commands.len(),
                    r.pending
                );
            }
        }
        Err(e) => {
            eprintln!("swarm_cli failed with the following error: {}", e);
            std::process::exit(ERROR_EXECUTION_FAILURE);
        }
    }
}
