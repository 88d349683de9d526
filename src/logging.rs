//! Module related to handling and processing the logs produced by the scenario and its nodes.

// Lint options for this module
#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

use crate::mobility::{Position, Velocity};
use crate::{SwarmSimError, SwarmSimErrorKind};
use slog::{Drain, Logger};
use std::fs::{File, OpenOptions};
use std::io;
use std::io::BufRead;
use std::path::Path;

/// Directory name for where the logs will be placed.
pub const LOG_DIR_NAME: &str = "log";
/// Default log file name for a scenario run
pub const DEFAULT_SCENARIO_LOG: &str = "swarm.log";
const LOG_CHANNEL_SIZE: usize = 2048; //Default is 128
const LOG_THREAD_NAME: &str = "LoggerThread";

/// Struct that encapsulates a log entry
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    /// Main log message
    pub msg: String,
    /// Logging level
    pub level: String,
    /// Timestamp of the event
    pub ts: String,
    /// Node that produced the record
    pub node: Option<String>,
    /// Packet status
    pub status: Option<String>,
    /// Reason for status
    pub reason: Option<String>,
    /// Type of message
    pub msg_type: Option<String>,
    /// Node that transmitted the message
    pub source: Option<String>,
    /// Number of peers when transmitting
    pub peers_in_range: Option<usize>,
    /// Wire code of a route discovery message
    pub aodv_type: Option<u8>,
}

/// Logs the kinematic state of a node at some point in the simulation
pub fn log_node_state(logger: &Logger, id: &str, pos: Position, vel: Velocity) {
    info!(
        logger,
        "Node-state update";
        "vel"=>vel,
        "pos"=>pos,
        "id"=>id,
    );
}

///Loads a log file and produces an array of log records for processing.
pub fn get_log_records_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<LogEntry>, io::Error> {
    let file = File::open(path)?;
    let mut records = Vec::new();
    let reader = io::BufReader::new(file);

    for line in reader.lines() {
        let data = line?;
        let u: LogEntry = serde_json::from_str(&data)?;
        records.push(u);
    }

    Ok(records)
}

///Returns the first log record whose message matches the one passed.
pub fn find_record_by_msg<'a>(msg: &str, records: &'a [LogEntry]) -> Option<&'a LogEntry> {
    records.iter().find(|rec| rec.msg == msg)
}

/// Create a duplicate logger for the terminal and the file passed as parameter.
pub fn create_logger<P: AsRef<Path>>(log_file_name: P, log_term: bool) -> Result<Logger, SwarmSimError> {
    //Make sure the full path is valid
    if let Some(parent) = log_file_name.as_ref().parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            let err_msg = String::from("Could not create log directory structure");
            SwarmSimError {
                kind: SwarmSimErrorKind::Configuration(err_msg),
                cause: Some(Box::new(e)),
            }
        })?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_file_name)
        .map_err(|e| {
            let err_msg = String::from("Could not open log file");
            SwarmSimError {
                kind: SwarmSimErrorKind::Configuration(err_msg),
                cause: Some(Box::new(e)),
            }
        })?;

    if log_term {
        Ok(create_term_and_file_logger(log_file))
    } else {
        Ok(create_file_logger(log_file))
    }
}

fn file_drain(log_file: File) -> slog::Fuse<slog_async::Async> {
    let d = slog_json::Json::new(log_file)
        .add_default_keys()
        .build()
        .fuse();
    // The file log is read back for analysis, so it blocks rather than dropping records.
    slog_async::Async::new(d)
        .chan_size(LOG_CHANNEL_SIZE)
        .overflow_strategy(slog_async::OverflowStrategy::Block)
        .thread_name(format!("File{}", LOG_THREAD_NAME))
        .build()
        .fuse()
}

fn create_file_logger(log_file: File) -> Logger {
    Logger::root(file_drain(log_file), o!())
}

fn create_term_and_file_logger(log_file: File) -> Logger {
    //Create the terminal drain
    let decorator = slog_term::TermDecorator::new().build();
    let d1 = slog_term::CompactFormat::new(decorator).build().fuse();
    let d1 = slog_async::Async::new(d1)
        .chan_size(LOG_CHANNEL_SIZE)
        .overflow_strategy(slog_async::OverflowStrategy::Drop)
        .thread_name(format!("Term{}", LOG_THREAD_NAME))
        .build()
        .fuse();

    //Fuse the drains and create the logger
    Logger::root(slog::Duplicate::new(d1, file_drain(log_file)).fuse(), o!())
}

/// Creates a logger that discards all records. Used for tests that don't need logs.
pub fn create_discard_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}
