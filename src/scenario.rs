//! A scenario wires a set of nodes to a simulated medium, moves them around, and shuts them
//! down after the configured duration.
use crate::logging::log_node_state;
use crate::medium::{Medium, MediumConfig, SimulatedMedium};
use crate::mobility::{update_location, Bounds, DEFAULT_MOBILITY_PERIOD};
use crate::node::node_config::{AodvConfig, NodeConfig};
use crate::node::{Node, NodeHandle, NodeReport};
use crate::{SwarmSimError, SwarmSimErrorKind};

use crossbeam_channel::{self as channel, select, tick, Sender};
use slog::Logger;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn default_mobility_period() -> u64 {
    DEFAULT_MOBILITY_PERIOD
}

///Structure that holds the data of a given scenario.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ScenarioSpec {
    ///Name of the scenario. For informational purposes only.
    pub name: String,
    /// Duration of the scenario in milliseconds.
    pub duration: u64,
    /// Period of the mobility updates in milliseconds.
    #[serde(default = "default_mobility_period")]
    pub mobility_period: u64,
    /// Area the nodes move in.
    #[serde(default)]
    pub area: Bounds,
    /// Queueing behaviour of the medium.
    #[serde(default)]
    pub medium: MediumConfig,
    /// Protocol parameters for the nodes that don't override them.
    #[serde(default)]
    pub default_protocol: AodvConfig,
    /// The nodes of the swarm.
    pub nodes: Vec<NodeConfig>,
}

impl ScenarioSpec {
    /// This function takes a path to a file that defines a TOML-based scenario.
    pub fn parse<P: AsRef<Path>>(file_path: P) -> Result<ScenarioSpec, SwarmSimError> {
        let mut file_content = String::new();

        let mut file = File::open(file_path).map_err(|e| {
            let err_msg = String::from("Failed to open scenario file");
            SwarmSimError {
                kind: SwarmSimErrorKind::Scenario(err_msg),
                cause: Some(Box::new(e)),
            }
        })?;

        let _bytes_read = file.read_to_string(&mut file_content).map_err(|e| {
            let err_msg = String::from("Failed to read scenario file content");
            SwarmSimError {
                kind: SwarmSimErrorKind::Scenario(err_msg),
                cause: Some(Box::new(e)),
            }
        })?;

        ScenarioSpec::from_toml(&file_content)
    }

    /// Parses a scenario from a TOML string
    pub fn from_toml(data: &str) -> Result<ScenarioSpec, SwarmSimError> {
        let spec: ScenarioSpec = toml::from_str(data).map_err(|e| {
            let err_msg = String::from("Error parsing scenario");
            SwarmSimError {
                kind: SwarmSimErrorKind::Scenario(err_msg),
                cause: Some(Box::new(e)),
            }
        })?;
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), SwarmSimError> {
        let mut ids = HashSet::new();
        for n in self.nodes.iter() {
            if !ids.insert(n.id.as_str()) {
                let err_msg = format!("Duplicate node id: {}", &n.id);
                return Err(SwarmSimErrorKind::Scenario(err_msg).into());
            }
        }
        if self.mobility_period == 0 {
            let err_msg = String::from("mobility_period must be greater than 0");
            return Err(SwarmSimErrorKind::Scenario(err_msg).into());
        }
        Ok(())
    }
}

/// A running scenario
#[derive(Debug)]
pub struct Scenario {
    name: String,
    medium: Arc<SimulatedMedium>,
    nodes: Vec<NodeHandle>,
    stop: Sender<()>,
    mobility: JoinHandle<()>,
    logger: Logger,
}

impl Scenario {
    /// Registers every node with a new medium and starts them. A node that fails to start is
    /// logged and left out; the rest of the swarm runs normally.
    pub fn start(spec: &ScenarioSpec, logger: Logger) -> Result<Scenario, SwarmSimError> {
        spec.validate()?;
        let medium = Arc::new(SimulatedMedium::new(
            spec.medium.backpressure,
            logger.new(o!("component" => "medium")),
        ));
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let mut nodes = Vec::new();
        let mut mobile = Vec::new();
        for config in spec.nodes.iter() {
            let mut config = config.clone();
            config.protocol = config.protocol.or(&spec.default_protocol);
            let queue_size = config.queue_size.unwrap_or(spec.medium.queue_size);
            let inbox = medium.register(
                &config.id,
                config.position,
                config.transmission_range,
                queue_size,
            )?;

            let id = config.id.clone();
            let (pos, vel) = (config.position, config.velocity);
            let node = Node::new(config, logger.clone());
            let m: Arc<dyn Medium> = medium.clone();
            match node.start(m, inbox, stop_rx.clone()) {
                Ok(handle) => {
                    nodes.push(handle);
                    mobile.push((id, pos, vel));
                }
                Err(e) => {
                    error!(logger, "Node failed to start"; "node" => &id, "reason" => format!("{}", e));
                    medium.deregister(&id);
                }
            }
        }

        let mobility = {
            let medium = Arc::clone(&medium);
            let logger = logger.clone();
            let bounds = spec.area;
            let ticker = tick(Duration::from_millis(spec.mobility_period));
            thread::Builder::new()
                .name(String::from("mobility"))
                .spawn(move || {
                    let mut last = Instant::now();
                    loop {
                        select! {
                            recv(ticker) -> _ => {
                                let now = Instant::now();
                                let delta = now.duration_since(last).as_secs_f64();
                                last = now;
                                for (id, pos, vel) in mobile.iter_mut() {
                                    if vel.x == 0.0 && vel.y == 0.0 {
                                        continue;
                                    }
                                    update_location(pos, vel, delta, &bounds);
                                    if let Err(e) = medium.update_position(id, *pos) {
                                        error!(logger, "Failed to update position"; "node" => id.as_str(), "reason" => format!("{}", e));
                                    }
                                    log_node_state(&logger, id, *pos, *vel);
                                }
                            },
                            recv(stop_rx) -> _ => break,
                        }
                    }
                })
                .map_err(|e| {
                    let err_msg = String::from("Could not spawn mobility thread");
                    SwarmSimError {
                        kind: SwarmSimErrorKind::Scenario(err_msg),
                        cause: Some(Box::new(e)),
                    }
                })?
        };

        info!(logger, "Scenario started"; "scenario" => &spec.name, "nodes" => nodes.len());

        Ok(Scenario {
            name: spec.name.clone(),
            medium,
            nodes,
            stop: stop_tx,
            mobility,
            logger,
        })
    }

    /// Runs a scenario to completion and returns the final state of every node
    pub fn run(spec: &ScenarioSpec, logger: Logger) -> Result<Vec<NodeReport>, SwarmSimError> {
        let scenario = Scenario::start(spec, logger)?;
        thread::sleep(Duration::from_millis(spec.duration));
        scenario.stop()
    }

    /// The running node with the given id
    pub fn node(&self, id: &str) -> Option<&NodeHandle> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// The medium shared by the nodes
    pub fn medium(&self) -> Arc<SimulatedMedium> {
        Arc::clone(&self.medium)
    }

    /// Signals every node to stop and joins all of their threads
    pub fn stop(self) -> Result<Vec<NodeReport>, SwarmSimError> {
        let Scenario {
            name,
            medium,
            nodes,
            stop,
            mobility,
            logger,
        } = self;

        drop(stop);
        mobility.join().map_err(|_| {
            let err_msg = String::from("The mobility thread panicked");
            SwarmSimError::from(SwarmSimErrorKind::Scenario(err_msg))
        })?;

        let mut reports = Vec::new();
        for handle in nodes {
            let id = handle.id().to_string();
            reports.push(handle.join()?);
            medium.deregister(&id);
        }
        reports.sort_by(|a, b| a.id.cmp(&b.id));
        info!(logger, "Scenario finished"; "scenario" => name);

        Ok(reports)
    }
}
