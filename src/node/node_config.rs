//! This module defines the NodeConfig struct and related functions. It allows a scenario file to
//! be deserialized into the configuration objects that eventually create the nodes.
use crate::mobility::{Position, Velocity};
use crate::{SwarmSimError, SwarmSimErrorKind};
use std::convert::TryFrom;
use std::fs::File;
use std::io::Write;
use std::path::Path;

// **************************************************
// ************ Configuration parameters ************
// **************************************************
/// Window during which discovery and payload identifiers are remembered, in milliseconds
pub const PATH_DISCOVERY_TIME: u64 = 30_000;
/// Lifetime of routes installed by route discovery, in milliseconds
pub const ROUTE_LIFETIME: u64 = 30_000;
/// Period of the neighbour-presence broadcast, in milliseconds
pub const HELLO_INTERVAL: u64 = 1_000;
/// HELLOs a neighbour may miss before its route expires
pub const ALLOWED_HELLO_LOSS: u32 = 2;
/// Period of the route expiration sweep, in milliseconds
pub const MAINTENANCE_INTERVAL: u64 = 1_000;
/// Initial TTL of route requests and replies
pub const NET_DIAMETER: u32 = 35;

/// Protocol parameters as written in a configuration file. Missing values take the defaults.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct AodvConfig {
    pub path_discovery_time: Option<u64>,
    pub route_lifetime: Option<u64>,
    pub hello_interval: Option<u64>,
    pub allowed_hello_loss: Option<u32>,
    pub maintenance_interval: Option<u64>,
    pub net_diameter: Option<u32>,
}

impl AodvConfig {
    /// Values set in `self` win, the rest are taken from `fallback`.
    pub fn or(&self, fallback: &AodvConfig) -> AodvConfig {
        AodvConfig {
            path_discovery_time: self.path_discovery_time.or(fallback.path_discovery_time),
            route_lifetime: self.route_lifetime.or(fallback.route_lifetime),
            hello_interval: self.hello_interval.or(fallback.hello_interval),
            allowed_hello_loss: self.allowed_hello_loss.or(fallback.allowed_hello_loss),
            maintenance_interval: self.maintenance_interval.or(fallback.maintenance_interval),
            net_diameter: self.net_diameter.or(fallback.net_diameter),
        }
    }

    /// Fills the unset values with the defaults
    pub fn resolve(&self) -> AodvSettings {
        AodvSettings {
            path_discovery_time: self.path_discovery_time.unwrap_or(PATH_DISCOVERY_TIME),
            route_lifetime: self.route_lifetime.unwrap_or(ROUTE_LIFETIME),
            hello_interval: self.hello_interval.unwrap_or(HELLO_INTERVAL),
            allowed_hello_loss: self.allowed_hello_loss.unwrap_or(ALLOWED_HELLO_LOSS),
            maintenance_interval: self.maintenance_interval.unwrap_or(MAINTENANCE_INTERVAL),
            net_diameter: self.net_diameter.unwrap_or(NET_DIAMETER),
        }
    }
}

/// Protocol parameters in effect for a node
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct AodvSettings {
    pub path_discovery_time: u64,
    pub route_lifetime: u64,
    pub hello_interval: u64,
    pub allowed_hello_loss: u32,
    pub maintenance_interval: u64,
    pub net_diameter: u32,
}

impl AodvSettings {
    /// Lifetime advertised in HELLO messages, in milliseconds
    pub fn hello_lifetime(&self) -> u32 {
        u32::try_from(self.hello_interval)
            .unwrap_or(u32::MAX)
            .saturating_mul(self.allowed_hello_loss)
    }
}

impl Default for AodvSettings {
    fn default() -> Self {
        AodvConfig::default().resolve()
    }
}

/// A command the node issues to itself `delay` milliseconds after starting.
/// Used to bootstrap traffic in test scenarios.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SeededCommand {
    pub delay: u64,
    pub command: String,
}

/// Configuration for a node object. This struct is the external interface of the node module:
/// scenario files and the CLI produce NodeConfig objects, and the node module builds the node.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct NodeConfig {
    ///Unique identifier of the node in the swarm.
    pub id: String,
    ///Transmission range, in the same units as the positions.
    pub transmission_range: f64,
    ///Bound of the inbound queue. The medium default is used when absent.
    pub queue_size: Option<usize>,
    ///NOTE: Due to the way serde_toml works, the fields serialized as tables must be kept last.
    ///Initial position.
    pub position: Position,
    ///Initial velocity, in units per second.
    #[serde(default)]
    pub velocity: Velocity,
    ///Protocol parameter overrides.
    #[serde(default)]
    pub protocol: AodvConfig,
    ///Commands to issue after start.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traffic: Vec<SeededCommand>,
}

impl NodeConfig {
    ///Creates a new configuration for a static node with default protocol settings.
    pub fn new(id: &str, position: Position, transmission_range: f64) -> NodeConfig {
        NodeConfig {
            id: id.to_string(),
            transmission_range,
            queue_size: None,
            position,
            velocity: Velocity::default(),
            protocol: AodvConfig::default(),
            traffic: vec![],
        }
    }

    ///Writes the current configuration object to a formatted configuration file.
    pub fn write_to_file<P: AsRef<Path>>(&self, file_path: P) -> Result<(), SwarmSimError> {
        let data = toml::to_string(self).map_err(|e| {
            let err_msg = String::from("Error serializing node configuration");
            SwarmSimError {
                kind: SwarmSimErrorKind::Serialization(err_msg),
                cause: Some(Box::new(e)),
            }
        })?;

        let mut file = File::create(&file_path).map_err(|e| {
            let err_msg = String::from("Could not create configuration file");
            SwarmSimError {
                kind: SwarmSimErrorKind::Configuration(err_msg),
                cause: Some(Box::new(e)),
            }
        })?;
        write!(file, "{}", data).map_err(|e| {
            let err_msg = String::from("Error writing configuration to file");
            SwarmSimError {
                kind: SwarmSimErrorKind::Configuration(err_msg),
                cause: Some(Box::new(e)),
            }
        })?;

        Ok(())
    }

    ///Loads a node configuration from a file.
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<NodeConfig, SwarmSimError> {
        let data = std::fs::read_to_string(&file_path).map_err(|e| {
            let err_msg = String::from("Could not read configuration file");
            SwarmSimError {
                kind: SwarmSimErrorKind::Configuration(err_msg),
                cause: Some(Box::new(e)),
            }
        })?;
        toml::from_str(&data).map_err(|e| {
            let err_msg = String::from("Could not parse node configuration");
            SwarmSimError {
                kind: SwarmSimErrorKind::Serialization(err_msg),
                cause: Some(Box::new(e)),
            }
        })
    }
}
