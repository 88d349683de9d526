//! This module implements the features to give a node commands after it has started.

use crate::{SwarmSimError, SwarmSimErrorKind};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Enummeration of all the commands a node supports
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Commands {
    ///Start a route discovery for the destination specified
    Discover(String),
    ///Send a chunk of data to the destination specified
    Data(String, Vec<u8>),
    ///Send a command with its parameters to the destination specified
    Control(String, String, BTreeMap<String, String>),
}

fn command_error(err_msg: String, cause: Option<Box<dyn std::error::Error>>) -> SwarmSimError {
    SwarmSimError {
        kind: SwarmSimErrorKind::Node(err_msg),
        cause,
    }
}

impl FromStr for Commands {
    type Err = SwarmSimError;

    fn from_str(s: &str) -> Result<Commands, SwarmSimError> {
        let parts: Vec<&str> = s.split_whitespace().collect();

        if parts.is_empty() {
            return Err(command_error(String::from("Empty command"), None));
        }

        match parts[0].to_uppercase().as_str() {
            "DISCOVER" => {
                if parts.len() < 2 {
                    let err_msg = String::from("Discover needs one parameter: destination.");
                    return Err(command_error(err_msg, None));
                }
                Ok(Commands::Discover(parts[1].into()))
            }
            "DATA" => {
                if parts.len() < 3 {
                    let err_msg =
                        String::from("Data needs two parameters: destination and base64 data.");
                    return Err(command_error(err_msg, None));
                }
                let destination = parts[1].into();
                let data = base64::decode(parts[2].as_bytes()).map_err(|e| {
                    let err_msg = String::from("Failed to decode data from base64 string");
                    command_error(err_msg, Some(Box::new(e)))
                })?;
                Ok(Commands::Data(destination, data))
            }
            "CONTROL" => {
                if parts.len() < 3 {
                    let err_msg = String::from(
                        "Control needs at least two parameters: destination and command.",
                    );
                    return Err(command_error(err_msg, None));
                }
                let mut params = BTreeMap::new();
                for p in &parts[3..] {
                    let mut kv = p.splitn(2, '=');
                    match (kv.next(), kv.next()) {
                        (Some(k), Some(v)) if !k.is_empty() => {
                            params.insert(k.to_string(), v.to_string());
                        }
                        _ => {
                            let err_msg = format!("Malformed control parameter: {}", p);
                            return Err(command_error(err_msg, None));
                        }
                    }
                }
                Ok(Commands::Control(parts[1].into(), parts[2].into(), params))
            }
            _ => {
                let err_msg = format!("Unsupported node command: {:?}", parts);
                Err(command_error(err_msg, None))
            }
        }
    }
}
