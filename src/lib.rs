//*****************
//External crates
//*****************
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate slog;

//*****************
//Modules declaration
//*****************
pub mod logging;
pub mod medium;
pub mod mobility;
pub mod node;
pub mod scenario;
pub mod tests;

//*****************
//Errors
//*****************
use std::error::Error;
use std::fmt;

/// Error struct for this crate
#[derive(Debug)]
pub struct SwarmSimError {
    pub cause: Option<Box<dyn Error>>,
    pub kind: SwarmSimErrorKind,
}

/// Types of errors produced in this crate
#[derive(Debug)]
pub enum SwarmSimErrorKind {
    /// Failures related to [de]serializing data
    Serialization(String),
    /// Failures in configuration of the system
    Configuration(String),
    /// Errors from the Node component
    Node(String),
    /// Errors from the broadcast medium
    Medium(String),
    /// No route is known for the requested destination
    NoRoute(String),
    /// The target has already been shut down
    Shutdown(String),
    /// Errors from loading or running a scenario
    Scenario(String),
}

impl Error for SwarmSimError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self.cause {
            Some(ref cause) => Some(&**cause),
            None => None,
        }
    }
}

impl fmt::Display for SwarmSimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for SwarmSimErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SwarmSimErrorKind::Serialization(msg) => write!(f, "{}", msg),
            SwarmSimErrorKind::Configuration(msg) => write!(f, "{}", msg),
            SwarmSimErrorKind::Node(msg) => write!(f, "{}", msg),
            SwarmSimErrorKind::Medium(msg) => write!(f, "{}", msg),
            SwarmSimErrorKind::NoRoute(msg) => write!(f, "{}", msg),
            SwarmSimErrorKind::Shutdown(msg) => write!(f, "{}", msg),
            SwarmSimErrorKind::Scenario(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<SwarmSimErrorKind> for SwarmSimError {
    fn from(kind: SwarmSimErrorKind) -> SwarmSimError {
        SwarmSimError { cause: None, kind }
    }
}
