use crate::logging;
use crate::medium::{in_range, link_quality};
use crate::mobility::Position;
use crate::node::commands::Commands;
use crate::node::messages::Envelope;
use crate::node::node_config::AodvSettings;
use crate::node::Reactor;

use slog::Logger;
use std::collections::{HashMap, VecDeque};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Upper bound of deliveries in a single `LockstepNetwork::run`
const MAX_DELIVERIES: usize = 100_000;

/***********************************************/
/***************  Test Data Types  *************/
/***********************************************/
pub type TestResult<T = ()> = std::result::Result<T, Box<dyn std::error::Error>>;

pub struct TestSetup {
    pub test_name: String,
    pub test_file: String,
    pub work_dir: String,
    pub log_file: String,
    pub logger: Logger,
}

/*******************************************
*********** Utility functions *************
********************************************/
pub fn get_tests_root() -> String {
    env::var("SWARM_SIM_TEST_DIR").unwrap_or_else(|_| format!("{}", env::temp_dir().display()))
}

pub fn create_test_dir(test_name: &str) -> String {
    let test_dir = Path::new(&get_tests_root()).join(test_name);

    if !test_dir.exists() {
        fs::create_dir_all(&test_dir).unwrap_or_else(|_| {
            panic!(
                "Unable to create test results directory {}",
                test_dir.display()
            )
        });
    }

    format!("{}", test_dir.display())
}

pub fn get_test_specification_dir() -> PathBuf {
    env::current_dir()
        .expect("Couldn't get current dir")
        .join("tests")
        .join("integration")
        .join("specs")
}

pub fn get_test_path(test: &str) -> String {
    let file_pb = get_test_specification_dir().join(test);
    format!("{}", file_pb.display())
}

pub fn setup(base_name: &str, log_to_term: bool) -> TestSetup {
    let work_dir = create_test_dir(&format!("{}_{}", base_name, std::process::id()));
    let log_file = format!("{}{}{}.log", work_dir, std::path::MAIN_SEPARATOR, base_name);
    let logger = logging::create_logger(&log_file, log_to_term).expect("Failed to create logger");
    let test_file = get_test_path(&format!("{}.toml", base_name));

    TestSetup {
        test_name: base_name.into(),
        test_file,
        work_dir,
        log_file,
        logger,
    }
}

/// Removes the working directory of a test, unless the test asks to keep its results
pub fn teardown(data: TestSetup, remove_dir: bool) {
    let TestSetup {
        work_dir, logger, ..
    } = data;
    // Flushes the async drain before the files go away
    drop(logger);
    if remove_dir {
        let _ = fs::remove_dir_all(&work_dir);
    }
}

/*******************************************
************ Lockstep network **************
********************************************/
struct LockstepNode {
    position: Position,
    range: f64,
    reactor: Reactor,
}

/// Single-threaded network of reactors. Broadcasts go through the same range and link-quality
/// model as the simulated medium, and are processed in FIFO order until the network is quiet.
/// No timers run: HELLOs are only sent when requested.
pub struct LockstepNetwork {
    nodes: HashMap<String, LockstepNode>,
    queue: VecDeque<(String, Vec<u8>)>,
    /// Every broadcast, in order: (sender, envelope)
    pub transmissions: Vec<(String, Envelope)>,
    logger: Logger,
}

impl LockstepNetwork {
    pub fn new(logger: Logger) -> Self {
        LockstepNetwork {
            nodes: HashMap::new(),
            queue: VecDeque::new(),
            transmissions: Vec::new(),
            logger,
        }
    }

    /// `n` nodes named "1" to "n" placed on the x axis, `spacing` apart
    pub fn line(n: usize, spacing: f64, range: f64) -> Self {
        let mut net = LockstepNetwork::new(logging::create_discard_logger());
        for i in 1..=n {
            let pos = Position {
                x: (i - 1) as f64 * spacing,
                y: 0.0,
            };
            net.add_node(&i.to_string(), pos, range, AodvSettings::default());
        }
        net
    }

    pub fn add_node(&mut self, id: &str, position: Position, range: f64, settings: AodvSettings) {
        let logger = self.logger.new(o!("node" => id.to_string()));
        let reactor = Reactor::new(id.to_string(), settings, logger);
        self.nodes.insert(
            id.to_string(),
            LockstepNode {
                position,
                range,
                reactor,
            },
        );
    }

    pub fn move_node(&mut self, id: &str, position: Position) {
        self.nodes
            .get_mut(id)
            .expect("Unknown node")
            .position = position;
    }

    pub fn reactor(&self, id: &str) -> &Reactor {
        &self.nodes.get(id).expect("Unknown node").reactor
    }

    /// Issues a command to a node and broadcasts whatever it produces
    pub fn command(&mut self, id: &str, cmd: Commands) {
        let out = self
            .nodes
            .get_mut(id)
            .expect("Unknown node")
            .reactor
            .handle_command(cmd);
        for env in out {
            self.broadcast(id, env);
        }
    }

    /// Makes a node broadcast a HELLO
    pub fn hello(&mut self, id: &str) {
        let env = self.reactor(id).hello();
        self.broadcast(id, env);
    }

    /// Every node broadcasts a HELLO
    pub fn hello_all(&mut self) {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        for id in ids {
            self.hello(&id);
        }
    }

    /// Hands raw data to a node as if the medium had delivered it
    pub fn inject(&mut self, id: &str, data: Vec<u8>) {
        self.queue.push_back((id.to_string(), data));
    }

    /// Neighbours of a node under the range model
    pub fn neighbours(&self, id: &str) -> Vec<String> {
        let me = self.nodes.get(id).expect("Unknown node");
        let mut ids: Vec<String> = self
            .nodes
            .iter()
            .filter(|(k, n)| k.as_str() != id && in_range(&me.position, &n.position, me.range))
            .map(|(k, _)| k.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn broadcast(&mut self, sender: &str, env: Envelope) {
        let me = self.nodes.get(sender).expect("Unknown node");
        let (pos, range) = (me.position, me.range);
        for id in self.neighbours(sender) {
            let distance = pos.distance(&self.nodes[&id].position);
            let mut copy = env.clone();
            copy.link_quality = Some(link_quality(distance, range));
            let data = copy.to_vec().expect("Could not encode envelope");
            self.queue.push_back((id, data));
        }
        self.transmissions.push((sender.to_string(), env));
    }

    /// Delivers queued envelopes until no node has anything left to send.
    /// Returns the number of deliveries made.
    pub fn run(&mut self) -> usize {
        let mut deliveries = 0;
        while let Some((id, data)) = self.queue.pop_front() {
            deliveries += 1;
            assert!(deliveries < MAX_DELIVERIES, "Network did not quiesce");
            let out = match self.nodes.get_mut(&id) {
                Some(n) => n.reactor.handle_incoming(&data),
                None => continue,
            };
            for env in out {
                self.broadcast(&id, env);
            }
        }
        deliveries
    }

    /// Transmissions whose payload matches the predicate
    pub fn count_transmissions<F: Fn(&Envelope) -> bool>(&self, f: F) -> usize {
        self.transmissions.iter().filter(|(_, env)| f(env)).count()
    }
}
