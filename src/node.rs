//! Swarm simulator Node module
//! This module defines the Node struct, which represents one of the drones in the swarm.
//! A node has the following responsibilities:
//!   1. Receive envelopes from the medium and dispatch them by payload type.
//!   2. Run route discovery and keep its routing table fresh.
//!   3. Relay data and control payloads along the discovered routes.
//!   4. Broadcast its presence to its neighbours periodically.
//!
//! The protocol state of a node lives in a `Reactor`, which is owned by a single dispatch
//! thread. Only the routing table is shared, with the expiration sweep.

// Lint options for this module
#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

use crate::medium::{log_tx, Medium};
use crate::{SwarmSimError, SwarmSimErrorKind};

use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{self as channel, after, never, select, tick, Receiver, Sender};
use slog::{Key, Logger, Record, Serializer, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

pub mod cache;
pub mod commands;
pub mod control;
pub mod forwarding;
pub mod messages;
pub mod node_config;
pub mod routing;
pub mod transport;

use self::commands::Commands;
use self::control::ControlLayer;
use self::forwarding::{LayerOutcome, RoutedPayload};
use self::messages::*;
use self::node_config::{AodvSettings, NodeConfig};
use self::routing::{RouteTableEntry, RoutingEngine, RoutingTable};
use self::transport::TransportLayer;

/// Payloads a node holds per destination while discovering a route
pub const MAX_PENDING_PER_DESTINATION: usize = 64;

/// Enum that represents the possible status of a Message as it moves through the network
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageStatus {
    /// The message has reached its destination.
    ACCEPTED,
    /// The message has been dropped. The *reason* field should provide more data.
    DROPPED,
    /// The message has reached an intermediate node and will be forwarded.
    FORWARDING,
    /// A new message has been transmitted
    SENT,
    /// The message has been queued. This usually indicates a pending route operation.
    QUEUED,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MessageStatus::ACCEPTED => write!(f, "ACCEPTED"),
            MessageStatus::DROPPED => write!(f, "DROPPED"),
            MessageStatus::FORWARDING => write!(f, "FORWARDING"),
            MessageStatus::SENT => write!(f, "SENT"),
            MessageStatus::QUEUED => write!(f, "QUEUED"),
        }
    }
}

impl Value for MessageStatus {
    fn serialize(&self, _rec: &Record, key: Key, serializer: &mut dyn Serializer) -> slog::Result {
        serializer.emit_str(key, &self.to_string())
    }
}

/// Lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeStatus {
    /// Constructed, not started
    Idle,
    /// Threads are running
    Running,
    /// All threads have been joined
    Stopped,
}

/// Final state of a node, produced when it is joined
#[derive(Debug, Clone)]
pub struct NodeReport {
    /// Node id
    pub id: String,
    /// Lifecycle status
    pub status: NodeStatus,
    /// Routing table at shutdown
    pub routes: Vec<RouteTableEntry>,
    /// Route-request keys remembered at shutdown
    pub rreq_cache: Vec<(String, u32)>,
    /// Data checksums remembered at shutdown
    pub data_cache: Vec<String>,
    /// Control checksums remembered at shutdown
    pub control_cache: Vec<String>,
    /// Data payloads addressed to this node
    pub delivered_data: Vec<DataMessage>,
    /// Commands addressed to this node
    pub delivered_commands: Vec<ControlMessage>,
    /// Payloads still waiting for a route
    pub pending: usize,
}

/// The protocol core of a node. Synchronous: every input produces the envelopes to broadcast.
#[derive(Debug)]
pub struct Reactor {
    me: String,
    settings: AodvSettings,
    routing: RoutingEngine,
    transport: TransportLayer,
    control: ControlLayer,
    pending: HashMap<String, Vec<(DateTime<Utc>, Envelope)>>,
    last_maintenance: DateTime<Utc>,
    logger: Logger,
}

impl Reactor {
    /// Creates the protocol state of node `me` with empty tables and caches
    pub fn new(me: String, settings: AodvSettings, logger: Logger) -> Self {
        Reactor {
            routing: RoutingEngine::new(me.clone(), settings, logger.clone()),
            transport: TransportLayer::new(
                me.clone(),
                settings.path_discovery_time,
                logger.clone(),
            ),
            control: ControlLayer::new(me.clone(), settings.path_discovery_time, logger.clone()),
            me,
            settings,
            pending: HashMap::new(),
            last_maintenance: Utc::now(),
            logger,
        }
    }

    /// Id of this node
    pub fn id(&self) -> &str {
        &self.me
    }

    /// The routing engine of this node
    pub fn routing(&self) -> &RoutingEngine {
        &self.routing
    }

    /// The data layer of this node
    pub fn transport(&self) -> &TransportLayer {
        &self.transport
    }

    /// The control layer of this node
    pub fn control(&self) -> &ControlLayer {
        &self.control
    }

    /// Payloads waiting for a route to `destination`
    pub fn pending_for(&self, destination: &str) -> usize {
        self.pending.get(destination).map_or(0, |q| q.len())
    }

    /// The next neighbour-presence broadcast
    pub fn hello(&self) -> Envelope {
        self.routing.hello_beacon().next_envelope()
    }

    /// Decodes and dispatches raw data received from the medium.
    /// Undecodable data is logged and dropped.
    pub fn handle_incoming(&mut self, data: &[u8]) -> Vec<Envelope> {
        match Envelope::from_slice(data) {
            Ok(env) => self.dispatch(env),
            Err(e) => {
                error!(
                    self.logger,
                    "Failed to decode envelope";
                    "reason" => format!("{}", e),
                    "size" => data.len(),
                    "status" => MessageStatus::DROPPED,
                );
                vec![]
            }
        }
    }

    /// Routes an envelope to the handler of its payload type
    pub fn dispatch(&mut self, env: Envelope) -> Vec<Envelope> {
        let mut out = Vec::new();
        match env.payload {
            Payload::AODV(AodvMessage::RREQ(ref msg)) => {
                out.extend(self.routing.handle_route_request(&env, msg));
                out.extend(self.flush_pending());
            }
            Payload::AODV(AodvMessage::RREP(ref msg)) => {
                out.extend(self.routing.handle_route_reply(&env, msg));
                out.extend(self.flush_pending());
            }
            Payload::DATA(ref msg) => {
                out.extend(
                    self.transport
                        .handle_message(&env, msg, &mut self.routing)
                        .outbound(),
                );
            }
            Payload::CONTROL(ref msg) => {
                out.extend(
                    self.control
                        .handle_message(&env, msg, &mut self.routing)
                        .outbound(),
                );
            }
        }
        out
    }

    /// Executes a command issued to this node
    pub fn handle_command(&mut self, cmd: Commands) -> Vec<Envelope> {
        let destination = match cmd {
            Commands::Discover(ref d) | Commands::Data(ref d, _) | Commands::Control(ref d, _, _) => {
                d.clone()
            }
        };
        if destination == self.me {
            warn!(self.logger, "Ignoring command addressed to self"; "command" => format!("{:?}", &cmd));
            return vec![];
        }

        match cmd {
            Commands::Discover(dest) => {
                let unknown_seq_no = self.routing.table().get(&dest).is_none();
                let rreq = self
                    .routing
                    .originate_route_request(&dest, &self.me, unknown_seq_no);
                vec![rreq]
            }
            Commands::Data(dest, data) => {
                let msg = DataMessage::new(self.me.clone(), dest, data);
                let outcome = self.transport.originate(&msg, &mut self.routing);
                self.after_origination(outcome, msg)
            }
            Commands::Control(dest, command, params) => {
                let msg = ControlMessage::new(self.me.clone(), dest, command, params);
                let outcome = self.control.originate(&msg, &mut self.routing);
                self.after_origination(outcome, msg)
            }
        }
    }

    fn after_origination<T: RoutedPayload>(&mut self, outcome: LayerOutcome, msg: T) -> Vec<Envelope> {
        match outcome {
            LayerOutcome::Forward(env) => vec![env],
            LayerOutcome::Discover(rreq) => {
                let dest = msg.recipient().to_string();
                let env = Envelope::new(self.me.clone(), msg.into_payload());
                info!(
                    self.logger,
                    "Message queued";
                    &env.payload,
                    "reason" => "No route",
                    "status" => MessageStatus::QUEUED,
                );
                let queue = self.pending.entry(dest).or_insert_with(Vec::new);
                if queue.len() >= MAX_PENDING_PER_DESTINATION {
                    let (_, dropped) = queue.remove(0);
                    info!(
                        self.logger,
                        "Message dropped";
                        &dropped.payload,
                        "reason" => "Pending queue full",
                        "status" => MessageStatus::DROPPED,
                    );
                }
                queue.push((Utc::now(), env));
                vec![rreq]
            }
            LayerOutcome::Delivered | LayerOutcome::Dropped(_) => vec![],
        }
    }

    /// Releases the payloads whose destination has become reachable
    fn flush_pending(&mut self) -> Vec<Envelope> {
        let ready: Vec<String> = self
            .pending
            .keys()
            .filter(|d| self.routing.check_for_route(d))
            .cloned()
            .collect();

        let mut out = Vec::new();
        for dest in ready {
            if let Some(queue) = self.pending.remove(&dest) {
                info!(self.logger, "Route to {} established; sending {} queued messages", &dest, queue.len());
                out.extend(queue.into_iter().map(|(_, env)| env));
            }
        }
        out
    }

    /// Purges the duplicate caches and the payloads whose discovery timed out.
    /// Runs at most once per maintenance interval.
    pub fn maintain(&mut self, now: DateTime<Utc>) {
        let interval = Duration::milliseconds(self.settings.maintenance_interval as i64);
        if now < self.last_maintenance + interval {
            return;
        }
        self.last_maintenance = now;

        self.routing.purge_caches(now);
        self.transport.purge(now);
        self.control.purge(now);

        let timeout = Duration::milliseconds(self.settings.path_discovery_time as i64);
        let logger = &self.logger;
        for queue in self.pending.values_mut() {
            queue.retain(|(queued_at, env)| {
                let live = *queued_at + timeout > now;
                if !live {
                    info!(
                        logger,
                        "Message dropped";
                        &env.payload,
                        "reason" => "Route discovery timed out",
                        "status" => MessageStatus::DROPPED,
                    );
                }
                live
            });
        }
        self.pending.retain(|_, q| !q.is_empty());
    }

    /// Snapshot of the state of this node
    pub fn report(&self, status: NodeStatus) -> NodeReport {
        NodeReport {
            id: self.me.clone(),
            status,
            routes: self.routing.table().entries(),
            rreq_cache: self.routing.rreq_cache_keys(),
            data_cache: self.transport.cache_keys(),
            control_cache: self.control.cache_keys(),
            delivered_data: self.transport.delivered().to_vec(),
            delivered_commands: self.control.delivered().to_vec(),
            pending: self.pending.values().map(|q| q.len()).sum(),
        }
    }
}

/// A node that has not been started yet
#[derive(Debug)]
pub struct Node {
    config: NodeConfig,
    settings: AodvSettings,
    logger: Logger,
}

impl Node {
    /// Creates a new node from its configuration
    pub fn new(config: NodeConfig, logger: Logger) -> Self {
        let settings = config.protocol.resolve();
        let logger = logger.new(o!("node" => config.id.clone()));
        Node {
            config,
            settings,
            logger,
        }
    }

    /// Id of this node
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Always `Idle`. A started node is represented by its `NodeHandle`.
    pub fn status(&self) -> NodeStatus {
        NodeStatus::Idle
    }

    /// Starts the node. `inbox` is the inbound queue the medium delivers to. Every activity of
    /// the node stops once `stop` is disconnected, that is, when all its senders are dropped.
    pub fn start(
        self,
        medium: Arc<dyn Medium>,
        inbox: Receiver<Vec<u8>>,
        stop: Receiver<()>,
    ) -> Result<NodeHandle, SwarmSimError> {
        if self.config.id.trim().is_empty() {
            let err_msg = String::from("Node id can't be empty");
            error!(self.logger, "Aborting node start"; "reason" => &err_msg);
            return Err(SwarmSimErrorKind::Configuration(err_msg).into());
        }

        let me = self.config.id.clone();
        let reactor = Reactor::new(me.clone(), self.settings, self.logger.clone());
        let table = reactor.routing().table();
        let beacon = reactor.routing().hello_beacon();
        let (cmd_tx, cmd_rx) = channel::unbounded::<Commands>();
        let status = Arc::new(Mutex::new(NodeStatus::Running));
        let mut timers = Vec::new();

        //Dispatch loop
        let dispatch = {
            let medium = Arc::clone(&medium);
            let stop = stop.clone();
            let logger = self.logger.clone();
            let me = me.clone();
            spawn_named(format!("{}-dispatch", &me), move || {
                dispatch_loop(reactor, me, medium, inbox, cmd_rx, stop, logger)
            })?
        };

        //Neighbour presence
        {
            let medium = Arc::clone(&medium);
            let stop = stop.clone();
            let logger = self.logger.clone();
            let me = me.clone();
            let ticker = tick(std::time::Duration::from_millis(self.settings.hello_interval));
            let h = spawn_named(format!("{}-hello", &me), move || loop {
                select! {
                    recv(ticker) -> _ => {
                        let env = beacon.next_envelope();
                        transmit(medium.as_ref(), &me, vec![env], &logger);
                    },
                    recv(stop) -> _ => break,
                }
            })?;
            timers.push(h);
        }

        //Expiration sweep
        {
            let stop = stop.clone();
            let logger = self.logger.clone();
            let table = table.clone();
            let ticker = tick(std::time::Duration::from_millis(
                self.settings.maintenance_interval,
            ));
            let h = spawn_named(format!("{}-sweep", &me), move || loop {
                select! {
                    recv(ticker) -> _ => {
                        for dest in table.purge_expired(Utc::now()) {
                            info!(logger, "Route expired"; "destination" => dest);
                        }
                    },
                    recv(stop) -> _ => break,
                }
            })?;
            timers.push(h);
        }

        //Seeded traffic
        if !self.config.traffic.is_empty() {
            let mut traffic = self.config.traffic.clone();
            traffic.sort_by_key(|t| t.delay);
            let stop = stop.clone();
            let logger = self.logger.clone();
            let commands = cmd_tx.clone();
            let started = Instant::now();
            let h = spawn_named(format!("{}-traffic", &me), move || {
                for t in traffic {
                    let deadline = started + std::time::Duration::from_millis(t.delay);
                    let timeout = after(deadline.saturating_duration_since(Instant::now()));
                    select! {
                        recv(timeout) -> _ => {},
                        recv(stop) -> _ => break,
                    }
                    match t.command.parse::<Commands>() {
                        Ok(cmd) => {
                            if commands.send(cmd).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!(logger, "Invalid seeded command"; "command" => &t.command, "reason" => format!("{}", e));
                        }
                    }
                }
            })?;
            timers.push(h);
        }

        info!(self.logger, "Node started"; "pos" => self.config.position, "range" => self.config.transmission_range);

        Ok(NodeHandle {
            id: me,
            commands: cmd_tx,
            table,
            status,
            dispatch,
            timers,
        })
    }
}

/// A running node
#[derive(Debug)]
pub struct NodeHandle {
    id: String,
    commands: Sender<Commands>,
    table: RoutingTable,
    status: Arc<Mutex<NodeStatus>>,
    dispatch: JoinHandle<NodeReport>,
    timers: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    /// Id of the node
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle status
    pub fn status(&self) -> NodeStatus {
        *self.status.lock().expect("Could not lock node status")
    }

    /// Current routing table of the node
    pub fn routes(&self) -> Vec<RouteTableEntry> {
        self.table.entries()
    }

    /// Queues a command for the node. Fails once the node has shut down.
    pub fn send_command(&self, cmd: Commands) -> Result<(), SwarmSimError> {
        self.commands.send(cmd).map_err(|_| {
            let err_msg = format!("Node {} has shut down", &self.id);
            SwarmSimError::from(SwarmSimErrorKind::Shutdown(err_msg))
        })
    }

    /// Waits for every activity of the node to finish. Only returns once the stop signal has
    /// been given.
    pub fn join(self) -> Result<NodeReport, SwarmSimError> {
        let NodeHandle {
            id,
            commands,
            status,
            dispatch,
            timers,
            ..
        } = self;
        drop(commands);

        for t in timers {
            t.join().map_err(|_| {
                let err_msg = format!("A timer thread of node {} panicked", &id);
                SwarmSimError::from(SwarmSimErrorKind::Node(err_msg))
            })?;
        }
        let mut report = dispatch.join().map_err(|_| {
            let err_msg = format!("The dispatch thread of node {} panicked", &id);
            SwarmSimError::from(SwarmSimErrorKind::Node(err_msg))
        })?;

        *status.lock().expect("Could not lock node status") = NodeStatus::Stopped;
        report.status = NodeStatus::Stopped;
        Ok(report)
    }
}

fn spawn_named<F, T>(name: String, f: F) -> Result<JoinHandle<T>, SwarmSimError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new().name(name).spawn(f).map_err(|e| {
        let err_msg = String::from("Could not spawn node thread");
        SwarmSimError {
            kind: SwarmSimErrorKind::Node(err_msg),
            cause: Some(Box::new(e)),
        }
    })
}

fn dispatch_loop(
    mut reactor: Reactor,
    me: String,
    medium: Arc<dyn Medium>,
    inbox: Receiver<Vec<u8>>,
    commands: Receiver<Commands>,
    stop: Receiver<()>,
    logger: Logger,
) -> NodeReport {
    let mut commands = commands;
    loop {
        select! {
            recv(inbox) -> data => match data {
                Ok(data) => {
                    let out = reactor.handle_incoming(&data);
                    transmit(medium.as_ref(), &me, out, &logger);
                }
                Err(_) => {
                    info!(logger, "Inbound queue disconnected");
                    break;
                }
            },
            recv(commands) -> cmd => match cmd {
                Ok(cmd) => {
                    let out = reactor.handle_command(cmd);
                    transmit(medium.as_ref(), &me, out, &logger);
                }
                Err(_) => commands = never(),
            },
            recv(stop) -> _ => break,
        }
        reactor.maintain(Utc::now());
    }
    info!(logger, "Node shutting down");

    reactor.report(NodeStatus::Running)
}

/// Hands envelopes to the medium, logging each transmission
fn transmit(medium: &dyn Medium, me: &str, out: Vec<Envelope>, logger: &Logger) {
    for env in out {
        match medium.broadcast(me, &env) {
            Ok(tx) => log_tx(logger, &tx, &env),
            Err(e) => {
                error!(logger, "Failed to broadcast"; "reason" => format!("{}", e));
                if let Some(cause) = e.cause {
                    error!(logger, "Cause: {}", cause);
                }
            }
        }
    }
}
