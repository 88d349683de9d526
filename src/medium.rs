//! The shared broadcast channel the nodes transmit over.
//! A transmission reaches every registered node within the sender's transmission range.
use crate::mobility::Position;
use crate::node::messages::Envelope;
use crate::node::MessageStatus;
use crate::{SwarmSimError, SwarmSimErrorKind};
use crossbeam_channel::{self as channel, Receiver, Sender, SendTimeoutError, TrySendError};
use slog::Logger;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Default bound of each node's inbound queue
pub const DEFAULT_QUEUE_SIZE: usize = 1024;
/// Default time a sender waits on a full inbound queue, in milliseconds
pub const DEFAULT_BLOCK_TIMEOUT: u64 = 500;

/// Metadata referring to a broadcast
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TxMetadata {
    /// Size in bytes of the encoded envelope
    pub size: usize,
    /// Number of peers in range when the tx happened
    pub peers_in_range: usize,
    /// Number of peers whose inbound queue accepted the envelope
    pub delivered: usize,
}

/// What happens when a recipient's inbound queue is full
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum Backpressure {
    /// Wait up to `timeout` milliseconds for space, then drop
    Block { timeout: u64 },
    /// Drop immediately
    Drop,
}

impl Default for Backpressure {
    fn default() -> Self {
        Backpressure::Block {
            timeout: DEFAULT_BLOCK_TIMEOUT,
        }
    }
}

/// Configuration of the simulated medium
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MediumConfig {
    /// Default bound of the inbound queues
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Policy applied when a queue is full
    #[serde(default)]
    pub backpressure: Backpressure,
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

impl Default for MediumConfig {
    fn default() -> Self {
        MediumConfig {
            queue_size: DEFAULT_QUEUE_SIZE,
            backpressure: Backpressure::default(),
        }
    }
}

/// Abstraction of the channel used by the nodes to reach their neighbours.
pub trait Medium: std::fmt::Debug + Send + Sync {
    /// Delivers `env` to every node within the transmission range of `sender`.
    fn broadcast(&self, sender: &str, env: &Envelope) -> Result<TxMetadata, SwarmSimError>;
}

/// Range test: `dx² + dy² ≤ range²`
pub fn in_range(a: &Position, b: &Position, range: f64) -> bool {
    a.distance_squared(b) <= range * range
}

/// Link quality of a transmission between two nodes `distance` apart. 1 at the sender,
/// decreasing linearly to 0 at the edge of the range.
pub fn link_quality(distance: f64, range: f64) -> f64 {
    if range <= 0.0 {
        return 0.0;
    }
    (1.0 - distance / range).max(0.0)
}

#[derive(Debug)]
struct MediumNode {
    position: Position,
    range: f64,
    inbox: Sender<Vec<u8>>,
}

/// In-process medium. Every registered node owns a bounded inbound queue.
#[derive(Debug)]
pub struct SimulatedMedium {
    nodes: RwLock<HashMap<String, MediumNode>>,
    backpressure: Backpressure,
    logger: Logger,
}

impl SimulatedMedium {
    /// Creates a medium with no nodes
    pub fn new(backpressure: Backpressure, logger: Logger) -> Self {
        SimulatedMedium {
            nodes: RwLock::new(HashMap::new()),
            backpressure,
            logger,
        }
    }

    /// Registers a node and returns the consuming end of its inbound queue.
    pub fn register(
        &self,
        id: &str,
        position: Position,
        range: f64,
        queue_size: usize,
    ) -> Result<Receiver<Vec<u8>>, SwarmSimError> {
        let mut nodes = self.nodes.write().expect("Could not lock medium nodes");
        if nodes.contains_key(id) {
            let err_msg = format!("Node {} is already registered", id);
            return Err(SwarmSimErrorKind::Medium(err_msg).into());
        }
        let (tx, rx) = channel::bounded(queue_size);
        nodes.insert(
            id.to_string(),
            MediumNode {
                position,
                range,
                inbox: tx,
            },
        );
        debug!(self.logger, "Node registered"; "node" => id, "pos" => position, "range" => range);

        Ok(rx)
    }

    /// Removes a node from the medium. Its inbound queue is disconnected once all in-flight
    /// broadcasts release their handles.
    pub fn deregister(&self, id: &str) {
        let mut nodes = self.nodes.write().expect("Could not lock medium nodes");
        nodes.remove(id);
    }

    /// Moves a registered node
    pub fn update_position(&self, id: &str, position: Position) -> Result<(), SwarmSimError> {
        let mut nodes = self.nodes.write().expect("Could not lock medium nodes");
        match nodes.get_mut(id) {
            Some(n) => {
                n.position = position;
                Ok(())
            }
            None => {
                let err_msg = format!("Node {} is not registered", id);
                Err(SwarmSimErrorKind::Medium(err_msg).into())
            }
        }
    }

    /// Current position of a registered node
    pub fn position_of(&self, id: &str) -> Option<Position> {
        let nodes = self.nodes.read().expect("Could not lock medium nodes");
        nodes.get(id).map(|n| n.position)
    }

    /// Ids of the nodes within range of `id`, excluding itself
    pub fn neighbours_of(&self, id: &str) -> Vec<String> {
        let nodes = self.nodes.read().expect("Could not lock medium nodes");
        let me = match nodes.get(id) {
            Some(n) => n,
            None => return vec![],
        };
        let mut ids: Vec<String> = nodes
            .iter()
            .filter(|(k, n)| k.as_str() != id && in_range(&me.position, &n.position, me.range))
            .map(|(k, _)| k.clone())
            .collect();
        ids.sort();
        ids
    }

    fn deliver(&self, recipient: &str, inbox: &Sender<Vec<u8>>, data: Vec<u8>) -> bool {
        let res = match self.backpressure {
            Backpressure::Block { timeout } => inbox
                .send_timeout(data, Duration::from_millis(timeout))
                .map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => "Inbound queue full",
                    SendTimeoutError::Disconnected(_) => "Recipient shut down",
                }),
            Backpressure::Drop => inbox.try_send(data).map_err(|e| match e {
                TrySendError::Full(_) => "Inbound queue full",
                TrySendError::Disconnected(_) => "Recipient shut down",
            }),
        };

        match res {
            Ok(()) => true,
            Err(reason) => {
                debug!(
                    self.logger,
                    "Envelope not delivered";
                    "recipient" => recipient,
                    "reason" => reason,
                    "status" => MessageStatus::DROPPED,
                );
                false
            }
        }
    }
}

impl Medium for SimulatedMedium {
    fn broadcast(&self, sender: &str, env: &Envelope) -> Result<TxMetadata, SwarmSimError> {
        // Resolve recipients under the lock, deliver without it
        let recipients: Vec<(String, Sender<Vec<u8>>, f64)> = {
            let nodes = self.nodes.read().expect("Could not lock medium nodes");
            let me = nodes.get(sender).ok_or_else(|| {
                let err_msg = format!("Sender {} is not registered", sender);
                SwarmSimError::from(SwarmSimErrorKind::Medium(err_msg))
            })?;
            nodes
                .iter()
                .filter(|(id, n)| {
                    id.as_str() != sender && in_range(&me.position, &n.position, me.range)
                })
                .map(|(id, n)| {
                    let quality = link_quality(me.position.distance(&n.position), me.range);
                    (id.clone(), n.inbox.clone(), quality)
                })
                .collect()
        };

        let mut tx = TxMetadata {
            peers_in_range: recipients.len(),
            ..Default::default()
        };
        for (id, inbox, quality) in recipients {
            let mut copy = env.clone();
            copy.link_quality = Some(quality);
            let data = copy.to_vec()?;
            tx.size = data.len();
            if self.deliver(&id, &inbox, data) {
                tx.delivered += 1;
            }
        }

        Ok(tx)
    }
}

/// Logs an outgoing transmission
pub fn log_tx(logger: &Logger, tx: &TxMetadata, env: &Envelope) {
    info!(
        logger,
        "Message sent";
        &env.payload,
        "peers_in_range" => tx.peers_in_range,
        "delivered" => tx.delivered,
        "size" => tx.size,
        "source" => &env.source,
        "status" => MessageStatus::SENT,
    );
}

/// Logs an incoming message
pub fn log_handle_message(
    logger: &Logger,
    env: &Envelope,
    status: MessageStatus,
    reason: Option<&str>,
    action: Option<&str>,
) {
    info!(
        logger,
        "Received message";
        &env.payload,
        "source" => &env.source,
        "link_quality" => env.link_quality.unwrap_or(0.0),
        "action" => action.unwrap_or(""),
        "reason" => reason.unwrap_or(""),
        "status" => status,
    );
}
