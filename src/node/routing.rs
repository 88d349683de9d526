//! Route discovery for a single node, modeled on AODV (RFC 3561).
//! The `RoutingEngine` owns the node's routing table and the RREQ/RREP duplicate caches, and
//! turns every route request or reply it receives into at most one outbound message.
use crate::medium::log_handle_message;
use crate::node::cache::DedupCache;
use crate::node::messages::*;
use crate::node::node_config::AodvSettings;
use crate::node::MessageStatus;
use crate::{SwarmSimError, SwarmSimErrorKind};

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use slog::Logger;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Entry of the routing table
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTableEntry {
    pub destination: String,
    pub dest_seq_no: u32,
    pub next_hop: String,
    pub hop_count: u32,
    /// Absolute expiration time
    pub lifetime: DateTime<Utc>,
}

impl RouteTableEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.lifetime > now
    }
}

/// Result of offering a route advertisement to the table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RouteUpdate {
    /// No usable entry existed. A new one was created.
    Created,
    /// The advertisement was fresher-or-equal and strictly shorter.
    Replaced,
    /// Same next hop and distance. Only the expiration moved.
    Refreshed,
    /// The stored entry was kept unchanged.
    Retained,
}

/// The routing table of a node. Cloning yields another handle to the same table, so that the
/// expiration sweep can run concurrently with the dispatch loop.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Arc<Mutex<HashMap<String, RouteTableEntry>>>,
}

impl RoutingTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Default::default()
    }

    /// Offers a route to `destination` through `next_hop`. An existing entry is overwritten only
    /// if `dest_seq_no` is not older than the stored one and `hop_count` is strictly smaller.
    pub fn offer(
        &self,
        destination: &str,
        dest_seq_no: u32,
        next_hop: &str,
        hop_count: u32,
        lifetime: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RouteUpdate {
        let mut rt = self
            .entries
            .lock()
            .expect("Error trying to acquire lock on route table");

        let new_entry = RouteTableEntry {
            destination: destination.to_string(),
            dest_seq_no,
            next_hop: next_hop.to_string(),
            hop_count,
            lifetime,
        };

        match rt.get_mut(destination) {
            Some(entry) if entry.is_live(now) => {
                if entry.dest_seq_no <= dest_seq_no && hop_count < entry.hop_count {
                    *entry = new_entry;
                    RouteUpdate::Replaced
                } else if entry.dest_seq_no <= dest_seq_no
                    && entry.next_hop == next_hop
                    && entry.hop_count == hop_count
                {
                    entry.lifetime = std::cmp::max(entry.lifetime, lifetime);
                    entry.dest_seq_no = dest_seq_no;
                    RouteUpdate::Refreshed
                } else {
                    RouteUpdate::Retained
                }
            }
            _ => {
                rt.insert(destination.to_string(), new_entry);
                RouteUpdate::Created
            }
        }
    }

    /// Inserts an entry unconditionally
    pub fn insert(&self, entry: RouteTableEntry) {
        let mut rt = self
            .entries
            .lock()
            .expect("Error trying to acquire lock on route table");
        rt.insert(entry.destination.clone(), entry);
    }

    /// Copy of the entry for `destination`, live or not
    pub fn get(&self, destination: &str) -> Option<RouteTableEntry> {
        let rt = self
            .entries
            .lock()
            .expect("Error trying to acquire lock on route table");
        rt.get(destination).cloned()
    }

    /// Copy of the entry for `destination` if it has not expired
    pub fn get_live(&self, destination: &str, now: DateTime<Utc>) -> Option<RouteTableEntry> {
        self.get(destination).filter(|e| e.is_live(now))
    }

    /// True iff a non-expired entry exists for `destination`
    pub fn check_for_route(&self, destination: &str) -> bool {
        self.get_live(destination, Utc::now()).is_some()
    }

    /// Deletes every entry whose expiration has passed. Returns the destinations removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut rt = self
            .entries
            .lock()
            .expect("Error trying to acquire lock on route table");
        let expired: Vec<String> = rt
            .iter()
            .filter(|(_, e)| !e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        for dest in expired.iter() {
            rt.remove(dest);
        }
        expired
    }

    /// Snapshot of the table, ordered by destination
    pub fn entries(&self) -> Vec<RouteTableEntry> {
        let rt = self
            .entries
            .lock()
            .expect("Error trying to acquire lock on route table");
        let mut entries: Vec<RouteTableEntry> = rt.values().cloned().collect();
        entries.sort_by(|a, b| a.destination.cmp(&b.destination));
        entries
    }
}

/// Builds the periodic neighbour-presence broadcast of a node
#[derive(Debug, Clone)]
pub struct HelloBeacon {
    me: String,
    seq_no: Arc<AtomicU32>,
    rreq_id: Arc<AtomicU32>,
    lifetime: u32,
}

impl HelloBeacon {
    /// The next HELLO: a self-addressed route reply with a hop count and TTL of 1.
    pub fn next_envelope(&self) -> Envelope {
        let msg = RouteResponseMessage {
            hop_count: 1,
            rreq_id: self.rreq_id.fetch_add(1, Ordering::SeqCst).wrapping_add(1),
            destination: self.me.clone(),
            dest_seq_no: self.seq_no.load(Ordering::SeqCst),
            originator: self.me.clone(),
            lifetime: self.lifetime,
            ttl: 1,
        };
        Envelope::aodv(self.me.clone(), AodvMessage::RREP(msg))
    }
}

/// Route discovery state machine of one node
#[derive(Debug)]
pub struct RoutingEngine {
    me: String,
    settings: AodvSettings,
    table: RoutingTable,
    rreq_cache: DedupCache<(String, u32)>,
    rrep_cache: DedupCache<(String, u32)>,
    seq_no: Arc<AtomicU32>,
    rreq_id: Arc<AtomicU32>,
    logger: Logger,
}

impl RoutingEngine {
    /// Creates the engine for node `me`. Discovery ids start at a random value.
    pub fn new(me: String, settings: AodvSettings, logger: Logger) -> Self {
        let mut rng = StdRng::from_entropy();
        let starting_rreq_id: u32 = rng.gen_range(0..std::u32::MAX);
        RoutingEngine {
            me,
            rreq_cache: DedupCache::new(settings.path_discovery_time),
            rrep_cache: DedupCache::new(settings.path_discovery_time),
            settings,
            table: RoutingTable::new(),
            seq_no: Arc::new(AtomicU32::new(0)),
            rreq_id: Arc::new(AtomicU32::new(starting_rreq_id)),
            logger,
        }
    }

    /// Another handle to this node's routing table
    pub fn table(&self) -> RoutingTable {
        self.table.clone()
    }

    /// Current sequence number of this node
    pub fn seq_no(&self) -> u32 {
        self.seq_no.load(Ordering::SeqCst)
    }

    /// The HELLO builder sharing this engine's counters
    pub fn hello_beacon(&self) -> HelloBeacon {
        HelloBeacon {
            me: self.me.clone(),
            seq_no: Arc::clone(&self.seq_no),
            rreq_id: Arc::clone(&self.rreq_id),
            lifetime: self.settings.hello_lifetime(),
        }
    }

    /// Keys currently held by the RREQ cache
    pub fn rreq_cache_keys(&self) -> Vec<(String, u32)> {
        self.rreq_cache.keys()
    }

    /// True iff a live route to `destination` exists
    pub fn check_for_route(&self, destination: &str) -> bool {
        self.table.check_for_route(destination)
    }

    /// Next hop towards `destination`
    pub fn get_next_hop(&self, destination: &str) -> Result<String, SwarmSimError> {
        match self.table.get_live(destination, Utc::now()) {
            Some(entry) => Ok(entry.next_hop),
            None => {
                let err_msg = format!("No route to {}", destination);
                Err(SwarmSimErrorKind::NoRoute(err_msg).into())
            }
        }
    }

    /// Deletes expired routes
    pub fn check_expired_neighbours(&self) -> Vec<String> {
        self.table.purge_expired(Utc::now())
    }

    /// Drops expired entries of the duplicate caches
    pub fn purge_caches(&mut self, now: DateTime<Utc>) {
        let n = self.rreq_cache.purge(now) + self.rrep_cache.purge(now);
        if n > 0 {
            debug!(self.logger, "Purged {} discovery cache entries", n);
        }
    }

    /// Starts a route discovery for `destination` on behalf of `originator`.
    /// The originating key is recorded so the flooded request is not processed again here.
    pub fn originate_route_request(
        &mut self,
        destination: &str,
        originator: &str,
        unknown_seq_no: bool,
    ) -> Envelope {
        let rreq_id = self.rreq_id.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        let orig_seq_no = if originator == self.me {
            self.seq_no.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.table
                .get(originator)
                .map(|e| e.dest_seq_no)
                .unwrap_or(0)
        };
        let dest_seq_no = if unknown_seq_no {
            0
        } else {
            self.table
                .get(destination)
                .map(|e| e.dest_seq_no)
                .unwrap_or(0)
        };

        let msg = RouteRequestMessage {
            hop_count: 0,
            rreq_id,
            destination: destination.to_string(),
            dest_seq_no,
            originator: originator.to_string(),
            orig_seq_no,
            unknown_seq_no,
            ttl: self.settings.net_diameter,
        };
        self.rreq_cache
            .check_and_insert((originator.to_string(), rreq_id), Utc::now());
        info!(
            self.logger,
            "Route discovery process started";
            "destination" => destination,
            "originator" => originator,
            "rreq_id" => rreq_id,
        );

        Envelope::aodv(self.me.clone(), AodvMessage::RREQ(msg))
    }

    /// Processes an incoming route request
    pub fn handle_route_request(
        &mut self,
        env: &Envelope,
        msg: &RouteRequestMessage,
    ) -> HandleMessageOutcome {
        if msg.originator == self.me {
            log_handle_message(
                &self.logger,
                env,
                MessageStatus::DROPPED,
                Some("Own route request"),
                None,
            );
            return None;
        }

        let now = Utc::now();
        let candidate_hop_count = msg.hop_count + 1;

        //Reverse route towards the originator
        let lifetime = now + Duration::milliseconds(self.settings.route_lifetime as i64);
        let update = self.table.offer(
            &msg.originator,
            msg.orig_seq_no,
            &env.source,
            candidate_hop_count,
            lifetime,
            now,
        );
        debug!(self.logger, "Reverse route to {}: {:?}", &msg.originator, update);

        if self
            .rreq_cache
            .check_and_insert((msg.originator.clone(), msg.rreq_id), now)
        {
            log_handle_message(
                &self.logger,
                env,
                MessageStatus::DROPPED,
                Some("Duplicate RREQ"),
                None,
            );
            return None;
        }

        //This node is the destination
        if msg.destination == self.me {
            let dest_seq_no = msg.orig_seq_no.wrapping_add(1);
            self.seq_no.fetch_max(dest_seq_no, Ordering::SeqCst);
            let reply = RouteResponseMessage {
                hop_count: 1,
                rreq_id: msg.rreq_id,
                destination: self.me.clone(),
                dest_seq_no,
                originator: msg.originator.clone(),
                lifetime: u32::try_from(self.settings.route_lifetime).unwrap_or(u32::MAX),
                ttl: self.settings.net_diameter,
            };
            log_handle_message(
                &self.logger,
                env,
                MessageStatus::ACCEPTED,
                None,
                Some("RREP generated"),
            );
            return Some(Envelope::aodv(self.me.clone(), AodvMessage::RREP(reply)));
        }

        //This node knows a route to the destination
        if let Some(entry) = self.table.get_live(&msg.destination, now) {
            let remaining =
                u32::try_from((entry.lifetime - now).num_milliseconds().max(0)).unwrap_or(u32::MAX);
            let reply = RouteResponseMessage {
                hop_count: entry.hop_count + 1,
                rreq_id: msg.rreq_id,
                destination: msg.destination.clone(),
                dest_seq_no: entry.dest_seq_no,
                originator: msg.originator.clone(),
                lifetime: remaining,
                ttl: self.settings.net_diameter,
            };
            // The reply this node generates must not be relayed by itself again
            self.rrep_cache
                .check_and_insert((msg.originator.clone(), msg.rreq_id), now);
            log_handle_message(
                &self.logger,
                env,
                MessageStatus::FORWARDING,
                None,
                Some("Intermediate RREP generated"),
            );
            return Some(Envelope::aodv(self.me.clone(), AodvMessage::RREP(reply)));
        }

        if msg.ttl <= 1 {
            log_handle_message(
                &self.logger,
                env,
                MessageStatus::DROPPED,
                Some("TTL depleted"),
                None,
            );
            return None;
        }

        let mut fwd = msg.clone();
        fwd.hop_count = candidate_hop_count;
        fwd.ttl = msg.ttl - 1;
        log_handle_message(
            &self.logger,
            env,
            MessageStatus::FORWARDING,
            None,
            Some("RREQ re-flooded"),
        );
        Some(Envelope::aodv(self.me.clone(), AodvMessage::RREQ(fwd)))
    }

    /// Processes an incoming route reply, HELLOs included
    pub fn handle_route_reply(
        &mut self,
        env: &Envelope,
        msg: &RouteResponseMessage,
    ) -> HandleMessageOutcome {
        if msg.destination == self.me {
            log_handle_message(
                &self.logger,
                env,
                MessageStatus::DROPPED,
                Some("Own route reply"),
                None,
            );
            return None;
        }

        let now = Utc::now();

        //Forward route towards the destination
        let lifetime_ms = if msg.lifetime > 0 {
            msg.lifetime as i64
        } else {
            self.settings.route_lifetime as i64
        };
        let update = self.table.offer(
            &msg.destination,
            msg.dest_seq_no,
            &env.source,
            msg.hop_count,
            now + Duration::milliseconds(lifetime_ms),
            now,
        );
        debug!(self.logger, "Route to {}: {:?}", &msg.destination, update);

        if self
            .rrep_cache
            .check_and_insert((msg.originator.clone(), msg.rreq_id), now)
        {
            log_handle_message(
                &self.logger,
                env,
                MessageStatus::DROPPED,
                Some("Duplicate RREP"),
                None,
            );
            return None;
        }

        if msg.originator == self.me {
            log_handle_message(
                &self.logger,
                env,
                MessageStatus::ACCEPTED,
                None,
                Some("Route established"),
            );
            return None;
        }

        if msg.ttl <= 1 {
            let status = if msg.is_hello() {
                MessageStatus::ACCEPTED
            } else {
                MessageStatus::DROPPED
            };
            log_handle_message(&self.logger, env, status, Some("TTL depleted"), None);
            return None;
        }

        let mut fwd = msg.clone();
        fwd.hop_count = msg.hop_count + 1;
        fwd.ttl = msg.ttl - 1;
        log_handle_message(
            &self.logger,
            env,
            MessageStatus::FORWARDING,
            None,
            Some("RREP relayed"),
        );
        Some(Envelope::aodv(self.me.clone(), AodvMessage::RREP(fwd)))
    }
}
