//! Dedup-and-forward logic shared by the payload layers.
//! A payload addressed to another node is relayed along a known route, or triggers a route
//! request when none is known. Each layer keeps its own checksum cache.
use crate::medium::log_handle_message;
use crate::node::cache::DedupCache;
use crate::node::messages::{Envelope, Payload};
use crate::node::routing::RoutingEngine;
use crate::node::MessageStatus;

use chrono::{DateTime, Utc};
use slog::Logger;

/// A payload that travels end-to-end along discovered routes
pub trait RoutedPayload: Clone + std::fmt::Debug {
    /// Identifier used for duplicate suppression
    fn checksum(&self) -> &str;
    /// Node the payload is addressed to
    fn recipient(&self) -> &str;
    /// Node that created the payload
    fn sender(&self) -> &str;
    /// Wraps the payload for transmission
    fn into_payload(self) -> Payload;
    /// Called once when the payload reaches its recipient
    fn log_delivery(&self, _logger: &Logger) {}
}

/// What a layer decided to do with a payload
#[derive(Debug, Clone, PartialEq)]
pub enum LayerOutcome {
    /// The payload reached its recipient
    Delivered,
    /// Nothing is emitted
    Dropped(&'static str),
    /// The envelope is re-broadcast along the route
    Forward(Envelope),
    /// No route is known. A route request is broadcast instead.
    Discover(Envelope),
}

impl LayerOutcome {
    /// The envelope to hand to the medium, if any
    pub fn outbound(self) -> Option<Envelope> {
        match self {
            LayerOutcome::Forward(env) | LayerOutcome::Discover(env) => Some(env),
            LayerOutcome::Delivered | LayerOutcome::Dropped(_) => None,
        }
    }
}

/// Dedup-and-forward state for one payload kind
#[derive(Debug)]
pub struct ForwardingLayer<T: RoutedPayload> {
    me: String,
    cache: DedupCache<String>,
    delivered: Vec<T>,
    logger: Logger,
}

impl<T: RoutedPayload> ForwardingLayer<T> {
    /// Creates the layer for node `me`. Checksums are remembered for `window_ms`.
    pub fn new(me: String, window_ms: u64, logger: Logger) -> Self {
        ForwardingLayer {
            me,
            cache: DedupCache::new(window_ms),
            delivered: Vec::new(),
            logger,
        }
    }

    /// Processes a payload received from the medium
    pub fn handle_message(
        &mut self,
        env: &Envelope,
        msg: &T,
        routing: &mut RoutingEngine,
    ) -> LayerOutcome {
        let now = Utc::now();
        let seen = self.cache.check_and_insert(msg.checksum().to_string(), now);

        if msg.recipient() == self.me {
            if seen {
                log_handle_message(
                    &self.logger,
                    env,
                    MessageStatus::DROPPED,
                    Some("Duplicate message"),
                    None,
                );
                return LayerOutcome::Dropped("Duplicate message");
            }
            log_handle_message(&self.logger, env, MessageStatus::ACCEPTED, None, None);
            msg.log_delivery(&self.logger);
            self.delivered.push(msg.clone());
            return LayerOutcome::Delivered;
        }

        if seen {
            log_handle_message(
                &self.logger,
                env,
                MessageStatus::DROPPED,
                Some("Duplicate message"),
                None,
            );
            return LayerOutcome::Dropped("Duplicate message");
        }

        if routing.check_for_route(msg.recipient()) {
            let mut fwd = env.clone();
            fwd.source = self.me.clone();
            fwd.link_quality = None;
            log_handle_message(
                &self.logger,
                env,
                MessageStatus::FORWARDING,
                None,
                Some("Forwarded along route"),
            );
            return LayerOutcome::Forward(fwd);
        }

        let rreq = routing.originate_route_request(msg.recipient(), msg.sender(), true);
        log_handle_message(
            &self.logger,
            env,
            MessageStatus::DROPPED,
            Some("No route"),
            Some("RREQ issued"),
        );
        LayerOutcome::Discover(rreq)
    }

    /// Processes a payload created by this node. When a route is known the payload is sent,
    /// otherwise a route request is issued and the caller is expected to hold the payload.
    pub fn originate(&mut self, msg: &T, routing: &mut RoutingEngine) -> LayerOutcome {
        self.cache
            .check_and_insert(msg.checksum().to_string(), Utc::now());

        if routing.check_for_route(msg.recipient()) {
            let env = Envelope::new(self.me.clone(), msg.clone().into_payload());
            return LayerOutcome::Forward(env);
        }

        let unknown_seq_no = routing.table().get(msg.recipient()).is_none();
        let rreq = routing.originate_route_request(msg.recipient(), &self.me, unknown_seq_no);
        LayerOutcome::Discover(rreq)
    }

    /// Whether `checksum` is currently in the cache
    pub fn has_seen(&self, checksum: &str) -> bool {
        self.cache.contains(&checksum.to_string(), Utc::now())
    }

    /// Checksums currently in the cache
    pub fn cache_keys(&self) -> Vec<String> {
        self.cache.keys()
    }

    /// Payloads delivered to this node, in arrival order
    pub fn delivered(&self) -> &[T] {
        &self.delivered
    }

    /// Drops expired checksums
    pub fn purge(&mut self, now: DateTime<Utc>) -> usize {
        self.cache.purge(now)
    }
}
