//! Command and control layer. Same contract as the data layer, applied to commands addressed to
//! a specific node.
use crate::node::forwarding::{ForwardingLayer, RoutedPayload};
use crate::node::messages::{ControlMessage, Payload};
use slog::Logger;

/// Dedup-and-forward layer for CONTROL payloads
pub type ControlLayer = ForwardingLayer<ControlMessage>;

impl RoutedPayload for ControlMessage {
    fn checksum(&self) -> &str {
        &self.checksum
    }

    fn recipient(&self) -> &str {
        &self.recipient
    }

    fn sender(&self) -> &str {
        &self.sender
    }

    fn into_payload(self) -> Payload {
        Payload::CONTROL(self)
    }

    fn log_delivery(&self, logger: &Logger) {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        info!(
            logger,
            "Command received";
            "msg_sender" => &self.sender,
            "command" => &self.command,
            "params" => params.join(" "),
        );
    }
}
