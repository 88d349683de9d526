//! Application data layer
use crate::node::forwarding::{ForwardingLayer, RoutedPayload};
use crate::node::messages::{DataMessage, Payload};
use slog::Logger;

/// Dedup-and-forward layer for DATA payloads
pub type TransportLayer = ForwardingLayer<DataMessage>;

impl RoutedPayload for DataMessage {
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
        Payload::DATA(self)
    }

    fn log_delivery(&self, logger: &Logger) {
        info!(
            logger,
            "Data delivered";
            "msg_sender" => &self.sender,
            "size" => self.data.len(),
            "checksum" => &self.checksum,
        );
    }
}
