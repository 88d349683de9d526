//! Messages exchanged between nodes over the medium.
//! Every transmission is an `Envelope` carrying exactly one `Payload`.
use crate::{SwarmSimError, SwarmSimErrorKind};
use chrono::Utc;
use slog::{Record, Serializer, KV};
use std::collections::BTreeMap;

/// Outcome of a protocol handler: zero or one message to re-broadcast.
pub type HandleMessageOutcome = Option<Envelope>;

/// Wire code for route requests
pub const RREQ_TYPE: u8 = 1;
/// Wire code for route replies
pub const RREP_TYPE: u8 = 2;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RouteRequestMessage {
    pub hop_count: u32,
    pub rreq_id: u32,
    pub destination: String,
    pub dest_seq_no: u32,
    pub originator: String,
    pub orig_seq_no: u32,
    /// Set when the originator has no valid sequence number for the destination.
    pub unknown_seq_no: bool,
    pub ttl: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RouteResponseMessage {
    pub hop_count: u32,
    pub rreq_id: u32,
    pub destination: String,
    pub dest_seq_no: u32,
    pub originator: String,
    /// In milliseconds
    pub lifetime: u32,
    pub ttl: u32,
}

impl RouteResponseMessage {
    /// A HELLO is a reply a node broadcasts about itself to its immediate neighbours.
    pub fn is_hello(&self) -> bool {
        self.originator == self.destination
    }
}

///Route discovery messages
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum AodvMessage {
    RREQ(RouteRequestMessage),
    RREP(RouteResponseMessage),
}

impl AodvMessage {
    /// Wire discriminant of this message
    pub fn type_code(&self) -> u8 {
        match self {
            AodvMessage::RREQ(_) => RREQ_TYPE,
            AodvMessage::RREP(_) => RREP_TYPE,
        }
    }
}

/// Application data addressed to a node
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DataMessage {
    pub checksum: String,
    pub recipient: String,
    pub sender: String,
    pub data: Vec<u8>,
}

impl DataMessage {
    /// Creates a new data message, stamping it with a fresh checksum
    pub fn new(sender: String, recipient: String, data: Vec<u8>) -> Self {
        let checksum = create_checksum(&[sender.as_bytes(), recipient.as_bytes(), &data]);
        DataMessage {
            checksum,
            recipient,
            sender,
            data,
        }
    }
}

/// Command addressed to a node
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ControlMessage {
    pub checksum: String,
    pub recipient: String,
    pub sender: String,
    pub command: String,
    pub params: BTreeMap<String, String>,
}

impl ControlMessage {
    /// Creates a new control message, stamping it with a fresh checksum
    pub fn new(
        sender: String,
        recipient: String,
        command: String,
        params: BTreeMap<String, String>,
    ) -> Self {
        let flat_params: String = params
            .iter()
            .map(|(k, v)| format!("{}={};", k, v))
            .collect();
        let checksum = create_checksum(&[
            sender.as_bytes(),
            recipient.as_bytes(),
            command.as_bytes(),
            flat_params.as_bytes(),
        ]);
        ControlMessage {
            checksum,
            recipient,
            sender,
            command,
            params,
        }
    }
}

/// The payload carried by an envelope. Exactly one kind per transmission.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Payload {
    AODV(AodvMessage),
    DATA(DataMessage),
    CONTROL(ControlMessage),
}

/// The unit exchanged over the medium
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    /// Node that most recently transmitted this envelope. Rewritten at every hop.
    pub source: String,
    pub payload: Payload,
    /// Attached by the medium on delivery
    #[serde(default)]
    pub link_quality: Option<f64>,
}

impl Envelope {
    /// Creates a new envelope with no link-quality annotation
    pub fn new(source: String, payload: Payload) -> Self {
        Envelope {
            source,
            payload,
            link_quality: None,
        }
    }

    /// Wraps a route-discovery message
    pub fn aodv(source: String, msg: AodvMessage) -> Self {
        Envelope::new(source, Payload::AODV(msg))
    }

    ///Creates an Envelope from a serialized slice of bytes.
    pub fn from_slice(data: &[u8]) -> Result<Envelope, SwarmSimError> {
        serde_cbor::de::from_reader(data).map_err(|e| {
            let err_msg = String::from("Error deserializing data into envelope");
            SwarmSimError {
                kind: SwarmSimErrorKind::Serialization(err_msg),
                cause: Some(Box::new(e)),
            }
        })
    }

    ///Serializes the envelope for transmission
    pub fn to_vec(&self) -> Result<Vec<u8>, SwarmSimError> {
        serde_cbor::ser::to_vec(self).map_err(|e| {
            let err_msg = String::from("Error serializing envelope");
            SwarmSimError {
                kind: SwarmSimErrorKind::Serialization(err_msg),
                cause: Some(Box::new(e)),
            }
        })
    }
}

impl KV for Payload {
    fn serialize(&self, _rec: &Record, serializer: &mut dyn Serializer) -> slog::Result {
        if let Payload::AODV(ref m) = *self {
            serializer.emit_u8("aodv_type", m.type_code())?;
        }
        match *self {
            Payload::DATA(ref m) => {
                serializer.emit_str("msg_type", "DATA")?;
                serializer.emit_str("msg_sender", &m.sender)?;
                serializer.emit_str("msg_recipient", &m.recipient)?;
                serializer.emit_str("checksum", &m.checksum)
            }
            Payload::CONTROL(ref m) => {
                serializer.emit_str("msg_type", "CONTROL")?;
                serializer.emit_str("msg_sender", &m.sender)?;
                serializer.emit_str("msg_recipient", &m.recipient)?;
                serializer.emit_str("command", &m.command)?;
                serializer.emit_str("checksum", &m.checksum)
            }
            Payload::AODV(AodvMessage::RREQ(ref m)) => {
                serializer.emit_str("msg_type", "RREQ")?;
                serializer.emit_str("msg_originator", &m.originator)?;
                serializer.emit_str("msg_destination", &m.destination)?;
                serializer.emit_u32("hop_count", m.hop_count)?;
                serializer.emit_u32("rreq_id", m.rreq_id)
            }
            Payload::AODV(AodvMessage::RREP(ref m)) if m.is_hello() => {
                serializer.emit_str("msg_type", "HELLO")?;
                serializer.emit_u32("dest_seq_no", m.dest_seq_no)
            }
            Payload::AODV(AodvMessage::RREP(ref m)) => {
                serializer.emit_str("msg_type", "RREP")?;
                serializer.emit_str("msg_originator", &m.originator)?;
                serializer.emit_str("msg_destination", &m.destination)?;
                serializer.emit_u32("hop_count", m.hop_count)?;
                serializer.emit_u32("dest_seq_no", m.dest_seq_no)
            }
        }
    }
}

/// Produces the MD5 checksum that identifies an application payload.
/// The current timestamp is mixed in so that two identical payloads sent at different times
/// are still treated as distinct messages.
fn create_checksum(parts: &[&[u8]]) -> String {
    let mut data = Vec::new();
    let mut ts = Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes().to_vec();
    data.append(&mut ts);
    for p in parts {
        data.extend_from_slice(p);
        data.push(0u8);
    }

    let d = md5::compute(&data);
    format!("{:x}", d)
}
