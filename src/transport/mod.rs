//! Transports feeding console events into the server
//!
//! Every transport forwards what it receives into one shared queue, so the
//! organ sees a single ordered stream of batches whatever the source.

pub mod midi_in;
pub mod mqtt;
pub mod protocol;

pub use midi_in::MidiManualInput;
pub use mqtt::MqttTransport;
pub use protocol::{parse_message, OrganEvent, ProtocolError};

/// Something a transport hands to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Raw protocol message; decoded and committed as one batch
    Payload(String),
    /// Already decoded events; committed as one batch
    Events(Vec<OrganEvent>),
    /// Broker connection state changed
    Connection(bool),
}
