//! Synth OPL over-the-air update protocol.
//! No Bluetooth I/O: the host supplies a connected [`Transport`] and receives an [`OutcomeReport`].

pub mod chunk;
pub mod controller;
pub mod handoff;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod wire;

#[cfg(test)]
mod mock;

pub use chunk::{chunk_size, split_into_packets, ChunkError, Packets};
pub use controller::{run_ota_update, ControllerConfig, OtaController, OtaError, OutcomeReport};
pub use protocol::{
    Opcode, Phase, Reply, DEFAULT_DEVICE_NAME, OTA_CONTROL_UUID, OTA_DATA_UUID, PROTOCOL_OVERHEAD,
};
pub use session::{Event, OtaSession, State};
pub use transport::{NotificationHandler, Transport, TransportError};
pub use wire::{decode_notification, encode_packet_size, WireError};
