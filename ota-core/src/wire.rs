//! Framing: 2-byte LE packet-size announcement and single-byte control notifications.

use crate::protocol::Opcode;

const PACKET_SIZE_LEN: usize = 2;

/// Encode the packet-size announcement written once to the data endpoint.
pub fn encode_packet_size(chunk_size: usize) -> Result<[u8; PACKET_SIZE_LEN], WireError> {
    let size = u16::try_from(chunk_size).map_err(|_| WireError::PacketSizeTooLarge(chunk_size))?;
    Ok(size.to_le_bytes())
}

/// Decode a control-endpoint notification. Exactly one byte holding a known opcode.
pub fn decode_notification(bytes: &[u8]) -> Result<Opcode, WireError> {
    match bytes {
        [] => Err(WireError::Empty),
        [byte] => Opcode::try_from(*byte).map_err(WireError::UnknownOpcode),
        _ => Err(WireError::UnexpectedLength(bytes.len())),
    }
}

/// Error encoding or decoding a wire value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("packet size {0} does not fit in two bytes")]
    PacketSizeTooLarge(usize),
    #[error("empty notification")]
    Empty,
    #[error("notification of {0} bytes, expected 1")]
    UnexpectedLength(usize),
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
}
