//! OTA wire protocol: control opcodes, handshake phases and GATT identifiers.

use uuid::Uuid;

/// Link-layer header bytes subtracted from the transport unit to get the packet size.
pub const PROTOCOL_OVERHEAD: usize = 3;

/// Name the device advertises over BLE.
pub const DEFAULT_DEVICE_NAME: &str = "Synth OPL";

/// OTA data characteristic: packet-size announcement, then firmware packets.
pub const OTA_DATA_UUID: Uuid = Uuid::from_u128(0x23408888_1f40_4cd8_9b89_ca8d45f8a5b0);

/// OTA control characteristic: single-byte opcodes in both directions.
pub const OTA_CONTROL_UUID: Uuid = Uuid::from_u128(0x7ad671aa_21c0_46a4_b722_270e3ae3d830);

/// Single-byte control message. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,
    /// Controller asks the device to begin an update.
    Request = 0x01,
    RequestAck = 0x02,
    RequestNak = 0x03,
    /// Controller reports that every packet has been written.
    Done = 0x04,
    DoneAck = 0x05,
    DoneNak = 0x06,
}

impl Opcode {
    /// Classify a device-to-controller opcode as a reply to one handshake phase.
    ///
    /// NOP and the controller's own opcodes carry no reply and yield `None`.
    pub fn classify(self) -> Option<(Phase, Reply)> {
        match self {
            Self::RequestAck => Some((Phase::Request, Reply::Ack)),
            Self::RequestNak => Some((Phase::Request, Reply::Nak)),
            Self::DoneAck => Some((Phase::Done, Reply::Ack)),
            Self::DoneNak => Some((Phase::Done, Reply::Nak)),
            Self::Nop | Self::Request | Self::Done => None,
        }
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> Self {
        opcode as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Nop),
            0x01 => Ok(Self::Request),
            0x02 => Ok(Self::RequestAck),
            0x03 => Ok(Self::RequestNak),
            0x04 => Ok(Self::Done),
            0x05 => Ok(Self::DoneAck),
            0x06 => Ok(Self::DoneNak),
            other => Err(other),
        }
    }
}

/// Handshake phase a reply answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Reply to REQUEST.
    Request,
    /// Reply to DONE.
    Done,
}

impl Phase {
    /// Opcode the controller writes to open this phase.
    pub fn opcode(self) -> Opcode {
        match self {
            Self::Request => Opcode::Request,
            Self::Done => Opcode::Done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reply {
    Ack,
    Nak,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_wire_values() {
        let expected = [
            (Opcode::Nop, 0x00),
            (Opcode::Request, 0x01),
            (Opcode::RequestAck, 0x02),
            (Opcode::RequestNak, 0x03),
            (Opcode::Done, 0x04),
            (Opcode::DoneAck, 0x05),
            (Opcode::DoneNak, 0x06),
        ];
        for (opcode, byte) in expected {
            assert_eq!(u8::from(opcode), byte);
            assert_eq!(Opcode::try_from(byte), Ok(opcode));
        }
    }

    #[test]
    fn unknown_byte_is_rejected() {
        assert_eq!(Opcode::try_from(0x07), Err(0x07));
        assert_eq!(Opcode::try_from(0xff), Err(0xff));
    }

    #[test]
    fn classify_device_replies() {
        assert_eq!(
            Opcode::RequestAck.classify(),
            Some((Phase::Request, Reply::Ack))
        );
        assert_eq!(
            Opcode::RequestNak.classify(),
            Some((Phase::Request, Reply::Nak))
        );
        assert_eq!(Opcode::DoneAck.classify(), Some((Phase::Done, Reply::Ack)));
        assert_eq!(Opcode::DoneNak.classify(), Some((Phase::Done, Reply::Nak)));
    }

    #[test]
    fn nop_and_controller_opcodes_are_unclassified() {
        assert_eq!(Opcode::Nop.classify(), None);
        assert_eq!(Opcode::Request.classify(), None);
        assert_eq!(Opcode::Done.classify(), None);
    }

    #[test]
    fn uuids_match_device_table() {
        assert_eq!(
            OTA_DATA_UUID.to_string(),
            "23408888-1f40-4cd8-9b89-ca8d45f8a5b0"
        );
        assert_eq!(
            OTA_CONTROL_UUID.to_string(),
            "7ad671aa-21c0-46a4-b722-270e3ae3d830"
        );
    }
}
