// Control packet sent by the drive controller -> runtime
//
// Wire layout (big-endian, no padding, 14 bytes):
// [timestamp_us: u64][command: i16][param1: i16][param2: i16]

use serde::{Deserialize, Serialize};

/// Size of one control datagram on the wire
pub const CONTROL_PACKET_BYTES: usize = 14;

/// Discrete driving commands understood by the runtime
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    KeepAlive = 0,
    Turn = 1,
    Forward = 2,
    Backward = 3,
    Stop = 4,
    TurnThenStop = 5,
}

impl TryFrom<i16> for Command {
    type Error = DecodeError;

    fn try_from(raw: i16) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Command::KeepAlive),
            1 => Ok(Command::Turn),
            2 => Ok(Command::Forward),
            3 => Ok(Command::Backward),
            4 => Ok(Command::Stop),
            5 => Ok(Command::TurnThenStop),
            other => Err(DecodeError::InvalidCommand(other)),
        }
    }
}

/// One decoded control datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPacket {
    /// Producer-side send time, advisory only
    pub timestamp_us: u64,
    pub command: Command,
    /// Traction direction: positive = forward, otherwise reverse
    pub param1: i16,
    /// Steering deflection sign, or bounded travel distance
    pub param2: i16,
}

/// Errors when decoding a control datagram. Never fatal: the frame is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated packet: got {len} bytes, need {}", CONTROL_PACKET_BYTES)]
    Truncated { len: usize },

    #[error("invalid command value {0}")]
    InvalidCommand(i16),
}

impl ControlPacket {
    pub fn new(command: Command, param1: i16, param2: i16) -> Self {
        Self {
            timestamp_us: 0,
            command,
            param1,
            param2,
        }
    }

    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// Encode into the fixed 14-byte wire representation
    pub fn encode(&self) -> [u8; CONTROL_PACKET_BYTES] {
        let mut buf = [0u8; CONTROL_PACKET_BYTES];
        buf[0..8].copy_from_slice(&self.timestamp_us.to_be_bytes());
        buf[8..10].copy_from_slice(&(self.command as i16).to_be_bytes());
        buf[10..12].copy_from_slice(&self.param1.to_be_bytes());
        buf[12..14].copy_from_slice(&self.param2.to_be_bytes());
        buf
    }

    /// Decode a datagram payload.
    ///
    /// Only the first 14 bytes are looked at; shorter buffers are rejected
    /// before any field is read.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let Some(frame) = data.first_chunk::<CONTROL_PACKET_BYTES>() else {
            return Err(DecodeError::Truncated { len: data.len() });
        };

        let timestamp_us = u64::from_be_bytes([
            frame[0], frame[1], frame[2], frame[3], frame[4], frame[5], frame[6], frame[7],
        ]);
        let command = Command::try_from(i16::from_be_bytes([frame[8], frame[9]]))?;
        let param1 = i16::from_be_bytes([frame[10], frame[11]]);
        let param2 = i16::from_be_bytes([frame[12], frame[13]]);

        Ok(Self {
            timestamp_us,
            command,
            param1,
            param2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_COMMANDS: [Command; 6] = [
        Command::KeepAlive,
        Command::Turn,
        Command::Forward,
        Command::Backward,
        Command::Stop,
        Command::TurnThenStop,
    ];

    #[test]
    fn test_wire_layout_is_big_endian() {
        let packet = ControlPacket {
            timestamp_us: 0x0102_0304_0506_0708,
            command: Command::Turn,
            param1: 1,
            param2: -10,
        };
        let bytes = packet.encode();
        assert_eq!(
            bytes,
            [1, 2, 3, 4, 5, 6, 7, 8, 0x00, 0x01, 0x00, 0x01, 0xFF, 0xF6]
        );
    }

    #[test]
    fn test_round_trip_extremes() {
        for command in ALL_COMMANDS {
            for (p1, p2) in [(0, 0), (i16::MIN, i16::MAX), (i16::MAX, i16::MIN), (-1, 1)] {
                let packet = ControlPacket {
                    timestamp_us: u64::MAX - p1 as u64,
                    command,
                    param1: p1,
                    param2: p2,
                };
                assert_eq!(ControlPacket::decode(&packet.encode()), Ok(packet));
            }
        }
    }

    #[test]
    fn test_truncated_buffers_rejected() {
        let full = ControlPacket::new(Command::Forward, 1, 0).encode();
        for len in 0..CONTROL_PACKET_BYTES {
            assert_eq!(
                ControlPacket::decode(&full[..len]),
                Err(DecodeError::Truncated { len })
            );
        }
    }

    #[test]
    fn test_invalid_command_rejected() {
        let mut bytes = ControlPacket::new(Command::Stop, 0, 0).encode();
        for raw in [6i16, -1, 255, i16::MAX] {
            bytes[8..10].copy_from_slice(&raw.to_be_bytes());
            assert_eq!(
                ControlPacket::decode(&bytes),
                Err(DecodeError::InvalidCommand(raw))
            );
        }
    }

    #[test]
    fn test_json_form() {
        let packet = ControlPacket::new(Command::TurnThenStop, 1, -90).with_timestamp(7);
        let json = serde_json::to_string(&packet).unwrap();
        assert_eq!(
            json,
            r#"{"timestamp_us":7,"command":"turn_then_stop","param1":1,"param2":-90}"#
        );
        assert_eq!(serde_json::from_str::<ControlPacket>(&json).unwrap(), packet);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let packet = ControlPacket::new(Command::Backward, -1, 3).with_timestamp(42);
        let mut bytes = packet.encode().to_vec();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(ControlPacket::decode(&bytes), Ok(packet));
    }
}
