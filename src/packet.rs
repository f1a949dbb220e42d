/// Packet Codec — parses and serializes a single wire radio packet
///
/// A `RadioPacket` is `(address, type, sequence, body)`. On the wire it
/// is `[address: u32 BE][type<<5 | sequence][body...][crc32: u32 BE]`,
/// with the trailing CRC32 (`crc32fast`) computed over everything that
/// precedes it. This framing is this crate's own decision for the
/// "external" packet codec boundary the engine depends on — see
/// DESIGN.md for why.
use crate::address::{Address, PacketSequence};
use crate::errors::{RadioError, Result};

/// Tag identifying the kind of packet being carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Outbound request fragment, sent by the PDM
    Pdm,
    /// Inbound response fragment, sent by the pod
    Pod,
    /// Acknowledgment, sent by the PDM
    Ack,
    /// Continuation of a multi-packet response, sent by the pod
    Con,
}

impl PacketType {
    fn to_bits(self) -> u8 {
        match self {
            Self::Pdm => 0,
            Self::Pod => 1,
            Self::Ack => 2,
            Self::Con => 3,
        }
    }

    fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(Self::Pdm),
            1 => Ok(Self::Pod),
            2 => Ok(Self::Ack),
            3 => Ok(Self::Con),
            other => Err(RadioError::ParseFailed(format!(
                "unrecognized packet type tag {}",
                other
            ))),
        }
    }
}

/// A single framed radio packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioPacket {
    pub address: Address,
    pub packet_type: PacketType,
    pub sequence: PacketSequence,
    pub body: Vec<u8>,
}

const HEADER_LEN: usize = 5;
const CRC_LEN: usize = 4;

impl RadioPacket {
    pub fn new(address: Address, packet_type: PacketType, sequence: PacketSequence, body: Vec<u8>) -> Self {
        Self {
            address,
            packet_type,
            sequence,
            body,
        }
    }

    /// Build an ACK packet, tagged with the local radio address (the
    /// wire `address` field every packet in a conversation carries,
    /// regardless of which side sent it), whose body is the big-endian
    /// encoding of `ack_body_address` — the shared shape used for both
    /// the interim and final ACK (see `crate::engine`).
    pub fn ack(local_address: Address, sequence: PacketSequence, ack_body_address: Address) -> Self {
        Self::new(local_address, PacketType::Ack, sequence, ack_body_address.0.to_be_bytes().to_vec())
    }

    /// Return a copy of this packet rewritten with a new sequence
    /// number. Re-CRCing happens on encode, so there is nothing else to
    /// touch here.
    pub fn with_sequence(&self, sequence: PacketSequence) -> Self {
        Self {
            sequence,
            ..self.clone()
        }
    }

    /// Serialize this packet to its wire representation
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.body.len() + CRC_LEN);
        buf.extend_from_slice(&self.address.0.to_be_bytes());
        buf.push((self.packet_type.to_bits() << 5) | self.sequence.value());
        buf.extend_from_slice(&self.body);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        let crc = hasher.finalize();
        buf.extend_from_slice(&crc.to_be_bytes());
        buf
    }

    /// Parse a packet from its wire representation. Failures here are
    /// logged by the caller and treated as a retry, never a
    /// conversation error (see the Packet Exchange rules).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN + CRC_LEN {
            return Err(RadioError::ParseFailed(format!(
                "packet too short: {} bytes",
                data.len()
            )));
        }

        let (payload, crc_bytes) = data.split_at(data.len() - CRC_LEN);
        let expected_crc = u32::from_be_bytes(crc_bytes.try_into().unwrap());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(payload);
        let actual_crc = hasher.finalize();
        if actual_crc != expected_crc {
            return Err(RadioError::ParseFailed(format!(
                "crc mismatch: expected {:#x}, got {:#x}",
                expected_crc, actual_crc
            )));
        }

        let address = Address(u32::from_be_bytes(payload[0..4].try_into().unwrap()));
        let type_and_seq = payload[4];
        let packet_type = PacketType::from_bits(type_and_seq >> 5)?;
        let sequence = PacketSequence::new(type_and_seq & 0x1f);
        let body = payload[HEADER_LEN..].to_vec();

        Ok(Self {
            address,
            packet_type,
            sequence,
            body,
        })
    }

    /// A zero-length packet used as a wake-up burst (§4.6)
    pub fn wake_up(from: Address, sequence: PacketSequence) -> Self {
        Self::new(from, PacketType::Pdm, sequence, Vec::new())
    }
}

/// Strip the two-byte radio framing (`[rssi][reserved]`) that precedes
/// every packet returned by the bridge, per §6.2, then parse the rest.
pub fn parse_wire_frame(data: &[u8]) -> Result<(RadioPacket, u8)> {
    if data.len() < 2 {
        return Err(RadioError::ParseFailed("frame shorter than rssi header".into()));
    }
    let rssi = data[0];
    let packet = RadioPacket::parse(&data[2..])?;
    Ok((packet, rssi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let packet = RadioPacket::new(
            Address(0x1234_5678),
            PacketType::Pod,
            PacketSequence::new(17),
            vec![1, 2, 3, 4, 5],
        );
        let wire = packet.encode();
        let parsed = RadioPacket::parse(&wire).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn test_corrupted_crc_fails_to_parse() {
        let packet = RadioPacket::new(Address(1), PacketType::Ack, PacketSequence::new(0), vec![9]);
        let mut wire = packet.encode();
        *wire.last_mut().unwrap() ^= 0xff;
        assert!(RadioPacket::parse(&wire).is_err());
    }

    #[test]
    fn test_parse_wire_frame_strips_rssi_and_reserved_byte() {
        let packet = RadioPacket::new(Address(42), PacketType::Con, PacketSequence::new(3), vec![]);
        let mut frame = vec![0xAB, 0x00];
        frame.extend_from_slice(&packet.encode());
        let (parsed, rssi) = parse_wire_frame(&frame).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(rssi, 0xAB);
    }

    #[test]
    fn test_ack_body_encodes_address_big_endian() {
        let ack = RadioPacket::ack(Address(7), PacketSequence::new(0), Address(0x0102_0304));
        assert_eq!(ack.body, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_wake_up_is_zero_length_pdm_packet() {
        let wake = RadioPacket::wake_up(Address(1), PacketSequence::new(5));
        assert_eq!(wake.packet_type, PacketType::Pdm);
        assert!(wake.body.is_empty());
    }
}
