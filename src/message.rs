/// Message Codec — fragments a logical message into wire packets, and
/// reassembles a stream of received packets back into one.
///
/// The first fragment of a logical message carries a small header
/// (`message_sequence`, `message_address`, `total_len`) ahead of its
/// chunk of body bytes; continuation fragments carry only raw chunk
/// bytes. This mirrors the chunked-reassembly shape used elsewhere in
/// this codebase's reference corpus (`ChunkedMessageAssembler`),
/// adapted to this protocol's sequence/ACK discipline rather than a
/// chunk-number header.
use crate::address::{Address, MessageSequence, PacketSequence};
use crate::errors::{RadioError, Result};
use crate::packet::{PacketType, RadioPacket};

/// Maximum number of body bytes carried in a single fragment
pub const FRAGMENT_BODY_LEN: usize = 31;

const FIRST_FRAGMENT_HEADER_LEN: usize = 7;

/// A fully assembled application message: `(message_sequence, address, body)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalMessage {
    pub message_sequence: MessageSequence,
    pub address: Address,
    pub body: Vec<u8>,
}

impl LogicalMessage {
    pub fn new(message_sequence: MessageSequence, address: Address, body: Vec<u8>) -> Self {
        Self {
            message_sequence,
            address,
            body,
        }
    }
}

/// Split an outgoing logical message into an ordered, non-empty list of
/// wire packets, all tagged `Pdm`. The engine decides, per fragment
/// position, whether to expect an `Ack` or `Pod` reply (see
/// `crate::engine`). Every fragment initially carries
/// `first_packet_sequence`; the engine rewrites each one's sequence
/// just before sending it, as the protocol's sequence counter advances
/// fragment by fragment.
pub fn fragment_message(
    message: &LogicalMessage,
    message_address: Address,
    packet_address: Address,
    first_packet_sequence: PacketSequence,
) -> Vec<RadioPacket> {
    let mut header = Vec::with_capacity(FIRST_FRAGMENT_HEADER_LEN + message.body.len());
    header.push(message.message_sequence.value());
    header.extend_from_slice(&message_address.0.to_be_bytes());
    header.extend_from_slice(&(message.body.len() as u16).to_be_bytes());
    header.extend_from_slice(&message.body);

    let mut packets = Vec::new();
    let mut offset = 0;
    loop {
        let remaining = header.len() - offset;
        let chunk_len = remaining.min(FRAGMENT_BODY_LEN);
        let chunk = header[offset..offset + chunk_len].to_vec();
        packets.push(RadioPacket::new(
            packet_address,
            PacketType::Pdm,
            first_packet_sequence,
            chunk,
        ));
        offset += chunk_len;
        if offset >= header.len() {
            break;
        }
    }
    packets
}

/// Reassembles a sequence of received packets (`Pod` then zero or more
/// `Con`) into one logical message, reporting whether more fragments
/// are still needed.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: Vec<u8>,
    total_len: Option<u16>,
    message_sequence: Option<MessageSequence>,
    address: Option<Address>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received packet into the assembler. Returns `Some` with
    /// the completed message once enough bytes have arrived, or `None`
    /// if another continuation packet is still needed.
    pub fn add_packet(&mut self, packet: &RadioPacket) -> Result<Option<LogicalMessage>> {
        if self.total_len.is_none() {
            if packet.body.len() < FIRST_FRAGMENT_HEADER_LEN {
                return Err(RadioError::ParseFailed(
                    "first response fragment shorter than its header".into(),
                ));
            }
            self.message_sequence = Some(MessageSequence::new(packet.body[0]));
            self.address = Some(Address(u32::from_be_bytes(packet.body[1..5].try_into().unwrap())));
            self.total_len = Some(u16::from_be_bytes([packet.body[5], packet.body[6]]));
            self.buffer.extend_from_slice(&packet.body[FIRST_FRAGMENT_HEADER_LEN..]);
        } else {
            self.buffer.extend_from_slice(&packet.body);
        }

        let total_len = self.total_len.unwrap() as usize;
        if self.buffer.len() >= total_len {
            self.buffer.truncate(total_len);
            Ok(Some(LogicalMessage::new(
                self.message_sequence.unwrap(),
                self.address.unwrap(),
                std::mem::take(&mut self.buffer),
            )))
        } else {
            Ok(None)
        }
    }
}
