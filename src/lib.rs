/// pdm_radio_link - PDM-side half-duplex radio conversation engine
///
/// **License**: Creative Commons Attribution 4.0 International (CC BY 4.0)
///
/// Implements the controller-side (PDM) half of a packet-framed radio
/// dialog with an insulin pod carried over an external radio bridge: a
/// single-threaded conversation worker, a packet-exchange state
/// machine with retry/resync/wake-up handling, and the sequence
/// arithmetic and ACK discipline that keep one conversation in sync
/// with the pod across packet loss and crosstalk.
///
/// # Design Principles
/// - Minimal external dependencies: CRC framing via `crc32fast`,
///   structured logging via `log`, serial transport via `serialport`.
/// - The radio bridge is exclusively owned by one worker thread;
///   callers never touch it directly.
/// - No command semantics, persistence, or cryptography — this crate
///   is the conversation plumbing only.
pub mod ack_drain;
pub mod address;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exchange;
pub mod message;
pub mod packet;
pub mod testing;
pub mod worker;

pub use address::{Address, MessageSequence, PacketSequence};
pub use bridge::{ExchangeParams, RadioBridge, SerialRadioBridge, TxPower};
pub use config::{Config, ConfigBuilder};
pub use engine::{ConversationEngine, ConversationRequest};
pub use errors::{RadioError, Result};
pub use message::LogicalMessage;
pub use packet::{PacketType, RadioPacket};
pub use worker::PdmRadio;

/// Packet sequence modulus (5-bit counter)
pub const PACKET_SEQUENCE_MODULUS: u8 = 32;

/// Message sequence modulus (4-bit counter)
pub const MESSAGE_SEQUENCE_MODULUS: u8 = 16;
