/// Address and sequence-counter types for the PDM radio protocol
///
/// `PacketSequence` and `MessageSequence` are the two modular counters
/// the conversation engine advances on every accepted round-trip. Both
/// wrap on overflow rather than panicking — wraparound is a normal,
/// expected part of a long-running conversation, not an error.
use std::fmt;

/// 32-bit radio address identifying either the PDM or a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub u32);

impl Address {
    /// Sentinel used as the final ACK body when no override address is
    /// in effect
    pub const NONE: Address = Address(0);
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Address(value)
    }
}

/// 5-bit packet sequence counter, range 0..=31
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSequence(u8);

impl PacketSequence {
    pub const MODULUS: u8 = 32;

    /// Construct from a raw value, reducing it modulo 32
    pub fn new(value: u8) -> Self {
        Self(value % Self::MODULUS)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// The sequence one round-trip after this one
    pub fn next(self) -> Self {
        Self((self.0 + 1) % Self::MODULUS)
    }
}

impl Default for PacketSequence {
    fn default() -> Self {
        Self(0)
    }
}

impl fmt::Display for PacketSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 4-bit message sequence counter, range 0..=15
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSequence(u8);

impl MessageSequence {
    pub const MODULUS: u8 = 16;

    pub fn new(value: u8) -> Self {
        Self(value % Self::MODULUS)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn next(self) -> Self {
        Self((self.0 + 1) % Self::MODULUS)
    }
}

impl Default for MessageSequence {
    fn default() -> Self {
        Self(0)
    }
}

impl fmt::Display for MessageSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_sequence_wraps_31_to_0() {
        let seq = PacketSequence::new(31);
        assert_eq!(seq.next().value(), 0);
    }

    #[test]
    fn test_packet_sequence_reduces_on_construction() {
        assert_eq!(PacketSequence::new(32).value(), 0);
        assert_eq!(PacketSequence::new(33).value(), 1);
    }

    #[test]
    fn test_message_sequence_wraps_15_to_0() {
        let seq = MessageSequence::new(15);
        assert_eq!(seq.next().value(), 0);
    }

    #[test]
    fn test_message_sequence_does_not_double_count() {
        let mut seq = MessageSequence::new(14);
        seq = seq.next();
        assert_eq!(seq.value(), 15);
        seq = seq.next();
        assert_eq!(seq.value(), 0);
    }

    #[test]
    fn test_address_display_is_hex() {
        let addr = Address(0xdeadbeef);
        assert_eq!(format!("{}", addr), "0xdeadbeef");
    }
}
