/// Conversation Engine — drives one full request/response conversation
/// on top of Packet Exchange: fragmenting the outgoing message,
/// running the outbound ACK-expecting phase, the terminal POD
/// exchange, and the inbound interim-ACK/CON reassembly loop.
use log::debug;

use crate::address::{Address, MessageSequence, PacketSequence};
use crate::bridge::{ExchangeParams, RadioBridge};
use crate::clock::Clock;
use crate::config::Config;
use crate::errors::Result;
use crate::exchange::{exchange, ExchangeState};
use crate::message::{fragment_message, LogicalMessage, MessageAssembler};
use crate::packet::{PacketType, RadioPacket};

/// One request to send over the air: the outgoing message, its
/// destination, an optional override address for the closing ACKs, an
/// optional transmit power to program before sending, and whether the
/// first fragment should be sent twice (`double_take`).
pub struct ConversationRequest {
    pub message: LogicalMessage,
    pub message_address: Address,
    pub ack_address_override: Option<Address>,
    pub tx_power: Option<crate::bridge::TxPower>,
    pub double_take: bool,
}

/// The two pieces of engine-owned state that persist across
/// conversations for the lifetime of the worker: the current packet
/// and message sequence counters. Every wire packet this engine sends
/// is tagged with `local_address` — the pod is expected to echo that
/// same address back, and Packet Exchange filters on it (see
/// `crate::exchange`); the request's own `message_address` is carried
/// inside the fragment headers instead (see `crate::message`).
pub struct ConversationEngine {
    pub local_address: Address,
    pub packet_sequence: PacketSequence,
    pub message_sequence: MessageSequence,
}

impl ConversationEngine {
    pub fn new(local_address: Address, packet_sequence: PacketSequence, message_sequence: MessageSequence) -> Self {
        Self {
            local_address,
            packet_sequence,
            message_sequence,
        }
    }

    /// Build the address encoded in an ACK body: the override address
    /// if present, otherwise the local PDM address (for the interim
    /// ACK) — see `final_ack_body` for the final ACK's variant.
    fn interim_ack_body(&self, ack_address_override: Option<Address>) -> Address {
        ack_address_override.unwrap_or(self.local_address)
    }

    /// The final ACK body is the sentinel `0` unless an override is in
    /// effect.
    fn final_ack_body(&self, ack_address_override: Option<Address>) -> Address {
        ack_address_override.unwrap_or(Address::NONE)
    }

    /// Run one full conversation: fragment, send, and reassemble the
    /// reply. Does not send the closing ACK — that belongs to the
    /// worker, so the caller can be unblocked as soon as the response
    /// message is in hand.
    pub fn send_and_get(
        &mut self,
        bridge: &mut dyn RadioBridge,
        clock: &dyn Clock,
        exchange_state: &mut ExchangeState,
        request: &ConversationRequest,
        config: &Config,
    ) -> Result<LogicalMessage> {
        if let Some(power) = request.tx_power {
            bridge.set_tx_power(power)?;
            exchange_state.tx_power = power;
        }

        let packets = fragment_message(
            &request.message,
            request.message_address,
            self.local_address,
            self.packet_sequence,
        );
        debug!("send_and_get: message fragmented into {} packet(s)", packets.len());

        let n = packets.len();
        if n > 1 {
            if request.double_take {
                // The first send only primes the pod; its reply is
                // discarded on purpose and only the second send's
                // reply advances the engine.
                let first = packets[0].with_sequence(self.packet_sequence);
                let primed = exchange(
                    bridge,
                    clock,
                    exchange_state,
                    first,
                    PacketType::Ack,
                    config.exchange_timeout,
                    ExchangeParams::MID_EXCHANGE,
                    config,
                )?;
                self.packet_sequence = primed.reply.sequence.next();
            }

            let first = packets[0].with_sequence(self.packet_sequence);
            let outcome = exchange(
                bridge,
                clock,
                exchange_state,
                first,
                PacketType::Ack,
                config.exchange_timeout,
                ExchangeParams::MID_EXCHANGE,
                config,
            )?;
            self.packet_sequence = outcome.reply.sequence.next();

            for fragment in &packets[1..n - 1] {
                let outgoing = fragment.with_sequence(self.packet_sequence);
                let outcome = exchange(
                    bridge,
                    clock,
                    exchange_state,
                    outgoing,
                    PacketType::Ack,
                    config.exchange_timeout,
                    ExchangeParams::MID_EXCHANGE,
                    config,
                )?;
                self.packet_sequence = outcome.reply.sequence.next();
            }
        }

        let terminal = packets[n - 1].with_sequence(self.packet_sequence);
        let terminal_outcome = exchange(
            bridge,
            clock,
            exchange_state,
            terminal,
            PacketType::Pod,
            config.exchange_timeout,
            ExchangeParams::MID_EXCHANGE,
            config,
        )?;
        self.packet_sequence = terminal_outcome.reply.sequence.next();

        let mut assembler = MessageAssembler::new();
        let mut response = assembler.add_packet(&terminal_outcome.reply)?;
        let mut last_received = terminal_outcome.reply;

        while response.is_none() {
            let ack_body = self.interim_ack_body(request.ack_address_override);
            let interim_sequence = last_received.sequence.next();
            let interim_ack = RadioPacket::ack(self.local_address, interim_sequence, ack_body);
            debug!("send_and_get: sending interim ack, expecting continuation");

            let outcome = exchange(
                bridge,
                clock,
                exchange_state,
                interim_ack,
                PacketType::Con,
                config.exchange_timeout,
                ExchangeParams::MID_EXCHANGE,
                config,
            )?;
            last_received = outcome.reply.clone();
            response = assembler.add_packet(&outcome.reply)?;
        }

        let response = response.expect("loop only exits once the assembler reports completion");
        self.message_sequence = response.message_sequence.next();

        Ok(response)
    }

    /// Build the closing ACK the worker transmits after publishing the
    /// response to the caller (§4.3's final-ACK shape).
    pub fn final_ack(&self, ack_address_override: Option<Address>, sequence: PacketSequence) -> RadioPacket {
        RadioPacket::ack(self.local_address, sequence, self.final_ack_body(ack_address_override))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::testing::{StubEvent, StubRadioBridge};

    fn local() -> Address {
        Address(0x1000_0000)
    }

    fn pod() -> Address {
        Address(0x2000_0000)
    }

    fn first_fragment_header(message_sequence: u8, total_len: u16, extra: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8; 7];
        body[0] = message_sequence;
        body[1..5].copy_from_slice(&pod().0.to_be_bytes());
        body[5..7].copy_from_slice(&total_len.to_be_bytes());
        body.extend_from_slice(extra);
        body
    }

    #[test]
    fn test_single_packet_request_single_packet_response() {
        let pod_reply = RadioPacket::new(
            local(),
            PacketType::Pod,
            PacketSequence::new(1),
            first_fragment_header(0, 3, &[9, 9, 9]),
        );
        let mut bridge = StubRadioBridge::new(vec![StubEvent::Reply(pod_reply)]);
        let clock = FakeClock::new();
        let mut exchange_state = ExchangeState::new(local());
        let mut engine = ConversationEngine::new(local(), PacketSequence::new(0), MessageSequence::new(0));

        let request = ConversationRequest {
            message: LogicalMessage::new(MessageSequence::new(0), pod(), vec![1, 2, 3]),
            message_address: pod(),
            ack_address_override: None,
            tx_power: None,
            double_take: false,
        };

        let response = engine
            .send_and_get(&mut bridge, &clock, &mut exchange_state, &request, &Config::default())
            .unwrap();

        assert_eq!(response.body, vec![9, 9, 9]);
        assert_eq!(engine.packet_sequence.value(), 2);
        assert_eq!(engine.message_sequence.value(), 1);
    }

    #[test]
    fn test_multi_packet_pod_response_uses_interim_ack() {
        let first = RadioPacket::new(
            local(),
            PacketType::Pod,
            PacketSequence::new(1),
            first_fragment_header(5, 10, &[1, 2, 3, 4, 5]),
        );
        let con = RadioPacket::new(local(), PacketType::Con, PacketSequence::new(3), vec![6, 7, 8, 9, 10]);
        let mut bridge = StubRadioBridge::new(vec![StubEvent::Reply(first), StubEvent::Reply(con)]);
        let clock = FakeClock::new();
        let mut exchange_state = ExchangeState::new(local());
        let mut engine = ConversationEngine::new(local(), PacketSequence::new(0), MessageSequence::new(5));

        let request = ConversationRequest {
            message: LogicalMessage::new(MessageSequence::new(5), pod(), vec![1]),
            message_address: pod(),
            ack_address_override: None,
            tx_power: None,
            double_take: false,
        };

        let response = engine
            .send_and_get(&mut bridge, &clock, &mut exchange_state, &request, &Config::default())
            .unwrap();

        assert_eq!(response.body, (1..=10).collect::<Vec<u8>>());
        // the interim ack is sent at seq 2 (last_received.sequence.next()),
        // so the exchange validates the CON reply against 2.next() == 3
        assert_eq!(bridge.sent.last().unwrap().sequence.value(), 2);
    }

    #[test]
    fn test_double_take_sends_first_fragment_twice_using_primed_sequence() {
        // priming send at seq 0 -> ack expected at 1; pod instead replies
        // at 3, resyncing the retry to seq 4; that retry succeeds at 5,
        // priming the *real* second P0 send at seq 6.
        let discarded = RadioPacket::new(local(), PacketType::Ack, PacketSequence::new(3), vec![]);
        let primed = RadioPacket::new(local(), PacketType::Ack, PacketSequence::new(5), vec![]);
        let second_ack = RadioPacket::new(local(), PacketType::Ack, PacketSequence::new(7), vec![]);
        let terminal = RadioPacket::new(
            local(),
            PacketType::Pod,
            PacketSequence::new(9),
            first_fragment_header(0, 0, &[]),
        );

        let mut bridge = StubRadioBridge::new(vec![
            StubEvent::Reply(discarded),
            StubEvent::Reply(primed),
            StubEvent::Reply(second_ack),
            StubEvent::Reply(terminal),
        ]);
        let clock = FakeClock::new();
        let mut exchange_state = ExchangeState::new(local());
        let mut engine = ConversationEngine::new(local(), PacketSequence::new(0), MessageSequence::new(0));

        let message = LogicalMessage::new(MessageSequence::new(0), pod(), vec![0u8; 40]);
        let request = ConversationRequest {
            message,
            message_address: pod(),
            ack_address_override: None,
            tx_power: None,
            double_take: true,
        };

        let response = engine
            .send_and_get(&mut bridge, &clock, &mut exchange_state, &request, &Config::default())
            .unwrap();

        assert!(response.body.is_empty());
        // first send at 0, discarded reply's sequence (3) + 1 resyncs the
        // retry to 4; the successful priming reply (5) + 1 starts the
        // real second P0 send at 6
        let sent_sequences: Vec<u8> = bridge.sent.iter().map(|p| p.sequence.value()).collect();
        assert_eq!(sent_sequences[0], 0);
        assert_eq!(sent_sequences[1], 4);
        assert_eq!(sent_sequences[2], 6);
    }

    #[test]
    fn test_interim_ack_body_uses_override_when_present() {
        let override_addr = Address(0x3333_3333);
        let engine = ConversationEngine::new(local(), PacketSequence::new(0), MessageSequence::new(0));
        assert_eq!(engine.interim_ack_body(Some(override_addr)), override_addr);
        assert_eq!(engine.interim_ack_body(None), local());
    }

    #[test]
    fn test_final_ack_body_is_sentinel_without_override() {
        let engine = ConversationEngine::new(local(), PacketSequence::new(0), MessageSequence::new(0));
        assert_eq!(engine.final_ack_body(None), Address::NONE);
        let override_addr = Address(0x4444_4444);
        assert_eq!(engine.final_ack_body(Some(override_addr)), override_addr);
    }
}
