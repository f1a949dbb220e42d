/// Packet Exchange — one `(transmit P, receive a packet of expected
/// type T)` round trip, with retries, wake-up, sequence validation, and
/// resync-or-abort handling. This is the engine's most intricate piece
/// (§4.1); everything above it (`engine`, `worker`) calls `exchange`
/// and never touches the bridge directly.
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::address::{Address, PacketSequence};
use crate::bridge::{reconnect, ExchangeParams, RadioBridge, TxPower};
use crate::clock::Clock;
use crate::config::Config;
use crate::errors::{RadioError, Result};
use crate::packet::{PacketType, RadioPacket};

/// How long a wake-up burst listens for a (discarded) reply
const WAKE_UP_LISTEN: ExchangeParams = ExchangeParams {
    ack_timeout_ms: 0,
    listen_extra_ms: 0,
    total_timeout_ms: 250,
    retry_count: 1,
    retry_delay_ms: 0,
};

/// Persistent, cross-exchange state the Packet Exchange needs: the
/// local address, current transmit power, and the timestamp of the
/// last successful reception (used to decide whether a wake-up is
/// due). Owned by the Conversation Worker alongside the bridge handle.
pub struct ExchangeState {
    pub local_address: Address,
    pub tx_power: TxPower,
    pub last_reception: Option<Instant>,
    pub last_received_packet: Option<RadioPacket>,
}

impl ExchangeState {
    pub fn new(local_address: Address) -> Self {
        Self {
            local_address,
            tx_power: TxPower::default(),
            last_reception: None,
            last_received_packet: None,
        }
    }
}

/// Result of one Packet Exchange call: the accepted reply packet, plus
/// whether the outgoing packet's sequence was resynchronized mid-call
/// (the caller needs to know this to keep its own copy of the next
/// sequence in step).
pub struct ExchangeOutcome {
    pub reply: RadioPacket,
    pub resynced_sequence: Option<PacketSequence>,
}

/// Run one Packet Exchange: send `packet`, expecting a reply of type
/// `expected_type`, applying §4.1's full retry/resync/wake-up policy.
pub fn exchange(
    bridge: &mut dyn RadioBridge,
    clock: &dyn Clock,
    state: &mut ExchangeState,
    mut packet: RadioPacket,
    expected_type: PacketType,
    overall_timeout: Duration,
    params: ExchangeParams,
    config: &Config,
) -> Result<ExchangeOutcome> {
    let mut start_time: Option<Instant> = None;
    let original_sequence = packet.sequence;

    loop {
        if let Some(start) = start_time {
            if clock.now().duration_since(start) > overall_timeout {
                return Err(RadioError::ExchangeTimeout);
            }
        }

        maybe_wake_up(bridge, clock, state, params, config.wake_up_threshold)?;

        let result = bridge.send_and_receive_packet(&packet, params);
        if start_time.is_none() {
            start_time = Some(clock.now());
        }

        let received = match result {
            Ok(received) => received,
            Err(e) => {
                warn!("bridge error during exchange: {}", e);
                reconnect(bridge, clock, config.max_reconnect_attempts, config.reconnect_backoff)?;
                start_time = Some(clock.now());
                continue;
            }
        };

        let received = match received {
            None => {
                debug!("exchange: nothing returned, raising tx power and retrying");
                state.tx_power = bridge.tx_up(state.tx_power)?;
                clock.sleep(Duration::from_millis(params.retry_delay_ms));
                continue;
            }
            Some(received) => received,
        };

        if received.address != state.local_address {
            debug!(
                "exchange: address mismatch ({} != {}), treating as crosstalk",
                received.address, state.local_address
            );
            state.tx_power = bridge.tx_down(state.tx_power)?;
            clock.sleep(Duration::from_millis(params.retry_delay_ms));
            continue;
        }

        state.last_reception = Some(clock.now());

        let expected_sequence = packet.sequence.next();

        if received.packet_type != expected_type {
            if let Some(last) = &state.last_received_packet {
                if last.sequence.value() == received.sequence.value() {
                    debug!("exchange: pod repeated its last reply, raising tx power and retrying");
                    state.tx_power = bridge.tx_up(state.tx_power)?;
                    clock.sleep(Duration::from_millis(params.retry_delay_ms));
                    continue;
                }
            }

            state.last_received_packet = Some(received.clone());

            if packet.packet_type == PacketType::Pdm {
                let resynced = PacketSequence::new(received.sequence.value().wrapping_add(1) % PacketSequence::MODULUS);
                debug!(
                    "exchange: type mismatch during PDM send, resyncing sequence to {}",
                    resynced
                );
                packet = packet.with_sequence(resynced);
                clock.sleep(Duration::from_millis(params.retry_delay_ms));
                continue;
            }

            return Err(RadioError::ProtocolAbort(
                "Aborting message transmission".into(),
            ));
        }

        if received.sequence.value() != expected_sequence.value() {
            state.last_received_packet = Some(received.clone());

            if packet.packet_type == PacketType::Pdm {
                let resynced = PacketSequence::new(received.sequence.value().wrapping_add(1) % PacketSequence::MODULUS);
                debug!(
                    "exchange: sequence mismatch during PDM send, resyncing to {}",
                    resynced
                );
                packet = packet.with_sequence(resynced);
                clock.sleep(Duration::from_millis(params.retry_delay_ms));
                continue;
            }

            return Err(RadioError::ProtocolAbort(
                "Aborting message transmission".into(),
            ));
        }

        state.last_received_packet = Some(received.clone());
        let resynced_sequence = if packet.sequence.value() != original_sequence.value() {
            Some(packet.sequence)
        } else {
            None
        };
        return Ok(ExchangeOutcome {
            reply: received,
            resynced_sequence,
        });
    }
}

/// Issue a wake-up burst if the last reception is stale or unset,
/// updating the last-reception timestamp so subsequent packets in the
/// same conversation do not re-trigger it (§4.6).
fn maybe_wake_up(
    bridge: &mut dyn RadioBridge,
    clock: &dyn Clock,
    state: &mut ExchangeState,
    _params: ExchangeParams,
    wake_up_threshold: Duration,
) -> Result<()> {
    let stale = match state.last_reception {
        None => true,
        Some(last) => clock.now().duration_since(last) > wake_up_threshold,
    };

    if stale {
        debug!("exchange: last reception stale or unset, issuing wake-up burst");
        let wake = RadioPacket::wake_up(state.local_address, PacketSequence::new(0));
        bridge.send_packet(&wake, WAKE_UP_LISTEN)?;
        state.last_reception = Some(clock.now());
    }

    Ok(())
}
