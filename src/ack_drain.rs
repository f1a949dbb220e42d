/// ACK Drain — after a successful conversation, the worker keeps
/// retransmitting the closing ACK until the pod falls silent (or 25s
/// elapse), so the pod doesn't keep re-sending its last reply into a
/// conversation the PDM has already moved on from.
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::address::{Address, PacketSequence};
use crate::bridge::{reconnect, ExchangeParams, RadioBridge};
use crate::clock::Clock;
use crate::errors::Result;
use crate::packet::{PacketType, RadioPacket};

/// A plain 1s listen, with no retry or extra window — the silence
/// check the drain makes after its primary call returns nothing (§4.5),
/// distinct from the retried, 355ms-windowed `ExchangeParams::ACK_DRAIN`
/// used for the drain's main send/receive call.
const SILENCE_LISTEN: ExchangeParams = ExchangeParams {
    ack_timeout_ms: 0,
    listen_extra_ms: 0,
    total_timeout_ms: 1000,
    retry_count: 1,
    retry_delay_ms: 0,
};

/// Run the ACK drain loop (§4.5). Bridge errors are reconnected up to
/// `max_reconnect_attempts` times (with `reconnect_backoff` between
/// attempts); on reconnect failure the error propagates — the worker is
/// expected to log and swallow it, since the conversation already
/// succeeded. Returns the packet sequence the drain last settled on, so
/// the caller can carry it into the next conversation — the same counter
/// the pod and PDM keep in sync for the worker's whole lifetime (§3).
pub fn drain_acks(
    bridge: &mut dyn RadioBridge,
    clock: &dyn Clock,
    local_address: Address,
    mut ack: RadioPacket,
    cap: Duration,
    max_reconnect_attempts: u8,
    reconnect_backoff: Duration,
) -> Result<PacketSequence> {
    let mut start_time: Option<Instant> = None;
    let mut last_received: Option<RadioPacket> = None;

    loop {
        if let Some(start) = start_time {
            if clock.now().duration_since(start) > cap {
                warn!("ack drain: exceeded timeout while waiting for silence to fall");
                return Ok(ack.sequence);
            }
        }

        debug!("ack drain: sending ack {:?}", ack);
        let result = bridge.send_and_receive_packet(&ack, ExchangeParams::ACK_DRAIN);
        if start_time.is_none() {
            start_time = Some(clock.now());
        }

        let received = match result {
            Ok(received) => received,
            Err(e) => {
                warn!("ack drain: bridge error, reconnecting: {}", e);
                reconnect(bridge, clock, max_reconnect_attempts, reconnect_backoff)?;
                start_time = Some(clock.now());
                continue;
            }
        };

        let received = match received {
            None => {
                // one further 1s listen before declaring silence
                match bridge.get_packet(SILENCE_LISTEN)? {
                    None => {
                        debug!("ack drain: silence");
                        return Ok(ack.sequence);
                    }
                    Some(packet) => packet,
                }
            }
            Some(packet) => packet,
        };

        if received.address != local_address {
            debug!("ack drain: received packet for another address, lowering tx power");
            bridge.tx_down(crate::bridge::TxPower::default())?;
            continue;
        }

        if let Some(last) = &last_received {
            if last.packet_type == received.packet_type && last.sequence.value() == received.sequence.value() {
                debug!("ack drain: echo of previous pod packet, raising tx power");
                bridge.tx_up(crate::bridge::TxPower::default())?;
                continue;
            }
        }

        debug!("ack drain: new pod packet, resyncing and retrying");
        last_received = Some(received.clone());
        let resynced = PacketSequence::new(received.sequence.value().wrapping_add(1) % PacketSequence::MODULUS);
        ack = ack.with_sequence(resynced);
    }
}
