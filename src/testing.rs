/// Test-only support types, exported (not `#[cfg(test)]`-gated) so that
/// both this crate's `tests/` integration suite and downstream users
/// writing their own scenario tests can script a `RadioBridge` without
/// touching real hardware.
use std::collections::VecDeque;

use crate::bridge::{ExchangeParams, RadioBridge, TxPower};
use crate::errors::{RadioError, Result};
use crate::packet::RadioPacket;

/// One scripted outcome for a single bridge call.
#[derive(Debug, Clone)]
pub enum StubEvent {
    /// Return this packet as the reply
    Reply(RadioPacket),
    /// Return `Ok(None)` — nothing came back in time
    Nothing,
    /// Return a bridge-level error, as if the transport itself failed
    BridgeError(String),
}

/// A `RadioBridge` driven entirely by a pre-programmed script of
/// events, one per call to `send_and_receive_packet`/`get_packet`. Also
/// records every packet sent and every tx power change, so tests can
/// assert on the exchange's behavior (resync attempts, wake-up bursts,
/// tx_up/tx_down calls) as well as its final outcome.
pub struct StubRadioBridge {
    script: VecDeque<StubEvent>,
    pub sent: Vec<RadioPacket>,
    pub tx_power_history: Vec<TxPower>,
    pub connect_count: u32,
    pub disconnect_count: u32,
    /// Number of subsequent `connect()` calls that should still fail,
    /// decremented on each call — lets a test simulate reconnects that
    /// stay down for N attempts before (or without ever) succeeding.
    connect_failures: u32,
    connected: bool,
}

impl StubRadioBridge {
    pub fn new(script: Vec<StubEvent>) -> Self {
        Self {
            script: script.into(),
            sent: Vec::new(),
            tx_power_history: Vec::new(),
            connect_count: 0,
            disconnect_count: 0,
            connect_failures: 0,
            connected: false,
        }
    }

    /// Make the next `n` calls to `connect()` fail with a bridge error.
    pub fn with_connect_failures(mut self, n: u32) -> Self {
        self.connect_failures = n;
        self
    }

    fn next_event(&mut self) -> Result<Option<RadioPacket>> {
        match self.script.pop_front() {
            Some(StubEvent::Reply(packet)) => Ok(Some(packet)),
            Some(StubEvent::Nothing) => Ok(None),
            Some(StubEvent::BridgeError(msg)) => Err(RadioError::BridgeError(msg)),
            None => Ok(None),
        }
    }
}

impl RadioBridge for StubRadioBridge {
    fn connect(&mut self) -> Result<()> {
        self.connect_count += 1;
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(RadioError::BridgeError("stub connect failure".into()));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.disconnect_count += 1;
        self.connected = false;
        Ok(())
    }

    fn set_tx_power(&mut self, power: TxPower) -> Result<()> {
        self.tx_power_history.push(power);
        Ok(())
    }

    fn send_and_receive_packet(
        &mut self,
        packet: &RadioPacket,
        _params: ExchangeParams,
    ) -> Result<Option<RadioPacket>> {
        self.sent.push(packet.clone());
        self.next_event()
    }

    fn send_packet(&mut self, packet: &RadioPacket, _params: ExchangeParams) -> Result<()> {
        self.sent.push(packet.clone());
        Ok(())
    }

    fn get_packet(&mut self, _params: ExchangeParams) -> Result<Option<RadioPacket>> {
        self.next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, PacketSequence};
    use crate::packet::PacketType;

    #[test]
    fn test_stub_plays_back_script_in_order() {
        let reply = RadioPacket::new(Address(1), PacketType::Pod, PacketSequence::new(0), vec![]);
        let mut bridge = StubRadioBridge::new(vec![
            StubEvent::Nothing,
            StubEvent::Reply(reply.clone()),
        ]);

        let packet = RadioPacket::new(Address(1), PacketType::Pdm, PacketSequence::new(0), vec![]);
        assert!(bridge
            .send_and_receive_packet(&packet, ExchangeParams::MID_EXCHANGE)
            .unwrap()
            .is_none());
        assert_eq!(
            bridge
                .send_and_receive_packet(&packet, ExchangeParams::MID_EXCHANGE)
                .unwrap(),
            Some(reply)
        );
    }

    #[test]
    fn test_stub_records_sent_packets_and_tx_power_changes() {
        let mut bridge = StubRadioBridge::new(vec![]);
        let packet = RadioPacket::new(Address(1), PacketType::Pdm, PacketSequence::new(0), vec![]);
        bridge
            .send_and_receive_packet(&packet, ExchangeParams::MID_EXCHANGE)
            .unwrap();
        bridge.tx_up(TxPower::default()).unwrap();

        assert_eq!(bridge.sent.len(), 1);
        assert_eq!(bridge.tx_power_history, vec![TxPower::default().up()]);
    }
}
