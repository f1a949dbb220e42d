/// The external transport boundary: a half-duplex radio bridge capable
/// of sending a packet and/or listening for one, tuned by a small set
/// of per-call exchange parameters (§6.1). Everything above this trait
/// — the exchange state machine, the conversation engine, the worker —
/// is transport-agnostic; a `SerialRadioBridge` is this crate's
/// concrete production adapter, talking to a USB radio dongle over a
/// serial port the way `timothyb89-sds011` talks to its sensor.
use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, warn};
use serialport::SerialPort;

use crate::clock::Clock;
use crate::errors::{RadioError, Result};
use crate::packet::{parse_wire_frame, RadioPacket};

/// Radio transmit power level, as adjusted by `tx_up`/`tx_down` in the
/// Packet Exchange state machine (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TxPower(pub u8);

impl TxPower {
    pub const MIN: TxPower = TxPower(0);
    pub const MAX: TxPower = TxPower(7);
    pub const DEFAULT: TxPower = TxPower(3);

    pub fn up(self) -> Self {
        TxPower((self.0 + 1).min(Self::MAX.0))
    }

    pub fn down(self) -> Self {
        TxPower(self.0.saturating_sub(1))
    }
}

impl Default for TxPower {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Per-call tuning for one bridge exchange: how long to wait for a
/// reply, how many times to retry locally, and the inter-attempt delay.
/// §6.1 names the two canonical parameter sets this crate uses: one for
/// mid-conversation fragment exchanges, one for the final ACK drain.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeParams {
    /// Milliseconds to wait for a single reply before giving up on it
    pub ack_timeout_ms: u64,
    /// Milliseconds of extra listen-after-send window
    pub listen_extra_ms: u64,
    /// Total milliseconds budgeted for this bridge call, across retries
    pub total_timeout_ms: u64,
    /// Number of local retry attempts the bridge itself may make
    pub retry_count: u8,
    /// Milliseconds between local retry attempts
    pub retry_delay_ms: u64,
}

impl ExchangeParams {
    /// Mid-conversation fragment exchange: `(data, 0, 0, 100, 1, 130)`
    pub const MID_EXCHANGE: ExchangeParams = ExchangeParams {
        ack_timeout_ms: 0,
        listen_extra_ms: 0,
        total_timeout_ms: 100,
        retry_count: 1,
        retry_delay_ms: 130,
    };

    /// Final ACK drain: `(data, 5, 55, 300, 2, 40)`
    pub const ACK_DRAIN: ExchangeParams = ExchangeParams {
        ack_timeout_ms: 5,
        listen_extra_ms: 55,
        total_timeout_ms: 300,
        retry_count: 2,
        retry_delay_ms: 40,
    };
}

/// The transport boundary the Packet Exchange state machine drives.
pub trait RadioBridge: Send {
    /// Open the underlying transport and perform any bridge-specific
    /// handshake. Called on worker startup and on reconnect-after-error.
    fn connect(&mut self) -> Result<()>;

    /// Close the underlying transport
    fn disconnect(&mut self) -> Result<()>;

    /// Adjust the radio's transmit power
    fn set_tx_power(&mut self, power: TxPower) -> Result<()>;

    fn tx_up(&mut self, power: TxPower) -> Result<TxPower> {
        let next = power.up();
        self.set_tx_power(next)?;
        Ok(next)
    }

    fn tx_down(&mut self, power: TxPower) -> Result<TxPower> {
        let next = power.down();
        self.set_tx_power(next)?;
        Ok(next)
    }

    /// Send one packet and listen for exactly one reply, per `params`.
    /// Returns `Ok(None)` if the listen window elapsed with nothing
    /// received — a normal, expected outcome the exchange state machine
    /// treats as "nothing came back", not an error.
    fn send_and_receive_packet(
        &mut self,
        packet: &RadioPacket,
        params: ExchangeParams,
    ) -> Result<Option<RadioPacket>>;

    /// Send one packet without waiting for a reply (used by the ACK
    /// drain and by wake-up bursts).
    fn send_packet(&mut self, packet: &RadioPacket, params: ExchangeParams) -> Result<()>;

    /// Listen for one packet without sending anything first.
    fn get_packet(&mut self, params: ExchangeParams) -> Result<Option<RadioPacket>>;
}

/// Recover from a single bridge-error event by retrying `connect()` itself
/// up to `max_attempts` times, backing off `backoff` between attempts
/// (§4.1 step 11 / §7: "Reconnect up to 3×; on failure propagate"). Returns
/// once a reconnect succeeds, or the last error once attempts are
/// exhausted.
pub fn reconnect(
    bridge: &mut dyn RadioBridge,
    clock: &dyn Clock,
    max_attempts: u8,
    backoff: Duration,
) -> Result<()> {
    let mut last_err = RadioError::BridgeError("no reconnect attempts made".into());

    for attempt in 1..=max_attempts {
        match bridge.connect() {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("reconnect attempt {}/{} failed: {}", attempt, max_attempts, e);
                last_err = e;
                if attempt < max_attempts {
                    clock.sleep(backoff);
                }
            }
        }
    }

    Err(RadioError::ReconnectFailed(last_err.to_string()))
}

/// Production `RadioBridge` backed by a USB serial radio dongle.
pub struct SerialRadioBridge {
    port_name: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
    tx_power: TxPower,
}

impl SerialRadioBridge {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            port: None,
            tx_power: TxPower::default(),
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| RadioError::BridgeError("serial port not connected".into()))
    }

    fn read_one_frame(&mut self, timeout: Duration) -> Result<Option<RadioPacket>> {
        let port = self.port_mut()?;
        port.set_timeout(timeout)
            .map_err(|e| RadioError::BridgeError(e.to_string()))?;

        let mut header = [0u8; 2];
        match port.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
            Err(e) => return Err(RadioError::from(e)),
        }

        let mut rest = Vec::new();
        port.read_to_end(&mut rest).ok();

        let mut frame = header.to_vec();
        frame.extend_from_slice(&rest);
        match parse_wire_frame(&frame) {
            Ok((packet, rssi)) => {
                debug!("received packet {:?} at rssi {}", packet, rssi);
                Ok(Some(packet))
            }
            Err(e) => {
                warn!("failed to parse inbound frame: {}", e);
                Err(e)
            }
        }
    }
}

impl RadioBridge for SerialRadioBridge {
    fn connect(&mut self) -> Result<()> {
        debug!("opening serial port {} at {} baud", self.port_name, self.baud_rate);
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| RadioError::BridgeError(e.to_string()))?;
        self.port = Some(port);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.port = None;
        Ok(())
    }

    fn set_tx_power(&mut self, power: TxPower) -> Result<()> {
        debug!("setting tx power to {}", power.0);
        let port = self.port_mut()?;
        port.write_all(&[0xF0, power.0])?;
        self.tx_power = power;
        Ok(())
    }

    fn send_and_receive_packet(
        &mut self,
        packet: &RadioPacket,
        params: ExchangeParams,
    ) -> Result<Option<RadioPacket>> {
        self.port_mut()?.write_all(&packet.encode())?;
        let window = Duration::from_millis(params.total_timeout_ms + params.listen_extra_ms);
        self.read_one_frame(window)
    }

    fn send_packet(&mut self, packet: &RadioPacket, _params: ExchangeParams) -> Result<()> {
        self.port_mut()?.write_all(&packet.encode())?;
        Ok(())
    }

    fn get_packet(&mut self, params: ExchangeParams) -> Result<Option<RadioPacket>> {
        let window = Duration::from_millis(params.total_timeout_ms + params.listen_extra_ms);
        self.read_one_frame(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_power_up_saturates_at_max() {
        assert_eq!(TxPower::MAX.up(), TxPower::MAX);
    }

    #[test]
    fn test_tx_power_down_saturates_at_min() {
        assert_eq!(TxPower::MIN.down(), TxPower::MIN);
    }

    #[test]
    fn test_tx_power_up_down_round_trip() {
        let power = TxPower(4);
        assert_eq!(power.up().down(), power);
    }
}
