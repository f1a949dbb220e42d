/// Conversation Worker — the long-lived thread that owns the radio
/// bridge exclusively, accepts one conversation request at a time, and
/// drives it through Packet Exchange, the Conversation Engine, and the
/// ACK drain. Callers interact only through `PdmRadio`'s public
/// methods; the three synchronization flags described in §4.4 are
/// implemented here as one-shot latches (`Flag`), in place of whatever
/// condition-variable idiom a caller's own language would reach for.
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, warn};

use crate::address::{Address, MessageSequence, PacketSequence};
use crate::ack_drain::drain_acks;
use crate::bridge::{RadioBridge, TxPower};
use crate::clock::Clock;
use crate::config::Config;
use crate::engine::{ConversationEngine, ConversationRequest};
use crate::errors::Result;
use crate::exchange::ExchangeState;
use crate::message::LogicalMessage;

/// A one-shot latch: set by one side, waited on by the other, cleared
/// to arm it again. Stands in for the `threading.Event` idiom a
/// dynamic-language original would use for cross-thread handoff.
#[derive(Default)]
pub struct Flag {
    state: Mutex<bool>,
    condvar: Condvar,
}

impl Flag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut guard = self.state.lock().unwrap();
        *guard = true;
        self.condvar.notify_all();
    }

    pub fn clear(&self) {
        let mut guard = self.state.lock().unwrap();
        *guard = false;
    }

    pub fn wait(&self) {
        let mut guard = self.state.lock().unwrap();
        while !*guard {
            guard = self.condvar.wait(guard).unwrap();
        }
    }

    /// Wait up to `timeout`, returning whether the flag became set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.state.lock().unwrap();
        if *guard {
            return true;
        }
        let (guard, _) = self.condvar.wait_timeout(guard, timeout).unwrap();
        *guard
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock().unwrap()
    }
}

/// Fields the caller writes before setting `request_arrived`, and the
/// worker reads once it picks the request up.
struct PendingRequest {
    message: LogicalMessage,
    message_address: Address,
    ack_address_override: Option<Address>,
    tx_power: Option<TxPower>,
    double_take: bool,
}

struct Shared {
    radio_ready: Flag,
    request_arrived: Flag,
    response_received: Flag,
    shutdown: Flag,
    disconnect_requested: Flag,
    request: Mutex<Option<PendingRequest>>,
    response: Mutex<Option<Result<LogicalMessage>>>,
}

/// The logical control interface (§6.3): a caller posts one request at
/// a time and blocks until the worker publishes a response or error.
pub struct PdmRadio {
    local_address: Address,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl PdmRadio {
    /// Spawn the worker thread, which immediately begins the
    /// `Initializing` state.
    pub fn spawn(
        local_address: Address,
        message_sequence: MessageSequence,
        packet_sequence: PacketSequence,
        bridge: Box<dyn RadioBridge>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        let shared = Arc::new(Shared {
            radio_ready: Flag::new(),
            request_arrived: Flag::new(),
            response_received: Flag::new(),
            shutdown: Flag::new(),
            disconnect_requested: Flag::new(),
            request: Mutex::new(None),
            response: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            run_worker(worker_shared, local_address, message_sequence, packet_sequence, bridge, clock, config);
        });

        Self {
            local_address,
            shared,
            handle: Some(handle),
        }
    }

    /// Block until the worker is ready, submit one conversation, and
    /// block until its response or error is available.
    pub fn send_message_get_message(
        &self,
        message: LogicalMessage,
        message_address: Option<Address>,
        ack_address_override: Option<Address>,
        tx_power: Option<TxPower>,
        double_take: bool,
    ) -> Result<LogicalMessage> {
        self.shared.radio_ready.wait();
        self.shared.radio_ready.clear();

        let destination = message_address.unwrap_or(self.local_address);
        *self.shared.request.lock().unwrap() = Some(PendingRequest {
            message,
            message_address: destination,
            ack_address_override,
            tx_power,
            double_take,
        });

        self.shared.request_arrived.set();

        self.shared.response_received.wait();
        self.shared.response_received.clear();

        self.shared
            .response
            .lock()
            .unwrap()
            .take()
            .expect("worker always publishes a response before signaling response_received")
    }

    /// Best-effort release of the bridge (§6.3): asks the worker to drop
    /// its connection next time it is idle, without waiting for it to
    /// take effect. Does not claim `radio_ready` — unlike a conversation,
    /// this is a fire-and-forget request, matching the original's
    /// `disconnect(ignore_errors=True)`.
    pub fn disconnect(&self) {
        self.shared.disconnect_requested.set();
        self.shared.request_arrived.set();
    }

    /// Request shutdown and join the worker thread.
    pub fn stop(&mut self) {
        self.shared.radio_ready.wait();
        self.shared.radio_ready.clear();
        self.shared.shutdown.set();
        self.shared.request_arrived.set();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn run_worker(
    shared: Arc<Shared>,
    local_address: Address,
    message_sequence: MessageSequence,
    packet_sequence: PacketSequence,
    mut bridge: Box<dyn RadioBridge>,
    clock: Arc<dyn Clock>,
    config: Config,
) {
    loop {
        match bridge.connect() {
            Ok(()) => break,
            Err(e) => {
                warn!("worker: radio initialization failed, retrying: {}", e);
                clock.sleep(config.init_retry_backoff);
            }
        }
    }

    shared.radio_ready.set();

    let mut engine = ConversationEngine::new(local_address, packet_sequence, message_sequence);
    let mut exchange_state = ExchangeState::new(local_address);

    loop {
        if !shared.request_arrived.wait_timeout(config.idle_disconnect_timeout) {
            debug!("worker: idle timeout, releasing bridge");
            bridge.disconnect().ok();
            continue;
        }
        shared.request_arrived.clear();

        if shared.shutdown.is_set() {
            break;
        }

        // A real request always lands in `request` before `request_arrived`
        // is set, so its presence (not flag ordering) is what distinguishes
        // a genuine conversation request from a bare `disconnect()` wakeup —
        // the two can otherwise race if a caller disconnects and immediately
        // posts a new request.
        let pending = match shared.request.lock().unwrap().take() {
            Some(pending) => pending,
            None => {
                if shared.disconnect_requested.is_set() {
                    shared.disconnect_requested.clear();
                    debug!("worker: caller requested disconnect");
                    bridge.disconnect().ok();
                }
                continue;
            }
        };

        let request = ConversationRequest {
            message: pending.message,
            message_address: pending.message_address,
            ack_address_override: pending.ack_address_override,
            tx_power: pending.tx_power,
            double_take: pending.double_take,
        };

        let outcome = engine.send_and_get(
            bridge.as_mut(),
            clock.as_ref(),
            &mut exchange_state,
            &request,
            &config,
        );

        match outcome {
            Ok(response) => {
                let ack = engine.final_ack(request.ack_address_override, engine.packet_sequence);
                engine.packet_sequence = engine.packet_sequence.next();

                *shared.response.lock().unwrap() = Some(Ok(response));
                shared.response_received.set();

                match drain_acks(
                    bridge.as_mut(),
                    clock.as_ref(),
                    local_address,
                    ack,
                    config.ack_drain_timeout,
                    config.max_reconnect_attempts,
                    config.reconnect_backoff,
                ) {
                    Ok(drained_sequence) => engine.packet_sequence = drained_sequence,
                    Err(e) => error!("worker: error during ack drain, ignored: {}", e),
                }
                debug!("worker: conversation ended");
            }
            Err(e) => {
                *shared.response.lock().unwrap() = Some(Err(e));
                shared.response_received.set();
            }
        }

        shared.radio_ready.set();
    }
}

impl Drop for PdmRadio {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::testing::{StubEvent, StubRadioBridge};

    fn local() -> Address {
        Address(0x1000_0000)
    }

    fn pod() -> Address {
        Address(0x2000_0000)
    }

    fn first_fragment_header(total_len: u16, extra: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8; 7];
        body[1..5].copy_from_slice(&pod().0.to_be_bytes());
        body[5..7].copy_from_slice(&total_len.to_be_bytes());
        body.extend_from_slice(extra);
        body
    }

    #[test]
    fn test_end_to_end_single_packet_conversation() {
        use crate::packet::{PacketType, RadioPacket};

        let pod_reply = RadioPacket::new(
            local(),
            PacketType::Pod,
            PacketSequence::new(1),
            first_fragment_header(2, &[7, 7]),
        );
        // final ack drain: silence after two empty listens
        let bridge = StubRadioBridge::new(vec![
            StubEvent::Reply(pod_reply),
            StubEvent::Nothing,
            StubEvent::Nothing,
        ]);

        let mut config = Config::default();
        config.idle_disconnect_timeout = Duration::from_secs(30);

        let mut radio = PdmRadio::spawn(
            local(),
            MessageSequence::new(0),
            PacketSequence::new(0),
            Box::new(bridge),
            Arc::new(SystemClock),
            config,
        );

        let message = LogicalMessage::new(MessageSequence::new(0), pod(), vec![1, 2]);
        let response = radio
            .send_message_get_message(message, Some(pod()), None, None, false)
            .unwrap();

        assert_eq!(response.body, vec![7, 7]);
        radio.stop();
    }

    #[test]
    fn test_conversation_error_is_surfaced_to_caller() {
        let bridge = StubRadioBridge::new(vec![]);
        let mut config = Config::default();
        config.idle_disconnect_timeout = Duration::from_secs(30);
        config.exchange_timeout = Duration::from_millis(50);

        let mut radio = PdmRadio::spawn(
            local(),
            MessageSequence::new(0),
            PacketSequence::new(0),
            Box::new(bridge),
            Arc::new(SystemClock),
            config,
        );

        let message = LogicalMessage::new(MessageSequence::new(0), pod(), vec![1]);
        let result = radio.send_message_get_message(message, Some(pod()), None, None, false);
        assert!(result.is_err());
        radio.stop();
    }

    #[test]
    fn test_disconnect_is_best_effort_and_does_not_block_next_conversation() {
        use crate::packet::{PacketType, RadioPacket};

        let pod_reply = RadioPacket::new(local(), PacketType::Pod, PacketSequence::new(1), first_fragment_header(2, &[3, 3]));
        let bridge = StubRadioBridge::new(vec![
            StubEvent::Reply(pod_reply),
            StubEvent::Nothing,
            StubEvent::Nothing,
        ]);

        let mut config = Config::default();
        config.idle_disconnect_timeout = Duration::from_secs(30);

        let mut radio = PdmRadio::spawn(
            local(),
            MessageSequence::new(0),
            PacketSequence::new(0),
            Box::new(bridge),
            Arc::new(SystemClock),
            config,
        );

        // calling disconnect() right away, possibly racing the worker's own
        // startup, must not swallow the conversation request posted next.
        radio.disconnect();

        let message = LogicalMessage::new(MessageSequence::new(0), pod(), vec![1, 2]);
        let response = radio
            .send_message_get_message(message, Some(pod()), None, None, false)
            .unwrap();

        assert_eq!(response.body, vec![3, 3]);
        radio.stop();
    }
}
