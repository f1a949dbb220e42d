/// Tunable timing parameters for the conversation engine, assembled
/// with a fluent builder in the same shape as a transmitter/receiver
/// configuration builder.
use std::time::Duration;

/// Tunables governing the Packet Exchange, ACK drain, and wake-up
/// logic.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Overall timeout for a single packet exchange (§4.1, default 10s)
    pub exchange_timeout: Duration,
    /// Overall timeout for the post-conversation ACK drain (§4.5, default 25s)
    pub ack_drain_timeout: Duration,
    /// How stale the last-reception timestamp must be before a wake-up
    /// burst is issued (§4.6, default 3000s)
    pub wake_up_threshold: Duration,
    /// How long the worker idles before disconnecting the bridge
    pub idle_disconnect_timeout: Duration,
    /// Delay between radio bridge initialization attempts
    pub init_retry_backoff: Duration,
    /// Number of reconnect attempts the Packet Exchange makes on a
    /// bridge error before giving up (§4.1)
    pub max_reconnect_attempts: u8,
    /// Delay between successive reconnect attempts within one bridge-error
    /// recovery (distinct from `init_retry_backoff`, which only applies to
    /// worker startup)
    pub reconnect_backoff: Duration,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange_timeout: Duration::from_secs(10),
            ack_drain_timeout: Duration::from_secs(25),
            wake_up_threshold: Duration::from_secs(3000),
            idle_disconnect_timeout: Duration::from_secs(10),
            init_retry_backoff: Duration::from_secs(5),
            max_reconnect_attempts: 3,
            reconnect_backoff: Duration::from_secs(2),
        }
    }
}

/// Fluent builder for `Config`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: ConfigOverrides,
}

#[derive(Debug, Clone, Default)]
struct ConfigOverrides {
    exchange_timeout: Option<Duration>,
    ack_drain_timeout: Option<Duration>,
    wake_up_threshold: Option<Duration>,
    idle_disconnect_timeout: Option<Duration>,
    init_retry_backoff: Option<Duration>,
    max_reconnect_attempts: Option<u8>,
    reconnect_backoff: Option<Duration>,
}

impl ConfigBuilder {
    pub fn exchange_timeout(mut self, value: Duration) -> Self {
        self.config.exchange_timeout = Some(value);
        self
    }

    pub fn ack_drain_timeout(mut self, value: Duration) -> Self {
        self.config.ack_drain_timeout = Some(value);
        self
    }

    pub fn wake_up_threshold(mut self, value: Duration) -> Self {
        self.config.wake_up_threshold = Some(value);
        self
    }

    pub fn idle_disconnect_timeout(mut self, value: Duration) -> Self {
        self.config.idle_disconnect_timeout = Some(value);
        self
    }

    pub fn init_retry_backoff(mut self, value: Duration) -> Self {
        self.config.init_retry_backoff = Some(value);
        self
    }

    pub fn max_reconnect_attempts(mut self, value: u8) -> Self {
        self.config.max_reconnect_attempts = Some(value);
        self
    }

    pub fn reconnect_backoff(mut self, value: Duration) -> Self {
        self.config.reconnect_backoff = Some(value);
        self
    }

    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            exchange_timeout: self.config.exchange_timeout.unwrap_or(defaults.exchange_timeout),
            ack_drain_timeout: self.config.ack_drain_timeout.unwrap_or(defaults.ack_drain_timeout),
            wake_up_threshold: self.config.wake_up_threshold.unwrap_or(defaults.wake_up_threshold),
            idle_disconnect_timeout: self
                .config
                .idle_disconnect_timeout
                .unwrap_or(defaults.idle_disconnect_timeout),
            init_retry_backoff: self.config.init_retry_backoff.unwrap_or(defaults.init_retry_backoff),
            max_reconnect_attempts: self
                .config
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            reconnect_backoff: self.config.reconnect_backoff.unwrap_or(defaults.reconnect_backoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_spec_values() {
        let config = Config::default();
        assert_eq!(config.exchange_timeout, Duration::from_secs(10));
        assert_eq!(config.ack_drain_timeout, Duration::from_secs(25));
        assert_eq!(config.wake_up_threshold, Duration::from_secs(3000));
    }

    #[test]
    fn test_builder_overrides_only_requested_fields() {
        let config = Config::builder()
            .exchange_timeout(Duration::from_secs(1))
            .build();
        assert_eq!(config.exchange_timeout, Duration::from_secs(1));
        assert_eq!(config.ack_drain_timeout, Duration::from_secs(25));
    }
}
