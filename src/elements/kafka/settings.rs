//! Kafka consumer settings.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

pub(crate) const DEFAULT_CONSUMER_GROUP: &str = "telegraf_metrics_consumers";
pub(crate) const DEFAULT_MAX_UNDELIVERED_MESSAGES: usize = 1000;
pub(crate) const DEFAULT_MAX_PROCESSING_TIME: Duration = Duration::from_millis(100);
pub(crate) const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Settings of the `kafka_consumer` plugin as written in the configuration.
///
/// Zero or empty values fall back to the defaults when resolved.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KafkaSettings {
    /// Broker addresses, `host:port`.
    pub brokers: Vec<String>,
    /// Consumer group id.
    pub consumer_group: String,
    /// Topics to subscribe to.
    pub topics: Vec<String>,
    /// Largest accepted payload in bytes; 0 accepts any size.
    pub max_message_len: usize,
    /// Bound on records handed downstream but not yet acknowledged.
    pub max_undelivered_messages: usize,
    /// Broker-side processing time budget per message.
    pub max_processing_time_ms: u64,
    /// Where a group without committed offsets starts: `oldest` or `newest`.
    pub offset: String,
    /// Partition assignment: `range`, `roundrobin` or `sticky`.
    pub balance_strategy: String,
    /// Default fetch size in bytes; 0 keeps the client default.
    pub consumer_fetch_default: u32,
    /// `startup` connects in `start()`, `defer` connects in the background.
    pub connection_strategy: String,
    /// Wait between failed consume attempts.
    pub reconnect_delay_ms: u64,
}

/// Where to start consuming when the group has no committed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialOffset {
    /// Earliest retained message.
    #[default]
    Oldest,
    /// Only messages produced after joining.
    Newest,
}

/// Partition assignment strategy of the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceStrategy {
    /// Contiguous partition ranges per member.
    #[default]
    Range,
    /// Partitions dealt round-robin.
    RoundRobin,
    /// Round-robin that keeps previous assignments where possible.
    Sticky,
}

/// When the source connects to the brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStrategy {
    /// Connect during `start()`; failure aborts the start.
    #[default]
    Startup,
    /// Connect in the background, retrying until it succeeds.
    Defer,
}

/// Client options handed to a [`ConsumerGroupCreator`](super::ConsumerGroupCreator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Start position for new groups.
    pub initial_offset: InitialOffset,
    /// Partition assignment strategy.
    pub balance_strategy: BalanceStrategy,
    /// Processing time budget per message.
    pub max_processing_time: Duration,
    /// Default fetch size, if overridden.
    pub fetch_default: Option<u32>,
}

/// Settings after defaults and validation.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    /// Broker addresses.
    pub brokers: Vec<String>,
    /// Consumer group id.
    pub group: String,
    /// Subscribed topics.
    pub topics: Vec<String>,
    /// Largest accepted payload; 0 accepts any size.
    pub max_message_len: usize,
    /// Bound on unacknowledged records in flight.
    pub max_undelivered_messages: usize,
    /// When to connect.
    pub connection_strategy: ConnectionStrategy,
    /// Wait between failed consume attempts.
    pub reconnect_delay: Duration,
    /// Client options.
    pub consumer: ConsumerConfig,
}

impl KafkaSettings {
    /// Apply defaults and check every setting.
    pub fn resolve(&self) -> Result<ResolvedSettings> {
        if self.brokers.is_empty() {
            return Err(config_error("no brokers configured"));
        }
        for broker in &self.brokers {
            validate_broker(broker)?;
        }
        if self.topics.is_empty() || self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err(config_error("topics must be a non-empty list of names"));
        }

        let initial_offset = match self.offset.to_lowercase().as_str() {
            "oldest" | "" => InitialOffset::Oldest,
            "newest" => InitialOffset::Newest,
            _ => return Err(config_error(format!("invalid offset {:?}", self.offset))),
        };

        let balance_strategy = match self.balance_strategy.to_lowercase().as_str() {
            "range" | "" => BalanceStrategy::Range,
            "roundrobin" => BalanceStrategy::RoundRobin,
            "sticky" => BalanceStrategy::Sticky,
            _ => {
                return Err(config_error(format!(
                    "invalid balance strategy {:?}",
                    self.balance_strategy
                )));
            }
        };

        let connection_strategy = match self.connection_strategy.to_lowercase().as_str() {
            "startup" | "" => ConnectionStrategy::Startup,
            "defer" => ConnectionStrategy::Defer,
            _ => {
                return Err(config_error(format!(
                    "invalid connection strategy {:?}",
                    self.connection_strategy
                )));
            }
        };

        Ok(ResolvedSettings {
            brokers: self.brokers.clone(),
            group: non_empty_or(&self.consumer_group, DEFAULT_CONSUMER_GROUP),
            topics: self.topics.clone(),
            max_message_len: self.max_message_len,
            max_undelivered_messages: match self.max_undelivered_messages {
                0 => DEFAULT_MAX_UNDELIVERED_MESSAGES,
                n => n,
            },
            connection_strategy,
            reconnect_delay: match self.reconnect_delay_ms {
                0 => DEFAULT_RECONNECT_DELAY,
                ms => Duration::from_millis(ms),
            },
            consumer: ConsumerConfig {
                initial_offset,
                balance_strategy,
                max_processing_time: match self.max_processing_time_ms {
                    0 => DEFAULT_MAX_PROCESSING_TIME,
                    ms => Duration::from_millis(ms),
                },
                fetch_default: (self.consumer_fetch_default != 0)
                    .then_some(self.consumer_fetch_default),
            },
        })
    }
}

fn validate_broker(broker: &str) -> Result<()> {
    let valid = broker
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.trim().is_empty() && port.parse::<u16>().is_ok_and(|p| p > 0));
    if valid {
        Ok(())
    } else {
        Err(config_error(format!("invalid broker address {broker:?}, expected host:port")))
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn config_error(msg: impl std::fmt::Display) -> Error {
    Error::Configuration(format!("kafka_consumer: {msg}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> KafkaSettings {
        KafkaSettings {
            brokers: vec!["localhost:9092".into()],
            topics: vec!["metrics".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let resolved = settings().resolve().unwrap();

        assert_eq!(resolved.group, "telegraf_metrics_consumers");
        assert_eq!(resolved.max_undelivered_messages, 1000);
        assert_eq!(resolved.max_message_len, 0);
        assert_eq!(resolved.reconnect_delay, Duration::from_secs(5));
        assert_eq!(resolved.connection_strategy, ConnectionStrategy::Startup);
        assert_eq!(
            resolved.consumer,
            ConsumerConfig {
                initial_offset: InitialOffset::Oldest,
                balance_strategy: BalanceStrategy::Range,
                max_processing_time: Duration::from_millis(100),
                fetch_default: None,
            }
        );
    }

    #[test]
    fn test_explicit_values_case_insensitive() {
        let resolved = KafkaSettings {
            consumer_group: "forwarders".into(),
            offset: "Newest".into(),
            balance_strategy: "STICKY".into(),
            connection_strategy: "defer".into(),
            consumer_fetch_default: 1 << 20,
            reconnect_delay_ms: 250,
            ..settings()
        }
        .resolve()
        .unwrap();

        assert_eq!(resolved.group, "forwarders");
        assert_eq!(resolved.consumer.initial_offset, InitialOffset::Newest);
        assert_eq!(resolved.consumer.balance_strategy, BalanceStrategy::Sticky);
        assert_eq!(resolved.consumer.fetch_default, Some(1 << 20));
        assert_eq!(resolved.connection_strategy, ConnectionStrategy::Defer);
        assert_eq!(resolved.reconnect_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            KafkaSettings { offset: "latest".into(), ..settings() },
            KafkaSettings { balance_strategy: "random".into(), ..settings() },
            KafkaSettings { connection_strategy: "lazy".into(), ..settings() },
            KafkaSettings { brokers: vec!["localhost".into()], ..settings() },
            KafkaSettings { brokers: vec![":9092".into()], ..settings() },
            KafkaSettings { brokers: vec!["kafka:0".into()], ..settings() },
            KafkaSettings { brokers: vec![], ..settings() },
            KafkaSettings { topics: vec![], ..settings() },
        ];

        for case in cases {
            let err = case.resolve().unwrap_err();
            assert!(err.is_configuration(), "{case:?} should be rejected");
        }
    }
}
