//! Kafka consumer-group source.
//!
//! - [`KafkaSource`]: the `kafka_consumer` stage
//! - [`KafkaSettings`]: its configuration table
//! - [`ConsumerGroupCreator`] / [`ConsumerGroup`] / [`MessageHandler`]: the
//!   client interface the source drives
//! - [`MemoryConsumerGroup`]: an in-process client
//!
//! # Example
//!
//! ```rust,ignore
//! use forwarder::elements::kafka::{KafkaSource, MemoryConsumerCreator, MemoryConsumerGroup};
//! use forwarder::plugin::PluginRegistry;
//!
//! let group = MemoryConsumerGroup::new();
//! let mut registry = PluginRegistry::with_builtins();
//! registry.register_source(
//!     KafkaSource::NAME,
//!     KafkaSource::factory(MemoryConsumerCreator::new(group.clone())),
//! );
//!
//! group.produce("metrics", "cpu,host=a usage=0.5");
//! ```

mod consumer;
mod handler;
mod memory;
mod settings;
mod source;

pub use consumer::{ConsumerGroup, ConsumerGroupCreator, FeedMessage, MessageHandler};
pub use handler::ConsumerHandler;
pub use memory::{Commit, MemoryConsumerCreator, MemoryConsumerGroup};
pub use settings::{
    BalanceStrategy, ConnectionStrategy, ConsumerConfig, InitialOffset, KafkaSettings,
    ResolvedSettings,
};
pub use source::KafkaSource;
