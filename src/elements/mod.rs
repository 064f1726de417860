//! Built-in pipeline elements.
//!
//! ## Sources
//! - [`KafkaSource`]: consumes a Kafka consumer group (`kafka_consumer`)
//!
//! ## Transforms
//! - [`PassThrough`]: forwards records unchanged (`transparent`)
//! - [`LineProtocolParser`]: drops records that are not valid line
//!   protocol (`line_protocol`)
//!
//! ## Sinks
//! - [`OpenGeminiSink`]: writes line protocol to openGemini (`openGemini`)

pub mod kafka;
pub mod line_protocol;
pub mod opengemini;
mod passthrough;

pub use kafka::KafkaSource;
pub use line_protocol::LineProtocolParser;
pub use opengemini::OpenGeminiSink;
pub use passthrough::PassThrough;
