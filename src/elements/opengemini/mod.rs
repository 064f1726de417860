//! openGemini output.
//!
//! - [`OpenGeminiSink`]: the `openGemini` stage
//! - [`OpenGeminiSettings`]: its configuration table
//! - [`WriteClientCreator`] / [`WriteClient`]: the client interface
//! - [`HttpWriteClient`]: buffered HTTP line-protocol client
//! - [`MemoryWriteClient`]: an in-process client

mod client;
mod memory;
mod settings;
mod sink;

pub use client::{
    HttpClientCreator, HttpClientStats, HttpWriteClient, WriteClient, WriteClientCreator,
};
pub use memory::{MemoryClientCreator, MemoryWriteClient};
pub use settings::{ClientSettings, OpenGeminiSettings, WriteErrorPolicy};
pub use sink::OpenGeminiSink;
