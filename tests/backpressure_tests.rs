//! Integration tests for backpressure and flow control.
//!
//! These tests verify that:
//! - Edges never hold more than their capacity
//! - The source stops taking messages at `max_undelivered_messages`
//! - A stalled pipeline still stops promptly

use async_trait::async_trait;
use forwarder::config::Config;
use forwarder::element::{Sink, StageContext, TaskGroup};
use forwarder::elements::kafka::{KafkaSource, MemoryConsumerCreator, MemoryConsumerGroup};
use forwarder::error::Result;
use forwarder::link::EdgeReceiver;
use forwarder::memory::RecordPool;
use forwarder::observability::span_stage;
use forwarder::pipeline::Pipeline;
use forwarder::plugin::PluginRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// A sink that takes one gate permit per record before acknowledging it.
struct GatedSink {
    gate: Arc<Semaphore>,
    written: Arc<AtomicUsize>,
    pool: Arc<RecordPool>,
    tasks: TaskGroup,
}

#[async_trait]
impl Sink for GatedSink {
    fn name(&self) -> &str {
        "gated"
    }

    async fn start(&mut self, input: EdgeReceiver) -> Result<()> {
        let cancel = self.tasks.token();
        let gate = self.gate.clone();
        let written = self.written.clone();
        let pool = self.pool.clone();

        self.tasks.spawn(async move {
            while let Ok(Some(mut record)) = input.recv_or_cancel(&cancel).await {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    permit = gate.acquire() => match permit {
                        Ok(permit) => permit.forget(),
                        Err(_) => break,
                    },
                }
                record.acknowledge();
                written.fetch_add(1, Ordering::SeqCst);
                pool.release(record);
            }
        })
    }

    async fn stop(&mut self) -> Result<()> {
        self.tasks.shutdown().await
    }
}

struct Setup {
    group: Arc<MemoryConsumerGroup>,
    gate: Arc<Semaphore>,
    written: Arc<AtomicUsize>,
    pipeline: Pipeline,
}

fn setup(edge_capacity: usize, max_undelivered: usize) -> Setup {
    let group = MemoryConsumerGroup::new();
    let gate = Arc::new(Semaphore::new(0));
    let written = Arc::new(AtomicUsize::new(0));

    let mut registry = PluginRegistry::with_builtins();
    registry.register_source(
        KafkaSource::NAME,
        KafkaSource::factory(MemoryConsumerCreator::new(group.clone())),
    );
    {
        let gate = gate.clone();
        let written = written.clone();
        registry.register_sink("gated", move |_: &toml::Table, ctx: &StageContext| {
            Ok(Box::new(GatedSink {
                gate: gate.clone(),
                written: written.clone(),
                pool: ctx.pool().clone(),
                tasks: TaskGroup::new("gated", span_stage(ctx.pipeline(), "gated", "sink")),
            }) as Box<dyn Sink>)
        });
    }

    let config = Config::from_toml_str(&format!(
        r#"
        [pipeline]
        edge_capacity = {edge_capacity}

        [[inputs.kafka_consumer]]
        brokers = ["localhost:9092"]
        topics = ["telegraf"]
        max_undelivered_messages = {max_undelivered}

        [[parsers.transparent]]

        [[outputs.gated]]
        "#
    ))
    .unwrap();
    let pipeline = Pipeline::from_config_with_new_pool(&config, &registry).unwrap();

    Setup {
        group,
        gate,
        written,
        pipeline,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_edges_stay_within_capacity() {
    let Setup {
        group,
        gate,
        written,
        mut pipeline,
    } = setup(2, 1000);
    pipeline.init().await.unwrap();
    pipeline.start().await.unwrap();

    for i in 0..50 {
        group.produce("telegraf", format!("m v={i}"));
    }
    settle().await;

    for (name, depth) in pipeline.edge_depths() {
        assert!(depth <= 2, "edge {name} holds {depth} records");
    }
    // Two full edges, one record in each stage loop and one in the handler.
    assert!(group.pending() >= 50 - 7, "feed drained past the edges");
    assert_eq!(written.load(Ordering::SeqCst), 0);

    gate.add_permits(50);
    tokio::time::timeout(Duration::from_secs(5), async {
        while group.commit_count() < 50 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(written.load(Ordering::SeqCst), 50);

    pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn test_in_flight_limit() {
    let Setup {
        group,
        gate,
        written,
        mut pipeline,
    } = setup(10, 3);
    pipeline.init().await.unwrap();
    pipeline.start().await.unwrap();

    for i in 0..20 {
        group.produce("telegraf", format!("m v={i}"));
    }
    settle().await;

    // Three records are out; the fourth message waits for a permit.
    assert_eq!(pipeline.pool().total(), 3);
    assert!(group.pending() >= 16);

    gate.add_permits(1);
    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.pool().total() < 4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(written.load(Ordering::SeqCst), 1);
    assert_eq!(group.commit_count(), 1);

    pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_while_stalled() {
    let Setup {
        group,
        mut pipeline,
        ..
    } = setup(1, 1000);
    pipeline.init().await.unwrap();
    pipeline.start().await.unwrap();

    for i in 0..20 {
        group.produce("telegraf", format!("m v={i}"));
    }
    settle().await;

    tokio::time::timeout(Duration::from_secs(2), pipeline.stop())
        .await
        .expect("stop hung on a full edge")
        .unwrap();
    assert_eq!(group.commit_count(), 0);
    assert!(group.is_closed());
}
