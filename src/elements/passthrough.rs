//! Pass-through transform, registered as `transparent`.

use crate::config::parse_settings;
use crate::element::{StageContext, TaskGroup, Transform};
use crate::error::Result;
use crate::link::{EdgeReceiver, EdgeSender};
use crate::observability::{StageMetrics, span_stage};
use async_trait::async_trait;
use serde::Deserialize;

/// A transform that forwards every record unchanged.
///
/// Records keep their payload, metadata and pending acknowledgment; the
/// sink acknowledges them as usual.
pub struct PassThrough {
    name: String,
    metrics: StageMetrics,
    tasks: TaskGroup,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PassThroughSettings {}

impl PassThrough {
    /// Plugin name.
    pub const NAME: &'static str = "transparent";

    /// Create a pass-through stage for `pipeline`.
    pub fn new(pipeline: &str) -> Self {
        Self::with_name(pipeline, Self::NAME)
    }

    /// Create a pass-through stage with a custom name.
    pub fn with_name(pipeline: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            metrics: StageMetrics::new(pipeline, &name),
            tasks: TaskGroup::new(name.clone(), span_stage(pipeline, &name, "transform")),
            name,
        }
    }

    /// Factory for the plugin registry. Accepts no settings.
    pub fn factory()
    -> impl Fn(&toml::Table, &StageContext) -> Result<Box<dyn Transform>> + Send + Sync + 'static
    {
        |settings: &toml::Table, ctx: &StageContext| {
            let _: PassThroughSettings = parse_settings(Self::NAME, settings)?;
            Ok(Box::new(Self::new(ctx.pipeline())) as Box<dyn Transform>)
        }
    }
}

#[async_trait]
impl Transform for PassThrough {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, input: EdgeReceiver, output: EdgeSender) -> Result<()> {
        let cancel = self.tasks.token();
        let metrics = self.metrics.clone();

        self.tasks.spawn(async move {
            loop {
                let record = match input.recv_or_cancel(&cancel).await {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "input edge failed");
                        break;
                    }
                };
                match output.send_or_cancel(record, &cancel).await {
                    Ok(true) => metrics.record_forwarded(),
                    Ok(false) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "output edge failed");
                        break;
                    }
                }
            }
            tracing::debug!("pass-through loop exited");
        })
    }

    async fn stop(&mut self) -> Result<()> {
        self.tasks.shutdown().await
    }
}
