//! Line protocol validating transform, registered as `line_protocol`.
//!
//! Records whose payload is not well-formed line protocol never reach the
//! sink: they are acknowledged (a redelivery would fail the same way),
//! released to the pool and counted as discarded.

use crate::config::parse_settings;
use crate::element::{StageContext, TaskGroup, Transform};
use crate::error::{Error, Result};
use crate::link::{EdgeReceiver, EdgeSender};
use crate::memory::RecordPool;
use crate::observability::{StageMetrics, span_stage};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Check that `payload` is line protocol.
///
/// Blank lines and `#` comments are ignored. Every other line needs a
/// measurement, optional `,tag=value` pairs, at least one `field=value`
/// and an optional integer timestamp. Returns the number of points.
pub fn validate(payload: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| Error::Delivery(format!("payload is not UTF-8: {e}")))?;

    let mut points = 0;
    for (idx, line) in text.split('\n').enumerate() {
        let line = line.trim_end_matches('\r').trim_start();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        validate_line(line).map_err(|reason| {
            Error::Delivery(format!("line {}: {reason}", idx + 1))
        })?;
        points += 1;
    }

    if points == 0 {
        return Err(Error::Delivery("payload holds no points".into()));
    }
    Ok(points)
}

fn validate_line(line: &str) -> std::result::Result<(), String> {
    let sections = split_unescaped(line, b' ', true);
    let sections: Vec<&str> = sections.into_iter().filter(|s| !s.is_empty()).collect();
    let (series, fields, timestamp) = match sections.as_slice() {
        [series, fields] => (*series, *fields, None),
        [series, fields, ts] => (*series, *fields, Some(*ts)),
        [_] => return Err("missing fields".into()),
        _ => return Err("unexpected text after timestamp".into()),
    };

    let mut series = split_unescaped(series, b',', false).into_iter();
    match series.next() {
        Some(measurement) if !measurement.is_empty() => {}
        _ => return Err("missing measurement".into()),
    }
    for tag in series {
        match split_pair(tag) {
            Some((key, value)) if !key.is_empty() && !value.is_empty() => {}
            _ => return Err(format!("invalid tag '{tag}'")),
        }
    }

    for field in split_unescaped(fields, b',', true) {
        match split_pair(field) {
            Some((key, value)) if !key.is_empty() && valid_field_value(value) => {}
            _ => return Err(format!("invalid field '{field}'")),
        }
    }

    if let Some(ts) = timestamp {
        ts.parse::<i64>()
            .map_err(|_| format!("invalid timestamp '{ts}'"))?;
    }
    Ok(())
}

/// Split on `sep` where it is neither backslash-escaped nor, when
/// `quotes` is set, inside a double-quoted string.
fn split_unescaped(s: &str, sep: u8, quotes: bool) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut quoted = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if quotes && b == b'"' {
            quoted = !quoted;
        } else if b == sep && !quoted {
            parts.push(&s[start..i]);
            start = i + 1;
        }
    }
    parts.push(&s[start..]);
    parts
}

fn split_pair(s: &str) -> Option<(&str, &str)> {
    let bytes = s.as_bytes();
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'=' {
            return Some((&s[..i], &s[i + 1..]));
        }
    }
    None
}

fn valid_field_value(value: &str) -> bool {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return true;
    }
    if matches!(
        value,
        "t" | "T" | "true" | "True" | "TRUE" | "f" | "F" | "false" | "False" | "FALSE"
    ) {
        return true;
    }
    if let Some(int) = value.strip_suffix('i') {
        return int.parse::<i64>().is_ok();
    }
    if let Some(uint) = value.strip_suffix('u') {
        return uint.parse::<u64>().is_ok();
    }
    value.parse::<f64>().map(f64::is_finite).unwrap_or(false)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LineProtocolSettings {}

/// A transform that drops records which are not valid line protocol.
pub struct LineProtocolParser {
    name: String,
    pool: Arc<RecordPool>,
    metrics: StageMetrics,
    tasks: TaskGroup,
}

impl LineProtocolParser {
    /// Plugin name.
    pub const NAME: &'static str = "line_protocol";

    /// Create a validating stage; discarded records go back to `pool`.
    pub fn new(pipeline: &str, pool: Arc<RecordPool>) -> Self {
        Self {
            name: Self::NAME.to_string(),
            pool,
            metrics: StageMetrics::new(pipeline, Self::NAME),
            tasks: TaskGroup::new(Self::NAME, span_stage(pipeline, Self::NAME, "transform")),
        }
    }

    /// Factory for the plugin registry. Accepts no settings.
    pub fn factory()
    -> impl Fn(&toml::Table, &StageContext) -> Result<Box<dyn Transform>> + Send + Sync + 'static
    {
        |settings: &toml::Table, ctx: &StageContext| {
            let _: LineProtocolSettings = parse_settings(Self::NAME, settings)?;
            Ok(Box::new(Self::new(ctx.pipeline(), ctx.pool().clone())) as Box<dyn Transform>)
        }
    }
}

#[async_trait]
impl Transform for LineProtocolParser {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, input: EdgeReceiver, output: EdgeSender) -> Result<()> {
        let cancel = self.tasks.token();
        let metrics = self.metrics.clone();
        let pool = self.pool.clone();

        self.tasks.spawn(async move {
            loop {
                let mut record = match input.recv_or_cancel(&cancel).await {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "input edge failed");
                        break;
                    }
                };

                if let Err(e) = validate(record.as_bytes()) {
                    tracing::warn!(
                        error = %e,
                        offset = record.metadata().offset,
                        "discarding malformed record"
                    );
                    metrics.record_discarded();
                    record.acknowledge();
                    pool.release(record);
                    continue;
                }

                match output.send_or_cancel(record, &cancel).await {
                    Ok(true) => metrics.record_forwarded(),
                    Ok(false) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "output edge failed");
                        break;
                    }
                }
            }
        })
    }

    async fn stop(&mut self) -> Result<()> {
        self.tasks.shutdown().await
    }
}
