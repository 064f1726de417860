//! openGemini output settings.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub(crate) const DEFAULT_URL: &str = "http://localhost:8086";
const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Settings of the `openGemini` plugin as written in the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenGeminiSettings {
    /// Single server URL, appended after `urls`.
    pub url: String,
    /// Server URLs, tried in order for every write.
    pub urls: Vec<String>,
    /// User name for the token.
    pub username: String,
    /// Password for the token.
    pub password: String,
    /// Target database.
    pub database: String,
    /// Target retention policy.
    pub retention_policy: String,
    /// `ack` acknowledges records whose write failed, `hold` leaves them
    /// unacknowledged.
    pub on_write_error: String,
    /// Lines per HTTP request.
    pub batch_size: usize,
    /// Longest time a line waits in the client buffer.
    pub flush_interval_ms: u64,
    /// HTTP request timeout.
    pub timeout_ms: u64,
}

/// What the sink does with a record whose write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteErrorPolicy {
    /// Acknowledge anyway; the record is lost but the feed moves on.
    #[default]
    Ack,
    /// Release without acknowledging.
    ///
    /// Feed commits are cumulative per partition: a later record that is
    /// acknowledged commits past this one. It is read again only if the
    /// session ends before that happens.
    Hold,
}

/// Options handed to a [`WriteClientCreator`](super::WriteClientCreator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// User name for the token.
    pub username: String,
    /// Password for the token.
    pub password: String,
    /// Target database.
    pub database: String,
    /// Target retention policy.
    pub retention_policy: String,
    /// Lines per HTTP request.
    pub batch_size: usize,
    /// Longest time a line waits in the client buffer.
    pub flush_interval: Duration,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl ClientSettings {
    /// Bucket name, `database/retention_policy`.
    pub fn bucket(&self) -> String {
        format!("{}/{}", self.database, self.retention_policy)
    }

    /// Value of the `Authorization` header.
    pub fn token(&self) -> String {
        format!("Token {}:{}", self.username, self.password)
    }
}

impl OpenGeminiSettings {
    /// Server URLs: `urls` followed by `url`, or the default server.
    ///
    /// Only `http` and `https` are accepted.
    pub fn server_urls(&self) -> Result<Vec<Url>> {
        let mut raw: Vec<&str> = self.urls.iter().map(String::as_str).collect();
        if !self.url.is_empty() {
            raw.push(&self.url);
        }
        if raw.is_empty() {
            raw.push(DEFAULT_URL);
        }

        raw.into_iter()
            .map(|u| {
                let parsed = Url::parse(u).map_err(|e| {
                    Error::Configuration(format!("openGemini: error parsing url {u:?}: {e}"))
                })?;
                match parsed.scheme() {
                    "http" | "https" => Ok(parsed),
                    scheme => Err(Error::Configuration(format!(
                        "openGemini: unsupported scheme {scheme:?} in {u:?}"
                    ))),
                }
            })
            .collect()
    }

    /// Parsed `on_write_error`.
    pub fn write_error_policy(&self) -> Result<WriteErrorPolicy> {
        match self.on_write_error.to_lowercase().as_str() {
            "ack" | "" => Ok(WriteErrorPolicy::Ack),
            "hold" => Ok(WriteErrorPolicy::Hold),
            other => Err(Error::Configuration(format!(
                "openGemini: invalid on_write_error {other:?}, expected \"ack\" or \"hold\""
            ))),
        }
    }

    /// Client options with defaults applied.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            retention_policy: self.retention_policy.clone(),
            batch_size: match self.batch_size {
                0 => DEFAULT_BATCH_SIZE,
                n => n,
            },
            flush_interval: match self.flush_interval_ms {
                0 => DEFAULT_FLUSH_INTERVAL,
                ms => Duration::from_millis(ms),
            },
            timeout: match self.timeout_ms {
                0 => DEFAULT_TIMEOUT,
                ms => Duration::from_millis(ms),
            },
        }
    }
}
