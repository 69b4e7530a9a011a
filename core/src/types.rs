//! Plain data shared by the analytics layer and its callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::HttpConfig;

/// Default time between automatic uploads.
pub const DEFAULT_INTERVAL_MS: u64 = 2000;

/// Access credentials sent as persistent headers on every upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key: String,
    pub access_secret: String,
}

impl Credentials {
    pub fn new(access_key: &str, access_secret: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            access_secret: access_secret.to_string(),
        }
    }
}

/// Where and how often collections are uploaded.
///
/// Collections are posted to `<base_url>/projects/collections/<name>/documents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub base_url: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub http: HttpConfig,
}

impl AnalyticsConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            interval_ms: DEFAULT_INTERVAL_MS,
            http: HttpConfig::default(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn collection_url(&self, name: &str) -> String {
        format!(
            "{}/projects/collections/{name}/documents",
            self.base_url.trim_end_matches('/')
        )
    }
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

/// Outcome of one finished upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// The server answered 200; `documents` were in the batch.
    Success { collection: String, documents: usize },

    /// Any other outcome, with the exchange status (`-1` if no connection
    /// was made, `0` if the response had no status line).
    Failure { collection: String, status: i32 },
}

impl UploadEvent {
    pub fn collection(&self) -> &str {
        match self {
            UploadEvent::Success { collection, .. } | UploadEvent::Failure { collection, .. } => {
                collection
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_url_layout() {
        let config = AnalyticsConfig::new("http://api.example.com/");
        assert_eq!(
            config.collection_url("Test"),
            "http://api.example.com/projects/collections/Test/documents"
        );
    }

    #[test]
    fn config_defaults_when_deserialized() {
        let config: AnalyticsConfig =
            serde_json::from_str(r#"{"base_url":"http://h"}"#).unwrap();
        assert_eq!(config.interval(), Duration::from_millis(2000));
        assert_eq!(config.http, HttpConfig::default());
    }

    #[test]
    fn event_reports_its_collection() {
        let event = UploadEvent::Failure {
            collection: "c".to_string(),
            status: -1,
        };
        assert_eq!(event.collection(), "c");
    }
}
