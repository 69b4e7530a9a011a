//! Batching uploader built on the polling engine.
//!
//! # Design
//! `Analytics` is an explicit context: it owns the credentials, the upload
//! configuration and every named collection. Each collection owns its own
//! `HttpClient`, so uploads for different collections proceed side by side.
//!
//! Nothing here blocks except `upload_blocking`. `update` is meant to be
//! called regularly from the host's main loop: it polls each collection's
//! exchange once, reports finished uploads, and when the interval has
//! elapsed starts a new upload for every idle collection with queued
//! documents.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::client::{block_until_complete, HttpClient};
use crate::document::Document;
use crate::error::AnalyticsError;
use crate::types::{AnalyticsConfig, Credentials, UploadEvent};

const CONTENT_TYPE: &str = "application/json;charset=utf-8";

#[derive(Debug)]
struct Collection {
    name: String,
    documents: Vec<Document>,
    in_flight: Option<usize>,
    http: HttpClient,
}

impl Collection {
    /// Start posting every queued document; the queue is emptied.
    /// Returns how many documents the batch holds.
    fn start_upload(&mut self, url: &str) -> Result<usize, AnalyticsError> {
        let documents: Vec<Value> = self.documents.iter().map(Document::to_value).collect();
        let count = documents.len();
        let payload = serde_json::to_string(&json!({ "documents": documents }))
            .map_err(|e| AnalyticsError::Serialization(e.to_string()))?;

        log::debug!(
            "uploading {count} document(s) for collection {}",
            self.name
        );
        self.http.request(url, Some(&payload));
        self.in_flight = Some(count);
        self.documents.clear();
        Ok(count)
    }

    /// The outcome of the in-flight upload, once its exchange is complete.
    fn take_outcome(&mut self) -> Option<UploadEvent> {
        if !self.http.is_complete() {
            return None;
        }
        let documents = self.in_flight.take()?;
        Some(self.outcome(documents))
    }

    fn outcome(&self, documents: usize) -> UploadEvent {
        let status = self.http.status();
        if status == 200 {
            UploadEvent::Success {
                collection: self.name.clone(),
                documents,
            }
        } else {
            log::warn!("upload for collection {} failed with status {status}", self.name);
            UploadEvent::Failure {
                collection: self.name.clone(),
                status,
            }
        }
    }
}

#[derive(Debug)]
pub struct Analytics {
    credentials: Credentials,
    config: AnalyticsConfig,
    collections: Vec<Collection>,
    remaining: Duration,
    last_update: Instant,
    deferred: Vec<UploadEvent>,
}

impl Analytics {
    pub fn new(credentials: Credentials, config: AnalyticsConfig) -> Self {
        let remaining = config.interval();
        Self {
            credentials,
            config,
            collections: Vec::new(),
            remaining,
            last_update: Instant::now(),
            deferred: Vec::new(),
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.config.interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        self.remaining = self.remaining.min(interval);
    }

    pub fn create_collection(&mut self, name: &str) -> Result<(), AnalyticsError> {
        if self.collections.iter().any(|c| c.name == name) {
            return Err(AnalyticsError::DuplicateCollection(name.to_string()));
        }

        let mut http = HttpClient::with_config(self.config.http.clone());
        http.add_custom_header("AuthAccessKey", &self.credentials.access_key);
        http.add_custom_header("AuthAccessSecret", &self.credentials.access_secret);
        http.add_custom_header("Content-Type", CONTENT_TYPE);

        self.collections.push(Collection {
            name: name.to_string(),
            documents: Vec::new(),
            in_flight: None,
            http,
        });
        Ok(())
    }

    pub fn add_document(&mut self, name: &str, document: Document) -> Result<(), AnalyticsError> {
        self.collection_mut(name)?.documents.push(document);
        Ok(())
    }

    /// Documents queued for `name` and not yet handed to an upload.
    pub fn queued(&self, name: &str) -> Result<usize, AnalyticsError> {
        self.collections
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.documents.len())
            .ok_or_else(|| AnalyticsError::UnknownCollection(name.to_string()))
    }

    /// Whether no collection has an upload in flight.
    pub fn is_idle(&self) -> bool {
        self.collections.iter().all(|c| c.in_flight.is_none())
    }

    /// Poll every upload once and start new ones when the interval has
    /// elapsed. Returns uploads that finished since the last call.
    pub fn update(&mut self, now: Instant) -> Vec<UploadEvent> {
        let elapsed = now.saturating_duration_since(self.last_update);
        self.last_update = now;
        self.remaining = self.remaining.saturating_sub(elapsed);

        let mut events = std::mem::take(&mut self.deferred);
        for collection in &mut self.collections {
            collection.http.poll();
            events.extend(collection.take_outcome());
        }

        if self.remaining.is_zero() {
            for collection in &mut self.collections {
                if collection.documents.is_empty() || collection.in_flight.is_some() {
                    continue;
                }
                let url = self.config.collection_url(&collection.name);
                if let Err(e) = collection.start_upload(&url) {
                    log::warn!("collection {} not uploaded: {e}", collection.name);
                }
            }
            self.remaining = self.config.interval();
        }

        events
    }

    /// Upload `name` now and wait for the outcome, polling every
    /// `poll_interval`.
    ///
    /// An upload already in flight for the collection is waited out first;
    /// its outcome is returned by the next `update`. Like
    /// `block_until_complete`, this has no deadline.
    pub fn upload_blocking(
        &mut self,
        name: &str,
        poll_interval: Duration,
    ) -> Result<UploadEvent, AnalyticsError> {
        let url = self.config.collection_url(name);
        let index = self
            .collections
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| AnalyticsError::UnknownCollection(name.to_string()))?;
        let collection = &mut self.collections[index];

        if collection.in_flight.is_some() {
            block_until_complete(&mut collection.http, poll_interval);
            self.deferred.extend(collection.take_outcome());
        }

        let documents = collection.start_upload(&url)?;
        block_until_complete(&mut collection.http, poll_interval);
        collection.in_flight = None;
        Ok(collection.outcome(documents))
    }

    /// Abandon every upload in flight and close all sockets.
    pub fn shutdown(&mut self) {
        for collection in &mut self.collections {
            collection.http.close();
            collection.in_flight = None;
        }
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut Collection, AnalyticsError> {
        self.collections
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| AnalyticsError::UnknownCollection(name.to_string()))
    }
}

impl Drop for Analytics {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analytics() -> Analytics {
        // Port 9 (discard) on loopback is normally closed, so uploads fail fast.
        let mut config = AnalyticsConfig::new("http://127.0.0.1");
        config.http.port = 9;
        Analytics::new(Credentials::new("key", "secret"), config)
    }

    fn doc(n: i64) -> Document {
        let mut doc = Document::new();
        doc.set_int("n", n).unwrap();
        doc
    }

    #[test]
    fn duplicate_collection_is_rejected() {
        let mut a = analytics();
        a.create_collection("Test").unwrap();
        let err = a.create_collection("Test").unwrap_err();
        assert!(matches!(err, AnalyticsError::DuplicateCollection(_)));
    }

    #[test]
    fn unknown_collection_is_rejected() {
        let mut a = analytics();
        let err = a.add_document("missing", doc(1)).unwrap_err();
        assert!(matches!(err, AnalyticsError::UnknownCollection(_)));
        assert!(a.queued("missing").is_err());
    }

    #[test]
    fn collections_carry_auth_headers() {
        let mut a = analytics();
        a.create_collection("Test").unwrap();
        let headers = a.collections[0].http.custom_headers();
        assert_eq!(headers[0], ("AuthAccessKey".to_string(), "key".to_string()));
        assert_eq!(headers[1], ("AuthAccessSecret".to_string(), "secret".to_string()));
        assert_eq!(headers[2].1, CONTENT_TYPE);
    }

    #[test]
    fn nothing_is_sent_before_the_interval() {
        let mut a = analytics();
        a.create_collection("Test").unwrap();
        a.add_document("Test", doc(1)).unwrap();

        let start = a.last_update;
        let events = a.update(start + Duration::from_millis(500));
        assert!(events.is_empty());
        assert_eq!(a.queued("Test").unwrap(), 1);
        assert!(a.is_idle());
    }

    #[test]
    fn interval_elapsing_drains_the_queue() {
        let mut a = analytics();
        a.create_collection("Test").unwrap();
        a.create_collection("Empty").unwrap();
        a.add_document("Test", doc(1)).unwrap();
        a.add_document("Test", doc(2)).unwrap();

        let start = a.last_update;
        a.update(start + Duration::from_millis(2000));
        assert_eq!(a.queued("Test").unwrap(), 0);
        assert_eq!(a.collections[0].http.body(), r#"{"documents":[{"n":1},{"n":2}]}"#);
        assert!(a.collections[1].in_flight.is_none());
    }

    #[test]
    fn set_interval_shortens_the_wait() {
        let mut a = analytics();
        a.set_interval(Duration::from_millis(10));
        assert_eq!(a.config.interval_ms, 10);
        a.create_collection("Test").unwrap();
        a.add_document("Test", doc(1)).unwrap();
        let start = a.last_update;
        a.update(start + Duration::from_millis(10));
        assert_eq!(a.queued("Test").unwrap(), 0);
    }

    #[test]
    fn shutdown_abandons_uploads() {
        let mut a = analytics();
        a.create_collection("Test").unwrap();
        a.add_document("Test", doc(1)).unwrap();
        let start = a.last_update;
        a.update(start + Duration::from_secs(3));
        a.shutdown();
        assert!(a.is_idle());
        assert!(a.collections[0].http.is_complete());
    }
}
