//! Non-blocking HTTP/1.0 client engine driven by caller polling.
//!
//! # Overview
//! An `HttpClient` performs one request/response exchange at a time. The
//! caller issues a request, then calls `poll` repeatedly; each poll checks
//! socket readiness with a zero timeout and advances the exchange at most
//! one step: racing connection attempts, sending the request, receiving,
//! and finally splitting headers from content once the server closes the
//! connection.
//!
//! # Design
//! - No threads, no async runtime, no blocking calls inside the engine.
//! - The exchange state is derived from which sockets exist, never cached.
//! - Sockets are owned handles; dropping one closes it.
//! - Failures are reported through the exchange status, not `Result`.
//! - `analytics` is an optional layer on top that batches JSON documents
//!   into periodic uploads, one `HttpClient` per named collection.

pub mod analytics;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod http;
pub mod race;
pub mod resolve;
pub mod response;
pub mod socket;
pub mod types;
pub mod url;

pub use analytics::Analytics;
pub use client::{block_until_complete, HttpClient, HttpState, STATUS_FAILED};
pub use config::HttpConfig;
pub use document::Document;
pub use error::AnalyticsError;
pub use http::{HttpMethod, HttpRequest};
pub use race::{Connector, NonBlockingConnect};
pub use resolve::{Resolver, StaticResolver, SystemResolver};
pub use types::{AnalyticsConfig, Credentials, UploadEvent};
pub use url::UrlParts;
