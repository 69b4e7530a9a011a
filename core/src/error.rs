//! Error types for the analytics layer.
//!
//! # Design
//! The HTTP engine itself never returns errors; its failures show up as
//! the exchange status. Only the orchestration layer above it, which
//! manages named collections and builds JSON documents, has operations
//! that can be rejected outright.

use std::fmt;

#[derive(Debug)]
pub enum AnalyticsError {
    /// No collection with this name was created.
    UnknownCollection(String),

    /// A collection with this name already exists.
    DuplicateCollection(String),

    /// A document path was empty or contained an empty segment.
    InvalidPath(String),

    /// A batch of documents could not be serialized to JSON.
    Serialization(String),
}

impl fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyticsError::UnknownCollection(name) => {
                write!(f, "unknown collection: {name}")
            }
            AnalyticsError::DuplicateCollection(name) => {
                write!(f, "collection already exists: {name}")
            }
            AnalyticsError::InvalidPath(path) => write!(f, "invalid document path: {path:?}"),
            AnalyticsError::Serialization(msg) => {
                write!(f, "serialization failed: {msg}")
            }
        }
    }
}

impl std::error::Error for AnalyticsError {}
