//! Error types for the cogclip-core library.
//!
//! This module provides granular error variants for the failure modes of the
//! clipping workflow. Every network-facing variant carries the endpoint (and
//! the raster URL when there is one) so a failure can be reproduced by hand.

use thiserror::Error;

/// Errors that can occur within the cogclip-core library.
#[derive(Error, Debug)]
pub enum ClipError {
    /// Configuration-related errors (invalid URLs, unparsable values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request failed to connect or returned a non-2xx status.
    #[error("{endpoint} unreachable for {raster_url}: {reason}")]
    NetworkUnreachable {
        /// Endpoint that was called.
        endpoint: String,
        /// Raster the call was made for (empty for raster-independent calls).
        raster_url: String,
        /// Transport error or HTTP status.
        reason: String,
    },

    /// The response body could not be parsed or lacked an expected field.
    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse {
        /// Endpoint that produced the body.
        endpoint: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The raster has the same minimum and maximum value.
    #[error("Degenerate statistics: raster is constant at {value}")]
    DegenerateStatistics {
        /// The single value of the raster.
        value: f64,
    },

    /// Reserved: edited rectangles are never rejected, even when inverted.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Bounds handed to the geometry model were out of order or not finite.
    #[error("Invalid bounds: x [{min_x}, {max_x}], y [{min_y}, {max_y}]")]
    InvalidBounds {
        min_x: f64,
        max_x: f64,
        min_y: f64,
        max_y: f64,
    },

    /// The progress stream ended or failed before the job finished.
    #[error("Progress stream interrupted: {0}")]
    StreamInterrupted(String),

    /// An operation was requested in a workflow state that does not allow it.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// UI-related errors (rendering, window management).
    #[error("UI error: {0}")]
    Ui(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClipError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a network error for a call made on behalf of `raster_url`.
    pub fn unreachable(
        endpoint: impl Into<String>,
        raster_url: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::NetworkUnreachable {
            endpoint: endpoint.into(),
            raster_url: raster_url.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a malformed-response error for `endpoint`.
    pub fn malformed(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a stream interruption error with the given message.
    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::StreamInterrupted(msg.into())
    }

    /// Creates a not-ready error with the given message.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Creates a UI error with the given message.
    pub fn ui(msg: impl Into<String>) -> Self {
        Self::Ui(msg.into())
    }
}

/// A convenient alias for Result with [`ClipError`].
pub type Result<T> = std::result::Result<T, ClipError>;
