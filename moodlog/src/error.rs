//! Error types shared by the vendor, routing and realtime layers.

use thiserror::Error;

/// Failure of a single call to one vendor.
#[derive(Debug, Error)]
pub enum VendorError {
    /// The vendor answered with a non-2xx status.
    #[error("{vendor} returned HTTP {status}: {body}")]
    Http {
        vendor: &'static str,
        status: u16,
        body: String,
    },

    /// The vendor answered 2xx but the payload lacked the expected field.
    #[error("{vendor} returned an unexpected payload: {detail}")]
    Format { vendor: &'static str, detail: String },

    /// The request never produced a response.
    #[error("{vendor} request failed: {source}")]
    Transport {
        vendor: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The realtime socket failed or closed unexpectedly.
    #[error("{vendor} stream error: {detail}")]
    Stream { vendor: &'static str, detail: String },
}

impl VendorError {
    pub fn format(vendor: &'static str, detail: impl Into<String>) -> Self {
        Self::Format {
            vendor,
            detail: detail.into(),
        }
    }

    pub fn stream(vendor: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Stream {
            vendor,
            detail: detail.to_string(),
        }
    }

    /// Name of the vendor that failed.
    pub const fn vendor(&self) -> &'static str {
        match self {
            Self::Http { vendor, .. }
            | Self::Format { vendor, .. }
            | Self::Transport { vendor, .. }
            | Self::Stream { vendor, .. } => vendor,
        }
    }
}

/// Failure of an operation exposed to the rest of the application.
#[derive(Debug, Error)]
pub enum CompanionError {
    /// Every configured provider was tried and failed.
    #[error("all providers failed for {operation}: {last}")]
    AllProvidersFailed {
        operation: &'static str,
        #[source]
        last: VendorError,
    },

    /// No provider is configured for the operation.
    #[error("no provider configured for {operation} (set {hint})")]
    Configuration {
        operation: &'static str,
        hint: &'static str,
    },

    /// The realtime session id is unknown.
    #[error("realtime session {0} not found")]
    SessionNotFound(String),

    /// The caller sent something unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A single-vendor operation failed.
    #[error(transparent)]
    Vendor(#[from] VendorError),
}

impl CompanionError {
    /// Short message safe to show to end users.
    pub fn public_message(&self) -> String {
        match self {
            Self::AllProvidersFailed { operation, .. } => format!("Failed to {operation}"),
            Self::Configuration { operation, hint } => {
                format!("No provider configured to {operation}; set {hint}")
            }
            Self::SessionNotFound(_) => "Session not found".to_string(),
            Self::InvalidRequest(reason) => reason.clone(),
            Self::Vendor(e) => format!("{} is unavailable", e.vendor()),
        }
    }
}

pub type Result<T, E = CompanionError> = std::result::Result<T, E>;
