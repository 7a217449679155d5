//! Backend-agnostic types for `searxng-mcp`.
//!
//! This crate does no IO. It owns the closed vocabularies, the query model, the decoded
//! backend result set, and the result shaper; adapters in `searxng-mcp-local` implement
//! [`SearchBackend`] on top of it.

pub mod query;
pub mod results;
pub mod shape;
pub mod vocab;

pub use query::{AdvancedOptions, Query};
pub use results::{RawResult, ResultSet};
pub use shape::{shape, Filters, ShapeOptions, ShapedItem, ShapedOutput};
pub use vocab::{Category, TimeRange};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid category: {0}")]
    InvalidCategory(String),
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("failed to execute request: {0}")]
    Transport(String),
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("container bootstrap failed: {0}")]
    Bootstrap(String),
}

impl Error {
    /// True for failures that originate at (or on the way to) the search backend.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::EmptyQuery | Self::Transport(_) | Self::UnexpectedStatus(_) | Self::Decode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One search backend call per invocation: no retries, no caching.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &Query) -> Result<ResultSet>;
}
