//! Local implementations for `searxng-mcp`: the reqwest-backed SearXNG gateway and the
//! optional docker bootstrap.

pub mod docker;
pub mod searxng;
pub mod settings;

pub use searxng::SearxngClient;
