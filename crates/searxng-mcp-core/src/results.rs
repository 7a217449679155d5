//! Decoded SearXNG `format=json` response.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    // SearXNG uses `content` for snippets in JSON format.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parsed_url: Vec<String>,
    #[serde(default)]
    pub img_src: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub engines: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub positions: Vec<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: f64,
    #[serde(default)]
    pub category: Option<String>,
    /// Loosely typed upstream: absent, null, a string, or occasionally something else.
    /// Anything that is not a string decodes as `None`.
    #[serde(
        default,
        rename = "publishedDate",
        deserialize_with = "lenient_optional_string"
    )]
    pub published_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    #[serde(default, deserialize_with = "null_as_default")]
    pub query: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub number_of_results: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<RawResult>,
}

impl ResultSet {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Self::from_json_slice(s.as_bytes())
    }
}

/// A missing key and an explicit `null` both decode as the type's default.
fn null_as_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn lenient_optional_string<'de, D>(d: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(d)?;
    Ok(match v {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}
