//! Closed vocabularies accepted by the SearXNG backend.
//!
//! Both enums carry a canonical ordering via `all()`. That order feeds input-schema enums
//! and the "valid values" lists in error messages, so it must stay stable.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "general")]
    General,
    #[serde(rename = "images")]
    Images,
    #[serde(rename = "videos")]
    Videos,
    #[serde(rename = "news")]
    News,
    #[serde(rename = "map")]
    Map,
    #[serde(rename = "music")]
    Music,
    #[serde(rename = "it")]
    It,
    #[serde(rename = "science")]
    Science,
    #[serde(rename = "files")]
    Files,
    #[serde(rename = "social media")]
    SocialMedia,
}

impl Category {
    const ALL: [Category; 10] = [
        Category::General,
        Category::Images,
        Category::Videos,
        Category::News,
        Category::Map,
        Category::Music,
        Category::It,
        Category::Science,
        Category::Files,
        Category::SocialMedia,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Images => "images",
            Self::Videos => "videos",
            Self::News => "news",
            Self::Map => "map",
            Self::Music => "music",
            Self::It => "it",
            Self::Science => "science",
            Self::Files => "files",
            Self::SocialMedia => "social media",
        }
    }

    /// Exact, case-sensitive match against the canonical tokens.
    pub fn parse(token: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == token)
            .ok_or_else(|| Error::InvalidCategory(token.to_string()))
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.as_str()).collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Month,
    Year,
}

impl TimeRange {
    const ALL: [TimeRange; 3] = [TimeRange::Day, TimeRange::Month, TimeRange::Year];

    pub fn all() -> &'static [TimeRange] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    pub fn parse(token: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == token)
            .ok_or_else(|| Error::InvalidTimeRange(token.to_string()))
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.as_str()).collect()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
