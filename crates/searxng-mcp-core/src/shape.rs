//! Result shaping: bounded, rank-annotated views over a backend [`ResultSet`].
//!
//! The shaper never re-ranks: backend order is preserved and rank is simply position + 1.
//! The backend's reported total passes through untouched, even when it is far larger than
//! the window that is shown.

use crate::query::Query;
use crate::results::ResultSet;
use crate::vocab::{Category, TimeRange};
use serde::Serialize;
use std::fmt::Write as _;

pub const TRUNCATION_MARKER: &str = "...";
pub const NO_RESULTS_MESSAGE: &str = "No results found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeOptions {
    pub max_items: usize,
    /// Cap on summary length, in characters, before the truncation marker.
    pub summary_cap: usize,
}

impl ShapeOptions {
    pub const MAX_ITEMS: usize = 10;

    /// Structured (JSON) output.
    pub fn compact() -> Self {
        Self {
            max_items: Self::MAX_ITEMS,
            summary_cap: 500,
        }
    }

    /// Human-readable output; shorter summaries.
    pub fn narrative() -> Self {
        Self {
            max_items: Self::MAX_ITEMS,
            summary_cap: 200,
        }
    }
}

impl Default for ShapeOptions {
    fn default() -> Self {
        Self::compact()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapedItem {
    pub rank: usize,
    pub title: String,
    pub url: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapedOutput {
    /// The backend reported zero results. Kept distinct from an empty ranked list so a
    /// caller never confuses "nothing matched" with a failure.
    NoResults { query: String },
    Ranked {
        query: String,
        total: u64,
        items: Vec<ShapedItem>,
        /// Backend items that existed past the `max_items` window.
        omitted: usize,
    },
}

/// Active request filters, echoed in narrative output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub language: Option<String>,
    pub time_range: Option<TimeRange>,
    pub categories: Vec<Category>,
    pub page: u32,
}

impl Filters {
    pub fn from_query(q: &Query) -> Self {
        Self {
            language: q.language.clone(),
            time_range: q.time_range,
            categories: q.categories.clone(),
            page: q.page,
        }
    }

    /// Single-line annotation, e.g. `(language: en | time range: month | page: 2)`.
    /// `None` when nothing is active.
    pub fn annotation(&self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(lang) = self.language.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("language: {lang}"));
        }
        if let Some(tr) = self.time_range {
            parts.push(format!("time range: {tr}"));
        }
        if !self.categories.is_empty() {
            let names: Vec<&str> = self.categories.iter().map(|c| c.as_str()).collect();
            parts.push(format!("categories: {}", names.join(", ")));
        }
        if self.page > 1 {
            parts.push(format!("page: {}", self.page));
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("({})", parts.join(" | ")))
        }
    }
}

pub fn truncate_summary(content: &str, cap: usize) -> String {
    match content.char_indices().nth(cap) {
        None => content.to_string(),
        Some((cut, _)) => {
            let mut s = String::with_capacity(cut + TRUNCATION_MARKER.len());
            s.push_str(&content[..cut]);
            s.push_str(TRUNCATION_MARKER);
            s
        }
    }
}

pub fn shape(rs: &ResultSet, opts: ShapeOptions) -> ShapedOutput {
    if rs.number_of_results == 0 {
        return ShapedOutput::NoResults {
            query: rs.query.clone(),
        };
    }

    let items = rs
        .results
        .iter()
        .take(opts.max_items)
        .enumerate()
        .map(|(i, r)| ShapedItem {
            rank: i + 1,
            title: r.title.clone(),
            url: r.url.clone(),
            summary: truncate_summary(&r.content, opts.summary_cap),
            date: r.published_date.clone().filter(|d| !d.is_empty()),
        })
        .collect();

    ShapedOutput::Ranked {
        query: rs.query.clone(),
        total: rs.number_of_results,
        items,
        omitted: rs.results.len().saturating_sub(opts.max_items),
    }
}

impl ShapedOutput {
    pub fn query(&self) -> &str {
        match self {
            Self::NoResults { query } | Self::Ranked { query, .. } => query,
        }
    }

    pub fn total(&self) -> u64 {
        match self {
            Self::NoResults { .. } => 0,
            Self::Ranked { total, .. } => *total,
        }
    }

    pub fn items(&self) -> &[ShapedItem] {
        match self {
            Self::NoResults { .. } => &[],
            Self::Ranked { items, .. } => items,
        }
    }

    pub fn is_no_results(&self) -> bool {
        matches!(self, Self::NoResults { .. })
    }

    /// Compact structured form with stable field names.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::NoResults { query } => serde_json::json!({
                "query": query,
                "total": 0,
                "results": [],
                "message": NO_RESULTS_MESSAGE
            }),
            Self::Ranked {
                query,
                total,
                items,
                ..
            } => serde_json::json!({
                "query": query,
                "total": total,
                "results": items
            }),
        }
    }

    pub fn render_text(&self, filters: &Filters) -> String {
        let mut out = String::new();
        let annotation = filters
            .annotation()
            .map(|a| format!(" {a}"))
            .unwrap_or_default();
        match self {
            Self::NoResults { query } => {
                let _ = write!(out, "{NO_RESULTS_MESSAGE} for \"{query}\"{annotation}");
            }
            Self::Ranked {
                query,
                total,
                items,
                omitted,
            } => {
                let noun = if *total == 1 { "result" } else { "results" };
                let _ = writeln!(out, "Found {total} {noun} for \"{query}\"{annotation}");
                for it in items {
                    let _ = writeln!(out);
                    let _ = writeln!(out, "{}. {}", it.rank, it.title);
                    let _ = writeln!(out, "   {}", it.url);
                    if !it.summary.is_empty() {
                        let _ = writeln!(out, "   {}", it.summary);
                    }
                    if let Some(d) = it.date.as_deref() {
                        let _ = writeln!(out, "   Published: {d}");
                    }
                }
                if *omitted > 0 {
                    let _ = writeln!(out);
                    let _ = writeln!(out, "... and {omitted} more results");
                }
            }
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::RawResult;
    use proptest::prelude::*;

    fn raw(title: &str, url: &str, content: &str) -> RawResult {
        RawResult {
            title: title.to_string(),
            url: url.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    fn set(total: u64, results: Vec<RawResult>) -> ResultSet {
        ResultSet {
            query: "q".to_string(),
            number_of_results: total,
            results,
        }
    }

    #[test]
    fn golang_single_result() {
        let rs = ResultSet {
            query: "golang".to_string(),
            number_of_results: 5000,
            results: vec![raw(
                "Go Programming Language",
                "https://go.dev",
                "Go is an open source programming language",
            )],
        };
        let out = shape(&rs, ShapeOptions::compact());
        assert_eq!(out.total(), 5000);
        assert_eq!(out.items().len(), 1);
        assert_eq!(out.items()[0].rank, 1);
        assert_eq!(out.items()[0].title, "Go Programming Language");

        let v = out.to_json();
        assert_eq!(v["total"].as_u64(), Some(5000));
        assert_eq!(v["query"].as_str(), Some("golang"));
        assert_eq!(v["results"][0]["rank"].as_u64(), Some(1));
        assert!(v["results"][0].get("date").is_none());
    }

    #[test]
    fn keeps_backend_order_across_categories() {
        let mut a = raw("Complete Machine Learning Tutorial", "https://a", "x");
        a.category = Some("science".to_string());
        a.published_date = Some("2024-01-15".to_string());
        let mut b = raw("AI Development Guide", "https://b", "y");
        b.category = Some("it".to_string());
        let out = shape(&set(2500, vec![a, b]), ShapeOptions::compact());
        let titles: Vec<(usize, &str)> = out
            .items()
            .iter()
            .map(|i| (i.rank, i.title.as_str()))
            .collect();
        assert_eq!(
            titles,
            vec![
                (1, "Complete Machine Learning Tutorial"),
                (2, "AI Development Guide")
            ]
        );
        assert_eq!(out.items()[0].date.as_deref(), Some("2024-01-15"));
        assert_eq!(out.items()[1].date, None);
    }

    #[test]
    fn zero_total_is_explicit_no_results() {
        let out = shape(&set(0, vec![]), ShapeOptions::compact());
        assert!(out.is_no_results());
        let v = out.to_json();
        assert_eq!(v["total"].as_u64(), Some(0));
        assert_eq!(v["message"].as_str(), Some(NO_RESULTS_MESSAGE));
        assert_eq!(v["query"].as_str(), Some("q"));
        assert_eq!(v["results"].as_array().map(|a| a.len()), Some(0));
    }

    #[test]
    fn window_is_capped_and_remainder_reported() {
        let results: Vec<RawResult> = (0..14)
            .map(|i| raw(&format!("t{i}"), &format!("https://x/{i}"), "c"))
            .collect();
        let out = shape(&set(14, results), ShapeOptions::narrative());
        assert_eq!(out.items().len(), 10);
        assert_eq!(out.items()[9].rank, 10);
        assert_eq!(out.items()[9].title, "t9");
        let text = out.render_text(&Filters::default());
        assert!(text.contains("... and 4 more results"), "{text}");
    }

    #[test]
    fn empty_date_is_absent() {
        let mut r = raw("t", "u", "c");
        r.published_date = Some(String::new());
        let out = shape(&set(1, vec![r]), ShapeOptions::compact());
        assert_eq!(out.items()[0].date, None);
        assert!(out.to_json()["results"][0].get("date").is_none());
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let s = "é".repeat(600);
        let t = truncate_summary(&s, 500);
        assert_eq!(t.chars().count(), 500 + TRUNCATION_MARKER.len());
        assert!(t.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncate_summary("abc", 3), "abc");
    }

    #[test]
    fn narrative_echoes_active_filters() {
        let q = Query::advanced(
            "rust",
            crate::query::AdvancedOptions {
                language: Some("en".to_string()),
                time_range: Some(TimeRange::Month),
                page: Some(2),
            },
        );
        let mut r = raw("Rust", "https://rust-lang.org", "A language");
        r.published_date = Some("2024-02-01".to_string());
        let out = shape(
            &ResultSet {
                query: "rust".to_string(),
                number_of_results: 42,
                results: vec![r],
            },
            ShapeOptions::narrative(),
        );
        let text = out.render_text(&Filters::from_query(&q));
        let first = text.lines().next().unwrap();
        assert_eq!(
            first,
            "Found 42 results for \"rust\" (language: en | time range: month | categories: general | page: 2)"
        );
        assert!(text.contains("1. Rust"));
        assert!(text.contains("Published: 2024-02-01"));
        assert!(!text.contains("more results"));
    }

    #[test]
    fn narrative_no_results_mentions_query_and_filters() {
        let q = Query::with_categories("nothing", [Category::Science, Category::It]);
        let out = shape(
            &ResultSet {
                query: "nothing".to_string(),
                ..Default::default()
            },
            ShapeOptions::narrative(),
        );
        assert_eq!(
            out.render_text(&Filters::from_query(&q)),
            "No results found for \"nothing\" (categories: science, it)"
        );
    }

    fn short_result() -> impl Strategy<Value = RawResult> {
        ("[a-z ]{0,20}", "https://[a-z]{1,8}\\.com", "[a-zA-Z ]{0,200}").prop_map(
            |(title, url, content)| RawResult {
                title,
                url,
                content,
                ..Default::default()
            },
        )
    }

    proptest! {
        #[test]
        fn shaping_bounded_input_is_identity(
            results in prop::collection::vec(short_result(), 1..=10),
            total in 1u64..1_000_000,
        ) {
            let rs = set(total, results.clone());
            let out = shape(&rs, ShapeOptions::compact());
            prop_assert_eq!(out.items().len(), results.len());
            for (i, (it, r)) in out.items().iter().zip(results.iter()).enumerate() {
                prop_assert_eq!(it.rank, i + 1);
                prop_assert_eq!(&it.title, &r.title);
                prop_assert_eq!(&it.url, &r.url);
                prop_assert_eq!(&it.summary, &r.content);
            }
        }

        #[test]
        fn long_content_truncates_to_cap_plus_marker(s in ".{1,900}", cap in 0usize..600) {
            let n = s.chars().count();
            prop_assume!(n > cap);
            let t = truncate_summary(&s, cap);
            prop_assert_eq!(t.chars().count(), cap + TRUNCATION_MARKER.chars().count());
            let prefix: String = s.chars().take(cap).collect();
            prop_assert_eq!(t, format!("{prefix}{TRUNCATION_MARKER}"));
        }

        #[test]
        fn total_passes_through(
            results in prop::collection::vec(short_result(), 0..30),
            total in 1u64..u64::MAX,
        ) {
            let out = shape(&set(total, results.clone()), ShapeOptions::compact());
            prop_assert_eq!(out.total(), total);
            prop_assert_eq!(out.items().len(), results.len().min(ShapeOptions::MAX_ITEMS));
            prop_assert_eq!(out.to_json()["total"].as_u64(), Some(total));
        }
    }
}
