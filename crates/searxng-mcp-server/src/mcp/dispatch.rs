//! Shared validate → query → backend → shape pipeline behind every search tool.
//!
//! Each tool contributes only its argument record and a [`ToolRequest`] impl with its
//! tool-specific checks; presence checks, format selection, cancellation, and error
//! wrapping happen once here.

use super::envelope::{add_envelope_fields, ToolFailure};
use schemars::JsonSchema;
use searxng_mcp_core::{
    shape, AdvancedOptions, Category, Error, Filters, Query, ResultSet, SearchBackend,
    ShapeOptions, ShapedOutput, TimeRange,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl OutputFormat {
    fn parse(raw: Option<&str>) -> Result<Self, ToolFailure> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("json") => Ok(Self::Json),
            Some("text") => Ok(Self::Text),
            Some(other) => Err(ToolFailure::invalid_params(
                format!("unknown format: {other}"),
                "format must be one of: json, text",
            )),
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }

    fn shape_options(self) -> ShapeOptions {
        match self {
            Self::Json => ShapeOptions::compact(),
            Self::Text => ShapeOptions::narrative(),
        }
    }
}

fn format_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "string",
        "enum": ["json", "text"],
        "description": "Output format: json (default; compact structured results) or text (readable summary that echoes active filters)."
    })
}

fn categories_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    let names = Category::names();
    schemars::json_schema!({
        "type": "array",
        "items": { "type": "string", "enum": names },
        "minItems": 1,
        "description": format!("Categories to search in. Available: {}", names.join(", "))
    })
}

fn time_range_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    let names = TimeRange::names();
    schemars::json_schema!({
        "type": "string",
        "enum": names,
        "description": format!("Time range for search results. Available: {}", names.join(", "))
    })
}

fn page_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "integer",
        "minimum": Query::DEFAULT_PAGE,
        "maximum": Query::MAX_PAGE,
        "description": format!("Page number for pagination ({}-{})", Query::DEFAULT_PAGE, Query::MAX_PAGE)
    })
}

fn text_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({ "type": "string" })
}

// Argument decoding never fails on a wrongly typed value: the value is carried through so
// validation can reject it with a tool error instead of a protocol error.

/// Non-string values count as absent.
fn string_or_absent<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Non-string values are kept as their JSON text so validation can name them.
fn string_or_json_text<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => None,
        Some(v) => Some(token_text(v)),
    })
}

/// A bare token is a one-element list.
fn one_or_many_tokens<'de, D>(d: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items.into_iter().map(token_text).collect()),
        Some(v) => Some(vec![token_text(v)]),
    })
}

fn token_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Integers, integral floats and numeric strings all name a page.
fn page_number(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i32::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema, Default)]
pub(crate) struct SearchArgs {
    /// The search query to execute.
    #[serde(default, deserialize_with = "string_or_absent")]
    #[schemars(schema_with = "text_schema")]
    pub(crate) query: Option<String>,
    #[serde(default, deserialize_with = "string_or_json_text")]
    #[schemars(schema_with = "format_schema")]
    pub(crate) format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema, Default)]
pub(crate) struct CategorySearchArgs {
    /// The search query to execute.
    #[serde(default, deserialize_with = "string_or_absent")]
    #[schemars(schema_with = "text_schema")]
    pub(crate) query: Option<String>,
    #[serde(default, deserialize_with = "one_or_many_tokens")]
    #[schemars(schema_with = "categories_schema")]
    pub(crate) categories: Option<Vec<String>>,
    #[serde(default, deserialize_with = "string_or_json_text")]
    #[schemars(schema_with = "format_schema")]
    pub(crate) format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema, Default)]
pub(crate) struct AdvancedSearchArgs {
    /// The search query to execute.
    #[serde(default, deserialize_with = "string_or_absent")]
    #[schemars(schema_with = "text_schema")]
    pub(crate) query: Option<String>,
    /// Language code for search results (e.g. "en", "fr", "es"). Passed through as-is.
    #[serde(default, deserialize_with = "string_or_absent")]
    #[schemars(schema_with = "text_schema")]
    pub(crate) language: Option<String>,
    #[serde(default, deserialize_with = "string_or_json_text")]
    #[schemars(schema_with = "time_range_schema")]
    pub(crate) time_range: Option<String>,
    #[serde(default)]
    #[schemars(schema_with = "page_schema")]
    pub(crate) page: Option<Value>,
    #[serde(default, deserialize_with = "string_or_json_text")]
    #[schemars(schema_with = "format_schema")]
    pub(crate) format: Option<String>,
}

pub(crate) trait ToolRequest {
    const KIND: &'static str;
    /// Prefix for backend failures, e.g. "Category search failed".
    const FAILURE_LABEL: &'static str;

    fn raw_query(&self) -> Option<&str>;
    fn raw_format(&self) -> Option<&str>;
    /// Tool-specific checks. `text` has already passed the shared presence check.
    fn build_query(&self, text: String) -> Result<Query, ToolFailure>;
}

impl ToolRequest for SearchArgs {
    const KIND: &'static str = "search";
    const FAILURE_LABEL: &'static str = "Search failed";

    fn raw_query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn raw_format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    fn build_query(&self, text: String) -> Result<Query, ToolFailure> {
        Ok(Query::simple(text))
    }
}

impl ToolRequest for CategorySearchArgs {
    const KIND: &'static str = "search_category";
    const FAILURE_LABEL: &'static str = "Category search failed";

    fn raw_query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn raw_format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    fn build_query(&self, text: String) -> Result<Query, ToolFailure> {
        let raw = self.categories.as_deref().unwrap_or_default();
        if raw.is_empty() {
            return Err(ToolFailure::invalid_params(
                "categories parameter is required and must be a non-empty array",
                format!("Pass one or more of: {}", Category::names().join(", ")),
            ));
        }

        // Collect every bad token so one error reports all of them.
        let mut valid: Vec<Category> = Vec::new();
        let mut invalid: Vec<&str> = Vec::new();
        for token in raw {
            match Category::parse(token) {
                Ok(c) => valid.push(c),
                Err(_) => invalid.push(token),
            }
        }
        if !invalid.is_empty() {
            return Err(ToolFailure::invalid_params(
                format!(
                    "invalid categories found: \"{}\". Please use only valid categories from: [\"{}\"]",
                    invalid.join("\", \""),
                    Category::names().join("\", \"")
                ),
                r#"Example: {"query": "machine learning", "categories": ["science", "it"]}"#,
            ));
        }
        Ok(Query::with_categories(text, valid))
    }
}

impl ToolRequest for AdvancedSearchArgs {
    const KIND: &'static str = "search_advanced";
    const FAILURE_LABEL: &'static str = "Advanced search failed";

    fn raw_query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn raw_format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    fn build_query(&self, text: String) -> Result<Query, ToolFailure> {
        let page = match self.page.as_ref().filter(|v| !v.is_null()) {
            None => None,
            Some(raw) => match page_number(raw).filter(|p| Query::page_in_range(*p)) {
                Some(p) => u32::try_from(p).ok(),
                None => {
                    return Err(ToolFailure::invalid_params(
                        format!(
                            "page parameter must be between {} and {} (got {raw})",
                            Query::DEFAULT_PAGE,
                            Query::MAX_PAGE
                        ),
                        "Omit page for the first page of results.",
                    ))
                }
            },
        };

        // An empty string is treated the same as an absent filter.
        let time_range = match self.time_range.as_deref().filter(|s| !s.is_empty()) {
            None => None,
            Some(token) => Some(TimeRange::parse(token).map_err(|_| {
                ToolFailure::invalid_params(
                    format!(
                        "invalid time_range '{token}'. Valid options are: {}",
                        TimeRange::names().join(", ")
                    ),
                    "Omit time_range to search all dates.",
                )
            })?),
        };

        let language = self
            .language
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Query::advanced(
            text,
            AdvancedOptions {
                language,
                time_range,
                page,
            },
        ))
    }
}

pub(crate) fn validate<R: ToolRequest>(req: &R) -> Result<(Query, OutputFormat), ToolFailure> {
    let text = req
        .raw_query()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ToolFailure::invalid_params(
                "query parameter is required and must be a non-empty string",
                "Pass a non-empty search query.",
            )
        })?;
    let format = OutputFormat::parse(req.raw_format())?;
    let query = req.build_query(text.to_string())?;
    Ok((query, format))
}

/// Run the backend call, aborting it if `ct` fires first.
pub(crate) async fn execute(
    backend: &dyn SearchBackend,
    query: &Query,
    ct: &CancellationToken,
) -> searxng_mcp_core::Result<ResultSet> {
    tokio::select! {
        biased;
        _ = ct.cancelled() => Err(Error::Cancelled),
        r = backend.search(query) => r,
    }
}

/// Result of one tool invocation, independent of the transport that carries it.
#[derive(Debug, Clone)]
pub(crate) struct ToolOutcome {
    pub(crate) ok: bool,
    /// Structured payload (always JSON).
    pub(crate) payload: serde_json::Value,
    /// Text rendering handed to the caller.
    pub(crate) text: String,
}

impl ToolOutcome {
    fn success(
        kind: &str,
        shaped: &ShapedOutput,
        format: OutputFormat,
        filters: &Filters,
        t0: Instant,
    ) -> Self {
        let body = shaped.to_json();
        let text = match format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
            }
            OutputFormat::Text => shaped.render_text(filters),
        };
        let mut payload = body;
        payload["ok"] = serde_json::json!(true);
        payload["format"] = serde_json::json!(format.as_str());
        add_envelope_fields(&mut payload, kind, t0.elapsed().as_millis());
        Self {
            ok: true,
            payload,
            text,
        }
    }

    fn failure(kind: &str, f: &ToolFailure, t0: Instant) -> Self {
        let mut payload = serde_json::json!({
            "ok": false,
            "error": f.to_value()
        });
        add_envelope_fields(&mut payload, kind, t0.elapsed().as_millis());
        Self {
            ok: false,
            payload,
            text: format!("Error: {}", f.message),
        }
    }
}

pub(crate) async fn run<R: ToolRequest>(
    backend: &dyn SearchBackend,
    req: &R,
    ct: &CancellationToken,
) -> ToolOutcome {
    let t0 = Instant::now();

    let (query, format) = match validate(req) {
        Ok(v) => v,
        Err(f) => {
            tracing::debug!(kind = R::KIND, message = %f.message, "rejected tool arguments");
            return ToolOutcome::failure(R::KIND, &f, t0);
        }
    };

    let rs = match execute(backend, &query, ct).await {
        Ok(rs) => rs,
        Err(e) => {
            tracing::warn!(kind = R::KIND, backend = backend.name(), error = %e, "search failed");
            return ToolOutcome::failure(R::KIND, &ToolFailure::from_error(R::FAILURE_LABEL, &e), t0);
        }
    };

    let shaped = shape(&rs, format.shape_options());
    tracing::debug!(
        kind = R::KIND,
        total = shaped.total(),
        shown = shaped.items().len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "tool call ok"
    );
    ToolOutcome::success(R::KIND, &shaped, format, &Filters::from_query(&query), t0)
}
