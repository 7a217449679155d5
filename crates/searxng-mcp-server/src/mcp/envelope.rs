use searxng_mcp_core::Error;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidParams,
    SearchFailed,
    Cancelled,
    NotConfigured,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::SearchFailed => "search_failed",
            Self::Cancelled => "cancelled",
            Self::NotConfigured => "not_configured",
        }
    }

    /// Advisory only: nothing in this server retries on its own.
    pub(crate) fn retryable(self) -> bool {
        match self {
            Self::SearchFailed | Self::Cancelled => true,
            // Configuration + invalid input are not retryable without changing something.
            Self::InvalidParams | Self::NotConfigured => false,
        }
    }

    pub(crate) fn for_error(e: &Error) -> Self {
        match e {
            Error::InvalidCategory(_) | Error::InvalidTimeRange(_) => Self::InvalidParams,
            Error::EmptyQuery
            | Error::Transport(_)
            | Error::UnexpectedStatus(_)
            | Error::Decode(_) => Self::SearchFailed,
            Error::Cancelled => Self::Cancelled,
            Error::NotConfigured(_) | Error::Bootstrap(_) => Self::NotConfigured,
        }
    }
}

/// A caller-visible failure: exactly one per failed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ToolFailure {
    pub(crate) code: ErrorCode,
    pub(crate) message: String,
    pub(crate) hint: String,
}

impl ToolFailure {
    pub(crate) fn invalid_params(message: impl ToString, hint: impl ToString) -> Self {
        Self {
            code: ErrorCode::InvalidParams,
            message: message.to_string(),
            hint: hint.to_string(),
        }
    }

    /// Wrap a backend (or cancellation) error, prefixed with the tool's failure label.
    pub(crate) fn from_error(prefix: &str, e: &Error) -> Self {
        Self {
            code: ErrorCode::for_error(e),
            message: format!("{prefix}: {e}"),
            hint: search_failed_hint(e).to_string(),
        }
    }

    pub(crate) fn to_value(&self) -> serde_json::Value {
        error_obj(self.code, &self.message, &self.hint)
    }
}

fn search_failed_hint(e: &Error) -> &'static str {
    match e {
        Error::Transport(_) => {
            "Check that SearXNG is reachable at the configured --url (or start the server with --auto-launch)."
        }
        Error::UnexpectedStatus(403) => {
            "SearXNG refused the request. Make sure `json` is listed under search.formats in settings.yml."
        }
        Error::UnexpectedStatus(429) => {
            "SearXNG is rate-limiting (HTTP 429). Retry later or relax the instance's limiter settings."
        }
        Error::UnexpectedStatus(_) => "SearXNG returned an error status. Check the instance logs.",
        Error::Decode(_) => {
            "The backend did not return SearXNG JSON. Make sure `json` is listed under search.formats in settings.yml."
        }
        Error::Cancelled => "The request was cancelled before the backend answered.",
        Error::EmptyQuery => "Provide a non-empty query string.",
        Error::InvalidCategory(_) | Error::InvalidTimeRange(_) => {
            "Use one of the listed values."
        }
        Error::NotConfigured(_) | Error::Bootstrap(_) => "Check the server configuration.",
    }
}

pub(crate) const SCHEMA_VERSION: u64 = 1;

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
}

pub(crate) fn error_obj(
    code: ErrorCode,
    message: impl ToString,
    hint: impl ToString,
) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: String,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: hint.to_string(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": hint.to_string(),
            "retryable": code.retryable()
        }),
    }
}
