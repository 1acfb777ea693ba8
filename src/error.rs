use serde::Deserialize;

use crate::utils::truncate_body;

/// Failure categories for a single probe run.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("could not reach {host}: {source}")]
    Connection {
        host: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },
    #[error("table '{table}' not found: {message}")]
    NotFound { table: String, message: String },
    #[error("request failed with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ProbeError {
    /// Short label used in structured reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Config(_) => "config",
            ProbeError::Connection { .. } => "connection",
            ProbeError::Auth { .. } => "auth",
            ProbeError::NotFound { .. } => "not_found",
            ProbeError::Api { .. } => "api",
            ProbeError::Decode(_) => "decode",
        }
    }

    /// Classify a non-success HTTP response from the REST endpoint.
    pub fn from_response(status: u16, table: &str, body: &str) -> Self {
        let parsed = serde_json::from_str::<PostgrestError>(body).ok();
        let code = parsed.as_ref().and_then(|e| e.code.clone());
        // a 404 without a PostgREST error body comes from the gateway, not the table lookup
        let from_postgrest = parsed
            .as_ref()
            .is_some_and(|e| e.code.is_some() || e.message.is_some());
        let message = parsed
            .map(|e| e.describe())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                let trimmed = truncate_body(body.trim());
                if trimmed.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    trimmed
                }
            });

        let missing_table = matches!(code.as_deref(), Some("PGRST205") | Some("42P01"));
        match status {
            401 | 403 => ProbeError::Auth { status, message },
            404 if from_postgrest => ProbeError::NotFound {
                table: table.to_string(),
                message,
            },
            _ if missing_table => ProbeError::NotFound {
                table: table.to_string(),
                message,
            },
            _ => ProbeError::Api { status, message },
        }
    }
}

/// Error body returned by PostgREST (and the gateway in front of it).
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    hint: Option<String>,
    // the API gateway reports bad keys as {"message": ..., "hint": ...} or {"error": ...}
    error: Option<String>,
}

impl PostgrestError {
    fn describe(&self) -> String {
        let base = self
            .message
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or_default();
        match self.hint.as_deref() {
            Some(hint) if !hint.is_empty() && !base.is_empty() => {
                format!("{} ({})", base, hint)
            }
            _ => base.to_string(),
        }
    }
}
