use serde::Deserialize;

/// Longest slice of an unparseable error body we keep for logging.
const MAX_RAW_PREAMBLE: usize = 150;

/// A structured failure from an OCI CLI invocation.
///
/// The CLI reports service errors as a human-readable preamble followed by a
/// JSON object carrying `code`, `message`, and `status`. Local failures
/// (spawn errors, garbage output) are normalised into the same shape so that
/// every caller sees one error type.
#[derive(Debug, Clone)]
pub struct CliFailure {
    /// The raw error payload as captured from the process.
    pub raw: String,
    /// Human-readable text preceding the JSON body, if any.
    pub preamble: String,
    /// Service error code, `Unknown` if the body carried none,
    /// `NonJsonResponse` if there was no parseable body at all.
    pub code: String,
    /// Service error message, absent for non-JSON responses.
    pub message: Option<String>,
    /// HTTP status reported by the service, 500 when unknown.
    pub status: u16,
}

/// The JSON error body emitted by the OCI CLI on service failures.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    status: Option<serde_json::Value>,
}

impl CliFailure {
    /// Parse a raw error payload. Total: any byte string yields a failure.
    pub fn parse(raw: &str) -> Self {
        let Some(brace) = raw.find('{') else {
            return Self::non_json(raw, raw.trim());
        };

        let (preamble, body) = raw.split_at(brace);
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => Self {
                raw: raw.to_string(),
                preamble: preamble.trim().to_string(),
                code: parsed.code.unwrap_or_else(|| "Unknown".to_string()),
                message: parsed.message,
                status: parse_status(parsed.status.as_ref()),
            },
            Err(_) => {
                let truncated: String = raw.chars().take(MAX_RAW_PREAMBLE).collect();
                Self::non_json(raw, truncated.trim())
            }
        }
    }

    fn non_json(raw: &str, preamble: &str) -> Self {
        Self {
            raw: raw.to_string(),
            preamble: preamble.to_string(),
            code: "NonJsonResponse".to_string(),
            message: None,
            status: 500,
        }
    }
}

fn parse_status(status: Option<&serde_json::Value>) -> u16 {
    match status {
        Some(serde_json::Value::Number(n)) => n.as_u64().map(|v| v as u16).unwrap_or(500),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(500),
        _ => 500,
    }
}

impl std::fmt::Display for CliFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{} (status {}): {}", self.code, self.status, msg),
            None if !self.preamble.is_empty() => {
                write!(f, "{} (status {}): {}", self.code, self.status, self.preamble)
            }
            None => write!(f, "{} (status {})", self.code, self.status),
        }
    }
}

impl std::error::Error for CliFailure {}
