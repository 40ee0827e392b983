use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// FastAPI error body: `detail` is a string for HTTPException and a list of
/// `{loc, msg, type}` entries for request validation failures.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Items(Vec<ErrorItem>),
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    msg: String,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the human-readable reason out of a FastAPI error body.
    pub fn parse_detail(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        let message = match parsed.detail {
            ErrorDetail::Message(msg) => msg,
            ErrorDetail::Items(items) => items
                .into_iter()
                .map(|item| item.msg)
                .collect::<Vec<_>>()
                .join("; "),
        };
        let message = message.trim().to_string();
        (!message.is_empty()).then_some(message)
    }

    /// Map an error response to a variant.
    ///
    /// Client errors keep only a parsed `detail`, since their reason is shown
    /// to users; anything else (a proxy's HTML page, say) leaves it empty.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = Self::parse_detail(body);
        if detail.is_none() && !body.trim().is_empty() {
            debug!(%status, body = %Self::truncate_body(body), "Error response without a detail");
        }
        match status.as_u16() {
            400 | 422 => ApiError::Rejected(detail.unwrap_or_default()),
            404 => ApiError::NotFound(detail.unwrap_or_default()),
            409 => ApiError::Conflict(detail.unwrap_or_default()),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(detail.unwrap_or_else(|| Self::truncate_body(body))),
            _ => ApiError::InvalidResponse(format!(
                "Status {}: {}",
                status,
                detail.unwrap_or_else(|| Self::truncate_body(body))
            )),
        }
    }

    /// The reason the server gave, when it gave one we can show to a user.
    pub fn server_reason(&self) -> Option<&str> {
        match self {
            ApiError::Rejected(reason) | ApiError::Conflict(reason) | ApiError::NotFound(reason)
                if !reason.is_empty() =>
            {
                Some(reason.as_str())
            }
            _ => None,
        }
    }
}

/// Convert any client error into a message for the user.
///
/// Server rejections carry their own reason; transport failures and
/// unexpected responses fall back to `fallback`.
pub fn user_message(err: &anyhow::Error, fallback: &str) -> String {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ApiError>())
        .and_then(|api| api.server_reason())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_parse_detail_string() {
        let body = r#"{"detail": "This team is already registered for this event"}"#;
        assert_eq!(
            ApiError::parse_detail(body).as_deref(),
            Some("This team is already registered for this event")
        );
    }

    #[test]
    fn test_parse_detail_validation_list() {
        let body = r#"{"detail": [{"loc": ["body", "members", 0, "email"], "msg": "value is not a valid email address", "type": "value_error"}, {"loc": ["body"], "msg": "field required", "type": "missing"}]}"#;
        assert_eq!(
            ApiError::parse_detail(body).as_deref(),
            Some("value is not a valid email address; field required")
        );
    }

    #[test]
    fn test_parse_detail_garbage() {
        assert!(ApiError::parse_detail("<html>Bad Gateway</html>").is_none());
        assert!(ApiError::parse_detail(r#"{"detail": "  "}"#).is_none());
    }

    #[test]
    fn test_from_status_mapping() {
        let body = r#"{"detail": "Discount code not found or invalid for selected module"}"#;
        match ApiError::from_status(StatusCode::NOT_FOUND, body) {
            ApiError::NotFound(reason) => {
                assert_eq!(reason, "Discount code not found or invalid for selected module")
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, "{}"),
            ApiError::Rejected(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "oops"),
            ApiError::ServerError(_)
        ));
    }

    #[test]
    fn test_non_json_client_error_has_no_user_reason() {
        let page = "<html><body><h1>409 Conflict</h1>nginx</body></html>";
        for status in [StatusCode::BAD_REQUEST, StatusCode::NOT_FOUND, StatusCode::CONFLICT] {
            let err = ApiError::from_status(status, page);
            assert_eq!(err.server_reason(), None, "{status}");
            let err: anyhow::Error = err.into();
            assert_eq!(user_message(&err, "Registration failed"), "Registration failed");
        }

        match ApiError::from_status(StatusCode::BAD_GATEWAY, page) {
            ApiError::ServerError(body) => assert!(body.contains("nginx")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "é".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));
    }

    #[test]
    fn test_user_message_prefers_server_reason() {
        let err: anyhow::Error = ApiError::Conflict("Team name taken".to_string()).into();
        let err = err.context("Failed to register team");
        assert_eq!(user_message(&err, "Registration failed"), "Team name taken");

        let err: anyhow::Error = ApiError::ServerError("boom".to_string()).into();
        assert_eq!(user_message(&err, "Registration failed"), "Registration failed");

        let err = anyhow::anyhow!("connection reset");
        assert_eq!(user_message(&err, "Payment submission failed"), "Payment submission failed");
    }
}
