use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Your session has expired or is invalid. Sign in again with `quill auth login`.")]
    Unauthorized { detail: Option<String> },
    #[error("Not found{}", detail_suffix(.detail))]
    NotFound { detail: Option<String> },
    #[error("Request failed with status {status}{}", detail_suffix(.detail))]
    Status { status: u16, detail: Option<String> },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => return format!(": {detail}"),
        None => return "".to_string(),
    }
}

impl ApiError {
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { detail }
            | ApiError::NotFound { detail }
            | ApiError::Status { detail, .. } => return detail.as_deref(),
            _ => return None,
        }
    }

    /// Message shown for a failed sign-in style call. Prefers the server's
    /// explanation, then the transport error, then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        if let Some(detail) = self.detail() {
            return detail.to_string();
        }

        if let ApiError::Transport(err) = self {
            return err.to_string();
        }

        return fallback.to_string();
    }

    pub fn is_unauthorized(&self) -> bool {
        return matches!(self, ApiError::Unauthorized { .. });
    }

    pub fn is_not_found(&self) -> bool {
        return matches!(self, ApiError::NotFound { .. });
    }
}

/// Pulls `detail` out of an error body. Validation errors send a list, which
/// is kept as its JSON text.
pub fn parse_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::Null => return None,
        serde_json::Value::String(text) => return Some(text.to_string()),
        other => return Some(other.to_string()),
    }
}
