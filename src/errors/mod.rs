use thiserror::Error;

/// Failure reported by a remote source client.
///
/// Cycles keep this value around for diagnostics, so it is cheap to clone and
/// compare. Callers branch on the variant (or [`SourceError::kind`]), never on
/// the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Authentication(_) => "authentication",
            SourceError::NotAuthenticated => "not_authenticated",
            SourceError::Transport(_) => "transport",
            SourceError::InvalidResponse(_) => "invalid_response",
        }
    }

    /// True for failures that only new credentials can fix.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            SourceError::Authentication(_) | SourceError::NotAuthenticated
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return SourceError::Authentication(err.to_string());
            }
        }
        if err.is_decode() {
            SourceError::InvalidResponse(err.to_string())
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum GeoFeedError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Remote source errors
    #[error("Reauthentication required: {0}")]
    ReauthRequired(SourceError),

    #[error("Remote source error: {0}")]
    Source(#[from] SourceError),

    // Registry errors
    #[error("Feed already configured: {0}")]
    AlreadyConfigured(String),

    #[error("Feed entry not found: {0}")]
    EntryNotFound(String),

    // User input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Network errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GeoFeedResult<T> = Result<T, GeoFeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_kinds() {
        assert_eq!(SourceError::Authentication("bad".into()).kind(), "authentication");
        assert_eq!(SourceError::NotAuthenticated.kind(), "not_authenticated");
        assert_eq!(SourceError::Transport("reset".into()).kind(), "transport");
        assert_eq!(SourceError::InvalidResponse("eof".into()).kind(), "invalid_response");
    }

    #[test]
    fn test_only_auth_failures_need_credentials() {
        assert!(SourceError::Authentication("bad".into()).is_auth());
        assert!(SourceError::NotAuthenticated.is_auth());
        assert!(!SourceError::Transport("timeout".into()).is_auth());
    }

    #[test]
    fn test_reauth_message_wraps_source_error() {
        let err = GeoFeedError::ReauthRequired(SourceError::Authentication(
            "wrong password".to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "Reauthentication required: Authentication failed: wrong password"
        );
    }
}
