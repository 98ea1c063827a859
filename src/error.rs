use std::path::PathBuf;

/// Every failure an action can report. Parsing magnitude strings is not in
/// here on purpose: bad stat text silently becomes 0.
#[derive(Debug, thiserror::Error)]
pub enum ClanError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClanError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// HTTP status code the server answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Auth(_) => 401,
            Self::NotFound(_) => 404,
            Self::ExternalService(_) => 502,
            Self::Storage { .. } | Self::Json(_) | Self::Config(_) | Self::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClanError>;
