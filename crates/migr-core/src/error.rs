use std::path::PathBuf;

/// Central error type for the migr system.
#[derive(Debug, thiserror::Error)]
pub enum MigrError {
    #[error("unauthorized: check the API token ({message})")]
    Unauthorized {
        message: String,
        request_id: Option<String>,
    },

    #[error("API error ({status}): {message}{}", fmt_request_id(.request_id))]
    Api {
        status: u16,
        message: String,
        request_id: Option<String>,
    },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("import failed for {target_id}: {source}")]
    ImportFailed {
        target_id: String,
        #[source]
        source: Box<MigrError>,
    },

    #[error("polling {handle} gave up after {attempts} attempts")]
    PollExhausted { handle: String, attempts: u32 },

    #[error("circuit breaker open: {failed} failures, {consecutive_batches} consecutive batches failed entirely")]
    CircuitOpen {
        failed: usize,
        consecutive_batches: usize,
    },

    #[error("org {org_id} has custom branches enabled, refusing to sync")]
    CustomBranchEnabled { org_id: String },

    #[error("provider not implemented: {kind}")]
    ProviderNotImplemented { kind: String },

    #[error("invalid target: {message}")]
    InvalidTarget { message: String },

    #[error("path not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("credential error: {message}")]
    CredentialError { message: String },

    #[error("git error: {message}")]
    GitError { message: String },

    #[error("{0}")]
    Other(String),
}

fn fmt_request_id(request_id: &Option<String>) -> String {
    match request_id {
        Some(id) => format!(" (request id {id})"),
        None => String::new(),
    }
}

impl MigrError {
    /// HTTP status carried by the error, if it came from an API response.
    pub fn status(&self) -> Option<u16> {
        match self {
            MigrError::Unauthorized { .. } => Some(401),
            MigrError::Api { status, .. } => Some(*status),
            MigrError::ImportFailed { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Request id header value carried by the error, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            MigrError::Unauthorized { request_id, .. } | MigrError::Api { request_id, .. } => {
                request_id.as_deref()
            }
            MigrError::ImportFailed { source, .. } => source.request_id(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MigrError {
    fn from(e: serde_json::Error) -> Self {
        MigrError::Serialization(e.to_string())
    }
}
