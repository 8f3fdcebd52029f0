use thiserror::Error;

/// Failures surfaced to IPC callers. Each variant has a stable wire code.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    BadParams(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("select a workspace first")]
    NoWorkspace,
    #[error("store query failed: {0:#}")]
    Query(#[source] anyhow::Error),
    #[error("store update failed: {0:#}")]
    Update(#[source] anyhow::Error),
    #[error("render failed: {0:#}")]
    Render(#[source] anyhow::Error),
    #[error("export failed: {0}")]
    Export(#[from] std::io::Error),
    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::BadParams(_) => "bad_params",
            EngineError::NotFound(_) => "not_found",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::NoWorkspace => "no_workspace",
            EngineError::Query(_) => "db_query_failed",
            EngineError::Update(_) => "db_update_failed",
            EngineError::Render(_) => "render_failed",
            EngineError::Export(_) => "export_failed",
            EngineError::Internal(_) => "server_error",
        }
    }

    pub fn bad_params(msg: impl Into<String>) -> Self {
        EngineError::BadParams(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
