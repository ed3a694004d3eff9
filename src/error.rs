use thiserror::Error;

/// Failures talking to the catalog application
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog rejected the scraper token (401)")]
    Unauthorized,

    #[error("catalog returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid catalog URL {0}")]
    InvalidUrl(String),
}

/// Failures acquiring a browser page
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no Chrome executable found ({0}); set CHROME_PATH")]
    NoExecutable(String),

    #[error("failed to start Chrome: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Chrome exited during startup ({0})")]
    Exited(String),

    #[error("DevTools endpoint on port {port} unreachable after {attempts} attempt(s)")]
    Unreachable { port: u16, attempts: u32 },

    #[error("DevTools client: {0}")]
    Http(#[from] reqwest::Error),
}
