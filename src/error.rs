/// Error types for data acquisition
use thiserror::Error;

/// Why a candidate location did not yield usable content.
///
/// These never escape the loader: each one is logged and the affected
/// table becomes empty.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Reading a local file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Content is a version-control pointer stub, not data
    #[error("{0} is a pointer file, not data")]
    PointerFile(String),

    /// Content is empty or whitespace only
    #[error("{0} is empty")]
    EmptyBody(String),

    /// No candidate location produced the file
    #[error("no source provided {0}")]
    NotFound(String),

    /// Manifest text is not valid JSON
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}
