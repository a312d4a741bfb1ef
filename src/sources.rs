//! Where the gold files come from.
//!
//! A [`Source`] is one base location (a directory or an HTTP base URL).
//! For each logical file the loader queries every source concurrently and
//! keeps the first one, in the caller's order, that returned real content.

use crate::decoder::is_pointer_file;
use crate::error::SourceError;
use async_trait::async_trait;
use futures::stream::{FuturesOrdered, StreamExt};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for one HTTP request, body included.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Source: Send + Sync {
    /// Human-readable location, used in logs.
    fn describe(&self) -> String;

    /// Raw text of `name` relative to this source.
    async fn fetch_text(&self, name: &str) -> Result<String, SourceError>;
}

/// A local directory.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Source for FsSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn fetch_text(&self, name: &str) -> Result<String, SourceError> {
        let path = self.root.join(name);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| SourceError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

/// An HTTP(S) base URL serving static files.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base: String,
}

impl HttpSource {
    pub fn new(base: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to a default HTTP client");
                reqwest::Client::new()
            });
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Source for HttpSource {
    fn describe(&self) -> String {
        self.base.clone()
    }

    async fn fetch_text(&self, name: &str) -> Result<String, SourceError> {
        let url = format!("{}/{}", self.base, name);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }
        Ok(resp.text().await?)
    }
}

/// `http://` and `https://` locations become [`HttpSource`]s, anything else
/// a directory.
pub fn source_for(location: &str) -> Box<dyn Source> {
    let l = location.trim();
    if l.starts_with("http://") || l.starts_with("https://") {
        Box::new(HttpSource::new(l))
    } else {
        Box::new(FsSource::new(l))
    }
}

/// Content that is really there: not blank, not a pointer stub.
fn validate(location: String, text: String) -> Result<String, SourceError> {
    if text.trim().is_empty() {
        return Err(SourceError::EmptyBody(location));
    }
    if is_pointer_file(&text) {
        return Err(SourceError::PointerFile(location));
    }
    Ok(text)
}

/// Text of `name` from the first source that has it.
///
/// All sources are queried at once, but results are taken in `sources`
/// order: the first candidate whose content passes validation wins and the
/// fetches still in flight are dropped. The outcome does not depend on which
/// request finished first.
pub async fn resolve_first(
    sources: &[Box<dyn Source>],
    name: &str,
) -> Result<(String, String), SourceError> {
    let mut fetches: FuturesOrdered<_> = sources
        .iter()
        .map(|s| async move {
            let location = format!("{}/{}", s.describe(), name);
            let res = s
                .fetch_text(name)
                .await
                .and_then(|t| validate(location.clone(), t));
            (location, res)
        })
        .collect();

    while let Some((location, res)) = fetches.next().await {
        match res {
            Ok(text) => return Ok((location, text)),
            Err(e @ SourceError::PointerFile(_)) => warn!(error = %e, "skipping candidate"),
            Err(e) => debug!(error = %e, "candidate unavailable"),
        }
    }
    Err(SourceError::NotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MemSource {
        name: &'static str,
        files: HashMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl Source for MemSource {
        fn describe(&self) -> String {
            self.name.to_string()
        }

        async fn fetch_text(&self, name: &str) -> Result<String, SourceError> {
            self.files
                .get(name)
                .map(|s| s.to_string())
                .ok_or_else(|| SourceError::NotFound(name.to_string()))
        }
    }

    fn mem(name: &'static str, files: &[(&'static str, &'static str)]) -> Box<dyn Source> {
        Box::new(MemSource {
            name,
            files: files.iter().copied().collect(),
        })
    }

    #[tokio::test]
    async fn test_first_valid_candidate_wins() {
        let sources = vec![
            mem(
                "a",
                &[("x.csv", "version https://git-lfs.github.com/spec/v1\noid sha256:abc\n")],
            ),
            mem("b", &[("x.csv", "   \n")]),
            mem("c", &[("x.csv", "mese,corse_osservate\n2023-01,1\n")]),
            mem("d", &[("x.csv", "mese\n2099-01\n")]),
        ];
        let (location, text) = resolve_first(&sources, "x.csv").await.unwrap();
        assert_eq!(location, "c/x.csv");
        assert!(text.starts_with("mese,corse"));
    }

    /// Never answers.
    struct StalledSource;

    #[async_trait]
    impl Source for StalledSource {
        fn describe(&self) -> String {
            "stalled".to_string()
        }

        async fn fetch_text(&self, _name: &str) -> Result<String, SourceError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_later_candidate_does_not_block() {
        let sources = vec![
            mem("a", &[("x.csv", "mese,corse_osservate\n2023-01,1\n")]),
            Box::new(StalledSource) as Box<dyn Source>,
        ];
        let found = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            resolve_first(&sources, "x.csv"),
        )
        .await
        .expect("first candidate should settle the lookup");
        assert_eq!(found.unwrap().0, "a/x.csv");
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let sources = vec![mem("a", &[])];
        let err = resolve_first(&sources, "x.csv").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fs_source_reads_relative_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kpi_mese.csv"), "mese\n2023-01\n").unwrap();
        let src = FsSource::new(dir.path());
        assert_eq!(src.fetch_text("kpi_mese.csv").await.unwrap(), "mese\n2023-01\n");
        assert!(matches!(
            src.fetch_text("nope.csv").await,
            Err(SourceError::Io { .. })
        ));
    }
}
