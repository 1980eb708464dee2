//! Fetching and caching the apiDoc text.
//!
//! # Design
//! `ApiDocCache` is an explicit value naming one file. Whoever builds the
//! endpoint tree owns it and decides when to refresh; there is no
//! process-wide state. The cache is valid whenever the file exists.
//!
//! A copy of the documentation ships with the crate (`BUNDLED_APIDOC`) so
//! the client still works when neither the cache nor the network is
//! available.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::apidoc::parse_apidoc;
use crate::error::{ApiError, CacheError};
use crate::http::{HttpMethod, HttpRequest, Transport};

/// Versioned location of the extracted apiDoc text.
pub const DEFAULT_APIDOC_URL: &str =
    "https://raw.githubusercontent.com/ASMfreaK/habitipy/master/habitipy/apidoc.txt";

/// Documentation bundled at build time.
pub const BUNDLED_APIDOC: &str = include_str!("../apidoc.txt");

/// Download the raw apiDoc text from `url`.
pub fn fetch_apidoc(transport: &dyn Transport, url: &str) -> Result<String, ApiError> {
    tracing::info!(url, "downloading api documentation");
    let request = HttpRequest {
        method: HttpMethod::Get,
        url: url.to_string(),
        headers: Vec::new(),
        body: None,
    };
    let response = transport.execute(&request)?;
    if !response.is_success() {
        return Err(ApiError::Api {
            status: response.status,
            message: format!("could not download api documentation from {url}"),
        });
    }
    Ok(response.body)
}

/// Where the text handed out by `ApiDocCache::load` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocSource {
    Cache,
    Remote,
    Bundled,
}

#[derive(Debug, Clone)]
pub struct ApiDocCache {
    path: PathBuf,
}

impl ApiDocCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn io_error(&self, source: io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Cached text, or `None` when there is no cache file.
    pub fn read(&self) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    pub fn write(&self, text: &str) -> Result<(), CacheError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        fs::write(&self.path, text).map_err(|e| self.io_error(e))
    }

    /// Download the documentation and overwrite the cache. Text that does
    /// not parse is never written.
    pub fn refresh(&self, transport: &dyn Transport, url: &str) -> Result<String, CacheError> {
        let text = fetch_apidoc(transport, url)?;
        parse_apidoc(&text)?;
        self.write(&text)?;
        tracing::info!(path = %self.path.display(), "api documentation cached");
        Ok(text)
    }

    /// Cached text if present; otherwise download and cache it. A failed
    /// or unparseable download falls back to the bundled copy.
    pub fn load(&self, transport: &dyn Transport, url: &str) -> Result<(String, DocSource), CacheError> {
        if let Some(text) = self.read()? {
            tracing::debug!(path = %self.path.display(), "using cached api documentation");
            return Ok((text, DocSource::Cache));
        }
        match self.refresh(transport, url) {
            Ok(text) => Ok((text, DocSource::Remote)),
            Err(e @ (CacheError::Fetch(_) | CacheError::Invalid(_))) => {
                tracing::warn!(error = %e, "falling back to bundled api documentation");
                Ok((BUNDLED_APIDOC.to_string(), DocSource::Bundled))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::{ParseError, TransportError};
    use crate::http::HttpResponse;
    use crate::tree::EndpointNode;

    struct Fixed {
        status: u16,
        body: &'static str,
        calls: Cell<usize>,
    }

    impl Fixed {
        fn new(status: u16) -> Self {
            Self::with_body(status, "@api {get} /api/v3/status Get status\n")
        }

        fn with_body(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                calls: Cell::new(0),
            }
        }
    }

    impl Transport for Fixed {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.set(self.calls.get() + 1);
            Ok(HttpResponse {
                status: self.status,
                headers: Vec::new(),
                body: self.body.to_string(),
            })
        }
    }

    struct Offline;

    impl Transport for Offline {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError("network unreachable".to_string()))
        }
    }

    #[test]
    fn missing_cache_is_fetched_then_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ApiDocCache::new(dir.path().join("nested").join("apidoc.txt"));
        let transport = Fixed::new(200);

        let (text, source) = cache.load(&transport, "http://docs").unwrap();
        assert_eq!(source, DocSource::Remote);
        assert!(text.contains("/api/v3/status"));
        assert!(cache.exists());

        let (again, source) = cache.load(&transport, "http://docs").unwrap();
        assert_eq!(source, DocSource::Cache);
        assert_eq!(again, text);
        assert_eq!(transport.calls.get(), 1);
    }

    #[test]
    fn refresh_overwrites_existing_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ApiDocCache::new(dir.path().join("apidoc.txt"));
        cache.write("stale").unwrap();
        cache.refresh(&Fixed::new(200), "http://docs").unwrap();
        assert!(cache.read().unwrap().unwrap().starts_with("@api"));
    }

    #[test]
    fn failed_download_falls_back_to_bundled() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ApiDocCache::new(dir.path().join("apidoc.txt"));

        let (text, source) = cache.load(&Offline, "http://docs").unwrap();
        assert_eq!(source, DocSource::Bundled);
        assert_eq!(text, BUNDLED_APIDOC);
        assert!(!cache.exists());

        let (_, source) = cache.load(&Fixed::new(503), "http://docs").unwrap();
        assert_eq!(source, DocSource::Bundled);
    }

    #[test]
    fn unparseable_download_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ApiDocCache::new(dir.path().join("apidoc.txt"));
        let portal = Fixed::with_body(200, "<html>captive portal</html>");

        let err = cache.refresh(&portal, "http://docs").unwrap_err();
        assert!(matches!(err, CacheError::Invalid(ParseError::Empty)), "{err}");
        assert!(!cache.exists());

        let (text, source) = cache.load(&portal, "http://docs").unwrap();
        assert_eq!(source, DocSource::Bundled);
        assert_eq!(text, BUNDLED_APIDOC);
        assert!(!cache.exists());

        let (_, source) = cache.load(&portal, "http://docs").unwrap();
        assert_eq!(source, DocSource::Bundled);
        assert_eq!(portal.calls.get(), 3);
    }

    #[test]
    fn fetch_reports_http_failure() {
        let err = fetch_apidoc(&Fixed::new(404), "http://docs").unwrap_err();
        assert!(matches!(err, ApiError::Api { status: 404, .. }));
    }

    #[test]
    fn bundled_documentation_parses_cleanly() {
        let (tree, skipped) = EndpointNode::from_apidoc(BUNDLED_APIDOC).unwrap();
        assert!(skipped.is_empty(), "{skipped:?}");
        assert!(tree.leaves_are_terminal());
        assert!(tree.endpoints().len() >= 10);
    }
}
