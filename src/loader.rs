//! Schema loading from files and HTTP URLs.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::ResolveError;
use crate::schema::Schema;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `ResolveError::ReadError` if the file can't be read,
/// or `ResolveError::InvalidJson` if the file isn't valid JSON.
pub fn load_document(path: &Path) -> Result<Value, ResolveError> {
    let content = std::fs::read_to_string(path).map_err(|source| ResolveError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ResolveError::InvalidJson {
        path: path.display().to_string(),
        source,
    })
}

/// Decode a JSON document as a schema tree.
///
/// # Errors
///
/// Returns `ResolveError::InvalidJson` if the document doesn't have schema shape.
pub fn parse_schema(document: &Value, source: &str) -> Result<Schema, ResolveError> {
    Schema::deserialize(document).map_err(|source_err| ResolveError::InvalidJson {
        path: source.to_string(),
        source: source_err,
    })
}

/// Load a schema tree from a file path.
///
/// # Errors
///
/// Returns `ResolveError::ReadError` or `ResolveError::InvalidJson`.
pub fn load_schema(path: &Path) -> Result<Schema, ResolveError> {
    let document = load_document(path)?;
    parse_schema(&document, &path.display().to_string())
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Split a `$ref` into its base and its fragment (text after the first `#`).
pub fn split_ref(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (reference, None),
    }
}

/// Resolve `candidate` against the directory of the document at `locator`.
///
/// Returns the path of an existing file, or the reason `candidate` is not a
/// relative file reference.
pub fn relative_file(locator: &str, candidate: &str) -> Result<PathBuf, String> {
    if candidate.is_empty() {
        return Err("empty path is not a relative file".to_string());
    }
    if is_url(candidate) {
        return Err(format!("{candidate} is a URL"));
    }
    let candidate_path = Path::new(candidate);
    if candidate_path.is_absolute() {
        return Err(format!("{candidate} is an absolute path"));
    }

    let base = Path::new(locator).parent().unwrap_or(Path::new(""));
    let path = base.join(candidate_path);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("{} is not a file", path.display()))
    }
}

/// Navigate a JSON Pointer fragment (e.g. "/definitions/foo" or "#/properties/bar").
///
/// An empty fragment addresses the whole document. `source` names the
/// document in the error.
pub fn navigate_fragment(
    document: &Value,
    fragment: &str,
    source: &str,
) -> Result<Value, ResolveError> {
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Ok(document.clone());
    }

    let mut current = document;
    for part in path.split('/') {
        // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
        let key = part.replace("~1", "/").replace("~0", "~");
        let next = match current {
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => current.get(&key),
        };
        current = next.ok_or_else(|| ResolveError::FragmentNotFound {
            fragment: fragment.to_string(),
            path: source.to_string(),
        })?;
    }
    Ok(current.clone())
}

/// Fetches remote schema documents.
pub trait Fetch {
    /// Return the body of a successful GET on `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError>;
}

/// Blocking HTTP fetcher.
///
/// Without the `remote` feature every fetch fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

#[cfg(feature = "remote")]
impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        let fetch_error = |source: reqwest::Error| ResolveError::Fetch {
            url: url.to_string(),
            message: source.to_string(),
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(fetch_error)?;

        let response = client.get(url).send().map_err(fetch_error)?;

        // Check for HTTP errors before reading the body
        let response = response.error_for_status().map_err(fetch_error)?;

        let body = response.bytes().map_err(fetch_error)?;
        Ok(body.to_vec())
    }
}

#[cfg(not(feature = "remote"))]
impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        Err(ResolveError::Fetch {
            url: url.to_string(),
            message: "built without the `remote` feature".to_string(),
        })
    }
}
