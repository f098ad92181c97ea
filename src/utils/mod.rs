//! Utility functions and helpers.

pub mod http;
pub mod log;

use url::Url;

/// Extract the host (with port, when explicit) from a URL string.
///
/// Used as the key for per-host connection limits.
pub fn host_key(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
