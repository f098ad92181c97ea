// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::header::{ACCEPT_ENCODING, HeaderMap, HeaderName, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::HttpConfig;

/// Build the fixed header bag from configuration.
///
/// `Accept-Encoding` is dropped: the client negotiates gzip/deflate itself
/// and only decodes bodies for encodings it advertised.
pub fn build_headers<'a>(
    headers: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| AppError::header(name, e))?;
        if header_name == ACCEPT_ENCODING {
            log::debug!("Ignoring configured Accept-Encoding header");
            continue;
        }
        let header_value = HeaderValue::from_str(value).map_err(|e| AppError::header(name, e))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(build_headers(&config.headers)?)
        .gzip(true)
        .deflate(true)
        .build()?;
    Ok(client)
}

/// Parse a `name: value` header argument.
pub fn parse_header_arg(arg: &str) -> Result<(String, String)> {
    let (name, value) = arg
        .split_once(':')
        .ok_or_else(|| AppError::header(arg, "expected 'name: value'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::header(arg, "empty header name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn build_headers_skips_accept_encoding() {
        let mut headers = BTreeMap::new();
        headers.insert("real-auth-info".to_string(), "token".to_string());
        headers.insert("Accept-Encoding".to_string(), "gzip, br, zstd".to_string());

        let map = build_headers(&headers).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["real-auth-info"], "token");
    }

    #[test]
    fn build_headers_rejects_bad_names() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            build_headers(&headers),
            Err(AppError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn parse_header_arg_splits_on_first_colon() {
        assert_eq!(
            parse_header_arg("real-auth-info: a:b:c").unwrap(),
            ("real-auth-info".to_string(), "a:b:c".to_string())
        );
        assert!(parse_header_arg("no-colon").is_err());
        assert!(parse_header_arg(": value").is_err());
    }

    #[test]
    fn client_builds_with_headers() {
        let mut config = HttpConfig::default();
        config
            .headers
            .insert("real-version".to_string(), "21".to_string());
        assert!(create_async_client(&config).is_ok());
    }
}
