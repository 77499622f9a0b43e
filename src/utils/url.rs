//! URL utilities for consistent URL handling
//!
//! This module provides utilities for normalizing URLs to prevent issues
//! with trailing slashes when constructing endpoints, and for deriving the
//! bootstrap address from the WebSocket endpoint.

use url::Url;

/// Normalize a base URL by removing trailing slashes
///
/// This ensures consistent URL construction when appending endpoints,
/// preventing double slashes in the final URLs.
///
/// # Examples
///
/// ```
/// use confab::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1/"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1///"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// This function normalizes the base URL and safely appends the endpoint,
/// ensuring there are no double slashes in the result.
///
/// # Examples
///
/// ```
/// use confab::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1", "chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Check that `endpoint` is an absolute `ws://` or `wss://` URL with a host.
pub fn validate_endpoint(endpoint: &str) -> Result<Url, String> {
    let url = Url::parse(endpoint).map_err(|err| err.to_string())?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(format!("unsupported scheme `{other}`, expected ws or wss")),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("missing host".to_string());
    }
    Ok(url)
}

/// Derive the HTTP address of the bootstrap resource from the WebSocket
/// endpoint: same host and port, `ws` mapped to `http` and `wss` to `https`.
///
/// # Examples
///
/// ```
/// use confab::utils::url::bootstrap_url;
///
/// assert_eq!(
///     bootstrap_url("ws://localhost:5000/ws", "/generate_response").unwrap(),
///     "http://localhost:5000/generate_response"
/// );
/// assert_eq!(
///     bootstrap_url("wss://chat.example.com/socket?v=2", "prime").unwrap(),
///     "https://chat.example.com/prime"
/// );
/// ```
pub fn bootstrap_url(endpoint: &str, path: &str) -> Result<String, String> {
    let mut url = validate_endpoint(endpoint)?;
    let scheme = if url.scheme() == "wss" { "https" } else { "http" };
    url.set_scheme(scheme)
        .map_err(|()| format!("cannot map {endpoint} to {scheme}"))?;
    Ok(construct_api_url(&url.origin().ascii_serialization(), path))
}
