//! Endpoint URL construction for the chat service.
//!
//! Base URLs come from flags, the environment, or the config file, so they
//! arrive with or without trailing slashes.

use reqwest::Url;

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use haven::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://thinkai.lat/api/"), "https://thinkai.lat/api");
/// assert_eq!(normalize_base_url("https://thinkai.lat/api//"), "https://thinkai.lat/api");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and a fixed endpoint path without doubling slashes
///
/// # Examples
///
/// ```
/// use haven::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://thinkai.lat/api/", "/chat/stream"),
///     "https://thinkai.lat/api/chat/stream"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}

/// URL of the remote history for `session_id`, with the id percent-encoded
/// as a single path segment. Returns `None` when the base URL cannot be
/// parsed or cannot carry a path.
pub fn construct_history_url(base_url: &str, session_id: &str) -> Option<Url> {
    let mut url = Url::parse(&normalize_base_url(base_url)).ok()?;
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push("history")
        .push(session_id);
    Some(url)
}
