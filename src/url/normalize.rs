use crate::UrlError;
use url::Url;

/// Normalizes a URL into the identity used by the download queue
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace; reject empty input
/// 2. Parse as an absolute URL; reject relative or malformed input
/// 3. Require an `http` or `https` scheme and a non-empty host
/// 4. Remove the fragment (everything after `#`)
///
/// The parser already lowercases the host, drops default ports and resolves
/// dot segments. The query string is kept as-is: media hosts frequently put
/// signed tokens there and two URLs differing only in query are different files.
///
/// # Examples
///
/// ```
/// use reel_queue::url::normalize_url;
///
/// let url = normalize_url("  HTTPS://Cdn.Example.COM:443/v/clip.mp4#t=10 ").unwrap();
/// assert_eq!(url.as_str(), "https://cdn.example.com/v/clip.mp4");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let trimmed = url_str.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut url = Url::parse(trimmed).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    Ok(url)
}
