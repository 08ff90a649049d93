use url::Url;

/// Name used when the URL path has no usable segment
const FALLBACK_FILE_NAME: &str = "download";

/// Characters that are not allowed in file names on common filesystems
const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Derives the on-disk file name for a download from the URL's last path segment
///
/// The segment is percent-decoded, reserved and control characters are replaced
/// with `_`, and leading/trailing dots and spaces are stripped.
///
/// # Examples
///
/// ```
/// use reel_queue::url::{file_name_for, normalize_url};
///
/// let url = normalize_url("https://cdn.example.com/media/My%20Clip.mp4?sig=1").unwrap();
/// assert_eq!(file_name_for(&url), "My Clip.mp4");
/// ```
pub fn file_name_for(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");

    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    let sanitized: String = decoded
        .chars()
        .map(|c| {
            if c.is_control() || RESERVED_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = sanitized.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
