// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// True for `http(s)://` and protocol-relative URLs.
pub fn is_absolute(href: &str) -> bool {
    href.starts_with("http://") || href.starts_with("https://") || href.starts_with("//")
}

/// Resolve a potentially relative URL against a base URL.
///
/// # Examples
/// ```
/// use content_feeds::utils::url::resolve;
///
/// assert_eq!(
///     resolve("https://example.com/path/", "page.html"),
///     "https://example.com/path/page.html"
/// );
/// ```
pub fn resolve(base: &str, href: &str) -> String {
    if href.is_empty() || href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    Url::parse(base)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Drop the query string and fragment.
pub fn strip_parameters(href: &str) -> String {
    let end = href.find(['?', '#']).unwrap_or(href.len());
    href[..end].to_string()
}

/// Append `/` to the path unless it already ends with one.
///
/// The slash goes before any query string or fragment.
pub fn ensure_trailing_slash(href: &str) -> String {
    let split = href.find(['?', '#']).unwrap_or(href.len());
    let (path, rest) = href.split_at(split);
    if path.is_empty() || path.ends_with('/') {
        return href.to_string();
    }
    format!("{path}/{rest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let base = "https://example.com/path/page";
        assert_eq!(resolve(base, "other"), "https://example.com/path/other");
        assert_eq!(resolve(base, "/root.html"), "https://example.com/root.html");
        assert_eq!(resolve(base, "https://other.com/x"), "https://other.com/x");
        assert_eq!(resolve("not a url", "x.png"), "x.png");
        assert_eq!(resolve(base, ""), "");
    }

    #[test]
    fn test_strip_parameters() {
        assert_eq!(strip_parameters("https://a.org/x?utm=1#top"), "https://a.org/x");
        assert_eq!(strip_parameters("/story#frag"), "/story");
        assert_eq!(strip_parameters("https://a.org/x"), "https://a.org/x");
    }

    #[test]
    fn test_trailing_slash() {
        assert_eq!(ensure_trailing_slash("https://a.org/post"), "https://a.org/post/");
        assert_eq!(ensure_trailing_slash("https://a.org/post/"), "https://a.org/post/");
        assert_eq!(ensure_trailing_slash("https://a.org/post?x=1"), "https://a.org/post/?x=1");
        assert_eq!(ensure_trailing_slash(""), "");
    }

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("https://a.org/img.png"));
        assert!(is_absolute("//cdn.a.org/img.png"));
        assert!(!is_absolute("/img.png"));
        assert!(!is_absolute("img.png"));
    }
}
