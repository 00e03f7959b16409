use percent_encoding::percent_decode_str;
use url::Url;

/// Extracts the decoded final path segment of `url`, if any.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }

    let decoded = percent_decode_str(segment).decode_utf8().ok()?;
    Some(decoded.into_owned())
}

/// Joins a mirror base URL and a relative path with exactly one slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/pub/hello-2.12.tar.gz"),
            Some("hello-2.12.tar.gz".to_string())
        );
        assert_eq!(
            filename_from_url("https://example.com/a%20b.tar.xz?x=1"),
            Some("a b.tar.xz".to_string())
        );
        assert_eq!(filename_from_url("https://example.com/dir/"), None);
        assert_eq!(filename_from_url("not a url"), None);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://m.example.org/src/", "/h/hello/1.0/x.tar.gz"),
            "https://m.example.org/src/h/hello/1.0/x.tar.gz"
        );
        assert_eq!(join_url("http://a", "b"), "http://a/b");
    }
}
