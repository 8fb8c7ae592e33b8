use http::Uri;

/// Combines a base URI with the path and query of another URI.
///
/// The scheme and authority always come from `base`; the path of `append` is
/// placed under the base path and its query replaces any base query. Dot
/// segments in `append` are resolved first, so the result never leaves the
/// base path.
///
/// # Examples
///
/// ```
/// use http::Uri;
/// use gitea_proxy::utils::combine_uris;
///
/// let base = "https://git.example.com/base".parse::<Uri>().unwrap();
/// let append = "/x/y?page=1".parse::<Uri>().unwrap();
/// let combined = combine_uris(&base, &append).unwrap();
/// assert_eq!(combined.to_string(), "https://git.example.com/base/x/y?page=1");
/// ```
pub fn combine_uris(base: &Uri, append: &Uri) -> Result<Uri, http::Error> {
    combine_path(base, append.path(), append.query())
}

/// Same as [`combine_uris`] for an already split path and query.
pub fn combine_path(base: &Uri, path: &str, query: Option<&str>) -> Result<Uri, http::Error> {
    let base_path = base.path().trim_end_matches('/');
    let append_path = remove_dot_segments(path);

    let mut path_and_query = format!("{}/{}", base_path, append_path.trim_start_matches('/'));
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }

    let mut builder = Uri::builder().path_and_query(path_and_query);
    if let Some(scheme) = base.scheme() {
        builder = builder.scheme(scheme.as_str());
    }
    if let Some(authority) = base.authority() {
        builder = builder.authority(authority.as_str());
    }
    builder.build()
}

/// Resolves `.` and `..` segments in an absolute path (RFC 3986, 5.2.4).
/// `..` at the root is dropped.
pub fn remove_dot_segments(path: &str) -> String {
    let mut output: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let last = segments.len().saturating_sub(1);

    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." => {
                if i == last {
                    output.push("");
                }
            }
            ".." => {
                output.pop();
                if i == last {
                    output.push("");
                }
            }
            other => output.push(other),
        }
    }
    format!("/{}", output.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combine(base: &str, append: &str) -> String {
        combine_uris(&base.parse().unwrap(), &append.parse().unwrap())
            .unwrap()
            .to_string()
    }

    #[test]
    fn joins_under_base_path() {
        assert_eq!(
            combine("https://git.example.com/base", "/x/y"),
            "https://git.example.com/base/x/y"
        );
        assert_eq!(
            combine("https://git.example.com/base/", "/x/y"),
            "https://git.example.com/base/x/y"
        );
        assert_eq!(combine("http://127.0.0.1:3001", "/"), "http://127.0.0.1:3001/");
    }

    #[test]
    fn query_comes_from_append() {
        assert_eq!(
            combine("http://git.local/?token=a", "/o/r?go-get=1"),
            "http://git.local/o/r?go-get=1"
        );
        assert_eq!(combine("http://git.local", "/o/r?"), "http://git.local/o/r");
    }

    #[test]
    fn base_scheme_and_host_win() {
        assert_eq!(
            combine("https://git.example.com/base", "http://evil.example.org/x"),
            "https://git.example.com/base/x"
        );
    }

    #[test]
    fn dot_segments_cannot_escape_base() {
        assert_eq!(
            combine("https://git.example.com/base", "/a/../../etc/passwd"),
            "https://git.example.com/base/etc/passwd"
        );
        assert_eq!(remove_dot_segments("/a/./b/"), "/a/b/");
        assert_eq!(remove_dot_segments("/a/b/.."), "/a/");
        assert_eq!(remove_dot_segments("/a/b/."), "/a/b/");
        assert_eq!(remove_dot_segments("/"), "/");
    }
}
