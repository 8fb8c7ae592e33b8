//! Support for `go get` discovery of versioned module paths.
//!
//! The go tool asks for `https://host/owner/repo/v2/pkg?go-get=1` when resolving
//! a major-version import path, but the repository itself lives at
//! `/owner/repo`. For those requests the `v<N>` segment is dropped.

use std::borrow::Cow;

const GO_GET_PARAM: &str = "go-get";

/// Whether the query carries `go-get=1`. Only the first `go-get` value is
/// considered and it must parse as an integer equal to 1.
pub fn is_go_get(query: Option<&str>) -> bool {
    let Some(query) = query else {
        return false;
    };
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == GO_GET_PARAM)
        .and_then(|(_, value)| value.parse::<i64>().ok())
        == Some(1)
}

/// Collapses `/<owner>/<repo>/v<digits>` down to `/<owner>/<repo>`, keeping
/// any trailing segments. Only the first version segment that follows an
/// owner and a repo is removed.
pub fn collapse_version_suffix(path: &str) -> Cow<'_, str> {
    if !path.starts_with('/') {
        return Cow::Borrowed(path);
    }
    // segments[0] is the empty string before the leading slash
    let segments: Vec<&str> = path.split('/').collect();

    let Some(index) = segments
        .iter()
        .enumerate()
        .skip(3)
        .find(|(_, segment)| is_version_segment(segment))
        .map(|(index, _)| index)
    else {
        return Cow::Borrowed(path);
    };

    let kept: Vec<&str> = segments
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, segment)| *segment)
        .collect();
    Cow::Owned(kept.join("/"))
}

/// Applies the go-get rewrite when the query asks for it.
pub fn rewrite_path<'a>(path: &'a str, query: Option<&str>) -> Cow<'a, str> {
    if is_go_get(query) {
        collapse_version_suffix(path)
    } else {
        Cow::Borrowed(path)
    }
}

fn is_version_segment(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}
