//! Header handling shared by the inbound and outbound sides of the proxy.
//!
//! Hop-by-hop headers only describe a single transport connection, so they are
//! removed before a request is forwarded and again before a response is relayed.

use std::net::SocketAddr;

use http::{HeaderMap, HeaderName, Uri, Version, header};

/// Headers that must never cross the proxy, in either direction.
pub const HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    HeaderName::from_static("trailers"),
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Removes every hop-by-hop header, including all of its values.
pub fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in &HOP_HEADERS {
        headers.remove(name);
    }
}

/// Appends every value of `src` into `dst`. Existing values in `dst` are kept
/// and multi-valued headers stay separate entries.
pub fn copy_headers(dst: &mut HeaderMap, src: &HeaderMap) {
    for (name, value) in src {
        dst.append(name.clone(), value.clone());
    }
}

/// First value of `name` as a non-empty string.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Identity of the caller for logging: `X-Real-Ip`, then `X-Forwarded-For`,
/// then the transport peer address.
pub fn client_ip(headers: &HeaderMap, peer: &SocketAddr) -> String {
    header_str(headers, &X_REAL_IP)
        .or_else(|| header_str(headers, &X_FORWARDED_FOR))
        .map(str::to_owned)
        .unwrap_or_else(|| peer.to_string())
}

/// Scheme of the original request: the URI scheme when an HTTP/1 request was
/// sent in absolute form, otherwise whatever a fronting proxy put in
/// `X-Forwarded-Proto`. The `:scheme` of an HTTP/2 request is ignored so both
/// protocol versions are judged the same way.
pub fn request_scheme(uri: &Uri, version: Version, headers: &HeaderMap) -> Option<String> {
    let uri_scheme = if version == Version::HTTP_2 {
        None
    } else {
        uri.scheme_str()
    };
    uri_scheme
        .or_else(|| header_str(headers, &X_FORWARDED_PROTO))
        .map(str::to_owned)
}
