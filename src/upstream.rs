//! Client side of the proxy: sends rewritten requests to the upstream.

use std::error::Error as StdError;

use anyhow::{Context as _, anyhow};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri, Version, header};
use http_body_util::{BodyExt as _, Empty, combinators::BoxBody};
use hyper::body::{Body as _, Bytes, Incoming};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tracing::{debug, warn};

use crate::config::ClientOptions;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Body type of requests sent upstream.
pub type ProxyBody = BoxBody<Bytes, BoxError>;

type HttpsClient = Client<HttpsConnector<HttpConnector>, ProxyBody>;

/// Headers that identify the caller and must not follow a redirect to
/// another host.
const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "www-authenticate", "cookie", "cookie2"];

/// The single upstream every request is forwarded to.
#[derive(Debug, Clone)]
pub struct Upstream {
    /// Base address, read once at startup
    base: Uri,
    options: ClientOptions,
    client: HttpsClient,
}

impl Upstream {
    pub fn new(base: Uri, options: ClientOptions) -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        debug!(
            "Created upstream client for {} (max_redirects: {}, timeout: {:?}, preserve_host: {})",
            base, options.max_redirects, options.upstream_timeout, options.preserve_host
        );
        Self {
            base,
            options,
            client,
        }
    }

    pub fn base(&self) -> &Uri {
        &self.base
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Sends `request` upstream, following redirects according to the
    /// configured policy. The request URI must be absolute.
    pub async fn send(&self, request: Request<ProxyBody>) -> anyhow::Result<Response<Incoming>> {
        match self.options.upstream_timeout {
            Some(limit) => tokio::time::timeout(limit, self.send_following_redirects(request))
                .await
                .map_err(|_| anyhow!("Upstream did not respond within {:?}", limit))?,
            None => self.send_following_redirects(request).await,
        }
    }

    async fn send_following_redirects(
        &self,
        request: Request<ProxyBody>,
    ) -> anyhow::Result<Response<Incoming>> {
        let (mut parts, body) = request.into_parts();
        let has_body = !body.is_end_stream();
        let mut body = Some(body);
        let mut redirects = 0;

        loop {
            let mut outgoing = Request::builder()
                .method(parts.method.clone())
                .uri(parts.uri.clone())
                .version(Version::HTTP_11)
                .body(body.take().unwrap_or_else(empty_body))?;
            *outgoing.headers_mut() = parts.headers.clone();

            debug!("Sending {} {} upstream", parts.method, parts.uri);
            let response = self
                .client
                .request(outgoing)
                .await
                .with_context(|| format!("Request to {} failed", parts.uri))?;

            let Some(redirect) = redirect_for(&parts.method, has_body, &response) else {
                return Ok(response);
            };
            if self.options.max_redirects == 0 {
                return Ok(response);
            }
            // the max_redirects-th redirect in a chain is an error
            redirects += 1;
            if redirects >= self.options.max_redirects {
                return Err(anyhow!("Stopped after {} redirects", redirects));
            }

            let target = resolve_location(&parts.uri, &redirect.location)?;
            debug!(
                "Following {} redirect {}/{} to {}",
                response.status(),
                redirects,
                self.options.max_redirects,
                target
            );
            // releases the redirect body and its connection
            drop(response);

            if !same_host(&parts.uri, &target) {
                for name in SENSITIVE_HEADERS {
                    parts.headers.remove(name);
                }
                parts.headers.remove(header::HOST);
            }
            if !redirect.keep_body {
                parts.headers.remove(header::CONTENT_LENGTH);
            }
            parts.method = redirect.method;
            parts.uri = target;
        }
    }
}

struct Redirect {
    method: Method,
    location: String,
    keep_body: bool,
}

/// Decides whether `response` is a redirect worth following, the way a plain
/// HTTP client would.
fn redirect_for(
    method: &Method,
    has_body: bool,
    response: &Response<Incoming>,
) -> Option<Redirect> {
    let status = response.status();
    let (method, keep_body) = match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => {
            // only GET and HEAD survive; anything else is re-sent as GET
            let keep_method = *method == Method::GET || *method == Method::HEAD;
            (if keep_method { method.clone() } else { Method::GET }, false)
        }
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => {
            if has_body {
                warn!("Not following {} redirect: request body cannot be replayed", status);
                return None;
            }
            (method.clone(), true)
        }
        _ => return None,
    };

    let location = location(response.headers())?;
    Some(Redirect {
        method,
        location,
        keep_body,
    })
}

fn location(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Resolves a `Location` value against the URI of the request that produced it.
pub fn resolve_location(current: &Uri, location: &str) -> anyhow::Result<Uri> {
    let base = url::Url::parse(&current.to_string())
        .with_context(|| format!("Cannot resolve redirect from {current}"))?;
    let target = base
        .join(location)
        .with_context(|| format!("Invalid redirect location {location:?}"))?;
    match target.scheme() {
        "http" | "https" => Ok(target.as_str().parse()?),
        other => Err(anyhow!("Redirect to unsupported scheme {other}")),
    }
}

fn same_host(a: &Uri, b: &Uri) -> bool {
    a.authority() == b.authority()
}

fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}
