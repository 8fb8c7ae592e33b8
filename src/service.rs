//! The proxy handler.
//!
//! Every inbound request goes through the same pipeline: scheme check, hop
//! header removal, go-get path rewrite, resolution against the upstream base
//! address, dispatch, and relay of the upstream status, headers and body.
//! Request-scoped failures end here as a 400 or 500 response.

use std::{
    convert::Infallible,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use futures::future::BoxFuture;
use http::{HeaderValue, Request, Response, StatusCode, Version, header};
use http_body_util::{BodyExt as _, Full, combinators::BoxBody};
use hyper::{
    body::{Body, Bytes, Incoming},
    service::Service as HyperService,
};
use tracing::{Instrument as _, debug, error, info, info_span, warn};

use crate::{
    goget,
    headers::{client_ip, copy_headers, request_scheme, strip_hop_headers},
    upstream::{BoxError, ProxyBody, Upstream},
    utils::combine_path,
};

/// Body type of every response returned to callers.
pub type ResponseBody = BoxBody<Bytes, hyper::Error>;

/// Forwards requests to the upstream. Cheap to clone: one copy is made per
/// connection so that `from` carries that connection's peer address.
#[derive(Debug, Clone)]
pub struct ProxyService {
    upstream: Arc<Upstream>,
    /// Transport-level address of the caller
    pub from: SocketAddr,
}

impl ProxyService {
    pub fn new(upstream: Arc<Upstream>) -> Self {
        Self {
            upstream,
            from: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        }
    }

    /// Copy of this service bound to a connection's peer address.
    pub fn for_peer(&self, from: SocketAddr) -> Self {
        Self {
            upstream: Arc::clone(&self.upstream),
            from,
        }
    }

    /// Handles one request end to end. Always produces a response.
    ///
    /// Everything logged while handling the request carries the caller's
    /// identity through the `proxy_request` span.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let client = client_ip(request.headers(), &self.from);
        let span = info_span!(
            "proxy_request",
            client = %client,
            method = %request.method(),
            uri = %request.uri()
        );
        self.forward(request, client).instrument(span).await
    }

    async fn forward<B>(&self, request: Request<B>, client: String) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        info!("{} {}", request.method(), request.uri());

        let scheme = request_scheme(request.uri(), request.version(), request.headers())
            .unwrap_or_default();
        if scheme != "http" && scheme != "https" {
            let message = format!("unsupported protocol scheme {scheme}");
            warn!("{}", message);
            return plain_error(StatusCode::BAD_REQUEST, &message);
        }

        let outgoing = match self.prepare(request) {
            Ok(outgoing) => outgoing,
            Err(e) => {
                error!("Cannot build upstream request: {}", e);
                return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "Server Error");
            }
        };
        debug!("Forwarding to {}", outgoing.uri());

        let response = match self.upstream.send(outgoing).await {
            Ok(response) => response,
            Err(e) => {
                error!("Upstream request failed: {:#}", e);
                return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "Server Error");
            }
        };
        info!(status = %response.status(), "Upstream responded");

        relay(response, client)
    }

    /// Turns an inbound request into the request sent upstream: hop headers
    /// removed, go-get path collapsed, URI resolved against the base address.
    pub fn prepare<B>(&self, request: Request<B>) -> Result<Request<ProxyBody>, http::Error>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let (mut parts, body) = request.into_parts();

        strip_hop_headers(&mut parts.headers);

        if self.upstream.options().preserve_host {
            // HTTP/2 callers send the host as :authority only
            if !parts.headers.contains_key(header::HOST) {
                if let Some(value) = parts
                    .uri
                    .authority()
                    .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
                {
                    parts.headers.insert(header::HOST, value);
                }
            }
        } else {
            parts.headers.remove(header::HOST);
        }

        let query = parts.uri.query();
        let path = goget::rewrite_path(parts.uri.path(), query);
        if path != parts.uri.path() {
            debug!("Rewrote go-get path {} to {}", parts.uri.path(), path);
        }
        let uri = combine_path(self.upstream.base(), &path, query)?;
        parts.uri = uri;
        parts.version = Version::HTTP_11;

        Ok(Request::from_parts(parts, body.map_err(Into::into).boxed()))
    }
}

/// Builds the caller's response from the upstream one. The upstream body is
/// streamed through and released when the returned body is dropped.
fn relay(response: Response<Incoming>, client: String) -> Response<ResponseBody> {
    let (mut parts, body) = response.into_parts();
    strip_hop_headers(&mut parts.headers);

    let body = body
        .map_err(move |e| {
            warn!(client = %client, "Relaying upstream body failed: {}", e);
            e
        })
        .boxed();

    let mut relayed = Response::new(body);
    *relayed.status_mut() = parts.status;
    copy_headers(relayed.headers_mut(), &parts.headers);
    relayed
}

/// Short plain-text error response.
pub fn plain_error(status: StatusCode, message: &str) -> Response<ResponseBody> {
    let mut response = Response::new(
        Full::<Bytes>::from(format!("{message}\n"))
            .map_err(|never| match never {})
            .boxed(),
    );
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

impl HyperService<Request<Incoming>> for ProxyService {
    type Response = Response<ResponseBody>;

    type Error = Infallible;

    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}
