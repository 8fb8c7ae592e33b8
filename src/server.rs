use std::net::SocketAddr;

use anyhow::Result;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder,
};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::service::ProxyService;

/// HTTP server that accepts connections and hands them to the proxy service.
pub struct Server {
    /// The TCP listener for accepting incoming connections
    connection: TcpListener,
    /// Service cloned into every connection
    service: ProxyService,
}

impl Server {
    /// Creates a new server instance bound to the specified address.
    ///
    /// # Arguments
    ///
    /// * `addr` - The network address to bind to
    /// * `service` - The proxy service handling every request
    ///
    /// # Returns
    ///
    /// Returns a `Result<Server>` containing the new server instance or an error
    /// if the address cannot be bound.
    pub async fn new(addr: SocketAddr, service: ProxyService) -> Result<Self> {
        Ok(Self {
            connection: TcpListener::bind(&addr).await?,
            service,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.connection.local_addr()?)
    }

    /// Accepts a new connection and spawns a task to serve it.
    ///
    /// Returns once the connection is handed off; requests on it are served
    /// concurrently with every other connection.
    pub async fn accept(&self) -> Result<()> {
        let (conn, address) = self.connection.accept().await?;
        debug!("Accepted connection from {}", address);
        self.serve(conn, address);
        Ok(())
    }

    fn serve(&self, conn: TcpStream, address: SocketAddr) {
        let service = self.service.for_peer(address);
        let io = TokioIo::new(conn);

        tokio::spawn(async move {
            let result = Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await;
            if let Err(e) = result {
                warn!("Connection from {} ended with error: {}", address, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http_body_util::{BodyExt as _, Empty};
    use hyper::body::Bytes;
    use hyper_util::client::legacy::{Client, connect::HttpConnector};

    use super::*;
    use crate::{config::ClientOptions, upstream::Upstream};

    #[tokio::test]
    async fn serves_over_tcp() {
        let unreachable = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let upstream = Upstream::new(
            format!("http://{unreachable}").parse().unwrap(),
            ClientOptions::default(),
        );
        let server = Server::new(
            "127.0.0.1:0".parse().unwrap(),
            ProxyService::new(Arc::new(upstream)),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                server.accept().await.unwrap();
            }
        });

        let client: Client<HttpConnector, Empty<Bytes>> =
            Client::builder(TokioExecutor::new()).build_http();

        // no forwarded scheme on an origin-form request
        let response = client
            .get(format!("http://{addr}/owner/repo").parse().unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let request = http::Request::builder()
            .uri(format!("http://{addr}/owner/repo"))
            .header("X-Forwarded-Proto", "https")
            .body(Empty::new())
            .unwrap();
        let response = client.request(request).await.unwrap();
        assert_eq!(response.status(), 500);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Server Error\n");
    }

    #[tokio::test]
    async fn bind_conflict_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = listener.local_addr().unwrap();
        let upstream = Upstream::new(
            "http://127.0.0.1:1".parse().unwrap(),
            ClientOptions::default(),
        );

        let result = Server::new(taken, ProxyService::new(Arc::new(upstream))).await;
        assert!(result.is_err());
    }
}
