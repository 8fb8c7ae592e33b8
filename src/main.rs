use std::sync::Arc;

use gitea_proxy::config::Config;
use gitea_proxy::server::Server;
use gitea_proxy::service::ProxyService;
use gitea_proxy::upstream::Upstream;
use tracing::{debug, error, info, info_span, instrument};

mod logging;

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logging_from_env() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let server = {
        let _span = info_span!("gitea_proxy_startup").entered();

        let config = match Config::from_env() {
            Ok(config) => config,
            Err(e) => {
                error!("{:#}", e);
                std::process::exit(1);
            }
        };
        info!("Forwarding to {}", config.upstream);

        let upstream = Upstream::new(config.upstream, config.client);
        let service = ProxyService::new(Arc::new(upstream));

        match Server::new(config.listen, service).await {
            Ok(server) => {
                info!("Proxy server listen on {}", config.listen);
                server
            }
            Err(e) => {
                error!("Cannot listen on {}: {:#}", config.listen, e);
                std::process::exit(1);
            }
        }
    };

    run_server(server).await;
}

#[instrument(skip(server))]
async fn run_server(server: Server) {
    loop {
        match server.accept().await {
            Ok(_) => debug!("Accepted new connection"),
            Err(e) => error!("Failed to accept connection: {}", e),
        }
    }
}
