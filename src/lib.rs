//! gitea-proxy - a reverse proxy in front of a single Gitea instance
//!
//! Every request is forwarded to one fixed upstream. On the way through, the
//! proxy:
//! - strips hop-by-hop headers from requests and responses
//! - collapses `/<owner>/<repo>/v<N>` for `go get` discovery (`?go-get=1`)
//! - places the request path under the upstream base path
//!
//! Modules:
//! - `config`: Startup configuration (`GITEA_ADDRESS`, optional YAML tuning)
//! - `goget`: go-get detection and path rewriting
//! - `headers`: Hop-by-hop handling, header copying, client identity
//! - `server`: TCP listener and per-connection tasks
//! - `service`: The proxy handler
//! - `upstream`: Client used to reach the upstream
//! - `utils`: URI joining

pub mod config;
pub mod goget;
pub mod headers;
pub mod server;
pub mod service;
pub mod upstream;
pub mod utils;
pub use hyper;
