//! Startup configuration.
//!
//! The upstream address comes from `GITEA_ADDRESS` and is required. Tuning
//! knobs live in an optional YAML file named by `PROXY_CONFIG`; every key in it
//! is optional and falls back to the defaults below.

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::Path,
    time::Duration,
};

use anyhow::{Context as _, anyhow, bail};
use http::Uri;
use serde::{Deserialize, Serialize};

pub const UPSTREAM_ENV: &str = "GITEA_ADDRESS";
pub const CONFIG_FILE_ENV: &str = "PROXY_CONFIG";

pub const DEFAULT_LISTEN: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 3000));
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Behaviour of the client that talks to the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Length of the redirect chain that is treated as an error: the default of
    /// 10 follows 9 redirects and fails on the 10th. `0` relays 3xx responses
    /// untouched.
    pub max_redirects: usize,
    /// Bound on connect + redirects + response head. `None` waits forever.
    pub upstream_timeout: Option<Duration>,
    /// Forward the caller's `Host` header instead of the upstream's.
    pub preserve_host: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            upstream_timeout: None,
            preserve_host: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub upstream: Uri,
    pub listen: SocketAddr,
    pub client: ClientOptions,
}

/// Contents of the optional YAML file.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<SocketAddr>,
    pub max_redirects: Option<usize>,
    pub upstream_timeout_secs: Option<u64>,
    pub preserve_host: Option<bool>,
}

impl FileConfig {
    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }
}

impl Config {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let address = lookup(UPSTREAM_ENV)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("Environment {} is not defined", UPSTREAM_ENV))?;
        let upstream = parse_upstream(&address)?;

        let file = match lookup(CONFIG_FILE_ENV).filter(|value| !value.is_empty()) {
            Some(path) => FileConfig::load(Path::new(&path))?,
            None => FileConfig::default(),
        };

        Ok(Self::with_file(upstream, file))
    }

    pub fn with_file(upstream: Uri, file: FileConfig) -> Self {
        let defaults = ClientOptions::default();
        Self {
            upstream,
            listen: file.listen.unwrap_or(DEFAULT_LISTEN),
            client: ClientOptions {
                max_redirects: file.max_redirects.unwrap_or(defaults.max_redirects),
                upstream_timeout: file
                    .upstream_timeout_secs
                    .map(Duration::from_secs)
                    .or(defaults.upstream_timeout),
                preserve_host: file.preserve_host.unwrap_or(defaults.preserve_host),
            },
        }
    }
}

/// Parses the upstream base address. It has to be an absolute `http` or
/// `https` URL with a host.
pub fn parse_upstream(address: &str) -> anyhow::Result<Uri> {
    let uri: Uri = address
        .parse()
        .with_context(|| format!("Invalid gitea address {address:?}"))?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(other) => bail!("Invalid gitea address {address:?}: unsupported scheme {other}"),
        None => bail!("Invalid gitea address {address:?}: not an absolute URL"),
    }
    if uri.host().is_none_or(str::is_empty) {
        bail!("Invalid gitea address {address:?}: missing host");
    }
    Ok(uri)
}
