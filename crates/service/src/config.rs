use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

#[derive(Debug, Clone)]
pub struct Config {
    /// address for the portal HTTP server to listen on.
    ///  if not set then 0.0.0.0:4280 will be used
    pub listen_addr: Option<SocketAddr>,
    /// directory holding the access-policy logs, if not set
    ///  then an ephemeral directory will be used
    pub persist_path: Option<PathBuf>,

    // misc
    pub log_level: tracing::Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 4280)),
            persist_path: None,
            log_level: tracing::Level::INFO,
        }
    }
}
