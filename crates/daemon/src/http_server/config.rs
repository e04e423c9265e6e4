use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct Config {
    // Listen address
    pub listen_addr: SocketAddr,
    // log level for http tracing
    pub log_level: tracing::Level,
    // Configured payload cap, used to derive the request body limit
    pub max_payload_bytes: u64,
}

impl Config {
    pub fn new(listen_addr: SocketAddr, max_payload_bytes: u64) -> Self {
        tracing::info!(
            "Creating HTTP server Config: listen_addr={}, max_payload_bytes={}",
            listen_addr,
            max_payload_bytes
        );
        Self {
            listen_addr,
            log_level: tracing::Level::INFO,
            max_payload_bytes,
        }
    }
}
