use std::path::PathBuf;

use blob_store::BlobStoreConfig;
use common::capsule::{EngineLimits, SchedulerConfig};
use common::prelude::Cipher;

#[derive(Debug)]
pub struct Config {
    // http server configuration
    /// Port for the API HTTP server.
    pub api_port: u16,

    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,

    // blob store configuration
    /// Storage backend for encrypted capsule payloads
    pub blob_store: BlobStoreConfig,

    // crypto
    /// Master key sealing every capsule payload
    pub master_key: Cipher,

    // lifecycle fan-out
    /// Base URL of the web portal, linked from outbound notices
    pub portal_url: String,

    // background release
    /// Cadences and guards for the unlock scheduler
    pub scheduler: SchedulerConfig,
    /// Request size caps
    pub limits: EngineLimits,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}
