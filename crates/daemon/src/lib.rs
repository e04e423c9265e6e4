// Service modules (daemon functionality)
pub mod database;
pub mod http_server;
pub mod process;
pub mod service_config;
pub mod service_state;

// App state (configuration, paths)
pub mod app_state;

// Re-exports for consumers
pub use app_state::{AppConfig, AppState, AppStateError};
pub use database::Database;
pub use process::{spawn_service, start_service, ShutdownHandle};
pub use service_config::Config as ServiceConfig;
pub use service_state::State as ServiceState;
