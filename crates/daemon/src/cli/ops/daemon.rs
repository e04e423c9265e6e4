use clap::Args;

use heirloom_daemon::{spawn_service, AppState};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override API server port (default from config)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] heirloom_daemon::AppStateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        // Load state from config path (or default ~/.heirloom)
        let state = AppState::load(ctx.config_path.clone())?;

        // Config file settings, with flag overrides on top
        let mut config = state.to_service_config()?;
        if let Some(api_port) = self.api_port {
            config.api_port = api_port;
        }
        if self.log_dir.is_some() {
            config.log_dir = self.log_dir.clone();
        }

        spawn_service(&config).await;
        Ok("daemon ended".to_string())
    }
}
