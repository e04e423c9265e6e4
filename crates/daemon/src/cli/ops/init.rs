use clap::Args;

use blob_store::{BlobStoreConfig, PrimaryStoreConfig};
use heirloom_daemon::app_state::BLOBS_DIR_NAME;
use heirloom_daemon::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// API server port (default: 5150)
    #[arg(long, default_value = "5150")]
    pub api_port: u16,

    /// Base URL of the web portal, used in outbound notices
    #[arg(long)]
    pub portal_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] heirloom_daemon::AppStateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let heirloom_dir = AppState::heirloom_dir(ctx.config_path.clone())?;

        let config = AppConfig {
            api_port: self.api_port,
            portal_url: self
                .portal_url
                .clone()
                .unwrap_or_else(|| format!("http://localhost:{}", self.api_port)),
            blob_store: BlobStoreConfig {
                primary: PrimaryStoreConfig::Local {
                    path: heirloom_dir.join(BLOBS_DIR_NAME),
                },
                legacy: None,
            },
            ..Default::default()
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized heirloom directory at: {}\n\
             - Database: {}\n\
             - Key: {}\n\
             - Config: {}\n\
             - API port: {}\n\
             - Portal URL: {}",
            state.heirloom_dir.display(),
            state.db_path.display(),
            state.key_path.display(),
            state.config_path.display(),
            state.config.api_port,
            state.config.portal_url
        );

        Ok(output)
    }
}
