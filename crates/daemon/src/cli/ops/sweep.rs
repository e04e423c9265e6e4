use clap::Args;

use heirloom_daemon::http_server::api::client::ApiError;
use heirloom_daemon::http_server::api::v0::scheduler::{SweepRequest, SweepResponse};

#[derive(Args, Debug, Clone)]
pub struct Sweep;

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Sweep {
    type Error = SweepError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();

        let response: SweepResponse = client.call(SweepRequest::default()).await?;

        if response.triggered {
            Ok("Sweep requested".to_string())
        } else {
            Ok("Scheduler is not running; sweep not triggered".to_string())
        }
    }
}
