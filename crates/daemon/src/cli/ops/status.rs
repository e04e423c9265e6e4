use clap::Args;

use heirloom_daemon::http_server::api::client::ApiError;
use heirloom_daemon::http_server::api::v0::scheduler::{StatusRequest, StatusResponse};

#[derive(Args, Debug, Clone)]
pub struct Status;

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Status {
    type Error = StatusError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();

        let response: StatusResponse = client.call(StatusRequest::default()).await?;

        let mut lines = Vec::new();
        lines.push("Scheduler:".to_string());
        lines.push(format!("  state:              {}", response.state));
        lines.push(format!("  sweeps completed:   {}", response.sweeps_completed));
        lines.push(format!("  capsules unlocked:  {}", response.capsules_unlocked));
        lines.push(format!("  sweep interval:     {}s", response.sweep_interval_secs));
        lines.push(format!(
            "  deep sweep every:   {}s",
            response.deep_sweep_interval_secs
        ));

        Ok(lines.join("\n"))
    }
}
