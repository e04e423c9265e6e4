use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lead time given to in-flight requests after SIGTERM before the shutdown
/// watch fires. SIGINT skips the grace period.
const SIGTERM_GRACE: Duration = Duration::from_secs(10);

/// Spawns a task that turns SIGINT / SIGTERM into a shutdown broadcast.
///
/// Returns the join handle, the sender (for programmatic shutdown), and the
/// receiver that long-running workers subscribe to.
pub fn graceful_shutdown_blocker() -> (JoinHandle<()>, watch::Sender<()>, watch::Receiver<()>) {
    let (tx, rx) = watch::channel(());
    let broadcast = tx.clone();

    let handle = tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => {
                tracing::debug!("SIGINT received, shutting down now");
            }
            _ = sigterm.recv() => {
                tracing::debug!(
                    grace_secs = SIGTERM_GRACE.as_secs(),
                    "SIGTERM received, draining before shutdown"
                );
                tokio::time::sleep(SIGTERM_GRACE).await;
            }
        }

        let _ = broadcast.send(());
    });

    (handle, tx, rx)
}

/// Routes panics through `tracing` so they land in the same sinks as regular
/// log lines.
pub fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| {
        if let Some(loc) = panic.location() {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                "panic"
            );
        } else {
            tracing::error!(message = %panic, "panic");
        }
    }));
}

pub fn report_build_info() {
    let build = common::build_info!();

    tracing::info!(
        build_profile = ?build.build_profile,
        version = ?build.version,
        rust_version = ?build.rust_version,
        "service starting up"
    );
}
