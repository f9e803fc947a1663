use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use incubator_api::AppState;

/// Periodically drop expired sessions until cancelled.
pub async fn run_session_sweep(state: AppState, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let purged = state.sessions.purge_expired();
        if purged > 0 {
            info!("Session sweep: dropped {} expired sessions", purged);
        }
    }
}
