use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `cancelation` on Ctrl-C. Also returns once something else cancels it, most often the
/// browser closing stdin, so the host doesn't wait for a signal that never comes.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
