use anyhow::Result;

/// The host is a single cooperative event loop, signal handlers and heartbeats interleave only
/// at await points.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
