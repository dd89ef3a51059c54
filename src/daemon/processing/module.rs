use anyhow::Result;

use super::StoreOp;

/// Represents a processor of aggregate write operations. Operations are handed over one at a
/// time, so an implementation never has to guard against concurrent writes itself.
pub trait EventProcessor {
    fn process_next(&mut self, operation: StoreOp) -> impl std::future::Future<Output = Result<()>>;
}
