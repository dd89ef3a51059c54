//!  Storage is organized through [document_storage::DocumentStorage].
//!  The basic idea is:
//!   - State lives in two JSON documents: `aggregate` (statistics) and `tracking` (what is being
//!     viewed right now).
//!   - Documents are always replaced as a whole, so a reader never sees half of an update.
//!   - Only the aggregate writer (see [crate::daemon::processing]) modifies `aggregate`.

pub mod document_storage;
pub mod entities;
pub mod favicon;

pub const AGGREGATE_KEY: &str = "aggregate";
pub const TRACKING_KEY: &str = "tracking";
