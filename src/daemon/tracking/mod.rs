//! The time accounting core. [tracker::ActivityTracker] holds what is being viewed,
//! [heartbeat::HeartbeatAccumulator] turns the passing of time into attributed deltas.

pub mod heartbeat;
pub mod tracker;
