//! Shared fixtures for unit and end-to-end tests across the Tidal crates
//! (§4.12): local [`NodeLocation`](tidal_types::NodeLocation) committees,
//! [`ExecutableSubPlan`](tidal_types::ExecutableSubPlan) builders,
//! deterministic tuple generators, and an in-memory recording `DataEmitter`.
//! Fixtures live in one place; each crate still keeps its own
//! `#[cfg(test)]` unit tests alongside the code they exercise.

mod buffer;
mod committee;
mod emitter;
mod records;
mod subplan;

pub use buffer::test_buffer_pool;
pub use committee::{local_committee, local_node_location};
pub use emitter::RecordingEmitter;
pub use records::{join_tuple, keyed_tuple, tuple_sequence};
pub use subplan::test_sub_plan;
