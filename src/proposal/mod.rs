//! Proposal lifecycle: pure transitions, rendering and the engine that
//! applies them.

pub mod engine;
pub mod machine;
pub mod render;

pub use engine::{ProposalEngine, VoteOutcome};
pub use machine::{Effect, Transition};
