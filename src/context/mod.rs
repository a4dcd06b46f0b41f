//! Per-conversation state: data model, disk records and the live registry.

pub mod storage;
pub mod store;
pub mod types;

pub use storage::{ContextStorage, LoadReport};
pub use store::{ContextLease, ContextStore};
pub use types::{
    Context, ConversationId, MessageRef, Proposal, ProposalStatus, RestartSchedule, UserId,
    VoteChoice, Voter,
};
