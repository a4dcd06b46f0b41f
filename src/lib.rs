//! Trickster: a chat assistant that schedules a weekly group get-together.
//!
//! The assistant proposes a Friday meetup to each group it was started in,
//! collects votes that stay anonymous until a quorum of acceptors is reached,
//! and derives its content and timing from a per-conversation salt.
//!
//! # Architecture
//!
//! - **Context store** ([`context`]): one durable record per conversation,
//!   mutated under a per-key async lock
//! - **Randomizer** ([`random`]): salted SHA-256 shuffles and picks
//! - **Proposal lifecycle** ([`proposal`]): pure transitions plus an engine
//!   that persists them and drives the transport
//! - **Heartbeat** ([`scheduler`]): jittered background sweeps that pin,
//!   close and auto-propose
//! - **Transport** ([`gateway`]): the messaging contract and its Telegram
//!   implementation
//! - **Commands** ([`commands`]): inbound triggers mapped to core operations

pub mod clock;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod paths;
pub mod proposal;
pub mod random;
pub mod scheduler;
pub mod service;

pub use config::TricksterConfig;
pub use error::{Result, TricksterError};
pub use service::Service;
