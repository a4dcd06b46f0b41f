//! Per-conversation state and its persisted shape.

use crate::error::{Result, TricksterError};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Chat/group identifier. Negative values are valid (group chats).
pub type ConversationId = i64;
/// Chat user identifier.
pub type UserId = i64;
/// Identifier of a sent message within its conversation.
pub type MessageRef = i64;

/// Durable per-conversation state.
///
/// The exclusive lock guarding this record lives in
/// [`ContextStore`](super::ContextStore), never in the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub conversation_id: ConversationId,
    /// Opaque high-entropy token seeding every deterministic choice. Immutable.
    pub salt: String,
    /// Number of proposals created so far.
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub restart_schedule: Option<RestartSchedule>,
    #[serde(default)]
    pub proposal: Option<Proposal>,
}

impl Context {
    /// Fresh context with sequence 0 and no proposal.
    #[must_use]
    pub fn new(conversation_id: ConversationId, salt: impl Into<String>) -> Self {
        Self {
            conversation_id,
            salt: salt.into(),
            sequence: 0,
            restart_schedule: None,
            proposal: None,
        }
    }

    /// The current proposal, if it is still open.
    #[must_use]
    pub fn open_proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref().filter(|p| p.is_open())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Open,
    Closed,
}

/// A voter and the display name captured at vote time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(UserId, String)", into = "(UserId, String)")]
pub struct Voter {
    pub user_id: UserId,
    pub display_name: String,
}

impl From<(UserId, String)> for Voter {
    fn from((user_id, display_name): (UserId, String)) -> Self {
        Self {
            user_id,
            display_name,
        }
    }
}

impl From<Voter> for (UserId, String) {
    fn from(voter: Voter) -> Self {
        (voter.user_id, voter.display_name)
    }
}

/// One scheduling round: the question, its votes and lifecycle flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub target_date: NaiveDate,
    pub question: String,
    pub status: ProposalStatus,
    #[serde(default)]
    pub pinned: bool,
    pub message_ref: MessageRef,
    #[serde(default)]
    pub accepts: Vec<Voter>,
    #[serde(default)]
    pub rejects: Vec<Voter>,
    /// Acceptors bringing a guest. Always a subset of `accepts`.
    #[serde(default)]
    pub guests: BTreeSet<UserId>,
    /// Set once names have been shown; never cleared for this proposal.
    #[serde(default)]
    pub revealed: bool,
}

impl Proposal {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == ProposalStatus::Open
    }

    #[must_use]
    pub fn has_accepted(&self, user_id: UserId) -> bool {
        self.accepts.iter().any(|v| v.user_id == user_id)
    }

    #[must_use]
    pub fn has_rejected(&self, user_id: UserId) -> bool {
        self.rejects.iter().any(|v| v.user_id == user_id)
    }

    #[must_use]
    pub fn has_guest(&self, user_id: UserId) -> bool {
        self.guests.contains(&user_id)
    }

    /// Number of distinct acceptors. Guests are not counted.
    #[must_use]
    pub fn accept_count(&self) -> usize {
        self.accepts.len()
    }
}

/// What a user selected on the proposal's controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChoice {
    Accept,
    Reject,
    WithGuest,
}

impl VoteChoice {
    /// Parse callback data (`accept`, `reject`, `with-guest`).
    #[must_use]
    pub fn from_callback(data: &str) -> Option<Self> {
        match data {
            "accept" => Some(Self::Accept),
            "reject" => Some(Self::Reject),
            "with-guest" => Some(Self::WithGuest),
            _ => None,
        }
    }

    #[must_use]
    pub fn callback_data(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::WithGuest => "with-guest",
        }
    }
}

/// Per-conversation override of the weekly automatic proposal time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartSchedule {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
}

const WEEKDAY_ABBREVIATIONS: [(&str, Weekday); 7] = [
    ("mon", Weekday::Mon),
    ("tue", Weekday::Tue),
    ("wed", Weekday::Wed),
    ("thu", Weekday::Thu),
    ("fri", Weekday::Fri),
    ("sat", Weekday::Sat),
    ("sun", Weekday::Sun),
];

impl RestartSchedule {
    /// Validated constructor.
    ///
    /// # Errors
    ///
    /// [`TricksterError::Validation`] unless `weekday` is one of the seven
    /// three-letter abbreviations (any case), `hour < 24` and `minute < 60`.
    pub fn new(weekday: &str, hour: u32, minute: u32) -> Result<Self> {
        let lowered = weekday.trim().to_ascii_lowercase();
        let Some((_, weekday)) = WEEKDAY_ABBREVIATIONS
            .iter()
            .find(|(abbr, _)| *abbr == lowered)
        else {
            return Err(TricksterError::Validation(format!(
                "unknown weekday `{weekday}`"
            )));
        };
        if hour >= 24 {
            return Err(TricksterError::Validation(format!(
                "hour must be below 24, got {hour}"
            )));
        }
        if minute >= 60 {
            return Err(TricksterError::Validation(format!(
                "minute must be below 60, got {minute}"
            )));
        }
        Ok(Self {
            weekday: *weekday,
            hour,
            minute,
        })
    }
}

impl std::fmt::Display for RestartSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:02}:{:02}", self.weekday, self.hour, self.minute)
    }
}
