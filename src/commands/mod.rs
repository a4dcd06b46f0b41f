//! Inbound triggers and the responses they produce.
//!
//! Transports translate raw updates into [`Trigger`]s; the [`Dispatcher`]
//! turns each one into core operations and a [`Response`] for the user.

pub mod dispatcher;

pub use dispatcher::Dispatcher;

use crate::context::{ConversationId, MessageRef, RestartSchedule, UserId, VoteChoice};
use crate::error::{Result, TricksterError};

/// A user or platform action addressed to the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Start {
        conversation: ConversationId,
        token: String,
    },
    Stop {
        conversation: ConversationId,
    },
    /// Raw arguments of the restart command, parsed by the dispatcher.
    ConfigureRestart {
        conversation: ConversationId,
        args: String,
    },
    /// The conversation moved to a new identifier (group upgrade).
    Migrate {
        from: ConversationId,
        to: ConversationId,
    },
    Vote {
        conversation: ConversationId,
        message_ref: MessageRef,
        user_id: UserId,
        display_name: String,
        choice: VoteChoice,
    },
    Propose {
        conversation: ConversationId,
    },
}

impl Trigger {
    /// Conversation a reply to this trigger goes to.
    #[must_use]
    pub fn conversation(&self) -> ConversationId {
        match self {
            Self::Start { conversation, .. }
            | Self::Stop { conversation }
            | Self::ConfigureRestart { conversation, .. }
            | Self::Vote { conversation, .. }
            | Self::Propose { conversation } => *conversation,
            Self::Migrate { to, .. } => *to,
        }
    }
}

/// What the transport should show after a trigger was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Nothing to show. Button presses still get an empty acknowledgement.
    Silent,
    /// A chat message in the trigger's conversation.
    Reply(String),
    /// A short notice attached to the button press.
    Toast(String),
}

/// Parse a slash command such as `/start 123` or `/restart@bot Sat 9 15`.
///
/// Returns `None` for plain text and unknown commands.
#[must_use]
pub fn parse_command(conversation: ConversationId, text: &str) -> Option<Trigger> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let (head, args) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(head, args)| (head, args.trim()));
    let command = head.split('@').next().unwrap_or(head);

    match command {
        "start" => Some(Trigger::Start {
            conversation,
            token: args.to_owned(),
        }),
        "stop" => Some(Trigger::Stop { conversation }),
        "restart" => Some(Trigger::ConfigureRestart {
            conversation,
            args: args.to_owned(),
        }),
        _ => None,
    }
}

/// Parse restart arguments: `<Wkd> <hh> <mm>`, `<Wkd> <hh:mm>`, or `off`.
///
/// `Ok(None)` means the schedule should be cleared.
///
/// # Errors
///
/// [`TricksterError::Validation`] for anything else, including out of range
/// hours and minutes.
pub fn parse_restart_args(args: &str) -> Result<Option<RestartSchedule>> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let (weekday, hour, minute) = match parts.as_slice() {
        [off] if off.eq_ignore_ascii_case("off") => return Ok(None),
        [weekday, time] => {
            let (hour, minute) = time.split_once(':').ok_or_else(|| {
                TricksterError::Validation(format!("expected hh:mm, got `{time}`"))
            })?;
            (*weekday, hour, minute)
        }
        [weekday, hour, minute] => (*weekday, *hour, *minute),
        _ => {
            return Err(TricksterError::Validation(format!(
                "expected weekday, hour and minute, got `{args}`"
            )));
        }
    };
    let number = |field: &str, value: &str| {
        value
            .parse::<u32>()
            .map_err(|_| TricksterError::Validation(format!("{field} `{value}` is not a number")))
    };
    RestartSchedule::new(weekday, number("hour", hour)?, number("minute", minute)?).map(Some)
}
