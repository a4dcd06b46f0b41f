//! Pure proposal transitions.
//!
//! Each function takes the current [`Context`] and returns the next one
//! together with the transport effects to perform. Nothing here touches the
//! store or the network; [`super::engine`] applies the results.

use crate::clock;
use crate::config::TricksterConfig;
use crate::context::{Context, MessageRef, Proposal, ProposalStatus, UserId, VoteChoice, Voter};
use crate::error::{Result, TricksterError};
use crate::gateway::{OutboundContent, SendOptions};
use crate::proposal::render;
use crate::random;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike};
use std::collections::BTreeSet;

/// Transport side effect of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    EditCaption {
        message_ref: MessageRef,
        text: String,
        options: SendOptions,
    },
    Pin {
        message_ref: MessageRef,
    },
    Unpin {
        message_ref: MessageRef,
    },
}

/// New state plus the effects that announce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub context: Context,
    pub effects: Vec<Effect>,
}

/// Result of applying a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteTransition {
    /// No open proposal, or the vote targets a superseded message.
    Ignored,
    /// The user already holds exactly this choice.
    Unchanged,
    Changed(Transition),
}

/// A proposal ready to be sent. The message reference is only known after
/// the transport accepted the message, see [`ProposalDraft::attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalDraft {
    /// Forced close of a previous open proposal, if any.
    pub closing: Option<Transition>,
    pub content: OutboundContent,
    pub options: SendOptions,
    base: Context,
    sequence: u64,
    proposal: Proposal,
}

impl ProposalDraft {
    /// Target date of the drafted proposal.
    #[must_use]
    pub fn target_date(&self) -> NaiveDate {
        self.proposal.target_date
    }

    /// Context after the forced close but before the new proposal.
    #[must_use]
    pub fn base(&self) -> &Context {
        &self.base
    }

    /// Final context once the transport returned `message_ref`.
    #[must_use]
    pub fn attach(self, message_ref: MessageRef) -> Context {
        let mut context = self.base;
        let mut proposal = self.proposal;
        proposal.message_ref = message_ref;
        context.sequence = self.sequence;
        context.proposal = Some(proposal);
        context
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposeDecision {
    /// An open proposal already targets this date.
    Duplicate,
    Draft(Box<ProposalDraft>),
}

/// Draft the next proposal for `target_date`.
///
/// # Errors
///
/// [`TricksterError::Config`] when the catalog has no question templates.
pub fn propose(
    context: &Context,
    target_date: NaiveDate,
    silent: bool,
    config: &TricksterConfig,
) -> Result<ProposeDecision> {
    if context
        .open_proposal()
        .is_some_and(|p| p.target_date == target_date)
    {
        return Ok(ProposeDecision::Duplicate);
    }

    let closing = close(context, config);
    let base = closing
        .as_ref()
        .map_or_else(|| context.clone(), |t| t.context.clone());

    let sequence = base.sequence + 1;
    let catalog = &config.catalog;
    let template = random::pick(&catalog.questions, sequence, &base.salt).ok_or_else(|| {
        TricksterError::Config("catalog has no question templates".to_owned())
    })?;
    let question = render::expand_template(&template, target_date);

    let proposal = Proposal {
        target_date,
        question,
        status: ProposalStatus::Open,
        pinned: false,
        message_ref: 0,
        accepts: Vec::new(),
        rejects: Vec::new(),
        guests: BTreeSet::new(),
        revealed: false,
    };
    let caption = render::proposal_text(&proposal, config);
    let content = match random::pick(&catalog.animations, sequence, &base.salt) {
        Some(url) => OutboundContent::Animation { url, caption },
        None => OutboundContent::Text(caption),
    };
    let options = render::proposal_options(&proposal, catalog, silent);

    Ok(ProposeDecision::Draft(Box::new(ProposalDraft {
        closing,
        content,
        options,
        base,
        sequence,
        proposal,
    })))
}

/// Apply `choice` by `user_id` to the open proposal sent as `message_ref`.
#[must_use]
pub fn vote(
    context: &Context,
    message_ref: MessageRef,
    user_id: UserId,
    display_name: &str,
    choice: VoteChoice,
    config: &TricksterConfig,
) -> VoteTransition {
    let Some(current) = context.open_proposal() else {
        return VoteTransition::Ignored;
    };
    if current.message_ref != message_ref {
        return VoteTransition::Ignored;
    }

    let held = match choice {
        VoteChoice::Accept => current.has_accepted(user_id) && !current.has_guest(user_id),
        VoteChoice::Reject => current.has_rejected(user_id),
        VoteChoice::WithGuest => current.has_guest(user_id),
    };
    if held {
        return VoteTransition::Unchanged;
    }

    let mut proposal = current.clone();
    proposal.accepts.retain(|v| v.user_id != user_id);
    proposal.rejects.retain(|v| v.user_id != user_id);
    proposal.guests.remove(&user_id);

    let voter = Voter {
        user_id,
        display_name: display_name.to_owned(),
    };
    match choice {
        VoteChoice::Accept => proposal.accepts.push(voter),
        VoteChoice::Reject => proposal.rejects.push(voter),
        VoteChoice::WithGuest => {
            proposal.accepts.push(voter);
            proposal.guests.insert(user_id);
        }
    }
    proposal.revealed = render::is_revealed(&proposal, config.quorum_size);

    let effects = vec![Effect::EditCaption {
        message_ref,
        text: render::proposal_text(&proposal, config),
        options: render::proposal_options(&proposal, &config.catalog, false),
    }];
    let mut next = context.clone();
    next.proposal = Some(proposal);
    VoteTransition::Changed(Transition {
        context: next,
        effects,
    })
}

/// Close the open proposal. `None` when there is nothing to close.
#[must_use]
pub fn close(context: &Context, config: &TricksterConfig) -> Option<Transition> {
    let mut proposal = context.open_proposal()?.clone();
    proposal.status = ProposalStatus::Closed;

    let message_ref = proposal.message_ref;
    let effects = vec![
        Effect::Unpin { message_ref },
        Effect::EditCaption {
            message_ref,
            text: render::proposal_text(&proposal, config),
            options: render::proposal_options(&proposal, &config.catalog, false),
        },
    ];
    let mut next = context.clone();
    next.proposal = Some(proposal);
    Some(Transition {
        context: next,
        effects,
    })
}

/// Pin the open proposal unless it is already pinned or `now` is quiet.
#[must_use]
pub fn pin(
    context: &Context,
    now: &DateTime<FixedOffset>,
    config: &TricksterConfig,
) -> Option<Transition> {
    if config.quiet_hours.is_quiet(now.hour()) {
        return None;
    }
    let proposal = context.open_proposal().filter(|p| !p.pinned)?;
    let mut proposal = proposal.clone();
    proposal.pinned = true;

    let effects = vec![Effect::Pin {
        message_ref: proposal.message_ref,
    }];
    let mut next = context.clone();
    next.proposal = Some(proposal);
    Some(Transition {
        context: next,
        effects,
    })
}

/// Instant after which an open proposal for `target_date` gets closed.
#[must_use]
pub fn close_deadline(target_date: NaiveDate, config: &TricksterConfig) -> DateTime<FixedOffset> {
    clock::local_at(target_date, config.proposal.event_hour, &config.offset())
        + Duration::hours(config.proposal.close_after_hours)
}

/// Whether `context` holds an open proposal past its close deadline.
#[must_use]
pub fn is_overdue(context: &Context, now: &DateTime<FixedOffset>, config: &TricksterConfig) -> bool {
    context
        .open_proposal()
        .is_some_and(|p| *now > close_deadline(p.target_date, config))
}
