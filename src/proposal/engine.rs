//! Applies proposal transitions: lock the context, compute the transition,
//! persist it, then perform the transport effects.
//!
//! Transport failures after a successful write are logged and swallowed;
//! the persisted state is never rolled back.

use crate::clock::Clock;
use crate::config::TricksterConfig;
use crate::context::{ContextLease, ContextStore, ConversationId, MessageRef, UserId, VoteChoice};
use crate::error::{Result, TricksterError};
use crate::gateway::MessagingGateway;
use crate::proposal::machine::{self, Effect, ProposeDecision, VoteTransition};
use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a vote that reached an open proposal's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// No open proposal, or the message is not the current one.
    Ignored,
    /// The user already held this choice.
    Unchanged,
    Changed,
}

/// Shared handle over the store, the transport and the configuration.
pub struct ProposalEngine {
    store: Arc<ContextStore>,
    gateway: Arc<dyn MessagingGateway>,
    config: Arc<TricksterConfig>,
    clock: Arc<dyn Clock>,
}

impl ProposalEngine {
    pub fn new(
        store: Arc<ContextStore>,
        gateway: Arc<dyn MessagingGateway>,
        config: Arc<TricksterConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
            clock,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn MessagingGateway> {
        &self.gateway
    }

    #[must_use]
    pub fn config(&self) -> &TricksterConfig {
        &self.config
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Whether outgoing notifications should be silent right now.
    #[must_use]
    pub fn is_quiet_now(&self) -> bool {
        self.config.quiet_hours.is_quiet(self.clock.now().hour())
    }

    /// Create and send a proposal for `target_date`.
    ///
    /// # Errors
    ///
    /// - [`TricksterError::UnknownConversation`] when `key` has no context.
    /// - [`TricksterError::DuplicateProposal`] when an open proposal already
    ///   targets `target_date`.
    /// - [`TricksterError::Transport`] when the proposal could not be sent.
    /// - Storage errors from persisting the result.
    pub async fn propose(&self, key: ConversationId, target_date: NaiveDate) -> Result<MessageRef> {
        let lease = self.store.lock(key).await;
        self.propose_leased(&lease, target_date).await
    }

    /// [`propose`](Self::propose) for a caller already holding the lease.
    ///
    /// # Errors
    ///
    /// Same as [`propose`](Self::propose).
    pub async fn propose_leased(
        &self,
        lease: &ContextLease<'_>,
        target_date: NaiveDate,
    ) -> Result<MessageRef> {
        let key = lease.key();
        let context = lease
            .current()
            .ok_or(TricksterError::UnknownConversation(key))?;

        let silent = self.is_quiet_now();
        let draft = match machine::propose(&context, target_date, silent, &self.config)? {
            ProposeDecision::Duplicate => {
                return Err(TricksterError::DuplicateProposal { target_date });
            }
            ProposeDecision::Draft(draft) => *draft,
        };

        if let Some(closing) = draft.closing.clone() {
            lease.put(closing.context).await?;
            info!(conversation = key, "open proposal closed to make room for a new one");
            self.perform(key, closing.effects).await;
        }

        let message_ref = match self
            .gateway
            .send(key, draft.content.clone(), draft.options.clone())
            .await
        {
            Ok(message_ref) => message_ref,
            Err(e) => {
                warn!(conversation = key, %target_date, "failed to send proposal: {e:#}");
                return Err(TricksterError::transport(format!("{e:#}")));
            }
        };

        let context = draft.attach(message_ref);
        let sequence = context.sequence;
        lease.put(context).await?;
        info!(conversation = key, %target_date, sequence, message_ref, "proposal sent");
        Ok(message_ref)
    }

    /// Record `choice` by `user_id` on the proposal sent as `message_ref`.
    ///
    /// # Errors
    ///
    /// [`TricksterError::UnknownConversation`] when `key` has no context, or
    /// the storage error when the vote could not be persisted.
    pub async fn vote(
        &self,
        key: ConversationId,
        message_ref: MessageRef,
        user_id: UserId,
        display_name: &str,
        choice: VoteChoice,
    ) -> Result<VoteOutcome> {
        let lease = self.store.lock(key).await;
        let context = lease
            .current()
            .ok_or(TricksterError::UnknownConversation(key))?;

        match machine::vote(&context, message_ref, user_id, display_name, choice, &self.config) {
            VoteTransition::Ignored => {
                debug!(conversation = key, message_ref, "vote ignored");
                Ok(VoteOutcome::Ignored)
            }
            VoteTransition::Unchanged => Ok(VoteOutcome::Unchanged),
            VoteTransition::Changed(transition) => {
                lease.put(transition.context).await?;
                debug!(conversation = key, user = user_id, ?choice, "vote recorded");
                self.perform(key, transition.effects).await;
                Ok(VoteOutcome::Changed)
            }
        }
    }

    /// Close the open proposal of `key`. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Storage errors from persisting the closed proposal.
    pub async fn close(&self, key: ConversationId) -> Result<bool> {
        let lease = self.store.lock(key).await;
        self.close_leased(&lease).await
    }

    /// [`close`](Self::close) for a caller already holding the lease.
    ///
    /// # Errors
    ///
    /// Same as [`close`](Self::close).
    pub async fn close_leased(&self, lease: &ContextLease<'_>) -> Result<bool> {
        let Some(context) = lease.current() else {
            return Ok(false);
        };
        let Some(transition) = machine::close(&context, &self.config) else {
            return Ok(false);
        };
        lease.put(transition.context).await?;
        info!(conversation = lease.key(), "proposal closed");
        self.perform(lease.key(), transition.effects).await;
        Ok(true)
    }

    /// Pin the open proposal of `key` unless it is quiet time or already pinned.
    ///
    /// # Errors
    ///
    /// Storage errors from persisting the pinned flag.
    pub async fn pin(&self, key: ConversationId) -> Result<bool> {
        self.pin_at(key, &self.clock.now()).await
    }

    /// [`pin`](Self::pin) with an explicit `now`, as taken by a heartbeat beat.
    ///
    /// # Errors
    ///
    /// Same as [`pin`](Self::pin).
    pub async fn pin_at(&self, key: ConversationId, now: &DateTime<FixedOffset>) -> Result<bool> {
        let lease = self.store.lock(key).await;
        let Some(context) = lease.current() else {
            return Ok(false);
        };
        let Some(transition) = machine::pin(&context, now, &self.config) else {
            return Ok(false);
        };
        lease.put(transition.context).await?;
        info!(conversation = key, "proposal pinned");
        self.perform(key, transition.effects).await;
        Ok(true)
    }

    /// Run transport effects in order. Failures are logged and skipped.
    pub(crate) async fn perform(&self, key: ConversationId, effects: Vec<Effect>) {
        for effect in effects {
            let (what, result) = match effect {
                Effect::EditCaption {
                    message_ref,
                    text,
                    options,
                } => (
                    "edit caption",
                    self.gateway
                        .edit_caption(key, message_ref, text, options)
                        .await,
                ),
                Effect::Pin { message_ref } => ("pin", self.gateway.pin(key, message_ref).await),
                Effect::Unpin { message_ref } => {
                    ("unpin", self.gateway.unpin(key, message_ref).await)
                }
            };
            if let Err(e) = result {
                warn!(
                    conversation = key,
                    gateway = self.gateway.id(),
                    "{what} failed: {e:#}"
                );
            }
        }
    }
}
