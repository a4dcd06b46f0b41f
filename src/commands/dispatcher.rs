use crate::clock;
use crate::commands::{Response, Trigger, parse_restart_args};
use crate::context::{Context, ConversationId, MessageRef, UserId, VoteChoice};
use crate::error::TricksterError;
use crate::gateway::OutboundContent;
use crate::proposal::{ProposalEngine, VoteOutcome, render};
use crate::random;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Routes triggers to the proposal engine and the context store.
///
/// Errors never escape: each handler logs and maps them to a [`Response`].
pub struct Dispatcher {
    engine: Arc<ProposalEngine>,
}

impl Dispatcher {
    pub fn new(engine: Arc<ProposalEngine>) -> Self {
        Self { engine }
    }

    pub async fn dispatch(&self, trigger: Trigger) -> Response {
        match trigger {
            Trigger::Start {
                conversation,
                token,
            } => self.start(conversation, &token).await,
            Trigger::Stop { conversation } => self.stop(conversation).await,
            Trigger::ConfigureRestart { conversation, args } => {
                self.configure_restart(conversation, &args).await
            }
            Trigger::Migrate { from, to } => self.migrate(from, to).await,
            Trigger::Vote {
                conversation,
                message_ref,
                user_id,
                display_name,
                choice,
            } => {
                self.vote(conversation, message_ref, user_id, &display_name, choice)
                    .await
            }
            Trigger::Propose { conversation } => self.propose(conversation).await,
        }
    }

    async fn start(&self, conversation: ConversationId, token: &str) -> Response {
        let catalog = &self.engine.config().catalog;
        if token.trim() != self.engine.config().invite_token {
            info!(conversation, "start denied: wrong invite token");
            return Response::Reply(catalog.start_denied.clone());
        }

        let lease = self.engine.store().lock(conversation).await;
        if lease.current().is_some() {
            return Response::Reply(catalog.start_existing.clone());
        }
        if let Err(e) = lease
            .put(Context::new(conversation, random::random_hex256()))
            .await
        {
            error!(conversation, "failed to create context: {e}");
            return Response::Silent;
        }
        info!(conversation, "conversation started");
        drop(lease);

        self.send_introduction(conversation).await;
        Response::Silent
    }

    async fn stop(&self, conversation: ConversationId) -> Response {
        let lease = self.engine.store().lock(conversation).await;
        if lease.current().is_none() {
            return Response::Silent;
        }
        match lease.remove().await {
            Ok(()) => {
                info!(conversation, "conversation stopped");
                Response::Reply(self.engine.config().catalog.stop_farewell.clone())
            }
            Err(e) => {
                error!(conversation, "failed to remove context: {e}");
                Response::Silent
            }
        }
    }

    async fn configure_restart(&self, conversation: ConversationId, args: &str) -> Response {
        let catalog = &self.engine.config().catalog;
        let schedule = match parse_restart_args(args) {
            Ok(schedule) => schedule,
            Err(e) => {
                info!(conversation, "restart schedule rejected: {e}");
                return Response::Reply(catalog.restart_usage.clone());
            }
        };

        let lease = self.engine.store().lock(conversation).await;
        let Some(mut context) = lease.current() else {
            return Response::Silent;
        };
        context.restart_schedule = schedule;
        if let Err(e) = lease.put(context).await {
            error!(conversation, "failed to save restart schedule: {e}");
            return Response::Silent;
        }

        match schedule {
            Some(schedule) => {
                info!(conversation, %schedule, "restart schedule saved");
                Response::Reply(
                    catalog
                        .restart_saved
                        .replace("{schedule}", &schedule.to_string()),
                )
            }
            None => {
                info!(conversation, "restart schedule cleared");
                Response::Reply(catalog.restart_cleared.clone())
            }
        }
    }

    /// Move the context to its new key and re-introduce the assistant there.
    ///
    /// The old key's record is taken out under its own lease, then written
    /// under the new key's lease. An already started target keeps its
    /// context and the moved one is put back.
    async fn migrate(&self, from: ConversationId, to: ConversationId) -> Response {
        let store = self.engine.store();
        let context = {
            let lease = store.lock(from).await;
            let Some(context) = lease.current() else {
                return Response::Silent;
            };
            if let Err(e) = lease.remove().await {
                error!(from, to, "failed to take context for migration: {e}");
                return Response::Silent;
            }
            context
        };

        let lease = store.lock(to).await;
        if lease.current().is_some() {
            drop(lease);
            warn!(from, to, "migration target already started; keeping its context");
            self.restore(from, context).await;
            return Response::Silent;
        }
        let mut moved = context.clone();
        moved.conversation_id = to;
        if let Err(e) = lease.put(moved).await {
            drop(lease);
            error!(from, to, "failed to migrate context: {e}");
            self.restore(from, context).await;
            return Response::Silent;
        }
        drop(lease);
        info!(from, to, "conversation migrated");

        self.send_introduction(to).await;
        Response::Silent
    }

    /// Put a context taken out for migration back under its old key.
    async fn restore(&self, key: ConversationId, context: Context) {
        let lease = self.engine.store().lock(key).await;
        if lease.current().is_some() {
            error!(
                conversation = key,
                "context recreated during migration; migrated copy dropped"
            );
            return;
        }
        if let Err(e) = lease.put(context).await {
            error!(conversation = key, "failed to restore context after migration: {e}");
        }
    }

    async fn vote(
        &self,
        conversation: ConversationId,
        message_ref: MessageRef,
        user_id: UserId,
        display_name: &str,
        choice: VoteChoice,
    ) -> Response {
        let catalog = &self.engine.config().catalog;
        match self
            .engine
            .vote(conversation, message_ref, user_id, display_name, choice)
            .await
        {
            Ok(VoteOutcome::Changed) => {
                let texts = match choice {
                    VoteChoice::Accept | VoteChoice::WithGuest => &catalog.accept_confirmations,
                    VoteChoice::Reject => &catalog.reject_confirmations,
                };
                random::pick_random(texts).map_or(Response::Silent, |t| Response::Toast(t.clone()))
            }
            Ok(VoteOutcome::Unchanged | VoteOutcome::Ignored)
            | Err(TricksterError::UnknownConversation(_)) => Response::Silent,
            Err(e) => {
                error!(conversation, user = user_id, "vote failed: {e}");
                Response::Silent
            }
        }
    }

    async fn propose(&self, conversation: ConversationId) -> Response {
        let catalog = &self.engine.config().catalog;
        let target = clock::next_friday(&self.engine.clock().now());
        let texts = match self.engine.propose(conversation, target).await {
            Ok(_) => &catalog.propose_confirmations,
            Err(TricksterError::DuplicateProposal { .. }) => &catalog.propose_excessive,
            Err(TricksterError::UnknownConversation(_)) => return Response::Silent,
            Err(e) => {
                warn!(conversation, %target, "manual proposal failed: {e}");
                return Response::Silent;
            }
        };
        random::pick_random(texts).map_or(Response::Silent, |t| Response::Toast(t.clone()))
    }

    async fn send_introduction(&self, conversation: ConversationId) {
        let (text, options) = render::introduction(self.engine.config(), self.engine.is_quiet_now());
        if let Err(e) = self
            .engine
            .gateway()
            .send(conversation, OutboundContent::Text(text), options)
            .await
        {
            warn!(conversation, "failed to send introduction: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::config::TricksterConfig;
    use crate::context::{ContextStorage, ContextStore, RestartSchedule};
    use crate::gateway::{GatewayCall, MessagingGateway, RecordingGateway};
    use chrono::{DateTime, NaiveDate};

    struct Fixture {
        _dir: tempfile::TempDir,
        gateway: Arc<RecordingGateway>,
        engine: Arc<ProposalEngine>,
        dispatcher: Arc<Dispatcher>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(ContextStore::open(ContextStorage::new(dir.path())).expect("store"));
        let gateway = Arc::new(RecordingGateway::new());
        let now = DateTime::parse_from_rfc3339("2024-05-11T14:00:00+03:00").expect("now");
        let engine = Arc::new(ProposalEngine::new(
            store,
            Arc::clone(&gateway) as Arc<dyn MessagingGateway>,
            Arc::new(TricksterConfig::default()),
            Arc::new(FixedClock::new(now)) as Arc<dyn Clock>,
        ));
        Fixture {
            _dir: dir,
            gateway,
            dispatcher: Arc::new(Dispatcher::new(Arc::clone(&engine))),
            engine,
        }
    }

    fn start(conversation: ConversationId, token: &str) -> Trigger {
        Trigger::Start {
            conversation,
            token: token.to_owned(),
        }
    }

    fn restart(conversation: ConversationId, args: &str) -> Trigger {
        Trigger::ConfigureRestart {
            conversation,
            args: args.to_owned(),
        }
    }

    #[tokio::test]
    async fn start_checks_token_and_creates_context_once() {
        let f = fixture();
        assert_eq!(
            f.dispatcher.dispatch(start(-1, "wrong")).await,
            Response::Reply("🤨".to_owned())
        );
        assert!(f.engine.store().get(-1).is_none());

        assert_eq!(f.dispatcher.dispatch(start(-1, "123")).await, Response::Silent);
        let context = f.engine.store().get(-1).expect("created");
        assert_eq!(context.sequence, 0);
        assert_eq!(context.salt.len(), 64);
        assert!(matches!(
            &f.gateway.calls_for(-1)[..],
            [GatewayCall::Send { content: OutboundContent::Text(_), .. }]
        ));

        assert_eq!(
            f.dispatcher.dispatch(start(-1, "123")).await,
            Response::Reply("👌".to_owned())
        );
        assert_eq!(f.engine.store().get(-1).expect("kept").salt, context.salt);
    }

    #[tokio::test]
    async fn stop_removes_context() {
        let f = fixture();
        assert_eq!(
            f.dispatcher.dispatch(Trigger::Stop { conversation: 3 }).await,
            Response::Silent
        );
        f.dispatcher.dispatch(start(3, "123")).await;
        assert_eq!(
            f.dispatcher.dispatch(Trigger::Stop { conversation: 3 }).await,
            Response::Reply("👋".to_owned())
        );
        assert!(f.engine.store().get(3).is_none());
    }

    #[tokio::test]
    async fn restart_schedule_is_validated_before_mutation() {
        let f = fixture();
        f.dispatcher.dispatch(start(1, "123")).await;

        let reply = f.dispatcher.dispatch(restart(1, "Sat 9 15")).await;
        assert!(matches!(reply, Response::Reply(ref text) if text.contains("Sat 09:15")));
        let saved = RestartSchedule::new("Sat", 9, 15).expect("schedule");
        assert_eq!(f.engine.store().get(1).expect("ctx").restart_schedule, Some(saved));

        for bad in ["Sat 24 15", "Xyz 9 15"] {
            let reply = f.dispatcher.dispatch(restart(1, bad)).await;
            assert_eq!(
                reply,
                Response::Reply(f.engine.config().catalog.restart_usage.clone())
            );
            assert_eq!(f.engine.store().get(1).expect("ctx").restart_schedule, Some(saved));
        }

        f.dispatcher.dispatch(restart(1, "off")).await;
        assert_eq!(f.engine.store().get(1).expect("ctx").restart_schedule, None);
    }

    #[tokio::test]
    async fn restart_for_unknown_conversation_is_silent() {
        let f = fixture();
        assert_eq!(
            f.dispatcher.dispatch(restart(8, "Sat 9 15")).await,
            Response::Silent
        );
        assert!(f.engine.store().get(8).is_none());
    }

    #[tokio::test]
    async fn propose_on_weekend_targets_next_friday() {
        let f = fixture();
        f.dispatcher.dispatch(start(1, "123")).await;

        let first = f
            .dispatcher
            .dispatch(Trigger::Propose { conversation: 1 })
            .await;
        assert!(matches!(
            first,
            Response::Toast(ref t) if f.engine.config().catalog.propose_confirmations.contains(t)
        ));
        let proposal = f.engine.store().get(1).and_then(|c| c.proposal).expect("p");
        assert_eq!(
            proposal.target_date,
            NaiveDate::from_ymd_opt(2024, 5, 17).expect("date")
        );

        let second = f
            .dispatcher
            .dispatch(Trigger::Propose { conversation: 1 })
            .await;
        assert!(matches!(
            second,
            Response::Toast(ref t) if f.engine.config().catalog.propose_excessive.contains(t)
        ));
    }

    #[tokio::test]
    async fn vote_answers_with_confirmation_only_on_change() {
        let f = fixture();
        f.dispatcher.dispatch(start(1, "123")).await;
        f.dispatcher.dispatch(Trigger::Propose { conversation: 1 }).await;
        let message_ref = f
            .engine
            .store()
            .get(1)
            .and_then(|c| c.proposal)
            .expect("p")
            .message_ref;

        let vote = |choice| Trigger::Vote {
            conversation: 1,
            message_ref,
            user_id: 5,
            display_name: "Ann".to_owned(),
            choice,
        };
        let reply = f.dispatcher.dispatch(vote(VoteChoice::Reject)).await;
        assert!(matches!(
            reply,
            Response::Toast(ref t) if f.engine.config().catalog.reject_confirmations.contains(t)
        ));
        assert_eq!(
            f.dispatcher.dispatch(vote(VoteChoice::Reject)).await,
            Response::Silent
        );
    }

    #[tokio::test]
    async fn vote_on_unknown_conversation_is_silent() {
        let f = fixture();
        let reply = f
            .dispatcher
            .dispatch(Trigger::Vote {
                conversation: 42,
                message_ref: 1,
                user_id: 5,
                display_name: "Ann".to_owned(),
                choice: VoteChoice::Accept,
            })
            .await;
        assert_eq!(reply, Response::Silent);
    }

    #[tokio::test]
    async fn migrate_moves_context_to_new_key() {
        let f = fixture();
        f.dispatcher.dispatch(start(-10, "123")).await;
        f.dispatcher
            .dispatch(Trigger::Propose { conversation: -10 })
            .await;
        let before = f.engine.store().get(-10).expect("ctx");
        f.gateway.clear();

        f.dispatcher
            .dispatch(Trigger::Migrate {
                from: -10,
                to: -1_000_010,
            })
            .await;

        assert!(f.engine.store().get(-10).is_none());
        let after = f.engine.store().get(-1_000_010).expect("migrated");
        assert_eq!(after.salt, before.salt);
        assert_eq!(after.sequence, before.sequence);
        assert_eq!(after.proposal, before.proposal);
        assert_eq!(f.gateway.calls_for(-1_000_010).len(), 1);
    }

    #[tokio::test]
    async fn migrate_keeps_existing_target_context() {
        let f = fixture();
        f.dispatcher.dispatch(start(-10, "123")).await;
        f.dispatcher.dispatch(start(-20, "123")).await;
        let old = f.engine.store().get(-10).expect("old");
        let existing = f.engine.store().get(-20).expect("existing");
        f.gateway.clear();

        let reply = f
            .dispatcher
            .dispatch(Trigger::Migrate { from: -10, to: -20 })
            .await;

        assert_eq!(reply, Response::Silent);
        assert_eq!(f.engine.store().get(-20).expect("target"), existing);
        assert_eq!(f.engine.store().get(-10).expect("restored"), old);
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn migrate_waits_for_target_lease() {
        let f = fixture();
        f.dispatcher.dispatch(start(-10, "123")).await;
        let store = Arc::clone(f.engine.store());

        let held = store.lock(-1_000_010).await;
        let dispatcher = Arc::clone(&f.dispatcher);
        let migration = tokio::spawn(async move {
            dispatcher
                .dispatch(Trigger::Migrate {
                    from: -10,
                    to: -1_000_010,
                })
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(store.get(-1_000_010).is_none());
        drop(held);

        migration.await.expect("task ok");
        assert!(store.get(-10).is_none());
        assert!(store.get(-1_000_010).is_some());
    }
}
