//! End-to-end proposal lifecycle through the command dispatcher.
//!
//! Drives a service wired to a recording gateway and a fixed clock, then
//! checks persisted state and what the transport was asked to do.

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::sync::Arc;
use trickster::clock::FixedClock;
use trickster::commands::{Response, Trigger};
use trickster::context::{ContextStorage, VoteChoice};
use trickster::gateway::{GatewayCall, MessagingGateway, RecordingGateway};
use trickster::random;
use trickster::{Service, TricksterConfig};

const GROUP: i64 = -100_200;

struct Harness {
    dir: tempfile::TempDir,
    gateway: Arc<RecordingGateway>,
    service: Service,
}

fn at(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).expect("timestamp")
}

fn harness(quorum: usize) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = TricksterConfig {
        quorum_size: quorum,
        storage_dir: Some(dir.path().to_path_buf()),
        ..TricksterConfig::default()
    };
    let gateway = Arc::new(RecordingGateway::new());
    let service = Service::new(
        Arc::new(config),
        Arc::clone(&gateway) as Arc<dyn MessagingGateway>,
        Arc::new(FixedClock::new(at("2024-05-06T15:00:00+03:00"))),
    )
    .expect("service");
    Harness {
        dir,
        gateway,
        service,
    }
}

async fn started_with_proposal(h: &Harness) -> i64 {
    let dispatcher = h.service.dispatcher();
    dispatcher
        .dispatch(Trigger::Start {
            conversation: GROUP,
            token: "123".to_owned(),
        })
        .await;
    let reply = dispatcher
        .dispatch(Trigger::Propose {
            conversation: GROUP,
        })
        .await;
    assert!(matches!(reply, Response::Toast(_)), "{reply:?}");
    h.service
        .engine()
        .store()
        .get(GROUP)
        .and_then(|c| c.proposal)
        .expect("proposal")
        .message_ref
}

fn vote(message_ref: i64, user_id: i64, name: &str, choice: VoteChoice) -> Trigger {
    Trigger::Vote {
        conversation: GROUP,
        message_ref,
        user_id,
        display_name: name.to_owned(),
        choice,
    }
}

#[tokio::test]
async fn quorum_of_three_reveals_names_in_salted_order() {
    let h = harness(3);
    let message_ref = started_with_proposal(&h).await;
    let dispatcher = h.service.dispatcher();

    for (id, name) in [(1, "Alice"), (2, "Bob")] {
        dispatcher
            .dispatch(vote(message_ref, id, name, VoteChoice::Accept))
            .await;
        let caption = h.gateway.last_caption(GROUP).expect("caption");
        assert!(!caption.contains("Alice"), "{caption}");
    }

    dispatcher
        .dispatch(vote(message_ref, 3, "Carol", VoteChoice::Accept))
        .await;
    let caption = h.gateway.last_caption(GROUP).expect("caption");
    assert!(caption.contains("Accepts (3):"), "{caption}");

    let expected = random::shuffle(&[1_i64, 2, 3], &message_ref.to_string());
    let listed: Vec<i64> = caption
        .lines()
        .filter_map(|line| line.rsplit_once("?id=").map(|(_, id)| id.trim_end_matches(')')))
        .map(|id| id.parse().expect("user id"))
        .collect();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn reveal_survives_accept_count_dropping() {
    let h = harness(2);
    let message_ref = started_with_proposal(&h).await;
    let dispatcher = h.service.dispatcher();

    dispatcher
        .dispatch(vote(message_ref, 1, "Alice", VoteChoice::Accept))
        .await;
    dispatcher
        .dispatch(vote(message_ref, 2, "Bob", VoteChoice::WithGuest))
        .await;
    dispatcher
        .dispatch(vote(message_ref, 2, "Bob", VoteChoice::Reject))
        .await;

    let caption = h.gateway.last_caption(GROUP).expect("caption");
    assert!(caption.contains("Alice"), "{caption}");
    assert!(caption.contains("Rejects (1):"), "{caption}");

    let proposal = h
        .service
        .engine()
        .store()
        .get(GROUP)
        .and_then(|c| c.proposal)
        .expect("proposal");
    assert!(proposal.revealed);
    assert!(!proposal.has_accepted(2));
    assert!(proposal.guests.is_empty());
}

#[tokio::test]
async fn recast_vote_neither_writes_nor_renders() {
    let h = harness(3);
    let message_ref = started_with_proposal(&h).await;
    let dispatcher = h.service.dispatcher();

    dispatcher
        .dispatch(vote(message_ref, 1, "Alice", VoteChoice::WithGuest))
        .await;
    let before = h.service.engine().store().get(GROUP).expect("ctx");
    h.gateway.clear();

    let reply = dispatcher
        .dispatch(vote(message_ref, 1, "Alice", VoteChoice::WithGuest))
        .await;
    assert_eq!(reply, Response::Silent);
    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.service.engine().store().get(GROUP).expect("ctx"), before);
}

#[tokio::test]
async fn vote_on_superseded_message_is_ignored() {
    let h = harness(3);
    let stale = started_with_proposal(&h).await;
    let engine = h.service.engine();

    let next_friday = NaiveDate::from_ymd_opt(2024, 5, 17).expect("date");
    let current = engine.propose(GROUP, next_friday).await.expect("propose");
    assert_ne!(current, stale);

    h.gateway.clear();
    let reply = h
        .service
        .dispatcher()
        .dispatch(vote(stale, 1, "Alice", VoteChoice::Accept))
        .await;
    assert_eq!(reply, Response::Silent);
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn new_proposal_force_closes_the_previous_one() {
    let h = harness(3);
    let first = started_with_proposal(&h).await;
    h.gateway.clear();

    let next_friday = NaiveDate::from_ymd_opt(2024, 5, 17).expect("date");
    h.service
        .engine()
        .propose(GROUP, next_friday)
        .await
        .expect("propose");

    let calls = h.gateway.calls_for(GROUP);
    assert!(matches!(calls[0], GatewayCall::Unpin { message_ref, .. } if message_ref == first));
    assert!(matches!(
        &calls[1],
        GatewayCall::EditCaption { message_ref, options, .. }
            if *message_ref == first && options.controls.is_none()
    ));
    assert!(matches!(calls[2], GatewayCall::Send { .. }));

    let context = h.service.engine().store().get(GROUP).expect("ctx");
    assert_eq!(context.sequence, 2);
}

#[tokio::test]
async fn records_reload_and_skip_corrupt_files() {
    let h = harness(3);
    started_with_proposal(&h).await;
    let dir = h.dir.path();

    std::fs::write(dir.join("-42.json"), "{ not json").expect("write corrupt");
    std::fs::write(
        dir.join("77.json"),
        r#"{"conversation_id": 78, "salt": "mismatch"}"#,
    )
    .expect("write mismatched");
    std::fs::write(dir.join("notes.txt"), "ignored").expect("write stray");

    let report = ContextStorage::new(dir).load_all().expect("load");
    assert_eq!(report.contexts.len(), 1);
    assert_eq!(report.contexts[0].conversation_id, GROUP);
    assert_eq!(report.skipped.len(), 2);
}
