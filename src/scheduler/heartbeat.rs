//! Self-rescheduling background heartbeat.
//!
//! Every beat runs three sweeps over all contexts: pin fresh proposals,
//! close expired ones, and fire the weekly automatic proposal. Sweeps take a
//! snapshot with [`ContextStore::find`](crate::context::ContextStore::find)
//! and re-check each candidate under its own lock before acting.

use crate::clock;
use crate::config::TricksterConfig;
use crate::context::{Context, ConversationId};
use crate::error::TricksterError;
use crate::proposal::ProposalEngine;
use crate::proposal::machine;
use crate::random;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for one beat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeatReport {
    pub pinned: usize,
    pub closed: usize,
    pub proposed: usize,
    /// Contexts whose sweep step returned an error.
    pub failed: usize,
}

/// Background task driving pins, closes and automatic proposals.
#[derive(Clone)]
pub struct Heartbeat {
    engine: Arc<ProposalEngine>,
    cancel: CancellationToken,
}

impl Heartbeat {
    pub fn new(engine: Arc<ProposalEngine>, cancel: CancellationToken) -> Self {
        Self { engine, cancel }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Sleep a jittered delay, beat, repeat until cancelled.
    ///
    /// Each beat runs in its own task so a panic inside a sweep is logged
    /// and the loop keeps going.
    pub async fn run(self) {
        info!("heartbeat started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let delay = self.next_delay();
            debug!(delay_secs = delay.as_secs(), "next heartbeat scheduled");
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }

            let now = self.engine.clock().now();
            let beat = self.clone();
            match tokio::spawn(async move { beat.beat(now).await }).await {
                Ok(report) => debug!(?report, "heartbeat finished"),
                Err(e) => error!("heartbeat beat aborted: {e}"),
            }
        }
        info!("heartbeat stopped");
    }

    fn next_delay(&self) -> std::time::Duration {
        let heartbeat = &self.engine.config().heartbeat;
        random::random_duration(
            std::time::Duration::from_secs(heartbeat.min_delay_secs)
                ..std::time::Duration::from_secs(heartbeat.max_delay_secs),
        )
    }

    /// Run all sweeps once as of `now`.
    pub async fn beat(&self, now: DateTime<FixedOffset>) -> BeatReport {
        let mut report = BeatReport::default();
        if self.cancel.is_cancelled() {
            return report;
        }
        self.pin_sweep(&now, &mut report).await;
        if self.cancel.is_cancelled() {
            return report;
        }
        self.close_sweep(&now, &mut report).await;
        if self.cancel.is_cancelled() {
            return report;
        }
        self.propose_sweep(&now, &mut report).await;
        report
    }

    async fn pin_sweep(&self, now: &DateTime<FixedOffset>, report: &mut BeatReport) {
        if self.engine.config().quiet_hours.is_quiet(now.hour()) {
            return;
        }
        let candidates = self
            .engine
            .store()
            .find(|c| c.open_proposal().is_some_and(|p| !p.pinned));
        for context in candidates {
            let key = context.conversation_id;
            match self.engine.pin_at(key, now).await {
                Ok(true) => report.pinned += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    error!(conversation = key, "pin failed: {e}");
                }
            }
        }
    }

    async fn close_sweep(&self, now: &DateTime<FixedOffset>, report: &mut BeatReport) {
        let config = self.engine.config();
        let candidates = self
            .engine
            .store()
            .find(|c| machine::is_overdue(c, now, config));
        for context in candidates {
            let key = context.conversation_id;
            let lease = self.engine.store().lock(key).await;
            let still_overdue = lease
                .current()
                .is_some_and(|c| machine::is_overdue(&c, now, config));
            if !still_overdue {
                continue;
            }
            match self.engine.close_leased(&lease).await {
                Ok(true) => report.closed += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    error!(conversation = key, "close failed: {e}");
                }
            }
        }
    }

    async fn propose_sweep(&self, now: &DateTime<FixedOffset>, report: &mut BeatReport) {
        let config = self.engine.config();
        let candidates = self
            .engine
            .store()
            .find(|c| due_target(c, now, config).is_some());
        for context in candidates {
            let key: ConversationId = context.conversation_id;
            let lease = self.engine.store().lock(key).await;
            let Some(target) = lease.current().and_then(|c| due_target(&c, now, config)) else {
                continue;
            };
            match self.engine.propose_leased(&lease, target).await {
                Ok(_) => report.proposed += 1,
                Err(TricksterError::DuplicateProposal { .. }) => {
                    debug!(conversation = key, %target, "automatic proposal already open");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(conversation = key, %target, "automatic proposal failed: {e}");
                }
            }
        }
    }
}

/// This week's automatic trigger instant for `context`, if any.
///
/// A restart schedule pins the trigger to its weekday and time. Without one
/// the trigger is only computed while `now` is inside the weekly window and
/// is spread over that window by a hash of the salt and the week.
#[must_use]
pub fn trigger_instant(
    context: &Context,
    now: &DateTime<FixedOffset>,
    config: &TricksterConfig,
) -> Option<DateTime<FixedOffset>> {
    let week = clock::week_start(now);

    if let Some(schedule) = context.restart_schedule {
        return Some(
            week + Duration::days(i64::from(schedule.weekday.num_days_from_monday()))
                + Duration::hours(i64::from(schedule.hour))
                + Duration::minutes(i64::from(schedule.minute)),
        );
    }

    let auto = &config.auto_propose;
    let in_window = now.weekday().num_days_from_monday() <= auto.last_weekday.num_days_from_monday()
        && (auto.start_hour..=auto.end_hour).contains(&now.hour());
    if !in_window {
        return None;
    }

    let week_label = week.format("%Y-%m-%d").to_string();
    let nonce = random::sha256_hex(&[context.salt.as_str(), week_label.as_str()]);
    let day = u16::from_str_radix(nonce.get(0..4)?, 16).ok()?;
    let minute = u16::from_str_radix(nonce.get(4..8)?, 16).ok()?;

    Some(
        week + Duration::days(i64::from(u32::from(day) % auto.spread_days))
            + Duration::hours(i64::from(auto.start_hour))
            + Duration::minutes(i64::from(u32::from(minute) % auto.spread_minutes)),
    )
}

/// Target date of the automatic proposal due for `context` at `now`.
///
/// `None` before the trigger instant, outside the window, or when the
/// current proposal targets a date no more than `cooldown_days` before the
/// start of the trigger's week. A target after the week start counts as
/// recent too.
#[must_use]
pub fn due_target(
    context: &Context,
    now: &DateTime<FixedOffset>,
    config: &TricksterConfig,
) -> Option<NaiveDate> {
    let trigger = trigger_instant(context, now, config)?;
    if *now <= trigger {
        return None;
    }
    let week = clock::week_start(&trigger).date_naive();
    let recent = context.proposal.as_ref().is_some_and(|p| {
        week.signed_duration_since(p.target_date).num_days() <= config.auto_propose.cooldown_days
    });
    (!recent).then(|| clock::next_friday(&trigger))
}
