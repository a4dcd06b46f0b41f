//! Configuration types for the scheduling assistant.

use chrono::{FixedOffset, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TricksterConfig {
    /// Shared token required by the start command (`/start <token>`).
    pub invite_token: String,
    /// Offset of the group's local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
    /// Accept votes needed before voter names are revealed.
    pub quorum_size: usize,
    /// Directory for per-conversation records (None = [`crate::paths::contexts_dir`]).
    pub storage_dir: Option<PathBuf>,
    /// Background heartbeat timing.
    pub heartbeat: HeartbeatConfig,
    /// Night window during which pins and notifications are suppressed.
    pub quiet_hours: QuietHoursConfig,
    /// Proposal lifetime settings.
    pub proposal: ProposalConfig,
    /// Weekly automatic proposal window.
    pub auto_propose: AutoProposeConfig,
    /// Chat transport settings.
    pub telegram: TelegramConfig,
    /// User-facing texts and media.
    pub catalog: ContentCatalog,
}

impl Default for TricksterConfig {
    fn default() -> Self {
        Self {
            invite_token: "123".to_owned(),
            utc_offset_minutes: 180,
            quorum_size: 8,
            storage_dir: None,
            heartbeat: HeartbeatConfig::default(),
            quiet_hours: QuietHoursConfig::default(),
            proposal: ProposalConfig::default(),
            auto_propose: AutoProposeConfig::default(),
            telegram: TelegramConfig::default(),
            catalog: ContentCatalog::default(),
        }
    }
}

/// Jitter range for the self-rescheduling heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Shortest pause between two beats, in seconds.
    pub min_delay_secs: u64,
    /// Longest pause between two beats (exclusive), in seconds.
    pub max_delay_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 5 * 60,
            max_delay_secs: 15 * 60,
        }
    }
}

/// Daytime band. Local hours outside `day_start_hour..=day_end_hour` are quiet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHoursConfig {
    /// First daytime hour (0-23).
    pub day_start_hour: u32,
    /// Last daytime hour (0-23).
    pub day_end_hour: u32,
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self {
            day_start_hour: 9,
            day_end_hour: 20,
        }
    }
}

impl QuietHoursConfig {
    /// Returns `true` when `hour` falls in the quiet (night) window.
    #[must_use]
    pub fn is_quiet(&self, hour: u32) -> bool {
        hour < self.day_start_hour || hour > self.day_end_hour
    }
}

/// Proposal lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    /// Local hour on the target date that the close deadline is measured from.
    pub event_hour: u32,
    /// Hours after the event start before an open proposal is closed.
    pub close_after_hours: i64,
    /// Link template for voter mentions; `{id}` is replaced by the user id.
    pub mention_url: String,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            event_hour: 13,
            close_after_hours: 22,
            mention_url: "tg://user?id={id}".to_owned(),
        }
    }
}

const MAX_CLOSE_AFTER_HOURS: i64 = 24 * 14;
const MAX_COOLDOWN_DAYS: i64 = 366;

/// Weekly window in which automatic proposals are triggered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoProposeConfig {
    /// Last weekday (inclusive) of the window.
    pub last_weekday: Weekday,
    /// First local hour of the window.
    pub start_hour: u32,
    /// Last local hour (inclusive) of the window.
    pub end_hour: u32,
    /// Number of days the per-conversation trigger is spread over.
    pub spread_days: u32,
    /// Number of minutes after `start_hour` the trigger is spread over.
    pub spread_minutes: u32,
    /// A proposal targeting at most this many days before the trigger's week start suppresses a new one.
    pub cooldown_days: i64,
}

impl Default for AutoProposeConfig {
    fn default() -> Self {
        Self {
            last_weekday: Weekday::Wed,
            start_hour: 12,
            end_hour: 18,
            spread_days: 3,
            spread_minutes: 300,
            cooldown_days: 7,
        }
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token. Overridden by `TRICKSTER_BOT_TOKEN` when set.
    pub bot_token: String,
    /// API root, without trailing slash.
    pub api_base_url: String,
    /// Long-poll timeout for `getUpdates`, in seconds.
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: "https://api.telegram.org".to_owned(),
            poll_timeout_secs: 30,
        }
    }
}

/// Texts and media shown to the group.
///
/// Question templates may contain `{{FORMAT}}` placeholders, where `FORMAT`
/// is a chrono strftime pattern applied to the proposal's target date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentCatalog {
    pub user_unknown: String,
    /// Introduction text; `{quorum}` is replaced by the quorum size.
    pub introduction: String,
    pub propose_button: String,
    pub questions: Vec<String>,
    pub animations: Vec<String>,
    pub propose_confirmations: Vec<String>,
    pub propose_excessive: Vec<String>,
    pub accept: String,
    pub reject: String,
    pub with_guest: String,
    pub accepts_title: String,
    pub rejects_title: String,
    pub accept_confirmations: Vec<String>,
    pub reject_confirmations: Vec<String>,
    pub start_denied: String,
    pub start_existing: String,
    pub stop_farewell: String,
    pub restart_saved: String,
    pub restart_cleared: String,
    pub restart_usage: String,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl Default for ContentCatalog {
    fn default() -> Self {
        Self {
            user_unknown: "Unknown".to_owned(),
            introduction: "Hi, I'm Trickster! Sometimes I'll invite you to hang out and you can \
                           vote up or down. Voting stays secret until a quorum is reached \
                           ({quorum} votes in favor), then it's open. What to do with the \
                           results is up to you! 😜"
                .to_owned(),
            propose_button: "I want a party! 🥳".to_owned(),
            questions: owned(&[
                "🍕 Let's hang out on Friday {{%-d %B}}?",
                "🍕 Let's get together on Friday {{%-d %B}}?",
                "🥳 How about we hang out on Friday ({{%-d %B}})?",
                "🥳 Let's party hard on Friday ({{%-d %B}})?",
                "🎉 Maybe we can have a Friday party ({{%-d %B}})?",
                "🎉 Maybe we can meet on Friday ({{%-d %B}})?",
                "🍷 Let's celebrate the end of the work week {{%-d %B}}?",
                "🍺 I suggest drinking on Friday ({{%-d %B}}).",
            ]),
            animations: owned(&[
                "https://media.tenor.com/_QsyK0soR0QAAAAC/dogville-booze.gif",
                "https://media.tenor.com/-A8Wjyk_iiEAAAAC/party-pusheen.gif",
                "https://media.tenor.com/0jxXFUxn7lEAAAAC/drinking-inna.gif",
            ]),
            propose_confirmations: owned(&[
                "👍 Good!",
                "👍 Let's try to arrange it!",
                "🙌 Great!",
                "👌 Ok!",
                "✅ Accepted!",
            ]),
            propose_excessive: owned(&[
                "😁 Already offered!",
                "😎 Check your chat history!",
                "😈 Already done!",
            ]),
            accept: "👍 Accept".to_owned(),
            reject: "👎 Reject".to_owned(),
            with_guest: "✌️ Will bring guest".to_owned(),
            accepts_title: "Accepts".to_owned(),
            rejects_title: "Rejects".to_owned(),
            accept_confirmations: owned(&[
                "👏 Great!",
                "🤩 Awesome!",
                "🙂 Good!",
                "🤘 Cool!",
                "👍 Way to go!",
            ]),
            reject_confirmations: owned(&[
                "🔮 Maybe next time...",
                "⏳ Maybe you'll change your mind...",
                "🙄 Well, okay...",
                "😔 It's a pity...",
            ]),
            start_denied: "🤨".to_owned(),
            start_existing: "👌".to_owned(),
            stop_farewell: "👋".to_owned(),
            restart_saved: "🗓 Automatic proposals will go out on {schedule}.".to_owned(),
            restart_cleared: "🗓 Back to the default proposal schedule.".to_owned(),
            restart_usage: "Usage: /restart <Mon|Tue|Wed|Thu|Fri|Sat|Sun> <hour 0-23> <minute 0-59>, \
                            e.g. /restart Sat 9 15, or /restart off"
                .to_owned(),
        }
    }
}

impl TricksterConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::TricksterError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::TricksterError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::paths::config_file()
    }

    /// Apply environment overrides (currently only the bot token).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TRICKSTER_BOT_TOKEN")
            && !token.trim().is_empty()
        {
            self.telegram.bot_token = token.trim().to_owned();
        }
    }

    /// Resolved record directory.
    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(crate::paths::contexts_dir)
    }

    /// Local timezone offset. Falls back to UTC for out-of-range values.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    /// Check cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TricksterError::Config`] describing the first problem found.
    pub fn validate(&self) -> crate::error::Result<()> {
        let fail = |msg: &str| Err(crate::error::TricksterError::Config(msg.to_owned()));

        if FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).is_none() {
            return fail("utc_offset_minutes must be within ±24h");
        }
        if self.quorum_size == 0 {
            return fail("quorum_size must be at least 1");
        }
        if self.heartbeat.min_delay_secs == 0
            || self.heartbeat.min_delay_secs >= self.heartbeat.max_delay_secs
        {
            return fail("heartbeat delays must satisfy 0 < min_delay_secs < max_delay_secs");
        }
        if self.quiet_hours.day_start_hour > 23
            || self.quiet_hours.day_end_hour > 23
            || self.quiet_hours.day_start_hour > self.quiet_hours.day_end_hour
        {
            return fail("quiet_hours must satisfy day_start_hour <= day_end_hour < 24");
        }
        if self.proposal.event_hour > 23
            || !(0..=MAX_CLOSE_AFTER_HOURS).contains(&self.proposal.close_after_hours)
        {
            return fail("proposal.event_hour must be < 24 and close_after_hours within 0..=336");
        }
        let auto = &self.auto_propose;
        if !(0..=MAX_COOLDOWN_DAYS).contains(&auto.cooldown_days) {
            return fail("auto_propose.cooldown_days must be within 0..=366");
        }
        if auto.start_hour > auto.end_hour || auto.end_hour > 23 {
            return fail("auto_propose hours must satisfy start_hour <= end_hour < 24");
        }
        if auto.spread_days == 0 || auto.spread_minutes == 0 {
            return fail("auto_propose spread_days and spread_minutes must be positive");
        }
        let catalog = &self.catalog;
        if catalog.questions.is_empty() || catalog.animations.is_empty() {
            return fail("catalog needs at least one question and one animation");
        }
        if catalog.propose_confirmations.is_empty()
            || catalog.propose_excessive.is_empty()
            || catalog.accept_confirmations.is_empty()
            || catalog.reject_confirmations.is_empty()
        {
            return fail("catalog confirmation lists must not be empty");
        }
        Ok(())
    }
}
