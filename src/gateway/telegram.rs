//! Telegram Bot API adapter: outbound calls and the `getUpdates` poller.

use crate::commands::{self, Dispatcher, Response, Trigger};
use crate::config::{ContentCatalog, TelegramConfig};
use crate::context::{ConversationId, MessageRef, VoteChoice};
use crate::gateway::traits::{Controls, MessagingGateway, OutboundContent, SendOptions};
use crate::proposal::render;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a failed `getUpdates` before polling again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bot API client.
#[derive(Clone)]
pub struct TelegramGateway {
    bot_token: String,
    api_base_url: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: MessageRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageRef,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub migrate_to_chat_id: Option<ConversationId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ConversationId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// An update reduced to what the dispatcher needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub trigger: Option<Trigger>,
    /// Set for button presses, which must always be answered.
    pub callback_id: Option<String>,
}

/// Map one update to a trigger. `None` when there is nothing to handle.
#[must_use]
pub fn inbound_from_update(update: &Update, catalog: &ContentCatalog) -> Option<Inbound> {
    if let Some(query) = &update.callback_query {
        let trigger = query.message.as_ref().and_then(|message| {
            let conversation = message.chat.id;
            let data = query.data.as_deref()?;
            if data == render::PROPOSE_ACTION {
                return Some(Trigger::Propose { conversation });
            }
            let choice = VoteChoice::from_callback(data)?;
            Some(Trigger::Vote {
                conversation,
                message_ref: message.message_id,
                user_id: query.from.id,
                display_name: render::display_name(
                    query.from.first_name.as_deref(),
                    query.from.last_name.as_deref(),
                    query.from.username.as_deref(),
                    catalog,
                ),
                choice,
            })
        });
        return Some(Inbound {
            trigger,
            callback_id: Some(query.id.clone()),
        });
    }

    let message = update.message.as_ref()?;
    if let Some(to) = message.migrate_to_chat_id {
        return Some(Inbound {
            trigger: Some(Trigger::Migrate {
                from: message.chat.id,
                to,
            }),
            callback_id: None,
        });
    }
    let trigger = commands::parse_command(message.chat.id, message.text.as_deref()?)?;
    Some(Inbound {
        trigger: Some(trigger),
        callback_id: None,
    })
}

fn reply_markup(controls: &Controls) -> Value {
    let rows: Vec<Vec<Value>> = controls
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.label, "callback_data": b.action }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn apply_options(body: &mut Value, options: &SendOptions) {
    if options.markdown {
        body["parse_mode"] = json!("Markdown");
    }
    if let Some(controls) = &options.controls {
        body["reply_markup"] = reply_markup(controls);
    }
}

impl TelegramGateway {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            poll_timeout_secs: config.poll_timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base_url, self.bot_token)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> anyhow::Result<T> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("telegram bot token is empty");
        }
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let parsed: ApiResponse<T> = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("telegram {method} failed ({status}): {e}: {text}"))?;
        if !parsed.ok {
            anyhow::bail!(
                "telegram {method} failed ({status}): {}",
                parsed.description.unwrap_or_default()
            );
        }
        parsed
            .result
            .ok_or_else(|| anyhow::anyhow!("telegram {method} returned no result"))
    }

    /// Acknowledge a button press, optionally with a short notice.
    ///
    /// # Errors
    ///
    /// Network or API errors.
    pub async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call::<bool>("answerCallbackQuery", &body).await.map(|_| ())
    }

    /// Long-poll for updates newer than `offset`.
    ///
    /// # Errors
    ///
    /// Network or API errors.
    pub async fn get_updates(&self, offset: i64) -> anyhow::Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &body).await
    }

    /// Poll updates and dispatch them until `cancel` fires.
    ///
    /// Every update is handled in its own task; the per-conversation locks
    /// keep handlers for the same conversation ordered.
    pub async fn run(
        self: Arc<Self>,
        dispatcher: Arc<Dispatcher>,
        catalog: Arc<ContentCatalog>,
        cancel: CancellationToken,
    ) {
        info!("telegram poller started");
        let mut offset = 0;
        loop {
            let updates = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.get_updates(offset) => result,
            };
            let updates = match updates {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("getUpdates failed: {e:#}");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(POLL_RETRY_DELAY) => continue,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(inbound) = inbound_from_update(&update, &catalog) else {
                    debug!(update_id = update.update_id, "update ignored");
                    continue;
                };
                let gateway = Arc::clone(&self);
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move { gateway.handle(&dispatcher, inbound).await });
            }
        }
        info!("telegram poller stopped");
    }

    async fn handle(&self, dispatcher: &Dispatcher, inbound: Inbound) {
        let (response, conversation) = match inbound.trigger {
            Some(trigger) => {
                let conversation = trigger.conversation();
                (dispatcher.dispatch(trigger).await, Some(conversation))
            }
            None => (Response::Silent, None),
        };

        if let Some(callback_id) = &inbound.callback_id {
            let toast = match &response {
                Response::Toast(text) => Some(text.as_str()),
                _ => None,
            };
            if let Err(e) = self.answer_callback(callback_id, toast).await {
                warn!("answerCallbackQuery failed: {e:#}");
            }
        }
        if let (Response::Reply(text), Some(conversation)) = (response, conversation)
            && let Err(e) = self
                .send(conversation, OutboundContent::Text(text), SendOptions::default())
                .await
        {
            warn!(conversation, "reply failed: {e:#}");
        }
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    fn id(&self) -> &'static str {
        "telegram"
    }

    async fn send(
        &self,
        conversation: ConversationId,
        content: OutboundContent,
        options: SendOptions,
    ) -> anyhow::Result<MessageRef> {
        let (method, mut body) = match content {
            OutboundContent::Text(text) => (
                "sendMessage",
                json!({ "chat_id": conversation, "text": text }),
            ),
            OutboundContent::Animation { url, caption } => (
                "sendAnimation",
                json!({ "chat_id": conversation, "animation": url, "caption": caption }),
            ),
        };
        if options.silent {
            body["disable_notification"] = json!(true);
        }
        apply_options(&mut body, &options);
        let sent: SentMessage = self.call(method, &body).await?;
        Ok(sent.message_id)
    }

    async fn edit_caption(
        &self,
        conversation: ConversationId,
        message_ref: MessageRef,
        text: String,
        options: SendOptions,
    ) -> anyhow::Result<()> {
        let mut body = json!({
            "chat_id": conversation,
            "message_id": message_ref,
            "caption": text,
        });
        apply_options(&mut body, &options);
        // The result is the edited message (or `true`); only success matters.
        self.call::<Value>("editMessageCaption", &body).await.map(|_| ())
    }

    async fn pin(&self, conversation: ConversationId, message_ref: MessageRef) -> anyhow::Result<()> {
        let body = json!({
            "chat_id": conversation,
            "message_id": message_ref,
            "disable_notification": true,
        });
        self.call::<bool>("pinChatMessage", &body).await.map(|_| ())
    }

    async fn unpin(
        &self,
        conversation: ConversationId,
        message_ref: MessageRef,
    ) -> anyhow::Result<()> {
        let body = json!({ "chat_id": conversation, "message_id": message_ref });
        self.call::<bool>("unpinChatMessage", &body).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::gateway::Button;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> TelegramGateway {
        TelegramGateway::new(&TelegramConfig {
            bot_token: "TOKEN".to_owned(),
            api_base_url: server.uri(),
            poll_timeout_secs: 0,
        })
    }

    fn update(value: Value) -> Update {
        serde_json::from_value(value).expect("update")
    }

    #[tokio::test]
    async fn send_animation_with_controls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendAnimation"))
            .and(body_partial_json(json!({
                "chat_id": -100,
                "animation": "https://example.com/a.gif",
                "caption": "Party?",
                "parse_mode": "Markdown",
                "disable_notification": true,
                "reply_markup": {"inline_keyboard": [[{"text": "Yes", "callback_data": "accept"}]]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 42, "chat": {"id": -100}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let options = SendOptions {
            silent: true,
            markdown: true,
            controls: Some(Controls {
                rows: vec![vec![Button {
                    label: "Yes".to_owned(),
                    action: "accept".to_owned(),
                }]],
            }),
        };
        let message_ref = gateway(&server)
            .send(
                -100,
                OutboundContent::Animation {
                    url: "https://example.com/a.gif".to_owned(),
                    caption: "Party?".to_owned(),
                },
                options,
            )
            .await
            .expect("send");
        assert_eq!(message_ref, 42);
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/pinChatMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: not enough rights"
            })))
            .mount(&server)
            .await;

        let err = gateway(&server).pin(-100, 7).await.expect_err("pin fails");
        assert!(err.to_string().contains("not enough rights"), "{err}");
    }

    #[tokio::test]
    async fn edit_without_controls_omits_keyboard() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/editMessageCaption"))
            .and(body_partial_json(json!({"chat_id": 5, "message_id": 9, "caption": "closed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server)
            .edit_caption(5, 9, "closed".to_owned(), SendOptions::default())
            .await
            .expect("edit");

        let requests = server.received_requests().await.expect("recorded");
        let body: Value = serde_json::from_slice(&requests[0].body).expect("json");
        assert!(body.get("reply_markup").is_none());
    }

    #[tokio::test]
    async fn empty_token_fails_without_request() {
        let gateway = TelegramGateway::new(&TelegramConfig::default());
        assert!(gateway.unpin(1, 1).await.is_err());
    }

    #[tokio::test]
    async fn get_updates_parses_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_partial_json(json!({"offset": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 10, "message": {"message_id": 1, "chat": {"id": -5}, "text": "/stop"}},
                    {"update_id": 11, "edited_message": {"message_id": 2}}
                ]
            })))
            .mount(&server)
            .await;

        let updates = gateway(&server).get_updates(10).await.expect("updates");
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].update_id, 11);
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn maps_commands_and_migration() {
        let catalog = ContentCatalog::default();
        let stop = update(json!({
            "update_id": 1,
            "message": {"message_id": 1, "chat": {"id": -5}, "text": "/stop@trickster_bot"}
        }));
        assert_eq!(
            inbound_from_update(&stop, &catalog).and_then(|i| i.trigger),
            Some(Trigger::Stop { conversation: -5 })
        );

        let migrate = update(json!({
            "update_id": 2,
            "message": {"message_id": 2, "chat": {"id": -5}, "migrate_to_chat_id": -1_000_005}
        }));
        assert_eq!(
            inbound_from_update(&migrate, &catalog).and_then(|i| i.trigger),
            Some(Trigger::Migrate {
                from: -5,
                to: -1_000_005
            })
        );

        let chatter = update(json!({
            "update_id": 3,
            "message": {"message_id": 3, "chat": {"id": -5}, "text": "hi all"}
        }));
        assert!(inbound_from_update(&chatter, &catalog).is_none());
    }

    #[test]
    fn maps_button_presses() {
        let catalog = ContentCatalog::default();
        let vote = update(json!({
            "update_id": 4,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 77, "first_name": "Ann", "username": "ann"},
                "message": {"message_id": 500, "chat": {"id": -5}},
                "data": "with-guest"
            }
        }));
        let inbound = inbound_from_update(&vote, &catalog).expect("inbound");
        assert_eq!(inbound.callback_id.as_deref(), Some("cb1"));
        assert_eq!(
            inbound.trigger,
            Some(Trigger::Vote {
                conversation: -5,
                message_ref: 500,
                user_id: 77,
                display_name: "Ann".to_owned(),
                choice: VoteChoice::WithGuest,
            })
        );

        let propose = update(json!({
            "update_id": 5,
            "callback_query": {
                "id": "cb2",
                "from": {"id": 77},
                "message": {"message_id": 501, "chat": {"id": -5}},
                "data": "propose"
            }
        }));
        assert_eq!(
            inbound_from_update(&propose, &catalog).and_then(|i| i.trigger),
            Some(Trigger::Propose { conversation: -5 })
        );

        let unknown = update(json!({
            "update_id": 6,
            "callback_query": {"id": "cb3", "from": {"id": 77}, "data": "bogus"}
        }));
        let inbound = inbound_from_update(&unknown, &catalog).expect("still answered");
        assert!(inbound.trigger.is_none());
        assert_eq!(inbound.callback_id.as_deref(), Some("cb3"));
    }
}
