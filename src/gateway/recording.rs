//! In-process gateway that records every call instead of talking to a chat
//! service. Used by unit and integration tests.

use crate::context::{ConversationId, MessageRef};
use crate::gateway::traits::{MessagingGateway, OutboundContent, SendOptions};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// One recorded gateway invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Send {
        conversation: ConversationId,
        content: OutboundContent,
        options: SendOptions,
        message_ref: MessageRef,
    },
    EditCaption {
        conversation: ConversationId,
        message_ref: MessageRef,
        text: String,
        options: SendOptions,
    },
    Pin {
        conversation: ConversationId,
        message_ref: MessageRef,
    },
    Unpin {
        conversation: ConversationId,
        message_ref: MessageRef,
    },
}

impl GatewayCall {
    #[must_use]
    pub fn conversation(&self) -> ConversationId {
        match self {
            Self::Send { conversation, .. }
            | Self::EditCaption { conversation, .. }
            | Self::Pin { conversation, .. }
            | Self::Unpin { conversation, .. } => *conversation,
        }
    }
}

/// Recording gateway with injectable failures.
///
/// Successful sends hand out increasing message references starting at 100.
/// Failed calls are recorded too, so tests can assert that an attempt was made.
#[derive(Debug)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    next_ref: AtomicI64,
    fail_everything: AtomicBool,
    failing_conversations: Mutex<HashSet<ConversationId>>,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_ref: AtomicI64::new(100),
            fail_everything: AtomicBool::new(false),
            failing_conversations: Mutex::new(HashSet::new()),
        }
    }
}

impl RecordingGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.fail_everything.store(failing, Ordering::SeqCst);
    }

    /// Make every call targeting `conversation` fail.
    pub fn fail_conversation(&self, conversation: ConversationId) {
        if let Ok(mut set) = self.failing_conversations.lock() {
            set.insert(conversation);
        }
    }

    /// Snapshot of all calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Calls for one conversation.
    #[must_use]
    pub fn calls_for(&self, conversation: ConversationId) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.conversation() == conversation)
            .collect()
    }

    /// Text of the last caption edit (or send caption) for `conversation`.
    #[must_use]
    pub fn last_caption(&self, conversation: ConversationId) -> Option<String> {
        self.calls_for(conversation)
            .into_iter()
            .rev()
            .find_map(|call| match call {
                GatewayCall::EditCaption { text, .. } => Some(text),
                GatewayCall::Send {
                    content: OutboundContent::Animation { caption, .. },
                    ..
                } => Some(caption),
                _ => None,
            })
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn record(&self, conversation: ConversationId, call: GatewayCall) -> anyhow::Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        let targeted = self
            .failing_conversations
            .lock()
            .map(|set| set.contains(&conversation))
            .unwrap_or(false);
        if targeted || self.fail_everything.load(Ordering::SeqCst) {
            anyhow::bail!("injected transport failure for {conversation}");
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send(
        &self,
        conversation: ConversationId,
        content: OutboundContent,
        options: SendOptions,
    ) -> anyhow::Result<MessageRef> {
        let message_ref = self.next_ref.fetch_add(1, Ordering::SeqCst);
        self.record(
            conversation,
            GatewayCall::Send {
                conversation,
                content,
                options,
                message_ref,
            },
        )?;
        Ok(message_ref)
    }

    async fn edit_caption(
        &self,
        conversation: ConversationId,
        message_ref: MessageRef,
        text: String,
        options: SendOptions,
    ) -> anyhow::Result<()> {
        self.record(
            conversation,
            GatewayCall::EditCaption {
                conversation,
                message_ref,
                text,
                options,
            },
        )
    }

    async fn pin(
        &self,
        conversation: ConversationId,
        message_ref: MessageRef,
    ) -> anyhow::Result<()> {
        self.record(
            conversation,
            GatewayCall::Pin {
                conversation,
                message_ref,
            },
        )
    }

    async fn unpin(
        &self,
        conversation: ConversationId,
        message_ref: MessageRef,
    ) -> anyhow::Result<()> {
        self.record(
            conversation,
            GatewayCall::Unpin {
                conversation,
                message_ref,
            },
        )
    }
}
