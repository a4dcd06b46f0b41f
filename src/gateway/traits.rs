use crate::context::{ConversationId, MessageRef};
use async_trait::async_trait;

/// Message body handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    Text(String),
    /// Animated media (GIF/MP4 URL) with a caption.
    Animation { url: String, caption: String },
}

/// Inline button; `action` is echoed back as callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: String,
}

/// Inline keyboard, row by row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Controls {
    pub rows: Vec<Vec<Button>>,
}

/// Delivery options shared by send and edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Deliver without a notification sound.
    pub silent: bool,
    /// Text uses Markdown formatting.
    pub markdown: bool,
    /// Inline controls; `None` removes any existing controls on edit.
    pub controls: Option<Controls>,
}

/// Outbound half of the chat transport. Every call may fail; callers in the
/// core log the error and carry on.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Stable transport identifier (e.g. `telegram`).
    fn id(&self) -> &'static str;

    /// Send a new message and return its reference.
    async fn send(
        &self,
        conversation: ConversationId,
        content: OutboundContent,
        options: SendOptions,
    ) -> anyhow::Result<MessageRef>;

    /// Replace the caption (and controls) of a previously sent media message.
    async fn edit_caption(
        &self,
        conversation: ConversationId,
        message_ref: MessageRef,
        text: String,
        options: SendOptions,
    ) -> anyhow::Result<()>;

    async fn pin(&self, conversation: ConversationId, message_ref: MessageRef)
    -> anyhow::Result<()>;

    async fn unpin(
        &self,
        conversation: ConversationId,
        message_ref: MessageRef,
    ) -> anyhow::Result<()>;
}
