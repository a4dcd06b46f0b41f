//! Outbound messaging: the transport contract and its implementations.

pub mod recording;
pub mod telegram;
pub mod traits;

pub use recording::{GatewayCall, RecordingGateway};
pub use telegram::TelegramGateway;
pub use traits::{Button, Controls, MessagingGateway, OutboundContent, SendOptions};
