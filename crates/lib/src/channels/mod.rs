//! Communication channels (Telegram).
//!
//! Channel trait and registry so the server can start/stop channel connectors
//! and deliver replies. Inbound messages are sent to the server for relaying.

mod inbound;
mod registry;
mod telegram;

pub use inbound::InboundMessage;
pub use registry::{ChannelHandle, ChannelRegistry};
pub use telegram::{TelegramChannel, TelegramUpdate, TELEGRAM_CHANNEL_ID};
