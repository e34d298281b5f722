//! Inbound message from a channel: delivered to the server for relaying.

/// One user turn from a chat channel, to be relayed to the VOI API.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: String,
    pub user_id: String,
    pub text: String,
}
