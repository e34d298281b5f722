//! Request correlation: attach a fresh trace id and fixed call metadata to an inbound message.

use crate::channels::InboundMessage;
use serde::Serialize;

/// Tool name sent with every outbound request.
pub const TOOL_NAME: &str = "voi_docs";

/// Role of the asking party (wire value "USER").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    User,
}

/// Surface the question originated from (wire value "TELEGRAM").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserSurface {
    Telegram,
}

/// One user turn, correlated for the VOI API.
///
/// Serializes to the outbound request body. `rqu_id` is generated fresh per request
/// and is also sent as the x-trace-id header so correlation survives if the API
/// ignores one copy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelatedRequest {
    pub rqu_id: String,
    pub chat_id: String,
    pub query: String,
    pub user_id: String,
    pub tool_name: &'static str,
    pub user_role: UserRole,
    pub user_surface: UserSurface,
    /// Always empty: the relay builds no multi-turn context.
    pub context: Vec<serde_json::Value>,
}

/// Build a CorrelatedRequest for an inbound message with a freshly generated UUID v4 id.
pub fn correlate(msg: &InboundMessage) -> CorrelatedRequest {
    CorrelatedRequest {
        rqu_id: uuid::Uuid::new_v4().to_string(),
        chat_id: msg.chat_id.clone(),
        query: msg.text.clone(),
        user_id: msg.user_id.clone(),
        tool_name: TOOL_NAME,
        user_role: UserRole::User,
        user_surface: UserSurface::Telegram,
        context: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn inbound() -> InboundMessage {
        InboundMessage {
            chat_id: "42".to_string(),
            user_id: "7".to_string(),
            text: "как оформить ТСР?".to_string(),
        }
    }

    #[test]
    fn correlation_id_is_uuid_v4() {
        let req = correlate(&inbound());
        let parsed = uuid::Uuid::parse_str(&req.rqu_id).expect("valid uuid");
        assert_eq!(parsed.get_version(), Some(uuid::Version::Random));
    }

    #[test]
    fn correlation_ids_are_unique() {
        let msg = inbound();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(correlate(&msg).rqu_id));
        }
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let req = correlate(&inbound());
        let value = serde_json::to_value(&req).expect("serialize");
        let obj = value.as_object().expect("object");
        assert_eq!(obj.get("rquId").and_then(|v| v.as_str()), Some(req.rqu_id.as_str()));
        assert_eq!(obj.get("chatId").and_then(|v| v.as_str()), Some("42"));
        assert_eq!(obj.get("userId").and_then(|v| v.as_str()), Some("7"));
        assert_eq!(obj.get("query").and_then(|v| v.as_str()), Some("как оформить ТСР?"));
        assert_eq!(obj.get("toolName").and_then(|v| v.as_str()), Some("voi_docs"));
        assert_eq!(obj.get("userRole").and_then(|v| v.as_str()), Some("USER"));
        assert_eq!(obj.get("userSurface").and_then(|v| v.as_str()), Some("TELEGRAM"));
        assert_eq!(obj.get("context").and_then(|v| v.as_array()).map(|a| a.len()), Some(0));
    }
}
