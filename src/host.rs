//! Wire messages exchanged with the process-level host (§6). The host and its OAuth
//! tooling are external collaborators (§1) — this module only describes the narrow JSON
//! interface between them and the engine.

use serde::{Deserialize, Serialize};

use crate::cache_engine::CacheStats;
use crate::display::DisplayPayload;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "INIT")]
    Init { config: serde_json::Value },
    #[serde(rename = "IMAGE_LOADED")]
    ImageLoaded { id: String },
    #[serde(rename = "GET_CACHE_STATS")]
    GetCacheStats,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "DISPLAY_PHOTO")]
    DisplayPhoto {
        #[serde(flatten)]
        payload: DisplayPayload,
    },
    #[serde(rename = "UPDATE_STATUS")]
    UpdateStatus { message: String },
    #[serde(rename = "CONNECTION_STATUS")]
    ConnectionStatus { status: &'static str, message: String },
    #[serde(rename = "ERROR")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    #[serde(rename = "CACHE_STATS")]
    CacheStats {
        #[serde(flatten)]
        stats: CacheStats,
    },
}

impl crate::sync::ConnectionState {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Retrying => "retrying",
            Self::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_message_round_trips() {
        let json = serde_json::json!({
            "type": "INIT",
            "config": { "provider_key": "google_photos" },
        });
        let msg: InboundMessage = serde_json::from_value(json).unwrap();
        assert!(matches!(msg, InboundMessage::Init { .. }));
    }

    #[test]
    fn get_cache_stats_has_no_payload() {
        let json = serde_json::json!({ "type": "GET_CACHE_STATS" });
        let msg: InboundMessage = serde_json::from_value(json).unwrap();
        assert!(matches!(msg, InboundMessage::GetCacheStats));
    }

    #[test]
    fn connection_status_serializes_with_tag_and_status_string() {
        let msg = OutboundMessage::ConnectionStatus {
            status: crate::sync::ConnectionState::Offline.as_wire_str(),
            message: "3 cached photos".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "CONNECTION_STATUS");
        assert_eq!(json["status"], "offline");
    }

    #[test]
    fn error_without_details_omits_the_field() {
        let msg = OutboundMessage::Error { message: "boom".into(), details: None };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("details").is_none());
    }
}
