//! Wire protocol for the Connection Hub. Every outbound message carries
//! the envelope fields `id`, `timestamp_ms`, `version`; every inbound
//! command is one of the fixed grammar variants.

use crate::model::GestureTag;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "2.0";

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum InboundCommand {
    Ping,
    Subscribe { project: String },
    Unsubscribe { project: String },
    ProjectSelect { project: String },
    ProjectStart { project: String },
    ProjectStop { project: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload {
    Connected {
        session_id: String,
    },
    Pong,
    Subscribed {
        project: String,
    },
    Unsubscribed {
        project: String,
    },
    ProjectSelected {
        project: String,
    },
    StatusChange {
        project: String,
        status: String,
    },
    Error {
        code: String,
        message: String,
    },
    GestureData {
        project: String,
        timestamp: f64,
        data: serde_json::Value,
    },
    ServerShutdown,
}

/// Wraps a payload with the envelope fields required on every send:
/// `id`, `timestamp_ms`, `version`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope {
    pub id: u64,
    pub timestamp_ms: u64,
    pub version: &'static str,
    #[serde(flatten)]
    pub payload: OutboundPayload,
}

impl OutboundEnvelope {
    pub fn new(id: u64, timestamp_ms: u64, payload: OutboundPayload) -> Self {
        OutboundEnvelope {
            id,
            timestamp_ms,
            version: PROTOCOL_VERSION,
            payload,
        }
    }
}

/// Classifier-agnostic gesture payload shape nested under `data` in a
/// `gesture_data` event: `{gesture_type, confidence, ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct GesturePayload {
    pub gesture_type: GestureTag,
    pub confidence: f32,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}
