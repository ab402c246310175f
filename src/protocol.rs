use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Outbound request envelope
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub meta: RequestMeta,
    pub data: Value,
}

/// Request metadata
#[derive(Debug, Clone, Serialize)]
pub struct RequestMeta {
    pub id: Uuid,
    pub method: Method,
    pub endpoint: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "targetType")]
    pub target_type: Option<TargetType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Inbound frame, either a reply or an unsolicited notification
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub meta: EnvelopeMeta,
    #[serde(default)]
    pub data: Value,
}

/// Inbound frame metadata
#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeMeta {
    #[serde(default)]
    pub id: Option<String>,
    pub method: Method,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Payload type carried by notifications, e.g. `network`
    #[serde(default)]
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Endpoints used by this driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Master,
    Targets,
    Network,
    Gain,
    Mute,
    StreamingApi,
    SelectedInput,
    Preset,
    Sleep,
}

impl Endpoint {
    /// Wire name of the endpoint
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Targets => "targets",
            Self::Network => "network",
            Self::Gain => "gain2",
            Self::Mute => "mute",
            Self::StreamingApi => "streaming-api",
            Self::SelectedInput => "selectedInput",
            Self::Preset => "preset2",
            Self::Sleep => "sleep",
        }
    }
}

/// API methods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Read,
    Update,
    Subscribe,
    Select,
    Notify,
    #[serde(other)]
    Other,
}

/// Target type for requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Room,
    Device,
}

impl Request {
    /// Create a new request with a fresh correlation id and an empty payload
    pub fn new(endpoint: Endpoint, method: Method) -> Self {
        Self {
            meta: RequestMeta {
                id: Uuid::new_v4(),
                method,
                endpoint: endpoint.as_str(),
                target_type: None,
                target: None,
            },
            data: json!({}),
        }
    }

    /// Set the target type and ID
    pub fn with_target(mut self, target_type: TargetType, target: impl Into<String>) -> Self {
        self.meta.target_type = Some(target_type);
        self.meta.target = Some(target.into());
        self
    }

    /// Set the request data
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Get the request ID
    pub fn id(&self) -> Uuid {
        self.meta.id
    }

    /// Serialize into the text frame sent on the wire
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Envelope {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Whether this frame answers the request with the given id
    pub fn answers(&self, id: Uuid) -> bool {
        self.meta
            .id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .is_some_and(|frame_id| frame_id == id)
    }

    /// Whether this is a network notification carrying a `state` payload
    pub fn is_network_notification(&self) -> bool {
        self.meta.method == Method::Notify
            && self.meta.kind.as_deref() == Some("network")
            && self.data.get("state").is_some()
    }
}

/// Shorten a frame for logging
pub(crate) fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(120) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
