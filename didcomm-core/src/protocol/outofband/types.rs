use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::Value;

use crate::engine::action::PendingAction;
use crate::engine::types::{Message, ProtocolError, PIID, OUTOFBAND_MESSAGE_PREFIX};

pub const DIDEXCHANGE_PROTOCOL: &str = "https://didcomm.org/didexchange/1.0";

pub const PROPERTY_CONNECTION_ID: &str = "connection_id";
pub const OPTION_MY_LABEL: &str = "my_label";

/// Out-of-Band state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Initial,
    Requested,
    AwaitingResponse,
    Done,
    Abandoned,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Initial => "initial",
            State::Requested => "requested",
            State::AwaitingResponse => "awaiting-response",
            State::Done => "done",
            State::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Done | State::Abandoned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Invitation,
    Request,
    HandshakeReuse,
    HandshakeReuseAccepted,
}

impl MessageType {
    pub fn parse(typ: &str) -> Option<Self> {
        let name = typ.strip_prefix(OUTOFBAND_MESSAGE_PREFIX)?;
        match name {
            "invitation" => Some(MessageType::Invitation),
            "request" => Some(MessageType::Request),
            "handshake-reuse" => Some(MessageType::HandshakeReuse),
            "handshake-reuse-accepted" => Some(MessageType::HandshakeReuseAccepted),
            _ => None,
        }
    }

    pub fn uri(&self) -> String {
        let name = match self {
            MessageType::Invitation => "invitation",
            MessageType::Request => "request",
            MessageType::HandshakeReuse => "handshake-reuse",
            MessageType::HandshakeReuseAccepted => "handshake-reuse-accepted",
        };

        format!("{}{}", OUTOFBAND_MESSAGE_PREFIX, name)
    }
}

/// Body of an out-of-band request
///
/// `services` entries are either a DID string or a service object carrying a `serviceEndpoint`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(crate = "self::serde")]
pub struct Request {
    pub label: String,

    #[serde(default)]
    pub goal: String,

    #[serde(default)]
    pub goal_code: String,

    #[serde(rename = "requests~attach")]
    pub attachments: Vec<Value>,

    #[serde(rename = "service")]
    pub services: Vec<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(crate = "self::serde")]
pub struct Invitation {
    pub label: String,

    #[serde(default)]
    pub goal: String,

    #[serde(default)]
    pub goal_code: String,

    #[serde(default)]
    pub protocols: Vec<String>,

    #[serde(rename = "service")]
    pub services: Vec<Value>,
}

/// Resolve the delivery endpoint of a service entry
pub fn service_destination(service: &Value) -> Option<String> {
    match service {
        Value::String(did) if !did.is_empty() => Some(did.to_owned()),
        Value::Object(map) => map
            .get("serviceEndpoint")
            .and_then(|endpoint| endpoint.as_str())
            .map(|endpoint| endpoint.to_string()),
        _ => None,
    }
}

/// `OutOfBandAPI` is the client surface of the Out-of-Band protocol
#[async_trait]
pub trait OutOfBandAPI: Clone + Send + Sync {
    /// create_request builds a signed request message. It never touches the engine state
    async fn create_request(
        &self,
        label: String,
        goal: String,
        goal_code: String,
        attachments: Vec<Value>,
        services: Vec<Value>,
    ) -> Result<Message, ProtocolError>;

    async fn create_invitation(
        &self,
        label: String,
        goal: String,
        goal_code: String,
        protocols: Vec<String>,
        services: Vec<Value>,
    ) -> Result<Message, ProtocolError>;

    /// accept_request completes a received request and returns the connection identifier
    async fn accept_request(
        &self,
        request: Message,
        my_label: String,
    ) -> Result<String, ProtocolError>;

    async fn accept_invitation(
        &self,
        invitation: Message,
        my_label: String,
    ) -> Result<String, ProtocolError>;

    async fn save_request(&self, request: Message) -> Result<PIID, ProtocolError>;
    async fn save_invitation(&self, invitation: Message) -> Result<PIID, ProtocolError>;

    async fn actions(&self) -> Result<Vec<PendingAction>, ProtocolError>;
    async fn action_continue(&self, piid: PIID, my_label: String) -> Result<(), ProtocolError>;
    async fn action_stop(&self, piid: PIID, reason: String) -> Result<(), ProtocolError>;
}
