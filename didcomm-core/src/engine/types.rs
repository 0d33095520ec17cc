use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use derive_more::{AsRef, From, Into};
use the_newtype::Newtype;

use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::{self, Map, Value};
use rst_common::standard::uuid::Uuid;
use rst_common::with_errors::thiserror::{self, Error};

use super::action::PendingAction;
use super::event::{ActionEvent, MessageEvent};
use super::instance::ProtocolInstance;

pub const OUTOFBAND_MESSAGE_PREFIX: &str = "https://didcomm.org/out-of-band/1.0/";
pub const INTRODUCE_MESSAGE_PREFIX: &str = "https://didcomm.org/introduce/1.0/";

pub const DEFAULT_LISTENER_TIMEOUT_SECS: u64 = 10;

/// ProtocolError is a base error types for the protocol engine
///
/// Synchronous API calls carry the piid inside the error message when one is involved
#[derive(Debug, PartialEq, Error, Serialize, Deserialize, Clone)]
#[serde(crate = "self::serde")]
pub enum ProtocolError {
    #[error("action listener already registered")]
    AlreadyRegistered,

    #[error("action listener not registered")]
    NotRegistered,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported transition: {0}")]
    UnsupportedTransition(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("delivery error: {0}")]
    DeliveryError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("signer error: {0}")]
    SignerError(String),

    #[error("serialize error: {0}")]
    SerializeError(String),

    #[error("unserialize error: {0}")]
    UnserializeError(String),
}

/// Protocol instance identifier
///
/// Minted at the first message of an execution and stable for its whole lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Newtype, From, Into, AsRef)]
#[serde(crate = "self::serde")]
pub struct PIID(String);

impl PIID {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PIID {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolType {
    OutOfBand,
    Introduce,
}

impl ProtocolType {
    /// Resolve the protocol that owns the given message type URI
    pub fn from_message_type(typ: &str) -> Option<Self> {
        if typ.starts_with(OUTOFBAND_MESSAGE_PREFIX) {
            return Some(ProtocolType::OutOfBand);
        }

        if typ.starts_with(INTRODUCE_MESSAGE_PREFIX) {
            return Some(ProtocolType::Introduce);
        }

        None
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            ProtocolType::OutOfBand => OUTOFBAND_MESSAGE_PREFIX,
            ProtocolType::Introduce => INTRODUCE_MESSAGE_PREFIX,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolType::OutOfBand => "out-of-band",
            ProtocolType::Introduce => "introduce",
        }
    }
}

/// Message is the engine level envelope
///
/// The engine only reads the routing fields. The `body` schema is owned by
/// each protocol's transition table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct Message {
    id: String,

    #[serde(rename = "type")]
    typ: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    thid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    from: Option<String>,

    #[serde(default)]
    body: Value,
}

impl Message {
    pub fn new(typ: String, body: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            typ,
            thid: None,
            from: None,
            body,
        }
    }

    pub fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }

    pub fn with_thid(mut self, thid: String) -> Self {
        self.thid = Some(thid);
        self
    }

    pub fn with_from(mut self, from: String) -> Self {
        self.from = Some(from);
        self
    }

    pub fn get_id(&self) -> &str {
        &self.id
    }

    pub fn get_type(&self) -> &str {
        &self.typ
    }

    pub fn get_thid(&self) -> Option<&String> {
        self.thid.as_ref()
    }

    pub fn get_from(&self) -> Option<&String> {
        self.from.as_ref()
    }

    pub fn get_body(&self) -> &Value {
        &self.body
    }

    /// The correlation key of the thread this message belongs to
    pub fn thread_id(&self) -> String {
        self.thid.clone().unwrap_or_else(|| self.id.clone())
    }

    /// Merge continuation options into the body
    ///
    /// Options keys override body keys. A non-object body is kept under `body`
    pub fn merge_options(&self, options: &Value) -> Message {
        let mut merged = match &self.body {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("body".to_string(), other.clone());
                map
            }
        };

        if let Value::Object(opts) = options {
            for (key, value) in opts.iter() {
                merged.insert(key.to_owned(), value.to_owned());
            }
        }

        let mut message = self.clone();
        message.body = Value::Object(merged);
        message
    }

    pub fn body_as<T>(&self) -> Result<T, ProtocolError>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_value(self.body.clone())
            .map_err(|err| ProtocolError::UnserializeError(err.to_string()))
    }
}

/// OutboundMessage is a message handed to the transport collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct OutboundMessage {
    destination: String,
    message: Message,
}

impl OutboundMessage {
    pub fn new(destination: String, message: Message) -> Self {
        Self {
            destination,
            message,
        }
    }

    pub fn get_destination(&self) -> &str {
        &self.destination
    }

    pub fn get_message(&self) -> &Message {
        &self.message
    }
}

/// EngineOptions carries the engine runtime tunables
#[derive(Debug, Clone)]
pub struct EngineOptions {
    listener_timeout: Duration,
}

impl EngineOptions {
    pub fn new(listener_timeout: Duration) -> Self {
        Self { listener_timeout }
    }

    pub fn get_listener_timeout(&self) -> Duration {
        self.listener_timeout
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            listener_timeout: Duration::from_secs(DEFAULT_LISTENER_TIMEOUT_SECS),
        }
    }
}

/// `StorageBuilder` is the durable key-value collaborator
///
/// `get` returns `None` when the key is absent. `iterate` returns every live
/// `(key, value)` pair whose key starts with `<prefix>:`
#[async_trait]
pub trait StorageBuilder: Send + Sync {
    async fn put(&self, key: String, value: Vec<u8>) -> Result<(), ProtocolError>;
    async fn get(&self, key: String) -> Result<Option<Vec<u8>>, ProtocolError>;
    async fn remove(&self, key: String) -> Result<(), ProtocolError>;
    async fn iterate(&self, prefix: String) -> Result<Vec<(String, Vec<u8>)>, ProtocolError>;
}

/// `TransportBuilder` delivers outbound messages
///
/// Retries belong to the implementer. A failure must be reported as
/// [`ProtocolError::DeliveryError`]
#[async_trait]
pub trait TransportBuilder: Send + Sync {
    async fn send(&self, outbound: OutboundMessage) -> Result<(), ProtocolError>;
}

/// `SignerBuilder` is the opaque signing capability used by protocol message construction
pub trait SignerBuilder: Send + Sync {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, ProtocolError>;
}

/// The single decision maker that resolves pending actions
#[async_trait]
pub trait ActionListener: Send + Sync {
    async fn on_action(&self, event: ActionEvent) -> Result<(), ProtocolError>;
}

/// Observer of committed transitions
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, event: MessageEvent) -> Result<(), ProtocolError>;
}

/// `EngineAPI` is main entrypoint to communicate with the protocol engine
#[async_trait]
pub trait EngineAPI: Clone + Send + Sync {
    /// register_action_event stores the single action listener
    ///
    /// A second registration without an unregister in between fails with [`ProtocolError::AlreadyRegistered`]
    async fn register_action_event(
        &self,
        listener: Arc<dyn ActionListener>,
    ) -> Result<(), ProtocolError>;

    async fn register_msg_event(
        &self,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), ProtocolError>;

    /// unregister_action_event fails with [`ProtocolError::NotRegistered`] when the given
    /// listener is not the registered one
    async fn unregister_action_event(
        &self,
        listener: &Arc<dyn ActionListener>,
    ) -> Result<(), ProtocolError>;

    /// unregister_msg_event is a no-op for unknown listeners
    async fn unregister_msg_event(
        &self,
        listener: &Arc<dyn MessageListener>,
    ) -> Result<(), ProtocolError>;

    /// actions lists every pending action ordered by the time it was persisted
    async fn actions(&self) -> Result<Vec<PendingAction>, ProtocolError>;

    /// action_continue resolves a pending action by re-invoking the transition with `options`
    /// merged into the paused message
    async fn action_continue(&self, piid: PIID, options: Value) -> Result<(), ProtocolError>;

    /// action_stop moves the paused instance into its abandoned terminal state
    async fn action_stop(&self, piid: PIID, reason: String) -> Result<(), ProtocolError>;

    /// handle_inbound is the transport callback feeding the dispatcher
    async fn handle_inbound(&self, message: Message) -> Result<PIID, ProtocolError>;

    /// handle_outbound starts or advances an instance from a local API call
    async fn handle_outbound(&self, message: Message) -> Result<PIID, ProtocolError>;

    /// accept_inbound processes an inbound message whose confirmation is given up-front
    async fn accept_inbound(&self, message: Message, options: Value)
        -> Result<PIID, ProtocolError>;

    async fn instance(&self, piid: PIID) -> Result<ProtocolInstance, ProtocolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rst_common::standard::serde_json::json;
    use table_test::table_test;

    #[test]
    fn test_protocol_type_from_message_type() {
        let table = vec![
            (
                "https://didcomm.org/out-of-band/1.0/request",
                Some(ProtocolType::OutOfBand),
            ),
            (
                "https://didcomm.org/out-of-band/1.0/invitation",
                Some(ProtocolType::OutOfBand),
            ),
            (
                "https://didcomm.org/introduce/1.0/proposal",
                Some(ProtocolType::Introduce),
            ),
            ("https://didcomm.org/didexchange/1.0/request", None),
            ("", None),
        ];

        for (validator, input, expected) in table_test!(table) {
            let protocol = ProtocolType::from_message_type(input);

            validator
                .given(input)
                .when("resolve protocol type")
                .then("match the owner protocol")
                .assert_eq(expected, protocol);
        }
    }

    #[test]
    fn test_message_thread_id() {
        let msg = Message::new("typ".to_string(), Value::Null).with_id("msg-1".to_string());
        assert_eq!(msg.thread_id(), "msg-1");

        let msg = msg.with_thid("thread-1".to_string());
        assert_eq!(msg.thread_id(), "thread-1");
    }

    #[test]
    fn test_merge_options_override_body() {
        let msg = Message::new(
            "typ".to_string(),
            json!({"label": "original", "keep": true}),
        );

        let merged = msg.merge_options(&json!({"label": "label"}));
        assert_eq!(merged.get_body()["label"], json!("label"));
        assert_eq!(merged.get_body()["keep"], json!(true));
        assert_eq!(merged.get_id(), msg.get_id());
    }

    #[test]
    fn test_merge_options_null_body() {
        let msg = Message::new("typ".to_string(), Value::Null);
        let merged = msg.merge_options(&json!({"my_label": "label"}));
        assert_eq!(merged.get_body(), &json!({"my_label": "label"}));
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::new(
            "https://didcomm.org/introduce/1.0/ack".to_string(),
            json!({}),
        )
        .with_thid("thread".to_string());

        let json_str = serde_json::to_string(&msg).unwrap();
        assert!(json_str.contains("\"type\""));
        assert!(!json_str.contains("\"from\""));

        let back: Message = serde_json::from_str(&json_str).unwrap();
        assert_eq!(back, msg);
    }
}
