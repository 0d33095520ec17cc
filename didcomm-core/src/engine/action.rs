use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::{self, Value};

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use super::types::{Message, ProtocolError, ProtocolType, PIID};

/// PendingAction is a paused transition waiting for the host decision
///
/// It is persisted before the action listener hears about it and removed once
/// the piid is continued or stopped. `continuation_schema` describes the options
/// accepted by the continuation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct PendingAction {
    piid: PIID,
    protocol_type: ProtocolType,
    payload: Message,

    #[serde(default)]
    continuation_schema: Value,

    registered_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn new(
        piid: PIID,
        protocol_type: ProtocolType,
        payload: Message,
        continuation_schema: Value,
    ) -> Self {
        Self {
            piid,
            protocol_type,
            payload,
            continuation_schema,
            registered_at: Utc::now(),
        }
    }

    pub fn get_piid(&self) -> &PIID {
        &self.piid
    }

    pub fn get_protocol_type(&self) -> ProtocolType {
        self.protocol_type
    }

    pub fn get_payload(&self) -> &Message {
        &self.payload
    }

    pub fn get_continuation_schema(&self) -> &Value {
        &self.continuation_schema
    }

    pub fn get_registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}

impl ToJSON for PendingAction {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl TryInto<Vec<u8>> for PendingAction {
    type Error = ProtocolError;

    fn try_into(self) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(&self).map_err(|err| ProtocolError::SerializeError(err.to_string()))
    }
}

impl TryFrom<Vec<u8>> for PendingAction {
    type Error = ProtocolError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        serde_json::from_slice(&bytes)
            .map_err(|err| ProtocolError::UnserializeError(err.to_string()))
    }
}
