use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::{self, Value};

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use crate::protocol::introduce::types::State as IntroduceState;
use crate::protocol::outofband::types::State as OutOfBandState;

use super::transition::Transition;
use super::types::{ProtocolError, ProtocolType, PIID};

/// ProtocolState is the committed state of an instance, tagged by its protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
#[serde(tag = "protocol", content = "state", rename_all = "kebab-case")]
pub enum ProtocolState {
    OutOfBand(OutOfBandState),
    Introduce(IntroduceState),
}

impl ProtocolState {
    pub fn initial(protocol_type: ProtocolType) -> Self {
        match protocol_type {
            ProtocolType::OutOfBand => ProtocolState::OutOfBand(OutOfBandState::Initial),
            ProtocolType::Introduce => ProtocolState::Introduce(IntroduceState::Start),
        }
    }

    pub fn abandoned(protocol_type: ProtocolType) -> Self {
        match protocol_type {
            ProtocolType::OutOfBand => ProtocolState::OutOfBand(OutOfBandState::Abandoned),
            ProtocolType::Introduce => ProtocolState::Introduce(IntroduceState::Abandoned),
        }
    }

    pub fn protocol_type(&self) -> ProtocolType {
        match self {
            ProtocolState::OutOfBand(_) => ProtocolType::OutOfBand,
            ProtocolState::Introduce(_) => ProtocolType::Introduce,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ProtocolState::OutOfBand(state) => state.is_terminal(),
            ProtocolState::Introduce(state) => state.is_terminal(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolState::OutOfBand(state) => state.name(),
            ProtocolState::Introduce(state) => state.name(),
        }
    }
}

/// ProtocolInstance is one execution of a protocol
///
/// Only the dispatcher mutates it, through [`ProtocolInstance::apply`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProtocolInstance {
    piid: PIID,
    protocol_type: ProtocolType,
    state: ProtocolState,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    label: Option<String>,

    thread_id: String,

    #[serde(default)]
    properties: Value,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProtocolInstance {
    pub fn new(piid: PIID, protocol_type: ProtocolType, thread_id: String) -> Self {
        let now = Utc::now();

        Self {
            piid,
            protocol_type,
            state: ProtocolState::initial(protocol_type),
            label: None,
            thread_id,
            properties: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn get_piid(&self) -> &PIID {
        &self.piid
    }

    pub fn get_protocol_type(&self) -> ProtocolType {
        self.protocol_type
    }

    pub fn get_state(&self) -> ProtocolState {
        self.state
    }

    pub fn get_label(&self) -> Option<&String> {
        self.label.as_ref()
    }

    pub fn get_thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn get_properties(&self) -> &Value {
        &self.properties
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// apply commits a transition computed by the transition table
    ///
    /// A terminal instance accepts nothing and a transition must stay inside the
    /// instance's own protocol
    pub fn apply(&mut self, transition: &Transition) -> Result<(), ProtocolError> {
        if self.state.is_terminal() {
            return Err(ProtocolError::UnsupportedTransition(format!(
                "{}: instance is in terminal state {}",
                self.piid.as_str(),
                self.state.name()
            )));
        }

        let next = transition.get_next_state();
        if next.protocol_type() != self.protocol_type {
            return Err(ProtocolError::UnsupportedTransition(format!(
                "{}: state {} belongs to another protocol",
                self.piid.as_str(),
                next.name()
            )));
        }

        self.state = next;

        if let Some(properties) = transition.get_properties() {
            self.properties = properties.to_owned();
        }

        if let Some(label) = transition.get_label() {
            self.label = Some(label.to_owned());
        }

        self.updated_at = Utc::now();
        Ok(())
    }
}

impl ToJSON for ProtocolInstance {
    fn to_json(&self) -> Result<String, BaseError> {
        serde_json::to_string(self).map_err(|err| BaseError::ToJSONError(err.to_string()))
    }
}

impl TryInto<Vec<u8>> for ProtocolInstance {
    type Error = ProtocolError;

    fn try_into(self) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(&self).map_err(|err| ProtocolError::SerializeError(err.to_string()))
    }
}

impl TryFrom<Vec<u8>> for ProtocolInstance {
    type Error = ProtocolError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        serde_json::from_slice(&bytes)
            .map_err(|err| ProtocolError::UnserializeError(err.to_string()))
    }
}
