use rst_common::standard::serde_json::Value;

use crate::protocol::introduce::transition as introduce;
use crate::protocol::outofband::transition as outofband;

use super::instance::{ProtocolInstance, ProtocolState};
use super::types::{Message, OutboundMessage, ProtocolError, ProtocolType};

/// Trigger tells the transition table why it is invoked
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// a message received from the transport
    Inbound,

    /// a message produced by a local API call
    Outbound,

    /// a paused message resumed with the host options merged into it
    Continue,

    /// a paused message the host refused, carrying the reason
    Stop(String),
}

/// Transition is the result of one step of a transition table
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    next_state: ProtocolState,
    outbound: Vec<OutboundMessage>,
    requires_action: bool,
    continuation_schema: Value,
    properties: Option<Value>,
    label: Option<String>,
}

impl Transition {
    pub fn to(next_state: ProtocolState) -> Self {
        Self {
            next_state,
            outbound: Vec::new(),
            requires_action: false,
            continuation_schema: Value::Null,
            properties: None,
            label: None,
        }
    }

    /// pause keeps the committed state and asks the host for a decision
    pub fn pause(current: ProtocolState, continuation_schema: Value) -> Self {
        Self {
            next_state: current,
            outbound: Vec::new(),
            requires_action: true,
            continuation_schema,
            properties: None,
            label: None,
        }
    }

    pub fn with_outbound(mut self, outbound: OutboundMessage) -> Self {
        self.outbound.push(outbound);
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_label(mut self, label: String) -> Self {
        self.label = Some(label);
        self
    }

    pub fn get_next_state(&self) -> ProtocolState {
        self.next_state
    }

    pub fn get_outbound(&self) -> &[OutboundMessage] {
        &self.outbound
    }

    pub fn take_outbound(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.outbound)
    }

    pub fn requires_action(&self) -> bool {
        self.requires_action
    }

    pub fn get_continuation_schema(&self) -> &Value {
        &self.continuation_schema
    }

    pub fn get_properties(&self) -> Option<&Value> {
        self.properties.as_ref()
    }

    pub fn get_label(&self) -> Option<&String> {
        self.label.as_ref()
    }
}

/// step runs the transition table owning the instance's protocol
pub fn step(
    instance: &ProtocolInstance,
    trigger: &Trigger,
    message: &Message,
) -> Result<Transition, ProtocolError> {
    match instance.get_state() {
        ProtocolState::OutOfBand(state) => outofband::step(state, instance, trigger, message),
        ProtocolState::Introduce(state) => introduce::step(state, instance, trigger, message),
    }
}

/// is_initiating tells whether a message may start a new instance
pub fn is_initiating(protocol_type: ProtocolType, message_type: &str) -> bool {
    match protocol_type {
        ProtocolType::OutOfBand => outofband::is_initiating(message_type),
        ProtocolType::Introduce => introduce::is_initiating(message_type),
    }
}

/// unsupported builds the explicit refusal of a transition table
pub fn unsupported(
    instance: &ProtocolInstance,
    trigger: &Trigger,
    message: &Message,
) -> ProtocolError {
    ProtocolError::UnsupportedTransition(format!(
        "{}: {} cannot handle {:?} {}",
        instance.get_piid().as_str(),
        instance.get_state().name(),
        trigger,
        message.get_type()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rst_common::standard::serde_json::json;

    use crate::engine::types::PIID;
    use crate::protocol::introduce::types::State as IntroduceState;
    use crate::protocol::outofband::types::State as OutOfBandState;

    #[test]
    fn test_step_routes_by_protocol() {
        let instance = ProtocolInstance::new(
            PIID::generate(),
            ProtocolType::Introduce,
            "thread".to_string(),
        );

        let message = Message::new(
            "https://didcomm.org/introduce/1.0/proposal".to_string(),
            json!({"to": "bob"}),
        )
        .with_from("did:example:introducer".to_string());

        let transition = step(&instance, &Trigger::Inbound, &message);
        assert!(transition.is_ok());

        let transition = transition.unwrap();
        assert!(transition.requires_action());
        assert_eq!(
            transition.get_next_state(),
            ProtocolState::Introduce(IntroduceState::Start)
        );
    }

    #[test]
    fn test_step_rejects_foreign_message() {
        let instance = ProtocolInstance::new(
            PIID::generate(),
            ProtocolType::OutOfBand,
            "thread".to_string(),
        );

        let message = Message::new(
            "https://didcomm.org/introduce/1.0/proposal".to_string(),
            json!({}),
        );

        let transition = step(&instance, &Trigger::Inbound, &message);
        assert!(matches!(
            transition,
            Err(ProtocolError::UnsupportedTransition(_))
        ));
        assert_eq!(
            instance.get_state(),
            ProtocolState::OutOfBand(OutOfBandState::Initial)
        );
    }

    #[test]
    fn test_is_initiating() {
        assert!(is_initiating(
            ProtocolType::OutOfBand,
            "https://didcomm.org/out-of-band/1.0/invitation"
        ));
        assert!(!is_initiating(
            ProtocolType::OutOfBand,
            "https://didcomm.org/out-of-band/1.0/handshake-reuse"
        ));
        assert!(is_initiating(
            ProtocolType::Introduce,
            "https://didcomm.org/introduce/1.0/request"
        ));
        assert!(!is_initiating(
            ProtocolType::Introduce,
            "https://didcomm.org/introduce/1.0/ack"
        ));
    }
}
