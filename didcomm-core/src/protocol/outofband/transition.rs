use rst_common::standard::serde_json::{json, Map, Value};
use rst_common::standard::uuid::Uuid;
use rst_common::with_logging::log::debug;

use crate::engine::instance::{ProtocolInstance, ProtocolState};
use crate::engine::transition::{unsupported, Transition, Trigger};
use crate::engine::types::{Message, OutboundMessage, ProtocolError};

use super::types::{
    service_destination, Invitation, MessageType, Request, State, OPTION_MY_LABEL,
    PROPERTY_CONNECTION_ID,
};

pub fn is_initiating(message_type: &str) -> bool {
    matches!(
        MessageType::parse(message_type),
        Some(MessageType::Invitation | MessageType::Request)
    )
}

/// step is the Out-of-Band transition table
pub fn step(
    state: State,
    instance: &ProtocolInstance,
    trigger: &Trigger,
    message: &Message,
) -> Result<Transition, ProtocolError> {
    let message_type = MessageType::parse(message.get_type())
        .ok_or_else(|| unsupported(instance, trigger, message))?;

    debug!(
        "[engine:outofband] step: {} {} {:?}",
        instance.get_piid().as_str(),
        state.name(),
        message_type
    );

    match (state, trigger, message_type) {
        (state, Trigger::Stop(reason), _) if !state.is_terminal() => {
            let properties = merge_properties(instance.get_properties(), json!({"reason": reason}));
            Ok(Transition::to(ProtocolState::OutOfBand(State::Abandoned)).with_properties(properties))
        }
        (State::Initial, Trigger::Inbound, MessageType::Invitation | MessageType::Request) => {
            Ok(Transition::pause(
                ProtocolState::OutOfBand(State::Initial),
                json!({ OPTION_MY_LABEL: "string" }),
            ))
        }
        (State::Initial, Trigger::Continue, MessageType::Invitation | MessageType::Request) => {
            accept(instance, message, message_type)
        }
        (State::Initial, Trigger::Outbound, MessageType::Request) => {
            let request: Request = message.body_as()?;
            Ok(Transition::to(ProtocolState::OutOfBand(State::Requested)).with_label(request.label))
        }
        (State::Initial, Trigger::Outbound, MessageType::Invitation) => {
            let invitation: Invitation = message.body_as()?;
            Ok(Transition::to(ProtocolState::OutOfBand(State::AwaitingResponse))
                .with_label(invitation.label))
        }
        (
            State::Requested | State::AwaitingResponse,
            Trigger::Inbound,
            MessageType::HandshakeReuse,
        ) => reuse_accepted(instance, message),
        _ => Err(unsupported(instance, trigger, message)),
    }
}

fn accept(
    instance: &ProtocolInstance,
    message: &Message,
    message_type: MessageType,
) -> Result<Transition, ProtocolError> {
    let services = match message_type {
        MessageType::Request => message.body_as::<Request>()?.services,
        _ => message.body_as::<Invitation>()?.services,
    };

    let destination = services
        .first()
        .and_then(service_destination)
        .ok_or_else(|| ProtocolError::ValidationError("missing service destination".to_string()))?;

    let my_label = message
        .get_body()
        .get(OPTION_MY_LABEL)
        .and_then(|label| label.as_str())
        .unwrap_or_default()
        .to_string();

    let connection_id = Uuid::new_v4().to_string();
    let properties = merge_properties(
        instance.get_properties(),
        json!({ PROPERTY_CONNECTION_ID: connection_id, OPTION_MY_LABEL: my_label }),
    );

    let reuse = Message::new(
        MessageType::HandshakeReuse.uri(),
        json!({ "label": my_label.clone() }),
    )
    .with_thid(instance.get_thread_id().to_string());

    Ok(Transition::to(ProtocolState::OutOfBand(State::Done))
        .with_properties(properties)
        .with_label(my_label)
        .with_outbound(OutboundMessage::new(destination, reuse)))
}

fn reuse_accepted(
    instance: &ProtocolInstance,
    message: &Message,
) -> Result<Transition, ProtocolError> {
    let destination = message.get_from().cloned().ok_or_else(|| {
        ProtocolError::ValidationError("handshake-reuse without sender".to_string())
    })?;

    let properties = merge_properties(
        instance.get_properties(),
        json!({ PROPERTY_CONNECTION_ID: Uuid::new_v4().to_string() }),
    );

    let accepted = Message::new(MessageType::HandshakeReuseAccepted.uri(), json!({}))
        .with_thid(message.thread_id());

    Ok(Transition::to(ProtocolState::OutOfBand(State::Done))
        .with_properties(properties)
        .with_outbound(OutboundMessage::new(destination, accepted)))
}

fn merge_properties(current: &Value, extra: Value) -> Value {
    let mut merged = match current {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    if let Value::Object(map) = extra {
        merged.extend(map);
    }

    Value::Object(merged)
}
