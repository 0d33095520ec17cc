use rst_common::standard::serde_json::{self, json, Value};
use rst_common::with_logging::log::debug;

use crate::engine::instance::{ProtocolInstance, ProtocolState};
use crate::engine::transition::{unsupported, Transition, Trigger};
use crate::engine::types::{Message, OutboundMessage, ProtocolError};

use super::types::{
    AckBody, Approval, MessageType, ProblemReportBody, Properties, ProposalBody, Recipient,
    RequestBody, ResponseBody, Role, SendProposalBody, State, OPTION_APPROVE, OPTION_OOB_MESSAGE,
    OPTION_RECIPIENT,
};

const REASON_DECLINED: &str = "introduction declined";
const REASON_MISSING_OOB: &str = "missing out-of-band message";

pub fn is_initiating(message_type: &str) -> bool {
    matches!(
        MessageType::parse(message_type),
        Some(MessageType::Proposal | MessageType::Request)
    )
}

/// step is the Introduce transition table
///
/// Only a proposal received by an introducee and a request received by an
/// introducer wait for the host. Responses, acks and problem reports advance
/// the instance directly so that the introducer can collect every answer
pub fn step(
    state: State,
    instance: &ProtocolInstance,
    trigger: &Trigger,
    message: &Message,
) -> Result<Transition, ProtocolError> {
    let message_type = MessageType::parse(message.get_type())
        .ok_or_else(|| unsupported(instance, trigger, message))?;

    debug!(
        "[engine:introduce] step: {} {} {:?}",
        instance.get_piid().as_str(),
        state.name(),
        message_type
    );

    match (state, trigger, message_type) {
        (State::Start | State::Requesting, Trigger::Inbound, MessageType::Proposal) => {
            Ok(Transition::pause(
                ProtocolState::Introduce(state),
                json!({ OPTION_APPROVE: "bool", OPTION_OOB_MESSAGE: "object", "label": "string" }),
            ))
        }
        (State::Start | State::Requesting, Trigger::Continue, MessageType::Proposal) => {
            respond(instance, message)
        }
        (State::Start | State::Requesting, Trigger::Stop(reason), MessageType::Proposal) => {
            decline_proposal(instance, message, reason)
        }
        (State::Start, Trigger::Inbound, MessageType::Request) => Ok(Transition::pause(
            ProtocolState::Introduce(state),
            json!({ OPTION_RECIPIENT: "object", OPTION_OOB_MESSAGE: "object" }),
        )),
        (State::Start, Trigger::Continue, MessageType::Request) => {
            arrange_from_request(instance, message)
        }
        (State::Start, Trigger::Stop(reason), MessageType::Request) => {
            decline_request(instance, message, reason)
        }
        (State::Start, Trigger::Outbound, MessageType::Proposal) => arrange(instance, message),
        (State::Start, Trigger::Outbound, MessageType::Request) => request(instance, message),
        (State::Arranging, Trigger::Inbound, MessageType::Response) => collect(instance, message),
        (State::Waiting, Trigger::Inbound, MessageType::Ack) => acknowledged(instance, message),
        (
            State::Arranging | State::Waiting | State::Requesting,
            Trigger::Inbound,
            MessageType::ProblemReport,
        ) => {
            let report: ProblemReportBody = message.body_as()?;
            abandon(instance, report.reason)
        }
        (state, Trigger::Stop(reason), _) if !state.is_terminal() => {
            abandon(instance, reason.to_owned())
        }
        _ => Err(unsupported(instance, trigger, message)),
    }
}

fn load_properties(instance: &ProtocolInstance) -> Result<Option<Properties>, ProtocolError> {
    match instance.get_properties() {
        Value::Null => Ok(None),
        value => serde_json::from_value(value.to_owned())
            .map(Some)
            .map_err(|err| ProtocolError::UnserializeError(err.to_string())),
    }
}

fn to_value<T>(value: &T) -> Result<Value, ProtocolError>
where
    T: rst_common::standard::serde::Serialize,
{
    serde_json::to_value(value).map_err(|err| ProtocolError::SerializeError(err.to_string()))
}

fn optional_value(message: &Message, key: &str) -> Option<Value> {
    message
        .get_body()
        .get(key)
        .filter(|value| !value.is_null())
        .cloned()
}

fn reply(typ: MessageType, body: Value, thread_id: &str) -> Message {
    Message::new(typ.uri(), body).with_thid(thread_id.to_string())
}

fn abandon(instance: &ProtocolInstance, reason: String) -> Result<Transition, ProtocolError> {
    let mut properties = match instance.get_properties() {
        Value::Object(map) => map.clone(),
        _ => Default::default(),
    };
    properties.insert("reason".to_string(), Value::String(reason));

    Ok(Transition::to(ProtocolState::Introduce(State::Abandoned))
        .with_properties(Value::Object(properties)))
}

/// the introducer address of an introducee instance
fn introducer_of(instance: &ProtocolInstance, message: &Message) -> Result<Option<String>, ProtocolError> {
    let known = load_properties(instance)?.and_then(|properties| properties.introducer);
    Ok(message.get_from().cloned().or(known))
}

fn respond(instance: &ProtocolInstance, message: &Message) -> Result<Transition, ProtocolError> {
    let destination = introducer_of(instance, message)?.ok_or_else(|| {
        ProtocolError::ValidationError("proposal without introducer".to_string())
    })?;

    let approve = message
        .get_body()
        .get(OPTION_APPROVE)
        .and_then(|approve| approve.as_bool())
        .unwrap_or(true);

    if !approve {
        return decline_proposal(instance, message, REASON_DECLINED);
    }

    let body = ResponseBody {
        approve: true,
        oob_message: optional_value(message, OPTION_OOB_MESSAGE),
        reason: None,
    };

    let properties = Properties::introducee(Some(destination.clone()));
    let response = reply(MessageType::Response, to_value(&body)?, &message.thread_id());

    let mut transition = Transition::to(ProtocolState::Introduce(State::Waiting))
        .with_properties(to_value(&properties)?)
        .with_outbound(OutboundMessage::new(destination, response));

    if let Some(label) = message.get_body().get("label").and_then(|label| label.as_str()) {
        transition = transition.with_label(label.to_string());
    }

    Ok(transition)
}

fn decline_proposal(
    instance: &ProtocolInstance,
    message: &Message,
    reason: &str,
) -> Result<Transition, ProtocolError> {
    let transition = abandon(instance, reason.to_string())?;

    let Some(destination) = introducer_of(instance, message)? else {
        return Ok(transition);
    };

    let body = ResponseBody {
        approve: false,
        oob_message: None,
        reason: Some(reason.to_string()),
    };

    let response = reply(MessageType::Response, to_value(&body)?, &message.thread_id());
    Ok(transition.with_outbound(OutboundMessage::new(destination, response)))
}

fn decline_request(
    instance: &ProtocolInstance,
    message: &Message,
    reason: &str,
) -> Result<Transition, ProtocolError> {
    let transition = abandon(instance, reason.to_string())?;

    let Some(destination) = message.get_from().cloned() else {
        return Ok(transition);
    };

    let body = ProblemReportBody {
        reason: reason.to_string(),
    };

    let report = reply(MessageType::ProblemReport, to_value(&body)?, &message.thread_id());
    Ok(transition.with_outbound(OutboundMessage::new(destination, report)))
}

fn propose(
    instance: &ProtocolInstance,
    recipients: Vec<Recipient>,
    oob_message: Option<Value>,
) -> Result<Transition, ProtocolError> {
    let mut properties = Properties::introducer();
    properties.expected_responses = recipients.len();
    properties.oob_message = oob_message;

    let mut outbound = Vec::new();
    for recipient in recipients.iter() {
        let body = ProposalBody {
            to: recipient.to.to_owned(),
        };

        let proposal = reply(MessageType::Proposal, to_value(&body)?, instance.get_thread_id());
        outbound.push(OutboundMessage::new(recipient.destination.to_owned(), proposal));
    }

    properties.recipients = recipients;

    let transition = Transition::to(ProtocolState::Introduce(State::Arranging))
        .with_properties(to_value(&properties)?);

    Ok(outbound
        .into_iter()
        .fold(transition, |transition, proposal| transition.with_outbound(proposal)))
}

fn validate_recipients(
    recipients: &[Recipient],
    oob_message: &Option<Value>,
) -> Result<(), ProtocolError> {
    let expected = if oob_message.is_some() { 1 } else { 2 };
    if recipients.len() != expected {
        return Err(ProtocolError::ValidationError(format!(
            "introduction needs {} recipient(s), got {}",
            expected,
            recipients.len()
        )));
    }

    if recipients.iter().any(|recipient| recipient.destination.is_empty()) {
        return Err(ProtocolError::ValidationError(
            "recipient destination is missing".to_string(),
        ));
    }

    Ok(())
}

fn arrange(instance: &ProtocolInstance, message: &Message) -> Result<Transition, ProtocolError> {
    let body: SendProposalBody = message.body_as()?;
    validate_recipients(&body.recipients, &body.oob_message)?;
    propose(instance, body.recipients, body.oob_message)
}

fn arrange_from_request(
    instance: &ProtocolInstance,
    message: &Message,
) -> Result<Transition, ProtocolError> {
    let request: RequestBody = message.body_as()?;
    let requester = message.get_from().cloned().ok_or_else(|| {
        ProtocolError::ValidationError("request without sender".to_string())
    })?;

    let recipient = optional_value(message, OPTION_RECIPIENT)
        .map(serde_json::from_value::<Recipient>)
        .transpose()
        .map_err(|err| ProtocolError::UnserializeError(err.to_string()))?;

    let oob_message = optional_value(message, OPTION_OOB_MESSAGE);

    let recipients = match (&oob_message, recipient) {
        (Some(_), recipient) => {
            let to = recipient
                .map(|recipient| recipient.to)
                .unwrap_or(request.please_introduce_to);
            vec![Recipient::new(to, requester)]
        }
        (None, Some(recipient)) => vec![
            Recipient::new(request.please_introduce_to, requester),
            recipient,
        ],
        (None, None) => {
            return Err(ProtocolError::ValidationError(
                "recipient or out-of-band message is required".to_string(),
            ))
        }
    };

    validate_recipients(&recipients, &oob_message)?;
    propose(instance, recipients, oob_message)
}

fn request(instance: &ProtocolInstance, message: &Message) -> Result<Transition, ProtocolError> {
    let body: RequestBody = message.body_as()?;
    let destination = body
        .destination
        .clone()
        .filter(|destination| !destination.is_empty())
        .ok_or_else(|| ProtocolError::ValidationError("request destination is missing".to_string()))?;

    let wire = RequestBody {
        please_introduce_to: body.please_introduce_to,
        destination: None,
    };

    let request = reply(MessageType::Request, to_value(&wire)?, instance.get_thread_id());
    let properties = Properties::introducee(Some(destination.clone()));

    Ok(Transition::to(ProtocolState::Introduce(State::Requesting))
        .with_properties(to_value(&properties)?)
        .with_outbound(OutboundMessage::new(destination, request)))
}

fn collect(instance: &ProtocolInstance, message: &Message) -> Result<Transition, ProtocolError> {
    let mut properties = load_properties(instance)?
        .filter(|properties| properties.role == Role::Introducer)
        .ok_or_else(|| unsupported(instance, &Trigger::Inbound, message))?;

    let from = message
        .get_from()
        .cloned()
        .filter(|from| properties.recipients.iter().any(|r| &r.destination == from))
        .ok_or_else(|| ProtocolError::ValidationError("response from unknown recipient".to_string()))?;

    if properties.approvals.iter().any(|approval| approval.from == from) {
        return Err(unsupported(instance, &Trigger::Inbound, message));
    }

    let response: ResponseBody = message.body_as()?;
    let thread_id = instance.get_thread_id().to_string();

    if !response.approve {
        let reason = response.reason.unwrap_or_else(|| REASON_DECLINED.to_string());
        let transition = abandon(instance, reason.clone())?;

        let mut reports = Vec::new();
        for recipient in properties.recipients.iter().filter(|r| r.destination != from) {
            let body = to_value(&ProblemReportBody {
                reason: reason.clone(),
            })?;

            reports.push(OutboundMessage::new(
                recipient.destination.to_owned(),
                reply(MessageType::ProblemReport, body, &thread_id),
            ));
        }

        return Ok(reports
            .into_iter()
            .fold(transition, |transition, report| transition.with_outbound(report)));
    }

    properties.approvals.push(Approval {
        from,
        oob_message: response.oob_message,
    });

    if properties.approvals.len() < properties.expected_responses {
        return Ok(Transition::to(ProtocolState::Introduce(State::Arranging))
            .with_properties(to_value(&properties)?));
    }

    let oob_message = properties.oob_message.clone().or_else(|| {
        properties
            .approvals
            .iter()
            .find_map(|approval| approval.oob_message.clone())
    });

    let Some(oob_message) = oob_message else {
        let mut transition = abandon(instance, REASON_MISSING_OOB.to_string())?;
        for approval in properties.approvals.iter() {
            let body = to_value(&ProblemReportBody {
                reason: REASON_MISSING_OOB.to_string(),
            })?;

            transition = transition.with_outbound(OutboundMessage::new(
                approval.from.to_owned(),
                reply(MessageType::ProblemReport, body, &thread_id),
            ));
        }

        return Ok(transition);
    };

    let mut acks = Vec::new();
    for approval in properties.approvals.iter() {
        let body = AckBody {
            oob_message: match approval.oob_message {
                Some(_) => None,
                None => Some(oob_message.clone()),
            },
        };

        acks.push(OutboundMessage::new(
            approval.from.to_owned(),
            reply(MessageType::Ack, to_value(&body)?, &thread_id),
        ));
    }

    let transition = Transition::to(ProtocolState::Introduce(State::Done))
        .with_properties(to_value(&properties)?);

    Ok(acks
        .into_iter()
        .fold(transition, |transition, ack| transition.with_outbound(ack)))
}

fn acknowledged(instance: &ProtocolInstance, message: &Message) -> Result<Transition, ProtocolError> {
    let ack: AckBody = message.body_as()?;
    let mut properties =
        load_properties(instance)?.unwrap_or_else(|| Properties::introducee(None));

    if ack.oob_message.is_some() {
        properties.oob_message = ack.oob_message;
    }

    Ok(Transition::to(ProtocolState::Introduce(State::Done))
        .with_properties(to_value(&properties)?))
}
