use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::Value;

use crate::engine::action::PendingAction;
use crate::engine::types::{ProtocolError, INTRODUCE_MESSAGE_PREFIX, PIID};

pub const OPTION_APPROVE: &str = "approve";
pub const OPTION_OOB_MESSAGE: &str = "oob_message";
pub const OPTION_RECIPIENT: &str = "recipient";

/// Introduce state machine
///
/// `Arranging` belongs to the introducer. `Requesting` and `Waiting` belong to an introducee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Start,
    Arranging,
    Waiting,
    Requesting,
    Done,
    Abandoned,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Start => "start",
            State::Arranging => "arranging",
            State::Waiting => "waiting",
            State::Requesting => "requesting",
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
    Proposal,
    Request,
    Response,
    Ack,
    ProblemReport,
}

impl MessageType {
    pub fn parse(typ: &str) -> Option<Self> {
        let name = typ.strip_prefix(INTRODUCE_MESSAGE_PREFIX)?;
        match name {
            "proposal" => Some(MessageType::Proposal),
            "request" => Some(MessageType::Request),
            "response" => Some(MessageType::Response),
            "ack" => Some(MessageType::Ack),
            "problem-report" => Some(MessageType::ProblemReport),
            _ => None,
        }
    }

    pub fn uri(&self) -> String {
        let name = match self {
            MessageType::Proposal => "proposal",
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Ack => "ack",
            MessageType::ProblemReport => "problem-report",
        };

        format!("{}{}", INTRODUCE_MESSAGE_PREFIX, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Introducer,
    Introducee,
}

/// Recipient is an introducee the introducer sends a proposal to
///
/// `to` describes the party this recipient is being introduced to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct Recipient {
    pub to: String,
    pub destination: String,
}

impl Recipient {
    pub fn new(to: String, destination: String) -> Self {
        Self { to, destination }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProposalBody {
    pub to: String,
}

/// Local command body used to start an introduction as the introducer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct SendProposalBody {
    pub recipients: Vec<Recipient>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub oob_message: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct RequestBody {
    pub please_introduce_to: String,

    /// Only present on the local command, the wire request omits it
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ResponseBody {
    pub approve: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub oob_message: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(crate = "self::serde")]
pub struct AckBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub oob_message: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProblemReportBody {
    pub reason: String,
}

/// Approval collected by the introducer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct Approval {
    pub from: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub oob_message: Option<Value>,
}

/// Properties stored on an introduce instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct Properties {
    pub role: Role,

    #[serde(default)]
    pub recipients: Vec<Recipient>,

    #[serde(default)]
    pub expected_responses: usize,

    #[serde(default)]
    pub approvals: Vec<Approval>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub oob_message: Option<Value>,

    /// Where the introducee answers, taken from the inbound proposal or the outbound request
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub introducer: Option<String>,
}

impl Properties {
    pub fn introducer() -> Self {
        Self {
            role: Role::Introducer,
            recipients: Vec::new(),
            expected_responses: 0,
            approvals: Vec::new(),
            oob_message: None,
            introducer: None,
        }
    }

    pub fn introducee(introducer: Option<String>) -> Self {
        Self {
            role: Role::Introducee,
            recipients: Vec::new(),
            expected_responses: 0,
            approvals: Vec::new(),
            oob_message: None,
            introducer,
        }
    }
}

/// `IntroduceAPI` is the client surface of the Introduce protocol
#[async_trait]
pub trait IntroduceAPI: Clone + Send + Sync {
    async fn actions(&self) -> Result<Vec<PendingAction>, ProtocolError>;

    /// send_proposal introduces two recipients to each other
    async fn send_proposal(
        &self,
        first: Recipient,
        second: Recipient,
    ) -> Result<PIID, ProtocolError>;

    /// send_proposal_with_oob_request introduces a recipient to a party known by its
    /// public out-of-band message
    async fn send_proposal_with_oob_request(
        &self,
        oob_message: Value,
        recipient: Recipient,
    ) -> Result<PIID, ProtocolError>;

    /// send_request asks the introducer at `to` for an introduction
    async fn send_request(
        &self,
        please_introduce_to: String,
        to: String,
    ) -> Result<PIID, ProtocolError>;

    async fn accept_proposal_with_oob_request(
        &self,
        piid: PIID,
        oob_message: Value,
    ) -> Result<(), ProtocolError>;

    async fn accept_proposal(&self, piid: PIID) -> Result<(), ProtocolError>;

    async fn accept_request_with_public_oob_request(
        &self,
        piid: PIID,
        oob_message: Value,
        recipient: Recipient,
    ) -> Result<(), ProtocolError>;

    async fn accept_request_with_recipients(
        &self,
        piid: PIID,
        recipient: Recipient,
    ) -> Result<(), ProtocolError>;

    async fn decline_proposal(&self, piid: PIID, reason: String) -> Result<(), ProtocolError>;
    async fn decline_request(&self, piid: PIID, reason: String) -> Result<(), ProtocolError>;
}
