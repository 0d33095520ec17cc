use std::sync::Arc;

use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde_json::{self, json, Value};
use rst_common::with_logging::log::{debug, info};

use crate::engine::action::PendingAction;
use crate::engine::types::{EngineAPI, Message, ProtocolError, ProtocolType, SignerBuilder, PIID};

use super::types::{
    Invitation, MessageType, OutOfBandAPI, Request, DIDEXCHANGE_PROTOCOL, OPTION_MY_LABEL,
    PROPERTY_CONNECTION_ID,
};

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

fn to_body<T>(value: &T) -> Result<Value, ProtocolError>
where
    T: rst_common::standard::serde::Serialize,
{
    serde_json::to_value(value).map_err(|err| ProtocolError::SerializeError(err.to_string()))
}

fn expect_type(message: &Message, expected: MessageType) -> Result<(), ProtocolError> {
    match MessageType::parse(message.get_type()) {
        Some(typ) if typ == expected => Ok(()),
        _ => Err(ProtocolError::ValidationError(format!(
            "expected {} message, got {}",
            expected.uri(),
            message.get_type()
        ))),
    }
}

/// `Usecase` is the base implementation of [`OutOfBandAPI`]
///
/// It depends on an [`EngineAPI`] implementation and on a [`SignerBuilder`]
/// used to sign the created requests
pub struct Usecase<TEngine, TSigner>
where
    TEngine: EngineAPI,
    TSigner: SignerBuilder,
{
    engine: TEngine,
    signer: Arc<TSigner>,
}

impl<TEngine, TSigner> Clone for Usecase<TEngine, TSigner>
where
    TEngine: EngineAPI,
    TSigner: SignerBuilder,
{
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            signer: self.signer.clone(),
        }
    }
}

impl<TEngine, TSigner> Usecase<TEngine, TSigner>
where
    TEngine: EngineAPI,
    TSigner: SignerBuilder,
{
    pub fn new(engine: TEngine, signer: TSigner) -> Self {
        Self {
            engine,
            signer: Arc::new(signer),
        }
    }

    async fn pending(&self, piid: &PIID) -> Result<PendingAction, ProtocolError> {
        self.actions()
            .await?
            .into_iter()
            .find(|action| action.get_piid() == piid)
            .ok_or_else(|| ProtocolError::NotFound(piid.as_str().to_string()))
    }

    async fn accept(&self, message: Message, my_label: String) -> Result<String, ProtocolError> {
        let piid = self
            .engine
            .accept_inbound(message, json!({ OPTION_MY_LABEL: my_label }))
            .await?;

        let instance = self.engine.instance(piid.clone()).await?;
        let connection_id = instance
            .get_properties()
            .get(PROPERTY_CONNECTION_ID)
            .and_then(|id| id.as_str())
            .map(|id| id.to_string())
            .ok_or_else(|| ProtocolError::NotFound(piid.as_str().to_string()))?;

        info!(
            "[engine:outofband] accepted: {} connection: {}",
            piid.as_str(),
            connection_id
        );
        Ok(connection_id)
    }
}

#[async_trait]
impl<TEngine, TSigner> OutOfBandAPI for Usecase<TEngine, TSigner>
where
    TEngine: EngineAPI,
    TSigner: SignerBuilder,
{
    async fn create_request(
        &self,
        label: String,
        goal: String,
        goal_code: String,
        attachments: Vec<Value>,
        services: Vec<Value>,
    ) -> Result<Message, ProtocolError> {
        if attachments.is_empty() {
            return Err(ProtocolError::ValidationError(
                "request attachments are required".to_string(),
            ));
        }

        if services.is_empty() {
            return Err(ProtocolError::ValidationError(
                "request services are required".to_string(),
            ));
        }

        let mut request = Request {
            label,
            goal,
            goal_code,
            attachments,
            services,
            signature: None,
        };

        let unsigned = serde_json::to_vec(&request)
            .map_err(|err| ProtocolError::SerializeError(err.to_string()))?;
        let signature = self.signer.sign(&unsigned)?;
        request.signature = Some(to_hex(&signature));

        debug!("[engine:outofband] request created: {}", request.label);
        Ok(Message::new(MessageType::Request.uri(), to_body(&request)?))
    }

    async fn create_invitation(
        &self,
        label: String,
        goal: String,
        goal_code: String,
        protocols: Vec<String>,
        services: Vec<Value>,
    ) -> Result<Message, ProtocolError> {
        if services.is_empty() {
            return Err(ProtocolError::ValidationError(
                "invitation services are required".to_string(),
            ));
        }

        let protocols = if protocols.is_empty() {
            vec![DIDEXCHANGE_PROTOCOL.to_string()]
        } else {
            protocols
        };

        let invitation = Invitation {
            label,
            goal,
            goal_code,
            protocols,
            services,
        };

        Ok(Message::new(MessageType::Invitation.uri(), to_body(&invitation)?))
    }

    async fn accept_request(
        &self,
        request: Message,
        my_label: String,
    ) -> Result<String, ProtocolError> {
        expect_type(&request, MessageType::Request)?;
        self.accept(request, my_label).await
    }

    async fn accept_invitation(
        &self,
        invitation: Message,
        my_label: String,
    ) -> Result<String, ProtocolError> {
        expect_type(&invitation, MessageType::Invitation)?;
        self.accept(invitation, my_label).await
    }

    async fn save_request(&self, request: Message) -> Result<PIID, ProtocolError> {
        expect_type(&request, MessageType::Request)?;
        self.engine.handle_outbound(request).await
    }

    async fn save_invitation(&self, invitation: Message) -> Result<PIID, ProtocolError> {
        expect_type(&invitation, MessageType::Invitation)?;
        self.engine.handle_outbound(invitation).await
    }

    async fn actions(&self) -> Result<Vec<PendingAction>, ProtocolError> {
        let actions = self.engine.actions().await?;
        Ok(actions
            .into_iter()
            .filter(|action| action.get_protocol_type() == ProtocolType::OutOfBand)
            .collect())
    }

    async fn action_continue(&self, piid: PIID, my_label: String) -> Result<(), ProtocolError> {
        let _ = self.pending(&piid).await?;
        self.engine
            .action_continue(piid, json!({ OPTION_MY_LABEL: my_label }))
            .await
    }

    async fn action_stop(&self, piid: PIID, reason: String) -> Result<(), ProtocolError> {
        let _ = self.pending(&piid).await?;
        self.engine.action_stop(piid, reason).await
    }
}
