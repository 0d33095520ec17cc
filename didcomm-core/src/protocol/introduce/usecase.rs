use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde_json::{self, json, Value};
use rst_common::with_logging::log::debug;

use crate::engine::action::PendingAction;
use crate::engine::types::{EngineAPI, Message, ProtocolError, ProtocolType, PIID};

use super::types::{
    IntroduceAPI, MessageType, Recipient, RequestBody, SendProposalBody, OPTION_APPROVE,
    OPTION_OOB_MESSAGE, OPTION_RECIPIENT,
};

/// `Usecase` is the base implementation of [`IntroduceAPI`]
///
/// Introducer and introducee operations share the same engine. Every
/// continuation checks that the pending action holds the expected message
#[derive(Clone)]
pub struct Usecase<TEngine>
where
    TEngine: EngineAPI,
{
    engine: TEngine,
}

impl<TEngine> Usecase<TEngine>
where
    TEngine: EngineAPI,
{
    pub fn new(engine: TEngine) -> Self {
        Self { engine }
    }

    async fn pending(&self, piid: &PIID, expected: MessageType) -> Result<PendingAction, ProtocolError> {
        let action = self
            .actions()
            .await?
            .into_iter()
            .find(|action| action.get_piid() == piid)
            .ok_or_else(|| ProtocolError::NotFound(piid.as_str().to_string()))?;

        match MessageType::parse(action.get_payload().get_type()) {
            Some(typ) if typ == expected => Ok(action),
            _ => Err(ProtocolError::UnsupportedTransition(format!(
                "{}: pending action is not a {}",
                piid.as_str(),
                expected.uri()
            ))),
        }
    }

    async fn start(&self, typ: MessageType, body: Value) -> Result<PIID, ProtocolError> {
        let piid = self.engine.handle_outbound(Message::new(typ.uri(), body)).await?;
        debug!("[engine:introduce] started: {} {:?}", piid.as_str(), typ);
        Ok(piid)
    }
}

fn to_body<T>(value: &T) -> Result<Value, ProtocolError>
where
    T: rst_common::standard::serde::Serialize,
{
    serde_json::to_value(value).map_err(|err| ProtocolError::SerializeError(err.to_string()))
}

#[async_trait]
impl<TEngine> IntroduceAPI for Usecase<TEngine>
where
    TEngine: EngineAPI,
{
    async fn actions(&self) -> Result<Vec<PendingAction>, ProtocolError> {
        let actions = self.engine.actions().await?;
        Ok(actions
            .into_iter()
            .filter(|action| action.get_protocol_type() == ProtocolType::Introduce)
            .collect())
    }

    async fn send_proposal(
        &self,
        first: Recipient,
        second: Recipient,
    ) -> Result<PIID, ProtocolError> {
        let body = SendProposalBody {
            recipients: vec![first, second],
            oob_message: None,
        };

        self.start(MessageType::Proposal, to_body(&body)?).await
    }

    async fn send_proposal_with_oob_request(
        &self,
        oob_message: Value,
        recipient: Recipient,
    ) -> Result<PIID, ProtocolError> {
        let body = SendProposalBody {
            recipients: vec![recipient],
            oob_message: Some(oob_message),
        };

        self.start(MessageType::Proposal, to_body(&body)?).await
    }

    async fn send_request(
        &self,
        please_introduce_to: String,
        to: String,
    ) -> Result<PIID, ProtocolError> {
        let body = RequestBody {
            please_introduce_to,
            destination: Some(to),
        };

        self.start(MessageType::Request, to_body(&body)?).await
    }

    async fn accept_proposal_with_oob_request(
        &self,
        piid: PIID,
        oob_message: Value,
    ) -> Result<(), ProtocolError> {
        self.pending(&piid, MessageType::Proposal).await?;
        self.engine
            .action_continue(
                piid,
                json!({ OPTION_APPROVE: true, OPTION_OOB_MESSAGE: oob_message }),
            )
            .await
    }

    async fn accept_proposal(&self, piid: PIID) -> Result<(), ProtocolError> {
        self.pending(&piid, MessageType::Proposal).await?;
        self.engine
            .action_continue(piid, json!({ OPTION_APPROVE: true }))
            .await
    }

    async fn accept_request_with_public_oob_request(
        &self,
        piid: PIID,
        oob_message: Value,
        recipient: Recipient,
    ) -> Result<(), ProtocolError> {
        self.pending(&piid, MessageType::Request).await?;
        self.engine
            .action_continue(
                piid,
                json!({ OPTION_OOB_MESSAGE: oob_message, OPTION_RECIPIENT: to_body(&recipient)? }),
            )
            .await
    }

    async fn accept_request_with_recipients(
        &self,
        piid: PIID,
        recipient: Recipient,
    ) -> Result<(), ProtocolError> {
        self.pending(&piid, MessageType::Request).await?;
        self.engine
            .action_continue(piid, json!({ OPTION_RECIPIENT: to_body(&recipient)? }))
            .await
    }

    async fn decline_proposal(&self, piid: PIID, reason: String) -> Result<(), ProtocolError> {
        self.pending(&piid, MessageType::Proposal).await?;
        self.engine.action_stop(piid, reason).await
    }

    async fn decline_request(&self, piid: PIID, reason: String) -> Result<(), ProtocolError> {
        self.pending(&piid, MessageType::Request).await?;
        self.engine.action_stop(piid, reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use rst_common::with_tokio::tokio;
    use rst_common::with_tokio::tokio::sync::Mutex;

    use crate::engine::instance::ProtocolState;
    use crate::engine::memory::MemoryStorage;
    use crate::engine::types::{EngineOptions, OutboundMessage, TransportBuilder};
    use crate::engine::Engine;
    use crate::protocol::introduce::types::State;

    const INTRODUCER: &str = "did:example:introducer";
    const ALICE: &str = "did:example:alice";
    const BOB: &str = "did:example:bob";

    /// Outbox keeps the messages an agent sent so the test can route them
    #[derive(Clone, Default)]
    struct Outbox {
        messages: Arc<Mutex<Vec<OutboundMessage>>>,
    }

    impl Outbox {
        async fn drain(&self) -> Vec<OutboundMessage> {
            std::mem::take(&mut *self.messages.lock().await)
        }
    }

    #[async_trait]
    impl TransportBuilder for Outbox {
        async fn send(&self, outbound: OutboundMessage) -> Result<(), ProtocolError> {
            self.messages.lock().await.push(outbound);
            Ok(())
        }
    }

    type TestEngine = Engine<MemoryStorage, Outbox>;

    struct Agent {
        did: &'static str,
        engine: TestEngine,
        outbox: Outbox,
        uc: Usecase<TestEngine>,
    }

    impl Agent {
        fn new(did: &'static str) -> Self {
            let outbox = Outbox::default();
            let engine = Engine::new(
                MemoryStorage::default(),
                outbox.clone(),
                EngineOptions::new(Duration::from_millis(200)),
            );

            Self {
                did,
                uc: Usecase::new(engine.clone()),
                engine,
                outbox,
            }
        }

        async fn state(&self, piid: &PIID) -> ProtocolState {
            self.engine.instance(piid.clone()).await.unwrap().get_state()
        }
    }

    /// deliver routes every queued message of `sender` to the agents, stamping the sender
    async fn deliver(sender: &Agent, agents: &[&Agent]) -> Vec<(String, PIID)> {
        let mut delivered = Vec::new();
        for outbound in sender.outbox.drain().await {
            let target = agents
                .iter()
                .find(|agent| agent.did == outbound.get_destination())
                .unwrap();

            let message = outbound.get_message().clone().with_from(sender.did.to_string());
            let piid = target.engine.handle_inbound(message).await.unwrap();
            delivered.push((target.did.to_string(), piid));
        }

        delivered
    }

    fn piid_of(delivered: &[(String, PIID)], did: &str) -> PIID {
        delivered
            .iter()
            .find(|(target, _)| target == did)
            .map(|(_, piid)| piid.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn test_introduce_two_recipients() {
        let introducer = Agent::new(INTRODUCER);
        let alice = Agent::new(ALICE);
        let bob = Agent::new(BOB);

        let piid = introducer
            .uc
            .send_proposal(
                Recipient::new("bob".to_string(), ALICE.to_string()),
                Recipient::new("alice".to_string(), BOB.to_string()),
            )
            .await
            .unwrap();
        assert_eq!(
            introducer.state(&piid).await,
            ProtocolState::Introduce(State::Arranging)
        );

        let proposals = deliver(&introducer, &[&alice, &bob]).await;
        let alice_piid = piid_of(&proposals, ALICE);
        let bob_piid = piid_of(&proposals, BOB);

        assert_eq!(alice.uc.actions().await.unwrap().len(), 1);
        assert_eq!(bob.uc.actions().await.unwrap().len(), 1);

        assert!(alice
            .uc
            .accept_proposal_with_oob_request(alice_piid.clone(), json!({"type": "oob"}))
            .await
            .is_ok());
        assert!(bob.uc.accept_proposal(bob_piid.clone()).await.is_ok());
        assert!(alice.uc.actions().await.unwrap().is_empty());

        deliver(&alice, &[&introducer]).await;
        assert_eq!(
            introducer.state(&piid).await,
            ProtocolState::Introduce(State::Arranging)
        );

        deliver(&bob, &[&introducer]).await;
        assert_eq!(
            introducer.state(&piid).await,
            ProtocolState::Introduce(State::Done)
        );

        deliver(&introducer, &[&alice, &bob]).await;
        assert_eq!(
            alice.state(&alice_piid).await,
            ProtocolState::Introduce(State::Done)
        );
        assert_eq!(
            bob.state(&bob_piid).await,
            ProtocolState::Introduce(State::Done)
        );

        let bob_instance = bob.engine.instance(bob_piid).await.unwrap();
        assert_eq!(
            bob_instance.get_properties()[OPTION_OOB_MESSAGE],
            json!({"type": "oob"})
        );
    }

    #[tokio::test]
    async fn test_decline_proposal() {
        let introducer = Agent::new(INTRODUCER);
        let alice = Agent::new(ALICE);
        let bob = Agent::new(BOB);

        let piid = introducer
            .uc
            .send_proposal(
                Recipient::new("bob".to_string(), ALICE.to_string()),
                Recipient::new("alice".to_string(), BOB.to_string()),
            )
            .await
            .unwrap();

        let proposals = deliver(&introducer, &[&alice, &bob]).await;
        let bob_piid = piid_of(&proposals, BOB);

        assert!(bob
            .uc
            .decline_proposal(bob_piid.clone(), "reason".to_string())
            .await
            .is_ok());
        assert!(bob.uc.actions().await.unwrap().is_empty());
        assert_eq!(
            bob.state(&bob_piid).await,
            ProtocolState::Introduce(State::Abandoned)
        );

        deliver(&bob, &[&introducer]).await;
        assert_eq!(
            introducer.state(&piid).await,
            ProtocolState::Introduce(State::Abandoned)
        );

        let reports = introducer.outbox.drain().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].get_destination(), ALICE);
        assert_eq!(
            reports[0].get_message().get_type(),
            MessageType::ProblemReport.uri()
        );
    }

    #[tokio::test]
    async fn test_request_with_public_oob_request() {
        let introducer = Agent::new(INTRODUCER);
        let alice = Agent::new(ALICE);

        let alice_piid = alice
            .uc
            .send_request("carol".to_string(), INTRODUCER.to_string())
            .await
            .unwrap();
        assert_eq!(
            alice.state(&alice_piid).await,
            ProtocolState::Introduce(State::Requesting)
        );

        let requests = deliver(&alice, &[&introducer]).await;
        let request_piid = piid_of(&requests, INTRODUCER);
        assert_eq!(introducer.uc.actions().await.unwrap().len(), 1);

        assert!(introducer
            .uc
            .accept_request_with_public_oob_request(
                request_piid.clone(),
                json!({"type": "carol-oob"}),
                Recipient::new("carol".to_string(), ALICE.to_string()),
            )
            .await
            .is_ok());

        let proposals = deliver(&introducer, &[&alice]).await;
        assert_eq!(piid_of(&proposals, ALICE), alice_piid);
        assert_eq!(alice.uc.actions().await.unwrap().len(), 1);

        assert!(alice.uc.accept_proposal(alice_piid.clone()).await.is_ok());
        deliver(&alice, &[&introducer]).await;
        assert_eq!(
            introducer.state(&request_piid).await,
            ProtocolState::Introduce(State::Done)
        );

        deliver(&introducer, &[&alice]).await;
        let instance = alice.engine.instance(alice_piid).await.unwrap();
        assert_eq!(instance.get_state(), ProtocolState::Introduce(State::Done));
        assert_eq!(
            instance.get_properties()[OPTION_OOB_MESSAGE],
            json!({"type": "carol-oob"})
        );
    }

    #[tokio::test]
    async fn test_request_with_recipients() {
        let introducer = Agent::new(INTRODUCER);
        let alice = Agent::new(ALICE);
        let bob = Agent::new(BOB);

        alice
            .uc
            .send_request("bob".to_string(), INTRODUCER.to_string())
            .await
            .unwrap();

        let requests = deliver(&alice, &[&introducer]).await;
        let request_piid = piid_of(&requests, INTRODUCER);

        assert!(introducer
            .uc
            .accept_request_with_recipients(
                request_piid.clone(),
                Recipient::new("alice".to_string(), BOB.to_string()),
            )
            .await
            .is_ok());

        let proposals = deliver(&introducer, &[&alice, &bob]).await;
        assert_eq!(proposals.len(), 2);
        assert_eq!(alice.uc.actions().await.unwrap().len(), 1);
        assert_eq!(bob.uc.actions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_decline_request() {
        let introducer = Agent::new(INTRODUCER);
        let alice = Agent::new(ALICE);

        let alice_piid = alice
            .uc
            .send_request("bob".to_string(), INTRODUCER.to_string())
            .await
            .unwrap();

        let requests = deliver(&alice, &[&introducer]).await;
        let request_piid = piid_of(&requests, INTRODUCER);

        let wrong = introducer.uc.decline_proposal(request_piid.clone(), "reason".to_string()).await;
        assert!(matches!(
            wrong,
            Err(ProtocolError::UnsupportedTransition(_))
        ));

        assert!(introducer
            .uc
            .decline_request(request_piid.clone(), "reason".to_string())
            .await
            .is_ok());
        assert_eq!(
            introducer.state(&request_piid).await,
            ProtocolState::Introduce(State::Abandoned)
        );

        deliver(&introducer, &[&alice]).await;
        assert_eq!(
            alice.state(&alice_piid).await,
            ProtocolState::Introduce(State::Abandoned)
        );
    }

    #[tokio::test]
    async fn test_send_proposal_with_oob_request() {
        let introducer = Agent::new(INTRODUCER);

        let piid = introducer
            .uc
            .send_proposal_with_oob_request(
                json!({"type": "oob"}),
                Recipient::new("carol".to_string(), ALICE.to_string()),
            )
            .await
            .unwrap();

        let outbound = introducer.outbox.drain().await;
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].get_destination(), ALICE);
        assert_eq!(
            introducer.state(&piid).await,
            ProtocolState::Introduce(State::Arranging)
        );
    }

    #[tokio::test]
    async fn test_accept_unknown_piid() {
        let alice = Agent::new(ALICE);
        let piid = PIID::generate();

        assert_eq!(
            alice.uc.accept_proposal(piid.clone()).await.unwrap_err(),
            ProtocolError::NotFound(piid.as_str().to_string())
        );
    }
}
