use rst_common::with_logging::log::info;

use prople_didcomm_core::engine::types::TransportBuilder;
use prople_didcomm_core::engine::Engine;

use crate::common::helpers;
use crate::common::types::CommonError;
use crate::config::{Config, Parser as ConfigManager};
use crate::db::Builder as DbBuilder;
use crate::repository::Repository;

/// build_engine validates `config`, opens its protocol column family and wires an [`Engine`] on top of it
pub fn build_engine<TTransport>(
    config: Config,
    transport: TTransport,
) -> Result<Engine<Repository, TTransport>, CommonError>
where
    TTransport: TransportBuilder,
{
    helpers::validate(config.clone())?;

    let opts = config.engine().to_options();
    let executor = DbBuilder::new(config.db().protocol().to_owned()).build()?;

    info!(
        "[storage:builder] engine ready, listener timeout: {:?}",
        opts.get_listener_timeout()
    );

    Ok(Engine::new(Repository::new(executor), transport, opts))
}

pub fn build_engine_from_file<TTransport>(
    conf_file: String,
    transport: TTransport,
) -> Result<Engine<Repository, TTransport>, CommonError>
where
    TTransport: TransportBuilder,
{
    let config = ConfigManager::new(conf_file).parse()?;
    build_engine(config, transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use mockall::mock;
    use rst_common::standard::async_trait::async_trait;
    use rst_common::standard::serde_json::json;
    use rst_common::with_tokio::tokio;

    use prople_didcomm_core::engine::instance::ProtocolState;
    use prople_didcomm_core::engine::types::{
        EngineAPI, EngineOptions, Message, OutboundMessage, ProtocolError,
    };
    use prople_didcomm_core::protocol::outofband::types::{MessageType, State};

    use crate::common::helpers::testdb;

    mock!(
        FakeTransport{}

        #[async_trait]
        impl TransportBuilder for FakeTransport {
            async fn send(&self, outbound: OutboundMessage) -> Result<(), ProtocolError>;
        }
    );

    fn oob_request() -> Message {
        Message::new(
            MessageType::Request.uri(),
            json!({"label": "requester", "requests~attach": [{}], "service": ["did:example:requester"]}),
        )
    }

    fn generate_engine(transport: MockFakeTransport) -> Engine<Repository, MockFakeTransport> {
        let repo = Repository::new(testdb::global_db_builder().to_owned());
        Engine::new(repo, transport, EngineOptions::new(Duration::from_millis(200)))
    }

    #[test]
    fn test_build_engine_validation_failed() {
        let engine = build_engine(Config::new(), MockFakeTransport::new());
        assert!(matches!(engine, Err(CommonError::ValidationError(_))));
    }

    #[test]
    fn test_build_engine_missing_config_file() {
        let engine = build_engine_from_file(
            testdb::fixture_path("not-exists.toml"),
            MockFakeTransport::new(),
        );
        assert!(matches!(engine, Err(CommonError::ConfigError(_))));
    }

    #[test]
    fn test_build_engine_invalid_path() {
        let engine = build_engine_from_file(
            testdb::fixture_path("config_invalid.toml"),
            MockFakeTransport::new(),
        );
        assert!(matches!(engine, Err(CommonError::DbError(_))));
    }

    #[tokio::test]
    async fn test_build_engine_from_file() {
        let engine = build_engine_from_file(
            testdb::fixture_path("config_builder.toml"),
            MockFakeTransport::new(),
        );
        assert!(engine.is_ok());

        let engine = engine.unwrap();
        let piid = engine.handle_inbound(oob_request()).await.unwrap();

        let actions = engine.actions().await.unwrap();
        assert!(actions.iter().any(|action| action.get_piid() == &piid));

        let instance = engine.instance(piid).await.unwrap();
        assert_eq!(instance.get_state(), ProtocolState::OutOfBand(State::Initial));
    }

    #[tokio::test]
    async fn test_restart_resumes_pending_action() {
        let piid = {
            let engine = generate_engine(MockFakeTransport::new());
            engine.handle_inbound(oob_request()).await.unwrap()
        };

        let mut transport = MockFakeTransport::new();
        transport
            .expect_send()
            .times(1)
            .withf(|outbound: &OutboundMessage| {
                outbound.get_destination() == "did:example:requester"
            })
            .returning(|_| Ok(()));

        let restarted = generate_engine(transport);
        let actions = restarted.actions().await.unwrap();
        assert!(actions.iter().any(|action| action.get_piid() == &piid));

        let continued = restarted
            .action_continue(piid.clone(), json!({"my_label": "responder"}))
            .await;
        assert!(continued.is_ok());

        let actions = restarted.actions().await.unwrap();
        assert!(!actions.iter().any(|action| action.get_piid() == &piid));

        let instance = restarted.instance(piid).await.unwrap();
        assert_eq!(instance.get_state(), ProtocolState::OutOfBand(State::Done));
        assert!(instance.get_properties().get("connection_id").is_some());
    }

    #[tokio::test]
    async fn test_action_stop_abandons_instance() {
        let engine = generate_engine(MockFakeTransport::new());
        let piid = engine.handle_inbound(oob_request()).await.unwrap();

        let stopped = engine
            .action_stop(piid.clone(), "not interested".to_string())
            .await;
        assert!(stopped.is_ok());

        let instance = engine.instance(piid.clone()).await.unwrap();
        assert_eq!(instance.get_state(), ProtocolState::OutOfBand(State::Abandoned));

        let stopped_again = engine.action_stop(piid, "twice".to_string()).await;
        assert!(matches!(stopped_again, Err(ProtocolError::NotFound(_))));
    }
}
