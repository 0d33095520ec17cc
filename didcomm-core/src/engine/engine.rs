use std::sync::Arc;

use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde_json::Value;
use rst_common::with_logging::log::error;

use super::action::PendingAction;
use super::dispatcher::Dispatcher;
use super::event::EventBus;
use super::instance::ProtocolInstance;
use super::transition::Trigger;
use super::types::{
    ActionListener, EngineAPI, EngineOptions, Message, MessageListener, ProtocolError,
    StorageBuilder, TransportBuilder, PIID,
};

/// `Engine` is the base implementation of [`EngineAPI`]
///
/// One engine owns one event bus and one dispatcher. Clones share both, so an
/// action listener may keep a clone to resolve the actions it receives
pub struct Engine<TStorage, TTransport>
where
    TStorage: StorageBuilder,
    TTransport: TransportBuilder,
{
    dispatcher: Dispatcher<TStorage, TTransport>,
    bus: EventBus,
}

impl<TStorage, TTransport> Clone for Engine<TStorage, TTransport>
where
    TStorage: StorageBuilder,
    TTransport: TransportBuilder,
{
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<TStorage, TTransport> Engine<TStorage, TTransport>
where
    TStorage: StorageBuilder,
    TTransport: TransportBuilder,
{
    pub fn new(storage: TStorage, transport: TTransport, opts: EngineOptions) -> Self {
        let bus = EventBus::new(opts.get_listener_timeout());
        let dispatcher = Dispatcher::new(Arc::new(storage), Arc::new(transport), bus.clone());

        Self { dispatcher, bus }
    }
}

#[async_trait]
impl<TStorage, TTransport> EngineAPI for Engine<TStorage, TTransport>
where
    TStorage: StorageBuilder,
    TTransport: TransportBuilder,
{
    async fn register_action_event(
        &self,
        listener: Arc<dyn ActionListener>,
    ) -> Result<(), ProtocolError> {
        self.bus.register_action(listener).await
    }

    async fn register_msg_event(
        &self,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), ProtocolError> {
        self.bus.register_message(listener).await
    }

    async fn unregister_action_event(
        &self,
        listener: &Arc<dyn ActionListener>,
    ) -> Result<(), ProtocolError> {
        self.bus.unregister_action(listener).await
    }

    async fn unregister_msg_event(
        &self,
        listener: &Arc<dyn MessageListener>,
    ) -> Result<(), ProtocolError> {
        self.bus.unregister_message(listener).await
    }

    async fn actions(&self) -> Result<Vec<PendingAction>, ProtocolError> {
        self.dispatcher.actions().await
    }

    async fn action_continue(&self, piid: PIID, options: Value) -> Result<(), ProtocolError> {
        self.dispatcher
            .resolve(&piid, Trigger::Continue, options)
            .await
    }

    async fn action_stop(&self, piid: PIID, reason: String) -> Result<(), ProtocolError> {
        self.dispatcher
            .resolve(&piid, Trigger::Stop(reason), Value::Null)
            .await
    }

    async fn handle_inbound(&self, message: Message) -> Result<PIID, ProtocolError> {
        let message_id = message.get_id().to_string();

        self.dispatcher
            .dispatch(message, Trigger::Inbound)
            .await
            .inspect_err(|err| {
                error!("[engine:inbound] message rejected: {}: {}", message_id, err)
            })
    }

    async fn handle_outbound(&self, message: Message) -> Result<PIID, ProtocolError> {
        self.dispatcher.dispatch(message, Trigger::Outbound).await
    }

    async fn accept_inbound(
        &self,
        message: Message,
        options: Value,
    ) -> Result<PIID, ProtocolError> {
        let merged = message.merge_options(&options);
        self.dispatcher.dispatch(merged, Trigger::Continue).await
    }

    async fn instance(&self, piid: PIID) -> Result<ProtocolInstance, ProtocolError> {
        self.dispatcher.instance(&piid).await
    }
}
