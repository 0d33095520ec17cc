use std::sync::Arc;

use rst_common::standard::serde_json::Value;
use rst_common::with_logging::log::{debug, error, info};

use super::action::PendingAction;
use super::event::{ActionEvent, EventBus, MessageEvent};
use super::instance::ProtocolInstance;
use super::lock::KeyedLock;
use super::store::{ActionStore, InstanceStore};
use super::transition::{self, Transition, Trigger};
use super::types::{
    Message, OutboundMessage, ProtocolError, ProtocolType, StorageBuilder, TransportBuilder, PIID,
};

/// Outcome of a processed transition, published once every lock is released
enum Outcome {
    Paused(ActionEvent),
    Committed(MessageEvent, Vec<OutboundMessage>),
}

fn instance_lock_key(piid: &PIID) -> String {
    format!("instance:{}", piid.as_str())
}

fn thread_lock_key(thread_id: &str) -> String {
    format!("thread:{}", thread_id)
}

/// Dispatcher routes messages and continuations to protocol instances
///
/// Work on one piid is serialized, different piids run in parallel. A paused
/// transition persists its [`PendingAction`] before the instance, a resolution
/// removes it before the instance moves on and restores it when that write
/// fails, so a failed write never leaves a half committed instance behind
pub struct Dispatcher<TStorage, TTransport>
where
    TStorage: StorageBuilder,
    TTransport: TransportBuilder,
{
    actions: ActionStore<TStorage>,
    instances: InstanceStore<TStorage>,
    transport: Arc<TTransport>,
    bus: EventBus,
    lock: KeyedLock,
}

impl<TStorage, TTransport> Clone for Dispatcher<TStorage, TTransport>
where
    TStorage: StorageBuilder,
    TTransport: TransportBuilder,
{
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
            instances: self.instances.clone(),
            transport: self.transport.clone(),
            bus: self.bus.clone(),
            lock: self.lock.clone(),
        }
    }
}

impl<TStorage, TTransport> Dispatcher<TStorage, TTransport>
where
    TStorage: StorageBuilder,
    TTransport: TransportBuilder,
{
    pub fn new(storage: Arc<TStorage>, transport: Arc<TTransport>, bus: EventBus) -> Self {
        Self {
            actions: ActionStore::new(storage.clone()),
            instances: InstanceStore::new(storage),
            transport,
            bus,
            lock: KeyedLock::new(),
        }
    }

    /// dispatch resolves or creates the instance owning `message` and runs one step
    pub async fn dispatch(&self, message: Message, trigger: Trigger) -> Result<PIID, ProtocolError> {
        let (piid, outcome) = self.process(message, trigger).await?;
        self.publish(outcome).await;
        Ok(piid)
    }

    /// resolve answers a pending action with a continue or a stop trigger
    pub async fn resolve(
        &self,
        piid: &PIID,
        trigger: Trigger,
        options: Value,
    ) -> Result<(), ProtocolError> {
        let outcome = {
            let _guard = self.lock.acquire(&instance_lock_key(piid)).await;

            let action = self.actions.get(piid).await?;
            let instance = self.instances.get(piid).await?;

            let message = match trigger {
                Trigger::Continue => action.get_payload().merge_options(&options),
                _ => action.get_payload().to_owned(),
            };

            let transition = transition::step(&instance, &trigger, &message)?;
            if transition.requires_action() {
                return Err(ProtocolError::UnsupportedTransition(format!(
                    "{}: continuation cannot pause again",
                    piid.as_str()
                )));
            }

            self.actions.delete(piid).await?;
            let outcome = match self.commit(instance, transition, message).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    if let Err(rollback) = self.actions.save(piid, action).await {
                        error!(
                            "[engine:dispatcher] restore pending action failed: {}: {}",
                            piid.as_str(),
                            rollback
                        );
                    }

                    return Err(err);
                }
            };

            info!("[engine:dispatcher] action resolved: {}", piid.as_str());
            outcome
        };

        self.publish(outcome).await;
        Ok(())
    }

    /// actions lists pending actions ordered by their persistence time
    pub async fn actions(&self) -> Result<Vec<PendingAction>, ProtocolError> {
        let mut actions: Vec<PendingAction> = self.actions.get_all().await?.collect();

        actions.sort_by(|left, right| {
            left.get_registered_at()
                .cmp(&right.get_registered_at())
                .then_with(|| left.get_piid().as_str().cmp(right.get_piid().as_str()))
        });

        Ok(actions)
    }

    pub async fn instance(&self, piid: &PIID) -> Result<ProtocolInstance, ProtocolError> {
        self.instances.get(piid).await
    }

    async fn process(
        &self,
        message: Message,
        trigger: Trigger,
    ) -> Result<(PIID, Outcome), ProtocolError> {
        let protocol_type = ProtocolType::from_message_type(message.get_type()).ok_or_else(|| {
            ProtocolError::UnsupportedTransition(format!(
                "unknown message type: {}",
                message.get_type()
            ))
        })?;

        let thread_id = message.thread_id();
        let _thread_guard = self.lock.acquire(&thread_lock_key(&thread_id)).await;

        let known = self.instances.find_by_thread(&thread_id).await?;
        let piid = match &known {
            Some(piid) => piid.to_owned(),
            None if transition::is_initiating(protocol_type, message.get_type()) => {
                PIID::generate()
            }
            None => {
                return Err(ProtocolError::UnsupportedTransition(format!(
                    "no instance for thread {} and {} cannot start one",
                    thread_id,
                    message.get_type()
                )))
            }
        };

        let _guard = self.lock.acquire(&instance_lock_key(&piid)).await;

        let instance = match known {
            Some(_) => self.instances.get(&piid).await?,
            None => ProtocolInstance::new(piid.clone(), protocol_type, thread_id.clone()),
        };

        if instance.get_protocol_type() != protocol_type {
            return Err(ProtocolError::UnsupportedTransition(format!(
                "{}: {} does not belong to {}",
                piid.as_str(),
                message.get_type(),
                instance.get_protocol_type().name()
            )));
        }

        if self.actions.find(&piid).await?.is_some() {
            return Err(ProtocolError::UnsupportedTransition(format!(
                "{}: instance is waiting for an action",
                piid.as_str()
            )));
        }

        debug!(
            "[engine:dispatcher] dispatch: {} {:?} {}",
            piid.as_str(),
            trigger,
            message.get_type()
        );

        let transition = transition::step(&instance, &trigger, &message)?;
        let outcome = self.commit(instance, transition, message).await?;
        Ok((piid, outcome))
    }

    async fn commit(
        &self,
        mut instance: ProtocolInstance,
        mut transition: Transition,
        message: Message,
    ) -> Result<Outcome, ProtocolError> {
        let piid = instance.get_piid().to_owned();

        if transition.requires_action() {
            let schema = transition.get_continuation_schema().to_owned();
            let action = PendingAction::new(
                piid.clone(),
                instance.get_protocol_type(),
                message.clone(),
                schema.clone(),
            );

            self.actions.save(&piid, action).await?;
            if let Err(err) = self.instances.save(&instance).await {
                if let Err(rollback) = self.actions.delete(&piid).await {
                    error!(
                        "[engine:dispatcher] rollback pending action failed: {}: {}",
                        piid.as_str(),
                        rollback
                    );
                }

                return Err(err);
            }

            info!("[engine:dispatcher] action pending: {}", piid.as_str());
            return Ok(Outcome::Paused(ActionEvent::new(
                piid,
                instance.get_protocol_type(),
                message,
                schema,
            )));
        }

        let state_from = instance.get_state();
        instance.apply(&transition)?;
        self.instances.save(&instance).await?;

        info!(
            "[engine:dispatcher] committed: {} {} -> {}",
            piid.as_str(),
            state_from.name(),
            instance.get_state().name()
        );

        let event = MessageEvent::new(piid, state_from, instance.get_state(), message);
        Ok(Outcome::Committed(event, transition.take_outbound()))
    }

    async fn publish(&self, outcome: Outcome) {
        match outcome {
            Outcome::Paused(event) => {
                self.bus.emit_action(event).await;
            }
            Outcome::Committed(event, outbound) => {
                let piid = event.get_piid().as_str().to_string();
                self.bus.emit_message(event).await;

                for message in outbound {
                    let destination = message.get_destination().to_string();
                    if let Err(err) = self.transport.send(message).await {
                        error!(
                            "[engine:dispatcher] delivery failed: {} to {}: {}",
                            piid, destination, err
                        );
                    }
                }
            }
        }
    }
}
