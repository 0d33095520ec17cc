use std::sync::Arc;
use std::time::Duration;

use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::Value;
use rst_common::with_logging::log::{debug, warn};
use rst_common::with_tokio::tokio;
use rst_common::with_tokio::tokio::sync::RwLock;

use super::instance::ProtocolState;
use super::types::{ActionListener, Message, MessageListener, ProtocolError, ProtocolType, PIID};

/// ActionEvent tells the action listener a transition waits for its decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ActionEvent {
    piid: PIID,
    protocol_type: ProtocolType,
    message: Message,
    continuation_schema: Value,
}

impl ActionEvent {
    pub fn new(
        piid: PIID,
        protocol_type: ProtocolType,
        message: Message,
        continuation_schema: Value,
    ) -> Self {
        Self {
            piid,
            protocol_type,
            message,
            continuation_schema,
        }
    }

    pub fn get_piid(&self) -> &PIID {
        &self.piid
    }

    pub fn get_protocol_type(&self) -> ProtocolType {
        self.protocol_type
    }

    pub fn get_message(&self) -> &Message {
        &self.message
    }

    pub fn get_continuation_schema(&self) -> &Value {
        &self.continuation_schema
    }
}

/// MessageEvent describes a committed transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct MessageEvent {
    piid: PIID,
    protocol_type: ProtocolType,
    state_from: ProtocolState,
    state_to: ProtocolState,
    message: Message,
}

impl MessageEvent {
    pub fn new(
        piid: PIID,
        state_from: ProtocolState,
        state_to: ProtocolState,
        message: Message,
    ) -> Self {
        Self {
            piid,
            protocol_type: state_to.protocol_type(),
            state_from,
            state_to,
            message,
        }
    }

    pub fn get_piid(&self) -> &PIID {
        &self.piid
    }

    pub fn get_protocol_type(&self) -> ProtocolType {
        self.protocol_type
    }

    pub fn get_state_from(&self) -> ProtocolState {
        self.state_from
    }

    pub fn get_state_to(&self) -> ProtocolState {
        self.state_to
    }

    pub fn get_message(&self) -> &Message {
        &self.message
    }
}

#[derive(Default)]
struct Listeners {
    action: Option<Arc<dyn ActionListener>>,
    messages: Vec<Arc<dyn MessageListener>>,
}

fn same_listener<T: ?Sized>(left: &Arc<T>, right: &Arc<T>) -> bool {
    Arc::as_ptr(left) as *const () == Arc::as_ptr(right) as *const ()
}

/// EventBus owns the single action listener and the message listeners of one engine
///
/// Deliveries run on their own task bounded by `timeout`, listener failures are
/// logged and never returned to the caller. Listeners only see events raised
/// after their registration
#[derive(Clone)]
pub struct EventBus {
    listeners: Arc<RwLock<Listeners>>,
    timeout: Duration,
}

impl EventBus {
    pub fn new(timeout: Duration) -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Listeners::default())),
            timeout,
        }
    }

    pub async fn register_action(
        &self,
        listener: Arc<dyn ActionListener>,
    ) -> Result<(), ProtocolError> {
        let mut listeners = self.listeners.write().await;
        if listeners.action.is_some() {
            return Err(ProtocolError::AlreadyRegistered);
        }

        listeners.action = Some(listener);
        Ok(())
    }

    pub async fn register_message(
        &self,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), ProtocolError> {
        let mut listeners = self.listeners.write().await;
        listeners.messages.push(listener);
        Ok(())
    }

    pub async fn unregister_action(
        &self,
        listener: &Arc<dyn ActionListener>,
    ) -> Result<(), ProtocolError> {
        let mut listeners = self.listeners.write().await;

        let registered = listeners
            .action
            .as_ref()
            .is_some_and(|current| same_listener(current, listener));

        if !registered {
            return Err(ProtocolError::NotRegistered);
        }

        listeners.action = None;
        Ok(())
    }

    pub async fn unregister_message(
        &self,
        listener: &Arc<dyn MessageListener>,
    ) -> Result<(), ProtocolError> {
        let mut listeners = self.listeners.write().await;
        listeners
            .messages
            .retain(|current| !same_listener(current, listener));

        Ok(())
    }

    pub async fn has_action_listener(&self) -> bool {
        self.listeners.read().await.action.is_some()
    }

    /// emit_action delivers to the action listener and waits for it, up to the timeout
    ///
    /// Returns `false` when nobody received the event
    pub async fn emit_action(&self, event: ActionEvent) -> bool {
        let listener = { self.listeners.read().await.action.clone() };

        let Some(listener) = listener else {
            warn!(
                "[engine:event] no action listener, action kept pending: {}",
                event.get_piid().as_str()
            );
            return false;
        };

        let piid = event.get_piid().as_str().to_string();
        debug!("[engine:event] deliver action event: {}", piid);

        let task = tokio::spawn(async move { listener.on_action(event).await });
        self.settle("action", &piid, task).await;
        true
    }

    /// emit_message delivers to every message listener in registration order
    pub async fn emit_message(&self, event: MessageEvent) {
        let listeners = { self.listeners.read().await.messages.clone() };
        let piid = event.get_piid().as_str().to_string();

        for listener in listeners {
            let event = event.clone();
            debug!("[engine:event] deliver message event: {}", piid);

            let task = tokio::spawn(async move { listener.on_message(event).await });
            self.settle("message", &piid, task).await;
        }
    }

    async fn settle(
        &self,
        kind: &str,
        piid: &str,
        mut task: tokio::task::JoinHandle<Result<(), ProtocolError>>,
    ) {
        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(Ok(_))) => {}
            Ok(Ok(Err(err))) => {
                warn!("[engine:event] {} listener failed: {}: {}", kind, piid, err)
            }
            Ok(Err(err)) => {
                warn!("[engine:event] {} listener aborted: {}: {}", kind, piid, err)
            }
            Err(_) => {
                task.abort();
                warn!("[engine:event] {} listener timed out: {}", kind, piid)
            }
        }
    }
}
