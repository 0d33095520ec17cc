use std::sync::Arc;
use std::vec::IntoIter;

use rst_common::with_logging::log::{debug, error};

use super::action::PendingAction;
use super::instance::ProtocolInstance;
use super::types::{ProtocolError, StorageBuilder, PIID};

pub const ACTION_PREFIX: &str = "action";
pub const INSTANCE_PREFIX: &str = "instance";
pub const THREAD_PREFIX: &str = "thread";

fn storage_key(prefix: &str, id: &str) -> String {
    format!("{}:{}", prefix, id)
}

/// ActionStore persists pending actions keyed by their piid
///
/// There is no memory only mode, every call goes through the [`StorageBuilder`]
pub struct ActionStore<TStorage>
where
    TStorage: StorageBuilder,
{
    storage: Arc<TStorage>,
}

impl<TStorage> Clone for ActionStore<TStorage>
where
    TStorage: StorageBuilder,
{
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

impl<TStorage> ActionStore<TStorage>
where
    TStorage: StorageBuilder,
{
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self { storage }
    }

    /// save upserts the pending action of `piid`
    pub async fn save(&self, piid: &PIID, action: PendingAction) -> Result<(), ProtocolError> {
        let bytes: Vec<u8> = action.try_into()?;
        debug!("[engine:store] save action: {}", piid.as_str());

        self.storage
            .put(storage_key(ACTION_PREFIX, piid.as_str()), bytes)
            .await
    }

    pub async fn get(&self, piid: &PIID) -> Result<PendingAction, ProtocolError> {
        self.find(piid)
            .await?
            .ok_or_else(|| ProtocolError::NotFound(piid.as_str().to_string()))
    }

    pub async fn find(&self, piid: &PIID) -> Result<Option<PendingAction>, ProtocolError> {
        let bytes = self
            .storage
            .get(storage_key(ACTION_PREFIX, piid.as_str()))
            .await?;

        match bytes {
            Some(value) => PendingAction::try_from(value).map(Some),
            None => Ok(None),
        }
    }

    /// get_all returns every pending action currently stored
    ///
    /// The iterator is a one shot snapshot, call it again to observe newer actions
    pub async fn get_all(&self) -> Result<IntoIter<PendingAction>, ProtocolError> {
        let entries = self.storage.iterate(ACTION_PREFIX.to_string()).await?;

        let actions = entries
            .into_iter()
            .map(|(_, value)| PendingAction::try_from(value))
            .collect::<Result<Vec<PendingAction>, ProtocolError>>()?;

        Ok(actions.into_iter())
    }

    /// delete is idempotent, removing an absent piid succeeds
    pub async fn delete(&self, piid: &PIID) -> Result<(), ProtocolError> {
        debug!("[engine:store] delete action: {}", piid.as_str());

        self.storage
            .remove(storage_key(ACTION_PREFIX, piid.as_str()))
            .await
    }
}

/// InstanceStore persists committed protocol instances and their thread index
pub struct InstanceStore<TStorage>
where
    TStorage: StorageBuilder,
{
    storage: Arc<TStorage>,
}

impl<TStorage> Clone for InstanceStore<TStorage>
where
    TStorage: StorageBuilder,
{
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

impl<TStorage> InstanceStore<TStorage>
where
    TStorage: StorageBuilder,
{
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self { storage }
    }

    /// save writes the instance then binds its thread id to the piid
    ///
    /// The binding is only written on the first save. When it fails the fresh
    /// instance record is removed again, so no unreachable instance is left behind
    pub async fn save(&self, instance: &ProtocolInstance) -> Result<(), ProtocolError> {
        let piid = instance.get_piid().to_owned();
        let thread_id = instance.get_thread_id().to_string();
        let bytes: Vec<u8> = instance.to_owned().try_into()?;

        let bound = self
            .find_by_thread(&thread_id)
            .await?
            .is_some_and(|owner| owner == piid);

        let instance_key = storage_key(INSTANCE_PREFIX, piid.as_str());
        self.storage.put(instance_key.clone(), bytes).await?;

        if bound {
            return Ok(());
        }

        let binding = self
            .storage
            .put(
                storage_key(THREAD_PREFIX, &thread_id),
                piid.as_str().as_bytes().to_vec(),
            )
            .await;

        if let Err(err) = binding {
            if let Err(rollback) = self.storage.remove(instance_key).await {
                error!(
                    "[engine:store] rollback instance failed: {}: {}",
                    piid.as_str(),
                    rollback
                );
            }

            return Err(err);
        }

        Ok(())
    }

    pub async fn get(&self, piid: &PIID) -> Result<ProtocolInstance, ProtocolError> {
        let bytes = self
            .storage
            .get(storage_key(INSTANCE_PREFIX, piid.as_str()))
            .await?
            .ok_or_else(|| ProtocolError::NotFound(piid.as_str().to_string()))?;

        ProtocolInstance::try_from(bytes)
    }

    /// find_by_thread resolves the piid correlated with a thread id
    pub async fn find_by_thread(&self, thread_id: &str) -> Result<Option<PIID>, ProtocolError> {
        let bytes = self
            .storage
            .get(storage_key(THREAD_PREFIX, thread_id))
            .await?;

        match bytes {
            Some(value) => {
                let piid = String::from_utf8(value)
                    .map_err(|err| ProtocolError::UnserializeError(err.to_string()))?;
                Ok(Some(PIID::from(piid)))
            }
            None => Ok(None),
        }
    }
}
