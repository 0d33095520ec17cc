use rst_common::standard::async_trait::async_trait;
use rst_common::with_logging::log::debug;

use rstdev_storage::engine::rocksdb::executor::Executor;
use rstdev_storage::engine::rocksdb::types::{
    Instruction as DbInstruction, OutputOpts as DbOutput,
};

use prople_didcomm_core::engine::store::ACTION_PREFIX;
use prople_didcomm_core::engine::types::{ProtocolError, StorageBuilder};

use crate::common::types::CommonError;
use crate::db::merge_operators::index_key;
use crate::db::{Bucket as DbBucket, DbError};

fn db_error(msg: String) -> ProtocolError {
    CommonError::DbError(msg).into()
}

fn key_prefix(key: &str) -> Option<&str> {
    key.split_once(':').map(|(prefix, _)| prefix)
}

/// `Repository` is the RocksDB implementation of [`StorageBuilder`]
///
/// Only keys under an indexed prefix are tracked in their `index:<prefix>` bucket,
/// which is what [`StorageBuilder::iterate`] reads. The engine only iterates
/// pending actions, so that is the default indexed prefix
#[derive(Clone)]
pub struct Repository {
    db: Executor,
    indexed: Vec<String>,
}

impl Repository {
    pub fn new(db: Executor) -> Self {
        Self {
            db,
            indexed: vec![ACTION_PREFIX.to_string()],
        }
    }

    pub fn with_indexed_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.indexed = prefixes;
        self
    }

    fn is_indexed(&self, prefix: &str) -> bool {
        self.indexed.iter().any(|indexed| indexed == prefix)
    }

    async fn update_index(
        &self,
        key: &str,
        callback: impl FnOnce(&mut DbBucket),
    ) -> Result<(), ProtocolError> {
        let prefix = match key_prefix(key) {
            Some(prefix) if self.is_indexed(prefix) => prefix,
            _ => return Ok(()),
        };

        let mut operand = DbBucket::new();
        callback(&mut operand);

        let operand_bytes: Vec<u8> = operand
            .try_into()
            .map_err(|err: DbError| ProtocolError::SerializeError(err.to_string()))?;

        let _ = self
            .db
            .exec(DbInstruction::MergeCf {
                key: index_key(prefix),
                value: operand_bytes,
            })
            .await
            .map_err(|err| db_error(err.to_string()))?;

        Ok(())
    }

    async fn get_index(&self, prefix: &str) -> Result<DbBucket, ProtocolError> {
        let output = self
            .db
            .exec(DbInstruction::GetCf {
                key: index_key(prefix),
            })
            .await
            .map_err(|err| db_error(err.to_string()))?;

        let value = match output {
            DbOutput::SingleByte { value } => Ok(value),
            _ => Err(db_error("unknown output type".to_string())),
        }?;

        match value {
            Some(bytes) => DbBucket::try_from(bytes)
                .map_err(|err| ProtocolError::UnserializeError(err.to_string())),
            None => Ok(DbBucket::new()),
        }
    }
}

#[async_trait]
impl StorageBuilder for Repository {
    async fn put(&self, key: String, value: Vec<u8>) -> Result<(), ProtocolError> {
        let _ = self
            .db
            .exec(DbInstruction::SaveCf {
                key: key.clone(),
                value,
            })
            .await
            .map_err(|err| db_error(err.to_string()))?;

        self.update_index(&key, |bucket| bucket.add(key.clone())).await
    }

    async fn get(&self, key: String) -> Result<Option<Vec<u8>>, ProtocolError> {
        let output = self
            .db
            .exec(DbInstruction::GetCf { key })
            .await
            .map_err(|err| db_error(err.to_string()))?;

        match output {
            DbOutput::SingleByte { value } => Ok(value),
            _ => Err(db_error("unknown output type".to_string())),
        }
    }

    async fn remove(&self, key: String) -> Result<(), ProtocolError> {
        let _ = self
            .db
            .exec(DbInstruction::RemoveCf { key: key.clone() })
            .await
            .map_err(|err| db_error(err.to_string()))?;

        self.update_index(&key, |bucket| bucket.remove(key.clone())).await
    }

    async fn iterate(&self, prefix: String) -> Result<Vec<(String, Vec<u8>)>, ProtocolError> {
        if !self.is_indexed(&prefix) {
            return Err(db_error(format!("prefix is not indexed: {}", prefix)));
        }

        let keys = self.get_index(&prefix).await?.keys();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        debug!("[storage:repository] iterate: {} {} keys", prefix, keys.len());

        let output = self
            .db
            .exec(DbInstruction::MultiGetCf { keys: keys.clone() })
            .await
            .map_err(|err| db_error(err.to_string()))?;

        let values = match output {
            DbOutput::MultiBytes { values } => Ok(values),
            _ => Err(db_error("unknown output bytes".to_string())),
        }?;

        let mut entries = Vec::new();
        for (key, value) in keys.into_iter().zip(values) {
            match value {
                Ok(Some(bytes)) => entries.push((key, bytes)),
                Ok(None) => continue,
                Err(_) => return Err(db_error(format!("unable to read key: {}", key))),
            }
        }

        Ok(entries)
    }
}
