use std::collections::BTreeMap;

use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;

use rstdev_domain::entity::ToJSON;
use rstdev_domain::BaseError;

use super::types::DbError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(crate = "self::serde")]
#[serde(rename_all = "snake_case")]
pub enum IndexOp {
    Add,
    Remove,
}

/// `Bucket` is the key index of one storage prefix
///
/// It is used both as the stored value and as a merge operand. Merging keeps the
/// last operation seen per key, removals are only kept until they are folded
/// into a stored value through [`Bucket::compact`]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(crate = "self::serde")]
pub struct Bucket {
    entries: BTreeMap<String, IndexOp>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: String) {
        self.entries.insert(key, IndexOp::Add);
    }

    pub fn remove(&mut self, key: String) {
        self.entries.insert(key, IndexOp::Remove);
    }

    pub fn merge(&mut self, other: Bucket) {
        self.entries.extend(other.entries);
    }

    pub fn compact(&mut self) {
        self.entries.retain(|_, op| *op == IndexOp::Add);
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, op)| **op == IndexOp::Add)
            .map(|(key, _)| key.to_owned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryInto<Vec<u8>> for Bucket {
    type Error = DbError;

    fn try_into(self) -> Result<Vec<u8>, Self::Error> {
        let json =
            serde_json::to_vec(&self).map_err(|err| DbError::BucketError(err.to_string()))?;

        Ok(json)
    }
}

impl TryFrom<Vec<u8>> for Bucket {
    type Error = DbError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let bucket: Self =
            serde_json::from_slice(&value).map_err(|err| DbError::BucketError(err.to_string()))?;
        Ok(bucket)
    }
}

impl ToJSON for Bucket {
    fn to_json(&self) -> Result<String, BaseError> {
        let json_str =
            serde_json::to_string(&self).map_err(|err| BaseError::ToJSONError(err.to_string()))?;

        Ok(json_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_last_operation() {
        let mut bucket = Bucket::new();
        bucket.add("action:1".to_string());
        bucket.add("action:2".to_string());

        let mut operand = Bucket::new();
        operand.remove("action:1".to_string());
        operand.add("action:3".to_string());

        bucket.merge(operand);
        assert_eq!(
            bucket.keys(),
            vec!["action:2".to_string(), "action:3".to_string()]
        );

        let mut readd = Bucket::new();
        readd.add("action:1".to_string());
        bucket.merge(readd);
        assert_eq!(bucket.keys().len(), 3);
    }

    #[test]
    fn test_compact_drops_removals() {
        let mut bucket = Bucket::new();
        bucket.remove("action:1".to_string());
        assert!(bucket.keys().is_empty());
        assert!(!bucket.is_empty());

        bucket.compact();
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_from_json() {
        let mut bucket = Bucket::new();
        bucket.add("instance:1".to_string());
        bucket.remove("instance:2".to_string());

        let json_builder = bucket.to_json();
        assert!(!json_builder.is_err());

        let from_json: Result<Bucket, DbError> =
            json_builder.unwrap().as_bytes().to_vec().try_into();

        assert!(!from_json.is_err());
        assert_eq!(from_json.unwrap(), bucket);
    }

    #[test]
    fn test_from_invalid_bytes() {
        let from_bytes = Bucket::try_from(b"not a bucket".to_vec());
        assert!(matches!(from_bytes, Err(DbError::BucketError(_))));
    }
}
