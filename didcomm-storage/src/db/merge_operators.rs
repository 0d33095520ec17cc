use rstdev_storage::engine::rocksdb::lib::rust_rocksdb::merge_operator::MergeOperands;

use super::{Bucket, DbError};

pub const MERGE_INDEX_ID: &str = "merge_index";
pub const INDEX_PREFIX: &str = "index";

pub fn index_key(prefix: &str) -> String {
    format!("{}:{}", INDEX_PREFIX, prefix)
}

fn is_index_key(key: &[u8]) -> bool {
    let prefix = format!("{}:", INDEX_PREFIX);
    key.starts_with(prefix.as_bytes())
}

fn merge_bucket_builder(existing: Option<&[u8]>) -> Option<Bucket> {
    existing.map_or_else(
        || Some(Bucket::new()),
        |val| {
            let bin_builder: Result<Bucket, DbError> = val.to_vec().try_into();
            bin_builder.ok()
        },
    )
}

/// merge_index folds index operands into the stored bucket of an `index:<prefix>` key
///
/// RocksDB also calls it for partial merges, where `existing` is always `None`.
/// Removals are compacted away only when a stored value is present
pub fn merge_index(
    new_key: &[u8],
    existing: Option<&[u8]>,
    operands: &MergeOperands,
) -> Option<Vec<u8>> {
    if !is_index_key(new_key) {
        let existing_val = existing.map(|val| val.to_vec())?;
        return Some(existing_val);
    }

    let mut bucket = merge_bucket_builder(existing)?;
    for op in operands {
        let operand: Result<Bucket, DbError> = op.to_vec().try_into();
        if let Ok(operand) = operand {
            bucket.merge(operand);
        }
    }

    if existing.is_some() {
        bucket.compact();
    }

    let output: Result<Vec<u8>, DbError> = bucket.try_into();
    output.ok()
}
