mod types;
pub use types::DbError;

mod bucket;
pub use bucket::{Bucket, IndexOp};

pub mod merge_operators;

mod builder;
pub use builder::Builder;
